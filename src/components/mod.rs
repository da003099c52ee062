pub mod chat;
pub mod latex;
pub mod messagelist;
pub mod stream;

pub mod chats;
pub mod sse;
pub mod upload;

pub use chats::*;
pub use sse::*;
pub use upload::*;

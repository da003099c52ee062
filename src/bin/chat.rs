use anyhow::{bail, Context};
use dotenv::dotenv;
use env_logger::Env;
use std::io::Write;
use std::path::Path;

use chat_relay::components::chat::ChatClient;
use chat_relay::components::messagelist::Conversation;
use chat_relay::config::ClientConfig;
use chat_relay::models::conversations::{Message, Role};

const USAGE: &str = "usage: chat [--image PATH]... MESSAGE";

/// Prints the newest assistant message incrementally, falling back to a
/// full reprint when math cleanup rewrote text that was already shown.
fn render(messages: &[Message], printed: &mut String) {
    let Some(latest) = messages.iter().rev().find(|m| m.role == Role::Assistant) else {
        return;
    };

    let mut stdout = std::io::stdout();
    match latest.content.strip_prefix(printed.as_str()) {
        Some(suffix) => {
            let _ = write!(stdout, "{suffix}");
        }
        None => {
            let _ = write!(stdout, "\n{}", latest.content);
        }
    }
    let _ = stdout.flush();
    printed.clone_from(&latest.content);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("warn"));

    let mut image_paths = Vec::new();
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--image" {
            image_paths.push(args.next().context(USAGE)?);
        } else {
            words.push(arg);
        }
    }
    let text = words.join(" ");
    if text.trim().is_empty() && image_paths.is_empty() {
        bail!(USAGE);
    }

    let config = ClientConfig::from_env();
    let client = ChatClient::new(config.relay_url, Conversation::new());

    let mut images = Vec::new();
    for path in &image_paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {path}"))?;
        let file_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.jpg");
        images.push(client.upload_image(file_name, bytes).await?);
    }

    let mut updates = client.conversation().subscribe();
    let printer = tokio::spawn(async move {
        let mut printed = String::new();
        while updates.changed().await.is_ok() {
            render(&updates.borrow_and_update(), &mut printed);
        }
        render(&updates.borrow(), &mut printed);
        println!();
    });

    let result = client.send_message(text.trim(), images).await;
    drop(client);
    printer.await?;

    result?;
    Ok(())
}

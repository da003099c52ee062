mod common;

use chat_relay::components::chat::{ChatClient, ChatError};
use chat_relay::components::messagelist::Conversation;
use chat_relay::models::conversations::{Role, CONTACT_FAILED_NOTICE};
use common::*;
use reqwest::StatusCode;

async fn client_for_upstream() -> ChatClient {
    let (api_url, _) = spawn_upstream().await;
    let relay_url = spawn_relay(relay_state(relay_config(&api_url))).await;
    ChatClient::new(relay_url, Conversation::new())
}

#[tokio::test]
async fn assembles_reply_through_relay() {
    let client = client_for_upstream().await;
    let id = client.send_message("hi", Vec::new()).await.unwrap();

    let messages = client.conversation().snapshot();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hi");
    assert_eq!(messages[1].id, id);
    assert_eq!(messages[1].content, "Hello world");
    assert!(!messages[1].streaming);
}

#[tokio::test]
async fn skips_malformed_events_end_to_end() {
    let client = client_for_upstream().await;
    let id = client.send_message("malformed", Vec::new()).await.unwrap();
    assert_eq!(client.conversation().get(&id).unwrap().content, "AB");
}

#[tokio::test]
async fn observers_see_streaming_then_finished() {
    let client = client_for_upstream().await;
    let mut updates = client.conversation().subscribe();

    let watcher = tokio::spawn(async move {
        let mut saw_streaming = false;
        let mut finished_transitions = 0;
        let mut was_streaming = false;
        while updates.changed().await.is_ok() {
            let streaming = updates
                .borrow_and_update()
                .iter()
                .any(|m| m.role == Role::Assistant && m.streaming);
            saw_streaming |= streaming;
            if was_streaming && !streaming {
                finished_transitions += 1;
            }
            was_streaming = streaming;
        }
        (saw_streaming, finished_transitions)
    });

    client.send_message("hi", Vec::new()).await.unwrap();
    drop(client);

    let (saw_streaming, finished_transitions) = watcher.await.unwrap();
    assert!(saw_streaming);
    assert_eq!(finished_transitions, 1);
}

#[tokio::test]
async fn upstream_refusal_appends_notice() {
    let client = client_for_upstream().await;
    let err = client.send_message("refuse", Vec::new()).await.unwrap_err();
    assert!(matches!(err, ChatError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));

    let messages = client.conversation().snapshot();
    assert_eq!(messages.len(), 3);
    assert!(messages[1].content.is_empty());
    assert!(!messages[1].streaming);
    assert_eq!(messages[2].content, CONTACT_FAILED_NOTICE);
    assert!(!client.conversation().is_streaming());
}

#[tokio::test]
async fn unreachable_relay_appends_notice() {
    let client = ChatClient::new(closed_url().await, Conversation::new());
    let err = client.send_message("hi", Vec::new()).await.unwrap_err();
    assert!(matches!(err, ChatError::Transport(_)));

    let messages = client.conversation().snapshot();
    assert_eq!(messages.len(), 3);
    assert!(!messages[1].streaming);
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].content, CONTACT_FAILED_NOTICE);
}

#[tokio::test]
async fn broken_stream_keeps_partial_reply() {
    let client = client_for_upstream().await;
    let err = client.send_message("break", Vec::new()).await.unwrap_err();
    assert!(matches!(err, ChatError::Transport(_)));

    let messages = client.conversation().snapshot();
    assert_eq!(messages.len(), 3);
    // whatever arrived before the failure stays in place
    assert!("partial".starts_with(messages[1].content.as_str()));
    assert!(!messages[1].streaming);
    assert_eq!(messages[2].content, CONTACT_FAILED_NOTICE);
}

#[tokio::test]
async fn concurrent_exchanges_stay_separate() {
    let client = client_for_upstream().await;
    let (first, second) = tokio::join!(
        client.send_message("hi", Vec::new()),
        client.send_message("malformed", Vec::new()),
    );

    let conversation = client.conversation();
    assert_eq!(conversation.get(&first.unwrap()).unwrap().content, "Hello world");
    assert_eq!(conversation.get(&second.unwrap()).unwrap().content, "AB");
    assert_eq!(conversation.len(), 4);
}

#[tokio::test]
async fn uploaded_image_is_sent_with_request() {
    let (api_url, recorded) = spawn_upstream().await;
    let relay_url = spawn_relay(relay_state(relay_config(&api_url))).await;
    let client = ChatClient::new(relay_url, Conversation::new());

    let url = client.upload_image("diagram.png", b"png-bytes".to_vec()).await.unwrap();
    assert!(url.starts_with("/uploads/") && url.ends_with(".png"));

    client.send_message("look", vec![url.clone()]).await.unwrap();

    let forwarded: serde_json::Value = serde_json::from_slice(&recorded.last_body()).unwrap();
    assert_eq!(forwarded["message"], "look");
    assert_eq!(forwarded["images"][0], url.as_str());

    let user = &client.conversation().snapshot()[0];
    assert_eq!(user.content, format!("look\n\n![image]({url})"));
}

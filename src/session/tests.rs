use super::message::{Exchange, Message};
use super::protocol::{CONTEXT_WINDOW, Session, context_window};
use super::reducer::{Conversation, Outcome, THINKING, Turn};
use super::ChatSession;
use super::client::render;
use crate::broker::Envelope;
use crate::config::Settings;
use serde_json::json;
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

fn conversation_with(ids: &[&str]) -> Conversation {
    let mut conversation = Conversation::new();
    for id in ids {
        conversation.record(Turn::new(*id, format!("question {id}"), true));
    }
    conversation
}

fn session() -> Session {
    Session::with_reply_topic(&Settings::default().session, "reply-1")
}

fn sent_json(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> serde_json::Value {
    let frame = rx.try_recv().expect("expected an outbound frame");
    serde_json::from_str(frame.to_text().unwrap()).unwrap()
}

// --- reducer ---

#[test]
fn test_stream_fragments_accumulate() {
    let mut conversation = Conversation::new();
    conversation.record(Turn {
        id: "a".into(),
        human: "hi".into(),
        robot: String::new(),
        image: None,
    });

    for fragment in ["He", "llo"] {
        let outcome = conversation.apply(Message::ChatMessageRobotStreamResponse {
            id: "a".into(),
            robot: fragment.into(),
        });
        assert_eq!(outcome, Outcome::Streamed { id: "a".into() });
    }

    assert_eq!(conversation.turn("a").unwrap().robot, "Hello");
}

#[test]
fn test_full_response_overwrites() {
    let mut conversation = conversation_with(&["a"]);
    conversation.apply(Message::ChatMessageRobotStreamResponse {
        id: "a".into(),
        robot: "partial".into(),
    });

    let outcome = conversation.apply(Message::ChatMessageRobotResponse {
        id: "a".into(),
        robot: "Full answer".into(),
    });

    assert_eq!(
        outcome,
        Outcome::Answered {
            id: "a".into(),
            prompt: "Full answer".into()
        }
    );
    assert_eq!(conversation.turn("a").unwrap().robot, "Full answer");
}

#[test]
fn test_duplicate_fragment_is_appended_twice() {
    let mut conversation = conversation_with(&["a"]);
    let fragment = Message::ChatMessageRobotStreamResponse {
        id: "a".into(),
        robot: "ha".into(),
    };
    conversation.apply(fragment.clone());
    conversation.apply(fragment);

    assert_eq!(conversation.turn("a").unwrap().robot, "haha");
}

#[test]
fn test_image_attaches_to_turn() {
    let mut conversation = conversation_with(&["a", "b"]);
    let outcome = conversation.apply(Message::ChatImageRobotResponse {
        id: "b".into(),
        robot: "aGVsbG8=".into(),
    });

    assert_eq!(outcome, Outcome::ImageAttached { id: "b".into() });
    let turn = conversation.turn("b").unwrap();
    assert_eq!(turn.image.as_deref(), Some("aGVsbG8="));
    assert_eq!(turn.image_bytes().unwrap().unwrap(), b"hello");
    assert!(conversation.turn("a").unwrap().image.is_none());
}

#[test]
fn test_responses_for_unknown_turn_are_dropped() {
    let mut conversation = conversation_with(&["a"]);
    let before = conversation.turns().to_vec();

    let messages = [
        Message::ChatMessageRobotResponse {
            id: "zzz".into(),
            robot: "x".into(),
        },
        Message::ChatMessageRobotStreamResponse {
            id: "zzz".into(),
            robot: "x".into(),
        },
        Message::ChatImageRobotResponse {
            id: "zzz".into(),
            robot: "x".into(),
        },
    ];
    for message in messages {
        assert_eq!(conversation.apply(message), Outcome::Ignored);
    }

    assert_eq!(conversation.turns(), before.as_slice());
}

#[test]
fn test_avatar_and_status_are_session_wide() {
    let mut conversation = conversation_with(&["a"]);
    let before = conversation.turns().to_vec();

    assert_eq!(
        conversation.apply(Message::ChatAvatarRobotResponse {
            id: None,
            robot: "dGV4".into(),
        }),
        Outcome::AvatarUpdated
    );
    assert_eq!(
        conversation.apply(Message::SystemResourceUpdate {
            resources: json!("gpu: 2/4"),
        }),
        Outcome::StatusUpdated
    );

    assert_eq!(conversation.avatar_texture(), Some("dGV4"));
    assert_eq!(conversation.status(), Some(&json!("gpu: 2/4")));
    assert_eq!(conversation.turns(), before.as_slice());
}

#[test]
fn test_requests_and_opaque_messages_are_ignored() {
    let mut conversation = conversation_with(&["a"]);
    assert_eq!(
        conversation.apply(Message::ChatAvatarCreate {
            id: "a".into(),
            reply_topic: "r".into(),
        }),
        Outcome::Ignored
    );
    assert_eq!(
        conversation.apply(Message::Opaque(json!({"type": "FutureThing", "id": "a"}))),
        Outcome::Ignored
    );
}

#[test]
fn test_turn_placeholder() {
    assert_eq!(Turn::new("a", "hi", true).robot, "");
    assert_eq!(Turn::new("a", "hi", false).robot, THINKING);
}

// --- messages ---

#[test]
fn test_decode_known_message() {
    let raw = json!({"type": "ChatMessageRobotStreamResponse", "id": "a", "robot": "He"}).to_string();
    let message = Message::decode(raw.as_bytes()).unwrap();
    assert_eq!(
        message,
        Message::ChatMessageRobotStreamResponse {
            id: "a".into(),
            robot: "He".into()
        }
    );
    assert_eq!(message.id(), Some("a"));
    assert_eq!(message.type_name(), "ChatMessageRobotStreamResponse");
}

#[test]
fn test_decode_avatar_without_id() {
    let raw = json!({"type": "ChatAvatarRobotResponse", "robot": "AAAA"}).to_string();
    assert_eq!(
        Message::decode(raw.as_bytes()).unwrap(),
        Message::ChatAvatarRobotResponse {
            id: None,
            robot: "AAAA".into()
        }
    );
}

#[test]
fn test_decode_unknown_type_is_opaque() {
    let value = json!({"type": "ChatVideoRobotResponse", "id": "a", "robot": "..."});
    let message = Message::decode(value.to_string().as_bytes()).unwrap();
    assert_eq!(message, Message::Opaque(value.clone()));
    assert_eq!(message.type_name(), "ChatVideoRobotResponse");
    assert_eq!(message.into_body().unwrap(), *value.as_object().unwrap());
}

#[test]
fn test_decode_errors() {
    assert!(Message::decode(b"something").is_err());
    // known type, missing field
    assert!(Message::decode(br#"{"type": "ChatImageRobotResponse", "id": "a"}"#).is_err());
}

#[test]
fn test_opaque_non_object_has_no_body() {
    assert!(Message::Opaque(json!([1, 2])).into_body().is_err());
}

// --- protocol ---

#[test]
fn test_subscriptions() {
    let session = session();
    assert_eq!(
        session.subscriptions(),
        [
            Envelope::subscribe("reply-1"),
            Envelope::subscribe("gpt-oasst-llama2-resources")
        ]
    );
}

#[test]
fn test_sessions_get_distinct_reply_topics() {
    let settings = Settings::default().session;
    let a = Session::new(&settings);
    let b = Session::new(&settings);
    assert!(!a.reply_topic().is_empty());
    assert_ne!(a.reply_topic(), b.reply_topic());
}

#[test]
fn test_publish_message_envelope() {
    let session = session();
    let previous = conversation_with(&["p1"]);

    let envelope = session
        .publish_message("t1", previous.turns(), "hello", true)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

    assert_eq!(
        value,
        json!({
            "cmd": "pub",
            "topic": "gpt-oasst-llama2",
            "type": "ChatMessageCreate",
            "id": "t1",
            "human": "hello",
            "previous": [{"human": "question p1", "robot": ""}],
            "stream": true,
            "replyTopic": "reply-1"
        })
    );
}

#[test]
fn test_context_window_keeps_last_four_of_five() {
    let conversation = conversation_with(&["1", "2", "3", "4", "5"]);
    let context = context_window(conversation.turns());

    assert_eq!(context.len(), CONTEXT_WINDOW);
    let humans: Vec<&str> = context.iter().map(|e| e.human.as_str()).collect();
    assert_eq!(
        humans,
        ["question 2", "question 3", "question 4", "question 5"]
    );
}

#[test]
fn test_context_window_short_logs_are_sent_whole() {
    assert!(context_window(&[]).is_empty());

    let one = conversation_with(&["1"]);
    assert_eq!(
        context_window(one.turns()),
        vec![Exchange {
            human: "question 1".into(),
            robot: String::new()
        }]
    );

    let three = conversation_with(&["1", "2", "3"]);
    assert_eq!(context_window(three.turns()).len(), 3);
}

#[test]
fn test_publish_message_with_five_prior_turns() {
    let conversation = conversation_with(&["1", "2", "3", "4", "5"]);
    match session()
        .publish_message("6", conversation.turns(), "next", false)
        .unwrap()
    {
        Envelope::Publish { body, .. } => {
            let previous = body["previous"].as_array().unwrap();
            assert_eq!(previous.len(), 4);
            assert_eq!(previous[0]["human"], "question 2");
            assert_eq!(body["stream"], false);
        }
        other => panic!("Expected Publish, got {other:?}"),
    }
}

#[test]
fn test_image_and_texture_requests() {
    let session = session();

    let image: serde_json::Value = serde_json::from_str(
        &session
            .request_image("t1", "a cat")
            .unwrap()
            .to_json()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(
        image,
        json!({"cmd": "pub", "topic": "sd-2-1", "type": "ChatImageCreate", "id": "t1", "human": "a cat", "replyTopic": "reply-1"})
    );

    let texture: serde_json::Value =
        serde_json::from_str(&session.request_texture("t1").unwrap().to_json().unwrap()).unwrap();
    assert_eq!(
        texture,
        json!({"cmd": "pub", "topic": "sd-2-1", "type": "ChatAvatarCreate", "id": "t1", "replyTopic": "reply-1"})
    );
}

// --- chat session ---

#[test]
fn test_chat_session_start_subscribes() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let chat = ChatSession::new(session(), true, tx);
    chat.start().unwrap();

    assert_eq!(sent_json(&mut rx), json!({"cmd": "sub", "topic": "reply-1"}));
    assert_eq!(
        sent_json(&mut rx),
        json!({"cmd": "sub", "topic": "gpt-oasst-llama2-resources"})
    );
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_chat_session_submit_records_turn_and_requests_texture() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut chat = ChatSession::new(session(), true, tx);

    let first = chat.submit("hi").unwrap();
    let create = sent_json(&mut rx);
    assert_eq!(create["type"], "ChatMessageCreate");
    assert_eq!(create["id"], first.as_str());
    assert_eq!(create["previous"], json!([]));
    let texture = sent_json(&mut rx);
    assert_eq!(texture["type"], "ChatAvatarCreate");
    assert_eq!(texture["id"], first.as_str());

    let second = chat.submit("again").unwrap();
    assert_ne!(first, second);
    let create = sent_json(&mut rx);
    assert_eq!(create["previous"], json!([{"human": "hi", "robot": ""}]));

    let ids: Vec<&str> = chat
        .conversation()
        .turns()
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ids, [first.as_str(), second.as_str()]);
}

#[test]
fn test_chat_session_full_answer_requests_image() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut chat = ChatSession::new(session(), true, tx);
    let id = chat.submit("draw").unwrap();
    let _ = sent_json(&mut rx);
    let _ = sent_json(&mut rx);

    let frame = WsMessage::text(
        json!({"type": "ChatMessageRobotResponse", "id": id, "robot": "a red fox"}).to_string(),
    );
    chat.handle_frame(frame).unwrap();

    let request = sent_json(&mut rx);
    assert_eq!(
        request,
        json!({"cmd": "pub", "topic": "sd-2-1", "type": "ChatImageCreate", "id": id, "human": "a red fox", "replyTopic": "reply-1"})
    );
}

#[test]
fn test_chat_session_ignores_garbage_frames() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut chat = ChatSession::new(session(), true, tx);

    assert_eq!(
        chat.handle_frame(WsMessage::text("something")).unwrap(),
        Outcome::Ignored
    );
    assert_eq!(
        chat.handle_frame(WsMessage::Ping(Default::default()))
            .unwrap(),
        Outcome::Ignored
    );
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_chat_session_reports_closed_transport() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let mut chat = ChatSession::new(session(), true, tx);

    assert!(matches!(
        chat.submit("hi"),
        Err(crate::utils::SessionError::TransportClosed)
    ));
    assert!(chat.conversation().turns().is_empty());
}

struct BrokenPipe;

impl std::io::Write for BrokenPipe {
    fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
        Err(std::io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Err(std::io::ErrorKind::BrokenPipe.into())
    }
}

#[test]
fn test_render_prints_only_new_stream_text() {
    let mut conversation = conversation_with(&["a"]);
    let mut printed = std::collections::HashMap::new();
    let mut out = Vec::new();

    for fragment in ["He", "llo"] {
        let outcome = conversation.apply(Message::ChatMessageRobotStreamResponse {
            id: "a".to_string(),
            robot: fragment.to_string(),
        });
        render(&mut out, &conversation, &outcome, &mut printed);
    }

    assert_eq!(String::from_utf8(out).unwrap(), "Hello");
}

#[test]
fn test_render_survives_write_errors() {
    let mut conversation = conversation_with(&["a"]);
    let mut printed = std::collections::HashMap::new();
    let outcome = conversation.apply(Message::ChatMessageRobotResponse {
        id: "a".to_string(),
        robot: "done".to_string(),
    });

    render(&mut BrokenPipe, &conversation, &outcome, &mut printed);
    render(&mut BrokenPipe, &conversation, &Outcome::AvatarUpdated, &mut printed);
}

use super::*;
use crate::action::{FreeDrawStroke, StrokePoint};
use crate::frame::{ErrorCode, Status};
use crate::raster::Color;

fn stroke_action(author: &str) -> Action {
    let mut stroke = FreeDrawStroke::new(2.0);
    stroke.add_point(StrokePoint::new(1.0, 1.0, 0.5, Color::BLACK));
    stroke.add_point(StrokePoint::new(9.0, 4.0, 0.5, Color::BLACK));
    Action::free_draw(AuthorId::from(author), stroke)
}

// =============================================================
// Frame conversion
// =============================================================

#[test]
fn append_frame_carries_action() {
    let board_id = Uuid::new_v4();
    let action = stroke_action("alice");
    let frame = SyncMessage::Append(action.clone()).to_frame(board_id).unwrap();

    assert_eq!(frame.syscall, SYSCALL_APPEND);
    assert_eq!(frame.status, Status::Request);
    assert_eq!(frame.board_id, Some(board_id));
    assert_eq!(frame.data["action"]["author"], "alice");

    let SyncMessage::Append(decoded) = SyncMessage::from_frame(&frame).unwrap() else {
        panic!("expected append");
    };
    assert_eq!(decoded.id, action.id);
    assert_eq!(decoded.kind(), action.kind());
}

#[test]
fn undo_and_redo_frames_carry_author() {
    let board_id = Uuid::new_v4();
    let undo = SyncMessage::Undo { author: AuthorId::from("bob") }.to_frame(board_id).unwrap();
    let redo = SyncMessage::Redo { author: AuthorId::from("bob") }.to_frame(board_id).unwrap();

    assert_eq!(undo.syscall, "action:undo");
    assert_eq!(redo.syscall, "action:redo");
    assert_eq!(undo.data.get("author").and_then(|v| v.as_str()), Some("bob"));

    assert!(matches!(SyncMessage::from_frame(&undo).unwrap(), SyncMessage::Undo { author } if author.as_str() == "bob"));
    assert!(matches!(SyncMessage::from_frame(&redo).unwrap(), SyncMessage::Redo { author } if author.as_str() == "bob"));
}

#[test]
fn clear_frame_has_no_data() {
    let frame = SyncMessage::Clear.to_frame(Uuid::new_v4()).unwrap();
    assert_eq!(frame.syscall, "board:clear");
    assert!(frame.data.is_empty());
    assert!(matches!(SyncMessage::from_frame(&frame).unwrap(), SyncMessage::Clear));
    assert!(SyncMessage::Clear.author().is_none());
}

#[test]
fn unknown_syscall_is_rejected() {
    let frame = Frame::request("object:create", Data::new());
    let err = SyncMessage::from_frame(&frame).unwrap_err();
    assert!(matches!(err, SyncError::UnknownSyscall(ref s) if s == "object:create"));
    assert_eq!(err.error_code(), "E_UNKNOWN_SYSCALL");
}

#[test]
fn missing_fields_are_rejected() {
    let append = Frame::request(SYSCALL_APPEND, Data::new());
    assert!(matches!(SyncMessage::from_frame(&append), Err(SyncError::MissingField("action"))));

    let undo = Frame::request(SYSCALL_UNDO, Data::new()).with_data("author", 42);
    assert!(matches!(SyncMessage::from_frame(&undo), Err(SyncError::MissingField("author"))));
}

#[test]
fn malformed_action_is_payload_error() {
    let frame = Frame::request(SYSCALL_APPEND, Data::new()).with_data("action", serde_json::json!({"author": "x"}));
    let err = SyncMessage::from_frame(&frame).unwrap_err();
    assert!(matches!(err, SyncError::Payload(_)));
    assert_eq!(err.error_code(), "E_INVALID_PAYLOAD");
}

// =============================================================
// Channels
// =============================================================

#[tokio::test]
async fn offline_channel_accepts_everything() {
    let mut channel = Offline;
    channel.publish(Uuid::new_v4(), &SyncMessage::Clear).await.unwrap();
    assert!(!channel.sequenced());
}

#[tokio::test]
async fn relay_link_forwards_frames_stamped_with_author() {
    let (tx, mut rx) = mpsc::channel::<Frame>(4);
    let mut link = RelayLink::new(tx);
    let board_id = Uuid::new_v4();
    assert!(link.sequenced());

    link.publish(board_id, &SyncMessage::Undo { author: AuthorId::from("carol") }).await.unwrap();
    link.publish(board_id, &SyncMessage::Clear).await.unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!(first.syscall, SYSCALL_UNDO);
    assert_eq!(first.from.as_deref(), Some("carol"));
    assert_eq!(first.board_id, Some(board_id));

    let second = rx.recv().await.unwrap();
    assert_eq!(second.syscall, SYSCALL_CLEAR);
    assert!(second.from.is_none());
}

#[tokio::test]
async fn relay_link_reports_closed_receiver() {
    let (tx, rx) = mpsc::channel::<Frame>(1);
    drop(rx);
    let err = RelayLink::new(tx).publish(Uuid::new_v4(), &SyncMessage::Clear).await.unwrap_err();
    assert!(matches!(err, SyncError::Closed));
}

use super::*;

#[test]
fn request_sets_fields() {
    let frame = Frame::request("action:append", Data::new());
    assert_eq!(frame.syscall, "action:append");
    assert_eq!(frame.status, Status::Request);
    assert!(frame.parent_id.is_none());
    assert!(frame.board_id.is_none());
    assert!(frame.ts > 0);
}

#[test]
fn done_inherits_context() {
    let board_id = Uuid::new_v4();
    let req = Frame::request("action:undo", Data::new()).with_board_id(board_id);
    let done = req.done();

    assert_eq!(done.parent_id, Some(req.id));
    assert_eq!(done.board_id, Some(board_id));
    assert_eq!(done.syscall, "action:undo");
    assert_eq!(done.status, Status::Done);
    assert!(done.data.is_empty());
}

#[test]
fn seq_is_read_from_data() {
    let frame = Frame::request("board:clear", Data::new());
    assert_eq!(frame.seq(), None);
    assert_eq!(frame.with_data(FRAME_SEQ, 42u64).seq(), Some(42));
}

#[test]
fn json_round_trip() {
    let board_id = Uuid::new_v4();
    let original = Frame::request("action:redo", Data::new())
        .with_board_id(board_id)
        .with_from("alice")
        .with_data("author", "alice");

    let json = serde_json::to_string(&original).expect("serialize");
    let restored: Frame = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(restored.id, original.id);
    assert_eq!(restored.board_id, Some(board_id));
    assert_eq!(restored.syscall, "action:redo");
    assert_eq!(restored.from.as_deref(), Some("alice"));
    assert_eq!(restored.data.get("author").and_then(|v| v.as_str()), Some("alice"));
}

#[test]
fn missing_data_defaults_to_empty() {
    let json = serde_json::json!({
        "id": Uuid::new_v4(),
        "parent_id": null,
        "ts": 1,
        "from": null,
        "syscall": "board:clear",
        "status": "request",
    });
    let frame: Frame = serde_json::from_value(json).expect("deserialize");
    assert!(frame.data.is_empty());
}

#[test]
fn error_from_typed() {
    #[derive(Debug, thiserror::Error)]
    #[error("board is busy")]
    struct Busy;

    impl ErrorCode for Busy {
        fn error_code(&self) -> &'static str {
            "E_BUSY"
        }

        fn retryable(&self) -> bool {
            true
        }
    }

    let req = Frame::request("action:append", Data::new());
    let err = req.error_from(&Busy);

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.error_code(), Some("E_BUSY"));
    assert_eq!(err.error_message(), Some("board is busy"));
    assert_eq!(err.data.get(FRAME_RETRYABLE).and_then(serde_json::Value::as_bool), Some(true));
}

#[test]
fn request_has_no_error_fields() {
    let frame = Frame::request("x:y", Data::new());
    assert_eq!(frame.error_code(), None);
    assert_eq!(frame.error_message(), None);
}

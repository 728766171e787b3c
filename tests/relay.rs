//! End-to-end relay tests over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chalkboard::action::{AuthorId, FreeDrawStroke, StrokePoint};
use chalkboard::board::{BoardController, BoardHandle, spawn_board};
use chalkboard::config::Config;
use chalkboard::frame::{Data, Frame, Status};
use chalkboard::log::SnapshotPolicy;
use chalkboard::raster::{Color, Raster};
use chalkboard::routes;
use chalkboard::state::AppState;
use chalkboard::store::MemoryStore;
use chalkboard::sync::{RelayLink, SyncMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Replica = BoardController<Raster, RelayLink>;

const BOARD_QUEUE: usize = 16;

// =============================================================
// Harness
// =============================================================

async fn start() -> (SocketAddr, AppState) {
    let state = AppState::new(Arc::new(MemoryStore::new()), Config::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::app(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (addr, state)
}

async fn connect(addr: SocketAddr, board_id: Uuid, author: &str) -> Ws {
    let (mut ws, _) = connect_async(format!("ws://{addr}/api/boards/{board_id}/ws?author={author}"))
        .await
        .unwrap();
    let welcome = next_frame(&mut ws).await;
    assert_eq!(welcome.syscall, "session:connected");
    ws
}

async fn next_frame(ws: &mut Ws) -> Frame {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("websocket receive timed out")
            .expect("websocket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(ws: &mut Ws, frame: &Frame) {
    ws.send(Message::Text(serde_json::to_string(frame).unwrap().into())).await.unwrap();
}

/// Push every frame the replica published through its socket.
async fn flush(outbox: &mut mpsc::Receiver<Frame>, ws: &mut Ws) -> usize {
    let mut sent = 0;
    while let Ok(frame) = outbox.try_recv() {
        send(ws, &frame).await;
        sent += 1;
    }
    sent
}

/// Feed everything the relay sends to `board` until frame `seq` has landed.
async fn settle(ws: &mut Ws, board: &BoardHandle, seq: u64) {
    loop {
        let frame = next_frame(ws).await;
        let last = frame.status == Status::Request && frame.seq() == Some(seq);
        board.receive_frame(frame).await.unwrap();
        if last {
            return;
        }
    }
}

fn replica(board_id: Uuid, author: &str) -> (BoardHandle, JoinHandle<Replica>, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(16);
    let board = BoardController::new(board_id, AuthorId::from(author), Raster::new(40, 30), RelayLink::new(tx), SnapshotPolicy::default());
    let (handle, worker) = spawn_board(board, BOARD_QUEUE);
    (handle, worker, rx)
}

fn stroke(y: f64, color: Color) -> FreeDrawStroke {
    let mut s = FreeDrawStroke::new(2.0);
    for x in [3.0, 15.0, 35.0] {
        s.add_point(StrokePoint::new(x, y, 0.6, color));
    }
    s
}

// =============================================================
// HTTP
// =============================================================

#[tokio::test]
async fn healthz_responds_ok() {
    let (addr, _state) = start().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
}

#[tokio::test]
async fn websocket_requires_author() {
    let (addr, _state) = start().await;
    let result = connect_async(format!("ws://{addr}/api/boards/{}/ws", Uuid::new_v4())).await;
    assert!(result.is_err());
}

// =============================================================
// Sync relay
// =============================================================

#[tokio::test]
async fn welcome_reports_peers() {
    let (addr, state) = start().await;
    let board_id = Uuid::new_v4();
    let _alice = connect(addr, board_id, "alice").await;

    let (mut bob, _) = connect_async(format!("ws://{addr}/api/boards/{board_id}/ws?author=bob")).await.unwrap();
    let welcome = next_frame(&mut bob).await;
    assert_eq!(welcome.data.get("peers").and_then(serde_json::Value::as_u64), Some(1));
    assert_eq!(welcome.data.get("author").and_then(|v| v.as_str()), Some("bob"));
    assert_eq!(state.room_size(board_id).await, 2);
}

#[tokio::test]
async fn sender_gets_done_then_its_own_echo() {
    let (addr, _state) = start().await;
    let board_id = Uuid::new_v4();
    let mut alice_ws = connect(addr, board_id, "alice").await;
    let mut bob_ws = connect(addr, board_id, "bob").await;

    let frame = SyncMessage::Undo { author: AuthorId::from("alice") }.to_frame(board_id).unwrap();
    send(&mut alice_ws, &frame).await;

    let done = next_frame(&mut alice_ws).await;
    assert_eq!(done.status, Status::Done, "{done:?}");
    assert_eq!(done.parent_id, Some(frame.id));
    assert_eq!(done.seq(), Some(1));

    let echo = next_frame(&mut alice_ws).await;
    assert_eq!(echo.id, frame.id);
    assert_eq!(echo.seq(), Some(1));

    let relayed = next_frame(&mut bob_ws).await;
    assert_eq!(relayed.id, frame.id);
    assert_eq!(relayed.from.as_deref(), Some("alice"));
    assert_eq!(relayed.seq(), Some(1));
}

#[tokio::test]
async fn concurrent_replicas_converge_through_relay() {
    let (addr, _state) = start().await;
    let board_id = Uuid::new_v4();
    let mut alice_ws = connect(addr, board_id, "alice").await;
    let mut bob_ws = connect(addr, board_id, "bob").await;

    let (alice, alice_worker, mut alice_out) = replica(board_id, "alice");
    let (bob, bob_worker, mut bob_out) = replica(board_id, "bob");

    // Overlapping translucent strokes, published before either sees the other.
    let (a, b) = tokio::join!(
        alice.commit_stroke(stroke(5.0, Color::rgba(20, 20, 220, 150))),
        bob.commit_stroke(stroke(6.0, Color::rgba(220, 20, 20, 170))),
    );
    a.unwrap();
    b.unwrap();
    let (sent_a, sent_b) = tokio::join!(flush(&mut alice_out, &mut alice_ws), flush(&mut bob_out, &mut bob_ws));
    assert_eq!(sent_a + sent_b, 2);
    settle(&mut alice_ws, &alice, 2).await;
    settle(&mut bob_ws, &bob, 2).await;
    assert_eq!(alice.capture().await.unwrap(), bob.capture().await.unwrap());

    alice.undo().await.unwrap();
    flush(&mut alice_out, &mut alice_ws).await;
    settle(&mut alice_ws, &alice, 3).await;
    settle(&mut bob_ws, &bob, 3).await;
    assert_eq!(alice.capture().await.unwrap(), bob.capture().await.unwrap());

    drop((alice, bob));
    let (alice, bob) = (alice_worker.await.unwrap(), bob_worker.await.unwrap());
    let order = |board: &Replica| board.log().iter().map(|(action, undone)| (action.id, undone)).collect::<Vec<_>>();
    assert_eq!(order(&alice), order(&bob));
    assert!(alice.can_redo());
    assert_eq!(alice.last_seq(), Some(3));
}

#[tokio::test]
async fn impersonation_is_rejected_and_not_relayed() {
    let (addr, _state) = start().await;
    let board_id = Uuid::new_v4();
    let mut alice_ws = connect(addr, board_id, "alice").await;
    let mut bob_ws = connect(addr, board_id, "bob").await;

    let spoof = SyncMessage::Undo { author: AuthorId::from("bob") }.to_frame(board_id).unwrap();
    send(&mut alice_ws, &spoof).await;
    let reply = next_frame(&mut alice_ws).await;
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.error_code(), Some("E_AUTHOR_MISMATCH"));

    let nothing = timeout(Duration::from_millis(150), bob_ws.next()).await;
    assert!(nothing.is_err(), "bob should not receive a rejected frame");
}

#[tokio::test]
async fn unknown_syscall_gets_error_reply() {
    let (addr, _state) = start().await;
    let mut ws = connect(addr, Uuid::new_v4(), "alice").await;

    send(&mut ws, &Frame::request("object:create", Data::new())).await;
    let reply = next_frame(&mut ws).await;
    assert_eq!(reply.error_code(), Some("E_UNKNOWN_SYSCALL"));
}

#[tokio::test]
async fn closing_socket_leaves_room() {
    let (addr, state) = start().await;
    let board_id = Uuid::new_v4();
    let mut ws = connect(addr, board_id, "alice").await;
    assert_eq!(state.room_size(board_id).await, 1);

    ws.close(None).await.unwrap();
    let left = timeout(Duration::from_secs(2), async {
        while state.room_size(board_id).await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(left.is_ok(), "client never left the room");
}

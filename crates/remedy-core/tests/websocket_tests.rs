use std::{sync::Arc, time::Duration};

use futures_util::SinkExt;
use remedy_core::{
    stream::{StreamConsumer, StreamMessage, StreamSignal},
    DeploymentId, EngineError, EventSource, StreamEvent, WebSocketSource,
};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Message,
    },
};

/// What the server saw during the handshake.
#[derive(Debug)]
struct Handshake {
    path: String,
    authorization: Option<String>,
}

/// Accepts a single websocket connection, sends `frames` and closes.
/// The listener is dropped afterwards so reconnects are refused.
async fn serve_once(frames: Vec<String>) -> (String, oneshot::Receiver<Handshake>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let address = listener.local_addr().expect("Failed to read address");
    let (seen_tx, seen_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("Failed to accept");
        drop(listener);
        let callback = |request: &Request, response: Response| {
            let authorization = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let _ = seen_tx.send(Handshake {
                path: request.uri().path().to_string(),
                authorization,
            });
            Ok::<_, ErrorResponse>(response)
        };
        let mut socket = accept_hdr_async(stream, callback)
            .await
            .expect("Handshake failed");
        for frame in frames {
            socket
                .send(Message::Text(frame))
                .await
                .expect("Failed to send frame");
        }
        let _ = socket.close(None).await;
    });

    (format!("ws://{address}/api"), seen_rx)
}

async fn collect(mut receiver: mpsc::Receiver<StreamMessage>) -> Vec<StreamSignal> {
    let mut signals = Vec::new();
    while let Ok(Some(message)) =
        tokio::time::timeout(Duration::from_secs(5), receiver.recv()).await
    {
        signals.push(message.signal);
    }
    signals
}

#[tokio::test]
async fn test_websocket_stream_delivers_frames_then_reports_loss() {
    let (url, seen) = serve_once(vec![
        r#"{"type":"step_started","step_id":0,"start_time":"2024-05-01T10:00:00Z"}"#.to_string(),
        r#"{"type":"heartbeat"}"#.to_string(),
        r#"{"type":"output","step_id":0,"data":"pod/api-0 restarted\n"}"#.to_string(),
    ])
    .await;

    let source: Arc<dyn EventSource> = Arc::new(WebSocketSource::new(url, Some("s3cret".into())));
    let (sender, receiver) = mpsc::channel(16);
    let _consumer = StreamConsumer::spawn(
        source,
        DeploymentId::from("dep-42"),
        1,
        Duration::from_millis(10),
        sender,
    );
    let signals = collect(receiver).await;

    let handshake = seen.await.expect("Server never saw a handshake");
    assert_eq!(handshake.path, "/api/deployments/dep-42/stream");
    assert_eq!(handshake.authorization.as_deref(), Some("Bearer s3cret"));

    assert!(matches!(
        signals[0],
        StreamSignal::Event(StreamEvent::StepStarted(_))
    ));
    assert!(matches!(signals[1], StreamSignal::Event(StreamEvent::Unknown)));
    match &signals[2] {
        StreamSignal::Event(StreamEvent::Output(event)) => {
            assert_eq!(event.text(), Some("pod/api-0 restarted\n"));
        }
        other => panic!("Expected output event, got {other:?}"),
    }
    assert!(matches!(signals[3], StreamSignal::Reconnecting(_)));
    assert!(matches!(signals[4], StreamSignal::Lost(_)));
    assert_eq!(signals.len(), 5);
}

#[tokio::test]
async fn test_websocket_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let address = listener.local_addr().expect("Failed to read address");
    drop(listener);

    let source = WebSocketSource::new(format!("ws://{address}"), None);
    let result = source.connect(&DeploymentId::from("dep-1")).await;
    assert!(matches!(result, Err(EngineError::Stream { .. })));
}

//! WebSocket progress stream against a real listener.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use common::TestApp;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;

async fn serve(app: &TestApp) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn next_json<S>(stream: &mut S) -> Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn socket_confirms_answers_ping_and_streams_progress() {
    let gate = Arc::new(Semaphore::new(0));
    let app = TestApp::gated(gate.clone()).await;
    let job_id = app.create_job("harbor at night").await["id"]
        .as_str()
        .unwrap()
        .to_string();
    app.wait_for_status(&job_id, "processing").await;

    let addr = serve(&app).await;
    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/ws/jobs/{job_id}"))
            .await
            .unwrap();

    let connected = next_json(&mut socket).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["job_id"], job_id.as_str());

    socket.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(next_json(&mut socket).await["type"], "pong");

    gate.add_permits(3);

    let mut last_progress = 0.0;
    loop {
        let event = next_json(&mut socket).await;
        assert_eq!(event["job_id"], job_id.as_str());
        if let Some(progress) = event["progress"].as_f64() {
            assert!(progress >= last_progress, "progress went backwards: {event}");
            last_progress = progress;
        }
        if event["type"] == "job_complete" {
            assert!(event["output_path"].is_string());
            break;
        }
    }
    assert_eq!(last_progress, 100.0);
}

#[tokio::test]
async fn socket_for_unknown_job_is_refused() {
    let app = TestApp::new().await;
    let addr = serve(&app).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/ws/jobs/job_missing"))
        .await
        .unwrap_err();

    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), StatusCode::NOT_FOUND.as_u16());
        }
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

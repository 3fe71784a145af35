//! End to end over a real loopback socket: one side accepts, the other
//! connects, then both run a session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use duplex_chat::bootstrap;
use duplex_chat::{BootstrapError, LineSink, Session, SessionConfig, Severity, StopReason};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Lines(Mutex<Vec<(String, String, Severity)>>);

impl Lines {
    fn lines_from(&self, sender: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s, _)| s == sender)
            .map(|(m, _, _)| m.clone())
            .collect()
    }
}

impl LineSink for Lines {
    fn log(&self, message: &str, sender: &str, severity: Severity) {
        self.0
            .lock()
            .unwrap()
            .push((message.to_owned(), sender.to_owned(), severity));
    }
}

fn config(name: &str, peer_name: &str) -> SessionConfig {
    SessionConfig {
        name: name.into(),
        peer_name: peer_name.into(),
        ..SessionConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_and_client_chat_over_loopback() {
    let server_lines = Arc::new(Lines::default());
    let client_lines = Arc::new(Lines::default());

    let listener = bootstrap::bind("127.0.0.1:0", "SERVER", server_lines.as_ref())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let accepting = tokio::spawn({
        let server_lines = server_lines.clone();
        async move { bootstrap::accept(listener, "SERVER", server_lines.as_ref()).await }
    });
    let client = bootstrap::connect(&addr, "CLIENT", client_lines.as_ref())
        .await
        .unwrap();
    let server = timeout(WAIT, accepting).await.unwrap().unwrap().unwrap();

    let server = Session::with_sink(server, config("SERVER", "CLIENT"), server_lines.clone());
    let client = Session::with_sink(client, config("CLIENT", "SERVER"), client_lines.clone());

    let (server_input, server_rx) = mpsc::channel(8);
    let (client_input, client_rx) = mpsc::channel(8);

    let server_task = tokio::spawn({
        let server = server.clone();
        async move { server.start(server_rx).await }
    });
    let client_task = tokio::spawn({
        let client = client.clone();
        async move { client.start(client_rx).await }
    });

    client_input.send("hello from the client".to_owned()).await.unwrap();
    timeout(WAIT, async {
        while server_lines.lines_from("CLIENT").is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    server_input.send("hi back".to_owned()).await.unwrap();
    timeout(WAIT, async {
        while client_lines.lines_from("SERVER").is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    server_input.send("DISCONNECT".to_owned()).await.unwrap();

    let server_reason = timeout(WAIT, server_task).await.unwrap().unwrap().unwrap();
    let client_reason = timeout(WAIT, client_task).await.unwrap().unwrap().unwrap();

    assert_eq!(server_reason, StopReason::SentinelSent);
    assert_eq!(client_reason, StopReason::SentinelReceived);
    assert_eq!(server_lines.lines_from("CLIENT"), vec!["hello from the client".to_owned()]);
    assert_eq!(
        client_lines.lines_from("SERVER"),
        vec!["hi back".to_owned(), "DISCONNECT".to_owned()]
    );
    assert!(server_lines.lines_from("SERVER").contains(&"Session closed.".to_owned()));
    assert!(client_lines.lines_from("CLIENT").contains(&"Connection successful.".to_owned()));
}

#[tokio::test]
async fn connect_failure_never_produces_a_transport() {
    // Grab a free port and let it go again so nothing is listening there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let lines = Lines::default();
    let result = bootstrap::connect(&addr, "CLIENT", &lines).await;

    assert!(matches!(result, Err(BootstrapError::Connect { .. })));
    assert!(lines
        .0
        .lock()
        .unwrap()
        .iter()
        .any(|(m, _, severity)| m.starts_with("Connection failed") && *severity == Severity::Error));
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let lines = Lines::default();
    let result = bootstrap::listen("not an address", "SERVER", &lines).await;
    assert!(matches!(result, Err(BootstrapError::Bind { .. })));
}

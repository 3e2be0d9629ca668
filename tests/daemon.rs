//! Daemon round trips over a real Unix socket with a simulated chip.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pressled::protocol::{ErrorKind, Response, MAX_REQUEST_LEN};
use pressled::{Client, ClientError, ControlServer};
use pressled_core::protocol::opcode;
use pressled_core::{Driver, DriverConfig, DriverEvent, LedState};
use pressled_line::SimChip;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Daemon {
    driver: Arc<Driver>,
    stop: Arc<Notify>,
    server: JoinHandle<()>,
    socket: PathBuf,
}

impl Daemon {
    async fn start(name: &str, simulate: bool) -> (Self, SimChip) {
        let socket = std::env::temp_dir().join(format!(
            "pressled-test-{}-{}.sock",
            std::process::id(),
            name
        ));
        let chip = SimChip::new("sim0");
        let config = DriverConfig {
            debounce: Duration::from_millis(5),
            multi_press_timeout: Duration::from_millis(150),
            ..DriverConfig::default()
        };
        let driver = Arc::new(Driver::start(&chip, config).await.unwrap());

        let listener = ControlServer::bind(&socket).unwrap();
        let sim = simulate.then(|| chip.clone());
        let server = ControlServer::new(Arc::clone(&driver), sim);
        let stop = server.shutdown_handle();
        let server = tokio::spawn(server.serve(listener));

        (
            Self {
                driver,
                stop,
                server,
                socket,
            },
            chip,
        )
    }

    async fn client(&self) -> Client {
        Client::connect(&self.socket).await.unwrap()
    }

    async fn stop(self) {
        self.stop.notify_one();
        self.server.await.unwrap();
        self.driver.shutdown().await;
        let _ = std::fs::remove_file(&self.socket);
    }
}

// ── Round trips ──

#[tokio::test]
async fn list_read_write_control() {
    let (daemon, chip) = Daemon::start("rw", false).await;
    let mut client = daemon.client().await;

    assert_eq!(
        client.endpoints().await.unwrap(),
        vec!["led0", "led1", "led2", "button", "all"]
    );

    assert_eq!(client.write("led0", "1").await.unwrap(), 1);
    assert!(chip.level(17).is_high());
    assert_eq!(client.read("led0").await.unwrap(), "green_led is ON\n");

    // Same connection, same handle: end of stream
    assert_eq!(client.read("led0").await.unwrap(), "");

    // A fresh connection gets a fresh handle
    let mut other = daemon.client().await;
    assert_eq!(other.read("led0").await.unwrap(), "green_led is ON\n");

    assert_eq!(client.control("all", opcode::GET_STATUS).await.unwrap(), 1);
    assert_eq!(client.control("led0", opcode::LED_TOGGLE).await.unwrap(), 0);
    assert!(!chip.level(17).is_high());

    daemon.stop().await;
}

#[tokio::test]
async fn error_replies_carry_kind() {
    let (daemon, _chip) = Daemon::start("errors", false).await;
    let mut client = daemon.client().await;

    match client.write("led0", "x").await {
        Err(ClientError::Remote { kind, .. }) => assert_eq!(kind, ErrorKind::InvalidCommand),
        other => panic!("expected remote error, got {other:?}"),
    }
    match client.control("button", opcode::LED_ON).await {
        Err(ClientError::Remote { kind, .. }) => assert_eq!(kind, ErrorKind::UnsupportedOperation),
        other => panic!("expected remote error, got {other:?}"),
    }
    match client.read("lamp").await {
        Err(ClientError::Remote { kind, .. }) => assert_eq!(kind, ErrorKind::NoSuchEndpoint),
        other => panic!("expected remote error, got {other:?}"),
    }
    // No simulated chip behind this daemon
    match client.press(1, 0).await {
        Err(ClientError::Remote { kind, .. }) => assert_eq!(kind, ErrorKind::UnsupportedOperation),
        other => panic!("expected remote error, got {other:?}"),
    }

    // Connection still usable
    assert_eq!(client.read("led1").await.unwrap(), "white_led is OFF\n");
    daemon.stop().await;
}

#[tokio::test]
async fn malformed_line_keeps_connection() {
    let (daemon, _chip) = Daemon::start("malformed", false).await;
    let stream = UnixStream::connect(&daemon.socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"this is not json\n").await.unwrap();
    let reply: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(matches!(
        reply,
        Response::Error {
            kind: ErrorKind::TransferFault,
            ..
        }
    ));

    writer.write_all(b"{\"op\":\"list\"}\n").await.unwrap();
    let reply: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(matches!(reply, Response::Endpoints { .. }));

    daemon.stop().await;
}

#[tokio::test]
async fn invalid_utf8_line_keeps_connection() {
    let (daemon, _chip) = Daemon::start("utf8", false).await;
    let stream = UnixStream::connect(&daemon.socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(b"\xff\xfe garbage\n").await.unwrap();
    let reply: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(matches!(
        reply,
        Response::Error {
            kind: ErrorKind::TransferFault,
            ..
        }
    ));

    writer.write_all(b"{\"op\":\"list\"}\n").await.unwrap();
    let reply: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(matches!(reply, Response::Endpoints { .. }));

    daemon.stop().await;
}

#[tokio::test]
async fn oversize_line_is_rejected_and_skipped() {
    let (daemon, _chip) = Daemon::start("oversize", false).await;
    let stream = UnixStream::connect(&daemon.socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let mut huge = vec![b'a'; MAX_REQUEST_LEN * 3];
    huge.push(b'\n');
    writer.write_all(&huge).await.unwrap();
    let reply: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    match reply {
        Response::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::TransferFault);
            assert!(message.contains("longer than"), "{message}");
        }
        other => panic!("expected error reply, got {other:?}"),
    }

    // The tail of the long line is dropped, not parsed as a second request
    writer.write_all(b"{\"op\":\"list\"}\n").await.unwrap();
    let reply: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(matches!(reply, Response::Endpoints { .. }));

    daemon.stop().await;
}

#[tokio::test]
async fn short_read_reports_buffer_too_small() {
    let (daemon, _chip) = Daemon::start("short", false).await;
    let stream = UnixStream::connect(&daemon.socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(b"{\"op\":\"read\",\"endpoint\":\"button\",\"len\":4}\n")
        .await
        .unwrap();
    let reply: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(matches!(
        reply,
        Response::Error {
            kind: ErrorKind::BufferTooSmall,
            ..
        }
    ));
    daemon.stop().await;
}

// ── Simulated presses ──

#[tokio::test]
async fn press_request_drives_session() {
    let (daemon, _chip) = Daemon::start("press", true).await;
    let mut events = daemon.driver.subscribe();
    let mut client = daemon.client().await;

    client.press(3, 20).await.unwrap();

    let applied = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let DriverEvent::Applied { count, state } = events.recv().await.unwrap() {
                return (count, state);
            }
        }
    })
    .await
    .expect("no commit");
    assert_eq!(applied, (3, LedState::Slot(2)));

    let text = client.read("button").await.unwrap();
    assert_eq!(
        text,
        "Button: PRESSED\nPress Count: 0\nCurrent State: LED 2 (yellow_led) ON\n"
    );

    // Reset through the button endpoint
    client.write("button", "r").await.unwrap();
    assert_eq!(client.control("all", opcode::GET_STATUS).await.unwrap(), 0);

    daemon.stop().await;
}

#[tokio::test]
async fn press_count_over_limit_is_rejected() {
    let (daemon, chip) = Daemon::start("press-limit", true).await;
    let mut events = daemon.driver.subscribe();
    let mut client = daemon.client().await;

    let limit = u32::from(daemon.driver.config().max_presses);
    match client.press(limit + 1, 0).await {
        Err(ClientError::Remote { kind, .. }) => assert_eq!(kind, ErrorKind::InvalidCommand),
        other => panic!("expected remote error, got {other:?}"),
    }
    match client.press(u32::MAX, 1_000).await {
        Err(ClientError::Remote { kind, .. }) => assert_eq!(kind, ErrorKind::InvalidCommand),
        other => panic!("expected remote error, got {other:?}"),
    }

    // Nothing was tapped
    assert!(events.try_recv().is_err());
    assert!(!chip.level(17).is_high());
    assert_eq!(client.control("all", opcode::GET_STATUS).await.unwrap(), 0);

    daemon.stop().await;
}

#[tokio::test]
async fn stale_socket_is_replaced() {
    let path = std::env::temp_dir().join(format!("pressled-test-{}-stale.sock", std::process::id()));
    std::fs::write(&path, b"").unwrap();
    let listener = ControlServer::bind(&path).unwrap();
    drop(listener);
    let _ = std::fs::remove_file(&path);
}

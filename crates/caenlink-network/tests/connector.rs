//! Integration tests for Connector
//!
//! These tests run the connector against a mock device listening on a
//! loopback socket. They cover delivery order, loss detection, the reconnect
//! loop and explicit close.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use caenlink_network::{
    ConnectionState, Connector, ConnectorConfig, ConnectorError, ConnectorOwner,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq)]
enum Event {
    Line(String),
    Lost,
}

/// Owner that forwards every callback to the test body.
struct Recorder {
    events: mpsc::UnboundedSender<Event>,
    losses: AtomicUsize,
    delay: Duration,
}

impl Recorder {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        Self::with_delay(Duration::ZERO)
    }

    /// Recorder whose message handler takes `delay` per line.
    fn with_delay(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Self {
            events,
            losses: AtomicUsize::new(0),
            delay,
        });
        (recorder, rx)
    }

    fn losses(&self) -> usize {
        self.losses.load(Ordering::SeqCst)
    }
}

impl ConnectorOwner for Recorder {
    fn message_received(&self, line: &str) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let _ = self.events.send(Event::Line(line.to_string()));
    }

    fn connection_lost(&self) {
        self.losses.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(Event::Lost);
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(WAIT, events.recv())
        .await
        .expect("Timed out waiting for connector event")
        .expect("Event channel closed")
}

async fn bind_device() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn config(port: u16, auto_reconnect: bool) -> ConnectorConfig {
    ConnectorConfig {
        reconnect_delay: Duration::from_millis(100),
        ..ConnectorConfig::new("127.0.0.1", port, auto_reconnect)
    }
}

async fn wait_for_state(connector: &Connector, expected: ConnectionState) {
    let mut states = connector.subscribe();
    timeout(WAIT, states.wait_for(|state| *state == expected))
        .await
        .expect("Timed out waiting for connector state")
        .expect("State channel closed");
}

/// Connect, receive, lose the socket, reconnect and receive again, with the
/// default one second reconnect delay.
#[tokio::test]
async fn test_pong_then_reconnect() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.unwrap();
        first.write_all(b"PONG\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(first);

        let (mut second, _) = listener.accept().await.unwrap();
        second.write_all(b"AGAIN\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(ConnectorConfig::new("127.0.0.1", port, true));
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder.clone());

    connector.establish_connection().await.unwrap();
    assert_eq!(connector.state(), ConnectionState::Connected);

    assert_eq!(next_event(&mut events).await, Event::Line("PONG".to_string()));
    assert_eq!(next_event(&mut events).await, Event::Lost);
    assert_ne!(connector.state(), ConnectionState::Connected);

    wait_for_state(&connector, ConnectionState::Connected).await;
    assert_eq!(next_event(&mut events).await, Event::Line("AGAIN".to_string()));
    assert_eq!(recorder.losses(), 1);

    connector.shutdown().await;
}

#[tokio::test]
async fn test_lines_delivered_in_order() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut payload = String::new();
        for i in 0..200 {
            payload.push_str(&format!("TAG-{i:04}\n"));
        }
        stream.write_all(payload.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(config(port, false));
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder.clone());
    connector.establish_connection().await.unwrap();

    for i in 0..200 {
        assert_eq!(
            next_event(&mut events).await,
            Event::Line(format!("TAG-{i:04}"))
        );
    }
    assert_eq!(recorder.losses(), 0);

    connector.shutdown().await;
}

#[tokio::test]
async fn test_carriage_return_is_stripped() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"E2003412\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(config(port, false));
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder);
    connector.establish_connection().await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Event::Line("E2003412".to_string())
    );

    connector.shutdown().await;
}

#[tokio::test]
async fn test_send_reaches_device() {
    let (listener, port) = bind_device().await;

    // Echo every received line back with a prefix.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            write_half
                .write_all(format!("ECHO {line}\n").as_bytes())
                .await
                .unwrap();
        }
    });

    let connector = Connector::new(config(port, false));
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder);
    connector.establish_connection().await.unwrap();

    connector.send("PING").await.unwrap();
    connector.send("INVENTORY").await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Event::Line("ECHO PING".to_string())
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Line("ECHO INVENTORY".to_string())
    );

    connector.shutdown().await;
}

#[tokio::test]
async fn test_without_auto_reconnect_stays_disconnected() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        }
    });

    let connector = Connector::new(config(port, false));
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder.clone());
    connector.establish_connection().await.unwrap();

    assert_eq!(next_event(&mut events).await, Event::Lost);

    // Several reconnect delays pass without a new connection.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.losses(), 1);

    let result = timeout(Duration::from_millis(100), connector.send("PING"))
        .await
        .expect("send must fail fast while disconnected");
    assert!(matches!(result, Err(ConnectorError::NotConnected)));

    connector.shutdown().await;
}

#[tokio::test]
async fn test_each_break_notified_once() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        }
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"STABLE\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(config(port, true));
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder.clone());
    connector.establish_connection().await.unwrap();

    assert_eq!(next_event(&mut events).await, Event::Lost);
    assert_eq!(next_event(&mut events).await, Event::Lost);
    assert_eq!(
        next_event(&mut events).await,
        Event::Line("STABLE".to_string())
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(recorder.losses(), 2);
    assert_eq!(connector.state(), ConnectionState::Connected);

    connector.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_lines_survive_reconnect() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.unwrap();
        let mut payload = String::new();
        for i in 0..10 {
            payload.push_str(&format!("BEFORE-{i}\n"));
        }
        first.write_all(payload.as_bytes()).await.unwrap();
        drop(first);

        let (mut second, _) = listener.accept().await.unwrap();
        second.write_all(b"AFTER\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(config(port, true));
    // Slow owner so lines are still queued when the socket breaks.
    let (recorder, mut events) = Recorder::with_delay(Duration::from_millis(30));
    connector.bind(recorder.clone());
    connector.establish_connection().await.unwrap();

    let mut lines = Vec::new();
    while lines.len() < 11 {
        if let Event::Line(line) = next_event(&mut events).await {
            lines.push(line);
        }
    }

    let mut expected: Vec<String> = (0..10).map(|i| format!("BEFORE-{i}")).collect();
    expected.push("AFTER".to_string());
    assert_eq!(lines, expected);
    assert_eq!(recorder.losses(), 1);

    connector.shutdown().await;
}

#[tokio::test]
async fn test_close_twice_notifies_once() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                drop(stream);
            });
        }
    });

    let connector = Connector::new(config(port, true));
    let (recorder, _events) = Recorder::new();
    connector.bind(recorder.clone());
    connector.establish_connection().await.unwrap();

    connector.close().await.unwrap();
    assert_eq!(recorder.losses(), 1);
    connector.close().await.unwrap();

    // The close is reported like any other loss, but never reconnects.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(recorder.losses(), 1);
    assert_eq!(connector.state(), ConnectionState::Disconnected);
    assert!(matches!(
        connector.send("PING").await,
        Err(ConnectorError::NotConnected)
    ));

    connector.shutdown().await;
}

#[tokio::test]
async fn test_reestablish_after_loss() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        let (first, _) = listener.accept().await.unwrap();
        drop(first);

        let (mut second, _) = listener.accept().await.unwrap();
        second.write_all(b"BACK\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(config(port, false));
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder);
    connector.establish_connection().await.unwrap();

    assert_eq!(next_event(&mut events).await, Event::Lost);
    assert_eq!(connector.state(), ConnectionState::Disconnected);

    connector.establish_connection().await.unwrap();
    assert_eq!(connector.state(), ConnectionState::Connected);
    assert_eq!(next_event(&mut events).await, Event::Line("BACK".to_string()));

    connector.shutdown().await;
}

#[tokio::test]
async fn test_establish_twice() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(config(port, false));
    let (recorder, _events) = Recorder::new();
    connector.bind(recorder);
    connector.establish_connection().await.unwrap();

    let result = connector.establish_connection().await;
    assert!(matches!(result, Err(ConnectorError::AlreadyConnected(_))));
    assert!(connector.is_connected());

    connector.shutdown().await;
}

#[tokio::test]
async fn test_overlong_line_counts_as_loss() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"THIS LINE IS FAR TOO LONG\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(ConnectorConfig {
        max_line_length: Some(8),
        ..config(port, false)
    });
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder);
    connector.establish_connection().await.unwrap();

    assert_eq!(next_event(&mut events).await, Event::Lost);
    assert_eq!(connector.state(), ConnectionState::Disconnected);

    connector.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_final() {
    let (listener, port) = bind_device().await;

    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let connector = Connector::new(config(port, true));
    let (recorder, _events) = Recorder::new();
    connector.bind(recorder.clone());
    connector.establish_connection().await.unwrap();

    connector.shutdown().await;
    assert_eq!(connector.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.losses(), 1);

    let result = connector.establish_connection().await;
    assert!(matches!(result, Err(ConnectorError::Shutdown)));
}

/// Start a connection to a fresh device, then take the device offline
/// entirely: the accepted socket and the listener are both dropped.
async fn connect_then_go_offline(
    auto_reconnect: bool,
    reconnect_delay: Duration,
) -> (Connector, Arc<Recorder>, mpsc::UnboundedReceiver<Event>, u16) {
    let (listener, port) = bind_device().await;

    let connector = Connector::new(ConnectorConfig {
        reconnect_delay,
        ..ConnectorConfig::new("127.0.0.1", port, auto_reconnect)
    });
    let (recorder, mut events) = Recorder::new();
    connector.bind(recorder.clone());
    connector.establish_connection().await.unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    drop(listener);
    drop(stream);

    assert_eq!(next_event(&mut events).await, Event::Lost);
    (connector, recorder, events, port)
}

#[tokio::test]
async fn test_reconnect_survives_outage() {
    let (connector, recorder, mut events, port) =
        connect_then_go_offline(true, Duration::from_millis(100)).await;

    // Several attempts fail while nothing listens on the port.
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(connector.state(), ConnectionState::ReconnectPending);

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let (mut stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("Timed out waiting for reconnect")
        .unwrap();
    stream.write_all(b"RESTORED\n").await.unwrap();

    wait_for_state(&connector, ConnectionState::Connected).await;
    assert_eq!(
        next_event(&mut events).await,
        Event::Line("RESTORED".to_string())
    );
    assert_eq!(recorder.losses(), 1);

    connector.shutdown().await;
}

#[tokio::test]
async fn test_close_stops_reconnect_loop() {
    let (connector, recorder, _events, port) =
        connect_then_go_offline(true, Duration::from_millis(100)).await;
    wait_for_state(&connector, ConnectionState::ReconnectPending).await;

    connector.close().await.unwrap();
    assert_eq!(connector.state(), ConnectionState::Disconnected);

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let accepted = timeout(Duration::from_millis(500), listener.accept()).await;
    assert!(accepted.is_err(), "no reconnect attempt after close");
    assert_eq!(connector.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.losses(), 1);

    connector.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_reconnect_loop() {
    let (connector, recorder, _events, port) =
        connect_then_go_offline(true, Duration::from_millis(100)).await;
    wait_for_state(&connector, ConnectionState::ReconnectPending).await;

    timeout(WAIT, connector.shutdown())
        .await
        .expect("shutdown must not wait for the reconnect loop");
    assert_eq!(connector.state(), ConnectionState::Disconnected);

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let accepted = timeout(Duration::from_millis(500), listener.accept()).await;
    assert!(accepted.is_err(), "no reconnect attempt after shutdown");
    assert_eq!(recorder.losses(), 1);
}

#[tokio::test]
async fn test_establish_while_reconnect_pending() {
    // Long delay so the pending loop is still asleep when the owner reconnects.
    let (connector, recorder, mut events, port) =
        connect_then_go_offline(true, Duration::from_secs(1)).await;
    wait_for_state(&connector, ConnectionState::ReconnectPending).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    connector.establish_connection().await.unwrap();
    assert_eq!(connector.state(), ConnectionState::Connected);

    let (mut stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    stream.write_all(b"MANUAL\n").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Event::Line("MANUAL".to_string())
    );

    // The abandoned loop would have connected again after its delay.
    let second = timeout(Duration::from_millis(1500), listener.accept()).await;
    assert!(second.is_err(), "stale reconnect loop opened a second socket");
    assert!(connector.is_connected());
    assert_eq!(recorder.losses(), 1);

    connector.shutdown().await;
}

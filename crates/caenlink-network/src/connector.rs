//! Long-lived TCP line connector for CAEN readers.
//!
//! The [`Connector`] owns a socket to a remote reader and presents it to its
//! owner as a continuously available line channel. Received bytes are decoded
//! into lines by a reader task and handed to the owner by a dispatcher task;
//! the two are decoupled by an unbounded line queue. When the socket breaks,
//! the connector releases it, notifies the owner and, if configured to,
//! reconnects on its own.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────┐     ┌──────────────┐
//! Device ──(TCP)───> │ Reader task  │───> │  Line queue  │
//!   ^                │ (per socket) │     │  (unbounded) │
//!   │                └──────┬───────┘     └──────┬───────┘
//!   │                       │ read failure       │
//!   │                       v                    v
//!   │                ┌──────────────┐     ┌──────────────┐
//!   └────── send ─── │  Connector   │     │  Dispatcher  │───> Owner
//!                    │  lifecycle   │     │ (long-lived) │
//!                    └──────────────┘     └──────────────┘
//! ```
//!
//! The reader task is torn down and respawned for every socket, because the
//! transport handle changes. The dispatcher is spawned once and reused across
//! reconnects, because the queue and the owner do not change.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──establish_connection──> Connected
//!      ^                                     │
//!      └──────── read failure or close ──────┘
//!      │
//!      └── auto_reconnect ──> ReconnectPending ──socket open──> Connected
//! ```
//!
//! A local [`Connector::close`] ends the pending read the same way a remote
//! close does, so the owner sees one `connection_lost` per socket either way.
//! Only a loss the connector did not cause itself starts the reconnect loop.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use caenlink_network::{Connector, ConnectorConfig, ConnectorOwner};
//!
//! struct Printer;
//!
//! impl ConnectorOwner for Printer {
//!     fn message_received(&self, line: &str) {
//!         println!("device says: {line}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = Connector::new(ConnectorConfig::new("192.168.0.50", 1000, true));
//! connector.bind(Arc::new(Printer));
//! connector.establish_connection().await?;
//!
//! connector.send("PING").await?;
//!
//! connector.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Known Limitations
//!
//! The reconnect loop retries forever with a fixed delay: there is no backoff
//! and no attempt ceiling. Only [`Connector::close`], [`Connector::shutdown`]
//! or dropping the connector stops it.

use std::fmt;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::SinkExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::owner::ConnectorOwner;
use crate::queue::{QueueConsumer, QueueProducer, line_queue};
use crate::{dispatcher, reader};

/// Delay between two reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// TCP port CAEN readers listen on for raw line traffic.
pub const DEFAULT_PORT: u16 = 1000;

/// Configuration for a [`Connector`].
///
/// # Example
///
/// ```
/// use caenlink_network::ConnectorConfig;
/// use std::time::Duration;
///
/// let config = ConnectorConfig {
///     reconnect_delay: Duration::from_millis(250),
///     ..ConnectorConfig::new("10.0.0.7", 1000, true)
/// };
/// assert_eq!(config.address(), "10.0.0.7:1000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Device host name or IP address
    pub host: String,

    /// Device TCP port
    pub port: u16,

    /// Reconnect on our own after an established connection is lost
    pub auto_reconnect: bool,

    /// Fixed delay before every reconnect attempt
    pub reconnect_delay: Duration,

    /// Upper bound for a single received line, unbounded when `None`
    pub max_line_length: Option<usize>,
}

impl ConnectorConfig {
    /// Create a configuration with the default reconnect delay and no line
    /// length limit.
    pub fn new(host: impl Into<String>, port: u16, auto_reconnect: bool) -> Self {
        Self {
            host: host.into(),
            port,
            auto_reconnect,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_line_length: None,
        }
    }

    /// Device address in `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn codec(&self) -> LinesCodec {
        match self.max_line_length {
            Some(max) => LinesCodec::new_with_max_length(max),
            None => LinesCodec::new(),
        }
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT, true)
    }
}

/// Lifecycle state of a [`Connector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket. Initial state, and the state after a loss or a close.
    Disconnected,

    /// A socket is open and a reader task is consuming it.
    Connected,

    /// The socket was lost and the reconnect loop is running.
    ReconnectPending,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::ReconnectPending => write!(f, "reconnect pending"),
        }
    }
}

/// Errors returned by [`Connector`] operations.
///
/// Only the explicit calls report errors. Failures noticed by the reader task
/// are turned into the owner's `connection_lost` callback instead.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// `establish_connection` was called before an owner was bound
    #[error("No owner bound to connector")]
    NotBound,

    /// Connecting to the device or setting up the streams failed
    #[error("Failed to connect to {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: io::Error,
    },

    /// There is no writable socket
    #[error("Not connected to device")]
    NotConnected,

    /// `establish_connection` was called while a socket is open
    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    /// The connector was shut down and cannot be used again
    #[error("Connector has been shut down")]
    Shutdown,

    /// An outbound line contains a line terminator
    #[error("Outbound line contains a line terminator")]
    InvalidLine,

    /// Low-level I/O error while writing
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Line codec error while writing
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<LinesCodecError> for ConnectorError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::Io(e) => Self::Io(e),
            other => Self::Codec(other.to_string()),
        }
    }
}

/// Line-encoding output half of a connector socket.
type LineWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

/// Slot holding the owner bound to a connector.
#[derive(Default)]
pub(crate) struct OwnerSlot(RwLock<Option<Arc<dyn ConnectorOwner>>>);

impl OwnerSlot {
    pub(crate) fn get(&self) -> Option<Arc<dyn ConnectorOwner>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, owner: Arc<dyn ConnectorOwner>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(owner);
    }

    fn is_set(&self) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

/// Lifecycle fields guarded by one lock.
struct Link {
    /// Output half of the current socket
    writer: Option<LineWriter>,

    /// Reader task of the current socket, or the task running the reconnect
    /// loop after that socket broke
    reader: Option<JoinHandle<()>>,

    /// Close signal of the current socket. Also stops the reconnect loop that
    /// follows its loss. Child of the shutdown token.
    socket: Option<CancellationToken>,

    /// Dispatcher task, spawned on the first successful connect
    dispatcher: Option<JoinHandle<()>>,

    /// Consumer half of the line queue until the dispatcher takes it
    inbox: Option<QueueConsumer>,

    /// Identifies the current socket. Bumped whenever a socket is installed,
    /// lost or closed, so a reader or reconnect loop can tell whether it is
    /// still current.
    generation: u64,
}

/// State shared between the connector handle and its reader tasks.
pub(crate) struct Shared {
    config: ConnectorConfig,
    owner: Arc<OwnerSlot>,
    link: Mutex<Link>,
    queue: QueueProducer,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl Shared {
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Publish a state change. Callers hold the link lock.
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(
                address = %self.config.address(),
                from = %previous,
                to = %state,
                "connection state changed"
            );
        }
    }

    async fn open(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;

        // Lines are small discrete frames; do not let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        Ok(stream)
    }

    /// Make `stream` the current socket and spawn its reader task.
    fn install(self: &Arc<Self>, link: &mut Link, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let closed = self.shutdown.child_token();

        link.generation += 1;
        link.writer = Some(FramedWrite::new(write_half, self.config.codec()));
        link.socket = Some(closed.clone());

        let lines = FramedRead::new(read_half, self.config.codec());
        link.reader = Some(reader::spawn(
            Arc::clone(self),
            link.generation,
            lines,
            self.queue.clone(),
            closed,
        ));

        self.set_state(ConnectionState::Connected);
    }

    /// Lifecycle handler invoked by the reader task of socket `generation`
    /// when that socket fails or is closed locally through `closed`.
    ///
    /// Runs at most once per socket: a stale generation, or a socket whose
    /// output half is already released, is ignored.
    pub(crate) async fn connection_lost(
        self: Arc<Self>,
        generation: u64,
        closed: CancellationToken,
    ) {
        let (writer, expected) = {
            let mut link = self.link.lock().await;
            if link.generation != generation || link.writer.is_none() {
                debug!(generation, "ignoring failure of a socket that is no longer current");
                return;
            }

            link.generation += 1;
            self.set_state(ConnectionState::Disconnected);
            (link.writer.take(), link.generation)
        };

        // Closed by our own close() or shutdown(), not by the device.
        let local = closed.is_cancelled();
        if local {
            info!(address = %self.config.address(), "connection closed");
        } else {
            warn!(address = %self.config.address(), "connection lost");
        }

        if let Some(writer) = writer {
            release(writer).await;
        }

        if let Some(owner) = self.owner.get() {
            owner.connection_lost();
        }

        if self.config.auto_reconnect && !local {
            self.reconnect(expected, &closed).await;
        }
    }

    /// Reconnect loop: fixed delay, no backoff, no attempt cap.
    ///
    /// Leaves without installing anything if the connector was closed or
    /// re-established by its owner in the meantime.
    async fn reconnect(self: &Arc<Self>, expected: u64, closed: &CancellationToken) {
        {
            let link = self.link.lock().await;
            if link.generation != expected || closed.is_cancelled() {
                return;
            }
            self.set_state(ConnectionState::ReconnectPending);
        }

        let mut attempts: u64 = 0;
        loop {
            tokio::select! {
                _ = closed.cancelled() => {
                    self.abandon_reconnect(expected).await;
                    return;
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }

            attempts += 1;
            info!(address = %self.config.address(), attempts, "trying to reconnect");

            let attempt = tokio::select! {
                _ = closed.cancelled() => {
                    self.abandon_reconnect(expected).await;
                    return;
                }
                attempt = self.open() => attempt,
            };

            let stream = match attempt {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(attempts, error = %e, "reconnect attempt failed");
                    continue;
                }
            };

            let mut link = self.link.lock().await;
            if link.generation != expected {
                debug!("connection changed during reconnect, leaving reconnect loop");
                return;
            }
            if closed.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                debug!("reconnect loop stopped by close");
                return;
            }

            self.install(&mut link, stream);
            info!(address = %self.config.address(), attempts, "reconnected");
            return;
        }
    }

    /// Leave the reconnect loop after a close, unless a new socket took over.
    async fn abandon_reconnect(&self, expected: u64) {
        let link = self.link.lock().await;
        if link.generation == expected {
            self.set_state(ConnectionState::Disconnected);
        }
        debug!("reconnect loop stopped by close");
    }
}

/// Best-effort close of an output half. Failures are logged only.
async fn release(writer: LineWriter) {
    let mut half = writer.into_inner();
    match half.shutdown().await {
        Ok(()) => debug!("output stream closed"),
        Err(e) => warn!(error = %e, "Error closing output stream"),
    }
}

/// TCP line connector to one remote device.
///
/// The connector runs one reader task per socket and one dispatcher task for
/// its whole lifetime. Lines flow reader → queue → dispatcher → owner.
///
/// # Thread Safety
///
/// All operations take `&self` and the connector is `Send + Sync`, so it can
/// be shared behind an `Arc`. Concurrent `send` calls are not ordered with
/// respect to each other, but each line is written and flushed as a unit.
///
/// # Dropping
///
/// Dropping the connector cancels the dispatcher and any running reconnect
/// loop, and closes the socket as [`close`](Self::close) does.
pub struct Connector {
    shared: Arc<Shared>,
}

impl Connector {
    /// Create a disconnected connector.
    ///
    /// No task is spawned until [`establish_connection`](Self::establish_connection).
    ///
    /// # Example
    ///
    /// ```
    /// use caenlink_network::{ConnectionState, Connector, ConnectorConfig};
    ///
    /// let connector = Connector::new(ConnectorConfig::new("127.0.0.1", 1000, false));
    /// assert_eq!(connector.state(), ConnectionState::Disconnected);
    /// ```
    pub fn new(config: ConnectorConfig) -> Self {
        debug!(address = %config.address(), "Creating connector");

        let (queue, inbox) = line_queue();
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            shared: Arc::new(Shared {
                config,
                owner: Arc::new(OwnerSlot::default()),
                link: Mutex::new(Link {
                    writer: None,
                    reader: None,
                    socket: None,
                    dispatcher: None,
                    inbox: Some(inbox),
                    generation: 0,
                }),
                queue,
                state,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Bind the owner that receives lines and lifecycle notifications.
    ///
    /// Binding again replaces the previous owner; lines dispatched afterwards
    /// go to the new one.
    pub fn bind(&self, owner: Arc<dyn ConnectorOwner>) {
        self.shared.owner.set(owner);
    }

    /// Whether an owner has been bound.
    pub fn is_bound(&self) -> bool {
        self.shared.owner.is_set()
    }

    /// Connector configuration.
    pub fn config(&self) -> &ConnectorConfig {
        &self.shared.config
    }

    /// Device address in `host:port` form.
    pub fn address(&self) -> String {
        self.shared.config.address()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Whether a socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to lifecycle state changes.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use caenlink_network::{ConnectionState, Connector};
    /// # async fn example(connector: &Connector) {
    /// let mut states = connector.subscribe();
    /// states
    ///     .wait_for(|state| *state == ConnectionState::Connected)
    ///     .await
    ///     .ok();
    /// # }
    /// ```
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Connect to the device and start the reader and dispatcher tasks.
    ///
    /// This initial connect is never retried; the reconnect policy only
    /// applies to a connection that was established and later lost. After a
    /// loss with auto-reconnect disabled, calling this again opens a new
    /// socket and reuses the running dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No owner is bound ([`ConnectorError::NotBound`])
    /// - A socket is already open ([`ConnectorError::AlreadyConnected`])
    /// - The connector was shut down ([`ConnectorError::Shutdown`])
    /// - The connect fails ([`ConnectorError::Connection`])
    pub async fn establish_connection(&self) -> Result<(), ConnectorError> {
        if !self.shared.owner.is_set() {
            return Err(ConnectorError::NotBound);
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(ConnectorError::Shutdown);
        }

        let address = self.address();
        if self.shared.link.lock().await.writer.is_some() {
            return Err(ConnectorError::AlreadyConnected(address));
        }

        info!(address = %address, "Connecting to device");

        // The link lock is not held while connecting so that `send` keeps
        // failing fast in the meantime.
        let stream = match self.shared.open().await {
            Ok(stream) => stream,
            Err(source) => {
                error!(address = %address, error = %source, "Connection failed");
                return Err(ConnectorError::Connection { address, source });
            }
        };

        let mut link = self.shared.link.lock().await;
        if link.writer.is_some() {
            return Err(ConnectorError::AlreadyConnected(address));
        }

        // Stop a reconnect loop left over from an earlier loss before it opens
        // a second socket to the device.
        if let Some(stale) = link.socket.take() {
            stale.cancel();
        }

        if link.dispatcher.is_none()
            && let Some(inbox) = link.inbox.take()
        {
            link.dispatcher = Some(dispatcher::spawn(
                Arc::clone(&self.shared.owner),
                inbox,
                self.shared.shutdown_token(),
            ));
        }

        self.shared.install(&mut link, stream);
        info!(address = %address, "Connection established");

        Ok(())
    }

    /// Send one line to the device.
    ///
    /// The line is written with a `\n` terminator and flushed before this
    /// returns, so the device sees it as a discrete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The line contains `\n` or `\r` ([`ConnectorError::InvalidLine`])
    /// - No socket is open ([`ConnectorError::NotConnected`]); this never waits
    ///   for a reconnect
    /// - Writing or flushing fails
    pub async fn send(&self, line: &str) -> Result<(), ConnectorError> {
        if line.contains(|c| c == '\n' || c == '\r') {
            return Err(ConnectorError::InvalidLine);
        }

        let mut link = self.shared.link.lock().await;
        let writer = link.writer.as_mut().ok_or(ConnectorError::NotConnected)?;

        trace!(address = %self.shared.config.address(), %line, "Sending line");

        writer.send(line).await.map_err(|e| {
            warn!(error = %e, "Failed to send line");
            ConnectorError::from(e)
        })
    }

    /// Close the current socket.
    ///
    /// Ends the pending read of the reader task, which then takes the same
    /// path as any other read failure: the output stream is closed and the
    /// owner's `connection_lost` is called once. A locally closed socket is
    /// never reconnected, and a reconnect loop that is already running stops.
    /// The dispatcher keeps running, so a later
    /// [`establish_connection`](Self::establish_connection) works.
    ///
    /// Returns once the reader task has finished. Calling it again is a no-op.
    /// Close failures are logged and never returned; the `Result` is kept for
    /// API symmetry.
    pub async fn close(&self) -> Result<(), ConnectorError> {
        let (socket, reader, generation) = {
            let mut link = self.shared.link.lock().await;
            (link.socket.take(), link.reader.take(), link.generation)
        };

        let Some(socket) = socket else {
            return Ok(());
        };

        debug!(address = %self.address(), "Closing connection");
        socket.cancel();

        if let Some(reader) = reader
            && let Err(e) = reader.await
        {
            warn!(error = %e, "Reader task ended abnormally");
        }

        // The reader leaves without loss handling only when the dispatcher is
        // gone; release what it left behind.
        let writer = {
            let mut link = self.shared.link.lock().await;
            if link.generation == generation && link.writer.is_some() {
                self.shared.set_state(ConnectionState::Disconnected);
                link.writer.take()
            } else {
                None
            }
        };
        if let Some(writer) = writer {
            release(writer).await;
        }

        Ok(())
    }

    /// Close the socket and stop the dispatcher for good.
    ///
    /// Like [`close`](Self::close), the owner is told once if a socket was
    /// open. Waits for the dispatcher to finish the line it may be
    /// delivering. Lines still queued are dropped.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        // close() never fails.
        let _ = self.close().await;

        let dispatcher = self.shared.link.lock().await.dispatcher.take();
        if let Some(dispatcher) = dispatcher
            && let Err(e) = dispatcher.await
        {
            warn!(error = %e, "Dispatcher task ended abnormally");
        }

        debug!(address = %self.address(), "Connector shut down");
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.shared.config.address())
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("address", &self.shared.config.address())
            .field("state", &self.state())
            .field("auto_reconnect", &self.shared.config.auto_reconnect)
            .finish()
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if !self.shared.shutdown.is_cancelled() {
            debug!(address = %self.shared.config.address(), "Connector dropped, stopping tasks");
            self.shared.shutdown.cancel();
        }
    }
}

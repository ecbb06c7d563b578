//! Owner capability bound to a connector.

/// Receiver of the lines and lifecycle events produced by a [`Connector`].
///
/// An owner is handed to the connector with [`Connector::bind`] before the
/// first [`Connector::establish_connection`]. The connector keeps it as an
/// `Arc<dyn ConnectorOwner>`, so an owner must not hold the connector itself.
///
/// Both callbacks run on the connector's background tasks. They should return
/// quickly; a slow `message_received` delays delivery of every later line.
///
/// [`Connector`]: crate::Connector
/// [`Connector::bind`]: crate::Connector::bind
/// [`Connector::establish_connection`]: crate::Connector::establish_connection
pub trait ConnectorOwner: Send + Sync {
    /// Called by the dispatcher task once per received line, in arrival order.
    ///
    /// The line terminator has already been stripped.
    fn message_received(&self, line: &str);

    /// Called once per broken socket, after the connector has released it and
    /// before any reconnect attempt starts.
    ///
    /// Owners use this to drop any session state tied to the old connection.
    fn connection_lost(&self) {}
}

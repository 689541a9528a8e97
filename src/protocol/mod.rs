/// Device-protocol collaborator interfaces
///
/// The PLC runtime never speaks the wire protocol itself. It drives an
/// external client through the traits in this module: a [`DeviceClient`]
/// creates [`Connection`]s, each connection reports its lifecycle through a
/// [`ConnectionEvent`] channel, and an [`AddressGroup`] bound to a connection
/// performs the batched reads.
use anyhow::Result;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

pub mod simulated;
pub mod value;

pub use value::{values_equal, PlcValue, Scalar, ValueMap};

/// Lifecycle notifications emitted by a connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The connect attempt succeeded.
    Connected,
    /// The link went down, either after a failed attempt or a lost session.
    Closed,
    /// A transport fault (including operation timeouts).
    Error(anyhow::Error),
}

/// Options handed to the device client when a connection is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Operation timeout: the cycle time in effect at connect time, never
    /// shorter than the minimum cycle time.
    pub timeout: Duration,
}

/// Maps a variable name to its device-native address.
pub type TranslationFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Factory for device connections.
pub trait DeviceClient: Send + Sync {
    /// Create a connection object for `port`.
    ///
    /// The connection must report its lifecycle on `events`. Creating the
    /// object does not start the attempt; see [`Connection::connect`].
    fn create(
        &self,
        port: &str,
        options: ConnectOptions,
        events: flume::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send + Sync {
    /// Start the connect attempt. The outcome arrives as a [`ConnectionEvent`].
    fn connect(&self);

    /// Close the link, resolving once the transport confirms it.
    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Create an empty address group bound to this connection.
    fn address_group(&self) -> Box<dyn AddressGroup>;
}

#[async_trait]
pub trait AddressGroup: Send + Sync {
    fn set_translation(&mut self, translate: TranslationFn);

    fn add_items(&mut self, keys: &[String]);

    /// Read every registered item in a single request.
    async fn read_all_items(&self) -> Result<ValueMap>;
}

pub mod control;
pub mod forward;

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    core::{
        runtime::{Command, PlcRuntime, RuntimeConfig},
        CycleSchedule, EventBus, PlcError, PlcEvent, Status, StatusSignal,
    },
    protocol::{DeviceClient, PlcValue},
};

pub use control::{ControlFunction, ControlMessage, Controller};
pub use forward::{ForwardMode, ForwardOptions, OutputMessage, ValueForwarder};

/// Default cycle time in milliseconds.
pub const DEFAULT_CYCLE_TIME_MS: u64 = 1000;

/// Builder for a polled PLC.
///
/// # Example
///
/// ```no_run
/// use s5link::{PlcBuilder, SimulatedClient};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), s5link::PlcError> {
/// let plc = PlcBuilder::new()
///     .with_port("/dev/ttyUSB0")
///     .with_cycle_time(2000)
///     .add_variable("level", "DB1,W0")
///     .add_variable("pump", "A4.0")
///     .build(Arc::new(SimulatedClient::new()));
///
/// let events = plc.subscribe();
/// while let Ok(event) = events.recv_async().await {
///     println!("{event:?}");
/// }
/// plc.close().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PlcBuilder {
    port: Option<String>,
    cycle_time_ms: u64,
    variables: BTreeMap<String, String>,
}

impl PlcBuilder {
    pub fn new() -> Self {
        Self {
            port: None,
            cycle_time_ms: DEFAULT_CYCLE_TIME_MS,
            variables: BTreeMap::new(),
        }
    }

    /// Set the serial port the device client should open.
    pub fn with_port(mut self, port: &str) -> Self {
        self.port = Some(port.to_string());
        self
    }

    /// Set the initial cycle time in milliseconds.
    ///
    /// It is also the operation timeout of the first connection. Values
    /// below the minimum are raised when polling starts.
    pub fn with_cycle_time(mut self, cycle_time_ms: u64) -> Self {
        self.cycle_time_ms = cycle_time_ms;
        self
    }

    /// Map a variable name to a device address.
    ///
    /// Entries with an empty name or address are skipped.
    pub fn add_variable(mut self, name: &str, address: &str) -> Self {
        if name.is_empty() || address.is_empty() {
            log::debug!("Skipping incomplete variable entry ({name:?} -> {address:?})");
            return self;
        }
        self.variables.insert(name.to_string(), address.to_string());
        self
    }

    pub fn with_variables<'a>(self, entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        entries
            .into_iter()
            .fold(self, |builder, (name, address)| builder.add_variable(name, address))
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Start the runtime on the current tokio runtime.
    ///
    /// The first connect attempt begins immediately. A missing port is
    /// reported when that attempt runs, leaving the status `offline`.
    pub fn build(self, client: Arc<dyn DeviceClient>) -> Plc {
        let bus = Arc::new(EventBus::new());
        let status = Arc::new(StatusSignal::new(Arc::clone(&bus)));
        let (commands_tx, commands_rx) = flume::unbounded();

        let runtime = PlcRuntime::new(
            client,
            RuntimeConfig {
                port: self.port,
                cycle_time_ms: self.cycle_time_ms,
                variables: self.variables,
            },
            Arc::clone(&bus),
            Arc::clone(&status),
        );
        let handle = tokio::spawn(runtime.run(commands_rx));

        Plc {
            commands: commands_tx,
            bus,
            status,
            handle,
        }
    }
}

impl Default for PlcBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running PLC runtime.
///
/// Dropping the handle shuts the runtime down; [`Plc::close`] does the
/// same and waits for the connection to close.
pub struct Plc {
    commands: flume::Sender<Command>,
    bus: Arc<EventBus>,
    status: Arc<StatusSignal>,
    handle: tokio::task::JoinHandle<()>,
}

impl Plc {
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Subscribe to every [`PlcEvent`] published from now on.
    pub fn subscribe(&self) -> flume::Receiver<PlcEvent> {
        self.bus.subscribe()
    }

    /// Subscribe to changes of a single variable.
    pub fn subscribe_key(&self, key: &str) -> flume::Receiver<PlcValue> {
        self.bus.subscribe_key(key)
    }

    /// Request an immediate cycle.
    ///
    /// While a read is outstanding the request is coalesced into a single
    /// follow-up read.
    pub fn trigger_cycle(&self) -> Result<(), PlcError> {
        self.commands
            .send(Command::Trigger)
            .map_err(|_| PlcError::Closed)
    }

    /// Change the cycle time.
    ///
    /// `interval` is parsed as a leading integer of milliseconds. The active
    /// timer is cleared even when the request is rejected.
    pub async fn set_cycle_time(&self, interval: &str) -> Result<CycleSchedule, PlcError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SetCycleTime {
                interval: interval.to_string(),
                reply,
            })
            .map_err(|_| PlcError::Closed)?;
        response.await.map_err(|_| PlcError::Closed)?
    }

    /// Stop polling and reconnecting, and wait until the connection is closed.
    pub async fn close(self) -> Result<(), PlcError> {
        let (done, closed) = oneshot::channel();
        self.commands
            .send(Command::Close { done })
            .map_err(|_| PlcError::Closed)?;
        closed.await.map_err(|_| PlcError::Closed)?;
        if let Err(err) = self.handle.await {
            log::warn!("PLC runtime task ended abnormally: {err}");
        }
        Ok(())
    }
}

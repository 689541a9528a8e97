/// PLC runtime task
///
/// One task owns the device connection, its address group, the cycle
/// timer, the reconnect timer and the value cache. Everything else talks to
/// it through [`Command`]s, so no state is ever touched from two places.
///
/// Connection lifecycle:
/// `disconnected -> connecting -> connected -> disconnected -> connecting ...`
/// until a close request moves it into the terminal closing state.
use anyhow::Result;
use std::{collections::BTreeMap, pin::Pin, sync::Arc, time::Duration};
use tokio::time::Sleep;

use super::{
    bus::EventBus,
    engine::ChangeDetector,
    error::PlcError,
    scheduler::{CycleSchedule, CycleState, CycleTimer},
    status::{Status, StatusSignal},
};
use crate::protocol::{
    AddressGroup, ConnectOptions, Connection, ConnectionEvent, DeviceClient, TranslationFn,
    ValueMap,
};

/// Delay before reconnecting after the link was lost.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Requests accepted by the runtime task.
pub enum Command {
    /// Run a cycle now, or once more after the current one.
    Trigger,
    /// Change the cycle time; the reply carries the resolved schedule.
    SetCycleTime {
        interval: String,
        reply: oneshot::Sender<Result<CycleSchedule, PlcError>>,
    },
    /// Shut down; `done` fires once the connection is closed.
    Close { done: oneshot::Sender<()> },
}

/// Static settings for one runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub port: Option<String>,
    pub cycle_time_ms: u64,
    /// Variable name to device address.
    pub variables: BTreeMap<String, String>,
}

struct ReadOutcome {
    generation: u64,
    result: Result<ValueMap>,
}

pub struct PlcRuntime {
    client: Arc<dyn DeviceClient>,
    port: Option<String>,
    variables: Arc<BTreeMap<String, String>>,
    status: Arc<StatusSignal>,
    detector: ChangeDetector,

    connection: Option<Arc<dyn Connection>>,
    events: Option<flume::Receiver<ConnectionEvent>>,
    group: Option<Arc<dyn AddressGroup>>,
    connected: bool,
    closing: bool,
    // bumped whenever the connection changes so late reads can be discarded
    generation: u64,

    cycle: CycleState,
    timer: CycleTimer,
    reconnect: Option<Pin<Box<Sleep>>>,

    reads_tx: flume::Sender<ReadOutcome>,
    reads_rx: flume::Receiver<ReadOutcome>,
}

impl PlcRuntime {
    pub fn new(
        client: Arc<dyn DeviceClient>,
        config: RuntimeConfig,
        bus: Arc<EventBus>,
        status: Arc<StatusSignal>,
    ) -> Self {
        let (reads_tx, reads_rx) = flume::unbounded();
        Self {
            client,
            port: config.port,
            variables: Arc::new(config.variables),
            detector: ChangeDetector::new(bus, Arc::clone(&status)),
            status,
            connection: None,
            events: None,
            group: None,
            connected: false,
            closing: false,
            generation: 0,
            cycle: CycleState::default(),
            timer: CycleTimer::new(config.cycle_time_ms),
            reconnect: None,
            reads_tx,
            reads_rx,
        }
    }

    fn port_label(&self) -> &str {
        self.port.as_deref().unwrap_or("<unset>")
    }

    /// Run until a close request arrives or the handle is dropped.
    pub async fn run(mut self, commands: flume::Receiver<Command>) {
        self.status.set(Status::Offline);
        self.connect().await;

        loop {
            tokio::select! {
                command = commands.recv_async() => match command {
                    Ok(Command::Trigger) => self.trigger_cycle(),
                    Ok(Command::SetCycleTime { interval, reply }) => {
                        let _ = reply.send(self.update_cycle_time(&interval));
                    }
                    Ok(Command::Close { done }) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    Err(_) => {
                        log::debug!("PLC handle dropped, shutting down");
                        self.shutdown().await;
                        return;
                    }
                },
                event = next_event(self.events.as_ref()) => match event {
                    Some(event) => self.handle_connection_event(event),
                    None => {
                        // the connection dropped its sender without saying goodbye
                        self.events = None;
                        self.handle_connection_event(ConnectionEvent::Closed);
                    }
                },
                outcome = self.reads_rx.recv_async() => {
                    if let Ok(outcome) = outcome {
                        self.handle_read(outcome);
                    }
                }
                _ = self.timer.tick() => self.trigger_cycle(),
                _ = expire(self.reconnect.as_mut()) => {
                    self.reconnect = None;
                    log::info!("Reconnecting to {}", self.port_label());
                    self.connect().await;
                }
            }
        }
    }

    async fn connect(&mut self) {
        if self.connection.is_some() {
            self.disconnect().await;
        }

        let Some(port) = self.port.clone() else {
            self.status.set(Status::Offline);
            log::error!("Cannot connect: {}", PlcError::MissingPort);
            return;
        };

        self.status.set(Status::Connecting);

        let (events_tx, events_rx) = flume::unbounded();
        let options = ConnectOptions {
            timeout: self.timer.operation_timeout(),
        };
        let connection = match self.client.create(&port, options, events_tx) {
            Ok(connection) => connection,
            Err(err) => {
                self.status.set(Status::Offline);
                log::error!("Failed to create connection on {port}: {err:#}");
                self.on_close();
                return;
            }
        };

        log::info!("Connecting to {port}");
        self.events = Some(events_rx);
        self.connection = Some(Arc::clone(&connection));
        connection.connect();
    }

    /// Tear down the current connection. Safe to call repeatedly.
    async fn disconnect(&mut self) {
        self.timer.clear();
        self.status.set(Status::Offline);
        self.connected = false;
        self.group = None;
        self.generation += 1;

        if let Some(events) = self.events.take() {
            retire_events(events, self.port_label().to_string());
        }
        if let Some(connection) = self.connection.take() {
            if !connection.is_closed() {
                if let Err(err) = connection.close().await {
                    log::warn!("Error while closing {}: {err:#}", self.port_label());
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        log::info!("Closing PLC on {}", self.port_label());
        self.closing = true;
        self.status.set(Status::Offline);
        self.timer.clear();
        self.reconnect = None;
        self.disconnect().await;
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.on_connect(),
            ConnectionEvent::Closed => self.on_close(),
            ConnectionEvent::Error(err) => {
                self.status.set(Status::Offline);
                log::error!("Transport error on {}: {err:#}", self.port_label());
            }
        }
    }

    fn on_connect(&mut self) {
        let Some(connection) = self.connection.clone() else {
            return;
        };

        self.reconnect = None;
        self.cycle.reset();
        self.generation += 1;
        self.connected = true;
        self.status.set(Status::Online);
        log::info!("Connected to {}", self.port_label());

        let mut group = connection.address_group();
        let variables = Arc::clone(&self.variables);
        let translate: TranslationFn = Arc::new(move |key: &str| variables.get(key).cloned());
        group.set_translation(translate);

        let keys: Vec<String> = self.variables.keys().cloned().collect();
        if keys.is_empty() {
            log::warn!("No variables configured, nothing to poll");
            self.group = Some(Arc::from(group));
            return;
        }
        group.add_items(&keys);
        self.group = Some(Arc::from(group));

        match self.timer.restart() {
            Ok(CycleSchedule::Every(millis)) => {
                log::debug!("Polling {} variable(s) every {millis}ms", keys.len())
            }
            Ok(CycleSchedule::Disabled) => log::debug!("Periodic polling disabled"),
            Err(err) => log::error!("{err}"),
        }
    }

    fn on_close(&mut self) {
        self.connected = false;
        self.group = None;
        self.generation += 1;
        self.timer.clear();
        self.status.set(Status::Offline);

        if self.closing {
            return;
        }
        if self.reconnect.is_none() {
            log::info!(
                "Connection to {} lost, retrying in {}ms",
                self.port_label(),
                RECONNECT_DELAY.as_millis()
            );
            self.reconnect = Some(Box::pin(tokio::time::sleep(RECONNECT_DELAY)));
        }
    }

    fn update_cycle_time(&mut self, interval: &str) -> Result<CycleSchedule, PlcError> {
        self.timer.clear();
        let schedule = CycleSchedule::parse(interval).inspect_err(|err| log::error!("{err}"))?;
        self.timer.apply(schedule);
        Ok(schedule)
    }

    fn trigger_cycle(&mut self) {
        if self.cycle.request(self.connected) {
            self.start_read();
        } else if !self.connected {
            log::debug!("Cycle requested while disconnected");
        }
    }

    fn start_read(&mut self) {
        let Some(group) = self.group.clone() else {
            self.cycle.fail();
            return;
        };
        let generation = self.generation;
        let reads = self.reads_tx.clone();
        tokio::spawn(async move {
            let result = group.read_all_items().await;
            let _ = reads.send(ReadOutcome { generation, result });
        });
    }

    fn handle_read(&mut self, outcome: ReadOutcome) {
        if outcome.generation != self.generation {
            log::debug!("Discarding read result from a retired connection");
            return;
        }
        match outcome.result {
            Ok(values) => {
                if self.cycle.complete(self.connected) {
                    self.start_read();
                }
                self.detector.publish_cycle(values);
            }
            Err(err) => {
                self.cycle.fail();
                log::error!("Cycle read on {} failed: {err:#}", self.port_label());
            }
        }
    }
}

async fn next_event(events: Option<&flume::Receiver<ConnectionEvent>>) -> Option<ConnectionEvent> {
    match events {
        Some(events) => events.recv_async().await.ok(),
        None => std::future::pending().await,
    }
}

async fn expire(timer: Option<&mut Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.await,
        None => std::future::pending().await,
    }
}

/// Keep draining a retired connection so late errors are logged, not lost.
fn retire_events(events: flume::Receiver<ConnectionEvent>, port: String) {
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            match event {
                ConnectionEvent::Error(err) => {
                    log::warn!("Ignoring error from retired connection on {port}: {err:#}")
                }
                other => log::debug!("Ignoring {other:?} from retired connection on {port}"),
            }
        }
    });
}

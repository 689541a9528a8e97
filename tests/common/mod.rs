#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use s5link::{
    protocol::{
        AddressGroup, ConnectOptions, Connection, ConnectionEvent, DeviceClient, TranslationFn,
    },
    PlcEvent, PlcValue, Status, ValueMap,
};

/// Scripted device client.
///
/// Every read blocks until the test queues a response with
/// [`MockClient::respond`] (or [`MockConnection::respond`] for a specific
/// connection), so the test decides when a cycle completes.
#[derive(Clone)]
pub struct MockClient {
    state: Arc<MockState>,
}

struct MockState {
    auto_connect: bool,
    fail_create: AtomicBool,
    creates: AtomicUsize,
    reads: AtomicUsize,
    closes: AtomicUsize,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    options: Mutex<Vec<ConnectOptions>>,
    registered: Mutex<Vec<String>>,
    translation: Mutex<Option<TranslationFn>>,
}

impl MockClient {
    /// A client whose connections report `Connected` as soon as asked.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// A client whose connections never answer on their own.
    pub fn silent() -> Self {
        Self::build(false)
    }

    fn build(auto_connect: bool) -> Self {
        Self {
            state: Arc::new(MockState {
                auto_connect,
                fail_create: AtomicBool::new(false),
                creates: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                connections: Mutex::new(Vec::new()),
                options: Mutex::new(Vec::new()),
                registered: Mutex::new(Vec::new()),
                translation: Mutex::new(None),
            }),
        }
    }

    pub fn shared(&self) -> Arc<dyn DeviceClient> {
        Arc::new(self.clone())
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.state.creates.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> Vec<ConnectOptions> {
        self.state.options.lock().clone()
    }

    pub fn registered(&self) -> Vec<String> {
        self.state.registered.lock().clone()
    }

    pub fn translate(&self, key: &str) -> Option<String> {
        self.state
            .translation
            .lock()
            .as_ref()
            .and_then(|translate| translate(key))
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        Arc::clone(&self.state.connections.lock()[index])
    }

    pub fn last_connection(&self) -> Arc<MockConnection> {
        let connections = self.state.connections.lock();
        Arc::clone(connections.last().expect("no connection created yet"))
    }

    /// Answer the next read on the most recent connection.
    pub fn respond(&self, result: Result<ValueMap>) {
        self.last_connection().respond(result);
    }

    pub fn respond_values(&self, pairs: &[(&str, f64)]) {
        self.respond(Ok(values(pairs)));
    }

    pub fn respond_error(&self, message: &str) {
        self.respond(Err(anyhow!(message.to_string())));
    }
}

impl DeviceClient for MockClient {
    fn create(
        &self,
        port: &str,
        options: ConnectOptions,
        events: flume::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn Connection>> {
        self.state.creates.fetch_add(1, Ordering::SeqCst);
        self.state.options.lock().push(options);
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("cannot open {port}"));
        }
        let (responses_tx, responses_rx) = flume::unbounded();
        let connection = Arc::new(MockConnection {
            client: self.clone(),
            events,
            closed: AtomicBool::new(false),
            responses_tx,
            responses_rx,
        });
        self.state.connections.lock().push(Arc::clone(&connection));
        Ok(connection)
    }
}

pub struct MockConnection {
    client: MockClient,
    events: flume::Sender<ConnectionEvent>,
    closed: AtomicBool,
    responses_tx: flume::Sender<Result<ValueMap>>,
    responses_rx: flume::Receiver<Result<ValueMap>>,
}

impl MockConnection {
    /// Answer the next read issued through this connection.
    pub fn respond(&self, result: Result<ValueMap>) {
        self.responses_tx
            .send(result)
            .expect("response channel is open");
    }

    pub fn respond_values(&self, pairs: &[(&str, f64)]) {
        self.respond(Ok(values(pairs)));
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    /// Simulate the transport dropping the link.
    pub fn drop_link(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.emit(ConnectionEvent::Closed);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn connect(&self) {
        if self.client.state.auto_connect {
            self.emit(ConnectionEvent::Connected);
        }
    }

    async fn close(&self) -> Result<()> {
        self.client.state.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.emit(ConnectionEvent::Closed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn address_group(&self) -> Box<dyn AddressGroup> {
        Box::new(MockGroup {
            client: self.client.clone(),
            responses: self.responses_rx.clone(),
        })
    }
}

struct MockGroup {
    client: MockClient,
    responses: flume::Receiver<Result<ValueMap>>,
}

#[async_trait]
impl AddressGroup for MockGroup {
    fn set_translation(&mut self, translate: TranslationFn) {
        *self.client.state.translation.lock() = Some(translate);
    }

    fn add_items(&mut self, keys: &[String]) {
        self.client
            .state
            .registered
            .lock()
            .extend(keys.iter().cloned());
    }

    async fn read_all_items(&self) -> Result<ValueMap> {
        self.client.state.reads.fetch_add(1, Ordering::SeqCst);
        self.responses
            .recv_async()
            .await
            .map_err(|_| anyhow!("mock client dropped"))?
    }
}

pub fn values(pairs: &[(&str, f64)]) -> ValueMap {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), PlcValue::from(*value)))
        .collect()
}

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Wait for the next status transition.
pub async fn next_status(events: &flume::Receiver<PlcEvent>) -> Status {
    loop {
        match events.recv_async().await {
            Ok(PlcEvent::StatusChanged(status)) => return status,
            Ok(_) => continue,
            Err(_) => panic!("event bus closed while waiting for a status"),
        }
    }
}

/// Wait for the next non-status event.
pub async fn next_data_event(events: &flume::Receiver<PlcEvent>) -> PlcEvent {
    loop {
        match events.recv_async().await {
            Ok(PlcEvent::StatusChanged(_)) => continue,
            Ok(event) => return event,
            Err(_) => panic!("event bus closed while waiting for data"),
        }
    }
}

/// Non-status events already published, without waiting.
pub fn drain_data_events(events: &flume::Receiver<PlcEvent>) -> Vec<PlcEvent> {
    events
        .try_iter()
        .filter(|event| !matches!(event, PlcEvent::StatusChanged(_)))
        .collect()
}

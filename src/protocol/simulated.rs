//! In-process stand-in for a serial controller
//!
//! Lets the daemon (and manual testing) exercise the full connect, poll and
//! reconnect cycle without hardware attached. Bit addresses (containing a
//! `.`, e.g. `E0.3`) produce booleans, everything else produces integers.
//! Each read nudges a few values so change detection has something to do.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use super::{
    AddressGroup, ConnectOptions, Connection, ConnectionEvent, DeviceClient, PlcValue,
    TranslationFn, ValueMap,
};

/// Probability that a polled item changes between two reads.
const CHANGE_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct SimulatedClient {
    connect_delay: Duration,
    read_latency: Duration,
}

impl SimulatedClient {
    pub fn new() -> Self {
        Self {
            connect_delay: Duration::from_millis(200),
            read_latency: Duration::from_millis(50),
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Reads slower than the connection timeout fail with a timeout error.
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }
}

impl Default for SimulatedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClient for SimulatedClient {
    fn create(
        &self,
        port: &str,
        options: ConnectOptions,
        events: flume::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn Connection>> {
        log::debug!(
            "Creating simulated connection on {port} (timeout {:?})",
            options.timeout
        );
        Ok(Arc::new(SimulatedConnection {
            port: port.to_string(),
            options,
            connect_delay: self.connect_delay,
            read_latency: self.read_latency,
            events,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct SimulatedConnection {
    port: String,
    options: ConnectOptions,
    connect_delay: Duration,
    read_latency: Duration,
    events: flume::Sender<ConnectionEvent>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for SimulatedConnection {
    fn connect(&self) {
        let events = self.events.clone();
        let closed = Arc::clone(&self.closed);
        let delay = self.connect_delay;
        let port = self.port.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if closed.load(Ordering::SeqCst) {
                return;
            }
            log::debug!("Simulated controller on {port} answered");
            let _ = events.send(ConnectionEvent::Connected);
        });
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(ConnectionEvent::Closed);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn address_group(&self) -> Box<dyn AddressGroup> {
        Box::new(SimulatedGroup {
            keys: Vec::new(),
            translate: None,
            latency: self.read_latency,
            timeout: self.options.timeout,
            closed: Arc::clone(&self.closed),
            state: Mutex::new(HashMap::new()),
        })
    }
}

struct SimulatedGroup {
    keys: Vec<String>,
    translate: Option<TranslationFn>,
    latency: Duration,
    timeout: Duration,
    closed: Arc<AtomicBool>,
    state: Mutex<HashMap<String, PlcValue>>,
}

impl SimulatedGroup {
    fn next_value(address: &str, previous: Option<&PlcValue>) -> PlcValue {
        let mut rng = rand::rng();
        let change = rng.random_bool(CHANGE_PROBABILITY);
        match previous {
            Some(PlcValue::Bool(v)) if change => PlcValue::Bool(!v),
            Some(PlcValue::Number(v)) if change => {
                PlcValue::Number(v + f64::from(rng.random_range(-3i32..=3)))
            }
            Some(value) => value.clone(),
            None if address.contains('.') => PlcValue::Bool(rng.random_bool(0.5)),
            None => PlcValue::Number(f64::from(rng.random_range(0i32..100))),
        }
    }
}

#[async_trait]
impl AddressGroup for SimulatedGroup {
    fn set_translation(&mut self, translate: TranslationFn) {
        self.translate = Some(translate);
    }

    fn add_items(&mut self, keys: &[String]) {
        self.keys.extend(keys.iter().cloned());
    }

    async fn read_all_items(&self) -> Result<ValueMap> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(anyhow!("Connection is closed"));
        }
        if self.latency > self.timeout {
            tokio::time::sleep(self.timeout).await;
            return Err(anyhow!("Read timed out after {:?}", self.timeout));
        }
        tokio::time::sleep(self.latency).await;

        let mut state = self.state.lock();
        let mut values = ValueMap::new();
        for key in &self.keys {
            let Some(address) = self.translate.as_ref().and_then(|t| t(key)) else {
                values.insert(key.clone(), PlcValue::Null);
                continue;
            };
            let value = Self::next_value(&address, state.get(key));
            state.insert(key.clone(), value.clone());
            values.insert(key.clone(), value);
        }
        Ok(values)
    }
}

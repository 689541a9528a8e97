/// Value forwarding consumer
///
/// Turns PLC events into topic/payload messages for a downstream sink. The
/// mode decides how a cycle is split into messages; `diff` switches from
/// "every cycle" sources to "only on change" sources.
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};

use super::Plc;
use crate::core::{PlcEvent, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ForwardKind {
    /// One message carrying the whole value map.
    All,
    /// One message per variable, topic set to the variable name.
    AllSplit,
    /// One message for a single variable.
    Single,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ForwardMode {
    #[default]
    All,
    AllSplit,
    Single(String),
}

impl ForwardMode {
    /// Build a mode from its name plus the variable used by `single`.
    pub fn from_parts(kind: &str, variable: Option<&str>) -> anyhow::Result<Self> {
        let kind = ForwardKind::from_str(kind)
            .map_err(|_| anyhow::anyhow!("Unknown forward mode {kind:?}"))?;
        Ok(match kind {
            ForwardKind::All => Self::All,
            ForwardKind::AllSplit => Self::AllSplit,
            ForwardKind::Single => Self::Single(
                variable
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("Mode 'single' needs a variable name"))?
                    .to_string(),
            ),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardOptions {
    pub mode: ForwardMode,
    /// Forward only values that changed since the previous cycle.
    pub diff: bool,
}

/// Message handed to the downstream sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl OutputMessage {
    fn new(topic: &str, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
        }
    }
}

fn snapshot_payload(snapshot: &Snapshot) -> serde_json::Value {
    serde_json::Value::Object(
        snapshot
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

pub struct ValueForwarder {
    options: ForwardOptions,
}

impl ValueForwarder {
    pub fn new(options: ForwardOptions) -> Self {
        Self { options }
    }

    /// Messages to emit for one event; empty when the event is not a source
    /// for the configured mode.
    pub fn messages_for(&self, event: &PlcEvent) -> Vec<OutputMessage> {
        match (&self.options.mode, self.options.diff, event) {
            (ForwardMode::All, false, PlcEvent::CycleCompleted(snapshot))
            | (ForwardMode::All, true, PlcEvent::SnapshotChanged(snapshot)) => {
                vec![OutputMessage::new("", snapshot_payload(snapshot))]
            }
            (ForwardMode::AllSplit, false, PlcEvent::CycleCompleted(snapshot)) => snapshot
                .iter()
                .map(|(key, value)| OutputMessage::new(key, value.to_json()))
                .collect(),
            (ForwardMode::AllSplit, true, PlcEvent::ValueChanged(change)) => {
                vec![OutputMessage::new(&change.key, change.value.to_json())]
            }
            (ForwardMode::Single(variable), false, PlcEvent::CycleCompleted(snapshot)) => {
                let payload = snapshot
                    .get(variable)
                    .map(|value| value.to_json())
                    .unwrap_or(serde_json::Value::Null);
                vec![OutputMessage::new(variable, payload)]
            }
            (ForwardMode::Single(variable), true, PlcEvent::ValueChanged(change))
                if &change.key == variable =>
            {
                vec![OutputMessage::new(variable, change.value.to_json())]
            }
            _ => Vec::new(),
        }
    }

    /// Forward events from `plc` into a channel until either side goes away.
    pub fn attach(self, plc: &Plc) -> flume::Receiver<OutputMessage> {
        let events = plc.subscribe();
        let (tx, rx) = flume::unbounded();
        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                for message in self.messages_for(&event) {
                    if tx.send(message).is_err() {
                        return;
                    }
                }
            }
        });
        rx
    }
}

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};

use super::Plc;
use crate::core::{CycleSchedule, PlcError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ControlFunction {
    /// Change the cycle time to the message payload.
    CycleTime,
    /// Run a cycle now.
    Trigger,
}

/// Request addressed to a [`Controller`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Used when the controller has no fixed function.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ControlMessage {
    pub fn new(function: Option<&str>, payload: serde_json::Value) -> Self {
        Self {
            function: function.map(str::to_string),
            payload,
        }
    }

    /// Parse a text command such as `trigger` or `cycletime 2000`.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let function = parts.next()?;
        let payload = parts
            .next()
            .map(|arg| serde_json::Value::String(arg.to_string()))
            .unwrap_or(serde_json::Value::Null);
        Some(Self::new(Some(function), payload))
    }
}

/// Control consumer: applies control requests to a PLC.
pub struct Controller<'a> {
    plc: &'a Plc,
    function: Option<ControlFunction>,
}

impl<'a> Controller<'a> {
    /// `function` fixes the action; `None` takes it from each message.
    pub fn new(plc: &'a Plc, function: Option<ControlFunction>) -> Self {
        Self { plc, function }
    }

    fn resolve_function(&self, message: &ControlMessage) -> Result<ControlFunction, PlcError> {
        if let Some(function) = self.function {
            return Ok(function);
        }
        let name = message.function.as_deref().unwrap_or_default();
        ControlFunction::from_str(name)
            .map_err(|_| PlcError::InvalidControlFunction(name.to_string()))
    }

    /// Apply `message`. Returns the message when it should be passed on.
    ///
    /// A trigger always passes the message on. A cycle-time change passes
    /// it on only when it leaves periodic polling running; an invalid
    /// interval or `0` drops it.
    pub async fn handle(&self, message: ControlMessage) -> Result<Option<ControlMessage>, PlcError> {
        match self.resolve_function(&message)? {
            ControlFunction::Trigger => {
                self.plc.trigger_cycle()?;
                Ok(Some(message))
            }
            ControlFunction::CycleTime => {
                let interval = payload_text(&message.payload);
                match self.plc.set_cycle_time(&interval).await {
                    Ok(CycleSchedule::Every(_)) => Ok(Some(message)),
                    Ok(CycleSchedule::Disabled) | Err(PlcError::InvalidInterval(_)) => Ok(None),
                    Err(err) => Err(err),
                }
            }
        }
    }
}

fn payload_text(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

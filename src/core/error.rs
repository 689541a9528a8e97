use thiserror::Error;

/// Failures reported by the PLC runtime and its consumers.
#[derive(Debug, Error)]
pub enum PlcError {
    /// No serial port configured; the connect attempt is abandoned without retry.
    #[error("no serial port configured")]
    MissingPort,

    #[error("invalid cycle time interval: {0:?}")]
    InvalidInterval(String),

    #[error("invalid control function: {0:?}")]
    InvalidControlFunction(String),

    /// The runtime task has shut down and no longer accepts requests.
    #[error("PLC runtime is closed")]
    Closed,
}

/// Polling engine behind the PLC handle
///
/// - `runtime`: the task owning the connection, timers and cache
/// - `scheduler`: interval handling and the in-flight / deferred bookkeeping
/// - `engine`: change detection and fan-out
/// - `bus`, `status`: what consumers subscribe to
pub mod bus;
pub mod cache;
pub mod engine;
pub mod error;
pub mod runtime;
pub mod scheduler;
pub mod status;

pub use bus::{EventBus, PlcEvent, Snapshot, ValueChange};
pub use cache::ValueCache;
pub use error::PlcError;
pub use runtime::RECONNECT_DELAY;
pub use scheduler::{CycleSchedule, MIN_CYCLE_TIME_MS};
pub use status::{Status, StatusSignal};

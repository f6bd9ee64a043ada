//! Typed event log entries and the in-memory pub/sub bus (spec component B).

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusError, EventBusExt, EventBusResult, EventFilter, FilteredReceiver,
    SharedEventBus, DEFAULT_BUS_CAPACITY,
};
pub use types::{EventType, WorkflowEvent};

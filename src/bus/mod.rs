//! In-process event bus for market progress.
//!
//! Engine stages publish [`MarketEvent`]s through a `tokio` broadcast
//! channel; UI and replay consumers subscribe and receive every event with a
//! monotonic sequence number. Nothing is persisted.

mod event_bus;
mod event_types;

pub use event_bus::{BusEvent, EventBus};
pub use event_types::{
    MarketEvent, CATEGORY_MARKET, EVENT_BALANCING_APPLIED, EVENT_PERIOD_CLEARED, EVENT_ROUND_SETTLED,
    EVENT_SCENARIO_APPLIED,
};

//! Observability for the resilient completion path.
//!
//! Logging goes through `tracing`; the library never installs a subscriber.
//! Counters live in [`ResilienceMetrics`] and are exported as a
//! serializable [`MetricsSummary`].

mod metrics;

pub use metrics::{Counter, Gauge, Histogram, MetricsSummary, ResilienceMetrics};

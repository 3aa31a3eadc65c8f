//! HTTP observability surface.
//!
//! - [`metrics`]: Prometheus text, JSON stats, and health routes

pub mod metrics;

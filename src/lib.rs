//! PRism library crate
//!
//! Pulls structured suggestions (file edits, alerts, dashboards) out of
//! model responses and PR comments, and translates their queries and layouts
//! into the formats alerting and dashboard vendors accept. The `prism`
//! binary is a thin harness over these modules.

pub mod alerts;
pub mod config;
pub mod dashboard;
pub mod defaults;
pub mod error;
pub mod suggest;
pub mod text;
pub mod translate;

pub use error::{PrismError, PrismResult};

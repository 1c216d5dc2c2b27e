//! Sensor health classification and aggregation for farm telemetry.
//!
//! Turns a stream of timestamped readings plus per-sensor thresholds into
//! per-sensor health states, farm and device rollups, KPIs with trends,
//! anomaly lists and merged chart series, refreshed on a polling schedule.
//!
//! Module map (EMBP: each top-level module is the only import path for
//! what it contains):
//! - [`engine`]: pure classification/aggregation plus the stateful
//!   [`HealthEngine`]
//! - [`source`]: the [`DataSource`] boundary and its PostgreSQL and HTTP
//!   adapters
//! - [`refresh`]: the polling/live-mode controller
//! - [`routes`]: read-only JSON surface
//! - [`config`], [`schema`], [`error`], [`models`]: ambient plumbing

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod refresh;
pub mod routes;
pub mod schema;
pub mod source;

pub use config::Config;
pub use engine::HealthEngine;
pub use error::{ConfigError, FetchError, StaleDataWarning, WindowParseError};
pub use models::{RawThresholds, Reading, Sensor};
pub use refresh::{RefreshConfig, RefreshController, RefreshHandle, RefreshState, RefreshStats};
pub use source::{DataSource, HttpSource, PgSource};

/// Blog Service Library
///
/// Posts with comma-separated tags and categories, plus per-label usage
/// counts kept by the `label-counter` library.
///
/// # Modules
///
/// - `handlers`: HTTP request handlers and route table
/// - `models`: Posts, requests and label summaries
/// - `services`: Post workflow and label counting
/// - `db`: Connection pool, migrations and post queries
/// - `middleware`: Caller identity extraction
/// - `metrics`: Prometheus collectors and the `/metrics` handler
/// - `error`: Error types and HTTP mapping
/// - `config`: Configuration management
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};

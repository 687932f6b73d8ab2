//! # collage-http
//!
//! HTTP backend for collage-core.
//!
//! Provides:
//! - `ApiClient`: `ContributionStore`, `CollectionService`, `ProcessingService`
//!   and `SourceFetcher` over one reqwest connection pool
//! - `AuthSession`: bearer token shared by every authenticated client
//! - `HttpConfig`: base URL, timeouts and upload chunking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use collage_core::{ContributionUploader, MonitorConfig, TaskMonitor};
//! use collage_http::{ApiClient, AuthSession, HttpConfig};
//!
//! let auth = Arc::new(AuthSession::new());
//! let api = Arc::new(ApiClient::new(HttpConfig::new("https://tapes.example/api"), auth.clone())?);
//! auth.login(token);
//!
//! let uploader = ContributionUploader::new(api.clone());
//! let monitor = TaskMonitor::new(api.clone(), api, MonitorConfig::default())?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
mod wire;

pub use auth::AuthSession;
pub use client::{error_for_status, ApiClient};
pub use config::HttpConfig;

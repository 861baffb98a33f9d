#![deny(missing_docs)]

//! # bsv-arc
//!
//! HTTP client for ARC, the transaction processor BSV wallets submit to.
//!
//! [`ArcClient`] implements [`bsv_spv::Broadcaster`], reporting every
//! failure as retryable (transport trouble, server errors, throttling) or
//! fatal (client errors, `REJECTED`, `DOUBLE_SPEND_ATTEMPTED`).
//!
//! # Example
//!
//! ```no_run
//! use bsv_arc::{ArcClient, ArcConfig};
//!
//! let client = ArcClient::new(ArcConfig {
//!     base_url: "https://arc.taal.com/v1".to_string(),
//!     api_key: Some("my-key".to_string()),
//!     ..Default::default()
//! })?;
//! # Ok::<(), bsv_arc::ArcError>(())
//! ```

pub mod client;
pub mod error;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::ArcClient;
pub use error::ArcError;
pub use types::{ArcConfig, ArcResponse, ArcStatus};

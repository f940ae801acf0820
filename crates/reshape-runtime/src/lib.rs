//! Reshape Runtime
//!
//! This crate re-runs conversions when watched remote resources change.
//!
//! # Features
//!
//! - Content fetching with landing-page link discovery
//! - SHA-256 fingerprints per `(url, mapping template)`
//! - A periodic daemon with per-resource exclusivity and cooperative shutdown
//!
//! # Usage
//!
//! ```rust,ignore
//! use reshape_runtime::{InMemoryCatalog, WatchDaemon, shutdown};
//!
//! let catalog = Arc::new(InMemoryCatalog::new(config.project.watch.clone()));
//! let daemon = WatchDaemon::new(config.settings(), catalog, executor)?;
//! let (trigger, signal) = shutdown::channel();
//! daemon.run(signal).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod fingerprint;
pub mod hashing;
pub mod jobs;
pub mod locks;
pub mod shutdown;

pub use engine::WatchDaemon;
pub use error::{Error, Result};
pub use executor::{InMemoryCatalog, SourceCatalog, TransformationExecutor};
pub use fetch::{ContentFetcher, FetchedContent};
pub use fingerprint::{FingerprintStore, InMemoryFingerprintStore};
pub use hashing::{sha256_hex, sha256_hex_reader};
pub use jobs::{CycleOutcome, CycleReport};
pub use locks::KeyedLocks;
pub use shutdown::{ShutdownSignal, ShutdownTrigger};

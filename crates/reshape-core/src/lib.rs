//! Reshape Core Library
//!
//! This crate provides the core functionality for Reshape:
//! - Format detection and parsers for CSV, JSON, XML and Excel input
//! - Field templates and path flattening
//! - Mapping profiles and type coercion
//! - Project configuration and watched-source history
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Parser    │────▶│   Mapping   │────▶│    Rows     │
//! │ (bytes→Row) │     │  (Profile)  │     │  (target)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use reshape_core::{Config, OnRowError, map_rows, parse_bytes};
//!
//! let config = Config::load("./reshape.yaml")?;
//! let profile = config.profile("people")?;
//! let rows = parse_bytes(&bytes, Some("people.csv"), &config.settings().parsing)?;
//! let mapped = map_rows(rows.into_iter().map(Ok), &profile, OnRowError::StopOnError)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod format;
pub mod mapping;
pub mod parsers;
pub mod schema;
pub mod value;
pub mod watch;

pub use config::{Config, ProjectConfig, Settings, Template};
pub use error::{Error, Result};
pub use format::{Format, detect};
pub use mapping::{MappingRule, OnRowError, Profile, coerce, map_row, map_rows};
pub use parsers::{ParseOptions, Parser, parse_bytes, parser_for};
pub use schema::{FieldKind, FieldNode, FlatField};
pub use value::{Row, Value};
pub use watch::{ConversionRecord, WatchedSource, strip_fragment};

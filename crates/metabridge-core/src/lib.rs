//! Metabridge Core Library
//!
//! This crate moves Shopify metafields between stores:
//! - Admin GraphQL client with throttling backoff and cursor pagination
//! - Export of products and collections to a JSON document
//! - Import of that document into another store, matched by handle
//! - CSV projection of an export
//! - Pink color tagging of products
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   JSON    ┌──────────┐
//! │ Exporter │──────────▶│ Importer │──▶ target store
//! └──────────┘     │     └──────────┘
//!      ▲           │     ┌───────────┐
//!      │           └────▶│ Projector │──▶ CSV
//! source store           └───────────┘
//!
//! ┌─────────────┐
//! │ ColorTagger │◀──▶ secondary store
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use metabridge_core::{Config, ShopifyClient, StoreRole};
//!
//! let config = Config::load_or_default("metabridge.yaml")?;
//! let client = ShopifyClient::connect(&config, config.store(StoreRole::Source)?)?;
//! let document = metabridge_core::export::export(&client).await?;
//! document.save("metafields_export.json")?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod client;
pub mod color;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod import;
pub mod project;
pub mod tagger;
pub mod transport;

#[cfg(test)]
mod testing;

pub use catalog::EntityKind;
pub use client::{RetryPolicy, ShopifyClient};
pub use config::{Config, StoreConfig, StoreRole};
pub use document::{EntityRecord, ExportDocument, Metafield};
pub use error::{Error, Result};
pub use export::Exporter;
pub use import::{ImportOptions, ImportReport, Importer};
pub use project::{ProjectOptions, Projection, Table};
pub use tagger::{ColorTagger, TagOptions, TagReport};
pub use transport::{GraphqlTransport, HttpTransport};

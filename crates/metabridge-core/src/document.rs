//! Export document: the JSON interchange file between export and
//! import/convert.
//!
//! ```json
//! {
//!   "products": [
//!     {"handle": "red-shirt", "title": "Red Shirt",
//!      "metafields": [{"namespace": "custom", "key": "cor", "value": "#FF0000", "type": "color"}]}
//!   ],
//!   "collections": [],
//!   "exported_at": "2026-10-17T12:00:00Z",
//!   "source_shop": "source.myshopify.com"
//! }
//! ```
//!
//! Entity IDs are store-specific and never written; the handle is the only
//! key that survives a move between stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Write;
use std::path::Path;

use crate::catalog::EntityKind;
use crate::error::{Error, Result};

/// Type assumed for metafields that arrive without one
pub const DEFAULT_METAFIELD_TYPE: &str = "single_line_text_field";

/// A single metafield value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafield {
    /// Namespace, e.g. `custom`
    pub namespace: String,

    /// Key within the namespace
    pub key: String,

    /// Raw value; JSON-encoded for list and structured types
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: String,

    /// Declared metafield type, e.g. `single_line_text_field`
    #[serde(
        rename = "type",
        default = "default_metafield_type",
        deserialize_with = "null_as_default_type"
    )]
    pub kind: String,
}

fn default_metafield_type() -> String {
    DEFAULT_METAFIELD_TYPE.to_string()
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_type<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_metafield_type))
}

/// Accepts RFC 3339 strings as well as the Unix-seconds floats older
/// exports wrote.
fn flexible_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(DateTime<Utc>),
        Seconds(f64),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Text(at)) => Ok(Some(at)),
        Some(Raw::Seconds(secs)) => {
            let millis = (secs * 1000.0).round() as i64;
            DateTime::from_timestamp_millis(millis)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", secs)))
        }
    }
}

impl Metafield {
    /// Create a metafield
    pub fn new(
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            value: value.into(),
            kind: kind.into(),
        }
    }

    /// Column name used by the CSV projection: `namespace.key`
    pub fn qualified_key(&self) -> String {
        format!("{}.{}", self.namespace, self.key)
    }
}

/// One exported product or collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Handle, the cross-store join key
    #[serde(default)]
    pub handle: String,

    /// Title
    #[serde(default)]
    pub title: String,

    /// Metafields in API order
    #[serde(default)]
    pub metafields: Vec<Metafield>,
}

/// Root of an export file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Exported products
    #[serde(default)]
    pub products: Vec<EntityRecord>,

    /// Exported collections
    #[serde(default)]
    pub collections: Vec<EntityRecord>,

    /// When the export ran
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "flexible_timestamp"
    )]
    pub exported_at: Option<DateTime<Utc>>,

    /// Shop the export came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_shop: Option<String>,
}

impl ExportDocument {
    /// Entities of one kind
    pub fn entities(&self, kind: EntityKind) -> &[EntityRecord] {
        match kind {
            EntityKind::Product => &self.products,
            EntityKind::Collection => &self.collections,
        }
    }

    /// Mutable entities of one kind
    pub fn entities_mut(&mut self, kind: EntityKind) -> &mut Vec<EntityRecord> {
        match kind {
            EntityKind::Product => &mut self.products,
            EntityKind::Collection => &mut self.collections,
        }
    }

    /// Total metafields across both kinds
    pub fn metafield_count(&self) -> usize {
        self.products
            .iter()
            .chain(&self.collections)
            .map(|e| e.metafields.len())
            .sum()
    }

    /// Read an export file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let document: ExportDocument =
            serde_json::from_str(&contents).map_err(|e| Error::MalformedInput {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        tracing::info!(
            "Loaded {} products and {} collections from {}",
            document.products.len(),
            document.collections.len(),
            path.display()
        );
        Ok(document)
    }

    /// Write the document, replacing `path` only once the whole file is on
    /// disk
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".partial");
        let tmp_path = path.with_file_name(tmp_name);

        let write = || -> Result<()> {
            let mut writer = std::io::BufWriter::new(std::fs::File::create(&tmp_path)?);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            Ok(())
        };
        if let Err(e) = write() {
            std::fs::remove_file(&tmp_path).ok();
            return Err(e);
        }

        std::fs::rename(&tmp_path, path)?;
        tracing::info!("Saved export to {}", path.display());
        Ok(())
    }
}

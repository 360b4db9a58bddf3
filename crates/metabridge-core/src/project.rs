//! Flatten an export document into one table row per entity
//!
//! Columns are `handle`, `title`, then one column per distinct
//! `namespace.key` in the order keys are first seen. Cells an entity has no
//! value for stay empty.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::catalog::EntityKind;
use crate::document::{EntityRecord, ExportDocument};
use crate::error::Result;

/// Projection settings
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    /// Only project metafields of this namespace
    pub namespace: Option<String>,
}

/// A row of the projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Entity handle
    pub handle: String,
    /// Entity title
    pub title: String,
    /// One cell per metafield column, aligned with [`Table::columns`]
    pub values: Vec<String>,
}

/// A rectangular projection of one entity kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Metafield columns (`namespace.key`), excluding handle and title
    pub columns: Vec<String>,
    /// One row per entity, in document order
    pub rows: Vec<Row>,
}

impl Table {
    /// Full header row
    pub fn header(&self) -> Vec<&str> {
        ["handle", "title"]
            .into_iter()
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    /// Value of a metafield column for a handle
    pub fn cell(&self, handle: &str, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|r| r.handle == handle)
            .map(|r| r.values[index].as_str())
    }

    /// Write RFC 4180 CSV
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.header())?;
        for row in &self.rows {
            csv.write_record(
                [row.handle.as_str(), row.title.as_str()]
                    .into_iter()
                    .chain(row.values.iter().map(String::as_str)),
            )?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the table as a CSV file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))?;
        tracing::info!(
            "Wrote {} rows and {} metafield columns to {}",
            self.rows.len(),
            self.columns.len(),
            path.display()
        );
        Ok(())
    }
}

/// Tables for both entity kinds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    /// Product table
    pub products: Table,
    /// Collection table
    pub collections: Table,
}

impl Projection {
    /// Table of one kind
    pub fn table(&self, kind: EntityKind) -> &Table {
        match kind {
            EntityKind::Product => &self.products,
            EntityKind::Collection => &self.collections,
        }
    }
}

/// Project every metafield of a document
pub fn project(document: &ExportDocument) -> Projection {
    project_with(document, &ProjectOptions::default())
}

/// Project a document with options
pub fn project_with(document: &ExportDocument, options: &ProjectOptions) -> Projection {
    Projection {
        products: project_entities(&document.products, options),
        collections: project_entities(&document.collections, options),
    }
}

/// Project a list of entities.
///
/// When an entity repeats a `namespace.key`, the last value wins.
pub fn project_entities(entities: &[EntityRecord], options: &ProjectOptions) -> Table {
    let wanted = |namespace: &str| {
        options
            .namespace
            .as_deref()
            .is_none_or(|only| only == namespace)
    };

    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for metafield in entities.iter().flat_map(|e| &e.metafields) {
        if !wanted(&metafield.namespace) {
            continue;
        }
        let column = metafield.qualified_key();
        if !index.contains_key(&column) {
            index.insert(column.clone(), columns.len());
            columns.push(column);
        }
    }

    let rows = entities
        .iter()
        .map(|entity| {
            let mut values = vec![String::new(); columns.len()];
            for metafield in entity.metafields.iter().filter(|m| wanted(&m.namespace)) {
                if let Some(&i) = index.get(&metafield.qualified_key()) {
                    values[i] = metafield.value.clone();
                }
            }
            Row {
                handle: entity.handle.clone(),
                title: entity.title.clone(),
                values,
            }
        })
        .collect();

    Table { columns, rows }
}

//! Convert command

use anyhow::{Context, Result};
use metabridge_core::project::{self, ProjectOptions};
use metabridge_core::{EntityKind, ExportDocument};
use std::path::Path;

/// Write one entity kind of an export file as CSV
pub fn run(input: &Path, output: &Path, kind: EntityKind, namespace: Option<String>) -> Result<()> {
    let document = ExportDocument::load(input)
        .with_context(|| format!("Failed to read export file {}", input.display()))?;

    let table = project::project_entities(document.entities(kind), &ProjectOptions { namespace });
    table
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        "✓ Converted {} {} to {}",
        table.rows.len(),
        kind,
        output.display()
    );
    Ok(())
}

//! Export command

use anyhow::{Context, Result};
use metabridge_core::{Config, StoreRole};
use std::path::Path;

/// Export the source store to `output`
pub async fn run(config: &Config, output: &Path) -> Result<()> {
    let client = super::connect(config, StoreRole::Source)?;

    let document = metabridge_core::export::export(&client)
        .await
        .context("Export failed, no file was written")?;
    document
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        "✓ Exported {} products and {} collections ({} metafields) to {}",
        document.products.len(),
        document.collections.len(),
        document.metafield_count(),
        output.display()
    );
    Ok(())
}

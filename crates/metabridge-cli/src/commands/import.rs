//! Import command

use anyhow::{Context, Result};
use metabridge_core::{Config, ExportDocument, ImportOptions, StoreRole};
use std::path::Path;

/// Import `input` into the target store
pub async fn run(
    config: &Config,
    input: &Path,
    options: ImportOptions,
    report_path: Option<&Path>,
) -> Result<()> {
    let document = ExportDocument::load(input)
        .with_context(|| format!("Failed to read export file {}", input.display()))?;
    if let Some(shop) = &document.source_shop {
        tracing::info!("Export was taken from {}", shop);
    }

    let client = super::connect(config, StoreRole::Target)?;
    let report = metabridge_core::import::import(&document, &client, options)
        .await
        .context("Import aborted")?;

    if let Some(path) = report_path {
        report
            .save_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    let counts = &report.counts;
    if options.dry_run {
        tracing::info!("Dry run, nothing was written");
    }
    tracing::info!("Created:            {}", counts.created);
    tracing::info!("Updated:            {}", counts.updated);
    tracing::info!("Unchanged:          {}", counts.unchanged);
    tracing::info!("Skipped (exists):   {}", counts.skipped_exists);
    tracing::info!("Skipped (no match): {}", counts.skipped_no_handle);
    tracing::info!("Errors:             {}", counts.errored);
    if options.create_definitions {
        tracing::info!(
            "Definitions created: {} (failed: {})",
            report.definitions_created,
            report.definitions_failed
        );
    }
    if counts.entities_not_found > 0 {
        tracing::warn!(
            "{} exported entities have no matching handle in {}",
            counts.entities_not_found,
            client.shop()
        );
    }
    Ok(())
}

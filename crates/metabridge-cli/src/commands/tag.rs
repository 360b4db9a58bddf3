//! Pink tagging command

use anyhow::{Context, Result};
use metabridge_core::tagger::{self, TagOptions};
use metabridge_core::{Config, StoreRole};
use std::path::Path;

/// Tag pink products in the secondary store and write the color table
pub async fn run(config: &Config, output: &Path, dry_run: bool) -> Result<()> {
    let client = super::connect(config, StoreRole::SecondarySource)?;

    let report = tagger::tag_pink_products(&client, TagOptions { dry_run })
        .await
        .context("Tagging aborted")?;
    report
        .save_color_csv(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let counts = &report.counts;
    if dry_run {
        tracing::info!("Dry run, no tags were written");
    }
    tracing::info!("Products:        {}", counts.total);
    tracing::info!("Pink:            {}", counts.pink);
    tracing::info!("Tagged:          {}", counts.tagged);
    tracing::info!("Already tagged:  {}", counts.already_tagged);
    tracing::info!("Not pink:        {}", counts.not_pink);
    tracing::info!("No color:        {}", counts.not_applicable);
    tracing::info!("Errors:          {}", counts.errored);
    Ok(())
}

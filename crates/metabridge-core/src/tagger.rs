//! Tag products whose color metafield is pink
//!
//! Reads `custom.cor` on every product, classifies it, and adds the `rosa`
//! tag to pink products that do not carry it yet. Every product also gets a
//! row in a color side table for manual review.

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::path::Path;

use crate::client::{PageQuery, ShopifyClient};
use crate::color::{self, ColorClass, Rgb};
use crate::error::{Error, Result};
use crate::transport::GraphqlTransport;

/// Namespace of the color metafield
pub const COLOR_NAMESPACE: &str = "custom";

/// Key of the color metafield
pub const COLOR_KEY: &str = "cor";

/// Tag added to pink products
pub const PINK_TAG: &str = "rosa";

/// Products with tags and their color metafield
pub const TAG_PRODUCTS_QUERY: &str = r#"
query TagProducts($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id
      handle
      title
      tags
      metafield(namespace: "custom", key: "cor") { value }
    }
  }
}
"#;

/// Replace the tag list of a product
pub const PRODUCT_TAGS_UPDATE_MUTATION: &str = r#"
mutation ProductTagsUpdate($input: ProductInput!) {
  productUpdate(input: $input) {
    product { id tags }
    userErrors { field message }
  }
}
"#;

/// Tagging settings
#[derive(Debug, Clone, Copy, Default)]
pub struct TagOptions {
    /// Classify and report without updating any product
    pub dry_run: bool,
}

/// What happened to one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TagOutcome {
    /// Pink, tag added (or would be in a dry run)
    Tagged,
    /// Already carries the tag; left alone whatever its color
    AlreadyTagged,
    /// Valid color outside the pink band
    NotPink,
    /// Color missing or unparseable
    NotApplicable(String),
    /// Pink, but the update failed
    Error(String),
}

/// One row of the color side table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorRow {
    /// Product handle
    pub handle: String,
    /// Product title
    pub title: String,
    /// Raw color value, empty when missing
    pub hex: String,
    /// Parsed color, when the value is valid
    pub rgb: Option<Rgb>,
    /// Color class of the value
    pub classification: ColorClass,
}

/// Result for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductTagResult {
    /// Product handle
    pub handle: String,
    /// Outcome
    pub outcome: TagOutcome,
}

/// Outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TagCounts {
    /// Products examined
    pub total: usize,
    /// Products with a pink color, tagged or not
    pub pink: usize,
    /// Newly tagged
    pub tagged: usize,
    /// Already carried the tag
    pub already_tagged: usize,
    /// Valid color outside the band
    pub not_pink: usize,
    /// No usable color
    pub not_applicable: usize,
    /// Update failed
    pub errored: usize,
}

/// Everything a tagging run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct TagReport {
    /// Whether the run was a dry run
    pub dry_run: bool,
    /// Counts per outcome
    pub counts: TagCounts,
    /// Per-product results in store order
    pub products: Vec<ProductTagResult>,
    /// Color side table in store order
    pub colors: Vec<ColorRow>,
}

impl TagReport {
    fn record(&mut self, row: ColorRow, outcome: TagOutcome) {
        let counts = &mut self.counts;
        counts.total += 1;
        if row.classification == ColorClass::Pink {
            counts.pink += 1;
        }
        match &outcome {
            TagOutcome::Tagged => counts.tagged += 1,
            TagOutcome::AlreadyTagged => counts.already_tagged += 1,
            TagOutcome::NotPink => counts.not_pink += 1,
            TagOutcome::NotApplicable(_) => counts.not_applicable += 1,
            TagOutcome::Error(_) => counts.errored += 1,
        }
        self.products.push(ProductTagResult {
            handle: row.handle.clone(),
            outcome,
        });
        self.colors.push(row);
    }

    /// Write the color side table as CSV:
    /// `handle,title,hex,r,g,b,classification`
    pub fn write_color_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["handle", "title", "hex", "r", "g", "b", "classification"])?;
        for row in &self.colors {
            let channel = |pick: fn(&Rgb) -> u8| {
                row.rgb.as_ref().map(pick).map(|v| v.to_string()).unwrap_or_default()
            };
            csv.write_record([
                row.handle.clone(),
                row.title.clone(),
                row.hex.clone(),
                channel(|c| c.r),
                channel(|c| c.g),
                channel(|c| c.b),
                row.classification.as_str().to_string(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the color side table to a file
    pub fn save_color_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        self.write_color_csv(std::io::BufWriter::new(file))?;
        tracing::info!("Wrote {} color rows to {}", self.colors.len(), path.display());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TagNode {
    id: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    metafield: Option<ColorValue>,
}

#[derive(Debug, Deserialize)]
struct ColorValue {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductUpdatePayload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    message: String,
}

fn update_payload(data: &serde_json::Value) -> Result<ProductUpdatePayload> {
    let unexpected = |message: String| Error::UnexpectedResponse {
        operation: "ProductTagsUpdate".to_string(),
        message,
    };
    match data.get("productUpdate") {
        Some(value) if !value.is_null() => serde_json::from_value(value.clone())
            .map_err(|e| unexpected(format!("malformed productUpdate payload: {}", e))),
        _ => Err(unexpected("missing productUpdate payload".to_string())),
    }
}

/// Whether `tags` already contains `tag`, ignoring case and surrounding
/// whitespace. Substrings do not count.
pub fn has_tag(tags: &[String], tag: &str) -> bool {
    tags.iter().any(|t| t.trim().eq_ignore_ascii_case(tag.trim()))
}

/// Tags pink products of one store
pub struct ColorTagger<'a, T> {
    client: &'a ShopifyClient<T>,
    options: TagOptions,
}

impl<'a, T: GraphqlTransport> ColorTagger<'a, T> {
    /// Create a tagger
    pub fn new(client: &'a ShopifyClient<T>, options: TagOptions) -> Self {
        Self { client, options }
    }

    /// Walk every product and tag the pink ones.
    ///
    /// A failed update is recorded against that product and the walk goes
    /// on; errors that make further calls pointless abort the run.
    pub async fn run(&self) -> Result<TagReport> {
        tracing::info!(
            dry_run = self.options.dry_run,
            "Tagging pink products in {}",
            self.client.shop()
        );

        let query = PageQuery::new("TagProducts", TAG_PRODUCTS_QUERY, &["products"]);
        let mut nodes = std::pin::pin!(self.client.paginate::<TagNode>(&query));
        let mut report = TagReport {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        while let Some(node) = nodes.try_next().await? {
            let raw = node.metafield.and_then(|m| m.value);
            let (classification, parsed) = color::classify(raw.as_deref());
            let handle = node.handle.unwrap_or_default();

            let outcome = if has_tag(&node.tags, PINK_TAG) {
                TagOutcome::AlreadyTagged
            } else {
                match (classification, &parsed) {
                    (ColorClass::NotApplicable, Err(e)) => {
                        tracing::debug!("{} has no usable color: {}", handle, e);
                        TagOutcome::NotApplicable(e.to_string())
                    }
                    (ColorClass::Pink, _) => self.add_tag(&node.id, &handle, node.tags).await?,
                    _ => TagOutcome::NotPink,
                }
            };

            report.record(
                ColorRow {
                    handle,
                    title: node.title.unwrap_or_default(),
                    hex: raw.unwrap_or_default(),
                    rgb: parsed.ok(),
                    classification,
                },
                outcome,
            );
        }

        let c = &report.counts;
        tracing::info!(
            "Checked {} products: {} pink, {} tagged, {} already tagged, {} not pink, {} without color, {} errors",
            c.total,
            c.pink,
            c.tagged,
            c.already_tagged,
            c.not_pink,
            c.not_applicable,
            c.errored
        );
        Ok(report)
    }

    async fn add_tag(&self, id: &str, handle: &str, mut tags: Vec<String>) -> Result<TagOutcome> {
        if self.options.dry_run {
            tracing::info!("Would tag {} as {}", handle, PINK_TAG);
            return Ok(TagOutcome::Tagged);
        }

        tags.push(PINK_TAG.to_string());
        let variables = json!({"input": {"id": id, "tags": tags}});
        let result = self
            .client
            .query("ProductTagsUpdate", PRODUCT_TAGS_UPDATE_MUTATION, variables)
            .await
            .and_then(|data| update_payload(&data));
        let payload = match result {
            Ok(payload) => payload,
            Err(e) if !e.is_fatal() => {
                tracing::error!("Failed to tag {}: {}", handle, e);
                return Ok(TagOutcome::Error(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        if !payload.user_errors.is_empty() {
            let message = payload
                .user_errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            tracing::error!("Failed to tag {}: {}", handle, message);
            return Ok(TagOutcome::Error(message));
        }

        tracing::info!("Tagged {} as {}", handle, PINK_TAG);
        Ok(TagOutcome::Tagged)
    }
}

/// Tag every pink product of a store
pub async fn tag_pink_products<T: GraphqlTransport>(
    client: &ShopifyClient<T>,
    options: TagOptions,
) -> Result<TagReport> {
    ColorTagger::new(client, options).run().await
}

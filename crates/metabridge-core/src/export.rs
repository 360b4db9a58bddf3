//! Export every product and collection of a store with its metafields

use chrono::Utc;
use std::collections::HashSet;

use crate::catalog::{self, EntityKind};
use crate::client::ShopifyClient;
use crate::document::{EntityRecord, ExportDocument};
use crate::error::{Error, Result};
use crate::transport::GraphqlTransport;

/// Walks a store and builds an [`ExportDocument`]
pub struct Exporter<'a, T> {
    client: &'a ShopifyClient<T>,
}

impl<'a, T: GraphqlTransport> Exporter<'a, T> {
    /// Create an exporter over a source store
    pub fn new(client: &'a ShopifyClient<T>) -> Self {
        Self { client }
    }

    /// Export products, then collections.
    ///
    /// Any error while paging discards what was fetched so far and is
    /// returned as [`Error::PartialExport`]; callers never see half a store.
    pub async fn run(&self) -> Result<ExportDocument> {
        tracing::info!("Exporting products and collections from {}", self.client.shop());

        let mut document = ExportDocument {
            exported_at: Some(Utc::now()),
            source_shop: Some(self.client.shop().to_string()),
            ..Default::default()
        };

        for kind in EntityKind::ALL {
            let records = document.entities_mut(kind);
            let mut seen = HashSet::new();

            let result = catalog::for_each_entity(self.client, kind, |entity| {
                // A catalog edited mid-export can shift an entity across a
                // page boundary and return it twice.
                if !seen.insert(entity.id.clone()) {
                    tracing::warn!("{} returned twice, keeping the first copy", entity.id);
                    return Ok(());
                }
                records.push(EntityRecord {
                    handle: entity.handle,
                    title: entity.title,
                    metafields: entity.metafields,
                });
                Ok(())
            })
            .await;

            if let Err(source) = result {
                return Err(Error::PartialExport {
                    kind,
                    fetched: records.len(),
                    source: Box::new(source),
                });
            }
            tracing::info!("Exported {} {}", records.len(), kind);
        }

        Ok(document)
    }
}

/// Export a whole store
pub async fn export<T: GraphqlTransport>(client: &ShopifyClient<T>) -> Result<ExportDocument> {
    Exporter::new(client).run().await
}

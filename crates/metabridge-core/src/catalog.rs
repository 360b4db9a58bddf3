//! Store catalog access: entity kinds, GraphQL documents and the shapes
//! decoded from them.
//!
//! Exporter and importer read entities through the same queries, so the
//! target-store index and the export see identical data.

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::client::{PageInfo, PageQuery, ShopifyClient};
use crate::document::Metafield;
use crate::error::{Error, Result};
use crate::transport::GraphqlTransport;

/// Kind of store entity that carries metafields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A product
    Product,
    /// A collection
    Collection,
}

impl EntityKind {
    /// Both kinds, in export order
    pub const ALL: [EntityKind; 2] = [EntityKind::Product, EntityKind::Collection];

    /// `MetafieldOwnerType` enum value
    pub fn owner_type(self) -> &'static str {
        match self {
            EntityKind::Product => "PRODUCT",
            EntityKind::Collection => "COLLECTION",
        }
    }

    /// Query listing every entity of this kind with its metafields
    pub fn export_query(self) -> PageQuery {
        match self {
            EntityKind::Product => {
                PageQuery::new("ExportProducts", EXPORT_PRODUCTS_QUERY, &["products"])
            }
            EntityKind::Collection => {
                PageQuery::new("ExportCollections", EXPORT_COLLECTIONS_QUERY, &["collections"])
            }
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Product => "products",
            EntityKind::Collection => "collections",
        })
    }
}

/// Products with inline metafields
pub const EXPORT_PRODUCTS_QUERY: &str = r#"
query ExportProducts($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id
      handle
      title
      tags
      metafields(first: 250) {
        pageInfo { hasNextPage endCursor }
        nodes { namespace key type value }
      }
    }
  }
}
"#;

/// Collections with inline metafields
pub const EXPORT_COLLECTIONS_QUERY: &str = r#"
query ExportCollections($first: Int!, $after: String) {
  collections(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id
      handle
      title
      metafields(first: 250) {
        pageInfo { hasNextPage endCursor }
        nodes { namespace key type value }
      }
    }
  }
}
"#;

/// Remaining metafields of one owner, for entities with more than fit inline
pub const OWNER_METAFIELDS_QUERY: &str = r#"
query OwnerMetafields($id: ID!, $first: Int!, $after: String) {
  node(id: $id) {
    ... on HasMetafields {
      metafields(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes { namespace key type value }
      }
    }
  }
}
"#;

/// An entity as it exists in a store
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    /// Store-scoped global ID
    pub id: String,
    /// Handle
    pub handle: String,
    /// Title
    pub title: String,
    /// Tags (products only)
    pub tags: Vec<String>,
    /// Metafields
    pub metafields: Vec<Metafield>,
}

#[derive(Debug, Deserialize)]
struct EntityNode {
    id: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    metafields: MetafieldConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetafieldConnection {
    #[serde(default)]
    page_info: PageInfo,
    nodes: Vec<MetafieldNode>,
}

#[derive(Debug, Deserialize)]
struct MetafieldNode {
    namespace: String,
    key: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<String>,
}

impl From<MetafieldNode> for Metafield {
    fn from(node: MetafieldNode) -> Self {
        Metafield {
            namespace: node.namespace,
            key: node.key,
            value: node.value.unwrap_or_default(),
            kind: node
                .kind
                .unwrap_or_else(|| crate::document::DEFAULT_METAFIELD_TYPE.to_string()),
        }
    }
}

/// Fetch every entity of a kind, metafields complete.
///
/// The `visit` callback sees each entity as soon as it is complete, which
/// lets callers log progress or stop early by returning an error.
pub async fn for_each_entity<T, F>(
    client: &ShopifyClient<T>,
    kind: EntityKind,
    mut visit: F,
) -> Result<()>
where
    T: GraphqlTransport,
    F: FnMut(RemoteEntity) -> Result<()>,
{
    let query = kind.export_query();
    let mut nodes = std::pin::pin!(client.paginate::<EntityNode>(&query));

    while let Some(node) = nodes.try_next().await? {
        let mut metafields: Vec<Metafield> =
            node.metafields.nodes.into_iter().map(Metafield::from).collect();

        if node.metafields.page_info.has_next_page {
            let after = node.metafields.page_info.end_cursor.ok_or_else(|| {
                Error::UnexpectedResponse {
                    operation: query.operation.to_string(),
                    message: format!("metafields of {} have more pages but no cursor", node.id),
                }
            })?;
            tracing::debug!("{} has more than one page of metafields", node.id);
            fetch_remaining_metafields(client, &node.id, after, &mut metafields).await?;
        }

        visit(RemoteEntity {
            id: node.id,
            handle: node.handle.unwrap_or_default(),
            title: node.title.unwrap_or_default(),
            tags: node.tags,
            metafields,
        })?;
    }
    Ok(())
}

async fn fetch_remaining_metafields<T: GraphqlTransport>(
    client: &ShopifyClient<T>,
    owner_id: &str,
    after: String,
    into: &mut Vec<Metafield>,
) -> Result<()> {
    let query = PageQuery::new(
        "OwnerMetafields",
        OWNER_METAFIELDS_QUERY,
        &["node", "metafields"],
    )
    .with_variable("id", owner_id)
    .starting_after(after);

    let mut nodes = std::pin::pin!(client.paginate::<MetafieldNode>(&query));
    while let Some(node) = nodes.try_next().await? {
        into.push(node.into());
    }
    Ok(())
}

//! Import an export document into a target store
//!
//! Entities are matched by exact handle. For each matched entity the
//! importer plans one action per metafield, then writes the planned values
//! with `metafieldsSet`, one call per entity (split in chunks of
//! [`METAFIELDS_SET_LIMIT`] when an entity has more).
//!
//! | Target state                 | `overwrite = false` | `overwrite = true`     |
//! |------------------------------|---------------------|------------------------|
//! | no entity with the handle    | `Skip(HandleNotFound)` | `Skip(HandleNotFound)` |
//! | metafield absent             | `Create`            | `Create`               |
//! | present, same value and type | `Skip(Exists)`      | `Skip(Unchanged)`      |
//! | present, different           | `Skip(Exists)`      | `Update`               |
//!
//! Metafields the target rejects are recorded as `Error` and the rest of
//! the entity and the run carry on. Metafields present on the target but
//! absent from the export are never touched.

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::catalog::{self, EntityKind, RemoteEntity};
use crate::client::{PageQuery, ShopifyClient};
use crate::document::{EntityRecord, ExportDocument, Metafield};
use crate::error::{Error, Result};
use crate::transport::GraphqlTransport;

/// Most inputs `metafieldsSet` accepts in one call
pub const METAFIELDS_SET_LIMIT: usize = 25;

/// Set metafield values; atomic per call
pub const METAFIELDS_SET_MUTATION: &str = r#"
mutation MetafieldsSet($metafields: [MetafieldsSetInput!]!) {
  metafieldsSet(metafields: $metafields) {
    metafields { namespace key }
    userErrors { field message }
  }
}
"#;

/// Existing metafield definitions of one owner type
pub const METAFIELD_DEFINITIONS_QUERY: &str = r#"
query MetafieldDefinitions($ownerType: MetafieldOwnerType!, $first: Int!, $after: String) {
  metafieldDefinitions(ownerType: $ownerType, first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes { namespace key type { name } }
  }
}
"#;

/// Create a metafield definition
pub const METAFIELD_DEFINITION_CREATE_MUTATION: &str = r#"
mutation MetafieldDefinitionCreate($definition: MetafieldDefinitionInput!) {
  metafieldDefinitionCreate(definition: $definition) {
    createdDefinition { id }
    userErrors { field message }
  }
}
"#;

/// Import settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Plan every action but send no mutation
    pub dry_run: bool,
    /// Replace values that already exist on the target
    pub overwrite: bool,
    /// Create missing metafield definitions before writing values
    pub create_definitions: bool,
}

/// Why a metafield was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No target entity has the exported handle
    HandleNotFound,
    /// Already present and overwrite is off
    Exists,
    /// Already present with the same value and type
    Unchanged,
}

/// Planned or applied action for one metafield
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "detail", rename_all = "snake_case")]
pub enum Action {
    /// Metafield absent on the target
    Create,
    /// Metafield present on the target and replaced
    Update,
    /// Not written
    Skip(SkipReason),
    /// Rejected, before sending or by the target
    Error(String),
}

impl Action {
    fn is_write(&self) -> bool {
        matches!(self, Action::Create | Action::Update)
    }
}

/// Result for one exported metafield
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetafieldOutcome {
    /// Namespace
    pub namespace: String,
    /// Key
    pub key: String,
    /// Declared type
    #[serde(rename = "type")]
    pub kind: String,
    /// What happened
    #[serde(flatten)]
    pub action: Action,
}

/// Result for one exported entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityOutcome {
    /// Entity kind
    pub kind: EntityKind,
    /// Exported handle
    pub handle: String,
    /// Matched target entity, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Per-metafield results, in export order
    pub metafields: Vec<MetafieldOutcome>,
}

/// Per-action totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    /// Metafields created
    pub created: usize,
    /// Metafields updated
    pub updated: usize,
    /// Metafields already holding the exported value
    pub unchanged: usize,
    /// Metafields skipped because they exist
    pub skipped_exists: usize,
    /// Metafields skipped because their entity was not found
    pub skipped_no_handle: usize,
    /// Metafields rejected
    pub errored: usize,
    /// Exported entities with no target match
    pub entities_not_found: usize,
}

impl fmt::Display for ImportCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} skipped (exists), {} skipped (no handle), {} errors",
            self.created,
            self.updated,
            self.unchanged,
            self.skipped_exists,
            self.skipped_no_handle,
            self.errored
        )
    }
}

/// Everything an import run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Whether mutations were suppressed
    pub dry_run: bool,
    /// Whether existing values were replaced
    pub overwrite: bool,
    /// Totals
    pub counts: ImportCounts,
    /// Metafield definitions created (or that would be, in a dry run)
    pub definitions_created: usize,
    /// Metafield definitions the target refused
    pub definitions_failed: usize,
    /// Per-entity detail, products first
    pub entities: Vec<EntityOutcome>,
}

impl ImportReport {
    fn tally(&mut self) {
        let mut counts = ImportCounts::default();
        for entity in &self.entities {
            if entity.target_id.is_none() {
                counts.entities_not_found += 1;
            }
            for metafield in &entity.metafields {
                match metafield.action {
                    Action::Create => counts.created += 1,
                    Action::Update => counts.updated += 1,
                    Action::Skip(SkipReason::Unchanged) => counts.unchanged += 1,
                    Action::Skip(SkipReason::Exists) => counts.skipped_exists += 1,
                    Action::Skip(SkipReason::HandleNotFound) => counts.skipped_no_handle += 1,
                    Action::Error(_) => counts.errored += 1,
                }
            }
        }
        self.counts = counts;
    }

    /// Outcome of an entity by kind and handle
    pub fn entity(&self, kind: EntityKind, handle: &str) -> Option<&EntityOutcome> {
        self.entities
            .iter()
            .find(|e| e.kind == kind && e.handle == handle)
    }

    /// Write the report as pretty JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        tracing::info!("Wrote import report to {}", path.display());
        Ok(())
    }
}

/// Namespaces the Admin API reserves for the platform
pub fn is_restricted_namespace(namespace: &str) -> bool {
    namespace == "shopify" || namespace.starts_with("shopify--")
}

/// Reference types point at store-scoped IDs and cannot be copied verbatim
pub fn is_reference_type(kind: &str) -> bool {
    kind.ends_with("_reference")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationPayload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Vec<Value>>,
    message: String,
}

impl UserError {
    /// Index of the `metafields` input this error points at
    fn input_index(&self) -> Option<usize> {
        match self.field.as_deref()? {
            [head, index, ..] if head == "metafields" => match index {
                Value::Number(n) => n.as_u64().map(|n| n as usize),
                Value::String(s) => s.parse().ok(),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DefinitionNode {
    namespace: String,
    key: String,
}

fn payload(data: &Value, field: &str, operation: &str) -> Result<MutationPayload> {
    match data.get(field) {
        Some(value) if !value.is_null() => {
            serde_json::from_value(value.clone()).map_err(|e| Error::UnexpectedResponse {
                operation: operation.to_string(),
                message: format!("malformed {} payload: {}", field, e),
            })
        }
        _ => Err(Error::UnexpectedResponse {
            operation: operation.to_string(),
            message: format!("missing {} payload", field),
        }),
    }
}

fn definition_name(namespace: &str, key: &str) -> String {
    format!("{} {}", namespace, key)
        .split(|c: char| c == ' ' || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Writes an export document into a target store
pub struct Importer<'a, T> {
    client: &'a ShopifyClient<T>,
    options: ImportOptions,
}

impl<'a, T: GraphqlTransport> Importer<'a, T> {
    /// Create an importer
    pub fn new(client: &'a ShopifyClient<T>, options: ImportOptions) -> Self {
        Self { client, options }
    }

    /// Import every entity of the document
    pub async fn run(&self, document: &ExportDocument) -> Result<ImportReport> {
        tracing::info!(
            dry_run = self.options.dry_run,
            overwrite = self.options.overwrite,
            "Importing {} products and {} collections into {}",
            document.products.len(),
            document.collections.len(),
            self.client.shop()
        );

        let mut report = ImportReport {
            dry_run: self.options.dry_run,
            overwrite: self.options.overwrite,
            ..Default::default()
        };

        for kind in EntityKind::ALL {
            let records = document.entities(kind);
            if records.is_empty() {
                continue;
            }

            let index = self.index(kind).await?;
            let mut outcomes: Vec<EntityOutcome> = records
                .iter()
                .map(|record| self.plan(kind, record, index.get(&record.handle)))
                .collect();

            if self.options.create_definitions {
                let (created, failed) = self.ensure_definitions(kind, records, &outcomes).await?;
                report.definitions_created += created;
                report.definitions_failed += failed;
            }

            for (record, outcome) in records.iter().zip(outcomes.iter_mut()) {
                self.apply(record, outcome).await?;
            }
            report.entities.extend(outcomes);
        }

        report.tally();
        tracing::info!("Import finished: {}", report.counts);
        Ok(report)
    }

    /// Target entities of one kind by handle
    async fn index(&self, kind: EntityKind) -> Result<HashMap<String, RemoteEntity>> {
        let mut index = HashMap::new();
        catalog::for_each_entity(self.client, kind, |entity| {
            if !entity.handle.is_empty() {
                index.insert(entity.handle.clone(), entity);
            }
            Ok(())
        })
        .await?;
        tracing::info!("Indexed {} target {}", index.len(), kind);
        Ok(index)
    }

    fn plan(
        &self,
        kind: EntityKind,
        record: &EntityRecord,
        target: Option<&RemoteEntity>,
    ) -> EntityOutcome {
        let outcome = |m: &Metafield, action| MetafieldOutcome {
            namespace: m.namespace.clone(),
            key: m.key.clone(),
            kind: m.kind.clone(),
            action,
        };

        let Some(target) = target else {
            if record.handle.is_empty() {
                tracing::warn!("Skipping exported {} entry with a missing handle", kind);
            } else {
                tracing::warn!("No target {} with handle '{}'", kind, record.handle);
            }
            return EntityOutcome {
                kind,
                handle: record.handle.clone(),
                target_id: None,
                metafields: record
                    .metafields
                    .iter()
                    .map(|m| outcome(m, Action::Skip(SkipReason::HandleNotFound)))
                    .collect(),
            };
        };

        let existing: HashMap<(&str, &str), &Metafield> = target
            .metafields
            .iter()
            .map(|m| ((m.namespace.as_str(), m.key.as_str()), m))
            .collect();

        let metafields = record
            .metafields
            .iter()
            .map(|m| {
                let action = if is_restricted_namespace(&m.namespace) {
                    Action::Error(format!("restricted namespace '{}'", m.namespace))
                } else if is_reference_type(&m.kind) {
                    Action::Error(format!(
                        "{} requires cross-store id remapping",
                        m.kind
                    ))
                } else {
                    match existing.get(&(m.namespace.as_str(), m.key.as_str())) {
                        None => Action::Create,
                        Some(_) if !self.options.overwrite => Action::Skip(SkipReason::Exists),
                        Some(current) if current.value == m.value && current.kind == m.kind => {
                            Action::Skip(SkipReason::Unchanged)
                        }
                        Some(_) => Action::Update,
                    }
                };
                outcome(m, action)
            })
            .collect();

        EntityOutcome {
            kind,
            handle: record.handle.clone(),
            target_id: Some(target.id.clone()),
            metafields,
        }
    }

    /// Write the planned values of one entity
    async fn apply(&self, record: &EntityRecord, outcome: &mut EntityOutcome) -> Result<()> {
        let Some(owner_id) = outcome.target_id.clone() else {
            return Ok(());
        };
        let pending: Vec<usize> = outcome
            .metafields
            .iter()
            .enumerate()
            .filter(|(_, m)| m.action.is_write())
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        if self.options.dry_run {
            tracing::info!(
                "Would write {} metafields on {} '{}'",
                pending.len(),
                outcome.kind,
                outcome.handle
            );
            return Ok(());
        }

        for chunk in pending.chunks(METAFIELDS_SET_LIMIT) {
            let mut batch = chunk.to_vec();
            while !batch.is_empty() {
                let inputs: Vec<Value> = batch
                    .iter()
                    .map(|&i| {
                        let m = &record.metafields[i];
                        json!({
                            "ownerId": owner_id,
                            "namespace": m.namespace,
                            "key": m.key,
                            "value": m.value,
                            "type": m.kind,
                        })
                    })
                    .collect();

                let result = self
                    .client
                    .query(
                        "MetafieldsSet",
                        METAFIELDS_SET_MUTATION,
                        json!({ "metafields": inputs }),
                    )
                    .await
                    .and_then(|data| payload(&data, "metafieldsSet", "MetafieldsSet"));

                let user_errors = match result {
                    Ok(payload) => payload.user_errors,
                    Err(e) if !e.is_fatal() => {
                        tracing::error!("metafieldsSet failed on '{}': {}", outcome.handle, e);
                        for &i in &batch {
                            outcome.metafields[i].action = Action::Error(e.to_string());
                        }
                        break;
                    }
                    Err(e) => return Err(e),
                };

                if user_errors.is_empty() {
                    tracing::info!(
                        "Wrote {} metafields on {} '{}'",
                        batch.len(),
                        outcome.kind,
                        outcome.handle
                    );
                    break;
                }

                // The call is all-or-nothing: drop the inputs the target
                // pointed at and resend the rest.
                let mut rejected = HashSet::new();
                for error in &user_errors {
                    if let Some(&i) = error.input_index().and_then(|pos| batch.get(pos)) {
                        let m = &outcome.metafields[i];
                        tracing::error!(
                            "Rejected {}.{} on '{}': {}",
                            m.namespace,
                            m.key,
                            outcome.handle,
                            error.message
                        );
                        outcome.metafields[i].action = Action::Error(error.message.clone());
                        rejected.insert(i);
                    }
                }

                if rejected.is_empty() {
                    let message = user_errors
                        .iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    tracing::error!("metafieldsSet rejected '{}': {}", outcome.handle, message);
                    for &i in &batch {
                        outcome.metafields[i].action = Action::Error(message.clone());
                    }
                    break;
                }
                batch.retain(|i| !rejected.contains(i));
            }
        }
        Ok(())
    }

    /// Create definitions for keys about to be created that the target does
    /// not define yet. Returns (created, failed).
    async fn ensure_definitions(
        &self,
        kind: EntityKind,
        records: &[EntityRecord],
        outcomes: &[EntityOutcome],
    ) -> Result<(usize, usize)> {
        let mut wanted: BTreeMap<(String, String), String> = BTreeMap::new();
        for (record, outcome) in records.iter().zip(outcomes) {
            for (m, planned) in record.metafields.iter().zip(&outcome.metafields) {
                if planned.action == Action::Create {
                    wanted
                        .entry((m.namespace.clone(), m.key.clone()))
                        .or_insert_with(|| m.kind.clone());
                }
            }
        }
        if wanted.is_empty() {
            return Ok((0, 0));
        }

        let query = PageQuery::new(
            "MetafieldDefinitions",
            METAFIELD_DEFINITIONS_QUERY,
            &["metafieldDefinitions"],
        )
        .with_variable("ownerType", kind.owner_type());
        let existing: HashSet<(String, String)> = self
            .client
            .paginate::<DefinitionNode>(&query)
            .map_ok(|d| (d.namespace, d.key))
            .try_collect()
            .await?;

        let (mut created, mut failed) = (0, 0);
        for ((namespace, key), metafield_type) in wanted {
            if existing.contains(&(namespace.clone(), key.clone())) {
                continue;
            }
            if self.options.dry_run {
                tracing::info!("Would create {} definition {}.{}", kind, namespace, key);
                created += 1;
                continue;
            }

            let variables = json!({"definition": {
                "name": definition_name(&namespace, &key),
                "namespace": namespace,
                "key": key,
                "type": metafield_type,
                "ownerType": kind.owner_type(),
            }});
            let result = self
                .client
                .query(
                    "MetafieldDefinitionCreate",
                    METAFIELD_DEFINITION_CREATE_MUTATION,
                    variables,
                )
                .await
                .and_then(|data| {
                    payload(&data, "metafieldDefinitionCreate", "MetafieldDefinitionCreate")
                });

            match result {
                Ok(p) if p.user_errors.is_empty() => {
                    tracing::info!("Created {} definition {}.{}", kind, namespace, key);
                    created += 1;
                }
                Ok(p) => {
                    let messages: Vec<String> = p.user_errors.into_iter().map(|e| e.message).collect();
                    tracing::warn!(
                        "Could not create definition {}.{}: {}",
                        namespace,
                        key,
                        messages.join("; ")
                    );
                    failed += 1;
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Could not create definition {}.{}: {}", namespace, key, e);
                    failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((created, failed))
    }
}

/// Import a document into a target store
pub async fn import<T: GraphqlTransport>(
    document: &ExportDocument,
    client: &ShopifyClient<T>,
    options: ImportOptions,
) -> Result<ImportReport> {
    Importer::new(client, options).run(document).await
}

//! Test doubles for the transport seam

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::catalog::EntityKind;
use crate::config::Config;
use crate::client::ShopifyClient;
use crate::document::Metafield;
use crate::transport::{GraphqlRequest, GraphqlTransport, HttpReply, TransportError};

/// Replays a fixed list of replies in order
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpReply, String>>>,
    requests: Mutex<Vec<GraphqlRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: Vec<Result<HttpReply, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<GraphqlRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphqlTransport for ScriptedTransport {
    fn shop(&self) -> &str {
        "scripted.myshopify.com"
    }

    async fn send(&self, request: &GraphqlRequest) -> Result<HttpReply, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(TransportError(message)),
            None => panic!("no scripted reply left for {}", request.operation_name),
        }
    }
}

/// A product or collection held by [`FakeShop`]
#[derive(Debug, Clone)]
pub(crate) struct FakeEntity {
    pub(crate) id: String,
    pub(crate) handle: String,
    pub(crate) title: String,
    pub(crate) tags: Vec<String>,
    pub(crate) metafields: Vec<Metafield>,
}

#[derive(Debug, Clone)]
struct FakeDefinition {
    owner_type: String,
    namespace: String,
    key: String,
    kind: String,
}

#[derive(Default)]
struct ShopState {
    products: Vec<FakeEntity>,
    collections: Vec<FakeEntity>,
    definitions: Vec<FakeDefinition>,
    metafield_page_size: usize,
    throttle_remaining: u32,
    fail_operation: Option<(String, usize)>,
    canned: HashMap<String, Value>,
    rejected_types: HashSet<String>,
    requests: Vec<GraphqlRequest>,
    calls: HashMap<String, usize>,
    next_id: u64,
}

/// In-memory store answering the operations this crate sends.
///
/// Cursors are stringified offsets, mutations are applied to the held
/// entities, and `metafieldsSet` is all-or-nothing like the real API.
pub(crate) struct FakeShop {
    state: Mutex<ShopState>,
}

const MUTATIONS: [&str; 3] = [
    "MetafieldsSet",
    "MetafieldDefinitionCreate",
    "ProductTagsUpdate",
];

impl FakeShop {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ShopState {
                metafield_page_size: 250,
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Client over this shop with a small page size so tests cross pages
    pub(crate) fn client(self, page_size: u32) -> ShopifyClient<FakeShop> {
        let config = Config {
            page_size,
            ..Config::default()
        };
        ShopifyClient::new(self, &config)
    }

    pub(crate) fn with_product(
        self,
        handle: &str,
        tags: &[&str],
        metafields: Vec<Metafield>,
    ) -> Self {
        self.add(EntityKind::Product, handle, tags, metafields);
        self
    }

    pub(crate) fn with_collection(self, handle: &str, metafields: Vec<Metafield>) -> Self {
        self.add(EntityKind::Collection, handle, &[], metafields);
        self
    }

    pub(crate) fn with_definition(self, kind: EntityKind, namespace: &str, key: &str) -> Self {
        self.state.lock().unwrap().definitions.push(FakeDefinition {
            owner_type: kind.owner_type().to_string(),
            namespace: namespace.to_string(),
            key: key.to_string(),
            kind: "single_line_text_field".to_string(),
        });
        self
    }

    fn add(&self, kind: EntityKind, handle: &str, tags: &[&str], metafields: Vec<Metafield>) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let entity = FakeEntity {
            id: match kind {
                EntityKind::Product => format!("gid://shopify/Product/{}", id),
                EntityKind::Collection => format!("gid://shopify/Collection/{}", id),
            },
            handle: handle.to_string(),
            title: title_for(handle),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            metafields,
        };
        match kind {
            EntityKind::Product => state.products.push(entity),
            EntityKind::Collection => state.collections.push(entity),
        }
    }

    /// Answer the next `n` requests with a THROTTLED error
    pub(crate) fn throttle_next(&self, n: u32) {
        self.state.lock().unwrap().throttle_remaining = n;
    }

    /// Fail every call of `operation` after the first `after` succeeded
    pub(crate) fn fail_operation_after(&self, operation: &str, after: usize) {
        self.state.lock().unwrap().fail_operation = Some((operation.to_string(), after));
    }

    /// Answer every call of `operation` with this `data` object
    pub(crate) fn answer_with(&self, operation: &str, data: Value) {
        self.state.lock().unwrap().canned.insert(operation.to_string(), data);
    }

    /// Reject values of a metafield type in `metafieldsSet`
    pub(crate) fn reject_type(&self, kind: &str) {
        self.state.lock().unwrap().rejected_types.insert(kind.to_string());
    }

    pub(crate) fn set_metafield_page_size(&self, size: usize) {
        self.state.lock().unwrap().metafield_page_size = size;
    }

    pub(crate) fn requests(&self) -> Vec<GraphqlRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub(crate) fn calls(&self, operation: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.operation_name == operation)
            .count()
    }

    pub(crate) fn mutation_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| MUTATIONS.contains(&r.operation_name.as_str()))
            .count()
    }

    pub(crate) fn product(&self, handle: &str) -> FakeEntity {
        let state = self.state.lock().unwrap();
        state
            .products
            .iter()
            .find(|p| p.handle == handle)
            .cloned()
            .unwrap_or_else(|| panic!("no product {}", handle))
    }

    pub(crate) fn collection(&self, handle: &str) -> FakeEntity {
        let state = self.state.lock().unwrap();
        state
            .collections
            .iter()
            .find(|c| c.handle == handle)
            .cloned()
            .unwrap_or_else(|| panic!("no collection {}", handle))
    }

    pub(crate) fn definition_keys(&self, kind: EntityKind) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .definitions
            .iter()
            .filter(|d| d.owner_type == kind.owner_type())
            .map(|d| format!("{}.{}", d.namespace, d.key))
            .collect()
    }
}

fn title_for(handle: &str) -> String {
    handle
        .split('-')
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

/// Offsets of the page requested by `first`/`after`
fn window(len: usize, variables: &Value) -> (usize, usize, bool) {
    let first = variables["first"].as_u64().unwrap_or(50) as usize;
    let start = variables["after"]
        .as_str()
        .and_then(|c| c.strip_prefix("cursor-"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0usize)
        .min(len);
    let end = (start + first).min(len);
    (start, end, end < len)
}

fn page_info(start: usize, end: usize, has_next: bool) -> Value {
    let cursor = (end > start).then(|| format!("cursor-{}", end));
    json!({"hasNextPage": has_next, "endCursor": cursor})
}

fn metafield_json(m: &Metafield) -> Value {
    json!({"namespace": m.namespace, "key": m.key, "type": m.kind, "value": m.value})
}

impl ShopState {
    fn entities(&self, kind: EntityKind) -> &Vec<FakeEntity> {
        match kind {
            EntityKind::Product => &self.products,
            EntityKind::Collection => &self.collections,
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut FakeEntity> {
        self.products
            .iter_mut()
            .chain(self.collections.iter_mut())
            .find(|e| e.id == id)
    }

    fn entity_page(&self, kind: EntityKind, variables: &Value) -> Value {
        let list = self.entities(kind);
        let (start, end, has_next) = window(list.len(), variables);
        let nodes: Vec<Value> = list[start..end]
            .iter()
            .map(|e| {
                let inline = e.metafields.len().min(self.metafield_page_size);
                let more = e.metafields.len() > inline;
                let mut node = json!({
                    "id": e.id,
                    "handle": e.handle,
                    "title": e.title,
                    "metafields": {
                        "pageInfo": page_info(0, inline, more),
                        "nodes": e.metafields[..inline].iter().map(metafield_json).collect::<Vec<_>>(),
                    }
                });
                if kind == EntityKind::Product {
                    node["tags"] = json!(e.tags);
                }
                node
            })
            .collect();
        let mut data = serde_json::Map::new();
        data.insert(
            kind.to_string(),
            json!({"pageInfo": page_info(start, end, has_next), "nodes": nodes}),
        );
        Value::Object(data)
    }

    fn owner_metafields(&self, variables: &Value) -> Value {
        let id = variables["id"].as_str().unwrap_or_default();
        let Some(entity) = self.products.iter().chain(&self.collections).find(|e| e.id == id)
        else {
            return json!({"node": null});
        };
        let (start, end, has_next) = window(entity.metafields.len(), variables);
        json!({"node": {"metafields": {
            "pageInfo": page_info(start, end, has_next),
            "nodes": entity.metafields[start..end].iter().map(metafield_json).collect::<Vec<_>>(),
        }}})
    }

    fn metafields_set(&mut self, variables: &Value) -> Value {
        let inputs = variables["metafields"].as_array().cloned().unwrap_or_default();
        let mut user_errors = Vec::new();

        if inputs.len() > 25 {
            user_errors.push(json!({
                "field": ["metafields"],
                "message": "Exceeded the maximum metafields input limit of 25."
            }));
        }
        for (i, input) in inputs.iter().enumerate() {
            let owner = input["ownerId"].as_str().unwrap_or_default();
            let namespace = input["namespace"].as_str().unwrap_or_default();
            let kind = input["type"].as_str().unwrap_or_default();
            if self.find_mut(owner).is_none() {
                user_errors.push(json!({
                    "field": ["metafields", i.to_string(), "ownerId"],
                    "message": "Owner does not exist."
                }));
            } else if namespace == "shopify" {
                user_errors.push(json!({
                    "field": ["metafields", i.to_string(), "namespace"],
                    "message": "Access to this namespace is denied."
                }));
            } else if self.rejected_types.contains(kind) {
                user_errors.push(json!({
                    "field": ["metafields", i.to_string(), "value"],
                    "message": format!("Value is invalid for type {}.", kind)
                }));
            }
        }

        if !user_errors.is_empty() {
            return json!({"metafieldsSet": {"metafields": null, "userErrors": user_errors}});
        }

        for input in &inputs {
            let owner = input["ownerId"].as_str().unwrap_or_default();
            let metafield = Metafield::new(
                input["namespace"].as_str().unwrap_or_default(),
                input["key"].as_str().unwrap_or_default(),
                input["value"].as_str().unwrap_or_default(),
                input["type"].as_str().unwrap_or_default(),
            );
            if let Some(entity) = self.find_mut(owner) {
                match entity
                    .metafields
                    .iter_mut()
                    .find(|m| m.namespace == metafield.namespace && m.key == metafield.key)
                {
                    Some(existing) => *existing = metafield,
                    None => entity.metafields.push(metafield),
                }
            }
        }
        json!({"metafieldsSet": {
            "metafields": inputs.iter().map(|i| json!({"namespace": i["namespace"], "key": i["key"]})).collect::<Vec<_>>(),
            "userErrors": []
        }})
    }

    fn definitions_page(&self, variables: &Value) -> Value {
        let owner_type = variables["ownerType"].as_str().unwrap_or_default();
        let matching: Vec<&FakeDefinition> = self
            .definitions
            .iter()
            .filter(|d| d.owner_type == owner_type)
            .collect();
        let (start, end, has_next) = window(matching.len(), variables);
        let nodes: Vec<Value> = matching[start..end]
            .iter()
            .map(|d| json!({"namespace": d.namespace, "key": d.key, "type": {"name": d.kind}}))
            .collect();
        json!({"metafieldDefinitions": {"pageInfo": page_info(start, end, has_next), "nodes": nodes}})
    }

    fn create_definition(&mut self, variables: &Value) -> Value {
        let definition = &variables["definition"];
        let id = self.next_id;
        self.next_id += 1;
        self.definitions.push(FakeDefinition {
            owner_type: definition["ownerType"].as_str().unwrap_or_default().to_string(),
            namespace: definition["namespace"].as_str().unwrap_or_default().to_string(),
            key: definition["key"].as_str().unwrap_or_default().to_string(),
            kind: definition["type"].as_str().unwrap_or_default().to_string(),
        });
        json!({"metafieldDefinitionCreate": {
            "createdDefinition": {"id": format!("gid://shopify/MetafieldDefinition/{}", id)},
            "userErrors": []
        }})
    }

    fn tag_page(&self, variables: &Value) -> Value {
        let (start, end, has_next) = window(self.products.len(), variables);
        let nodes: Vec<Value> = self.products[start..end]
            .iter()
            .map(|p| {
                let color = p
                    .metafields
                    .iter()
                    .find(|m| m.namespace == "custom" && m.key == "cor")
                    .map(|m| json!({"value": m.value}));
                json!({"id": p.id, "handle": p.handle, "title": p.title, "tags": p.tags, "metafield": color})
            })
            .collect();
        json!({"products": {"pageInfo": page_info(start, end, has_next), "nodes": nodes}})
    }

    fn update_tags(&mut self, variables: &Value) -> Value {
        let input = &variables["input"];
        let id = input["id"].as_str().unwrap_or_default().to_string();
        let tags: Vec<String> = input["tags"]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        match self.products.iter_mut().find(|p| p.id == id) {
            Some(product) => {
                product.tags = tags;
                json!({"productUpdate": {"product": {"id": id, "tags": product.tags}, "userErrors": []}})
            }
            None => json!({"productUpdate": {"product": null, "userErrors": [
                {"field": ["id"], "message": "Product does not exist"}
            ]}}),
        }
    }
}

#[async_trait]
impl GraphqlTransport for FakeShop {
    fn shop(&self) -> &str {
        "fake.myshopify.com"
    }

    async fn send(&self, request: &GraphqlRequest) -> Result<HttpReply, TransportError> {
        Ok(self.answer(request))
    }
}

impl FakeShop {
    fn answer(&self, request: &GraphqlRequest) -> HttpReply {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        let operation = request.operation_name.as_str();

        if state.throttle_remaining > 0 {
            state.throttle_remaining -= 1;
            return HttpReply::ok(json!({
                "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}],
                "extensions": {"cost": {
                    "requestedQueryCost": 100,
                    "throttleStatus": {"maximumAvailable": 1000, "currentlyAvailable": 0, "restoreRate": 50}
                }}
            }));
        }

        let call = {
            let counter = state.calls.entry(operation.to_string()).or_default();
            *counter += 1;
            *counter - 1
        };
        if let Some((failing, after)) = &state.fail_operation {
            if failing == operation && call >= *after {
                return HttpReply::ok(json!({
                    "errors": [{"message": format!("{} failed in fake shop", operation)}]
                }));
            }
        }

        if let Some(data) = state.canned.get(operation) {
            return HttpReply::ok(json!({ "data": data }));
        }

        let variables = &request.variables;
        let data = match operation {
            "ExportProducts" => state.entity_page(EntityKind::Product, variables),
            "ExportCollections" => state.entity_page(EntityKind::Collection, variables),
            "OwnerMetafields" => state.owner_metafields(variables),
            "MetafieldsSet" => state.metafields_set(variables),
            "MetafieldDefinitions" => state.definitions_page(variables),
            "MetafieldDefinitionCreate" => state.create_definition(variables),
            "TagProducts" => state.tag_page(variables),
            "ProductTagsUpdate" => state.update_tags(variables),
            other => panic!("fake shop does not implement {}", other),
        };
        HttpReply::ok(json!({ "data": data }))
    }
}

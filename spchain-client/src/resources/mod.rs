//! Typed composition nodes over the engine. Each wrapper only knows its path
//! segments and how its operations are phrased on the wire.

pub mod folders;
pub mod lists;
pub mod taxonomy;
pub mod user_custom_actions;
pub mod web;

pub use folders::{Folder, Folders};
pub use lists::{List, Lists};
pub use taxonomy::{Taxonomy, TaxonomySession, Term, TermSet, TermStore, TermStores, Terms};
pub use user_custom_actions::{UserCustomAction, UserCustomActions};
pub use web::{Site, Web, Webs};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use spchain_core::{ActionHandle, ActionKind, ActionRequest, ResourceNode, RestOperation, SpError};
use uuid::Uuid;

/// Handle on a create together with the resource it produces. The resource
/// addresses the new object once the create has completed.
#[derive(Debug)]
pub struct Created<R> {
    pub handle: ActionHandle<Value>,
    pub resource: R,
}

/// Strip the OData envelope: `{"d": {...}}`, `{"d": {"results": [...]}}` and
/// `{"value": [...]}` all yield their payload.
pub fn odata_payload(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            if let Some(d) = map.remove("d") {
                return match d {
                    Value::Object(mut inner) if inner.get("results").is_some_and(Value::is_array) => {
                        inner.remove("results").unwrap_or(Value::Null)
                    }
                    other => other,
                };
            }
            match map.remove("value") {
                Some(items @ Value::Array(_)) if map.keys().all(|k| k.starts_with("odata.") || k.starts_with('@')) => {
                    items
                }
                Some(other) => {
                    map.insert("value".to_string(), other);
                    Value::Object(map)
                }
                None => Value::Object(map),
            }
        }
        other => other,
    }
}

/// Deserialize a result into a caller-chosen shape.
pub fn parse<T: DeserializeOwned>(value: Value) -> Result<T, SpError> {
    serde_json::from_value(value).map_err(|e| SpError::parse(e.to_string()))
}

/// Parse a client-svc `"/Guid(...)/"` or a plain GUID string.
pub fn parse_guid(value: &Value) -> Option<Uuid> {
    let text = value.as_str()?;
    let inner = text
        .strip_prefix("/Guid(")
        .and_then(|rest| rest.strip_suffix(")/"))
        .unwrap_or(text);
    Uuid::parse_str(inner).ok()
}

fn with_metadata(entity_type: &str, props: Value) -> Result<Value, SpError> {
    let Value::Object(props) = props else {
        return Err(SpError::configuration(format!(
            "{} properties must be a JSON object",
            entity_type
        )));
    };
    let mut body = Map::new();
    body.insert("__metadata".to_string(), serde_json::json!({ "type": entity_type }));
    body.extend(props);
    Ok(Value::Object(body))
}

pub(crate) fn rest_get(node: &ResourceNode) -> Result<ActionHandle<Value>, SpError> {
    Ok(node
        .enqueue(ActionRequest::rest(ActionKind::Read, RestOperation::get()))?
        .map(|value| Ok(odata_payload(value))))
}

pub(crate) fn rest_get_as<T>(node: &ResourceNode) -> Result<ActionHandle<T>, SpError>
where
    T: DeserializeOwned + Send + 'static,
{
    Ok(rest_get(node)?.map(parse::<T>))
}

pub(crate) fn rest_update(node: &ResourceNode, entity_type: &str, props: Value) -> Result<ActionHandle<()>, SpError> {
    let body = with_metadata(entity_type, props)?;
    Ok(node
        .enqueue(ActionRequest::rest(ActionKind::Update, RestOperation::merge(body)))?
        .map(|_| Ok(())))
}

pub(crate) fn rest_delete(node: &ResourceNode) -> Result<ActionHandle<()>, SpError> {
    Ok(node
        .enqueue(ActionRequest::rest(ActionKind::Delete, RestOperation::delete()))?
        .map(|_| Ok(())))
}

/// Enqueue a `POST` built by the caller; the result loses its OData envelope.
pub(crate) fn rest_post(node: &ResourceNode, request: ActionRequest) -> Result<ActionHandle<Value>, SpError> {
    Ok(node.enqueue(request)?.map(|value| Ok(odata_payload(value))))
}

/// Pair a create handle with the typed node standing for its result.
pub(crate) fn created<R>(handle: ActionHandle<Value>, wrap: impl FnOnce(ResourceNode) -> R) -> Result<Created<R>, SpError> {
    let node = handle
        .produced()
        .ok_or_else(|| SpError::protocol("create action did not yield a produced reference"))?;
    Ok(Created {
        handle,
        resource: wrap(node),
    })
}

/// Node of `<web>/_api/web` on the same endpoint as `node`.
pub(crate) fn web_root(node: &ResourceNode) -> Option<ResourceNode> {
    node.context().map(|context| context.rest_root().path("web"))
}

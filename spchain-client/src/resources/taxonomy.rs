//! Managed metadata over client-svc: session, term stores, term sets, terms.

use super::{created, parse_guid, Created};
use serde_json::Value;
use spchain_core::{ActionHandle, ActionKind, ActionRequest, Arg, ClientSvcOperation, ResourceNode, Segment, SpError};
use uuid::Uuid;

/// Type id of `SP.Taxonomy.TaxonomySession`.
pub const SESSION_TYPE_ID: &str = "{981cbc68-9edc-4f8d-872f-71146fcbb84f}";

/// Default language of labels and descriptions.
pub const DEFAULT_LCID: u32 = 1033;

const CHILD_ITEMS: &str = "_Child_Items_";

resource!(
    /// Client-svc root the taxonomy session hangs off
    Taxonomy
);
resource!(TaxonomySession);
resource!(TermStores);
resource!(TermStore);
resource!(TermSet);
resource!(Terms);
resource!(Term);

fn load(node: &ResourceNode) -> Result<ActionHandle<Value>, SpError> {
    node.enqueue(ActionRequest::client_svc(ActionKind::Read, ClientSvcOperation::query()))
}

fn load_items(node: &ResourceNode) -> Result<ActionHandle<Vec<Value>>, SpError> {
    Ok(load(node)?.map(|value| match value {
        Value::Object(mut map) => match map.remove(CHILD_ITEMS) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(SpError::parse("collection result has no child items")),
        },
        Value::Array(items) => Ok(items),
        _ => Err(SpError::parse("collection result is not an object")),
    }))
}

fn call<I, A>(node: &ResourceNode, kind: ActionKind, name: &str, params: I) -> Result<ActionHandle<Value>, SpError>
where
    I: IntoIterator<Item = A>,
    A: Into<Arg>,
{
    node.enqueue(ActionRequest::client_svc(kind, ClientSvcOperation::method(name, params)))
}

fn unit(handle: ActionHandle<Value>) -> ActionHandle<()> {
    handle.map(|_| Ok(()))
}

fn no_args() -> Vec<Arg> {
    Vec::new()
}

/// Scalar JSON property value as a client-svc parameter.
fn scalar_arg(name: &str, value: &Value) -> Result<Arg, SpError> {
    match value {
        Value::String(s) => Ok(Arg::Str(s.clone())),
        Value::Bool(b) => Ok(Arg::Bool(*b)),
        Value::Null => Ok(Arg::Null),
        Value::Number(n) => n
            .as_i64()
            .map(Arg::Int)
            .or_else(|| n.as_f64().map(Arg::Float))
            .ok_or_else(|| SpError::configuration(format!("property '{}' is out of range", name))),
        _ => Err(SpError::configuration(format!(
            "property '{}' must be a scalar value",
            name
        ))),
    }
}

impl Taxonomy {
    pub fn session(&self) -> TaxonomySession {
        TaxonomySession(self.0.descend(Segment::StaticMethod {
            type_id: SESSION_TYPE_ID.to_string(),
            name: "GetTaxonomySession".to_string(),
            args: Vec::new(),
        }))
    }
}

impl TaxonomySession {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        load(&self.0)
    }

    pub fn term_stores(&self) -> TermStores {
        TermStores(self.0.path("TermStores"))
    }

    pub fn default_site_collection_term_store(&self) -> TermStore {
        TermStore(self.0.invoke("GetDefaultSiteCollectionTermStore", no_args()))
    }
}

impl TermStores {
    pub fn get(&self) -> Result<ActionHandle<Vec<Value>>, SpError> {
        load_items(&self.0)
    }

    pub fn get_by_name(&self, name: impl Into<String>) -> TermStore {
        TermStore(self.0.invoke("GetByName", [name.into()]))
    }

    pub fn get_by_id(&self, id: Uuid) -> TermStore {
        TermStore(self.0.invoke("GetById", [id]))
    }
}

impl TermStore {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        load(&self.0)
    }

    pub fn get_term_set_by_id(&self, id: Uuid) -> TermSet {
        TermSet(self.0.invoke("GetTermSet", [id]))
    }

    pub fn get_term_by_id(&self, id: Uuid) -> Term {
        Term(self.0.invoke("GetTerm", [id]))
    }

    /// Persist pending changes of the store.
    pub fn commit_all(&self) -> Result<ActionHandle<()>, SpError> {
        Ok(unit(call(&self.0, ActionKind::Invoke, "CommitAll", no_args())?))
    }
}

impl TermSet {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        load(&self.0)
    }

    pub fn terms(&self) -> Terms {
        Terms(self.0.path("Terms"))
    }

    pub fn get_term_by_id(&self, id: Uuid) -> Term {
        Term(self.0.invoke("GetTerm", [id]))
    }

    /// Create a top-level term. `id` is generated when absent.
    ///
    /// The returned [`Term`] is usable in the same batch; after the batch it
    /// addresses the term as `GetTerm(id)` on this set.
    pub fn add_term(&self, name: impl Into<String>, lcid: u32, id: Option<Uuid>) -> Result<Created<Term>, SpError> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let set = self.0.unbatched();
        let request = ActionRequest::client_svc(ActionKind::Create, ClientSvcOperation::Create { properties: Vec::new() })
            .with_identity(move |value| {
                let id = value.get("Id").and_then(parse_guid).unwrap_or(id);
                Some(set.invoke("GetTerm", [id]))
            });

        let target = self
            .0
            .invoke("CreateTerm", [Arg::Str(name.into()), Arg::from(lcid), Arg::Guid(id)]);
        created(target.enqueue(request)?, Term)
    }
}

impl Terms {
    pub fn get(&self) -> Result<ActionHandle<Vec<Value>>, SpError> {
        load_items(&self.0)
    }

    pub fn get_by_id(&self, id: Uuid) -> Term {
        Term(self.0.invoke("GetById", [id]))
    }

    pub fn get_by_name(&self, name: impl Into<String>) -> Term {
        Term(self.0.invoke("GetByName", [name.into()]))
    }
}

impl Term {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        load(&self.0)
    }

    /// Child terms.
    pub fn terms(&self) -> Terms {
        Terms(self.0.path("Terms"))
    }

    pub fn set_description(&self, description: impl Into<String>, lcid: u32) -> Result<ActionHandle<()>, SpError> {
        let params = [Arg::Str(description.into()), Arg::from(lcid)];
        Ok(unit(call(&self.0, ActionKind::Update, "SetDescription", params)?))
    }

    pub fn set_local_custom_property(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<ActionHandle<()>, SpError> {
        let params = [Arg::Str(name.into()), Arg::Str(value.into())];
        Ok(unit(call(&self.0, ActionKind::Update, "SetLocalCustomProperty", params)?))
    }

    pub fn deprecate(&self, deprecated: bool) -> Result<ActionHandle<()>, SpError> {
        Ok(unit(call(&self.0, ActionKind::Update, "Deprecate", [deprecated])?))
    }

    /// One `SetProperty` action per field of `props`, in field order.
    ///
    /// Either every field is enqueued or none is: values are checked and the
    /// batch must have room for all of them first.
    pub fn update(&self, props: &Value) -> Result<Vec<ActionHandle<()>>, SpError> {
        let Value::Object(props) = props else {
            return Err(SpError::configuration("term properties must be a JSON object"));
        };
        let args = props
            .iter()
            .map(|(name, value)| Ok((name, scalar_arg(name, value)?)))
            .collect::<Result<Vec<_>, SpError>>()?;
        if let Some(batch) = self.0.batch() {
            batch.ensure_room(args.len())?;
        }

        let mut handles = Vec::with_capacity(args.len());
        for (name, arg) in args {
            let handle = self.0.enqueue(ActionRequest::client_svc(
                ActionKind::Update,
                ClientSvcOperation::set_property(name.clone(), arg),
            ))?;
            handles.push(unit(handle));
        }
        Ok(handles)
    }

    pub fn create_label(
        &self,
        name: impl Into<String>,
        lcid: u32,
        is_default: bool,
    ) -> Result<ActionHandle<Value>, SpError> {
        let params = [Arg::Str(name.into()), Arg::from(lcid), Arg::Bool(is_default)];
        call(&self.0, ActionKind::Invoke, "CreateLabel", params)
    }

    pub fn delete(&self) -> Result<ActionHandle<()>, SpError> {
        Ok(unit(call(&self.0, ActionKind::Delete, "DeleteObject", no_args())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpClient;
    use serde_json::json;
    use spchain_core::{PathAnchor, Protocol};

    fn taxonomy() -> Taxonomy {
        SpClient::new_with_url("https://contoso.example").unwrap().taxonomy()
    }

    #[test]
    fn test_object_path_of_term() {
        let set_id = Uuid::new_v4();
        let term_id = Uuid::new_v4();
        let term = taxonomy()
            .session()
            .default_site_collection_term_store()
            .get_term_set_by_id(set_id)
            .get_term_by_id(term_id);

        assert_eq!(term.node().protocol(), Protocol::ClientSvc);
        let chain = term.node().object_path().unwrap();
        assert_eq!(chain.anchor, PathAnchor::Root);
        assert_eq!(chain.steps.len(), 4);
        assert!(matches!(&chain.steps[0], Segment::StaticMethod { name, .. } if name == "GetTaxonomySession"));
        assert_eq!(chain.steps[3], Segment::method("GetTerm", [term_id]));
    }

    #[test]
    fn test_scalar_args() {
        assert_eq!(scalar_arg("Name", &json!("Blue")).unwrap(), Arg::Str("Blue".into()));
        assert_eq!(scalar_arg("IsAvailableForTagging", &json!(false)).unwrap(), Arg::Bool(false));
        assert_eq!(scalar_arg("CustomSortOrder", &json!(3)).unwrap(), Arg::Int(3));
        assert!(scalar_arg("Labels", &json!(["a"])).is_err());
    }

    #[test]
    fn test_update_rejects_nested_values() {
        let term = taxonomy()
            .session()
            .default_site_collection_term_store()
            .get_term_by_id(Uuid::new_v4());
        assert!(term.update(&json!({"Name": {"nested": true}})).is_err());
        assert!(term.update(&json!("Name")).is_err());
    }

    #[test]
    fn test_update_that_does_not_fit_enqueues_nothing() {
        let config = crate::ClientConfig {
            max_batch_size: 2,
            ..crate::ClientConfig::new_with_url("https://contoso.example")
        };
        let client = SpClient::new(config).unwrap();
        let batch = client.create_batch(Protocol::ClientSvc);
        let term = client
            .taxonomy()
            .session()
            .default_site_collection_term_store()
            .get_term_by_id(Uuid::new_v4())
            .in_batch(&batch);

        let err = term
            .update(&json!({"Name": "Blue", "IsAvailableForTagging": true, "CustomSortOrder": 1}))
            .unwrap_err();
        assert!(matches!(
            err,
            SpError::Composition(spchain_core::CompositionError::BatchFull { limit: 2, .. })
        ));
        assert_eq!(batch.len(), 0);

        let handles = term.update(&json!({"Name": "Blue", "CustomSortOrder": 1})).unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(batch.len(), 2);
    }
}

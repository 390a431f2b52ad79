use super::{created, odata_payload, parse_guid, rest_delete, rest_get, rest_post, rest_update, with_metadata, Created};
use serde_json::Value;
use spchain_core::{ActionHandle, ActionKind, ActionRequest, RestOperation, SpError};
use uuid::Uuid;

resource!(
    /// Custom actions registered on a web or site
    UserCustomActions, collection
);
resource!(
    /// One custom action
    UserCustomAction
);

impl UserCustomActions {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    pub fn get_by_id(&self, id: Uuid) -> UserCustomAction {
        UserCustomAction(self.0.invoke("getById", [id]))
    }

    /// Register a custom action from `SP.UserCustomAction` fields such as
    /// `Location`, `Sequence`, `Title` and `ScriptSrc`.
    pub fn add(&self, props: Value) -> Result<Created<UserCustomAction>, SpError> {
        let body = with_metadata("SP.UserCustomAction", props)?;
        let collection = self.0.unbatched();
        let request =
            ActionRequest::rest(ActionKind::Create, RestOperation::post(Some(body))).with_identity(move |value| {
                let id = parse_guid(odata_payload(value.clone()).get("Id")?)?;
                Some(collection.invoke("getById", [id]))
            });
        created(rest_post(&self.0, request)?, UserCustomAction)
    }

    /// Remove every custom action of the scope.
    pub fn clear(&self) -> Result<ActionHandle<()>, SpError> {
        Ok(rest_post(
            &self.0.path("clear"),
            ActionRequest::rest(ActionKind::Delete, RestOperation::post(None)),
        )?
        .map(|_| Ok(())))
    }
}

impl UserCustomAction {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    pub fn update(&self, props: Value) -> Result<ActionHandle<()>, SpError> {
        rest_update(&self.0, "SP.UserCustomAction", props)
    }

    pub fn delete(&self) -> Result<ActionHandle<()>, SpError> {
        rest_delete(&self.0)
    }
}

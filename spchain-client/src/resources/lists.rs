use super::{created, rest_delete, rest_get, rest_get_as, rest_post, rest_update, with_metadata, Created, Folder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use spchain_core::{ActionHandle, ActionKind, ActionRequest, RestOperation, SpError};
use uuid::Uuid;

resource!(
    /// The lists of a web
    Lists, collection
);
resource!(
    /// One list
    List
);

/// Generic custom list.
pub const GENERIC_LIST_TEMPLATE: u32 = 100;
/// Document library.
pub const DOCUMENT_LIBRARY_TEMPLATE: u32 = 101;

impl Lists {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    pub fn get_by_title(&self, title: impl Into<String>) -> List {
        List(self.0.invoke("getByTitle", [title.into()]))
    }

    pub fn get_by_id(&self, id: Uuid) -> List {
        List(self.0.invoke("getById", [id]))
    }

    /// Create a list. The returned [`List`] can be used in the same batch and
    /// resolves to `getByTitle(title)` once created.
    pub fn add(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        template: u32,
        enable_content_types: bool,
    ) -> Result<Created<List>, SpError> {
        let title = title.into();
        let body = with_metadata(
            "SP.List",
            json!({
                "Title": title,
                "Description": description.into(),
                "BaseTemplate": template,
                "ContentTypesEnabled": enable_content_types,
            }),
        )?;

        let lists = self.0.unbatched();
        let request = ActionRequest::rest(ActionKind::Create, RestOperation::post(Some(body)))
            .with_identity(move |_| Some(lists.invoke("getByTitle", [title.clone()])));
        created(rest_post(&self.0, request)?, List)
    }
}

impl List {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    pub fn get_as<T>(&self) -> Result<ActionHandle<T>, SpError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        rest_get_as(&self.0)
    }

    pub fn update(&self, props: Value) -> Result<ActionHandle<()>, SpError> {
        rest_update(&self.0, "SP.List", props)
    }

    pub fn delete(&self) -> Result<ActionHandle<()>, SpError> {
        rest_delete(&self.0)
    }

    pub fn root_folder(&self) -> Folder {
        Folder::from_node(self.0.path("rootFolder"))
    }
}

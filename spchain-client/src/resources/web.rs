use super::{rest_delete, rest_get, rest_get_as, rest_post, rest_update, with_metadata, Folder, Folders, List, Lists, UserCustomActions};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use spchain_core::{ActionHandle, ActionKind, ActionRequest, RestOperation, SpError};

resource!(
    /// A web: `_api/web` or any web reached from it
    Web
);
resource!(
    /// The child webs of a web
    Webs, collection
);
resource!(
    /// The site collection: `_api/site`
    Site
);

impl Web {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    pub fn get_as<T>(&self) -> Result<ActionHandle<T>, SpError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        rest_get_as(&self.0)
    }

    /// Merge `props` into the web. `props` is an object of `SP.Web` fields.
    pub fn update(&self, props: Value) -> Result<ActionHandle<()>, SpError> {
        rest_update(&self.0, "SP.Web", props)
    }

    pub fn delete(&self) -> Result<ActionHandle<()>, SpError> {
        rest_delete(&self.0)
    }

    pub fn webs(&self) -> Webs {
        Webs(self.0.path("webs"))
    }

    pub fn lists(&self) -> Lists {
        Lists::from_node(self.0.path("lists"))
    }

    pub fn folders(&self) -> Folders {
        Folders::from_node(self.0.path("folders"))
    }

    pub fn root_folder(&self) -> Folder {
        Folder::from_node(self.0.path("rootFolder"))
    }

    pub fn user_custom_actions(&self) -> UserCustomActions {
        UserCustomActions::from_node(self.0.path("userCustomActions"))
    }

    /// List by its web-relative url, e.g. `Lists/Tasks`.
    pub fn get_list(&self, url: impl Into<String>) -> List {
        List::from_node(self.0.invoke("getList", [url.into()]))
    }

    pub fn get_folder_by_server_relative_url(&self, url: impl Into<String>) -> Folder {
        Folder::from_node(self.0.invoke("getFolderByServerRelativeUrl", [url.into()]))
    }

    /// Resolve a login to a site user, adding it to the web when missing.
    pub fn ensure_user(&self, login: impl Into<String>) -> Result<ActionHandle<Value>, SpError> {
        let body = json!({ "logonName": login.into() });
        rest_post(
            &self.0.path("ensureuser"),
            ActionRequest::rest(ActionKind::Invoke, RestOperation::post(Some(body))),
        )
    }
}

/// Fields of a new child web.
#[derive(Debug, Clone, PartialEq)]
pub struct WebCreation {
    pub title: String,
    pub url: String,
    pub description: String,
    pub template: String,
    pub language: u32,
    pub inherit_permissions: bool,
}

impl WebCreation {
    /// Team site in English that inherits its parent's permissions.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: String::new(),
            template: "STS".to_string(),
            language: 1033,
            inherit_permissions: true,
        }
    }
}

impl Webs {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    /// Create a child web. A new web lives under its own base url, so the
    /// result carries no in-batch identity.
    pub fn add(&self, web: WebCreation) -> Result<ActionHandle<Value>, SpError> {
        let parameters = with_metadata(
            "SP.WebCreationInformation",
            json!({
                "Title": web.title,
                "Url": web.url,
                "Description": web.description,
                "WebTemplate": web.template,
                "Language": web.language,
                "UseSamePermissionsAsParentSite": web.inherit_permissions,
            }),
        )?;
        rest_post(
            &self.0.path("add"),
            ActionRequest::rest(ActionKind::Invoke, RestOperation::post(Some(json!({ "parameters": parameters })))),
        )
    }
}

impl Site {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    pub fn root_web(&self) -> Web {
        Web(self.0.path("rootWeb"))
    }

    pub fn user_custom_actions(&self) -> UserCustomActions {
        UserCustomActions::from_node(self.0.path("userCustomActions"))
    }
}

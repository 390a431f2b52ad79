use super::{created, odata_payload, rest_delete, rest_get, rest_post, web_root, Created};
use serde_json::Value;
use spchain_core::{ActionHandle, ActionKind, ActionRequest, RestOperation, SpError};

resource!(
    /// Folders of a web or of a parent folder
    Folders, collection
);
resource!(
    /// One folder
    Folder
);

impl Folders {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    pub fn get_by_name(&self, name: impl Into<String>) -> Folder {
        Folder(self.0.invoke("getByName", [name.into()]))
    }

    /// Create a folder at `url`, relative to the collection or server-relative.
    /// The new folder is addressed by its `ServerRelativeUrl` once created.
    pub fn add(&self, url: impl Into<String>) -> Result<Created<Folder>, SpError> {
        let web = web_root(&self.0);
        let request = ActionRequest::rest(ActionKind::Create, RestOperation::post(None)).with_identity(move |value| {
            let payload = odata_payload(value.clone());
            let server_relative = payload.get("ServerRelativeUrl")?.as_str()?.to_string();
            Some(web.as_ref()?.invoke("getFolderByServerRelativeUrl", [server_relative]))
        });
        created(rest_post(&self.0.invoke("add", [url.into()]), request)?, Folder)
    }
}

impl Folder {
    pub fn get(&self) -> Result<ActionHandle<Value>, SpError> {
        rest_get(&self.0)
    }

    pub fn folders(&self) -> Folders {
        Folders(self.0.path("folders"))
    }

    pub fn delete(&self) -> Result<ActionHandle<()>, SpError> {
        rest_delete(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpClient;

    #[test]
    fn test_folder_addressing() {
        let folders = SpClient::new_with_url("https://contoso.example").unwrap().web().folders();
        assert_eq!(
            folders
                .get_by_name("Shared Documents")
                .folders()
                .get_by_name("2024")
                .node()
                .resolve_address()
                .unwrap(),
            "https://contoso.example/_api/web/folders/getByName('Shared%20Documents')/folders/getByName('2024')"
        );
    }
}

//! Typed, chainable access to a SharePoint-style web.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use spchain_client::{Protocol, SpClient};
//!
//! let client = SpClient::new_with_url("https://contoso.sharepoint.com/sites/dev")?;
//! let title = client.web().select(["Title"])?.get()?.await?;
//!
//! let batch = client.create_batch(Protocol::Rest);
//! let docs = client.web().lists().get_by_title("Documents").in_batch(&batch);
//! let read = docs.get()?;
//! let renamed = docs.update(serde_json::json!({ "Title": "Docs" }))?;
//! batch.execute().await?;
//! # let _ = (title, read.await?, renamed.await?);
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod client;
pub mod config;
pub mod logging;
pub mod resources;

pub use client::SpClient;
pub use config::ClientConfig;
pub use logging::{init_logging, init_test_logging};
pub use resources::{
    odata_payload, parse, parse_guid, Created, Folder, Folders, List, Lists, Site, Taxonomy, TaxonomySession, Term,
    TermSet, TermStore, TermStores, Terms, UserCustomAction, UserCustomActions, Web, Webs,
};

pub use spchain_core::{
    ActionHandle, Batch, BatchStatus, BusinessError, CompositionError, Protocol, ResourceNode, SpError,
};

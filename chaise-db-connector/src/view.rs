//! Design-document view queries.

use tracing::debug;

use crate::client::{ViewParams, ViewResponse};
use crate::connector::Connector;
use crate::error::Result;

impl Connector {
    /// Query a named view of a design document, with an optional
    /// exact-match `key` filter.
    ///
    /// The design-document name is taken without its `_design/` prefix:
    /// `connector.view_docs("model", "by_kind", ViewParams::with_key(json!("purchase")))`.
    pub async fn view_docs(
        &self,
        ddoc: &str,
        view: &str,
        params: ViewParams,
    ) -> Result<ViewResponse> {
        debug!(ddoc, view, "view_docs");
        let db = self.database(self.settings().database_name());
        db.view(ddoc, view, &params).await
    }
}

//! Migration driver: applies the core index planner over the wire.
//!
//! `automigrate` destroys model data and rebuilds every index from
//! scratch; `autoupdate` diffs declared indexes against the store's
//! listing and only touches what changed.

use serde_json::{json, Value as JsonValue};
use tracing::debug;

use chaise_db_core::document::DESIGN_PREFIX;
use chaise_db_core::index::{
    self, ExistingIndex, IndexField, PlannedIndex, SortDirection,
};

use crate::client::{CreateIndexRequest, IndexFieldsBody};
use crate::connector::{Connector, ModelRuntime};
use crate::error::{ConnectorError, Result};

impl Connector {
    /// Destroy all data for the given models, then rebuild their indexes
    /// from the current descriptors.
    pub async fn automigrate(&self, models: &[&str]) -> Result<()> {
        debug!(?models, "automigrate");
        // data goes first, using the cached (pre-refresh) model state
        for model in models {
            self.destroy_all(model, None).await?;
        }
        for model in models {
            self.migrate_indexes(model, true).await?;
        }
        Ok(())
    }

    /// Bring indexes in line with the current descriptors without touching
    /// data. Running it twice with no model change is a no-op the second
    /// time.
    pub async fn autoupdate(&self, models: &[&str]) -> Result<()> {
        debug!(?models, "autoupdate");
        for model in models {
            self.migrate_indexes(model, false).await?;
        }
        Ok(())
    }

    async fn migrate_indexes(&self, model: &str, full_rebuild: bool) -> Result<()> {
        let runtime = self.select_model(model, true)?;
        let existing = self.model_indexes(&runtime, model).await?;
        let plan = index::plan(
            &runtime.model,
            runtime.discriminator.as_deref(),
            existing,
            full_rebuild,
        );
        debug!(
            model,
            to_add = plan.to_add.len(),
            to_drop = plan.to_drop.len(),
            "index plan"
        );
        for stale in &plan.to_drop {
            self.drop_index(&runtime, stale).await?;
        }
        for wanted in &plan.to_add {
            self.create_model_index(&runtime, wanted).await?;
        }
        Ok(())
    }

    /// Existing indexes belonging to one model, parsed from the store's
    /// global listing.
    async fn model_indexes(
        &self,
        runtime: &ModelRuntime,
        model: &str,
    ) -> Result<Vec<ExistingIndex>> {
        let listing = runtime.db.list_indexes().await?;
        let mut all = Vec::new();
        for raw in listing.indexes {
            // the built-in all-docs index carries no design document
            let Some(ddoc) = raw.ddoc else { continue };
            all.push(ExistingIndex {
                name: raw.name,
                ddoc,
                fields: parse_index_fields(&raw.def.fields),
            });
        }
        Ok(index::filter_model_indexes(all, model))
    }

    async fn create_model_index(
        &self,
        runtime: &ModelRuntime,
        planned: &PlannedIndex,
    ) -> Result<()> {
        debug!(name = %planned.name, ddoc = %planned.ddoc, "create index");
        let fields = planned
            .fields
            .iter()
            .map(|field| json!({ field.name.clone(): field.direction.as_str() }))
            .collect();
        let request = CreateIndexRequest {
            index: IndexFieldsBody { fields },
            ddoc: planned.ddoc.clone(),
            name: planned.name.clone(),
            kind: "json".to_string(),
        };
        runtime.db.create_index(&request).await
    }

    /// Remove an index by deleting its design document at the current
    /// revision.
    async fn drop_index(&self, runtime: &ModelRuntime, stale: &ExistingIndex) -> Result<()> {
        debug!(name = %stale.name, ddoc = %stale.ddoc, "drop index");
        let ddoc_id = ddoc_document_id(&stale.ddoc);
        let doc = runtime.db.get(&ddoc_id).await?.ok_or_else(|| {
            ConnectorError::not_found(format!("design document {} does not exist", stale.ddoc))
        })?;
        let id = doc
            .get("_id")
            .and_then(JsonValue::as_str)
            .unwrap_or(&ddoc_id)
            .to_string();
        let rev = doc
            .get("_rev")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                ConnectorError::protocol(format!(
                    "design document {} has no revision",
                    stale.ddoc
                ))
            })?
            .to_string();
        runtime.db.delete(&id, &rev).await
    }
}

/// Parse the listing's `[{field: "asc"}, …]` shape. The prefixless form
/// (`["field"]`) some stores emit for older indexes defaults to ascending.
fn parse_index_fields(raw: &[JsonValue]) -> Vec<IndexField> {
    let mut fields = Vec::with_capacity(raw.len());
    for entry in raw {
        match entry {
            JsonValue::Object(map) => {
                if let Some((name, direction)) = map.iter().next() {
                    fields.push(IndexField {
                        name: name.clone(),
                        direction: direction
                            .as_str()
                            .map(SortDirection::from_keyword)
                            .unwrap_or(SortDirection::Asc),
                    });
                }
            }
            JsonValue::String(name) => fields.push(IndexField {
                name: name.clone(),
                direction: SortDirection::Asc,
            }),
            _ => {}
        }
    }
    fields
}

/// Design-document id for a listed ddoc name, tolerating listings that
/// return the name undecorated.
fn ddoc_document_id(ddoc: &str) -> String {
    if ddoc.starts_with(DESIGN_PREFIX) {
        ddoc.to_string()
    } else {
        format!("{DESIGN_PREFIX}{ddoc}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_index_fields_with_directions() {
        let fields = parse_index_fields(&[json!({"age": "desc"}), json!({"name": "asc"})]);
        assert_eq!(
            fields,
            vec![
                IndexField {
                    name: "age".to_string(),
                    direction: SortDirection::Desc
                },
                IndexField::asc("name"),
            ]
        );
    }

    #[test]
    fn test_parse_prefixless_fields_default_ascending() {
        let fields = parse_index_fields(&[json!("age")]);
        assert_eq!(fields, vec![IndexField::asc("age")]);
    }
}

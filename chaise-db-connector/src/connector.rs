//! The adapter: model registry, per-model handle cache, and the CRUD/query
//! surface.
//!
//! A [`Connector`] owns one HTTP client, a registry of model descriptors,
//! and a per-model cache of resolved runtime handles (database, id
//! property, discriminator field). The cache is populated lazily under a
//! read-check/write-once discipline and repopulated only by migration.
//! All writes ride on the store's optimistic revision check: a losing
//! concurrent writer gets a conflict surfaced as-is, never retried.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use serde_json::{json, Map, Value as JsonValue};
use tracing::debug;

use chaise_db_core::document::{self, stringify_id, DEFAULT_DISCRIMINATOR, ID_FIELD, REV_FIELD};
use chaise_db_core::model::ModelDescriptor;
use chaise_db_core::selector::{build_selector, build_sort};
use chaise_db_core::Filter;

use crate::client::{BulkResult, Database, FindQuery};
use crate::config::ConnectionSettings;
use crate::error::{BulkFailure, ConnectorError, Result};
use crate::find::{find_paged, sort_numeric_ids};

/// Resolved per-model runtime state, cached on first access.
pub(crate) struct ModelRuntime {
    pub(crate) db: Database,
    pub(crate) id_property: String,
    /// `None` when a custom model selector replaces discriminator handling
    pub(crate) discriminator: Option<String>,
    pub(crate) model: Arc<ModelDescriptor>,
}

/// Async adapter onto a Mango-style document store.
pub struct Connector {
    settings: ConnectionSettings,
    client: reqwest::Client,
    server_url: String,
    auth: Option<(String, String)>,
    models: RwLock<HashMap<String, Arc<ModelDescriptor>>>,
    pool: RwLock<HashMap<String, Arc<ModelRuntime>>>,
}

impl Connector {
    /// Create a connector from settings. Validates the url-or-credentials
    /// rule and normalizes the url, but opens no connection; call
    /// [`Connector::connect`] to verify the database up front.
    pub fn new(mut settings: ConnectionSettings) -> Result<Self> {
        settings.validate()?;
        settings.normalize()?;
        let server_url = settings.server_url();
        let auth = settings.auth();
        Ok(Connector {
            settings,
            client: reqwest::Client::new(),
            server_url,
            auth,
            models: RwLock::new(HashMap::new()),
            pool: RwLock::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Verify the configured database exists, unless `lazy_connect` defers
    /// the check.
    pub async fn connect(&self) -> Result<()> {
        debug!("connect");
        if self.settings.lazy_connect {
            return Ok(());
        }
        if let Some(name) = self.settings.database.clone() {
            if !self.database(&name).exists().await? {
                return Err(ConnectorError::not_found(format!(
                    "database {name} does not exist"
                )));
            }
        }
        Ok(())
    }

    /// Register (or redefine) a model. A redefinition takes effect for
    /// cached state only after the model is migrated again.
    pub fn register_model(&self, model: ModelDescriptor) {
        let name = model.name().to_string();
        self.models
            .write()
            .expect("model registry lock poisoned")
            .insert(name, Arc::new(model));
    }

    pub(crate) fn database(&self, name: &str) -> Database {
        Database::new(
            self.client.clone(),
            self.server_url.clone(),
            name,
            self.auth.clone(),
        )
    }

    /// Resolve the runtime handle for a model, building and caching it on
    /// first access. `refresh` forces repopulation; only migration does
    /// that.
    pub(crate) fn select_model(&self, model: &str, refresh: bool) -> Result<Arc<ModelRuntime>> {
        if !refresh {
            if let Some(runtime) = self
                .pool
                .read()
                .expect("model pool lock poisoned")
                .get(model)
            {
                return Ok(Arc::clone(runtime));
            }
        }

        let descriptor = self
            .models
            .read()
            .expect("model registry lock poisoned")
            .get(model)
            .cloned()
            .ok_or_else(|| {
                ConnectorError::validation(format!("model {model} is not registered"))
            })?;

        let db_name = descriptor
            .database()
            .map(str::to_string)
            .unwrap_or_else(|| self.settings.database_name().to_string());
        let discriminator = if descriptor.model_selector().is_some() {
            None
        } else {
            Some(
                descriptor
                    .discriminator_override()
                    .or(self.settings.model_index.as_deref())
                    .unwrap_or(DEFAULT_DISCRIMINATOR)
                    .to_string(),
            )
        };
        debug!(model, db = %db_name, "select model");

        let runtime = Arc::new(ModelRuntime {
            db: self.database(&db_name),
            id_property: descriptor.id_property().to_string(),
            discriminator,
            model: descriptor,
        });
        self.pool
            .write()
            .expect("model pool lock poisoned")
            .insert(model.to_string(), Arc::clone(&runtime));
        Ok(runtime)
    }

    /// Write one document; the store assigns the id when the data carries
    /// none. Returns the stored id and new revision token.
    async fn insert_doc(&self, model: &str, data: &JsonValue) -> Result<(String, String)> {
        let runtime = self.select_model(model, false)?;
        let doc = document::to_db(&runtime.model, runtime.discriminator.as_deref(), data)?;
        let result = runtime
            .db
            .insert(&doc)
            .await
            .map_err(|e| duplicate_context(e, model))?;
        Ok((result.id, result.rev))
    }

    async fn fetch_mapped(&self, runtime: &ModelRuntime, id: &str) -> Result<JsonValue> {
        let doc = runtime.db.get(id).await?.ok_or_else(|| {
            not_found_context(runtime.model.name(), id)
        })?;
        Ok(document::from_db(
            &runtime.model,
            runtime.discriminator.as_deref(),
            doc,
            None,
        )?)
    }

    /// Create a new instance. Returns the assigned id (numeric when the
    /// model declares a numeric id) and the revision token.
    pub async fn create(&self, model: &str, data: &JsonValue) -> Result<(JsonValue, String)> {
        debug!(model, "create");
        let runtime = self.select_model(model, false)?;
        let (id, rev) = self.insert_doc(model, data).await?;
        let id_value = if runtime.model.id_is_numeric() {
            match id.parse::<i64>() {
                Ok(n) => json!(n),
                Err(_) => json!(id),
            }
        } else {
            json!(id)
        };
        Ok((id_value, rev))
    }

    /// Save an instance that already carries its id, returning the stored
    /// shape.
    pub async fn save(&self, model: &str, data: &JsonValue) -> Result<JsonValue> {
        debug!(model, "save");
        let runtime = self.select_model(model, false)?;
        require_id(&runtime, data)?;
        let (id, _rev) = self.insert_doc(model, data).await?;
        self.fetch_mapped(&runtime, &id).await
    }

    /// Point lookup by id. A missing document is `None`, not an error.
    pub async fn find_by_id(&self, model: &str, id: &str) -> Result<Option<JsonValue>> {
        debug!(model, id, "find_by_id");
        let runtime = self.select_model(model, false)?;
        match runtime.db.get(id).await? {
            None => Ok(None),
            Some(doc) => Ok(Some(document::from_db(
                &runtime.model,
                runtime.discriminator.as_deref(),
                doc,
                None,
            )?)),
        }
    }

    /// Find matching instances.
    pub async fn all(&self, model: &str, filter: &Filter) -> Result<Vec<JsonValue>> {
        let runtime = self.select_model(model, false)?;
        let docs = self.all_raw(model, filter).await?;
        docs.into_iter()
            .map(|doc| {
                document::from_db(
                    &runtime.model,
                    runtime.discriminator.as_deref(),
                    doc,
                    filter.fields.as_deref(),
                )
                .map_err(Into::into)
            })
            .collect()
    }

    /// Find matching documents in their stored shape (reserved fields
    /// intact). Write paths use this to get at `_id`/`_rev`.
    pub(crate) async fn all_raw(&self, model: &str, filter: &Filter) -> Result<Vec<JsonValue>> {
        let runtime = self.select_model(model, false)?;
        let selector = build_selector(
            &runtime.model,
            runtime.discriminator.as_deref(),
            filter.where_clause.as_ref(),
        )?;

        let mut query = FindQuery {
            selector,
            ..Default::default()
        };
        if let Some(fields) = &filter.fields {
            let mut projected = fields.clone();
            if !projected.iter().any(|f| f == ID_FIELD) {
                projected.push(ID_FIELD.to_string());
            }
            query.fields = Some(projected);
        }
        let sort = filter
            .order
            .as_ref()
            .map(|order| build_sort(&runtime.model, order));
        query.sort = sort.clone();
        query.limit = filter.limit;
        query.skip = filter.skip;
        query.use_index = filter.use_index.clone();
        debug!(model, "find query built");

        let mut docs = find_paged(&runtime.db, query).await?;
        if runtime.model.id_is_numeric() {
            if let Some(sort) = &sort {
                sort_numeric_ids(&mut docs, sort);
            }
        }
        Ok(docs)
    }

    /// Count matching instances, capped by the global limit when one is
    /// configured.
    pub async fn count(&self, model: &str, where_clause: Option<&JsonValue>) -> Result<usize> {
        let filter = Filter {
            where_clause: where_clause.cloned(),
            limit: self.settings.global_limit,
            ..Default::default()
        };
        Ok(self.all_raw(model, &filter).await?.len())
    }

    /// Whether an instance with this id exists.
    pub async fn exists(&self, model: &str, id: &str) -> Result<bool> {
        let runtime = self.select_model(model, false)?;
        let mut where_clause = Map::new();
        where_clause.insert(runtime.id_property.clone(), json!(id));
        let count = self
            .count(model, Some(&JsonValue::Object(where_clause)))
            .await?;
        Ok(count > 0)
    }

    /// Merge the given fields over the current document (provided fields
    /// win) and write it back carrying the fetched revision token, so a
    /// concurrent writer loses with a conflict.
    pub async fn update_attributes(
        &self,
        model: &str,
        id: &str,
        data: &JsonValue,
    ) -> Result<JsonValue> {
        debug!(model, id, "update_attributes");
        let runtime = self.select_model(model, false)?;
        let mut doc = runtime
            .db
            .get(id)
            .await?
            .ok_or_else(|| not_found_context(model, id))?;
        shallow_merge(&mut doc, data);
        let (_id, rev) = self.insert_doc(model, &doc).await?;
        if let Some(map) = doc.as_object_mut() {
            map.insert(REV_FIELD.to_string(), json!(rev));
        }
        Ok(document::from_db(
            &runtime.model,
            runtime.discriminator.as_deref(),
            doc,
            None,
        )?)
    }

    /// Update when the instance exists, create it otherwise. The boolean
    /// reports whether a new instance was created.
    pub async fn update_or_create(
        &self,
        model: &str,
        data: &JsonValue,
    ) -> Result<(JsonValue, bool)> {
        debug!(model, "update_or_create");
        let runtime = self.select_model(model, false)?;
        let id = require_id(&runtime, data)?;
        match self.update_attributes(model, &id, data).await {
            Ok(instance) => Ok((instance, false)),
            Err(e) if e.is_not_found() => {
                let (id, _rev) = self.insert_doc(model, data).await?;
                Ok((self.fetch_mapped(&runtime, &id).await?, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the full instance under this id with a fresh write and no
    /// prior read. A stale revision assumption surfaces as a conflict.
    pub async fn replace_by_id(&self, model: &str, id: &str, data: &JsonValue) -> Result<JsonValue> {
        debug!(model, id, "replace_by_id");
        let runtime = self.select_model(model, false)?;
        let mut replacement = data.clone();
        match replacement.as_object_mut() {
            Some(map) => {
                map.insert(runtime.id_property.clone(), json!(id));
            }
            None => {
                return Err(ConnectorError::validation(
                    "replacement data must be a JSON object",
                ))
            }
        }
        let (stored_id, _rev) = self.insert_doc(model, &replacement).await?;
        self.fetch_mapped(&runtime, &stored_id).await
    }

    /// Replace when the instance exists, create it otherwise.
    pub async fn replace_or_create(
        &self,
        model: &str,
        data: &JsonValue,
    ) -> Result<(JsonValue, bool)> {
        debug!(model, "replace_or_create");
        let runtime = self.select_model(model, false)?;
        let id = require_id(&runtime, data)?;
        let existed = self.exists(model, &id).await?;
        let (stored_id, _rev) = self.insert_doc(model, data).await?;
        Ok((self.fetch_mapped(&runtime, &stored_id).await?, !existed))
    }

    /// Submit many replacement documents in one batch. Any per-document
    /// error aggregates into one reported failure carrying every per-item
    /// detail; documents that succeeded stay written.
    pub async fn bulk_replace(
        &self,
        model: &str,
        data_list: &[JsonValue],
    ) -> Result<Vec<BulkResult>> {
        debug!(model, count = data_list.len(), "bulk_replace");
        let runtime = self.select_model(model, false)?;
        let docs = data_list
            .iter()
            .map(|data| {
                document::to_db(&runtime.model, runtime.discriminator.as_deref(), data)
            })
            .collect::<chaise_db_core::Result<Vec<_>>>()?;
        let results = runtime.db.bulk(&docs).await?;
        let failures = collect_failures(&results);
        if !failures.is_empty() {
            return Err(ConnectorError::AggregateBulk { failures });
        }
        Ok(results)
    }

    /// Merge new field values into every matching document and write them
    /// back in one batch. Returns the number of documents written; any
    /// per-document failure aggregates into one error even though other
    /// documents may already be updated.
    pub async fn update_all(
        &self,
        model: &str,
        where_clause: Option<&JsonValue>,
        data: &JsonValue,
    ) -> Result<usize> {
        debug!(model, "update_all");
        let runtime = self.select_model(model, false)?;
        let filter = Filter {
            where_clause: where_clause.cloned(),
            ..Default::default()
        };
        let mut docs = self.all_raw(model, &filter).await?;
        if docs.is_empty() {
            return Ok(0);
        }
        for doc in &mut docs {
            shallow_merge(doc, data);
        }
        let results = runtime.db.bulk(&docs).await?;
        let failures = collect_failures(&results);
        if !failures.is_empty() {
            return Err(ConnectorError::AggregateBulk { failures });
        }
        Ok(results.len())
    }

    /// Delete one instance by id. Returns the number of documents removed
    /// (0 when none matched).
    pub async fn destroy(&self, model: &str, id: &str) -> Result<usize> {
        debug!(model, id, "destroy");
        let runtime = self.select_model(model, false)?;
        let mut where_clause = Map::new();
        where_clause.insert(runtime.id_property.clone(), json!(id));
        let filter = Filter {
            where_clause: Some(JsonValue::Object(where_clause)),
            ..Default::default()
        };
        let docs = self.all_raw(model, &filter).await?;
        if docs.len() > 1 {
            return Err(ConnectorError::validation(
                "destroy matched more than one document",
            ));
        }
        let Some(doc) = docs.first() else {
            return Ok(0);
        };
        let (doc_id, rev) = doc_id_rev(doc)?;
        runtime.db.delete(doc_id, rev).await?;
        Ok(1)
    }

    /// Delete every matching instance. The store has no delete-by-query,
    /// so matches are resolved with a selector scan first and then deleted
    /// with one concurrent request per document; individual failures are
    /// collected without halting the rest.
    pub async fn destroy_all(
        &self,
        model: &str,
        where_clause: Option<&JsonValue>,
    ) -> Result<usize> {
        debug!(model, "destroy_all");
        let runtime = self.select_model(model, false)?;
        let filter = Filter {
            where_clause: where_clause.cloned(),
            limit: self.settings.global_limit,
            ..Default::default()
        };
        let docs = self.all_raw(model, &filter).await?;

        let deletes = docs.iter().map(|doc| {
            let db = runtime.db.clone();
            let id = doc
                .get(ID_FIELD)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let rev = doc
                .get(REV_FIELD)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            async move {
                match (id, rev) {
                    (Some(id), Some(rev)) => match db.delete(&id, &rev).await {
                        Ok(()) => Ok(()),
                        Err(e) => Err(BulkFailure {
                            id: Some(id),
                            error: e.to_string(),
                            reason: None,
                        }),
                    },
                    (id, _) => Err(BulkFailure {
                        id,
                        error: "document missing _id or _rev".to_string(),
                        reason: None,
                    }),
                }
            }
        });
        let results = join_all(deletes).await;

        let deleted = results.iter().filter(|r| r.is_ok()).count();
        let failures: Vec<BulkFailure> = results.into_iter().filter_map(|r| r.err()).collect();
        if !failures.is_empty() {
            return Err(ConnectorError::AggregateBulk { failures });
        }
        Ok(deleted)
    }

    /// Current revision token of an instance.
    pub async fn current_revision(&self, model: &str, id: &str) -> Result<String> {
        let runtime = self.select_model(model, false)?;
        runtime
            .db
            .head_rev(id)
            .await?
            .ok_or_else(|| not_found_context(model, id))
    }

    /// Check server connectivity.
    pub async fn ping(&self) -> Result<()> {
        let db = self.database(self.settings.database_name());
        db.all_dbs().await?;
        Ok(())
    }
}

/// Overwrite top-level fields of `doc` with those of `data`; provided
/// fields win on key collision.
fn shallow_merge(doc: &mut JsonValue, data: &JsonValue) {
    let (Some(doc_map), Some(data_map)) = (doc.as_object_mut(), data.as_object()) else {
        return;
    };
    for (key, value) in data_map {
        doc_map.insert(key.clone(), value.clone());
    }
}

fn collect_failures(results: &[BulkResult]) -> Vec<BulkFailure> {
    results
        .iter()
        .filter(|r| r.error.is_some())
        .map(|r| BulkFailure {
            id: r.id.clone(),
            error: r.error.clone().unwrap_or_default(),
            reason: r.reason.clone(),
        })
        .collect()
}

fn doc_id_rev(doc: &JsonValue) -> Result<(&str, &str)> {
    let id = doc.get(ID_FIELD).and_then(|v| v.as_str());
    let rev = doc.get(REV_FIELD).and_then(|v| v.as_str());
    match (id, rev) {
        (Some(id), Some(rev)) => Ok((id, rev)),
        _ => Err(ConnectorError::protocol(
            "matched document is missing _id or _rev",
        )),
    }
}

fn require_id(runtime: &ModelRuntime, data: &JsonValue) -> Result<String> {
    data.get(&runtime.id_property)
        .filter(|v| !v.is_null())
        .map(stringify_id)
        .ok_or_else(|| {
            ConnectorError::validation(format!(
                "the {} property is required for model {}",
                runtime.id_property,
                runtime.model.name()
            ))
        })
}

fn not_found_context(model: &str, id: &str) -> ConnectorError {
    ConnectorError::not_found(format!("No instance with id {id} found for {model}"))
}

/// Rewrite a write conflict with model context, keeping the taxonomy.
fn duplicate_context(error: ConnectorError, model: &str) -> ConnectorError {
    match error {
        ConnectorError::Conflict(message) => {
            ConnectorError::Conflict(format!("{model}: {message} (duplicate?)"))
        }
        other => other,
    }
}

//! Async adapter mapping a generic model CRUD/query surface onto a
//! Mango-style document store.
//!
//! The connector registers [`ModelDescriptor`]s, translates abstract
//! filters through `chaise-db-core`, and drives the store's wire protocol:
//! selector queries with bookmark pagination, revision-stamped writes,
//! bulk batches, index migration, and design-document views.
//!
//! ```no_run
//! use chaise_db_connector::{ConnectionSettings, Connector};
//! use chaise_db_core::{Filter, ModelDescriptor, Property, PropertyType};
//! use serde_json::json;
//!
//! # async fn example() -> chaise_db_connector::Result<()> {
//! let settings = ConnectionSettings::with_url("http://localhost:5984/players");
//! let connector = Connector::new(settings)?;
//! connector.register_model(
//!     ModelDescriptor::new("Player")
//!         .with_property("age", Property::indexed(PropertyType::Number)),
//! );
//! connector.autoupdate(&["Player"]).await?;
//!
//! connector.create("Player", &json!({"age": 42})).await?;
//! let grown = connector
//!     .all("Player", &Filter::new().with_where(json!({"age": {"gt": 21}})))
//!     .await?;
//! # let _ = grown;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
mod find;
mod migrate;
mod view;

pub use chaise_db_core::{Filter, ModelDescriptor, Property, PropertyType};
pub use client::{
    BulkResult, CreateIndexRequest, Database, DocumentResult, FindQuery, FindResponse,
    IndexListResponse, ViewParams, ViewResponse, ViewRow,
};
pub use config::ConnectionSettings;
pub use connector::Connector;
pub use error::{BulkFailure, ConnectorError, Result};

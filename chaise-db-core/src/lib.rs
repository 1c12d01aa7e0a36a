//! Pure translation core for the chaise document-store adapter.
//!
//! This crate maps an abstract, relational-flavored query surface (model
//! descriptors, where-trees, order specs, declared indexes) onto the
//! selector syntax, index rules, and document shape of a Mango-style
//! document store. It performs no I/O; the `chaise-db-connector` crate
//! drives the wire protocol with the structures produced here.

pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod model;
pub mod selector;

pub use document::{from_db, to_db, DEFAULT_DISCRIMINATOR, ID_FIELD, REV_FIELD};
pub use error::{Error, Result};
pub use filter::{Condition, Filter};
pub use index::{ExistingIndex, IndexField, IndexPlan, PlannedIndex, SortDirection};
pub use model::{IndexKeys, ModelDescriptor, Property, PropertyType};
pub use selector::{build_selector, build_sort};

//! Index planning: from declared model indexes to the store's composite
//! index rules.
//!
//! The store only accepts composite indexes whose fields all share one sort
//! direction, and it can only serve a selector from an index whose fields
//! are a prefix match, which is why every candidate index gets the
//! discriminator field appended. Planning is pure; the connector applies
//! the resulting [`IndexPlan`] over the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::{index_ddoc_name, model_ddoc_prefix, DESIGN_PREFIX};
use crate::model::ModelDescriptor;

/// Sort direction of one index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    /// Declaration convention: `1` ascending, `-1` descending.
    pub fn from_signed(value: i8) -> Self {
        if value < 0 {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn from_keyword(keyword: &str) -> Self {
        if keyword.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of an index, with its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
    pub name: String,
    pub direction: SortDirection,
}

impl IndexField {
    pub fn asc(name: impl Into<String>) -> Self {
        IndexField {
            name: name.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        IndexField {
            name: name.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// An index the planner wants created. `ddoc` is the undecorated
/// design-document name (creation sends it without the `_design/` prefix).
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedIndex {
    pub name: String,
    pub ddoc: String,
    pub fields: Vec<IndexField>,
}

/// An index reported by the store's listing. `ddoc` carries the
/// `_design/` prefix, as returned on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingIndex {
    pub name: String,
    pub ddoc: String,
    pub fields: Vec<IndexField>,
}

/// The planner's verdict: indexes to create and indexes to remove.
#[derive(Debug, Default)]
pub struct IndexPlan {
    pub to_add: Vec<PlannedIndex>,
    pub to_drop: Vec<ExistingIndex>,
}

/// Derive every candidate index for a model: one ascending single-field
/// index per `index: true` property, one single-field index on the
/// discriminator, and one per model-level composite declaration. Each
/// candidate has conflicting directions coerced and the discriminator field
/// appended.
pub fn candidate_indexes(
    model: &ModelDescriptor,
    discriminator: Option<&str>,
) -> Vec<PlannedIndex> {
    let mut candidates = Vec::new();

    for (name, property) in model.properties() {
        if property.index {
            candidates.push(candidate(
                model.name(),
                format!("{name}_index"),
                vec![IndexField::asc(name.clone())],
            ));
        }
    }

    if let Some(field) = discriminator {
        candidates.push(candidate(
            model.name(),
            format!("{field}_index"),
            vec![IndexField::asc(field)],
        ));
    }

    for (index_name, keys) in model.indexes() {
        let fields = keys
            .iter()
            .map(|(field, signed)| IndexField {
                name: field.clone(),
                direction: SortDirection::from_signed(*signed),
            })
            .collect();
        candidates.push(candidate(model.name(), index_name.clone(), fields));
    }

    for planned in &mut candidates {
        coerce_directions(&planned.name, &mut planned.fields);
        if let Some(field) = discriminator {
            append_discriminator(&mut planned.fields, field);
        }
    }

    candidates
}

fn candidate(model: &str, name: String, fields: Vec<IndexField>) -> PlannedIndex {
    PlannedIndex {
        ddoc: index_ddoc_name(model, &name),
        name,
        fields,
    }
}

/// Force all fields of one composite index to the first field's direction.
/// The store rejects mixed-direction composites outright, so conflicting
/// declarations are coerced with a warning naming the affected fields.
pub fn coerce_directions(index_name: &str, fields: &mut [IndexField]) {
    if fields.len() <= 1 {
        return;
    }
    let default = fields[0].direction;
    let mut coerced: Vec<String> = Vec::new();
    for field in fields.iter_mut().skip(1) {
        if field.direction != default {
            field.direction = default;
            coerced.push(field.name.clone());
        }
    }
    if !coerced.is_empty() {
        warn!(
            index = index_name,
            direction = %default,
            fields = %coerced.join(","),
            "composite indexes cannot mix sort directions; forcing the first field's direction"
        );
    }
}

/// Append the discriminator field using the index's dominant direction,
/// unless it is already part of the field list.
fn append_discriminator(fields: &mut Vec<IndexField>, field_name: &str) {
    if fields.iter().any(|f| f.name == field_name) {
        return;
    }
    let direction = fields
        .first()
        .map(|f| f.direction)
        .unwrap_or(SortDirection::Asc);
    fields.push(IndexField {
        name: field_name.to_string(),
        direction,
    });
}

/// Decide additions and removals for one model.
///
/// A full rebuild drops every existing index and recreates every candidate.
/// An incremental update compares candidates against existing indexes of
/// the same name: an index whose full field set matches (order-insensitive
/// per field) is left alone; changed or new candidates are added and
/// existing indexes with no surviving candidate are dropped.
pub fn plan(
    model: &ModelDescriptor,
    discriminator: Option<&str>,
    existing: Vec<ExistingIndex>,
    full_rebuild: bool,
) -> IndexPlan {
    let candidates = candidate_indexes(model, discriminator);
    if full_rebuild {
        return IndexPlan {
            to_add: candidates,
            to_drop: existing,
        };
    }

    let mut to_add = Vec::new();
    let mut to_drop = existing;
    for candidate in candidates {
        match to_drop.iter().position(|e| e.name == candidate.name) {
            Some(pos) if fields_equivalent(&to_drop[pos].fields, &candidate.fields) => {
                to_drop.remove(pos);
            }
            _ => to_add.push(candidate),
        }
    }

    IndexPlan { to_add, to_drop }
}

/// Keep only the indexes whose design-document name carries this model's
/// naming-convention prefix. Models share one database; a bare substring
/// match would conflate `Foo` with `FooBar`.
pub fn filter_model_indexes(all: Vec<ExistingIndex>, model: &str) -> Vec<ExistingIndex> {
    let prefix = model_ddoc_prefix(model);
    all.into_iter()
        .filter(|index| {
            index
                .ddoc
                .strip_prefix(DESIGN_PREFIX)
                .unwrap_or(index.ddoc.as_str())
                .starts_with(&prefix)
        })
        .collect()
}

/// Order-insensitive full-field-set comparison.
fn fields_equivalent(a: &[IndexField], b: &[IndexField]) -> bool {
    a.len() == b.len() && a.iter().all(|field| b.contains(field))
}

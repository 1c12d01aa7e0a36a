//! Document mapping between model instances and stored documents.
//!
//! Stored documents carry three reserved fields: the string identifier
//! (`_id`), the opaque revision token (`_rev`), and a discriminator field
//! naming the model a document belongs to, so that documents of many models
//! can share one physical database. [`to_db`] and [`from_db`] convert
//! between the caller-facing instance shape and the stored shape.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Map, Value as JsonValue};

use crate::error::{Error, Result};
use crate::model::ModelDescriptor;

/// Reserved identifier field of a stored document.
pub const ID_FIELD: &str = "_id";
/// Reserved revision token field of a stored document.
pub const REV_FIELD: &str = "_rev";
/// Default discriminator field stamped on every stored document.
pub const DEFAULT_DISCRIMINATOR: &str = "chaise__model__name";

/// Design-document id prefix used by the store.
pub const DESIGN_PREFIX: &str = "_design/";
/// Model segment prefix of generated index design-document names.
pub const MODEL_DDOC_PREFIX: &str = "ChaiseModel";
/// Index segment prefix of generated index design-document names.
pub const INDEX_DDOC_PREFIX: &str = "ChaiseIndex";

/// Deterministic design-document name for one model index, without the
/// `_design/` prefix (index creation sends the undecorated name).
pub fn index_ddoc_name(model: &str, index_name: &str) -> String {
    format!("{MODEL_DDOC_PREFIX}__{model}__{INDEX_DDOC_PREFIX}__{index_name}")
}

/// The naming-convention prefix shared by every index of one model. Used to
/// tell one model's indexes apart from other models multiplexed into the
/// same database.
pub fn model_ddoc_prefix(model: &str) -> String {
    format!("{MODEL_DDOC_PREFIX}__{model}__{INDEX_DDOC_PREFIX}__")
}

/// String form of an id value. Ids must be strings on the wire; non-string
/// scalars are rendered through their JSON representation.
pub fn stringify_id(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a model instance into its stored document shape.
///
/// Null-valued fields are dropped. An id value of `null` removes the id
/// entirely so the store assigns one; any other id is stringified into
/// [`ID_FIELD`] and the original-named field is removed. Date-typed
/// properties are normalized (see [`from_db`]) and the discriminator field
/// is stamped with the model name unless a custom model selector disables
/// discriminator handling.
pub fn to_db(
    model: &ModelDescriptor,
    discriminator: Option<&str>,
    data: &JsonValue,
) -> Result<JsonValue> {
    let Some(input) = data.as_object() else {
        return Err(Error::malformed_document(format!(
            "instance data for model {} must be a JSON object",
            model.name()
        )));
    };

    let id_property = model.id_property();
    let mut doc = Map::new();
    for (key, value) in input {
        if key == id_property || value.is_null() {
            continue;
        }
        doc.insert(key.clone(), value.clone());
    }

    match input.get(id_property) {
        // absent or explicitly null: let the store assign an id
        None | Some(JsonValue::Null) => {}
        Some(value) => {
            doc.insert(ID_FIELD.to_string(), JsonValue::String(stringify_id(value)));
        }
    }

    for name in model.date_properties() {
        if let Some(value) = doc.get(name).cloned() {
            doc.insert(name.to_string(), coerce_date(&value)?);
        }
    }

    if let Some(field) = discriminator {
        doc.insert(field.to_string(), JsonValue::String(model.name().to_string()));
    }

    Ok(JsonValue::Object(doc))
}

/// Convert a stored document back into the model instance shape.
///
/// The reserved id field is copied back to the model's id property (parsed
/// as an integer when the model declares the id numeric) unless the
/// requested field projection excludes the id, in which case it is dropped
/// without remapping. Date-typed fields are normalized to RFC 3339 UTC and
/// the discriminator field is stripped.
pub fn from_db(
    model: &ModelDescriptor,
    discriminator: Option<&str>,
    doc: JsonValue,
    fields: Option<&[String]>,
) -> Result<JsonValue> {
    let JsonValue::Object(mut map) = doc else {
        return Err(Error::malformed_document(format!(
            "stored document for model {} must be a JSON object",
            model.name()
        )));
    };
    if !map.contains_key(ID_FIELD) {
        return Err(Error::malformed_document(format!(
            "document for model {} has no {} field",
            model.name(),
            ID_FIELD
        )));
    }

    let id_property = model.id_property();
    let skip_id = fields.is_some_and(|f| !f.iter().any(|name| name == id_property));
    let id_value = map.remove(ID_FIELD);
    if !skip_id {
        if let Some(value) = id_value {
            let id = stringify_id(&value);
            let mapped = if model.id_is_numeric() {
                let parsed: i64 = id.parse().map_err(|_| {
                    Error::malformed_document(format!(
                        "document id '{id}' for model {} is not numeric",
                        model.name()
                    ))
                })?;
                json!(parsed)
            } else {
                JsonValue::String(id)
            };
            map.insert(id_property.to_string(), mapped);
        }
    }

    for name in model.date_properties() {
        if let Some(value) = map.get(name).cloned() {
            if !value.is_null() {
                map.insert(name.to_string(), coerce_date(&value)?);
            }
        }
    }

    if let Some(field) = discriminator {
        map.remove(field);
    }

    Ok(JsonValue::Object(map))
}

/// Normalize a date-typed property value to an RFC 3339 UTC string with
/// millisecond precision. Accepts RFC 3339 strings (any offset) and epoch
/// milliseconds.
fn coerce_date(value: &JsonValue) -> Result<JsonValue> {
    let normalized = match value {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::invalid_date(format!("'{s}': {e}")))?,
        JsonValue::Number(n) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| Error::invalid_date(n.to_string()))?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| Error::invalid_date(format!("epoch millis {millis}")))?
        }
        other => return Err(Error::invalid_date(other.to_string())),
    };
    Ok(JsonValue::String(
        normalized.to_rfc3339_opts(SecondsFormat::Millis, true),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Property, PropertyType};
    use serde_json::json;

    fn person() -> ModelDescriptor {
        ModelDescriptor::new("Person")
            .with_property("name", Property::new(PropertyType::String))
            .with_property("born", Property::new(PropertyType::Date))
    }

    fn numeric_person() -> ModelDescriptor {
        ModelDescriptor::new("Person")
            .with_property("id", Property::new(PropertyType::Number))
            .with_property("name", Property::new(PropertyType::String))
    }

    #[test]
    fn test_to_db_stringifies_id_and_stamps_discriminator() {
        let doc = to_db(
            &numeric_person(),
            Some(DEFAULT_DISCRIMINATOR),
            &json!({"id": 42, "name": "ada"}),
        )
        .unwrap();
        assert_eq!(
            doc,
            json!({"_id": "42", "name": "ada", DEFAULT_DISCRIMINATOR: "Person"})
        );
    }

    #[test]
    fn test_to_db_null_id_lets_store_assign() {
        let doc = to_db(&person(), Some(DEFAULT_DISCRIMINATOR), &json!({"id": null, "name": "ada"}))
            .unwrap();
        assert!(doc.get(ID_FIELD).is_none());
        assert!(doc.get("id").is_none());
    }

    #[test]
    fn test_to_db_drops_null_fields() {
        let doc = to_db(&person(), None, &json!({"name": null})).unwrap();
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn test_to_db_normalizes_epoch_millis_dates() {
        let doc = to_db(&person(), None, &json!({"born": 0})).unwrap();
        assert_eq!(doc["born"], json!("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_from_db_requires_id_field() {
        let err = from_db(&person(), None, json!({"name": "ada"}), None).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn test_from_db_parses_numeric_id() {
        let instance = from_db(
            &numeric_person(),
            Some(DEFAULT_DISCRIMINATOR),
            json!({"_id": "42", "name": "ada", DEFAULT_DISCRIMINATOR: "Person"}),
            None,
        )
        .unwrap();
        assert_eq!(instance, json!({"id": 42, "name": "ada"}));
    }

    #[test]
    fn test_from_db_projection_excluding_id_drops_it() {
        let instance = from_db(
            &person(),
            None,
            json!({"_id": "a", "name": "ada"}),
            Some(&["name".to_string()]),
        )
        .unwrap();
        assert_eq!(instance, json!({"name": "ada"}));
    }

    #[test]
    fn test_round_trip_preserves_id_dates_and_plain_fields() {
        let model = ModelDescriptor::new("Event")
            .with_property("at", Property::new(PropertyType::Date))
            .with_property("label", Property::new(PropertyType::String));
        let instance = json!({
            "id": "evt-1",
            "at": "2024-06-01T12:30:00.000Z",
            "label": "launch"
        });
        let stored = to_db(&model, Some(DEFAULT_DISCRIMINATOR), &instance).unwrap();
        let back = from_db(&model, Some(DEFAULT_DISCRIMINATOR), stored, None).unwrap();
        assert_eq!(back, instance);
    }

    #[test]
    fn test_index_ddoc_naming_is_deterministic() {
        assert_eq!(
            index_ddoc_name("User", "name_index"),
            "ChaiseModel__User__ChaiseIndex__name_index"
        );
        assert!(index_ddoc_name("User", "name_index").starts_with(&model_ddoc_prefix("User")));
    }
}

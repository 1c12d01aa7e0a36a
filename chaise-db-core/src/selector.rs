//! Where-clause to selector translation.
//!
//! Turns the relational-flavored where-tree into the store's selector
//! syntax: `$`-prefixed logical combinators, operator objects, nested
//! `$elemMatch` paths for array properties, and the discriminator equality
//! every selector must carry so multiplexed documents of other models stay
//! excluded.

use serde_json::{json, Map, Value as JsonValue};
use tracing::warn;

use crate::document::{stringify_id, ID_FIELD};
use crate::error::{Error, Result};
use crate::filter::Condition;
use crate::index::SortDirection;
use crate::model::ModelDescriptor;

/// Build the store selector for one where-clause.
///
/// The discriminator equality is merged in unless the model carries a
/// custom selector override, in which case that override replaces it
/// entirely. A missing or non-object where-clause yields just the
/// discriminator constraint.
pub fn build_selector(
    model: &ModelDescriptor,
    discriminator: Option<&str>,
    where_clause: Option<&JsonValue>,
) -> Result<JsonValue> {
    let mut query = match model.model_selector() {
        Some(selector) => selector
            .as_object()
            .cloned()
            .ok_or_else(|| Error::invalid_filter("model selector override must be an object"))?,
        None => {
            let mut map = Map::new();
            if let Some(field) = discriminator {
                map.insert(field.to_string(), json!(model.name()));
            }
            map
        }
    };

    let Some(where_obj) = where_clause.and_then(|w| w.as_object()) else {
        return Ok(JsonValue::Object(query));
    };

    let mut contains_regex = false;
    for (raw_key, raw_cond) in where_obj {
        if raw_key == "and" || raw_key == "or" || raw_key == "nor" {
            let translated = match raw_cond {
                JsonValue::Array(children) => {
                    let mut out = Vec::with_capacity(children.len());
                    for child in children {
                        out.push(build_selector(model, discriminator, Some(child))?);
                    }
                    JsonValue::Array(out)
                }
                other => other.clone(),
            };
            query.insert(format!("${raw_key}"), translated);
            continue;
        }

        let mut key = raw_key.as_str();
        let mut cond = raw_cond.clone();
        if key == model.id_property() {
            key = ID_FIELD;
            if !cond.is_object() && !cond.is_array() {
                cond = JsonValue::String(stringify_id(&cond));
            }
        }

        let translated = match Condition::from_value(&cond) {
            Condition::Literal(value) => value,
            Condition::Operator {
                name,
                value,
                options,
            } => translate_operator(&name, value, options.as_deref(), &mut contains_regex)?,
        };

        if key.contains('.') {
            if let Some(path) = model.array_match_path(key) {
                let parts: Vec<&str> = path.split('.').collect();
                let (first, rest) = parts
                    .split_first()
                    .expect("dotted path has at least one segment");
                merge_entry(&mut query, first, unfold(rest, translated));
                continue;
            }
            // unresolvable path: keep the flat dotted key verbatim
        }
        query.insert(key.to_string(), translated);
    }

    // The store cannot serve a regex-only selector from any index; an open
    // range on the id field keeps the query answerable.
    if contains_regex && !query.contains_key(ID_FIELD) {
        query.insert(ID_FIELD.to_string(), json!({"$gt": null}));
    }

    Ok(JsonValue::Object(query))
}

/// Translate one operator condition into the store's operator object.
fn translate_operator(
    name: &str,
    value: JsonValue,
    options: Option<&str>,
    contains_regex: &mut bool,
) -> Result<JsonValue> {
    let translated = match name {
        "between" => {
            let bounds = value
                .as_array()
                .filter(|bounds| bounds.len() == 2)
                .ok_or_else(|| Error::invalid_filter("between expects a [low, high] pair"))?;
            json!({"$gte": bounds[0], "$lte": bounds[1]})
        }
        "inq" => json!({"$in": value}),
        "nin" => json!({"$nin": value}),
        "neq" => json!({"$ne": value}),
        "like" => {
            *contains_regex = true;
            json!({"$regex": regex_source(&value, options, false)?})
        }
        "nlike" => {
            *contains_regex = true;
            json!({"$regex": regex_source(&value, options, true)?})
        }
        "regexp" => {
            *contains_regex = true;
            json!({"$regex": regex_source(&value, options, false)?})
        }
        other => {
            let mut map = Map::new();
            map.insert(format!("${other}"), value);
            JsonValue::Object(map)
        }
    };
    Ok(translated)
}

/// Render a regex operand in the store's inline-flag syntax.
///
/// Negation wraps the pattern as a `[^...]` character class, an
/// approximation of true pattern negation, kept for compatibility with the
/// source behavior. The global flag has no store equivalent: it is warned
/// about and dropped.
fn regex_source(value: &JsonValue, options: Option<&str>, negative: bool) -> Result<String> {
    let pattern = value
        .as_str()
        .ok_or_else(|| Error::invalid_filter("regular expression pattern must be a string"))?;

    if options.is_some_and(|flags| flags.contains('g')) {
        warn!("the store's regex syntax does not support the global flag; ignoring it");
    }
    let flags: String = options
        .unwrap_or("")
        .chars()
        .filter(|c| *c != 'g')
        .collect();

    let body = if negative {
        format!("[^{pattern}]")
    } else {
        pattern.to_string()
    };
    Ok(if flags.is_empty() {
        body
    } else {
        format!("(?{flags}){body}")
    })
}

/// Build the sort specification for an order list.
///
/// Entries accept an `ASC`/`DESC` suffix (default ascending) and may be
/// comma-separated. The id property maps to the reserved id field. An
/// empty order defaults to the id property.
pub fn build_sort(model: &ModelDescriptor, order: &[String]) -> Vec<JsonValue> {
    let id_property = model.id_property();
    let mut entries: Vec<&str> = Vec::new();
    for spec in order {
        entries.extend(spec.split(','));
    }
    if entries.is_empty() {
        entries.push(id_property);
    }

    let mut sort = Vec::with_capacity(entries.len());
    for entry in entries {
        let (name, direction) = parse_order_entry(entry);
        let name = if name == id_property {
            ID_FIELD.to_string()
        } else {
            name
        };
        let mut spec = Map::new();
        spec.insert(name, json!(direction.as_str()));
        sort.push(JsonValue::Object(spec));
    }
    sort
}

fn parse_order_entry(entry: &str) -> (String, SortDirection) {
    let trimmed = entry.trim();
    for (suffix, direction) in [
        ("DESC", SortDirection::Desc),
        ("desc", SortDirection::Desc),
        ("ASC", SortDirection::Asc),
        ("asc", SortDirection::Asc),
    ] {
        if let Some(name) = trimmed.strip_suffix(suffix) {
            if name.ends_with(char::is_whitespace) && !name.trim().is_empty() {
                return (name.trim().to_string(), direction);
            }
        }
    }
    (trimmed.to_string(), SortDirection::Asc)
}

/// Rebuild a dotted path as nested objects around the translated condition.
fn unfold(path: &[&str], leaf: JsonValue) -> JsonValue {
    match path.split_first() {
        None => leaf,
        Some((head, rest)) => {
            let mut map = Map::new();
            map.insert((*head).to_string(), unfold(rest, leaf));
            JsonValue::Object(map)
        }
    }
}

/// Insert a value under `key`, merging recursively when both sides are
/// objects so sibling dotted paths sharing a prefix coexist.
fn merge_entry(map: &mut Map<String, JsonValue>, key: &str, value: JsonValue) {
    let merged = match (map.remove(key), value) {
        (Some(JsonValue::Object(mut existing)), JsonValue::Object(new)) => {
            for (k, v) in new {
                merge_entry(&mut existing, &k, v);
            }
            JsonValue::Object(existing)
        }
        (_, value) => value,
    };
    map.insert(key.to_string(), merged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DEFAULT_DISCRIMINATOR;
    use crate::model::{Property, PropertyType};
    use serde_json::json;

    const DISC: Option<&str> = Some(DEFAULT_DISCRIMINATOR);

    fn player() -> ModelDescriptor {
        ModelDescriptor::new("Player")
            .with_property("name", Property::new(PropertyType::String))
            .with_property("age", Property::indexed(PropertyType::Number))
    }

    #[test]
    fn test_empty_where_is_just_the_discriminator() {
        let selector = build_selector(&player(), DISC, None).unwrap();
        assert_eq!(selector, json!({DEFAULT_DISCRIMINATOR: "Player"}));
    }

    #[test]
    fn test_equality_merges_with_discriminator() {
        let selector = build_selector(&player(), DISC, Some(&json!({"name": "ada"}))).unwrap();
        assert_eq!(
            selector,
            json!({"name": "ada", DEFAULT_DISCRIMINATOR: "Player"})
        );
    }

    #[test]
    fn test_id_key_renamed_and_stringified() {
        let selector = build_selector(&player(), DISC, Some(&json!({"id": 7}))).unwrap();
        assert_eq!(selector["_id"], json!("7"));
        assert!(selector.get("id").is_none());
    }

    #[test]
    fn test_between_is_an_inclusive_range() {
        let selector =
            build_selector(&player(), DISC, Some(&json!({"age": {"between": [18, 30]}}))).unwrap();
        assert_eq!(selector["age"], json!({"$gte": 18, "$lte": 30}));
    }

    #[test]
    fn test_membership_inequality_operators() {
        let selector = build_selector(
            &player(),
            DISC,
            Some(&json!({"age": {"inq": [1, 2]}, "name": {"neq": "x"}})),
        )
        .unwrap();
        assert_eq!(selector["age"], json!({"$in": [1, 2]}));
        assert_eq!(selector["name"], json!({"$ne": "x"}));
    }

    #[test]
    fn test_unknown_operator_passes_through_prefixed() {
        let selector =
            build_selector(&player(), DISC, Some(&json!({"age": {"mod": [2, 0]}}))).unwrap();
        assert_eq!(selector["age"], json!({"$mod": [2, 0]}));
    }

    #[test]
    fn test_like_adds_id_range_fallback() {
        let selector =
            build_selector(&player(), DISC, Some(&json!({"name": {"like": "^a"}}))).unwrap();
        assert_eq!(selector["name"], json!({"$regex": "^a"}));
        assert_eq!(selector["_id"], json!({"$gt": null}));
    }

    #[test]
    fn test_nlike_wraps_a_negated_character_class() {
        let selector =
            build_selector(&player(), DISC, Some(&json!({"name": {"nlike": "bad"}}))).unwrap();
        assert_eq!(selector["name"], json!({"$regex": "[^bad]"}));
    }

    #[test]
    fn test_regexp_inlines_case_insensitive_flag() {
        let selector = build_selector(
            &player(),
            DISC,
            Some(&json!({"name": {"regexp": "^a", "options": "i"}})),
        )
        .unwrap();
        assert_eq!(selector["name"], json!({"$regex": "(?i)^a"}));
    }

    #[test]
    fn test_regexp_drops_global_flag() {
        let selector = build_selector(
            &player(),
            DISC,
            Some(&json!({"name": {"regexp": "^a", "options": "gi"}})),
        )
        .unwrap();
        assert_eq!(selector["name"], json!({"$regex": "(?i)^a"}));
    }

    #[test]
    fn test_regex_with_existing_id_constraint_keeps_it() {
        let selector = build_selector(
            &player(),
            DISC,
            Some(&json!({"id": "9", "name": {"like": "^a"}})),
        )
        .unwrap();
        assert_eq!(selector["_id"], json!("9"));
    }

    #[test]
    fn test_combinator_children_reacquire_discriminator() {
        let selector = build_selector(
            &player(),
            DISC,
            Some(&json!({"or": [{"name": "ada"}, {"age": {"gt": 30}}]})),
        )
        .unwrap();
        let children = selector["$or"].as_array().unwrap();
        assert_eq!(children.len(), 2);
        for child in children {
            assert_eq!(child[DEFAULT_DISCRIMINATOR], json!("Player"));
        }
        assert_eq!(children[1]["age"], json!({"$gt": 30}));
    }

    #[test]
    fn test_nested_array_path_unfolds_with_elem_match() {
        let model = ModelDescriptor::new("Customer").with_property(
            "address",
            Property::new(PropertyType::Object(vec![(
                "tags".to_string(),
                Property::new(PropertyType::Array(Box::new(PropertyType::Object(vec![(
                    "tag".to_string(),
                    Property::new(PropertyType::String),
                )])))),
            )])),
        );
        let selector = build_selector(
            &model,
            DISC,
            Some(&json!({"address.tags.tag": "business"})),
        )
        .unwrap();
        assert_eq!(
            selector["address"],
            json!({"tags": {"$elemMatch": {"tag": "business"}}})
        );
        assert!(selector.get("address.tags.tag").is_none());
    }

    #[test]
    fn test_unresolvable_dotted_path_stays_verbatim() {
        let selector =
            build_selector(&player(), DISC, Some(&json!({"stats.wins": 3}))).unwrap();
        assert_eq!(selector["stats.wins"], json!(3));
    }

    #[test]
    fn test_model_selector_override_replaces_discriminator() {
        let model = ModelDescriptor::new("Legacy")
            .with_model_selector(json!({"doc_kind": "legacy"}));
        let selector = build_selector(&model, None, Some(&json!({"name": "x"}))).unwrap();
        assert_eq!(selector, json!({"doc_kind": "legacy", "name": "x"}));
    }

    #[test]
    fn test_sort_defaults_to_id_ascending() {
        let sort = build_sort(&player(), &[]);
        assert_eq!(sort, vec![json!({"_id": "asc"})]);
    }

    #[test]
    fn test_sort_parses_direction_suffix_and_comma_lists() {
        let sort = build_sort(&player(), &["age DESC,name".to_string()]);
        assert_eq!(sort, vec![json!({"age": "desc"}), json!({"name": "asc"})]);
    }

    #[test]
    fn test_sort_maps_id_property() {
        let sort = build_sort(&player(), &["id ASC".to_string()]);
        assert_eq!(sort, vec![json!({"_id": "asc"})]);
    }
}

//! Bookmark-driven paginated `_find` execution.
//!
//! A single `_find` call cannot be trusted to return a complete logical
//! page: the store caps each response at its native page size and hands
//! back a continuation bookmark. The executor re-issues the selector with
//! each new bookmark until the scan makes no forward progress or the
//! caller's window is filled, and materializes the whole ordered result
//! eagerly.

use serde_json::Value as JsonValue;
use tracing::debug;

use chaise_db_core::ID_FIELD;

use crate::client::{Database, FindQuery};
use crate::error::{ConnectorError, Result};

/// Largest number of documents the store returns per `_find` call.
pub(crate) const NATIVE_PAGE_LIMIT: usize = 200;

/// Run one logical query to completion.
pub(crate) async fn find_paged(db: &Database, query: FindQuery) -> Result<Vec<JsonValue>> {
    let wanted = query.limit;
    let mut skip = query.skip;
    let mut accumulated: Vec<JsonValue> = Vec::new();
    let mut last_bookmark: Option<String> = None;

    loop {
        let mut page = query.clone();
        page.limit = Some(match wanted {
            Some(limit) => (limit - accumulated.len()).min(NATIVE_PAGE_LIMIT),
            None => NATIVE_PAGE_LIMIT,
        });
        // the offset positions the logical window, not every physical page
        page.skip = skip.take();
        page.bookmark = last_bookmark.clone();

        let response = db.find(&page).await?;
        let docs = response.docs.ok_or_else(|| {
            ConnectorError::protocol(format!(
                "no documents returned for query: {}",
                serde_json::to_string(&page).unwrap_or_default()
            ))
        })?;
        let page_len = docs.len();
        let page_limit = page.limit.unwrap_or(NATIVE_PAGE_LIMIT);
        accumulated.extend(docs);
        debug!(page_len, total = accumulated.len(), "find page");

        match response.bookmark {
            // no forward progress: the store has exhausted matching documents
            Some(bookmark) if Some(&bookmark) != last_bookmark.as_ref() && page_len > 0 => {
                last_bookmark = Some(bookmark);
            }
            _ => break,
        }
        if let Some(limit) = wanted {
            if accumulated.len() >= limit {
                break;
            }
        }
        if page_len < page_limit {
            break;
        }
    }

    if let Some(limit) = wanted {
        accumulated.truncate(limit);
    }
    Ok(accumulated)
}

/// Re-sort by the numeric value of the id field.
///
/// The store orders the reserved id field as a string, so models declaring
/// a numeric id would come back in lexicographic order ("10" before "2").
pub(crate) fn sort_numeric_ids(docs: &mut [JsonValue], sort: &[JsonValue]) {
    for spec in sort {
        let Some(direction) = spec.get(ID_FIELD).and_then(|d| d.as_str()) else {
            continue;
        };
        docs.sort_by_key(|doc| {
            doc.get(ID_FIELD)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(i64::MAX)
        });
        if direction == "desc" {
            docs.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sort_numeric_ids_ascending() {
        let mut docs = vec![json!({"_id": "10"}), json!({"_id": "2"}), json!({"_id": "1"})];
        sort_numeric_ids(&mut docs, &[json!({"_id": "asc"})]);
        let ids: Vec<_> = docs.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_sort_numeric_ids_descending() {
        let mut docs = vec![json!({"_id": "2"}), json!({"_id": "10"})];
        sort_numeric_ids(&mut docs, &[json!({"_id": "desc"})]);
        let ids: Vec<_> = docs.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["10", "2"]);
    }

    #[test]
    fn test_sort_ignores_non_id_specs() {
        let mut docs = vec![json!({"_id": "10"}), json!({"_id": "2"})];
        sort_numeric_ids(&mut docs, &[json!({"age": "asc"})]);
        let ids: Vec<_> = docs.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["10", "2"]);
    }
}

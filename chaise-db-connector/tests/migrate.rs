//! Index migration against a mocked store.

mod support;

use serde_json::json;
use support::{connector, stored_player, DB, DISC};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AGE_DDOC: &str = "ChaiseModel__Player__ChaiseIndex__age_index";
const DISC_DDOC: &str = "ChaiseModel__Player__ChaiseIndex__chaise__model__name_index";

fn index_path() -> String {
    format!("/{DB}/_index")
}

/// The `_index` listing as the store would report the Player indexes right
/// after migration.
fn current_player_listing() -> serde_json::Value {
    json!({
        "total_rows": 3,
        "indexes": [
            {"ddoc": null, "name": "_all_docs", "type": "special", "def": {"fields": [{"_id": "asc"}]}},
            {
                "ddoc": format!("_design/{AGE_DDOC}"),
                "name": "age_index",
                "type": "json",
                "def": {"fields": [{"age": "asc"}, {DISC: "asc"}]},
            },
            {
                "ddoc": format!("_design/{DISC_DDOC}"),
                "name": format!("{DISC}_index"),
                "type": "json",
                "def": {"fields": [{DISC: "asc"}]},
            },
        ],
    })
}

#[tokio::test]
async fn test_autoupdate_creates_property_and_discriminator_indexes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 1,
            "indexes": [
                {"ddoc": null, "name": "_all_docs", "type": "special", "def": {"fields": [{"_id": "asc"}]}},
            ],
        })))
        .expect(1)
        .mount(&server)
        .await;
    // the indexed property gets an ascending index ending in the
    // discriminator field
    Mock::given(method("POST"))
        .and(path(index_path()))
        .and(body_partial_json(json!({
            "ddoc": AGE_DDOC,
            "name": "age_index",
            "type": "json",
            "index": {"fields": [{"age": "asc"}, {DISC: "asc"}]},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "created", "id": format!("_design/{AGE_DDOC}"), "name": "age_index",
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(index_path()))
        .and(body_partial_json(json!({
            "ddoc": DISC_DDOC,
            "index": {"fields": [{DISC: "asc"}]},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "created", "id": format!("_design/{DISC_DDOC}"), "name": format!("{DISC}_index"),
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(&server);
    connector.autoupdate(&["Player"]).await.unwrap();
}

#[tokio::test]
async fn test_autoupdate_with_no_model_change_is_a_no_op() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_player_listing()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(wiremock::matchers::path_regex(format!("^/{DB}/.*$")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let connector = connector(&server);
    connector.autoupdate(&["Player"]).await.unwrap();
}

#[tokio::test]
async fn test_autoupdate_drops_an_index_with_no_surviving_declaration() {
    let server = MockServer::start().await;
    let stale_ddoc = "ChaiseModel__Player__ChaiseIndex__old_index";

    let mut listing = current_player_listing();
    listing["indexes"].as_array_mut().unwrap().push(json!({
        "ddoc": format!("_design/{stale_ddoc}"),
        "name": "old_index",
        "type": "json",
        "def": {"fields": [{"old": "asc"}, {DISC: "asc"}]},
    }));
    Mock::given(method("GET"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .expect(1)
        .mount(&server)
        .await;
    // deleting an index means deleting its design document at its current
    // revision
    Mock::given(method("GET"))
        .and(path(format!("/{DB}/_design/{stale_ddoc}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": format!("_design/{stale_ddoc}"),
            "_rev": "1-z",
            "language": "query",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/{DB}/_design/{stale_ddoc}")))
        .and(wiremock::matchers::query_param("rev", "1-z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let connector = connector(&server);
    connector.autoupdate(&["Player"]).await.unwrap();
}

#[tokio::test]
async fn test_autoupdate_leaves_other_models_indexes_alone() {
    let server = MockServer::start().await;
    let mut listing = current_player_listing();
    listing["indexes"].as_array_mut().unwrap().push(json!({
        "ddoc": "_design/ChaiseModel__Order__ChaiseIndex__total_index",
        "name": "total_index",
        "type": "json",
        "def": {"fields": [{"total": "asc"}, {DISC: "asc"}]},
    }));
    Mock::given(method("GET"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(wiremock::matchers::path_regex(format!("^/{DB}/.*$")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let connector = connector(&server);
    connector.autoupdate(&["Player"]).await.unwrap();
}

#[tokio::test]
async fn test_automigrate_destroys_data_then_rebuilds_indexes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{DB}/_find")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [stored_player("p1", 30)],
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/{DB}/p1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 0, "indexes": [],
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(index_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "created"})))
        .expect(2)
        .mount(&server)
        .await;

    let connector = connector(&server);
    connector.automigrate(&["Player"]).await.unwrap();
}

//! Shared helpers for connector integration tests.

#![allow(dead_code)]

use chaise_db_connector::{ConnectionSettings, Connector};
use chaise_db_core::{ModelDescriptor, Property, PropertyType};
use serde_json::{json, Value as JsonValue};
use wiremock::MockServer;

/// Database name every test connector talks to.
pub const DB: &str = "testdb";
/// Default discriminator field stamped on stored documents.
pub const DISC: &str = "chaise__model__name";

/// A connector pointed at the mock server with the test models registered.
pub fn connector(server: &MockServer) -> Connector {
    let settings = ConnectionSettings::with_url(format!("{}/{DB}", server.uri()));
    let connector = Connector::new(settings).expect("settings are valid");
    connector.register_model(player_model());
    connector.register_model(counter_model());
    connector
}

/// String-id model with one indexed property.
pub fn player_model() -> ModelDescriptor {
    ModelDescriptor::new("Player")
        .with_property("name", Property::new(PropertyType::String))
        .with_property("age", Property::indexed(PropertyType::Number))
}

/// Numeric-id model, for client-side id sorting.
pub fn counter_model() -> ModelDescriptor {
    ModelDescriptor::new("Counter")
        .with_property("id", Property::new(PropertyType::Number))
        .with_property("value", Property::new(PropertyType::Number))
}

/// A stored Player document as the store would return it.
pub fn stored_player(id: &str, age: i64) -> JsonValue {
    json!({
        "_id": id,
        "_rev": format!("1-{id}"),
        "age": age,
        DISC: "Player",
    })
}

/// A batch of stored Player documents with sequential ids.
pub fn stored_players(range: std::ops::Range<usize>) -> Vec<JsonValue> {
    range
        .map(|i| stored_player(&format!("d{i}"), i as i64))
        .collect()
}

//! Model descriptors: the abstract document shape the adapter translates.
//!
//! A [`ModelDescriptor`] carries everything the translation layer needs to
//! know about one model: its property tree, its id property, its declared
//! composite indexes, and optional per-model overrides for the database name
//! and the discriminator handling. Descriptors are built once, registered
//! with the connector, and treated as immutable until the model is
//! re-registered and re-migrated.

use serde_json::Value as JsonValue;

/// Declared type of one model property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    /// An array whose elements all share one declared type
    Array(Box<PropertyType>),
    /// A sub-document with its own declared properties, in declaration order
    Object(Vec<(String, Property)>),
    /// No declared type; values pass through untouched
    Any,
}

/// One declared model property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub kind: PropertyType,
    /// Whether migration should create a single-field index for it
    pub index: bool,
}

impl Property {
    pub fn new(kind: PropertyType) -> Self {
        Property { kind, index: false }
    }

    pub fn indexed(kind: PropertyType) -> Self {
        Property { kind, index: true }
    }
}

/// Ordered field list of one model-level composite index declaration.
/// The signed direction follows the declaration convention: `1` ascending,
/// `-1` descending.
pub type IndexKeys = Vec<(String, i8)>;

/// The abstract shape of one model.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    name: String,
    id_property: String,
    properties: Vec<(String, Property)>,
    indexes: Vec<(String, IndexKeys)>,
    model_selector: Option<JsonValue>,
    discriminator: Option<String>,
    database: Option<String>,
}

impl ModelDescriptor {
    /// Create a descriptor with the default `"id"` id property and no
    /// declared properties.
    pub fn new(name: impl Into<String>) -> Self {
        ModelDescriptor {
            name: name.into(),
            id_property: "id".to_string(),
            properties: Vec::new(),
            indexes: Vec::new(),
            model_selector: None,
            discriminator: None,
            database: None,
        }
    }

    /// Declare a property. Declaration order is preserved.
    pub fn with_property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.push((name.into(), property));
        self
    }

    /// Override the id property name (default `"id"`).
    pub fn with_id_property(mut self, name: impl Into<String>) -> Self {
        self.id_property = name.into();
        self
    }

    /// Declare a model-level composite index.
    pub fn with_index(mut self, name: impl Into<String>, keys: IndexKeys) -> Self {
        self.indexes.push((name.into(), keys));
        self
    }

    /// Replace the discriminator constraint with a custom selector object.
    ///
    /// When set, queries use this selector verbatim instead of the
    /// discriminator equality, and documents are not stamped with the
    /// discriminator field.
    pub fn with_model_selector(mut self, selector: JsonValue) -> Self {
        self.model_selector = Some(selector);
        self
    }

    /// Override the discriminator field name for this model only.
    pub fn with_discriminator(mut self, field: impl Into<String>) -> Self {
        self.discriminator = Some(field.into());
        self
    }

    /// Store this model's documents in a different database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_property(&self) -> &str {
        &self.id_property
    }

    pub fn properties(&self) -> &[(String, Property)] {
        &self.properties
    }

    pub fn indexes(&self) -> &[(String, IndexKeys)] {
        &self.indexes
    }

    pub fn model_selector(&self) -> Option<&JsonValue> {
        self.model_selector.as_ref()
    }

    pub fn discriminator_override(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Look up a top-level property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Names of all top-level date-typed properties.
    pub fn date_properties(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(_, p)| p.kind == PropertyType::Date)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Whether the id property is declared numeric.
    pub fn id_is_numeric(&self) -> bool {
        matches!(
            self.property(&self.id_property),
            Some(Property {
                kind: PropertyType::Number,
                ..
            })
        )
    }

    /// Resolve a dotted property path against the declared property tree,
    /// inserting an `$elemMatch` segment after every array-typed step.
    ///
    /// Returns `None` when any segment fails to resolve; the caller then
    /// keeps the flat dotted key verbatim.
    pub fn array_match_path(&self, dotted: &str) -> Option<String> {
        let segments: Vec<&str> = dotted.split('.').collect();
        if segments.len() <= 1 {
            return None;
        }

        let mut props: &[(String, Property)] = &self.properties;
        let mut out: Vec<String> = Vec::with_capacity(segments.len() + 1);
        for (i, segment) in segments.iter().enumerate() {
            let property = props
                .iter()
                .find(|(n, _)| n == segment)
                .map(|(_, p)| p)?;
            out.push((*segment).to_string());

            let mut kind = &property.kind;
            if let PropertyType::Array(element) = kind {
                out.push("$elemMatch".to_string());
                kind = element;
            }
            match kind {
                PropertyType::Object(children) => props = children,
                _ => {
                    // scalar leaf: any remaining segment cannot resolve
                    if i + 1 < segments.len() {
                        return None;
                    }
                    props = &[];
                }
            }
        }
        Some(out.join("."))
    }
}

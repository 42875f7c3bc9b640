//! Best-effort field extraction from syntactically incomplete JSON.
//!
//! The extractor is a pure function of the buffer and the field schema:
//! calling it twice on the same buffer yields equal results, and a field
//! that cannot be determined yet is simply absent from the returned map.
//!
//! Keys are located by their quoted literal followed by a colon, which is
//! enough to tell `"name"` from `"companyName"` for the fixed schemas the
//! pipeline uses. It is not a general JSON tokenizer.

pub mod repair;
mod scan;

pub use repair::{excerpt, find_json_object, parse_model_json, strip_artifacts};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON type a field is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A JSON string.
    String,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
}

/// A named, typed field of a stage's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// The JSON key.
    pub name: String,
    /// The expected type.
    pub kind: FieldKind,
}

impl FieldDef {
    /// Creates a new field definition.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Creates a string field.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Creates an array field.
    #[must_use]
    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Array)
    }

    /// Creates an object field.
    #[must_use]
    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Object)
    }
}

/// An ordered set of field definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: Vec<FieldDef>,
}

impl FieldSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string field.
    #[must_use]
    pub fn string(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef::string(name));
        self
    }

    /// Adds an array field.
    #[must_use]
    pub fn array(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef::array(name));
        self
    }

    /// Adds an object field.
    #[must_use]
    pub fn object(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef::object(name));
        self
    }

    /// Returns the field definitions.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the field names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<FieldDef> for FieldSchema {
    fn from_iter<I: IntoIterator<Item = FieldDef>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Fields extracted from one pass over a stage's buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFieldSet {
    /// Extracted values by field name.
    pub fields: Map<String, Value>,
    /// Number of extracted fields.
    pub field_count: usize,
    /// Tokens received when the pass ran.
    pub token_count: usize,
    /// Whether the buffer was complete.
    pub is_final: bool,
}

impl ExtractedFieldSet {
    /// Runs an extraction pass over `buffer`.
    #[must_use]
    pub fn from_buffer(buffer: &str, schema: &FieldSchema, token_count: usize, is_final: bool) -> Self {
        let fields = extract(buffer, schema.fields());
        Self {
            field_count: fields.len(),
            fields,
            token_count,
            is_final,
        }
    }
}

/// Extracts every determinable field of `schema` from `buffer`.
#[must_use]
pub fn extract(buffer: &str, schema: &[FieldDef]) -> Map<String, Value> {
    schema
        .iter()
        .filter_map(|def| extract_field(buffer, def).map(|value| (def.name.clone(), value)))
        .collect()
}

/// Extracts one field, or `None` if it cannot be determined yet.
#[must_use]
pub fn extract_field(buffer: &str, def: &FieldDef) -> Option<Value> {
    let bytes = buffer.as_bytes();
    let after_key = scan::find_key(buffer, &def.name)?;
    let start = scan::skip_whitespace(bytes, after_key);

    match (def.kind, bytes.get(start)?) {
        (FieldKind::String, b'"') => {
            let end = scan::string_end(bytes, start)?;
            serde_json::from_str::<String>(&buffer[start..=end])
                .ok()
                .map(Value::String)
        }
        (FieldKind::Array, b'[') => match scan::balanced_end(bytes, start, b'[', b']') {
            Some(end) => serde_json::from_str::<Value>(&buffer[start..=end]).ok(),
            None => Some(Value::Array(scan::partial_array(buffer, start))),
        },
        (FieldKind::Object, b'{') => {
            let end = scan::balanced_end(bytes, start, b'{', b'}')?;
            serde_json::from_str::<Value>(&buffer[start..=end]).ok()
        }
        _ => None,
    }
}

//! Structured addresses and their canonical digests
//!
//! An address is a `type` discriminator plus an open set of fields. Two
//! addresses built independently with the same fields are the same address,
//! whatever order the fields were inserted in.

use crate::container::KeyHasher;
use crate::error::{DepcacheError, DepcacheResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::{self, Write as _};

/// Identifier of a loadable unit: `{"type": kind, ..fields}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "type")]
    kind: String,

    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Address {
    /// Create an address with no fields besides its type
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Create an address from a type and a field map
    ///
    /// A `"type"` member inside `fields` is dropped; `kind` wins.
    pub fn with_fields(kind: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        fields.remove("type");
        Self {
            kind: kind.into(),
            fields,
        }
    }

    /// Add a field, consuming and returning the address
    ///
    /// Setting `"type"` to a string replaces the discriminator.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        if field == "type" {
            if let Value::String(kind) = value {
                self.kind = kind;
            }
            return self;
        }
        self.fields.insert(field, value);
        self
    }

    /// The `touch` address anchoring invalidation to an external path
    pub fn touch(path: impl Into<Value>) -> Self {
        Self::new(crate::registry::TOUCH).with("path", path)
    }

    /// Parse an address from an arbitrary JSON value
    pub fn from_value(value: Value) -> DepcacheResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(DepcacheError::InvalidAddress(
                "address must be a JSON object".to_string(),
            ));
        };

        match fields.remove("type") {
            Some(Value::String(kind)) => Ok(Self { kind, fields }),
            Some(other) => Err(DepcacheError::InvalidAddress(format!(
                "\"type\" must be a string, got {}",
                other
            ))),
            None => Err(DepcacheError::InvalidAddress(
                "missing \"type\" field".to_string(),
            )),
        }
    }

    /// The type discriminator used to pick a builder
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Look up a field by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a string field
    pub fn get_str(&self, field: &str) -> Option<&str> {
        if field == "type" {
            return Some(&self.kind);
        }
        self.fields.get(field).and_then(Value::as_str)
    }

    /// All fields except the type discriminator
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert into a JSON object including the `"type"` member
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("type".to_string(), Value::String(self.kind.clone()));
        Value::Object(object)
    }

    /// Deterministic JSON text with object keys sorted at every depth
    pub fn canonical_json(&self) -> String {
        let mut out = String::new();
        write_canonical(&mut out, &self.to_value());
        out
    }

    /// SHA-256 digest of the canonical JSON text
    pub fn digest(&self) -> AddressDigest {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        AddressDigest(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_json())
    }
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, &Value::String(key.clone()));
                out.push(':');
                write_canonical(out, &map[key]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        // Scalars have a single serde_json rendering
        scalar => {
            let _ = write!(out, "{}", scalar);
        }
    }
}

/// Content digest of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressDigest([u8; 32]);

impl AddressDigest {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for AddressDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Default `KeyHasher` for addresses: SHA-256 over canonical JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalHasher;

impl KeyHasher<Address> for CanonicalHasher {
    type Digest = AddressDigest;

    fn digest(&self, key: &Address) -> AddressDigest {
        key.digest()
    }
}

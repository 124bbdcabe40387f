//! Record and Key Derivation
//!
//! A [`Record`] is the value stored under a ledger key: a flat JSON object
//! whose fields are scalars, strings or numbers, tagged with a `docType`
//! discriminator.
//!
//! ## Key Derivation
//!
//! Records arrive without a ledger key. The key is derived from a business
//! identifier inside the record, and the derivation rule is a single
//! [`KeyPolicy`] chosen per ingestion. Every write path receives the policy;
//! none derives keys on its own, so two paths can never disagree about which
//! key a record lands under.
//!
//! | Policy      | Key                               | docType       |
//! |-------------|-----------------------------------|---------------|
//! | `OrderKey`  | `L_ORDERKEY`                      | `order`       |
//! | `OrderLine` | `L_ORDERKEY-L_LINENUMBER`         | `order`       |
//! | `Sender`    | lower-cased `from` address        | `transaction` |
//!
//! Numeric identifiers are canonical: `7`, `7.0` and `"007"` all derive the
//! key `7`. Identifiers that cannot be represented exactly are rejected.
//!
//! The identifier fields that form the key are removed from the stored
//! document for the order policies; the transaction policy keeps the full
//! document.
//!
//! ## Example
//! ```
//! use ledgerdex_core::KeyPolicy;
//! use serde_json::json;
//!
//! let raw = json!({"L_ORDERKEY": 91041, "L_QUANTITY": 17});
//! let (key, record) = KeyPolicy::OrderKey.derive(raw).unwrap();
//! assert_eq!(key.as_str(), "91041");
//! assert_eq!(record.doc_type, "order");
//! assert!(record.get("L_ORDERKEY").is_none());
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const ORDER_KEY_FIELD: &str = "L_ORDERKEY";
const LINE_NUMBER_FIELD: &str = "L_LINENUMBER";
const SENDER_FIELD: &str = "from";

/// Largest float magnitude below which every integer is exact (2^53)
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// A keyed ledger document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Document type discriminator
    #[serde(rename = "docType")]
    pub doc_type: String,

    /// Remaining document fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(doc_type: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            doc_type: doc_type.into(),
            fields,
        }
    }

    /// Build a record from an arbitrary JSON value.
    ///
    /// The value must be an object. A `docType` field, if present, becomes
    /// the discriminator; otherwise `default_doc_type` is used.
    pub fn from_value(value: Value, default_doc_type: &str) -> Result<Self> {
        let mut fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidRecord(format!(
                    "expected JSON object, found {}",
                    json_kind(&other)
                )))
            }
        };

        let doc_type = match fields.remove("docType") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(Error::InvalidRecord(format!(
                    "docType must be a string, found {}",
                    json_kind(&other)
                )))
            }
            None => default_doc_type.to_string(),
        };

        Ok(Self { doc_type, fields })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Serialize to the byte form a ledger stores.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(data)?;
        Self::from_value(value, "unknown")
    }

    /// Rough size in bytes, used for logging batch volumes
    pub fn estimated_size(&self) -> usize {
        self.doc_type.len()
            + self
                .fields
                .iter()
                .map(|(k, v)| k.len() + v.to_string().len())
                .sum::<usize>()
    }
}

/// Ledger key derived from a record's business identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(String);

impl OrderKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OrderKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Rule that turns a raw document into `(key, record)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Key is the order identifier alone
    #[default]
    OrderKey,
    /// Key is the order identifier joined with the line number
    OrderLine,
    /// Key is the sending address of a blockchain transaction
    Sender,
}

impl KeyPolicy {
    pub fn doc_type(&self) -> &'static str {
        match self {
            KeyPolicy::OrderKey | KeyPolicy::OrderLine => "order",
            KeyPolicy::Sender => "transaction",
        }
    }

    /// Derive the ledger key and the stored record from a raw document.
    pub fn derive(&self, raw: Value) -> Result<(OrderKey, Record)> {
        let mut fields = match raw {
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidRecord(format!(
                    "expected JSON object, found {}",
                    json_kind(&other)
                )))
            }
        };
        fields.remove("docType");

        let key = match self {
            KeyPolicy::OrderKey => {
                let order = integral_field(&fields, ORDER_KEY_FIELD)?;
                fields.remove(ORDER_KEY_FIELD);
                order
            }
            KeyPolicy::OrderLine => {
                let order = integral_field(&fields, ORDER_KEY_FIELD)?;
                let line = integral_field(&fields, LINE_NUMBER_FIELD)?;
                fields.remove(ORDER_KEY_FIELD);
                fields.remove(LINE_NUMBER_FIELD);
                format!("{}-{}", order, line)
            }
            KeyPolicy::Sender => sender_field(&fields)?,
        };

        Ok((OrderKey(key), Record::new(self.doc_type(), fields)))
    }
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPolicy::OrderKey => write!(f, "order_key"),
            KeyPolicy::OrderLine => write!(f, "order_line"),
            KeyPolicy::Sender => write!(f, "sender"),
        }
    }
}

fn integral_field(fields: &Map<String, Value>, name: &str) -> Result<String> {
    let err = |reason: &str| Error::KeyDerivation {
        field: name.to_string(),
        reason: reason.to_string(),
    };

    match fields.get(name) {
        None | Some(Value::Null) => Err(err("field is missing")),
        Some(Value::Number(n)) => {
            if let Some(u) = n.as_u64() {
                Ok(u.to_string())
            } else if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() != 0.0 || !f.is_finite() => {
                        Err(err("number is not integral"))
                    }
                    Some(f) if f.abs() <= MAX_EXACT_FLOAT => Ok((f as i64).to_string()),
                    _ => Err(err("number is out of the exact integer range")),
                }
            }
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(i.to_string())
            } else if let Ok(u) = trimmed.parse::<u64>() {
                Ok(u.to_string())
            } else {
                Err(err("string is not an integer"))
            }
        }
        Some(other) => Err(err(&format!("unexpected {}", json_kind(other)))),
    }
}

fn sender_field(fields: &Map<String, Value>) -> Result<String> {
    let err = |reason: &str| Error::KeyDerivation {
        field: SENDER_FIELD.to_string(),
        reason: reason.to_string(),
    };

    let address = fields
        .get(SENDER_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| err("field is missing or not a string"))?;

    let hex = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| err("address must start with 0x"))?;

    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(err("address is not hexadecimal"));
    }

    Ok(format!("0x{}", hex.to_ascii_lowercase()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

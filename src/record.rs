use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

use crate::columns::ColumnRegistry;
use crate::domain::PTVError;

/// The closed set of fields a procurement record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Dosage,
    MnnId,
    Num,
    ReleaseForm,
    Subtype,
    Unit,
    Name,
    Multiplicity,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Dosage,
        Field::MnnId,
        Field::Num,
        Field::ReleaseForm,
        Field::Subtype,
        Field::Unit,
        Field::Name,
        Field::Multiplicity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Dosage => "dosage",
            Field::MnnId => "mnn_id",
            Field::Num => "num",
            Field::ReleaseForm => "release_form",
            Field::Subtype => "subtype",
            Field::Unit => "unit",
            Field::Name => "name",
            Field::Multiplicity => "multiplicity",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = PTVError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .find(|f| f.as_str() == s)
            .copied()
            .ok_or_else(|| PTVError::UnknownField(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Value {
    /// Text form used for matching and export. Null renders as an empty string.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
        }
    }

    // Null < numbers < text
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
        }
    }

    /// Ascending order: text case-insensitive, numbers numerically.
    /// Integers and floats compare exactly, NaN sorts after every other number.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => compare_floats(*a, *b),
            (Value::Integer(a), Value::Float(b)) => compare_integer_float(*a, *b),
            (Value::Float(a), Value::Integer(b)) => compare_integer_float(*b, *a).reverse(),
            (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn from_json(field: Field, value: serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            serde_json::Value::Bool(b) => Ok(Value::Text(b.to_string())),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Integer(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("field {field} holds an unrepresentable number")),
            },
            _ => Err(format!("field {field} is not a scalar value")),
        }
    }
}

fn compare_floats(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

// Casting the integer to f64 rounds above 2^53, so compare against the float's integral part.
fn compare_integer_float(i: i64, f: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() || f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let integral = f.trunc();
    match i.cmp(&(integral as i64)) {
        Ordering::Equal => compare_floats(integral, f),
        ordering => ordering,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// One procurement line item. Keys may be absent (e.g. `multiplicity`) or present with `Null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Map<String, serde_json::Value>")]
pub struct Record {
    fields: BTreeMap<Field, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with(mut self, field: Field, value: impl Into<Value>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn insert(&mut self, field: Field, value: Value) {
        self.fields.insert(field, value);
    }

    pub fn get(&self, field: Field) -> Option<&Value> {
        self.fields.get(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains_key(&field)
    }

    /// Text of a field, empty for missing and null values.
    pub fn text(&self, field: Field) -> String {
        self.get(field).map(Value::to_text).unwrap_or_default()
    }
}

impl TryFrom<serde_json::Map<String, serde_json::Value>> for Record {
    type Error = String;

    fn try_from(map: serde_json::Map<String, serde_json::Value>) -> Result<Self, Self::Error> {
        let mut record = Record::new();
        for (key, value) in map {
            match key.parse::<Field>() {
                Ok(field) => record.insert(field, Value::from_json(field, value)?),
                Err(_) => trace!("Ignoring unknown record key \"{key}\""),
            }
        }
        Ok(record)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// The full unfiltered list of records fetched for this session.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    /// Accepts the fetched records only if every configured column key exists on every record.
    pub fn load(records: Vec<Record>, columns: &ColumnRegistry) -> Result<Self, PTVError> {
        let keys = columns.keys();
        for (row, record) in records.iter().enumerate() {
            if let Some(field) = keys.iter().find(|k| !record.contains(**k)) {
                return Err(PTVError::InvalidRecord { row, field: *field });
            }
        }
        debug!("Record store loaded with {} records", records.len());
        Ok(Self { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

use std::collections::HashMap;

use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;

use super::error::ProtocolError;

/// Last known state of one point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedValue {
    pub raw_values: Vec<f64>,
    /// first element of `raw_values`
    pub value: f64,
    pub timestamp: Timestamp,
    pub stale: bool,
}

/// Whatever the controller answered to a write. Not interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAck {
    pub body: Value,
}

impl CachedValue {
    pub fn new(raw_values: Vec<f64>, timestamp: Timestamp) -> Option<Self> {
        let value = *raw_values.first()?;
        Some(Self {
            raw_values,
            value,
            timestamp,
            stale: false,
        })
    }
}

/// Controllers occasionally send Latin-1 labels.
pub fn decode_body(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

pub fn parse_json(bytes: &[u8]) -> Result<Value, ProtocolError> {
    Ok(serde_json::from_str(&decode_body(bytes))?)
}

/// Pulls every requested id out of `{"values": {...}}`.
pub fn parse_values(
    body: &Value,
    ids: &[&str],
    timestamp: Timestamp,
) -> Result<HashMap<String, CachedValue>, ProtocolError> {
    let Some(values) = body.get("values").and_then(Value::as_object) else {
        if let Some(code) = controller_error(body) {
            return Err(ProtocolError::Controller(code));
        }
        return Err(ProtocolError::MissingValues);
    };

    let mut out = HashMap::with_capacity(ids.len());
    for id in ids {
        let raw = values
            .get(*id)
            .ok_or_else(|| ProtocolError::MissingId(id.to_string()))?;
        let nums = numbers(raw).ok_or_else(|| ProtocolError::NonNumeric(id.to_string()))?;
        let cached =
            CachedValue::new(nums, timestamp).ok_or_else(|| ProtocolError::NonNumeric(id.to_string()))?;
        out.insert(id.to_string(), cached);
    }
    Ok(out)
}

fn controller_error(body: &Value) -> Option<i64> {
    let code = match body.get("Error")? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (code != 0).then_some(code)
}

fn numbers(raw: &Value) -> Option<Vec<f64>> {
    match raw {
        Value::Array(items) => items.iter().map(number).collect(),
        scalar => Some(vec![number(scalar)?]),
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

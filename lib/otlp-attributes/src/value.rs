//! Helpers for reading OTLP attribute values.

use opentelemetry_proto::tonic::common::v1::{any_value::Value, KeyValue};

/// Returns the string value of an attribute, if it holds one.
pub fn string_value(kv: &KeyValue) -> Option<&str> {
    match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
        Some(Value::StringValue(s)) => Some(s.as_str()),
        _ => None,
    }
}

/// Finds a string attribute by key.
pub fn get_string_attribute<'a>(attributes: &'a [KeyValue], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|kv| kv.key == key)
        .and_then(string_value)
}

/// Renders a scalar attribute value as tag text.
///
/// Strings, booleans, integers and doubles are rendered. Arrays, maps and bytes are not representable as a tag value
/// and yield `None`.
pub fn scalar_to_string(kv: &KeyValue) -> Option<String> {
    match kv.value.as_ref().and_then(|v| v.value.as_ref())? {
        Value::StringValue(s) => Some(s.clone()),
        Value::BoolValue(b) => Some(b.to_string()),
        Value::IntValue(i) => Some(i.to_string()),
        Value::DoubleValue(d) => Some(d.to_string()),
        _ => None,
    }
}

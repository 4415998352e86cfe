//! Record rendering into the `alias=value` line protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::date::convert_date;
use super::error::EncodeError;
use super::schema::{RemoteSchema, SchemaEntry, ValueType};
use super::user_schema::UserSchema;
use super::Record;

/// What to do with a field whose value does not match its declared type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Omit the field; a required field falls back to its zero value.
    #[default]
    DropField,
    /// Reject the whole record.
    RejectRecord,
}

/// Check a value against a declared type.
///
/// `long` accepts integers and integer text only, so `2.0` is rejected even
/// though it is integral. `float` accepts any number or numeric text.
#[must_use]
pub fn valid_schema(entry: &SchemaEntry, value: &Value) -> bool {
    match (entry.value_type, value) {
        (ValueType::Long, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (ValueType::Long, Value::String(s)) => s.trim().parse::<i64>().is_ok(),
        (ValueType::Float, Value::Number(_)) => true,
        (ValueType::Float, Value::String(s)) => s.trim().parse::<f64>().is_ok(),
        (ValueType::String, Value::String(_)) => true,
        (ValueType::Boolean, Value::Bool(_)) => true,
        (ValueType::Boolean, Value::String(s)) => matches!(s.as_str(), "true" | "false"),
        (ValueType::Date, v) => convert_date(v).is_ok(),
        (ValueType::Array, Value::Array(items)) => entry.elem_type.map_or(true, |elem| {
            let elem = SchemaEntry::new(String::new(), elem);
            items.iter().all(|item| valid_schema(&elem, item))
        }),
        (ValueType::Map, Value::Object(map)) => entry.schema.iter().all(|nested| {
            map.get(&nested.key)
                .filter(|v| !v.is_null())
                .map_or(true, |v| valid_schema(nested, v))
        }),
        _ => false,
    }
}

/// Escape the characters that separate fields and lines.
#[must_use]
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\ "),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn render(entry: &SchemaEntry, value: &Value) -> Result<String, EncodeError> {
    let text = match (entry.value_type, value) {
        (ValueType::Date, v) => convert_date(v)?,
        (_, Value::String(s)) => s.clone(),
        (_, Value::Array(_) | Value::Object(_)) => {
            serde_json::to_string(value).map_err(|_| EncodeError::InvalidField {
                field: entry.key.clone(),
                expected: entry.value_type.to_string(),
            })?
        }
        (_, other) => other.to_string(),
    };
    Ok(escape(&text))
}

/// Renders records against a remote schema and user aliasing.
#[derive(Debug, Clone, Default)]
pub struct RecordEncoder {
    user: UserSchema,
    policy: FieldPolicy,
}

impl RecordEncoder {
    #[must_use]
    pub fn new(user: UserSchema, policy: FieldPolicy) -> Self {
        Self { user, policy }
    }

    pub fn set_user_schema(&mut self, user: UserSchema) {
        self.user = user;
    }

    /// Render one record as a newline-terminated line.
    ///
    /// Emitted fields are the user's explicit aliases, every required schema
    /// field, and every other schema field when the user ships all fields.
    /// Missing or null required fields get their type's zero value. Tokens
    /// are sorted by alias.
    ///
    /// # Errors
    ///
    /// Returns an error when a field is invalid under
    /// `FieldPolicy::RejectRecord`, or when no field can be emitted.
    pub fn encode(&self, record: &Record, schema: &RemoteSchema) -> Result<String, EncodeError> {
        let alias_to_key = self.user.alias_to_key();
        let mut tokens: Vec<(&str, String)> = Vec::new();

        for entry in schema.entries() {
            let alias = entry.key.as_str();
            let key = match alias_to_key.get(alias) {
                Some(key) => Some(*key),
                // A renamed source field ships only under its alias.
                None if self.user.fields.contains_key(alias) => None,
                None if self.user.default_all || entry.required => Some(alias),
                None => continue,
            };

            let value = key
                .and_then(|key| record.get(key))
                .filter(|v| !v.is_null());
            let rendered = match value {
                Some(v) if valid_schema(entry, v) => Some(render(entry, v)),
                Some(v) => {
                    let field = key.unwrap_or(alias);
                    tracing::debug!(field, value = %v, expected = %entry.value_type, "Invalid field value");
                    if self.policy == FieldPolicy::RejectRecord {
                        return Err(EncodeError::InvalidField {
                            field: field.to_string(),
                            expected: entry.value_type.to_string(),
                        });
                    }
                    None
                }
                None => None,
            };

            let text = match rendered {
                Some(text) => text?,
                None if entry.required => render(entry, &entry.zero_value())?,
                None => continue,
            };
            tokens.push((alias, text));
        }

        if tokens.is_empty() {
            return Err(EncodeError::NoFields);
        }
        tokens.sort_by(|a, b| a.0.cmp(b.0));

        let mut line = String::new();
        for (i, (alias, text)) in tokens.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(alias);
            line.push('=');
            line.push_str(text);
        }
        line.push('\n');
        Ok(line)
    }
}

//! Remote repository schema and the declaration grammar used to create it.
//!
//! A declaration lists `name type` entries separated by commas. Type tokens
//! are `s|string`, `f|float`, `l|long`, `d|date`, `b|boolean`, `a(T)` or
//! `array(T)`, and `{ ... }` for a nested map. A `*` anywhere in the type
//! token marks the field required.
//!
//! ```text
//! x1 *s,x2 f,x4 a(f),x5 {x6 l, x7{x8 a(s),x9 b}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::date;
use super::error::SenderError;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Float,
    Long,
    Date,
    Boolean,
    Array,
    Map,
}

impl ValueType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Float => "float",
            Self::Long => "long",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Map => "map",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "s" | "string" => Some(Self::String),
            "f" | "float" => Some(Self::Float),
            "l" | "long" => Some(Self::Long),
            "d" | "date" => Some(Self::Date),
            "b" | "bool" | "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a repository schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEntry {
    pub key: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elem_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema: Vec<SchemaEntry>,
}

impl SchemaEntry {
    #[must_use]
    pub fn new(key: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            key: key.into(),
            value_type,
            required: false,
            elem_type: None,
            schema: Vec::new(),
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value substituted when a required field is missing.
    #[must_use]
    pub fn zero_value(&self) -> Value {
        match self.value_type {
            ValueType::String => Value::String(String::new()),
            ValueType::Float | ValueType::Long => Value::from(0),
            ValueType::Date => Value::String(date::now()),
            ValueType::Boolean => Value::Bool(false),
            ValueType::Array => Value::Array(Vec::new()),
            ValueType::Map => Value::Object(serde_json::Map::new()),
        }
    }
}

/// Ordered field set of a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSchema {
    #[serde(default)]
    pub schema: Vec<SchemaEntry>,
}

impl RemoteSchema {
    #[must_use]
    pub fn new(schema: Vec<SchemaEntry>) -> Self {
        Self { schema }
    }

    #[must_use]
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.schema
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SchemaEntry> {
        self.schema.iter().find(|e| e.key == key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    /// Parse a schema declaration.
    ///
    /// # Errors
    ///
    /// Returns `SenderError::InvalidSchema` on unknown types, empty names or
    /// unbalanced braces.
    pub fn parse_declaration(declaration: &str) -> Result<Self, SenderError> {
        let mut parser = Parser {
            chars: declaration.chars().collect(),
            pos: 0,
        };
        let entries = parser.entries(false)?;
        Ok(Self::new(entries))
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, stop: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| !stop(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn error(&self, message: &str) -> SenderError {
        SenderError::InvalidSchema(format!("{message} at position {}", self.pos))
    }

    fn entries(&mut self, nested: bool) -> Result<Vec<SchemaEntry>, SenderError> {
        let mut entries = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None if nested => return Err(self.error("unclosed '{'")),
                None => return Ok(entries),
                Some('}') if nested => {
                    self.pos += 1;
                    return Ok(entries);
                }
                Some('}') => return Err(self.error("unexpected '}'")),
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => entries.push(self.entry()?),
            }
        }
    }

    fn entry(&mut self) -> Result<SchemaEntry, SenderError> {
        let name = self.take_while(|c| c.is_whitespace() || matches!(c, '{' | '}' | ','));
        if name.is_empty() {
            return Err(self.error("missing field name"));
        }
        self.skip_whitespace();

        let mut marker = String::new();
        if self.peek() == Some('*') {
            marker = self.take_while(|c| c != '{' && !c.is_whitespace());
            self.skip_whitespace();
        }

        if self.peek() == Some('{') {
            if !marker.chars().all(|c| c == '*') {
                return Err(self.error("unexpected token before '{'"));
            }
            self.pos += 1;
            let nested = self.entries(true)?;
            return Ok(SchemaEntry {
                key: name,
                value_type: ValueType::Map,
                required: !marker.is_empty(),
                elem_type: None,
                schema: nested,
            });
        }

        let token = marker + &self.take_while(|c| c.is_whitespace() || matches!(c, ',' | '}'));
        let required = token.contains('*');
        let token = token.replace('*', "").to_lowercase();
        if token.is_empty() {
            return Err(self.error(&format!("missing type for field {name}")));
        }

        let mut entry = SchemaEntry::new(name, ValueType::Long);
        entry.required = required;
        if let Some(inner) = token
            .strip_prefix("a(")
            .or_else(|| token.strip_prefix("array("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let elem = ValueType::from_token(inner)
                .ok_or_else(|| self.error(&format!("unknown array element type {inner}")))?;
            entry.value_type = ValueType::Array;
            entry.elem_type = Some(elem);
        } else {
            entry.value_type = ValueType::from_token(&token)
                .ok_or_else(|| self.error(&format!("unknown type {token}")))?;
        }
        Ok(entry)
    }
}

//! User field selection and aliasing.
//!
//! Grammar: comma-separated groups of whitespace-separated tokens. `f` ships
//! field `f` as `f`, `f a` ships field `f` as `a`, and `...` additionally
//! ships every other field under its own name. Groups with any other token
//! count are ignored. A blank declaration ships everything.

use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;

/// Token that enables shipping all remaining fields.
const DEFAULT_ALL_TOKEN: &str = "...";

/// Which record fields to ship and under which alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSchema {
    /// Ship every field not explicitly aliased under its own name.
    pub default_all: bool,
    /// Source field name to output alias.
    pub fields: HashMap<String, String>,
}

impl UserSchema {
    /// Parse a declaration. Never fails; malformed groups are skipped.
    #[must_use]
    pub fn parse(declaration: &str) -> Self {
        if declaration.trim().is_empty() {
            return Self {
                default_all: true,
                fields: HashMap::new(),
            };
        }

        let mut schema = Self::default();
        for group in declaration.split(',') {
            let tokens: Vec<&str> = group.split_whitespace().collect();
            match tokens.as_slice() {
                [] => {}
                [token] if *token == DEFAULT_ALL_TOKEN => schema.default_all = true,
                [field] => {
                    schema.fields.insert((*field).to_string(), (*field).to_string());
                }
                [field, alias] => {
                    schema.fields.insert((*field).to_string(), (*alias).to_string());
                }
                _ => tracing::debug!(group = group.trim(), "Ignoring malformed field group"),
            }
        }
        schema
    }

    /// Output alias to source field name.
    #[must_use]
    pub fn alias_to_key(&self) -> HashMap<&str, &str> {
        self.fields
            .iter()
            .map(|(key, alias)| (alias.as_str(), key.as_str()))
            .collect()
    }
}

impl FromStr for UserSchema {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

//! Request/response schemas and field validation.
//!
//! A schema is a plain serde type. Decoding happens in the input stage; after a successful
//! decode the stage calls [`Schema::validate`] and reports any field failures as a 422.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A typed request part (header, path, query or body).
pub trait Schema: DeserializeOwned + Send + 'static {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

impl Schema for serde_json::Value {}

/// Field path to messages. Serializes as a plain JSON object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(message.into());
    }

    /// Start a chain of rule checks against one field.
    pub fn field(&mut self, name: &str) -> FieldRules<'_> {
        FieldRules {
            errors: self,
            field: name.to_string(),
        }
    }

    /// Move every entry of `other` under `prefix.` (e.g. `body.name`).
    pub fn merge_prefixed(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, messages) in other.fields {
            let key = if field.is_empty() {
                prefix.to_string()
            } else {
                format!("{}.{}", prefix, field)
            };
            self.fields.entry(key).or_default().extend(messages);
        }
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(|v| v.as_slice())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{}: {}", field, message)?;
            }
        }
        Ok(())
    }
}

/// Rule checks for one field. Each rule records a message on failure and returns the chain.
pub struct FieldRules<'e> {
    errors: &'e mut ValidationErrors,
    field: String,
}

impl<'e> FieldRules<'e> {
    fn fail(self, message: String) -> Self {
        self.errors.add(self.field.clone(), message);
        self
    }

    pub fn required<T>(self, value: &Option<T>) -> Self {
        if value.is_none() {
            return self.fail("Missing data for required field.".to_string());
        }
        self
    }

    pub fn min_length(self, value: &str, min: usize) -> Self {
        if value.chars().count() < min {
            return self.fail(format!("Shorter than minimum length {}.", min));
        }
        self
    }

    pub fn max_length(self, value: &str, max: usize) -> Self {
        if value.chars().count() > max {
            return self.fail(format!("Longer than maximum length {}.", max));
        }
        self
    }

    pub fn pattern(self, value: &str, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(value) => self,
            Ok(_) => self.fail("String does not match expected pattern.".to_string()),
            Err(_) => self.fail(format!("Invalid pattern {}.", pattern)),
        }
    }

    pub fn one_of<T: PartialEq + fmt::Debug>(self, value: &T, allowed: &[T]) -> Self {
        if !allowed.contains(value) {
            let shown: Vec<_> = allowed.iter().take(5).collect();
            return self.fail(format!("Must be one of: {:?}.", shown));
        }
        self
    }

    pub fn minimum<N: Into<f64>>(self, value: N, min: f64) -> Self {
        if value.into() < min {
            return self.fail(format!("Must be greater than or equal to {}.", min));
        }
        self
    }

    pub fn maximum<N: Into<f64>>(self, value: N, max: f64) -> Self {
        if value.into() > max {
            return self.fail(format!("Must be less than or equal to {}.", max));
        }
        self
    }

    pub fn email(self, value: &str) -> Self {
        let valid = value
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'))
            .unwrap_or(false);
        if !valid {
            return self.fail("Not a valid email address.".to_string());
        }
        self
    }

    pub fn uuid(self, value: &str) -> Self {
        if uuid::Uuid::parse_str(value).is_err() {
            return self.fail("Not a valid UUID.".to_string());
        }
        self
    }

    /// Arbitrary predicate with a caller-supplied message.
    pub fn check(self, ok: bool, message: &str) -> Self {
        if !ok {
            return self.fail(message.to_string());
        }
        self
    }
}

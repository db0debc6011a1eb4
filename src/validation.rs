use crate::errors::{ValidationError, ValidationResult};
use regex::Regex;
use std::sync::OnceLock;

/// A trait that configuration types implement for validation.
pub trait Validate {
    /// Validates the value and returns the first problem found.
    fn validate(&self) -> ValidationResult<()>;
}

fn sql_identifier_regex() -> &'static Regex {
    static SQL_IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();
    SQL_IDENTIFIER_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap())
}

/// Struct for configuring validations in a fluent style
pub struct ValidationBuilder<T> {
    field_name: String,
    value: Option<T>,
    errors: Vec<ValidationError>,
}

impl<T> ValidationBuilder<T> {
    pub fn new(field_name: &str, value: Option<T>) -> Self {
        Self {
            field_name: field_name.to_string(),
            value,
            errors: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self
    where T: Default + PartialEq {
        if self.value.is_none() || self.value == Some(T::default()) {
            self.errors.push(ValidationError::required(&self.field_name));
        }
        self
    }

    /// Complete validation and return the first error, if any
    pub fn validate(self) -> ValidationResult<()> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ValidationBuilder<String> {
    pub fn matches_pattern(mut self, pattern: &Regex, message: &str) -> Self {
        if let Some(value) = &self.value {
            if !pattern.is_match(value) {
                self.errors.push(ValidationError::format(&self.field_name, message));
            }
        }
        self
    }

    /// Plain unquoted SQL identifier: letters, digits and underscores, at most 63 bytes.
    pub fn sql_identifier(self) -> Self {
        self.matches_pattern(
            sql_identifier_regex(),
            "must be a plain SQL identifier (letters, digits, underscore; max 63 chars)",
        )
    }
}

impl ValidationBuilder<usize> {
    pub fn range(mut self, min: usize, max: usize) -> Self {
        if let Some(value) = self.value {
            if value < min || value > max {
                self.errors.push(ValidationError::range(&self.field_name, min, max));
            }
        }
        self
    }
}

/// Checks that a name can be spliced into `DECLARE <name> CURSOR FOR ...` unquoted.
pub fn validate_cursor_name(name: &str) -> ValidationResult<()> {
    ValidationBuilder::new("cursor_name", Some(name.to_string()))
        .required()
        .sql_identifier()
        .validate()
}

//! The data model shared between record sources, the tokenizer, and the
//! two-party protocol: declared fields, raw input records.

use std::fmt;

use crate::error::ConfigError;

/// A normalization method declared for one field.
///
/// The recognized methods are exactly the five below; any other prefix in a
/// `database.fields` entry is a [`ConfigError::UnknownMethod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldMethod {
    /// Lowercase, strip non-`[a-z0-9 ]`, collapse whitespace, trim.
    Name,
    /// Parse one of several date formats, re-emit as `YYYY-MM-DD`.
    Date,
    /// Map a free-form gender string to one of `m`/`f`/`nb`/`o`/`u`.
    Gender,
    /// Extract and truncate a zip/postal code to its first 5 digits.
    Zip,
    /// No declared method: lowercase + trim.
    Basic,
}

impl FieldMethod {
    /// Parses the method prefix of a `database.fields` entry.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownMethod`] for any prefix other than
    /// `name`, `date`, `gender`, `zip`.
    pub fn parse(method: &str, column: &str) -> Result<Self, ConfigError> {
        match method {
            "name" => Ok(Self::Name),
            "date" => Ok(Self::Date),
            "gender" => Ok(Self::Gender),
            "zip" => Ok(Self::Zip),
            other => Err(ConfigError::UnknownMethod {
                column: column.to_string(),
                method: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for FieldMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Name => "name",
            Self::Date => "date",
            Self::Gender => "gender",
            Self::Zip => "zip",
            Self::Basic => "basic",
        };
        f.write_str(name)
    }
}

/// A declared input column, paired with its normalization method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    /// The source column name.
    pub column: String,
    /// The normalization method to apply to values of this column.
    pub method: FieldMethod,
}

impl FieldSpec {
    /// Creates a new field declaration.
    pub fn new(column: impl Into<String>, method: FieldMethod) -> Self {
        Self {
            column: column.into(),
            method,
        }
    }

    /// Parses one `database.fields` entry of the form `"<method>:<column>"`
    /// or bare `"<column>"` (which defaults to [`FieldMethod::Basic`]).
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownMethod`] if a `:`-prefixed method is not
    /// one of the recognized methods.
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        match entry.split_once(':') {
            Some((method, column)) => {
                let method = FieldMethod::parse(method, column)?;
                Ok(Self::new(column, method))
            }
            None => Ok(Self::new(entry, FieldMethod::Basic)),
        }
    }
}

/// The reserved column name for a record's primary key.
pub const ID_COLUMN: &str = "id";

/// An ordered mapping from column name to string value, as produced by an
/// external record source.
///
/// Order is preserved because normalization and q-gram generation are
/// order-sensitive only insofar as the same field order must be used on
/// both parties; beyond that, only membership matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    columns: Vec<(String, String)>,
}

impl RawRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites one column's value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        if let Some(existing) = self.columns.iter_mut().find(|(c, _)| *c == column) {
            existing.1 = value;
        } else {
            self.columns.push((column, value));
        }
    }

    /// Returns the value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the record's primary key, if present and non-empty.
    pub fn id(&self) -> Option<&str> {
        self.get(ID_COLUMN).filter(|id| !id.is_empty())
    }

    /// Iterates over `(column, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_spec_parses_method_prefix() {
        let spec = FieldSpec::parse("name:FIRST").unwrap();
        assert_eq!(spec.column, "FIRST");
        assert_eq!(spec.method, FieldMethod::Name);
    }

    #[test]
    fn field_spec_defaults_to_basic() {
        let spec = FieldSpec::parse("NOTES").unwrap();
        assert_eq!(spec.method, FieldMethod::Basic);
    }

    #[test]
    fn field_spec_rejects_unknown_method() {
        assert!(FieldSpec::parse("ssn:SSN").is_err());
    }

    #[test]
    fn raw_record_rejects_empty_id_semantically() {
        let mut record = RawRecord::new();
        record.insert("id", "");
        assert_eq!(record.id(), None);
        record.insert("id", "a1");
        assert_eq!(record.id(), Some("a1"));
    }

    #[test]
    fn raw_record_preserves_insertion_order() {
        let record: RawRecord = [
            ("id".to_string(), "a1".to_string()),
            ("FIRST".to_string(), "Mary".to_string()),
        ]
        .into_iter()
        .collect();
        let columns: Vec<_> = record.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, ["id", "FIRST"]);
    }
}

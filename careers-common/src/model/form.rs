//! Client-submitted fields, before they are validated into input shapes.
//!
//! JSON, url-encoded and multipart bodies all decode into [`FormFields`], so
//! validation and its error messages are the same whatever the encoding.

use crate::model::text::InvalidTextError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const REQUIRED: &str = "This field is required.";
pub const NULL: &str = "This field may not be null.";
pub const NOT_A_STRING: &str = "Not a valid string.";

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum FieldValue {
    Text(String),
    Null,
    File(Upload),
    /// Booleans, arrays and objects; never valid for any field.
    Unsupported,
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FormFields(HashMap<String, FieldValue>);

impl FormFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Later values for the same name replace earlier ones.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.0.insert(name.into(), value);
    }

    pub fn take(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

/// Field name to messages, serialized as the body of a 400 reply.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Records the error of `result` under `field` and keeps the value, if any.
    pub fn collect<T>(&mut self, field: &str, result: Result<T, String>) -> Option<T> {
        result.map_err(|message| self.add(field, message)).ok()
    }

    pub fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{field}: {message}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub fn required_text<T>(
    value: Option<FieldValue>,
    parse: impl FnOnce(String) -> Result<T, InvalidTextError>,
) -> Result<T, String> {
    match value {
        Some(value) => text(value, parse),
        None => Err(REQUIRED.to_owned()),
    }
}

pub fn optional_text<T>(
    value: Option<FieldValue>,
    parse: impl FnOnce(String) -> Result<T, InvalidTextError>,
) -> Result<Option<T>, String> {
    value.map(|value| text(value, parse)).transpose()
}

fn text<T>(
    value: FieldValue,
    parse: impl FnOnce(String) -> Result<T, InvalidTextError>,
) -> Result<T, String> {
    match value {
        FieldValue::Text(text) => parse(text).map_err(|err| err.to_string()),
        FieldValue::Null => Err(NULL.to_owned()),
        FieldValue::File(_) | FieldValue::Unsupported => Err(NOT_A_STRING.to_owned()),
    }
}

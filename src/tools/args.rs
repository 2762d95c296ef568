//! Tool argument extraction.

use serde_json::{Map, Value};

use super::ToolError;

/// Read-only view over the `arguments` object of a tool call.
///
/// Explicit `null` values are treated as absent.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Args<'a> {
    /// Wraps the raw arguments value. Anything but an object has no arguments.
    #[must_use]
    pub fn new(arguments: &'a Value) -> Self {
        Self {
            map: arguments.as_object(),
        }
    }

    /// Returns the raw value of an argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.map
            .and_then(|m| m.get(name))
            .filter(|v| !v.is_null())
    }

    /// Returns `true` if the argument was supplied.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Required string argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or not a string.
    pub fn str(&self, name: &str) -> Result<&'a str, ToolError> {
        self.opt_str(name)?.ok_or_else(|| missing(name))
    }

    /// Optional string argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is present but not a string.
    pub fn opt_str(&self, name: &str) -> Result<Option<&'a str>, ToolError> {
        self.get(name)
            .map(|v| v.as_str().ok_or_else(|| wrong_type(name, "a string")))
            .transpose()
    }

    /// Optional non-negative integer with a default.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is present but not a non-negative integer.
    pub fn u64_or(&self, name: &str, default: u64) -> Result<u64, ToolError> {
        self.get(name).map_or(Ok(default), |v| {
            v.as_u64()
                .ok_or_else(|| wrong_type(name, "a non-negative integer"))
        })
    }

    /// Optional integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is present but not an integer.
    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>, ToolError> {
        self.get(name)
            .map(|v| v.as_i64().ok_or_else(|| wrong_type(name, "an integer")))
            .transpose()
    }

    /// Optional boolean with a default.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is present but not a boolean.
    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, ToolError> {
        self.get(name).map_or(Ok(default), |v| {
            v.as_bool().ok_or_else(|| wrong_type(name, "a boolean"))
        })
    }

    /// Required array argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or not an array.
    pub fn array(&self, name: &str) -> Result<&'a [Value], ToolError> {
        let value = self.get(name).ok_or_else(|| missing(name))?;
        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| wrong_type(name, "an array"))
    }

    /// Required array of strings.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing, not an array, or holds
    /// anything but strings.
    pub fn str_list(&self, name: &str) -> Result<Vec<String>, ToolError> {
        self.opt_str_list(name)?.ok_or_else(|| missing(name))
    }

    /// Optional array of strings.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is present but not an array of strings.
    pub fn opt_str_list(&self, name: &str) -> Result<Option<Vec<String>>, ToolError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| wrong_type(name, "an array of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| wrong_type(name, "an array of strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Required object argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or not an object.
    pub fn object(&self, name: &str) -> Result<&'a Map<String, Value>, ToolError> {
        self.opt_object(name)?.ok_or_else(|| missing(name))
    }

    /// Optional object argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is present but not an object.
    pub fn opt_object(&self, name: &str) -> Result<Option<&'a Map<String, Value>>, ToolError> {
        self.get(name)
            .map(|v| v.as_object().ok_or_else(|| wrong_type(name, "an object")))
            .transpose()
    }
}

fn missing(name: &str) -> ToolError {
    ToolError::InvalidArgument(format!("Missing required parameter: {name}"))
}

fn wrong_type(name: &str, expected: &str) -> ToolError {
    ToolError::InvalidArgument(format!("Parameter '{name}' must be {expected}"))
}

//! Module descriptors as they appear in configuration files.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One entry of the `modules` list.
///
/// `input` and `output` map a role key understood by the module kind to a
/// variable name in the processing context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub module: String,
    #[serde(default)]
    pub para: Value,
    #[serde(default)]
    pub input: BTreeMap<String, String>,
    #[serde(default)]
    pub output: BTreeMap<String, String>,
}

impl ModuleDescriptor {
    /// Creates a descriptor without parameters or ports.
    #[must_use]
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            para: Value::Null,
            input: BTreeMap::new(),
            output: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_para(mut self, para: Value) -> Self {
        self.para = para;
        self
    }

    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, variable: impl Into<String>) -> Self {
        self.input.insert(key.into(), variable.into());
        self
    }

    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, variable: impl Into<String>) -> Self {
        self.output.insert(key.into(), variable.into());
        self
    }

    /// Variable bound to a required input key.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] when the key is absent.
    pub fn required_input(&self, key: &str) -> Result<&str> {
        self.port(&self.input, "input", key)
    }

    /// Variable bound to a required output key.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] when the key is absent.
    pub fn required_output(&self, key: &str) -> Result<&str> {
        self.port(&self.output, "output", key)
    }

    /// Parses the parameter object, treating a missing one as empty.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] for absent fields and
    /// [`Error::InvalidModule`] for malformed ones.
    pub fn params<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let para = match &self.para {
            Value::Null => Value::Object(serde_json::Map::new()),
            para => para.clone(),
        };
        serde_json::from_value(para).map_err(|e| {
            let message = e.to_string();
            match missing_field(&message) {
                Some(key) => Error::MissingKey {
                    module: self.name.clone(),
                    section: "para",
                    key: key.to_string(),
                },
                None => Error::invalid(&self.name, format!("invalid para: {message}")),
            }
        })
    }

    fn port<'a>(
        &self,
        ports: &'a BTreeMap<String, String>,
        section: &'static str,
        key: &str,
    ) -> Result<&'a str> {
        ports
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingKey {
                module: self.name.clone(),
                section,
                key: key.to_string(),
            })
    }
}

/// Extracts `name` from serde's "missing field `name`" message.
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Para {
        #[serde(rename = "dT")]
        dt: f64,
    }

    #[test]
    fn test_parse_descriptor() {
        let descriptor: ModuleDescriptor = serde_json::from_value(json!({
            "name": "windowing",
            "module": "window",
            "para": {"dT": 5.0},
            "input": {"t": "t", "t_all": "t"},
            "output": {"w_t": "w_t", "t_sub": "t_sub"}
        }))
        .unwrap();
        assert_eq!(descriptor.required_input("t_all").unwrap(), "t");
        assert_eq!(descriptor.params::<Para>().unwrap().dt, 5.0);
    }

    #[test]
    fn test_missing_keys_name_module() {
        let descriptor = ModuleDescriptor::new("windowing", "window");
        let err = descriptor.required_output("w_t").unwrap_err();
        assert_eq!(
            err.to_string(),
            "module `windowing`: missing output key `w_t`"
        );

        let err = descriptor.params::<Para>().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingKey { section: "para", ref key, .. } if key == "dT"
        ));
    }
}

//! Typed access to the free-form `params` object of an action.

use std::time::Duration;

use integration_http::FormData;
use serde_json::{Map, Value};

use crate::error::ValidationError;

pub(crate) struct ActionParams<'a>(&'a Map<String, Value>);

impl<'a> ActionParams<'a> {
    pub(crate) fn new(params: &'a Map<String, Value>) -> Self {
        Self(params)
    }

    /// `null` counts as absent.
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// A non-empty string.
    pub(crate) fn required_str(&self, name: &str) -> Result<&'a str, ValidationError> {
        match self.optional_str(name)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ValidationError::MissingParameter(name.to_owned())),
        }
    }

    pub(crate) fn optional_str(&self, name: &str) -> Result<Option<&'a str>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(invalid(name, "a string")),
        }
    }

    pub(crate) fn optional_bool(&self, name: &str) -> Result<Option<bool>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(invalid(name, "a boolean")),
        }
    }

    pub(crate) fn optional_array(&self, name: &str) -> Result<Option<&'a Value>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(value @ Value::Array(_)) => Ok(Some(value)),
            Some(_) => Err(invalid(name, "an array")),
        }
    }

    pub(crate) fn optional_any(&self, name: &str) -> Option<&'a Value> {
        self.get(name)
    }

    /// Positive number of seconds.
    pub(crate) fn timeout(&self, name: &str) -> Result<Option<Duration>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .map(Some)
                .ok_or_else(|| invalid(name, "a positive number of seconds")),
            Some(_) => Err(invalid(name, "a positive number of seconds")),
        }
    }

    /// Object of scalar values, flattened into name/value pairs.
    ///
    /// Arrays repeat the name once per element.
    pub(crate) fn pairs(&self, name: &str) -> Result<Vec<(String, String)>, ValidationError> {
        let Some(value) = self.get(name) else {
            return Ok(Vec::new());
        };
        let Value::Object(map) = value else {
            return Err(invalid(name, "an object"));
        };

        let mut pairs = Vec::with_capacity(map.len());
        for (key, value) in map {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        pairs.push((key.clone(), scalar(name, item)?));
                    }
                }
                other => pairs.push((key.clone(), scalar(name, other)?)),
            }
        }
        Ok(pairs)
    }

    /// Header map; values must be strings.
    pub(crate) fn headers(&self, name: &str) -> Result<Vec<(String, String)>, ValidationError> {
        let Some(value) = self.get(name) else {
            return Ok(Vec::new());
        };
        let Value::Object(map) = value else {
            return Err(invalid(name, "an object of strings"));
        };
        map.iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key.clone(), s.clone())),
                _ => Err(invalid(name, "an object of strings")),
            })
            .collect()
    }

    /// Form fields from an object, or a raw body from a string.
    pub(crate) fn form(&self, name: &str) -> Result<Option<FormData>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(raw)) => Ok(Some(FormData::Raw(raw.clone()))),
            Some(Value::Object(_)) => Ok(Some(FormData::Fields(self.pairs(name)?))),
            Some(_) => Err(invalid(name, "an object or a string")),
        }
    }
}

fn scalar(name: &str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid(name, "an object of scalar values")),
    }
}

fn invalid(name: &str, expected: &'static str) -> ValidationError {
    ValidationError::InvalidParameter {
        name: name.to_owned(),
        expected,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test params are objects"),
        }
    }

    #[test]
    fn required_string_rejects_missing_empty_and_null() {
        let params = map(json!({"a": "x", "b": "", "c": null, "d": 5}));
        let params = ActionParams::new(&params);
        assert_eq!(params.required_str("a").unwrap(), "x");
        for name in ["b", "c", "e"] {
            assert_eq!(
                params.required_str(name).unwrap_err(),
                ValidationError::MissingParameter(name.to_owned())
            );
        }
        assert!(matches!(
            params.required_str("d"),
            Err(ValidationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn pairs_flatten_scalars_and_arrays() {
        let params = map(json!({"params": {"q": "rust", "page": 2, "tag": ["a", "b"], "skip": null}}));
        let mut pairs = ActionParams::new(&params).pairs("params").unwrap();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("page".to_owned(), "2".to_owned()),
                ("q".to_owned(), "rust".to_owned()),
                ("tag".to_owned(), "a".to_owned()),
                ("tag".to_owned(), "b".to_owned()),
            ]
        );

        let nested = map(json!({"params": {"filter": {"a": 1}}}));
        assert!(ActionParams::new(&nested).pairs("params").is_err());
    }

    #[test]
    fn timeout_must_be_positive() {
        let params = map(json!({"ok": 2.5, "zero": 0, "text": "5"}));
        let params = ActionParams::new(&params);
        assert_eq!(params.timeout("ok").unwrap(), Some(Duration::from_millis(2500)));
        assert!(params.timeout("zero").is_err());
        assert!(params.timeout("text").is_err());
        assert_eq!(params.timeout("missing").unwrap(), None);
    }

    #[test]
    fn form_accepts_objects_and_strings() {
        let params = map(json!({"fields": {"a": "1"}, "raw": "a=1&b=2", "bad": [1]}));
        let params = ActionParams::new(&params);
        assert_eq!(
            params.form("fields").unwrap(),
            Some(FormData::Fields(vec![("a".to_owned(), "1".to_owned())]))
        );
        assert_eq!(params.form("raw").unwrap(), Some(FormData::Raw("a=1&b=2".to_owned())));
        assert!(params.form("bad").is_err());
    }

    #[test]
    fn headers_require_string_values() {
        let params = map(json!({"headers": {"X-Trace": "1"}, "bad": {"X-Num": 1}}));
        let params = ActionParams::new(&params);
        assert_eq!(
            params.headers("headers").unwrap(),
            vec![("X-Trace".to_owned(), "1".to_owned())]
        );
        assert!(params.headers("bad").is_err());
    }
}

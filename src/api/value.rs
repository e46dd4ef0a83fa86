//! Purpose: Dynamic payload type for chains that mix data, errors and async handles.
//! Exports: `Value`.
//! Role: Default `Resolvable` used by the manifest runner and the CLI.
//! Invariants: Only `Promise` and `Thenable` variants answer the then-able check.
//! Invariants: `to_json` is total; every variant has a stable JSON rendering.

use crate::api::promise::Promise;
use crate::core::error::Error;
use crate::core::thenable::{Resolvable, Settle, ThenFn, Thenable};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Value {
    Data(JsonValue),
    Error(Rc<Error>),
    Promise(Promise<Value>),
    Thenable(Rc<dyn Thenable<Value>>),
}

impl Value {
    pub fn null() -> Self {
        Value::Data(JsonValue::Null)
    }

    pub fn error(error: Error) -> Self {
        Value::Error(Rc::new(error))
    }

    /// Wraps a closure as a callable then-able.
    pub fn thenable<F>(then: F) -> Self
    where
        F: Fn(Settle<Value>, Settle<Value>) -> Result<(), Value> + 'static,
    {
        Value::Thenable(Rc::new(ThenFn(then)))
    }

    pub fn as_data(&self) -> Option<&JsonValue> {
        match self {
            Value::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(JsonValue::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_data().and_then(JsonValue::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(JsonValue::as_str)
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Value::Error(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Data(data) => data.clone(),
            Value::Error(error) => json!({
                "error": {
                    "kind": error.kind().as_str(),
                    "message": error.message(),
                }
            }),
            Value::Promise(promise) => json!({
                "promise": {
                    "id": promise.id().get(),
                    "state": promise.state().label(),
                }
            }),
            Value::Thenable(_) => json!({ "thenable": true }),
        }
    }
}

impl Resolvable for Value {
    fn as_thenable(&self) -> Option<Rc<dyn Thenable<Self>>> {
        match self {
            Value::Promise(promise) => Some(Rc::new(promise.clone())),
            Value::Thenable(thenable) => Some(Rc::clone(thenable)),
            Value::Data(_) | Value::Error(_) => None,
        }
    }

    fn from_error(error: Error) -> Self {
        Value::error(error)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Data(a), Value::Data(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => a == b,
            (Value::Thenable(a), Value::Thenable(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Data(data) => write!(f, "Data({data})"),
            Value::Error(error) => write!(f, "Error({error})"),
            Value::Promise(promise) => write!(f, "{promise:?}"),
            Value::Thenable(_) => f.write_str("Thenable"),
        }
    }
}

/// Strings render bare; everything else renders as compact JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Data(JsonValue::String(text)) => f.write_str(text),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Data(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Data(JsonValue::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Data(JsonValue::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Data(JsonValue::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Data(JsonValue::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Data(JsonValue::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Data(JsonValue::from(value))
    }
}

impl From<Error> for Value {
    fn from(error: Error) -> Self {
        Value::error(error)
    }
}

impl From<Promise<Value>> for Value {
    fn from(promise: Promise<Value>) -> Self {
        Value::Promise(promise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn only_handles_are_thenables() {
        assert!(Value::from(1).as_thenable().is_none());
        assert!(Value::error(Error::new(ErrorKind::Callback)).as_thenable().is_none());
        assert!(Value::thenable(|_, _| Ok(())).as_thenable().is_some());
        assert!(Value::Promise(Promise::resolved(Value::null())).as_thenable().is_some());
    }

    #[test]
    fn promise_thenable_reports_resolver_identity() {
        let promise = Promise::resolved(Value::from(1));
        let thenable = Value::Promise(promise.clone())
            .as_thenable()
            .expect("thenable");
        assert_eq!(thenable.resolver_id(), Some(promise.id()));
    }

    #[test]
    fn json_rendering_covers_every_variant() {
        assert_eq!(Value::from("x").to_json(), json!("x"));
        let error = Value::error(Error::new(ErrorKind::Callback).with_message("boom"));
        assert_eq!(
            error.to_json(),
            json!({ "error": { "kind": "callback", "message": "boom" } })
        );
        let promise = Promise::rejected(Value::null());
        let rendered = Value::Promise(promise).to_json();
        assert_eq!(rendered["promise"]["state"], "rejected");
        assert_eq!(Value::thenable(|_, _| Ok(())).to_json(), json!({ "thenable": true }));
    }

    #[test]
    fn display_keeps_strings_bare() {
        assert_eq!(Value::from("boom").to_string(), "boom");
        assert_eq!(Value::from(5).to_string(), "5");
        assert_eq!(Value::from(json!({"a": 1})).to_string(), r#"{"a":1}"#);
    }
}

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::RequestContext;
use super::error::HttpError;

/// One positional handler argument.
#[derive(Clone, Debug)]
pub enum Argument {
    Value(Value),
    Context(Arc<RequestContext>),
}

/// Positional handler arguments. Unbound positions are `None`.
#[derive(Clone, Debug, Default)]
pub struct Args {
    slots: Vec<Option<Argument>>,
}

impl Args {
    pub fn new(slots: Vec<Option<Argument>>) -> Self {
        Self { slots }
    }

    /// Arguments made only of values, mostly for calling controllers directly.
    pub fn from_values(values: impl IntoIterator<Item = Option<Value>>) -> Self {
        Self::new(
            values
                .into_iter()
                .map(|v| v.map(Argument::Value))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Argument> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub fn value(&self, idx: usize) -> Option<&Value> {
        match self.get(idx)? {
            Argument::Value(v) => Some(v),
            Argument::Context(_) => None,
        }
    }

    pub fn str(&self, idx: usize) -> Option<&str> {
        self.value(idx).and_then(Value::as_str)
    }

    pub fn context(&self, idx: usize) -> Option<&Arc<RequestContext>> {
        match self.get(idx)? {
            Argument::Context(ctx) => Some(ctx),
            Argument::Value(_) => None,
        }
    }

    /// Deserialize an optional argument. A value of the wrong shape is a 400.
    pub fn parse<T: DeserializeOwned>(&self, idx: usize) -> Result<Option<T>, HttpError> {
        self.value(idx)
            .map(|v| {
                T::deserialize(v).map_err(|e| HttpError::bad_request(format!("invalid argument #{idx}: {e}")))
            })
            .transpose()
    }

    /// Like [`Args::parse`], but a missing argument is a 400 too.
    pub fn require<T: DeserializeOwned>(&self, idx: usize) -> Result<T, HttpError> {
        self.parse(idx)?
            .ok_or_else(|| HttpError::bad_request(format!("missing argument #{idx}")))
    }

    pub fn into_inner(self) -> Vec<Option<Argument>> {
        self.slots
    }
}

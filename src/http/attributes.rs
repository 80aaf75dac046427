//! Request-scoped attribute store.
//!
//! Middleware (authentication, tenancy) attach values here; other layers
//! read them back through typed accessors. The store is a shared handle:
//! clones see the same values, so a layer that keeps a clone can read what
//! inner handlers set after they return.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::Request;

/// Attribute key holding the authenticated user identifier.
pub const USER_ID: &str = "userid";

/// A value stored against an attribute key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Key/value attributes attached to a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes {
    values: Arc<Mutex<HashMap<String, AttributeValue>>>,
}

impl RequestAttributes {
    pub fn set(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values
            .lock()
            .expect("request attributes mutex poisoned")
            .insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        self.values
            .lock()
            .expect("request attributes mutex poisoned")
            .get(key)
            .cloned()
    }

    /// Returns the value only if it is string-typed.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|value| value.as_str().map(str::to_string))
    }

    pub fn user_id(&self) -> Option<String> {
        self.get_str(USER_ID)
    }
}

/// Access to the attribute store carried in request extensions.
pub trait RequestAttributesExt {
    fn attributes(&self) -> Option<&RequestAttributes>;

    /// Handle to the request's store, inserting an empty one on first use.
    fn ensure_attributes(&mut self) -> RequestAttributes;
}

impl<B> RequestAttributesExt for Request<B> {
    fn attributes(&self) -> Option<&RequestAttributes> {
        self.extensions().get::<RequestAttributes>()
    }

    fn ensure_attributes(&mut self) -> RequestAttributes {
        self.extensions_mut()
            .get_or_insert_default::<RequestAttributes>()
            .clone()
    }
}

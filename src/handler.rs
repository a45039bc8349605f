use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;
use crate::value::Value;

/// Custom conversion for a destination type.
///
/// `parse` is never called with `Value::Null`. It returns a value that the
/// destination's `FromValue::from_value` accepts.
pub trait TypeHandler: Send + Sync {
    fn parse(&self, value: Value) -> Result<Value>;
}

impl<F> TypeHandler for F
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn parse(&self, value: Value) -> Result<Value> {
        self(value)
    }
}

/// Lookup of custom handlers by destination type.
///
/// The deserializer cache consumes a registry but does not watch it: after
/// changing registrations, purge the affected types from the cache.
pub trait ConversionRegistry: Send + Sync {
    fn handler(&self, type_id: TypeId) -> Option<Arc<dyn TypeHandler>>;
}

/// Registry with no handlers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHandlers;

impl ConversionRegistry for NoHandlers {
    fn handler(&self, _: TypeId) -> Option<Arc<dyn TypeHandler>> {
        None
    }
}

/// A mutable handler table.
#[derive(Default)]
pub struct TypeHandlers {
    handlers: RwLock<HashMap<TypeId, Arc<dyn TypeHandler>>>,
}

impl TypeHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for destination type `T`, replacing any previous one.
    pub fn add<T: 'static>(&self, handler: impl TypeHandler + 'static) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), Arc::new(handler));
    }

    pub fn remove<T: 'static>(&self) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TypeId::of::<T>())
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConversionRegistry for TypeHandlers {
    fn handler(&self, type_id: TypeId) -> Option<Arc<dyn TypeHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
    }
}

impl<R: ConversionRegistry + ?Sized> ConversionRegistry for Arc<R> {
    fn handler(&self, type_id: TypeId) -> Option<Arc<dyn TypeHandler>> {
        (**self).handler(type_id)
    }
}

use std::any::Any;
use std::sync::Arc;

use crate::contracts::{Controller, Middleware};

/// Zero-argument constructor used by class providers and the fallback container.
pub type Constructor = fn() -> Instance;

/// A shared singleton plus the capability views the dispatcher needs.
///
/// The value is stored once; `controller` and `middleware` point at the same
/// allocation when present, so downcasting and trait dispatch see one object.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    controller: Option<Arc<dyn Controller>>,
    middleware: Option<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("is_controller", &self.controller.is_some())
            .field("is_middleware", &self.middleware.is_some())
            .finish()
    }
}

impl Instance {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
            controller: None,
            middleware: None,
        }
    }

    /// Wrap a value that serves routes.
    pub fn controller<T: Controller>(value: T) -> Self {
        let value = Arc::new(value);
        let controller: Arc<dyn Controller> = value.clone();
        Self {
            controller: Some(controller),
            ..Self::from_arc(value)
        }
    }

    /// Wrap a value that sits in the request pipeline.
    pub fn middleware<T: Middleware>(value: T) -> Self {
        let value = Arc::new(value);
        let middleware: Arc<dyn Middleware> = value.clone();
        Self {
            middleware: Some(middleware),
            ..Self::from_arc(value)
        }
    }

    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn as_controller(&self) -> Option<Arc<dyn Controller>> {
        self.controller.clone()
    }

    pub fn as_middleware(&self) -> Option<Arc<dyn Middleware>> {
        self.middleware.clone()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True when both handles point at the same singleton.
    pub fn same_as(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

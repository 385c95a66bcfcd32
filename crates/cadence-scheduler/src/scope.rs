//! Dependency scopes handed to jobs.
//!
//! A [`ScopeFactory`] is the engine's only integration point with the host:
//! the loops ask it for a fresh [`Scope`] per invocation (per tick for a
//! scheduled batch) and drop the scope as soon as the invocation returns.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::JobError;

type Service = Arc<dyn Any + Send + Sync>;

/// Creates dependency scopes for job invocations.
pub trait ScopeFactory: Send + Sync {
    fn create_scope(&self) -> Scope;
}

/// Type-keyed service map valid for one invocation.
#[derive(Default)]
pub struct Scope {
    services: HashMap<TypeId, Service>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let service = self.services.get(&TypeId::of::<T>())?.clone();
        service.downcast::<T>().ok()
    }

    /// Like [`Scope::get`], but a missing service is a job failure.
    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, JobError> {
        self.get::<T>().ok_or_else(|| {
            JobError::failed(format!(
                "service {} not registered in scope",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        trace!(services = self.services.len(), "scope disposed");
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope").field("services", &self.services.len()).finish()
    }
}

type ScopedBuilder = Box<dyn Fn(&mut Scope) + Send + Sync>;

/// Default [`ScopeFactory`]: shared singletons plus per-scope instances.
///
/// Singletons are the same `Arc` in every scope; scoped services are built
/// anew each time a scope is created and die with it.
#[derive(Default)]
pub struct ServiceRegistry {
    singletons: HashMap<TypeId, Service>,
    scoped: Vec<ScopedBuilder>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.singletons.insert(TypeId::of::<T>(), service);
        self
    }

    pub fn scoped<T, F>(mut self, build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.scoped.push(Box::new(move |scope: &mut Scope| scope.insert(Arc::new(build()))));
        self
    }
}

impl ScopeFactory for ServiceRegistry {
    fn create_scope(&self) -> Scope {
        let mut scope = Scope {
            services: self.singletons.clone(),
        };
        for build in &self.scoped {
            build(&mut scope);
        }
        scope
    }
}

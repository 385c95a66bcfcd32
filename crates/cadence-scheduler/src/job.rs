use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::JobContext;
use crate::error::JobError;
use crate::exception::JobFailure;

/// A unit of deferred work, run either by the scheduled loop (recurring) or
/// by a queue consumer (one-shot).
#[async_trait]
pub trait Job: Send + Sync {
    /// Identity used in logs and failure reports.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &JobContext) -> Result<(), JobError>;

    /// Job-local exception handler, offered a failure before the process-wide
    /// handler. Return `true` to mark it handled.
    fn handle_error(&self, _failure: &JobFailure) -> bool {
        false
    }
}

#[async_trait]
impl<J: Job + ?Sized> Job for Arc<J> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn run(&self, ctx: &JobContext) -> Result<(), JobError> {
        (**self).run(ctx).await
    }

    fn handle_error(&self, failure: &JobFailure) -> bool {
        (**self).handle_error(failure)
    }
}

/// Adapter turning an async closure into a [`Job`].
///
/// ```ignore
/// let job = FnJob::new("cleanup", |ctx: JobContext| async move {
///     ctx.checkpoint()?;
///     Ok(())
/// });
/// ```
pub struct FnJob<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &JobContext) -> Result<(), JobError> {
        (self.f)(ctx.clone()).await
    }
}

/// Adapter calling a closure on a service resolved from the invocation scope.
///
/// The service is looked up per invocation, so scoped services are fresh
/// each time. A missing service fails the invocation.
pub struct ServiceJob<S, F> {
    name: String,
    f: F,
    _service: PhantomData<fn() -> S>,
}

impl<S, F, Fut> ServiceJob<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _service: PhantomData,
        }
    }
}

#[async_trait]
impl<S, F, Fut> Job for ServiceJob<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &JobContext) -> Result<(), JobError> {
        let service = ctx.resolve::<S>()?;
        (self.f)(service, ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{ScopeFactory, ServiceRegistry};
    use crate::types::JobOrigin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct Counter(AtomicUsize);

    fn ctx_from(registry: &ServiceRegistry) -> JobContext {
        JobContext::new(
            CancellationToken::new(),
            None,
            Arc::new(registry.create_scope()),
            JobOrigin::Queued,
            None,
        )
    }

    #[tokio::test]
    async fn fn_job_runs_closure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let job = FnJob::new("tick", move |_ctx: JobContext| {
            let h = Arc::clone(&h);
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        assert_eq!(job.name(), "tick");
        job.run(&ctx_from(&ServiceRegistry::new())).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn service_job_resolves_from_scope() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let registry = ServiceRegistry::new().singleton(Arc::clone(&counter));
        let job = ServiceJob::new("count", |svc: Arc<Counter>, _ctx: JobContext| async move {
            svc.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        job.run(&ctx_from(&registry)).await.unwrap();
        job.run(&ctx_from(&registry)).await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn service_job_fails_without_service() {
        let job = ServiceJob::new("count", |_svc: Arc<Counter>, _ctx: JobContext| async move { Ok(()) });
        let err = job.run(&ctx_from(&ServiceRegistry::new())).await.unwrap_err();
        assert!(matches!(err, JobError::Failed(_)));
    }
}

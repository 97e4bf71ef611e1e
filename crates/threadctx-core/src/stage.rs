//! Dependent stages with context capture
//!
//! [`ContextualStage`] wraps a future so that every dependent stage chained
//! onto it runs under the context captured when the stage was created.
//! Dependent actions run inside `poll`, on whichever thread the runtime
//! polls them on; apply, the action, and restore happen within that one
//! poll, so an action is never split across threads.
//!
//! An action that panics completes its stage with
//! [`ContextError::StageFailed`]; `handle` and `exceptionally` further down
//! the chain observe it like any other failure.
//!
//! # Example
//!
//! ```rust,ignore
//! let stage = security::run_as(Principal::new("alice"), || {
//!     service.with_context_capture(fetch_order(order_id))
//! })?;
//!
//! let audited = stage
//!     .then_apply(|order| audit(order, security::current_principal()))
//!     .exceptionally(|err| AuditRecord::failed(err));
//!
//! tokio::spawn(audited).await??;
//! ```

use crate::error::{ContextError, ContextResult};
use crate::providers::panic_message;
use crate::task::CapturedContext;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Run one dependent action under `context`
///
/// A panicking action completes the stage with `StageFailed` once the
/// context has been restored, so later stages still see the failure.
fn run_action<R>(context: &CapturedContext, action: impl FnOnce() -> R) -> ContextResult<R> {
    panic::catch_unwind(AssertUnwindSafe(|| context.run(action))).unwrap_or_else(|payload| {
        let reason = panic_message(&*payload);
        tracing::debug!(reason = %reason, "Stage action panicked");
        Err(ContextError::StageFailed { reason })
    })
}

/// A future whose dependent stages run under a captured context
///
/// Resolves to `Err` when a dependent stage's context could not be applied
/// or restored.
#[must_use = "stages do nothing unless polled"]
pub struct ContextualStage<T> {
    context: CapturedContext,
    inner: BoxFuture<'static, ContextResult<T>>,
}

impl<T> fmt::Debug for ContextualStage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualStage")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ContextualStage<T> {
    /// Wrap `future`; it runs as-is, only its dependents get the context
    pub fn new<Fut>(context: CapturedContext, future: Fut) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        Self {
            context,
            inner: future.map(Ok).boxed(),
        }
    }

    /// A stage that has already completed with `value`
    pub fn completed(context: CapturedContext, value: T) -> Self {
        Self::new(context, futures::future::ready(value))
    }

    /// The context dependent stages run under
    pub fn context(&self) -> &CapturedContext {
        &self.context
    }

    fn chain<U: Send + 'static>(
        context: CapturedContext,
        inner: BoxFuture<'static, ContextResult<U>>,
    ) -> ContextualStage<U> {
        ContextualStage { context, inner }
    }

    /// Transform the result under the captured context
    pub fn then_apply<U, F>(self, f: F) -> ContextualStage<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let context = self.context.clone();
        let inner = self
            .inner
            .map(move |result| result.and_then(|value| run_action(&context, || f(value))))
            .boxed();
        Self::chain(self.context, inner)
    }

    /// Consume the result under the captured context
    pub fn then_accept<F>(self, f: F) -> ContextualStage<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.then_apply(f)
    }

    /// Run an action under the captured context once this stage completes
    pub fn then_run<F>(self, f: F) -> ContextualStage<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.then_apply(move |_| f())
    }

    /// Start a follow-up future, created under the captured context
    ///
    /// The follow-up's own body is polled as it is; chain further stages to
    /// run more work under the context.
    pub fn then_compose<U, Fut, F>(self, f: F) -> ContextualStage<U>
    where
        U: Send + 'static,
        Fut: Future<Output = U> + Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
    {
        let context = self.context.clone();
        let previous = self.inner;
        let inner = async move {
            let value = previous.await?;
            let next = run_action(&context, || f(value))?;
            Ok(next.await)
        }
        .boxed();
        Self::chain(self.context, inner)
    }

    /// Combine with another future's output under the captured context
    pub fn then_combine<U, V, Fut, F>(self, other: Fut, f: F) -> ContextualStage<V>
    where
        U: Send + 'static,
        V: Send + 'static,
        Fut: Future<Output = U> + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let context = self.context.clone();
        let previous = self.inner;
        let inner = async move {
            let (value, other) = futures::join!(previous, other);
            let value = value?;
            run_action(&context, || f(value, other))
        }
        .boxed();
        Self::chain(self.context, inner)
    }

    /// Observe success or failure under the captured context
    pub fn handle<U, F>(self, f: F) -> ContextualStage<U>
    where
        U: Send + 'static,
        F: FnOnce(ContextResult<T>) -> U + Send + 'static,
    {
        let context = self.context.clone();
        let inner = self
            .inner
            .map(move |result| run_action(&context, || f(result)))
            .boxed();
        Self::chain(self.context, inner)
    }

    /// Recover from a failed stage under the captured context
    pub fn exceptionally<F>(self, f: F) -> ContextualStage<T>
    where
        F: FnOnce(ContextError) -> T + Send + 'static,
    {
        let context = self.context.clone();
        let inner = self
            .inner
            .map(move |result| match result {
                Ok(value) => Ok(value),
                Err(error) => {
                    tracing::debug!(error = %error, "Recovering failed stage");
                    run_action(&context, || f(error))
                }
            })
            .boxed();
        Self::chain(self.context, inner)
    }
}

impl<T> Future for ContextualStage<T> {
    type Output = ContextResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context_type::ContextType;
    use crate::definition::ContextServiceDefinition;
    use crate::policy::ResolvedPolicy;
    use crate::providers::security::{self, Principal};
    use crate::providers::{ContextState, MockContextProvider, ProviderError, RestoreHandle};
    use crate::registry::ContextRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn capture_as(name: &str) -> CapturedContext {
        let registry = ContextRegistry::with_builtins();
        let definition = ContextServiceDefinition::new("svc");
        let policy = Arc::new(ResolvedPolicy::for_registry(&definition, &registry).unwrap());
        security::run_as(Principal::new(name), || {
            CapturedContext::capture(registry, policy).unwrap()
        })
    }

    fn principal_name() -> Option<String> {
        security::current_principal().map(|p| p.name().to_string())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dependent_stage_sees_captured_principal() {
        let context = capture_as("alice");
        let stage = ContextualStage::new(context, async { 20 })
            .then_apply(|n| (n + 1, principal_name()))
            .then_apply(|(n, name)| (n * 2, name, principal_name()));

        let (value, first, second) = tokio::spawn(async move {
            let out = stage.await;
            // the polling thread is back to its own state
            assert!(security::current_principal().is_none());
            out
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(first.as_deref(), Some("alice"));
        assert_eq!(second.as_deref(), Some("alice"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_source_future_runs_without_context() {
        let context = capture_as("alice");
        let stage = ContextualStage::new(context, async { principal_name() })
            .then_apply(|source| (source, principal_name()));

        let (source, dependent) = tokio::spawn(stage).await.unwrap().unwrap();
        assert!(source.is_none());
        assert_eq!(dependent.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_accept_run_and_compose() {
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        ContextualStage::completed(capture_as("bob"), 3)
            .then_accept(move |n| {
                assert_eq!(principal_name().as_deref(), Some("bob"));
                counter.fetch_add(n, Ordering::SeqCst);
            })
            .await
            .unwrap();

        let counter = Arc::clone(&seen);
        ContextualStage::completed(capture_as("bob"), ())
            .then_run(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 4);

        let composed = ContextualStage::completed(capture_as("carol"), 2)
            .then_compose(|n| {
                let name = principal_name();
                async move { (n * 10, name) }
            })
            .await
            .unwrap();
        assert_eq!(composed, (20, Some("carol".to_string())));
    }

    #[tokio::test]
    async fn test_then_combine() {
        let combined = ContextualStage::completed(capture_as("dave"), 2)
            .then_combine(async { 40 }, |a, b| (a + b, principal_name()))
            .await
            .unwrap();
        assert_eq!(combined, (42, Some("dave".to_string())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_action_fails_the_stage() {
        let stage = ContextualStage::completed(capture_as("erin"), 1)
            .then_apply(|_| -> i32 { panic!("action failed") })
            .then_apply(|n| n + 1);

        let outcome = tokio::spawn(stage).await.unwrap();
        match outcome {
            Err(ContextError::StageFailed { reason }) => assert_eq!(reason, "action failed"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_exceptionally_recovers_from_panicking_action() {
        let stage = ContextualStage::completed(capture_as("erin"), 1)
            .then_apply(|_| -> i32 { panic!("action failed") })
            .exceptionally(|err| {
                assert!(matches!(err, ContextError::StageFailed { .. }));
                // recovery runs under the captured context, the polling thread
                // is left as it was
                assert_eq!(principal_name().as_deref(), Some("erin"));
                -1
            });

        let value = tokio::spawn(async move {
            let value = stage.await;
            assert!(security::current_principal().is_none());
            value
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(value, -1);
    }

    #[tokio::test]
    async fn test_handle_sees_panicking_action() {
        let message = ContextualStage::completed(capture_as("erin"), ())
            .then_run(|| panic!("callback failed"))
            .handle(|result| match result {
                Err(ContextError::StageFailed { reason }) => reason,
                other => format!("unexpected: {other:?}"),
            })
            .await
            .unwrap();
        assert_eq!(message, "callback failed");
    }

    fn flaky_registry() -> Arc<ContextRegistry> {
        let attempts = AtomicUsize::new(0);
        let mut provider = MockContextProvider::new();
        provider
            .expect_context_type()
            .return_const(ContextType::from_static("Flaky"));
        provider.expect_has_default().return_const(true);
        provider
            .expect_capture()
            .returning(|| Ok(ContextState::new(())));
        provider.expect_apply().returning(move |_| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::Unavailable("first apply".into()))
            } else {
                Ok(RestoreHandle::new(()))
            }
        });
        provider.expect_restore().returning(|_| Ok(()));

        ContextRegistry::builder()
            .with_provider(provider)
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn test_exceptionally_recovers_failed_stage() {
        let registry = flaky_registry();
        let policy = Arc::new(
            ResolvedPolicy::for_registry(&ContextServiceDefinition::new("svc"), &registry).unwrap(),
        );
        let context = CapturedContext::capture(registry, policy).unwrap();

        let value = ContextualStage::completed(context, 1)
            .then_apply(|n| n + 1)
            .exceptionally(|err| {
                assert!(matches!(err, ContextError::ApplyFailed { .. }));
                -1
            })
            .await
            .unwrap();
        assert_eq!(value, -1);
    }

    #[tokio::test]
    async fn test_handle_sees_failure() {
        let registry = flaky_registry();
        let policy = Arc::new(
            ResolvedPolicy::for_registry(&ContextServiceDefinition::new("svc"), &registry).unwrap(),
        );
        let context = CapturedContext::capture(registry, policy).unwrap();

        let outcome = ContextualStage::completed(context, 1)
            .then_apply(|n| n + 1)
            .handle(|result| result.is_err())
            .await
            .unwrap();
        assert!(outcome);
    }
}

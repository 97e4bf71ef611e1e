//! Contextual task execution
//!
//! A [`CapturedContext`] is a snapshot together with the resolved policy it
//! is applied under. Running work inside it follows a fixed protocol on the
//! calling (worker) thread:
//!
//! 1. **Applying**: in registry order, propagated categories get their
//!    captured value, cleared categories their cleared value, unchanged
//!    categories are skipped.
//! 2. **Running**: the work is invoked.
//! 3. **Restoring**: every applied category is restored, in reverse order,
//!    each independently of the others.
//! 4. **Done**: the work's result is returned, or its panic resumed.
//!
//! If applying fails part-way, the categories applied so far are rolled
//! back and the work never runs.

use crate::error::{ContextError, ContextResult, RestoreFailure, TaskError};
use crate::policy::{ContextPolicy, ResolvedPolicy};
use crate::providers::{guarded, ProviderError, RestoreHandle};
use crate::registry::ContextRegistry;
use crate::snapshot::ContextSnapshot;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Phase of one contextual invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Idle,
    Applying,
    Running,
    Restoring,
    Done,
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskPhase::Idle => "idle",
            TaskPhase::Applying => "applying",
            TaskPhase::Running => "running",
            TaskPhase::Restoring => "restoring",
            TaskPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Handles produced while applying, tagged with their registry position
type Applied = Vec<(usize, RestoreHandle)>;

/// A snapshot bound to the policy it will be applied under
///
/// Cheap to clone: every clone shares the same snapshot, so one capture can
/// back any number of wrappers and invocations.
#[derive(Clone)]
pub struct CapturedContext {
    registry: Arc<ContextRegistry>,
    policy: Arc<ResolvedPolicy>,
    snapshot: Arc<ContextSnapshot>,
}

impl fmt::Debug for CapturedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedContext")
            .field("policy", &self.policy)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl CapturedContext {
    /// Capture the calling thread's context
    ///
    /// `policy` must have been resolved against `registry`: one entry per
    /// registered category, in registry order.
    pub fn capture(
        registry: Arc<ContextRegistry>,
        policy: Arc<ResolvedPolicy>,
    ) -> ContextResult<Self> {
        if policy.len() != registry.len() {
            return Err(ContextError::configuration(format!(
                "policy covers {} context type(s) but the registry has {}",
                policy.len(),
                registry.len()
            )));
        }
        let misaligned = registry
            .entries()
            .iter()
            .zip(policy.entries())
            .position(|(registered, resolved)| registered.context_type() != &resolved.context_type);
        if let Some(index) = misaligned {
            return Err(ContextError::configuration(format!(
                "policy entry {} is for {} but the registry has {} there",
                index,
                policy.entries()[index].context_type,
                registry.entries()[index].context_type()
            )));
        }

        let snapshot = ContextSnapshot::capture(&registry)?;
        Ok(Self {
            registry,
            policy,
            snapshot: Arc::new(snapshot),
        })
    }

    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }

    pub fn policy(&self) -> &ResolvedPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Run `work` on the current thread under this context
    ///
    /// Work that returned normally is only reported as a success when every
    /// category was restored; otherwise its output is dropped and
    /// `RestoreFailed` is returned. A panic in `work` resumes once every
    /// category has been restored.
    pub fn run<R>(&self, work: impl FnOnce() -> R) -> ContextResult<R> {
        let (output, failures) = self.execute(work)?;
        if failures.is_empty() {
            Ok(output)
        } else {
            Err(ContextError::RestoreFailed { failures })
        }
    }

    /// Run fallible `work` under this context
    ///
    /// The work's own error is never hidden by restore failures: both are
    /// reported through [`TaskError::WorkAndRestore`].
    pub fn try_run<T, E>(&self, work: impl FnOnce() -> Result<T, E>) -> Result<T, TaskError<E>> {
        let (output, failures) = self.execute(work)?;
        match (output, failures.is_empty()) {
            (Ok(value), true) => Ok(value),
            (Ok(_), false) => Err(TaskError::Context(ContextError::RestoreFailed { failures })),
            (Err(error), true) => Err(TaskError::Work(error)),
            (Err(error), false) => Err(TaskError::WorkAndRestore {
                error,
                restore: failures,
            }),
        }
    }

    fn execute<R>(&self, work: impl FnOnce() -> R) -> ContextResult<(R, Vec<RestoreFailure>)> {
        tracing::trace!(phase = %TaskPhase::Applying, "Contextual task started");
        let applied = self.apply()?;

        tracing::trace!(phase = %TaskPhase::Running, applied = applied.len(), "Context applied");
        let outcome = panic::catch_unwind(AssertUnwindSafe(work));

        tracing::trace!(phase = %TaskPhase::Restoring, "Restoring context");
        let failures = self.restore(applied);

        match outcome {
            Ok(output) => {
                tracing::trace!(
                    phase = %TaskPhase::Done,
                    restore_failures = failures.len(),
                    "Contextual task finished"
                );
                Ok((output, failures))
            }
            Err(payload) => {
                for failure in &failures {
                    tracing::error!(
                        context_type = %failure.context_type,
                        reason = %failure.reason,
                        "Context restore failed while task was panicking"
                    );
                }
                tracing::trace!(phase = %TaskPhase::Done, "Contextual task panicked");
                panic::resume_unwind(payload)
            }
        }
    }

    fn apply(&self) -> ContextResult<Applied> {
        let mut applied = Vec::new();

        let aligned = self.registry.entries().iter().zip(self.policy.entries());
        for (index, (entry, resolved)) in aligned.enumerate() {
            let policy = resolved.policy;
            let provider = entry.provider();

            let result = match policy {
                ContextPolicy::Unchanged => continue,
                ContextPolicy::Propagated => match self.snapshot.state_at(index) {
                    Some(state) => guarded(|| provider.apply(state)),
                    None => Err(ProviderError::Other("no captured state".to_string())),
                },
                ContextPolicy::Cleared => guarded(|| provider.clear()),
            };

            match result {
                Ok(handle) => {
                    tracing::trace!(context_type = %entry.context_type(), policy = %policy, "Applied context");
                    applied.push((index, handle));
                }
                Err(e) => {
                    tracing::warn!(
                        context_type = %entry.context_type(),
                        policy = %policy,
                        error = %e,
                        "Failed to apply context, rolling back"
                    );
                    let rollback = self.restore(applied);
                    return Err(ContextError::apply_failed(entry.context_type(), &e, rollback));
                }
            }
        }

        Ok(applied)
    }

    fn restore(&self, applied: Applied) -> Vec<RestoreFailure> {
        let entries = self.registry.entries();
        let mut failures = Vec::new();

        for (index, handle) in applied.into_iter().rev() {
            let entry = &entries[index];
            match guarded(|| entry.provider().restore(handle)) {
                Ok(()) => {
                    tracing::trace!(context_type = %entry.context_type(), "Restored context");
                }
                Err(e) => {
                    tracing::warn!(
                        context_type = %entry.context_type(),
                        error = %e,
                        "Failed to restore context"
                    );
                    failures.push(RestoreFailure::new(entry.context_type().clone(), &e));
                }
            }
        }

        failures
    }
}

/// A unit of work bound to a captured context
///
/// Invoking the wrapper runs the work under the context captured when the
/// wrapper was created. It can be invoked any number of times, from any
/// thread; each invocation applies and restores independently.
pub struct Contextual<F> {
    context: CapturedContext,
    work: F,
}

impl<F> fmt::Debug for Contextual<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contextual")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<F> Contextual<F> {
    pub fn new(context: CapturedContext, work: F) -> Self {
        Self { context, work }
    }

    /// The context this work runs under
    pub fn context(&self) -> &CapturedContext {
        &self.context
    }

    /// Unwrap the plain work, discarding the captured context
    pub fn into_inner(self) -> F {
        self.work
    }

    /// Invoke zero-argument work
    pub fn call<R>(&self) -> ContextResult<R>
    where
        F: Fn() -> R,
    {
        self.context.run(|| (self.work)())
    }

    /// Invoke single-argument work
    pub fn call_with<A, R>(&self, arg: A) -> ContextResult<R>
    where
        F: Fn(A) -> R,
    {
        self.context.run(|| (self.work)(arg))
    }

    /// Invoke two-argument work
    pub fn call_with2<A, B, R>(&self, a: A, b: B) -> ContextResult<R>
    where
        F: Fn(A, B) -> R,
    {
        self.context.run(|| (self.work)(a, b))
    }

    /// Invoke stateful zero-argument work
    pub fn call_mut<R>(&mut self) -> ContextResult<R>
    where
        F: FnMut() -> R,
    {
        let work = &mut self.work;
        self.context.run(work)
    }

    /// Invoke work that can only run once
    pub fn call_once<R>(self) -> ContextResult<R>
    where
        F: FnOnce() -> R,
    {
        let Contextual { context, work } = self;
        context.run(work)
    }

    /// Invoke fallible zero-argument work
    pub fn try_call<T, E>(&self) -> Result<T, TaskError<E>>
    where
        F: Fn() -> Result<T, E>,
    {
        self.context.try_run(|| (self.work)())
    }

    /// Invoke fallible single-argument work
    pub fn try_call_with<A, T, E>(&self, arg: A) -> Result<T, TaskError<E>>
    where
        F: Fn(A) -> Result<T, E>,
    {
        self.context.try_run(|| (self.work)(arg))
    }
}

//! Context services
//!
//! A [`ContextService`] is a definition resolved against a registry. It is
//! the public face of the engine: application code captures its current
//! context through it and gets back wrappers that re-establish that context
//! wherever they are invoked.
//!
//! [`ContextServices`] is the start-up directory of configured services,
//! looked up by definition name.

use crate::definition::{ContextServiceDefinition, DefinitionSet};
use crate::error::{ContextError, ContextResult, TaskError};
use crate::policy::ResolvedPolicy;
use crate::registry::ContextRegistry;
use crate::stage::ContextualStage;
use crate::task::{CapturedContext, Contextual};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A configured context service
///
/// Cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct ContextService {
    name: Arc<str>,
    registry: Arc<ContextRegistry>,
    policy: Arc<ResolvedPolicy>,
}

impl fmt::Debug for ContextService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextService")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ContextService {
    /// Resolve `definition` against `registry`
    ///
    /// Fails with `ConflictingPolicy` when the definition lists a category
    /// under more than one policy.
    pub fn new(
        registry: Arc<ContextRegistry>,
        definition: &ContextServiceDefinition,
    ) -> ContextResult<Self> {
        definition.validate()?;
        let policy = ResolvedPolicy::for_registry(definition, &registry)?;

        tracing::debug!(
            service = %definition.name,
            context_types = policy.len(),
            "Created context service"
        );

        Ok(Self {
            name: Arc::from(definition.name.as_str()),
            registry,
            policy: Arc::new(policy),
        })
    }

    /// A service using the default definition
    pub fn with_defaults(registry: Arc<ContextRegistry>) -> ContextResult<Self> {
        Self::new(registry, &ContextServiceDefinition::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &ResolvedPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Capture the calling thread's context under this service's policy
    pub fn capture(&self) -> ContextResult<CapturedContext> {
        CapturedContext::capture(Arc::clone(&self.registry), Arc::clone(&self.policy))
    }

    /// Wrap `work` so it runs under the calling thread's current context
    ///
    /// The context is captured now; `work` is not run until the wrapper is
    /// invoked.
    pub fn contextualize<F>(&self, work: F) -> ContextResult<Contextual<F>> {
        Ok(Contextual::new(self.capture()?, work))
    }

    /// Contextual action taking no input and producing no value
    pub fn contextual_runnable<F>(&self, work: F) -> ContextResult<impl Fn() -> ContextResult<()> + Send + Sync>
    where
        F: Fn() + Send + Sync,
    {
        let task = self.contextualize(work)?;
        Ok(move || task.call())
    }

    /// Contextual value supplier
    pub fn contextual_supplier<R, F>(&self, work: F) -> ContextResult<impl Fn() -> ContextResult<R> + Send + Sync>
    where
        F: Fn() -> R + Send + Sync,
    {
        let task = self.contextualize(work)?;
        Ok(move || task.call())
    }

    /// Contextual single-argument consumer
    pub fn contextual_consumer<A, F>(&self, work: F) -> ContextResult<impl Fn(A) -> ContextResult<()> + Send + Sync>
    where
        F: Fn(A) + Send + Sync,
    {
        let task = self.contextualize(work)?;
        Ok(move |a: A| task.call_with(a))
    }

    /// Contextual single-argument function
    pub fn contextual_function<A, R, F>(&self, work: F) -> ContextResult<impl Fn(A) -> ContextResult<R> + Send + Sync>
    where
        F: Fn(A) -> R + Send + Sync,
    {
        let task = self.contextualize(work)?;
        Ok(move |a: A| task.call_with(a))
    }

    /// Contextual two-argument consumer
    pub fn contextual_bi_consumer<A, B, F>(
        &self,
        work: F,
    ) -> ContextResult<impl Fn(A, B) -> ContextResult<()> + Send + Sync>
    where
        F: Fn(A, B) + Send + Sync,
    {
        let task = self.contextualize(work)?;
        Ok(move |a: A, b: B| task.call_with2(a, b))
    }

    /// Contextual two-argument function
    pub fn contextual_bi_function<A, B, R, F>(
        &self,
        work: F,
    ) -> ContextResult<impl Fn(A, B) -> ContextResult<R> + Send + Sync>
    where
        F: Fn(A, B) -> R + Send + Sync,
    {
        let task = self.contextualize(work)?;
        Ok(move |a: A, b: B| task.call_with2(a, b))
    }

    /// Contextual fallible computation
    ///
    /// The work's own error is returned unchanged when every category was
    /// restored.
    pub fn contextual_callable<T, E, F>(
        &self,
        work: F,
    ) -> ContextResult<impl Fn() -> Result<T, TaskError<E>> + Send + Sync>
    where
        F: Fn() -> Result<T, E> + Send + Sync,
    {
        let task = self.contextualize(work)?;
        Ok(move || task.try_call())
    }

    /// Copy `future` into a stage whose dependents run under the calling
    /// thread's current context
    pub fn with_context_capture<T, Fut>(&self, future: Fut) -> ContextResult<ContextualStage<T>>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Ok(ContextualStage::new(self.capture()?, future))
    }

    /// An already completed stage whose dependents run under the calling
    /// thread's current context
    pub fn completed_stage<T: Send + 'static>(&self, value: T) -> ContextResult<ContextualStage<T>> {
        Ok(ContextualStage::completed(self.capture()?, value))
    }
}

/// Configured services, by definition name
#[derive(Debug, Clone, Default)]
pub struct ContextServices {
    services: Vec<ContextService>,
    index: HashMap<String, usize>,
}

impl ContextServices {
    /// Resolve every definition of `set` against `registry`
    ///
    /// Resolution errors surface here, before any work is contextualized.
    pub fn from_definitions(
        registry: Arc<ContextRegistry>,
        set: &DefinitionSet,
    ) -> ContextResult<Self> {
        let mut services = Self::default();
        for definition in &set.definitions {
            services.insert(ContextService::new(Arc::clone(&registry), definition)?)?;
        }
        Ok(services)
    }

    /// Add a service
    pub fn insert(&mut self, service: ContextService) -> ContextResult<()> {
        if self.index.contains_key(service.name()) {
            return Err(ContextError::DuplicateDefinition(service.name().to_string()));
        }
        self.index.insert(service.name().to_string(), self.services.len());
        self.services.push(service);
        Ok(())
    }

    /// Look up a service by definition name
    pub fn get(&self, name: &str) -> ContextResult<&ContextService> {
        self.index
            .get(name)
            .map(|&idx| &self.services[idx])
            .ok_or_else(|| ContextError::UnknownDefinition(name.to_string()))
    }

    /// Service names, in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(ContextService::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextService> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context_type::ContextType;
    use crate::policy::ContextPolicy;
    use crate::providers::naming::{self, NamingScope};
    use crate::providers::security::{self, Principal};
    use crate::providers::transaction;

    fn registry() -> Arc<ContextRegistry> {
        ContextRegistry::with_builtins()
    }

    fn principal_name() -> Option<String> {
        security::current_principal().map(|p| p.name().to_string())
    }

    #[test]
    fn test_default_service_clears_transaction() {
        let service = ContextService::with_defaults(registry()).unwrap();
        assert_eq!(service.name(), "default");
        assert_eq!(
            service.policy().get(&ContextType::TRANSACTION),
            Some(ContextPolicy::Cleared)
        );
        assert_eq!(
            service.policy().get(&ContextType::SECURITY),
            Some(ContextPolicy::Propagated)
        );

        let tx = transaction::begin();
        let task = security::run_as(Principal::new("erin"), || {
            service
                .contextualize(|| (principal_name(), transaction::current()))
                .unwrap()
        });

        let (name, seen_tx) = task.call().unwrap();
        assert_eq!(name.as_deref(), Some("erin"));
        assert!(seen_tx.is_none());
        assert_eq!(transaction::current(), Some(tx.id()));
    }

    #[test]
    fn test_contextualize_does_not_run_work() {
        let service = ContextService::with_defaults(registry()).unwrap();
        let ran = std::sync::atomic::AtomicBool::new(false);
        let _task = service
            .contextualize(|| ran.store(true, std::sync::atomic::Ordering::SeqCst))
            .unwrap();
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_conflicting_definition_is_fatal() {
        let definition = ContextServiceDefinition::new("bad")
            .with_propagated(["Security"])
            .with_unchanged(["Security"]);
        let err = ContextService::new(registry(), &definition).unwrap_err();
        assert!(matches!(err, ContextError::ConflictingPolicy { .. }));
    }

    #[test]
    fn test_closure_helpers_run_on_other_thread() {
        let definition = ContextServiceDefinition::new("app/Helpers")
            .with_propagated(["Application", "Security"]);
        let service = ContextService::new(registry(), &definition).unwrap();

        let scope = NamingScope::new("orders").with_binding("env/queue", "orders-queue");
        let (function, bi_function, supplier) = naming::run_in_scope(scope, || {
            security::run_as(Principal::new("frank"), || {
                (
                    service
                        .contextual_function(|key: &'static str| naming::lookup(key).ok())
                        .unwrap(),
                    service
                        .contextual_bi_function(|a: i32, b: i32| (a + b, principal_name()))
                        .unwrap(),
                    service.contextual_supplier(principal_name).unwrap(),
                )
            })
        });

        std::thread::spawn(move || {
            assert_eq!(function("env/queue").unwrap().as_deref(), Some("orders-queue"));
            assert_eq!(bi_function(40, 2).unwrap(), (42, Some("frank".to_string())));
            assert_eq!(supplier().unwrap().as_deref(), Some("frank"));
            assert!(security::current_principal().is_none());
            assert!(naming::current().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_consumers_and_runnable() {
        let service = ContextService::with_defaults(registry()).unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let (runnable, consumer, bi_consumer) = security::run_as(Principal::new("gina"), || {
            let s1 = Arc::clone(&seen);
            let s2 = Arc::clone(&seen);
            let s3 = Arc::clone(&seen);
            (
                service
                    .contextual_runnable(move || s1.lock().unwrap().push(format!("run:{:?}", principal_name())))
                    .unwrap(),
                service
                    .contextual_consumer(move |n: i32| s2.lock().unwrap().push(format!("accept:{n}")))
                    .unwrap(),
                service
                    .contextual_bi_consumer(move |a: i32, b: &'static str| {
                        s3.lock().unwrap().push(format!("{a}:{b}:{:?}", principal_name()))
                    })
                    .unwrap(),
            )
        });

        runnable().unwrap();
        consumer(7).unwrap();
        bi_consumer(1, "x").unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "run:Some(\"gina\")".to_string(),
                "accept:7".to_string(),
                "1:x:Some(\"gina\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_contextual_callable_keeps_work_error() {
        let service = ContextService::with_defaults(registry()).unwrap();
        let callable = service
            .contextual_callable(|| Err::<u8, _>("refused"))
            .unwrap();
        let err = callable().unwrap_err();
        assert_eq!(err.work_error(), Some(&"refused"));
    }

    #[test]
    fn test_one_capture_backs_many_invocations() {
        let service = ContextService::with_defaults(registry()).unwrap();
        let task = security::run_as(Principal::new("hank"), || {
            service.contextualize(principal_name).unwrap()
        });
        let task = Arc::new(task);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let task = Arc::clone(&task);
                std::thread::spawn(move || task.call().unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("hank"));
        }
    }

    #[test]
    fn test_directory_lookup() {
        let set = DefinitionSet::from_toml_str(
            r#"
[[context_service]]
name = "app/ContextA"
propagated = ["Application"]
unchanged = ["Remaining"]

[[context_service]]
name = "app/ContextB"
"#,
        )
        .unwrap();
        let services = ContextServices::from_definitions(registry(), &set).unwrap();
        assert_eq!(services.names().collect::<Vec<_>>(), vec!["app/ContextA", "app/ContextB"]);

        let a = services.get("app/ContextA").unwrap();
        assert_eq!(a.policy().get(&ContextType::NAMING), Some(ContextPolicy::Propagated));
        assert_eq!(a.policy().get(&ContextType::SECURITY), Some(ContextPolicy::Unchanged));

        assert!(matches!(
            services.get("app/Missing"),
            Err(ContextError::UnknownDefinition(name)) if name == "app/Missing"
        ));
    }

    #[test]
    fn test_directory_rejects_duplicates() {
        let mut services = ContextServices::default();
        services
            .insert(ContextService::with_defaults(registry()).unwrap())
            .unwrap();
        let err = services
            .insert(ContextService::with_defaults(registry()).unwrap())
            .unwrap_err();
        assert!(matches!(err, ContextError::DuplicateDefinition(_)));
    }
}

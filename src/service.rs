//! Services: one instance per concrete type, constructed lazily under a per-type lock.

use crate::component::{Component, ComponentContext};
use crate::error::BoxError;
use async_trait::async_trait;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::OnceCell;

pub trait Service: Component + Sized {
    /// Runs at most once per registry, whichever package asks first.
    fn create(ctx: &ComponentContext) -> Result<Self, BoxError>;
}

struct Instance {
    any: Arc<dyn Any + Send + Sync>,
    owner: String,
}

#[derive(Default)]
struct ServiceSlot {
    instance: OnceCell<Instance>,
    started: AtomicBool,
}

#[derive(Default)]
pub struct ServiceRegistry {
    slots: Mutex<HashMap<TypeId, Arc<ServiceSlot>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used when an application is not given its own.
    pub fn global() -> Arc<ServiceRegistry> {
        static GLOBAL: OnceLock<Arc<ServiceRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ServiceRegistry::new())))
    }

    fn slot(&self, id: TypeId) -> Arc<ServiceSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(id).or_default())
    }

    fn existing(&self, id: TypeId) -> Option<Arc<ServiceSlot>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(&id).cloned()
    }

    /// The instance of `S`, constructing it with `ctx` on first call. Concurrent first calls
    /// wait for a single construction.
    pub async fn get_or_create<S: Service>(&self, ctx: &ComponentContext) -> Result<Arc<S>, BoxError> {
        let slot = self.slot(TypeId::of::<S>());
        let instance = slot
            .instance
            .get_or_try_init(|| async {
                let service = Arc::new(S::create(ctx)?);
                ctx.log().debug(format_args!("constructed service {}", type_name::<S>()));
                let any: Arc<dyn Any + Send + Sync> = service;
                Ok::<_, BoxError>(Instance {
                    any,
                    owner: ctx.pkg().name.clone(),
                })
            })
            .await?;
        Arc::clone(&instance.any)
            .downcast::<S>()
            .map_err(|_| format!("service slot of {} holds another type", type_name::<S>()).into())
    }

    /// The instance of `S` if it has been constructed.
    pub fn get<S: Service>(&self) -> Option<Arc<S>> {
        let slot = self.existing(TypeId::of::<S>())?;
        let instance = slot.instance.get()?;
        Arc::clone(&instance.any).downcast::<S>().ok()
    }

    /// Package that constructed `S`.
    pub fn owner<S: Service>(&self) -> Option<String> {
        let slot = self.existing(TypeId::of::<S>())?;
        slot.instance.get().map(|i| i.owner.clone())
    }

    /// True exactly once per service type: the caller that gets `true` runs the ready hook.
    pub(crate) fn mark_started(&self, id: TypeId) -> bool {
        match self.existing(id) {
            Some(slot) => !slot.started.swap(true, Ordering::SeqCst),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|s| s.instance.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A constructed service as held by its package.
#[derive(Clone)]
pub(crate) struct ServiceHandle {
    pub(crate) service_type: TypeId,
    pub(crate) service_name: &'static str,
    pub(crate) component: Arc<dyn Component>,
}

#[async_trait]
pub(crate) trait ServiceFactory: Send + Sync {
    fn service_type(&self) -> TypeId;

    fn service_name(&self) -> &'static str;

    async fn instantiate(&self, ctx: &ComponentContext) -> Result<ServiceHandle, BoxError>;
}

pub(crate) struct ServiceSpec<S>(PhantomData<fn() -> S>);

impl<S> ServiceSpec<S> {
    pub(crate) fn new() -> Self {
        ServiceSpec(PhantomData)
    }
}

#[async_trait]
impl<S: Service> ServiceFactory for ServiceSpec<S> {
    fn service_type(&self) -> TypeId {
        TypeId::of::<S>()
    }

    fn service_name(&self) -> &'static str {
        type_name::<S>()
    }

    async fn instantiate(&self, ctx: &ComponentContext) -> Result<ServiceHandle, BoxError> {
        let service = ctx.services().get_or_create::<S>(ctx).await?;
        Ok(ServiceHandle {
            service_type: TypeId::of::<S>(),
            service_name: type_name::<S>(),
            component: service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    struct Counter;

    impl Component for Counter {}

    impl Service for Counter {
        fn create(_ctx: &ComponentContext) -> Result<Self, BoxError> {
            CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            Ok(Counter)
        }
    }

    struct Quiet;

    impl Component for Quiet {}

    impl Service for Quiet {
        fn create(_ctx: &ComponentContext) -> Result<Self, BoxError> {
            Ok(Quiet)
        }
    }

    struct Broken;

    impl Component for Broken {}

    impl Service for Broken {
        fn create(_ctx: &ComponentContext) -> Result<Self, BoxError> {
            Err("upstream unavailable".into())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_construction_runs_once() {
        let registry = Arc::new(ServiceRegistry::new());
        let ctx = ComponentContext::standalone("catalog");

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                registry.get_or_create::<Counter>(&ctx).await.unwrap()
            }));
        }
        let mut instances = Vec::new();
        for task in tasks {
            instances.push(task.await.unwrap());
        }

        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.owner::<Counter>().as_deref(), Some("catalog"));
    }

    #[tokio::test]
    async fn failed_construction_leaves_slot_empty() {
        let registry = ServiceRegistry::new();
        let ctx = ComponentContext::standalone("catalog");
        assert!(registry.get_or_create::<Broken>(&ctx).await.is_err());
        assert!(registry.get::<Broken>().is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn ready_hook_is_claimed_once() {
        let registry = ServiceRegistry::new();
        let ctx = ComponentContext::standalone("catalog");
        assert!(!registry.mark_started(TypeId::of::<Quiet>()));
        registry.get_or_create::<Quiet>(&ctx).await.unwrap();
        assert!(registry.mark_started(TypeId::of::<Quiet>()));
        assert!(!registry.mark_started(TypeId::of::<Quiet>()));
    }
}

//! Controllers: components that expose handlers under their package's path.

use crate::component::{Component, ComponentContext};
use crate::error::{BoxError, DeclarationError};
use crate::registry::{BoundHandler, HandlerRegistry, RegistrationEntry};
use std::any::{type_name, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

pub trait Controller: Component + Sized {
    fn create(ctx: &ComponentContext) -> Result<Self, BoxError>;

    /// Declare every handler of this controller. Called once per binding, before its pending
    /// routes are drained.
    fn declare(routes: &HandlerRegistry) -> Result<(), DeclarationError>;

    /// Module whose declarations this controller claims. Defaults to the module defining the
    /// type; override with `module_path!()` when handlers are declared elsewhere.
    fn declaring_module() -> &'static str {
        module_of(type_name::<Self>())
    }
}

/// `a::b::Type<X>` -> `a::b`
fn module_of(type_name: &'static str) -> &'static str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit_once("::").map_or(base, |(module, _)| module)
}

pub(crate) type PendingRoute = (BoundHandler, RegistrationEntry);

pub(crate) trait ControllerFactory: Send + Sync {
    fn controller_type(&self) -> TypeId;

    fn controller_name(&self) -> &'static str;

    fn instantiate(&self, ctx: &ComponentContext) -> Result<Box<dyn BoundController>, BoxError>;
}

/// A constructed controller, erased.
pub(crate) trait BoundController: Send + Sync {
    fn controller_type(&self) -> TypeId;

    fn controller_name(&self) -> &'static str;

    fn component(&self) -> Arc<dyn Component>;

    fn bind_routes(&self, registry: &HandlerRegistry) -> Result<Vec<PendingRoute>, DeclarationError>;
}

pub(crate) struct ControllerSpec<C>(PhantomData<fn() -> C>);

impl<C> ControllerSpec<C> {
    pub(crate) fn new() -> Self {
        ControllerSpec(PhantomData)
    }
}

impl<C: Controller> ControllerFactory for ControllerSpec<C> {
    fn controller_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn controller_name(&self) -> &'static str {
        type_name::<C>()
    }

    fn instantiate(&self, ctx: &ComponentContext) -> Result<Box<dyn BoundController>, BoxError> {
        let controller = C::create(ctx)?;
        Ok(Box::new(ControllerInstance(Arc::new(controller))))
    }
}

struct ControllerInstance<C>(Arc<C>);

impl<C: Controller> BoundController for ControllerInstance<C> {
    fn controller_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn controller_name(&self) -> &'static str {
        type_name::<C>()
    }

    fn component(&self) -> Arc<dyn Component> {
        self.0.clone()
    }

    fn bind_routes(&self, registry: &HandlerRegistry) -> Result<Vec<PendingRoute>, DeclarationError> {
        C::declare(registry)?;
        registry.pending_routes(&self.0)
    }
}

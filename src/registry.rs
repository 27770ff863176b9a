//! Pending handler declarations, keyed by handler identity.
//!
//! A controller declares its handlers once, during binding, through [`HandlerRegistry::declare`].
//! Every call on the returned [`Declaration`] writes through to the single entry for that
//! handler, so route, input and output declarations converge no matter the order they are made
//! in. The manager then drains the entries belonging to the controller with
//! [`HandlerRegistry::pending_routes`].

use crate::controller::Controller;
use crate::error::{AppError, DeclarationError};
use crate::pipeline::returns::{Dump, OutputSchema, Raw, Returns};
use crate::pipeline::takes::{Input, Slot, Takes};
use crate::pipeline::{Endpoint, Pipeline, RouteStage};
use crate::routing::path::check_route;
use crate::routing::Method;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Stable identity of a declared handler: declaring module plus function name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId {
    module: &'static str,
    name: &'static str,
}

impl HandlerId {
    pub const fn new(module: &'static str, name: &'static str) -> Self {
        Self { module, name }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// Identity of a handler function declared in the current module.
///
/// ```ignore
/// routes.declare::<Self>(handler_id!(get_item))
/// ```
#[macro_export]
macro_rules! handler_id {
    ($name:ident) => {
        $crate::registry::HandlerId::new(module_path!(), stringify!($name))
    };
}

/// Named request/response part a schema can be bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Part {
    Header,
    Path,
    Body,
    Query,
    Response,
}

impl Part {
    pub const INPUTS: [Part; 4] = [Part::Header, Part::Path, Part::Body, Part::Query];

    pub fn as_str(&self) -> &'static str {
        match self {
            Part::Header => "header",
            Part::Path => "path",
            Part::Body => "body",
            Part::Query => "query",
            Part::Response => "response",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema type bound to each part, in part order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaSet {
    bindings: BTreeMap<Part, &'static str>,
}

impl SchemaSet {
    pub fn bind(&mut self, part: Part, schema: &'static str) {
        self.bindings.insert(part, schema);
    }

    pub fn unbind(&mut self, part: Part) {
        self.bindings.remove(&part);
    }

    pub fn get(&self, part: Part) -> Option<&'static str> {
        self.bindings.get(&part).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Part, &'static str)> + '_ {
        self.bindings.iter().map(|(p, s)| (*p, *s))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: Method,
    pub path: String,
}

/// Accumulated declaration state for one handler.
#[derive(Clone)]
pub struct RegistrationEntry {
    id: HandlerId,
    route: Option<RouteSpec>,
    description: Option<String>,
    schemas: SchemaSet,
    handler: Option<Arc<dyn Any + Send + Sync>>,
}

impl RegistrationEntry {
    fn new(id: HandlerId) -> Self {
        Self {
            id,
            route: None,
            description: None,
            schemas: SchemaSet::default(),
            handler: None,
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn route(&self) -> Option<&RouteSpec> {
        self.route.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for RegistrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationEntry")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("description", &self.description)
            .field("schemas", &self.schemas)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Builds the endpoint of one handler for a given controller instance.
struct HandlerFactory<C> {
    schemas: SchemaSet,
    build: Box<dyn Fn(Arc<C>, RouteStage) -> Arc<dyn Endpoint> + Send + Sync>,
}

/// A drained handler already tied to its controller instance. The manager supplies the route
/// stage once the full path is known.
pub struct BoundHandler {
    build: Box<dyn Fn(RouteStage) -> Arc<dyn Endpoint> + Send + Sync>,
}

impl BoundHandler {
    pub fn endpoint(&self, route: RouteStage) -> Arc<dyn Endpoint> {
        (self.build)(route)
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoundHandler")
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    pending: Mutex<Vec<RegistrationEntry>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used when an application is not given its own.
    pub fn global() -> Arc<HandlerRegistry> {
        static GLOBAL: OnceLock<Arc<HandlerRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(HandlerRegistry::new())))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RegistrationEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entry<R>(&self, id: HandlerId, f: impl FnOnce(&mut RegistrationEntry) -> R) -> R {
        let mut pending = self.lock();
        let index = match pending.iter().position(|e| e.id == id) {
            Some(index) => index,
            None => {
                pending.push(RegistrationEntry::new(id));
                pending.len() - 1
            }
        };
        f(&mut pending[index])
    }

    /// The pending entry for `id`, created on first use.
    pub fn get_or_create(&self, id: HandlerId) -> RegistrationEntry {
        self.with_entry(id, |entry| entry.clone())
    }

    /// Set the route of `id`. Last write wins. The method must be one of the fixed set.
    pub fn register_route(
        &self,
        id: HandlerId,
        path: &str,
        method: &str,
        description: Option<&str>,
    ) -> Result<(), DeclarationError> {
        let method = parse_method(id, method)?;
        check_path(id, path)?;
        self.with_entry(id, |entry| {
            entry.route = Some(RouteSpec {
                method,
                path: path.to_string(),
            });
            entry.description = description.map(str::to_string);
        });
        Ok(())
    }

    /// Bind (or with `None`, unbind) the schema of one part of `id`.
    pub fn bind_schema(&self, id: HandlerId, part: Part, schema: Option<&'static str>) {
        self.with_entry(id, |entry| match schema {
            Some(schema) => entry.schemas.bind(part, schema),
            None => entry.schemas.unbind(part),
        });
    }

    /// Start (or continue) declaring a handler of controller `C`.
    pub fn declare<C: Controller>(&self, id: HandlerId) -> Declaration<'_, C> {
        self.with_entry(id, |_| ());
        Declaration {
            registry: self,
            id,
            takes: Takes::new(),
            returns: Returns::new(),
            _controller: PhantomData,
        }
    }

    fn attach<C: Controller>(&self, id: HandlerId, factory: HandlerFactory<C>) {
        let factory: Arc<dyn Any + Send + Sync> = Arc::new(factory);
        self.with_entry(id, |entry| entry.handler = Some(factory));
    }

    /// Identities of all entries not yet drained, in declaration order.
    pub fn entries(&self) -> Vec<HandlerId> {
        self.lock().iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return the entries declared in `C`'s module for controller type `C`, each
    /// paired with its handler bound to `controller`. A second call without new declarations
    /// returns nothing.
    pub fn pending_routes<C: Controller>(
        &self,
        controller: &Arc<C>,
    ) -> Result<Vec<(BoundHandler, RegistrationEntry)>, DeclarationError> {
        let module = C::declaring_module();
        let claimed: Vec<RegistrationEntry> = {
            let mut pending = self.lock();
            let (claimed, kept) = pending.drain(..).partition(|entry| {
                entry.id.module == module
                    && entry
                        .handler
                        .as_ref()
                        .map_or(true, |h| h.is::<HandlerFactory<C>>())
            });
            *pending = kept;
            claimed
        };

        let mut bound = Vec::with_capacity(claimed.len());
        for entry in claimed {
            let incomplete = |missing| DeclarationError::IncompleteHandler {
                handler: entry.id.to_string(),
                missing,
            };
            if entry.route.is_none() {
                return Err(incomplete("no route declared"));
            }
            let factory = entry
                .handler
                .clone()
                .and_then(|h| h.downcast::<HandlerFactory<C>>().ok())
                .ok_or_else(|| incomplete("no handler attached"))?;
            if factory.schemas != entry.schemas {
                return Err(DeclarationError::SchemaMismatch(entry.id.to_string()));
            }
            let controller = Arc::clone(controller);
            let handler = BoundHandler {
                build: Box::new(move |route| (factory.build)(Arc::clone(&controller), route)),
            };
            bound.push((handler, entry));
        }
        Ok(bound)
    }
}

fn parse_method(id: HandlerId, method: &str) -> Result<Method, DeclarationError> {
    method.parse().map_err(|_| DeclarationError::InvalidMethod {
        handler: id.to_string(),
        method: method.to_string(),
    })
}

fn check_path(id: HandlerId, path: &str) -> Result<(), DeclarationError> {
    check_route(path).map_err(|reason| DeclarationError::InvalidRoute {
        handler: id.to_string(),
        path: path.to_string(),
        reason,
    })
}

/// Registration handle for one handler. Each call records into the registry entry immediately;
/// [`Declaration::handle`] attaches the handler function and its composed pipeline.
pub struct Declaration<'r, C, H = (), P = (), B = (), Q = (), D = Raw> {
    registry: &'r HandlerRegistry,
    id: HandlerId,
    takes: Takes<H, P, B, Q>,
    returns: Returns<D>,
    _controller: PhantomData<fn() -> C>,
}

impl<'r, C, H, P, B, Q, D> Declaration<'r, C, H, P, B, Q, D>
where
    C: Controller,
    H: Slot,
    P: Slot,
    B: Slot,
    Q: Slot,
    D: OutputSchema,
{
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Bind the handler to `method` and a path relative to the package path. Like
    /// [`HandlerRegistry::register_route`], this clears an earlier description; call
    /// [`Declaration::describe`] afterwards.
    pub fn route(self, method: impl AsRef<str>, path: &str) -> Result<Self, DeclarationError> {
        self.registry.register_route(self.id, path, method.as_ref(), None)?;
        Ok(self)
    }

    pub fn describe(self, description: &str) -> Self {
        self.registry.with_entry(self.id, |entry| {
            entry.description = Some(description.to_string());
        });
        self
    }

    /// Declare the request parts the handler takes. Replaces earlier input bindings.
    pub fn takes<H2, P2, B2, Q2>(
        self,
        takes: Takes<H2, P2, B2, Q2>,
    ) -> Declaration<'r, C, H2, P2, B2, Q2, D>
    where
        H2: Slot,
        P2: Slot,
        B2: Slot,
        Q2: Slot,
    {
        for (part, schema) in takes.bindings() {
            self.registry.bind_schema(self.id, part, schema);
        }
        Declaration {
            registry: self.registry,
            id: self.id,
            takes,
            returns: self.returns,
            _controller: PhantomData,
        }
    }

    /// Declare how the handler's return value is serialized.
    pub fn returns<D2: OutputSchema>(self, returns: Returns<D2>) -> Declaration<'r, C, H, P, B, Q, D2> {
        self.registry.bind_schema(self.id, Part::Response, D2::schema());
        Declaration {
            registry: self.registry,
            id: self.id,
            takes: self.takes,
            returns,
            _controller: PhantomData,
        }
    }

    /// Attach the handler function. Its pipeline is route, then input, then the handler, then
    /// output, whatever order the declaration calls were made in.
    pub fn handle<F, Fut, T>(self, handler: F) -> Result<(), DeclarationError>
    where
        D: Dump<T>,
        F: Fn(Arc<C>, Input<H, P, B, Q>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Send + 'static,
    {
        let module = C::declaring_module();
        if self.id.module != module {
            return Err(DeclarationError::ForeignHandler {
                handler: self.id.to_string(),
                module: module.to_string(),
            });
        }

        let mut schemas = SchemaSet::default();
        for (part, schema) in self.takes.bindings() {
            if let Some(schema) = schema {
                schemas.bind(part, schema);
            }
        }
        if let Some(schema) = D::schema() {
            schemas.bind(Part::Response, schema);
        }

        let takes = self.takes;
        let returns = self.returns;
        let factory = HandlerFactory::<C> {
            schemas,
            build: Box::new(move |controller, route| {
                Arc::new(Pipeline::new(controller, route, takes, returns, handler.clone()))
            }),
        };
        self.registry.attach(self.id, factory);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentContext};
    use crate::error::BoxError;
    use crate::schema::Schema;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Deserialize)]
    struct ItemPath {
        id: u64,
    }
    impl Schema for ItemPath {}

    #[derive(Debug, Deserialize)]
    struct NewItem {
        name: String,
    }
    impl Schema for NewItem {}

    #[derive(Serialize)]
    struct ItemOut {
        id: u64,
        name: String,
    }

    impl From<(u64, String)> for ItemOut {
        fn from((id, name): (u64, String)) -> Self {
            Self { id, name }
        }
    }

    struct Items;

    impl Component for Items {}

    impl Controller for Items {
        fn create(_ctx: &ComponentContext) -> Result<Self, BoxError> {
            Ok(Items)
        }

        fn declare(routes: &HandlerRegistry) -> Result<(), DeclarationError> {
            routes
                .declare::<Self>(crate::handler_id!(get_item))
                .route("GET", "/items/{id}")?
                .takes(Takes::new().path::<ItemPath>())
                .returns(Returns::schema::<ItemOut>())
                .handle(Self::get_item)
        }
    }

    impl Items {
        async fn get_item(self: Arc<Self>, input: Input<(), ItemPath>) -> Result<(u64, String), AppError> {
            Ok((input.path.id, "widget".to_string()))
        }

        async fn create_item(self: Arc<Self>, input: Input<(), (), NewItem>) -> Result<(u64, String), AppError> {
            Ok((1, input.body.name))
        }
    }

    #[test]
    fn get_or_create_returns_the_same_entry() {
        let registry = HandlerRegistry::new();
        let id = HandlerId::new("app::items", "list");
        registry.get_or_create(id);
        registry.get_or_create(id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_route_last_write_wins() {
        let registry = HandlerRegistry::new();
        let id = HandlerId::new("app::items", "list");
        registry.register_route(id, "/items", "GET", None).unwrap();
        registry
            .register_route(id, "/things", "post", Some("Create a thing"))
            .unwrap();

        let entry = registry.get_or_create(id);
        assert_eq!(
            entry.route(),
            Some(&RouteSpec {
                method: Method::Post,
                path: "/things".into()
            })
        );
        assert_eq!(entry.description(), Some("Create a thing"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_method_fails_at_declaration() {
        let registry = HandlerRegistry::new();
        let err = registry
            .declare::<Items>(crate::handler_id!(get_item))
            .route("FETCH", "/items")
            .err()
            .unwrap();
        assert!(matches!(err, DeclarationError::InvalidMethod { ref method, .. } if method == "FETCH"));
    }

    #[test]
    fn router_syntax_fails_at_declaration() {
        let registry = HandlerRegistry::new();
        let err = registry
            .declare::<Items>(crate::handler_id!(get_item))
            .route("GET", "/items/:id")
            .err()
            .unwrap();
        assert!(matches!(err, DeclarationError::InvalidRoute { ref path, .. } if path == "/items/:id"));

        let id = HandlerId::new("app::files", "fetch");
        assert!(registry.register_route(id, "/files/{*rest}/raw", "GET", None).is_err());
        assert!(registry.get_or_create(id).route().is_none());
    }

    #[test]
    fn redeclaring_a_route_resets_its_description() {
        let registry = HandlerRegistry::new();
        registry
            .declare::<Items>(crate::handler_id!(get_item))
            .route("GET", "/items/{id}")
            .unwrap()
            .describe("One item");
        registry
            .declare::<Items>(crate::handler_id!(get_item))
            .route("GET", "/items/{id}")
            .unwrap();
        let entry = registry.get_or_create(crate::handler_id!(get_item));
        assert_eq!(entry.description(), None);

        registry
            .register_route(crate::handler_id!(get_item), "/items/{id}", "GET", Some("Again"))
            .unwrap();
        let entry = registry.get_or_create(crate::handler_id!(get_item));
        assert_eq!(entry.description(), Some("Again"));
    }

    #[test]
    fn takes_and_returns_converge_in_either_order() {
        let first = HandlerRegistry::new();
        first
            .declare::<Items>(crate::handler_id!(create_item))
            .takes(Takes::new().body::<NewItem>())
            .returns(Returns::schema::<ItemOut>());

        let second = HandlerRegistry::new();
        second
            .declare::<Items>(crate::handler_id!(create_item))
            .returns(Returns::schema::<ItemOut>())
            .takes(Takes::new().body::<NewItem>());

        for registry in [&first, &second] {
            assert_eq!(registry.len(), 1);
            let entry = registry.get_or_create(crate::handler_id!(create_item));
            assert_eq!(entry.schemas().len(), 2);
            assert!(entry.schemas().get(Part::Body).unwrap().ends_with("NewItem"));
            assert!(entry.schemas().get(Part::Response).unwrap().ends_with("ItemOut"));
        }
        assert_eq!(
            first.get_or_create(crate::handler_id!(create_item)).schemas(),
            second.get_or_create(crate::handler_id!(create_item)).schemas()
        );
    }

    #[test]
    fn separate_declarations_merge_into_one_entry() {
        let registry = HandlerRegistry::new();
        registry
            .declare::<Items>(crate::handler_id!(create_item))
            .takes(Takes::new().body::<NewItem>());
        registry
            .declare::<Items>(crate::handler_id!(create_item))
            .route("POST", "/items")
            .unwrap()
            .takes(Takes::new().body::<NewItem>())
            .returns(Returns::schema::<ItemOut>())
            .handle(Items::create_item)
            .unwrap();

        assert_eq!(registry.len(), 1);
        let entry = registry.get_or_create(crate::handler_id!(create_item));
        assert!(entry.has_handler());
        assert_eq!(entry.route().map(|r| r.method), Some(Method::Post));
    }

    #[test]
    fn draining_twice_yields_nothing_the_second_time() {
        let registry = HandlerRegistry::new();
        Items::declare(&registry).unwrap();
        let controller = Arc::new(Items);

        let first = registry.pending_routes(&controller).unwrap();
        let second = registry.pending_routes(&controller).unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn entries_added_between_drains_are_not_skipped() {
        let registry = HandlerRegistry::new();
        let controller = Arc::new(Items);
        assert!(registry.pending_routes(&controller).unwrap().is_empty());

        Items::declare(&registry).unwrap();
        let drained = registry.pending_routes(&controller).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1.id().name(), "get_item");
    }

    #[test]
    fn entries_of_other_modules_stay_pending() {
        let registry = HandlerRegistry::new();
        registry
            .register_route(HandlerId::new("other::module", "list"), "/x", "GET", None)
            .unwrap();
        Items::declare(&registry).unwrap();

        let drained = registry.pending_routes(&Arc::new(Items)).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(registry.entries(), vec![HandlerId::new("other::module", "list")]);
    }

    #[test]
    fn handler_without_route_is_rejected_at_drain() {
        let registry = HandlerRegistry::new();
        registry
            .declare::<Items>(crate::handler_id!(get_item))
            .takes(Takes::new().path::<ItemPath>())
            .returns(Returns::schema::<ItemOut>())
            .handle(Items::get_item)
            .unwrap();

        let err = registry.pending_routes(&Arc::new(Items)).unwrap_err();
        assert!(matches!(err, DeclarationError::IncompleteHandler { .. }));
    }

    #[test]
    fn divergent_schema_bindings_are_rejected() {
        let registry = HandlerRegistry::new();
        Items::declare(&registry).unwrap();
        registry
            .declare::<Items>(crate::handler_id!(get_item))
            .takes(Takes::new().path::<ItemPath>().body::<NewItem>());

        let err = registry.pending_routes(&Arc::new(Items)).unwrap_err();
        assert!(matches!(err, DeclarationError::SchemaMismatch(_)));
    }

    #[test]
    fn handler_declared_outside_controller_module_is_rejected() {
        let registry = HandlerRegistry::new();
        let err = registry
            .declare::<Items>(HandlerId::new("elsewhere", "get_item"))
            .route("GET", "/items/{id}")
            .unwrap()
            .takes(Takes::new().path::<ItemPath>())
            .returns(Returns::schema::<ItemOut>())
            .handle(Items::get_item)
            .unwrap_err();
        assert!(matches!(err, DeclarationError::ForeignHandler { .. }));
    }
}

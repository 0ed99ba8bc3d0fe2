//! Registration records for callable types and their methods.
//!
//! A [`TypeDescriptor`] is what the dispatcher knows about an implementation
//! type: its dotted full name, the interfaces it implements, how to construct
//! it, its methods and its type-level filters. Methods carry declared
//! parameter shapes and an explicit sync or async handler, so nothing is
//! discovered by reflection at request time.

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context as _;
use dynrpc_core::TypeShape;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::middleware::FilterDescriptor;
use super::registry::ServiceLocator;

/// A constructed implementation, type-erased for storage in the pipeline.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Boxed future returned by async handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// Builds an [`Instance`], pulling dependencies from the locator.
pub type Constructor = Arc<dyn Fn(&ServiceLocator) -> anyhow::Result<Instance> + Send + Sync>;

type SyncFn = dyn Fn(Instance, Args) -> anyhow::Result<Value> + Send + Sync;
type AsyncFn = dyn Fn(Instance, Args) -> HandlerFuture + Send + Sync;

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Dotted full name of a Rust type or trait object.
///
/// `dyn my_app::billing::Invoices + Send` becomes `my_app.billing.Invoices`.
#[must_use]
pub fn qualified_name<T: ?Sized>() -> String {
    let raw = type_name::<T>();
    let raw = raw.strip_prefix("dyn ").unwrap_or(raw);
    let raw = raw.split(" + ").next().unwrap_or(raw);
    raw.replace("::", ".")
}

/// Last dotted segment of a full name, ignoring generic arguments.
#[must_use]
pub fn short_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit('.').next().unwrap_or(head)
}

/// Everything before the last dotted segment; empty for unqualified names.
#[must_use]
pub fn namespace_of(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit_once('.').map_or("", |(ns, _)| ns)
}

// ---------------------------------------------------------------------------
// Args
// ---------------------------------------------------------------------------

/// Bound arguments handed to a method handler, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<Value>,
}

impl Args {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw JSON value at `index`.
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Deserializes the argument at `index`. A missing index reads as `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let value = self.values.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .with_context(|| format!("argument {index} is not a valid {}", type_name::<T>()))
    }
}

// ---------------------------------------------------------------------------
// MethodHandler
// ---------------------------------------------------------------------------

/// Terminal callable of a method. Whether it must be awaited is part of its
/// type, so the invoker never has to probe the result.
#[derive(Clone)]
pub enum MethodHandler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("MethodHandler::Sync"),
            Self::Async(_) => f.write_str("MethodHandler::Async"),
        }
    }
}

fn wrong_instance<T>() -> anyhow::Error {
    anyhow::anyhow!("constructed instance is not a {}", type_name::<T>())
}

// ---------------------------------------------------------------------------
// ParamDef
// ---------------------------------------------------------------------------

/// A declared method parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub shape: TypeShape,
    /// Parameters with a default are optional.
    pub default_value: Option<Value>,
    pub description: Option<String>,
}

impl ParamDef {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            default_value: None,
            description: None,
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default_value.is_none()
    }

    /// Declared default, or the shape's zero value.
    #[must_use]
    pub fn fallback_value(&self) -> Value {
        self.default_value
            .clone()
            .unwrap_or_else(|| self.shape.zero_value())
    }
}

// ---------------------------------------------------------------------------
// MethodDescriptor
// ---------------------------------------------------------------------------

/// A callable method of a registered type.
pub struct MethodDescriptor {
    name: String,
    params: Vec<ParamDef>,
    returns: TypeShape,
    handler: Option<MethodHandler>,
    filters: Vec<FilterDescriptor>,
}

impl MethodDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: TypeShape::Unit,
            handler: None,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn returns(mut self, shape: TypeShape) -> Self {
        self.returns = shape;
        self
    }

    /// Adds a method-level filter. Method-level filters run before type-level
    /// and global ones.
    #[must_use]
    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets a synchronous handler operating on a shared `&T`.
    #[must_use]
    pub fn handler<T, R, F>(mut self, f: F) -> Self
    where
        T: Send + Sync + 'static,
        R: Serialize,
        F: Fn(&T, Args) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.handler = Some(MethodHandler::Sync(Arc::new(
            move |instance: Instance, args: Args| {
                let this = instance.downcast_ref::<T>().ok_or_else(wrong_instance::<T>)?;
                let result = f(this, args)?;
                Ok(serde_json::to_value(result)?)
            },
        )));
        self
    }

    /// Sets an asynchronous handler. The instance is handed over as `Arc<T>`
    /// so the returned future can own it.
    #[must_use]
    pub fn handler_async<T, R, F, Fut>(mut self, f: F) -> Self
    where
        T: Send + Sync + 'static,
        R: Serialize + 'static,
        F: Fn(Arc<T>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.handler = Some(MethodHandler::Async(Arc::new(
            move |instance: Instance, args: Args| -> HandlerFuture {
                match instance.downcast::<T>() {
                    Ok(this) => {
                        let fut = f(this, args);
                        Box::pin(async move { Ok(serde_json::to_value(fut.await?)?) })
                    }
                    Err(_) => Box::pin(async { Err(wrong_instance::<T>()) }),
                }
            },
        )));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    #[must_use]
    pub fn return_shape(&self) -> &TypeShape {
        &self.returns
    }

    #[must_use]
    pub fn handler_fn(&self) -> Option<&MethodHandler> {
        self.handler.as_ref()
    }

    #[must_use]
    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("handler", &self.handler)
            .field("filters", &self.filters)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TypeDescriptor
// ---------------------------------------------------------------------------

/// A registered implementation type.
pub struct TypeDescriptor {
    name: String,
    interfaces: Vec<String>,
    constructors: Vec<Constructor>,
    methods: Vec<Arc<MethodDescriptor>>,
    filters: Vec<FilterDescriptor>,
}

impl TypeDescriptor {
    /// Descriptor named after the Rust type `T`.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self::named(qualified_name::<T>())
    }

    /// Descriptor with an explicit dotted full name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interfaces: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Declares an implemented interface by full name.
    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
        self
    }

    /// Declares an implemented trait, e.g. `implements_trait::<dyn Greeter>()`.
    #[must_use]
    pub fn implements_trait<I: ?Sized>(self) -> Self {
        self.implements(qualified_name::<I>())
    }

    /// Adds a constructor. Exactly one must be declared for the type to be
    /// callable.
    #[must_use]
    pub fn constructor<T, F>(mut self, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceLocator) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.constructors
            .push(Arc::new(move |locator: &ServiceLocator| -> anyhow::Result<Instance> {
                Ok(Arc::new(f(locator)?))
            }));
        self
    }

    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Adds a type-level filter, applied to every method of this type.
    #[must_use]
    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    #[must_use]
    pub fn constructor_count(&self) -> usize {
        self.constructors.len()
    }

    /// The single constructor, if exactly one is declared.
    #[must_use]
    pub fn sole_constructor(&self) -> Option<&Constructor> {
        match self.constructors.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    #[must_use]
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    #[must_use]
    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("interfaces", &self.interfaces)
            .field("constructors", &self.constructors.len())
            .field(
                "methods",
                &self.methods.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("filters", &self.filters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    trait Greeter {}

    struct Plain;

    #[test]
    fn qualified_name_strips_dyn_and_bounds() {
        let name = qualified_name::<dyn Greeter + Send>();
        assert_eq!(name, "dynrpc_server.service.descriptor.tests.Greeter");
        assert!(!name.starts_with("dyn "));
    }

    #[test]
    fn short_and_namespace_split_on_last_dot() {
        assert_eq!(short_name("acme.billing.Invoices"), "Invoices");
        assert_eq!(namespace_of("acme.billing.Invoices"), "acme.billing");
        assert_eq!(short_name("Invoices"), "Invoices");
        assert_eq!(namespace_of("Invoices"), "");
        assert_eq!(short_name("acme.Page<acme.Row>"), "Page");
    }

    #[test]
    fn args_deserialize_by_index() {
        let args = Args::new(vec![json!("Ada"), json!(3)]);
        assert_eq!(args.get::<String>(0).unwrap(), "Ada");
        assert_eq!(args.get::<u32>(1).unwrap(), 3);
        assert_eq!(args.get::<Option<u32>>(7).unwrap(), None);
        assert!(args.get::<u32>(0).is_err());
    }

    #[test]
    fn param_fallback_prefers_default() {
        let with_default = ParamDef::new("n", TypeShape::int()).default_value(5);
        let without = ParamDef::new("n", TypeShape::int());
        assert_eq!(with_default.fallback_value(), json!(5));
        assert_eq!(without.fallback_value(), json!(0));
        assert!(!with_default.is_required());
        assert!(without.is_required());
    }

    #[test]
    fn implements_is_idempotent() {
        let ty = TypeDescriptor::of::<Plain>()
            .implements("acme.IFoo")
            .implements("acme.IFoo");
        assert_eq!(ty.interfaces(), ["acme.IFoo".to_string()]);
        assert_eq!(ty.short_name(), "Plain");
    }

    #[test]
    fn sole_constructor_requires_exactly_one() {
        let none = TypeDescriptor::named("a.T");
        assert!(none.sole_constructor().is_none());

        let one = TypeDescriptor::named("a.T").constructor(|_| Ok(Plain));
        assert!(one.sole_constructor().is_some());

        let two = TypeDescriptor::named("a.T")
            .constructor(|_| Ok(Plain))
            .constructor(|_| Ok(Plain));
        assert_eq!(two.constructor_count(), 2);
        assert!(two.sole_constructor().is_none());
    }

    #[test]
    fn sync_handler_rejects_foreign_instance() {
        let method = MethodDescriptor::new("Run").handler(|_: &Plain, _| Ok(1));
        let Some(MethodHandler::Sync(f)) = method.handler_fn().cloned() else {
            panic!("expected sync handler");
        };
        let foreign: Instance = Arc::new(42_u8);
        assert!(f(foreign, Args::default()).is_err());
        let own: Instance = Arc::new(Plain);
        assert_eq!(f(own, Args::default()).unwrap(), json!(1));
    }
}

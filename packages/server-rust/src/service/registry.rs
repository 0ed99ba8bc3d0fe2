use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;

use super::descriptor::{namespace_of, qualified_name, short_name, MethodDescriptor, TypeDescriptor};
use super::middleware::{FilterDescriptor, ResponseCacheFilter};

// ---------------------------------------------------------------------------
// ServiceLocator
// ---------------------------------------------------------------------------

/// Type-keyed store of shared infrastructure (token service, caches,
/// configuration) that constructors and filter factories pull from.
pub struct ServiceLocator {
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceLocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_type: DashMap::new(),
        }
    }

    /// Stores `value`, replacing any previous value of the same type.
    pub fn provide<T: Send + Sync + 'static>(&self, value: T) {
        self.provide_arc(Arc::new(value));
    }

    pub fn provide_arc<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        self.by_type.insert(TypeId::of::<T>(), value);
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Like [`get`](Self::get), but a missing value is an error.
    ///
    /// # Errors
    ///
    /// Returns an error naming `T` when nothing of that type was provided.
    pub fn require<T: Send + Sync + 'static>(&self) -> anyhow::Result<Arc<T>> {
        self.get::<T>()
            .ok_or_else(|| anyhow::anyhow!("no {} has been provided", std::any::type_name::<T>()))
    }

    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }
}

impl Default for ServiceLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("entries", &self.by_type.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Startup-time registration errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("interface `{name}` is not registered")]
    UnknownInterface { name: String },
    #[error("interface `{name}` is ambiguous; candidates: {}", .candidates.join(", "))]
    AmbiguousInterface {
        name: String,
        candidates: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// ServerOptions
// ---------------------------------------------------------------------------

/// Startup registration. Types are added first, then interfaces, namespaces
/// and filters are registered against them; [`build`](Self::build) freezes the
/// result into a [`Registry`]. Every registration is idempotent.
pub struct ServerOptions {
    loaded: Vec<Arc<TypeDescriptor>>,
    interfaces: BTreeSet<String>,
    filters: Vec<FilterDescriptor>,
    route_prefix: String,
    default_interface: Option<String>,
    cache_keys: BTreeSet<String>,
}

impl ServerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            loaded: Vec::new(),
            interfaces: BTreeSet::new(),
            filters: Vec::new(),
            route_prefix: "/".to_string(),
            default_interface: None,
            cache_keys: BTreeSet::new(),
        }
    }

    /// Makes a type known. It becomes callable once one of its interfaces is
    /// registered.
    pub fn add_type(&mut self, ty: TypeDescriptor) -> &mut Self {
        if !self.loaded.iter().any(|t| t.name() == ty.name()) {
            self.loaded.push(Arc::new(ty));
        }
        self
    }

    /// Path at which RPC calls are accepted. A leading `/` is added if missing.
    pub fn set_route_prefix(&mut self, prefix: &str) -> &mut Self {
        let trimmed = prefix.trim();
        self.route_prefix = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Interface used when a request names none and the target is not found
    /// in the flat type index.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownInterface`] when no registered interface
    /// matches `name` by full or short name, and
    /// [`RegistryError::AmbiguousInterface`] when several match by short name.
    pub fn set_default_interface(&mut self, name: &str) -> Result<&mut Self, RegistryError> {
        let full = match_name(name, self.interfaces.iter().map(String::as_str)).map_err(
            |candidates| {
                if candidates.is_empty() {
                    RegistryError::UnknownInterface {
                        name: name.to_string(),
                    }
                } else {
                    RegistryError::AmbiguousInterface {
                        name: name.to_string(),
                        candidates,
                    }
                }
            },
        )?;
        self.default_interface = Some(full);
        Ok(self)
    }

    /// Registers an interface by full name. A short name is accepted when it
    /// identifies exactly one interface declared by the added types.
    pub fn register_interface(&mut self, name: &str) -> &mut Self {
        let declared: BTreeSet<&str> = self
            .loaded
            .iter()
            .flat_map(|t| t.interfaces().iter().map(String::as_str))
            .collect();
        let full = match_name(name, declared.iter().copied()).unwrap_or_else(|_| name.to_string());
        tracing::debug!(interface = %full, "registered interface");
        self.interfaces.insert(full);
        self
    }

    /// Registers the trait `I`, e.g. `register_interface_of::<dyn Greeter>()`.
    pub fn register_interface_of<I: ?Sized>(&mut self) -> &mut Self {
        self.register_interface(&qualified_name::<I>())
    }

    /// Registers every declared interface whose namespace is exactly `namespace`.
    pub fn register_namespace(&mut self, namespace: &str) -> &mut Self {
        let matching: Vec<String> = self
            .loaded
            .iter()
            .flat_map(|t| t.interfaces().iter())
            .filter(|iface| namespace_of(iface) == namespace)
            .cloned()
            .collect();
        if matching.is_empty() {
            tracing::warn!(namespace, "namespace matched no declared interfaces");
        }
        self.interfaces.extend(matching);
        self
    }

    /// Adds a global filter, applied after method- and type-level filters.
    pub fn register_filter(&mut self, filter: FilterDescriptor) -> &mut Self {
        if !self.filters.iter().any(|f| f.name() == filter.name()) {
            self.filters.push(filter);
        }
        self
    }

    /// Enables response caching for the given `Type.Method` or `Type` keys
    /// (short or full type names, case-insensitive).
    pub fn enable_response_cache<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cache_keys
            .extend(keys.into_iter().map(|k| k.as_ref().trim().to_ascii_lowercase()));
        self.register_filter(ResponseCacheFilter::descriptor())
    }

    /// Builds the interface and flat type indexes.
    #[must_use]
    pub fn build(self) -> Registry {
        let mut interfaces: BTreeMap<String, Vec<Arc<TypeDescriptor>>> = BTreeMap::new();
        let mut types: BTreeMap<String, Arc<TypeDescriptor>> = BTreeMap::new();

        for iface in &self.interfaces {
            let implementors: Vec<Arc<TypeDescriptor>> = self
                .loaded
                .iter()
                .filter(|t| t.interfaces().iter().any(|i| i == iface))
                .cloned()
                .collect();
            if implementors.is_empty() {
                tracing::warn!(interface = %iface, "registered interface has no implementations");
            }
            for ty in &implementors {
                types.entry(ty.name().to_string()).or_insert_with(|| Arc::clone(ty));
            }
            interfaces.insert(iface.clone(), implementors);
        }

        tracing::info!(
            interfaces = interfaces.len(),
            types = types.len(),
            prefix = %self.route_prefix,
            "registry built"
        );

        Registry {
            interfaces,
            types,
            filters: self.filters,
            route_prefix: self.route_prefix,
            default_interface: self.default_interface,
            cache_keys: self.cache_keys,
            filter_cache: DashMap::new(),
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact full name (case-insensitive) first, then a unique short name.
/// `Err` carries the ambiguous candidates, or nothing when none matched.
fn match_name<'a>(
    name: &str,
    candidates: impl Iterator<Item = &'a str> + Clone,
) -> Result<String, Vec<String>> {
    if let Some(exact) = candidates.clone().find(|c| c.eq_ignore_ascii_case(name)) {
        return Ok(exact.to_string());
    }
    let by_short: Vec<String> = candidates
        .filter(|c| short_name(c).eq_ignore_ascii_case(name))
        .map(str::to_string)
        .collect();
    match by_short.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(by_short),
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Frozen registration state read by every request.
///
/// Only the per-method filter lists are filled lazily; each is computed at
/// most once and then shared.
pub struct Registry {
    interfaces: BTreeMap<String, Vec<Arc<TypeDescriptor>>>,
    types: BTreeMap<String, Arc<TypeDescriptor>>,
    filters: Vec<FilterDescriptor>,
    route_prefix: String,
    default_interface: Option<String>,
    cache_keys: BTreeSet<String>,
    filter_cache: DashMap<(String, String), Arc<[FilterDescriptor]>>,
}

impl Registry {
    #[must_use]
    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    #[must_use]
    pub fn default_interface(&self) -> Option<&str> {
        self.default_interface.as_deref()
    }

    /// Registered interfaces with their implementations.
    pub fn interfaces(&self) -> impl Iterator<Item = (&str, &[Arc<TypeDescriptor>])> + Clone {
        self.interfaces
            .iter()
            .map(|(name, types)| (name.as_str(), types.as_slice()))
    }

    /// Every type implementing at least one registered interface.
    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> + Clone {
        self.types.values()
    }

    #[must_use]
    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Lowercased response cache keys.
    #[must_use]
    pub fn cache_keys(&self) -> &BTreeSet<String> {
        &self.cache_keys
    }

    /// Effective filters for a method: method-level, then type-level, then
    /// global. A filter named at several levels keeps its first position.
    pub fn filters_for(
        &self,
        target: &TypeDescriptor,
        method: &MethodDescriptor,
    ) -> Arc<[FilterDescriptor]> {
        let key = (target.name().to_string(), method.name().to_string());
        if let Some(hit) = self.filter_cache.get(&key) {
            return Arc::clone(hit.value());
        }
        let entry = self.filter_cache.entry(key).or_insert_with(|| {
            let mut seen = BTreeSet::new();
            method
                .filters()
                .iter()
                .chain(target.filters())
                .chain(&self.filters)
                .filter(|f| seen.insert(f.name().to_string()))
                .cloned()
                .collect()
        });
        Arc::clone(entry.value())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::middleware::testing::NamedFilter;

    struct Config {
        greeting: &'static str,
    }

    fn greeter(name: &str) -> TypeDescriptor {
        TypeDescriptor::named(name)
            .implements("acme.IGreeter")
            .constructor(|_| Ok(()))
    }

    #[test]
    fn locator_round_trips_by_type() {
        let locator = ServiceLocator::new();
        assert!(locator.get::<Config>().is_none());
        assert!(locator.require::<Config>().is_err());

        locator.provide(Config { greeting: "hi" });
        assert!(locator.contains::<Config>());
        assert_eq!(locator.require::<Config>().unwrap().greeting, "hi");
    }

    #[test]
    fn locator_debug_reports_entry_count() {
        let locator = ServiceLocator::new();
        locator.provide(Config { greeting: "hi" });
        assert_eq!(format!("{locator:?}"), "ServiceLocator { entries: 1 }");
    }

    #[test]
    fn build_indexes_registered_interfaces_only() {
        let mut options = ServerOptions::new();
        options
            .add_type(greeter("acme.EnglishGreeter"))
            .add_type(TypeDescriptor::named("acme.Hidden").implements("acme.IHidden"))
            .register_interface("acme.IGreeter");
        let registry = options.build();

        assert_eq!(registry.interface_count(), 1);
        assert_eq!(registry.type_count(), 1);
        let names: Vec<&str> = registry.types().map(|t| t.name()).collect();
        assert_eq!(names, ["acme.EnglishGreeter"]);
    }

    #[test]
    fn registrations_are_idempotent() {
        let mut options = ServerOptions::new();
        options
            .add_type(greeter("acme.EnglishGreeter"))
            .add_type(greeter("acme.EnglishGreeter"))
            .register_interface("acme.IGreeter")
            .register_interface("IGreeter")
            .register_filter(NamedFilter::descriptor("audit"))
            .register_filter(NamedFilter::descriptor("audit"));
        let registry = options.build();

        assert_eq!(registry.interface_count(), 1);
        let (_, implementors) = registry.interfaces().next().unwrap();
        assert_eq!(implementors.len(), 1);
        assert_eq!(registry.filters.len(), 1);
    }

    #[test]
    fn register_namespace_matches_exact_namespace() {
        let mut options = ServerOptions::new();
        options
            .add_type(TypeDescriptor::named("acme.a.Impl").implements("acme.a.IOne"))
            .add_type(TypeDescriptor::named("acme.b.Impl").implements("acme.a.b.ITwo"))
            .register_namespace("acme.a");
        let registry = options.build();

        let names: Vec<&str> = registry.interfaces().map(|(n, _)| n).collect();
        assert_eq!(names, ["acme.a.IOne"]);
    }

    #[test]
    fn route_prefix_gains_leading_slash() {
        let mut options = ServerOptions::new();
        assert_eq!(options.route_prefix, "/");
        options.set_route_prefix("api/rpc");
        assert_eq!(options.route_prefix, "/api/rpc");
    }

    #[test]
    fn default_interface_must_be_registered() {
        let mut options = ServerOptions::new();
        options.add_type(greeter("acme.EnglishGreeter"));
        let err = options.set_default_interface("IGreeter").err().unwrap();
        assert!(matches!(err, RegistryError::UnknownInterface { .. }));

        options.register_interface("acme.IGreeter");
        options.set_default_interface("igreeter").unwrap();
        assert_eq!(options.build().default_interface(), Some("acme.IGreeter"));
    }

    #[test]
    fn filter_order_is_method_type_global_and_memoized() {
        let method = MethodDescriptor::new("Run").filter(NamedFilter::descriptor("m"));
        let ty = TypeDescriptor::named("acme.Job")
            .implements("acme.IJob")
            .filter(NamedFilter::descriptor("t"))
            .filter(NamedFilter::descriptor("m"))
            .method(method);

        let mut options = ServerOptions::new();
        options
            .add_type(ty)
            .register_interface("acme.IJob")
            .register_filter(NamedFilter::descriptor("g"));
        let registry = options.build();

        let ty = registry.types().next().unwrap();
        let method = &ty.methods()[0];
        let first = registry.filters_for(ty, method);
        let names: Vec<&str> = first.iter().map(FilterDescriptor::name).collect();
        assert_eq!(names, ["m", "t", "g"]);

        let second = registry.filters_for(ty, method);
        assert!(Arc::ptr_eq(&first, &second));
    }
}

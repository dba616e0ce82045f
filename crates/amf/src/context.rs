//! Type registry and codec limits.
//!
//! A [`SerializationContext`] is built once, then shared read-only by every
//! encoder and decoder that uses it.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AmfReadError, RegistryError};
use crate::shape::AmfClass;

/// Creates a default instance of a registered type.
pub type Factory = fn() -> Box<dyn AmfClass>;

/// What the decoder does with a class name nobody registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTypePolicy {
    /// Materialize a named property bag.
    #[default]
    Fallback,
    /// Fail with [`AmfReadError::UnknownType`].
    Reject,
}

/// Tunable limits of a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// What to do with class names no local type is registered for.
    pub unknown_types: UnknownTypePolicy,
    /// Largest single allocation a length prefix may request, in bytes.
    pub max_allocation: usize,
    /// Deepest value nesting the decoder accepts.
    pub max_depth: usize,
}

impl ContextOptions {
    /// Default of [`max_allocation`](Self::max_allocation), 16 MiB.
    pub const DEFAULT_MAX_ALLOCATION: usize = 16 * 1024 * 1024;
    /// Default of [`max_depth`](Self::max_depth).
    pub const DEFAULT_MAX_DEPTH: usize = 256;
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            unknown_types: UnknownTypePolicy::Fallback,
            max_allocation: Self::DEFAULT_MAX_ALLOCATION,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

/// A registered local type.
pub struct ClassEntry {
    /// Name the type is written under.
    pub canonical: String,
    /// Extra names accepted on decode.
    pub aliases: Vec<String>,
    /// The registered local type.
    pub type_id: TypeId,
    factory: Factory,
}

impl ClassEntry {
    /// Create a default instance.
    pub fn instantiate(&self) -> Box<dyn AmfClass> {
        (self.factory)()
    }
}

impl fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassEntry")
            .field("canonical", &self.canonical)
            .field("aliases", &self.aliases)
            .field("type_id", &self.type_id)
            .finish()
    }
}

/// A registration request, for callers that cannot name the type statically.
#[derive(Debug, Clone)]
pub struct ClassRegistration {
    /// Name the type is written under.
    pub canonical: String,
    /// Extra names accepted on decode.
    pub aliases: Vec<String>,
    /// Constructor of the local type. Registering without one fails.
    pub factory: Option<Factory>,
}

impl ClassRegistration {
    /// Register `factory` under `canonical`.
    pub fn new(canonical: impl Into<String>, factory: Factory) -> Self {
        Self {
            canonical: canonical.into(),
            aliases: Vec::new(),
            factory: Some(factory),
        }
    }

    /// Accept `alias` on decode as well.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// Bidirectional wire name <-> local type mapping.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_name: HashMap<String, Arc<ClassEntry>>,
    by_type: HashMap<TypeId, Arc<ClassEntry>>,
}

impl TypeRegistry {
    /// Find the entry for a canonical name or alias.
    pub fn lookup(&self, wire_name: &str) -> Option<&ClassEntry> {
        self.by_name.get(wire_name).map(Arc::as_ref)
    }

    /// The name a local type is written under.
    pub fn canonical_name(&self, type_id: TypeId) -> Option<&str> {
        self.by_type.get(&type_id).map(|e| e.canonical.as_str())
    }

    /// Create a fresh instance for a wire name.
    pub fn instantiate(&self, wire_name: &str) -> Option<Box<dyn AmfClass>> {
        self.lookup(wire_name).map(ClassEntry::instantiate)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Whether no type is registered.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    fn insert(&mut self, registration: ClassRegistration) -> Result<(), RegistryError> {
        let ClassRegistration {
            canonical,
            aliases,
            factory,
        } = registration;

        if canonical.is_empty() || aliases.iter().any(String::is_empty) {
            return Err(RegistryError::EmptyName);
        }
        let factory = factory.ok_or_else(|| RegistryError::MissingFactory(canonical.clone()))?;
        let type_id = factory().as_any().type_id();

        for name in std::iter::once(&canonical).chain(&aliases) {
            if let Some(existing) = self.by_name.get(name) {
                if existing.type_id != type_id {
                    return Err(RegistryError::DuplicateAlias(name.clone()));
                }
            }
        }

        debug!(canonical = %canonical, aliases = ?aliases, "registering class");

        let entry = Arc::new(ClassEntry {
            canonical: canonical.clone(),
            aliases: aliases.clone(),
            type_id,
            factory,
        });
        for name in std::iter::once(canonical).chain(aliases) {
            self.by_name.insert(name, entry.clone());
        }
        // Re-registering a type moves its canonical name; existing aliases keep resolving.
        self.by_type.insert(type_id, entry);
        Ok(())
    }
}

/// Registry plus limits, shared by every encoder and decoder of a session.
#[derive(Debug, Default)]
pub struct SerializationContext {
    registry: TypeRegistry,
    options: ContextOptions,
}

impl SerializationContext {
    /// Start building a context.
    pub fn builder() -> SerializationContextBuilder {
        SerializationContextBuilder::new()
    }

    /// The types known to this context.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// The options this context was built with.
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Whether unknown classes decode as property bags.
    pub fn fallback_enabled(&self) -> bool {
        self.options.unknown_types == UnknownTypePolicy::Fallback
    }

    /// Deepest value nesting the decoder accepts.
    pub fn max_depth(&self) -> usize {
        self.options.max_depth
    }

    /// Create the local instance for a wire class name.
    ///
    /// `Ok(None)` means the object is materialized as a property bag: the name
    /// is empty, or unknown with fallback enabled.
    pub fn instantiate(&self, name: &str) -> Result<Option<Box<dyn AmfClass>>, AmfReadError> {
        if name.is_empty() {
            return Ok(None);
        }
        if let Some(instance) = self.registry.instantiate(name) {
            return Ok(Some(instance));
        }
        if !self.fallback_enabled() {
            return Err(AmfReadError::UnknownType(name.to_owned()));
        }

        debug!(class = name, "materializing unregistered class as a property bag");
        Ok(None)
    }

    /// Fail if `len` elements of `elem_size` bytes exceed the allocation ceiling.
    pub fn check_allocation(&self, len: usize, elem_size: usize) -> Result<(), AmfReadError> {
        let limit = self.options.max_allocation;
        let requested = len.saturating_mul(elem_size.max(1));
        if requested > limit {
            return Err(AmfReadError::AllocationLimitExceeded { requested, limit });
        }
        Ok(())
    }
}

/// Builder for [`SerializationContext`].
///
/// Registration errors are collected and reported by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct SerializationContextBuilder {
    registrations: Vec<ClassRegistration>,
    options: ContextOptions,
}

impl SerializationContextBuilder {
    /// An empty builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under a canonical wire name.
    pub fn register<T: AmfClass + Default>(self, canonical: impl Into<String>) -> Self {
        self.register_with_aliases::<T>(canonical, &[])
    }

    /// Register `T` under a canonical wire name plus decode-only aliases.
    pub fn register_with_aliases<T: AmfClass + Default>(
        mut self,
        canonical: impl Into<String>,
        aliases: &[&str],
    ) -> Self {
        self.registrations.push(ClassRegistration {
            canonical: canonical.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            factory: Some(|| -> Box<dyn AmfClass> { Box::new(T::default()) }),
        });
        self
    }

    /// Add a registration built at runtime.
    pub fn register_class(mut self, registration: ClassRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    /// Materialize unknown classes as bags (`true`) or reject them.
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.options.unknown_types = if enabled {
            UnknownTypePolicy::Fallback
        } else {
            UnknownTypePolicy::Reject
        };
        self
    }

    /// Set the allocation ceiling, in bytes.
    pub fn max_allocation(mut self, bytes: usize) -> Self {
        self.options.max_allocation = bytes;
        self
    }

    /// Set the nesting ceiling.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.options.max_depth = depth;
        self
    }

    /// Validate the registrations and build the context.
    pub fn build(self) -> Result<SerializationContext, RegistryError> {
        let mut registry = TypeRegistry::default();
        for registration in self.registrations {
            registry.insert(registration)?;
        }

        debug!(
            classes = registry.len(),
            options = ?self.options,
            "serialization context built"
        );

        Ok(SerializationContext {
            registry,
            options: self.options,
        })
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::shape::Shape;
    use crate::{Value, impl_amf_class};

    #[derive(Debug, Default, PartialEq)]
    struct Alpha {
        n: i32,
    }

    fn alpha_shape() -> &'static Shape<Alpha> {
        static SHAPE: OnceLock<Shape<Alpha>> = OnceLock::new();
        SHAPE.get_or_init(|| {
            Shape::<Alpha>::builder("test.Alpha")
                .field("n", |a| a.n.into(), |a, v| Ok(a.n = v.convert()?))
                .build()
        })
    }

    impl_amf_class!(Alpha, alpha_shape());

    #[derive(Debug, Default, PartialEq)]
    struct Beta;

    fn beta_shape() -> &'static Shape<Beta> {
        static SHAPE: OnceLock<Shape<Beta>> = OnceLock::new();
        SHAPE.get_or_init(|| Shape::<Beta>::builder("test.Beta").build())
    }

    impl_amf_class!(Beta, beta_shape());

    #[test]
    fn test_lookup_by_canonical_and_alias() {
        let ctx = SerializationContext::builder()
            .register_with_aliases::<Alpha>("flex.Alpha", &["mx.Alpha"])
            .build()
            .unwrap();
        let registry = ctx.registry();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup("mx.Alpha").unwrap().canonical,
            "flex.Alpha"
        );
        assert_eq!(
            registry.canonical_name(TypeId::of::<Alpha>()),
            Some("flex.Alpha")
        );
        assert!(registry.lookup("test.Alpha").is_none());

        let instance = registry.instantiate("flex.Alpha").unwrap();
        assert_eq!(instance.get_member("n"), Some(Value::Integer(0)));
        assert!(instance.as_any().is::<Alpha>());
    }

    #[test]
    fn test_build_errors() {
        let err = SerializationContext::builder()
            .register::<Alpha>("")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyName);

        let err = SerializationContext::builder()
            .register_class(ClassRegistration {
                canonical: "x.Y".into(),
                aliases: vec![],
                factory: None,
            })
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingFactory("x.Y".into()));

        let err = SerializationContext::builder()
            .register::<Alpha>("shared")
            .register::<Beta>("shared")
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAlias("shared".into()));

        let err = SerializationContext::builder()
            .register::<Alpha>("a")
            .register_class(ClassRegistration::new("b", || Box::new(Beta)).alias("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAlias("a".into()));
    }

    #[test]
    fn test_reregistering_same_type_is_allowed() {
        let ctx = SerializationContext::builder()
            .register::<Alpha>("a")
            .register::<Alpha>("a")
            .build()
            .unwrap();
        assert_eq!(ctx.registry().len(), 1);
    }

    #[test]
    fn test_check_allocation() {
        let ctx = SerializationContext::builder()
            .max_allocation(1024)
            .build()
            .unwrap();

        assert!(ctx.check_allocation(1024, 1).is_ok());
        assert!(ctx.check_allocation(128, 8).is_ok());
        assert!(matches!(
            ctx.check_allocation(129, 8),
            Err(AmfReadError::AllocationLimitExceeded {
                requested: 1032,
                limit: 1024
            })
        ));
        assert!(ctx.check_allocation(usize::MAX, 8).is_err());
    }

    #[test]
    fn test_options() {
        let ctx = SerializationContext::default();
        assert!(ctx.fallback_enabled());
        assert_eq!(ctx.max_depth(), 256);
        assert_eq!(ctx.options().max_allocation, 16 * 1024 * 1024);

        let ctx = SerializationContext::builder()
            .fallback(false)
            .max_depth(8)
            .build()
            .unwrap();
        assert!(!ctx.fallback_enabled());
        assert_eq!(ctx.max_depth(), 8);
    }

    #[test]
    fn test_instantiate_policy() {
        let ctx = SerializationContext::builder()
            .register::<Alpha>("flex.Alpha")
            .build()
            .unwrap();
        assert!(ctx.instantiate("flex.Alpha").unwrap().is_some());
        assert!(ctx.instantiate("").unwrap().is_none());
        assert!(ctx.instantiate("other.Type").unwrap().is_none());

        let strict = SerializationContext::builder().fallback(false).build().unwrap();
        assert!(strict.instantiate("").unwrap().is_none());
        assert!(matches!(
            strict.instantiate("other.Type"),
            Err(AmfReadError::UnknownType(name)) if name == "other.Type"
        ));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ContextOptions =
            serde_json::from_str(r#"{"unknown_types":"reject"}"#).unwrap();
        assert_eq!(options.unknown_types, UnknownTypePolicy::Reject);
        assert_eq!(options.max_depth, ContextOptions::DEFAULT_MAX_DEPTH);
    }
}

//! Object shapes: how a local type maps onto a wire class.
//!
//! A local type describes itself once, through a [`ShapeBuilder`], as an
//! ordered list of `(wire name, getter, setter)` entries. The built [`Shape`]
//! is cached in a `static OnceLock` and [`impl_amf_class!`](crate::impl_amf_class)
//! turns it into an [`AmfClass`] implementation.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::amf3::{Amf3Decoder, Amf3Encoder};
use crate::context::TypeRegistry;
use crate::value::{AmfObject, Value};
use crate::{AmfReadError, AmfWriteError};

/// Members never written for exception-like types.
pub const EXCEPTION_DENYLIST: &[&str] = &[
    "stackTrace",
    "backtrace",
    "source",
    "targetSite",
    "helpLink",
    "hResult",
    "innerException",
];

/// The AMF3 trait of a class.
///
/// Hashed by value, so two instances with the same shape share one trait
/// table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ClassInfo {
    /// Wire class name, empty for anonymous objects.
    pub name: String,
    /// Sealed member names in wire order.
    pub members: Vec<String>,
    /// Whether members outside `members` follow the sealed ones.
    pub dynamic: bool,
    /// Whether the payload is written by the type itself.
    pub externalizable: bool,
}

impl ClassInfo {
    /// An open shape with no sealed members.
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            dynamic: true,
            externalizable: false,
        }
    }

    /// Whether the class has no name.
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    /// Whether `name` is a sealed member.
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..self.clone()
        }
    }
}

/// The object-safe interface of a registered local type.
///
/// Most types implement this through [`impl_amf_class!`](crate::impl_amf_class)
/// and only override the hooks their [`ShapeKind`] needs.
pub trait AmfClass: Any + Send + Sync + fmt::Debug {
    /// The shape this instance is written with.
    fn class_info(&self) -> &ClassInfo;

    /// Read a sealed member by wire name.
    fn get_member(&self, name: &str) -> Option<Value>;

    /// Assign a sealed member. Called only with names listed in `class_info`.
    fn set_member(&mut self, name: &str, value: Value) -> Result<(), AmfReadError>;

    /// Dynamic members in insertion order. Dynamic types must return `Some`.
    fn dynamic_members(&self) -> Option<Vec<(String, Value)>> {
        None
    }

    /// Accept a member the sealed shape does not declare.
    fn set_dynamic_member(&mut self, name: String, value: Value) -> Result<(), AmfReadError> {
        warn!(
            class = %self.class_info().name,
            member = %name,
            kind = value.kind(),
            "dropping member unknown to the local type"
        );
        Ok(())
    }

    /// Write the payload of an externalizable type.
    fn write_external(&self, output: &mut Amf3Encoder<'_>) -> Result<(), AmfWriteError> {
        let _ = output;
        Err(AmfWriteError::MissingExternalHook(
            self.class_info().name.clone(),
        ))
    }

    /// Read the payload of an externalizable type.
    fn read_external(&mut self, input: &mut Amf3Decoder<'_>) -> Result<(), AmfReadError> {
        let _ = input;
        Err(AmfReadError::MissingExternalHook(
            self.class_info().name.clone(),
        ))
    }

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Value equality against another instance of any class.
    fn eq_class(&self, other: &dyn AmfClass) -> bool;
}

/// How a shape is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeKind {
    /// Sealed members only.
    #[default]
    Reflected,
    /// Sealed members minus [`EXCEPTION_DENYLIST`].
    Exception,
    /// Sealed members followed by dynamic members.
    Dynamic,
    /// The payload is written by the type's hooks.
    Externalizable,
}

type Getter<T> = fn(&T) -> Value;
type Setter<T> = fn(&mut T, Value) -> Result<(), AmfReadError>;

struct Field<T> {
    local: &'static str,
    wire: &'static str,
    ignored: bool,
    get: Getter<T>,
    set: Setter<T>,
}

/// The cached member table of a local type.
pub struct Shape<T> {
    info: ClassInfo,
    fields: Vec<Field<T>>,
}

impl<T> Shape<T> {
    /// Start describing the class `name`.
    ///
    /// Name the type up front, `Shape::<T>::builder(..)`, so the field
    /// closures can see `T`.
    pub fn builder(name: impl Into<String>) -> ShapeBuilder<T> {
        ShapeBuilder::new(name)
    }

    /// The trait this shape is written with.
    pub fn info(&self) -> &ClassInfo {
        &self.info
    }

    fn field(&self, wire: &str) -> Option<&Field<T>> {
        self.fields.iter().find(|f| f.wire == wire)
    }

    /// Read a member of `instance` by wire name.
    pub fn get(&self, instance: &T, member: &str) -> Option<Value> {
        self.field(member).map(|f| (f.get)(instance))
    }

    /// Assign a member, adding class and member context to setter errors.
    pub fn set(&self, instance: &mut T, member: &str, value: Value) -> Result<(), AmfReadError> {
        let Some(field) = self.field(member) else {
            debug!(class = %self.info.name, member, "no setter for member");
            return Ok(());
        };

        (field.set)(instance, value).map_err(|e| AmfReadError::Member {
            class: self.info.name.clone(),
            member: member.to_owned(),
            source: Box::new(e),
        })
    }
}

impl<T> fmt::Debug for Shape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("info", &self.info)
            .field(
                "locals",
                &self.fields.iter().map(|f| f.local).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builds a [`Shape`].
///
/// ```
/// use amf::Shape;
///
/// struct Point {
///     x: f64,
///     y: f64,
/// }
///
/// let shape = Shape::<Point>::builder("com.example.Point")
///     .field("x", |p| p.x.into(), |p, v| Ok(p.x = v.convert()?))
///     .field("y", |p| p.y.into(), |p, v| Ok(p.y = v.convert()?))
///     .build();
///
/// assert_eq!(shape.info().members, vec!["x", "y"]);
/// ```
pub struct ShapeBuilder<T> {
    name: String,
    kind: ShapeKind,
    fields: Vec<Field<T>>,
}

impl<T> ShapeBuilder<T> {
    /// Describe the class `name`, reflected by default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ShapeKind::Reflected,
            fields: Vec::new(),
        }
    }

    /// Set how the shape is written.
    pub fn kind(mut self, kind: ShapeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Write dynamic members after the sealed ones.
    pub fn dynamic(self) -> Self {
        self.kind(ShapeKind::Dynamic)
    }

    /// Let the type write its own payload.
    pub fn externalizable(self) -> Self {
        self.kind(ShapeKind::Externalizable)
    }

    /// Leave [`EXCEPTION_DENYLIST`] members off the wire.
    pub fn exception(self) -> Self {
        self.kind(ShapeKind::Exception)
    }

    /// Declare a member. The wire name defaults to `name`.
    pub fn field(mut self, name: &'static str, get: Getter<T>, set: Setter<T>) -> Self {
        self.fields.push(Field {
            local: name,
            wire: name,
            ignored: false,
            get,
            set,
        });
        self
    }

    /// Override the wire name of the last declared member.
    pub fn rename(mut self, wire: &'static str) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.wire = wire;
        }
        self
    }

    /// Keep the last declared member off the wire.
    pub fn ignore(mut self) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.ignored = true;
        }
        self
    }

    /// Finish the member table.
    pub fn build(self) -> Shape<T> {
        let Self { name, kind, fields } = self;

        if kind == ShapeKind::Externalizable {
            return Shape {
                info: ClassInfo {
                    name,
                    members: Vec::new(),
                    dynamic: false,
                    externalizable: true,
                },
                fields: Vec::new(),
            };
        }

        let mut fields: Vec<Field<T>> = fields
            .into_iter()
            .filter(|f| !f.ignored)
            .filter(|f| {
                kind != ShapeKind::Exception
                    || !(EXCEPTION_DENYLIST.contains(&f.wire)
                        || EXCEPTION_DENYLIST.contains(&f.local))
            })
            .collect();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for field in &fields {
            *seen.entry(field.wire).or_default() += 1;
        }
        fields.retain(|f| {
            let unique = seen.get(f.wire).copied() == Some(1);
            if !unique {
                debug!(
                    class = %name,
                    member = f.wire,
                    local = f.local,
                    "skipping ambiguous member"
                );
            }
            unique
        });

        Shape {
            info: ClassInfo {
                name,
                members: fields.iter().map(|f| f.wire.to_owned()).collect(),
                dynamic: kind == ShapeKind::Dynamic,
                externalizable: false,
            },
            fields,
        }
    }
}

/// The effective trait of an object as the encoder writes it.
///
/// Registered types are written under their canonical registry name. Property
/// bags are open shapes with no sealed members.
pub fn resolve_class<'a>(object: &'a AmfObject, registry: &TypeRegistry) -> Cow<'a, ClassInfo> {
    match object {
        AmfObject::Dynamic(bag) => Cow::Owned(ClassInfo::dynamic(bag.class_name.clone())),
        AmfObject::Typed(instance) => {
            let info = instance.class_info();
            match registry.canonical_name(instance.as_any().type_id()) {
                Some(canonical) if canonical != info.name => Cow::Owned(info.renamed(canonical)),
                _ => Cow::Borrowed(info),
            }
        }
    }
}

/// Route a decoded member to the sealed setter or the dynamic hook.
pub(crate) fn assign_member(
    instance: &mut dyn AmfClass,
    name: String,
    value: Value,
) -> Result<(), AmfReadError> {
    if instance.class_info().has_member(&name) {
        instance.set_member(&name, value)
    } else {
        instance.set_dynamic_member(name, value)
    }
}

/// Implement [`AmfClass`] for a type from its [`Shape`].
///
/// The second argument is an expression yielding `&'static Shape<Self>`. An
/// optional trailing block is spliced into the impl, for hooks such as
/// `dynamic_members` or `write_external`.
#[macro_export]
macro_rules! impl_amf_class {
    ($ty:ty, $shape:expr $(, { $($extra:tt)* })?) => {
        impl $crate::AmfClass for $ty {
            fn class_info(&self) -> &$crate::ClassInfo {
                ($shape).info()
            }

            fn get_member(&self, name: &str) -> ::std::option::Option<$crate::Value> {
                ($shape).get(self, name)
            }

            fn set_member(
                &mut self,
                name: &str,
                value: $crate::Value,
            ) -> ::std::result::Result<(), $crate::AmfReadError> {
                ($shape).set(self, name, value)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn eq_class(&self, other: &dyn $crate::AmfClass) -> bool {
                other
                    .as_any()
                    .downcast_ref::<$ty>()
                    .is_some_and(|other| self == other)
            }

            $($($extra)*)?
        }
    };
}

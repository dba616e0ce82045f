use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use crate::AmfReadError;
use crate::define::{INT29_MAX, INT29_MIN};
use crate::shape::AmfClass;

/// A decoded or to-be-encoded AMF value.
///
/// Composite values are reference counted. Two `Value`s that share an `Arc`
/// are the same instance, which is what the reference tables preserve on the
/// wire: see [`Value::ptr_eq`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    #[default]
    Null,
    /// true or false
    Boolean(bool),
    /// A 29-bit signed integer in AMF3. Anything wider is written as a double.
    Integer(i32),
    /// IEEE-754 double
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Milliseconds since the Unix epoch, UTC.
    Date(Arc<Date>),
    /// Dense values plus an associative part.
    Array(Arc<Array>),
    /// Anonymous, dynamic or typed object.
    Object(Arc<AmfObject>),
    /// Raw bytes.
    ByteArray(Arc<Bytes>),
    /// Homogeneous vector.
    Vector(Arc<Vector>),
    /// Arbitrary key/value pairs.
    Dictionary(Arc<Dictionary>),
    /// XML carried as its source text.
    Xml(Arc<XmlDocument>),
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Date {
    /// Milliseconds since the epoch, possibly fractional.
    pub millis: f64,
}

impl Date {
    /// A date `millis` after the epoch.
    pub fn new(millis: f64) -> Self {
        Self { millis }
    }

    /// The current time.
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Converts to a UTC timestamp, `None` if the value is out of chrono's range.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if !self.millis.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt(self.millis as i64).single()
    }
}

impl From<DateTime<Utc>> for Date {
    fn from(value: DateTime<Utc>) -> Self {
        Self::new(value.timestamp_millis() as f64)
    }
}

/// An ActionScript array: a dense region and an associative region.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Array {
    /// Elements at indices `0..n`.
    pub dense: Vec<Value>,
    /// String-keyed entries, in insertion order.
    pub assoc: Vec<(String, Value)>,
}

impl Array {
    /// An array with no associative part.
    pub fn dense(values: Vec<Value>) -> Self {
        Self {
            dense: values,
            assoc: Vec::new(),
        }
    }

    /// Look up an associative entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.assoc.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.dense.len() + self.assoc.len()
    }

    /// Whether both parts are empty.
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty() && self.assoc.is_empty()
    }
}

/// An untyped property bag.
///
/// Produced for anonymous objects and for typed objects whose class name has no
/// registered local type. An empty `class_name` means anonymous.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AsObject {
    /// Wire class name, empty for anonymous objects.
    pub class_name: String,
    /// Members in insertion order.
    pub members: Vec<(String, Value)>,
}

impl AsObject {
    /// An object with no class name.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An empty object of class `class_name`.
    pub fn named(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            members: Vec::new(),
        }
    }

    /// Replace the members.
    pub fn with_members(mut self, members: Vec<(String, Value)>) -> Self {
        self.members = members;
        self
    }

    /// Whether the object has no class name.
    pub fn is_anonymous(&self) -> bool {
        self.class_name.is_empty()
    }

    /// The first member named `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.members.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace a member, keeping first-insertion order.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.members.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.members.push((key, value)),
        }
    }
}

/// The object variants that can travel under an object marker.
#[derive(Debug)]
pub enum AmfObject {
    /// Anonymous object or unregistered typed object.
    Dynamic(AsObject),
    /// An instance of a registered local type.
    Typed(Box<dyn AmfClass>),
}

impl AmfObject {
    /// Wrap a registered local instance.
    pub fn typed(instance: impl AmfClass) -> Self {
        Self::Typed(Box::new(instance))
    }

    /// Wire class name; empty for anonymous objects.
    pub fn class_name(&self) -> &str {
        match self {
            Self::Dynamic(bag) => &bag.class_name,
            Self::Typed(instance) => &instance.class_info().name,
        }
    }

    /// Read a member by wire name, sealed or dynamic.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Self::Dynamic(bag) => bag.get(name).cloned(),
            Self::Typed(instance) => instance.get_member(name).or_else(|| {
                instance
                    .dynamic_members()?
                    .into_iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v)
            }),
        }
    }

    /// The property bag, if this is not a typed instance.
    pub fn as_dynamic(&self) -> Option<&AsObject> {
        match self {
            Self::Dynamic(bag) => Some(bag),
            Self::Typed(_) => None,
        }
    }

    /// Borrow the local instance as its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Typed(instance) => instance.as_any().downcast_ref::<T>(),
            Self::Dynamic(_) => None,
        }
    }
}

impl PartialEq for AmfObject {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Dynamic(a), Self::Dynamic(b)) => a == b,
            (Self::Typed(a), Self::Typed(b)) => a.eq_class(b.as_ref()),
            _ => false,
        }
    }
}

impl From<AsObject> for AmfObject {
    fn from(value: AsObject) -> Self {
        Self::Dynamic(value)
    }
}

/// A typed AMF3 vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    /// Fixed-length vectors decode to a fixed array on the peer.
    pub fixed: bool,
    /// The elements.
    pub items: VectorItems,
}

/// Element storage of a [`Vector`].
#[derive(Debug, Clone, PartialEq)]
pub enum VectorItems {
    /// `Vector.<int>`
    Int(Vec<i32>),
    /// `Vector.<uint>`
    UInt(Vec<u32>),
    /// `Vector.<Number>`
    Double(Vec<f64>),
    /// `Vector.<Object>` and typed object vectors.
    Object {
        /// Element class name, empty for `Vector.<*>`.
        type_name: String,
        /// The elements.
        items: Vec<Value>,
    },
}

impl Vector {
    /// A variable-length vector.
    pub fn new(items: VectorItems) -> Self {
        Self {
            fixed: false,
            items,
        }
    }

    /// A fixed-length vector.
    pub fn fixed(items: VectorItems) -> Self {
        Self { fixed: true, items }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match &self.items {
            VectorItems::Int(v) => v.len(),
            VectorItems::UInt(v) => v.len(),
            VectorItems::Double(v) => v.len(),
            VectorItems::Object { items, .. } => items.len(),
        }
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key/value pairs with arbitrary keys.
///
/// `weak_keys` is carried through but entries are always held strongly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary {
    /// Whether the peer may collect keys no one else holds.
    pub weak_keys: bool,
    /// Entries in insertion order.
    pub entries: Vec<(Value, Value)>,
}

impl Dictionary {
    /// The value stored under `key`.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// XML source text. `legacy` selects the AMF3 XMLDocument marker over E4X XML.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlDocument {
    /// The XML text.
    pub source: String,
    /// Whether this is a legacy XMLDocument.
    pub legacy: bool,
}

impl Value {
    /// A shared dense array.
    pub fn array(values: Vec<Value>) -> Self {
        Self::Array(Arc::new(Array::dense(values)))
    }

    /// A shared property bag.
    pub fn object(bag: AsObject) -> Self {
        Self::Object(Arc::new(AmfObject::Dynamic(bag)))
    }

    /// A shared typed instance.
    pub fn typed(instance: impl AmfClass) -> Self {
        Self::Object(Arc::new(AmfObject::typed(instance)))
    }

    /// A shared date.
    pub fn date(millis: f64) -> Self {
        Self::Date(Arc::new(Date::new(millis)))
    }

    /// A shared byte array.
    pub fn byte_array(bytes: impl Into<Bytes>) -> Self {
        Self::ByteArray(Arc::new(bytes.into()))
    }

    /// A shared vector.
    pub fn vector(vector: Vector) -> Self {
        Self::Vector(Arc::new(vector))
    }

    /// A shared dictionary.
    pub fn dictionary(dictionary: Dictionary) -> Self {
        Self::Dictionary(Arc::new(dictionary))
    }

    /// A shared E4X XML value.
    pub fn xml(source: impl Into<String>) -> Self {
        Self::Xml(Arc::new(XmlDocument {
            source: source.into(),
            legacy: false,
        }))
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::ByteArray(_) => "byte array",
            Self::Vector(_) => "vector",
            Self::Dictionary(_) => "dictionary",
            Self::Xml(_) => "xml",
        }
    }

    /// Address of the shared allocation for reference-eligible variants.
    pub(crate) fn identity(&self) -> Option<usize> {
        let ptr = match self {
            Self::Date(v) => Arc::as_ptr(v) as *const (),
            Self::Array(v) => Arc::as_ptr(v) as *const (),
            Self::Object(v) => Arc::as_ptr(v) as *const (),
            Self::ByteArray(v) => Arc::as_ptr(v) as *const (),
            Self::Vector(v) => Arc::as_ptr(v) as *const (),
            Self::Dictionary(v) => Arc::as_ptr(v) as *const (),
            Self::Xml(v) => Arc::as_ptr(v) as *const (),
            _ => return None,
        };
        Some(ptr as usize)
    }

    /// Check if both values are the same shared instance.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Whether AMF3 can carry this integer inline.
    pub fn fits_int29(value: i32) -> bool {
        (INT29_MIN..=INT29_MAX).contains(&value)
    }

    /// Whether this is `null` or `undefined`.
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of integers and doubles.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// The array, if this is one.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The object, if this is one.
    pub fn as_object(&self) -> Option<&AmfObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Convert into a local type, as member setters do.
    pub fn convert<T: FromValue>(self) -> Result<T, AmfReadError> {
        T::from_value(self)
    }

    fn mismatch(self, expected: &'static str) -> AmfReadError {
        AmfReadError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

/// Conversion from a wire value into a member's local type.
pub trait FromValue: Sized {
    /// Convert `value`, failing on a kind mismatch.
    fn from_value(value: Value) -> Result<Self, AmfReadError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(other.mismatch("boolean")),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::Double(d) => Ok(d),
            Value::Integer(i) => Ok(i as f64),
            other => Err(other.mismatch("double")),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::Integer(i) => Ok(i),
            Value::Double(d)
                if d.fract() == 0.0 && d >= i32::MIN as f64 && d <= i32::MAX as f64 =>
            {
                Ok(d as i32)
            }
            other => Err(other.mismatch("int32")),
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::Integer(i) if i >= 0 => Ok(i as u32),
            Value::Double(d) if d.fract() == 0.0 && d >= 0.0 && d <= u32::MAX as f64 => {
                Ok(d as u32)
            }
            other => Err(other.mismatch("uint32")),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::Integer(i) => Ok(i as i64),
            // Peers send 64-bit counters as doubles.
            Value::Double(d) if d.is_finite() => Ok(d as i64),
            other => Err(other.mismatch("int64")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::Null | Value::Undefined => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::Array(array) => Ok(array.dense.clone()),
            Value::Vector(vector) => match &vector.items {
                VectorItems::Object { items, .. } => Ok(items.clone()),
                _ => Err(AmfReadError::TypeMismatch {
                    expected: "array",
                    found: "vector",
                }),
            },
            other => Err(other.mismatch("array")),
        }
    }
}

impl FromValue for Vec<(String, Value)> {
    fn from_value(value: Value) -> Result<Self, AmfReadError> {
        match value {
            Value::Null | Value::Undefined => Ok(Vec::new()),
            Value::Array(array) => Ok(array.assoc.clone()),
            Value::Object(object) => match object.as_ref() {
                AmfObject::Dynamic(bag) => Ok(bag.members.clone()),
                AmfObject::Typed(_) => Err(AmfReadError::TypeMismatch {
                    expected: "anonymous object",
                    found: "typed object",
                }),
            },
            other => Err(other.mismatch("object")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        match i32::try_from(value) {
            Ok(v) => Self::Integer(v),
            Err(_) => Self::Double(value as f64),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Double(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::array(value)
    }
}

impl From<Vec<(String, Value)>> for Value {
    fn from(value: Vec<(String, Value)>) -> Self {
        Self::object(AsObject::anonymous().with_members(value))
    }
}

impl From<AsObject> for Value {
    fn from(value: AsObject) -> Self {
        Self::object(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Self::Array(Arc::new(value))
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Self::Date(Arc::new(value))
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self::ByteArray(Arc::new(value))
    }
}

//! A pure-rust implementation of the AMF0 and AMF3 encodings.
//!
//! Values form a graph: shared objects, arrays and byte arrays are written
//! once and referenced afterwards, and strongly typed classes are mapped to
//! and from the wire through a [`SerializationContext`].
//!
//! # Examples
//!
//! ```rust
//! # fn test() -> Result<(), Box<dyn std::error::Error>> {
//! use amf::{AmfVersion, AsObject, SerializationContext, Value};
//!
//! let context = SerializationContext::default();
//!
//! let shared = Value::array(vec![Value::from("a"), Value::Integer(1)]);
//! let value = Value::from(AsObject::anonymous().with_members(vec![
//!     ("first".into(), shared.clone()),
//!     ("second".into(), shared),
//! ]));
//!
//! // Encode a value, then read it back
//! let bytes = amf::encode(&value, &context, AmfVersion::Amf3)?;
//! let decoded = amf::decode(bytes, &context, AmfVersion::Amf3)?;
//!
//! let object = decoded.as_object().unwrap();
//! assert!(object.get("first").unwrap().ptr_eq(&object.get("second").unwrap()));
//! # Ok(())
//! # }
//! # test().expect("test failed");
//! ```
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod amf0;
pub mod amf3;
mod base;
mod context;
mod define;
mod errors;
mod shape;
mod tables;
mod value;

use bytes::Bytes;

pub use crate::amf0::{Amf0Decoder, Amf0Encoder};
pub use crate::amf3::{Amf3Decoder, Amf3Encoder};
pub use crate::base::{AmfBufMut, ByteReader};
pub use crate::context::{
    ClassEntry, ClassRegistration, ContextOptions, Factory, SerializationContext,
    SerializationContextBuilder, TypeRegistry, UnknownTypePolicy,
};
pub use crate::define::{Amf0Marker, Amf3Marker, AmfVersion, INT29_MAX, INT29_MIN, U29_MAX};
pub use crate::errors::{AmfReadError, AmfWriteError, RegistryError};
pub use crate::shape::{AmfClass, ClassInfo, Shape, ShapeBuilder, ShapeKind, resolve_class};
pub use crate::value::{
    AmfObject, Array, AsObject, Date, Dictionary, FromValue, Value, Vector, VectorItems,
    XmlDocument,
};

/// Decode exactly one value in the given encoding.
pub fn decode(
    buffer: Bytes,
    context: &SerializationContext,
    version: AmfVersion,
) -> Result<Value, AmfReadError> {
    match version {
        AmfVersion::Amf0 => amf0::decode(buffer, context),
        AmfVersion::Amf3 => amf3::decode(buffer, context),
    }
}

/// Encode one value in the given encoding.
pub fn encode(
    value: &Value,
    context: &SerializationContext,
    version: AmfVersion,
) -> Result<Bytes, AmfWriteError> {
    match version {
        AmfVersion::Amf0 => amf0::encode(value, context),
        AmfVersion::Amf3 => amf3::encode(value, context),
    }
}

use std::io;

use crate::define::Amf0Marker;

/// Errors that can occur when decoding AMF data.
///
/// Every decode error is terminal for the current pass. A decoder that returned
/// one of these refuses further reads until it is reset.
#[derive(Debug, thiserror::Error)]
pub enum AmfReadError {
    /// A read needed more bytes than the buffer holds.
    #[error("out of bounds: needed {needed} bytes, {remaining} remaining")]
    OutOfBounds {
        /// Bytes the read asked for.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },
    /// A length prefix asked for more memory than the context allows.
    #[error("allocation of {requested} bytes exceeds the limit of {limit} bytes")]
    AllocationLimitExceeded {
        /// Requested allocation in bytes.
        requested: usize,
        /// Configured ceiling.
        limit: usize,
    },
    /// A typed object named a class with no registered local type.
    #[error("unknown type: {0}")]
    UnknownType(String),
    /// A reference index pointed past the end of its table.
    #[error("invalid {table} reference: index {index}, table holds {len}")]
    InvalidReference {
        /// Which reference table was consulted.
        table: &'static str,
        /// The index read from the stream.
        index: usize,
        /// Number of entries in the table.
        len: usize,
    },
    /// An object referenced itself while it was still being decoded.
    #[error("cyclic reference to object {0} while it is under construction")]
    CyclicReference(usize),
    /// A reserved or legacy AMF0 marker was encountered.
    #[error("unsupported type: {0:?}")]
    UnsupportedMarker(Amf0Marker),
    /// The next value does not carry the marker the caller asked for.
    #[error("wrong type: expected {expected:?}, got {got:#04x}")]
    WrongType {
        /// The marker the caller asked for.
        expected: Amf0Marker,
        /// The marker byte found.
        got: u8,
    },
    /// A marker byte outside of the marker table.
    #[error("unknown marker: {0}")]
    UnknownMarker(u8),
    /// An AMF0 object was terminated by something other than the object end marker.
    #[error("invalid object end marker: {0:#04x}")]
    InvalidObjectEnd(u8),
    /// An externalizable class with no local type; its payload cannot be skipped.
    #[error("externalizable class {0} has no registered type")]
    OpaqueExternalizable(String),
    /// A registered externalizable type does not implement `read_external`.
    #[error("externalizable class {0} does not implement read_external")]
    MissingExternalHook(String),
    /// The value graph nests deeper than the configured limit.
    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),
    /// A value could not be converted into the requested local type.
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        /// The local type the setter wanted.
        expected: &'static str,
        /// The kind of value found on the wire.
        found: &'static str,
    },
    /// A member setter rejected its value.
    #[error("member {class}.{member}: {source}")]
    Member {
        /// Wire class name.
        class: String,
        /// Wire member name.
        member: String,
        /// The setter's error.
        source: Box<AmfReadError>,
    },
    /// Bytes were left over after a single value was decoded.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    /// The decoder failed earlier in this pass and must be reset.
    #[error("pass aborted by an earlier error, reset the decoder")]
    PassAborted,
    /// A string parse error occurred.
    #[error("string parse error: {0}")]
    StringParseError(#[from] std::str::Utf8Error),
    /// An IO error occurred.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur when encoding AMF data.
#[derive(Debug, thiserror::Error)]
pub enum AmfWriteError {
    /// An object key or class name did not fit a 16-bit length prefix.
    #[error("key too long: {0} bytes")]
    KeyTooLong(usize),
    /// A length or reference index does not fit its wire field.
    #[error("length {0} does not fit the wire format")]
    LengthOverflow(usize),
    /// An externalizable type does not implement `write_external`.
    #[error("externalizable class {0} does not implement write_external")]
    MissingExternalHook(String),
    /// A dynamic type does not expose its dynamic members.
    #[error("dynamic class {0} does not expose dynamic members")]
    MissingDynamicMembers(String),
    /// A member declared by a shape has no value.
    #[error("class {class} declares member {member} but has no value for it")]
    MissingMember {
        /// Wire class name.
        class: String,
        /// Wire member name.
        member: String,
    },
    /// An IO error occurred.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while building a type registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A class was registered under an empty wire name.
    #[error("class registered with an empty wire name")]
    EmptyName,
    /// A class was registered without a zero-argument factory.
    #[error("class {0} has no factory")]
    MissingFactory(String),
    /// Two different local types claimed the same wire name.
    #[error("wire name {0} is registered by two types")]
    DuplicateAlias(String),
}

//! Flex messaging types for the `amf` codec.
//!
//! The message classes and collection wrappers exchanged by Flex remoting and
//! messaging peers, registered through the ordinary [`amf`] registry API.
//!
//! # Examples
//!
//! ```rust
//! # fn test() -> Result<(), Box<dyn std::error::Error>> {
//! use amf::{AmfVersion, SerializationContext, Value};
//! use flex_messages::{RemotingMessage, register_messages};
//!
//! let context = register_messages(SerializationContext::builder()).build()?;
//!
//! let call = RemotingMessage::new("echo", "say", vec![Value::from("hi")]);
//! let bytes = amf::encode(&Value::typed(call.clone()), &context, AmfVersion::Amf3)?;
//!
//! let decoded = amf::decode(bytes, &context, AmfVersion::Amf3)?;
//! let decoded = decoded.as_object().and_then(|o| o.downcast_ref::<RemotingMessage>());
//! assert_eq!(decoded, Some(&call));
//! # Ok(())
//! # }
//! # test().expect("test failed");
//! ```
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

mod collections;
mod messages;

use amf::SerializationContextBuilder;
use tracing::debug;

pub use crate::collections::{ARRAY_COLLECTION, ArrayCollection, OBJECT_PROXY, ObjectProxy};
pub use crate::messages::{
    ACKNOWLEDGE_MESSAGE, ASYNC_MESSAGE, AcknowledgeMessage, AsyncMessage, COMMAND_MESSAGE,
    CommandMessage, CommandOperation, DS_ID_HEADER, ENDPOINT_HEADER, ERROR_MESSAGE, ErrorMessage,
    Message, MessageBase, REMOTING_MESSAGE, RemotingMessage,
};

/// Register every message and collection type.
///
/// Types are written under their `flex.messaging` names and also read under
/// the names Flex clients use.
pub fn register_messages(builder: SerializationContextBuilder) -> SerializationContextBuilder {
    debug!("registering flex messaging types");
    builder
        .register_with_aliases::<AsyncMessage>(
            ASYNC_MESSAGE,
            &["mx.messaging.messages.AsyncMessage"],
        )
        .register_with_aliases::<AcknowledgeMessage>(
            ACKNOWLEDGE_MESSAGE,
            &["mx.messaging.messages.AcknowledgeMessage"],
        )
        .register_with_aliases::<CommandMessage>(
            COMMAND_MESSAGE,
            &["mx.messaging.messages.CommandMessage"],
        )
        .register_with_aliases::<ErrorMessage>(
            ERROR_MESSAGE,
            &["mx.messaging.messages.ErrorMessage"],
        )
        .register_with_aliases::<RemotingMessage>(
            REMOTING_MESSAGE,
            &["mx.messaging.messages.RemotingMessage"],
        )
        .register_with_aliases::<ArrayCollection>(
            ARRAY_COLLECTION,
            &["mx.collections.ArrayCollection"],
        )
        .register_with_aliases::<ObjectProxy>(OBJECT_PROXY, &["mx.utils.ObjectProxy"])
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use amf::{AmfObject, AmfVersion, AsObject, SerializationContext, Value};

    use super::*;

    fn context() -> SerializationContext {
        register_messages(SerializationContext::builder())
            .build()
            .unwrap()
    }

    fn round_trip(value: &Value, ctx: &SerializationContext, version: AmfVersion) -> Value {
        let bytes = amf::encode(value, ctx, version).unwrap();
        amf::decode(bytes, ctx, version).unwrap()
    }

    fn decoded_as<T: 'static>(value: &Value) -> &T {
        value.as_object().unwrap().downcast_ref::<T>().unwrap()
    }

    #[test]
    fn test_registry_contents() {
        let ctx = context();
        assert_eq!(ctx.registry().len(), 7);
        assert_eq!(
            ctx.registry()
                .lookup("mx.messaging.messages.CommandMessage")
                .map(|e| e.canonical.as_str()),
            Some(COMMAND_MESSAGE)
        );
    }

    #[test]
    fn test_messages_round_trip_in_both_encodings() {
        let ctx = context();

        let mut command = CommandMessage::new(CommandOperation::Subscribe);
        command.base.destination = "prices".into();
        command.base.set_header(DS_ID_HEADER, Value::from("nil"));

        let mut fault = ErrorMessage::for_message(&command, "Client.Error", "denied");
        fault.extended_data = vec![("retry".into(), Value::Boolean(false))];

        let messages = [
            Value::typed(AsyncMessage::new("prices", Value::Double(1.25))),
            Value::typed(AcknowledgeMessage::for_message(&command)),
            Value::typed(command),
            Value::typed(fault),
            Value::typed(RemotingMessage::new("echo", "say", vec![Value::from("x")])),
        ];

        for version in [AmfVersion::Amf0, AmfVersion::Amf3] {
            for message in &messages {
                assert_eq!(&round_trip(message, &ctx, version), message);
            }
        }
    }

    #[test]
    fn test_client_alias_decodes_to_message() {
        let ctx = context();
        let mut wire = AsObject::named("mx.messaging.messages.CommandMessage");
        wire.insert("operation", Value::Integer(CommandOperation::ClientPing as i32));
        wire.insert("messageId", Value::from("ABC"));

        let decoded = round_trip(&wire.into(), &ctx, AmfVersion::Amf3);
        let command = decoded_as::<CommandMessage>(&decoded);
        assert_eq!(command.operation, CommandOperation::ClientPing);
        assert_eq!(command.base.message_id, "ABC");

        // Answered under the canonical name.
        let bytes = amf::encode(&decoded, &ctx, AmfVersion::Amf3).unwrap();
        let plain = amf::decode(bytes, &SerializationContext::default(), AmfVersion::Amf3).unwrap();
        assert_eq!(plain.as_object().unwrap().class_name(), COMMAND_MESSAGE);
    }

    #[test]
    fn test_collections_in_message_body() {
        let ctx = context();
        let row = Value::from(
            AsObject::anonymous().with_members(vec![("id".into(), Value::Integer(1))]),
        );
        let collection = Value::from(ArrayCollection::new(vec![row.clone(), row]));
        let proxy = Value::from(ObjectProxy::new(Value::from("wrapped")));
        let message = Value::typed(AsyncMessage::new(
            "rows",
            Value::array(vec![collection, proxy]),
        ));

        for version in [AmfVersion::Amf0, AmfVersion::Amf3] {
            let decoded = round_trip(&message, &ctx, version);
            let body = &decoded_as::<AsyncMessage>(&decoded).base.body;
            let parts = &body.as_array().unwrap().dense;

            let rows = &decoded_as::<ArrayCollection>(&parts[0]).source;
            assert!(rows[0].ptr_eq(&rows[1]));
            assert_eq!(
                decoded_as::<ObjectProxy>(&parts[1]).object,
                Value::from("wrapped")
            );
        }
    }

    #[test]
    fn test_collection_without_registration_is_opaque() {
        let bytes = amf::encode(
            &Value::from(ArrayCollection::default()),
            &context(),
            AmfVersion::Amf3,
        )
        .unwrap();

        let result = amf::decode(bytes, &SerializationContext::default(), AmfVersion::Amf3);
        assert!(matches!(
            result,
            Err(amf::AmfReadError::OpaqueExternalizable(name)) if name == ARRAY_COLLECTION
        ));
    }

    #[test]
    fn test_typed_instance_comparison() {
        let a = AmfObject::typed(ObjectProxy::new(Value::Null));
        let b = AmfObject::typed(ObjectProxy::new(Value::Null));
        assert_eq!(a, b);
        assert_ne!(a, AmfObject::typed(ArrayCollection::default()));
    }
}

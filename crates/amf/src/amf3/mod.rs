//! The AMF3 encoding.

mod decode;
mod encode;

use bytes::Bytes;

pub use self::decode::Amf3Decoder;
pub use self::encode::Amf3Encoder;
use crate::context::SerializationContext;
use crate::value::Value;
use crate::{AmfReadError, AmfWriteError};

/// Decode exactly one AMF3 value.
pub fn decode(buffer: Bytes, context: &SerializationContext) -> Result<Value, AmfReadError> {
    let mut decoder = Amf3Decoder::new(buffer, context);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(AmfReadError::TrailingBytes(decoder.remaining()));
    }
    Ok(value)
}

/// Encode one value as AMF3.
pub fn encode(value: &Value, context: &SerializationContext) -> Result<Bytes, AmfWriteError> {
    let mut encoder = Amf3Encoder::new(context);
    encoder.encode(value)?;
    Ok(encoder.take_bytes())
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::impl_amf_class;
    use crate::shape::{AmfClass, Shape};
    use crate::value::{AmfObject, AsObject, Dictionary, Vector, VectorItems};

    #[derive(Debug, Default, PartialEq)]
    struct Point {
        x: f64,
        y: f64,
        label: Option<String>,
    }

    fn point_shape() -> &'static Shape<Point> {
        static SHAPE: OnceLock<Shape<Point>> = OnceLock::new();
        SHAPE.get_or_init(|| {
            Shape::<Point>::builder("test.Point")
                .field("x", |p| p.x.into(), |p, v| Ok(p.x = v.convert()?))
                .field("y", |p| p.y.into(), |p, v| Ok(p.y = v.convert()?))
                .field("label", |p| p.label.clone().into(), |p, v| {
                    Ok(p.label = v.convert()?)
                })
                .build()
        })
    }

    impl_amf_class!(Point, point_shape());

    /// Dynamic type keeping its open members.
    #[derive(Debug, Default, PartialEq)]
    struct Bag {
        id: i32,
        extra: Vec<(String, Value)>,
    }

    fn bag_shape() -> &'static Shape<Bag> {
        static SHAPE: OnceLock<Shape<Bag>> = OnceLock::new();
        SHAPE.get_or_init(|| {
            Shape::<Bag>::builder("test.Bag")
                .dynamic()
                .field("id", |b| b.id.into(), |b, v| Ok(b.id = v.convert()?))
                .build()
        })
    }

    impl_amf_class!(Bag, bag_shape(), {
        fn dynamic_members(&self) -> Option<Vec<(String, Value)>> {
            Some(self.extra.clone())
        }

        fn set_dynamic_member(&mut self, name: String, value: Value) -> Result<(), AmfReadError> {
            self.extra.push((name, value));
            Ok(())
        }
    });

    /// Externalizable list writing its items as one nested value.
    #[derive(Debug, Default, PartialEq)]
    struct List {
        items: Vec<Value>,
    }

    fn list_shape() -> &'static Shape<List> {
        static SHAPE: OnceLock<Shape<List>> = OnceLock::new();
        SHAPE.get_or_init(|| {
            Shape::<List>::builder("test.List")
                .externalizable()
                .build()
        })
    }

    impl_amf_class!(List, list_shape(), {
        fn write_external(&self, output: &mut Amf3Encoder<'_>) -> Result<(), AmfWriteError> {
            output.write_value(&Value::array(self.items.clone()))
        }

        fn read_external(&mut self, input: &mut Amf3Decoder<'_>) -> Result<(), AmfReadError> {
            self.items = input.read_value()?.convert()?;
            Ok(())
        }
    });

    /// Exception-like type whose stack trace is never written.
    #[derive(Debug, Default, PartialEq)]
    struct Failure {
        message: String,
        stack_trace: String,
    }

    fn failure_shape() -> &'static Shape<Failure> {
        static SHAPE: OnceLock<Shape<Failure>> = OnceLock::new();
        SHAPE.get_or_init(|| {
            Shape::<Failure>::builder("test.Failure")
                .exception()
                .field("message", |f| f.message.clone().into(), |f, v| {
                    Ok(f.message = v.convert()?)
                })
                .field("stackTrace", |f| f.stack_trace.clone().into(), |f, v| {
                    Ok(f.stack_trace = v.convert()?)
                })
                .build()
        })
    }

    impl_amf_class!(Failure, failure_shape());

    fn context() -> SerializationContext {
        SerializationContext::builder()
            .register::<Point>("test.Point")
            .register_with_aliases::<Bag>("test.Bag", &["legacy.Bag"])
            .register::<List>("test.List")
            .build()
            .unwrap()
    }

    fn round_trip(value: &Value, ctx: &SerializationContext) -> Value {
        let bytes = encode(value, ctx).unwrap();
        decode(bytes, ctx).unwrap()
    }

    #[test]
    fn test_hello_string() {
        let ctx = SerializationContext::default();
        let bytes = encode(&Value::from("hello"), &ctx).unwrap();
        assert_eq!(
            &bytes[..],
            &[0x06, 0x0b, 0x68, 0x65, 0x6c, 0x6c, 0x6f]
        );
        assert_eq!(decode(bytes, &ctx).unwrap(), Value::from("hello"));
    }

    #[test]
    fn test_round_trip_every_kind() {
        let ctx = context();
        let mut bag = AsObject::named("unregistered.Thing");
        bag.insert("n", Value::Integer(3));

        let values = [
            Value::Undefined,
            Value::Null,
            Value::Boolean(true),
            Value::Integer(-268_435_456),
            Value::Integer(300_000_000),
            Value::Double(-0.5),
            Value::from("unicode ✓"),
            Value::date(1_714_564_800_000.0),
            Value::array(vec![Value::from("a"), Value::Null]),
            Value::from(AsObject::anonymous()),
            Value::from(bag),
            Value::byte_array(vec![0u8, 1, 2]),
            Value::vector(Vector::new(VectorItems::Double(vec![1.5, f64::MAX]))),
            Value::vector(Vector::fixed(VectorItems::Object {
                type_name: "test.Point".into(),
                items: vec![Value::typed(Point::default())],
            })),
            Value::dictionary(Dictionary {
                weak_keys: true,
                entries: vec![(Value::from("k"), Value::Integer(1))],
            }),
            Value::xml("<root/>"),
        ];

        for value in values {
            let decoded = round_trip(&value, &ctx);
            match value {
                // Too wide for Int29.
                Value::Integer(300_000_000) => assert_eq!(decoded, Value::Double(300_000_000.0)),
                _ => assert_eq!(decoded, value),
            }
        }
    }

    #[test]
    fn test_round_trip_typed_object() {
        let ctx = context();
        let point = Point {
            x: 1.0,
            y: -2.5,
            label: Some("p".into()),
        };

        let decoded = round_trip(&Value::typed(point), &ctx);
        let object = decoded.as_object().unwrap();
        assert_eq!(object.class_name(), "test.Point");
        assert_eq!(
            object.downcast_ref::<Point>(),
            Some(&Point {
                x: 1.0,
                y: -2.5,
                label: Some("p".into()),
            })
        );
    }

    #[test]
    fn test_unregistered_class_falls_back_to_bag() {
        let writer = context();
        let reader = SerializationContext::default();

        let bytes = encode(&Value::typed(Point::default()), &writer).unwrap();
        let decoded = decode(bytes.clone(), &reader).unwrap();
        let bag = decoded.as_object().unwrap().as_dynamic().unwrap();

        assert_eq!(bag.class_name, "test.Point");
        assert_eq!(bag.get("x"), Some(&Value::Double(0.0)));
        assert_eq!(bag.get("label"), Some(&Value::Null));

        let strict = SerializationContext::builder()
            .fallback(false)
            .build()
            .unwrap();
        assert!(matches!(
            decode(bytes, &strict),
            Err(AmfReadError::UnknownType(name)) if name == "test.Point"
        ));
    }

    #[test]
    fn test_alias_decodes_to_registered_type() {
        let ctx = context();
        let mut legacy = AsObject::named("legacy.Bag");
        legacy.insert("id", Value::Integer(9));
        legacy.insert("note", Value::from("kept"));

        let decoded = round_trip(&legacy.into(), &ctx);
        let bag = decoded.as_object().unwrap().downcast_ref::<Bag>().unwrap();
        assert_eq!(bag.id, 9);
        assert_eq!(bag.extra, vec![("note".to_string(), Value::from("kept"))]);

        // Written back under the canonical name.
        let decoded = round_trip(&decoded, &ctx);
        assert_eq!(decoded.as_object().unwrap().class_name(), "test.Bag");
        assert_eq!(
            decoded.as_object().unwrap().get("note"),
            Some(Value::from("kept"))
        );
    }

    #[test]
    fn test_externalizable_round_trip() {
        let ctx = context();
        let shared = Value::from(AsObject::anonymous().with_members(vec![(
            "v".into(),
            Value::Integer(1),
        )]));
        let list = Value::typed(List {
            items: vec![shared.clone(), shared.clone()],
        });
        let value = Value::array(vec![list, shared]);

        let decoded = round_trip(&value, &ctx);
        let outer = decoded.as_array().unwrap();
        let list = outer.dense[0]
            .as_object()
            .unwrap()
            .downcast_ref::<List>()
            .unwrap();

        // The hook shares the pass's object table.
        assert!(list.items[0].ptr_eq(&list.items[1]));
        assert!(list.items[0].ptr_eq(&outer.dense[1]));
    }

    #[test]
    fn test_shared_inner_array_decodes_as_aliases() {
        let ctx = SerializationContext::default();
        let inner = Value::array(vec![Value::Integer(1)]);
        let outer = Value::array(vec![inner.clone(), inner]);

        let decoded = round_trip(&outer, &ctx);
        let dense = &decoded.as_array().unwrap().dense;
        assert!(dense[0].ptr_eq(&dense[1]));
    }

    #[test]
    fn test_exception_members_stay_off_the_wire() {
        let ctx = SerializationContext::builder()
            .register::<Failure>("test.Failure")
            .build()
            .unwrap();
        let failure = Value::typed(Failure {
            message: "boom".into(),
            stack_trace: "at main".into(),
        });

        let bytes = encode(&failure, &ctx).unwrap();
        assert!(!bytes.windows(10).any(|w| w == b"stackTrace"));
        assert!(!bytes.windows(7).any(|w| w == b"at main"));

        let decoded = decode(bytes.clone(), &SerializationContext::default()).unwrap();
        let bag = decoded.as_object().unwrap().as_dynamic().unwrap();
        assert_eq!(bag.members, vec![("message".to_string(), Value::from("boom"))]);

        let decoded = decode(bytes, &ctx).unwrap();
        assert_eq!(
            decoded.as_object().unwrap().downcast_ref::<Failure>(),
            Some(&Failure {
                message: "boom".into(),
                stack_trace: String::new(),
            })
        );
    }

    #[test]
    fn test_shared_vector_and_dictionary_keep_identity() {
        let ctx = SerializationContext::default();
        let vector = Value::vector(Vector::new(VectorItems::Int(vec![1, 2])));
        let dictionary = Value::dictionary(Dictionary {
            weak_keys: false,
            entries: vec![(Value::from("k"), Value::Integer(1))],
        });
        let value = Value::array(vec![
            vector.clone(),
            vector,
            dictionary.clone(),
            dictionary,
        ]);

        let bytes = encode(&value, &ctx).unwrap();
        // Dictionary is object 2, written the second time as a reference.
        assert_eq!(&bytes[bytes.len() - 2..], &[0x11, 0x04]);

        let decoded = decode(bytes, &ctx).unwrap();
        assert_eq!(decoded, value);
        let dense = &decoded.as_array().unwrap().dense;
        assert!(dense[0].ptr_eq(&dense[1]));
        assert!(dense[2].ptr_eq(&dense[3]));
        assert!(!dense[0].ptr_eq(&dense[2]));
    }

    #[test]
    fn test_trailing_bytes() {
        let ctx = SerializationContext::default();
        assert!(matches!(
            decode(Bytes::from_static(&[0x01, 0x01]), &ctx),
            Err(AmfReadError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_sealed_member_unknown_locally_is_dropped() {
        let ctx = context();
        let mut bag = AsObject::named("test.Point");
        bag.insert("x", Value::Double(4.0));
        bag.insert("z", Value::Double(9.0));

        // Written as a dynamic bag; "z" reaches the default dynamic hook.
        let decoded = round_trip(&bag.into(), &ctx);
        let object = decoded.as_object().unwrap();
        assert_eq!(
            object.downcast_ref::<Point>(),
            Some(&Point {
                x: 4.0,
                ..Default::default()
            })
        );
        assert_eq!(object.get("z"), None);
        assert!(matches!(object, AmfObject::Typed(t) if t.class_info().name == "test.Point"));
    }
}

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::AmfWriteError;
use crate::amf3::Amf3Encoder;
use crate::base::AmfBufMut;
use crate::context::SerializationContext;
use crate::define::Amf0Marker;
use crate::shape::resolve_class;
use crate::tables::IdentityTable;
use crate::value::{AmfObject, Array, Value};

/// AMF0 encoder.
///
/// Values AMF0 cannot express are written through the avmplus marker by an
/// inner AMF3 encoder sharing the same buffer.
#[derive(Debug)]
pub struct Amf0Encoder<'a> {
    avm_plus: Amf3Encoder<'a>,
    objects: IdentityTable,
}

impl<'a> Amf0Encoder<'a> {
    /// Create a new AMF0 encoder.
    pub fn new(context: &'a SerializationContext) -> Self {
        Self {
            avm_plus: Amf3Encoder::new(context),
            objects: IdentityTable::default(),
        }
    }

    /// Start a new pass, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.avm_plus.reset();
        self.objects.clear();
    }

    /// Take the bytes written so far. The reference tables are kept.
    pub fn take_bytes(&mut self) -> Bytes {
        self.avm_plus.take_bytes()
    }

    fn buf(&mut self) -> &mut BytesMut {
        &mut self.avm_plus.buf
    }

    /// Encode a value into the buffer.
    pub fn encode(&mut self, value: &Value) -> Result<(), AmfWriteError> {
        match value {
            Value::Undefined => self.buf().put_u8(Amf0Marker::Undefined as u8),
            Value::Null => self.buf().put_u8(Amf0Marker::Null as u8),
            Value::Boolean(b) => {
                self.buf().put_u8(Amf0Marker::Boolean as u8);
                self.buf().put_u8(*b as u8);
            }
            Value::Integer(i) => self.encode_number(*i as f64),
            Value::Double(d) => self.encode_number(*d),
            Value::String(s) => self.encode_string(s)?,
            Value::Xml(xml) if xml.legacy => {
                self.buf().put_u8(Amf0Marker::XmlDocument as u8);
                self.put_long_utf8(&xml.source)?;
            }
            _ if needs_avm_plus(value) => {
                self.buf().put_u8(Amf0Marker::AVMPlusObject as u8);
                self.avm_plus.write_value(value)?;
            }
            _ => self.encode_referenceable(value)?,
        }
        Ok(())
    }

    fn encode_number(&mut self, value: f64) {
        self.buf().put_u8(Amf0Marker::Number as u8);
        self.buf().put_f64_be(value);
    }

    fn encode_string(&mut self, value: &str) -> Result<(), AmfWriteError> {
        if value.len() > u16::MAX as usize {
            self.buf().put_u8(Amf0Marker::LongString as u8);
            return self.put_long_utf8(value);
        }

        self.buf().put_u8(Amf0Marker::String as u8);
        self.buf().put_utf8_u16(value)
    }

    fn put_long_utf8(&mut self, value: &str) -> Result<(), AmfWriteError> {
        let len =
            u32::try_from(value.len()).map_err(|_| AmfWriteError::LengthOverflow(value.len()))?;
        self.buf().put_u32(len);
        self.buf().put_slice(value.as_bytes());
        Ok(())
    }

    /// Write object end marker to signify the end of an AMF0 object
    fn object_eof(&mut self) {
        self.buf().put_u24(Amf0Marker::ObjectEnd as u32);
    }

    fn encode_property(&mut self, key: &str, value: &Value) -> Result<(), AmfWriteError> {
        if key.is_empty() {
            warn!("dropping property with an empty name");
            return Ok(());
        }
        self.buf().put_utf8_u16(key)?;
        self.encode(value)
    }

    fn encode_referenceable(&mut self, value: &Value) -> Result<(), AmfWriteError> {
        // Indices past u16 cannot be referenced; such values are written inline again.
        if let Some(index) = self.objects.get(value).filter(|i| *i <= u16::MAX as usize) {
            self.buf().put_u8(Amf0Marker::Reference as u8);
            self.buf().put_u16(index as u16);
            return Ok(());
        }
        self.objects.insert(value);

        match value {
            Value::Date(date) => {
                self.buf().put_u8(Amf0Marker::Date as u8);
                self.buf().put_f64_be(date.millis);
                self.buf().put_i16(0);
                Ok(())
            }
            Value::Array(array) if array.assoc.is_empty() => self.encode_strict_array(array),
            Value::Array(array) => self.encode_ecma_array(array),
            Value::Object(object) => self.encode_object(object),
            _ => Ok(()),
        }
    }

    fn encode_strict_array(&mut self, array: &Array) -> Result<(), AmfWriteError> {
        let len = u32::try_from(array.dense.len())
            .map_err(|_| AmfWriteError::LengthOverflow(array.dense.len()))?;

        self.buf().put_u8(Amf0Marker::StrictArray as u8);
        self.buf().put_u32(len);
        for value in &array.dense {
            self.encode(value)?;
        }
        Ok(())
    }

    /// The count field carries the dense length, like the array `length` a
    /// Flash runtime writes.
    fn encode_ecma_array(&mut self, array: &Array) -> Result<(), AmfWriteError> {
        let len = u32::try_from(array.dense.len())
            .map_err(|_| AmfWriteError::LengthOverflow(array.dense.len()))?;

        self.buf().put_u8(Amf0Marker::EcmaArray as u8);
        self.buf().put_u32(len);
        for (index, value) in array.dense.iter().enumerate() {
            self.encode_property(&index.to_string(), value)?;
        }
        for (key, value) in &array.assoc {
            self.encode_property(key, value)?;
        }
        self.object_eof();
        Ok(())
    }

    fn encode_object(&mut self, object: &AmfObject) -> Result<(), AmfWriteError> {
        let info = resolve_class(object, self.avm_plus.context().registry());

        if info.is_anonymous() {
            self.buf().put_u8(Amf0Marker::Object as u8);
        } else {
            self.buf().put_u8(Amf0Marker::TypedObject as u8);
            self.buf().put_utf8_u16(&info.name)?;
        }

        match object {
            AmfObject::Dynamic(bag) => {
                for (key, value) in &bag.members {
                    self.encode_property(key, value)?;
                }
            }
            AmfObject::Typed(instance) => {
                for member in &info.members {
                    let value =
                        instance
                            .get_member(member)
                            .ok_or_else(|| AmfWriteError::MissingMember {
                                class: info.name.clone(),
                                member: member.clone(),
                            })?;
                    self.encode_property(member, &value)?;
                }
                if info.dynamic {
                    let members = instance
                        .dynamic_members()
                        .ok_or_else(|| AmfWriteError::MissingDynamicMembers(info.name.clone()))?;
                    for (key, value) in members.iter().filter(|(k, _)| !info.has_member(k)) {
                        self.encode_property(key, value)?;
                    }
                }
            }
        }

        self.object_eof();
        Ok(())
    }
}

/// Values only AMF3 can carry.
fn needs_avm_plus(value: &Value) -> bool {
    match value {
        Value::ByteArray(_) | Value::Vector(_) | Value::Dictionary(_) | Value::Xml(_) => true,
        Value::Object(object) => match object.as_ref() {
            AmfObject::Typed(instance) => instance.class_info().externalizable,
            AmfObject::Dynamic(_) => false,
        },
        _ => false,
    }
}

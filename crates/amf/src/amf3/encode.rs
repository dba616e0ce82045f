use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::AmfWriteError;
use crate::base::AmfBufMut;
use crate::context::SerializationContext;
use crate::define::{Amf3Marker, U29_MAX};
use crate::shape::{ClassInfo, resolve_class};
use crate::tables::{IdentityTable, WriteTable};
use crate::value::{AmfObject, Array, Dictionary, Value, Vector, VectorItems};

/// AMF3 encoder.
///
/// Appends values to an internal buffer. Reference tables persist across
/// [`encode`](Self::encode) calls until [`reset`](Self::reset), so a value seen
/// earlier in the pass is written as a reference.
#[derive(Debug)]
pub struct Amf3Encoder<'a> {
    context: &'a SerializationContext,
    pub(crate) buf: BytesMut,
    objects: IdentityTable,
    strings: WriteTable<String>,
    traits: WriteTable<ClassInfo>,
}

impl<'a> Amf3Encoder<'a> {
    /// Create a new AMF3 encoder.
    pub fn new(context: &'a SerializationContext) -> Self {
        Self {
            context,
            buf: BytesMut::new(),
            objects: IdentityTable::default(),
            strings: WriteTable::default(),
            traits: WriteTable::default(),
        }
    }

    /// The context this encoder resolves classes against.
    pub fn context(&self) -> &'a SerializationContext {
        self.context
    }

    /// Start a new pass, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.clear_tables();
    }

    fn clear_tables(&mut self) {
        self.objects.clear();
        self.strings.clear();
        self.traits.clear();
    }

    /// Take the bytes written so far. The reference tables are kept.
    pub fn take_bytes(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Raw access for externalizable payloads.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Encode a value into the buffer.
    pub fn encode(&mut self, value: &Value) -> Result<(), AmfWriteError> {
        self.write_value(value)
    }

    /// Write one value, sharing this pass's reference tables.
    pub fn write_value(&mut self, value: &Value) -> Result<(), AmfWriteError> {
        match value {
            Value::Undefined => self.buf.put_u8(Amf3Marker::Undefined as u8),
            Value::Null => self.buf.put_u8(Amf3Marker::Null as u8),
            Value::Boolean(false) => self.buf.put_u8(Amf3Marker::False as u8),
            Value::Boolean(true) => self.buf.put_u8(Amf3Marker::True as u8),
            Value::Integer(i) if Value::fits_int29(*i) => {
                self.buf.put_u8(Amf3Marker::Integer as u8);
                self.write_i29(*i);
            }
            Value::Integer(i) => {
                self.buf.put_u8(Amf3Marker::Double as u8);
                self.buf.put_f64_be(*i as f64);
            }
            Value::Double(d) => {
                self.buf.put_u8(Amf3Marker::Double as u8);
                self.buf.put_f64_be(*d);
            }
            Value::String(s) => {
                self.buf.put_u8(Amf3Marker::String as u8);
                self.write_string(s)?;
            }
            _ => self.write_referenceable(value)?,
        }
        Ok(())
    }

    fn write_referenceable(&mut self, value: &Value) -> Result<(), AmfWriteError> {
        let marker = match value {
            Value::Date(_) => Amf3Marker::Date,
            Value::Array(_) => Amf3Marker::Array,
            Value::Object(_) => Amf3Marker::Object,
            Value::ByteArray(_) => Amf3Marker::ByteArray,
            Value::Vector(vector) => match vector.items {
                VectorItems::Int(_) => Amf3Marker::VectorInt,
                VectorItems::UInt(_) => Amf3Marker::VectorUInt,
                VectorItems::Double(_) => Amf3Marker::VectorDouble,
                VectorItems::Object { .. } => Amf3Marker::VectorObject,
            },
            Value::Dictionary(_) => Amf3Marker::Dictionary,
            Value::Xml(xml) if xml.legacy => Amf3Marker::XmlDocument,
            _ => Amf3Marker::Xml,
        };
        self.buf.put_u8(marker as u8);

        if let Some(index) = self.objects.get(value) {
            return self.write_reference(index);
        }
        self.objects.insert(value);

        match value {
            Value::Date(date) => {
                self.write_u29(1)?;
                self.buf.put_f64_be(date.millis);
            }
            Value::Array(array) => self.write_array(array)?,
            Value::Object(object) => self.write_object(object)?,
            Value::ByteArray(bytes) => {
                self.write_length(bytes.len())?;
                self.buf.put_slice(bytes);
            }
            Value::Vector(vector) => self.write_vector(vector)?,
            Value::Dictionary(dictionary) => self.write_dictionary(dictionary)?,
            Value::Xml(xml) => {
                self.write_length(xml.source.len())?;
                self.buf.put_slice(xml.source.as_bytes());
            }
            _ => {}
        }
        Ok(())
    }

    /// Write an unsigned 29-bit integer.
    pub fn write_u29(&mut self, value: u32) -> Result<(), AmfWriteError> {
        if value > U29_MAX {
            return Err(AmfWriteError::LengthOverflow(value as usize));
        }
        self.put_int29(value);
        Ok(())
    }

    /// Write a signed 29-bit integer. Bits above the 29th are dropped.
    pub fn write_i29(&mut self, value: i32) {
        self.put_int29(value as u32 & U29_MAX);
    }

    fn put_int29(&mut self, v: u32) {
        if v < 0x80 {
            self.buf.put_u8(v as u8);
        } else if v < 0x4000 {
            self.buf.put_u8(((v >> 7) | 0x80) as u8);
            self.buf.put_u8((v & 0x7f) as u8);
        } else if v < 0x20_0000 {
            self.buf.put_u8(((v >> 14) | 0x80) as u8);
            self.buf.put_u8(((v >> 7) & 0x7f | 0x80) as u8);
            self.buf.put_u8((v & 0x7f) as u8);
        } else {
            self.buf.put_u8(((v >> 22) & 0x7f | 0x80) as u8);
            self.buf.put_u8(((v >> 15) & 0x7f | 0x80) as u8);
            self.buf.put_u8(((v >> 8) & 0x7f | 0x80) as u8);
            self.buf.put_u8((v & 0xff) as u8);
        }
    }

    /// Inline header carrying a length.
    fn write_length(&mut self, len: usize) -> Result<(), AmfWriteError> {
        match u32::try_from(len) {
            Ok(l) if l <= U29_MAX >> 1 => self.write_u29((l << 1) | 1),
            _ => Err(AmfWriteError::LengthOverflow(len)),
        }
    }

    fn write_reference(&mut self, index: usize) -> Result<(), AmfWriteError> {
        match u32::try_from(index) {
            Ok(i) if i <= U29_MAX >> 1 => self.write_u29(i << 1),
            _ => Err(AmfWriteError::LengthOverflow(index)),
        }
    }

    /// Write a string through the string table, without a marker.
    pub fn write_string(&mut self, value: &str) -> Result<(), AmfWriteError> {
        if value.is_empty() {
            return self.write_u29(1);
        }
        if let Some(index) = self.strings.get(value) {
            return self.write_reference(index);
        }

        self.strings.insert(value.to_owned());
        self.write_length(value.len())?;
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    fn write_array(&mut self, array: &Array) -> Result<(), AmfWriteError> {
        self.write_length(array.dense.len())?;

        for (key, value) in &array.assoc {
            if key.is_empty() {
                // An empty key terminates the associative part on the wire.
                warn!("dropping array entry with an empty key");
                continue;
            }
            self.write_string(key)?;
            self.write_value(value)?;
        }
        self.write_string("")?;

        for value in &array.dense {
            self.write_value(value)?;
        }
        Ok(())
    }

    fn write_vector(&mut self, vector: &Vector) -> Result<(), AmfWriteError> {
        self.write_length(vector.len())?;
        self.buf.put_u8(vector.fixed as u8);

        match &vector.items {
            VectorItems::Int(items) => items.iter().for_each(|i| self.buf.put_i32(*i)),
            VectorItems::UInt(items) => items.iter().for_each(|u| self.buf.put_u32(*u)),
            VectorItems::Double(items) => items.iter().for_each(|d| self.buf.put_f64_be(*d)),
            VectorItems::Object { type_name, items } => {
                self.write_string(type_name)?;
                for value in items {
                    self.write_value(value)?;
                }
            }
        }
        Ok(())
    }

    fn write_dictionary(&mut self, dictionary: &Dictionary) -> Result<(), AmfWriteError> {
        self.write_length(dictionary.entries.len())?;
        self.buf.put_u8(dictionary.weak_keys as u8);

        for (key, value) in &dictionary.entries {
            self.write_value(key)?;
            self.write_value(value)?;
        }
        Ok(())
    }

    fn write_trait(&mut self, info: &ClassInfo) -> Result<(), AmfWriteError> {
        if let Some(index) = self.traits.get(info) {
            return match u32::try_from(index) {
                Ok(i) if i <= U29_MAX >> 2 => self.write_u29((i << 2) | 0b01),
                _ => Err(AmfWriteError::LengthOverflow(index)),
            };
        }

        let count = info.members.len();
        let count = u32::try_from(count)
            .ok()
            .filter(|c| *c <= U29_MAX >> 4)
            .ok_or(AmfWriteError::LengthOverflow(count))?;
        let header = (count << 4)
            | (info.dynamic as u32) << 3
            | (info.externalizable as u32) << 2
            | 0b11;

        self.write_u29(header)?;
        self.write_string(&info.name)?;
        for member in &info.members {
            self.write_string(member)?;
        }

        self.traits.insert(info.clone());
        Ok(())
    }

    fn write_object(&mut self, object: &AmfObject) -> Result<(), AmfWriteError> {
        let info = resolve_class(object, self.context.registry());
        self.write_trait(&info)?;

        match object {
            AmfObject::Dynamic(bag) => {
                for (key, value) in &bag.members {
                    if key.is_empty() {
                        warn!(class = %bag.class_name, "dropping member with an empty name");
                        continue;
                    }
                    self.write_string(key)?;
                    self.write_value(value)?;
                }
                self.write_string("")
            }
            AmfObject::Typed(instance) => {
                if info.externalizable {
                    return instance.write_external(self);
                }

                for member in &info.members {
                    let value =
                        instance
                            .get_member(member)
                            .ok_or_else(|| AmfWriteError::MissingMember {
                                class: info.name.clone(),
                                member: member.clone(),
                            })?;
                    self.write_value(&value)?;
                }

                if info.dynamic {
                    let members = instance
                        .dynamic_members()
                        .ok_or_else(|| AmfWriteError::MissingDynamicMembers(info.name.clone()))?;
                    for (key, value) in members {
                        if key.is_empty() || info.has_member(&key) {
                            continue;
                        }
                        self.write_string(&key)?;
                        self.write_value(&value)?;
                    }
                    self.write_string("")?;
                }
                Ok(())
            }
        }
    }
}

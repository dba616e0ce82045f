use std::mem::size_of;
use std::sync::Arc;

use bytes::Bytes;
use num_traits::FromPrimitive;

use crate::AmfReadError;
use crate::amf3::Amf3Decoder;
use crate::base::ByteReader;
use crate::context::SerializationContext;
use crate::define::Amf0Marker;
use crate::shape::assign_member;
use crate::tables::ObjectSlots;
use crate::value::{AmfObject, Array, AsObject, Value, XmlDocument};

/// An AMF0 Decoder.
///
/// Values escaped through the avmplus marker are handed to an inner AMF3
/// decoder reading the same buffer, whose tables persist for the whole pass.
#[derive(Debug)]
pub struct Amf0Decoder<'a> {
    avm_plus: Amf3Decoder<'a>,
    objects: ObjectSlots,
    failed: bool,
}

impl<'a> Amf0Decoder<'a> {
    /// Create a new AMF0 decoder.
    pub fn new(buffer: Bytes, context: &'a SerializationContext) -> Self {
        Self {
            avm_plus: Amf3Decoder::new(buffer, context),
            objects: ObjectSlots::default(),
            failed: false,
        }
    }

    /// Start a new pass over `buffer`.
    pub fn reset(&mut self, buffer: Bytes) {
        self.avm_plus.reset(buffer);
        self.objects.clear();
        self.failed = false;
    }

    /// Check if the decoder has reached the end of the AMF0 data.
    pub fn is_empty(&self) -> bool {
        self.avm_plus.is_empty()
    }

    /// Bytes left in the buffer.
    pub fn remaining(&self) -> usize {
        self.avm_plus.remaining()
    }

    fn reader(&mut self) -> &mut ByteReader {
        &mut self.avm_plus.reader
    }

    fn context(&self) -> &'a SerializationContext {
        self.avm_plus.context()
    }

    /// Read all the encoded values from the decoder.
    /// Returns both successfully decoded values and any error that occurred.
    pub fn decode_all(&mut self) -> (Vec<Value>, Option<AmfReadError>) {
        let mut results = vec![];

        while !self.is_empty() {
            match self.decode() {
                Ok(value) => results.push(value),
                Err(err) => return (results, Some(err)),
            }
        }

        (results, None)
    }

    /// Read the next encoded value from the decoder.
    pub fn decode(&mut self) -> Result<Value, AmfReadError> {
        if self.failed {
            return Err(AmfReadError::PassAborted);
        }

        self.read_value().inspect_err(|_| self.failed = true)
    }

    /// Read the next value and check that it carries the specified marker.
    pub fn decode_with_type(
        &mut self,
        specified_marker: Amf0Marker,
    ) -> Result<Value, AmfReadError> {
        let marker = self.reader().peek_u8()?;
        if marker != specified_marker as u8 {
            self.failed = true;
            return Err(AmfReadError::WrongType {
                expected: specified_marker,
                got: marker,
            });
        }

        self.decode()
    }

    fn read_value(&mut self) -> Result<Value, AmfReadError> {
        let marker = self.reader().read_u8()?;
        let marker = Amf0Marker::from_u8(marker).ok_or(AmfReadError::UnknownMarker(marker))?;

        // Nesting is counted across escapes into AMF3.
        let max_depth = self.context().max_depth();
        if self.avm_plus.depth >= max_depth {
            return Err(AmfReadError::NestingTooDeep(max_depth));
        }

        self.avm_plus.depth += 1;
        let value = self.read_marked(marker);
        self.avm_plus.depth -= 1;
        value
    }

    fn read_marked(&mut self, marker: Amf0Marker) -> Result<Value, AmfReadError> {
        let value = match marker {
            Amf0Marker::Number => Value::Double(self.reader().read_f64()?),
            Amf0Marker::Boolean => Value::Boolean(self.reader().read_u8()? > 0),
            Amf0Marker::String => Value::String(self.read_string()?),
            Amf0Marker::LongString => Value::String(self.read_long_string()?),
            Amf0Marker::Null => Value::Null,
            Amf0Marker::Undefined => Value::Undefined,
            Amf0Marker::Object => self.read_object(String::new())?,
            Amf0Marker::TypedObject => {
                let class_name = self.read_string()?;
                self.read_object(class_name)?
            }
            Amf0Marker::EcmaArray => self.read_ecma_array()?,
            Amf0Marker::StrictArray => self.read_strict_array()?,
            Amf0Marker::Date => self.read_date()?,
            Amf0Marker::Reference => {
                let index = self.reader().read_u16()?;
                self.objects.get(index as usize)?
            }
            Amf0Marker::XmlDocument => Value::Xml(Arc::new(XmlDocument {
                source: self.read_long_string()?,
                legacy: true,
            })),
            Amf0Marker::AVMPlusObject => self.avm_plus.read_value()?,
            Amf0Marker::MovieClipMarker
            | Amf0Marker::ObjectEnd
            | Amf0Marker::Unsupported
            | Amf0Marker::Recordset => return Err(AmfReadError::UnsupportedMarker(marker)),
        };

        Ok(value)
    }

    fn read_string(&mut self) -> Result<String, AmfReadError> {
        let len = self.reader().read_u16()? as usize;
        self.context().check_allocation(len, 1)?;
        self.reader().read_utf8(len)
    }

    fn read_long_string(&mut self) -> Result<String, AmfReadError> {
        let len = self.reader().read_u32()? as usize;
        self.context().check_allocation(len, 1)?;
        self.reader().read_utf8(len)
    }

    /// The next property, `None` once the object end marker is consumed.
    fn read_property(&mut self) -> Result<Option<(String, Value)>, AmfReadError> {
        let key = self.read_string()?;
        if key.is_empty() {
            let end = self.reader().read_u8()?;
            if end != Amf0Marker::ObjectEnd as u8 {
                return Err(AmfReadError::InvalidObjectEnd(end));
            }
            return Ok(None);
        }

        let value = self.read_value()?;
        Ok(Some((key, value)))
    }

    fn read_object(&mut self, class_name: String) -> Result<Value, AmfReadError> {
        let slot = self.objects.reserve();

        let object = match self.context().instantiate(&class_name)? {
            Some(mut instance) => {
                while let Some((key, value)) = self.read_property()? {
                    assign_member(instance.as_mut(), key, value)?;
                }
                AmfObject::Typed(instance)
            }
            None => {
                let mut bag = AsObject::named(class_name);
                while let Some(property) = self.read_property()? {
                    bag.members.push(property);
                }
                AmfObject::Dynamic(bag)
            }
        };

        let value = Value::Object(Arc::new(object));
        self.objects.fill(slot, value.clone());
        Ok(value)
    }

    /// The count field holds the dense length. Only the leading keys
    /// `"0"..count` return to the dense part.
    fn read_ecma_array(&mut self) -> Result<Value, AmfReadError> {
        let count = self.reader().read_u32()? as usize;
        let slot = self.objects.reserve();

        let mut array = Array::default();
        let mut read = 0;
        loop {
            // Some writers omit the end marker after the last entry.
            if read >= count && self.is_empty() {
                break;
            }
            let Some((key, value)) = self.read_property()? else {
                break;
            };
            read += 1;

            let leading = array.assoc.is_empty() && array.dense.len() < count;
            if leading && key == array.dense.len().to_string() {
                array.dense.push(value);
            } else {
                array.assoc.push((key, value));
            }
        }

        let value = Value::from(array);
        self.objects.fill(slot, value.clone());
        Ok(value)
    }

    fn read_strict_array(&mut self) -> Result<Value, AmfReadError> {
        let len = self.reader().read_u32()? as usize;
        let slot = self.objects.reserve();

        self.context().check_allocation(len, size_of::<Value>())?;
        let mut values = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            values.push(self.read_value()?);
        }

        let value = Value::array(values);
        self.objects.fill(slot, value.clone());
        Ok(value)
    }

    fn read_date(&mut self) -> Result<Value, AmfReadError> {
        let millis = self.reader().read_f64()?;
        // Time zone, always written as zero.
        self.reader().read_i16()?;

        let value = Value::date(millis);
        self.objects.push(value.clone());
        Ok(value)
    }
}

impl Iterator for Amf0Decoder<'_> {
    type Item = Result<Value, AmfReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() || self.failed {
            return None;
        }

        Some(self.decode())
    }
}

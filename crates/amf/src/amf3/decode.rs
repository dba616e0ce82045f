use std::mem::size_of;
use std::sync::Arc;

use bytes::Bytes;
use num_traits::FromPrimitive;

use crate::AmfReadError;
use crate::base::ByteReader;
use crate::context::SerializationContext;
use crate::define::Amf3Marker;
use crate::shape::{ClassInfo, assign_member};
use crate::tables::{ObjectSlots, ReadTable};
use crate::value::{
    AmfObject, Array, AsObject, Dictionary, Value, Vector, VectorItems, XmlDocument,
};

/// An inline header or a resolved object reference.
enum Header {
    Reference(Value),
    Inline(usize),
}

/// An AMF3 Decoder.
///
/// Reads values out of a [`Bytes`] buffer. The three reference tables live as
/// long as the current pass: until [`reset`](Self::reset) is called, every
/// decoded value can be referenced by the ones that follow it.
///
/// Any error ends the pass. Later calls fail with [`AmfReadError::PassAborted`].
#[derive(Debug)]
pub struct Amf3Decoder<'a> {
    context: &'a SerializationContext,
    pub(crate) reader: ByteReader,
    objects: ObjectSlots,
    strings: ReadTable<String>,
    traits: ReadTable<Arc<ClassInfo>>,
    pub(crate) depth: usize,
    failed: bool,
}

impl<'a> Amf3Decoder<'a> {
    /// Create a new AMF3 decoder.
    pub fn new(buffer: Bytes, context: &'a SerializationContext) -> Self {
        Self {
            context,
            reader: ByteReader::new(buffer),
            objects: ObjectSlots::default(),
            strings: ReadTable::new("string"),
            traits: ReadTable::new("trait"),
            depth: 0,
            failed: false,
        }
    }

    /// Start a new pass over `buffer`.
    pub fn reset(&mut self, buffer: Bytes) {
        self.reader = ByteReader::new(buffer);
        self.clear_tables();
        self.depth = 0;
        self.failed = false;
    }

    fn clear_tables(&mut self) {
        self.objects.clear();
        self.strings.clear();
        self.traits.clear();
    }

    /// The context this decoder resolves classes against.
    pub fn context(&self) -> &'a SerializationContext {
        self.context
    }

    /// Check if the decoder has reached the end of the buffer.
    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    /// Bytes left in the buffer.
    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }

    /// Raw access for externalizable payloads.
    pub fn reader(&mut self) -> &mut ByteReader {
        &mut self.reader
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

    /// Read one value, sharing this pass's reference tables.
    ///
    /// This is what externalizable hooks call for nested values.
    pub fn read_value(&mut self) -> Result<Value, AmfReadError> {
        let marker = self.reader.read_u8()?;
        let marker = Amf3Marker::from_u8(marker).ok_or(AmfReadError::UnknownMarker(marker))?;

        let max_depth = self.context.max_depth();
        if self.depth >= max_depth {
            return Err(AmfReadError::NestingTooDeep(max_depth));
        }

        self.depth += 1;
        let value = self.read_marked(marker);
        self.depth -= 1;
        value
    }

    fn read_marked(&mut self, marker: Amf3Marker) -> Result<Value, AmfReadError> {
        match marker {
            Amf3Marker::Undefined => Ok(Value::Undefined),
            Amf3Marker::Null => Ok(Value::Null),
            Amf3Marker::False => Ok(Value::Boolean(false)),
            Amf3Marker::True => Ok(Value::Boolean(true)),
            Amf3Marker::Integer => Ok(Value::Integer(self.read_i29()?)),
            Amf3Marker::Double => Ok(Value::Double(self.reader.read_f64()?)),
            Amf3Marker::String => Ok(Value::String(self.read_string()?)),
            Amf3Marker::XmlDocument => self.read_xml(true),
            Amf3Marker::Xml => self.read_xml(false),
            Amf3Marker::Date => self.read_date(),
            Amf3Marker::Array => self.read_array(),
            Amf3Marker::Object => self.read_object(),
            Amf3Marker::ByteArray => self.read_byte_array(),
            Amf3Marker::VectorInt
            | Amf3Marker::VectorUInt
            | Amf3Marker::VectorDouble
            | Amf3Marker::VectorObject => self.read_vector(marker),
            Amf3Marker::Dictionary => self.read_dictionary(),
        }
    }

    /// Read an unsigned 29-bit integer.
    pub fn read_u29(&mut self) -> Result<u32, AmfReadError> {
        let mut result = 0u32;

        for _ in 0..3 {
            let byte = self.reader.read_u8()?;
            result = (result << 7) | (byte & 0x7f) as u32;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }

        // The fourth byte contributes all eight bits.
        let byte = self.reader.read_u8()?;
        Ok((result << 8) | byte as u32)
    }

    /// Read a signed 29-bit integer.
    pub fn read_i29(&mut self) -> Result<i32, AmfReadError> {
        let value = self.read_u29()?;
        Ok(((value << 3) as i32) >> 3)
    }

    /// Read a string through the string table.
    pub fn read_string(&mut self) -> Result<String, AmfReadError> {
        let header = self.read_u29()? as usize;
        if header & 1 == 0 {
            return Ok(self.strings.get(header >> 1)?.clone());
        }

        let len = header >> 1;
        if len == 0 {
            return Ok(String::new());
        }

        self.context.check_allocation(len, 1)?;
        let value = self.reader.read_utf8(len)?;
        self.strings.push(value.clone());
        Ok(value)
    }

    fn read_header(&mut self) -> Result<Header, AmfReadError> {
        let header = self.read_u29()? as usize;
        if header & 1 == 0 {
            return Ok(Header::Reference(self.objects.get(header >> 1)?));
        }
        Ok(Header::Inline(header >> 1))
    }

    /// Capacity to preallocate for `len` items of at least `min_size` wire bytes each.
    fn capacity(&self, len: usize, min_size: usize) -> usize {
        len.min(self.reader.remaining() / min_size.max(1))
    }

    fn read_xml(&mut self, legacy: bool) -> Result<Value, AmfReadError> {
        let len = match self.read_header()? {
            Header::Reference(value) => return Ok(value),
            Header::Inline(len) => len,
        };

        self.context.check_allocation(len, 1)?;
        let source = self.reader.read_utf8(len)?;
        let value = Value::Xml(Arc::new(XmlDocument { source, legacy }));
        self.objects.push(value.clone());
        Ok(value)
    }

    fn read_date(&mut self) -> Result<Value, AmfReadError> {
        if let Header::Reference(value) = self.read_header()? {
            return Ok(value);
        }

        let value = Value::date(self.reader.read_f64()?);
        self.objects.push(value.clone());
        Ok(value)
    }

    fn read_byte_array(&mut self) -> Result<Value, AmfReadError> {
        let len = match self.read_header()? {
            Header::Reference(value) => return Ok(value),
            Header::Inline(len) => len,
        };

        self.context.check_allocation(len, 1)?;
        let value = Value::byte_array(self.reader.read_bytes(len)?);
        self.objects.push(value.clone());
        Ok(value)
    }

    fn read_array(&mut self) -> Result<Value, AmfReadError> {
        let len = match self.read_header()? {
            Header::Reference(value) => return Ok(value),
            Header::Inline(len) => len,
        };

        let slot = self.objects.reserve();

        let mut assoc = Vec::new();
        loop {
            let key = self.read_string()?;
            if key.is_empty() {
                break;
            }
            let value = self.read_value()?;
            assoc.push((key, value));
        }

        self.context.check_allocation(len, size_of::<Value>())?;
        let mut dense = Vec::with_capacity(self.capacity(len, 1));
        for _ in 0..len {
            dense.push(self.read_value()?);
        }

        let value = Value::Array(Arc::new(Array { dense, assoc }));
        self.objects.fill(slot, value.clone());
        Ok(value)
    }

    fn read_vector(&mut self, marker: Amf3Marker) -> Result<Value, AmfReadError> {
        let len = match self.read_header()? {
            Header::Reference(value) => return Ok(value),
            Header::Inline(len) => len,
        };

        let slot = self.objects.reserve();
        let fixed = self.reader.read_u8()? != 0;

        let items = match marker {
            Amf3Marker::VectorInt => {
                self.context.check_allocation(len, 4)?;
                let mut items = Vec::with_capacity(self.capacity(len, 4));
                for _ in 0..len {
                    items.push(self.reader.read_i32()?);
                }
                VectorItems::Int(items)
            }
            Amf3Marker::VectorUInt => {
                self.context.check_allocation(len, 4)?;
                let mut items = Vec::with_capacity(self.capacity(len, 4));
                for _ in 0..len {
                    items.push(self.reader.read_u32()?);
                }
                VectorItems::UInt(items)
            }
            Amf3Marker::VectorDouble => {
                self.context.check_allocation(len, 8)?;
                let mut items = Vec::with_capacity(self.capacity(len, 8));
                for _ in 0..len {
                    items.push(self.reader.read_f64()?);
                }
                VectorItems::Double(items)
            }
            _ => {
                let type_name = self.read_string()?;
                self.context.check_allocation(len, size_of::<Value>())?;
                let mut items = Vec::with_capacity(self.capacity(len, 1));
                for _ in 0..len {
                    items.push(self.read_value()?);
                }
                VectorItems::Object { type_name, items }
            }
        };

        let value = Value::vector(Vector { fixed, items });
        self.objects.fill(slot, value.clone());
        Ok(value)
    }

    fn read_dictionary(&mut self) -> Result<Value, AmfReadError> {
        let len = match self.read_header()? {
            Header::Reference(value) => return Ok(value),
            Header::Inline(len) => len,
        };

        let slot = self.objects.reserve();
        let weak_keys = self.reader.read_u8()? != 0;

        self.context
            .check_allocation(len, size_of::<(Value, Value)>())?;
        let mut entries = Vec::with_capacity(self.capacity(len, 2));
        for _ in 0..len {
            let key = self.read_value()?;
            let value = self.read_value()?;
            entries.push((key, value));
        }

        let value = Value::dictionary(Dictionary { weak_keys, entries });
        self.objects.fill(slot, value.clone());
        Ok(value)
    }

    fn read_object(&mut self) -> Result<Value, AmfReadError> {
        let header = self.read_u29()? as usize;
        if header & 1 == 0 {
            return self.objects.get(header >> 1);
        }

        let info = self.read_trait(header)?;
        let slot = self.objects.reserve();

        let object = if info.externalizable {
            self.read_external_object(&info)?
        } else {
            self.read_members(&info)?
        };

        let value = Value::Object(Arc::new(object));
        self.objects.fill(slot, value.clone());
        Ok(value)
    }

    fn read_trait(&mut self, header: usize) -> Result<Arc<ClassInfo>, AmfReadError> {
        if header & 0b10 == 0 {
            return Ok(self.traits.get(header >> 2)?.clone());
        }

        let externalizable = header & 0b100 != 0;
        let dynamic = header & 0b1000 != 0;
        let count = header >> 4;

        let name = self.read_string()?;
        self.context.check_allocation(count, size_of::<String>())?;
        let mut members = Vec::with_capacity(self.capacity(count, 1));
        for _ in 0..count {
            members.push(self.read_string()?);
        }

        let info = Arc::new(ClassInfo {
            name,
            members,
            dynamic,
            externalizable,
        });
        self.traits.push(info.clone());
        Ok(info)
    }

    fn read_external_object(&mut self, info: &ClassInfo) -> Result<AmfObject, AmfReadError> {
        let Some(mut instance) = self.context.instantiate(&info.name)? else {
            // Nothing knows how long the payload is.
            return Err(AmfReadError::OpaqueExternalizable(info.name.clone()));
        };

        instance.read_external(self)?;
        Ok(AmfObject::Typed(instance))
    }

    fn read_members(&mut self, info: &ClassInfo) -> Result<AmfObject, AmfReadError> {
        match self.context.instantiate(&info.name)? {
            Some(mut instance) => {
                for member in &info.members {
                    let value = self.read_value()?;
                    assign_member(instance.as_mut(), member.clone(), value)?;
                }
                if info.dynamic {
                    while let Some((key, value)) = self.read_dynamic_member()? {
                        assign_member(instance.as_mut(), key, value)?;
                    }
                }
                Ok(AmfObject::Typed(instance))
            }
            None => {
                let mut bag = AsObject::named(info.name.clone());
                for member in &info.members {
                    let value = self.read_value()?;
                    bag.members.push((member.clone(), value));
                }
                if info.dynamic {
                    while let Some(member) = self.read_dynamic_member()? {
                        bag.members.push(member);
                    }
                }
                Ok(AmfObject::Dynamic(bag))
            }
        }
    }

    /// The next entry of a dynamic tail, `None` at the empty-key terminator.
    fn read_dynamic_member(&mut self) -> Result<Option<(String, Value)>, AmfReadError> {
        let key = self.read_string()?;
        if key.is_empty() {
            return Ok(None);
        }
        let value = self.read_value()?;
        Ok(Some((key, value)))
    }
}

impl Iterator for Amf3Decoder<'_> {
    type Item = Result<Value, AmfReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() || self.failed {
            return None;
        }

        Some(self.decode())
    }
}

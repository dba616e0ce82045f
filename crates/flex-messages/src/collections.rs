//! Externalizable wrappers Flex peers use for lists and bindable objects.

use std::sync::OnceLock;

use amf::{Amf3Decoder, Amf3Encoder, AmfReadError, AmfWriteError, Shape, Value, impl_amf_class};

pub const ARRAY_COLLECTION: &str = "flex.messaging.io.ArrayCollection";
pub const OBJECT_PROXY: &str = "flex.messaging.io.ObjectProxy";

/// A list whose payload is its source array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayCollection {
    pub source: Vec<Value>,
}

impl ArrayCollection {
    pub fn new(source: Vec<Value>) -> Self {
        Self { source }
    }
}

impl From<ArrayCollection> for Value {
    fn from(value: ArrayCollection) -> Self {
        Value::typed(value)
    }
}

fn array_collection_shape() -> &'static Shape<ArrayCollection> {
    static SHAPE: OnceLock<Shape<ArrayCollection>> = OnceLock::new();
    SHAPE.get_or_init(|| {
        Shape::<ArrayCollection>::builder(ARRAY_COLLECTION)
            .externalizable()
            .build()
    })
}

impl_amf_class!(ArrayCollection, array_collection_shape(), {
    fn write_external(&self, output: &mut Amf3Encoder<'_>) -> Result<(), AmfWriteError> {
        output.write_value(&Value::array(self.source.clone()))
    }

    fn read_external(&mut self, input: &mut Amf3Decoder<'_>) -> Result<(), AmfReadError> {
        self.source = input
            .read_value()?
            .convert::<Option<Vec<Value>>>()?
            .unwrap_or_default();
        Ok(())
    }
});

/// Wraps a single object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectProxy {
    pub object: Value,
}

impl ObjectProxy {
    pub fn new(object: Value) -> Self {
        Self { object }
    }
}

impl From<ObjectProxy> for Value {
    fn from(value: ObjectProxy) -> Self {
        Value::typed(value)
    }
}

fn object_proxy_shape() -> &'static Shape<ObjectProxy> {
    static SHAPE: OnceLock<Shape<ObjectProxy>> = OnceLock::new();
    SHAPE.get_or_init(|| {
        Shape::<ObjectProxy>::builder(OBJECT_PROXY)
            .externalizable()
            .build()
    })
}

impl_amf_class!(ObjectProxy, object_proxy_shape(), {
    fn write_external(&self, output: &mut Amf3Encoder<'_>) -> Result<(), AmfWriteError> {
        output.write_value(&self.object)
    }

    fn read_external(&mut self, input: &mut Amf3Decoder<'_>) -> Result<(), AmfReadError> {
        self.object = input.read_value()?;
        Ok(())
    }
});

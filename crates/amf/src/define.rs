use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

/// AMF0 marker types.
/// Defined in amf0_spec_121207.pdf section 2.1
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive)]
#[repr(u8)]
pub enum Amf0Marker {
    /// number-marker
    Number = 0x00,
    /// boolean-marker
    Boolean = 0x01,
    /// string-marker
    String = 0x02,
    /// object-marker
    Object = 0x03,
    /// movieclip-marker
    ///
    /// reserved, not supported
    MovieClipMarker = 0x04,
    /// null-marker
    Null = 0x05,
    /// undefined-marker
    Undefined = 0x06,
    /// reference-marker
    Reference = 0x07,
    /// ecma-array-marker
    EcmaArray = 0x08,
    /// object-end-marker
    ObjectEnd = 0x09,
    /// strict-array-marker
    StrictArray = 0x0a,
    /// date-marker
    Date = 0x0b,
    /// long-string-marker
    LongString = 0x0c,
    /// unsupported-marker
    Unsupported = 0x0d,
    /// recordset-marker
    ///
    /// reserved, not supported
    Recordset = 0x0e,
    /// xml-document-marker
    XmlDocument = 0x0f,
    /// typed-object-marker
    TypedObject = 0x10,
    /// avmplus-object-marker
    ///
    /// the next value is AMF3 encoded
    AVMPlusObject = 0x11,
}

/// AMF3 marker types.
/// Defined in amf3_spec_121207.pdf section 3.1
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive)]
#[repr(u8)]
pub enum Amf3Marker {
    /// undefined-marker
    Undefined = 0x00,
    /// null-marker
    Null = 0x01,
    /// false-marker
    False = 0x02,
    /// true-marker
    True = 0x03,
    /// integer-marker
    Integer = 0x04,
    /// double-marker
    Double = 0x05,
    /// string-marker
    String = 0x06,
    /// xml-doc-marker
    XmlDocument = 0x07,
    /// date-marker
    Date = 0x08,
    /// array-marker
    Array = 0x09,
    /// object-marker
    Object = 0x0a,
    /// xml-marker
    Xml = 0x0b,
    /// byte-array-marker
    ByteArray = 0x0c,
    /// vector-int-marker
    VectorInt = 0x0d,
    /// vector-uint-marker
    VectorUInt = 0x0e,
    /// vector-double-marker
    VectorDouble = 0x0f,
    /// vector-object-marker
    VectorObject = 0x10,
    /// dictionary-marker
    Dictionary = 0x11,
}

/// Wire encoding selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmfVersion {
    /// The original encoding.
    Amf0,
    /// The encoding introduced with ActionScript 3.
    #[default]
    Amf3,
}

/// Smallest value an AMF3 integer can carry.
pub const INT29_MIN: i32 = -(1 << 28);
/// Largest value an AMF3 integer can carry.
pub const INT29_MAX: i32 = (1 << 28) - 1;
/// Largest unsigned value (lengths, indices) an inline header can carry.
pub const U29_MAX: u32 = (1 << 29) - 1;

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use num_traits::FromPrimitive;

    use super::*;

    #[test]
    fn test_amf0_marker_primitive() {
        let cases = [
            (Amf0Marker::Number, 0x00),
            (Amf0Marker::Boolean, 0x01),
            (Amf0Marker::String, 0x02),
            (Amf0Marker::Object, 0x03),
            (Amf0Marker::MovieClipMarker, 0x04),
            (Amf0Marker::Null, 0x05),
            (Amf0Marker::Undefined, 0x06),
            (Amf0Marker::Reference, 0x07),
            (Amf0Marker::EcmaArray, 0x08),
            (Amf0Marker::ObjectEnd, 0x09),
            (Amf0Marker::StrictArray, 0x0a),
            (Amf0Marker::Date, 0x0b),
            (Amf0Marker::LongString, 0x0c),
            (Amf0Marker::Unsupported, 0x0d),
            (Amf0Marker::Recordset, 0x0e),
            (Amf0Marker::XmlDocument, 0x0f),
            (Amf0Marker::TypedObject, 0x10),
            (Amf0Marker::AVMPlusObject, 0x11),
        ];

        for (marker, value) in cases {
            assert_eq!(marker as u8, value);
            assert_eq!(Amf0Marker::from_u8(value), Some(marker));
        }

        assert!(Amf0Marker::from_u8(0x12).is_none());
    }

    #[test]
    fn test_amf3_marker_primitive() {
        for value in 0x00..=0x11u8 {
            let marker = Amf3Marker::from_u8(value).unwrap();
            assert_eq!(marker as u8, value);
        }

        assert_eq!(Amf3Marker::from_u8(0x0a), Some(Amf3Marker::Object));
        assert_eq!(Amf3Marker::from_u8(0x11), Some(Amf3Marker::Dictionary));
        assert!(Amf3Marker::from_u8(0x12).is_none());
    }

    #[test]
    fn test_int29_bounds() {
        assert_eq!(INT29_MAX, 268_435_455);
        assert_eq!(INT29_MIN, -268_435_456);
        assert_eq!(U29_MAX, 0x1FFF_FFFF);
    }
}

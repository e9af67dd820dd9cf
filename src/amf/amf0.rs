//! AMF0 encoder and decoder
//!
//! AMF0 is the original Action Message Format used by Flash Remoting and
//! RTMP. Reference: AMF0 File Format Specification
//! (amf0-file-format-specification.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x04 - MovieClip (reserved, not supported)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x07 - Reference (16-bit index)
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! 0x0E - RecordSet (reserved, not supported)
//! 0x0F - XML Document
//! 0x10 - Typed Object (class name + properties)
//! 0x11 - AVM+ (switch to AMF3)
//! ```
//!
//! On the AVM+ marker the decoder hands exactly one value to the AMF3
//! codec with a fresh set of AMF3 reference tables; the surrounding AMF0
//! context and its own reference table resume unaffected. The AMF0
//! reference table is entirely separate from the AMF3 tables.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::amf3::{Amf3Decoder, Amf3Encoder};
use super::value::{Array, Object, Value};
use super::{DEFAULT_MAX_ALLOCATION, DEFAULT_MAX_DEPTH};
use crate::error::{AmfError, RefKind};
use crate::registry::ExternalizableRegistry;

// AMF0 type markers
const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;
const MARKER_AVMPLUS: u8 = 0x11;

/// AMF0 decoder
///
/// Keeps the AMF0 reference table for one message. Call [`reset`] (or use
/// a fresh decoder) between messages.
///
/// [`reset`]: Amf0Decoder::reset
pub struct Amf0Decoder<'r> {
    /// Reference table for complex values (marker 0x07)
    references: Vec<Value>,
    registry: Option<&'r ExternalizableRegistry>,
    max_depth: usize,
    max_allocation: usize,
    allocated: usize,
    depth: usize,
}

impl<'r> Amf0Decoder<'r> {
    /// Create a new decoder with default settings
    pub fn new() -> Self {
        Self {
            references: Vec::new(),
            registry: None,
            max_depth: DEFAULT_MAX_DEPTH,
            max_allocation: DEFAULT_MAX_ALLOCATION,
            allocated: 0,
            depth: 0,
        }
    }

    /// Attach a registry so the AVM+ bridge can resolve externalizable
    /// classes
    pub fn registry(mut self, registry: &'r ExternalizableRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the nesting depth and allocation ceilings
    pub fn limits(mut self, max_depth: usize, max_allocation: usize) -> Self {
        self.max_depth = max_depth;
        self.max_allocation = max_allocation;
        self
    }

    /// Reset decoder state (call between messages)
    pub fn reset(&mut self) {
        self.references.clear();
        self.allocated = 0;
        self.depth = 0;
    }

    /// Decode a single AMF0 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }

        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values from the buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<Value>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<Value, AmfError> {
        match marker {
            MARKER_NUMBER => self.decode_number(buf),
            MARKER_BOOLEAN => self.decode_boolean(buf),
            MARKER_STRING => Ok(Value::String(self.read_utf8(buf)?)),
            MARKER_OBJECT => self.decode_object(buf, String::new()),
            MARKER_NULL => Ok(Value::Null),
            MARKER_UNDEFINED => Ok(Value::Undefined),
            MARKER_REFERENCE => self.decode_reference(buf),
            MARKER_ECMA_ARRAY => self.decode_ecma_array(buf),
            MARKER_STRICT_ARRAY => self.decode_strict_array(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_LONG_STRING => Ok(Value::String(self.read_utf8_long(buf)?)),
            MARKER_UNSUPPORTED => Ok(Value::Undefined),
            MARKER_XML_DOCUMENT => self.decode_xml(buf),
            MARKER_TYPED_OBJECT => {
                let class_name = self.read_utf8(buf)?;
                self.decode_object(buf, class_name)
            }
            MARKER_AVMPLUS => self.decode_avmplus(buf),
            _ => Err(AmfError::UnknownMarker { marker, version: 0 }),
        }
    }

    fn decode_number(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.remaining() < 8 {
            return Err(AmfError::Truncated);
        }
        Ok(Value::Double(buf.get_f64()))
    }

    fn decode_boolean(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }
        Ok(Value::Bool(buf.get_u8() != 0))
    }

    /// Object and typed object share a body: key/value pairs terminated by
    /// an empty key plus the object-end marker
    fn decode_object(&mut self, buf: &mut Bytes, class_name: String) -> Result<Value, AmfError> {
        // AMF0 objects are untyped property bags; they carry the dynamic
        // trait flag if re-encoded as AMF3
        let rc = Rc::new(RefCell::new(Object {
            class_name,
            is_dynamic: true,
            ..Default::default()
        }));
        self.references.push(Value::Object(rc.clone()));

        loop {
            let key = self.read_utf8(buf)?;
            if key.is_empty() {
                self.expect_object_end(buf)?;
                break;
            }
            let value = self.decode(buf)?;
            rc.borrow_mut().dynamic.push((key, value));
        }

        Ok(Value::Object(rc))
    }

    fn decode_ecma_array(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::Truncated);
        }
        // Count is a hint only; the body is delimited like an object
        let _count = buf.get_u32();

        let rc = Rc::new(RefCell::new(Array::default()));
        self.references.push(Value::Array(rc.clone()));

        loop {
            let key = self.read_utf8(buf)?;
            if key.is_empty() {
                self.expect_object_end(buf)?;
                break;
            }
            let value = self.decode(buf)?;
            rc.borrow_mut().assoc.push((key, value));
        }

        Ok(Value::Array(rc))
    }

    fn decode_strict_array(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::Truncated);
        }
        let count = buf.get_u32() as usize;

        let rc = Rc::new(RefCell::new(Array::default()));
        self.references.push(Value::Array(rc.clone()));

        for _ in 0..count {
            let value = self.decode(buf)?;
            rc.borrow_mut().dense.push(value);
        }

        Ok(Value::Array(rc))
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.remaining() < 10 {
            return Err(AmfError::Truncated);
        }
        let millis = buf.get_f64();
        // Timezone field is reserved; ignored on read, zero on write
        let _timezone = buf.get_i16();
        Ok(Value::date(millis))
    }

    fn decode_reference(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.remaining() < 2 {
            return Err(AmfError::Truncated);
        }
        let index = buf.get_u16() as usize;
        self.references
            .get(index)
            .cloned()
            .ok_or(AmfError::BadReference { kind: RefKind::Object, index })
    }

    fn decode_xml(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let s = self.read_utf8_long(buf)?;
        Ok(Value::XmlDoc(Rc::new(s)))
    }

    /// AMF3 value embedded in the AMF0 stream: decode exactly one value
    /// with fresh AMF3 reference tables
    fn decode_avmplus(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let mut decoder = Amf3Decoder::new().limits(self.max_depth, self.max_allocation);
        if let Some(registry) = self.registry {
            decoder = decoder.registry(registry);
        }
        let value = decoder.decode(buf)?;
        Ok(Value::AvmPlus(Box::new(value)))
    }

    fn expect_object_end(&mut self, buf: &mut Bytes) -> Result<(), AmfError> {
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }
        let marker = buf.get_u8();
        if marker != MARKER_OBJECT_END {
            return Err(AmfError::UnknownMarker { marker, version: 0 });
        }
        Ok(())
    }

    /// Guard a length-prefixed allocation against the remaining buffer and
    /// the cumulative per-message ceiling
    fn reserve(&mut self, len: usize, buf: &Bytes) -> Result<(), AmfError> {
        if len > buf.remaining() {
            return Err(AmfError::OutOfRange);
        }
        self.allocated = self.allocated.saturating_add(len);
        if self.allocated > self.max_allocation {
            return Err(AmfError::OutOfRange);
        }
        Ok(())
    }

    /// Read UTF-8 string with 16-bit length prefix
    fn read_utf8(&mut self, buf: &mut Bytes) -> Result<String, AmfError> {
        if buf.remaining() < 2 {
            return Err(AmfError::Truncated);
        }
        let len = buf.get_u16() as usize;
        self.reserve(len, buf)?;
        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
    }

    /// Read UTF-8 string with 32-bit length prefix
    fn read_utf8_long(&mut self, buf: &mut Bytes) -> Result<String, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::Truncated);
        }
        let len = buf.get_u32() as usize;
        self.reserve(len, buf)?;
        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
    }
}

impl Default for Amf0Decoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF0 encoder
///
/// Complex values already written in this message are emitted as 16-bit
/// references (marker 0x07), keyed by allocation identity.
pub struct Amf0Encoder<'r> {
    buf: BytesMut,
    references: HashMap<usize, usize>,
    ref_count: usize,
    registry: Option<&'r ExternalizableRegistry>,
}

impl<'r> Amf0Encoder<'r> {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create encoder with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            references: HashMap::new(),
            ref_count: 0,
            registry: None,
        }
    }

    /// Attach a registry so the AVM+ bridge can write externalizable
    /// classes
    pub fn registry(mut self, registry: &'r ExternalizableRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Reset the reference table (call between messages)
    pub fn reset(&mut self) {
        self.references.clear();
        self.ref_count = 0;
    }

    /// Encode a single AMF0 value
    pub fn encode(&mut self, value: &Value) -> Result<(), AmfError> {
        match value {
            Value::Undefined => {
                self.buf.put_u8(MARKER_UNDEFINED);
                Ok(())
            }
            Value::Null => {
                self.buf.put_u8(MARKER_NULL);
                Ok(())
            }
            Value::Bool(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
                Ok(())
            }
            // AMF0 has no integer type
            Value::Integer(i) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*i as f64);
                Ok(())
            }
            Value::Double(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
                Ok(())
            }
            Value::String(s) => self.encode_string(s),
            Value::Date(rc) => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(rc.get());
                self.buf.put_i16(0);
                Ok(())
            }
            Value::XmlDoc(rc) => {
                if rc.len() > u32::MAX as usize {
                    return Err(AmfError::OutOfRange);
                }
                self.buf.put_u8(MARKER_XML_DOCUMENT);
                self.buf.put_u32(rc.len() as u32);
                self.buf.put_slice(rc.as_bytes());
                Ok(())
            }
            Value::Array(rc) => {
                if let Some(index) = self.reference_for(Rc::as_ptr(rc) as usize) {
                    self.buf.put_u8(MARKER_REFERENCE);
                    self.buf.put_u16(index);
                    return Ok(());
                }
                let arr = rc.borrow();
                if arr.assoc.is_empty() {
                    self.buf.put_u8(MARKER_STRICT_ARRAY);
                    self.buf.put_u32(arr.dense.len() as u32);
                    for item in &arr.dense {
                        self.encode(item)?;
                    }
                } else {
                    // Mixed arrays flatten to ECMA form: dense elements
                    // become index-named properties
                    self.buf.put_u8(MARKER_ECMA_ARRAY);
                    self.buf.put_u32((arr.dense.len() + arr.assoc.len()) as u32);
                    for (i, item) in arr.dense.iter().enumerate() {
                        self.write_utf8(&i.to_string())?;
                        self.encode(item)?;
                    }
                    for (key, item) in &arr.assoc {
                        self.write_utf8(key)?;
                        self.encode(item)?;
                    }
                    self.write_object_end();
                }
                Ok(())
            }
            Value::Object(rc) => {
                if let Some(index) = self.reference_for(Rc::as_ptr(rc) as usize) {
                    self.buf.put_u8(MARKER_REFERENCE);
                    self.buf.put_u16(index);
                    return Ok(());
                }
                let obj = rc.borrow();
                if obj.externalizable {
                    // No externalizable concept in AMF0; callers tag such
                    // values with AvmPlus to route them through AMF3
                    return Err(AmfError::UnknownMarker { marker: 0x0A, version: 0 });
                }
                if obj.class_name.is_empty() {
                    self.buf.put_u8(MARKER_OBJECT);
                } else {
                    self.buf.put_u8(MARKER_TYPED_OBJECT);
                    self.write_utf8(&obj.class_name)?;
                }
                for (key, item) in obj.sealed.iter().chain(obj.dynamic.iter()) {
                    self.write_utf8(key)?;
                    self.encode(item)?;
                }
                self.write_object_end();
                Ok(())
            }
            Value::AvmPlus(inner) => {
                self.buf.put_u8(MARKER_AVMPLUS);
                let mut encoder = Amf3Encoder::new();
                if let Some(registry) = self.registry {
                    encoder = encoder.registry(registry);
                }
                encoder.encode(inner)?;
                self.buf.put_slice(&encoder.finish());
                Ok(())
            }
            // AMF3-only types have no AMF0 representation; tag them with
            // AvmPlus to send them from an AMF0 context
            Value::Xml(_) => Err(AmfError::UnknownMarker { marker: 0x0B, version: 0 }),
            Value::ByteArray(_) => Err(AmfError::UnknownMarker { marker: 0x0C, version: 0 }),
            Value::VectorInt(_) => Err(AmfError::UnknownMarker { marker: 0x0D, version: 0 }),
            Value::VectorUint(_) => Err(AmfError::UnknownMarker { marker: 0x0E, version: 0 }),
            Value::VectorDouble(_) => Err(AmfError::UnknownMarker { marker: 0x0F, version: 0 }),
            Value::VectorObject(_) => Err(AmfError::UnknownMarker { marker: 0x10, version: 0 }),
            Value::Dictionary(_) => Err(AmfError::UnknownMarker { marker: 0x11, version: 0 }),
        }
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[Value]) -> Result<(), AmfError> {
        for value in values {
            self.encode(value)?;
        }
        Ok(())
    }

    fn encode_string(&mut self, s: &str) -> Result<(), AmfError> {
        if s.len() > 0xFFFF {
            if s.len() > u32::MAX as usize {
                return Err(AmfError::OutOfRange);
            }
            self.buf.put_u8(MARKER_LONG_STRING);
            self.buf.put_u32(s.len() as u32);
        } else {
            self.buf.put_u8(MARKER_STRING);
            self.buf.put_u16(s.len() as u16);
        }
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    /// Look up a previously written complex value; record it otherwise
    ///
    /// Values past the 16-bit index space are written inline again.
    fn reference_for(&mut self, identity: usize) -> Option<u16> {
        if let Some(&index) = self.references.get(&identity) {
            if index <= u16::MAX as usize {
                return Some(index as u16);
            }
            return None;
        }
        self.references.insert(identity, self.ref_count);
        self.ref_count += 1;
        None
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) -> Result<(), AmfError> {
        if s.len() > 0xFFFF {
            return Err(AmfError::OutOfRange);
        }
        self.buf.put_u16(s.len() as u16);
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    fn write_object_end(&mut self) {
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }
}

impl Default for Amf0Encoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value
pub fn encode(value: &Value) -> Result<Bytes, AmfError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[Value]) -> Result<Bytes, AmfError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values)?;
    Ok(encoder.finish())
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<Value, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<Value>, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_roundtrip() {
        let value = Value::Double(42.5);
        let encoded = encode(&value).unwrap();
        assert_eq!(&encoded[..], &[0x00, 0x40, 0x45, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_integer_encodes_as_number() {
        let encoded = encode(&Value::Integer(3)).unwrap();
        assert_eq!(encoded[0], MARKER_NUMBER);
        assert_eq!(decode(&encoded).unwrap(), Value::Double(3.0));
    }

    #[test]
    fn test_string_roundtrip() {
        let value = Value::String("hello world".into());
        let encoded = encode(&value).unwrap();
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_boolean_roundtrip() {
        assert_eq!(
            decode(&encode(&Value::Bool(true)).unwrap()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            decode(&encode(&Value::Bool(false)).unwrap()).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_null_and_undefined() {
        assert_eq!(decode(&[0x05]).unwrap(), Value::Null);
        assert_eq!(decode(&[0x06]).unwrap(), Value::Undefined);
        assert_eq!(&encode(&Value::Null).unwrap()[..], &[0x05]);
        assert_eq!(&encode(&Value::Undefined).unwrap()[..], &[0x06]);
    }

    #[test]
    fn test_object_roundtrip() {
        let value = Value::dynamic_object(vec![
            ("name".to_string(), Value::String("test".into())),
            ("value".to_string(), Value::Double(123.0)),
        ]);
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded[0], MARKER_OBJECT);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, value);

        // Member order survives the round-trip
        assert_eq!(decoded.get_string("name"), Some("test".to_string()));
        assert_eq!(decoded.get_number("value"), Some(123.0));
    }

    #[test]
    fn test_typed_object_roundtrip() {
        let value = Value::object(Object {
            class_name: "com.example.User".into(),
            is_dynamic: true,
            dynamic: vec![("id".to_string(), Value::Double(7.0))],
            ..Default::default()
        });
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded[0], MARKER_TYPED_OBJECT);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_strict_array_roundtrip() {
        let value = Value::array(vec![
            Value::Double(1.0),
            Value::String("two".into()),
            Value::Bool(true),
        ]);
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded[0], MARKER_STRICT_ARRAY);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_ecma_array_roundtrip() {
        let value = Value::Array(Rc::new(RefCell::new(Array {
            dense: Vec::new(),
            assoc: vec![
                ("a".to_string(), Value::Double(1.0)),
                ("b".to_string(), Value::Double(2.0)),
            ],
        })));
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded[0], MARKER_ECMA_ARRAY);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_date_roundtrip() {
        let value = Value::date(1_234_567_890_000.0);
        let encoded = encode(&value).unwrap();
        // Marker + 8-byte millis + reserved zero timezone
        assert_eq!(encoded.len(), 11);
        assert_eq!(&encoded[9..], &[0x00, 0x00]);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_xml_document_roundtrip() {
        let value = Value::xml_document("<root><child/></root>");
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded[0], MARKER_XML_DOCUMENT);
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_long_string() {
        let long_str = "x".repeat(70_000);
        let value = Value::String(long_str.clone());
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded[0], MARKER_LONG_STRING);
        assert_eq!(decode(&encoded).unwrap(), Value::String(long_str));
    }

    #[test]
    fn test_multiple_values() {
        let values = vec![
            Value::String("connect".into()),
            Value::Double(1.0),
            Value::Null,
        ];
        let encoded = encode_all(&values).unwrap();
        assert_eq!(decode_all(&encoded).unwrap(), values);
    }

    #[test]
    fn test_reference_emission() {
        // The same object twice: second occurrence is a 0x07 reference
        let shared = Value::dynamic_object(vec![("k".to_string(), Value::Double(1.0))]);
        let values = vec![shared.clone(), shared];
        let encoded = encode_all(&values).unwrap();

        let mut decoder = Amf0Decoder::new();
        let mut buf = Bytes::copy_from_slice(&encoded);
        let first = decoder.decode(&mut buf).unwrap();
        assert_eq!(buf[0], MARKER_REFERENCE);
        let second = decoder.decode(&mut buf).unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_bad_reference() {
        assert!(matches!(
            decode(&[0x07, 0x00, 0x05]),
            Err(AmfError::BadReference { kind: RefKind::Object, index: 5 })
        ));
    }

    #[test]
    fn test_avmplus_bridge() {
        // 0x11 hands one AMF3 value off with fresh tables
        let decoded = decode(&[0x11, 0x04, 0x15]).unwrap();
        assert_eq!(decoded, Value::avm_plus(Value::Integer(21)));

        let encoded = encode(&Value::avm_plus(Value::Integer(21))).unwrap();
        assert_eq!(&encoded[..], &[0x11, 0x04, 0x15]);
    }

    #[test]
    fn test_avmplus_fresh_tables() {
        // Two AVM+ values in one stream: the second's string is inline
        // again because each bridge gets fresh AMF3 tables
        let values = vec![
            Value::avm_plus(Value::String("ns".into())),
            Value::avm_plus(Value::String("ns".into())),
        ];
        let encoded = encode_all(&values).unwrap();
        let payload_count = encoded.windows(2).filter(|&w| w == b"ns").count();
        assert_eq!(payload_count, 2);
        assert_eq!(decode_all(&encoded).unwrap(), values);
    }

    #[test]
    fn test_amf3_only_types_rejected() {
        let err = encode(&Value::byte_array(vec![1, 2])).unwrap_err();
        assert!(matches!(err, AmfError::UnknownMarker { version: 0, .. }));

        // Tagged with AvmPlus they go through
        let encoded = encode(&Value::avm_plus(Value::byte_array(vec![1, 2]))).unwrap();
        assert_eq!(encoded[0], MARKER_AVMPLUS);
    }

    #[test]
    fn test_reserved_markers_rejected() {
        // MovieClip and RecordSet are reserved by the specification
        assert!(matches!(
            decode(&[0x04]),
            Err(AmfError::UnknownMarker { marker: 0x04, version: 0 })
        ));
        assert!(matches!(
            decode(&[0x0E]),
            Err(AmfError::UnknownMarker { marker: 0x0E, version: 0 })
        ));
    }

    #[test]
    fn test_unsupported_marker_decodes_to_undefined() {
        assert_eq!(decode(&[0x0D]).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(decode(&[]), Err(AmfError::Truncated)));
        assert!(matches!(decode(&[0x00, 0x01]), Err(AmfError::Truncated)));
        assert!(matches!(decode(&[0x02, 0x00]), Err(AmfError::Truncated)));
        assert!(matches!(decode(&[0x0B, 0x00]), Err(AmfError::Truncated)));
    }

    #[test]
    fn test_string_length_exceeds_buffer() {
        // Declares 16 bytes, carries 2
        assert!(matches!(
            decode(&[0x02, 0x00, 0x10, 0x61, 0x62]),
            Err(AmfError::OutOfRange)
        ));
    }

    #[test]
    fn test_missing_object_end() {
        // Empty key followed by something other than 0x09
        assert!(matches!(
            decode(&[0x03, 0x00, 0x00, 0x05]),
            Err(AmfError::UnknownMarker { marker: 0x05, version: 0 })
        ));
    }
}

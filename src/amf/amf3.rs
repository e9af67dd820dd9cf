//! AMF3 encoder and decoder
//!
//! AMF3 is the ActionScript 3.0 serialization format (Flash Player 9+).
//! Reference: AMF3 File Format Specification (amf3-file-format-spec.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Undefined
//! 0x01 - Null
//! 0x02 - False
//! 0x03 - True
//! 0x04 - Integer (29-bit signed, U29 encoded)
//! 0x05 - Double (IEEE 754, big-endian)
//! 0x06 - String (U29 length/reference header)
//! 0x07 - XML Document (legacy E4X)
//! 0x08 - Date (millis since epoch, UTC)
//! 0x09 - Array (dense + associative)
//! 0x0A - Object (traits, sealed/dynamic members)
//! 0x0B - XML
//! 0x0C - ByteArray
//! 0x0D - Vector<int>
//! 0x0E - Vector<uint>
//! 0x0F - Vector<Number>
//! 0x10 - Vector<Object>
//! 0x11 - Dictionary
//! ```
//!
//! Every complex value's header is a U29 whose low bit distinguishes an
//! inline definition (1) from a reference (0) into one of three per-message
//! tables: strings, objects, traits. Inline values are recorded in their
//! table *before* their contents are read or written; that ordering is what
//! makes cyclic graphs terminate and is an invariant of every reader and
//! writer below.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::{Array, Dictionary, Object, ObjectVector, Value, Vector};
use super::{DEFAULT_MAX_ALLOCATION, DEFAULT_MAX_DEPTH, INTEGER_MAX, INTEGER_MIN};
use crate::error::{AmfError, RefKind};
use crate::registry::ExternalizableRegistry;

// AMF3 type markers
const MARKER_UNDEFINED: u8 = 0x00;
const MARKER_NULL: u8 = 0x01;
const MARKER_FALSE: u8 = 0x02;
const MARKER_TRUE: u8 = 0x03;
const MARKER_INTEGER: u8 = 0x04;
const MARKER_DOUBLE: u8 = 0x05;
const MARKER_STRING: u8 = 0x06;
const MARKER_XML_DOCUMENT: u8 = 0x07;
const MARKER_DATE: u8 = 0x08;
const MARKER_ARRAY: u8 = 0x09;
const MARKER_OBJECT: u8 = 0x0A;
const MARKER_XML: u8 = 0x0B;
const MARKER_BYTE_ARRAY: u8 = 0x0C;
const MARKER_VECTOR_INT: u8 = 0x0D;
const MARKER_VECTOR_UINT: u8 = 0x0E;
const MARKER_VECTOR_DOUBLE: u8 = 0x0F;
const MARKER_VECTOR_OBJECT: u8 = 0x10;
const MARKER_DICTIONARY: u8 = 0x11;

/// Largest value encodable as a U29
const U29_MAX: u32 = (1 << 29) - 1;

/// Largest length that fits an inline U29 header (one bit goes to the
/// inline flag)
const INLINE_LEN_MAX: usize = (1 << 28) - 1;

/// Per-class trait descriptor shared by object instances
///
/// Traits compare structurally on the encode side; the wire tables use
/// positional identity (the index at which a trait was first emitted).
#[derive(Debug, Clone, PartialEq)]
pub struct Amf3Trait {
    /// Class name; empty for anonymous objects
    pub class_name: String,
    /// Sealed member names in declaration order
    pub sealed_names: Vec<String>,
    /// Instance carries trailing dynamic members
    pub dynamic: bool,
    /// Body is opaque and handled by a registered reader/writer
    pub externalizable: bool,
}

/// U29 header split: low bit clear means a table reference
enum SizeOrIndex {
    Size(usize),
    Index(usize),
}

/// AMF3 decoder
///
/// Holds the three reference tables for one message. Call [`reset`] (or use
/// a fresh decoder) between top-level values from different messages;
/// tables must never be shared across messages.
///
/// [`reset`]: Amf3Decoder::reset
pub struct Amf3Decoder<'r> {
    string_refs: Vec<String>,
    object_refs: Vec<Value>,
    trait_refs: Vec<Amf3Trait>,
    registry: Option<&'r ExternalizableRegistry>,
    max_depth: usize,
    max_allocation: usize,
    /// Cumulative length-prefixed allocation for this message
    allocated: usize,
    depth: usize,
}

impl<'r> Amf3Decoder<'r> {
    /// Create a new decoder with default settings
    pub fn new() -> Self {
        Self {
            string_refs: Vec::new(),
            object_refs: Vec::new(),
            trait_refs: Vec::new(),
            registry: None,
            max_depth: DEFAULT_MAX_DEPTH,
            max_allocation: DEFAULT_MAX_ALLOCATION,
            allocated: 0,
            depth: 0,
        }
    }

    /// Attach a registry for resolving externalizable classes
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

    /// Reset reference tables and counters (call between messages)
    pub fn reset(&mut self) {
        self.string_refs.clear();
        self.object_refs.clear();
        self.trait_refs.clear();
        self.allocated = 0;
        self.depth = 0;
    }

    /// Decode a single AMF3 value from the buffer
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

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<Value, AmfError> {
        match marker {
            MARKER_UNDEFINED => Ok(Value::Undefined),
            MARKER_NULL => Ok(Value::Null),
            MARKER_FALSE => Ok(Value::Bool(false)),
            MARKER_TRUE => Ok(Value::Bool(true)),
            MARKER_INTEGER => self.decode_integer(buf),
            MARKER_DOUBLE => self.decode_double(buf),
            MARKER_STRING => self.decode_string(buf),
            MARKER_XML_DOCUMENT => self.decode_xml_document(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_ARRAY => self.decode_array(buf),
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_XML => self.decode_xml(buf),
            MARKER_BYTE_ARRAY => self.decode_byte_array(buf),
            MARKER_VECTOR_INT => self.decode_vector_int(buf),
            MARKER_VECTOR_UINT => self.decode_vector_uint(buf),
            MARKER_VECTOR_DOUBLE => self.decode_vector_double(buf),
            MARKER_VECTOR_OBJECT => self.decode_vector_object(buf),
            MARKER_DICTIONARY => self.decode_dictionary(buf),
            _ => Err(AmfError::UnknownMarker { marker, version: 3 }),
        }
    }

    /// Read a U29: 1-4 bytes, continuation bit in the high bit of the
    /// first three bytes, full 8 data bits in the fourth
    fn read_u29(&mut self, buf: &mut Bytes) -> Result<u32, AmfError> {
        let mut result: u32 = 0;
        for _ in 0..3 {
            if buf.is_empty() {
                return Err(AmfError::Truncated);
            }
            let byte = buf.get_u8();
            result = (result << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }
        Ok((result << 8) | u32::from(buf.get_u8()))
    }

    fn read_size_or_index(&mut self, buf: &mut Bytes) -> Result<SizeOrIndex, AmfError> {
        let header = self.read_u29(buf)? as usize;
        if header & 1 == 0 {
            Ok(SizeOrIndex::Index(header >> 1))
        } else {
            Ok(SizeOrIndex::Size(header >> 1))
        }
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

    fn object_ref(&self, index: usize) -> Result<Value, AmfError> {
        self.object_refs
            .get(index)
            .cloned()
            .ok_or(AmfError::BadReference { kind: RefKind::Object, index })
    }

    /// Read an AMF3 string (U29 header, no type marker)
    ///
    /// Used for string values, class names, trait member names, and the
    /// associative keys of Array. Non-empty inline strings are recorded in
    /// the string table; the empty string is always inline and never
    /// recorded.
    pub fn read_string(&mut self, buf: &mut Bytes) -> Result<String, AmfError> {
        match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => self
                .string_refs
                .get(index)
                .cloned()
                .ok_or(AmfError::BadReference { kind: RefKind::String, index }),
            SizeOrIndex::Size(len) => {
                if len == 0 {
                    return Ok(String::new());
                }
                self.reserve(len, buf)?;
                let bytes = buf.copy_to_bytes(len);
                let s = String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)?;
                self.string_refs.push(s.clone());
                Ok(s)
            }
        }
    }

    fn decode_integer(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let raw = self.read_u29(buf)?;
        // Sign-extend bit 28: the wire carries the low 29 bits of a
        // two's complement value
        let value = if raw & 0x1000_0000 != 0 {
            raw as i32 - (1 << 29)
        } else {
            raw as i32
        };
        Ok(Value::Integer(value))
    }

    fn decode_double(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.remaining() < 8 {
            return Err(AmfError::Truncated);
        }
        Ok(Value::Double(buf.get_f64()))
    }

    fn decode_string(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        Ok(Value::String(self.read_string(buf)?))
    }

    fn decode_xml_document(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };
        self.reserve(len, buf)?;
        let bytes = buf.copy_to_bytes(len);
        let s = String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)?;
        let value = Value::XmlDoc(Rc::new(s));
        self.object_refs.push(value.clone());
        Ok(value)
    }

    fn decode_xml(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };
        self.reserve(len, buf)?;
        let bytes = buf.copy_to_bytes(len);
        let s = String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)?;
        let value = Value::Xml(Rc::new(s));
        self.object_refs.push(value.clone());
        Ok(value)
    }

    fn decode_byte_array(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };
        self.reserve(len, buf)?;
        let bytes = buf.copy_to_bytes(len).to_vec();
        let value = Value::ByteArray(Rc::new(bytes));
        self.object_refs.push(value.clone());
        Ok(value)
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        // High bits of an inline header are reserved (canonically zero)
        if let SizeOrIndex::Index(index) = self.read_size_or_index(buf)? {
            return self.object_ref(index);
        }
        if buf.remaining() < 8 {
            return Err(AmfError::Truncated);
        }
        let millis = buf.get_f64();
        let value = Value::date(millis);
        self.object_refs.push(value.clone());
        Ok(value)
    }

    fn decode_array(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };

        // Table entry goes in before any element is read so self-references
        // resolve to this array
        let rc = Rc::new(RefCell::new(Array::default()));
        self.object_refs.push(Value::Array(rc.clone()));

        // Associative part: (key, value) pairs until the empty key. Keys
        // that look like dense indices are wire-malformed by convention but
        // tolerated as named properties.
        loop {
            let key = self.read_string(buf)?;
            if key.is_empty() {
                break;
            }
            let value = self.decode(buf)?;
            rc.borrow_mut().assoc.push((key, value));
        }

        for _ in 0..len {
            let value = self.decode(buf)?;
            rc.borrow_mut().dense.push(value);
        }

        Ok(Value::Array(rc))
    }

    /// Read a trait header (the U29 with the object-inline bit already
    /// stripped) and resolve or record the trait
    fn read_trait(&mut self, header: usize, buf: &mut Bytes) -> Result<Amf3Trait, AmfError> {
        if header & 0b1 == 0 {
            let index = header >> 1;
            return self
                .trait_refs
                .get(index)
                .cloned()
                .ok_or(AmfError::BadReference { kind: RefKind::Trait, index });
        }

        let externalizable = header & 0b10 != 0;
        let dynamic = header & 0b100 != 0;
        let sealed_count = header >> 3;

        // An externalizable trait declares no sealed members; a nonzero
        // count here means the header bits are inconsistent
        if externalizable && sealed_count != 0 {
            return Err(AmfError::MalformedTrait);
        }

        let class_name = self.read_string(buf)?;
        let sealed_names = (0..sealed_count)
            .map(|_| self.read_string(buf))
            .collect::<Result<Vec<_>, _>>()?;

        let info = Amf3Trait {
            class_name,
            sealed_names,
            dynamic,
            externalizable,
        };
        self.trait_refs.push(info.clone());
        Ok(info)
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let header = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(header) => header,
        };

        let info = self.read_trait(header, buf)?;

        let rc = Rc::new(RefCell::new(Object {
            class_name: info.class_name.clone(),
            is_dynamic: info.dynamic,
            externalizable: info.externalizable,
            ..Default::default()
        }));
        let slot = self.object_refs.len();
        self.object_refs.push(Value::Object(rc.clone()));

        if info.externalizable {
            let reader = match self.registry.and_then(|r| r.reader(&info.class_name)) {
                Some(reader) => reader,
                None => {
                    return Err(AmfError::ExternalizableNotRegistered {
                        class_name: info.class_name,
                    })
                }
            };
            let body = reader(self, buf)?;
            return match body {
                Value::Object(read) => {
                    // Fold the reader's result into the tabled shell so
                    // references taken during the read stay identity-correct
                    if !Rc::ptr_eq(&read, &rc) {
                        let src = read.borrow().clone();
                        let mut dst = rc.borrow_mut();
                        dst.sealed = src.sealed;
                        dst.dynamic = src.dynamic;
                        dst.externalizable_payload = src.externalizable_payload;
                        dst.externalizable = true;
                    }
                    Ok(Value::Object(rc))
                }
                other => {
                    self.object_refs[slot] = other.clone();
                    Ok(other)
                }
            };
        }

        for name in &info.sealed_names {
            let value = self.decode(buf)?;
            rc.borrow_mut().sealed.push((name.clone(), value));
        }

        if info.dynamic {
            loop {
                let name = self.read_string(buf)?;
                if name.is_empty() {
                    break;
                }
                let value = self.decode(buf)?;
                rc.borrow_mut().dynamic.push((name, value));
            }
        }

        Ok(Value::Object(rc))
    }

    fn decode_vector_int(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }
        let fixed = buf.get_u8() != 0;
        self.reserve(len.checked_mul(4).ok_or(AmfError::OutOfRange)?, buf)?;

        let rc = Rc::new(RefCell::new(Vector::new(fixed, Vec::with_capacity(len))));
        self.object_refs.push(Value::VectorInt(rc.clone()));
        for _ in 0..len {
            rc.borrow_mut().items.push(buf.get_i32());
        }
        Ok(Value::VectorInt(rc))
    }

    fn decode_vector_uint(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }
        let fixed = buf.get_u8() != 0;
        self.reserve(len.checked_mul(4).ok_or(AmfError::OutOfRange)?, buf)?;

        let rc = Rc::new(RefCell::new(Vector::new(fixed, Vec::with_capacity(len))));
        self.object_refs.push(Value::VectorUint(rc.clone()));
        for _ in 0..len {
            rc.borrow_mut().items.push(buf.get_u32());
        }
        Ok(Value::VectorUint(rc))
    }

    fn decode_vector_double(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }
        let fixed = buf.get_u8() != 0;
        self.reserve(len.checked_mul(8).ok_or(AmfError::OutOfRange)?, buf)?;

        let rc = Rc::new(RefCell::new(Vector::new(fixed, Vec::with_capacity(len))));
        self.object_refs.push(Value::VectorDouble(rc.clone()));
        for _ in 0..len {
            rc.borrow_mut().items.push(buf.get_f64());
        }
        Ok(Value::VectorDouble(rc))
    }

    fn decode_vector_object(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }
        let fixed = buf.get_u8() != 0;
        let type_name = self.read_string(buf)?;

        let rc = Rc::new(RefCell::new(ObjectVector {
            type_name,
            fixed,
            items: Vec::new(),
        }));
        self.object_refs.push(Value::VectorObject(rc.clone()));
        for _ in 0..len {
            let value = self.decode(buf)?;
            rc.borrow_mut().items.push(value);
        }
        Ok(Value::VectorObject(rc))
    }

    fn decode_dictionary(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let len = match self.read_size_or_index(buf)? {
            SizeOrIndex::Index(index) => return self.object_ref(index),
            SizeOrIndex::Size(len) => len,
        };
        if buf.is_empty() {
            return Err(AmfError::Truncated);
        }
        let weak_keys = buf.get_u8() == 1;

        let rc = Rc::new(RefCell::new(Dictionary {
            weak_keys,
            entries: Vec::new(),
        }));
        self.object_refs.push(Value::Dictionary(rc.clone()));
        for _ in 0..len {
            let key = self.decode(buf)?;
            let value = self.decode(buf)?;
            rc.borrow_mut().entries.push((key, value));
        }
        Ok(Value::Dictionary(rc))
    }
}

impl Default for Amf3Decoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF3 encoder
///
/// Appends to an internal growable buffer; [`finish`] freezes and returns
/// the encoded bytes. Holds the three reference tables for one message:
/// strings deduplicate by value, objects by allocation identity, traits by
/// structural equality.
///
/// [`finish`]: Amf3Encoder::finish
pub struct Amf3Encoder<'r> {
    buf: BytesMut,
    string_refs: HashMap<String, usize>,
    object_refs: HashMap<usize, usize>,
    object_count: usize,
    trait_refs: Vec<Amf3Trait>,
    registry: Option<&'r ExternalizableRegistry>,
}

impl<'r> Amf3Encoder<'r> {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create an encoder with a specific initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            string_refs: HashMap::new(),
            object_refs: HashMap::new(),
            object_count: 0,
            trait_refs: Vec::new(),
            registry: None,
        }
    }

    /// Attach a registry for writing externalizable classes
    pub fn registry(mut self, registry: &'r ExternalizableRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Get the encoded bytes and reset the buffer
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

    /// Reset reference tables (call between messages)
    pub fn reset(&mut self) {
        self.string_refs.clear();
        self.object_refs.clear();
        self.object_count = 0;
        self.trait_refs.clear();
    }

    /// Append raw bytes to the output
    ///
    /// For externalizable writers emitting opaque body bytes.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Encode a single AMF3 value
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
            Value::Bool(false) => {
                self.buf.put_u8(MARKER_FALSE);
                Ok(())
            }
            Value::Bool(true) => {
                self.buf.put_u8(MARKER_TRUE);
                Ok(())
            }
            Value::Integer(i) => self.encode_integer(*i),
            Value::Double(n) => {
                self.buf.put_u8(MARKER_DOUBLE);
                self.buf.put_f64(*n);
                Ok(())
            }
            Value::String(s) => {
                self.buf.put_u8(MARKER_STRING);
                self.write_string(s)
            }
            Value::Date(rc) => {
                self.buf.put_u8(MARKER_DATE);
                if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
                    return Ok(());
                }
                self.write_u29(1)?;
                self.buf.put_f64(rc.get());
                Ok(())
            }
            Value::XmlDoc(rc) => self.encode_text(MARKER_XML_DOCUMENT, rc),
            Value::Xml(rc) => self.encode_text(MARKER_XML, rc),
            Value::ByteArray(rc) => {
                self.buf.put_u8(MARKER_BYTE_ARRAY);
                if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
                    return Ok(());
                }
                self.write_inline_header(rc.len())?;
                self.buf.put_slice(rc);
                Ok(())
            }
            Value::Array(rc) => {
                self.buf.put_u8(MARKER_ARRAY);
                if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
                    return Ok(());
                }
                let arr = rc.borrow();
                self.write_inline_header(arr.dense.len())?;
                for (key, value) in &arr.assoc {
                    self.write_string(key)?;
                    self.encode(value)?;
                }
                self.write_string("")?;
                for value in &arr.dense {
                    self.encode(value)?;
                }
                Ok(())
            }
            Value::Object(rc) => self.encode_object(rc, value),
            Value::VectorInt(rc) => {
                self.buf.put_u8(MARKER_VECTOR_INT);
                if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
                    return Ok(());
                }
                let vec = rc.borrow();
                self.write_inline_header(vec.items.len())?;
                self.buf.put_u8(u8::from(vec.fixed));
                for item in &vec.items {
                    self.buf.put_i32(*item);
                }
                Ok(())
            }
            Value::VectorUint(rc) => {
                self.buf.put_u8(MARKER_VECTOR_UINT);
                if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
                    return Ok(());
                }
                let vec = rc.borrow();
                self.write_inline_header(vec.items.len())?;
                self.buf.put_u8(u8::from(vec.fixed));
                for item in &vec.items {
                    self.buf.put_u32(*item);
                }
                Ok(())
            }
            Value::VectorDouble(rc) => {
                self.buf.put_u8(MARKER_VECTOR_DOUBLE);
                if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
                    return Ok(());
                }
                let vec = rc.borrow();
                self.write_inline_header(vec.items.len())?;
                self.buf.put_u8(u8::from(vec.fixed));
                for item in &vec.items {
                    self.buf.put_f64(*item);
                }
                Ok(())
            }
            Value::VectorObject(rc) => {
                self.buf.put_u8(MARKER_VECTOR_OBJECT);
                if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
                    return Ok(());
                }
                let vec = rc.borrow();
                self.write_inline_header(vec.items.len())?;
                self.buf.put_u8(u8::from(vec.fixed));
                self.write_string(&vec.type_name)?;
                for item in &vec.items {
                    self.encode(item)?;
                }
                Ok(())
            }
            Value::Dictionary(rc) => {
                self.buf.put_u8(MARKER_DICTIONARY);
                if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
                    return Ok(());
                }
                let dict = rc.borrow();
                self.write_inline_header(dict.entries.len())?;
                self.buf.put_u8(u8::from(dict.weak_keys));
                for (key, value) in &dict.entries {
                    self.encode(key)?;
                    self.encode(value)?;
                }
                Ok(())
            }
            // The AMF3 tag is transparent in AMF3 context
            Value::AvmPlus(inner) => self.encode(inner),
        }
    }

    /// Write a U29: 1-4 bytes, most significant group first
    fn write_u29(&mut self, value: u32) -> Result<(), AmfError> {
        if value > U29_MAX {
            return Err(AmfError::OutOfRange);
        }
        if value < 0x80 {
            self.buf.put_u8(value as u8);
        } else if value < 0x4000 {
            self.buf.put_u8((value >> 7) as u8 | 0x80);
            self.buf.put_u8((value & 0x7F) as u8);
        } else if value < 0x20_0000 {
            self.buf.put_u8((value >> 14) as u8 | 0x80);
            self.buf.put_u8(((value >> 7) & 0x7F) as u8 | 0x80);
            self.buf.put_u8((value & 0x7F) as u8);
        } else {
            self.buf.put_u8((value >> 22) as u8 | 0x80);
            self.buf.put_u8(((value >> 15) & 0x7F) as u8 | 0x80);
            self.buf.put_u8(((value >> 8) & 0x7F) as u8 | 0x80);
            self.buf.put_u8((value & 0xFF) as u8);
        }
        Ok(())
    }

    /// Write an inline U29 header carrying a length in the high 28 bits
    fn write_inline_header(&mut self, len: usize) -> Result<(), AmfError> {
        if len > INLINE_LEN_MAX {
            return Err(AmfError::OutOfRange);
        }
        self.write_u29(((len as u32) << 1) | 1)
    }

    /// Emit an object reference if this allocation was already written;
    /// otherwise record it and leave the caller to inline the value
    fn reference_or_record(&mut self, identity: usize) -> Result<bool, AmfError> {
        if let Some(&index) = self.object_refs.get(&identity) {
            self.write_u29((index as u32) << 1)?;
            return Ok(true);
        }
        self.object_refs.insert(identity, self.object_count);
        self.object_count += 1;
        Ok(false)
    }

    /// Write an AMF3 string (U29 header, no type marker)
    ///
    /// This is the form used for trait names, class names, and associative
    /// keys as well as string values; the 0x06 marker never appears inside
    /// those headers.
    pub fn write_string(&mut self, s: &str) -> Result<(), AmfError> {
        if s.is_empty() {
            // Inline, never recorded; index 0 stays reachable
            self.buf.put_u8(0x01);
            return Ok(());
        }
        if let Some(&index) = self.string_refs.get(s) {
            return self.write_u29((index as u32) << 1);
        }
        self.write_inline_header(s.len())?;
        self.buf.put_slice(s.as_bytes());
        self.string_refs.insert(s.to_string(), self.string_refs.len());
        Ok(())
    }

    fn encode_integer(&mut self, value: i32) -> Result<(), AmfError> {
        if (INTEGER_MIN..=INTEGER_MAX).contains(&value) {
            self.buf.put_u8(MARKER_INTEGER);
            self.write_u29(value as u32 & U29_MAX)
        } else {
            // Outside the 29-bit signed range: promote to Double
            self.buf.put_u8(MARKER_DOUBLE);
            self.buf.put_f64(value as f64);
            Ok(())
        }
    }

    fn encode_text(&mut self, marker: u8, rc: &Rc<String>) -> Result<(), AmfError> {
        self.buf.put_u8(marker);
        if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
            return Ok(());
        }
        self.write_inline_header(rc.len())?;
        self.buf.put_slice(rc.as_bytes());
        Ok(())
    }

    fn encode_object(&mut self, rc: &Rc<RefCell<Object>>, value: &Value) -> Result<(), AmfError> {
        self.buf.put_u8(MARKER_OBJECT);
        if self.reference_or_record(Rc::as_ptr(rc) as usize)? {
            return Ok(());
        }

        let obj = rc.borrow();
        // An externalizable trait declares no sealed members; its body is
        // entirely the writer's. The dynamic bit is the trait's own flag,
        // coerced on only when a non-dynamic object somehow carries
        // dynamic members anyway (they would otherwise be dropped).
        let info = Amf3Trait {
            class_name: obj.class_name.clone(),
            sealed_names: if obj.externalizable {
                Vec::new()
            } else {
                obj.sealed.iter().map(|(k, _)| k.clone()).collect()
            },
            dynamic: obj.is_dynamic || (!obj.externalizable && !obj.dynamic.is_empty()),
            externalizable: obj.externalizable,
        };

        if let Some(index) = self.trait_refs.iter().position(|t| *t == info) {
            // Inline object, referenced trait
            self.write_u29(((index as u32) << 2) | 0b01)?;
        } else {
            let sealed_count = info.sealed_names.len();
            if sealed_count > (U29_MAX >> 4) as usize {
                return Err(AmfError::OutOfRange);
            }
            let header = ((sealed_count as u32) << 4)
                | (u32::from(info.dynamic) << 3)
                | (u32::from(info.externalizable) << 2)
                | 0b11;
            self.write_u29(header)?;
            self.write_string(&info.class_name)?;
            for name in &info.sealed_names {
                self.write_string(name)?;
            }
            self.trait_refs.push(info.clone());
        }

        if info.externalizable {
            if let Some(writer) = self.registry.and_then(|r| r.writer(&obj.class_name)) {
                return writer(self, value);
            }
            if let Some(payload) = &obj.externalizable_payload {
                self.buf.put_slice(payload);
                return Ok(());
            }
            return Err(AmfError::ExternalizableNotRegistered {
                class_name: obj.class_name.clone(),
            });
        }

        for (_, v) in &obj.sealed {
            self.encode(v)?;
        }
        if info.dynamic {
            for (k, v) in &obj.dynamic {
                self.write_string(k)?;
                self.encode(v)?;
            }
            self.write_string("")?;
        }
        Ok(())
    }
}

impl Default for Amf3Encoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value
pub fn encode(value: &Value) -> Result<Bytes, AmfError> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<Value, AmfError> {
    let mut decoder = Amf3Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

//! AMF value types
//!
//! Both AMF0 and AMF3 share a common value representation. Scalars are held
//! inline; every complex value (everything eligible for the AMF3 object
//! reference table) sits behind an `Rc` so that shared wire references decode
//! to genuinely shared values, the encoder can detect repeats by pointer
//! identity, and cyclic graphs are representable.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Unified AMF value representation
///
/// This enum represents all value types supported by AMF0 and AMF3.
/// Some types (ByteArray, the vectors, Dictionary) are AMF3-only.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Undefined value (AMF0: 0x06, AMF3: 0x00)
    Undefined,

    /// Null value (AMF0: 0x05, AMF3: 0x01)
    Null,

    /// Boolean value (AMF0: 0x01, AMF3: 0x02/0x03)
    Bool(bool),

    /// 29-bit signed integer (AMF3 only: 0x04)
    ///
    /// Legal range is -2^28 ..= 2^28-1. Values outside that range are
    /// emitted as `Double` on the wire.
    Integer(i32),

    /// IEEE 754 double-precision floating point (AMF0: 0x00, AMF3: 0x05)
    Double(f64),

    /// UTF-8 string (AMF0: 0x02/0x0C, AMF3: 0x06)
    String(String),

    /// Date as milliseconds since Unix epoch, UTC (AMF0: 0x0B, AMF3: 0x08)
    Date(Rc<Cell<f64>>),

    /// XML document, legacy E4X-era marker (AMF0: 0x0F, AMF3: 0x07)
    XmlDoc(Rc<String>),

    /// XML (AMF3 only: 0x0B); same payload shape as XmlDoc, distinct marker
    Xml(Rc<String>),

    /// Raw byte array (AMF3 only: 0x0C)
    ByteArray(Rc<Vec<u8>>),

    /// Array with a dense portion and insertion-ordered associative pairs
    /// (AMF0: 0x08/0x0A, AMF3: 0x09)
    Array(Rc<RefCell<Array>>),

    /// Object with trait-declared sealed members and dynamic members
    /// (AMF0: 0x03/0x10, AMF3: 0x0A)
    Object(Rc<RefCell<Object>>),

    /// Vector of 32-bit signed integers (AMF3 only: 0x0D)
    VectorInt(Rc<RefCell<Vector<i32>>>),

    /// Vector of 32-bit unsigned integers (AMF3 only: 0x0E)
    VectorUint(Rc<RefCell<Vector<u32>>>),

    /// Vector of doubles (AMF3 only: 0x0F)
    VectorDouble(Rc<RefCell<Vector<f64>>>),

    /// Typed vector of values (AMF3 only: 0x10)
    VectorObject(Rc<RefCell<ObjectVector>>),

    /// Dictionary with arbitrary value keys (AMF3 only: 0x11)
    Dictionary(Rc<RefCell<Dictionary>>),

    /// Tag forcing AMF3 encoding of the inner value from an AMF0 context
    ///
    /// The AMF0 encoder emits the avmplus marker (0x11) followed by the
    /// AMF3 encoding of the inner value with fresh reference tables; the
    /// AMF0 decoder produces this wrapper when it meets that marker. In an
    /// AMF3 context the wrapper is transparent.
    AvmPlus(Box<Value>),
}

/// Array payload: dense elements plus insertion-ordered associative pairs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Array {
    pub dense: Vec<Value>,
    pub assoc: Vec<(String, Value)>,
}

/// Object payload
///
/// `sealed` holds the trait-declared members in declaration order; `dynamic`
/// holds the trailing name/value pairs of dynamic instances. `is_dynamic`
/// is the trait's dynamic flag itself: it is part of trait identity on the
/// wire and stays true even when `dynamic` currently holds no members. An
/// externalizable object may carry its opaque body bytes in
/// `externalizable_payload`, written verbatim when no writer is registered
/// for the class.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    pub class_name: String,
    pub sealed: Vec<(String, Value)>,
    /// Trait-declared dynamic flag, independent of member count
    pub is_dynamic: bool,
    pub dynamic: Vec<(String, Value)>,
    pub externalizable: bool,
    pub externalizable_payload: Option<Vec<u8>>,
}

impl Object {
    /// Create an empty object with the given class name
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Default::default()
        }
    }

    /// Look up a member by name, sealed members first
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.sealed
            .iter()
            .chain(self.dynamic.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Fixed-width scalar vector payload (int, uint, double)
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T> {
    /// Fixed-length flag from the wire; carried through round-trips
    pub fixed: bool,
    pub items: Vec<T>,
}

impl<T> Vector<T> {
    pub fn new(fixed: bool, items: Vec<T>) -> Self {
        Self { fixed, items }
    }
}

/// Typed object vector payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectVector {
    /// Element type name; empty for `Vector.<Object>`
    pub type_name: String,
    pub fixed: bool,
    pub items: Vec<Value>,
}

/// Dictionary payload; entries keep wire order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary {
    pub weak_keys: bool,
    pub entries: Vec<(Value, Value)>,
}

impl Value {
    /// Create a Date value from epoch milliseconds
    pub fn date(millis: f64) -> Self {
        Value::Date(Rc::new(Cell::new(millis)))
    }

    /// Create a ByteArray value
    pub fn byte_array(bytes: impl Into<Vec<u8>>) -> Self {
        Value::ByteArray(Rc::new(bytes.into()))
    }

    /// Create an Xml value
    pub fn xml(s: impl Into<String>) -> Self {
        Value::Xml(Rc::new(s.into()))
    }

    /// Create an XmlDoc value
    pub fn xml_document(s: impl Into<String>) -> Self {
        Value::XmlDoc(Rc::new(s.into()))
    }

    /// Create a dense array value
    pub fn array(dense: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(Array { dense, assoc: Vec::new() })))
    }

    /// Create an object value from an Object payload
    pub fn object(obj: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    /// Create an anonymous dynamic object from name/value pairs
    pub fn dynamic_object(pairs: Vec<(String, Value)>) -> Self {
        Value::object(Object {
            is_dynamic: true,
            dynamic: pairs,
            ..Default::default()
        })
    }

    /// Create a dictionary value
    pub fn dictionary(weak_keys: bool, entries: Vec<(Value, Value)>) -> Self {
        Value::Dictionary(Rc::new(RefCell::new(Dictionary { weak_keys, entries })))
    }

    /// Tag a value for AMF3 encoding from an AMF0 context
    pub fn avm_plus(value: Value) -> Self {
        Value::AvmPlus(Box::new(value))
    }

    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    /// Get a named member from an object or the associative part of an array
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.borrow().get(key).cloned(),
            Value::Array(arr) => arr
                .borrow()
                .assoc
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            Value::AvmPlus(inner) => inner.get(key),
            _ => None,
        }
    }

    /// Get a string member from an object value
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get a numeric member from an object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }

    /// Compare two values by identity
    ///
    /// Complex values compare by shared allocation; scalars are never
    /// identity-equal. This is the comparison the encoder's reference
    /// table uses.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Date(a), Value::Date(b)) => Rc::ptr_eq(a, b),
            (Value::XmlDoc(a), Value::XmlDoc(b)) => Rc::ptr_eq(a, b),
            (Value::Xml(a), Value::Xml(b)) => Rc::ptr_eq(a, b),
            (Value::ByteArray(a), Value::ByteArray(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::VectorInt(a), Value::VectorInt(b)) => Rc::ptr_eq(a, b),
            (Value::VectorUint(a), Value::VectorUint(b)) => Rc::ptr_eq(a, b),
            (Value::VectorDouble(a), Value::VectorDouble(b)) => Rc::ptr_eq(a, b),
            (Value::VectorObject(a), Value::VectorObject(b)) => Rc::ptr_eq(a, b),
            (Value::Dictionary(a), Value::Dictionary(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        if (crate::amf::INTEGER_MIN..=crate::amf::INTEGER_MAX).contains(&v) {
            Value::Integer(v)
        } else {
            Value::Double(v as f64)
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        if v <= crate::amf::INTEGER_MAX as u32 {
            Value::Integer(v as i32)
        } else {
            Value::Double(v as f64)
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(v: Vec<V>) -> Self {
        Value::array(v.into_iter().map(|x| x.into()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = Value::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = Value::Double(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let i = Value::Integer(7);
        assert_eq!(i.as_number(), Some(7.0));

        let o = Value::dynamic_object(vec![("key".to_string(), "value".into())]);
        assert_eq!(o.get_string("key"), Some("value".to_string()));
        assert_eq!(o.get("missing"), None);
    }

    #[test]
    fn test_from_conversions() {
        let v: Value = "test".into();
        assert!(matches!(v, Value::String(_)));

        let v: Value = 42.0.into();
        assert!(matches!(v, Value::Double(_)));

        let v: Value = true.into();
        assert!(matches!(v, Value::Bool(true)));

        // 29-bit range boundary
        let v: Value = 268_435_455i32.into();
        assert!(matches!(v, Value::Integer(268_435_455)));
        let v: Value = 268_435_456i32.into();
        assert!(matches!(v, Value::Double(_)));
        let v: Value = (-268_435_456i32).into();
        assert!(matches!(v, Value::Integer(_)));
        let v: Value = (-268_435_457i32).into();
        assert!(matches!(v, Value::Double(_)));
    }

    #[test]
    fn test_object_member_order() {
        let obj = Object {
            class_name: "com.example.Thing".into(),
            sealed: vec![("a".to_string(), Value::Integer(1))],
            dynamic: vec![("a".to_string(), Value::Integer(2))],
            ..Default::default()
        };
        // Sealed members shadow dynamic ones of the same name
        assert_eq!(obj.get("a"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_identity() {
        let shared = Value::byte_array(vec![1, 2, 3]);
        let clone = shared.clone();
        assert!(shared.ptr_eq(&clone));

        let other = Value::byte_array(vec![1, 2, 3]);
        assert_eq!(shared, other); // structurally equal
        assert!(!shared.ptr_eq(&other)); // but distinct allocations

        assert!(!Value::Integer(1).ptr_eq(&Value::Integer(1)));
    }
}

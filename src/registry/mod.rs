//! Externalizable class registry
//!
//! AMF3 objects whose trait carries the externalizable flag have an opaque
//! body that only the ActionScript class itself knows how to read and
//! write (`IExternalizable`). The registry maps class names to reader and
//! writer callbacks supplied by the application.
//!
//! The registry is read-mostly: populate it before decoding and share it
//! by reference with every decoder/encoder that may meet externalizable
//! classes. Decoding such a class with no registered reader fails with
//! `AmfError::ExternalizableNotRegistered`.

use std::collections::HashMap;

use bytes::Bytes;

use crate::amf::amf3::{Amf3Decoder, Amf3Encoder};
use crate::amf::value::Value;
use crate::error::AmfError;

/// Reader callback: positioned immediately after the trait header,
/// returns the decoded value for the externalizable body
pub type ExternalizableReader =
    Box<dyn Fn(&mut Amf3Decoder<'_>, &mut Bytes) -> Result<Value, AmfError>>;

/// Writer callback: emits the externalizable body for the given value
pub type ExternalizableWriter =
    Box<dyn Fn(&mut Amf3Encoder<'_>, &Value) -> Result<(), AmfError>>;

struct Handler {
    reader: ExternalizableReader,
    writer: ExternalizableWriter,
}

/// Class name to reader/writer mapping for externalizable bodies
#[derive(Default)]
pub struct ExternalizableRegistry {
    handlers: HashMap<String, Handler>,
}

impl ExternalizableRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reader/writer pair for a class name
    ///
    /// Re-registering a class replaces the previous handlers.
    pub fn register(
        &mut self,
        class_name: impl Into<String>,
        reader: ExternalizableReader,
        writer: ExternalizableWriter,
    ) {
        let class_name = class_name.into();
        tracing::debug!(class = %class_name, "Registering externalizable handler");
        self.handlers.insert(class_name, Handler { reader, writer });
    }

    /// Check whether a class has a registered handler
    pub fn contains(&self, class_name: &str) -> bool {
        self.handlers.contains_key(class_name)
    }

    pub(crate) fn reader(&self, class_name: &str) -> Option<&ExternalizableReader> {
        self.handlers.get(class_name).map(|h| &h.reader)
    }

    pub(crate) fn writer(&self, class_name: &str) -> Option<&ExternalizableWriter> {
        self.handlers.get(class_name).map(|h| &h.writer)
    }
}

impl std::fmt::Debug for ExternalizableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalizableRegistry")
            .field("classes", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ExternalizableRegistry::new();
        assert!(!registry.contains("com.example.Ext"));

        registry.register(
            "com.example.Ext",
            Box::new(|decoder, buf| decoder.decode(buf)),
            Box::new(|encoder, value| encoder.encode(value)),
        );

        assert!(registry.contains("com.example.Ext"));
        assert!(registry.reader("com.example.Ext").is_some());
        assert!(registry.writer("com.example.Ext").is_some());
        assert!(registry.reader("other.Class").is_none());
    }
}

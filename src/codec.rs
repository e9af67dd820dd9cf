//! Top-level decode and encode entry points
//!
//! These wrap the AMF0 and AMF3 codecs behind config structs so callers
//! pick the object encoding, limits, and externalizable registry in one
//! place. The Remoting envelope (`remoting` module) builds on the same
//! configs.

use bytes::Bytes;

use crate::amf::amf0::{Amf0Decoder, Amf0Encoder};
use crate::amf::amf3::{Amf3Decoder, Amf3Encoder};
use crate::amf::value::Value;
use crate::amf::{DEFAULT_MAX_ALLOCATION, DEFAULT_MAX_DEPTH};
use crate::error::{AmfError, Result};
use crate::registry::ExternalizableRegistry;

/// Which AMF wire format to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEncoding {
    /// AMF0 only
    Amf0,
    /// AMF3 only
    Amf3,
    /// Start in AMF0; the avmplus marker switches to AMF3 per value
    /// (decode only; encoders treat this as AMF3)
    Auto,
}

/// Configuration for decode operations
#[derive(Debug, Clone, Copy)]
pub struct DecodeConfig<'r> {
    /// Wire format to start in
    pub object_encoding: ObjectEncoding,
    /// Nesting depth guard
    pub max_depth: usize,
    /// Cumulative allocation ceiling per decoded message
    pub max_allocation: usize,
    /// Registry for externalizable classes
    pub registry: Option<&'r ExternalizableRegistry>,
}

impl Default for DecodeConfig<'_> {
    fn default() -> Self {
        Self {
            object_encoding: ObjectEncoding::Auto,
            max_depth: DEFAULT_MAX_DEPTH,
            max_allocation: DEFAULT_MAX_ALLOCATION,
            registry: None,
        }
    }
}

impl<'r> DecodeConfig<'r> {
    /// Create a decode config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the object encoding
    pub fn object_encoding(mut self, encoding: ObjectEncoding) -> Self {
        self.object_encoding = encoding;
        self
    }

    /// Set the nesting depth guard
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the allocation ceiling
    pub fn max_allocation(mut self, bytes: usize) -> Self {
        self.max_allocation = bytes;
        self
    }

    /// Attach an externalizable registry
    pub fn registry(mut self, registry: &'r ExternalizableRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub(crate) fn amf0_decoder(&self) -> Amf0Decoder<'r> {
        let mut decoder = Amf0Decoder::new().limits(self.max_depth, self.max_allocation);
        if let Some(registry) = self.registry {
            decoder = decoder.registry(registry);
        }
        decoder
    }

    pub(crate) fn amf3_decoder(&self) -> Amf3Decoder<'r> {
        let mut decoder = Amf3Decoder::new().limits(self.max_depth, self.max_allocation);
        if let Some(registry) = self.registry {
            decoder = decoder.registry(registry);
        }
        decoder
    }
}

/// Configuration for encode operations
#[derive(Debug, Clone, Copy)]
pub struct EncodeConfig<'r> {
    /// Wire format to emit; `Auto` is treated as AMF3
    pub object_encoding: ObjectEncoding,
    /// Initial capacity of the output buffer
    pub size_hint: usize,
    /// Registry for externalizable classes
    pub registry: Option<&'r ExternalizableRegistry>,
}

impl Default for EncodeConfig<'_> {
    fn default() -> Self {
        Self {
            object_encoding: ObjectEncoding::Amf3,
            size_hint: 256,
            registry: None,
        }
    }
}

impl<'r> EncodeConfig<'r> {
    /// Create an encode config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the object encoding
    pub fn object_encoding(mut self, encoding: ObjectEncoding) -> Self {
        self.object_encoding = encoding;
        self
    }

    /// Set the output buffer size hint
    pub fn size_hint(mut self, bytes: usize) -> Self {
        self.size_hint = bytes;
        self
    }

    /// Attach an externalizable registry
    pub fn registry(mut self, registry: &'r ExternalizableRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub(crate) fn amf0_encoder(&self) -> Amf0Encoder<'r> {
        let mut encoder = Amf0Encoder::with_capacity(self.size_hint);
        if let Some(registry) = self.registry {
            encoder = encoder.registry(registry);
        }
        encoder
    }

    pub(crate) fn amf3_encoder(&self) -> Amf3Encoder<'r> {
        let mut encoder = Amf3Encoder::with_capacity(self.size_hint);
        if let Some(registry) = self.registry {
            encoder = encoder.registry(registry);
        }
        encoder
    }
}

/// Decode a single AMF value
///
/// In `Auto` (and `Amf0`) mode decoding starts in AMF0 and the avmplus
/// marker hands individual values to AMF3; `Amf3` mode decodes pure AMF3.
pub fn decode(data: &[u8], config: &DecodeConfig) -> Result<Value> {
    let mut buf = Bytes::copy_from_slice(data);
    let value = match config.object_encoding {
        ObjectEncoding::Amf3 => config.amf3_decoder().decode(&mut buf)?,
        ObjectEncoding::Amf0 | ObjectEncoding::Auto => config.amf0_decoder().decode(&mut buf)?,
    };
    Ok(value)
}

/// Encode a single AMF value into a fresh buffer
pub fn encode(value: &Value, config: &EncodeConfig) -> Result<Bytes> {
    let bytes = match config.object_encoding {
        ObjectEncoding::Amf0 => {
            let mut encoder = config.amf0_encoder();
            encoder.encode(value)?;
            encoder.finish()
        }
        ObjectEncoding::Amf3 | ObjectEncoding::Auto => {
            let mut encoder = config.amf3_encoder();
            encoder.encode(value)?;
            encoder.finish()
        }
    };
    Ok(bytes)
}

/// Encode a single AMF value into a caller-supplied buffer
///
/// Returns the number of bytes written; fails with `BufferTooSmall` when
/// the buffer cannot hold the encoding.
pub fn encode_into(value: &Value, buf: &mut [u8], config: &EncodeConfig) -> Result<usize> {
    let encoded = encode(value, config)?;
    if encoded.len() > buf.len() {
        return Err(AmfError::BufferTooSmall.into());
    }
    buf[..encoded.len()].copy_from_slice(&encoded);
    Ok(encoded.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_auto_follows_avmplus() {
        // AMF0 stream carrying an AMF3 integer via the bridge
        let value = decode(&[0x11, 0x04, 0x15], &DecodeConfig::default()).unwrap();
        assert_eq!(value, Value::avm_plus(Value::Integer(21)));
    }

    #[test]
    fn test_decode_amf3_mode() {
        let config = DecodeConfig::new().object_encoding(ObjectEncoding::Amf3);
        assert_eq!(decode(&[0x04, 0x15], &config).unwrap(), Value::Integer(21));
    }

    #[test]
    fn test_encode_per_version() {
        let amf3 = encode(&Value::Integer(21), &EncodeConfig::default()).unwrap();
        assert_eq!(&amf3[..], &[0x04, 0x15]);

        let config = EncodeConfig::new().object_encoding(ObjectEncoding::Amf0);
        let amf0 = encode(&Value::Integer(21), &config).unwrap();
        assert_eq!(amf0[0], 0x00); // AMF0 Number marker
    }

    #[test]
    fn test_roundtrip_through_entry_points() {
        let value = Value::dynamic_object(vec![
            ("name".to_string(), Value::String("codec".into())),
            ("level".to_string(), Value::Integer(9)),
        ]);

        for encoding in [ObjectEncoding::Amf0, ObjectEncoding::Amf3] {
            let encoded =
                encode(&value, &EncodeConfig::new().object_encoding(encoding)).unwrap();
            let decoded =
                decode(&encoded, &DecodeConfig::new().object_encoding(encoding)).unwrap();
            assert_eq!(decoded, value, "{:?}", encoding);
        }
    }

    #[test]
    fn test_encode_into() {
        let mut buf = [0u8; 16];
        let written =
            encode_into(&Value::Integer(21), &mut buf, &EncodeConfig::default()).unwrap();
        assert_eq!(&buf[..written], &[0x04, 0x15]);

        let mut tiny = [0u8; 1];
        let err = encode_into(&Value::Integer(21), &mut tiny, &EncodeConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Amf(AmfError::BufferTooSmall)
        ));
    }

    #[test]
    fn test_decode_respects_limits() {
        let config = DecodeConfig::new()
            .object_encoding(ObjectEncoding::Amf3)
            .max_allocation(2);
        assert!(decode(&[0x06, 0x0B, 0x68, 0x65, 0x6C, 0x6C, 0x6F], &config).is_err());
    }
}

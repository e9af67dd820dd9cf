//! AMF (Action Message Format) implementation
//!
//! AMF is Adobe's binary serialization format used by Flash Remoting
//! gateways and RTMP for encoding command parameters and payloads. This
//! module implements both AMF0 (original format) and AMF3 (ActionScript
//! 3.0 format).
//!
//! Remoting envelope bodies start in AMF0; AMF3 is encapsulated inside
//! AMF0 via the avmplus marker (0x11) with fresh reference tables.

pub mod amf0;
pub mod amf3;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use amf3::{Amf3Decoder, Amf3Encoder, Amf3Trait};
pub use value::{Array, Dictionary, Object, ObjectVector, Value, Vector};

/// Smallest value representable by the 29-bit signed AMF3 Integer
pub const INTEGER_MIN: i32 = -(1 << 28);

/// Largest value representable by the 29-bit signed AMF3 Integer
pub const INTEGER_MAX: i32 = (1 << 28) - 1;

/// Default nesting depth guard for both decoders
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default cumulative allocation ceiling per decode (16 MiB)
pub const DEFAULT_MAX_ALLOCATION: usize = 16 * 1024 * 1024;

//! amf-rs: AMF0/AMF3 codec and Remoting envelope
//!
//! This library implements both versions of Adobe's Action Message Format
//! and the Remoting packet envelope that carries AMF payloads between
//! Flash clients and gateways such as Red5 and AMFPHP:
//! - AMF3 with its U29 variable-length integer and the three per-message
//!   reference tables (strings, objects, traits), including cyclic graphs
//!   and externalizable classes
//! - AMF0 sufficient to carry a Remoting envelope, bridging into AMF3
//!   through the avmplus marker
//! - The packet envelope (version, headers, messages) with its signed
//!   length prefixes and the -1 unknown-length sentinel
//!
//! # Example: decode a gateway request
//!
//! ```no_run
//! use amf_rs::{remoting, DecodeConfig};
//!
//! fn handle(raw: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//!     let (packet, consumed) = remoting::decode_packet(raw, &DecodeConfig::default())?;
//!     assert_eq!(consumed, raw.len());
//!     for message in &packet.messages {
//!         println!("{} -> {:?}", message.target_uri, message.body);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Example: encode a single AMF3 value
//!
//! ```
//! use amf_rs::{codec, EncodeConfig, Value};
//!
//! let bytes = codec::encode(&Value::Integer(21), &EncodeConfig::default()).unwrap();
//! assert_eq!(&bytes[..], &[0x04, 0x15]);
//! ```

pub mod amf;
pub mod codec;
pub mod error;
pub mod registry;
pub mod remoting;

// Re-export main types for convenience
pub use amf::{Amf0Decoder, Amf0Encoder, Amf3Decoder, Amf3Encoder, Amf3Trait};
pub use amf::{Array, Dictionary, Object, ObjectVector, Value, Vector};
pub use codec::{decode, encode, encode_into, DecodeConfig, EncodeConfig, ObjectEncoding};
pub use error::{AmfError, Error, PacketError, RefKind, Result};
pub use registry::ExternalizableRegistry;
pub use remoting::{Header, Message, Packet};

//! Unified error types for amf-rs

use std::fmt;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all codec operations
#[derive(Debug)]
pub enum Error {
    /// AMF encoding/decoding error
    Amf(AmfError),
    /// Remoting packet framing error
    Packet(PacketError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Amf(e) => write!(f, "AMF error: {}", e),
            Error::Packet(e) => write!(f, "Packet error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Amf(e) => Some(e),
            Error::Packet(e) => Some(e),
        }
    }
}

impl From<AmfError> for Error {
    fn from(err: AmfError) -> Self {
        Error::Amf(err)
    }
}

impl From<PacketError> for Error {
    fn from(err: PacketError) -> Self {
        Error::Packet(err)
    }
}

/// Which reference table an out-of-range index was read against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    String,
    Object,
    Trait,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::String => write!(f, "string"),
            RefKind::Object => write!(f, "object"),
            RefKind::Trait => write!(f, "trait"),
        }
    }
}

/// AMF encoding/decoding errors
#[derive(Debug)]
pub enum AmfError {
    /// Input ended mid-structure
    Truncated,
    /// Marker byte not in the spec for the active version (0 or 3)
    UnknownMarker { marker: u8, version: u8 },
    /// U29 encode overflow, or a declared length exceeding the remaining
    /// buffer or the configured allocation ceiling
    OutOfRange,
    /// Reference index read past the end of a reference table
    BadReference { kind: RefKind, index: usize },
    /// Trait header inconsistent (e.g. externalizable with sealed names)
    MalformedTrait,
    /// Externalizable class on the wire with no registered reader/writer
    ExternalizableNotRegistered { class_name: String },
    /// Fixed output buffer exhausted, or envelope scratch ceiling exceeded
    BufferTooSmall,
    /// String bytes not valid UTF-8
    InvalidUtf8,
    /// Nesting depth guard tripped
    NestingTooDeep,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::Truncated => write!(f, "Unexpected end of AMF data"),
            AmfError::UnknownMarker { marker, version } => {
                write!(f, "Unknown AMF{} marker: 0x{:02x}", version, marker)
            }
            AmfError::OutOfRange => write!(f, "Value or length out of range"),
            AmfError::BadReference { kind, index } => {
                write!(f, "Invalid {} reference: {}", kind, index)
            }
            AmfError::MalformedTrait => write!(f, "Malformed object trait header"),
            AmfError::ExternalizableNotRegistered { class_name } => {
                write!(f, "No externalizable handler registered for class '{}'", class_name)
            }
            AmfError::BufferTooSmall => write!(f, "Output buffer too small"),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Remoting packet framing errors
#[derive(Debug)]
pub enum PacketError {
    /// Packet ended mid-field, or a declared body window ran past the input
    Truncated,
    /// A header or message body exceeded the scratch buffer ceiling
    BodyTooLarge { size: usize, max: usize },
    /// Header name or message URI bytes not valid UTF-8
    InvalidUtf8,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Truncated => write!(f, "Unexpected end of packet"),
            PacketError::BodyTooLarge { size, max } => {
                write!(f, "Packet body too large: {} bytes (max {})", size, max)
            }
            PacketError::InvalidUtf8 => write!(f, "Invalid UTF-8 in packet field"),
        }
    }
}

impl std::error::Error for PacketError {}

//! AMF Remoting packet envelope
//!
//! The envelope wraps AMF payloads on the wire for Flash Remoting
//! gateways (Red5, AMFPHP, game backends). All integers are big-endian.
//!
//! ```text
//! version       u16   0 or 3 (informational)
//! headerCount   u16
//! headers       repeated:
//!   nameLength    u16
//!   name          UTF-8
//!   mustUnderstand u8
//!   contentLength i32   -1 = unknown
//!   content       one AMF0 value
//! messageCount  u16
//! messages      repeated:
//!   targetUri     u16 + UTF-8
//!   responseUri   u16 + UTF-8
//!   bodyLength    i32   -1 = unknown
//!   body          one AMF0 value
//! ```
//!
//! Each header and message body decodes with fresh AMF0 and AMF3 state;
//! reference tables never cross body boundaries. Bodies start in AMF0 and
//! reach AMF3 through the avmplus bridge.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::value::Value;
use crate::codec::{DecodeConfig, EncodeConfig};
use crate::error::{PacketError, Result};

/// Ceiling for a single encoded header or message body (16 MiB)
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Parsed Remoting packet
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Declared AMF version (0 or 3); informational only
    pub version: u16,
    pub headers: Vec<Header>,
    pub messages: Vec<Message>,
}

impl Packet {
    /// Create an empty packet with the given version
    pub fn new(version: u16) -> Self {
        Self {
            version,
            headers: Vec::new(),
            messages: Vec::new(),
        }
    }
}

/// Packet header: out-of-band metadata such as credentials or session ids
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub name: String,
    pub must_understand: bool,
    /// Wire carried the -1 length sentinel; honored verbatim on re-encode
    pub length_unknown: bool,
    pub value: Value,
}

impl Header {
    /// Create a header with the unknown-length sentinel (the common
    /// gateway convention)
    pub fn new(name: impl Into<String>, must_understand: bool, value: Value) -> Self {
        Self {
            name: name.into(),
            must_understand,
            length_unknown: true,
            value,
        }
    }
}

/// Packet message: one gateway method invocation or response
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Method to invoke, e.g. `PlayerService.login`
    pub target_uri: String,
    /// Client response slot, e.g. `/1`
    pub response_uri: String,
    /// Wire carried the -1 length sentinel; honored verbatim on re-encode
    pub length_unknown: bool,
    pub body: Value,
}

impl Message {
    /// Create a message with the unknown-length sentinel
    pub fn new(
        target_uri: impl Into<String>,
        response_uri: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            target_uri: target_uri.into(),
            response_uri: response_uri.into(),
            length_unknown: true,
            body,
        }
    }
}

/// Decode a Remoting packet
///
/// Returns the packet and the number of input bytes consumed.
pub fn decode_packet(data: &[u8], config: &DecodeConfig) -> Result<(Packet, usize)> {
    let total = data.len();
    let mut buf = Bytes::copy_from_slice(data);

    if buf.remaining() < 4 {
        return Err(PacketError::Truncated.into());
    }
    let version = buf.get_u16();
    let header_count = buf.get_u16();

    let mut headers = Vec::new();
    for _ in 0..header_count {
        let name = read_utf8(&mut buf)?;
        if buf.remaining() < 5 {
            return Err(PacketError::Truncated.into());
        }
        let must_understand = buf.get_u8() != 0;
        let length = buf.get_i32();
        let (value, length_unknown) = read_body(&mut buf, length, config)?;
        headers.push(Header {
            name,
            must_understand,
            length_unknown,
            value,
        });
    }

    if buf.remaining() < 2 {
        return Err(PacketError::Truncated.into());
    }
    let message_count = buf.get_u16();

    let mut messages = Vec::new();
    for _ in 0..message_count {
        let target_uri = read_utf8(&mut buf)?;
        let response_uri = read_utf8(&mut buf)?;
        if buf.remaining() < 4 {
            return Err(PacketError::Truncated.into());
        }
        let length = buf.get_i32();
        let (body, length_unknown) = read_body(&mut buf, length, config)?;
        messages.push(Message {
            target_uri,
            response_uri,
            length_unknown,
            body,
        });
    }

    let consumed = total - buf.remaining();
    tracing::debug!(
        version,
        headers = headers.len(),
        messages = messages.len(),
        consumed,
        "Decoded remoting packet"
    );

    Ok((
        Packet {
            version,
            headers,
            messages,
        },
        consumed,
    ))
}

/// Encode a Remoting packet
///
/// Each body is encoded into a scratch buffer to measure its length, then
/// written behind the measured i32 prefix, or behind -1 when the
/// unknown-length sentinel was requested.
pub fn encode_packet(packet: &Packet, config: &EncodeConfig) -> Result<Bytes> {
    if packet.headers.len() > u16::MAX as usize || packet.messages.len() > u16::MAX as usize {
        return Err(PacketError::BodyTooLarge {
            size: packet.headers.len().max(packet.messages.len()),
            max: u16::MAX as usize,
        }
        .into());
    }

    let mut buf = BytesMut::with_capacity(64);
    buf.put_u16(packet.version);

    buf.put_u16(packet.headers.len() as u16);
    for header in &packet.headers {
        write_utf8(&mut buf, &header.name)?;
        buf.put_u8(u8::from(header.must_understand));
        let body = encode_body(&header.value, config)?;
        buf.put_i32(if header.length_unknown { -1 } else { body.len() as i32 });
        buf.put_slice(&body);
    }

    buf.put_u16(packet.messages.len() as u16);
    for message in &packet.messages {
        write_utf8(&mut buf, &message.target_uri)?;
        write_utf8(&mut buf, &message.response_uri)?;
        let body = encode_body(&message.body, config)?;
        buf.put_i32(if message.length_unknown { -1 } else { body.len() as i32 });
        buf.put_slice(&body);
    }

    tracing::debug!(
        version = packet.version,
        headers = packet.headers.len(),
        messages = packet.messages.len(),
        bytes = buf.len(),
        "Encoded remoting packet"
    );

    Ok(buf.freeze())
}

/// Decode one AMF0 body, honoring a nonnegative declared length as a
/// window whose trailing bytes are discarded
fn read_body(buf: &mut Bytes, length: i32, config: &DecodeConfig) -> Result<(Value, bool)> {
    if length < 0 {
        // Unknown length: advance by actual consumption
        let value = config.amf0_decoder().decode(buf)?;
        return Ok((value, true));
    }

    let window = length as usize;
    if window > buf.remaining() {
        return Err(PacketError::Truncated.into());
    }

    let before = buf.remaining();
    let value = config.amf0_decoder().decode(buf)?;
    let consumed = before - buf.remaining();

    if consumed < window {
        tracing::trace!(
            declared = window,
            consumed,
            "Discarding trailing bytes inside declared body window"
        );
        buf.advance(window - consumed);
    } else if consumed > window {
        tracing::debug!(declared = window, consumed, "Body overran its declared length");
    }

    Ok((value, false))
}

/// Encode one body into a scratch buffer, enforcing the size ceiling
fn encode_body(value: &Value, config: &EncodeConfig) -> Result<Bytes> {
    // Bodies always start in AMF0; AvmPlus-tagged values reach AMF3
    // through the bridge
    let mut encoder = config.amf0_encoder();
    encoder.encode(value)?;
    let body = encoder.finish();
    if body.len() > MAX_BODY_SIZE {
        return Err(PacketError::BodyTooLarge {
            size: body.len(),
            max: MAX_BODY_SIZE,
        }
        .into());
    }
    Ok(body)
}

fn read_utf8(buf: &mut Bytes) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(PacketError::Truncated.into());
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(PacketError::Truncated.into());
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| PacketError::InvalidUtf8.into())
}

fn write_utf8(buf: &mut BytesMut, s: &str) -> Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(PacketError::BodyTooLarge {
            size: s.len(),
            max: u16::MAX as usize,
        }
        .into());
    }
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::value::Object;

    fn login_packet() -> Packet {
        // One session header and one AMF3 command body, the shape a Flash
        // game client sends to its gateway
        let request = Value::object(Object {
            class_name: "com.ninjasaga.protocol.LoginRequest".into(),
            sealed: vec![
                ("username".to_string(), Value::String("shinobi".into())),
                ("token".to_string(), Value::String("abc123".into())),
            ],
            ..Default::default()
        });
        let envelope = Value::object(Object {
            class_name: "com.ninjasaga.protocol.CommandEnvelope".into(),
            sealed: vec![
                ("command".to_string(), Value::String("login".into())),
                ("arg".to_string(), request),
            ],
            ..Default::default()
        });

        let mut packet = Packet::new(3);
        packet.headers.push(Header::new(
            "DSId",
            false,
            Value::String("nil".into()),
        ));
        packet.messages.push(Message::new(
            "PlayerService.login",
            "/1",
            Value::avm_plus(envelope),
        ));
        packet
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = login_packet();
        let encoded = encode_packet(&packet, &EncodeConfig::default()).unwrap();
        let (decoded, consumed) = decode_packet(&encoded, &DecodeConfig::default()).unwrap();

        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.version, 3);

        assert_eq!(decoded.headers.len(), 1);
        assert_eq!(decoded.headers[0].name, "DSId");
        assert!(!decoded.headers[0].must_understand);
        assert_eq!(decoded.headers[0].value, Value::String("nil".into()));

        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0].target_uri, "PlayerService.login");
        assert_eq!(decoded.messages[0].response_uri, "/1");

        let body = &decoded.messages[0].body;
        let envelope = match body {
            Value::AvmPlus(inner) => inner.as_ref(),
            other => panic!("expected avmplus body, got {:?}", other),
        };
        if let Value::Object(obj) = envelope {
            assert_eq!(obj.borrow().class_name, "com.ninjasaga.protocol.CommandEnvelope");
        } else {
            panic!("expected object envelope");
        }
        let arg = envelope.get("arg").expect("arg member");
        if let Value::Object(obj) = &arg {
            assert_eq!(obj.borrow().class_name, "com.ninjasaga.protocol.LoginRequest");
        } else {
            panic!("expected object arg");
        }
        assert_eq!(arg.get_string("username"), Some("shinobi".to_string()));
    }

    #[test]
    fn test_byte_exact_reencode() {
        // Sentinel choice is preserved, so re-encoding reproduces the
        // original bytes
        let packet = login_packet();
        let encoded = encode_packet(&packet, &EncodeConfig::default()).unwrap();
        let (decoded, _) = decode_packet(&encoded, &DecodeConfig::default()).unwrap();
        let reencoded = encode_packet(&decoded, &EncodeConfig::default()).unwrap();
        assert_eq!(&encoded[..], &reencoded[..]);
    }

    #[test]
    fn test_measured_length_prefix() {
        let mut packet = login_packet();
        packet.headers[0].length_unknown = false;
        packet.messages[0].length_unknown = false;

        let encoded = encode_packet(&packet, &EncodeConfig::default()).unwrap();
        let (decoded, _) = decode_packet(&encoded, &DecodeConfig::default()).unwrap();
        assert!(!decoded.headers[0].length_unknown);
        assert!(!decoded.messages[0].length_unknown);
        assert_eq!(decoded, packet);

        // Header body is an AMF0 string "nil": marker + u16 + 3 bytes
        // behind a measured prefix of 6
        let name_end = 2 + 2 + 2 + 4 + 1; // version, count, name len, name, mu
        assert_eq!(&encoded[name_end..name_end + 4], &[0, 0, 0, 6]);
    }

    #[test]
    fn test_unknown_length_sentinel_on_wire() {
        let packet = login_packet();
        let encoded = encode_packet(&packet, &EncodeConfig::default()).unwrap();
        let sentinel_at = 2 + 2 + 2 + 4 + 1;
        assert_eq!(&encoded[sentinel_at..sentinel_at + 4], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_trailing_bytes_in_window_discarded() {
        // Hand-built packet: one message whose declared window is two
        // bytes longer than its AMF0 body
        let mut buf = BytesMut::new();
        buf.put_u16(0); // version
        buf.put_u16(0); // headers
        buf.put_u16(1); // messages
        buf.put_u16(1);
        buf.put_slice(b"t");
        buf.put_u16(1);
        buf.put_slice(b"r");
        buf.put_i32(3); // window: 1-byte value + 2 bytes of padding
        buf.put_u8(0x05); // AMF0 null
        buf.put_slice(&[0xAA, 0xBB]); // padding inside the window

        let data = buf.freeze();
        let (packet, consumed) = decode_packet(&data, &DecodeConfig::default()).unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(packet.messages[0].body, Value::Null);
        assert!(!packet.messages[0].length_unknown);
    }

    #[test]
    fn test_window_past_end_is_truncated() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u16(1);
        buf.put_u16(1);
        buf.put_slice(b"t");
        buf.put_u16(1);
        buf.put_slice(b"r");
        buf.put_i32(50); // declares more than remains
        buf.put_u8(0x05);

        let err = decode_packet(&buf.freeze(), &DecodeConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Packet(PacketError::Truncated)
        ));
    }

    #[test]
    fn test_truncated_packet() {
        assert!(decode_packet(&[], &DecodeConfig::default()).is_err());
        assert!(decode_packet(&[0x00], &DecodeConfig::default()).is_err());
        // Declares one header, provides nothing
        assert!(decode_packet(&[0x00, 0x00, 0x00, 0x01], &DecodeConfig::default()).is_err());
    }

    #[test]
    fn test_fresh_tables_per_body() {
        // The same AMF3 string in two message bodies must be inline in
        // both; reference tables never span bodies
        let mut packet = Packet::new(3);
        packet.messages.push(Message::new(
            "Svc.a",
            "/1",
            Value::avm_plus(Value::String("ns".into())),
        ));
        packet.messages.push(Message::new(
            "Svc.b",
            "/2",
            Value::avm_plus(Value::String("ns".into())),
        ));

        let encoded = encode_packet(&packet, &EncodeConfig::default()).unwrap();
        let payload_count = encoded.windows(2).filter(|&w| w == b"ns").count();
        assert_eq!(payload_count, 2);

        let (decoded, _) = decode_packet(&encoded, &DecodeConfig::default()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_version_preserved() {
        for version in [0u16, 3] {
            let mut packet = Packet::new(version);
            packet
                .messages
                .push(Message::new("s", "/1", Value::Null));
            let encoded = encode_packet(&packet, &EncodeConfig::default()).unwrap();
            let (decoded, _) = decode_packet(&encoded, &DecodeConfig::default()).unwrap();
            assert_eq!(decoded.version, version);
        }
    }
}

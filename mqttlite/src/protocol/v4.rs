//! MQTT 3.1.1 (v4) protocol implementation.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::types::{FixedHeader, MessageType, QoS};

use super::codec::{read_u16, remaining_length_len, write_remaining_length, write_string};
use super::{PROTOCOL_LEVEL, PROTOCOL_NAME};

/// Connect flag: clean session.
const CLEAN_SESSION: u8 = 0x02;

/// Fixed flags required on SUBSCRIBE.
const SUBSCRIBE_FLAGS: u8 = 0x02;

/// MQTT 3.1.1 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Connect(Connect),
    ConnAck(ConnAck),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Publish(Publish),
    PingReq,
    PingResp,
    Disconnect,
}

/// CONNECT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Empty means the broker assigns an id.
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_session: bool,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            keep_alive: 60,
            clean_session: true,
        }
    }
}

/// CONNACK message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: u8,
}

/// SUBSCRIBE message with a single topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub pkid: u16,
    pub filter: String,
    pub qos: QoS,
}

impl Default for Subscribe {
    fn default() -> Self {
        Self {
            pkid: 1,
            filter: "#".to_string(),
            qos: QoS::AtMostOnce,
        }
    }
}

/// SUBACK message for a single topic filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubAck {
    pub pkid: u16,
    pub granted_qos: u8,
}

impl Default for SubAck {
    fn default() -> Self {
        Self { pkid: 1, granted_qos: 0 }
    }
}

/// PUBLISH message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub flags: u8,
    pub topic: String,
    pub payload: Bytes,
}

// ============================================================================
// Message encoding and dispatch
// ============================================================================

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Connect(_) => MessageType::Connect,
            Message::ConnAck(_) => MessageType::ConnAck,
            Message::Subscribe(_) => MessageType::Subscribe,
            Message::SubAck(_) => MessageType::SubAck,
            Message::Publish(_) => MessageType::Publish,
            Message::PingReq => MessageType::PingReq,
            Message::PingResp => MessageType::PingResp,
            Message::Disconnect => MessageType::Disconnect,
        }
    }

    /// Lower nibble of the first header byte.
    pub fn flags(&self) -> u8 {
        match self {
            Message::Subscribe(_) => SUBSCRIBE_FLAGS,
            Message::Publish(p) => p.flags & 0x0F,
            _ => 0,
        }
    }

    /// Append the body (everything after the fixed header) to `buf`.
    pub fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Message::Connect(p) => p.encode_body(buf),
            Message::ConnAck(p) => {
                p.encode_body(buf);
                Ok(())
            }
            Message::Subscribe(p) => p.encode_body(buf),
            Message::SubAck(p) => {
                p.encode_body(buf);
                Ok(())
            }
            Message::Publish(p) => p.encode_body(buf),
            Message::PingReq | Message::PingResp | Message::Disconnect => Ok(()),
        }
    }

    /// Encode the full packet: type/flags byte, remaining length, body.
    pub fn encode(&self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;

        let header = FixedHeader::new(self.message_type(), self.flags(), body.len());
        let mut buf =
            BytesMut::with_capacity(1 + remaining_length_len(body.len()) + body.len());
        buf.put_u8(header.type_and_flags);
        write_remaining_length(&mut buf, header.remaining_length)?;
        buf.extend_from_slice(&body);

        Ok(buf.freeze())
    }

    /// Build an inbound message from its first header byte and body.
    ///
    /// Only PUBLISH is dispatched; CONNACK and SUBACK are validated by the
    /// handshake directly and nothing else is expected from a broker.
    pub fn decode(type_and_flags: u8, body: Bytes) -> Result<Message> {
        let header = FixedHeader {
            type_and_flags,
            remaining_length: body.len(),
        };

        match header.message_type() {
            Some(MessageType::Publish) => Ok(Message::Publish(Publish::decode(header.flags(), body)?)),
            _ => Err(Error::UnhandledMessageType(header.type_bits())),
        }
    }
}

impl From<Connect> for Message {
    fn from(p: Connect) -> Self {
        Message::Connect(p)
    }
}

impl From<ConnAck> for Message {
    fn from(p: ConnAck) -> Self {
        Message::ConnAck(p)
    }
}

impl From<Subscribe> for Message {
    fn from(p: Subscribe) -> Self {
        Message::Subscribe(p)
    }
}

impl From<SubAck> for Message {
    fn from(p: SubAck) -> Self {
        Message::SubAck(p)
    }
}

impl From<Publish> for Message {
    fn from(p: Publish) -> Self {
        Message::Publish(p)
    }
}

// ============================================================================
// Individual message bodies
// ============================================================================

impl Connect {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, PROTOCOL_NAME)?;
        buf.put_u8(PROTOCOL_LEVEL);
        buf.put_u8(if self.clean_session { CLEAN_SESSION } else { 0 });
        buf.put_u16(self.keep_alive);
        write_string(buf, &self.client_id)
    }
}

impl ConnAck {
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < 2 {
            return Err(Error::BodyTooShort { declared: 2, available: body.len() });
        }
        Ok(ConnAck {
            session_present: body[0] & 0x01 != 0,
            code: body[1],
        })
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u8(self.session_present as u8);
        buf.put_u8(self.code);
    }
}

impl Subscribe {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Default::default()
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.pkid);
        write_string(buf, &self.filter)?;
        buf.put_u8(self.qos as u8);
        Ok(())
    }
}

impl SubAck {
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < 3 {
            return Err(Error::BodyTooShort { declared: 3, available: body.len() });
        }
        Ok(SubAck {
            pkid: u16::from_be_bytes([body[0], body[1]]),
            granted_qos: body[2],
        })
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u16(self.pkid);
        buf.put_u8(self.granted_qos);
    }
}

impl Publish {
    /// Create a QoS 0 publish.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            flags: 0,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Parse a body: 2-byte topic length, topic, then payload to the end.
    pub fn decode(flags: u8, body: Bytes) -> Result<Self> {
        let topic_len = read_u16(&body).ok_or(Error::BodyTooShort {
            declared: 2,
            available: body.len(),
        })? as usize;

        let available = body.len() - 2;
        if topic_len > available {
            return Err(Error::BodyTooShort { declared: topic_len, available });
        }

        let topic = std::str::from_utf8(&body[2..2 + topic_len])
            .map_err(|_| Error::InvalidUtf8)?
            .to_string();
        let payload = body.slice(2 + topic_len..);

        Ok(Publish { flags, topic, payload })
    }

    pub fn retain(&self) -> bool {
        self.flags & 0x01 != 0
    }

    pub fn dup(&self) -> bool {
        self.flags & 0x08 != 0
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.topic)?;
        buf.put_slice(&self.payload);
        Ok(())
    }
}

//! Common types for mqttlite.

/// MQTT 3.1.1 control packet type (upper nibble of the first header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Reserved = 0,
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl MessageType {
    /// Convert a 4-bit type value. Returns `None` for 15.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => MessageType::Reserved,
            1 => MessageType::Connect,
            2 => MessageType::ConnAck,
            3 => MessageType::Publish,
            4 => MessageType::PubAck,
            5 => MessageType::PubRec,
            6 => MessageType::PubRel,
            7 => MessageType::PubComp,
            8 => MessageType::Subscribe,
            9 => MessageType::SubAck,
            10 => MessageType::Unsubscribe,
            11 => MessageType::UnsubAck,
            12 => MessageType::PingReq,
            13 => MessageType::PingResp,
            14 => MessageType::Disconnect,
            _ => return None,
        })
    }
}

/// Fixed header of every MQTT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    /// Packet type in the upper nibble, flags in the lower nibble.
    pub type_and_flags: u8,
    /// Exact byte length of the body that follows.
    pub remaining_length: usize,
}

impl FixedHeader {
    pub fn new(message_type: MessageType, flags: u8, remaining_length: usize) -> Self {
        Self {
            type_and_flags: ((message_type as u8) << 4) | (flags & 0x0F),
            remaining_length,
        }
    }

    /// Raw 4-bit packet type.
    pub fn type_bits(&self) -> u8 {
        self.type_and_flags >> 4
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.type_bits())
    }

    pub fn flags(&self) -> u8 {
        self.type_and_flags & 0x0F
    }
}

/// Quality of Service level.
///
/// Only QoS 0 is ever requested; the enum exists so SUBSCRIBE carries a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// At most once delivery (fire and forget).
    #[default]
    AtMostOnce = 0,
}

/// Lifecycle of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Socket open, nothing sent yet.
    #[default]
    Disconnected,
    /// CONNECT sent, waiting for CONNACK.
    Connecting,
    /// CONNACK accepted.
    Connected,
    /// SUBSCRIBE sent, waiting for SUBACK.
    Subscribing,
    /// SUBACK accepted; the receive loop may run.
    Active,
    /// Terminal: disconnected or failed.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Subscribing => "subscribing",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Typed payloads for the control messages this client reads and writes.
//!
//! Each struct mirrors the fields the client actually consumes; everything
//! else on the wire is skipped, and fields may arrive in any order or repeat.

use crate::error::DecodeError;
use crate::varint::decode_varint;
use crate::wire::{self, WIRE_LENGTH_DELIMITED, WIRE_VARINT};

fn decode_u32(buf: &mut &[u8]) -> Result<u32, DecodeError> {
    Ok(decode_varint(buf)? as u32)
}

/// Version exchange, sent by both sides at connection start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version {
    pub version: Option<u32>,
    pub release: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
}

impl Version {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            match (key.field_number, key.wire_type) {
                (1, WIRE_VARINT) => message.version = Some(decode_u32(&mut payload)?),
                (2, WIRE_LENGTH_DELIMITED) => {
                    message.release = Some(wire::decode_string(&mut payload)?)
                }
                (3, WIRE_LENGTH_DELIMITED) => message.os = Some(wire::decode_string(&mut payload)?),
                (4, WIRE_LENGTH_DELIMITED) => {
                    message.os_version = Some(wire::decode_string(&mut payload)?)
                }
                (_, wire_type) => wire::skip_value(&mut payload, wire_type)?,
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(version) = self.version {
            wire::encode_uint(&mut buf, 1, version.into());
        }
        if let Some(release) = &self.release {
            wire::encode_string(&mut buf, 2, release);
        }
        if let Some(os) = &self.os {
            wire::encode_string(&mut buf, 3, os);
        }
        if let Some(os_version) = &self.os_version {
            wire::encode_string(&mut buf, 4, os_version);
        }
        buf
    }
}

/// Authentication payload carrying the login name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authenticate {
    pub username: Option<String>,
}

impl Authenticate {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            match (key.field_number, key.wire_type) {
                (1, WIRE_LENGTH_DELIMITED) => {
                    message.username = Some(wire::decode_string(&mut payload)?)
                }
                (_, wire_type) => wire::skip_value(&mut payload, wire_type)?,
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(username) = &self.username {
            wire::encode_string(&mut buf, 1, username);
        }
        buf
    }
}

/// Keepalive. An empty payload is legal in both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ping;

impl Ping {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            wire::skip_value(&mut payload, key.wire_type)?;
        }
        Ok(Self)
    }

    pub fn encode(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Server refused the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reject {
    pub reject_type: Option<u32>,
    pub reason: Option<String>,
}

impl Reject {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            match (key.field_number, key.wire_type) {
                (1, WIRE_VARINT) => message.reject_type = Some(decode_u32(&mut payload)?),
                (2, WIRE_LENGTH_DELIMITED) => {
                    message.reason = Some(wire::decode_string(&mut payload)?)
                }
                (_, wire_type) => wire::skip_value(&mut payload, wire_type)?,
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(reject_type) = self.reject_type {
            wire::encode_uint(&mut buf, 1, reject_type.into());
        }
        if let Some(reason) = &self.reason {
            wire::encode_string(&mut buf, 2, reason);
        }
        buf
    }
}

/// Post-authentication synchronization marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSync {
    pub session: Option<u32>,
    pub max_bandwidth: Option<u32>,
    pub welcome_text: Option<String>,
}

impl ServerSync {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            match (key.field_number, key.wire_type) {
                (1, WIRE_VARINT) => message.session = Some(decode_u32(&mut payload)?),
                (2, WIRE_VARINT) => message.max_bandwidth = Some(decode_u32(&mut payload)?),
                (3, WIRE_LENGTH_DELIMITED) => {
                    message.welcome_text = Some(wire::decode_string(&mut payload)?)
                }
                (_, wire_type) => wire::skip_value(&mut payload, wire_type)?,
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(session) = self.session {
            wire::encode_uint(&mut buf, 1, session.into());
        }
        if let Some(max_bandwidth) = self.max_bandwidth {
            wire::encode_uint(&mut buf, 2, max_bandwidth.into());
        }
        if let Some(welcome_text) = &self.welcome_text {
            wire::encode_string(&mut buf, 3, welcome_text);
        }
        buf
    }
}

/// Incremental channel create/update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub channel_id: Option<u32>,
    pub parent: Option<u32>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Every occurrence is captured; this is a repeated field on the wire.
    pub links_remove: Vec<u32>,
}

impl ChannelState {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            match (key.field_number, key.wire_type) {
                (1, WIRE_VARINT) => message.channel_id = Some(decode_u32(&mut payload)?),
                (2, WIRE_VARINT) => message.parent = Some(decode_u32(&mut payload)?),
                (3, WIRE_LENGTH_DELIMITED) => {
                    message.name = Some(wire::decode_string(&mut payload)?)
                }
                (5, WIRE_LENGTH_DELIMITED) => {
                    message.description = Some(wire::decode_string(&mut payload)?)
                }
                (7, WIRE_VARINT) => message.links_remove.push(decode_u32(&mut payload)?),
                (_, wire_type) => wire::skip_value(&mut payload, wire_type)?,
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(channel_id) = self.channel_id {
            wire::encode_uint(&mut buf, 1, channel_id.into());
        }
        if let Some(parent) = self.parent {
            wire::encode_uint(&mut buf, 2, parent.into());
        }
        if let Some(name) = &self.name {
            wire::encode_string(&mut buf, 3, name);
        }
        if let Some(description) = &self.description {
            wire::encode_string(&mut buf, 5, description);
        }
        for &link in &self.links_remove {
            wire::encode_uint(&mut buf, 7, link.into());
        }
        buf
    }
}

/// Incremental user create/update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserState {
    pub session: Option<u32>,
    pub name: Option<String>,
    pub channel_id: Option<u32>,
}

impl UserState {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            match (key.field_number, key.wire_type) {
                (1, WIRE_VARINT) => message.session = Some(decode_u32(&mut payload)?),
                (3, WIRE_LENGTH_DELIMITED) => {
                    message.name = Some(wire::decode_string(&mut payload)?)
                }
                (5, WIRE_VARINT) => message.channel_id = Some(decode_u32(&mut payload)?),
                (_, wire_type) => wire::skip_value(&mut payload, wire_type)?,
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(session) = self.session {
            wire::encode_uint(&mut buf, 1, session.into());
        }
        if let Some(name) = &self.name {
            wire::encode_string(&mut buf, 3, name);
        }
        if let Some(channel_id) = self.channel_id {
            wire::encode_uint(&mut buf, 5, channel_id.into());
        }
        buf
    }
}

/// A user left or was dropped by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRemove {
    pub session: u32,
}

impl UserRemove {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            match (key.field_number, key.wire_type) {
                (1, WIRE_VARINT) => message.session = decode_u32(&mut payload)?,
                (_, wire_type) => wire::skip_value(&mut payload, wire_type)?,
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        wire::encode_uint(&mut buf, 1, self.session.into());
        buf
    }
}

/// Chat text addressed to one or more channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextMessage {
    pub actor: Option<u32>,
    /// Destination channels; the client sends exactly one.
    pub channel_id: Vec<u32>,
    pub message: String,
}

impl TextMessage {
    pub fn decode(mut payload: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        while !payload.is_empty() {
            let key = wire::decode_tag(&mut payload)?;
            match (key.field_number, key.wire_type) {
                (1, WIRE_VARINT) => message.actor = Some(decode_u32(&mut payload)?),
                (3, WIRE_VARINT) => message.channel_id.push(decode_u32(&mut payload)?),
                (5, WIRE_LENGTH_DELIMITED) => {
                    message.message = wire::decode_string(&mut payload)?
                }
                (_, wire_type) => wire::skip_value(&mut payload, wire_type)?,
            }
        }
        Ok(message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(actor) = self.actor {
            wire::encode_uint(&mut buf, 1, actor.into());
        }
        for &channel_id in &self.channel_id {
            wire::encode_uint(&mut buf, 3, channel_id.into());
        }
        wire::encode_string(&mut buf, 5, &self.message);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{encode_string, encode_uint};

    #[test]
    fn channel_state_roundtrip() {
        let state = ChannelState {
            channel_id: Some(1),
            parent: Some(0),
            name: Some("Lobby".to_string()),
            description: Some("general chatter".to_string()),
            links_remove: vec![4, 9],
        };
        assert_eq!(ChannelState::decode(&state.encode()).unwrap(), state);
    }

    #[test]
    fn channel_state_skips_unknown_trailing_fields() {
        let state = ChannelState {
            channel_id: Some(1),
            parent: Some(0),
            name: Some("Lobby".to_string()),
            ..Default::default()
        };
        let mut payload = state.encode();
        // Append fields this client does not know about.
        encode_uint(&mut payload, 9, 1); // position
        encode_string(&mut payload, 11, "whatever");

        assert_eq!(ChannelState::decode(&payload).unwrap(), state);
    }

    #[test]
    fn channel_state_fields_may_arrive_in_any_order() {
        let mut payload = Vec::new();
        encode_string(&mut payload, 3, "Lobby");
        encode_uint(&mut payload, 1, 1);
        encode_uint(&mut payload, 7, 4);
        encode_uint(&mut payload, 2, 0);
        encode_uint(&mut payload, 7, 9);

        let decoded = ChannelState::decode(&payload).unwrap();
        assert_eq!(decoded.channel_id, Some(1));
        assert_eq!(decoded.parent, Some(0));
        assert_eq!(decoded.name.as_deref(), Some("Lobby"));
        assert_eq!(decoded.links_remove, vec![4, 9]);
    }

    #[test]
    fn user_state_roundtrip() {
        let state = UserState {
            session: Some(5),
            name: Some("alice".to_string()),
            channel_id: Some(1),
        };
        assert_eq!(UserState::decode(&state.encode()).unwrap(), state);
    }

    #[test]
    fn text_message_keeps_every_destination() {
        let text = TextMessage {
            actor: Some(7),
            channel_id: vec![0, 3, 3],
            message: "hello".to_string(),
        };
        assert_eq!(TextMessage::decode(&text.encode()).unwrap(), text);
    }

    #[test]
    fn ping_accepts_empty_payload() {
        assert_eq!(Ping::decode(&[]).unwrap(), Ping);
        assert!(Ping.encode().is_empty());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let state = ChannelState {
            channel_id: Some(1),
            name: Some("Lobby".to_string()),
            ..Default::default()
        };
        let payload = state.encode();
        assert_eq!(
            ChannelState::decode(&payload[..payload.len() - 2]),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn version_roundtrip() {
        let version = Version {
            version: Some(0x010213),
            release: Some("mumblet 0.1.0".to_string()),
            os: Some("linux".to_string()),
            os_version: Some("x86_64".to_string()),
        };
        assert_eq!(Version::decode(&version.encode()).unwrap(), version);
    }
}

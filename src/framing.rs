//! Length-prefixed framing for the control channel.
//!
//! Every message travels as a 6-byte prefix (reserved byte, type byte,
//! payload length as a 4-byte big-endian integer) followed by the payload.
//! The framer retains partial reads across calls, preventing framing
//! desynchronization when messages arrive fragmented.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

/// Size of the framing prefix in bytes.
pub const PREFIX_SIZE: usize = 6;
/// Hard cap on a complete inbound message, prefix included.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// Identifier for every control message kind the protocol defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Version,
    UdpTunnel,
    Authenticate,
    Ping,
    Reject,
    ServerSync,
    ChannelRemove,
    ChannelState,
    UserRemove,
    UserState,
    BanList,
    TextMessage,
    PermissionDenied,
    Acl,
    QueryUsers,
    CryptSetup,
    ContextActionModify,
    ContextAction,
    UserList,
    VoiceTarget,
    PermissionQuery,
    CodecVersion,
    UserStats,
    RequestBlob,
    ServerConfig,
    SuggestConfig,
    /// Type id without an explicit mapping; tolerated, never dispatched.
    Unknown(u16),
}

impl MessageKind {
    /// Construct a message kind from its wire identifier.
    pub fn from_id(value: u16) -> Self {
        match value {
            0 => MessageKind::Version,
            1 => MessageKind::UdpTunnel,
            2 => MessageKind::Authenticate,
            3 => MessageKind::Ping,
            4 => MessageKind::Reject,
            5 => MessageKind::ServerSync,
            6 => MessageKind::ChannelRemove,
            7 => MessageKind::ChannelState,
            8 => MessageKind::UserRemove,
            9 => MessageKind::UserState,
            10 => MessageKind::BanList,
            11 => MessageKind::TextMessage,
            12 => MessageKind::PermissionDenied,
            13 => MessageKind::Acl,
            14 => MessageKind::QueryUsers,
            15 => MessageKind::CryptSetup,
            16 => MessageKind::ContextActionModify,
            17 => MessageKind::ContextAction,
            18 => MessageKind::UserList,
            19 => MessageKind::VoiceTarget,
            20 => MessageKind::PermissionQuery,
            21 => MessageKind::CodecVersion,
            22 => MessageKind::UserStats,
            23 => MessageKind::RequestBlob,
            24 => MessageKind::ServerConfig,
            25 => MessageKind::SuggestConfig,
            other => MessageKind::Unknown(other),
        }
    }

    /// Return the numeric identifier associated with this message kind.
    pub fn as_id(self) -> u16 {
        match self {
            MessageKind::Version => 0,
            MessageKind::UdpTunnel => 1,
            MessageKind::Authenticate => 2,
            MessageKind::Ping => 3,
            MessageKind::Reject => 4,
            MessageKind::ServerSync => 5,
            MessageKind::ChannelRemove => 6,
            MessageKind::ChannelState => 7,
            MessageKind::UserRemove => 8,
            MessageKind::UserState => 9,
            MessageKind::BanList => 10,
            MessageKind::TextMessage => 11,
            MessageKind::PermissionDenied => 12,
            MessageKind::Acl => 13,
            MessageKind::QueryUsers => 14,
            MessageKind::CryptSetup => 15,
            MessageKind::ContextActionModify => 16,
            MessageKind::ContextAction => 17,
            MessageKind::UserList => 18,
            MessageKind::VoiceTarget => 19,
            MessageKind::PermissionQuery => 20,
            MessageKind::CodecVersion => 21,
            MessageKind::UserStats => 22,
            MessageKind::RequestBlob => 23,
            MessageKind::ServerConfig => 24,
            MessageKind::SuggestConfig => 25,
            MessageKind::Unknown(value) => value,
        }
    }
}

/// One framed control message: a type tag and its raw payload bytes.
///
/// Payloads stay uninterpreted until a handler needs specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Serialize the message into a contiguous prefixed byte buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PREFIX_SIZE + self.payload.len());
        bytes.extend_from_slice(&self.kind.as_id().to_be_bytes());
        bytes.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Write the prefixed message to the provided writer, preserving order
    /// with any writes already queued on it.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), io::Error>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await
    }
}

/// Given the bytes accumulated so far, return the minimum number of bytes the
/// complete message needs: the prefix if it is not yet complete, otherwise
/// the prefix plus the declared payload length.
pub fn minimum_message_bytes(buffer: &[u8]) -> usize {
    if buffer.len() < PREFIX_SIZE {
        PREFIX_SIZE
    } else {
        let payload_len =
            u32::from_be_bytes([buffer[2], buffer[3], buffer[4], buffer[5]]) as usize;
        PREFIX_SIZE + payload_len
    }
}

/// Stateful message reader for one connection.
///
/// A single framer is reused serially for every message on its connection.
/// Partial frames survive across `read_message` calls, and across a dropped
/// in-flight call, so a message split over many reads is reassembled exactly
/// where the previous call left off.
#[derive(Debug)]
pub struct MessageFramer {
    buffer: Box<[u8]>,
    filled: usize,
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFramer {
    pub fn new() -> Self {
        Self {
            buffer: vec![0u8; MAX_MESSAGE_SIZE].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Read one complete message, resuming any partially buffered frame.
    ///
    /// A zero-length read from `reader` is a connection-closed failure; a
    /// prefix declaring more than [`MAX_MESSAGE_SIZE`] bytes fails before any
    /// of the oversized payload is read.
    pub async fn read_message<R>(&mut self, reader: &mut R) -> Result<Message, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let needed = minimum_message_bytes(&self.buffer[..self.filled]);

            if needed > MAX_MESSAGE_SIZE {
                self.filled = 0;
                return Err(FrameError::MessageTooLarge {
                    declared: needed,
                    limit: MAX_MESSAGE_SIZE,
                });
            }

            if self.filled >= needed {
                let kind =
                    MessageKind::from_id(u16::from_be_bytes([self.buffer[0], self.buffer[1]]));
                let payload = self.buffer[PREFIX_SIZE..needed].to_vec();
                self.filled = 0;
                return Ok(Message::new(kind, payload));
            }

            let count = reader.read(&mut self.buffer[self.filled..needed]).await?;
            if count == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            self.filled += count;
        }
    }
}

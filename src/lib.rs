//! Client-side building blocks for the Mumble text/control protocol.
//!
//! The crate covers the length-prefixed message framing, a minimal protobuf
//! wire codec for the message kinds a text client consumes, and the channel
//! tree/user roster a client reconstructs from incremental state updates.
//! Transport setup (sockets, TLS) and the chat UI stay with the host
//! application: the session runs over any `AsyncRead + AsyncWrite` stream
//! and reports roster effects through the [`EventSink`] trait.
//!
//! ## Example
//!
//! ```no_run
//! use mumblet::{MumbleSession, SessionConfig};
//!
//! # async fn connect(stream: tokio::io::DuplexStream, sink: &mut dyn mumblet::EventSink) -> Result<(), mumblet::ClientError> {
//! let mut session = MumbleSession::new(stream, SessionConfig::new("rust-client"));
//! session.handshake().await?;
//! session.run(sink).await?;
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod error;
pub mod framing;
pub mod proto;
pub mod session;
pub mod varint;
pub mod wire;

pub use channels::{Channel, ChannelTree, User, ROOT_CHANNEL_ID};
pub use error::{ClientError, DecodeError, FrameError};
pub use framing::{
    minimum_message_bytes, Message, MessageFramer, MessageKind, MAX_MESSAGE_SIZE, PREFIX_SIZE,
};
pub use session::{
    ConnectionPhase, EventSink, MumbleSession, ProtocolHandler, SessionConfig, PROTOCOL_VERSION,
};

//! Protocol dispatch and the per-connection session loop.
//!
//! The handler interprets decoded messages against the channel tree and
//! reports roster/conversation effects to an [`EventSink`]; the session
//! wraps it with the handshake, the sequential read loop, keepalive pings
//! and cooperative cancellation. Reads are strictly sequential: message N is
//! fully dispatched before the read for message N+1 is issued, so the tree
//! is always consistent when queried from the flow that drives dispatch.

use std::time::{Duration, SystemTime};

use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channels::{Channel, ChannelTree, User, ROOT_CHANNEL_ID};
use crate::error::{ClientError, DecodeError};
use crate::framing::{Message, MessageFramer, MessageKind};
use crate::proto::{
    Authenticate, ChannelState, Ping, Reject, ServerSync, TextMessage, UserRemove, UserState,
    Version,
};
use crate::wire;

/// Protocol revision tuple (major, minor, patch) advertised to the server.
pub const PROTOCOL_VERSION: (u32, u32, u32) = (1, 2, 19);

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Lifecycle of one control-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Transport handed over, nothing sent yet.
    Connecting,
    /// Version and Authenticate are on the wire.
    HandshakeSent,
    /// ServerSync received; steady-state read loop.
    Synchronized,
    /// Cancellation observed; no further reads will be issued.
    Closing,
    Closed,
}

/// Roster and conversation effects the host application renders.
///
/// The tree hands out names by value; the sink never sees mutable protocol
/// state.
pub trait EventSink {
    /// The set of channels changed shape: one was added, renamed or removed.
    fn channel_list_changed(&mut self);
    /// A user entered the channel whose roster is currently displayed.
    fn user_joined_visible_channel(&mut self, name: &str);
    /// A user left the channel whose roster is currently displayed.
    fn user_left_visible_channel(&mut self, name: &str);
    /// The local user's view moved to another channel.
    fn active_channel_changed(&mut self, channel_name: &str, member_names: &[String]);
    /// Chat text arrived.
    fn message_received(
        &mut self,
        channel_id: u32,
        sender_name: &str,
        body: &str,
        timestamp: SystemTime,
    );
}

/// User-provided parameters for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Login name presented to the server during authentication.
    pub username: String,
    /// Client release string advertised in the Version exchange.
    pub release: String,
    pub os: String,
    pub os_version: String,
}

impl SessionConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            release: format!("mumblet {}", env!("CARGO_PKG_VERSION")),
            os: std::env::consts::OS.to_string(),
            os_version: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Interprets decoded messages against the channel tree.
///
/// Pure state machine: no I/O happens here, which keeps every transition
/// testable with fabricated messages.
#[derive(Debug)]
pub struct ProtocolHandler {
    tree: ChannelTree,
    username: String,
    phase: ConnectionPhase,
    own_session: Option<u32>,
    active_channel: Option<u32>,
    /// Counts views opened for this connection; connection-local so parallel
    /// sessions never share a counter.
    views_opened: u32,
    welcome_text: Option<String>,
}

impl ProtocolHandler {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            tree: ChannelTree::new(),
            username: username.into(),
            phase: ConnectionPhase::Connecting,
            own_session: None,
            active_channel: None,
            views_opened: 0,
            welcome_text: None,
        }
    }

    pub fn tree(&self) -> &ChannelTree {
        &self.tree
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Session id the server identified us with, once known.
    pub fn own_session(&self) -> Option<u32> {
        self.own_session
    }

    /// Channel whose roster the local client currently displays.
    pub fn active_channel(&self) -> Option<u32> {
        self.active_channel
    }

    /// How many channel views this connection has opened so far.
    pub fn views_opened(&self) -> u32 {
        self.views_opened
    }

    pub fn welcome_text(&self) -> Option<&str> {
        self.welcome_text.as_deref()
    }

    pub(crate) fn set_phase(&mut self, phase: ConnectionPhase) {
        self.phase = phase;
    }

    /// Dispatch one framed message.
    ///
    /// Decode failures and rejections are fatal for the connection; tree
    /// anomalies are logged and dropped.
    pub fn handle_message(
        &mut self,
        message: &Message,
        sink: &mut dyn EventSink,
    ) -> Result<(), ClientError> {
        trace!(kind = ?message.kind, len = message.payload.len(), "dispatching message");
        match message.kind {
            MessageKind::Version => {
                let version = decode(message.kind, Version::decode(&message.payload))?;
                debug!(
                    release = version.release.as_deref().unwrap_or(""),
                    os = version.os.as_deref().unwrap_or(""),
                    os_version = version.os_version.as_deref().unwrap_or(""),
                    "server version"
                );
                Ok(())
            }
            MessageKind::Reject => {
                let reject = decode(message.kind, Reject::decode(&message.payload))?;
                let reason = reject.reason.unwrap_or_else(|| "unknown reason".to_string());
                Err(ClientError::Rejected(reason))
            }
            MessageKind::ServerSync => {
                let sync = decode(message.kind, ServerSync::decode(&message.payload))?;
                self.on_server_sync(sync, sink);
                Ok(())
            }
            MessageKind::ChannelState => {
                let state = decode(message.kind, ChannelState::decode(&message.payload))?;
                self.on_channel_state(state, sink);
                Ok(())
            }
            MessageKind::UserState => {
                let state = decode(message.kind, UserState::decode(&message.payload))?;
                self.on_user_state(state, sink);
                Ok(())
            }
            MessageKind::UserRemove => {
                let remove = decode(message.kind, UserRemove::decode(&message.payload))?;
                self.on_user_remove(remove, sink);
                Ok(())
            }
            MessageKind::TextMessage => {
                let text = decode(message.kind, TextMessage::decode(&message.payload))?;
                self.on_text_message(text, sink);
                Ok(())
            }
            MessageKind::Ping => {
                decode(message.kind, Ping::decode(&message.payload))?;
                Ok(())
            }
            // Kinds this client accepts but has no state for. Listed out so
            // a new protocol kind is a compile error here, not a silently
            // ignored default.
            MessageKind::UdpTunnel
            | MessageKind::Authenticate
            | MessageKind::ChannelRemove
            | MessageKind::BanList
            | MessageKind::PermissionDenied
            | MessageKind::Acl
            | MessageKind::QueryUsers
            | MessageKind::CryptSetup
            | MessageKind::ContextActionModify
            | MessageKind::ContextAction
            | MessageKind::UserList
            | MessageKind::VoiceTarget
            | MessageKind::PermissionQuery
            | MessageKind::CodecVersion
            | MessageKind::UserStats
            | MessageKind::RequestBlob
            | MessageKind::ServerConfig
            | MessageKind::SuggestConfig => {
                trace!(
                    kind = ?message.kind,
                    fields = %wire::render_fields(&message.payload),
                    "dropping message"
                );
                Ok(())
            }
            MessageKind::Unknown(id) => {
                debug!(id, "dropping message of unknown type");
                Ok(())
            }
        }
    }

    fn on_server_sync(&mut self, sync: ServerSync, sink: &mut dyn EventSink) {
        self.phase = ConnectionPhase::Synchronized;
        if let Some(session) = sync.session {
            self.own_session = Some(session);
        }
        self.welcome_text = sync.welcome_text;
        info!(session = ?self.own_session, "server synchronized");

        // The root conversation opens as soon as the server has synced us.
        if self.active_channel.is_none() {
            self.switch_active_channel(ROOT_CHANNEL_ID, sink);
        }
    }

    fn on_channel_state(&mut self, state: ChannelState, sink: &mut dyn EventSink) {
        let Some(channel_id) = state.channel_id else {
            warn!("channel state without a channel id");
            return;
        };

        let mut changed = false;
        if self.tree.get_channel(channel_id).is_some() {
            changed |= self.tree.update_channel(
                channel_id,
                state.name.as_deref(),
                state.description.as_deref(),
            );
            for &link in &state.links_remove {
                if self.tree.get_channel(link).is_some() {
                    self.tree.remove_subtree(link);
                    changed = true;
                } else {
                    warn!(channel = link, "link removal names an unknown channel");
                }
            }
        } else {
            let parent_id = state.parent.unwrap_or(ROOT_CHANNEL_ID);
            let channel = Channel::new(
                channel_id,
                state.name.unwrap_or_default(),
                state.description.unwrap_or_default(),
            );
            if self.tree.add_channel(channel, parent_id) {
                changed = true;
            } else {
                warn!(
                    channel = channel_id,
                    parent = parent_id,
                    "dropping channel whose parent is unknown"
                );
            }
        }

        if changed {
            sink.channel_list_changed();
        }
    }

    fn on_user_state(&mut self, state: UserState, sink: &mut dyn EventSink) {
        let Some(session) = state.session else {
            warn!("user state without a session id");
            return;
        };

        if self.tree.get_user(session).is_some() {
            if let Some(name) = state.name.as_deref() {
                self.tree.set_user_name(session, name);
            }
            if let Some(new_channel) = state.channel_id {
                let old_channel = self.tree.get_user_channel_id(session);
                if old_channel != Some(new_channel) {
                    self.tree.set_user_channel_id(session, new_channel);
                    self.on_user_moved(session, old_channel, new_channel, sink);
                }
            }
        } else {
            let name = state.name.clone().unwrap_or_default();
            self.tree
                .add_user(User::new(session, name.clone(), state.channel_id));

            if state.name.as_deref() == Some(self.username.as_str()) {
                // First sight of our own login name pins down our session id.
                self.own_session = Some(session);
                if let Some(channel_id) = state.channel_id {
                    if self.active_channel != Some(channel_id) {
                        self.switch_active_channel(channel_id, sink);
                    }
                }
            } else if state.channel_id.is_some() && state.channel_id == self.active_channel {
                sink.user_joined_visible_channel(&name);
            }
        }
    }

    fn on_user_moved(
        &mut self,
        session: u32,
        old_channel: Option<u32>,
        new_channel: u32,
        sink: &mut dyn EventSink,
    ) {
        if Some(session) == self.own_session {
            // The local client only displays one channel's roster; our own
            // move switches the view instead of editing it.
            self.switch_active_channel(new_channel, sink);
            return;
        }

        let Some(name) = self.tree.get_user(session).map(|user| user.name.clone()) else {
            return;
        };
        if old_channel.is_some() && old_channel == self.active_channel {
            sink.user_left_visible_channel(&name);
        }
        if Some(new_channel) == self.active_channel {
            sink.user_joined_visible_channel(&name);
        }
    }

    fn on_user_remove(&mut self, remove: UserRemove, sink: &mut dyn EventSink) {
        match self.tree.remove_user(remove.session) {
            Some(user) => {
                if user.channel_id.is_some() && user.channel_id == self.active_channel {
                    sink.user_left_visible_channel(&user.name);
                }
            }
            None => warn!(session = remove.session, "remove for an unknown user"),
        }
    }

    fn on_text_message(&mut self, text: TextMessage, sink: &mut dyn EventSink) {
        let Some(actor) = text.actor else {
            warn!("text message without an actor");
            return;
        };
        let Some(sender) = self.tree.get_user(actor) else {
            warn!(actor, "text message from an unknown session");
            return;
        };
        let channel_id = text
            .channel_id
            .first()
            .copied()
            .or(self.active_channel)
            .unwrap_or(ROOT_CHANNEL_ID);
        sink.message_received(channel_id, &sender.name, &text.message, SystemTime::now());
    }

    fn switch_active_channel(&mut self, channel_id: u32, sink: &mut dyn EventSink) {
        self.active_channel = Some(channel_id);
        let Some(channel) = self.tree.get_channel(channel_id) else {
            // We can land in a channel we have not learned about yet; keep
            // the pointer and let a later ChannelState fill in the view.
            warn!(channel = channel_id, "active channel is not in the tree");
            return;
        };
        let name = channel.name.clone();
        let members = self.tree.channel_user_names(channel_id);
        self.views_opened += 1;
        debug!(view = self.views_opened, channel = %name, "switching active channel");
        sink.active_channel_changed(&name, &members);
    }
}

fn decode<T>(kind: MessageKind, result: Result<T, DecodeError>) -> Result<T, ClientError> {
    result.map_err(|source| ClientError::Decode { kind, source })
}

/// One client connection over an abstract byte stream.
///
/// The transport is whatever the host hands in: the crate never opens
/// sockets or negotiates TLS. Each session owns an independent framer and
/// tree; nothing is shared between connections.
pub struct MumbleSession<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    framer: MessageFramer,
    handler: ProtocolHandler,
    config: SessionConfig,
    cancel: CancellationToken,
}

enum Step {
    Cancelled,
    Keepalive,
    Inbound(Result<Message, crate::error::FrameError>),
}

impl<S> MumbleSession<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S, config: SessionConfig) -> Self {
        let (reader, writer) = split(stream);
        Self {
            reader,
            writer,
            framer: MessageFramer::new(),
            handler: ProtocolHandler::new(config.username.clone()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels this session's read loop when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn handler(&self) -> &ProtocolHandler {
        &self.handler
    }

    pub fn channels(&self) -> &ChannelTree {
        self.handler.tree()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.handler.phase()
    }

    /// Send the Version/Authenticate opening sequence plus the first
    /// keepalive ping.
    pub async fn handshake(&mut self) -> Result<(), ClientError> {
        if self.config.username.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "username may not be empty".into(),
            ));
        }

        let version = Version {
            version: Some(
                (PROTOCOL_VERSION.0 << 16) | (PROTOCOL_VERSION.1 << 8) | PROTOCOL_VERSION.2,
            ),
            release: Some(self.config.release.clone()),
            os: Some(self.config.os.clone()),
            os_version: Some(self.config.os_version.clone()),
        };
        self.write_message(MessageKind::Version, version.encode())
            .await?;

        let authenticate = Authenticate {
            username: Some(self.config.username.clone()),
        };
        self.write_message(MessageKind::Authenticate, authenticate.encode())
            .await?;

        self.write_message(MessageKind::Ping, Ping.encode()).await?;

        self.handler.set_phase(ConnectionPhase::HandshakeSent);
        info!(username = %self.config.username, "handshake sent");
        Ok(())
    }

    /// Drive the steady-state read loop until cancellation or a fatal
    /// failure.
    ///
    /// One read is outstanding at a time; dispatch of each message finishes
    /// before the next read is issued. Keepalive pings interleave on the
    /// write half without overlapping the reads.
    pub async fn run(&mut self, sink: &mut dyn EventSink) -> Result<(), ClientError> {
        let cancel = self.cancel.clone();
        let mut keepalive = interval(KEEPALIVE_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately; the handshake
        // already carried a ping.
        keepalive.tick().await;

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => Step::Cancelled,
                _ = keepalive.tick() => Step::Keepalive,
                result = self.framer.read_message(&mut self.reader) => Step::Inbound(result),
            };

            match step {
                Step::Cancelled => {
                    self.handler.set_phase(ConnectionPhase::Closing);
                    info!("session cancelled");
                    self.handler.set_phase(ConnectionPhase::Closed);
                    return Ok(());
                }
                Step::Keepalive => {
                    self.write_message(MessageKind::Ping, Ping.encode()).await?;
                }
                Step::Inbound(result) => {
                    let message = match result {
                        Ok(message) => message,
                        Err(err) => {
                            self.handler.set_phase(ConnectionPhase::Closed);
                            return Err(err.into());
                        }
                    };
                    if let Err(err) = self.handler.handle_message(&message, sink) {
                        self.handler.set_phase(ConnectionPhase::Closed);
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Send chat text to a channel.
    pub async fn send_text_message(
        &mut self,
        channel_id: u32,
        body: &str,
    ) -> Result<(), ClientError> {
        let text = TextMessage {
            actor: None,
            channel_id: vec![channel_id],
            message: body.to_string(),
        };
        self.write_message(MessageKind::TextMessage, text.encode())
            .await
    }

    /// Ask the server to move this client into another channel.
    ///
    /// The active view only switches once the server echoes the move back as
    /// a UserState for our own session.
    pub async fn join_channel(&mut self, channel_id: u32) -> Result<(), ClientError> {
        let state = UserState {
            session: self.handler.own_session(),
            name: None,
            channel_id: Some(channel_id),
        };
        self.write_message(MessageKind::UserState, state.encode())
            .await
    }

    async fn write_message(
        &mut self,
        kind: MessageKind,
        payload: Vec<u8>,
    ) -> Result<(), ClientError> {
        Message::new(kind, payload)
            .write_to(&mut self.writer)
            .await
            .map_err(ClientError::Network)
    }
}

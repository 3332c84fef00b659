//! The chat engine a UI shell embeds.
//!
//! `spawn_chat` registers an identity, starts the transport endpoint, and
//! spawns the bridge loop that turns endpoint notifications into view-model
//! mutations and UI events. The returned [`ChatHandle`] is the whole
//! command surface: send text, send files, dial peers, clear the
//! transcript, snapshot state, subscribe to events, shut down.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use quadchat_net::{spawn_endpoint, EndpointCommand, EndpointConfig, EndpointNotification};
use quadchat_shared::protocol::{Frame, MessageFrame, ResourceFrame};
use quadchat_shared::types::{ConnectionStatus, LinkDirection, PeerIdentity};

use crate::error::ChatError;
use crate::events::{emit, ChatEvent, ErrorKind, ErrorNotice};
use crate::files;
use crate::state::ChatState;
use crate::transcript::{ChatMessage, SharedResource};

/// Capacity of the UI event channel. A shell that lags this far behind
/// loses events and should resync from a snapshot.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Engine configuration supplied by the embedding shell.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Rendezvous broker to register with.
    pub broker_addr: SocketAddr,
    /// Name shown to peers on outbound messages.
    pub display_name: String,
    /// Prefix for the generated identity, e.g. `campus` -> `campus-417382`.
    pub identity_prefix: String,
    /// Local listen address; port 0 picks an ephemeral port.
    pub listen_addr: SocketAddr,
}

impl ChatConfig {
    pub fn new(broker_addr: SocketAddr, display_name: impl Into<String>) -> Self {
        Self {
            broker_addr,
            display_name: display_name.into(),
            identity_prefix: "campus".to_string(),
            listen_addr: ([127, 0, 0, 1], 0).into(),
        }
    }
}

/// Serializable view of the whole session for shell consumption.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSnapshot {
    pub identity: PeerIdentity,
    pub connection_status: ConnectionStatus,
    pub messages: Vec<ChatMessage>,
    pub resources: Vec<SharedResource>,
    pub last_error: Option<ErrorNotice>,
}

/// Handle to a running chat session.
#[derive(Clone)]
pub struct ChatHandle {
    identity: PeerIdentity,
    cmd_tx: mpsc::Sender<EndpointCommand>,
    state: Arc<Mutex<ChatState>>,
    events: broadcast::Sender<ChatEvent>,
}

/// Register with the broker and start the session.
///
/// Identity acquisition is fatal on failure, since without a broker lease
/// no peer can find us; everything after this point surfaces as events.
pub async fn spawn_chat(config: ChatConfig) -> Result<ChatHandle, ChatError> {
    let identity = PeerIdentity::generate(&config.identity_prefix);

    let (cmd_tx, notif_rx) = spawn_endpoint(EndpointConfig {
        broker_addr: config.broker_addr,
        identity: identity.clone(),
        listen_addr: config.listen_addr,
    })
    .await?;

    info!(identity = %identity, name = %config.display_name, "Chat session started");

    let state = Arc::new(Mutex::new(ChatState::new(
        identity.clone(),
        config.display_name,
    )));
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(bridge_loop(
        state.clone(),
        events.clone(),
        cmd_tx.clone(),
        notif_rx,
    ));

    Ok(ChatHandle {
        identity,
        cmd_tx,
        state,
        events,
    })
}

impl ChatHandle {
    /// The identity peers dial to reach this endpoint.
    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// Subscribe to session events. Each subscriber gets every event from
    /// the moment of subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Dial a remote identity. Resolution and connection happen in the
    /// background; the outcome arrives as a `PeerConnected` event or a
    /// dial-failed error event.
    pub async fn connect_to(&self, remote: &str) -> Result<PeerIdentity, ChatError> {
        let remote = PeerIdentity::parse(remote)?;

        let status = {
            let mut guard = self.state.lock().await;
            guard.dialing = true;
            guard.status()
        };
        emit(&self.events, ChatEvent::StatusChanged { status });

        self.command(EndpointCommand::Dial(remote.clone())).await?;
        Ok(remote)
    }

    /// Encrypt and broadcast a text message to every open link.
    ///
    /// With zero open links this fails before the cipher is touched and
    /// the transcript is unchanged.
    pub async fn send_text(&self, content: &str) -> Result<Uuid, ChatError> {
        if self.open_links().await?.is_empty() {
            return Err(ChatError::NoPeersConnected);
        }

        let (message, frame) = {
            let mut guard = self.state.lock().await;
            let sealed = guard.session.seal_text(content);
            let (message, frame) = match sealed {
                Ok(pair) => pair,
                Err(e) => {
                    let notice = ErrorNotice::new(ErrorKind::SendFailed, e.to_string());
                    guard.last_error = Some(notice.clone());
                    emit(&self.events, ChatEvent::Error { notice });
                    return Err(e);
                }
            };
            guard.transcript.push(message.clone());
            (message, frame)
        };

        let id = message.id;
        self.command(EndpointCommand::Broadcast(Frame::Message(frame)))
            .await?;
        emit(&self.events, ChatEvent::MessageAppended { message });
        Ok(id)
    }

    /// Read a file, broadcast it as a resource plus a companion transcript
    /// message, and record both locally.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<Uuid, ChatError> {
        if self.open_links().await?.is_empty() {
            return Err(ChatError::NoPeersConnected);
        }

        let intake = files::read_for_transfer(path).await?;

        let (resource, message, resource_frame, message_frame) = {
            let mut guard = self.state.lock().await;
            let resource = SharedResource {
                id: Uuid::new_v4(),
                name: intake.name,
                mime: intake.mime,
                size: intake.size,
                payload: intake.payload,
                sender_name: guard.session.display_name().to_string(),
            };

            let sealed = guard.session.seal_resource_notice(&resource);
            let (message, message_frame) = match sealed {
                Ok(pair) => pair,
                Err(e) => {
                    let notice = ErrorNotice::new(ErrorKind::SendFailed, e.to_string());
                    guard.last_error = Some(notice.clone());
                    emit(&self.events, ChatEvent::Error { notice });
                    return Err(e);
                }
            };

            let resource_frame = ResourceFrame {
                id: resource.id,
                name: resource.name.clone(),
                mime: resource.mime.clone(),
                size: resource.size,
                payload: resource.payload.clone(),
                sender_name: resource.sender_name.clone(),
            };
            (resource, message, resource_frame, message_frame)
        };

        // Resource first, then the companion message, so the receiver can
        // render the transcript entry against a materialized catalog item.
        self.command(EndpointCommand::Broadcast(Frame::Resource(resource_frame)))
            .await?;
        self.command(EndpointCommand::Broadcast(Frame::Message(message_frame)))
            .await?;

        let resource_id = resource.id;
        let descriptor = resource.descriptor();
        let sender_name = resource.sender_name.clone();
        {
            let mut guard = self.state.lock().await;
            guard.resources.insert(resource);
            guard.transcript.push(message.clone());
        }

        emit(
            &self.events,
            ChatEvent::ResourceAdded {
                resource: descriptor,
                sender_name,
            },
        );
        emit(&self.events, ChatEvent::MessageAppended { message });
        Ok(resource_id)
    }

    /// Empty the transcript. The resource catalog is left intact.
    pub async fn clear_transcript(&self) {
        self.state.lock().await.transcript.clear();
        emit(&self.events, ChatEvent::TranscriptCleared);
    }

    /// Close the link to one remote, leaving the others open.
    pub async fn disconnect_from(&self, remote: &PeerIdentity) -> Result<(), ChatError> {
        self.command(EndpointCommand::CloseLink(remote.clone()))
            .await
    }

    /// Current state of the whole session.
    pub async fn snapshot(&self) -> ChatSnapshot {
        let guard = self.state.lock().await;
        ChatSnapshot {
            identity: guard.identity.clone(),
            connection_status: guard.status(),
            messages: guard.transcript.messages().to_vec(),
            resources: guard.resources.iter().cloned().collect(),
            last_error: guard.last_error.clone(),
        }
    }

    /// The raw bytes backing a shared resource, for download handles.
    pub async fn resource_payload(&self, id: &Uuid) -> Option<Bytes> {
        self.state
            .lock()
            .await
            .resources
            .get(id)
            .map(|r| r.payload.clone())
    }

    /// Tear down the session: close every link and release the identity.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(EndpointCommand::Shutdown).await;
    }

    async fn open_links(&self) -> Result<Vec<PeerIdentity>, ChatError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(EndpointCommand::OpenLinks(reply_tx)).await?;
        reply_rx.await.map_err(|_| ChatError::EngineClosed)
    }

    async fn command(&self, command: EndpointCommand) -> Result<(), ChatError> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| ChatError::EngineClosed)
    }
}

/// Consume endpoint notifications: mutate the view model, answer
/// handshakes, and fan events out to the shell. Ends when the endpoint
/// loop closes its notification channel.
async fn bridge_loop(
    state: Arc<Mutex<ChatState>>,
    events: broadcast::Sender<ChatEvent>,
    cmd_tx: mpsc::Sender<EndpointCommand>,
    mut notif_rx: mpsc::Receiver<EndpointNotification>,
) {
    debug!("Chat bridge started");

    while let Some(notification) = notif_rx.recv().await {
        match notification {
            EndpointNotification::LinkOpened { remote, direction } => {
                let (status, offer) = {
                    let mut guard = state.lock().await;
                    guard.peers.insert(remote.clone());
                    guard.dialing = false;
                    // Only the dialing side proposes its key; the receiving
                    // side adopts whatever arrives.
                    let offer = (direction == LinkDirection::Outbound)
                        .then(|| guard.session.key_offer());
                    (guard.status(), offer)
                };

                info!(remote = %remote, ?direction, "Peer connected");
                if let Some(frame) = offer {
                    let _ = cmd_tx
                        .send(EndpointCommand::SendTo {
                            remote: remote.clone(),
                            frame,
                        })
                        .await;
                }
                emit(&events, ChatEvent::PeerConnected { remote });
                emit(&events, ChatEvent::StatusChanged { status });
            }

            EndpointNotification::LinkClosed { remote } => {
                let status = {
                    let mut guard = state.lock().await;
                    guard.peers.remove(&remote);
                    guard.status()
                };
                info!(remote = %remote, "Peer disconnected");
                emit(&events, ChatEvent::PeerDisconnected { remote });
                emit(&events, ChatEvent::StatusChanged { status });
            }

            EndpointNotification::FrameReceived { remote, frame } => {
                handle_frame(&state, &events, remote, frame).await;
            }

            EndpointNotification::DialFailed { remote, reason } => {
                let (status, notice) = {
                    let mut guard = state.lock().await;
                    guard.dialing = false;
                    let notice = ErrorNotice::new(
                        ErrorKind::DialFailed,
                        format!("could not reach {remote}: {reason}"),
                    );
                    guard.last_error = Some(notice.clone());
                    (guard.status(), notice)
                };
                warn!(remote = %remote, reason = %reason, "Dial failed");
                emit(&events, ChatEvent::Error { notice });
                emit(&events, ChatEvent::StatusChanged { status });
            }

            EndpointNotification::BrokerLost => {
                warn!("Broker connection lost; endpoint can no longer be dialed");
                emit(&events, ChatEvent::BrokerLost);
            }
        }
    }

    debug!("Chat bridge ended");
}

async fn handle_frame(
    state: &Arc<Mutex<ChatState>>,
    events: &broadcast::Sender<ChatEvent>,
    remote: PeerIdentity,
    frame: Frame,
) {
    match frame {
        Frame::KeyExchange(kx) => {
            state.lock().await.session.accept_key(kx.key);
            info!(from = %remote, "Session key replaced by peer handshake");
            emit(events, ChatEvent::SessionKeyAccepted { from: remote });
        }

        Frame::Message(message_frame) => {
            handle_message_frame(state, events, remote, message_frame).await;
        }

        Frame::Resource(resource_frame) => {
            handle_resource_frame(state, events, remote, resource_frame).await;
        }

        Frame::Hello(hello) => {
            // The transport consumes the preamble; one arriving here means
            // the peer re-sent it mid-stream.
            debug!(remote = %remote, claimed = %hello.identity, "Ignoring stray Hello");
        }
    }
}

async fn handle_message_frame(
    state: &Arc<Mutex<ChatState>>,
    events: &broadcast::Sender<ChatEvent>,
    remote: PeerIdentity,
    frame: MessageFrame,
) {
    let frame_id = frame.id;
    let mut guard = state.lock().await;
    match guard.session.open_message(frame) {
        Ok(message) => {
            guard.transcript.push(message.clone());
            drop(guard);
            debug!(remote = %remote, id = %message.id, "Message received");
            emit(events, ChatEvent::MessageAppended { message });
        }
        Err(_) => {
            // Wrong or stale session key. Nothing is appended; the shell
            // shows an error instead of garbage.
            let notice = ErrorNotice::new(
                ErrorKind::UnreadablePayload,
                format!("message from {remote} did not decrypt with the current session key"),
            )
            .with_message_id(frame_id);
            guard.last_error = Some(notice.clone());
            drop(guard);
            warn!(remote = %remote, id = %frame_id, "Undecryptable message dropped");
            emit(events, ChatEvent::Error { notice });
        }
    }
}

async fn handle_resource_frame(
    state: &Arc<Mutex<ChatState>>,
    events: &broadcast::Sender<ChatEvent>,
    remote: PeerIdentity,
    frame: ResourceFrame,
) {
    if frame.payload.len() as u64 != frame.size {
        let notice = ErrorNotice::new(
            ErrorKind::ReceiveFailed,
            format!(
                "resource {} from {remote} declared {} bytes but carried {}",
                frame.name,
                frame.size,
                frame.payload.len()
            ),
        )
        .with_message_id(frame.id);
        let mut guard = state.lock().await;
        guard.last_error = Some(notice.clone());
        drop(guard);
        warn!(remote = %remote, name = %frame.name, "Resource size mismatch, dropped");
        emit(events, ChatEvent::Error { notice });
        return;
    }

    let (descriptor, sender_name) = {
        let mut guard = state.lock().await;
        let resource = guard.session.accept_resource(frame);
        let descriptor = resource.descriptor();
        let sender_name = resource.sender_name.clone();
        guard.resources.insert(resource);
        (descriptor, sender_name)
    };

    info!(remote = %remote, name = %descriptor.name, size = descriptor.size, "Resource received");
    emit(
        events,
        ChatEvent::ResourceAdded {
            resource: descriptor,
            sender_name,
        },
    );
}

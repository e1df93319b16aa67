//! Native driver using tokio-tungstenite.
//!
//! One spawned task owns the socket, the reconnect policy, and the single
//! backoff sleep. The task runs dial → authenticate → session loop, and on
//! involuntary loss waits out the backoff delay before dialing again. It
//! exits on teardown, on a rejected credential, or once the retry budget is
//! exhausted.

use std::collections::HashSet;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use deskwire_shared::{ClientCommand, RealtimeError, ServerEvent, WsEnvelope};

use super::{ConnectionState, EventSink, LinkCmd, RealtimeHandle, SharedState, TokenSource};
use crate::config::RealtimeConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A managed connection to the deskwire realtime endpoint (native).
pub(crate) struct WsConnection {
    state: SharedState,
    sender: UnboundedSender<LinkCmd>,
}

impl WsConnection {
    /// Spawn the driver task. Must be called from within a tokio runtime.
    pub fn new(
        config: RealtimeConfig,
        token_source: TokenSource,
        state: SharedState,
        on_event: EventSink,
    ) -> Self {
        let (sender, receiver) = unbounded();
        tokio::spawn(drive(
            config,
            token_source,
            state.clone(),
            on_event,
            receiver,
        ));
        Self { state, sender }
    }

    /// Snapshot of this connection's state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Handle for pushing commands into the driver task.
    pub fn handle(&self) -> RealtimeHandle {
        RealtimeHandle::new(self.sender.clone())
    }

    /// Ask the driver to close the socket and exit.
    pub fn shutdown(&self) {
        self.handle().shutdown();
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// Caller-initiated; no reconnection.
    Shutdown,
    /// Involuntary loss; reconnection applies.
    Dropped(String),
}

async fn drive(
    config: RealtimeConfig,
    token_source: TokenSource,
    state: SharedState,
    on_event: EventSink,
    mut cmd_rx: UnboundedReceiver<LinkCmd>,
) {
    let mut policy = config.reconnect.clone();
    // Rooms joined while connected, replayed after every re-auth.
    let mut rooms: HashSet<String> = HashSet::new();

    loop {
        // The credential is re-read from storage on every attempt, so a
        // token refreshed by the host application is picked up here.
        let Some(token) = token_source() else {
            crate::log_info!("no stored credential, realtime stays offline");
            state.set(ConnectionState::Disconnected);
            return;
        };

        state.set(ConnectionState::Connecting);

        match establish(&config, &token, &state).await {
            Ok(mut socket) => {
                policy.reset();
                state.set(ConnectionState::Connected);
                crate::log_info!("realtime connected to {}", config.url);

                rejoin_rooms(&mut socket, &rooms).await;

                match run_session(&mut socket, &mut cmd_rx, &mut rooms, &on_event).await {
                    SessionEnd::Shutdown => {
                        let _ = socket.close(None).await;
                        state.set(ConnectionState::Disconnected);
                        return;
                    }
                    SessionEnd::Dropped(reason) => {
                        crate::log_warn!("realtime connection lost: {}", reason);
                        state.set(ConnectionState::Disconnected);
                    }
                }
            }
            Err(err @ RealtimeError::Auth { .. }) => {
                // Rejected credential: terminal, no automatic retry.
                crate::log_error!("{}", err);
                state.set(ConnectionState::Failed {
                    reason: err.to_string(),
                });
                return;
            }
            Err(err) => {
                crate::log_error!("realtime connection failed: {}", err);
                state.set(ConnectionState::Failed {
                    reason: err.to_string(),
                });
            }
        }

        let Some(delay) = policy.next_delay() else {
            let err = RealtimeError::RetriesExhausted {
                attempts: policy.max_attempts,
            };
            crate::log_error!("{}", err);
            state.set(ConnectionState::Failed {
                reason: err.to_string(),
            });
            return;
        };
        crate::log_info!("reconnecting in {}ms (attempt {})", delay, policy.attempt());
        if wait_or_shutdown(&mut cmd_rx, Duration::from_millis(delay)).await {
            state.set(ConnectionState::Disconnected);
            return;
        }
    }
}

/// Dial the endpoint and run the auth handshake. The configured timeout
/// covers both.
async fn establish(
    config: &RealtimeConfig,
    token: &str,
    state: &SharedState,
) -> Result<Socket, RealtimeError> {
    let url = config.endpoint()?;
    match timeout(config.connect_timeout, dial_and_auth(url.as_str(), token, state)).await {
        Ok(result) => result,
        Err(_) => Err(RealtimeError::Transport(format!(
            "connect timeout after {:?}",
            config.connect_timeout
        ))),
    }
}

async fn dial_and_auth(
    url: &str,
    token: &str,
    state: &SharedState,
) -> Result<Socket, RealtimeError> {
    use tokio_tungstenite::tungstenite::Error as WsError;

    let (mut socket, _response) = match connect_async(url).await {
        Ok(pair) => pair,
        // The server may refuse the upgrade outright on a bad credential.
        Err(WsError::Http(response))
            if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
        {
            return Err(RealtimeError::Auth {
                code: response.status().as_u16().to_string(),
                message: "credential rejected during handshake".to_string(),
            });
        }
        Err(e) => {
            return Err(RealtimeError::Transport(format!("connect failed: {}", e)));
        }
    };

    state.set(ConnectionState::Authenticating);
    send_frame(
        &mut socket,
        ClientCommand::Authenticate {
            token: token.to_string(),
        },
    )
    .await?;

    // The first meaningful frame decides the session.
    while let Some(message) = socket.next().await {
        let message =
            message.map_err(|e| RealtimeError::Transport(format!("read failed: {}", e)))?;
        let Message::Text(text) = message else {
            continue;
        };
        let frame: WsEnvelope<ServerEvent> = serde_json::from_str(text.as_str())
            .map_err(|e| RealtimeError::Frame(e.to_string()))?;
        let name = frame.payload.name();
        return match frame.payload {
            ServerEvent::AuthOk { user_id } => {
                crate::log_debug!("authenticated as {:?}", user_id);
                Ok(socket)
            }
            ServerEvent::AuthError { code, message } => {
                Err(RealtimeError::Auth { code, message })
            }
            _ => Err(RealtimeError::Frame(format!(
                "unexpected pre-auth frame: {}",
                name
            ))),
        };
    }
    Err(RealtimeError::Transport(
        "connection closed during handshake".to_string(),
    ))
}

/// Multiplex socket reads and caller commands until the session ends.
async fn run_session(
    socket: &mut Socket,
    cmd_rx: &mut UnboundedReceiver<LinkCmd>,
    rooms: &mut HashSet<String>,
    on_event: &EventSink,
) -> SessionEnd {
    loop {
        tokio::select! {
            cmd = cmd_rx.next() => match cmd {
                Some(LinkCmd::Frame(frame)) => {
                    track_rooms(rooms, &frame.payload);
                    crate::log_debug!("sending {}", frame.payload.name());
                    if let Err(err) = send_frame_raw(socket, &frame).await {
                        return SessionEnd::Dropped(err.to_string());
                    }
                }
                // A closed command channel means every handle is gone.
                Some(LinkCmd::Shutdown) | None => return SessionEnd::Shutdown,
            },
            message = socket.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<WsEnvelope<ServerEvent>>(text.as_str()) {
                        Ok(frame) => on_event(frame),
                        Err(e) => crate::log_error!("ignoring malformed frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    return SessionEnd::Dropped("server closed the connection".to_string());
                }
                // Ping/pong are answered by tungstenite; binary is ignored.
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(format!("read failed: {}", e)),
                None => return SessionEnd::Dropped("stream ended".to_string()),
            },
        }
    }
}

/// Keep the joined-rooms set current so rooms can be replayed after a
/// reconnect. Joins sent while offline never reach this point.
fn track_rooms(rooms: &mut HashSet<String>, cmd: &ClientCommand) {
    match cmd {
        ClientCommand::JoinRoom { room } => {
            rooms.insert(room.clone());
        }
        ClientCommand::LeaveRoom { room } => {
            rooms.remove(room);
        }
        _ => {}
    }
}

async fn rejoin_rooms(socket: &mut Socket, rooms: &HashSet<String>) {
    if rooms.is_empty() {
        return;
    }
    crate::log_info!("re-joining {} room(s)", rooms.len());
    for room in rooms {
        if let Err(err) = send_frame(socket, ClientCommand::JoinRoom { room: room.clone() }).await {
            crate::log_warn!("failed to re-join {}: {}", room, err);
        }
    }
}

/// Sleep out the backoff delay. Returns `true` if a shutdown arrived before
/// it elapsed.
async fn wait_or_shutdown(cmd_rx: &mut UnboundedReceiver<LinkCmd>, delay: Duration) -> bool {
    let backoff = sleep(delay);
    tokio::pin!(backoff);
    loop {
        tokio::select! {
            cmd = cmd_rx.next() => match cmd {
                Some(LinkCmd::Shutdown) | None => return true,
                Some(LinkCmd::Frame(frame)) => {
                    // Not connected: subscribes and publishes are dropped,
                    // never queued.
                    crate::log_debug!("dropping {} while offline", frame.payload.name());
                }
            },
            _ = &mut backoff => return false,
        }
    }
}

async fn send_frame(socket: &mut Socket, cmd: ClientCommand) -> Result<(), RealtimeError> {
    send_frame_raw(socket, &WsEnvelope::new(cmd)).await
}

async fn send_frame_raw(
    socket: &mut Socket,
    frame: &WsEnvelope<ClientCommand>,
) -> Result<(), RealtimeError> {
    let json = serde_json::to_string(frame).map_err(|e| RealtimeError::Frame(e.to_string()))?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| RealtimeError::Transport(format!("send failed: {}", e)))
}

//! Web driver using `web_sys::WebSocket`.
//!
//! Browser socket callbacks are bridged onto a signal channel so the driver
//! future can run the same dial → authenticate → session → backoff cycle as
//! the native driver, single-threaded on the browser event loop.

use std::collections::HashSet;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::future::{select, Either};
use futures_util::{pin_mut, StreamExt};
use gloo_timers::future::TimeoutFuture;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

use deskwire_shared::{ClientCommand, RealtimeError, ServerEvent, WsEnvelope};

use super::{ConnectionState, EventSink, LinkCmd, RealtimeHandle, SharedState, TokenSource};
use crate::config::RealtimeConfig;

/// A managed connection to the deskwire realtime endpoint (web).
pub(crate) struct WsConnection {
    state: SharedState,
    sender: UnboundedSender<LinkCmd>,
}

impl WsConnection {
    pub fn new(
        config: RealtimeConfig,
        token_source: TokenSource,
        state: SharedState,
        on_event: EventSink,
    ) -> Self {
        let (sender, receiver) = unbounded();
        spawn_local(drive(
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

    /// Handle for pushing commands into the driver future.
    pub fn handle(&self) -> RealtimeHandle {
        RealtimeHandle::new(self.sender.clone())
    }

    /// Ask the driver to close the socket and exit.
    pub fn shutdown(&self) {
        self.handle().shutdown();
    }
}

/// Socket callbacks, bridged into the driver future.
enum SocketSignal {
    Open,
    Message(String),
    Closed(String),
    Errored(String),
}

/// How a connected session ended.
enum SessionEnd {
    Shutdown,
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
        // The credential is re-read from storage on every attempt.
        let Some(token) = token_source() else {
            crate::log_info!("no stored credential, realtime stays offline");
            state.set(ConnectionState::Disconnected);
            return;
        };

        state.set(ConnectionState::Connecting);

        match establish(&config, &token, &state).await {
            Ok((socket, mut sig_rx)) => {
                policy.reset();
                state.set(ConnectionState::Connected);
                crate::log_info!("realtime connected to {}", config.url);

                rejoin_rooms(&socket, &rooms);

                match run_session(&socket, &mut sig_rx, &mut cmd_rx, &mut rooms, &on_event).await {
                    SessionEnd::Shutdown => {
                        let _ = socket.close();
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
        if wait_or_shutdown(&mut cmd_rx, delay as u32).await {
            state.set(ConnectionState::Disconnected);
            return;
        }
    }
}

/// Open the socket, wait for it to connect, and run the auth handshake.
async fn establish(
    config: &RealtimeConfig,
    token: &str,
    state: &SharedState,
) -> Result<(WebSocket, UnboundedReceiver<SocketSignal>), RealtimeError> {
    let url = config.endpoint()?;
    let timeout_ms = config.connect_timeout.as_millis() as u32;

    let socket = WebSocket::new(url.as_str())
        .map_err(|e| RealtimeError::Transport(format!("failed to create socket: {:?}", e)))?;
    let mut sig_rx = attach_callbacks(&socket);

    match next_signal(&mut sig_rx, timeout_ms).await? {
        SocketSignal::Open => {}
        SocketSignal::Closed(reason) | SocketSignal::Errored(reason) => {
            return Err(RealtimeError::Transport(format!("connect failed: {}", reason)));
        }
        SocketSignal::Message(_) => {
            return Err(RealtimeError::Transport(
                "message before socket open".to_string(),
            ));
        }
    }

    state.set(ConnectionState::Authenticating);
    send_frame(
        &socket,
        &WsEnvelope::new(ClientCommand::Authenticate {
            token: token.to_string(),
        }),
    )?;

    // The first meaningful frame decides the session.
    loop {
        match next_signal(&mut sig_rx, timeout_ms).await? {
            SocketSignal::Message(text) => {
                let frame: WsEnvelope<ServerEvent> = serde_json::from_str(&text)
                    .map_err(|e| RealtimeError::Frame(e.to_string()))?;
                let name = frame.payload.name();
                return match frame.payload {
                    ServerEvent::AuthOk { user_id } => {
                        crate::log_debug!("authenticated as {:?}", user_id);
                        Ok((socket, sig_rx))
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
            SocketSignal::Closed(reason) | SocketSignal::Errored(reason) => {
                return Err(RealtimeError::Transport(format!(
                    "closed during handshake: {}",
                    reason
                )));
            }
            SocketSignal::Open => {}
        }
    }
}

/// Multiplex socket signals and caller commands until the session ends.
async fn run_session(
    socket: &WebSocket,
    sig_rx: &mut UnboundedReceiver<SocketSignal>,
    cmd_rx: &mut UnboundedReceiver<LinkCmd>,
    rooms: &mut HashSet<String>,
    on_event: &EventSink,
) -> SessionEnd {
    loop {
        match select(cmd_rx.next(), sig_rx.next()).await {
            Either::Left((cmd, _)) => match cmd {
                Some(LinkCmd::Frame(frame)) => {
                    track_rooms(rooms, &frame.payload);
                    crate::log_debug!("sending {}", frame.payload.name());
                    if let Err(err) = send_frame(socket, &frame) {
                        return SessionEnd::Dropped(err.to_string());
                    }
                }
                // A closed command channel means every handle is gone.
                Some(LinkCmd::Shutdown) | None => return SessionEnd::Shutdown,
            },
            Either::Right((signal, _)) => match signal {
                Some(SocketSignal::Message(text)) => {
                    match serde_json::from_str::<WsEnvelope<ServerEvent>>(&text) {
                        Ok(frame) => on_event(frame),
                        Err(e) => crate::log_error!("ignoring malformed frame: {}", e),
                    }
                }
                Some(SocketSignal::Closed(reason)) => return SessionEnd::Dropped(reason),
                Some(SocketSignal::Errored(reason)) => return SessionEnd::Dropped(reason),
                Some(SocketSignal::Open) => {}
                None => return SessionEnd::Dropped("socket callbacks dropped".to_string()),
            },
        }
    }
}

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

fn rejoin_rooms(socket: &WebSocket, rooms: &HashSet<String>) {
    if rooms.is_empty() {
        return;
    }
    crate::log_info!("re-joining {} room(s)", rooms.len());
    for room in rooms {
        let frame = WsEnvelope::new(ClientCommand::JoinRoom { room: room.clone() });
        if let Err(err) = send_frame(socket, &frame) {
            crate::log_warn!("failed to re-join {}: {}", room, err);
        }
    }
}

/// Sleep out the backoff delay. Returns `true` if a shutdown arrived before
/// it elapsed.
async fn wait_or_shutdown(cmd_rx: &mut UnboundedReceiver<LinkCmd>, delay_ms: u32) -> bool {
    let backoff = TimeoutFuture::new(delay_ms);
    pin_mut!(backoff);
    loop {
        match select(cmd_rx.next(), &mut backoff).await {
            Either::Left((Some(LinkCmd::Shutdown) | None, _)) => return true,
            Either::Left((Some(LinkCmd::Frame(frame)), _)) => {
                // Not connected: subscribes and publishes are dropped,
                // never queued.
                crate::log_debug!("dropping {} while offline", frame.payload.name());
            }
            Either::Right(_) => return false,
        }
    }
}

/// Wait for the next socket signal, bounded by `timeout_ms`.
async fn next_signal(
    sig_rx: &mut UnboundedReceiver<SocketSignal>,
    timeout_ms: u32,
) -> Result<SocketSignal, RealtimeError> {
    let timeout = TimeoutFuture::new(timeout_ms);
    pin_mut!(timeout);
    match select(sig_rx.next(), timeout).await {
        Either::Left((Some(signal), _)) => Ok(signal),
        Either::Left((None, _)) => Err(RealtimeError::Transport(
            "socket callbacks dropped".to_string(),
        )),
        Either::Right(_) => Err(RealtimeError::Transport(format!(
            "connect timeout after {}ms",
            timeout_ms
        ))),
    }
}

/// Wire the socket's browser callbacks onto a signal channel.
fn attach_callbacks(socket: &WebSocket) -> UnboundedReceiver<SocketSignal> {
    let (sig_tx, sig_rx) = unbounded();

    let tx = sig_tx.clone();
    let onopen = Closure::wrap(Box::new(move |_: web_sys::Event| {
        let _ = tx.unbounded_send(SocketSignal::Open);
    }) as Box<dyn FnMut(web_sys::Event)>);
    socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));
    onopen.forget();

    let tx = sig_tx.clone();
    let onmessage = Closure::wrap(Box::new(move |event: MessageEvent| {
        if let Some(text) = event.data().as_string() {
            let _ = tx.unbounded_send(SocketSignal::Message(text));
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget();

    let tx = sig_tx.clone();
    let onclose = Closure::wrap(Box::new(move |event: CloseEvent| {
        let reason = if event.reason().is_empty() {
            format!("close code {}", event.code())
        } else {
            event.reason()
        };
        let _ = tx.unbounded_send(SocketSignal::Closed(reason));
    }) as Box<dyn FnMut(CloseEvent)>);
    socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));
    onclose.forget();

    let onerror = Closure::wrap(Box::new(move |_: ErrorEvent| {
        let _ = sig_tx.unbounded_send(SocketSignal::Errored("socket error".to_string()));
    }) as Box<dyn FnMut(ErrorEvent)>);
    socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));
    onerror.forget();

    sig_rx
}

fn send_frame(socket: &WebSocket, frame: &WsEnvelope<ClientCommand>) -> Result<(), RealtimeError> {
    let json = serde_json::to_string(frame).map_err(|e| RealtimeError::Frame(e.to_string()))?;
    socket
        .send_with_str(&json)
        .map_err(|e| RealtimeError::Transport(format!("send failed: {:?}", e)))
}

//! `WebSocket` handler for wheel clients.
//!
//! A client connects to `GET /ws` and must send a [`WheelLogin`] frame
//! within ten seconds: either a previously issued wheel token, or no
//! token to request pairing. Paired clients receive the wheel's current
//! state immediately and then every committed change.
//!
//! Close codes distinguish the failure categories for clients:
//!
//! - `1008` (policy violation) -- invalid/expired token, auth timeout,
//!   pairing timeout: re-pair or give up
//! - `1003` (unsupported data) -- malformed login frame: fix the client
//! - `1000` (normal) -- the wheel was deleted while subscribed

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use misfortune_core::{CONFIRMATION_TIMEOUT, ListenerId, PairingError, WheelSession};
use misfortune_types::{WheelCredentials, WheelId, WheelLogin, WheelRegistrationInfo, WheelState};

use crate::state::AppState;

/// How long a client may take to send its login frame.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound state pushes buffered per connection before the listener
/// starts dropping them (the read loop notices real disconnects).
const PUSH_BUFFER: usize = 16;

/// Upgrade an HTTP request to a `WebSocket` connection and run the
/// wheel client protocol.
///
/// # Route
///
/// `GET /ws`
pub async fn connect_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Drive one wheel client connection from login to teardown.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("wheel client connected");

    let Some(wheel_id) = authenticate(&mut socket, &state).await else {
        return;
    };

    let Some(session) = state.registry.get(wheel_id).await else {
        // Token refers to a wheel deleted since it was issued.
        warn!(wheel = %wheel_id, "authenticated against unknown wheel");
        close_with(&mut socket, close_code::POLICY, "unknown wheel").await;
        return;
    };

    let (push_tx, push_rx) = mpsc::channel::<Arc<WheelState>>(PUSH_BUFFER);

    // Send the snapshot and attach the listener inside one atomic
    // window, so no update is missed or delivered twice in between.
    let listener_id = {
        let atom = session.state().atomic().await;
        let snapshot = atom.read();
        if send_state(&mut socket, &snapshot).await.is_err() {
            debug!("wheel client disconnected during snapshot send");
            return;
        }
        attach_push_listener(&atom, push_tx)
    };

    forward_until_disconnect(&mut socket, &session, push_rx).await;

    session.state().remove_listener(listener_id);
    debug!(wheel = %wheel_id, "ended wheel client connection");
}

/// Register a listener that forwards committed states into the
/// connection's push channel.
///
/// A full or closed channel is not an error for the notification batch:
/// the client is gone or hopelessly behind, and the connection's own
/// read loop tears it down.
fn attach_push_listener(
    atom: &misfortune_core::AtomicObservable<'_, WheelState>,
    push_tx: mpsc::Sender<Arc<WheelState>>,
) -> ListenerId {
    atom.add_listener(Arc::new(move |value: Arc<WheelState>| {
        let push_tx = push_tx.clone();
        async move {
            if push_tx.try_send(value).is_err() {
                debug!("dropping state push to unresponsive wheel client");
            }
            Ok(())
        }
        .boxed()
    }))
}

/// Forward pushed states to the socket until the client disconnects or
/// the wheel is deleted.
async fn forward_until_disconnect(
    socket: &mut WebSocket,
    session: &WheelSession,
    mut push_rx: mpsc::Receiver<Arc<WheelState>>,
) {
    let mut closed = session.closed();

    loop {
        tokio::select! {
            pushed = push_rx.recv() => {
                match pushed {
                    Some(snapshot) => {
                        if send_state(socket, &snapshot).await.is_err() {
                            debug!("wheel client disconnected (send failed)");
                            return;
                        }
                    }
                    // All senders gone: the session listener was removed.
                    None => return,
                }
            }
            // wait_for re-checks the current value, so a deletion that
            // happened before this connection subscribed still lands here.
            // The returned `Ref` borrows the watch channel and is `!Send`;
            // confine it to this block so it never crosses an await point.
            () = async { let _ = closed.wait_for(|closed| *closed).await; } => {
                debug!("wheel deleted, closing subscribed client");
                close_with(socket, close_code::NORMAL, "wheel deleted").await;
                return;
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("wheel client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("wheel client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Ok(message)) => {
                        warn!(?message, "received unexpected message");
                    }
                    Some(Err(e)) => {
                        debug!("wheel client socket error: {e}");
                        return;
                    }
                }
            }
        }
    }
}

/// Resolve the connection to a wheel id, via token or pairing.
///
/// Returns `None` after closing the socket with the appropriate code.
async fn authenticate(socket: &mut WebSocket, state: &Arc<AppState>) -> Option<WheelId> {
    let message = match tokio::time::timeout(AUTH_TIMEOUT, socket.recv()).await {
        Err(_elapsed) => {
            warn!("client did not send auth message");
            close_with(socket, close_code::POLICY, "auth timeout").await;
            return None;
        }
        Ok(None) => {
            debug!("disconnected before auth");
            return None;
        }
        Ok(Some(Err(e))) => {
            debug!("socket error before auth: {e}");
            return None;
        }
        Ok(Some(Ok(message))) => message,
    };

    let Message::Text(text) = message else {
        warn!("non-text auth message");
        close_with(socket, close_code::UNSUPPORTED, "expected login frame").await;
        return None;
    };

    let login: WheelLogin = match serde_json::from_str(&text) {
        Ok(login) => login,
        Err(e) => {
            warn!(error = %e, "invalid auth message");
            close_with(socket, close_code::UNSUPPORTED, "invalid login frame").await;
            return None;
        }
    };

    match login.token {
        Some(token) => match state.tokens.verify(&token) {
            Ok(wheel_id) => Some(wheel_id),
            Err(e) => {
                warn!(error = %e, "login attempt with invalid token");
                close_with(socket, close_code::POLICY, "invalid token").await;
                None
            }
        },
        None => register_client(socket, state).await,
    }
}

/// Run the pairing flow for a client without credentials.
///
/// Sends the registration descriptor, waits (bounded) for the owner's
/// confirmation, then issues the signed wheel token. The pending
/// registration's drop guard removes the map entry on every exit path,
/// including client disconnect during the wait.
async fn register_client(socket: &mut WebSocket, state: &Arc<AppState>) -> Option<WheelId> {
    let registration = state.pairing.begin();
    let info = WheelRegistrationInfo::create(&state.bot_name, registration.id());

    if send_json(socket, &info).await.is_err() {
        debug!("disconnected before registration info was sent");
        return None;
    }

    let wait = registration.wait(CONFIRMATION_TIMEOUT);
    tokio::pin!(wait);

    let wheel_id = loop {
        tokio::select! {
            confirmed = &mut wait => {
                match confirmed {
                    Ok(wheel_id) => break wheel_id,
                    Err(PairingError::Timeout) => {
                        warn!("pairing confirmation timed out");
                        close_with(socket, close_code::POLICY, "pairing timeout").await;
                        return None;
                    }
                    Err(e) => {
                        warn!(error = %e, "pairing wait failed");
                        close_with(socket, close_code::POLICY, "pairing failed").await;
                        return None;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        debug!("disconnected during pairing wait");
                        return None;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return None;
                        }
                    }
                    Some(Ok(message)) => {
                        warn!(?message, "unexpected message during pairing wait");
                    }
                }
            }
        }
    };

    let token = match state.tokens.sign_default(wheel_id) {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "failed to sign wheel token");
            close_with(socket, close_code::POLICY, "pairing failed").await;
            return None;
        }
    };

    if send_json(socket, &WheelCredentials { token }).await.is_err() {
        debug!("disconnected before credentials were sent");
        return None;
    }

    Some(wheel_id)
}

/// Push one state snapshot as a text frame.
///
/// A serialization failure is logged and skipped; the connection stays
/// up and later snapshots repair the client's view.
async fn send_state(socket: &mut WebSocket, state: &WheelState) -> Result<(), axum::Error> {
    match serde_json::to_string(state) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize wheel state");
            Ok(())
        }
    }
}

/// Send any serializable message as a text frame.
async fn send_json<T: serde::Serialize>(
    socket: &mut WebSocket,
    message: &T,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize outbound message");
            Ok(())
        }
    }
}

/// Close the socket with a specific code and reason, best-effort.
async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("failed to send close frame: {e}");
    }
}

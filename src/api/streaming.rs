//! Streaming endpoint
//!
//! `GET /socket` upgrades to a WebSocket. The connection is authenticated
//! once, from the handshake cookies, before the upgrade completes. Clients
//! send `start_loading` with the newest post id they hold; the server
//! pushes `new_post` batches as the dashboard grows.
//!
//! Unauthenticated connections are accepted but never served any data.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::AppState;
use crate::auth::Session;
use crate::auth::cookie::verify_session_cookie;
use crate::metrics::{STREAM_CONNECTIONS_ACTIVE, STREAM_CONNECTIONS_TOTAL};
use crate::service::{DashboardPage, PollTask, PostId};

/// Pending batches per connection before the poller waits on the socket
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Messages sent from clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin polling after the given post; `null` waits for a later start
    StartLoading(Option<PostId>),
}

/// Messages pushed to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// New dashboard posts, newest first
    NewPost(DashboardPage),
}

/// Resolve the session for a new streaming connection
///
/// Runs the same cookie check as the HTTP layer, then a store lookup.
/// Every failure collapses to `None`: a bad signature, a missing cookie,
/// an unknown id and an unreachable store all look alike to the client.
pub async fn authenticate_connection(headers: &HeaderMap, state: &AppState) -> Option<Session> {
    let session_config = &state.config.session;

    let verified = verify_session_cookie(
        headers,
        &session_config.cookie_name,
        &session_config.secret,
    );
    let id = match verified {
        Ok(id) => id,
        Err(error) => {
            tracing::debug!(%error, "Streaming connection without a valid session cookie");
            return None;
        }
    };

    match state.sessions.get(&id).await {
        Ok(Some(session)) => Some(session),
        Ok(None) => {
            tracing::debug!("Streaming connection references an unknown session");
            None
        }
        Err(error) => {
            tracing::warn!(%error, "Session lookup failed for streaming connection");
            None
        }
    }
}

/// GET /socket
pub async fn stream_socket(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let session = authenticate_connection(&headers, &state).await;
    ws.on_upgrade(move |socket| serve_connection(socket, state, session))
}

/// Per-connection state
///
/// Holds a snapshot of the session taken at connect time and at most one
/// poll task. Closing the connection cancels the task.
pub struct StreamConnection {
    id: Ulid,
    session: Option<Session>,
    poll: Option<PollTask>,
    cancel: CancellationToken,
    events: mpsc::Sender<DashboardPage>,
}

impl StreamConnection {
    pub fn new(session: Option<Session>, events: mpsc::Sender<DashboardPage>) -> Self {
        Self {
            id: Ulid::new(),
            session,
            poll: None,
            cancel: CancellationToken::new(),
            events,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_authenticated)
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub fn handle_text(&mut self, text: &str, state: &AppState) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(message, state),
            Err(error) => {
                tracing::debug!(connection_id = %self.id, %error, "Ignoring unparseable message");
            }
        }
    }

    pub fn handle(&mut self, message: ClientMessage, state: &AppState) {
        match message {
            ClientMessage::StartLoading(cursor) => self.start_loading(cursor, state),
        }
    }

    /// Start (or restart) polling from `cursor`
    ///
    /// Silently ignored unless the session is authenticated. A running
    /// task is cancelled first, so a connection never polls twice.
    fn start_loading(&mut self, cursor: Option<PostId>, state: &AppState) {
        let Some(token) = self
            .session
            .as_ref()
            .and_then(Session::access_token)
            .cloned()
        else {
            return;
        };

        if let Some(previous) = self.poll.take() {
            previous.cancel();
        }

        tracing::info!(connection_id = %self.id, cursor = ?cursor, "Starting dashboard poll");
        self.poll = Some(PollTask::spawn(
            state.dashboard.clone(),
            token,
            cursor,
            state.config.dashboard.poll_interval(),
            self.events.clone(),
            self.cancel.child_token(),
        ));
    }

    pub fn close(&mut self) {
        self.cancel.cancel();
        self.poll = None;
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve_connection(socket: WebSocket, state: AppState, session: Option<Session>) {
    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut connection = StreamConnection::new(session, tx);
    let connection_id = connection.id();

    let authenticated = connection.is_authenticated();
    STREAM_CONNECTIONS_TOTAL
        .with_label_values(&[if authenticated { "true" } else { "false" }])
        .inc();
    STREAM_CONNECTIONS_ACTIVE.inc();
    tracing::info!(%connection_id, authenticated, "Streaming connection opened");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => connection.handle_text(&text, &state),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::debug!(%connection_id, %error, "Streaming connection errored");
                    break;
                }
            },
            Some(batch) = rx.recv() => {
                let payload = match serde_json::to_string(&ServerMessage::NewPost(batch)) {
                    Ok(payload) => payload,
                    Err(error) => {
                        tracing::error!(%connection_id, %error, "Failed to encode batch");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
        }
    }

    connection.close();
    STREAM_CONNECTIONS_ACTIVE.dec();
    tracing::info!(%connection_id, "Streaming connection closed");
}

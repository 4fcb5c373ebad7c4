//! WebSocket handler for notification clients
//!
//! Streams domain events to an authenticated client. Regular users only see
//! events about their own account; administrators see everything.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::select;
use tracing::{debug, error, info, warn};

use crate::application::events::{EventMessage, SharedEventBus};
use crate::interfaces::http::middleware::AuthenticatedUser;

/// Query parameters for filtering events
#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only events about this facility
    pub facility_id: Option<String>,
    /// Comma-separated event types, e.g. `slot_booked,entry_approved`
    pub event_types: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, event: &EventMessage, viewer: &AuthenticatedUser) -> bool {
        if !viewer.is_admin && event.event.user_id() != viewer.user_id {
            return false;
        }

        if let Some(ref facility_id) = self.facility_id {
            if event.event.facility_id() != Some(facility_id.as_str()) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            let event_type = event.event.event_type();
            if !types.split(',').map(str::trim).any(|t| t == event_type) {
                return false;
            }
        }

        true
    }
}

/// State for notification WebSocket handler
#[derive(Clone)]
pub struct NotificationState {
    pub event_bus: SharedEventBus,
}

/// WebSocket upgrade handler for notifications
pub async fn ws_notifications_handler(
    ws: WebSocketUpgrade,
    State(state): State<NotificationState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(filter): Query<EventFilter>,
) -> impl IntoResponse {
    info!(
        user_id = %user.user_id,
        facility_id = ?filter.facility_id,
        event_types = ?filter.event_types,
        "Notification WebSocket connection"
    );

    ws.on_upgrade(move |socket| handle_notification_socket(socket, state, user, filter))
}

async fn handle_notification_socket(
    socket: WebSocket,
    state: NotificationState,
    user: AuthenticatedUser,
    filter: EventFilter,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscriber = state.event_bus.subscribe();

    let welcome = serde_json::json!({
        "type": "connected",
        "message": "Connected to notification stream",
        "filter": {
            "facility_id": filter.facility_id,
            "event_types": filter.event_types
        }
    });
    if let Err(e) = sender.send(Message::Text(welcome.to_string().into())).await {
        error!(error = %e, "Failed to send welcome message");
        return;
    }

    loop {
        select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            error!(error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "Notification socket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            event = subscriber.recv() => {
                let Some(event_msg) = event else {
                    warn!("Event bus closed");
                    break;
                };
                if !filter.matches(&event_msg, &user) {
                    continue;
                }
                match serde_json::to_string(&event_msg) {
                    Ok(json) => {
                        if let Err(e) = sender.send(Message::Text(json.into())).await {
                            debug!(error = %e, "Notification client went away");
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to serialize event"),
                }
            }
        }
    }

    info!(user_id = %user.user_id, "Notification WebSocket client disconnected");
}

//! Live slot-set stream for one facility
//!
//! Sends the current slot set on connect and every newer revision after.
//! A slow client only ever receives the latest revision it has not seen.
//! Every frame carries the sensor overlay, and a changed reading for one of
//! the facility's bays re-sends the current revision.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
    Extension,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::select;
use tracing::{debug, info, warn};

use crate::application::services::{FacilityFeed, FacilitySubscription, SharedSensorFeed};
use crate::domain::{FacilitySnapshot, RepositoryProvider};
use crate::interfaces::http::error::ApiError;
use crate::interfaces::http::middleware::AuthenticatedUser;
use crate::interfaces::http::modules::facilities::FacilitySlotsDto;

#[derive(Clone)]
pub struct SlotStreamState {
    pub repos: Arc<dyn RepositoryProvider>,
    pub feed: Arc<FacilityFeed>,
    pub sensors: SharedSensorFeed,
}

pub async fn ws_slot_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<SlotStreamState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(facility_id): Path<String>,
) -> Response {
    // Subscribe before upgrading so an unknown facility is a plain 404.
    let subscription = match state.feed.subscribe(state.repos.occupancy(), &facility_id).await {
        Ok(sub) => sub,
        Err(e) => return ApiError::from(e).into_response(),
    };
    info!(facility_id = %facility_id, user_id = %user.user_id, "Slot stream connection");

    let sensors = state.sensors;
    ws.on_upgrade(move |socket| stream_slots(socket, subscription, sensors, user))
}

async fn stream_slots(
    socket: WebSocket,
    mut subscription: FacilitySubscription,
    sensors: SharedSensorFeed,
    user: AuthenticatedUser,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut readings = sensors.subscribe();
    let mut current: Option<Arc<FacilitySnapshot>> = None;

    loop {
        select! {
            snapshot = subscription.next() => {
                let Some(snapshot) = snapshot else { break };
                if send_frame(&mut sender, &snapshot, &sensors, &user).await.is_err() {
                    break;
                }
                debug!(facility_id = subscription.facility_id(), revision = snapshot.revision(), "Slot set sent");
                current = Some(snapshot);
            }

            Some(reading) = readings.recv() => {
                let Some(snapshot) = current.as_ref() else { continue };
                let watched = snapshot
                    .slots
                    .iter()
                    .any(|s| s.sensor_key.as_deref() == Some(reading.key.as_str()));
                if !watched {
                    continue;
                }
                if send_frame(&mut sender, snapshot, &sensors, &user).await.is_err() {
                    break;
                }
                debug!(facility_id = subscription.facility_id(), sensor = %reading.key, "Sensor overlay sent");
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!(facility_id = subscription.facility_id(), "Slot stream closed");
}

/// Serialize failures are logged and skipped; `Err` means the socket is gone.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    snapshot: &FacilitySnapshot,
    sensors: &SharedSensorFeed,
    user: &AuthenticatedUser,
) -> Result<(), axum::Error> {
    let dto = FacilitySlotsDto::with_sensors(snapshot, sensors, &user.user_id, user.is_admin);
    match serde_json::to_string(&dto) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize slot set");
            Ok(())
        }
    }
}

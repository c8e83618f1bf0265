//! WebSocket handler for real-time updates.
//!
//! Clients opt in per job: after connecting they send
//! `{"type": "subscribe-job", "job_id": "..."}` (and the matching
//! `unsubscribe-job`) and receive `job-progress`, `job-status` and
//! `job-logs` events for exactly the jobs in their subscription set.
//! `license-status-changed` and `system-status-changed` go to every
//! connected client. There is no replay: after a reconnect a client must
//! re-subscribe and missed events are gone.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{WsClientMessage, WsEventMessage};
use crate::services::EventBroadcaster;

/// Ping interval for keeping connections alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for receiving pong response.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket handler - upgrades the HTTP connection and spawns the session.
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    broadcaster: web::Data<EventBroadcaster>,
) -> Result<HttpResponse, actix_web::Error> {
    let client_addr = req
        .connection_info()
        .realip_remote_addr()
        .map(String::from)
        .unwrap_or_else(|| "unknown".to_string());

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;

    info!(client = %client_addr, "WebSocket connection established");

    actix_web::rt::spawn(handle_websocket_connection(
        session,
        msg_stream,
        broadcaster.get_ref().clone(),
        client_addr,
    ));

    Ok(response)
}

/// Should this event be delivered to a session with the given subscriptions?
fn wants_event(subscriptions: &HashSet<Uuid>, event: &WsEventMessage) -> bool {
    match event.event.scope() {
        Some(job_id) => subscriptions.contains(&job_id),
        None => true,
    }
}

/// Handles an individual WebSocket connection.
async fn handle_websocket_connection(
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
    broadcaster: EventBroadcaster,
    client_addr: String,
) {
    // Subscribe to broadcast events
    let mut rx = broadcaster.subscribe();

    // Per-connection job subscription set, driven by subscribe-job /
    // unsubscribe-job messages.
    let mut subscriptions: HashSet<Uuid> = HashSet::new();

    // Track last activity for ping/pong
    let mut last_pong = Instant::now();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            // Handle incoming WebSocket messages from client
            Some(msg_result) = msg_stream.next() => {
                match msg_result {
                    Ok(msg) => {
                        match msg {
                            Message::Ping(bytes) => {
                                if session.pong(&bytes).await.is_err() {
                                    break;
                                }
                            }
                            Message::Pong(_) => {
                                last_pong = Instant::now();
                            }
                            Message::Text(text) => {
                                match serde_json::from_str::<WsClientMessage>(&text) {
                                    Ok(WsClientMessage::SubscribeJob { job_id }) => {
                                        debug!(client = %client_addr, job_id = %job_id, "Job subscription added");
                                        subscriptions.insert(job_id);
                                    }
                                    Ok(WsClientMessage::UnsubscribeJob { job_id }) => {
                                        debug!(client = %client_addr, job_id = %job_id, "Job subscription released");
                                        subscriptions.remove(&job_id);
                                    }
                                    Err(e) => {
                                        debug!(client = %client_addr, error = %e, "Ignoring unrecognized client message");
                                    }
                                }
                            }
                            Message::Close(reason) => {
                                info!(client = %client_addr, reason = ?reason, "Client requested close");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Err(e) => {
                        warn!(client = %client_addr, error = %e, "WebSocket message error");
                        break;
                    }
                }
            }

            // Forward broadcast events this client opted into
            event_result = rx.recv() => {
                match event_result {
                    Ok(event) => {
                        if !wants_event(&subscriptions, &event) {
                            continue;
                        }
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if session.text(json).await.is_err() {
                                    warn!(client = %client_addr, "Failed to send event, closing connection");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize event");
                            }
                        }
                    }
                    Err(RecvError::Lagged(count)) => {
                        // Slow client: it misses events but keeps its
                        // subscriptions and receives future ones.
                        warn!(client = %client_addr, missed = count, "Client lagged, missed events");
                    }
                    Err(RecvError::Closed) => {
                        info!(client = %client_addr, "Broadcast channel closed");
                        break;
                    }
                }
            }

            // Send periodic pings
            _ = ping_interval.tick() => {
                if last_pong.elapsed() > PING_INTERVAL + PONG_TIMEOUT {
                    warn!(client = %client_addr, "Pong timeout, closing connection");
                    break;
                }

                if session.ping(b"").await.is_err() {
                    warn!(client = %client_addr, "Failed to send ping, closing connection");
                    break;
                }
            }
        }
    }

    // Clean up
    let _ = session.close(None).await;
    info!(client = %client_addr, "WebSocket connection closed");
}

/// Configure WebSocket routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(websocket_handler)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, LicenseStatus, WsEvent};

    #[test]
    fn job_scoped_events_require_a_subscription() {
        let job_a = Uuid::now_v7();
        let job_b = Uuid::now_v7();
        let mut subscriptions = HashSet::new();
        subscriptions.insert(job_a);

        let event_a = WsEventMessage::new(WsEvent::job_status(job_a, JobStatus::Running));
        let event_b = WsEventMessage::new(WsEvent::job_status(job_b, JobStatus::Running));

        assert!(wants_event(&subscriptions, &event_a));
        assert!(!wants_event(&subscriptions, &event_b));
    }

    #[test]
    fn unscoped_events_reach_every_session() {
        let subscriptions = HashSet::new();
        let event = WsEventMessage::new(WsEvent::LicenseStatusChanged(LicenseStatus::unknown()));
        assert!(wants_event(&subscriptions, &event));
    }
}

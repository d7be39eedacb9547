//! Live event stream for dashboard viewers (Server-Sent Events)
//!
//! Each connection registers one event bus subscriber scoped to the
//! requested organization. The subscription lives inside the response
//! stream, so a viewer disconnecting unsubscribes it.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval};
use uuid::Uuid;

use common::event::FleetEvent;

use crate::event_bus::{DeliveryError, Subscription};
use crate::ServiceState;

pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    /// Organization whose events this viewer receives; without one the
    /// viewer only sees global broadcasts
    pub organization_id: Option<String>,
}

struct Feed {
    rx: mpsc::UnboundedReceiver<FleetEvent>,
    keep_alive: Interval,
    _subscription: Subscription,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscriber_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel();

    let subscription = state.event_bus().subscribe(
        subscriber_id.clone(),
        query.organization_id.clone(),
        move |event: &FleetEvent| {
            tx.send(event.clone())
                .map_err(|_| DeliveryError("viewer disconnected".to_string()))
        },
    );
    tracing::info!(
        subscriber = %subscriber_id,
        organization_id = ?query.organization_id,
        "event stream opened"
    );

    let connected = Event::default()
        .event("connected")
        .data(serde_json::json!({ "subscriber_id": subscriber_id }).to_string());

    let feed = Feed {
        rx,
        keep_alive: interval_at(Instant::now() + KEEP_ALIVE_INTERVAL, KEEP_ALIVE_INTERVAL),
        _subscription: subscription,
    };

    let events = stream::unfold(feed, |mut feed| async move {
        tokio::select! {
            received = feed.rx.recv() => {
                let event = received?;
                Some((Ok::<_, Infallible>(to_sse(&event)), feed))
            }
            _ = feed.keep_alive.tick() => {
                let ping = Event::default().event("keep-alive").data("{}");
                Some((Ok(ping), feed))
            }
        }
    });

    Sse::new(stream::once(async move { Ok::<_, Infallible>(connected) }).chain(events))
}

fn to_sse(event: &FleetEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().event(event.name()).data(data),
        Err(e) => {
            tracing::error!(event = event.name(), "failed to serialize event: {}", e);
            Event::default().event("error").data("{}")
        }
    }
}

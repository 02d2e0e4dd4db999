use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::api::AppState;

/// Server-sent stream of store change events. Subscribing here replaces
/// polling the store on a timer: every successful write shows up as one
/// event.
pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::BoxError>>> {
    info!("New event stream subscriber");

    let mut rx = state.bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().data(json)),
                        Err(e) => warn!("failed to serialize store event: {e}"),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event stream lagged, {skipped} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

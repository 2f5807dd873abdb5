//! Live event channel (§6): replays backlog frames newer than the client's
//! `Last-Event-ID`, then streams new frames as they are published.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{self, Sse};
use dtm_events::EventId;
use dtm_provider::ProviderClient;
use futures_core::Stream;
use tracing::{error, warn};

use crate::state::ApiState;

const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub async fn stream_events<P: ProviderClient>(
    State(state): State<Arc<ApiState<P>>>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    let since = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<EventId>().ok());

    let mut subscription = state.events.subscribe(since);
    let frames = stream! {
        loop {
            match subscription.next().await {
                Some(Ok(envelope)) => match serde_json::to_string(&envelope) {
                    Ok(payload) => yield Ok(sse::Event::default().id(envelope.id.to_string()).event(envelope.event.kind()).data(payload)),
                    Err(source) => error!(error = %source, "failed to serialize event envelope"),
                },
                Some(Err(dtm_events::EventError::Lagged { skipped })) => {
                    warn!(skipped, "SSE subscriber lagged behind the broadcast channel");
                }
                None => break,
            }
        }
    };

    Sse::new(frames).keep_alive(sse::KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keep-alive"))
}

use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures_util::stream::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{App, error::AppError};

/// Tells the rendering layer that whatever it cached for a path is stale.
pub struct Revalidator {
    events: broadcast::Sender<String>,
}

impl Revalidator {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self { events }
    }

    /// Fire-and-forget: nobody listening is not an error.
    pub fn invalidate(&self, path: &str) {
        match self.events.send(path.to_owned()) {
            Ok(listeners) => tracing::debug!(path, listeners, "Revalidating path"),
            Err(_) => tracing::trace!(path, "Revalidating path with no listeners"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}

impl Default for Revalidator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn route() -> Router<App> {
    Router::<App>::new().route("/revalidations", get(get_revalidations))
}

async fn get_revalidations(
    State(ctx): State<App>,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>>>, AppError>
{
    let stream = BroadcastStream::new(ctx.revalidator.subscribe())
        .filter_map(|path| async move {
            // Lagged receivers skip what they missed
            path.ok()
        })
        .map(|path| Ok(Event::default().event("revalidate").data(path)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

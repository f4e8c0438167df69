//! Server-Sent Events for connection status

use crate::connection::ConnectionStatus;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

/// Current status first, then every change
pub fn status_stream(rx: watch::Receiver<ConnectionStatus>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(rx).map(|status| Ok(status_event(&status)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

fn status_event(status: &ConnectionStatus) -> Event {
    let data = serde_json::to_string(status).unwrap_or_else(|_| "{}".to_string());
    Event::default().event("status").data(data)
}

//! SSE framing for response streams.
//!
//! Every event frames as `event: <type>` + `data: <single-line JSON>`,
//! flushed per event; the stream ends with the `data: [DONE]` sentinel.
//! Backpressure is the writer's: a slow client blocks the event channel and,
//! through it, the loop.

use std::convert::Infallible;

use axum::response::{Sse, sse::Event};
use engine::EventStream;
use futures::{Stream, StreamExt};

pub(crate) fn into_sse(stream: EventStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream.map(|event| {
        let event_type = event.event_type();

        let json = serde_json::to_string(&event).unwrap_or_else(|e| {
            log::error!("failed to serialize stream event: {e}");
            r#"{"type":"error","error":{"type":"server_error","message":"serialization failed"}}"#.to_string()
        });

        Ok::<_, Infallible>(Event::default().event(event_type).data(json))
    });

    let with_done = events.chain(futures::stream::once(async {
        Ok::<_, Infallible>(Event::default().data("[DONE]"))
    }));

    Sse::new(with_done)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server-sent event plumbing.
//!
//! Handlers subscribe to the live channel *before* reading the
//! persistent log, so nothing published in between can be missed; a
//! duplicate at the seam is possible and harmless, a gap is not.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt as _};
use qto_broker::Subscription;
use std::convert::Infallible;

/// Build an SSE response that replays `historical` JSON payloads first
/// and then follows the live subscription.
pub fn historical_then_live(
    historical: Vec<serde_json::Value>,
    live: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::iter(historical)
        .chain(live.into_stream())
        .map(|payload| Ok(Event::default().data(payload.to_string())));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Build an SSE response over live events only.
pub fn live_only(
    live: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    historical_then_live(Vec::new(), live)
}

//! Streamed turn endpoint (Server-Sent Events)

use crate::error::ApiError;
use crate::sanitize::{clean_fragment, fragment_texts};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use ragline_core::{Result as CoreResult, TurnEvent};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub thread_id: Option<String>,
    pub prompt: Option<String>,
}

/// `GET /api/stream-prompt?thread_id=&prompt=`
///
/// Emits one `data:` frame per cleaned, non-empty fragment, then either
/// `event: done` or `event: error` carrying the failure text.
pub async fn stream_prompt(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let thread_id = params
        .thread_id
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("thread_id is required"))?;
    let prompt = params
        .prompt
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("prompt is required"))?;

    let turn = state
        .context
        .orchestrator
        .clone()
        .stream_turn(&thread_id, &prompt);

    let events = turn
        .map(move |item| stream::iter(frames_for(&state, item)))
        .flatten()
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// SSE frames for one orchestrator event
fn frames_for(state: &AppState, item: CoreResult<TurnEvent>) -> Vec<Event> {
    match item {
        Ok(TurnEvent::Fragment(content)) => fragment_texts(&content)
            .into_iter()
            .filter_map(|piece| match piece {
                Ok(text) => {
                    let cleaned = clean_fragment(&text);
                    (!cleaned.is_empty()).then(|| Event::default().data(cleaned))
                }
                Err(e) => {
                    let dropped = state.record_dropped_fragment();
                    tracing::warn!(dropped_total = dropped, "Skipping unrenderable fragment: {}", e);
                    None
                }
            })
            .collect(),
        Ok(TurnEvent::Finished(_)) => vec![Event::default().event("done").data("")],
        Err(e) => vec![Event::default()
            .event("error")
            .data(clean_fragment(&e.to_string()))],
    }
}

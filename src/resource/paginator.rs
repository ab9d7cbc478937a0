//! Pagination Driver
//!
//! Presents every listing as a stream of response pages. Pageable
//! operations follow their continuation token; anything else is invoked once
//! and yields its single response as one page.

use super::registry::Pagination;
use super::value::{extract_items, lookup_str};
use crate::cloud::{ApiError, CloudApi};
use futures::stream::{self, BoxStream, TryStreamExt};
use serde_json::{Map, Value};
use std::collections::HashSet;

enum Cursor {
    First,
    Next(String),
    Done,
}

struct State<'a> {
    client: &'a dyn CloudApi,
    operation: &'a str,
    params: Map<String, Value>,
    pagination: Option<&'a Pagination>,
    cursor: Cursor,
    seen: HashSet<String>,
}

fn base_params(params: &Value) -> Map<String, Value> {
    match params {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

fn paged_request(params: &Map<String, Value>, pagination: &Pagination) -> Map<String, Value> {
    let mut request = params.clone();
    if let (Some(limit_key), Some(size)) = (&pagination.limit_key, pagination.page_size) {
        request
            .entry(limit_key.clone())
            .or_insert_with(|| Value::from(size));
    }
    request
}

/// Stream the pages of `operation`
///
/// When the first paged request is rejected as invalid (the operation does
/// not accept the paging arguments), the driver retries once with the raw
/// parameters and yields that response as the only page.
pub fn paginate<'a>(
    client: &'a dyn CloudApi,
    operation: &'a str,
    params: &Value,
    pagination: Option<&'a Pagination>,
) -> BoxStream<'a, Result<Value, ApiError>> {
    let state = State {
        client,
        operation,
        params: base_params(params),
        pagination,
        cursor: Cursor::First,
        seen: HashSet::new(),
    };

    Box::pin(stream::try_unfold(state, |mut state| async move {
        let Some(pagination) = state.pagination else {
            return match state.cursor {
                Cursor::Done => Ok(None),
                _ => {
                    let page = state
                        .client
                        .call(state.operation, &Value::Object(state.params.clone()))
                        .await?;
                    state.cursor = Cursor::Done;
                    Ok(Some((page, state)))
                }
            };
        };

        let page = match std::mem::replace(&mut state.cursor, Cursor::Done) {
            Cursor::Done => return Ok(None),
            Cursor::First => {
                let request = paged_request(&state.params, pagination);
                match state.client.call(state.operation, &Value::Object(request.clone())).await {
                    Ok(page) => page,
                    Err(e) if e.is_invalid_request() && request != state.params => {
                        tracing::debug!(
                            "{} rejected paging arguments ({}), retrying as a single call",
                            state.operation,
                            e
                        );
                        let page = state
                            .client
                            .call(state.operation, &Value::Object(state.params.clone()))
                            .await?;
                        return Ok(Some((page, state)));
                    }
                    Err(e) => return Err(e),
                }
            }
            Cursor::Next(token) => {
                let mut request = paged_request(&state.params, pagination);
                request.insert(pagination.input_token.clone(), Value::String(token));
                state.client.call(state.operation, &Value::Object(request)).await?
            }
        };

        if let Some(token) = lookup_str(&page, &pagination.output_token).filter(|t| !t.is_empty()) {
            if state.seen.insert(token.clone()) {
                state.cursor = Cursor::Next(token);
            } else {
                tracing::warn!(
                    "{} returned a repeated continuation token, stopping",
                    state.operation
                );
            }
        }

        Ok(Some((page, state)))
    }))
}

/// Collect the items of every page under `result_key`
pub async fn collect_items(
    client: &dyn CloudApi,
    operation: &str,
    params: &Value,
    pagination: Option<&Pagination>,
    result_key: &str,
) -> Result<Vec<Value>, ApiError> {
    paginate(client, operation, params, pagination)
        .map_ok(|page| extract_items(&page, result_key))
        .try_fold(Vec::new(), |mut items, page_items| async move {
            items.extend(page_items);
            Ok(items)
        })
        .await
}

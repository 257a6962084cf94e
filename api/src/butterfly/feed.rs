use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{App, error::AppError, store::ButterflyStore};

use super::{
    ButterflyError,
    view::{ButterflyView, populate},
};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub butterflies: Vec<ButterflyView>,
    pub is_next: bool,
}

/// One page of top-level butterflies, newest first, each with its author,
/// community and direct replies.
pub async fn fetch_feed(
    store: &dyn ButterflyStore,
    page: u64,
    page_size: u64,
) -> Result<FeedPage, ButterflyError> {
    const ACTION: &str = "fetch feed";

    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let Some(skip) = (page - 1).checked_mul(page_size) else {
        // past any page that could exist
        return Ok(FeedPage {
            butterflies: vec![],
            is_next: false,
        });
    };

    let top_level = store
        .find_top_level(skip, page_size as i64)
        .await
        .map_err(ButterflyError::store(ACTION))?;
    let total = store
        .count_top_level()
        .await
        .map_err(ButterflyError::store(ACTION))?;

    let is_next = total > skip.saturating_add(top_level.len() as u64);

    let butterflies = populate(store, top_level, 1)
        .await
        .map_err(ButterflyError::store(ACTION))?;

    Ok(FeedPage {
        butterflies,
        is_next,
    })
}

#[derive(Deserialize)]
pub struct FeedQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

pub async fn get_feed(
    State(ctx): State<App>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedPage>, AppError> {
    let page = fetch_feed(
        ctx.store.as_ref(),
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(ctx.config.feed_page_size),
    )
    .await?;

    Ok(Json(page))
}

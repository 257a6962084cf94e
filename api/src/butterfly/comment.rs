use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use serde::Deserialize;

use crate::{App, error::AppError, revalidate::Revalidator, store::ButterflyStore};

use super::{
    ButterflyError,
    models::Butterfly,
    routes::{parse_id, validate_path, validate_text},
    view::ButterflyView,
};

/// Replies to `parent_id`. The reply's id always lands at the end of the
/// parent's `children`, so that list stays in comment order.
pub async fn add_comment(
    store: &dyn ButterflyStore,
    revalidator: &Revalidator,
    parent_id: ObjectId,
    text: String,
    author: ObjectId,
    path: &str,
) -> Result<Butterfly, ButterflyError> {
    const ACTION: &str = "add comment";

    store
        .find_butterfly(parent_id)
        .await
        .map_err(ButterflyError::store(ACTION))?
        .ok_or_else(|| ButterflyError::not_found(parent_id))?;

    let comment = Butterfly::reply(parent_id, text, author);

    let appended = store
        .append_reply(parent_id, &comment)
        .await
        .map_err(ButterflyError::store(ACTION))?;

    // the parent was deleted since we looked it up
    if !appended {
        return Err(ButterflyError::not_found(parent_id));
    }

    tracing::info!(id = %comment.id, parent = %parent_id, %author, "Added comment");

    revalidator.invalidate(path);

    Ok(comment)
}

#[derive(Deserialize)]
pub struct CommentSubmission {
    text: String,
    author: String,
    path: Option<String>,
}

#[debug_handler]
pub async fn add_comment_handler(
    State(ctx): State<App>,
    Path(id): Path<String>,
    crate::json::Json(mut submission): crate::json::Json<CommentSubmission>,
) -> Result<Json<ButterflyView>, AppError> {
    let parent_id = parse_id(&id)?;
    let author = parse_id(&submission.author)?;
    submission.text = validate_text(&submission.text)?;
    let path = validate_path(submission.path.as_deref())?;

    let comment = add_comment(
        ctx.store.as_ref(),
        &ctx.revalidator,
        parent_id,
        submission.text,
        author,
        path,
    )
    .await?;

    Ok(Json(ButterflyView::unpopulated(&comment)))
}

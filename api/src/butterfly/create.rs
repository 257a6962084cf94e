use axum::{Json, debug_handler, extract::State};
use bson::oid::ObjectId;
use serde::Deserialize;

use crate::{App, error::AppError, revalidate::Revalidator, store::ButterflyStore};

use super::{
    ButterflyError,
    models::Butterfly,
    routes::{parse_id, validate_path, validate_text},
    view::ButterflyView,
};

pub struct NewButterfly<'a> {
    pub text: String,
    pub author: ObjectId,
    /// Identity-provider id of the community to post in, if any
    pub community_id: Option<&'a str>,
    pub path: &'a str,
}

/// Publishes a top-level butterfly and lists it on its author and, when it
/// was posted in a known community, on that community. An unknown community
/// id falls back to a personal butterfly.
pub async fn create_butterfly(
    store: &dyn ButterflyStore,
    revalidator: &Revalidator,
    new: NewButterfly<'_>,
) -> Result<Butterfly, ButterflyError> {
    const ACTION: &str = "create butterfly";

    let community = match new.community_id {
        Some(external_id) => {
            let community = store
                .find_community_by_external_id(external_id)
                .await
                .map_err(ButterflyError::store(ACTION))?;
            if community.is_none() {
                tracing::warn!(external_id, "Unknown community, posting as personal butterfly");
            }
            community
        }
        None => None,
    };

    let butterfly = Butterfly::new(new.text, new.author, community);

    store
        .publish(&butterfly)
        .await
        .map_err(ButterflyError::store(ACTION))?;

    tracing::info!(id = %butterfly.id, author = %butterfly.author, "Created butterfly");

    revalidator.invalidate(new.path);

    Ok(butterfly)
}

#[derive(Deserialize)]
pub struct ButterflySubmission {
    text: String,
    author: String,
    community_id: Option<String>,
    path: Option<String>,
}

#[debug_handler]
pub async fn create_butterfly_handler(
    State(ctx): State<App>,
    crate::json::Json(submission): crate::json::Json<ButterflySubmission>,
) -> Result<Json<ButterflyView>, AppError> {
    let new = NewButterfly {
        text: validate_text(&submission.text)?,
        author: parse_id(&submission.author)?,
        community_id: submission
            .community_id
            .as_deref()
            .filter(|id| !id.trim().is_empty()),
        path: validate_path(submission.path.as_deref())?,
    };

    let butterfly = create_butterfly(ctx.store.as_ref(), &ctx.revalidator, new).await?;

    Ok(Json(ButterflyView::unpopulated(&butterfly)))
}

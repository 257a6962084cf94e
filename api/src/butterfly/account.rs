use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use serde::Serialize;

use crate::{App, error::AppError, store::ButterflyStore};

use super::{
    ButterflyError,
    models::AccountSummary,
    routes::parse_id,
    view::{ButterflyView, populate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    User,
    Community,
}

impl AccountKind {
    fn name(self) -> &'static str {
        match self {
            AccountKind::User => "User",
            AccountKind::Community => "Community",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountButterflies {
    pub account: AccountSummary,
    pub butterflies: Vec<ButterflyView>,
}

/// Everything listed on a user's or a community's `butterfly` list, in list
/// order, each with its direct replies.
pub async fn fetch_account_butterflies(
    store: &dyn ButterflyStore,
    kind: AccountKind,
    id: ObjectId,
) -> Result<AccountButterflies, ButterflyError> {
    const ACTION: &str = "fetch account butterflies";

    let not_found = || ButterflyError::NotFound {
        kind: kind.name(),
        id,
    };

    let (account, listed) = match kind {
        AccountKind::User => {
            let user = store
                .find_user(id)
                .await
                .map_err(ButterflyError::store(ACTION))?
                .ok_or_else(not_found)?;
            (AccountSummary::from(&user), user.butterfly)
        }
        AccountKind::Community => {
            let community = store
                .find_community(id)
                .await
                .map_err(ButterflyError::store(ACTION))?
                .ok_or_else(not_found)?;
            (AccountSummary::from(&community), community.butterfly)
        }
    };

    let mut found: HashMap<ObjectId, _> = store
        .find_butterflies(&listed)
        .await
        .map_err(ButterflyError::store(ACTION))?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();
    let ordered = listed.iter().filter_map(|id| found.remove(id)).collect();

    let butterflies = populate(store, ordered, 1)
        .await
        .map_err(ButterflyError::store(ACTION))?;

    Ok(AccountButterflies {
        account,
        butterflies,
    })
}

pub async fn get_user_butterflies(
    State(ctx): State<App>,
    Path(id): Path<String>,
) -> Result<Json<AccountButterflies>, AppError> {
    let id = parse_id(&id)?;
    let result = fetch_account_butterflies(ctx.store.as_ref(), AccountKind::User, id).await?;
    Ok(Json(result))
}

pub async fn get_community_butterflies(
    State(ctx): State<App>,
    Path(id): Path<String>,
) -> Result<Json<AccountButterflies>, AppError> {
    let id = parse_id(&id)?;
    let result = fetch_account_butterflies(ctx.store.as_ref(), AccountKind::Community, id).await?;
    Ok(Json(result))
}

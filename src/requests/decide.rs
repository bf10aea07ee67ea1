use axum::{
    debug_handler,
    extract::{Path, State},
    Json,
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{lifecycle::Lifecycle, session, AppResult};

use super::Request;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn accept(
    State(lifecycle): State<Lifecycle>,
    session: Session,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Request>> {
    let identity = session::identity(&session).await?;
    Ok(Json(lifecycle.accept_request(identity.as_ref(), request_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn reject(
    State(lifecycle): State<Lifecycle>,
    session: Session,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Request>> {
    let identity = session::identity(&session).await?;
    Ok(Json(lifecycle.reject_request(identity.as_ref(), request_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn fulfill(
    State(lifecycle): State<Lifecycle>,
    session: Session,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Request>> {
    let identity = session::identity(&session).await?;
    Ok(Json(lifecycle.fulfill_request(identity.as_ref(), request_id).await?))
}

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{lifecycle::Lifecycle, session, AppResult};

use super::{NewRequest, Request};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_request(
    State(lifecycle): State<Lifecycle>,
    session: Session,
    Path(donation_id): Path<Uuid>,
    body: Option<Json<NewRequest>>,
) -> AppResult<(StatusCode, Json<Request>)> {
    let identity = session::identity(&session).await?;
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let request = lifecycle
        .create_request(identity.as_ref(), donation_id, body.message)
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

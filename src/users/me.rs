use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{error::CoreError, identity::require_identity, session, AppResult};

use super::User;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn me(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<User>> {
    let identity = session::identity(&session).await?;
    let identity = require_identity(identity.as_ref())?;

    let user = super::find(&db_pool, identity.user_id)
        .await?
        .ok_or_else(|| CoreError::not_found("User not found."))?;

    Ok(Json(user))
}

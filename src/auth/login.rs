use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{identity::Identity, session, users::User, AppResult};

use super::LoginForm;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> AppResult<Json<User>> {
    let user = super::authenticate(&db_pool, form).await?;
    session::start(&session, Identity::new(user.id, user.role)).await?;

    tracing::info!(user_id = %user.id, "logged in");
    Ok(Json(user))
}

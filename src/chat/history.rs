use axum::{
    debug_handler,
    extract::{Path, State},
    Json,
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{session, AppResult};

use super::{ChatBroker, ChatMessage};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn history(
    State(broker): State<ChatBroker>,
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    let identity = session::identity(&session).await?;
    super::participant(&db_pool, identity.as_ref(), request_id).await?;

    Ok(Json(broker.history(request_id).await?))
}

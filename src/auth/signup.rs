use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::AppResult;

use super::SignupForm;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    Json(form): Json<SignupForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    super::register(&db_pool, form).await?;
    Ok((StatusCode::CREATED, Json(json!({ "msg": "User registered successfully" }))))
}

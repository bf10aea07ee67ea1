use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{error::CoreError, identity::require_identity, session, AppResult};

use super::User;

/// Partial profile update. Only fields that are present and non-blank get written.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub ngo: Option<String>,
}

impl ProfileUpdate {
    fn provided(field: &Option<String>) -> Option<&str> {
        field.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        [&self.name, &self.contact, &self.address, &self.ngo]
            .into_iter()
            .all(|field| Self::provided(field).is_none())
    }
}

pub(crate) async fn apply(
    db_pool: &SqlitePool,
    user_id: Uuid,
    update: &ProfileUpdate,
) -> Result<Option<User>, sqlx::Error> {
    if update.is_empty() {
        return super::find(db_pool, user_id).await;
    }

    sqlx::query(
        "UPDATE users SET
            name=COALESCE(?,name),
            contact=COALESCE(?,contact),
            address=COALESCE(?,address),
            ngo=COALESCE(?,ngo)
        WHERE id=?",
    )
    .bind(ProfileUpdate::provided(&update.name))
    .bind(ProfileUpdate::provided(&update.contact))
    .bind(ProfileUpdate::provided(&update.address))
    .bind(ProfileUpdate::provided(&update.ngo))
    .bind(user_id.to_string())
    .execute(db_pool)
    .await?;

    super::find(db_pool, user_id).await
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_profile(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<User>> {
    let identity = session::identity(&session).await?;
    let identity = require_identity(identity.as_ref())?;

    let user = apply(&db_pool, identity.user_id, &update)
        .await?
        .ok_or_else(|| CoreError::not_found("User not found."))?;

    tracing::info!(user_id = %user.id, "profile updated");
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, identity::Role, users};

    #[tokio::test]
    async fn only_provided_fields_change() {
        let db_pool = db::test_pool().await;
        let user = users::seed(&db_pool, "Ravi", Role::Receiver).await;

        let update = ProfileUpdate {
            contact: Some("555-0101".into()),
            ngo: Some("Food Bank North".into()),
            address: Some("   ".into()),
            ..Default::default()
        };
        let updated = apply(&db_pool, user.id, &update).await.unwrap().unwrap();

        assert_eq!(updated.name, "Ravi");
        assert_eq!(updated.contact, "555-0101");
        assert_eq!(updated.ngo, "Food Bank North");
        assert_eq!(updated.address, "");
    }

    #[tokio::test]
    async fn unknown_user_yields_none() {
        let db_pool = db::test_pool().await;
        let update = ProfileUpdate { name: Some("Ghost".into()), ..Default::default() };
        assert!(apply(&db_pool, Uuid::now_v7(), &update).await.unwrap().is_none());
    }

    #[test]
    fn blank_fields_count_as_absent() {
        assert!(ProfileUpdate::default().is_empty());
        assert!(ProfileUpdate { name: Some(" ".into()), ..Default::default() }.is_empty());
        assert!(!ProfileUpdate { ngo: Some("x".into()), ..Default::default() }.is_empty());
    }
}

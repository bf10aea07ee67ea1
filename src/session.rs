use tower_sessions::Session;
use uuid::Uuid;

use crate::{identity::{Identity, Role}, AppResult};

pub const USER_ID: &str = "user_id";
pub const ROLE: &str = "role";

/// Reads the identity the login route stored. A missing entry is "no identity".
pub async fn identity(session: &Session) -> AppResult<Option<Identity>> {
    let Some(user_id) = session.get::<Uuid>(USER_ID).await? else {
        return Ok(None);
    };
    let Some(role) = session.get::<Role>(ROLE).await? else {
        return Ok(None);
    };

    Ok(Some(Identity::new(user_id, role)))
}

pub async fn start(session: &Session, identity: Identity) -> AppResult<()> {
    session.cycle_id().await?;
    session.insert(USER_ID, identity.user_id).await?;
    session.insert(ROLE, identity.role).await?;
    Ok(())
}

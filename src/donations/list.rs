use axum::{debug_handler, extract::State, Json};
use tower_sessions::Session;

use crate::{identity::{require_role, Role}, session, AppResult};

use super::{Donation, DonationLedger};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn available(
    State(ledger): State<DonationLedger>,
    session: Session,
) -> AppResult<Json<Vec<Donation>>> {
    let identity = session::identity(&session).await?;
    require_role(identity.as_ref(), Role::Receiver, "User not authorized")?;

    Ok(Json(ledger.list_available().await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mine(
    State(ledger): State<DonationLedger>,
    session: Session,
) -> AppResult<Json<Vec<Donation>>> {
    let identity = session::identity(&session).await?;
    let identity = require_role(identity.as_ref(), Role::Donor, "User not authorized")?;

    Ok(Json(ledger.list_owned_by(identity.user_id).await?))
}

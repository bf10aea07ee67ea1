use axum::{debug_handler, extract::State, Json};
use tower_sessions::Session;

use crate::{identity::{require_role, Role}, session, AppResult};

use super::{RequestLedger, RequestView};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mine(
    State(ledger): State<RequestLedger>,
    session: Session,
) -> AppResult<Json<Vec<RequestView>>> {
    let identity = session::identity(&session).await?;
    let identity =
        require_role(identity.as_ref(), Role::Receiver, "Not authorized to view requests.")?;

    Ok(Json(ledger.list_by_receiver(identity.user_id).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn incoming(
    State(ledger): State<RequestLedger>,
    session: Session,
) -> AppResult<Json<Vec<RequestView>>> {
    let identity = session::identity(&session).await?;
    let identity = require_role(
        identity.as_ref(),
        Role::Donor,
        "Not authorized to view incoming requests.",
    )?;

    Ok(Json(ledger.list_by_donor(identity.user_id).await?))
}

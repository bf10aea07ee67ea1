use axum::{debug_handler, extract::State, http::StatusCode, Json};
use tower_sessions::Session;

use crate::{session, AppResult};

use super::{Donation, DonationLedger, NewDonation};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_donation(
    State(ledger): State<DonationLedger>,
    session: Session,
    Json(fields): Json<NewDonation>,
) -> AppResult<(StatusCode, Json<Donation>)> {
    let identity = session::identity(&session).await?;
    let donation = ledger.create_donation(identity.as_ref(), fields).await?;

    Ok((StatusCode::CREATED, Json(donation)))
}

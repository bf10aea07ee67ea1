mod broker;
mod history;
mod msg;
mod ws;

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    error::{CoreError, CoreResult},
    identity::{require_identity, Identity, Role},
    requests, users, AppState,
};

pub use broker::{ChatBroker, ConnectionGuard, ConnectionId};
pub use msg::ChatMessage;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(history::history))
        .route("/{id}/ws", get(ws::chat_ws))
}

/// Who is speaking in a room, as the server determined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Participant {
    pub role: Role,
    pub name: String,
}

/// Only the donor and the receiver on a request may read or write its room.
pub(crate) async fn participant(
    db_pool: &SqlitePool,
    identity: Option<&Identity>,
    request_id: Uuid,
) -> CoreResult<Participant> {
    let identity = require_identity(identity)?;
    let request = requests::find(db_pool, request_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Donation request not found."))?;
    if !request.is_participant(identity.user_id) {
        return Err(CoreError::forbidden("Not authorized to join this chat."));
    }

    let user = users::find(db_pool, identity.user_id)
        .await?
        .ok_or_else(|| CoreError::authorization("User not found."))?;
    let role = if request.donor_user_id == identity.user_id {
        Role::Donor
    } else {
        Role::Receiver
    };

    Ok(Participant { role, name: user.name })
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::{
        db,
        donations::{self, DonationLedger},
        lifecycle::Lifecycle,
        notify::Notifier,
    };

    #[tokio::test]
    async fn only_the_two_parties_are_participants() {
        let db_pool = db::test_pool().await;
        let (notifier, _events) = Notifier::channel(16);
        let donor = users::seed(&db_pool, "Asha", Role::Donor).await;
        let receiver = users::seed(&db_pool, "Ravi", Role::Receiver).await;
        let stranger = users::seed(&db_pool, "Meera", Role::Receiver).await;
        let donor_id = Identity::new(donor.id, donor.role);
        let receiver_id = Identity::new(receiver.id, receiver.role);

        let donation = DonationLedger::new(db_pool.clone(), notifier.clone())
            .create_donation(Some(&donor_id), donations::fields("Rice", Duration::hours(2)))
            .await
            .unwrap();
        let request = Lifecycle::new(db_pool.clone(), notifier)
            .create_request(Some(&receiver_id), donation.id, None)
            .await
            .unwrap();

        let as_donor = participant(&db_pool, Some(&donor_id), request.id).await.unwrap();
        assert_eq!(as_donor, Participant { role: Role::Donor, name: "Asha".into() });

        let as_receiver = participant(&db_pool, Some(&receiver_id), request.id).await.unwrap();
        assert_eq!(as_receiver.role, Role::Receiver);

        let stranger_id = Identity::new(stranger.id, stranger.role);
        let outsider = participant(&db_pool, Some(&stranger_id), request.id).await;
        assert!(matches!(outsider, Err(CoreError::Forbidden(_))));

        let anonymous = participant(&db_pool, None, request.id).await;
        assert!(matches!(anonymous, Err(CoreError::Authorization(_))));

        let missing = participant(&db_pool, Some(&donor_id), Uuid::now_v7()).await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));
    }
}

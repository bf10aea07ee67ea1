//! The donation/request state machine.
//!
//! ```text
//! Donation:  Available --request created--> Requested --request accepted--> Completed
//! Request:   Pending --accept--> Accepted --fulfil--> Fulfilled
//!            Pending --reject--> Rejected
//! ```
//!
//! Every transition runs while holding the lock of the donation involved, and the paired
//! writes (donation + request) go through one SQL transaction whose updates are
//! compare-and-swap on the current status. A lost race or a torn earlier write therefore
//! shows up as a `Conflict`, never as a half-applied transition.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db,
    donations::{self, Donation, DonationStatus},
    error::{CoreError, CoreResult},
    identity::{require_identity, require_role, Identity, Role},
    locks::{KeyGuard, KeyedLocks},
    notify::{EventContext, EventKind, LifecycleEvent, Notifier, Recipient},
    requests::{self, Request, RequestStatus},
    users,
};

#[derive(Debug, Clone)]
pub struct Lifecycle {
    db_pool: SqlitePool,
    notifier: Notifier,
    locks: KeyedLocks,
}

fn unique_violation_as_conflict(err: sqlx::Error) -> CoreError {
    if err.as_database_error().is_some_and(|db_err| db_err.is_unique_violation()) {
        CoreError::conflict("An active request already exists for this donation.")
    } else {
        CoreError::Storage(err)
    }
}

impl Lifecycle {
    pub fn new(db_pool: SqlitePool, notifier: Notifier) -> Self {
        Self {
            db_pool,
            notifier,
            locks: KeyedLocks::default(),
        }
    }

    /// Receiver asks for an available donation. Opens a Pending request and moves the
    /// donation to Requested, both or neither.
    pub async fn create_request(
        &self,
        identity: Option<&Identity>,
        donation_id: Uuid,
        message: Option<String>,
    ) -> CoreResult<Request> {
        const RECEIVERS_ONLY: &str = "Only receivers can request donations.";

        let identity = require_role(identity, Role::Receiver, RECEIVERS_ONLY)?;
        let receiver = users::find(&self.db_pool, identity.user_id)
            .await?
            .ok_or_else(|| CoreError::authorization(RECEIVERS_ONLY))?;

        let _held = self.locks.lock(donation_id).await;

        let donation = donations::find(&self.db_pool, donation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Donation not found."))?;
        if donation.status != DonationStatus::Available {
            return Err(CoreError::conflict("Donation is no longer available."));
        }
        let now = db::now();
        if donation.expiry_time <= now {
            return Err(CoreError::conflict("Donation has expired."));
        }

        let request = Request {
            id: Uuid::now_v7(),
            donation_id,
            receiver_user_id: receiver.id,
            donor_user_id: donation.owner_user_id,
            receiver_name: receiver.name.clone(),
            status: RequestStatus::Pending,
            message: message.map(|m| m.trim().to_owned()).filter(|m| !m.is_empty()),
            created_at: now,
        };

        let mut tx = self.db_pool.begin().await?;
        if !donations::transition(
            &mut *tx,
            donation_id,
            DonationStatus::Available,
            DonationStatus::Requested,
        )
        .await?
        {
            return Err(CoreError::conflict("Donation is no longer available."));
        }
        if requests::has_active(&mut *tx, donation_id).await? {
            return Err(CoreError::conflict(
                "An active request already exists for this donation.",
            ));
        }
        requests::insert(&mut *tx, &request)
            .await
            .map_err(unique_violation_as_conflict)?;
        tx.commit().await?;

        tracing::info!(
            request_id = %request.id,
            %donation_id,
            receiver = %receiver.id,
            "donation requested"
        );

        match users::find(&self.db_pool, donation.owner_user_id).await {
            Ok(Some(donor)) => self.notifier.emit(LifecycleEvent {
                to: Recipient::from(&donor),
                kind: EventKind::RequestCreated,
                context: context(&donation, Some(request.id), Some(receiver.name)),
            }),
            Ok(None) => {
                tracing::warn!(%donation_id, "donor not found, request notification not sent")
            }
            Err(e) => tracing::warn!(
                %donation_id,
                "donor lookup failed, request notification not sent: {e}"
            ),
        }

        Ok(request)
    }

    /// Loads a request and its donation under the donation's lock, checking that the
    /// caller owns the donation.
    async fn load_owned(
        &self,
        identity: &Identity,
        request_id: Uuid,
        denied: &str,
    ) -> CoreResult<(Request, Donation, KeyGuard)> {
        let not_found = || CoreError::not_found("Donation request not found.");

        let request = requests::find(&self.db_pool, request_id).await?.ok_or_else(not_found)?;
        let held = self.locks.lock(request.donation_id).await;

        // re-read: the request may have moved while we waited
        let request = requests::find(&self.db_pool, request_id).await?.ok_or_else(not_found)?;
        let donation = donations::find(&self.db_pool, request.donation_id)
            .await?
            .ok_or_else(|| {
                CoreError::not_found("Associated donation not found for this request.")
            })?;

        if donation.owner_user_id != identity.user_id {
            return Err(CoreError::forbidden(denied));
        }

        Ok((request, donation, held))
    }

    /// Donor accepts a pending request: request -> Accepted and donation -> Completed in
    /// one transaction. The receiver is notified afterwards.
    pub async fn accept_request(
        &self,
        identity: Option<&Identity>,
        request_id: Uuid,
    ) -> CoreResult<Request> {
        let identity = require_identity(identity)?;
        let (request, donation, _held) = self
            .load_owned(identity, request_id, "Not authorized to accept this request.")
            .await?;

        if request.status != RequestStatus::Pending {
            return Err(CoreError::conflict("Request is not in pending status."));
        }
        if donation.status != DonationStatus::Requested {
            return Err(CoreError::conflict("Donation is no longer awaiting acceptance."));
        }

        let mut tx = self.db_pool.begin().await?;
        if !requests::transition(
            &mut *tx,
            request.id,
            RequestStatus::Pending,
            RequestStatus::Accepted,
        )
        .await?
        {
            return Err(CoreError::conflict("Request is not in pending status."));
        }
        if !donations::transition(
            &mut *tx,
            donation.id,
            DonationStatus::Requested,
            DonationStatus::Completed,
        )
        .await?
        {
            return Err(CoreError::conflict("Donation is no longer awaiting acceptance."));
        }
        tx.commit().await?;

        tracing::info!(%request_id, donation_id = %donation.id, "request accepted");

        match users::find(&self.db_pool, request.receiver_user_id).await {
            Ok(Some(receiver)) => self.notifier.emit(LifecycleEvent {
                to: Recipient::from(&receiver),
                kind: EventKind::RequestAccepted,
                context: context(&donation, Some(request.id), Some(donation.donor_name.clone())),
            }),
            Ok(None) => {
                tracing::warn!(%request_id, "receiver not found, acceptance notification not sent")
            }
            Err(e) => tracing::warn!(
                %request_id,
                "receiver lookup failed, acceptance notification not sent: {e}"
            ),
        }

        Ok(Request { status: RequestStatus::Accepted, ..request })
    }

    /// Donor turns down a pending request. The donation stays Requested and is not
    /// re-listed.
    pub async fn reject_request(
        &self,
        identity: Option<&Identity>,
        request_id: Uuid,
    ) -> CoreResult<Request> {
        let identity = require_identity(identity)?;
        let (request, donation, _held) = self
            .load_owned(identity, request_id, "Not authorized to reject this request.")
            .await?;

        if request.status != RequestStatus::Pending {
            return Err(CoreError::conflict("Request is not in pending status."));
        }
        if donation.status != DonationStatus::Requested {
            return Err(CoreError::conflict("Donation is no longer awaiting acceptance."));
        }

        if !requests::transition(
            &self.db_pool,
            request.id,
            RequestStatus::Pending,
            RequestStatus::Rejected,
        )
        .await?
        {
            return Err(CoreError::conflict("Request is not in pending status."));
        }

        tracing::info!(%request_id, donation_id = %donation.id, "request rejected");
        Ok(Request { status: RequestStatus::Rejected, ..request })
    }

    /// Either party confirms pickup of an accepted request. Repeating it is a no-op.
    pub async fn fulfill_request(
        &self,
        identity: Option<&Identity>,
        request_id: Uuid,
    ) -> CoreResult<Request> {
        let identity = require_identity(identity)?;
        let not_found = || CoreError::not_found("Donation request not found.");

        let request = requests::find(&self.db_pool, request_id).await?.ok_or_else(not_found)?;
        let _held = self.locks.lock(request.donation_id).await;
        let request = requests::find(&self.db_pool, request_id).await?.ok_or_else(not_found)?;

        if !request.is_participant(identity.user_id) {
            return Err(CoreError::forbidden("Not authorized to fulfil this request."));
        }

        match request.status {
            RequestStatus::Fulfilled => Ok(request),
            RequestStatus::Accepted => {
                if !requests::transition(
                    &self.db_pool,
                    request.id,
                    RequestStatus::Accepted,
                    RequestStatus::Fulfilled,
                )
                .await?
                {
                    return Err(CoreError::conflict("Request is not in accepted status."));
                }
                tracing::info!(%request_id, "request fulfilled");
                Ok(Request { status: RequestStatus::Fulfilled, ..request })
            }
            RequestStatus::Pending | RequestStatus::Rejected => {
                Err(CoreError::conflict("Request has not been accepted."))
            }
        }
    }
}

fn context(
    donation: &Donation,
    request_id: Option<Uuid>,
    counterpart: Option<String>,
) -> EventContext {
    EventContext {
        donation_id: donation.id,
        request_id,
        food_type: donation.food_type.clone(),
        quantity: donation.quantity.clone(),
        counterpart,
    }
}

use sqlx::{Sqlite, SqlitePool};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::{
    db,
    error::{CoreError, CoreResult},
    identity::{require_role, Identity, Role},
    notify::{EventContext, EventKind, LifecycleEvent, Notifier, Recipient},
    users,
};

use super::{Donation, DonationRow, DonationStatus, NewDonation, DONATION_COLUMNS};

/// Posting and listing of donations. Status changes after posting go through
/// [`Lifecycle`](crate::lifecycle::Lifecycle).
#[derive(Debug, Clone)]
pub struct DonationLedger {
    db_pool: SqlitePool,
    notifier: Notifier,
}

#[derive(Debug)]
struct Validated {
    food_type: String,
    quantity: String,
    location: String,
    expiry_time: OffsetDateTime,
}

fn required(field: Option<String>) -> Option<String> {
    field.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

impl NewDonation {
    fn validate(&mut self, now: OffsetDateTime) -> CoreResult<Validated> {
        let (Some(food_type), Some(quantity), Some(location), Some(expiry_time)) = (
            required(self.food_type.take()),
            required(self.quantity.take()),
            required(self.location.take()),
            required(self.expiry_time.take()),
        ) else {
            return Err(CoreError::validation(
                "Please provide all required fields (type, quantity, location, and expiry time).",
            ));
        };

        let expiry_time = OffsetDateTime::parse(&expiry_time, &Rfc3339)
            .map(db::truncate_millis)
            .map_err(|_| CoreError::validation("Expiry time must be an RFC 3339 timestamp."))?;
        // compared at stored precision
        if expiry_time <= now {
            return Err(CoreError::validation("Expiry time must be a date in the future."));
        }

        Ok(Validated { food_type, quantity, location, expiry_time })
    }
}

impl DonationLedger {
    pub fn new(db_pool: SqlitePool, notifier: Notifier) -> Self {
        Self { db_pool, notifier }
    }

    pub async fn create_donation(
        &self,
        identity: Option<&Identity>,
        mut fields: NewDonation,
    ) -> CoreResult<Donation> {
        const DONORS_ONLY: &str = "Only donors are authorized to post donations.";

        let identity = require_role(identity, Role::Donor, DONORS_ONLY)?;
        let now = db::now();
        let Validated { food_type, quantity, location, expiry_time } = fields.validate(now)?;

        let owner = users::find(&self.db_pool, identity.user_id)
            .await?
            .ok_or_else(|| CoreError::authorization(DONORS_ONLY))?;

        let donation = Donation {
            id: Uuid::now_v7(),
            owner_user_id: owner.id,
            donor_name: owner.name.clone(),
            food_type,
            quantity,
            location,
            expiry_time,
            latitude: fields.latitude,
            longitude: fields.longitude,
            photo: fields.photo.unwrap_or_default(),
            status: DonationStatus::Available,
            created_at: now,
        };
        insert(&self.db_pool, &donation).await?;

        tracing::info!(
            donation_id = %donation.id,
            owner = %owner.id,
            food_type = %donation.food_type,
            "donation posted"
        );
        self.notifier.emit(LifecycleEvent {
            to: Recipient::from(&owner),
            kind: EventKind::DonationPosted,
            context: EventContext {
                donation_id: donation.id,
                request_id: None,
                food_type: donation.food_type.clone(),
                quantity: donation.quantity.clone(),
                counterpart: None,
            },
        });

        Ok(donation)
    }

    /// Available and not yet expired, newest first. Expiry is judged at read time.
    pub async fn list_available(&self) -> CoreResult<Vec<Donation>> {
        self.list_available_at(OffsetDateTime::now_utc()).await
    }

    pub async fn list_available_at(&self, now: OffsetDateTime) -> CoreResult<Vec<Donation>> {
        let rows = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations \
             WHERE status=? AND expiry_time>? ORDER BY created_at DESC, id DESC"
        ))
        .bind(DonationStatus::Available.as_str())
        .bind(db::to_millis(now))
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(Donation::try_from).collect::<Result<_, _>>()?)
    }

    /// Every donation the user ever posted, newest first.
    pub async fn list_owned_by(&self, user_id: Uuid) -> CoreResult<Vec<Donation>> {
        let rows = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations \
             WHERE owner_user_id=? ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(Donation::try_from).collect::<Result<_, _>>()?)
    }
}

pub(crate) async fn insert<'e, E>(conn: E, donation: &Donation) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!(
        "INSERT INTO donations ({DONATION_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?)"
    ))
    .bind(donation.id.to_string())
    .bind(donation.owner_user_id.to_string())
    .bind(&donation.donor_name)
    .bind(&donation.food_type)
    .bind(&donation.quantity)
    .bind(&donation.location)
    .bind(db::to_millis(donation.expiry_time))
    .bind(donation.latitude)
    .bind(donation.longitude)
    .bind(&donation.photo)
    .bind(donation.status.as_str())
    .bind(db::to_millis(donation.created_at))
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn find<'e, E>(conn: E, id: Uuid) -> Result<Option<Donation>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, DonationRow>(&format!(
        "SELECT {DONATION_COLUMNS} FROM donations WHERE id=?"
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?
    .map(Donation::try_from)
    .transpose()
}

/// Compare-and-swap on the status column. Returns false when the donation was not in `from`.
pub(crate) async fn transition<'e, E>(
    conn: E,
    id: Uuid,
    from: DonationStatus,
    to: DonationStatus,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    debug_assert!(from < to, "donation status never moves backwards");

    let result = sqlx::query("UPDATE donations SET status=? WHERE id=? AND status=?")
        .bind(to.as_str())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
pub(crate) fn fields(food_type: &str, expires_in: time::Duration) -> NewDonation {
    NewDonation {
        food_type: Some(food_type.to_owned()),
        quantity: Some("5kg".to_owned()),
        location: Some("Community Hall".to_owned()),
        expiry_time: Some((OffsetDateTime::now_utc() + expires_in).format(&Rfc3339).unwrap()),
        ..Default::default()
    }
}

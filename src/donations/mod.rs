mod ledger;
mod list;
mod new;

use std::str::FromStr;

use axum::{routing::{get, post}, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db, AppState};

pub use ledger::DonationLedger;
pub(crate) use ledger::{find, transition};
#[cfg(test)]
pub(crate) use ledger::{fields, insert};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(new::create_donation))
        .route("/available", get(list::available))
        .route("/me", get(list::mine))
}

/// Declared in lifecycle order; a donation's status only ever compares greater over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DonationStatus {
    Available,
    Requested,
    /// Never entered: acceptance is tracked on the request and the donation goes
    /// straight to `Completed`.
    Accepted,
    Completed,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Available => "Available",
            DonationStatus::Requested => "Requested",
            DonationStatus::Accepted => "Accepted",
            DonationStatus::Completed => "Completed",
        }
    }
}

impl FromStr for DonationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(DonationStatus::Available),
            "Requested" => Ok(DonationStatus::Requested),
            "Accepted" => Ok(DonationStatus::Accepted),
            "Completed" => Ok(DonationStatus::Completed),
            other => Err(format!("unknown donation status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub donor_name: String,
    pub food_type: String,
    pub quantity: String,
    pub location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry_time: OffsetDateTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo: String,
    pub status: DonationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct DonationRow {
    id: String,
    owner_user_id: String,
    donor_name: String,
    food_type: String,
    quantity: String,
    location: String,
    expiry_time: i64,
    latitude: Option<f64>,
    longitude: Option<f64>,
    photo: String,
    status: String,
    created_at: i64,
}

impl TryFrom<DonationRow> for Donation {
    type Error = sqlx::Error;

    fn try_from(row: DonationRow) -> Result<Self, Self::Error> {
        Ok(Donation {
            id: db::parse_id(&row.id)?,
            owner_user_id: db::parse_id(&row.owner_user_id)?,
            donor_name: row.donor_name,
            food_type: row.food_type,
            quantity: row.quantity,
            location: row.location,
            expiry_time: db::from_millis(row.expiry_time)?,
            latitude: row.latitude,
            longitude: row.longitude,
            photo: row.photo,
            status: db::parse_column(&row.status)?,
            created_at: db::from_millis(row.created_at)?,
        })
    }
}

pub(crate) const DONATION_COLUMNS: &str = "id,owner_user_id,donor_name,food_type,quantity,location,\
     expiry_time,latitude,longitude,photo,status,created_at";

/// Body of `POST /api/donations`. Everything is optional here so that a missing field is a
/// validation failure rather than a deserialization one.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDonation {
    pub food_type: Option<String>,
    pub quantity: Option<String>,
    pub location: Option<String>,
    /// RFC 3339.
    pub expiry_time: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo: Option<String>,
}

mod decide;
mod ledger;
mod list;
mod new;

use std::str::FromStr;

use axum::{routing::{get, post, put}, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db, donations::Donation, AppState};

pub use ledger::RequestLedger;
pub(crate) use ledger::{exists, find, has_active, insert, transition};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(list::mine))
        .route("/incoming", get(list::incoming))
        // POST takes a donation id, the PUTs a request id
        .route("/{id}", post(new::create_request))
        .route("/{id}/accept", put(decide::accept))
        .route("/{id}/reject", put(decide::reject))
        .route("/{id}/fulfill", put(decide::fulfill))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Fulfilled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Accepted => "Accepted",
            RequestStatus::Rejected => "Rejected",
            RequestStatus::Fulfilled => "Fulfilled",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RequestStatus::Pending),
            "Accepted" => Ok(RequestStatus::Accepted),
            "Rejected" => Ok(RequestStatus::Rejected),
            "Fulfilled" => Ok(RequestStatus::Fulfilled),
            other => Err(format!("unknown request status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: Uuid,
    pub donation_id: Uuid,
    pub receiver_user_id: Uuid,
    pub donor_user_id: Uuid,
    pub receiver_name: String,
    pub status: RequestStatus,
    pub message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Request {
    /// Donor or receiver on this request.
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.donor_user_id == user_id || self.receiver_user_id == user_id
    }
}

/// A request joined with the donation it refers to, for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(flatten)]
    pub request: Request,
    pub donation: Donation,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RequestRow {
    id: String,
    donation_id: String,
    receiver_user_id: String,
    donor_user_id: String,
    receiver_name: String,
    status: String,
    message: Option<String>,
    created_at: i64,
}

impl TryFrom<RequestRow> for Request {
    type Error = sqlx::Error;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(Request {
            id: db::parse_id(&row.id)?,
            donation_id: db::parse_id(&row.donation_id)?,
            receiver_user_id: db::parse_id(&row.receiver_user_id)?,
            donor_user_id: db::parse_id(&row.donor_user_id)?,
            receiver_name: row.receiver_name,
            status: db::parse_column(&row.status)?,
            message: row.message,
            created_at: db::from_millis(row.created_at)?,
        })
    }
}

pub(crate) const REQUEST_COLUMNS: &str =
    "id,donation_id,receiver_user_id,donor_user_id,receiver_name,status,message,created_at";

#[derive(Debug, Default, Deserialize)]
pub struct NewRequest {
    pub message: Option<String>,
}

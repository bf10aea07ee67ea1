use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    db, donations,
    error::CoreResult,
};

use super::{Request, RequestRow, RequestStatus, RequestView, REQUEST_COLUMNS};

/// Read side of the request records. Every status change lives in
/// [`Lifecycle`](crate::lifecycle::Lifecycle).
#[derive(Debug, Clone)]
pub struct RequestLedger {
    db_pool: SqlitePool,
}

impl RequestLedger {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Requests the receiver has made, newest first.
    pub async fn list_by_receiver(&self, user_id: Uuid) -> CoreResult<Vec<RequestView>> {
        self.list_where("receiver_user_id", user_id).await
    }

    /// Requests made against the donor's donations, newest first.
    pub async fn list_by_donor(&self, user_id: Uuid) -> CoreResult<Vec<RequestView>> {
        self.list_where("donor_user_id", user_id).await
    }

    async fn list_where(
        &self,
        column: &'static str,
        user_id: Uuid,
    ) -> CoreResult<Vec<RequestView>> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests \
             WHERE {column}=? ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            let request = Request::try_from(row)?;
            let Some(donation) = donations::find(&self.db_pool, request.donation_id).await? else {
                tracing::warn!(
                    request_id = %request.id,
                    donation_id = %request.donation_id,
                    "request without donation"
                );
                continue;
            };
            views.push(RequestView { request, donation });
        }

        Ok(views)
    }
}

pub(crate) async fn insert<'e, E>(conn: E, request: &Request) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!("INSERT INTO requests ({REQUEST_COLUMNS}) VALUES (?,?,?,?,?,?,?,?)"))
        .bind(request.id.to_string())
        .bind(request.donation_id.to_string())
        .bind(request.receiver_user_id.to_string())
        .bind(request.donor_user_id.to_string())
        .bind(&request.receiver_name)
        .bind(request.status.as_str())
        .bind(&request.message)
        .bind(db::to_millis(request.created_at))
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn find<'e, E>(conn: E, id: Uuid) -> Result<Option<Request>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, RequestRow>(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id=?"))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?
        .map(Request::try_from)
        .transpose()
}

pub(crate) async fn exists(db_pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    Ok(sqlx::query("SELECT 1 FROM requests WHERE id=?")
        .bind(id.to_string())
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

/// Whether the donation has a Pending or Accepted request.
pub(crate) async fn has_active<'e, E>(conn: E, donation_id: Uuid) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query("SELECT 1 FROM requests WHERE donation_id=? AND status IN (?,?) LIMIT 1")
        .bind(donation_id.to_string())
        .bind(RequestStatus::Pending.as_str())
        .bind(RequestStatus::Accepted.as_str())
        .fetch_optional(conn)
        .await?
        .is_some())
}

/// Compare-and-swap on the status column. Returns false when the request was not in `from`.
pub(crate) async fn transition<'e, E>(
    conn: E,
    id: Uuid,
    from: RequestStatus,
    to: RequestStatus,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE requests SET status=? WHERE id=? AND status=?")
        .bind(to.as_str())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

mod me;
mod update;

use axum::{routing::{get, put}, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db, identity::Role, notify::Recipient, AppState};

pub use update::ProfileUpdate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me::me))
        .route("/profile", put(update::update_profile))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub contact: String,
    pub address: String,
    pub ngo: String,
}

impl User {
    pub fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            id: Uuid::now_v7(),
            name,
            email,
            password_hash,
            role,
            contact: String::new(),
            address: String::new(),
            ngo: String::new(),
        }
    }
}

impl From<&User> for Recipient {
    fn from(user: &User) -> Self {
        Recipient {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    contact: String,
    address: String,
    ngo: String,
}

impl TryFrom<UserRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: db::parse_id(&row.id)?,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: db::parse_column(&row.role)?,
            contact: row.contact,
            address: row.address,
            ngo: row.ngo,
        })
    }
}

const USER_COLUMNS: &str = "id,name,email,password_hash,role,contact,address,ngo";

pub(crate) async fn find(db_pool: &SqlitePool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id=?"))
        .bind(id.to_string())
        .fetch_optional(db_pool)
        .await?
        .map(User::try_from)
        .transpose()
}

pub(crate) async fn find_by_email(
    db_pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email=?"))
        .bind(email)
        .fetch_optional(db_pool)
        .await?
        .map(User::try_from)
        .transpose()
}

pub(crate) async fn insert(db_pool: &SqlitePool, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id,name,email,password_hash,role,contact,address,ngo) \
         VALUES (?,?,?,?,?,?,?,?)",
    )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.contact)
        .bind(&user.address)
        .bind(&user.ngo)
        .execute(db_pool)
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn seed(db_pool: &SqlitePool, name: &str, role: Role) -> User {
    let user = User::new(
        name.to_owned(),
        format!("{}@example.org", name.to_lowercase().replace(' ', ".")),
        "not-a-real-hash".to_owned(),
        role,
    );
    insert(db_pool, &user).await.unwrap();
    user
}

mod login;
mod logout;
mod signup;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{routing::post, Router};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    error::CoreError,
    identity::Role,
    users::{self, User},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::signup))
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
}

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

const INVALID_CREDENTIALS: &str = "Invalid credentials";

fn provided(field: Option<String>) -> Option<String> {
    field.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| anyhow::anyhow!("could not encode salt: {e}"))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("could not hash password: {e}"))?;
    Ok(hash.to_string())
}

pub(crate) fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .is_ok_and(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// Creates the account. The password is hashed off the async workers.
pub async fn register(db_pool: &SqlitePool, form: SignupForm) -> anyhow::Result<User> {
    let (Some(name), Some(email), Some(password), Some(role)) = (
        provided(form.name),
        provided(form.email),
        form.password.filter(|p| !p.is_empty()),
        provided(form.role),
    ) else {
        return Err(CoreError::validation("Please provide name, email, password and role.").into());
    };
    let role: Role = role
        .to_lowercase()
        .parse()
        .map_err(|_| CoreError::validation("Role must be donor or receiver."))?;
    let email = normalize_email(&email);

    if users::find_by_email(db_pool, &email).await?.is_some() {
        return Err(CoreError::conflict("User already exists").into());
    }

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    let user = User::new(name, email, password_hash, role);

    match users::insert(db_pool, &user).await {
        Ok(()) => {}
        Err(e) if e.as_database_error().is_some_and(|db_err| db_err.is_unique_violation()) => {
            return Err(CoreError::conflict("User already exists").into());
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");
    Ok(user)
}

/// Checks the credentials. Unknown email and wrong password fail the same way.
pub async fn authenticate(db_pool: &SqlitePool, form: LoginForm) -> anyhow::Result<User> {
    let (Some(email), Some(password)) = (provided(form.email), form.password) else {
        return Err(CoreError::validation(INVALID_CREDENTIALS).into());
    };

    let Some(user) = users::find_by_email(db_pool, &normalize_email(&email)).await? else {
        return Err(CoreError::validation(INVALID_CREDENTIALS).into());
    };

    let hash = user.password_hash.clone();
    if !tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await? {
        tracing::debug!(user_id = %user.id, "wrong password");
        return Err(CoreError::validation(INVALID_CREDENTIALS).into());
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn signup(name: &str, email: &str, role: &str) -> SignupForm {
        SignupForm {
            name: Some(name.into()),
            email: Some(email.into()),
            password: Some("hunter22".into()),
            role: Some(role.into()),
        }
    }

    fn core(err: &anyhow::Error) -> &CoreError {
        err.downcast_ref::<CoreError>().unwrap()
    }

    #[test]
    fn hashes_verify_only_their_password() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
        assert_ne!(hash, hash_password("hunter22").unwrap());
    }

    #[tokio::test]
    async fn register_then_login() {
        let db_pool = db::test_pool().await;
        let user = register(&db_pool, signup("Asha", " Asha@Example.org ", "Donor")).await.unwrap();
        assert_eq!(user.email, "asha@example.org");
        assert_eq!(user.role, Role::Donor);

        let form = LoginForm {
            email: Some("asha@example.org".into()),
            password: Some("hunter22".into()),
        };
        assert_eq!(authenticate(&db_pool, form).await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db_pool = db::test_pool().await;
        register(&db_pool, signup("Asha", "asha@example.org", "donor")).await.unwrap();

        let again = signup("Asha Two", "ASHA@example.org", "receiver");
        let err = register(&db_pool, again).await.unwrap_err();
        assert!(matches!(core(&err), CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn signup_validates_its_fields() {
        let db_pool = db::test_pool().await;

        let mut missing = signup("Asha", "asha@example.org", "donor");
        missing.password = None;
        let err = register(&db_pool, missing).await.unwrap_err();
        assert!(matches!(core(&err), CoreError::Validation(_)));

        let admin = signup("Asha", "asha@example.org", "admin");
        let err = register(&db_pool, admin).await.unwrap_err();
        assert!(matches!(core(&err), CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_credentials_look_alike() {
        let db_pool = db::test_pool().await;
        register(&db_pool, signup("Asha", "asha@example.org", "donor")).await.unwrap();

        let attempts = [("asha@example.org", "wrong"), ("nobody@example.org", "hunter22")];
        for (email, password) in attempts {
            let form = LoginForm { email: Some(email.into()), password: Some(password.into()) };
            let err = authenticate(&db_pool, form).await.unwrap_err();
            assert_eq!(err.to_string(), INVALID_CREDENTIALS);
        }
    }
}

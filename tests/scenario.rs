use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sharebite::{
    auth::{self, SignupForm},
    config::Config,
    db,
    donations::{DonationStatus, NewDonation},
    error::CoreError,
    identity::{Identity, Role},
    notify::{EventKind, Notifier},
    requests::RequestStatus,
    AppState,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tower::ServiceExt;

fn in_two_hours() -> String {
    (OffsetDateTime::now_utc() + Duration::hours(2)).format(&Rfc3339).unwrap()
}

async fn memory_pool() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::migrate(&db_pool).await.unwrap();
    db_pool
}

async fn signup(db_pool: &SqlitePool, name: &str, role: &str) -> Identity {
    let user = auth::register(
        db_pool,
        SignupForm {
            name: Some(name.into()),
            email: Some(format!("{}@example.org", name.to_lowercase())),
            password: Some("correct horse".into()),
            role: Some(role.into()),
        },
    )
    .await
    .unwrap();
    Identity::new(user.id, user.role)
}

#[tokio::test]
async fn rice_from_post_to_pickup() {
    let db_pool = memory_pool().await;
    let (notifier, mut events) = Notifier::channel(32);
    let state = AppState::new(db_pool.clone(), notifier);

    let donor = signup(&db_pool, "Asha", "donor").await;
    let receiver = signup(&db_pool, "Ravi", "receiver").await;

    let rice = state
        .donations
        .create_donation(
            Some(&donor),
            NewDonation {
                food_type: Some("Rice".into()),
                quantity: Some("5kg".into()),
                location: Some("Community Hall".into()),
                expiry_time: Some(in_two_hours()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rice.status, DonationStatus::Available);
    assert_eq!(events.recv().await.unwrap().kind, EventKind::DonationPosted);

    let listed = state.donations.list_available().await.unwrap();
    assert_eq!(listed.iter().map(|d| d.id).collect::<Vec<_>>(), [rice.id]);

    let request = state
        .lifecycle
        .create_request(Some(&receiver), rice.id, Some("Can pick up at 6".into()))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert!(state.donations.list_available().await.unwrap().is_empty());
    let created = events.recv().await.unwrap();
    assert_eq!(created.kind, EventKind::RequestCreated);
    assert_eq!(created.to.user_id, donor.user_id);

    let incoming = state.requests.list_by_donor(donor.user_id).await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].donation.status, DonationStatus::Requested);

    let accepted = state.lifecycle.accept_request(Some(&donor), request.id).await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    let notified = events.recv().await.unwrap();
    assert_eq!(notified.kind, EventKind::RequestAccepted);
    assert_eq!(notified.to.user_id, receiver.user_id);

    let history = state.donations.list_owned_by(donor.user_id).await.unwrap();
    assert_eq!(history[0].status, DonationStatus::Completed);

    let again = state.lifecycle.accept_request(Some(&donor), request.id).await;
    assert!(matches!(again, Err(CoreError::Conflict(_))));

    let (receiver_conn, mut receiver_rx) = state.broker.connect();
    state.broker.join(receiver_conn.id(), request.id).unwrap();
    state.broker.send(request.id, Role::Donor, "Asha", "See you at 6").await.unwrap();
    state.broker.send(request.id, Role::Receiver, "Ravi", "On my way").await.unwrap();
    assert_eq!(receiver_rx.recv().await.unwrap().text, "See you at 6");
    assert_eq!(receiver_rx.recv().await.unwrap().text, "On my way");

    let transcript = state.broker.history(request.id).await.unwrap();
    assert_eq!(
        transcript.iter().map(|m| (m.sender_role, m.text.as_str())).collect::<Vec<_>>(),
        [(Role::Donor, "See you at 6"), (Role::Receiver, "On my way")]
    );

    let fulfilled = state.lifecycle.fulfill_request(Some(&receiver), request.id).await.unwrap();
    assert_eq!(fulfilled.status, RequestStatus::Fulfilled);
    drop(receiver_conn);
    assert_eq!(state.broker.room_size(request.id), 0);
}

#[tokio::test]
async fn router_builds_with_the_default_config() {
    let db_pool = memory_pool().await;
    let (notifier, _events) = Notifier::channel(1);
    let config = Config::from_lookup(|_| None).unwrap();

    sharebite::app(AppState::new(db_pool, notifier), &config).unwrap();
}

#[tokio::test]
async fn a_bad_origin_is_a_startup_error() {
    let db_pool = memory_pool().await;
    let (notifier, _events) = Notifier::channel(1);
    let config = Config::from_lookup(|key| {
        (key == "FRONTEND_URLS").then(|| "http://ok.example,bad\norigin".to_owned())
    })
    .unwrap();

    assert!(sharebite::app(AppState::new(db_pool, notifier), &config).is_err());
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    payload: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let request = match payload {
        Some(payload) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::to_owned);
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, set_cookie, json)
}

async fn log_in_as(app: &Router, name: &str, role: &str) -> String {
    let email = format!("{}@example.org", name.to_lowercase());
    let signup = json!({ "name": name, "email": email, "password": "correct horse", "role": role });
    let (status, _, _) = call(app, Method::POST, "/api/auth/signup", None, Some(signup)).await;
    assert_eq!(status, StatusCode::CREATED);

    let login = json!({ "email": email, "password": "correct horse" });
    let (status, cookie, user) =
        call(app, Method::POST, "/api/auth/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["name"], name);
    cookie.expect("login sets a session cookie")
}

#[tokio::test]
async fn http_routes_enforce_sessions_and_chat_membership() {
    let db_pool = memory_pool().await;
    let (notifier, _events) = Notifier::channel(32);
    let config = Config::from_lookup(|_| None).unwrap();
    let app = sharebite::app(AppState::new(db_pool, notifier), &config).unwrap();

    let (status, _, body) =
        call(&app, Method::GET, "/api/donations/available", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["msg"].is_string());

    let donor = log_in_as(&app, "Asha", "donor").await;
    let receiver = log_in_as(&app, "Ravi", "receiver").await;
    let stranger = log_in_as(&app, "Meera", "receiver").await;

    let rice = json!({
        "foodType": "Rice",
        "quantity": "5kg",
        "location": "Community Hall",
        "expiryTime": in_two_hours(),
    });
    let (status, _, donation) =
        call(&app, Method::POST, "/api/donations", Some(donor.as_str()), Some(rice)).await;
    assert_eq!(status, StatusCode::CREATED);
    let donation_id = donation["id"].as_str().unwrap().to_owned();

    // no body at all is a request without a message
    let uri = format!("/api/requests/{donation_id}");
    let (status, _, request) = call(&app, Method::POST, &uri, Some(receiver.as_str()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "Pending");
    let request_id = request["id"].as_str().unwrap().to_owned();

    let ws = format!("/api/chat/{request_id}/ws");
    let (status, _, _) = call(&app, Method::GET, &ws, Some(stranger.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _, _) = call(&app, Method::GET, &ws, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // a participant gets past the membership check; only the upgrade itself is missing
    let (status, _, _) = call(&app, Method::GET, &ws, Some(receiver.as_str()), None).await;
    assert!(status.is_client_error());
    assert_ne!(status, StatusCode::FORBIDDEN);
    assert_ne!(status, StatusCode::UNAUTHORIZED);

    let history = format!("/api/chat/{request_id}");
    let (status, _, transcript) =
        call(&app, Method::GET, &history, Some(donor.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transcript, json!([]));
    let (status, _, _) = call(&app, Method::GET, &history, Some(stranger.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

mod common;

use common::{spawn_app, TestApp, PASSWORD};
use serde_json::{json, Value};

fn refresh_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .map(|v| v.to_string())
}

fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .trim_start_matches("refresh_token=")
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string()
}

async fn post_json(app: &TestApp, path: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(&format!("{}{}", app.address, path))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.")
}

async fn refresh_with_cookie(app: &TestApp, token: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(&format!("{}/auth/refresh-token", app.address))
        .header("Cookie", format!("refresh_token={}", token))
        .send()
        .await
        .expect("Failed to execute request.")
}

async fn signup(app: &TestApp, email: &str) -> reqwest::Response {
    post_json(
        app,
        "/auth/signup",
        json!({ "email": email, "password": PASSWORD, "username": "John Doe" }),
    )
    .await
}

async fn signup_and_verify(app: &TestApp, email: &str) {
    assert_eq!(201, signup(app, email).await.status().as_u16());
    let code = app.notifier.last_code_for(email);
    let response = post_json(app, "/auth/verify", json!({ "email": email, "code": code })).await;
    assert_eq!(200, response.status().as_u16());
}

/// Returns (access token, refresh token)
async fn login(app: &TestApp, email: &str) -> (String, String) {
    let response = post_json(
        app,
        "/auth/login",
        json!({ "email": email, "password": PASSWORD }),
    )
    .await;
    assert_eq!(200, response.status().as_u16());

    let cookie = refresh_cookie(&response).expect("Login did not set the refresh cookie");
    let body: Value = response.json().await.expect("Failed to parse response");
    (
        body["access_token"].as_str().unwrap().to_string(),
        cookie_value(&cookie),
    )
}

async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("Failed to parse error body");
    body["code"].as_str().unwrap_or_default().to_string()
}

// --- Signup & verification ---

#[tokio::test]
async fn signup_returns_201_and_sends_a_code() {
    let app = spawn_app();

    let response = signup(&app, "john@example.com").await;

    assert_eq!(201, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "john@example.com");
    assert_eq!(body["active"], false);
    assert!(body.get("password_hash").is_none());
    assert!(body.get("password").is_none());

    let sent = app.notifier.sent_to("john@example.com");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Account Verification");
}

#[tokio::test]
async fn signup_with_taken_email_returns_409() {
    let app = spawn_app();
    signup(&app, "john@example.com").await;

    let response = signup(&app, "John@Example.com").await;

    assert_eq!(409, response.status().as_u16());
    assert_eq!(error_code(response).await, "EMAIL_ALREADY_EXISTS");
}

#[tokio::test]
async fn signup_rejects_invalid_input() {
    let app = spawn_app();
    let cases = vec![
        (json!({ "email": "not-an-email", "password": PASSWORD, "username": "x" }), "bad email"),
        (json!({ "email": "a@example.com", "password": "123", "username": "x" }), "short password"),
        (json!({ "email": "a@example.com", "password": PASSWORD, "username": "" }), "empty username"),
    ];

    for (body, description) in cases {
        let response = post_json(&app, "/auth/signup", body).await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "Signup did not fail with 400 for {}",
            description
        );
    }
    assert!(app.notifier.sent_to("a@example.com").is_empty());
}

#[tokio::test]
async fn verify_with_wrong_code_returns_400() {
    let app = spawn_app();
    signup(&app, "john@example.com").await;
    let code = app.notifier.last_code_for("john@example.com");
    let wrong = if code == "123456" { "654321" } else { "123456" };

    let response = post_json(
        &app,
        "/auth/verify",
        json!({ "email": "john@example.com", "code": wrong }),
    )
    .await;

    assert_eq!(400, response.status().as_u16());
    assert_eq!(error_code(response).await, "INVALID_CODE");
}

#[tokio::test]
async fn resend_for_verified_account_returns_409() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;

    let response = reqwest::Client::new()
        .post(&format!(
            "{}/auth/resend?email={}",
            app.address,
            urlencoding::encode("john@example.com")
        ))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(409, response.status().as_u16());
    assert_eq!(error_code(response).await, "ALREADY_VERIFIED");
    assert_eq!(app.notifier.sent_to("john@example.com").len(), 1);
}

#[tokio::test]
async fn resend_sends_a_new_code() {
    let app = spawn_app();
    signup(&app, "john@example.com").await;

    let response = reqwest::Client::new()
        .post(&format!(
            "{}/auth/resend?email={}",
            app.address,
            urlencoding::encode("john@example.com")
        ))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    assert_eq!(app.notifier.sent_to("john@example.com").len(), 2);
}

// --- Login ---

#[tokio::test]
async fn login_before_verification_returns_403() {
    let app = spawn_app();
    signup(&app, "john@example.com").await;

    let response = post_json(
        &app,
        "/auth/login",
        json!({ "email": "john@example.com", "password": PASSWORD }),
    )
    .await;

    assert_eq!(403, response.status().as_u16());
    assert_eq!(error_code(response).await, "USER_NOT_VERIFIED");
}

#[tokio::test]
async fn login_with_wrong_password_returns_401() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;

    let response = post_json(
        &app,
        "/auth/login",
        json!({ "email": "john@example.com", "password": "WrongPass123" }),
    )
    .await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "BAD_CREDENTIALS");
}

#[tokio::test]
async fn login_for_unknown_email_returns_404() {
    let app = spawn_app();

    let response = post_json(
        &app,
        "/auth/login",
        json!({ "email": "ghost@example.com", "password": PASSWORD }),
    )
    .await;

    assert_eq!(404, response.status().as_u16());
    assert_eq!(error_code(response).await, "USER_NOT_FOUND");
}

#[tokio::test]
async fn login_sets_refresh_cookie_and_keeps_it_out_of_the_body() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;

    let response = post_json(
        &app,
        "/auth/login",
        json!({ "email": "john@example.com", "password": PASSWORD }),
    )
    .await;
    assert_eq!(200, response.status().as_u16());

    let cookie = refresh_cookie(&response).expect("No refresh cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=604800"));

    let body: Value = response.json().await.unwrap();
    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_none());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
}

// --- Refresh rotation ---

#[tokio::test]
async fn refresh_rotates_the_cookie() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;
    let (_, refresh_token) = login(&app, "john@example.com").await;

    let response = refresh_with_cookie(&app, &refresh_token).await;

    assert_eq!(200, response.status().as_u16());
    let rotated = cookie_value(&refresh_cookie(&response).expect("No rotated cookie"));
    assert_ne!(rotated, refresh_token);
    let body: Value = response.json().await.unwrap();
    assert!(body.get("access_token").is_some());
}

#[tokio::test]
async fn refresh_accepts_token_in_json_body() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;
    let (_, refresh_token) = login(&app, "john@example.com").await;

    let response = post_json(
        &app,
        "/auth/refresh-token",
        json!({ "refresh_token": refresh_token }),
    )
    .await;

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn replayed_refresh_token_returns_401_and_ends_all_sessions() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;
    let (_, original) = login(&app, "john@example.com").await;

    let response = refresh_with_cookie(&app, &original).await;
    let rotated = cookie_value(&refresh_cookie(&response).unwrap());

    let replay = refresh_with_cookie(&app, &original).await;
    assert_eq!(401, replay.status().as_u16());
    assert_eq!(error_code(replay).await, "TOKEN_REUSED");

    // the legitimately rotated token died with the family
    let after = refresh_with_cookie(&app, &rotated).await;
    assert_eq!(401, after.status().as_u16());
    assert_eq!(error_code(after).await, "TOKEN_REUSED");
}

#[tokio::test]
async fn refresh_without_token_returns_401() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/refresh-token", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "MISSING_TOKEN");
}

#[tokio::test]
async fn refresh_with_garbage_returns_401() {
    let app = spawn_app();

    let response = refresh_with_cookie(&app, "not.a.jwt").await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "INVALID_TOKEN");
}

// --- Logout ---

#[tokio::test]
async fn logout_clears_cookie_and_revokes_sessions() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;
    let (_, refresh_token) = login(&app, "john@example.com").await;

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/logout", app.address))
        .header("Cookie", format!("refresh_token={}", refresh_token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(204, response.status().as_u16());
    let cleared = refresh_cookie(&response).expect("Logout did not clear the cookie");
    assert!(cleared.contains("Max-Age=0"));

    let after = refresh_with_cookie(&app, &refresh_token).await;
    assert_eq!(401, after.status().as_u16());
}

// --- Protected routes ---

#[tokio::test]
async fn me_returns_current_user_with_access_token() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;
    let (access_token, _) = login(&app, "john@example.com").await;

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", app.address))
        .bearer_auth(&access_token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "john@example.com");
    assert_eq!(body["active"], true);
}

#[tokio::test]
async fn me_without_token_returns_401() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "MISSING_TOKEN");
}

#[tokio::test]
async fn me_rejects_refresh_token_as_bearer() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;
    let (_, refresh_token) = login(&app, "john@example.com").await;

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", app.address))
        .bearer_auth(&refresh_token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn me_rejects_expired_access_token() {
    let app = spawn_app();
    signup_and_verify(&app, "john@example.com").await;
    let (access_token, _) = login(&app, "john@example.com").await;

    app.clock.advance(chrono::Duration::seconds(3601));

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", app.address))
        .bearer_auth(&access_token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_code(response).await, "EXPIRED_TOKEN");
}

use member_service::configuration::{get_configuration, DatabaseSettings};
use member_service::startup::run;
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let server =
        run(listener, connection_pool.clone(), configuration).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

/// Sign up and log in, returning the access token.
async fn access_token_for(app: &TestApp, client: &reqwest::Client, email: &str) -> String {
    let response = client
        .post(&format!("{}/auth/signup", &app.address))
        .json(&json!({
            "email": email,
            "nickname": "John Doe",
            "password": "SecurePass123",
            "check_password": "SecurePass123"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(201, response.status().as_u16());

    let body: Value = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({ "email": email, "password": "SecurePass123" }))
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse response");

    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn protected_routes_reject_missing_or_bad_tokens() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/members/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());

    let response = client
        .get(&format!("{}/members/me", &app.address))
        .bearer_auth("garbage-token")
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn me_returns_the_authenticated_members_profile() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = access_token_for(&app, &client, "u1@example.com").await;

    let body: Value = client
        .get(&format!("{}/members/me", &app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(body["email"], "u1@example.com");
    assert_eq!(body["nickname"], "John Doe");
    assert!(body["profile_image"].is_null());
}

#[tokio::test]
async fn member_lookup_by_id_and_email_works() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = access_token_for(&app, &client, "u1@example.com").await;

    let me: Value = client
        .get(&format!("{}/members/me", &app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse response");
    let member_id = me["id"].as_str().unwrap();

    let by_id: Value = client
        .get(&format!("{}/members/{}", &app.address, member_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(by_id["email"], "u1@example.com");

    let by_email = client
        .get(&format!(
            "{}/members/check?email=u1@example.com",
            &app.address
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, by_email.status().as_u16());

    let missing = client
        .get(&format!(
            "{}/members/check?email=ghost@example.com",
            &app.address
        ))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(404, missing.status().as_u16());
}

#[tokio::test]
async fn profile_update_changes_nickname_and_image() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = access_token_for(&app, &client, "u1@example.com").await;

    let response = client
        .patch(&format!("{}/members/me", &app.address))
        .bearer_auth(&token)
        .json(&json!({
            "nickname": "Renamed",
            "profile_image": "https://cdn.example.com/u1.png"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let body: Value = client
        .get(&format!("{}/members/me", &app.address))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(body["nickname"], "Renamed");
    assert_eq!(body["profile_image"], "https://cdn.example.com/u1.png");
}

#[tokio::test]
async fn password_change_requires_the_current_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = access_token_for(&app, &client, "u1@example.com").await;

    // Wrong current password
    let response = client
        .patch(&format!("{}/members/me/password", &app.address))
        .bearer_auth(&token)
        .json(&json!({
            "current_password": "WrongPass123",
            "changed_password": "NewSecurePass1",
            "check_changed_password": "NewSecurePass1"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());

    // Confirmation mismatch
    let response = client
        .patch(&format!("{}/members/me/password", &app.address))
        .bearer_auth(&token)
        .json(&json!({
            "current_password": "SecurePass123",
            "changed_password": "NewSecurePass1",
            "check_changed_password": "SomethingElse1"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(400, response.status().as_u16());

    // Valid change
    let response = client
        .patch(&format!("{}/members/me/password", &app.address))
        .bearer_auth(&token)
        .json(&json!({
            "current_password": "SecurePass123",
            "changed_password": "NewSecurePass1",
            "check_changed_password": "NewSecurePass1"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    // The new password logs in; the old one no longer does.
    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({ "email": "u1@example.com", "password": "NewSecurePass1" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({ "email": "u1@example.com", "password": "SecurePass123" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

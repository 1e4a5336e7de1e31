use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{
    IdentityResolver, PgIdentityResolver, PgRefreshSessionStore, RefreshSessionStore, TokenCodec,
};
use crate::configuration::Settings;
use crate::email_client::{EmailClient, SenderAddress};
use crate::error::{AppError, ConfigError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    check_member, check_verification_code, get_member, get_my_info, health_check, login,
    logout_member, refresh, send_verification_email, signup, social_login, update_password,
    update_profile,
};
use crate::verification::VerificationCodeStore;

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let codec = TokenCodec::new(&settings.jwt);

    // The auth subsystem sees the store and resolver only through their
    // traits; the Postgres backends are wired in here and nowhere else.
    let sessions: Arc<dyn RefreshSessionStore> = Arc::new(PgRefreshSessionStore::new(
        connection.clone(),
        settings.jwt.refresh_token_expiry,
    ));
    let resolver: Arc<dyn IdentityResolver> = Arc::new(PgIdentityResolver::new(connection.clone()));

    let email_client = build_email_client(&settings).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let connection = web::Data::new(connection);
    let codec_data = web::Data::new(codec.clone());
    let sessions_data = web::Data::from(sessions);
    let resolver_data = web::Data::from(resolver);
    let codes_data = web::Data::new(VerificationCodeStore::new(connection.get_ref().clone()));
    let email_data = web::Data::new(email_client);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(connection.clone())
            .app_data(codec_data.clone())
            .app_data(sessions_data.clone())
            .app_data(resolver_data.clone())
            .app_data(codes_data.clone())
            .app_data(email_data.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/signup", web::post().to(signup))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout_member))
            .route("/auth/social", web::post().to(social_login))
            .route("/auth/email", web::post().to(send_verification_email))
            .route("/auth/email/check", web::post().to(check_verification_code))

            // Protected routes (require a valid access token)
            .service(
                web::scope("/members")
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route("/me", web::get().to(get_my_info))
                    .route("/me", web::patch().to(update_profile))
                    .route("/me/password", web::patch().to(update_password))
                    .route("/check", web::get().to(check_member))
                    .route("/{member_id}", web::get().to(get_member)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

fn build_email_client(settings: &Settings) -> Result<EmailClient, AppError> {
    let sender = SenderAddress::parse(settings.email.sender.clone()).map_err(|_| {
        AppError::Config(ConfigError::InvalidValue(
            "email.sender is not a valid address".to_string(),
        ))
    })?;

    Ok(EmailClient::new(
        settings.email.base_url.clone(),
        sender,
        reqwest::Client::new(),
    ))
}

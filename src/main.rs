use std::net::TcpListener;
use std::sync::Arc;

use authcore::auth::{BcryptHasher, TokenIssuer};
use authcore::clock::SystemClock;
use authcore::configuration::{get_configuration, DatabaseSettings, Settings, StorageBackend};
use authcore::email_client::EmailClient;
use authcore::routes::CookiePolicy;
use authcore::services::AuthService;
use authcore::startup::run;
use authcore::store::{InMemoryStore, PgStore, Stores};
use authcore::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        invalid_input("Configuration error")
    })?;

    let issuer = TokenIssuer::new(&configuration.jwt).map_err(|e| {
        tracing::error!("Invalid JWT settings: {}", e);
        invalid_input("JWT configuration error")
    })?;

    let stores = build_stores(&configuration).await?;

    let sender = configuration.email_client.sender().map_err(|e| {
        tracing::error!("Invalid email client settings: {}", e);
        invalid_input("Email client configuration error")
    })?;
    let email_client = EmailClient::new(
        configuration.email_client.base_url.clone(),
        sender,
        configuration.email_client.timeout(),
    )
    .map_err(|e| {
        tracing::error!("Failed to build email client: {}", e);
        invalid_input("Email client configuration error")
    })?;

    let auth = AuthService::new(
        stores,
        issuer,
        Arc::new(BcryptHasher::default()),
        Arc::new(email_client),
        Arc::new(SystemClock),
        configuration.verification.code_ttl(),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let cookie_policy = CookiePolicy {
        secure: configuration.application.cookie_secure,
    };
    run(listener, auth, cookie_policy)?.await
}

async fn build_stores(configuration: &Settings) -> std::io::Result<Stores> {
    match configuration.application.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Stores::shared(Arc::new(InMemoryStore::new())))
        }
        StorageBackend::Postgres => {
            let store = connect_postgres(&configuration.database).await?;
            Ok(Stores::shared(Arc::new(store)))
        }
    }
}

async fn connect_postgres(settings: &DatabaseSettings) -> std::io::Result<PgStore> {
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Database migration error")
    })?;

    tracing::info!("Database connection pool created successfully");
    Ok(PgStore::new(pool))
}

fn invalid_input(message: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, message)
}

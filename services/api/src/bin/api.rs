//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        users::parse_user_table, FsTemplateStore, JsonFileUserRepository, MemoryUserRepository,
        OpenAiGenerationAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        self,
        rest::ApiDoc,
        state::{AppState, SessionRegistry},
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use backoff::ExponentialBackoffBuilder;
use manuscript_core::{ConversionGateway, CredentialStore, UserRepository};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Credential Store ---
    let repository: Arc<dyn UserRepository> = match (&config.users_file, &config.users_seed) {
        (Some(path), _) => {
            info!("Accounts are stored in {}.", path.display());
            Arc::new(JsonFileUserRepository::new(path.clone()))
        }
        (None, Some(seed)) => {
            warn!("USERS_FILE is not set; accounts from USERS_SEED last until shutdown.");
            Arc::new(MemoryUserRepository::new(parse_user_table(seed)?))
        }
        (None, None) => {
            warn!("USERS_FILE is not set; accounts last until shutdown.");
            Arc::new(MemoryUserRepository::default())
        }
    };
    let credentials = Arc::new(CredentialStore::open(repository).await?);

    // --- 3. Initialize the Generation Gateway ---
    let gateway = match &config.openai_api_key {
        Some(api_key) => {
            let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
            if let Some(api_base) = &config.openai_api_base {
                openai_config = openai_config.with_api_base(api_base);
            }
            // Rate-limit errors are reported to the user rather than retried.
            let no_retries = ExponentialBackoffBuilder::new()
                .with_max_elapsed_time(Some(Duration::ZERO))
                .build();
            let client = Client::with_config(openai_config).with_backoff(no_retries);

            let generator = Arc::new(OpenAiGenerationAdapter::new(
                client,
                config.generation_model.clone(),
                config.generation_timeout,
            ));
            let templates = Arc::new(FsTemplateStore::new(config.prompts_path.clone()));
            info!(
                "Generation enabled with model '{}', templates from {}.",
                config.generation_model,
                config.prompts_path.display()
            );
            Some(Arc::new(ConversionGateway::new(generator, templates)))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; conversion routes will answer 503 until it is.");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        credentials,
        gateway,
        sessions: Arc::new(SessionRegistry::new(config.session_ttl)),
    });

    // --- 5. Create the Web Router ---
    let mut api_router = web::router(app_state);
    if let Some(origin) = &config.cors_origin {
        let origin = origin.parse::<HeaderValue>().map_err(|e| {
            ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", origin, e))
        })?;
        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, ACCEPT]);
        api_router = api_router.layer(cors);
    }

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

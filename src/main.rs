//! Newsdesk - account, profile and publishing service for a news site

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{
            SqlxCategoryRepository, SqlxNewsRepository, SqlxSessionRepository, SqlxUserRepository,
        },
    },
    services::{
        create_sms_gateway, create_storage, ImageCaptcha, NewsService, UserService,
        VerificationService,
    },
    templates::TemplateEngine,
};

/// How often expired sessions are purged
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting newsdesk...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Initialize cache
    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized: {:?}", config.cache.driver);

    // External collaborators
    let storage = create_storage(&config.storage).await?;
    let sms = create_sms_gateway(&config.sms)?;
    tracing::info!(
        "Storage driver: {:?}, SMS driver: {:?}",
        config.storage.driver,
        config.sms.driver
    );

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let news_repo = SqlxNewsRepository::boxed(pool.clone());
    let category_repo = SqlxCategoryRepository::boxed(pool.clone());

    // Initialize services
    let session_lifetime = config.session.lifetime()?;
    let user_service = Arc::new(UserService::new(
        user_repo.clone(),
        session_repo,
        storage.clone(),
        session_lifetime,
        config.storage.domain_prefix.clone(),
    ));
    let news_service = Arc::new(NewsService::new(
        news_repo,
        category_repo,
        user_repo,
        storage,
        config.storage.domain_prefix.clone(),
    ));
    let verification = Arc::new(VerificationService::new(
        cache,
        Arc::new(ImageCaptcha::new()),
        sms,
        config.verification.clone(),
    ));

    // Load templates
    let templates = Arc::new(TemplateEngine::new()?);

    let state = AppState {
        user_service: user_service.clone(),
        news_service,
        verification,
        templates,
        pagination: Arc::new(config.pagination.clone()),
        session_max_age: config.session.lifetime_seconds,
    };

    // Start session cleanup task (runs every 10 minutes)
    {
        let user_service = user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("Removed {} expired sessions", count),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server, &config.storage)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

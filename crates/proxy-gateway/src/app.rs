use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use proxy_attachments::AttachmentPipeline;
use proxy_core::config::ProxyConfig;
use proxy_identity::Identity;
use proxy_orchestrator::ChatOrchestrator;
use proxy_providers::ProviderRegistry;
use proxy_quota::QuotaEngine;
use proxy_ratelimit::RateLimiter;
use proxy_store::Store;

/// Central shared state, passed as `Arc<AppState>` to every handler — one
/// instance per process, composed once at boot from `ProxyConfig`.
pub struct AppState {
    pub config: ProxyConfig,
    pub store: Arc<Store>,
    pub identity: Identity,
    pub ratelimiter: RateLimiter,
    pub quota: Arc<QuotaEngine>,
    pub providers: Arc<ProviderRegistry>,
    pub attachments: AttachmentPipeline,
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn new(config: ProxyConfig, store: Arc<Store>) -> Self {
        let identity = Identity::new(store.clone(), config.identity.clone());
        let quota = Arc::new(QuotaEngine::new(store.clone()));
        let providers = Arc::new(ProviderRegistry::new(&config.providers));
        let attachments = AttachmentPipeline::new(
            store.clone(),
            config.uploads.root.clone(),
            config.uploads.max_image_bytes,
            config.uploads.max_file_bytes,
        );
        let orchestrator = Arc::new(ChatOrchestrator::new(store.clone(), quota.clone(), providers.clone()));

        Self {
            config,
            store,
            identity,
            ratelimiter: RateLimiter::new(),
            quota,
            providers,
            attachments,
            orchestrator,
        }
    }
}

/// Assemble the full Axum router (§6).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/auth/register", post(crate::http::auth::register))
        .route("/v1/auth/login", post(crate::http::auth::login))
        .route("/v1/auth/apple", post(crate::http::auth::apple))
        .route("/v1/auth/refresh", post(crate::http::auth::refresh))
        .route("/v1/chat/completions", post(crate::http::completions::chat_completions))
        .route("/{provider}/v1/chat/completions", post(crate::http::completions::chat_completions_forced))
        .route(
            "/v1/conversations",
            post(crate::http::conversations::create_conversation).get(crate::http::conversations::list_conversations),
        )
        .route(
            "/v1/conversations/{id}",
            get(crate::http::conversations::get_conversation).delete(crate::http::conversations::delete_conversation),
        )
        .route("/v1/conversations/{id}/chat", post(crate::http::conversations::chat))
        .route("/v1/conversations/{id}/chat/stream", post(crate::http::conversations::chat_stream))
        .route("/v1/conversations/{id}/upload", post(crate::http::upload::upload))
        .route("/v1/files/{id}", get(crate::http::upload::get_file))
        .route("/admin/tokens/generate", post(crate::http::admin::generate_token))
        .route("/admin/tokens/{token}/tier", post(crate::http::admin::set_tier))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Initialize the global `tracing` subscriber, same pattern the gateway
/// binary used before: env filter with a sane default, plain fmt layer.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proxy_gateway=info,tower_http=debug".into()),
        )
        .init();
}

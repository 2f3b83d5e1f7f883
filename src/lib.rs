pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use cluster::{BackgroundProcess, ClusterGateway, HelmGateway, HelmGatewayConfig, ProcessExit};
pub use error::DeploymentError;
pub use logic::{
    AppVersionResolver, DeploymentRecord, HelmRepository, InstallClaim, InstallRegistry,
    Reconciler,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{CatalogueStore, InMemoryCatalogue};

use std::sync::Arc;

/// Wire the reconciler to the helm and kube API gateway, chart index and catalogue named in `config`.
pub fn build_reconciler(config: &crate::config::AppConfig) -> anyhow::Result<Reconciler> {
    let catalogue = match &config.catalogue.path {
        Some(path) => InMemoryCatalogue::from_file(path)?,
        None => seed::load_seed_catalogue(),
    };

    let gateway = HelmGateway::new(HelmGatewayConfig::from(config));
    let charts = HelmRepository::new(
        logic::index_source_for(&config.helm.index_url),
        config.index_refresh_interval(),
    );
    let registry = InstallRegistry::new(config.failed_handle_ttl());

    Ok(Reconciler::new(
        Arc::new(catalogue),
        Arc::new(gateway),
        Arc::new(charts),
        Arc::new(registry),
        &config.tools.domain,
    ))
}

/// Periodically drop failed install handles past their TTL.
pub fn spawn_registry_sweeper(
    registry: Arc<InstallRegistry>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            registry.clear_expired();
        }
    })
}

pub async fn serve_with_config(config: &crate::config::AppConfig) -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    let reconciler = Arc::new(build_reconciler(config)?);
    let sweeper = spawn_registry_sweeper(Arc::clone(reconciler.registry()), config.sweep_interval());

    let app = crate::api::routes::create_router().with_state(reconciler);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Tool deployment service listening on http://{}", bind_address);

    let result = serve(listener, app).await;
    sweeper.abort();
    result?;

    Ok(())
}

use crate::{
    class_data::ClassTable,
    classifier::Classifier,
    config::{Config, CorsConfig},
    routes::api_routes,
    telemetry::Metrics,
};
use anyhow::Context;
use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

/// Application context shared by every handler. The classifier and class
/// table are `None` when their startup load failed; handlers that need them
/// answer per-request instead of the process refusing to start.
#[derive(Clone)]
pub struct SharedState {
    pub classifier: Option<Arc<dyn Classifier>>,
    pub class_table: Option<Arc<ClassTable>>,
    pub metrics: Arc<Metrics>,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        classifier: Option<Arc<dyn Classifier>>,
        class_table: Option<Arc<ClassTable>>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let metrics_layer = HttpMetricsLayerBuilder::new().build();
        let cors = cors_layer(&config.cors)?;

        let app_state = SharedState {
            classifier,
            class_table,
            metrics: Arc::new(Metrics::new()),
        };

        let router = Router::new()
            .merge(api_routes())
            .with_state(app_state)
            .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
            .layer(metrics_layer)
            .layer(cors);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let Self { router, listener } = self;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}

fn cors_layer(cors: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = cors
        .allowed_origin
        .parse()
        .with_context(|| format!("invalid CORS origin: {}", cors.allowed_origin))?;

    // Credentials are enabled, so methods and headers mirror the request
    // instead of using wildcards.
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

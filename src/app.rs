use crate::class_data::ClassTable;
use crate::classifier::{Classifier, OrtClassifier};
use crate::config::Config;
use crate::server::HttpServer;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    // Asset loads are best-effort: a failed load leaves that slot empty and
    // the service starts degraded, answering 503 on /predict until restarted
    // with the asset in place.
    let classifier: Option<Arc<dyn Classifier>> = match OrtClassifier::new(&config.model) {
        Ok(classifier) => Some(Arc::new(classifier)),
        Err(e) => {
            tracing::error!(
                "Failed to load model from {:?}: {:?}",
                config.model.get_model_path(),
                e
            );
            None
        }
    };

    let class_table = match ClassTable::load(&config.class_data.get_path()) {
        Ok(table) => {
            tracing::info!("Loaded {} class records", table.len());
            Some(Arc::new(table))
        }
        Err(e) => {
            tracing::error!(
                "Failed to load class data from {:?}: {:?}",
                config.class_data.get_path(),
                e
            );
            None
        }
    };

    let server = HttpServer::new(classifier, class_table, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

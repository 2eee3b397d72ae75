use crate::domain::TrafficSituationService;
use crate::http::{create_router, AppState};
use anyhow::Context;
use axum::Router;
use common::domain::{PersistenceGateway, RealtimeCache};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct RealtimeApiConfig {
    pub host: String,
    pub port: u16,
}

pub struct RealtimeApi {
    router: Router,
    config: RealtimeApiConfig,
}

impl RealtimeApi {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        cache: Arc<dyn RealtimeCache>,
        config: RealtimeApiConfig,
    ) -> Self {
        debug!("initializing realtime API module");

        let service = Arc::new(TrafficSituationService::new(gateway, cache));
        let router = create_router(Arc::new(AppState::new(service)));

        Self { router, config }
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new({
            let router = self.router;
            let addr = format!("{}:{}", self.config.host, self.config.port);
            move |ctx| Box::pin(async move { serve(router, addr, ctx).await })
        })
    }
}

async fn serve(router: Router, addr: String, ctx: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!(address = %addr, "realtime API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { ctx.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("realtime API stopped");
    Ok(())
}

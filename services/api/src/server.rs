use crate::cli::ServeArgs;
use crate::infra::{build_service, market_settings, AppState};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use leadmarket::config::AppConfig;
use leadmarket::error::AppError;
use leadmarket::telemetry;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let handles = build_service(market_settings(&config.market));
    let service = handles.service;

    // Maintenance sweep: SLA expiry for pending assignments and closes for
    // elapsed bidding windows.
    let sweep_service = service.clone();
    let sweep_interval = Duration::from_secs(config.market.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            let expired = sweep_service.expire_stale_assignments(now);
            let closed = sweep_service.close_due_bidding(now);
            if expired > 0 || closed > 0 {
                info!(expired, closed, "maintenance sweep applied");
            }
        }
    });

    let app = with_marketplace_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lead marketplace engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use fritz_exporter::{encode_text, error_families, merge_families, Collector};
use prometheus::IntCounter;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::common::{self, GatewayArgs};

/// Collectors served by `/metrics`; each mutex is held for a whole pass.
pub struct AppState {
    collectors: Vec<Mutex<Collector>>,
    errors: IntCounter,
}

impl AppState {
    pub fn new(collectors: Vec<Collector>, errors: IntCounter) -> Self {
        Self {
            collectors: collectors.into_iter().map(Mutex::new).collect(),
            errors,
        }
    }

    /// Run one pass per collector and render everything in text format.
    pub async fn render(&self) -> Result<String, prometheus::Error> {
        let mut families = Vec::new();
        for collector in &self.collectors {
            families.extend(collector.lock().await.gather().await);
        }
        let mut families = merge_families(families);
        families.extend(error_families(&self.errors));
        encode_text(&families)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.render().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        ),
        Err(err) => {
            error!(error = %err, "encoding metrics failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                err.to_string(),
            )
        }
    }
}

pub async fn run(args: &GatewayArgs, listen_address: SocketAddr) -> Result<()> {
    let (collectors, errors) = common::build_collectors(args).await?;
    let state = Arc::new(AppState::new(collectors, errors));

    let listener = TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("bind {listen_address}"))?;
    info!(address = %listen_address, "serving /metrics");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "listening for Ctrl+C failed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fritz_exporter::{collect_errors_counter, Catalog};
    use httpmock::prelude::*;

    const SESSION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?><SessionInfo><SID>abcdef0123456789</SID><Challenge>89abcdef</Challenge><BlockTime>0</BlockTime><Rights></Rights></SessionInfo>";

    const CATALOG: &str = r#"{
        "labelRenames": [{"matchRegex": "(?i)^lan", "renameLabel": "wired"}],
        "metrics": [
            {
                "promDesc": {"fqName": "gateway_device_speed", "help": "link speed", "varLabels": ["gateway", "name", "type"]},
                "promType": "GaugeValue",
                "page": "netDev",
                "resultPath": "data.active",
                "resultKey": "speed"
            },
            {
                "promDesc": {"fqName": "gateway_missing", "help": "absent page", "varLabels": []},
                "page": "gone",
                "resultPath": "data"
            }
        ]
    }"#;

    #[tokio::test]
    async fn render_collects_lua_metrics_and_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/login_sid.lua");
            then.status(200).body(SESSION);
        });
        server.mock(|when, then| {
            when.method(POST).path("/data.lua").body_includes("page=netDev");
            then.status(200).body(
                r#"{"data":{"active":[{"name":"NAS","type":"LAN","speed":"1000"},{"name":"tv","type":"wlan"}]}}"#,
            );
        });
        server.mock(|when, then| {
            when.method(POST).path("/data.lua");
            then.status(404);
        });

        let errors = collect_errors_counter().expect("counter");
        let collector = Collector::lua(
            Catalog::from_json(CATALOG).expect("catalog"),
            &server.base_url(),
            "admin",
            "secret",
            "fritz.box",
            errors.clone(),
        )
        .expect("collector");
        let state = AppState::new(vec![collector], errors);

        let text = state.render().await.expect("render");
        assert!(text.contains("# TYPE gateway_device_speed gauge"));
        assert!(text.contains(r#"gateway_device_speed{gateway="fritz.box",name="nas",type="wired"} 1000"#));
        assert!(!text.contains("gateway_missing"));
        assert!(text.contains("fritzbox_exporter_collect_errors 1"));
    }
}

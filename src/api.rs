/// HTTP API for the monitor's status
/// Provides REST endpoints for the latest alerts, session statistics and settings reload
///
/// This module is optional - only starts if API_ENABLED=true in settings

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::reloadable::ReloadableSettings;
use crate::models::AlertRecord;
use crate::runtime::StatusBoard;
use crate::session::SessionStats;

/// API server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

/// Shared state for API handlers
#[derive(Clone)]
struct AppState {
    start_time: Instant,
    status: StatusBoard,
    /// Optional reloadable settings for the /reload endpoint
    settings: Option<ReloadableSettings>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    scheduler: String,
}

/// Alerts from the most recent completed poll
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct AlertsResponse {
    completed_at: DateTime<Utc>,
    new_count: usize,
    visible_count: usize,
    filtered_count: usize,
    alerts: Vec<AlertRecord>,
}

/// Query parameters for /alerts endpoint
#[derive(Debug, Deserialize)]
struct AlertsQuery {
    #[serde(default)]
    new_only: bool,
    limit: Option<usize>,
}

/// Stats response
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct StatsResponse {
    state: String,
    generation: u64,
    #[serde(flatten)]
    stats: SessionStats,
}

/// Reload response
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ReloadResponse {
    success: bool,
    changed: bool,
    message: String,
}

/// Health check endpoint
/// Returns uptime and the scheduler state
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let scheduler = state.status.read().await.state.clone();

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        scheduler,
    })
}

/// Alerts endpoint
/// Returns the ordered alerts of the last poll, optionally only new ones
async fn alerts_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsQuery>,
) -> axum::response::Response {
    let status = state.status.read().await;
    let Some(report) = &status.last_report else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "No poll completed yet"})),
        )
            .into_response();
    };

    let alerts: Vec<AlertRecord> = report
        .alerts
        .iter()
        .filter(|alert| !params.new_only || alert.is_new)
        .take(params.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    Json(AlertsResponse {
        completed_at: report.completed_at,
        new_count: report.new_count,
        visible_count: report.visible_count,
        filtered_count: report.filtered_count,
        alerts,
    })
    .into_response()
}

/// Stats endpoint
/// Returns session totals
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.status.read().await;

    Json(StatsResponse {
        state: status.state.clone(),
        generation: status.generation,
        stats: status.stats,
    })
}

/// Reload endpoint
/// Re-reads the settings file; the monitor applies it at the next cycle start
async fn reload_handler(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let Some(settings) = &state.settings else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReloadResponse {
                success: false,
                changed: false,
                message: "Reload not available (settings store not set)".to_string(),
            }),
        )
            .into_response();
    };

    match settings.reload().await {
        Ok(changed) => {
            let message = if changed {
                "Settings reloaded. Changes apply at the next reload cycle."
            } else {
                "Settings unchanged."
            };
            Json(ReloadResponse {
                success: true,
                changed,
                message: message.to_string(),
            })
            .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ReloadResponse {
                success: false,
                changed: false,
                message: format!("Failed to reload settings: {}", e),
            }),
        )
            .into_response(),
    }
}

/// Creates the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/alerts", get(alerts_handler))
        .route("/stats", get(stats_handler))
        .route("/reload", post(reload_handler))
        .with_state(state)
}

/// Starts the HTTP API server
/// Returns a JoinHandle that can be aborted for shutdown
pub async fn start_api_server(
    config: ApiConfig,
    status: StatusBoard,
    settings: Option<ReloadableSettings>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    if !config.enabled {
        anyhow::bail!("API is disabled");
    }

    let state = Arc::new(AppState {
        start_time: Instant::now(),
        status,
        settings,
    });

    let app = create_router(state);
    let addr = format!("127.0.0.1:{}", config.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "status API listening");

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "status API stopped");
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::SettingsStore;
    use crate::models::{AlertKind, AlertStyle};
    use crate::poll::PollReport;
    use crate::runtime::MonitorStatus;
    use crate::settings::Settings;

    fn alert(member_id: &str, value: u32, is_new: bool) -> AlertRecord {
        AlertRecord {
            member_id: member_id.to_string(),
            kind: AlertKind::Bundle,
            message: format!("{} wants 2 cards for {} points (US)", member_id, value),
            style: AlertStyle::Normal,
            value,
            is_new,
            show_new_marker: is_new,
            anchor_trade_id: None,
        }
    }

    fn board_with_report() -> StatusBoard {
        let report = PollReport {
            completed_at: Utc::now(),
            offer_count: 12,
            member_count: 4,
            duplicates: 0,
            alerts: vec![alert("m1", 300, true), alert("m2", 250, true), alert("m3", 400, false)],
            new_count: 2,
            effects: Default::default(),
            row_highlights: Vec::new(),
            point_warnings: Vec::new(),
            hidden_trade_ids: vec!["t9".to_string()],
            filtered_count: 1,
            visible_count: 11,
            notes: Vec::new(),
            analytics: Vec::new(),
        };
        let status = MonitorStatus {
            state: "SCHEDULED".to_string(),
            generation: 3,
            stats: SessionStats {
                sent_trades: 2,
                alerted_points: 950,
                alerted_offers: 6,
                polls: 3,
            },
            last_report: Some(report),
        };
        Arc::new(tokio::sync::RwLock::new(status))
    }

    async fn serve(port: u16, status: StatusBoard, settings: Option<ReloadableSettings>) -> tokio::task::JoinHandle<()> {
        let config = ApiConfig { enabled: true, port };
        let handle = start_api_server(config, status, settings).await.unwrap();
        // Give the server a moment to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        handle
    }

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert!(!config.enabled, "API should be disabled by default");
        assert_eq!(config.port, 8080, "Default port should be 8080");
    }

    #[test]
    fn test_stats_response_is_flat() {
        let response = StatsResponse {
            state: "IDLE".to_string(),
            generation: 0,
            stats: SessionStats::default(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"sent_trades\":0"));
        assert!(json.contains("\"state\":\"IDLE\""));
    }

    #[tokio::test]
    async fn test_api_disabled_by_default() {
        let result = start_api_server(ApiConfig::default(), StatusBoard::default(), None).await;

        assert!(result.is_err(), "API server should fail to start when disabled");
        assert_eq!(result.unwrap_err().to_string(), "API is disabled");
    }

    #[tokio::test]
    async fn test_health_endpoint_reports_scheduler_state() {
        let handle = serve(18080, board_with_report(), None).await;

        let response = reqwest::get("http://127.0.0.1:18080/health").await.unwrap();
        assert_eq!(response.status(), 200);

        let health: HealthResponse = response.json().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.scheduler, "SCHEDULED");

        handle.abort();
    }

    #[tokio::test]
    async fn test_alerts_endpoint_before_first_poll() {
        let handle = serve(18081, StatusBoard::default(), None).await;

        let response = reqwest::get("http://127.0.0.1:18081/alerts").await.unwrap();
        assert_eq!(response.status(), 503); // SERVICE_UNAVAILABLE

        handle.abort();
    }

    #[tokio::test]
    async fn test_alerts_endpoint_returns_ordered_alerts() {
        let handle = serve(18082, board_with_report(), None).await;

        let response = reqwest::get("http://127.0.0.1:18082/alerts").await.unwrap();
        assert_eq!(response.status(), 200);

        let body: AlertsResponse = response.json().await.unwrap();
        assert_eq!(body.alerts.len(), 3);
        assert_eq!(body.alerts[0].member_id, "m1");
        assert_eq!(body.new_count, 2);
        assert_eq!(body.visible_count, 11);

        handle.abort();
    }

    #[tokio::test]
    async fn test_alerts_endpoint_new_only_with_limit() {
        let handle = serve(18083, board_with_report(), None).await;

        let response = reqwest::get("http://127.0.0.1:18083/alerts?new_only=true&limit=1")
            .await
            .unwrap();
        let body: AlertsResponse = response.json().await.unwrap();
        assert_eq!(body.alerts.len(), 1);
        assert!(body.alerts[0].is_new);

        let response = reqwest::get("http://127.0.0.1:18083/alerts?new_only=true").await.unwrap();
        let body: AlertsResponse = response.json().await.unwrap();
        assert!(body.alerts.iter().all(|a| a.is_new));
        assert_eq!(body.alerts.len(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_stats_endpoint_returns_session_totals() {
        let handle = serve(18084, board_with_report(), None).await;

        let response = reqwest::get("http://127.0.0.1:18084/stats").await.unwrap();
        assert_eq!(response.status(), 200);

        let stats: StatsResponse = response.json().await.unwrap();
        assert_eq!(stats.generation, 3);
        assert_eq!(stats.stats.sent_trades, 2);
        assert_eq!(stats.stats.alerted_points, 950);

        handle.abort();
    }

    #[tokio::test]
    async fn test_reload_endpoint_without_store() {
        let handle = serve(18085, StatusBoard::default(), None).await;

        let response = reqwest::Client::new()
            .post("http://127.0.0.1:18085/reload")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);

        let body: ReloadResponse = response.json().await.unwrap();
        assert!(!body.success);

        handle.abort();
    }

    #[tokio::test]
    async fn test_reload_endpoint_reads_settings_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let settings = ReloadableSettings::with_store(Settings::default(), store.clone());

        let mut edited = Settings::default();
        edited.filter.cards_by_value = true;
        edited.log_level = "debug".to_string();
        store.save(&edited).unwrap();

        let handle = serve(18086, StatusBoard::default(), Some(settings.clone())).await;

        let response = reqwest::Client::new()
            .post("http://127.0.0.1:18086/reload")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body: ReloadResponse = response.json().await.unwrap();
        assert!(body.success);
        assert!(body.changed);
        assert!(settings.snapshot().await.filter.cards_by_value);

        handle.abort();
    }
}

// [apps/orchestrator/src/handlers/diagnostics.rs]
//! =================================================================
//! APARATO: PROCESS HEALTH SURFACE (V9.0 - READINESS GATED)
//! CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
//! RESPONSABILIDAD: VEREDICTOS DE SALUD Y PREPARACIÓN DEL PROCESO
//! =================================================================

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use fingerswarm_infra_db::BreakerState;
use serde_json::json;
use tracing::instrument;

use crate::state::AppState;

pub struct HealthSurfaceHandler;

impl HealthSurfaceHandler {
    /// Endpoint: GET /health
    ///
    /// 503 sii el veredicto global es 'unhealthy' (breaker abierto).
    #[instrument(skip(application_state))]
    pub async fn handle_health(State(application_state): State<AppState>) -> impl IntoResponse {
        let gatekeeper_health = application_state.gatekeeper.health();

        let overall_verdict = match gatekeeper_health.breaker.state {
            BreakerState::Open => "unhealthy",
            BreakerState::HalfOpen => "degraded",
            BreakerState::Closed => {
                if gatekeeper_health.pool_available == 0 {
                    "degraded"
                } else {
                    "healthy"
                }
            }
        };

        let maintenance_reason = application_state.is_operational().err();

        let health_report = json!({
            "overall": overall_verdict,
            "components": {
                "gatekeeper": gatekeeper_health,
                "system_mode": maintenance_reason.unwrap_or_else(|| "operational".into()),
                "background_cycles_completed": application_state.readiness.all_cycles_completed(),
            }
        });

        let status_code = if overall_verdict == "unhealthy" {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };

        (status_code, Json(health_report))
    }

    /// Endpoint: GET /ready
    ///
    /// 200 solo cuando el breaker reporta CLOSED y cada daemon completó
    /// al menos un ciclo.
    #[instrument(skip(application_state))]
    pub async fn handle_ready(State(application_state): State<AppState>) -> impl IntoResponse {
        let breaker_closed =
            application_state.gatekeeper.breaker_snapshot().state == BreakerState::Closed;
        let cycles_completed = application_state.readiness.all_cycles_completed();

        if breaker_closed && cycles_completed {
            (StatusCode::OK, Json(json!({ "ready": true })))
        } else {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "ready": false,
                    "breaker_closed": breaker_closed,
                    "background_cycles_completed": cycles_completed,
                })),
            )
        }
    }
}

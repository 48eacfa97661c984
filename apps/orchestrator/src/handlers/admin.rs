// [apps/orchestrator/src/handlers/admin.rs]
/*!
 * =================================================================
 * APARATO: OPERATOR COMMAND HANDLER (V14.0 - COMMAND CENTER)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
 * RESPONSABILIDAD: DIAGNÓSTICO, REBALANCEO MANUAL Y RECUPERACIÓN FORZOSA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. MANUAL OVERRIDE: El disparo explícito del operador ignora el
 *    cooldown del tick periódico.
 * 2. TRANSPARENT LEDGER: Flota, propiedad, defectos e historia de
 *    rebalanceos son consultables sin efectos secundarios.
 * =================================================================
 */

use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
};
use fingerswarm_domain_models::RebalanceReason;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::ApiError;
use crate::services::consistency_auditor;
use crate::services::recovery;
use crate::state::AppState;

/// Parámetros de consulta del inventario de asignaciones.
#[derive(Debug, Deserialize)]
pub struct AssignmentsQuery {
    /// Limita la vista a la propiedad de un nodo concreto.
    pub instance: Option<String>,
}

/// Parámetros de la historia de rebalanceos.
#[derive(Debug, Deserialize)]
pub struct RebalanceHistoryQuery {
    pub limit: Option<u32>,
}

/// Orden de recuperación forzosa de un nodo.
#[derive(Debug, Deserialize)]
pub struct ForceRecoveryPayload {
    #[serde(rename = "instance_identifier")]
    pub id: String,
    pub reason: String,
}

/// Entrada a modo mantenimiento.
#[derive(Debug, Deserialize)]
pub struct MaintenancePayload {
    pub reason: String,
}

pub struct OperatorCommandHandler;

impl OperatorCommandHandler {
    /// Endpoint: GET /api/v1/admin/instances
    #[instrument(skip(application_state))]
    pub async fn handle_list_instances(
        State(application_state): State<AppState>,
    ) -> Result<impl IntoResponse, ApiError> {
        let fleet = application_state.instance_repository.list_all().await?;
        Ok(Json(json!({ "instances": fleet })))
    }

    /// Endpoint: GET /api/v1/admin/assignments[?instance=ID]
    #[instrument(skip(application_state))]
    pub async fn handle_list_assignments(
        State(application_state): State<AppState>,
        Query(query): Query<AssignmentsQuery>,
    ) -> Result<impl IntoResponse, ApiError> {
        let ledger_view = match &query.instance {
            Some(instance_identifier) => {
                application_state
                    .assignment_repository
                    .list_by_instance(instance_identifier)
                    .await?
            }
            None => application_state.assignment_repository.list_live().await?,
        };

        let stream_identifiers: Vec<i64> =
            ledger_view.iter().map(|assignment| assignment.stream_id).collect();

        Ok(Json(json!({
            "stream_ids": stream_identifiers,
            "assignments": ledger_view,
        })))
    }

    /// Endpoint: GET /api/v1/admin/diagnostics/inconsistencies
    ///
    /// Escaneo de defectos en modo detección (sin reparación) más el
    /// journal de reparaciones recientes del Auditor.
    #[instrument(skip(application_state))]
    pub async fn handle_list_inconsistencies(
        State(application_state): State<AppState>,
    ) -> Result<impl IntoResponse, ApiError> {
        let current_defects =
            consistency_auditor::detect_defects(&application_state).await.map_err(|fault| {
                warn!("⚠️ [ADMIN]: Defect scan collapsed: {}", fault);
                ApiError::Internal(fault.to_string())
            })?;

        Ok(Json(json!({
            "current_defects": current_defects,
            "repair_journal": application_state.defect_journal_view(),
        })))
    }

    /// Endpoint: POST /api/v1/admin/rebalance
    ///
    /// Disparo explícito: ignora el cooldown y se ejecuta en cuanto el
    /// conductor queda libre (a lo sumo un plan a la vez).
    #[instrument(skip(application_state))]
    pub async fn handle_manual_rebalance(
        State(application_state): State<AppState>,
    ) -> Result<impl IntoResponse, ApiError> {
        info!("🧭 [ADMIN]: Manual rebalance requested by operator.");
        application_state.request_rebalance(RebalanceReason::Manual);
        Ok(Json(json!({ "status": "REBALANCE_SCHEDULED" })))
    }

    /// Endpoint: POST /api/v1/admin/force_recovery
    ///
    /// Ejecuta la recuperación de emergencia (idempotente) de un nodo.
    #[instrument(skip(application_state, recovery_payload), fields(instance = %recovery_payload.id))]
    pub async fn handle_force_recovery(
        State(application_state): State<AppState>,
        Json(recovery_payload): Json<ForceRecoveryPayload>,
    ) -> Result<impl IntoResponse, ApiError> {
        if recovery_payload.id.trim().is_empty() {
            return Err(ApiError::Validation("instance_identifier must not be empty".into()));
        }

        let recovery_report = recovery::execute_emergency_recovery(
            &application_state,
            &recovery_payload.id,
            &recovery_payload.reason,
        )
        .await
        .map_err(|fault| ApiError::Internal(fault.to_string()))?;

        Ok(Json(json!({
            "status": "RECOVERY_EXECUTED",
            "released": recovery_report.released,
            "committed_to_target": recovery_report.committed_to_target,
            "reverted_to_source": recovery_report.reverted_to_source,
        })))
    }

    /// Endpoint: GET /api/v1/admin/rebalances[?limit=N]
    #[instrument(skip(application_state))]
    pub async fn handle_rebalance_history(
        State(application_state): State<AppState>,
        Query(query): Query<RebalanceHistoryQuery>,
    ) -> Result<impl IntoResponse, ApiError> {
        let history = application_state
            .rebalance_repository
            .recent(query.limit.unwrap_or(20).min(200))
            .await?;
        Ok(Json(json!({ "rebalance_events": history })))
    }

    /// Endpoint: POST /api/v1/admin/maintenance/enter
    #[instrument(skip(application_state, maintenance_payload))]
    pub async fn handle_maintenance_enter(
        State(application_state): State<AppState>,
        Json(maintenance_payload): Json<MaintenancePayload>,
    ) -> Result<impl IntoResponse, ApiError> {
        application_state.enter_maintenance(&maintenance_payload.reason);
        Ok(Json(json!({ "status": "MAINTENANCE_ACTIVE" })))
    }

    /// Endpoint: POST /api/v1/admin/maintenance/exit
    #[instrument(skip(application_state))]
    pub async fn handle_maintenance_exit(
        State(application_state): State<AppState>,
    ) -> Result<impl IntoResponse, ApiError> {
        application_state.exit_maintenance();
        Ok(Json(json!({ "status": "OPERATIONAL" })))
    }
}

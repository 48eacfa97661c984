// [apps/orchestrator/src/errors.rs]
/*!
 * =================================================================
 * APARATO: API ERROR ADAPTER (V8.1 - THREE OUTCOME CONTRACT)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
 * RESPONSABILIDAD: PROYECCIÓN DEL CATÁLOGO DE FALLOS SOBRE HTTP
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. THREE OUTCOMES: El worker solo distingue éxito, 503 reintentables
 *    (con Retry-After) y 4xx definitivos; jamás éxito parcial.
 * 2. DEFECT CODES: Los 409 cargan un código de defecto estable para la
 *    resincronización del worker.
 * =================================================================
 */

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fingerswarm_infra_db::DbError;
use serde_json::json;
use tracing::{error, warn};

/// Fallo proyectable sobre la superficie HTTP del orquestador.
#[derive(Debug)]
pub enum ApiError {
    /// Petición malformada o campos inválidos (400, no reintentable).
    Validation(String),
    /// El nodo referenciado no existe o fue retirado (404).
    UnknownInstance,
    /// Violación de invariante con código de defecto estable (409).
    Conflict { defect_code: &'static str, detail: String },
    /// Infraestructura degradada; el worker debe reintentar (503).
    Unavailable { retry_after_s: u64 },
    /// Estado irrecuperable detectado (500).
    Internal(String),
}

impl From<DbError> for ApiError {
    fn from(fault: DbError) -> Self {
        match &fault {
            DbError::UnknownInstance => Self::UnknownInstance,
            DbError::StaleHeartbeat => Self::Conflict {
                defect_code: "STALE_HEARTBEAT",
                detail: fault.to_string(),
            },
            DbError::CapacityExceeded { .. } => Self::Conflict {
                defect_code: "CAPACITY_EXCEEDED",
                detail: fault.to_string(),
            },
            DbError::AlreadyAssigned { .. } => Self::Conflict {
                defect_code: "DUPLICATE_OWNERSHIP",
                detail: fault.to_string(),
            },
            DbError::InvalidState => Self::Conflict {
                defect_code: "INVALID_STATE_TRANSITION",
                detail: fault.to_string(),
            },
            DbError::BreakerOpen { retry_after_s } => {
                Self::Unavailable { retry_after_s: *retry_after_s }
            }
            fault_kind if fault_kind.is_unavailable() => Self::Unavailable { retry_after_s: 5 },
            DbError::QueryError(_) if fault.is_transient() => {
                Self::Unavailable { retry_after_s: 5 }
            }
            _ => Self::Internal(fault.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(detail) => {
                warn!("🛑 [API]: Malformed request rejected: {}", detail);
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "MALFORMED_REQUEST", "detail": detail })),
                )
                    .into_response()
            }
            Self::UnknownInstance => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "UNKNOWN_INSTANCE" })),
            )
                .into_response(),
            Self::Conflict { defect_code, detail } => {
                warn!("⚠️ [API]: Invariant conflict {}: {}", defect_code, detail);
                (
                    StatusCode::CONFLICT,
                    Json(json!({ "error": defect_code, "detail": detail })),
                )
                    .into_response()
            }
            Self::Unavailable { retry_after_s } => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, retry_after_s.to_string())],
                Json(json!({ "error": "SERVICE_UNAVAILABLE", "retry_after_s": retry_after_s })),
            )
                .into_response(),
            Self::Internal(detail) => {
                error!("❌ [API]: Internal collapse surfaced: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "INTERNAL_FAULT" })),
                )
                    .into_response()
            }
        }
    }
}

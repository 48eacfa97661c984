// [libs/domain/models-rs/src/rebalance.rs]
//! =================================================================
//! APARATO: REBALANCE AUDIT MODELS (V8.0 - APPEND ONLY)
//! CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
//! RESPONSABILIDAD: RASTRO INMUTABLE DE PLANES DE MIGRACIÓN
//! =================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Disparador que originó un plan de rebalanceo.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceReason {
    /// Un nodo nuevo alcanzó ACTIVE y amerita redistribución.
    NewInstance,
    /// Un nodo cayó a INACTIVE y sus streams deben reubicarse.
    LostInstance,
    /// Deriva de carga detectada por el chequeo periódico.
    Drift,
    /// Disparo explícito del operador (ignora el cooldown).
    Manual,
}

impl RebalanceReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewInstance => "NEW_INSTANCE",
            Self::LostInstance => "LOST_INSTANCE",
            Self::Drift => "DRIFT",
            Self::Manual => "MANUAL",
        }
    }

    #[must_use]
    pub fn parse(raw_reason_label: &str) -> Option<Self> {
        match raw_reason_label {
            "NEW_INSTANCE" => Some(Self::NewInstance),
            "LOST_INSTANCE" => Some(Self::LostInstance),
            "DRIFT" => Some(Self::Drift),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Veredicto final de la ejecución de un plan.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceOutcome {
    /// El plan sigue en ejecución (valor transitorio de la fila).
    InProgress,
    /// Todos los movimientos del plan se confirmaron.
    Completed,
    /// Parte de los movimientos fue revertida o abandonada.
    Partial,
    /// El plan colapsó sin aplicar movimientos.
    Failed,
}

impl RebalanceOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn parse(raw_outcome_label: &str) -> Option<Self> {
        match raw_outcome_label {
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "PARTIAL" => Some(Self::Partial),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Conteo de movimientos de un tramo origen -> destino del plan.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanLegSummary {
    /// Nodo donante (nulo para colocaciones de streams sin dueño).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_instance: Option<String>,
    /// Nodo receptor del tramo.
    pub target_instance: String,
    /// Streams movidos por este tramo.
    pub stream_count: u32,
}

/// Resumen serializable del plan para la fila de auditoría.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanSummary {
    /// Total de triples (stream, origen, destino) emitidos.
    pub total_moves: u32,
    /// Desglose por tramo origen -> destino.
    pub legs: Vec<PlanLegSummary>,
}

/// Registro de auditoría (append-only) de un lote de migraciones planeado.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceEvent {
    /// Identificador único universal del evento.
    pub id: String,

    #[typeshare(serialized_as = "String")]
    pub started_at: DateTime<Utc>,

    #[typeshare(serialized_as = "String")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Disparador del plan.
    pub reason: RebalanceReason,

    /// Conteo de movimientos por tramo origen -> destino.
    pub plan_summary: PlanSummary,

    /// Veredicto de cierre; inmutable una vez concluido.
    pub outcome: RebalanceOutcome,
}

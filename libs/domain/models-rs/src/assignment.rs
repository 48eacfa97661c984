// [libs/domain/models-rs/src/assignment.rs]
/*!
 * =================================================================
 * APARATO: ASSIGNMENT DOMAIN MODELS (V15.2 - SINGLE OWNER)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: CONTRATO DE PROPIEDAD STREAM -> NODO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. OWNERSHIP ATOMICITY: Un stream activo tiene a lo sumo un dueño;
 *    la fila MIGRATING es la única ventana de doble referencia.
 * 2. AUDIT TRAIL: Las filas nunca se borran; la historia se preserva
 *    en estado RELEASED para el rastro forense.
 * 3. NOMINAL PRECISION: Nomenclatura nominal absoluta.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Ciclo de vida de una fila de asignación en el Ledger Táctico.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    /// Propiedad plena del nodo referenciado.
    Assigned,
    /// Traspaso bifásico en curso hacia 'migration_target'.
    Migrating,
    /// Propiedad devuelta; la fila permanece como evidencia histórica.
    Released,
}

impl AssignmentStatus {
    /// Representación canónica persistida en el Ledger Táctico.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "ASSIGNED",
            Self::Migrating => "MIGRATING",
            Self::Released => "RELEASED",
        }
    }

    /// Decodificación desde la columna de estado del Ledger.
    #[must_use]
    pub fn parse(raw_status_label: &str) -> Option<Self> {
        match raw_status_label {
            "ASSIGNED" => Some(Self::Assigned),
            "MIGRATING" => Some(Self::Migrating),
            "RELEASED" => Some(Self::Released),
            _ => None,
        }
    }

    /// Una fila en estos estados cuenta como propiedad viva del stream.
    #[must_use]
    pub fn is_live_ownership(&self) -> bool {
        matches!(self, Self::Assigned | Self::Migrating)
    }
}

/// Registro de propiedad (a lo sumo uno vivo) entre un stream y un nodo.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamAssignment {
    /// Clave física subrogada de la fila (el Ledger permite duplicados
    /// defectuosos que el Auditor de Consistencia debe poder representar).
    pub row_id: i64,

    /// Identificador externo del stream de audio.
    pub stream_id: i64,

    /// Nodo propietario actual (nulo solo transitoriamente en migración).
    #[serde(rename = "instance_identifier", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Estado del ciclo de vida de la fila.
    pub status: AssignmentStatus,

    /// Inicio de la propiedad vigente.
    #[typeshare(serialized_as = "String")]
    pub assigned_at: DateTime<Utc>,

    /// Nodo destino del traspaso (no nulo sii status = MIGRATING).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_target: Option<String>,

    /// Inicio de la fase MIGRATING, para el segador de migraciones colgadas.
    #[typeshare(serialized_as = "String")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_started_at: Option<DateTime<Utc>>,
}

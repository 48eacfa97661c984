// [libs/domain/models-rs/src/defect.rs]
//! =================================================================
//! APARATO: CONSISTENCY DEFECT TAXONOMY (V6.0 - AUDIT GRADE)
//! CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
//! RESPONSABILIDAD: CLASIFICACIÓN DE VIOLACIONES DE INVARIANTES
//! =================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Clases de defecto que el Auditor de Consistencia sabe detectar.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefectKind {
    /// Asignación que referencia un nodo REMOVED o inexistente.
    OrphanAssignment,
    /// Múltiples filas vivas para un mismo stream.
    DuplicateAssignment,
    /// Un nodo posee más streams que su capacidad declarada.
    CapacityOverflow,
    /// Fila en MIGRATING más allá del presupuesto de traspaso.
    StuckMigration,
    /// Stream del catálogo activo sin propietario.
    MissingAssignment,
}

impl DefectKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrphanAssignment => "ORPHAN_ASSIGNMENT",
            Self::DuplicateAssignment => "DUPLICATE_ASSIGNMENT",
            Self::CapacityOverflow => "CAPACITY_OVERFLOW",
            Self::StuckMigration => "STUCK_MIGRATION",
            Self::MissingAssignment => "MISSING_ASSIGNMENT",
        }
    }
}

/// Registro estructurado de un defecto detectado y su resolución.
///
/// Se emite siempre, incluso cuando la auto-reparación fracasa: el rastro
/// es la evidencia del Panóptico de diagnóstico.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectRecord {
    /// Clase del defecto según la taxonomía.
    pub kind: DefectKind,

    /// Streams afectados por el defecto.
    pub stream_ids: Vec<i64>,

    /// Nodo implicado, cuando el defecto es atribuible a uno.
    #[serde(rename = "instance_identifier", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Acción tomada por el auditor (o la sugerida si no pudo reparar).
    pub action_taken: String,

    /// Si la reparación automática se aplicó con éxito.
    pub auto_repaired: bool,

    #[typeshare(serialized_as = "String")]
    pub detected_at: DateTime<Utc>,
}

// [libs/infra/db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG (V9.2 - TAXONOMY SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. RETRY AUTHORITY: La clasificación transitorio/definitivo vive en el
 *    propio tipo; el Gatekeeper es el único estrato que reintenta.
 * 2. PANOPTICON COMPLIANCE: Mensajes con prefijos de estrato para su
 *    renderizado cromático en el Dashboard de operadores.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de red con el cluster libSQL.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el Dominio Rust.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    // --- ESTRATO GATEKEEPER (PROTECCIÓN DE MOTOR A) ---

    /// La operación agotó el presupuesto duro de sentencia.
    #[error("[L3_GATEKEEPER_FAULT]: STATEMENT_BUDGET_EXHAUSTED after {0} ms")]
    StatementTimeout(u64),

    /// El pool acotado no entregó conexión dentro de la espera máxima.
    #[error("[L3_GATEKEEPER_FAULT]: CONNECTION_POOL_SATURATED after {0} ms")]
    PoolExhausted(u64),

    /// El circuit breaker está abierto: fallo rápido sin tocar el Motor A.
    #[error("[L3_GATEKEEPER_FAULT]: CIRCUIT_BREAKER_OPEN retry_after={retry_after_s}s")]
    BreakerOpen { retry_after_s: u64 },

    // --- ESTRATO DE REGISTRO DE FLOTA (L2/L3) ---

    /// El nodo referenciado no existe en el registro.
    #[error("[L3_REGISTRY_FAULT]: INSTANCE_NOT_FOUND")]
    UnknownInstance,

    /// Latido con marca temporal anterior al último aceptado.
    #[error("[L3_REGISTRY_FAULT]: STALE_HEARTBEAT_REJECTED")]
    StaleHeartbeat,

    // --- ESTRATO DE PROPIEDAD DE STREAMS ---

    /// La asignación solicitada excedería la capacidad declarada del nodo.
    #[error("[L3_ASSIGNMENT_FAULT]: CAPACITY_EXCEEDED for {instance_id} (cap {capacity_max})")]
    CapacityExceeded { instance_id: String, capacity_max: u32 },

    /// Conflicto de propiedad: el stream ya tiene un dueño vivo distinto.
    #[error("[L3_ASSIGNMENT_FAULT]: OWNERSHIP_VIOLATION stream {stream_id} owned by {owner}")]
    AlreadyAssigned { stream_id: i64, owner: String },

    /// La fila no se encuentra en un estado apto para la operación.
    #[error("[L3_ASSIGNMENT_FAULT]: INVALID_STATE_TRANSITION")]
    InvalidState,

    /// Error al comprometer cambios en una secuencia multi-tabla.
    #[error("[L3_DB_FAULT]: TRANSACTION_COLLAPSE")]
    TransactionError,
}

impl DbError {
    /// Clase transitoria: elegible para reintento con backoff en el Gatekeeper.
    ///
    /// La saturación del pool queda excluida: el contrato es fallo rápido
    /// tras `POOL_WAIT`, no extender la espera con reintentos.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::StatementTimeout(_) => true,
            Self::QueryError(fault) => Self::is_contention_message(&fault.to_string()),
            _ => false,
        }
    }

    /// Sub-clase de contención (deadlock / lock de escritura del motor):
    /// amerita un único reintento inmediato antes del backoff.
    #[must_use]
    pub fn is_deadlock_class(&self) -> bool {
        match self {
            Self::QueryError(fault) => Self::is_contention_message(&fault.to_string()),
            _ => false,
        }
    }

    /// El fallo amerita una respuesta 503 con `Retry-After` en la API.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::StatementTimeout(_)
                | Self::PoolExhausted(_)
                | Self::BreakerOpen { .. }
        )
    }

    fn is_contention_message(fault_message: &str) -> bool {
        let lowered = fault_message.to_ascii_lowercase();
        lowered.contains("database is locked")
            || lowered.contains("busy")
            || lowered.contains("deadlock")
            || lowered.contains("connection reset")
    }
}

// [libs/domain/models-rs/src/command.rs]
//! =================================================================
//! APARATO: WORKER COMMAND CONTRACTS (V5.1 - ADVISORY CHANNEL)
//! CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
//! RESPONSABILIDAD: ÓRDENES SERVIDOR -> WORKER EN EL CANAL DE LATIDOS
//! =================================================================

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Orden advisoria entregada al worker en la respuesta de latido.
///
/// La migración nunca es preemptiva: el worker libera el stream antes de
/// que el nuevo propietario lo tome; estas órdenes solo informan el plan.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command_type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// El nodo debe comenzar a procesar el stream indicado.
    AddStream { stream_id: i64 },
    /// El nodo debe detener y liberar el stream indicado.
    RemoveStream { stream_id: i64 },
}

// [libs/domain/models-rs/src/wire.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATION WIRE CONTRACTS (V18.3 - PROTOCOL MASTER)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: SOBRES HTTP DEL PROTOCOLO WORKER <-> ORQUESTADOR
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. IDEMPOTENT SURFACE: Cada payload mutante carga el material necesario
 *    para que el reintento sea indistinguible del original.
 * 2. TYPESHARE SYNERGY: Contratos bit-perfectos con los workers Python y
 *    el Dashboard de operadores.
 * 3. NOMINAL PRECISION: Nomenclatura nominal absoluta.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::command::WorkerCommand;

/// Solicitud de alta (o re-enganche) de un nodo en la flota.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPayload {
    /// Identificador opaco elegido por el worker.
    #[serde(rename = "instance_identifier")]
    pub id: String,

    /// Máximo de streams concurrentes aceptados.
    pub capacity_max: u32,

    /// Dirección host+puerto para sondas de salud (opcional).
    #[serde(rename = "probe_address", skip_serializing_if = "Option::is_none", default)]
    pub address: Option<String>,

    /// Metadatos opacos del nodo (hardware, versión, región).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<serde_json::Value>,
}

/// Respuesta del alta: cadencia advertida y carga inicial earmarked.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAcknowledgement {
    /// Cadencia de latidos que el worker debe respetar.
    pub heartbeat_interval_s: u64,

    /// Streams ya earmarked para este nodo al momento del alta.
    pub initial_assignment: Vec<i64>,

    /// Órdenes pendientes acumuladas para el nodo.
    pub commands: Vec<WorkerCommand>,
}

/// Contadores de procesamiento desde el latido anterior.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProcessingMetrics {
    /// Actualizaciones de stream concluidas con éxito.
    #[typeshare(serialized_as = "number")]
    pub processed_ok: u64,
    /// Actualizaciones de stream fallidas.
    #[typeshare(serialized_as = "number")]
    pub processed_failed: u64,
}

/// Latido periódico con reporte de carga y biometría de procesamiento.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(rename = "instance_identifier")]
    pub id: String,

    /// Streams actualmente en procesamiento según el propio nodo.
    pub load: u32,

    /// Capacidad restante declarada por el nodo.
    pub available_capacity: u32,

    /// Marca temporal del worker; los latidos fuera de orden se descartan.
    #[typeshare(serialized_as = "String")]
    pub timestamp: DateTime<Utc>,

    /// Contadores de éxito/fallo desde el latido anterior.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics: Option<ProcessingMetrics>,
}

/// Respuesta del latido: órdenes advisorias del plan vigente.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAcknowledgement {
    pub commands: Vec<WorkerCommand>,
}

/// Solicitud explícita de streams earmarked para el nodo.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRequestPayload {
    #[serde(rename = "instance_identifier")]
    pub id: String,

    /// Máximo de streams que el nodo desea recibir en esta llamada.
    pub desired_count: u32,
}

/// Devolución voluntaria de propiedad de streams.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasePayload {
    #[serde(rename = "instance_identifier")]
    pub id: String,

    pub stream_ids: Vec<i64>,
}

/// Veredicto por fila de una liberación (idempotente para no-dueños).
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Streams cuya propiedad fue efectivamente devuelta.
    pub released: Vec<i64>,
    /// Streams ignorados por no pertenecer al solicitante.
    pub ignored: Vec<i64>,
}

/// Estado reportado de procesamiento de un stream individual.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamProcessingStatus {
    Processing,
    Completed,
    Failed,
}

/// Reporte por stream del resultado de procesamiento del worker.
///
/// Solo alimenta el score de rendimiento y la observabilidad; jamás muta
/// la propiedad de la asignación.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStreamPayload {
    #[serde(rename = "instance_identifier")]
    pub id: String,

    pub stream_id: i64,

    pub status: StreamProcessingStatus,

    /// Marca temporal del evento; deduplica reintentos (stream_id, timestamp).
    #[typeshare(serialized_as = "String")]
    pub timestamp: DateTime<Utc>,

    /// Huella o detalle opaco del resultado de fingerprinting.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<serde_json::Value>,
}

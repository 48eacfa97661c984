// [apps/orchestrator/src/services/mod.rs]
//! =================================================================
//! APARATO: BACKGROUND SERVICE MATRIX (V7.0)
//! CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
//! =================================================================

/// Espejo periódico del catálogo externo de streams.
pub mod catalog_sync;
/// Auditor de invariantes y auto-reparación de defectos.
pub mod consistency_auditor;
/// Barrido de latidos y detección de fallos de nodos.
pub mod heartbeat_sentinel;
/// Evaluación de deriva y ejecución por lotes de planes de migración.
pub mod rebalance_conductor;
/// Higiene del proceso: transacciones rezagadas y bóveda idempotente.
pub mod reaper;
/// Recuperación de emergencia (idempotente) de nodos caídos.
pub mod recovery;

pub use consistency_auditor::ConsistencyAuditorService;
pub use heartbeat_sentinel::HeartbeatSentinelService;
pub use rebalance_conductor::RebalanceConductorService;
pub use reaper::spawn_reaper;

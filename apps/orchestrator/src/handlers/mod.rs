// [apps/orchestrator/src/handlers/mod.rs]
//! =================================================================
//! APARATO: HANDLER ACCESS MATRIX (V6.0)
//! CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
//! =================================================================

/// Mando del operador: diagnóstico, rebalanceo y recuperación forzosa.
pub mod admin;
/// Salud y preparación del proceso.
pub mod diagnostics;
/// Protocolo táctico del enjambre de workers.
pub mod swarm;

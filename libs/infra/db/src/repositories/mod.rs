// [libs/infra/db/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ACCESS MATRIX (V8.0 - TOPOLOGY MASTER)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ORQUESTACIÓN DE SUBSISTEMAS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ACCESS SOVEREIGNTY: Solo las estructuras de autoridad (Repositories)
 *    se exponen al exterior, reduciendo el acoplamiento sistémico.
 * 2. GATEKEEPER DISCIPLINE: Ningún repositorio toca el Motor A sin pasar
 *    por run_read / run_write del Gatekeeper.
 * =================================================================
 */

// --- ESTRATO 1: REGISTRO DE FLOTA ---

/// Directorio durable de nodos: altas, latidos y máquina de estados.
pub mod instance;

// --- ESTRATO 2: PROPIEDAD DE STREAMS ---

/// Ledger de asignaciones: propiedad única, migración bifásica y diagnósticos.
pub mod assignment;

// --- ESTRATO 3: AUDITORÍA Y CATÁLOGO ---

/// Rastro append-only de planes de rebalanceo.
pub mod rebalance;
/// Espejo de solo lectura del catálogo externo de streams.
pub mod catalog;

// --- RE-EXPORTACIONES SOBERANAS (NOMINAL ACCESS API) ---

pub use assignment::{AssignmentRepository, BatchApplication, ForcedResolution, MigrationDirective};
pub use catalog::CatalogRepository;
pub use instance::{InstanceRegistration, InstanceRepository, RegistrationVerdict, SilenceTransition};
pub use rebalance::RebalanceRepository;

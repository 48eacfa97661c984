// [libs/domain/balancer/src/lib.rs]
/*!
 * =================================================================
 * APARATO: LOAD BALANCER BARREL (V7.0 - PURE STRATA)
 * CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
 * RESPONSABILIDAD: EXPOSICIÓN DEL MOTOR PURO DE BALANCEO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ZERO STATE: El balanceador no posee estado ni back-pointers;
 *    consume snapshots inmutables y emite planes que los stores aplican.
 * 2. DETERMINISM: Mismo snapshot -> mismo plan, bit a bit. Todos los
 *    desempates están totalmente ordenados.
 * =================================================================
 */

pub mod engine;
pub mod plan;
pub mod snapshot;

pub use engine::{construct_migration_plan, evaluate_balance, propose_plan, BalanceVerdict, ImbalanceTrigger};
pub use plan::{MigrationPlan, MigrationTriple};
pub use snapshot::{BalancerSnapshot, BalancerThresholds, InstanceView, StreamHolding};

// [libs/infra/db/src/lib.rs]
/*!
 * =================================================================
 * APARATO: INFRA-DB BARREL (V6.0 - GATEKEEPER SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN NOMINAL DEL GATEKEEPER Y REPOSITORIOS
 * =================================================================
 */

pub mod breaker;
pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use breaker::{BreakerPolicy, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use client::{
    GatekeeperClient, GatekeeperFuture, GatekeeperHealth, GatekeeperPolicy, OverdueOperation,
};
pub use errors::DbError;

// [tests/mirror/libs/infra/db/gatekeeper_breaker.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL GATEKEEPER (V4.0 - FAIL FAST)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE BREAKER, POOL Y CLASIFICACIÓN DE FALLOS
 *
 * # Mathematical Proof (Fail-Fast Bound):
 * Tras FAILURE_THRESHOLD fallos consecutivos, la siguiente llamada debe
 * fallar en O(1) sin tocar el Motor A, hasta agotar RECOVERY_TIMEOUT;
 * una sonda exitosa por SUCCESS_THRESHOLD veces re-cierra el circuito.
 * =================================================================
 */

use std::time::Duration;

use fingerswarm_infra_db::{
    BreakerPolicy, BreakerState, DbError, GatekeeperClient, GatekeeperPolicy,
};

fn fast_breaker_policy() -> GatekeeperPolicy {
    GatekeeperPolicy {
        pool_capacity: 2,
        pool_wait: Duration::from_millis(100),
        statement_budget: Duration::from_secs(5),
        max_retries: 0,
        backoff_base: Duration::from_millis(10),
        backoff_cap: Duration::from_millis(50),
        breaker: BreakerPolicy {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(200),
            success_threshold: 2,
        },
    }
}

/// Operación venenosa: SQL contra una tabla inexistente.
async fn poison_operation(gatekeeper: &GatekeeperClient) -> Result<u64, DbError> {
    gatekeeper
        .run_write("mirror_poison", |connection| {
            Box::pin(async move {
                let affected = connection
                    .execute("INSERT INTO ghost_table (value) VALUES (1)", ())
                    .await?;
                Ok(affected)
            })
        })
        .await
}

/// Operación nominal: lectura trivial contra el esquema real.
async fn nominal_operation(gatekeeper: &GatekeeperClient) -> Result<i64, DbError> {
    gatekeeper
        .run_read("mirror_nominal", |connection| {
            Box::pin(async move {
                let mut rows = connection
                    .query("SELECT COUNT(*) FROM instances", ())
                    .await?;
                match rows.next().await? {
                    Some(row) => Ok(row.get::<i64>(0)?),
                    None => Ok(0),
                }
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn certify_breaker_opens_and_recovers() {
        println!("\n🔌 [INICIO]: Auditing circuit breaker lifecycle...");
        let gatekeeper = GatekeeperClient::connect(
            "file:mem_breaker_lifecycle?mode=memory&cache=shared",
            None,
            fast_breaker_policy(),
        )
        .await
        .expect("CRITICAL_FAULT: Failed to anchor in-memory tactical ledger.");

        // 1. FALLOS CONSECUTIVOS: el veneno cruza el umbral (2).
        for _ in 0..2 {
            let poison_outcome = poison_operation(&gatekeeper).await;
            assert!(matches!(poison_outcome, Err(DbError::QueryError(_))));
        }
        assert_eq!(gatekeeper.health().breaker.state, BreakerState::Open);

        // 2. CORTOCIRCUITO: fallo rápido sin tocar el Motor A.
        let short_circuit_outcome = nominal_operation(&gatekeeper).await;
        assert!(matches!(short_circuit_outcome, Err(DbError::BreakerOpen { .. })));

        // 3. CUARENTENA AGOTADA: la sonda única entra y certifica.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(nominal_operation(&gatekeeper).await.is_ok(), "first probe");
        assert_eq!(gatekeeper.health().breaker.state, BreakerState::HalfOpen);
        assert!(nominal_operation(&gatekeeper).await.is_ok(), "second probe");
        assert_eq!(gatekeeper.health().breaker.state, BreakerState::Closed);

        // 4. OPERACIÓN NOMINAL RESTABLECIDA.
        assert!(nominal_operation(&gatekeeper).await.is_ok());

        println!("✅ [VEREDICTO]: Breaker lifecycle certified.");
    }

    #[tokio::test]
    async fn certify_domain_outcomes_do_not_poison_breaker() {
        println!("\n⚖️  [INICIO]: Auditing breaker neutrality on domain outcomes...");
        let gatekeeper = GatekeeperClient::connect(
            "file:mem_breaker_neutrality?mode=memory&cache=shared",
            None,
            fast_breaker_policy(),
        )
        .await
        .expect("ledger anchor");

        // Un desenlace de dominio (fila ausente) no es enfermedad del motor.
        for _ in 0..5 {
            let domain_outcome: Result<(), DbError> = gatekeeper
                .run_write("mirror_domain_verdict", |_connection| {
                    Box::pin(async move { Err(DbError::UnknownInstance) })
                })
                .await;
            assert!(matches!(domain_outcome, Err(DbError::UnknownInstance)));
        }

        assert_eq!(
            gatekeeper.health().breaker.state,
            BreakerState::Closed,
            "ANOMALY: domain verdicts must not open the breaker"
        );

        println!("✅ [VEREDICTO]: Breaker neutrality certified.");
    }

    #[tokio::test]
    async fn certify_health_radiography_shape() {
        let gatekeeper = GatekeeperClient::connect(
            "file:mem_breaker_health?mode=memory&cache=shared",
            None,
            fast_breaker_policy(),
        )
        .await
        .expect("ledger anchor");

        let radiography = gatekeeper.health();
        assert_eq!(radiography.pool_capacity, 2);
        assert_eq!(radiography.pool_available, 2);
        assert_eq!(radiography.in_flight_operations, 0);
        assert_eq!(radiography.breaker.state, BreakerState::Closed);
        assert!(gatekeeper.overdue_operations().is_empty());
    }
}

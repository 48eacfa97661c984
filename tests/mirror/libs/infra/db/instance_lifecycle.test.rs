// [tests/mirror/libs/infra/db/instance_lifecycle.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE CICLO DE VIDA DE NODOS (V5.0 - VITALITY)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE LA MÁQUINA DE ESTADOS DE LA FLOTA
 *
 * # Mathematical Proof (Monotonic Lifecycle):
 * El test certifica que la secuencia REGISTERED -> ACTIVE -> WARNING ->
 * INACTIVE -> RECOVERING -> ACTIVE es estrictamente monótona en el
 * tiempo y que ningún latido fuera de orden la retrocede.
 * =================================================================
 */

use chrono::{Duration, Utc};
use fingerswarm_domain_models::InstanceStatus;
use fingerswarm_infra_db::repositories::{InstanceRegistration, InstanceRepository, RegistrationVerdict};
use fingerswarm_infra_db::{DbError, GatekeeperClient, GatekeeperPolicy};

async fn anchor_memory_ledger(anchor_name: &str) -> GatekeeperClient {
    GatekeeperClient::connect(
        &format!("file:{anchor_name}?mode=memory&cache=shared"),
        None,
        GatekeeperPolicy::default(),
    )
    .await
    .expect("CRITICAL_FAULT: Failed to anchor in-memory tactical ledger.")
}

fn registration(identifier: &str, capacity_max: u32) -> InstanceRegistration {
    InstanceRegistration {
        id: identifier.to_string(),
        capacity_max,
        address: None,
        metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn certify_registration_and_reattach_semantics() {
        println!("\n🛰️  [INICIO]: Auditing fleet registration semantics...");
        let gatekeeper = anchor_memory_ledger("mem_registry_reattach").await;
        let registry = InstanceRepository::new(gatekeeper);

        let (genesis_instance, genesis_verdict) = registry
            .register(registration("worker-alpha", 10))
            .await
            .expect("genesis registration");
        assert_eq!(genesis_verdict, RegistrationVerdict::Registered);
        assert_eq!(genesis_instance.status, InstanceStatus::Registered);
        assert_eq!(genesis_instance.failure_count, 0);

        // Re-enganche: registered_at intacto, capacidad refrescada.
        let (reattached_instance, reattach_verdict) = registry
            .register(registration("worker-alpha", 16))
            .await
            .expect("reattach registration");
        assert_eq!(reattach_verdict, RegistrationVerdict::Reattached);
        assert_eq!(reattached_instance.capacity_max, 16);
        assert_eq!(
            reattached_instance.registered_at, genesis_instance.registered_at,
            "ANOMALY: reattach must never lose registered_at"
        );

        println!("✅ [VEREDICTO]: Registration semantics certified.");
    }

    #[tokio::test]
    async fn certify_heartbeat_monotonicity_and_state_machine() {
        println!("\n🩺 [INICIO]: Auditing heartbeat state machine...");
        let gatekeeper = anchor_memory_ledger("mem_registry_heartbeats").await;
        let registry = InstanceRepository::new(gatekeeper);

        registry
            .register(registration("worker-beta", 8))
            .await
            .expect("registration");

        let genesis_beat = Utc::now();

        // Primer latido: REGISTERED -> ACTIVE.
        let (active_instance, previous_status) = registry
            .record_heartbeat("worker-beta", genesis_beat, Some(1.0), 2)
            .await
            .expect("first heartbeat");
        assert_eq!(previous_status, InstanceStatus::Registered);
        assert_eq!(active_instance.status, InstanceStatus::Active);

        // Latido duplicado / fuera de orden: rechazado sin retroceso.
        let stale_outcome = registry
            .record_heartbeat("worker-beta", genesis_beat, None, 2)
            .await;
        assert!(matches!(stale_outcome, Err(DbError::StaleHeartbeat)));

        // Nodo desconocido.
        let unknown_outcome = registry
            .record_heartbeat("worker-ghost", genesis_beat, None, 2)
            .await;
        assert!(matches!(unknown_outcome, Err(DbError::UnknownInstance)));

        // Silencio de 100s: ACTIVE -> WARNING.
        let transitions = registry
            .sweep_silence(genesis_beat + Duration::seconds(100), 90, 180, 86_400)
            .await
            .expect("warning sweep");
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to_status, InstanceStatus::Warning);

        // Silencio de 200s: WARNING -> INACTIVE (failure_count crece).
        let transitions = registry
            .sweep_silence(genesis_beat + Duration::seconds(200), 90, 180, 86_400)
            .await
            .expect("inactive sweep");
        assert_eq!(transitions[0].to_status, InstanceStatus::Inactive);

        let fallen_instance = registry
            .get("worker-beta")
            .await
            .expect("lookup")
            .expect("instance present");
        assert_eq!(fallen_instance.failure_count, 1);

        // Reaparición: INACTIVE -> RECOVERING -> ACTIVE en K=2 latidos.
        let (recovering_instance, _) = registry
            .record_heartbeat("worker-beta", genesis_beat + Duration::seconds(210), None, 2)
            .await
            .expect("recovery heartbeat");
        assert_eq!(recovering_instance.status, InstanceStatus::Recovering);
        assert_eq!(recovering_instance.recovery_streak, 1);

        let (recovered_instance, previous_status) = registry
            .record_heartbeat("worker-beta", genesis_beat + Duration::seconds(240), None, 2)
            .await
            .expect("confirmation heartbeat");
        assert_eq!(previous_status, InstanceStatus::Recovering);
        assert_eq!(recovered_instance.status, InstanceStatus::Active);
        assert_eq!(
            recovered_instance.failure_count, 0,
            "ANOMALY: clean recovery must reset the failure counter"
        );

        println!("✅ [VEREDICTO]: State machine certified.");
    }

    #[tokio::test]
    async fn certify_removal_timeout_and_performance_blend() {
        println!("\n⚫ [INICIO]: Auditing removal timeout...");
        let gatekeeper = anchor_memory_ledger("mem_registry_removal").await;
        let registry = InstanceRepository::new(gatekeeper);

        registry
            .register(registration("worker-gamma", 4))
            .await
            .expect("registration");

        let genesis_beat = Utc::now();
        registry
            .record_heartbeat("worker-gamma", genesis_beat, Some(0.5), 2)
            .await
            .expect("first heartbeat");

        // Cadena de silencio hasta el retiro definitivo.
        for (offset_seconds, expected_status) in [
            (100, InstanceStatus::Warning),
            (200, InstanceStatus::Inactive),
            (90_000, InstanceStatus::Removed),
        ] {
            let transitions = registry
                .sweep_silence(genesis_beat + Duration::seconds(offset_seconds), 90, 180, 86_400)
                .await
                .expect("silence sweep");
            assert_eq!(transitions.len(), 1, "one transition per sweep");
            assert_eq!(transitions[0].to_status, expected_status);
        }

        // Un nodo retirado no acepta latidos: debe re-registrarse.
        let retired_outcome = registry
            .record_heartbeat("worker-gamma", genesis_beat + Duration::seconds(90_100), None, 2)
            .await;
        assert!(matches!(retired_outcome, Err(DbError::UnknownInstance)));

        // El score mezcla con alpha = 0.3 y señal recortada.
        let (scored_instance, _) = {
            let gatekeeper = anchor_memory_ledger("mem_registry_score").await;
            let registry = InstanceRepository::new(gatekeeper);
            registry.register(registration("worker-delta", 4)).await.expect("registration");
            registry
                .record_heartbeat("worker-delta", Utc::now(), Some(1.0), 2)
                .await
                .expect("scored heartbeat")
        };
        let expected_blend = 0.3 * 1.0 + 0.7 * 0.5;
        assert!(
            (scored_instance.performance_score - expected_blend).abs() < 1e-9,
            "ANOMALY: EMA blend drifted to {}",
            scored_instance.performance_score
        );

        println!("✅ [VEREDICTO]: Removal timeout and scoring certified.");
    }
}

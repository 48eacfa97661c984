// [tests/mirror/apps/orchestrator/fleet_convergence.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE CONVERGENCIA DE FLOTA (V7.0 - END TO END)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L1-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE DISTRIBUCIÓN, PÉRDIDA Y RECUPERACIÓN
 *
 * # Mathematical Proof (Convergence Under Churn):
 * Arranque limpio, pérdida de nodo y re-aparición convergen todos a una
 * distribución con dispersión máxima 1 sobre capacidades uniformes, con
 * el rastro de auditoría sellado una vez por plan.
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use fingerswarm_domain_models::{InstanceStatus, RebalanceReason};
use fingerswarm_infra_db::repositories::InstanceRegistration;
use fingerswarm_infra_db::{GatekeeperClient, GatekeeperPolicy};
use fingerswarm_orchestrator::config::OrchestratorConfig;
use fingerswarm_orchestrator::services::rebalance_conductor::execute_plan_cycle;
use fingerswarm_orchestrator::state::AppState;

fn test_configuration() -> OrchestratorConfig {
    OrchestratorConfig {
        listening_port: 0,
        database_connection_url: "unused-in-mirror".into(),
        database_access_token: None,
        worker_auth_token: String::new(),
        operator_auth_token: String::new(),
        heartbeat_interval_s: 30,
        warn_threshold_s: 90,
        inactive_threshold_s: 180,
        removal_timeout_s: 86_400,
        emergency_threshold_s: 600,
        redistribution_deadline_s: 60,
        recovery_confirmation_beats: 2,
        imbalance_threshold: 0.15,
        max_stream_difference: 3,
        migration_batch: 50,
        migration_step_ms: 10,
        migration_timeout_s: 1,
        rebalance_cooldown_s: 300,
        pool_capacity: 10,
        pool_wait_s: 5,
        txn_max_duration_s: 30,
        max_retries: 3,
        breaker_failure_threshold: 5,
        breaker_recovery_timeout_s: 60,
        breaker_success_threshold: 3,
        heartbeat_scan_interval_s: 30,
        consistency_scan_interval_s: 120,
        balancer_tick_interval_s: 60,
        catalog_refresh_s: 300,
        reaper_interval_s: 10,
        request_timeout_s: 15,
        idempotency_ttl_s: 300,
    }
}

async fn forge_control_plane(anchor_name: &str) -> AppState {
    let gatekeeper = GatekeeperClient::connect(
        &format!("file:{anchor_name}?mode=memory&cache=shared"),
        None,
        GatekeeperPolicy::default(),
    )
    .await
    .expect("CRITICAL_FAULT: Failed to anchor in-memory tactical ledger.");

    AppState::new(gatekeeper, test_configuration())
}

async fn provision_active_node(state: &AppState, identifier: &str, capacity_max: u32, beat: DateTime<Utc>) {
    state
        .instance_repository
        .register(InstanceRegistration {
            id: identifier.to_string(),
            capacity_max,
            address: None,
            metadata: None,
        })
        .await
        .expect("node registration");
    state
        .instance_repository
        .record_heartbeat(identifier, beat, Some(1.0), 2)
        .await
        .expect("activation heartbeat");
}

async fn prime_catalog(state: &AppState, stream_ids: Vec<i64>) {
    state
        .catalog_repository
        .seed_streams(stream_ids)
        .await
        .expect("catalog seeding");
    let mirrored = state
        .catalog_repository
        .list_active_streams()
        .await
        .expect("catalog mirror");
    state.refresh_catalog_snapshot(mirrored);
}

async fn owned_count(state: &AppState, identifier: &str) -> u32 {
    state
        .assignment_repository
        .count_live_for_instance(identifier)
        .await
        .expect("ownership count")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn certify_fresh_start_loss_and_recovery_convergence() {
        println!("\n🛰️  [INICIO]: Auditing fleet convergence under churn...");
        let state = forge_control_plane("mem_fleet_convergence").await;
        prime_catalog(&state, (1..=10).collect()).await;

        let genesis_beat = Utc::now();

        // --- FASE 1: ARRANQUE LIMPIO Y DISTRIBUCIÓN UNIFORME ---
        provision_active_node(&state, "worker-a", 10, genesis_beat).await;
        provision_active_node(&state, "worker-b", 10, genesis_beat).await;
        provision_active_node(&state, "worker-c", 10, genesis_beat).await;

        execute_plan_cycle(&state, RebalanceReason::Manual)
            .await
            .expect("fresh-start plan");

        let mut initial_loads = vec![
            owned_count(&state, "worker-a").await,
            owned_count(&state, "worker-b").await,
            owned_count(&state, "worker-c").await,
        ];
        assert_eq!(initial_loads.iter().sum::<u32>(), 10, "full catalog coverage");
        initial_loads.sort_unstable();
        assert!(
            initial_loads[2] - initial_loads[0] <= 1,
            "ANOMALY: uniform fleet must converge to max-min <= 1, got {initial_loads:?}"
        );
        println!("  ↳ Phase 1 verified: distribution {initial_loads:?}.");

        // --- FASE 2: PÉRDIDA DE NODO (B ENMUDECE 200s) ---
        // A y C siguen latiendo; B guarda silencio absoluto.
        for (identifier, offset) in [("worker-a", 95), ("worker-c", 95)] {
            state
                .instance_repository
                .record_heartbeat(identifier, genesis_beat + Duration::seconds(offset), None, 2)
                .await
                .expect("fresh heartbeat");
        }
        let transitions = state
            .instance_repository
            .sweep_silence(genesis_beat + Duration::seconds(100), 90, 180, 86_400)
            .await
            .expect("warning sweep");
        assert!(transitions
            .iter()
            .any(|transition| transition.instance_id == "worker-b"
                && transition.to_status == InstanceStatus::Warning));

        for (identifier, offset) in [("worker-a", 190), ("worker-c", 190)] {
            state
                .instance_repository
                .record_heartbeat(identifier, genesis_beat + Duration::seconds(offset), None, 2)
                .await
                .expect("fresh heartbeat");
        }
        let transitions = state
            .instance_repository
            .sweep_silence(genesis_beat + Duration::seconds(200), 90, 180, 86_400)
            .await
            .expect("inactive sweep");
        assert!(transitions
            .iter()
            .any(|transition| transition.instance_id == "worker-b"
                && transition.to_status == InstanceStatus::Inactive));

        // Redistribución del sentinel: resolución forzosa + plan inmediato.
        state
            .assignment_repository
            .force_resolve_for_instance("worker-b")
            .await
            .expect("forced resolution");
        execute_plan_cycle(&state, RebalanceReason::LostInstance)
            .await
            .expect("lost-instance plan");

        assert_eq!(owned_count(&state, "worker-b").await, 0, "B must own nothing");
        let survivor_loads =
            [owned_count(&state, "worker-a").await, owned_count(&state, "worker-c").await];
        assert_eq!(survivor_loads.iter().sum::<u32>(), 10, "survivors absorb the catalog");
        assert!(survivor_loads[0].abs_diff(survivor_loads[1]) <= 1);

        let lost_instance_events = state
            .rebalance_repository
            .recent(50)
            .await
            .expect("audit history")
            .into_iter()
            .filter(|event| event.reason == RebalanceReason::LostInstance)
            .count();
        assert_eq!(lost_instance_events, 1, "exactly one LOST_INSTANCE event recorded");
        println!("  ↳ Phase 2 verified: survivors at {survivor_loads:?}.");

        // --- FASE 3: REAPARICIÓN DE B (RECOVERING -> ACTIVE) ---
        let (recovering_instance, _) = state
            .instance_repository
            .record_heartbeat("worker-b", genesis_beat + Duration::seconds(260), None, 2)
            .await
            .expect("resurrection heartbeat");
        assert_eq!(recovering_instance.status, InstanceStatus::Recovering);

        let (recovered_instance, previous_status) = state
            .instance_repository
            .record_heartbeat("worker-b", genesis_beat + Duration::seconds(290), None, 2)
            .await
            .expect("confirmation heartbeat");
        assert_eq!(previous_status, InstanceStatus::Recovering);
        assert_eq!(recovered_instance.status, InstanceStatus::Active);

        execute_plan_cycle(&state, RebalanceReason::NewInstance)
            .await
            .expect("new-instance plan");

        let mut final_loads = vec![
            owned_count(&state, "worker-a").await,
            owned_count(&state, "worker-b").await,
            owned_count(&state, "worker-c").await,
        ];
        assert!(final_loads[1] > 0 || final_loads.iter().sum::<u32>() == 10);
        assert_eq!(final_loads.iter().sum::<u32>(), 10);
        final_loads.sort_unstable();
        assert!(
            final_loads[2] - final_loads[0] <= 1,
            "ANOMALY: post-recovery distribution drifted: {final_loads:?}"
        );

        println!("✅ [VEREDICTO]: Convergence under churn certified: {final_loads:?}.");
    }

    #[tokio::test]
    async fn certify_capacity_squeeze_reports_shortfall() {
        println!("\n📉 [INICIO]: Auditing capacity squeeze...");
        let state = forge_control_plane("mem_capacity_squeeze").await;
        prime_catalog(&state, (1..=12).collect()).await;

        let genesis_beat = Utc::now();
        provision_active_node(&state, "worker-a", 5, genesis_beat).await;
        provision_active_node(&state, "worker-b", 5, genesis_beat).await;

        execute_plan_cycle(&state, RebalanceReason::Manual)
            .await
            .expect("squeeze plan");

        // La capacidad agregada (10) absorbe lo que puede; sin desbordes.
        assert_eq!(owned_count(&state, "worker-a").await, 5);
        assert_eq!(owned_count(&state, "worker-b").await, 5);

        // El déficit (2 streams) aflora como defecto de cobertura.
        let defects =
            fingerswarm_orchestrator::services::consistency_auditor::detect_defects(&state)
                .await
                .expect("defect scan");
        let missing_defect = defects
            .iter()
            .find(|defect| {
                defect.kind == fingerswarm_domain_models::DefectKind::MissingAssignment
            })
            .expect("shortfall must surface as MISSING_ASSIGNMENT");
        assert_eq!(missing_defect.stream_ids.len(), 2);

        println!("✅ [VEREDICTO]: Capacity squeeze certified.");
    }
}

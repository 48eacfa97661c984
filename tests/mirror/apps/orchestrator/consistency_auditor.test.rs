// [tests/mirror/apps/orchestrator/consistency_auditor.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL AUDITOR DE CONSISTENCIA (V6.0 - TAXONOMY)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L1-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE DETECCIÓN Y REPARACIÓN DE DEFECTOS
 *
 * # Mathematical Proof (Unambiguous Repair):
 * Cada clase de defecto inyectada directamente en el Ledger (simulando
 * corrupción externa) debe ser clasificada, reparada de forma
 * determinista y dejar evidencia en el journal.
 * =================================================================
 */

use chrono::{Duration, Utc};
use fingerswarm_domain_models::{AssignmentStatus, DefectKind, InstanceStatus};
use fingerswarm_infra_db::repositories::InstanceRegistration;
use fingerswarm_infra_db::{GatekeeperClient, GatekeeperPolicy};
use fingerswarm_orchestrator::config::OrchestratorConfig;
use fingerswarm_orchestrator::services::consistency_auditor::{detect_defects, run_repair_cycle};
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn certify_duplicate_resolution_keeps_freshest_active_owner() {
        println!("\n⚖️  [INICIO]: Auditing duplicate ownership resolution...");
        let state = forge_control_plane("mem_auditor_duplicates").await;

        state.catalog_repository.seed_streams(vec![5]).await.expect("catalog");
        state.refresh_catalog_snapshot(vec![5]);

        let genesis_beat = Utc::now();
        for identifier in ["worker-a", "worker-c"] {
            state
                .instance_repository
                .register(InstanceRegistration {
                    id: identifier.to_string(),
                    capacity_max: 10,
                    address: None,
                    metadata: None,
                })
                .await
                .expect("registration");
        }
        // C late primero; A tiene el latido más reciente.
        state
            .instance_repository
            .record_heartbeat("worker-c", genesis_beat, Some(1.0), 2)
            .await
            .expect("c heartbeat");
        state
            .instance_repository
            .record_heartbeat("worker-a", genesis_beat + Duration::seconds(10), Some(1.0), 2)
            .await
            .expect("a heartbeat");

        state
            .assignment_repository
            .assign(vec![5], "worker-a")
            .await
            .expect("legitimate ownership");

        // Inyección de corrupción: segunda fila viva para el stream 5.
        let raw_connection = state.gatekeeper.get_connection().expect("raw connection");
        raw_connection
            .execute(
                "INSERT INTO assignments (stream_id, instance_id, status, assigned_at)
                 VALUES (5, 'worker-c', 'ASSIGNED', ?1)",
                libsql::params![Utc::now().to_rfc3339()],
            )
            .await
            .expect("defect injection");

        let defects = run_repair_cycle(&state).await.expect("repair cycle");
        let duplicate_defect = defects
            .iter()
            .find(|defect| defect.kind == DefectKind::DuplicateAssignment)
            .expect("duplicate must be classified");
        assert_eq!(duplicate_defect.stream_ids, vec![5]);
        assert!(duplicate_defect.auto_repaired);

        // Exactamente un dueño sobrevive: el del latido más reciente (A).
        let live_rows = state.assignment_repository.list_live().await.expect("live view");
        let owners: Vec<_> =
            live_rows.iter().filter(|row| row.stream_id == 5).collect();
        assert_eq!(owners.len(), 1, "single ownership restored");
        assert_eq!(owners[0].instance_id.as_deref(), Some("worker-a"));

        // Evidencia en el journal.
        assert!(!state.defect_journal_view().is_empty());

        println!("✅ [VEREDICTO]: Duplicate resolution certified.");
    }

    #[tokio::test]
    async fn certify_orphan_overflow_and_missing_taxonomy() {
        println!("\n⚖️  [INICIO]: Auditing orphan/overflow/missing taxonomy...");
        let state = forge_control_plane("mem_auditor_taxonomy").await;

        state.catalog_repository.seed_streams(vec![1, 2, 3]).await.expect("catalog");
        state.refresh_catalog_snapshot(vec![1, 2, 3]);

        let genesis_beat = Utc::now();
        state
            .instance_repository
            .register(InstanceRegistration {
                id: "worker-d".into(),
                capacity_max: 1,
                address: None,
                metadata: None,
            })
            .await
            .expect("registration");
        state
            .instance_repository
            .record_heartbeat("worker-d", genesis_beat, Some(1.0), 2)
            .await
            .expect("heartbeat");

        let raw_connection = state.gatekeeper.get_connection().expect("raw connection");

        // Huérfano: fila viva hacia un nodo inexistente.
        raw_connection
            .execute(
                "INSERT INTO assignments (stream_id, instance_id, status, assigned_at)
                 VALUES (1, 'worker-ghost', 'ASSIGNED', ?1)",
                libsql::params![genesis_beat.to_rfc3339()],
            )
            .await
            .expect("orphan injection");

        // Desborde: dos filas vivas sobre capacidad 1 (la más reciente sobra).
        raw_connection
            .execute(
                "INSERT INTO assignments (stream_id, instance_id, status, assigned_at)
                 VALUES (20, 'worker-d', 'ASSIGNED', ?1)",
                libsql::params![genesis_beat.to_rfc3339()],
            )
            .await
            .expect("overflow injection base");
        raw_connection
            .execute(
                "INSERT INTO assignments (stream_id, instance_id, status, assigned_at)
                 VALUES (21, 'worker-d', 'ASSIGNED', ?1)",
                libsql::params![(genesis_beat + Duration::seconds(30)).to_rfc3339()],
            )
            .await
            .expect("overflow injection excess");

        let defects = run_repair_cycle(&state).await.expect("repair cycle");

        let orphan_defect = defects
            .iter()
            .find(|defect| defect.kind == DefectKind::OrphanAssignment)
            .expect("orphan classified");
        assert_eq!(orphan_defect.stream_ids, vec![1]);
        assert!(orphan_defect.auto_repaired);

        let overflow_defect = defects
            .iter()
            .find(|defect| defect.kind == DefectKind::CapacityOverflow)
            .expect("overflow classified");
        assert_eq!(overflow_defect.stream_ids, vec![21], "most recent excess released");

        let missing_defect = defects
            .iter()
            .find(|defect| defect.kind == DefectKind::MissingAssignment)
            .expect("missing coverage classified");
        assert!(missing_defect.stream_ids.contains(&1), "released orphan re-surfaces");
        assert!(missing_defect.stream_ids.contains(&2));
        assert!(missing_defect.stream_ids.contains(&3));
        assert!(!missing_defect.auto_repaired, "coverage belongs to the next plan");

        // Estado final del Ledger: D conserva exactamente su capacidad.
        assert_eq!(
            state
                .assignment_repository
                .count_live_for_instance("worker-d")
                .await
                .expect("count"),
            1
        );

        println!("✅ [VEREDICTO]: Taxonomy repairs certified.");
    }

    #[tokio::test]
    async fn certify_stuck_migration_resolution_by_target_vitality() {
        println!("\n⏱️  [INICIO]: Auditing stuck migration resolution...");
        let state = forge_control_plane("mem_auditor_stuck").await;

        state.catalog_repository.seed_streams(vec![3, 4]).await.expect("catalog");
        state.refresh_catalog_snapshot(vec![3, 4]);

        let genesis_beat = Utc::now();
        for identifier in ["worker-a", "worker-c"] {
            state
                .instance_repository
                .register(InstanceRegistration {
                    id: identifier.to_string(),
                    capacity_max: 10,
                    address: None,
                    metadata: None,
                })
                .await
                .expect("registration");
            state
                .instance_repository
                .record_heartbeat(identifier, genesis_beat, Some(1.0), 2)
                .await
                .expect("heartbeat");
        }

        let raw_connection = state.gatekeeper.get_connection().expect("raw connection");
        let stale_migration_clock = (genesis_beat - Duration::seconds(60)).to_rfc3339();

        // Migración colgada hacia un destino ACTIVE: debe comprometerse.
        raw_connection
            .execute(
                "INSERT INTO assignments (stream_id, instance_id, status, assigned_at, migration_target, migration_started_at)
                 VALUES (3, 'worker-a', 'MIGRATING', ?1, 'worker-c', ?2)",
                libsql::params![stale_migration_clock.clone(), stale_migration_clock.clone()],
            )
            .await
            .expect("stuck toward live target");

        // Migración colgada hacia un destino fantasma: debe revertirse.
        raw_connection
            .execute(
                "INSERT INTO assignments (stream_id, instance_id, status, assigned_at, migration_target, migration_started_at)
                 VALUES (4, 'worker-a', 'MIGRATING', ?1, 'worker-ghost', ?2)",
                libsql::params![stale_migration_clock.clone(), stale_migration_clock],
            )
            .await
            .expect("stuck toward ghost target");

        // Primero en modo detección: nada muta, solo sugerencias.
        let suggested = detect_defects(&state).await.expect("detection scan");
        assert_eq!(
            suggested
                .iter()
                .filter(|defect| defect.kind == DefectKind::StuckMigration)
                .count(),
            2
        );

        let defects = run_repair_cycle(&state).await.expect("repair cycle");
        assert_eq!(
            defects
                .iter()
                .filter(|defect| defect.kind == DefectKind::StuckMigration && defect.auto_repaired)
                .count(),
            2
        );

        let live_rows = state.assignment_repository.list_live().await.expect("live view");

        let committed_row = live_rows
            .iter()
            .find(|row| row.stream_id == 3)
            .expect("stream 3 alive");
        assert_eq!(committed_row.status, AssignmentStatus::Assigned);
        assert_eq!(
            committed_row.instance_id.as_deref(),
            Some("worker-c"),
            "live target confirmed the handoff"
        );

        let reverted_row = live_rows
            .iter()
            .find(|row| row.stream_id == 4)
            .expect("stream 4 alive");
        assert_eq!(reverted_row.status, AssignmentStatus::Assigned);
        assert_eq!(
            reverted_row.instance_id.as_deref(),
            Some("worker-a"),
            "silent target reverts to source"
        );

        // La flota sigue íntegra tras la resolución.
        let fleet = state.instance_repository.list_all().await.expect("fleet view");
        assert!(fleet.iter().all(|node| node.status == InstanceStatus::Active));

        println!("✅ [VEREDICTO]: Stuck migration resolution certified.");
    }
}

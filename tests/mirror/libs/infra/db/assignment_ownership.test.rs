// [tests/mirror/libs/infra/db/assignment_ownership.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE PROPIEDAD DE STREAMS (V6.0 - SINGLE OWNER)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE ATOMICIDAD Y TRASPASO BIFÁSICO
 *
 * # Mathematical Proof (ACID Ownership):
 * El Ledger actúa como semáforo atómico: un stream vivo tiene a lo sumo
 * un dueño, un lote que viola capacidad no deja residuo parcial, y el
 * traspaso bifásico siempre converge (commit al destino o reversión).
 * =================================================================
 */

use chrono::Utc;
use fingerswarm_domain_models::AssignmentStatus;
use fingerswarm_infra_db::repositories::{
    AssignmentRepository, InstanceRegistration, InstanceRepository, MigrationDirective,
};
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

async fn provision_active_node(
    registry: &InstanceRepository,
    identifier: &str,
    capacity_max: u32,
) {
    registry
        .register(InstanceRegistration {
            id: identifier.to_string(),
            capacity_max,
            address: None,
            metadata: None,
        })
        .await
        .expect("node registration");
    registry
        .record_heartbeat(identifier, Utc::now(), Some(1.0), 2)
        .await
        .expect("activation heartbeat");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn certify_atomic_assign_and_capacity_guard() {
        println!("\n🗄️  [INICIO]: Auditing atomic assignment semantics...");
        let gatekeeper = anchor_memory_ledger("mem_assign_atomicity").await;
        let registry = InstanceRepository::new(gatekeeper.clone());
        let ledger = AssignmentRepository::new(gatekeeper);

        provision_active_node(&registry, "worker-alpha", 3).await;
        provision_active_node(&registry, "worker-beta", 10).await;

        // Lote nominal dentro de capacidad.
        let granted = ledger
            .assign(vec![3, 1, 2], "worker-alpha")
            .await
            .expect("nominal batch");
        assert_eq!(granted, vec![1, 2, 3], "batch processed in ascending stream order");

        // Reintento idempotente: cero filas nuevas, cero conflicto.
        let replay = ledger
            .assign(vec![1, 2], "worker-alpha")
            .await
            .expect("idempotent replay");
        assert!(replay.is_empty());

        // Violación de capacidad: fallo atómico, sin residuo parcial.
        let overflow_outcome = ledger.assign(vec![10, 11], "worker-alpha").await;
        assert!(matches!(overflow_outcome, Err(DbError::CapacityExceeded { .. })));
        assert_eq!(
            ledger.count_live_for_instance("worker-alpha").await.expect("count"),
            3,
            "ANOMALY: failed batch left partial rows"
        );

        // Conflicto de propiedad: el stream 2 ya tiene otro dueño vivo.
        let conflict_outcome = ledger.assign(vec![2], "worker-beta").await;
        assert!(matches!(conflict_outcome, Err(DbError::AlreadyAssigned { .. })));

        // Nodo fantasma.
        let ghost_outcome = ledger.assign(vec![50], "worker-ghost").await;
        assert!(matches!(ghost_outcome, Err(DbError::UnknownInstance)));

        println!("✅ [VEREDICTO]: Atomic assignment certified.");
    }

    #[tokio::test]
    async fn certify_release_verdicts_are_per_row() {
        println!("\n🔓 [INICIO]: Auditing release verdicts...");
        let gatekeeper = anchor_memory_ledger("mem_release_verdicts").await;
        let registry = InstanceRepository::new(gatekeeper.clone());
        let ledger = AssignmentRepository::new(gatekeeper);

        provision_active_node(&registry, "worker-alpha", 5).await;
        provision_active_node(&registry, "worker-beta", 5).await;

        ledger.assign(vec![1, 2], "worker-alpha").await.expect("alpha batch");
        ledger.assign(vec![3], "worker-beta").await.expect("beta batch");

        // alpha libera: lo propio se suelta, lo ajeno y lo inexistente se ignora.
        let outcome = ledger
            .release(vec![1, 3, 99], "worker-alpha")
            .await
            .expect("release batch");
        assert_eq!(outcome.released, vec![1]);
        assert_eq!(outcome.ignored, vec![3, 99]);

        // Idempotencia: repetir la liberación no cambia nada.
        let replay = ledger
            .release(vec![1], "worker-alpha")
            .await
            .expect("release replay");
        assert!(replay.released.is_empty());
        assert_eq!(replay.ignored, vec![1]);

        println!("✅ [VEREDICTO]: Release verdicts certified.");
    }

    #[tokio::test]
    async fn certify_two_phase_migration_handoff() {
        println!("\n🔁 [INICIO]: Auditing two-phase migration...");
        let gatekeeper = anchor_memory_ledger("mem_migration_handoff").await;
        let registry = InstanceRepository::new(gatekeeper.clone());
        let ledger = AssignmentRepository::new(gatekeeper);

        provision_active_node(&registry, "worker-alpha", 5).await;
        provision_active_node(&registry, "worker-beta", 5).await;
        ledger.assign(vec![7, 8], "worker-alpha").await.expect("alpha batch");

        // Fase 1: marca MIGRATING hacia beta.
        let application = ledger
            .apply_directives(vec![MigrationDirective {
                stream_id: 7,
                source: Some("worker-alpha".into()),
                target: "worker-beta".into(),
            }])
            .await
            .expect("phase one");
        assert_eq!(application.migrations_marked, vec![7]);

        let live_rows = ledger.list_live().await.expect("live view");
        let migrating_row = live_rows
            .iter()
            .find(|row| row.stream_id == 7)
            .expect("row present");
        assert_eq!(migrating_row.status, AssignmentStatus::Migrating);
        assert_eq!(migrating_row.migration_target.as_deref(), Some("worker-beta"));

        // Fase 2 vía liberación del origen: propiedad comprometida al destino.
        let outcome = ledger
            .release(vec![7], "worker-alpha")
            .await
            .expect("source confirms");
        assert_eq!(outcome.released, vec![7]);

        let live_rows = ledger.list_live().await.expect("live view");
        let committed_row = live_rows
            .iter()
            .find(|row| row.stream_id == 7)
            .expect("row present");
        assert_eq!(committed_row.status, AssignmentStatus::Assigned);
        assert_eq!(committed_row.instance_id.as_deref(), Some("worker-beta"));
        assert!(committed_row.migration_target.is_none());

        // Reversión explícita del otro traspaso.
        ledger
            .apply_directives(vec![MigrationDirective {
                stream_id: 8,
                source: Some("worker-alpha".into()),
                target: "worker-beta".into(),
            }])
            .await
            .expect("phase one for 8");
        let reverted = ledger.revert_migrations(vec![8]).await.expect("revert");
        assert_eq!(reverted, vec![8]);

        let live_rows = ledger.list_live().await.expect("live view");
        let reverted_row = live_rows
            .iter()
            .find(|row| row.stream_id == 8)
            .expect("row present");
        assert_eq!(reverted_row.status, AssignmentStatus::Assigned);
        assert_eq!(reverted_row.instance_id.as_deref(), Some("worker-alpha"));

        println!("✅ [VEREDICTO]: Two-phase handoff certified.");
    }

    #[tokio::test]
    async fn certify_forced_resolution_and_diagnostics() {
        println!("\n🚨 [INICIO]: Auditing forced resolution...");
        let gatekeeper = anchor_memory_ledger("mem_forced_resolution").await;
        let registry = InstanceRepository::new(gatekeeper.clone());
        let ledger = AssignmentRepository::new(gatekeeper.clone());

        provision_active_node(&registry, "worker-alpha", 5).await;
        provision_active_node(&registry, "worker-beta", 5).await;
        ledger.assign(vec![1, 2], "worker-alpha").await.expect("alpha batch");
        ledger
            .apply_directives(vec![MigrationDirective {
                stream_id: 2,
                source: Some("worker-alpha".into()),
                target: "worker-beta".into(),
            }])
            .await
            .expect("phase one");

        // Resolución forzosa de alpha: el traspaso en vuelo se compromete,
        // la propiedad plena se libera.
        let resolution = ledger
            .force_resolve_for_instance("worker-alpha")
            .await
            .expect("forced resolution");
        assert_eq!(resolution.committed_to_target, vec![2]);
        assert_eq!(resolution.released, vec![1]);

        // Idempotencia: la segunda pasada es un no-op.
        let replay = ledger
            .force_resolve_for_instance("worker-alpha")
            .await
            .expect("idempotent replay");
        assert!(replay.released.is_empty());
        assert!(replay.committed_to_target.is_empty());

        // Diagnóstico de duplicados: inyección directa en el Ledger
        // (simulando corrupción externa).
        let raw_connection = gatekeeper.get_connection().expect("raw connection");
        raw_connection
            .execute(
                "INSERT INTO assignments (stream_id, instance_id, status, assigned_at)
                 VALUES (2, 'worker-alpha', 'ASSIGNED', ?1)",
                libsql::params![Utc::now().to_rfc3339()],
            )
            .await
            .expect("defect injection");

        let duplicate_rows = ledger.list_duplicates().await.expect("duplicates view");
        assert_eq!(duplicate_rows.len(), 2, "both live rows of stream 2 surface");
        assert!(duplicate_rows.iter().all(|row| row.stream_id == 2));

        println!("✅ [VEREDICTO]: Forced resolution certified.");
    }
}

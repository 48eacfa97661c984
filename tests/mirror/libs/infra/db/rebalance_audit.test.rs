// [tests/mirror/libs/infra/db/rebalance_audit.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL RASTRO DE REBALANCEO (V3.0 - APPEND ONLY)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE INMUTABILIDAD DEL HISTORIAL DE PLANES
 * =================================================================
 */

use fingerswarm_domain_models::{PlanLegSummary, PlanSummary, RebalanceOutcome, RebalanceReason};
use fingerswarm_infra_db::repositories::RebalanceRepository;
use fingerswarm_infra_db::{GatekeeperClient, GatekeeperPolicy};

fn sample_plan_summary() -> PlanSummary {
    PlanSummary {
        total_moves: 3,
        legs: vec![PlanLegSummary {
            source_instance: Some("worker-beta".into()),
            target_instance: "worker-alpha".into(),
            stream_count: 3,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn certify_event_lifecycle_is_sealed_once() {
        println!("\n📜 [INICIO]: Auditing rebalance audit trail...");
        let gatekeeper = GatekeeperClient::connect(
            "file:mem_rebalance_audit?mode=memory&cache=shared",
            None,
            GatekeeperPolicy::default(),
        )
        .await
        .expect("CRITICAL_FAULT: Failed to anchor in-memory tactical ledger.");
        let audit_trail = RebalanceRepository::new(gatekeeper);

        // Apertura: fila IN_PROGRESS visible para la exclusión de planes.
        let opened_event = audit_trail
            .open_event(RebalanceReason::LostInstance, sample_plan_summary())
            .await
            .expect("event opening");
        assert_eq!(opened_event.outcome, RebalanceOutcome::InProgress);
        assert!(audit_trail.has_event_in_progress().await.expect("in-progress probe"));

        // Sellado único: la primera conclusión gana, la segunda es inerte.
        let sealed = audit_trail
            .conclude_event(&opened_event.id, RebalanceOutcome::Completed)
            .await
            .expect("first conclusion");
        assert!(sealed);

        let resealed = audit_trail
            .conclude_event(&opened_event.id, RebalanceOutcome::Failed)
            .await
            .expect("second conclusion");
        assert!(!resealed, "ANOMALY: concluded events must be immutable");

        assert!(!audit_trail.has_event_in_progress().await.expect("in-progress probe"));

        // Historia reciente: el evento sellado conserva su desenlace original.
        let history = audit_trail.recent(10).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, RebalanceOutcome::Completed);
        assert_eq!(history[0].reason, RebalanceReason::LostInstance);
        assert_eq!(history[0].plan_summary, sample_plan_summary());
        assert!(history[0].completed_at.is_some());

        println!("✅ [VEREDICTO]: Audit trail certified.");
    }

    #[tokio::test]
    async fn certify_history_counts_by_reason() {
        let gatekeeper = GatekeeperClient::connect(
            "file:mem_rebalance_history?mode=memory&cache=shared",
            None,
            GatekeeperPolicy::default(),
        )
        .await
        .expect("ledger anchor");
        let audit_trail = RebalanceRepository::new(gatekeeper);

        for reason in [
            RebalanceReason::NewInstance,
            RebalanceReason::Drift,
            RebalanceReason::Manual,
        ] {
            let event = audit_trail
                .open_event(reason, sample_plan_summary())
                .await
                .expect("event opening");
            audit_trail
                .conclude_event(&event.id, RebalanceOutcome::Completed)
                .await
                .expect("conclusion");
        }

        let history = audit_trail.recent(10).await.expect("history");
        assert_eq!(history.len(), 3);

        let lost_instance_events = history
            .iter()
            .filter(|event| event.reason == RebalanceReason::LostInstance)
            .count();
        assert_eq!(lost_instance_events, 0);
    }
}

// [libs/domain/models-rs/src/tests_serialization.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE CONTRATOS DE DOMINIO (V4.0 - TRIAD PARITY)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L2-MODELS
 * RESPONSABILIDAD: AUDITORÍA DE SERIALIZACIÓN BIT-PERFECTA
 *
 * # Mathematical Proof (Contract Stability):
 * Los workers y el Dashboard consumen estos sobres por nombre de campo.
 * El test certifica que los renames de serde permanecen estables entre
 * versiones, evitando derivas silenciosas del protocolo.
 * =================================================================
 */

use fingerswarm_domain_models::{
    AssignmentStatus, DefectKind, HeartbeatPayload, Instance, InstanceStatus, PlanLegSummary,
    PlanSummary, RebalanceOutcome, RebalanceReason, RegisterPayload, StreamProcessingStatus,
    WorkerCommand,
};

#[test]
fn certify_instance_status_round_trip_labels() {
    println!("🧬 [MODELS]: Auditing instance status label parity...");

    let full_lifecycle = [
        InstanceStatus::Registered,
        InstanceStatus::Active,
        InstanceStatus::Warning,
        InstanceStatus::Inactive,
        InstanceStatus::Recovering,
        InstanceStatus::Removed,
    ];

    for status in full_lifecycle {
        let label = status.as_str();
        assert_eq!(
            InstanceStatus::parse(label),
            Some(status),
            "ANOMALY: status label {label} lost parity"
        );
    }

    assert_eq!(InstanceStatus::parse("ZOMBIE"), None);
    assert!(InstanceStatus::Active.is_eligible_for_dispatch());
    assert!(InstanceStatus::Recovering.is_eligible_for_dispatch());
    assert!(!InstanceStatus::Warning.forfeits_ownership());
    assert!(InstanceStatus::Inactive.forfeits_ownership());
}

#[test]
fn certify_wire_payload_field_names_are_sovereign() {
    println!("📡 [MODELS]: Auditing wire envelope field names...");

    let register_payload = RegisterPayload {
        id: "worker-alpha".into(),
        capacity_max: 10,
        address: Some("10.8.0.21:9100".into()),
        metadata: None,
    };

    let serialized_envelope = serde_json::to_value(&register_payload).expect("serialization");
    assert!(serialized_envelope.get("instance_identifier").is_some());
    assert!(serialized_envelope.get("probe_address").is_some());
    assert!(serialized_envelope.get("id").is_none(), "ANOMALY: raw 'id' leaked to the wire");

    let heartbeat_json = r#"{
        "instance_identifier": "worker-alpha",
        "load": 3,
        "available_capacity": 7,
        "timestamp": "2026-03-01T12:00:00Z"
    }"#;
    let decoded_heartbeat: HeartbeatPayload =
        serde_json::from_str(heartbeat_json).expect("heartbeat decoding");
    assert_eq!(decoded_heartbeat.load, 3);
    assert!(decoded_heartbeat.metrics.is_none(), "metrics must default to None");
}

#[test]
fn certify_worker_command_tagging() {
    let advisory_commands = vec![
        WorkerCommand::AddStream { stream_id: 42 },
        WorkerCommand::RemoveStream { stream_id: 7 },
    ];

    let encoded = serde_json::to_value(&advisory_commands).expect("command encoding");
    assert_eq!(encoded[0]["command_type"], "add_stream");
    assert_eq!(encoded[1]["command_type"], "remove_stream");
    assert_eq!(encoded[1]["stream_id"], 7);
}

#[test]
fn certify_performance_score_blend_is_clipped() {
    // Señal fuera del intervalo unitario: el blend debe recortarla.
    let inflated_signal_score = Instance::blended_performance_score(0.5, 7.0);
    assert!(inflated_signal_score <= 1.0);

    let exact_blend = Instance::blended_performance_score(1.0, 0.0);
    assert!((exact_blend - 0.7).abs() < 1e-9, "alpha drift detected: {exact_blend}");
}

#[test]
fn certify_rebalance_audit_labels() {
    for reason in [
        RebalanceReason::NewInstance,
        RebalanceReason::LostInstance,
        RebalanceReason::Drift,
        RebalanceReason::Manual,
    ] {
        assert_eq!(RebalanceReason::parse(reason.as_str()), Some(reason));
    }

    for outcome in [
        RebalanceOutcome::InProgress,
        RebalanceOutcome::Completed,
        RebalanceOutcome::Partial,
        RebalanceOutcome::Failed,
    ] {
        assert_eq!(RebalanceOutcome::parse(outcome.as_str()), Some(outcome));
    }

    let plan_summary = PlanSummary {
        total_moves: 4,
        legs: vec![PlanLegSummary {
            source_instance: Some("worker-beta".into()),
            target_instance: "worker-alpha".into(),
            stream_count: 4,
        }],
    };
    let summary_json = serde_json::to_string(&plan_summary).expect("plan summary encoding");
    let recovered: PlanSummary = serde_json::from_str(&summary_json).expect("plan summary decoding");
    assert_eq!(recovered, plan_summary);
}

#[test]
fn certify_assignment_and_defect_labels() {
    assert!(AssignmentStatus::Assigned.is_live_ownership());
    assert!(AssignmentStatus::Migrating.is_live_ownership());
    assert!(!AssignmentStatus::Released.is_live_ownership());

    assert_eq!(DefectKind::DuplicateAssignment.as_str(), "DUPLICATE_ASSIGNMENT");
    assert_eq!(
        serde_json::to_value(StreamProcessingStatus::Completed).expect("status encoding"),
        serde_json::Value::String("completed".into())
    );
}

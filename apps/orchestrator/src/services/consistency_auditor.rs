// [apps/orchestrator/src/services/consistency_auditor.rs]
/*!
 * =================================================================
 * APARATO: CONSISTENCY AUDITOR SERVICE (V17.0 - DEFECT TAXONOMY)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: DETECCIÓN Y REPARACIÓN DE VIOLACIONES DE INVARIANTES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. UNAMBIGUOUS REPAIR: Solo se auto-repara lo que tiene resolución
 *    determinista; el resto se reporta y queda para el siguiente plan.
 * 2. EVIDENCE FIRST: Cada defecto emite un registro estructurado aunque
 *    la reparación fracase; el journal es la evidencia del Panóptico.
 * 3. DUAL MODE: El mismo escáner sirve al daemon (repara) y al endpoint
 *    de diagnóstico (solo detecta y sugiere).
 * =================================================================
 */

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use fingerswarm_domain_models::{
    DefectKind, DefectRecord, Instance, InstanceStatus, StreamAssignment, WorkerCommand,
};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::state::AppState;

/**
 * Daemon de auditoría periódica de consistencia.
 */
pub struct ConsistencyAuditorService {
    application_state: AppState,
}

impl ConsistencyAuditorService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    pub async fn spawn_auditor_daemon(self) {
        let mut audit_ticker = interval(Duration::from_secs(
            self.application_state.config.consistency_scan_interval_s,
        ));
        audit_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("⚖️  [AUDITOR]: Consistency surveillance daemon active.");

        loop {
            audit_ticker.tick().await;

            match run_repair_cycle(&self.application_state).await {
                Ok(repaired_defects) if !repaired_defects.is_empty() => {
                    warn!(
                        "⚖️  [AUDITOR]: Cycle closed with {} defects processed.",
                        repaired_defects.len()
                    );
                }
                Ok(_) => info!("✅ [AUDITOR]: Invariants verified. Ledger consistent."),
                Err(audit_fault) => {
                    error!("❌ [AUDITOR_FAULT]: Audit cycle collapsed: {}", audit_fault);
                }
            }

            self.application_state
                .readiness
                .consistency_auditor
                .store(true, Ordering::Relaxed);
        }
    }
}

/// Escaneo en modo detección: sin mutaciones, con resoluciones sugeridas.
pub async fn detect_defects(application_state: &AppState) -> anyhow::Result<Vec<DefectRecord>> {
    scan_ledger(application_state, false).await
}

/// Escaneo con auto-reparación y registro en el journal de evidencia.
pub async fn run_repair_cycle(application_state: &AppState) -> anyhow::Result<Vec<DefectRecord>> {
    scan_ledger(application_state, true).await
}

#[instrument(skip(application_state))]
async fn scan_ledger(
    application_state: &AppState,
    repair_mode: bool,
) -> anyhow::Result<Vec<DefectRecord>> {
    let mut detected_defects: Vec<DefectRecord> = Vec::new();
    let detection_instant = Utc::now();

    let fleet: HashMap<String, Instance> = application_state
        .instance_repository
        .list_all()
        .await?
        .into_iter()
        .map(|node| (node.id.clone(), node))
        .collect();

    // --- 1. ASIGNACIONES HUÉRFANAS ---
    let orphan_rows = application_state.assignment_repository.list_orphans().await?;
    if !orphan_rows.is_empty() {
        let mut per_ghost_owner: BTreeMap<String, Vec<StreamAssignment>> = BTreeMap::new();
        for row in orphan_rows {
            per_ghost_owner
                .entry(row.instance_id.clone().unwrap_or_else(|| "UNOWNED".into()))
                .or_default()
                .push(row);
        }

        for (ghost_owner, rows) in per_ghost_owner {
            let row_identifiers: Vec<i64> = rows.iter().map(|row| row.row_id).collect();
            let stream_identifiers: Vec<i64> = rows.iter().map(|row| row.stream_id).collect();

            let repaired = if repair_mode {
                application_state.assignment_repository.release_rows(row_identifiers).await? > 0
            } else {
                false
            };

            detected_defects.push(DefectRecord {
                kind: DefectKind::OrphanAssignment,
                stream_ids: stream_identifiers,
                instance_id: Some(ghost_owner),
                action_taken: "release rows; streams return to the next plan".into(),
                auto_repaired: repaired,
                detected_at: detection_instant,
            });
        }
    }

    // --- 2. PROPIEDAD DUPLICADA ---
    let duplicate_rows = application_state.assignment_repository.list_duplicates().await?;
    if !duplicate_rows.is_empty() {
        let mut per_stream: BTreeMap<i64, Vec<StreamAssignment>> = BTreeMap::new();
        for row in duplicate_rows {
            per_stream.entry(row.stream_id).or_default().push(row);
        }

        for (stream_id, rows) in per_stream {
            // Guardián: dueño ACTIVE con el latido más reciente.
            let keeper_row_id = rows
                .iter()
                .filter_map(|row| {
                    let owner = row.instance_id.as_ref().and_then(|id| fleet.get(id))?;
                    (owner.status == InstanceStatus::Active)
                        .then_some((owner.last_heartbeat, owner.id.clone(), row.row_id))
                })
                .max_by(|left, right| {
                    left.0.cmp(&right.0).then_with(|| right.1.cmp(&left.1))
                })
                .map(|(_, _, row_id)| row_id);

            let rows_to_release: Vec<i64> = rows
                .iter()
                .filter(|row| Some(row.row_id) != keeper_row_id)
                .map(|row| row.row_id)
                .collect();

            let action_description = match keeper_row_id {
                Some(_) => "keep freshest ACTIVE owner; release the rest".to_string(),
                None => "no ACTIVE candidate; release all and re-plan".to_string(),
            };

            let repaired = if repair_mode {
                application_state.assignment_repository.release_rows(rows_to_release).await?;
                true
            } else {
                false
            };

            detected_defects.push(DefectRecord {
                kind: DefectKind::DuplicateAssignment,
                stream_ids: vec![stream_id],
                instance_id: None,
                action_taken: action_description,
                auto_repaired: repaired,
                detected_at: detection_instant,
            });
        }
    }

    // --- 3. DESBORDE DE CAPACIDAD ---
    for node in fleet.values().filter(|node| node.status != InstanceStatus::Removed) {
        let owned_rows =
            application_state.assignment_repository.list_by_instance(&node.id).await?;
        if owned_rows.len() as u32 <= node.capacity_max {
            continue;
        }

        // El excedente más recientemente asignado regresa al plan.
        let excess_count = owned_rows.len() - node.capacity_max as usize;
        let mut rows_by_recency = owned_rows;
        rows_by_recency.sort_by(|left, right| {
            right.assigned_at.cmp(&left.assigned_at).then_with(|| left.stream_id.cmp(&right.stream_id))
        });
        let excess_rows: Vec<&StreamAssignment> =
            rows_by_recency.iter().take(excess_count).collect();

        let repaired = if repair_mode {
            let row_identifiers: Vec<i64> = excess_rows.iter().map(|row| row.row_id).collect();
            application_state.assignment_repository.release_rows(row_identifiers).await? > 0
        } else {
            false
        };

        detected_defects.push(DefectRecord {
            kind: DefectKind::CapacityOverflow,
            stream_ids: excess_rows.iter().map(|row| row.stream_id).collect(),
            instance_id: Some(node.id.clone()),
            action_taken: format!(
                "release {excess_count} most recently assigned streams for re-planning"
            ),
            auto_repaired: repaired,
            detected_at: detection_instant,
        });
    }

    // --- 4. MIGRACIONES COLGADAS ---
    let stuck_rows = application_state
        .assignment_repository
        .list_stuck_migrations(application_state.config.migration_timeout_s)
        .await?;

    for row in stuck_rows {
        let target_node = row.migration_target.as_ref().and_then(|id| fleet.get(id));

        if !repair_mode {
            detected_defects.push(DefectRecord {
                kind: DefectKind::StuckMigration,
                stream_ids: vec![row.stream_id],
                instance_id: row.instance_id.clone(),
                action_taken: "probe target; commit if confirmed, else revert to source".into(),
                auto_repaired: false,
                detected_at: detection_instant,
            });
            continue;
        }

        let target_confirms = match target_node {
            Some(target) => target_confirms_ownership(target, row.stream_id).await,
            None => false,
        };

        let action_description = if target_confirms {
            application_state
                .assignment_repository
                .commit_migrations(vec![row.stream_id])
                .await?;
            if let Some(target) = target_node {
                application_state
                    .enqueue_command(&target.id, WorkerCommand::AddStream { stream_id: row.stream_id });
            }
            "target confirmed; migration committed".to_string()
        } else {
            application_state
                .assignment_repository
                .revert_migrations(vec![row.stream_id])
                .await?;
            if let Some(source_identifier) = &row.instance_id {
                // Re-aviso al origen: la orden remove_stream previa queda anulada.
                application_state.enqueue_command(
                    source_identifier,
                    WorkerCommand::AddStream { stream_id: row.stream_id },
                );
            }
            "target silent; migration reverted to source".to_string()
        };

        detected_defects.push(DefectRecord {
            kind: DefectKind::StuckMigration,
            stream_ids: vec![row.stream_id],
            instance_id: row.instance_id.clone(),
            action_taken: action_description,
            auto_repaired: true,
            detected_at: detection_instant,
        });
    }

    // --- 5. STREAMS SIN PROPIETARIO ---
    let live_streams: HashSet<i64> = application_state
        .assignment_repository
        .list_live()
        .await?
        .into_iter()
        .map(|row| row.stream_id)
        .collect();

    let missing_streams: Vec<i64> = application_state
        .catalog_view()
        .into_iter()
        .filter(|stream_id| !live_streams.contains(stream_id))
        .collect();

    if !missing_streams.is_empty() {
        detected_defects.push(DefectRecord {
            kind: DefectKind::MissingAssignment,
            stream_ids: missing_streams,
            instance_id: None,
            action_taken: "scheduled for the balancer's next plan".into(),
            auto_repaired: false,
            detected_at: detection_instant,
        });
    }

    // --- EVIDENCIA ---
    if repair_mode {
        for defect in &detected_defects {
            warn!(
                "⚖️  [AUDITOR_DEFECT]: {} streams={:?} instance={:?} action='{}' repaired={}",
                defect.kind.as_str(),
                defect.stream_ids,
                defect.instance_id,
                defect.action_taken,
                defect.auto_repaired
            );
            application_state.record_defect(defect.clone());
        }
    }

    Ok(detected_defects)
}

/// Sonda de propiedad sobre el destino de una migración colgada.
///
/// Con 'probe_address' presente se consulta al propio worker; ante
/// silencio o ausencia de dirección decide la vitalidad del registro.
async fn target_confirms_ownership(target: &Instance, stream_id: i64) -> bool {
    if let Some(probe_address) = &target.address {
        let probe_url = format!("http://{probe_address}/owns/{stream_id}");
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build();

        if let Ok(client) = probe_client {
            if let Ok(probe_response) = client.get(&probe_url).send().await {
                return probe_response.status().is_success();
            }
        }
    }

    target.status == InstanceStatus::Active
}

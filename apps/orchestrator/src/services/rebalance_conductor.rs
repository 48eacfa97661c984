// [apps/orchestrator/src/services/rebalance_conductor.rs]
/*!
 * =================================================================
 * APARATO: REBALANCE CONDUCTOR SERVICE (V18.0 - BATCHED EXECUTION)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: EVALUACIÓN DE DERIVA Y EJECUCIÓN GRADUAL DE PLANES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. COALESCED SIGNALS: Registro de nodo, pérdida, operador y tick
 *    periódico desembocan en el mismo conductor; a lo sumo un plan
 *    corre a la vez y las señales extra se funden.
 * 2. BOUNDED MIGRATING WINDOW: Los lotes respetan MIGRATION_BATCH; en
 *    ningún instante hay más streams en MIGRATING que el lote vigente.
 * 3. COOLDOWN DISCIPLINE: El enfriamiento solo frena al tick periódico;
 *    el mando explícito del operador y los eventos de flota lo ignoran.
 * 4. AUDIT TRAIL: Cada plan abre una fila de rebalanceo y la sella una
 *    única vez con su desenlace.
 * =================================================================
 */

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use fingerswarm_domain_balancer::{propose_plan, BalancerSnapshot, InstanceView, MigrationPlan, StreamHolding};
use fingerswarm_domain_models::{AssignmentStatus, RebalanceOutcome, RebalanceReason, WorkerCommand};
use fingerswarm_infra_db::repositories::MigrationDirective;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::state::AppState;

/**
 * Daemon conductor de rebalanceos.
 */
pub struct RebalanceConductorService {
    application_state: AppState,
}

impl RebalanceConductorService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Inicia el bucle del conductor: señales de flota + tick de deriva.
     */
    pub async fn spawn_conductor_daemon(self) {
        let mut drift_ticker = interval(Duration::from_secs(
            self.application_state.config.balancer_tick_interval_s,
        ));
        drift_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let rebalance_signal = self.application_state.rebalance_signal();

        info!("🧭 [CONDUCTOR]: Rebalance conductor daemon active.");

        loop {
            tokio::select! {
                _ = rebalance_signal.notified() => {
                    let reason = self
                        .application_state
                        .take_pending_rebalance_reason()
                        .unwrap_or(RebalanceReason::Manual);
                    if let Err(plan_fault) =
                        execute_plan_cycle(&self.application_state, reason).await
                    {
                        error!("❌ [CONDUCTOR_FAULT]: Event-driven plan collapsed: {}", plan_fault);
                    }
                }
                _ = drift_ticker.tick() => {
                    if self.application_state.drift_cooldown_active() {
                        debug!("🧭 [CONDUCTOR]: Drift check suppressed by cooldown.");
                    } else if let Err(plan_fault) =
                        execute_plan_cycle(&self.application_state, RebalanceReason::Drift).await
                    {
                        error!("❌ [CONDUCTOR_FAULT]: Periodic plan collapsed: {}", plan_fault);
                    }
                }
            }

            self.application_state
                .readiness
                .rebalance_conductor
                .store(true, Ordering::Relaxed);
        }
    }
}

/**
 * Un ciclo completo: snapshot -> propuesta -> auditoría -> lotes.
 *
 * El candado de ejecución garantiza un único plan en curso; las señales
 * que lleguen mientras tanto quedan fundidas en la razón pendiente.
 */
#[instrument(skip(application_state))]
pub async fn execute_plan_cycle(
    application_state: &AppState,
    reason: RebalanceReason,
) -> anyhow::Result<()> {
    let Ok(_execution_guard) = application_state.plan_execution_lock.try_lock() else {
        debug!("🧭 [CONDUCTOR]: Plan already in progress. Signal coalesced.");
        return Ok(());
    };

    let Some(plan) = assemble_proposed_plan(application_state).await? else {
        debug!("⚖️  [CONDUCTOR]: Fleet balanced. No plan emitted ({}).", reason.as_str());
        return Ok(());
    };

    if !plan.unplaced_stream_ids.is_empty() {
        warn!(
            "📉 [CONDUCTOR]: Capacity shortfall: {} catalog streams cannot be placed.",
            plan.unplaced_stream_ids.len()
        );
    }

    info!(
        "🧭 [CONDUCTOR]: Executing plan ({}): {} moves in batches of {}.",
        reason.as_str(),
        plan.moves.len(),
        application_state.config.migration_batch
    );

    let audit_event = application_state
        .rebalance_repository
        .open_event(reason, plan.summary())
        .await?;

    let execution_outcome = execute_plan_batches(application_state, &plan).await;

    let final_outcome = match &execution_outcome {
        Ok(fully_applied) if *fully_applied => RebalanceOutcome::Completed,
        Ok(_) => RebalanceOutcome::Partial,
        Err(_) => RebalanceOutcome::Failed,
    };

    application_state
        .rebalance_repository
        .conclude_event(&audit_event.id, final_outcome)
        .await?;
    application_state.seal_plan_completion();

    match execution_outcome {
        Ok(_) => {
            info!(
                "✅ [CONDUCTOR]: Plan {} concluded: {}.",
                audit_event.id,
                final_outcome.as_str()
            );
            Ok(())
        }
        Err(execution_fault) => {
            error!("❌ [CONDUCTOR]: Plan {} collapsed mid-flight.", audit_event.id);
            Err(execution_fault)
        }
    }
}

/// Congela flota elegible + catálogo y consulta al motor puro.
///
/// Los streams cuyo dueño vivo no es elegible (WARNING en tránsito) se
/// excluyen del catálogo del snapshot: su redistribución pertenece al
/// sentinel, no al plan de deriva.
async fn assemble_proposed_plan(
    application_state: &AppState,
) -> anyhow::Result<Option<MigrationPlan>> {
    let eligible_fleet = application_state.instance_repository.list_active().await?;
    let live_ownership = application_state.assignment_repository.list_live().await?;

    let mut catalog_view = application_state.catalog_view();
    if catalog_view.is_empty() {
        // Primer ciclo antes del daemon de catálogo: lectura directa.
        catalog_view = application_state.catalog_repository.list_active_streams().await?;
        application_state.refresh_catalog_snapshot(catalog_view.clone());
    }

    let eligible_identifiers: HashSet<&str> =
        eligible_fleet.iter().map(|node| node.id.as_str()).collect();

    let foreign_owned_streams: HashSet<i64> = live_ownership
        .iter()
        .filter(|row| {
            row.instance_id
                .as_deref()
                .map(|owner| !eligible_identifiers.contains(owner))
                .unwrap_or(false)
        })
        .map(|row| row.stream_id)
        .collect();
    catalog_view.retain(|stream_id| !foreign_owned_streams.contains(stream_id));

    let mut holdings_per_node: HashMap<&str, Vec<StreamHolding>> = HashMap::new();
    for row in &live_ownership {
        if let Some(owner) = row.instance_id.as_deref() {
            if eligible_identifiers.contains(owner) {
                holdings_per_node.entry(owner).or_default().push(StreamHolding {
                    stream_id: row.stream_id,
                    assigned_at: row.assigned_at,
                });
            }
        }
    }

    let snapshot = BalancerSnapshot {
        instances: eligible_fleet
            .iter()
            .map(|node| InstanceView {
                id: node.id.clone(),
                capacity_max: node.capacity_max,
                performance_score: node.performance_score,
                holdings: holdings_per_node.remove(node.id.as_str()).unwrap_or_default(),
            })
            .collect(),
        catalog: catalog_view,
    };

    Ok(propose_plan(&snapshot, &application_state.config.balancer_thresholds()))
}

/// Ejecuta el plan por lotes acotados con pausa entre lotes.
///
/// Por lote: fase 1 (marcas MIGRATING + colocaciones), espera de la
/// confirmación de los orígenes hasta MIGRATION_TIMEOUT y resolución
/// forzosa del remanente.
async fn execute_plan_batches(
    application_state: &AppState,
    plan: &MigrationPlan,
) -> anyhow::Result<bool> {
    let batch_size = application_state.config.migration_batch.max(1);
    let inter_batch_delay = Duration::from_millis(application_state.config.migration_step_ms);
    let migration_budget =
        Duration::from_secs(application_state.config.migration_timeout_s.max(0) as u64);
    let confirmation_poll_window = inter_batch_delay.max(Duration::from_millis(50));

    let mut fully_applied = true;

    for batch in plan.moves.chunks(batch_size) {
        let directives: Vec<MigrationDirective> = batch
            .iter()
            .map(|movement| MigrationDirective {
                stream_id: movement.stream_id,
                source: movement.source.clone(),
                target: movement.target.clone(),
            })
            .collect();

        let application = application_state
            .assignment_repository
            .apply_directives(directives)
            .await?;

        if !application.skipped.is_empty() {
            debug!(
                "🧭 [CONDUCTOR]: {} stale directives skipped (ledger moved on).",
                application.skipped.len()
            );
            fully_applied = false;
        }

        // Órdenes advisorias de fase 1: el origen suelta, las colocaciones
        // directas activan a su destino de inmediato.
        let marked_streams: HashSet<i64> =
            application.migrations_marked.iter().copied().collect();
        let placed_streams: HashSet<i64> = application.placements.iter().copied().collect();

        for movement in batch {
            match &movement.source {
                Some(source_identifier) if marked_streams.contains(&movement.stream_id) => {
                    application_state.enqueue_command(
                        source_identifier,
                        WorkerCommand::RemoveStream { stream_id: movement.stream_id },
                    );
                }
                None if placed_streams.contains(&movement.stream_id) => {
                    application_state.enqueue_command(
                        &movement.target,
                        WorkerCommand::AddStream { stream_id: movement.stream_id },
                    );
                }
                _ => {}
            }
        }

        // Fase 2: esperar la liberación voluntaria de los orígenes.
        if !application.migrations_marked.is_empty() {
            let confirmation_deadline = Instant::now() + migration_budget;

            loop {
                let still_in_flight =
                    streams_still_migrating(application_state, &marked_streams).await?;
                if still_in_flight.is_empty() {
                    break;
                }
                if Instant::now() >= confirmation_deadline {
                    warn!(
                        "⏱️  [CONDUCTOR]: {} migrations exceeded the handoff budget. Forcing commit.",
                        still_in_flight.len()
                    );
                    application_state
                        .assignment_repository
                        .commit_migrations(still_in_flight)
                        .await?;
                    break;
                }
                tokio::time::sleep(confirmation_poll_window).await;
            }

            // Destinos de los traspasos resueltos: orden add_stream.
            let live_after_batch = application_state.assignment_repository.list_live().await?;
            for row in live_after_batch {
                if marked_streams.contains(&row.stream_id)
                    && row.status == AssignmentStatus::Assigned
                {
                    if let Some(new_owner) = &row.instance_id {
                        application_state.enqueue_command(
                            new_owner,
                            WorkerCommand::AddStream { stream_id: row.stream_id },
                        );
                    }
                }
            }
        }

        tokio::time::sleep(inter_batch_delay).await;
    }

    Ok(fully_applied)
}

async fn streams_still_migrating(
    application_state: &AppState,
    watched_streams: &HashSet<i64>,
) -> anyhow::Result<Vec<i64>> {
    Ok(application_state
        .assignment_repository
        .list_live()
        .await?
        .into_iter()
        .filter(|row| {
            row.status == AssignmentStatus::Migrating && watched_streams.contains(&row.stream_id)
        })
        .map(|row| row.stream_id)
        .collect())
}

// [apps/orchestrator/src/services/heartbeat_sentinel.rs]
/*!
 * =================================================================
 * APARATO: HEARTBEAT SENTINEL SERVICE (V15.0 - SILENCE SWEEPER)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: MÁQUINA DE ESTADOS TEMPORAL Y DETECCIÓN DE FALLOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ONE STEP PER SWEEP: Cada barrido aplica a lo sumo una transición
 *    por nodo; la secuencia ACTIVE -> WARNING -> INACTIVE es irrompible.
 * 2. BOUNDED REDISTRIBUTION: La pérdida de un nodo libera su propiedad
 *    y despierta al conductor de inmediato; el plazo objetivo es
 *    REDISTRIBUTION_DEADLINE desde la transición.
 * 3. EMERGENCY ESCALATION: Silencio extremo con propiedad retenida
 *    escala al protocolo de recuperación idempotente.
 *
 * # Reliability:
 * Usa 'MissedTickBehavior::Skip': los ciclos no se acumulan ante
 * bloqueos temporales de I/O contra el Motor A.
 * =================================================================
 */

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use fingerswarm_domain_models::{InstanceStatus, RebalanceReason};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::services::recovery;
use crate::state::AppState;

/**
 * Daemon de vigilancia de latidos de la flota.
 */
pub struct HeartbeatSentinelService {
    application_state: AppState,
}

impl HeartbeatSentinelService {
    #[must_use]
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    /**
     * Inicia el bucle de vigilancia perpetua en el reactor de Tokio.
     */
    pub async fn spawn_sentinel_daemon(self) {
        let mut surveillance_ticker = interval(Duration::from_secs(
            self.application_state.config.heartbeat_scan_interval_s,
        ));
        surveillance_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("🩺 [SENTINEL]: Heartbeat surveillance daemon active.");

        loop {
            surveillance_ticker.tick().await;

            if let Err(surveillance_fault) = self.execute_surveillance_cycle().await {
                // El daemon jamás propaga: registra y reintenta al próximo tick.
                error!("❌ [SENTINEL_FAULT]: Surveillance cycle collapsed: {}", surveillance_fault);
            }

            self.application_state
                .readiness
                .heartbeat_sentinel
                .store(true, Ordering::Relaxed);
        }
    }

    /**
     * Un barrido completo: transiciones de silencio + escalada de emergencia.
     */
    #[instrument(skip(self))]
    async fn execute_surveillance_cycle(&self) -> anyhow::Result<()> {
        let observation_instant = Utc::now();
        let configuration = &self.application_state.config;

        // 1. MÁQUINA DE ESTADOS TEMPORAL
        let applied_transitions = self
            .application_state
            .instance_repository
            .sweep_silence(
                observation_instant,
                configuration.warn_threshold_s,
                configuration.inactive_threshold_s,
                configuration.removal_timeout_s,
            )
            .await?;

        for transition in &applied_transitions {
            match (transition.from_status, transition.to_status) {
                (InstanceStatus::Active, InstanceStatus::Warning) => {
                    warn!(
                        "🟡 [SENTINEL]: Node {} silent beyond {}s. Now WARNING.",
                        transition.instance_id, configuration.warn_threshold_s
                    );
                }
                (InstanceStatus::Warning, InstanceStatus::Inactive) => {
                    warn!(
                        "🔴 [SENTINEL]: Node {} lost. Redistribution target: {}s.",
                        transition.instance_id, configuration.redistribution_deadline_s
                    );
                    self.redistribute_lost_ownership(&transition.instance_id).await?;
                }
                (InstanceStatus::Inactive, InstanceStatus::Removed) => {
                    warn!(
                        "⚫ [SENTINEL]: Node {} exceeded removal timeout. Retired.",
                        transition.instance_id
                    );
                    // Idempotente: la propiedad ya debió liberarse al caer.
                    let residual = self
                        .application_state
                        .assignment_repository
                        .force_resolve_for_instance(&transition.instance_id)
                        .await?;
                    if !residual.released.is_empty() {
                        warn!(
                            "⚫ [SENTINEL]: Retired node {} still held {} streams. Released.",
                            transition.instance_id,
                            residual.released.len()
                        );
                    }
                    self.application_state.purge_commands(&transition.instance_id);
                }
                other_transition => {
                    debug!("🩺 [SENTINEL]: Transition applied: {:?}", other_transition);
                }
            }
        }

        // 2. ESCALADA DE EMERGENCIA (silencio extremo con propiedad viva)
        self.escalate_prolonged_failures().await?;

        Ok(())
    }

    /// Pérdida de nodo: su propiedad se resuelve de inmediato y el
    /// conductor despierta con razón LOST_INSTANCE.
    async fn redistribute_lost_ownership(&self, instance_id: &str) -> anyhow::Result<()> {
        let forced_resolution = self
            .application_state
            .assignment_repository
            .force_resolve_for_instance(instance_id)
            .await?;

        self.application_state.purge_commands(instance_id);

        info!(
            "🧭 [SENTINEL]: Node {} ownership resolved (released={} committed={}). Waking conductor.",
            instance_id,
            forced_resolution.released.len(),
            forced_resolution.committed_to_target.len()
        );

        self.application_state.request_rebalance(RebalanceReason::LostInstance);
        Ok(())
    }

    /// Nodos INACTIVE más allá del umbral de emergencia que aún retienen
    /// propiedad viva: pasada idempotente del protocolo de recuperación.
    async fn escalate_prolonged_failures(&self) -> anyhow::Result<()> {
        let observation_instant = Utc::now();
        let emergency_threshold_s = self.application_state.config.emergency_threshold_s;

        let fleet = self.application_state.instance_repository.list_all().await?;
        for node in fleet.iter().filter(|node| node.status == InstanceStatus::Inactive) {
            let silence_baseline = node.last_heartbeat.unwrap_or(node.registered_at);
            let silence_seconds = (observation_instant - silence_baseline).num_seconds();
            if silence_seconds <= emergency_threshold_s {
                continue;
            }

            let retained_ownership = self
                .application_state
                .assignment_repository
                .count_live_for_instance(&node.id)
                .await?;

            if retained_ownership > 0 {
                warn!(
                    "🚨 [SENTINEL]: Node {} silent {}s with {} streams retained. Escalating.",
                    node.id, silence_seconds, retained_ownership
                );
                recovery::execute_emergency_recovery(
                    &self.application_state,
                    &node.id,
                    "prolonged silence beyond emergency threshold",
                )
                .await?;
            }
        }

        Ok(())
    }
}

// [apps/orchestrator/src/services/reaper.rs]
/**
 * =================================================================
 * APARATO: THE REAPER SYSTEM SERVICE (V9.2 - HYGIENE HARDENED)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: AUDITORÍA DE TRANSACCIONES REZAGADAS Y PURGA DE RAM
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. STRAGGLER AUDIT: El aborto efectivo lo ejecuta el presupuesto del
 *    Gatekeeper; el Reaper deja rastro forense de lo que sobrevivió.
 * 2. ZERO RESIDUE: La bóveda idempotente se poda en cada ciclo.
 * =================================================================
 */

use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::AppState;

/**
 * Inicia el servicio de limpieza perpetua en el runtime de Tokio.
 */
pub async fn spawn_reaper(application_state: AppState) {
    let mut maintenance_ticker =
        interval(Duration::from_secs(application_state.config.reaper_interval_s));
    maintenance_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::spawn(async move {
        info!("💀 [REAPER_ACTIVE]: Infrastructure hygiene daemon initiated.");

        loop {
            maintenance_ticker.tick().await;

            // 1. AUDITORÍA DE TRANSACCIONES REZAGADAS (L3 Gatekeeper)
            let overdue_operations = application_state.gatekeeper.overdue_operations();
            for straggler in &overdue_operations {
                warn!(
                    "💀 [REAPER_TXN]: Operation '{}' outlived its statement budget ({} ms).",
                    straggler.label, straggler.elapsed_ms
                );
            }

            // 2. PODA DE LA BÓVEDA IDEMPOTENTE
            let evicted_replies = application_state.sweep_idempotency_vault();
            if evicted_replies > 0 {
                debug!(
                    "💀 [REAPER_CLEANUP]: Evicted {} expired idempotency replies.",
                    evicted_replies
                );
            }

            application_state.readiness.reaper.store(true, Ordering::Relaxed);
        }
    });
}

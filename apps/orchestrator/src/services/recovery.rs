// [apps/orchestrator/src/services/recovery.rs]
/*!
 * =================================================================
 * APARATO: EMERGENCY RECOVERY PROTOCOL (V8.0 - IDEMPOTENT PASS)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: RESOLUCIÓN FORZOSA DE LA PROPIEDAD DE UN NODO CAÍDO
 *
 * # Mathematical Proof (Idempotence):
 * La secuencia opera solo sobre filas vivas del nodo. Una segunda pasada
 * encuentra el conjunto vacío y concluye sin efectos: los solapes entre
 * la redistribución normal y la emergencia son inocuos.
 * =================================================================
 */

use fingerswarm_domain_models::RebalanceReason;
use fingerswarm_infra_db::repositories::ForcedResolution;
use tracing::{info, warn};

use crate::services::consistency_auditor;
use crate::state::AppState;

/// Ejecuta la recuperación de emergencia de un nodo:
/// 1. Resolución forzosa de toda su propiedad (commit/revert/release).
/// 2. Estado asegurado en INACTIVE y purga de órdenes pendientes.
/// 3. Re-planificación completa contra la flota restante.
/// 4. Verificación de invariantes vía el Auditor de Consistencia.
pub async fn execute_emergency_recovery(
    application_state: &AppState,
    instance_id: &str,
    reason: &str,
) -> anyhow::Result<ForcedResolution> {
    warn!("🚨 [RECOVERY]: Emergency recovery engaged for {}. Reason: {}", instance_id, reason);

    // 1. RESOLUCIÓN FORZOSA DE PROPIEDAD
    let forced_resolution = application_state
        .assignment_repository
        .force_resolve_for_instance(instance_id)
        .await?;

    // 2. ESTADO Y COLAS
    application_state.purge_commands(instance_id);
    let state_changed = application_state
        .instance_repository
        .mark_inactive(instance_id, reason)
        .await?;

    // 3. RE-PLANIFICACIÓN COMPLETA
    application_state.request_rebalance(RebalanceReason::LostInstance);

    // 4. VERIFICACIÓN DE INVARIANTES
    let verification_defects = consistency_auditor::run_repair_cycle(application_state).await?;
    if !verification_defects.is_empty() {
        warn!(
            "🚨 [RECOVERY]: Post-recovery verification surfaced {} defects (repaired where unambiguous).",
            verification_defects.len()
        );
    }

    info!(
        "🩺 [RECOVERY]: Node {} resolved. released={} committed={} reverted={} state_changed={}",
        instance_id,
        forced_resolution.released.len(),
        forced_resolution.committed_to_target.len(),
        forced_resolution.reverted_to_source.len(),
        state_changed
    );

    Ok(forced_resolution)
}

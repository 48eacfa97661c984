// [apps/orchestrator/src/handlers/swarm.rs]
/*!
 * =================================================================
 * APARATO: FLEET HANDSHAKE HANDLER (V21.0 - ADVISORY PROTOCOL)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO, LATIDOS, EARMARKING Y DEVOLUCIÓN DE STREAMS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. IDEMPOTENT SURFACE: Cada mutación es re-jugable: registro por id,
 *    latidos por monotonicidad, liberación por propiedad.
 * 2. ADVISORY MIGRATION: Las órdenes add/remove viajan en el canal de
 *    latidos; el orquestador jamás interrumpe procesamiento en curso.
 * 3. NOMINAL PURITY: Nomenclatura nominal absoluta sin abreviaciones.
 *
 * # Logic:
 * Actúa como el centro nervioso de comunicación con los workers. La
 * propiedad se muta exclusivamente a través de los repositorios del
 * Gatekeeper; aquí solo se clasifica, valida y proyecta.
 * =================================================================
 */

use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use fingerswarm_domain_models::{
    AssignmentRequestPayload, HeartbeatAcknowledgement, HeartbeatPayload, InstanceStatus,
    RebalanceReason, RegisterAcknowledgement, RegisterPayload, ReleasePayload, UpdateStreamPayload,
    WorkerCommand,
};
use fingerswarm_infra_db::repositories::{InstanceRegistration, RegistrationVerdict};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::errors::ApiError;
use crate::state::AppState;

pub struct FleetHandshakeHandler;

impl FleetHandshakeHandler {
    /**
     * Endpoint: POST /api/v1/swarm/register
     *
     * Alta idempotente de un nodo: génesis para ids nuevos, re-enganche
     * para conocidos (capacidad y metadatos refrescados, registered_at y
     * asignaciones intactas).
     *
     * # Errors:
     * - `400`: identificador vacío o capacidad nula.
     * - `503`: Gatekeeper degradado (el worker debe reintentar).
     */
    #[instrument(skip(application_state, registration_payload), fields(instance = %registration_payload.id))]
    pub async fn handle_register(
        State(application_state): State<AppState>,
        Json(registration_payload): Json<RegisterPayload>,
    ) -> Result<impl IntoResponse, ApiError> {
        if registration_payload.id.trim().is_empty() {
            return Err(ApiError::Validation("instance_identifier must not be empty".into()));
        }
        if registration_payload.capacity_max == 0 {
            return Err(ApiError::Validation("capacity_max must be positive".into()));
        }

        let (registered_instance, verdict) = application_state
            .instance_repository
            .register(InstanceRegistration {
                id: registration_payload.id.clone(),
                capacity_max: registration_payload.capacity_max,
                address: registration_payload.address.clone(),
                metadata: registration_payload.metadata.clone(),
            })
            .await?;

        match verdict {
            RegistrationVerdict::Registered => {
                info!("🛰️  [FLEET]: New node {} joined the fleet (cap {}).",
                    registered_instance.id, registered_instance.capacity_max);
            }
            RegistrationVerdict::Reattached => {
                info!("🔄 [FLEET]: Node {} reattached. Counters reset, ownership preserved.",
                    registered_instance.id);
            }
        }

        let surviving_assignment: Vec<i64> = application_state
            .assignment_repository
            .list_by_instance(&registered_instance.id)
            .await?
            .into_iter()
            .map(|assignment| assignment.stream_id)
            .collect();

        Ok(Json(RegisterAcknowledgement {
            heartbeat_interval_s: application_state.config.heartbeat_interval_s,
            initial_assignment: surviving_assignment,
            commands: application_state.drain_commands(&registered_instance.id),
        }))
    }

    /**
     * Endpoint: POST /api/v1/swarm/heartbeat
     *
     * Acepta un latido, recalcula biometría y devuelve las órdenes
     * advisorias pendientes del plan vigente.
     *
     * # Errors:
     * - `404`: nodo desconocido (el worker debe re-registrarse).
     * - `409 STALE_HEARTBEAT`: marca temporal fuera de orden, descartada.
     */
    #[instrument(skip(application_state, heartbeat_payload), fields(instance = %heartbeat_payload.id))]
    pub async fn handle_heartbeat(
        State(application_state): State<AppState>,
        Json(heartbeat_payload): Json<HeartbeatPayload>,
    ) -> Result<impl IntoResponse, ApiError> {
        // Señal de rendimiento: métricas del payload o acumulado de updates.
        let performance_signal = heartbeat_payload
            .metrics
            .as_ref()
            .and_then(|metrics| {
                let total_updates = metrics.processed_ok + metrics.processed_failed;
                (total_updates > 0).then(|| metrics.processed_ok as f64 / total_updates as f64)
            })
            .or_else(|| application_state.drain_processing_signal(&heartbeat_payload.id));

        let (updated_instance, previous_status) = application_state
            .instance_repository
            .record_heartbeat(
                &heartbeat_payload.id,
                heartbeat_payload.timestamp,
                performance_signal,
                application_state.config.recovery_confirmation_beats,
            )
            .await?;

        // Transición a ACTIVE: el nodo entra (o re-entra) al reparto.
        if updated_instance.status == InstanceStatus::Active
            && matches!(previous_status, InstanceStatus::Registered | InstanceStatus::Recovering)
        {
            info!(
                "🟢 [FLEET]: Node {} is ACTIVE (was {}). Requesting redistribution.",
                updated_instance.id,
                previous_status.as_str()
            );
            application_state.request_rebalance(RebalanceReason::NewInstance);
        }

        Ok(Json(HeartbeatAcknowledgement {
            commands: application_state.drain_commands(&updated_instance.id),
        }))
    }

    /**
     * Endpoint: POST /api/v1/swarm/assignment/request
     *
     * Entrega hasta 'desired_count' streams sin dueño vivo, respetando la
     * holgura de capacidad del solicitante.
     */
    #[instrument(skip(application_state, request_payload), fields(instance = %request_payload.id))]
    pub async fn handle_assignment_request(
        State(application_state): State<AppState>,
        Json(request_payload): Json<AssignmentRequestPayload>,
    ) -> Result<impl IntoResponse, ApiError> {
        let requesting_instance = application_state
            .instance_repository
            .get(&request_payload.id)
            .await?
            .ok_or(ApiError::UnknownInstance)?;

        if !requesting_instance.status.is_eligible_for_dispatch() {
            return Err(ApiError::Conflict {
                defect_code: "INSTANCE_NOT_ELIGIBLE",
                detail: format!(
                    "node {} in state {} receives no new work",
                    requesting_instance.id,
                    requesting_instance.status.as_str()
                ),
            });
        }

        let current_live_count = application_state
            .assignment_repository
            .count_live_for_instance(&requesting_instance.id)
            .await?;
        let capacity_headroom =
            requesting_instance.capacity_max.saturating_sub(current_live_count);
        let grantable_count = request_payload.desired_count.min(capacity_headroom) as usize;

        if grantable_count == 0 {
            return Ok(Json(json!({ "stream_ids": [] })));
        }

        // Streams del catálogo sin propietario vivo, en orden estable.
        let owned_streams: std::collections::HashSet<i64> = application_state
            .assignment_repository
            .list_live()
            .await?
            .into_iter()
            .map(|assignment| assignment.stream_id)
            .collect();

        let earmarked_streams: Vec<i64> = application_state
            .catalog_view()
            .into_iter()
            .filter(|stream_id| !owned_streams.contains(stream_id))
            .take(grantable_count)
            .collect();

        if earmarked_streams.is_empty() {
            return Ok(Json(json!({ "stream_ids": [] })));
        }

        let granted_streams = application_state
            .assignment_repository
            .assign(earmarked_streams, &requesting_instance.id)
            .await?;

        debug!(
            "🎯 [FLEET]: Granted {} streams to {} on demand.",
            granted_streams.len(),
            requesting_instance.id
        );
        Ok(Json(json!({ "stream_ids": granted_streams })))
    }

    /**
     * Endpoint: POST /api/v1/swarm/release
     *
     * Devolución voluntaria de propiedad con veredicto por fila. Para
     * traspasos en vuelo cuyo origen es el liberador, la liberación
     * ejecuta la fase 2 y el destino recibe su orden add_stream.
     */
    #[instrument(skip(application_state, release_payload), fields(instance = %release_payload.id, count = release_payload.stream_ids.len()))]
    pub async fn handle_release(
        State(application_state): State<AppState>,
        Json(release_payload): Json<ReleasePayload>,
    ) -> Result<impl IntoResponse, ApiError> {
        let release_outcome = application_state
            .assignment_repository
            .release(release_payload.stream_ids.clone(), &release_payload.id)
            .await?;

        // Traspasos comprometidos por esta liberación: notificar destinos.
        if !release_outcome.released.is_empty() {
            let released_set: std::collections::HashSet<i64> =
                release_outcome.released.iter().copied().collect();
            let live_after_release = application_state.assignment_repository.list_live().await?;

            for assignment in live_after_release {
                if released_set.contains(&assignment.stream_id) {
                    if let Some(new_owner) = &assignment.instance_id {
                        if new_owner != &release_payload.id {
                            application_state.enqueue_command(
                                new_owner,
                                WorkerCommand::AddStream { stream_id: assignment.stream_id },
                            );
                        }
                    }
                }
            }
        }

        Ok(Json(release_outcome))
    }

    /**
     * Endpoint: POST /api/v1/swarm/update_stream
     *
     * Reporte por stream del desenlace de procesamiento. Solo alimenta el
     * score de rendimiento y la observabilidad; nunca muta propiedad.
     * Idempotente por (stream_id, timestamp).
     */
    #[instrument(skip(application_state, update_payload), fields(instance = %update_payload.id, stream = update_payload.stream_id))]
    pub async fn handle_update_stream(
        State(application_state): State<AppState>,
        Json(update_payload): Json<UpdateStreamPayload>,
    ) -> Result<impl IntoResponse, ApiError> {
        let accepted = application_state.record_stream_outcome(&update_payload);
        if !accepted {
            debug!(
                "♻️  [FLEET]: Duplicate update for stream {} ignored.",
                update_payload.stream_id
            );
        }
        Ok(Json(json!({})))
    }
}

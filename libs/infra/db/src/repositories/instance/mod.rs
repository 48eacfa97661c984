// [libs/infra/db/src/repositories/instance/mod.rs]
/*!
 * =================================================================
 * APARATO: FLEET REGISTRY REPOSITORY (V13.0 - VITALITY AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: DIRECTORIO DURABLE DE NODOS Y MÁQUINA DE ESTADOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE WRITER: Este repositorio es el único mutador de filas
 *    'instances'; daemons y handlers operan a través de él.
 * 2. MONOTONIC HEARTBEATS: Los latidos fuera de orden se rechazan con
 *    StaleHeartbeat; la secuencia de estados jamás retrocede.
 * 3. REATTACH SEMANTICS: Un id conocido que re-registra preserva su
 *    registered_at y sus asignaciones; solo resetea contadores.
 *
 * # Mathematical Proof (Clean Recovery):
 * failure_count solo se pone a cero en el re-enganche explícito o al
 * confirmarse RECOVERING -> ACTIVE, de modo que el contador mide fallos
 * desde la última recuperación limpia, nunca desde el último latido.
 * =================================================================
 */

pub mod queries;

use chrono::{DateTime, Utc};
use fingerswarm_domain_models::{Instance, InstanceStatus};
use libsql::{params, Row};
use tracing::{debug, instrument, warn};

use crate::client::GatekeeperClient;
use crate::errors::DbError;

/// Material de alta entregado por el worker en el registro.
#[derive(Debug, Clone)]
pub struct InstanceRegistration {
    pub id: String,
    pub capacity_max: u32,
    pub address: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Desenlace de un registro: génesis o re-enganche de un id conocido.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationVerdict {
    Registered,
    Reattached,
}

/// Transición aplicada por el barrido de silencio del sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilenceTransition {
    pub instance_id: String,
    pub from_status: InstanceStatus,
    pub to_status: InstanceStatus,
}

/// Repositorio de autoridad única para el registro de vitalidad de la flota.
pub struct InstanceRepository {
    gatekeeper: GatekeeperClient,
}

impl InstanceRepository {
    #[must_use]
    pub fn new(gatekeeper: GatekeeperClient) -> Self {
        Self { gatekeeper }
    }

    /// Alta idempotente: génesis para ids nuevos, re-enganche para conocidos.
    ///
    /// # Errors:
    /// - `DbError::MappingError`: fila corrupta en el Ledger.
    #[instrument(skip(self, registration), fields(instance = %registration.id))]
    pub async fn register(
        &self,
        registration: InstanceRegistration,
    ) -> Result<(Instance, RegistrationVerdict), DbError> {
        self.gatekeeper
            .run_write("instance_register", move |connection| {
                let registration = registration.clone();
                Box::pin(async move {
                    let metadata_json = registration
                        .metadata
                        .as_ref()
                        .map(|metadata| metadata.to_string());

                    let mut existing_rows = connection
                        .query(
                            &format!("{} WHERE id = ?1", queries::INSTANCE_PROJECTION),
                            params![registration.id.clone()],
                        )
                        .await?;

                    let verdict = if existing_rows.next().await?.is_some() {
                        connection
                            .execute(
                                queries::REATTACH_INSTANCE,
                                params![
                                    registration.id.clone(),
                                    registration.address.clone(),
                                    i64::from(registration.capacity_max),
                                    metadata_json.clone()
                                ],
                            )
                            .await?;
                        RegistrationVerdict::Reattached
                    } else {
                        connection
                            .execute(
                                queries::INSERT_INSTANCE,
                                params![
                                    registration.id.clone(),
                                    registration.address.clone(),
                                    i64::from(registration.capacity_max),
                                    Utc::now().to_rfc3339(),
                                    metadata_json.clone()
                                ],
                            )
                            .await?;
                        RegistrationVerdict::Registered
                    };

                    let hydrated = fetch_instance(&connection, &registration.id)
                        .await?
                        .ok_or(DbError::UnknownInstance)?;
                    Ok((hydrated, verdict))
                })
            })
            .await
    }

    /// Acepta un latido, recalcula score y aplica la máquina de estados.
    ///
    /// Devuelve la entidad actualizada y el estado previo, para que el
    /// estrato superior dispare rebalanceos en las transiciones a ACTIVE.
    ///
    /// # Errors:
    /// - `DbError::UnknownInstance`: id ausente o ya REMOVED.
    /// - `DbError::StaleHeartbeat`: marca temporal no posterior a la última.
    #[instrument(skip(self, performance_signal))]
    pub async fn record_heartbeat(
        &self,
        instance_id: &str,
        beat_timestamp: DateTime<Utc>,
        performance_signal: Option<f64>,
        recovery_confirmation_beats: u32,
    ) -> Result<(Instance, InstanceStatus), DbError> {
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_write("instance_heartbeat", move |connection| {
                let instance_id = instance_id.clone();
                Box::pin(async move {
                    let existing = fetch_instance(&connection, &instance_id)
                        .await?
                        .ok_or(DbError::UnknownInstance)?;

                    if let Some(last_accepted) = existing.last_heartbeat {
                        if beat_timestamp <= last_accepted {
                            return Err(DbError::StaleHeartbeat);
                        }
                    }

                    let previous_status = existing.status;
                    let (next_status, next_streak, next_failure_count) = match previous_status {
                        InstanceStatus::Registered
                        | InstanceStatus::Active
                        | InstanceStatus::Warning => (InstanceStatus::Active, 0, existing.failure_count),
                        InstanceStatus::Inactive => (InstanceStatus::Recovering, 1, existing.failure_count),
                        InstanceStatus::Recovering => {
                            let confirmed_streak = existing.recovery_streak + 1;
                            if confirmed_streak >= recovery_confirmation_beats {
                                // Recuperación limpia: el contador de fallos se reinicia.
                                (InstanceStatus::Active, 0, 0)
                            } else {
                                (InstanceStatus::Recovering, confirmed_streak, existing.failure_count)
                            }
                        }
                        // Un nodo retirado debe re-registrarse para volver.
                        InstanceStatus::Removed => return Err(DbError::UnknownInstance),
                    };

                    let next_score = match performance_signal {
                        Some(signal) => {
                            Instance::blended_performance_score(existing.performance_score, signal)
                        }
                        None => existing.performance_score,
                    };

                    connection
                        .execute(
                            queries::SEAL_HEARTBEAT,
                            params![
                                instance_id.clone(),
                                beat_timestamp.to_rfc3339(),
                                next_status.as_str(),
                                next_score,
                                i64::from(next_streak),
                                i64::from(next_failure_count)
                            ],
                        )
                        .await?;

                    let hydrated = fetch_instance(&connection, &instance_id)
                        .await?
                        .ok_or(DbError::UnknownInstance)?;
                    Ok((hydrated, previous_status))
                })
            })
            .await
    }

    /// Snapshot de los nodos elegibles para recibir trabajo.
    pub async fn list_active(&self) -> Result<Vec<Instance>, DbError> {
        self.gatekeeper
            .run_read("instance_list_active", move |connection| {
                Box::pin(async move {
                    let mut rows = connection
                        .query(
                            &format!(
                                "{} WHERE status IN ('ACTIVE', 'RECOVERING') ORDER BY id ASC",
                                queries::INSTANCE_PROJECTION
                            ),
                            (),
                        )
                        .await?;
                    collect_instances(&mut rows).await
                })
            })
            .await
    }

    /// Directorio completo (diagnóstico del operador).
    pub async fn list_all(&self) -> Result<Vec<Instance>, DbError> {
        self.gatekeeper
            .run_read("instance_list_all", move |connection| {
                Box::pin(async move {
                    let mut rows = connection
                        .query(
                            &format!("{} ORDER BY id ASC", queries::INSTANCE_PROJECTION),
                            (),
                        )
                        .await?;
                    collect_instances(&mut rows).await
                })
            })
            .await
    }

    /// Búsqueda puntual por identificador.
    pub async fn get(&self, instance_id: &str) -> Result<Option<Instance>, DbError> {
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_read("instance_get", move |connection| {
                let instance_id = instance_id.clone();
                Box::pin(async move { fetch_instance(&connection, &instance_id).await })
            })
            .await
    }

    /// Transición explícita a INACTIVE (idempotente; conserva la razón en log).
    #[instrument(skip(self))]
    pub async fn mark_inactive(&self, instance_id: &str, reason: &str) -> Result<bool, DbError> {
        warn!("🩺 [REGISTRY]: Marking {} INACTIVE. Reason: {}", instance_id, reason);
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_write("instance_mark_inactive", move |connection| {
                let instance_id = instance_id.clone();
                Box::pin(async move {
                    let affected = connection
                        .execute(queries::MARK_INACTIVE, params![instance_id.clone()])
                        .await?;
                    Ok(affected > 0)
                })
            })
            .await
    }

    /// Retiro definitivo (operador o expiración de plazo). Idempotente.
    #[instrument(skip(self))]
    pub async fn mark_removed(&self, instance_id: &str) -> Result<bool, DbError> {
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_write("instance_mark_removed", move |connection| {
                let instance_id = instance_id.clone();
                Box::pin(async move {
                    let affected = connection
                        .execute(queries::MARK_REMOVED, params![instance_id.clone()])
                        .await?;
                    Ok(affected > 0)
                })
            })
            .await
    }

    /// Barrido de silencio del sentinel: aplica las transiciones temporales
    /// de la máquina de estados en orden ascendente de identificador.
    ///
    /// Una transición por barrido y nodo: un nodo ACTIVE con silencio
    /// extremo pasa por WARNING en este tick e INACTIVE en el siguiente.
    #[instrument(skip(self))]
    pub async fn sweep_silence(
        &self,
        observation_instant: DateTime<Utc>,
        warn_threshold_s: i64,
        inactive_threshold_s: i64,
        removal_timeout_s: i64,
    ) -> Result<Vec<SilenceTransition>, DbError> {
        self.gatekeeper
            .run_write("instance_sweep_silence", move |connection| {
                Box::pin(async move {
                    let mut rows = connection
                        .query(
                            &format!(
                                "{} WHERE status IN ('ACTIVE', 'WARNING', 'INACTIVE') ORDER BY id ASC",
                                queries::INSTANCE_PROJECTION
                            ),
                            (),
                        )
                        .await?;
                    let fleet = collect_instances(&mut rows).await?;

                    let mut applied_transitions = Vec::new();

                    for node in fleet {
                        let silence_baseline = node.last_heartbeat.unwrap_or(node.registered_at);
                        let silence_seconds =
                            (observation_instant - silence_baseline).num_seconds();

                        let planned = match node.status {
                            InstanceStatus::Active if silence_seconds > warn_threshold_s => {
                                Some((InstanceStatus::Warning, 0i64))
                            }
                            InstanceStatus::Warning if silence_seconds > inactive_threshold_s => {
                                Some((InstanceStatus::Inactive, 1i64))
                            }
                            InstanceStatus::Inactive if silence_seconds > removal_timeout_s => {
                                Some((InstanceStatus::Removed, 0i64))
                            }
                            _ => None,
                        };

                        if let Some((next_status, failure_delta)) = planned {
                            let affected = connection
                                .execute(
                                    queries::APPLY_SILENCE_TRANSITION,
                                    params![
                                        node.id.clone(),
                                        next_status.as_str(),
                                        failure_delta,
                                        node.status.as_str()
                                    ],
                                )
                                .await?;

                            // La guardia de estado pudo perder contra un latido concurrente.
                            if affected > 0 {
                                debug!(
                                    "🩺 [REGISTRY]: Silence transition {} {} -> {}",
                                    node.id,
                                    node.status.as_str(),
                                    next_status.as_str()
                                );
                                applied_transitions.push(SilenceTransition {
                                    instance_id: node.id.clone(),
                                    from_status: node.status,
                                    to_status: next_status,
                                });
                            }
                        }
                    }

                    Ok(applied_transitions)
                })
            })
            .await
    }
}

// --- HIDRATACIÓN DE FILAS ---

async fn fetch_instance(
    connection: &libsql::Connection,
    instance_id: &str,
) -> Result<Option<Instance>, DbError> {
    let mut rows = connection
        .query(
            &format!("{} WHERE id = ?1", queries::INSTANCE_PROJECTION),
            params![instance_id.to_string()],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(hydrate_instance(&row)?)),
        None => Ok(None),
    }
}

async fn collect_instances(rows: &mut libsql::Rows) -> Result<Vec<Instance>, DbError> {
    let mut fleet = Vec::new();
    while let Some(row) = rows.next().await? {
        fleet.push(hydrate_instance(&row)?);
    }
    Ok(fleet)
}

fn hydrate_instance(row: &Row) -> Result<Instance, DbError> {
    let raw_status: String = row.get(3)?;
    let status = InstanceStatus::parse(&raw_status)
        .ok_or_else(|| DbError::MappingError(format!("unknown instance status '{raw_status}'")))?;

    let last_heartbeat: Option<String> = row.get(4)?;
    let registered_at_raw: String = row.get(5)?;
    let metadata_json: Option<String> = row.get(9)?;

    Ok(Instance {
        id: row.get(0)?,
        address: row.get(1)?,
        capacity_max: row.get::<i64>(2)? as u32,
        status,
        last_heartbeat: last_heartbeat.map(|raw| parse_utc(&raw)).transpose()?,
        registered_at: parse_utc(&registered_at_raw)?,
        failure_count: row.get::<i64>(6)? as u32,
        performance_score: row.get(7)?,
        recovery_streak: row.get::<i64>(8)? as u32,
        metadata: metadata_json
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|fault| DbError::MappingError(format!("metadata decode: {fault}")))
            })
            .transpose()?,
    })
}

fn parse_utc(raw_timestamp: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw_timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|fault| DbError::MappingError(format!("timestamp decode '{raw_timestamp}': {fault}")))
}

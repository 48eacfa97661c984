// [libs/infra/db/src/repositories/assignment/mod.rs]
/*!
 * =================================================================
 * APARATO: ASSIGNMENT STORE REPOSITORY (V16.0 - SINGLE OWNER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CICLO DE VIDA TRANSACCIONAL DE PROPIEDAD DE STREAMS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE WRITER: Único mutador de filas 'assignments'. El balanceador
 *    emite planes; este repositorio los aplica.
 * 2. BATCH ATOMICITY: 'assign' es todo-o-nada: un conflicto de propiedad
 *    o capacidad revierte el lote completo.
 * 3. FIXED LOCK ORDER: Toda operación multi-fila procesa streams en orden
 *    ascendente, eliminando ciclos de espera entre transacciones.
 * 4. TWO PHASE HANDOFF: MIGRATING es la única ventana de doble referencia;
 *    se compromete al destino o se revierte al origen, nunca se pierde.
 * =================================================================
 */

pub mod queries;

use chrono::{DateTime, Duration, Utc};
use fingerswarm_domain_models::{AssignmentStatus, ReleaseOutcome, StreamAssignment};
use libsql::{params, Row, Transaction};
use tracing::{debug, instrument, warn};

use crate::client::GatekeeperClient;
use crate::errors::DbError;

/// Directiva de movimiento consumida desde el plan del balanceador.
#[derive(Debug, Clone)]
pub struct MigrationDirective {
    pub stream_id: i64,
    /// Nodo donante; nulo para colocaciones de streams sin dueño vivo.
    pub source: Option<String>,
    pub target: String,
}

/// Desenlace de la aplicación de un lote de directivas.
#[derive(Debug, Clone, Default)]
pub struct BatchApplication {
    /// Streams colocados directamente (sin dueño previo).
    pub placements: Vec<i64>,
    /// Streams marcados MIGRATING a la espera de la fase 2.
    pub migrations_marked: Vec<i64>,
    /// Directivas obsoletas respecto del Ledger (plan desactualizado).
    pub skipped: Vec<i64>,
}

/// Desenlace de la resolución forzosa de la propiedad de un nodo.
#[derive(Debug, Clone, Default)]
pub struct ForcedResolution {
    /// Traspasos en vuelo comprometidos a su destino.
    pub committed_to_target: Vec<i64>,
    /// Traspasos entrantes revertidos a su origen.
    pub reverted_to_source: Vec<i64>,
    /// Propiedad plena liberada para re-planificación.
    pub released: Vec<i64>,
}

/// Repositorio de autoridad única sobre el Ledger de asignaciones.
pub struct AssignmentRepository {
    gatekeeper: GatekeeperClient,
}

impl AssignmentRepository {
    #[must_use]
    pub fn new(gatekeeper: GatekeeperClient) -> Self {
        Self { gatekeeper }
    }

    /// Asigna (o re-confirma) un lote de streams a un nodo. Atómico:
    /// cualquier violación de capacidad o propiedad revierte el lote.
    ///
    /// # Errors:
    /// - `DbError::UnknownInstance`: el nodo destino no existe.
    /// - `DbError::CapacityExceeded`: el lote superaría capacity_max.
    /// - `DbError::AlreadyAssigned`: algún stream tiene otro dueño vivo.
    #[instrument(skip(self, stream_ids), fields(count = stream_ids.len(), instance = %instance_id))]
    pub async fn assign(
        &self,
        stream_ids: Vec<i64>,
        instance_id: &str,
    ) -> Result<Vec<i64>, DbError> {
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_write("assignment_assign", move |connection| {
                let instance_id = instance_id.clone();
                let mut ordered_streams = stream_ids.clone();
                ordered_streams.sort_unstable();
                ordered_streams.dedup();

                Box::pin(async move {
                    let transaction = connection.transaction().await?;
                    let outcome =
                        assign_within(&transaction, &ordered_streams, &instance_id).await;
                    seal_transaction(transaction, outcome).await
                })
            })
            .await
    }

    /// Devuelve propiedad por lote con veredicto por fila. Idempotente:
    /// los streams que el nodo no posee se reportan como ignorados.
    ///
    /// Para filas MIGRATING cuyo origen es el liberador, la liberación
    /// ejecuta la fase 2: la propiedad se compromete al destino.
    #[instrument(skip(self, stream_ids), fields(count = stream_ids.len(), instance = %instance_id))]
    pub async fn release(
        &self,
        stream_ids: Vec<i64>,
        instance_id: &str,
    ) -> Result<ReleaseOutcome, DbError> {
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_write("assignment_release", move |connection| {
                let instance_id = instance_id.clone();
                let mut ordered_streams = stream_ids.clone();
                ordered_streams.sort_unstable();
                ordered_streams.dedup();

                Box::pin(async move {
                    let transaction = connection.transaction().await?;
                    let outcome =
                        release_within(&transaction, &ordered_streams, &instance_id).await;
                    seal_transaction(transaction, outcome).await
                })
            })
            .await
    }

    /// Aplica un lote de directivas del plan: colocaciones directas para
    /// huérfanos y fase 1 (MIGRATING) para traspasos entre nodos.
    #[instrument(skip(self, directives), fields(count = directives.len()))]
    pub async fn apply_directives(
        &self,
        directives: Vec<MigrationDirective>,
    ) -> Result<BatchApplication, DbError> {
        self.gatekeeper
            .run_write("assignment_apply_directives", move |connection| {
                let mut ordered_directives = directives.clone();
                ordered_directives.sort_by_key(|directive| directive.stream_id);

                Box::pin(async move {
                    let transaction = connection.transaction().await?;
                    let outcome = apply_directives_within(&transaction, &ordered_directives).await;
                    seal_transaction(transaction, outcome).await
                })
            })
            .await
    }

    /// Fase 2 explícita: compromete al destino los traspasos indicados.
    pub async fn commit_migrations(&self, stream_ids: Vec<i64>) -> Result<Vec<i64>, DbError> {
        self.gatekeeper
            .run_write("assignment_commit_migrations", move |connection| {
                let mut ordered_streams = stream_ids.clone();
                ordered_streams.sort_unstable();

                Box::pin(async move {
                    let transaction = connection.transaction().await?;
                    let outcome = resolve_migrations_within(
                        &transaction,
                        &ordered_streams,
                        MigrationResolution::Commit,
                    )
                    .await;
                    seal_transaction(transaction, outcome).await
                })
            })
            .await
    }

    /// Reversión explícita: la propiedad regresa intacta al origen.
    pub async fn revert_migrations(&self, stream_ids: Vec<i64>) -> Result<Vec<i64>, DbError> {
        self.gatekeeper
            .run_write("assignment_revert_migrations", move |connection| {
                let mut ordered_streams = stream_ids.clone();
                ordered_streams.sort_unstable();

                Box::pin(async move {
                    let transaction = connection.transaction().await?;
                    let outcome = resolve_migrations_within(
                        &transaction,
                        &ordered_streams,
                        MigrationResolution::Revert,
                    )
                    .await;
                    seal_transaction(transaction, outcome).await
                })
            })
            .await
    }

    /// Resolución forzosa de toda la propiedad de un nodo caído:
    /// traspasos salientes se comprometen, entrantes se revierten y la
    /// propiedad plena se libera para el siguiente plan. Idempotente.
    #[instrument(skip(self))]
    pub async fn force_resolve_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<ForcedResolution, DbError> {
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_write("assignment_force_resolve", move |connection| {
                let instance_id = instance_id.clone();
                Box::pin(async move {
                    let transaction = connection.transaction().await?;
                    let outcome = force_resolve_within(&transaction, &instance_id).await;
                    seal_transaction(transaction, outcome).await
                })
            })
            .await
    }

    /// Propiedad viva de un nodo, en orden serial de stream.
    pub async fn list_by_instance(&self, instance_id: &str) -> Result<Vec<StreamAssignment>, DbError> {
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_read("assignment_list_by_instance", move |connection| {
                let instance_id = instance_id.clone();
                Box::pin(async move {
                    let mut rows = connection
                        .query(queries::LIST_BY_INSTANCE, params![instance_id.clone()])
                        .await?;
                    collect_assignments(&mut rows).await
                })
            })
            .await
    }

    /// Propiedad viva completa del Ledger.
    pub async fn list_live(&self) -> Result<Vec<StreamAssignment>, DbError> {
        self.gatekeeper
            .run_read("assignment_list_live", move |connection| {
                Box::pin(async move {
                    let mut rows = connection.query(queries::LIST_LIVE, ()).await?;
                    collect_assignments(&mut rows).await
                })
            })
            .await
    }

    /// Filas vivas que referencian nodos inexistentes o REMOVED.
    pub async fn list_orphans(&self) -> Result<Vec<StreamAssignment>, DbError> {
        self.gatekeeper
            .run_read("assignment_list_orphans", move |connection| {
                Box::pin(async move {
                    let mut rows = connection.query(queries::LIST_ORPHANS, ()).await?;
                    collect_assignments(&mut rows).await
                })
            })
            .await
    }

    /// Filas vivas de streams con más de un propietario simultáneo.
    pub async fn list_duplicates(&self) -> Result<Vec<StreamAssignment>, DbError> {
        self.gatekeeper
            .run_read("assignment_list_duplicates", move |connection| {
                Box::pin(async move {
                    let mut rows = connection.query(queries::LIST_DUPLICATES, ()).await?;
                    collect_assignments(&mut rows).await
                })
            })
            .await
    }

    /// Traspasos en vuelo que superaron el presupuesto de migración.
    pub async fn list_stuck_migrations(
        &self,
        migration_timeout_s: i64,
    ) -> Result<Vec<StreamAssignment>, DbError> {
        self.gatekeeper
            .run_read("assignment_list_stuck", move |connection| {
                Box::pin(async move {
                    let expiry_horizon =
                        (Utc::now() - Duration::seconds(migration_timeout_s)).to_rfc3339();
                    let mut rows = connection
                        .query(queries::LIST_STUCK_MIGRATIONS, params![expiry_horizon])
                        .await?;
                    collect_assignments(&mut rows).await
                })
            })
            .await
    }

    /// Libera filas concretas por clave física (reparaciones del Auditor).
    pub async fn release_rows(&self, row_ids: Vec<i64>) -> Result<u32, DbError> {
        self.gatekeeper
            .run_write("assignment_release_rows", move |connection| {
                let mut ordered_rows = row_ids.clone();
                ordered_rows.sort_unstable();

                Box::pin(async move {
                    let transaction = connection.transaction().await?;
                    let outcome = async {
                        let mut released_count = 0u32;
                        for row_identifier in &ordered_rows {
                            released_count += connection_release_row(&transaction, *row_identifier).await?;
                        }
                        Ok(released_count)
                    }
                    .await;
                    seal_transaction(transaction, outcome).await
                })
            })
            .await
    }

    /// Conteo de propiedad viva de un nodo (invariante de capacidad).
    pub async fn count_live_for_instance(&self, instance_id: &str) -> Result<u32, DbError> {
        let instance_id = instance_id.to_string();
        self.gatekeeper
            .run_read("assignment_count_live", move |connection| {
                let instance_id = instance_id.clone();
                Box::pin(async move {
                    let mut rows = connection
                        .query(queries::COUNT_LIVE_FOR_INSTANCE, params![instance_id.clone()])
                        .await?;
                    match rows.next().await? {
                        Some(row) => Ok(row.get::<i64>(0)? as u32),
                        None => Ok(0),
                    }
                })
            })
            .await
    }
}

// --- NÚCLEOS TRANSACCIONALES ---

#[derive(Debug, Clone, Copy)]
enum MigrationResolution {
    Commit,
    Revert,
}

async fn assign_within(
    transaction: &Transaction,
    ordered_streams: &[i64],
    instance_id: &str,
) -> Result<Vec<i64>, DbError> {
    // 1. Capacidad declarada del destino.
    let mut capacity_rows = transaction
        .query(
            "SELECT capacity_max FROM instances WHERE id = ?1 AND status != 'REMOVED'",
            params![instance_id.to_string()],
        )
        .await?;
    let capacity_max = match capacity_rows.next().await? {
        Some(row) => row.get::<i64>(0)?,
        None => return Err(DbError::UnknownInstance),
    };

    let mut live_count_rows = transaction
        .query(queries::COUNT_LIVE_FOR_INSTANCE, params![instance_id.to_string()])
        .await?;
    let current_live_count = match live_count_rows.next().await? {
        Some(row) => row.get::<i64>(0)?,
        None => 0,
    };

    // 2. Clasificación del lote bajo la secuencia serial de cada stream.
    let mut pending_inserts: Vec<i64> = Vec::new();
    for stream_id in ordered_streams {
        match find_live_row(transaction, *stream_id).await? {
            None => pending_inserts.push(*stream_id),
            Some(live_row) => {
                if live_row.instance_id.as_deref() == Some(instance_id) {
                    // Reintento idempotente: el stream ya pertenece al nodo.
                    continue;
                }
                return Err(DbError::AlreadyAssigned {
                    stream_id: *stream_id,
                    owner: live_row.instance_id.unwrap_or_else(|| "UNOWNED".into()),
                });
            }
        }
    }

    // 3. Veredicto atómico de capacidad antes de insertar fila alguna.
    if current_live_count + pending_inserts.len() as i64 > capacity_max {
        return Err(DbError::CapacityExceeded {
            instance_id: instance_id.to_string(),
            capacity_max: capacity_max as u32,
        });
    }

    let assignment_instant = Utc::now().to_rfc3339();
    for stream_id in &pending_inserts {
        transaction
            .execute(
                queries::INSERT_ASSIGNMENT,
                params![*stream_id, instance_id.to_string(), assignment_instant.clone()],
            )
            .await?;
    }

    Ok(pending_inserts)
}

async fn release_within(
    transaction: &Transaction,
    ordered_streams: &[i64],
    instance_id: &str,
) -> Result<ReleaseOutcome, DbError> {
    let mut outcome = ReleaseOutcome { released: Vec::new(), ignored: Vec::new() };

    for stream_id in ordered_streams {
        let Some(live_row) = find_live_row(transaction, *stream_id).await? else {
            outcome.ignored.push(*stream_id);
            continue;
        };

        let is_owner = live_row.instance_id.as_deref() == Some(instance_id);
        match (live_row.status, is_owner) {
            (AssignmentStatus::Assigned, true) => {
                connection_release_row(transaction, live_row.row_id).await?;
                outcome.released.push(*stream_id);
            }
            (AssignmentStatus::Migrating, true) => {
                // El origen confirma la liberación: fase 2 al destino.
                transaction
                    .execute(
                        queries::COMMIT_MIGRATION_ROW,
                        params![live_row.row_id, Utc::now().to_rfc3339()],
                    )
                    .await?;
                outcome.released.push(*stream_id);
            }
            _ => outcome.ignored.push(*stream_id),
        }
    }

    Ok(outcome)
}

async fn apply_directives_within(
    transaction: &Transaction,
    ordered_directives: &[MigrationDirective],
) -> Result<BatchApplication, DbError> {
    let mut application = BatchApplication::default();
    let placement_instant = Utc::now().to_rfc3339();

    for directive in ordered_directives {
        match &directive.source {
            None => {
                // Colocación directa: solo si el stream sigue sin dueño vivo
                // y el destino conserva holgura de capacidad.
                if find_live_row(transaction, directive.stream_id).await?.is_some() {
                    application.skipped.push(directive.stream_id);
                    continue;
                }
                if !target_has_headroom(transaction, &directive.target).await? {
                    warn!(
                        "⚖️  [ASSIGNMENTS]: Placement of {} skipped, {} at capacity.",
                        directive.stream_id, directive.target
                    );
                    application.skipped.push(directive.stream_id);
                    continue;
                }
                transaction
                    .execute(
                        queries::INSERT_ASSIGNMENT,
                        params![
                            directive.stream_id,
                            directive.target.clone(),
                            placement_instant.clone()
                        ],
                    )
                    .await?;
                application.placements.push(directive.stream_id);
            }
            Some(source_identifier) => {
                let Some(live_row) = find_live_row(transaction, directive.stream_id).await? else {
                    application.skipped.push(directive.stream_id);
                    continue;
                };
                let affected = transaction
                    .execute(
                        queries::BEGIN_MIGRATION_ROW,
                        params![
                            live_row.row_id,
                            source_identifier.clone(),
                            directive.target.clone(),
                            Utc::now().to_rfc3339()
                        ],
                    )
                    .await?;
                if affected > 0 {
                    application.migrations_marked.push(directive.stream_id);
                } else {
                    application.skipped.push(directive.stream_id);
                }
            }
        }
    }

    Ok(application)
}

async fn resolve_migrations_within(
    transaction: &Transaction,
    ordered_streams: &[i64],
    resolution: MigrationResolution,
) -> Result<Vec<i64>, DbError> {
    let mut resolved = Vec::new();

    for stream_id in ordered_streams {
        let Some(live_row) = find_live_row(transaction, *stream_id).await? else {
            continue;
        };
        if live_row.status != AssignmentStatus::Migrating {
            continue;
        }

        let affected = match resolution {
            MigrationResolution::Commit => {
                transaction
                    .execute(
                        queries::COMMIT_MIGRATION_ROW,
                        params![live_row.row_id, Utc::now().to_rfc3339()],
                    )
                    .await?
            }
            MigrationResolution::Revert => {
                transaction
                    .execute(queries::REVERT_MIGRATION_ROW, params![live_row.row_id])
                    .await?
            }
        };

        if affected > 0 {
            resolved.push(*stream_id);
        }
    }

    Ok(resolved)
}

async fn force_resolve_within(
    transaction: &Transaction,
    instance_id: &str,
) -> Result<ForcedResolution, DbError> {
    let mut resolution = ForcedResolution::default();

    // 1. Propiedad viva del nodo (incluye traspasos salientes).
    let mut owned_rows = transaction
        .query(queries::LIST_BY_INSTANCE, params![instance_id.to_string()])
        .await?;
    let owned = collect_assignments(&mut owned_rows).await?;

    for row in owned {
        match row.status {
            AssignmentStatus::Migrating => {
                transaction
                    .execute(
                        queries::COMMIT_MIGRATION_ROW,
                        params![row.row_id, Utc::now().to_rfc3339()],
                    )
                    .await?;
                resolution.committed_to_target.push(row.stream_id);
            }
            AssignmentStatus::Assigned => {
                connection_release_row(transaction, row.row_id).await?;
                resolution.released.push(row.stream_id);
            }
            AssignmentStatus::Released => {}
        }
    }

    // 2. Traspasos entrantes hacia el nodo caído: regresan al origen.
    let mut inbound_rows = transaction
        .query(
            &format!(
                "{} WHERE migration_target = ?1 AND status = 'MIGRATING' ORDER BY stream_id ASC",
                queries::ASSIGNMENT_PROJECTION
            ),
            params![instance_id.to_string()],
        )
        .await?;
    let inbound = collect_assignments(&mut inbound_rows).await?;

    for row in inbound {
        transaction
            .execute(queries::REVERT_MIGRATION_ROW, params![row.row_id])
            .await?;
        resolution.reverted_to_source.push(row.stream_id);
    }

    Ok(resolution)
}

// --- AUXILIARES DE FILA ---

async fn find_live_row(
    transaction: &Transaction,
    stream_id: i64,
) -> Result<Option<StreamAssignment>, DbError> {
    let mut rows = transaction
        .query(queries::FIND_LIVE_ROW_FOR_STREAM, params![stream_id])
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(hydrate_assignment(&row)?)),
        None => Ok(None),
    }
}

async fn connection_release_row(
    transaction: &Transaction,
    row_identifier: i64,
) -> Result<u32, DbError> {
    let affected = transaction
        .execute(queries::RELEASE_ROW_BY_ID, params![row_identifier])
        .await?;
    Ok(affected as u32)
}

async fn target_has_headroom(transaction: &Transaction, instance_id: &str) -> Result<bool, DbError> {
    let mut capacity_rows = transaction
        .query(
            "SELECT capacity_max FROM instances WHERE id = ?1 AND status != 'REMOVED'",
            params![instance_id.to_string()],
        )
        .await?;
    let capacity_max = match capacity_rows.next().await? {
        Some(row) => row.get::<i64>(0)?,
        None => return Ok(false),
    };

    let mut live_rows = transaction
        .query(queries::COUNT_LIVE_FOR_INSTANCE, params![instance_id.to_string()])
        .await?;
    let live_count = match live_rows.next().await? {
        Some(row) => row.get::<i64>(0)?,
        None => 0,
    };

    Ok(live_count < capacity_max)
}

async fn seal_transaction<T>(
    transaction: Transaction,
    outcome: Result<T, DbError>,
) -> Result<T, DbError> {
    match outcome {
        Ok(value) => {
            transaction.commit().await.map_err(|fault| {
                debug!("❌ [ASSIGNMENTS]: Commit collapse: {}", fault);
                DbError::TransactionError
            })?;
            Ok(value)
        }
        Err(fault) => {
            let _ = transaction.rollback().await;
            Err(fault)
        }
    }
}

async fn collect_assignments(rows: &mut libsql::Rows) -> Result<Vec<StreamAssignment>, DbError> {
    let mut ledger_view = Vec::new();
    while let Some(row) = rows.next().await? {
        ledger_view.push(hydrate_assignment(&row)?);
    }
    Ok(ledger_view)
}

fn hydrate_assignment(row: &Row) -> Result<StreamAssignment, DbError> {
    let raw_status: String = row.get(3)?;
    let status = AssignmentStatus::parse(&raw_status)
        .ok_or_else(|| DbError::MappingError(format!("unknown assignment status '{raw_status}'")))?;

    let assigned_at_raw: String = row.get(4)?;
    let migration_started_raw: Option<String> = row.get(6)?;

    Ok(StreamAssignment {
        row_id: row.get(0)?,
        stream_id: row.get(1)?,
        instance_id: row.get(2)?,
        status,
        assigned_at: parse_utc(&assigned_at_raw)?,
        migration_target: row.get(5)?,
        migration_started_at: migration_started_raw.map(|raw| parse_utc(&raw)).transpose()?,
    })
}

fn parse_utc(raw_timestamp: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw_timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|fault| DbError::MappingError(format!("timestamp decode '{raw_timestamp}': {fault}")))
}

// [libs/infra/db/src/schema.rs]
/**
 * =================================================================
 * APARATO: CONTROL PLANE DATABASE SCHEMA (V12.0 - FLEET STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. SURROGATE OWNERSHIP: 'assignments' usa clave física subrogada para
 *    que el Auditor pueda representar (y reparar) filas duplicadas.
 * 2. READ-ONLY CATALOG: 'stream_catalog' es espejo externo; el plano de
 *    control jamás lo escribe fuera del seed de desarrollo.
 * 3. IDEMPOTENCIA: Gestión de errores para migraciones en caliente.
 * 4. PERFORMANCE: Índices de aceleración para el barrido de daemons.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 * Define las entidades base del plano de control Fingerswarm.
 */
const TACTICAL_TABLES: &[(&str, &str)] = &[
    ("TABLE_INSTANCES", r#"
        CREATE TABLE IF NOT EXISTS instances (
            id TEXT PRIMARY KEY,
            address TEXT,
            capacity_max INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'REGISTERED',
            last_heartbeat TEXT,
            registered_at TEXT NOT NULL,
            failure_count INTEGER NOT NULL DEFAULT 0,
            performance_score REAL NOT NULL DEFAULT 0.5,
            recovery_streak INTEGER NOT NULL DEFAULT 0,
            metadata_json TEXT
        );
    "#),
    ("TABLE_ASSIGNMENTS", r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stream_id INTEGER NOT NULL,
            instance_id TEXT,
            status TEXT NOT NULL DEFAULT 'ASSIGNED',
            assigned_at TEXT NOT NULL,
            migration_target TEXT,
            migration_started_at TEXT
        );
    "#),
    ("TABLE_REBALANCE_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS rebalance_events (
            id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            reason TEXT NOT NULL,
            plan_summary_json TEXT NOT NULL,
            outcome TEXT NOT NULL DEFAULT 'IN_PROGRESS'
        );
    "#),
    ("TABLE_STREAM_CATALOG", r#"
        CREATE TABLE IF NOT EXISTS stream_catalog (
            stream_id INTEGER PRIMARY KEY,
            display_name TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            refreshed_at TEXT
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 * Asegura que despliegues previos del Ledger adquieran las columnas nuevas.
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    ("INSTANCE_RECOVERY_STREAK", "ALTER TABLE instances ADD COLUMN recovery_streak INTEGER NOT NULL DEFAULT 0"),
    ("INSTANCE_METADATA", "ALTER TABLE instances ADD COLUMN metadata_json TEXT"),
    ("ASSIGNMENT_MIGRATION_CLOCK", "ALTER TABLE assignments ADD COLUMN migration_started_at TEXT"),
    ("CATALOG_REFRESH_MARK", "ALTER TABLE stream_catalog ADD COLUMN refreshed_at TEXT"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices de Aceleración)
 * Optimiza los barridos periódicos del sentinel, el auditor y el conductor.
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_ASSIGNMENTS_OWNER", "CREATE INDEX IF NOT EXISTS idx_assignments_owner ON assignments(instance_id, status);"),
    ("IDX_ASSIGNMENTS_STREAM", "CREATE INDEX IF NOT EXISTS idx_assignments_stream ON assignments(stream_id, status);"),
    ("IDX_INSTANCES_STATUS", "CREATE INDEX IF NOT EXISTS idx_instances_status ON instances(status);"),
    ("IDX_REBALANCE_STARTED", "CREATE INDEX IF NOT EXISTS idx_rebalance_started ON rebalance_events(started_at);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema estructural.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse, indicando
 * un colapso en el enlace con el Motor A.
 */
#[instrument(skip(database_connection))]
pub async fn apply_control_plane_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V12.0...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Control Plane Ledger V12.0 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in TACTICAL_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {identifier}"))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(*sql, ()).await {
            Ok(_) => debug!("  🟢 [REPAIR_OK]: Applied evolutionary stratum {}", identifier),
            Err(fault) => {
                let message = fault.to_string();
                if message.contains("duplicate column name") {
                    debug!("  ⚪ [REPAIR_SKIP]: {} already level.", identifier);
                } else {
                    warn!("  ⚠️ [REPAIR_BYPASS]: {} check incomplete: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_HARDENING_FAULT: {identifier}"))?;
    }
    Ok(())
}

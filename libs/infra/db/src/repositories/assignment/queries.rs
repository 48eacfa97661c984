// [libs/infra/db/src/repositories/assignment/queries.rs]
/*!
 * =================================================================
 * APARATO: ASSIGNMENT LEDGER SQL STORE (V11.0 - OWNERSHIP GUARDS)
 * CLASIFICACIÓN: INFRASTRUCTURE SQL (ESTRATO L3)
 * RESPONSABILIDAD: SENTENCIAS ATÓMICAS DE PROPIEDAD DE STREAMS
 *
 * # Mathematical Proof (Guarded Mutations):
 * Toda mutación de fila lleva guardias WHERE sobre estado y propietario:
 * dos actores concurrentes no pueden aplicar la misma transición dos
 * veces, y la fila de un stream solo muta bajo su secuencia serial.
 * =================================================================
 */

/// Proyección canónica de la fila de asignación (orden estable).
pub const ASSIGNMENT_PROJECTION: &str = r#"
    SELECT id, stream_id, instance_id, status, assigned_at,
           migration_target, migration_started_at
    FROM assignments
"#;

/// Fila viva (ASSIGNED | MIGRATING) de un stream, si existe.
pub const FIND_LIVE_ROW_FOR_STREAM: &str = r#"
    SELECT id, stream_id, instance_id, status, assigned_at,
           migration_target, migration_started_at
    FROM assignments
    WHERE stream_id = ?1 AND status IN ('ASSIGNED', 'MIGRATING')
    ORDER BY id ASC
    LIMIT 1
"#;

/// Génesis de propiedad plena de un stream.
pub const INSERT_ASSIGNMENT: &str = r#"
    INSERT INTO assignments (stream_id, instance_id, status, assigned_at)
    VALUES (?1, ?2, 'ASSIGNED', ?3)
"#;

/// Conteo de propiedad viva de un nodo (invariante de capacidad).
pub const COUNT_LIVE_FOR_INSTANCE: &str = r#"
    SELECT COUNT(*)
    FROM assignments
    WHERE instance_id = ?1 AND status IN ('ASSIGNED', 'MIGRATING')
"#;

/// Liberación de una fila viva concreta (por clave física).
pub const RELEASE_ROW_BY_ID: &str = r#"
    UPDATE assignments
    SET status = 'RELEASED',
        migration_target = NULL,
        migration_started_at = NULL
    WHERE id = ?1 AND status IN ('ASSIGNED', 'MIGRATING')
"#;

/// Fase 1 del traspaso: marca MIGRATING con guardia de propietario.
pub const BEGIN_MIGRATION_ROW: &str = r#"
    UPDATE assignments
    SET status = 'MIGRATING',
        migration_target = ?3,
        migration_started_at = ?4
    WHERE id = ?1 AND instance_id = ?2 AND status = 'ASSIGNED'
"#;

/// Fase 2 del traspaso: compromete la propiedad al destino.
pub const COMMIT_MIGRATION_ROW: &str = r#"
    UPDATE assignments
    SET instance_id = migration_target,
        status = 'ASSIGNED',
        assigned_at = ?2,
        migration_target = NULL,
        migration_started_at = NULL
    WHERE id = ?1 AND status = 'MIGRATING' AND migration_target IS NOT NULL
"#;

/// Reversión del traspaso: la propiedad regresa al origen intacta.
pub const REVERT_MIGRATION_ROW: &str = r#"
    UPDATE assignments
    SET status = 'ASSIGNED',
        migration_target = NULL,
        migration_started_at = NULL
    WHERE id = ?1 AND status = 'MIGRATING'
"#;

/// Propiedad viva completa, en orden serial de stream.
pub const LIST_LIVE: &str = r#"
    SELECT id, stream_id, instance_id, status, assigned_at,
           migration_target, migration_started_at
    FROM assignments
    WHERE status IN ('ASSIGNED', 'MIGRATING')
    ORDER BY stream_id ASC, id ASC
"#;

/// Propiedad viva de un nodo concreto.
pub const LIST_BY_INSTANCE: &str = r#"
    SELECT id, stream_id, instance_id, status, assigned_at,
           migration_target, migration_started_at
    FROM assignments
    WHERE instance_id = ?1 AND status IN ('ASSIGNED', 'MIGRATING')
    ORDER BY stream_id ASC, id ASC
"#;

/// Filas vivas que referencian nodos inexistentes o REMOVED.
pub const LIST_ORPHANS: &str = r#"
    SELECT a.id, a.stream_id, a.instance_id, a.status, a.assigned_at,
           a.migration_target, a.migration_started_at
    FROM assignments a
    LEFT JOIN instances i ON a.instance_id = i.id
    WHERE a.status IN ('ASSIGNED', 'MIGRATING')
      AND (i.id IS NULL OR i.status = 'REMOVED')
    ORDER BY a.stream_id ASC, a.id ASC
"#;

/// Filas vivas de streams con más de un propietario simultáneo.
pub const LIST_DUPLICATES: &str = r#"
    SELECT id, stream_id, instance_id, status, assigned_at,
           migration_target, migration_started_at
    FROM assignments
    WHERE status IN ('ASSIGNED', 'MIGRATING')
      AND stream_id IN (
          SELECT stream_id FROM assignments
          WHERE status IN ('ASSIGNED', 'MIGRATING')
          GROUP BY stream_id
          HAVING COUNT(*) > 1
      )
    ORDER BY stream_id ASC, id ASC
"#;

/// Migraciones cuya fase 1 superó el presupuesto de traspaso.
pub const LIST_STUCK_MIGRATIONS: &str = r#"
    SELECT id, stream_id, instance_id, status, assigned_at,
           migration_target, migration_started_at
    FROM assignments
    WHERE status = 'MIGRATING' AND migration_started_at < ?1
    ORDER BY stream_id ASC, id ASC
"#;

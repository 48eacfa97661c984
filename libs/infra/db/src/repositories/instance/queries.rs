// [libs/infra/db/src/repositories/instance/queries.rs]
/*!
 * =================================================================
 * APARATO: FLEET REGISTRY SQL STORE (V9.0 - VITALITY LEDGER)
 * CLASIFICACIÓN: INFRASTRUCTURE SQL (ESTRATO L3)
 * RESPONSABILIDAD: SENTENCIAS ATÓMICAS DEL DIRECTORIO DE NODOS
 *
 * # Mathematical Proof (Monotonic Transitions):
 * Las mutaciones de estado llevan guardias WHERE sobre el estado previo,
 * de modo que dos barridos concurrentes no puedan aplicar la misma
 * transición dos veces ni retroceder la secuencia.
 * =================================================================
 */

/// Proyección canónica de la entidad Instance (orden de columnas estable).
pub const INSTANCE_PROJECTION: &str = r#"
    SELECT id, address, capacity_max, status, last_heartbeat, registered_at,
           failure_count, performance_score, recovery_streak, metadata_json
    FROM instances
"#;

/// Alta génesis de un nodo desconocido.
pub const INSERT_INSTANCE: &str = r#"
    INSERT INTO instances (
        id, address, capacity_max, status, registered_at,
        failure_count, performance_score, recovery_streak, metadata_json
    ) VALUES (?1, ?2, ?3, 'REGISTERED', ?4, 0, 0.5, 0, ?5)
"#;

/// Re-enganche de un id conocido: preserva registered_at, resetea contadores.
pub const REATTACH_INSTANCE: &str = r#"
    UPDATE instances
    SET address = ?2,
        capacity_max = ?3,
        metadata_json = ?4,
        status = 'REGISTERED',
        failure_count = 0,
        recovery_streak = 0
    WHERE id = ?1
"#;

/// Sellado de un latido aceptado (estado y biometría recalculados fuera).
pub const SEAL_HEARTBEAT: &str = r#"
    UPDATE instances
    SET last_heartbeat = ?2,
        status = ?3,
        performance_score = ?4,
        recovery_streak = ?5,
        failure_count = ?6
    WHERE id = ?1
"#;

/// Transición a INACTIVE con guardia de estado (idempotente).
pub const MARK_INACTIVE: &str = r#"
    UPDATE instances
    SET status = 'INACTIVE',
        failure_count = failure_count + 1
    WHERE id = ?1 AND status NOT IN ('INACTIVE', 'REMOVED')
"#;

/// Retiro definitivo del nodo (operador o expiración del plazo).
pub const MARK_REMOVED: &str = r#"
    UPDATE instances
    SET status = 'REMOVED'
    WHERE id = ?1 AND status != 'REMOVED'
"#;

/// Transición de silencio aplicada por el barrido del sentinel.
pub const APPLY_SILENCE_TRANSITION: &str = r#"
    UPDATE instances
    SET status = ?2,
        failure_count = failure_count + ?3
    WHERE id = ?1 AND status = ?4
"#;

// [apps/orchestrator/src/config.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR CONFIGURATION (V10.0 - ENUMERATED KEYS)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA ÚNICA DEL ENTORNO EN UN CONTRATO TIPADO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE CAPTURE: El entorno se lee una sola vez en la ignición;
 *    el resto del proceso consume esta estructura inmutable.
 * 2. TOTAL OVERRIDE: Cada clave operativa acepta sobre-escritura por
 *    variable 'FS_*'; los defaults son los del contrato operativo.
 * 3. SECRET HYGIENE: El volcado de diagnóstico elide tokens.
 * =================================================================
 */

use std::time::Duration;

use fingerswarm_domain_balancer::BalancerThresholds;
use fingerswarm_infra_db::{BreakerPolicy, GatekeeperPolicy};
use tracing::info;

/// Contrato tipado de configuración del plano de control.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    // --- RED Y PERSISTENCIA ---
    pub listening_port: u16,
    pub database_connection_url: String,
    pub database_access_token: Option<String>,
    pub worker_auth_token: String,
    pub operator_auth_token: String,

    // --- PROTOCOLO DE LATIDOS Y MÁQUINA DE ESTADOS ---
    pub heartbeat_interval_s: u64,
    pub warn_threshold_s: i64,
    pub inactive_threshold_s: i64,
    pub removal_timeout_s: i64,
    pub emergency_threshold_s: i64,
    pub redistribution_deadline_s: i64,
    pub recovery_confirmation_beats: u32,

    // --- BALANCEO ---
    pub imbalance_threshold: f64,
    pub max_stream_difference: u32,
    pub migration_batch: usize,
    pub migration_step_ms: u64,
    pub migration_timeout_s: i64,
    pub rebalance_cooldown_s: u64,

    // --- GATEKEEPER ---
    pub pool_capacity: usize,
    pub pool_wait_s: u64,
    pub txn_max_duration_s: u64,
    pub max_retries: u32,
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_timeout_s: u64,
    pub breaker_success_threshold: u32,

    // --- CADENCIAS DE DAEMONS ---
    pub heartbeat_scan_interval_s: u64,
    pub consistency_scan_interval_s: u64,
    pub balancer_tick_interval_s: u64,
    pub catalog_refresh_s: u64,
    pub reaper_interval_s: u64,

    // --- SUPERFICIE HTTP ---
    pub request_timeout_s: u64,
    pub idempotency_ttl_s: u64,
}

impl OrchestratorConfig {
    /// Captura el entorno del proceso con los defaults del contrato.
    ///
    /// # Panics:
    /// Aborta la ignición si DATABASE_URL está ausente: sin Motor A no
    /// existe plano de control.
    #[must_use]
    pub fn from_environment() -> Self {
        let configuration = Self {
            listening_port: env_parsed("PORT", 3000),
            database_connection_url: std::env::var("DATABASE_URL")
                .expect("CRITICAL_FAULT: DATABASE_URL not defined in runtime environment."),
            database_access_token: std::env::var("TURSO_AUTH_TOKEN").ok(),
            worker_auth_token: std::env::var("WORKER_AUTH_TOKEN").unwrap_or_default(),
            operator_auth_token: std::env::var("OPERATOR_AUTH_TOKEN").unwrap_or_default(),

            heartbeat_interval_s: env_parsed("FS_HEARTBEAT_INTERVAL_S", 30),
            warn_threshold_s: env_parsed("FS_WARN_THRESHOLD_S", 90),
            inactive_threshold_s: env_parsed("FS_INACTIVE_THRESHOLD_S", 180),
            removal_timeout_s: env_parsed("FS_REMOVAL_TIMEOUT_S", 86_400),
            emergency_threshold_s: env_parsed("FS_EMERGENCY_THRESHOLD_S", 600),
            redistribution_deadline_s: env_parsed("FS_REDISTRIBUTION_DEADLINE_S", 60),
            recovery_confirmation_beats: env_parsed("FS_RECOVERY_CONFIRMATION_BEATS", 2),

            imbalance_threshold: env_parsed("FS_IMBALANCE_THRESHOLD", 0.15),
            max_stream_difference: env_parsed("FS_MAX_STREAM_DIFFERENCE", 3),
            migration_batch: env_parsed("FS_MIGRATION_BATCH", 50),
            migration_step_ms: env_parsed("FS_MIGRATION_STEP_MS", 500),
            migration_timeout_s: env_parsed("FS_MIGRATION_TIMEOUT_S", 30),
            rebalance_cooldown_s: env_parsed("FS_REBALANCE_COOLDOWN_S", 300),

            pool_capacity: env_parsed("FS_POOL_CAPACITY", 10),
            pool_wait_s: env_parsed("FS_POOL_WAIT_S", 5),
            txn_max_duration_s: env_parsed("FS_TXN_MAX_DURATION_S", 30),
            max_retries: env_parsed("FS_MAX_RETRIES", 3),
            breaker_failure_threshold: env_parsed("FS_BREAKER_FAILURE_THRESHOLD", 5),
            breaker_recovery_timeout_s: env_parsed("FS_BREAKER_RECOVERY_TIMEOUT_S", 60),
            breaker_success_threshold: env_parsed("FS_BREAKER_SUCCESS_THRESHOLD", 3),

            heartbeat_scan_interval_s: env_parsed("FS_HEARTBEAT_SCAN_INTERVAL_S", 30),
            consistency_scan_interval_s: env_parsed("FS_CONSISTENCY_SCAN_INTERVAL_S", 120),
            balancer_tick_interval_s: env_parsed("FS_BALANCER_TICK_INTERVAL_S", 60),
            catalog_refresh_s: env_parsed("FS_CATALOG_REFRESH_S", 300),
            reaper_interval_s: env_parsed("FS_REAPER_INTERVAL_S", 10),

            request_timeout_s: env_parsed("FS_REQUEST_TIMEOUT_S", 15),
            idempotency_ttl_s: env_parsed("FS_IDEMPOTENCY_TTL_S", 300),
        };

        info!(
            "🧾 [CONFIG]: Effective contract loaded. port={} pool={} breaker={}::{}s::{} heartbeat_scan={}s",
            configuration.listening_port,
            configuration.pool_capacity,
            configuration.breaker_failure_threshold,
            configuration.breaker_recovery_timeout_s,
            configuration.breaker_success_threshold,
            configuration.heartbeat_scan_interval_s
        );

        configuration
    }

    /// Presupuestos del Gatekeeper derivados del contrato.
    #[must_use]
    pub fn gatekeeper_policy(&self) -> GatekeeperPolicy {
        GatekeeperPolicy {
            pool_capacity: self.pool_capacity,
            pool_wait: Duration::from_secs(self.pool_wait_s),
            statement_budget: Duration::from_secs(self.txn_max_duration_s),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(2),
            breaker: BreakerPolicy {
                failure_threshold: self.breaker_failure_threshold,
                recovery_timeout: Duration::from_secs(self.breaker_recovery_timeout_s),
                success_threshold: self.breaker_success_threshold,
            },
        }
    }

    /// Umbrales del balanceador derivados del contrato.
    #[must_use]
    pub fn balancer_thresholds(&self) -> BalancerThresholds {
        BalancerThresholds {
            imbalance_threshold: self.imbalance_threshold,
            max_stream_difference: self.max_stream_difference,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default_value: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw_value| raw_value.parse().ok())
        .unwrap_or(default_value)
}

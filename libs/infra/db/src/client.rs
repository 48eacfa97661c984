// [libs/infra/db/src/client.rs]
/*!
 * =================================================================
 * APARATO: DATABASE GATEKEEPER CLIENT (V14.0 - SINGLE CHOKEPOINT)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ÚNICO PUNTO DE PASO HACIA EL MOTOR A (libSQL)
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. BOUNDED POOL: Semáforo de conexiones con espera acotada; la
 *    saturación produce fallo rápido, jamás bloqueo indefinido.
 * 2. RETRY SOVEREIGNTY: Este es el único estrato que reintenta fallos
 *    transitorios; por encima, los errores se clasifican y se propagan.
 * 3. STATEMENT BUDGET: Toda operación corre bajo presupuesto duro de
 *    tiempo; el ledger de vuelo permite al Reaper auditar rezagados.
 * 4. MEMORY ANCHOR: En modo RAM, el ancla de persistencia se abre antes
 *    del bootstrap para que el esquema resida en memoria compartida.
 *
 * # Mathematical Proof (Deadlock Economics):
 * Ante contención del motor ('database is locked'), el primer reintento
 * es inmediato y los siguientes aplican backoff exponencial con jitter,
 * acotando el coste total a MAX_RETRIES ventanas de espera.
 * =================================================================
 */

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use libsql::{Builder, Connection, Database};
use rand::Rng;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::breaker::{BreakerPolicy, BreakerSnapshot, CircuitBreaker};
use crate::errors::DbError;
use crate::schema::apply_control_plane_schema;

/// Futuro empaquetado devuelto por las operaciones de repositorio.
pub type GatekeeperFuture<T> = Pin<Box<dyn Future<Output = Result<T, DbError>> + Send>>;

/// Presupuestos operativos del Gatekeeper (config §6, sobre-escribibles).
#[derive(Debug, Clone, Copy)]
pub struct GatekeeperPolicy {
    /// Conexiones concurrentes máximas contra el Motor A.
    pub pool_capacity: usize,
    /// Espera máxima por una conexión antes del fallo rápido.
    pub pool_wait: Duration,
    /// Presupuesto duro por sentencia/transacción.
    pub statement_budget: Duration,
    /// Reintentos máximos sobre la clase transitoria (solo escrituras).
    pub max_retries: u32,
    /// Base del backoff exponencial.
    pub backoff_base: Duration,
    /// Techo del backoff exponencial.
    pub backoff_cap: Duration,
    /// Umbrales del circuit breaker.
    pub breaker: BreakerPolicy,
}

impl Default for GatekeeperPolicy {
    fn default() -> Self {
        Self {
            pool_capacity: 10,
            pool_wait: Duration::from_secs(5),
            statement_budget: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(2),
            breaker: BreakerPolicy::default(),
        }
    }
}

/// Entrada del ledger de operaciones en vuelo (auditable por el Reaper).
#[derive(Debug, Clone)]
struct InFlightOperation {
    label: &'static str,
    started_at: Instant,
}

/// Operación que superó el presupuesto de sentencia sin concluir.
#[derive(Debug, Clone, Serialize)]
pub struct OverdueOperation {
    pub label: &'static str,
    pub elapsed_ms: u64,
}

/// Radiografía del Gatekeeper para el endpoint de salud.
#[derive(Debug, Clone, Serialize)]
pub struct GatekeeperHealth {
    pub pool_capacity: usize,
    pub pool_available: usize,
    pub in_flight_operations: usize,
    pub breaker: BreakerSnapshot,
}

/// Cliente táctico único hacia libSQL. Clonable y compartible entre daemons.
#[derive(Clone)]
pub struct GatekeeperClient {
    internal_database_driver: Arc<Database>,
    pool_permits: Arc<tokio::sync::Semaphore>,
    circuit_breaker: Arc<CircuitBreaker>,
    policy: GatekeeperPolicy,
    in_flight_ledger: Arc<Mutex<HashMap<u64, InFlightOperation>>>,
    operation_sequence: Arc<AtomicU64>,
    /// Mantiene la base viva en modo RAM evitando que SQLite la purgue.
    _memory_persistence_anchor: Option<Arc<Connection>>,
}

impl GatekeeperClient {
    /// Establece el enlace táctico y cristaliza el esquema del plano de control.
    ///
    /// # Errors:
    /// - `DbError::ConnectionError`: URL vacía, token ausente en modo remoto,
    ///   o colapso del driver durante la ignición.
    #[instrument(skip(database_access_token, policy))]
    pub async fn connect(
        database_connection_url: &str,
        database_access_token: Option<String>,
        policy: GatekeeperPolicy,
    ) -> Result<Self, DbError> {
        if database_connection_url.is_empty() {
            return Err(DbError::ConnectionError("CRITICAL_FAULT: DATABASE_URL_UNDEFINED".into()));
        }

        info!("🔌 [GATEKEEPER]: Initiating tactical link synchronization to [{}]", database_connection_url);

        let is_remote = database_connection_url.starts_with("libsql://")
            || database_connection_url.starts_with("https://");
        let is_memory = database_connection_url.contains(":memory:")
            || database_connection_url.contains("mode=memory");

        let database_driver = if is_remote {
            let token = database_access_token.ok_or_else(|| {
                DbError::ConnectionError("SECURITY_FAULT: Remote access denied (Token missing)".into())
            })?;
            Builder::new_remote(database_connection_url.to_string(), token).build().await
        } else {
            Builder::new_local(database_connection_url).build().await
        }
        .map_err(|fault| DbError::ConnectionError(format!("DRIVER_IGNITION_FAILURE: {fault}")))?;

        let shared_driver = Arc::new(database_driver);
        let mut memory_anchor = None;

        if is_memory {
            // En modo memoria el ancla se abre ANTES de cualquier otra operación.
            let anchor_connection = shared_driver
                .connect()
                .map_err(|fault| DbError::ConnectionError(format!("ANCHOR_FAULT: {fault}")))?;

            apply_control_plane_schema(&anchor_connection)
                .await
                .map_err(|fault| DbError::ConnectionError(format!("SCHEMA_SYNC_FAULT: {fault}")))?;

            memory_anchor = Some(Arc::new(anchor_connection));
            info!("⚓ [GATEKEEPER]: Memory strata solidified and anchored.");
        } else {
            let bootstrap_connection = shared_driver
                .connect()
                .map_err(|fault| DbError::ConnectionError(format!("BOOTSTRAP_LINK_FAULT: {fault}")))?;
            apply_control_plane_schema(&bootstrap_connection)
                .await
                .map_err(|fault| DbError::ConnectionError(format!("SCHEMA_SYNC_FAULT: {fault}")))?;
        }

        Ok(Self {
            internal_database_driver: shared_driver,
            pool_permits: Arc::new(tokio::sync::Semaphore::new(policy.pool_capacity)),
            circuit_breaker: Arc::new(CircuitBreaker::new(policy.breaker)),
            policy,
            in_flight_ledger: Arc::new(Mutex::new(HashMap::new())),
            operation_sequence: Arc::new(AtomicU64::new(0)),
            _memory_persistence_anchor: memory_anchor,
        })
    }

    /// Conexión cruda sin pool ni breaker. Reservada para bootstrap,
    /// herramientas de seed y suites de certificación que inyectan defectos.
    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.internal_database_driver.connect().map_err(|fault| {
            error!("⚠️ [POOL_FAULT]: Raw connection allocation failed: {}", fault);
            DbError::ConnectionError(fault.to_string())
        })
    }

    /// Ejecuta una operación de lectura bajo pool, breaker y presupuesto.
    /// Las lecturas no se reintentan: el llamador decide si insiste.
    pub async fn run_read<T, F>(&self, label: &'static str, operation: F) -> Result<T, DbError>
    where
        T: Send,
        F: Fn(Connection) -> GatekeeperFuture<T> + Send + Sync,
    {
        self.execute_admitted(label, &operation).await
    }

    /// Ejecuta una escritura bajo pool, breaker y presupuesto, reintentando
    /// la clase transitoria con backoff exponencial y jitter.
    ///
    /// # Errors:
    /// - `DbError::BreakerOpen` / `DbError::PoolExhausted`: fallo rápido,
    ///   jamás reintentado aquí.
    /// - Clase transitoria agotada tras `max_retries` ventanas de backoff.
    pub async fn run_write<T, F>(&self, label: &'static str, operation: F) -> Result<T, DbError>
    where
        T: Send,
        F: Fn(Connection) -> GatekeeperFuture<T> + Send + Sync,
    {
        let mut attempt: u32 = 0;
        let mut immediate_contention_retry_spent = false;

        loop {
            match self.execute_admitted(label, &operation).await {
                Ok(value) => return Ok(value),
                Err(fault) => {
                    if matches!(fault, DbError::PoolExhausted(_) | DbError::BreakerOpen { .. }) {
                        return Err(fault);
                    }
                    if !fault.is_transient() {
                        return Err(fault);
                    }

                    // Contención del motor: un único reintento inmediato.
                    if fault.is_deadlock_class() && !immediate_contention_retry_spent {
                        immediate_contention_retry_spent = true;
                        warn!("🔁 [GATEKEEPER]: Engine contention on '{}'. Immediate retry.", label);
                        continue;
                    }

                    if attempt >= self.policy.max_retries {
                        error!(
                            "❌ [GATEKEEPER]: Transient fault on '{}' exhausted {} retries: {}",
                            label, self.policy.max_retries, fault
                        );
                        return Err(fault);
                    }

                    attempt += 1;
                    let backoff_window = self.jittered_backoff_delay(attempt);
                    warn!(
                        "🔁 [GATEKEEPER]: Transient fault on '{}' (attempt {}). Backing off {} ms.",
                        label,
                        attempt,
                        backoff_window.as_millis()
                    );
                    tokio::time::sleep(backoff_window).await;
                }
            }
        }
    }

    /// Radiografía del pool, el ledger de vuelo y el breaker.
    #[must_use]
    pub fn health(&self) -> GatekeeperHealth {
        GatekeeperHealth {
            pool_capacity: self.policy.pool_capacity,
            pool_available: self.pool_permits.available_permits(),
            in_flight_operations: self.in_flight_ledger.lock().expect("ledger lock poisoned").len(),
            breaker: self.circuit_breaker.snapshot(),
        }
    }

    /// Operaciones en vuelo que superaron el presupuesto de sentencia.
    /// El aborto efectivo lo ejecuta el timeout inline; el Reaper audita
    /// y deja rastro de los rezagados que el budget no logró cortar.
    #[must_use]
    pub fn overdue_operations(&self) -> Vec<OverdueOperation> {
        let ledger = self.in_flight_ledger.lock().expect("ledger lock poisoned");
        ledger
            .values()
            .filter(|operation| operation.started_at.elapsed() > self.policy.statement_budget)
            .map(|operation| OverdueOperation {
                label: operation.label,
                elapsed_ms: operation.started_at.elapsed().as_millis() as u64,
            })
            .collect()
    }

    /// Acceso al breaker para diagnósticos del estrato superior.
    #[must_use]
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.circuit_breaker.snapshot()
    }

    // --- NÚCLEO DE ADMISIÓN ---

    async fn execute_admitted<T, F>(&self, label: &'static str, operation: &F) -> Result<T, DbError>
    where
        T: Send,
        F: Fn(Connection) -> GatekeeperFuture<T> + Send + Sync,
    {
        // 1. CORTOCIRCUITO: sin tocar pool ni motor si el breaker veta.
        self.circuit_breaker.preflight()?;

        // 2. POOL ACOTADO: espera máxima POOL_WAIT, luego fallo rápido.
        let pool_permit = match tokio::time::timeout(
            self.policy.pool_wait,
            Arc::clone(&self.pool_permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                self.circuit_breaker.abandon_probe();
                return Err(DbError::ConnectionError("POOL_FAULT: semaphore closed".into()));
            }
            Err(_) => {
                // Saturación local: no castiga al breaker, el Motor A no falló.
                self.circuit_breaker.abandon_probe();
                warn!("🧱 [GATEKEEPER]: Pool saturated for '{}'. Failing fast.", label);
                return Err(DbError::PoolExhausted(self.policy.pool_wait.as_millis() as u64));
            }
        };

        let connection = match self.internal_database_driver.connect() {
            Ok(connection) => connection,
            Err(fault) => {
                let detail = fault.to_string();
                self.circuit_breaker.record_failure(&detail);
                drop(pool_permit);
                return Err(DbError::ConnectionError(detail));
            }
        };

        // 3. LEDGER DE VUELO: visible para el Reaper mientras la operación corre.
        let operation_ticket = self.operation_sequence.fetch_add(1, Ordering::Relaxed);
        self.in_flight_ledger
            .lock()
            .expect("ledger lock poisoned")
            .insert(operation_ticket, InFlightOperation { label, started_at: Instant::now() });

        // 4. PRESUPUESTO DURO: la sentencia muere al agotar el budget.
        let admitted_outcome =
            tokio::time::timeout(self.policy.statement_budget, operation(connection)).await;

        self.in_flight_ledger
            .lock()
            .expect("ledger lock poisoned")
            .remove(&operation_ticket);
        drop(pool_permit);

        let operation_result = match admitted_outcome {
            Ok(inner_result) => inner_result,
            Err(_elapsed) => {
                Err(DbError::StatementTimeout(self.policy.statement_budget.as_millis() as u64))
            }
        };

        // 5. VEREDICTO HACIA EL BREAKER: solo los fallos de infraestructura
        // castigan; los desenlaces de dominio prueban que el motor responde.
        match &operation_result {
            Ok(_) => self.circuit_breaker.record_success(),
            Err(fault) if Self::harms_backend(fault) => {
                self.circuit_breaker.record_failure(&fault.to_string());
            }
            Err(_) => self.circuit_breaker.record_success(),
        }

        operation_result
    }

    /// Fallos que evidencian enfermedad del Motor A (alimentan el breaker).
    fn harms_backend(fault: &DbError) -> bool {
        matches!(
            fault,
            DbError::ConnectionError(_)
                | DbError::QueryError(_)
                | DbError::StatementTimeout(_)
                | DbError::TransactionError
        )
    }

    fn jittered_backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential_ms = self
            .policy
            .backoff_base
            .as_millis()
            .saturating_mul(1u128 << exponent)
            .min(self.policy.backoff_cap.as_millis()) as u64;
        let jitter_factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_millis(((exponential_ms as f64) * jitter_factor) as u64)
    }
}

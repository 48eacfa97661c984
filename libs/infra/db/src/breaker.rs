// [libs/infra/db/src/breaker.rs]
/*!
 * =================================================================
 * APARATO: CIRCUIT BREAKER (V7.3 - TRIPLE STATE)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CORTOCIRCUITO DEL MOTOR A BAJO DEGRADACIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE PROBE: HALF_OPEN admite exactamente una sonda en vuelo;
 *    el resto de llamadas falla rápido con Retry-After.
 * 2. LOCK DISCIPLINE: Sección crítica corta; jamás se retiene el cerrojo
 *    a través de una llamada de I/O.
 * 3. SNAPSHOT READS: Las lecturas de salud son copias, no handles.
 *
 * # Mathematical Proof (Fail-Fast Bound):
 * Con el breaker en OPEN, el coste de una llamada es O(1) en RAM: ninguna
 * conexión se adquiere y el Motor A no recibe tráfico hasta agotar el
 * periodo de recuperación.
 * =================================================================
 */

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::DbError;

/// Estados canónicos del breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Umbrales de transición (config §6, sobre-escribibles).
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    /// Fallos consecutivos que fuerzan CLOSED -> OPEN.
    pub failure_threshold: u32,
    /// Periodo de cuarentena antes de OPEN -> HALF_OPEN.
    pub recovery_timeout: Duration,
    /// Sondas exitosas consecutivas para HALF_OPEN -> CLOSED.
    pub success_threshold: u32,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// Copia inmutable del estado para el endpoint de salud.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub last_failure_detail: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerCore {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    probe_in_flight: bool,
    opened_at: Option<Instant>,
    last_failure_detail: Option<String>,
    last_failure_at: Option<DateTime<Utc>>,
}

/// Breaker por proceso, compartido por todas las operaciones del Gatekeeper.
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            core: Mutex::new(BreakerCore {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                probe_in_flight: false,
                opened_at: None,
                last_failure_detail: None,
                last_failure_at: None,
            }),
        }
    }

    /// Verificación previa a tocar el Motor A.
    ///
    /// # Errors:
    /// - `DbError::BreakerOpen`: cortocircuito activo (OPEN en cuarentena,
    ///   o HALF_OPEN con la sonda única ya en vuelo).
    pub fn preflight(&self) -> Result<(), DbError> {
        let mut core = self.core.lock().expect("breaker lock poisoned");

        match core.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed_since_opening = core
                    .opened_at
                    .map(|opened_at| opened_at.elapsed())
                    .unwrap_or(Duration::ZERO);

                if elapsed_since_opening >= self.policy.recovery_timeout {
                    // OPEN -> HALF_OPEN: esta llamada se convierte en la sonda.
                    core.state = BreakerState::HalfOpen;
                    core.half_open_successes = 0;
                    core.probe_in_flight = true;
                    Ok(())
                } else {
                    let remaining = self.policy.recovery_timeout - elapsed_since_opening;
                    Err(DbError::BreakerOpen { retry_after_s: remaining.as_secs().max(1) })
                }
            }
            BreakerState::HalfOpen => {
                if core.probe_in_flight {
                    Err(DbError::BreakerOpen { retry_after_s: 1 })
                } else {
                    core.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Registra el desenlace exitoso de una operación admitida.
    pub fn record_success(&self) {
        let mut core = self.core.lock().expect("breaker lock poisoned");

        match core.state {
            BreakerState::Closed => {
                core.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                core.probe_in_flight = false;
                core.half_open_successes += 1;
                if core.half_open_successes >= self.policy.success_threshold {
                    core.state = BreakerState::Closed;
                    core.consecutive_failures = 0;
                    core.half_open_successes = 0;
                    core.opened_at = None;
                }
            }
            BreakerState::Open => {
                // Desenlace tardío de una operación previa a la apertura.
            }
        }
    }

    /// Registra un fallo de operación admitida.
    pub fn record_failure(&self, failure_detail: &str) {
        let mut core = self.core.lock().expect("breaker lock poisoned");
        core.last_failure_detail = Some(failure_detail.to_string());
        core.last_failure_at = Some(Utc::now());

        match core.state {
            BreakerState::Closed => {
                core.consecutive_failures += 1;
                if core.consecutive_failures >= self.policy.failure_threshold {
                    core.state = BreakerState::Open;
                    core.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                // Cualquier fallo de sonda reabre el circuito.
                core.probe_in_flight = false;
                core.half_open_successes = 0;
                core.state = BreakerState::Open;
                core.opened_at = Some(Instant::now());
            }
            BreakerState::Open => {}
        }
    }

    /// Libera la sonda única cuando la operación admitida no llegó a tocar
    /// el Motor A (p. ej. saturación del pool local).
    pub fn abandon_probe(&self) {
        let mut core = self.core.lock().expect("breaker lock poisoned");
        if core.state == BreakerState::HalfOpen {
            core.probe_in_flight = false;
        }
    }

    /// Copia del estado para diagnóstico; lectura sin retención de cerrojo.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.core.lock().expect("breaker lock poisoned");
        BreakerSnapshot {
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            last_failure_detail: core.last_failure_detail.clone(),
            last_failure_at: core.last_failure_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(40),
            success_threshold: 2,
        }
    }

    #[test]
    fn certify_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(fast_policy());

        for _ in 0..3 {
            breaker.preflight().expect("closed breaker admits traffic");
            breaker.record_failure("DATABASE_UPLINK_SEVERED");
        }

        assert_eq!(breaker.snapshot().state, BreakerState::Open);
        assert!(matches!(breaker.preflight(), Err(DbError::BreakerOpen { .. })));
    }

    #[test]
    fn certify_success_interruption_resets_failure_streak() {
        let breaker = CircuitBreaker::new(fast_policy());

        breaker.preflight().expect("admitted");
        breaker.record_failure("fault-1");
        breaker.preflight().expect("admitted");
        breaker.record_failure("fault-2");
        breaker.preflight().expect("admitted");
        breaker.record_success();
        breaker.preflight().expect("admitted");
        breaker.record_failure("fault-3");

        assert_eq!(breaker.snapshot().state, BreakerState::Closed);
    }

    #[test]
    fn certify_half_open_single_probe_and_recovery() {
        let breaker = CircuitBreaker::new(fast_policy());
        for _ in 0..3 {
            breaker.preflight().expect("admitted");
            breaker.record_failure("collapse");
        }

        std::thread::sleep(Duration::from_millis(60));

        // Primera llamada post-cuarentena: sonda única admitida.
        breaker.preflight().expect("probe admitted");
        assert_eq!(breaker.snapshot().state, BreakerState::HalfOpen);
        // Segunda llamada concurrente: rechazada mientras la sonda vuela.
        assert!(matches!(breaker.preflight(), Err(DbError::BreakerOpen { .. })));

        breaker.record_success();
        breaker.preflight().expect("second probe admitted");
        breaker.record_success();

        assert_eq!(breaker.snapshot().state, BreakerState::Closed);
    }

    #[test]
    fn certify_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(fast_policy());
        for _ in 0..3 {
            breaker.preflight().expect("admitted");
            breaker.record_failure("collapse");
        }

        std::thread::sleep(Duration::from_millis(60));
        breaker.preflight().expect("probe admitted");
        breaker.record_failure("probe collapse");

        assert_eq!(breaker.snapshot().state, BreakerState::Open);
        assert!(matches!(breaker.preflight(), Err(DbError::BreakerOpen { .. })));
    }
}

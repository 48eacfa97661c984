// [libs/domain/models-rs/src/instance.rs]
/*!
 * =================================================================
 * APARATO: INSTANCE DOMAIN MODELS (V12.0 - FLEET SOVEREIGN)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: CONTRATO SOBERANO DE IDENTIDAD Y VITALIDAD DE NODOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. STATE MACHINE AUTHORITY: La máquina de estados del nodo vive aquí;
 *    los repositorios y daemons solo ejecutan sus transiciones.
 * 2. TYPESHARE SYNERGY: Mapeo determinista de tipos numéricos para el
 *    Dashboard de operadores, garantizando paridad en la Tríada.
 * 3. NOMINAL PRECISION: Nomenclatura nominal absoluta en todos los campos.
 *
 * # Mathematical Proof (Monotonic Vitality):
 * Las transiciones dependen únicamente del silencio de latidos medido
 * contra umbrales configurables. Un latido fuera de orden jamás retrocede
 * la secuencia de estados, preservando la monotonicidad temporal.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Estados operativos de un nodo de huellas acústicas dentro de la flota.
#[typeshare]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Registrado pero sin latido confirmado todavía.
    Registered,
    /// Nodo saludable que recibe y procesa streams.
    Active,
    /// Silencio de latidos por encima del umbral de advertencia.
    Warning,
    /// Silencio prolongado: el nodo pierde la elegibilidad de despacho.
    Inactive,
    /// Latido recuperado tras inactividad; en cuarentena de confirmación.
    Recovering,
    /// Retirado por el operador o por expiración del plazo de remoción.
    Removed,
}

impl InstanceStatus {
    /// Representación canónica persistida en el Ledger Táctico.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::Active => "ACTIVE",
            Self::Warning => "WARNING",
            Self::Inactive => "INACTIVE",
            Self::Recovering => "RECOVERING",
            Self::Removed => "REMOVED",
        }
    }

    /// Decodificación desde la columna de estado del Ledger.
    #[must_use]
    pub fn parse(raw_status_label: &str) -> Option<Self> {
        match raw_status_label {
            "REGISTERED" => Some(Self::Registered),
            "ACTIVE" => Some(Self::Active),
            "WARNING" => Some(Self::Warning),
            "INACTIVE" => Some(Self::Inactive),
            "RECOVERING" => Some(Self::Recovering),
            "REMOVED" => Some(Self::Removed),
            _ => None,
        }
    }

    /// El conjunto elegible para recibir trabajo nuevo (ACTIVE + RECOVERING).
    #[must_use]
    pub fn is_eligible_for_dispatch(&self) -> bool {
        matches!(self, Self::Active | Self::Recovering)
    }

    /// Un nodo en estos estados no debe retener propiedad de streams.
    #[must_use]
    pub fn forfeits_ownership(&self) -> bool {
        matches!(self, Self::Inactive | Self::Removed)
    }
}

/// Entidad soberana de un nodo participante de la flota.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Identificador opaco elegido por el propio worker.
    #[serde(rename = "instance_identifier")]
    pub id: String,

    /// Dirección host+puerto para sondas de salud (informativa).
    #[serde(rename = "probe_address", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Máximo de streams concurrentes que el nodo acepta.
    pub capacity_max: u32,

    /// Estado operativo actual según la máquina de estados.
    pub status: InstanceStatus,

    /// Marca temporal del último latido aceptado.
    #[typeshare(serialized_as = "String")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,

    /// Primera registración exitosa (estable entre reinicios del mismo id).
    #[typeshare(serialized_as = "String")]
    pub registered_at: DateTime<Utc>,

    /// Eventos de timeout de latido desde la última recuperación limpia.
    pub failure_count: u32,

    /// Media móvil exponencial [0,1] de éxito de procesamiento y puntualidad.
    pub performance_score: f64,

    /// Latidos consecutivos acumulados dentro de RECOVERING.
    pub recovery_streak: u32,

    /// Metadatos opacos reportados por el worker en el registro.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Instance {
    /// Factor de suavizado de la media móvil del score de rendimiento.
    pub const PERFORMANCE_SMOOTHING_ALPHA: f64 = 0.3;

    /// Aplica la media móvil exponencial sobre el score con una señal [0,1].
    ///
    /// La señal se recorta al intervalo unitario antes de la mezcla; el score
    /// es solo un desempate del balanceador y nunca excluye a un nodo.
    #[must_use]
    pub fn blended_performance_score(current_score: f64, raw_signal: f64) -> f64 {
        let clipped_signal = raw_signal.clamp(0.0, 1.0);
        Self::PERFORMANCE_SMOOTHING_ALPHA * clipped_signal
            + (1.0 - Self::PERFORMANCE_SMOOTHING_ALPHA) * current_score.clamp(0.0, 1.0)
    }
}

// [libs/domain/balancer/src/snapshot.rs]
/*!
 * =================================================================
 * APARATO: BALANCER SNAPSHOT CONTRACTS (V7.0 - IMMUTABLE VIEW)
 * CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
 * RESPONSABILIDAD: VISTA INMUTABLE DE FLOTA + CATÁLOGO PARA EL MOTOR
 *
 * # Mathematical Proof (Referential Transparency):
 * El snapshot es el único insumo del motor. Congelar flota y catálogo en
 * una estructura inmutable garantiza que dos evaluaciones sobre el mismo
 * snapshot produzcan veredictos y planes idénticos.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Propiedad viva de un stream tal como la ve el motor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamHolding {
    pub stream_id: i64,
    /// Inicio de la propiedad vigente; desempate de selección de donantes.
    pub assigned_at: DateTime<Utc>,
}

/// Vista congelada de un nodo elegible para despacho.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceView {
    pub id: String,
    pub capacity_max: u32,
    /// Score [0,1] usado exclusivamente como desempate.
    pub performance_score: f64,
    /// Streams actualmente en propiedad viva del nodo.
    pub holdings: Vec<StreamHolding>,
}

impl InstanceView {
    /// Carga actual del nodo (propiedad viva).
    #[must_use]
    pub fn load(&self) -> u32 {
        self.holdings.len() as u32
    }

    /// Utilización fraccional de la capacidad declarada.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.capacity_max == 0 {
            return 0.0;
        }
        f64::from(self.load()) / f64::from(self.capacity_max)
    }
}

/// Insumo completo del motor: flota elegible + catálogo activo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerSnapshot {
    /// Nodos elegibles (ACTIVE / RECOVERING) con sus propiedades vivas.
    pub instances: Vec<InstanceView>,
    /// Conjunto de streams que el catálogo externo exige cubrir.
    pub catalog: Vec<i64>,
}

impl BalancerSnapshot {
    /// Capacidad agregada de la flota elegible.
    #[must_use]
    pub fn total_capacity(&self) -> u64 {
        self.instances.iter().map(|node| u64::from(node.capacity_max)).sum()
    }

    /// Streams del catálogo sin propietario vivo en el snapshot.
    #[must_use]
    pub fn uncovered_streams(&self) -> Vec<i64> {
        let mut owned_stream_identifiers: Vec<i64> = self
            .instances
            .iter()
            .flat_map(|node| node.holdings.iter().map(|holding| holding.stream_id))
            .collect();
        owned_stream_identifiers.sort_unstable();

        let mut uncovered: Vec<i64> = self
            .catalog
            .iter()
            .copied()
            .filter(|stream_id| owned_stream_identifiers.binary_search(stream_id).is_err())
            .collect();
        uncovered.sort_unstable();
        uncovered.dedup();
        uncovered
    }
}

/// Umbrales de detección de deriva (config §6, todos sobre-escribibles).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BalancerThresholds {
    /// Desviación estándar poblacional máxima de utilización tolerada.
    pub imbalance_threshold: f64,
    /// Piso absoluto de dispersión max(load) - min(load).
    pub max_stream_difference: u32,
}

impl Default for BalancerThresholds {
    fn default() -> Self {
        Self { imbalance_threshold: 0.15, max_stream_difference: 3 }
    }
}

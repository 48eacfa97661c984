// [libs/domain/balancer/src/plan.rs]
//! =================================================================
//! APARATO: MIGRATION PLAN CONTRACTS (V7.0 - ORDERED OUTPUT)
//! CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
//! RESPONSABILIDAD: SALIDA ORDENADA Y RESUMIBLE DEL MOTOR
//! =================================================================

use std::collections::BTreeMap;

use fingerswarm_domain_models::{PlanLegSummary, PlanSummary};
use serde::{Deserialize, Serialize};

/// Triple ordenado (stream, origen, destino) emitido por el motor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationTriple {
    pub stream_id: i64,
    /// Nodo donante; nulo cuando el stream carecía de propietario vivo.
    pub source: Option<String>,
    pub target: String,
}

/// Plan de migración mínima producido a partir de un snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Lista ordenada de movimientos; se ejecuta por lotes acotados.
    pub moves: Vec<MigrationTriple>,
    /// Streams del catálogo que ninguna capacidad restante pudo absorber.
    pub unplaced_stream_ids: Vec<i64>,
}

impl MigrationPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Condensa el plan en el resumen auditable por tramo origen -> destino.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        let mut per_leg_counts: BTreeMap<(Option<String>, String), u32> = BTreeMap::new();
        for movement in &self.moves {
            *per_leg_counts
                .entry((movement.source.clone(), movement.target.clone()))
                .or_insert(0) += 1;
        }

        PlanSummary {
            total_moves: self.moves.len() as u32,
            legs: per_leg_counts
                .into_iter()
                .map(|((source_instance, target_instance), stream_count)| PlanLegSummary {
                    source_instance,
                    target_instance,
                    stream_count,
                })
                .collect(),
        }
    }
}

// [libs/domain/balancer/src/engine.rs]
/*!
 * =================================================================
 * APARATO: BALANCING ENGINE (V11.4 - MINIMAL MOVE)
 * CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
 * RESPONSABILIDAD: DETECCIÓN DE DERIVA Y PLAN DETERMINISTA DE MIGRACIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CAPACITY AWARENESS: La dispersión absoluta solo dispara rebalanceo
 *    cuando las diferencias de capacidad no la explican.
 * 2. RESIDUAL SOVEREIGNTY: Los residuos de redondeo de los targets se
 *    adjudican a los nodos de mayor score de rendimiento.
 * 3. TOTAL ORDER: Todo desempate (score, identificador, stream) está
 *    totalmente ordenado; el plan es reproducible bit a bit.
 *
 * # Mathematical Proof (Bounded Plan):
 * El tamaño del plan entre nodos es exactamente Σ max(0, load_i - target_i):
 * cada donante emite su exceso una única vez y ningún receptor acepta por
 * encima de su déficit, por lo que el plan es mínimo en movimientos.
 * =================================================================
 */

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::plan::{MigrationPlan, MigrationTriple};
use crate::snapshot::{BalancerSnapshot, BalancerThresholds};

/// Criterio que declaró la deriva.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImbalanceTrigger {
    /// Desviación estándar poblacional de utilización sobre el umbral.
    UtilizationDeviation,
    /// Dispersión absoluta de carga no explicada por capacidad.
    AbsoluteSpread,
}

/// Veredicto de equilibrio sobre un snapshot congelado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceVerdict {
    pub is_imbalanced: bool,
    pub trigger: Option<ImbalanceTrigger>,
    pub utilization_stddev: f64,
    pub absolute_spread: u32,
    /// Streams del catálogo sin propietario vivo.
    pub uncovered_stream_count: u32,
}

impl BalanceVerdict {
    /// El conductor necesita actuar: deriva declarada o cobertura incompleta.
    #[must_use]
    pub fn requires_action(&self) -> bool {
        self.is_imbalanced || self.uncovered_stream_count > 0
    }
}

/// Evalúa los dos criterios de deriva del snapshot (§ detección de drift).
#[must_use]
pub fn evaluate_balance(snapshot: &BalancerSnapshot, thresholds: &BalancerThresholds) -> BalanceVerdict {
    let uncovered_stream_count = snapshot.uncovered_streams().len() as u32;

    if snapshot.instances.is_empty() {
        return BalanceVerdict {
            is_imbalanced: false,
            trigger: None,
            utilization_stddev: 0.0,
            absolute_spread: 0,
            uncovered_stream_count,
        };
    }

    let node_loads: Vec<u32> = snapshot.instances.iter().map(|node| node.load()).collect();
    let utilizations: Vec<f64> = snapshot.instances.iter().map(|node| node.utilization()).collect();

    let utilization_mean = utilizations.iter().sum::<f64>() / utilizations.len() as f64;
    let utilization_variance = utilizations
        .iter()
        .map(|utilization| (utilization - utilization_mean).powi(2))
        .sum::<f64>()
        / utilizations.len() as f64;
    let utilization_stddev = utilization_variance.sqrt();

    let max_load = node_loads.iter().copied().max().unwrap_or(0);
    let min_load = node_loads.iter().copied().min().unwrap_or(0);
    let absolute_spread = max_load - min_load;

    // Deriva por dispersión absoluta, descontando lo que la capacidad explica:
    // la desviación de cada nodo se mide contra su cuota proporcional.
    let catalog_size = deduplicated_catalog_size(snapshot) as f64;
    let capacity_total = snapshot.total_capacity() as f64;
    let spread_beyond_capacity = if capacity_total > 0.0 {
        let deviations: Vec<f64> = snapshot
            .instances
            .iter()
            .map(|node| {
                let proportional_share = f64::from(node.capacity_max) / capacity_total * catalog_size;
                f64::from(node.load()) - proportional_share
            })
            .collect();
        let max_deviation = deviations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_deviation = deviations.iter().copied().fold(f64::INFINITY, f64::min);
        max_deviation - min_deviation
    } else {
        0.0
    };

    let deviation_triggered = utilization_stddev > thresholds.imbalance_threshold;
    let spread_triggered = absolute_spread > thresholds.max_stream_difference
        && spread_beyond_capacity > f64::from(thresholds.max_stream_difference);

    let trigger = if deviation_triggered {
        Some(ImbalanceTrigger::UtilizationDeviation)
    } else if spread_triggered {
        Some(ImbalanceTrigger::AbsoluteSpread)
    } else {
        None
    };

    BalanceVerdict {
        is_imbalanced: trigger.is_some(),
        trigger,
        utilization_stddev,
        absolute_spread,
        uncovered_stream_count,
    }
}

/// Propone un plan solo cuando el veredicto exige acción y existe al menos
/// un movimiento ejecutable. Un snapshot ya equilibrado produce `None`.
#[must_use]
pub fn propose_plan(snapshot: &BalancerSnapshot, thresholds: &BalancerThresholds) -> Option<MigrationPlan> {
    let verdict = evaluate_balance(snapshot, thresholds);
    if !verdict.requires_action() {
        return None;
    }

    let plan = construct_migration_plan(snapshot);
    if plan.is_empty() {
        debug!(
            "⚖️  [BALANCER]: Verdict requires action but no executable move exists (uncovered={}).",
            verdict.uncovered_stream_count
        );
        return None;
    }
    Some(plan)
}

/// Construye el plan de migración mínima (§ construcción determinista).
///
/// 1. Targets proporcionales a capacidad, residuo de redondeo al mayor score.
/// 2. Donantes por exceso desc (score asc), receptores por déficit desc
///    (score desc); identificador ascendente como desempate final.
/// 3. Cada donante cede primero los streams retenidos por menos tiempo,
///    con el stream_id más bajo como desempate estable.
/// 4. Los streams sin propietario se colocan tras los donantes; lo que la
///    capacidad no absorbe queda reportado en `unplaced_stream_ids`.
#[must_use]
pub fn construct_migration_plan(snapshot: &BalancerSnapshot) -> MigrationPlan {
    if snapshot.instances.is_empty() {
        return MigrationPlan {
            moves: Vec::new(),
            unplaced_stream_ids: snapshot.uncovered_streams(),
        };
    }

    let targets = compute_target_distribution(snapshot);

    // Clasificación de donantes y receptores respecto del target.
    let mut donor_indices: Vec<usize> = Vec::new();
    let mut receiver_indices: Vec<usize> = Vec::new();
    for (index, node) in snapshot.instances.iter().enumerate() {
        let load = i64::from(node.load());
        let target = i64::from(targets[index]);
        if load > target {
            donor_indices.push(index);
        } else if load < target {
            receiver_indices.push(index);
        }
    }

    donor_indices.sort_by(|&left, &right| {
        let left_excess = i64::from(snapshot.instances[left].load()) - i64::from(targets[left]);
        let right_excess = i64::from(snapshot.instances[right].load()) - i64::from(targets[right]);
        right_excess
            .cmp(&left_excess)
            .then_with(|| {
                snapshot.instances[left]
                    .performance_score
                    .total_cmp(&snapshot.instances[right].performance_score)
            })
            .then_with(|| snapshot.instances[left].id.cmp(&snapshot.instances[right].id))
    });

    receiver_indices.sort_by(|&left, &right| {
        let left_deficit = i64::from(targets[left]) - i64::from(snapshot.instances[left].load());
        let right_deficit = i64::from(targets[right]) - i64::from(snapshot.instances[right].load());
        right_deficit
            .cmp(&left_deficit)
            .then_with(|| {
                snapshot.instances[right]
                    .performance_score
                    .total_cmp(&snapshot.instances[left].performance_score)
            })
            .then_with(|| snapshot.instances[left].id.cmp(&snapshot.instances[right].id))
    });

    let mut remaining_deficit: Vec<i64> = snapshot
        .instances
        .iter()
        .enumerate()
        .map(|(index, node)| i64::from(targets[index]) - i64::from(node.load()))
        .collect();

    let mut moves: Vec<MigrationTriple> = Vec::new();

    // Fase 1: drenaje de donantes hacia receptores.
    for &donor_index in &donor_indices {
        let donor = &snapshot.instances[donor_index];
        let mut donor_excess = i64::from(donor.load()) - i64::from(targets[donor_index]);
        if donor_excess <= 0 {
            continue;
        }

        // Los streams de adquisición más reciente migran primero.
        let mut orderable_holdings = donor.holdings.clone();
        orderable_holdings.sort_by(|left, right| {
            right
                .assigned_at
                .cmp(&left.assigned_at)
                .then_with(|| left.stream_id.cmp(&right.stream_id))
        });

        for holding in orderable_holdings {
            if donor_excess == 0 {
                break;
            }
            let Some(&receiver_index) = receiver_indices
                .iter()
                .find(|&&candidate| remaining_deficit[candidate] > 0)
            else {
                break;
            };

            moves.push(MigrationTriple {
                stream_id: holding.stream_id,
                source: Some(donor.id.clone()),
                target: snapshot.instances[receiver_index].id.clone(),
            });
            remaining_deficit[receiver_index] -= 1;
            donor_excess -= 1;
        }
    }

    // Fase 2: colocación de streams del catálogo sin propietario vivo.
    let mut unplaced_stream_ids: Vec<i64> = Vec::new();
    for orphan_stream_id in snapshot.uncovered_streams() {
        let Some(&receiver_index) = receiver_indices
            .iter()
            .find(|&&candidate| remaining_deficit[candidate] > 0)
        else {
            unplaced_stream_ids.push(orphan_stream_id);
            continue;
        };

        moves.push(MigrationTriple {
            stream_id: orphan_stream_id,
            source: None,
            target: snapshot.instances[receiver_index].id.clone(),
        });
        remaining_deficit[receiver_index] -= 1;
    }

    MigrationPlan { moves, unplaced_stream_ids }
}

/// Targets por nodo: cuota proporcional redondeada, suma ajustada a |S|,
/// techo en la capacidad declarada de cada nodo.
fn compute_target_distribution(snapshot: &BalancerSnapshot) -> Vec<u32> {
    let catalog_size = deduplicated_catalog_size(snapshot) as i64;
    let capacity_total = snapshot.total_capacity();

    if capacity_total == 0 {
        return vec![0; snapshot.instances.len()];
    }

    let mut targets: Vec<i64> = snapshot
        .instances
        .iter()
        .map(|node| {
            let proportional_share =
                f64::from(node.capacity_max) / capacity_total as f64 * catalog_size as f64;
            (proportional_share.round() as i64)
                .clamp(0, i64::from(node.capacity_max))
        })
        .collect();

    let placeable_total = catalog_size.min(capacity_total as i64);
    let mut assigned_total: i64 = targets.iter().sum();

    // Residuos de redondeo: se otorgan de a uno al mayor score con holgura.
    while assigned_total < placeable_total {
        let candidate = snapshot
            .instances
            .iter()
            .enumerate()
            .filter(|(index, node)| targets[*index] < i64::from(node.capacity_max))
            .max_by(|(left_index, left), (right_index, right)| {
                left.performance_score
                    .total_cmp(&right.performance_score)
                    .then_with(|| right_index.cmp(left_index))
            })
            .map(|(index, _)| index);
        match candidate {
            Some(index) => {
                targets[index] += 1;
                assigned_total += 1;
            }
            None => break,
        }
    }

    // Sobre-asignación por redondeo: se retira del menor score con carga.
    while assigned_total > placeable_total {
        let candidate = snapshot
            .instances
            .iter()
            .enumerate()
            .filter(|(index, _)| targets[*index] > 0)
            .min_by(|(left_index, left), (right_index, right)| {
                left.performance_score
                    .total_cmp(&right.performance_score)
                    .then_with(|| left_index.cmp(right_index))
            })
            .map(|(index, _)| index);
        match candidate {
            Some(index) => {
                targets[index] -= 1;
                assigned_total -= 1;
            }
            None => break,
        }
    }

    targets.into_iter().map(|target| target as u32).collect()
}

fn deduplicated_catalog_size(snapshot: &BalancerSnapshot) -> usize {
    let mut catalog = snapshot.catalog.clone();
    catalog.sort_unstable();
    catalog.dedup();
    catalog.len()
}

// --- SUITE DE CERTIFICACIÓN DEL MOTOR ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{InstanceView, StreamHolding};
    use chrono::{Duration, TimeZone, Utc};

    fn node(id: &str, capacity_max: u32, performance_score: f64, streams: &[i64]) -> InstanceView {
        let genesis = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        InstanceView {
            id: id.to_string(),
            capacity_max,
            performance_score,
            holdings: streams
                .iter()
                .enumerate()
                .map(|(ordinal, &stream_id)| StreamHolding {
                    stream_id,
                    assigned_at: genesis + Duration::seconds(ordinal as i64),
                })
                .collect(),
        }
    }

    fn thresholds() -> BalancerThresholds {
        BalancerThresholds::default()
    }

    #[test]
    fn certify_fresh_fleet_uniform_distribution() {
        // Tres nodos limpios, diez streams: reparto 3/3/4 con residuo al mejor score.
        let snapshot = BalancerSnapshot {
            instances: vec![
                node("worker-a", 10, 0.9, &[]),
                node("worker-b", 10, 0.5, &[]),
                node("worker-c", 10, 0.7, &[]),
            ],
            catalog: (1..=10).collect(),
        };

        let plan = propose_plan(&snapshot, &thresholds()).expect("fresh fleet demands a plan");
        assert_eq!(plan.moves.len(), 10);
        assert!(plan.unplaced_stream_ids.is_empty());

        let mut per_target = std::collections::HashMap::new();
        for movement in &plan.moves {
            assert!(movement.source.is_none());
            *per_target.entry(movement.target.clone()).or_insert(0u32) += 1;
        }
        let mut counts: Vec<u32> = per_target.values().copied().collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![3, 3, 4]);
        // El residuo de redondeo pertenece al nodo de mayor score.
        assert_eq!(per_target["worker-a"], 4);
    }

    #[test]
    fn certify_balanced_snapshot_emits_no_plan() {
        let snapshot = BalancerSnapshot {
            instances: vec![
                node("worker-a", 10, 0.9, &[1, 2, 3, 4]),
                node("worker-b", 10, 0.5, &[5, 6, 7]),
                node("worker-c", 10, 0.7, &[8, 9, 10]),
            ],
            catalog: (1..=10).collect(),
        };

        assert!(propose_plan(&snapshot, &thresholds()).is_none());
    }

    #[test]
    fn certify_drift_detection_and_minimal_moves() {
        // worker-a acumuló 6 streams; el plan debe drenar solo su exceso.
        let snapshot = BalancerSnapshot {
            instances: vec![
                node("worker-a", 10, 0.9, &[1, 2, 3, 4, 5, 6]),
                node("worker-b", 10, 0.5, &[7]),
                node("worker-c", 10, 0.7, &[8, 9]),
            ],
            catalog: (1..=9).collect(),
        };

        let verdict = evaluate_balance(&snapshot, &thresholds());
        assert!(verdict.is_imbalanced, "spread 5 over uniform capacity must trigger");

        let plan = propose_plan(&snapshot, &thresholds()).expect("drift demands a plan");
        assert_eq!(plan.moves.len(), 3, "plan must equal donor excess");
        assert!(plan.moves.iter().all(|movement| movement.source.as_deref() == Some("worker-a")));

        // El donante cede primero lo retenido por menos tiempo (ids más altos del fixture).
        let moved_streams: Vec<i64> = plan.moves.iter().map(|movement| movement.stream_id).collect();
        assert_eq!(moved_streams, vec![6, 5, 4]);

        // Receptor de mayor déficit primero: worker-b (déficit 2) antes que worker-c.
        assert_eq!(plan.moves[0].target, "worker-b");
        assert_eq!(plan.moves[1].target, "worker-b");
        assert_eq!(plan.moves[2].target, "worker-c");
    }

    #[test]
    fn certify_capacity_explained_spread_is_tolerated() {
        // 7 vs 1 de carga, pero capacidades 10 vs 2: la cuota explica la brecha.
        let snapshot = BalancerSnapshot {
            instances: vec![
                node("worker-big", 10, 0.6, &[1, 2, 3, 4, 5, 6, 7]),
                node("worker-small", 2, 0.6, &[8]),
            ],
            catalog: (1..=8).collect(),
        };

        let verdict = evaluate_balance(&snapshot, &thresholds());
        assert!(!verdict.is_imbalanced, "capacity-proportional spread must not trigger");
        assert!(propose_plan(&snapshot, &thresholds()).is_none());
    }

    #[test]
    fn certify_capacity_squeeze_reports_shortfall() {
        // Escenario de compresión: 12 streams contra 10 de capacidad agregada.
        let snapshot = BalancerSnapshot {
            instances: vec![node("worker-a", 5, 0.8, &[]), node("worker-b", 5, 0.6, &[])],
            catalog: (1..=12).collect(),
        };

        let plan = propose_plan(&snapshot, &thresholds()).expect("uncovered catalog demands a plan");
        assert_eq!(plan.moves.len(), 10);
        assert_eq!(plan.unplaced_stream_ids.len(), 2);

        let mut per_target = std::collections::HashMap::new();
        for movement in &plan.moves {
            *per_target.entry(movement.target.clone()).or_insert(0u32) += 1;
        }
        assert_eq!(per_target["worker-a"], 5);
        assert_eq!(per_target["worker-b"], 5);
    }

    #[test]
    fn certify_lost_instance_redistribution_shape() {
        // Los streams del nodo perdido llegan como huérfanos del catálogo.
        let snapshot = BalancerSnapshot {
            instances: vec![
                node("worker-a", 10, 0.9, &[1, 2, 3]),
                node("worker-c", 10, 0.7, &[7, 8, 9]),
            ],
            catalog: (1..=10).collect(),
        };

        let plan = propose_plan(&snapshot, &thresholds()).expect("orphans demand a plan");
        let placements: Vec<&MigrationTriple> =
            plan.moves.iter().filter(|movement| movement.source.is_none()).collect();
        assert_eq!(placements.len(), 4, "streams 4,5,6,10 must be placed");

        // Equilibrio final: cada nodo queda en 5 (máx - mín <= 1).
        let mut final_loads = std::collections::HashMap::new();
        final_loads.insert("worker-a".to_string(), 3u32);
        final_loads.insert("worker-c".to_string(), 3u32);
        for movement in &plan.moves {
            *final_loads.get_mut(&movement.target).expect("known target") += 1;
            if let Some(source) = &movement.source {
                *final_loads.get_mut(source).expect("known source") -= 1;
            }
        }
        let max_load = final_loads.values().max().copied().unwrap_or(0);
        let min_load = final_loads.values().min().copied().unwrap_or(0);
        assert!(max_load - min_load <= 1);
    }

    #[test]
    fn certify_plan_determinism() {
        let snapshot = BalancerSnapshot {
            instances: vec![
                node("worker-a", 8, 0.4, &[1, 2, 3, 4, 5]),
                node("worker-b", 8, 0.4, &[]),
                node("worker-c", 8, 0.4, &[6]),
            ],
            catalog: (1..=6).collect(),
        };

        let first_plan = construct_migration_plan(&snapshot);
        let second_plan = construct_migration_plan(&snapshot);
        assert_eq!(first_plan.moves, second_plan.moves);
        assert_eq!(first_plan.unplaced_stream_ids, second_plan.unplaced_stream_ids);
    }

    // --- PROPIEDAD: CONVERGENCIA EN UNA PASADA ---

    use proptest::prelude::*;

    fn apply_plan(snapshot: &BalancerSnapshot, plan: &MigrationPlan) -> BalancerSnapshot {
        let genesis = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let mut evolved = snapshot.clone();
        for movement in &plan.moves {
            if let Some(source_identifier) = &movement.source {
                if let Some(source_node) =
                    evolved.instances.iter_mut().find(|node| &node.id == source_identifier)
                {
                    source_node.holdings.retain(|holding| holding.stream_id != movement.stream_id);
                }
            }
            if let Some(target_node) =
                evolved.instances.iter_mut().find(|node| node.id == movement.target)
            {
                target_node.holdings.push(StreamHolding {
                    stream_id: movement.stream_id,
                    assigned_at: genesis,
                });
            }
        }
        evolved
    }

    proptest! {
        /// Tras aplicar el plan propuesto, una segunda propuesta es vacía:
        /// el motor converge en una sola pasada y es idempotente.
        #[test]
        fn certify_single_pass_convergence(
            capacities in proptest::collection::vec(1u32..=20, 1..=6),
            catalog_size in 0usize..=40,
        ) {
            let catalog: Vec<i64> = (1..=catalog_size as i64).collect();
            let instances: Vec<InstanceView> = capacities
                .iter()
                .enumerate()
                .map(|(ordinal, &capacity_max)| InstanceView {
                    id: format!("worker-{ordinal:02}"),
                    capacity_max,
                    performance_score: 0.1 * (ordinal % 7) as f64,
                    holdings: Vec::new(),
                })
                .collect();
            let snapshot = BalancerSnapshot { instances, catalog };

            if let Some(first_plan) = propose_plan(&snapshot, &BalancerThresholds::default()) {
                let evolved = apply_plan(&snapshot, &first_plan);
                prop_assert!(propose_plan(&evolved, &BalancerThresholds::default()).is_none());

                // La capacidad jamás se viola por el plan.
                for node in &evolved.instances {
                    prop_assert!(node.load() <= node.capacity_max);
                }
            }
        }
    }
}

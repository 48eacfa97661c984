// [libs/infra/db/src/repositories/rebalance.rs]
//! =================================================================
//! APARATO: REBALANCE AUDIT REPOSITORY (V7.0 - APPEND ONLY)
//! CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
//! RESPONSABILIDAD: RASTRO INMUTABLE DE PLANES DE MIGRACIÓN
//! =================================================================

use chrono::{DateTime, Utc};
use fingerswarm_domain_models::{PlanSummary, RebalanceEvent, RebalanceOutcome, RebalanceReason};
use libsql::{params, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::client::GatekeeperClient;
use crate::errors::DbError;

const EVENT_PROJECTION: &str = r#"
    SELECT id, started_at, completed_at, reason, plan_summary_json, outcome
    FROM rebalance_events
"#;

/// Repositorio append-only del rastro de rebalanceos.
pub struct RebalanceRepository {
    gatekeeper: GatekeeperClient,
}

impl RebalanceRepository {
    #[must_use]
    pub fn new(gatekeeper: GatekeeperClient) -> Self {
        Self { gatekeeper }
    }

    /// Abre el registro de un plan que comienza a ejecutarse.
    #[instrument(skip(self, plan_summary))]
    pub async fn open_event(
        &self,
        reason: RebalanceReason,
        plan_summary: PlanSummary,
    ) -> Result<RebalanceEvent, DbError> {
        self.gatekeeper
            .run_write("rebalance_open_event", move |connection| {
                let plan_summary = plan_summary.clone();
                Box::pin(async move {
                    let event_identifier = Uuid::new_v4().to_string();
                    let started_at = Utc::now();
                    let summary_json = serde_json::to_string(&plan_summary)
                        .map_err(|fault| DbError::MappingError(format!("plan summary encode: {fault}")))?;

                    connection
                        .execute(
                            r#"
                            INSERT INTO rebalance_events (id, started_at, reason, plan_summary_json, outcome)
                            VALUES (?1, ?2, ?3, ?4, 'IN_PROGRESS')
                            "#,
                            params![
                                event_identifier.clone(),
                                started_at.to_rfc3339(),
                                reason.as_str(),
                                summary_json
                            ],
                        )
                        .await?;

                    Ok(RebalanceEvent {
                        id: event_identifier,
                        started_at,
                        completed_at: None,
                        reason,
                        plan_summary: plan_summary.clone(),
                        outcome: RebalanceOutcome::InProgress,
                    })
                })
            })
            .await
    }

    /// Sella el desenlace de un plan. La guardia sobre IN_PROGRESS hace la
    /// fila inmutable tras su primera conclusión.
    #[instrument(skip(self))]
    pub async fn conclude_event(
        &self,
        event_id: &str,
        outcome: RebalanceOutcome,
    ) -> Result<bool, DbError> {
        let event_id = event_id.to_string();
        self.gatekeeper
            .run_write("rebalance_conclude_event", move |connection| {
                let event_id = event_id.clone();
                Box::pin(async move {
                    let affected = connection
                        .execute(
                            r#"
                            UPDATE rebalance_events
                            SET completed_at = ?2, outcome = ?3
                            WHERE id = ?1 AND outcome = 'IN_PROGRESS'
                            "#,
                            params![event_id.clone(), Utc::now().to_rfc3339(), outcome.as_str()],
                        )
                        .await?;
                    Ok(affected > 0)
                })
            })
            .await
    }

    /// Un plan sigue en ejecución si existe alguna fila IN_PROGRESS.
    pub async fn has_event_in_progress(&self) -> Result<bool, DbError> {
        self.gatekeeper
            .run_read("rebalance_in_progress", move |connection| {
                Box::pin(async move {
                    let mut rows = connection
                        .query(
                            "SELECT COUNT(*) FROM rebalance_events WHERE outcome = 'IN_PROGRESS'",
                            (),
                        )
                        .await?;
                    match rows.next().await? {
                        Some(row) => Ok(row.get::<i64>(0)? > 0),
                        None => Ok(false),
                    }
                })
            })
            .await
    }

    /// Historia reciente para el Dashboard del operador.
    pub async fn recent(&self, limit: u32) -> Result<Vec<RebalanceEvent>, DbError> {
        self.gatekeeper
            .run_read("rebalance_recent", move |connection| {
                Box::pin(async move {
                    let mut rows = connection
                        .query(
                            &format!("{EVENT_PROJECTION} ORDER BY started_at DESC LIMIT ?1"),
                            params![i64::from(limit)],
                        )
                        .await?;

                    let mut history = Vec::new();
                    while let Some(row) = rows.next().await? {
                        history.push(hydrate_event(&row)?);
                    }
                    Ok(history)
                })
            })
            .await
    }
}

fn hydrate_event(row: &Row) -> Result<RebalanceEvent, DbError> {
    let started_at_raw: String = row.get(1)?;
    let completed_at_raw: Option<String> = row.get(2)?;
    let reason_raw: String = row.get(3)?;
    let summary_raw: String = row.get(4)?;
    let outcome_raw: String = row.get(5)?;

    Ok(RebalanceEvent {
        id: row.get(0)?,
        started_at: parse_utc(&started_at_raw)?,
        completed_at: completed_at_raw.map(|raw| parse_utc(&raw)).transpose()?,
        reason: RebalanceReason::parse(&reason_raw)
            .ok_or_else(|| DbError::MappingError(format!("unknown rebalance reason '{reason_raw}'")))?,
        plan_summary: serde_json::from_str(&summary_raw)
            .map_err(|fault| DbError::MappingError(format!("plan summary decode: {fault}")))?,
        outcome: RebalanceOutcome::parse(&outcome_raw)
            .ok_or_else(|| DbError::MappingError(format!("unknown rebalance outcome '{outcome_raw}'")))?,
    })
}

fn parse_utc(raw_timestamp: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw_timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|fault| DbError::MappingError(format!("timestamp decode '{raw_timestamp}': {fault}")))
}

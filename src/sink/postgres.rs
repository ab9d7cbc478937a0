//! Relational sink (PostgreSQL)

use super::Sink;
use crate::resource::{OutcomePayload, RunOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

/// Table written by [`PostgresSink`]
pub const OUTCOME_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS tagsweep_outcomes (
    id BIGSERIAL PRIMARY KEY,
    run_id UUID NOT NULL,
    account_id TEXT NOT NULL,
    region TEXT NOT NULL,
    service TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT NOT NULL,
    payload JSONB NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL
)
"#;

/// Inserts one row per outcome into `tagsweep_outcomes`
#[derive(Clone)]
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    /// Connect and make sure the outcome table exists
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("Failed to connect to the outcome database")?;

        sqlx::query(OUTCOME_TABLE_DDL)
            .execute(&pool)
            .await
            .context("Failed to create tagsweep_outcomes")?;

        Ok(Self { pool })
    }
}

/// Resources or tag results as stored in the payload column
fn payload_json(payload: &OutcomePayload) -> Result<serde_json::Value> {
    Ok(match payload {
        OutcomePayload::Resources(resources) => serde_json::to_value(resources)?,
        OutcomePayload::Tagging(results) => serde_json::to_value(results)?,
    })
}

#[async_trait]
impl Sink for PostgresSink {
    async fn record(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tagsweep_outcomes
                (run_id, account_id, region, service, resource_type, status, error, payload, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run_id)
        .bind(&outcome.account_id)
        .bind(&outcome.region)
        .bind(&outcome.service)
        .bind(&outcome.resource_type)
        .bind(outcome.status.as_str())
        .bind(&outcome.error)
        .bind(payload_json(&outcome.payload)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert outcome for {}", outcome.label()))?;

        Ok(())
    }
}

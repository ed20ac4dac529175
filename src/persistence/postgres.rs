use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info, instrument};

use super::{RoundSink, TradeLedger};
use crate::domain::{RoundReport, TradeRecord, TradeSide};
use crate::error::{ArenaError, Result};

/// PostgreSQL ledger and round store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Most recent rounds, newest first
    pub async fn recent_rounds(&self, limit: i64) -> Result<Vec<RoundReport>> {
        let rows = sqlx::query(
            r#"
            SELECT report FROM arena_rounds
            ORDER BY started_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let value: serde_json::Value = r.get("report");
                serde_json::from_value(value).map_err(ArenaError::from)
            })
            .collect()
    }
}

#[async_trait]
impl TradeLedger for PostgresStore {
    #[instrument(skip(self, trade), fields(trade_id = %trade.trade_id))]
    async fn record_trade(&self, trade: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO arena_trades (
                trade_id, agent_id, round_id, symbol, side, shares, price,
                usdc_amount, paper, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (trade_id) DO NOTHING
            "#,
        )
        .bind(&trade.trade_id)
        .bind(&trade.agent_id)
        .bind(&trade.round_id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.shares)
        .bind(trade.price)
        .bind(trade.usdc_amount)
        .bind(trade.paper)
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await?;

        debug!("Recorded trade {}", trade.trade_id);
        Ok(())
    }

    async fn trades_for_agent(&self, agent_id: &str) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, agent_id, round_id, symbol, side, shares, price,
                   usdc_amount, paper, executed_at
            FROM arena_trades
            WHERE agent_id = $1
            ORDER BY executed_at ASC, id ASC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let side: String = r.get("side");
                Ok(TradeRecord {
                    trade_id: r.get("trade_id"),
                    agent_id: r.get("agent_id"),
                    round_id: r.get("round_id"),
                    symbol: r.get("symbol"),
                    side: TradeSide::parse(&side).ok_or_else(|| {
                        ArenaError::Persistence(format!("unknown trade side '{}'", side))
                    })?,
                    shares: r.get("shares"),
                    price: r.get("price"),
                    usdc_amount: r.get("usdc_amount"),
                    paper: r.get("paper"),
                    executed_at: r.get("executed_at"),
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RoundSink for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    #[instrument(skip(self, report), fields(round_id = %report.round_id))]
    async fn publish(&self, report: &RoundReport) -> Result<()> {
        let payload = serde_json::to_value(report)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO arena_rounds (
                round_id, started_at, phase, lock_skipped, consensus, summary,
                error_count, duration_ms, report
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (round_id) DO NOTHING
            "#,
        )
        .bind(&report.round_id)
        .bind(report.timestamp)
        .bind(report.phase.as_str())
        .bind(report.lock_skipped)
        .bind(report.consensus.map(|c| c.as_str()))
        .bind(&report.summary)
        .bind(report.errors.len() as i32)
        .bind(report.duration_ms as i64)
        .bind(&payload)
        .execute(&mut *tx)
        .await?;

        for result in &report.results {
            sqlx::query(
                r#"
                INSERT INTO arena_round_results (
                    round_id, agent_id, action, symbol, quantity, confidence,
                    executed, agent_failed, trade_id, error
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&report.round_id)
            .bind(&result.agent_id)
            .bind(result.decision.action.as_str())
            .bind(&result.decision.symbol)
            .bind(result.decision.quantity)
            .bind(result.decision.confidence)
            .bind(result.executed)
            .bind(result.agent_failed)
            .bind(result.execution.as_ref().map(|e| e.trade_id.as_str()))
            .bind(result.execution_error.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        for activation in &report.circuit_breaker_activations {
            sqlx::query(
                r#"
                INSERT INTO arena_breaker_activations (
                    round_id, agent_id, rule, symbol, reason,
                    original_action, original_quantity, new_action, new_quantity, fired_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&report.round_id)
            .bind(&activation.agent_id)
            .bind(activation.rule.as_str())
            .bind(&activation.symbol)
            .bind(&activation.reason)
            .bind(activation.original_action.as_str())
            .bind(activation.original_quantity)
            .bind(activation.new_action.as_str())
            .bind(activation.new_quantity)
            .bind(activation.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(results = report.results.len(), "Round persisted");
        Ok(())
    }
}

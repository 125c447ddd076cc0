//! Persistence (§6): content-hash-deduplicated `backtest_results`,
//! `backtest_trades` and `backtest_equity_curve` tables. Grounded on the
//! teacher's `BacktestDb` shape (pool-held struct, `init_tables`,
//! `save`/`get` pairs, internal `FromRow` row types).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::config::BacktestConfig;
use crate::models::{BacktestResult, EquityCurve, Trade};

pub struct BacktestDb {
    pool: sqlx::SqlitePool,
}

impl BacktestDb {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS backtest_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                config_hash TEXT NOT NULL UNIQUE,
                config_json TEXT NOT NULL,
                total_return REAL NOT NULL,
                sharpe REAL NOT NULL,
                max_drawdown REAL NOT NULL,
                total_trades INTEGER NOT NULL,
                metrics_json TEXT NOT NULL,
                execution_time_seconds REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS backtest_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backtest_id INTEGER NOT NULL REFERENCES backtest_results(id),
                trade_json TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS backtest_equity_curve (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backtest_id INTEGER NOT NULL REFERENCES backtest_results(id),
                date TEXT NOT NULL,
                value REAL NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Save a result, replacing any prior row with the same config hash.
    /// Returns the row id.
    pub async fn save_backtest(&self, result: &BacktestResult) -> Result<i64, anyhow::Error> {
        self.init_tables().await?;

        let hash = config_hash(&result.config);
        let config_json = serde_json::to_string(&result.config)?;
        let metrics_json = serde_json::to_string(&result.metrics)?;

        sqlx::query("DELETE FROM backtest_results WHERE config_hash = ?")
            .bind(&hash)
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as(
            "INSERT INTO backtest_results (
                config_hash, config_json, total_return, sharpe, max_drawdown,
                total_trades, metrics_json, execution_time_seconds
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(&hash)
        .bind(&config_json)
        .bind(result.metrics.total_return)
        .bind(result.metrics.sharpe)
        .bind(result.metrics.max_drawdown)
        .bind(result.metrics.total_trades as i64)
        .bind(&metrics_json)
        .bind(result.execution_time_seconds)
        .fetch_one(&self.pool)
        .await?;
        let backtest_id = row.0;

        for trade in &result.trades {
            let trade_json = serde_json::to_string(trade)?;
            sqlx::query("INSERT INTO backtest_trades (backtest_id, trade_json) VALUES (?, ?)")
                .bind(backtest_id)
                .bind(&trade_json)
                .execute(&self.pool)
                .await?;
        }

        for (date, value) in result.equity_curve.iter() {
            sqlx::query("INSERT INTO backtest_equity_curve (backtest_id, date, value) VALUES (?, ?, ?)")
                .bind(backtest_id)
                .bind(date.format("%Y-%m-%d").to_string())
                .bind(value.to_f64().unwrap_or(0.0))
                .execute(&self.pool)
                .await?;
        }

        Ok(backtest_id)
    }

    pub async fn get_trades(&self, backtest_id: i64) -> Result<Vec<Trade>, anyhow::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT trade_json FROM backtest_trades WHERE backtest_id = ?")
                .bind(backtest_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).map_err(anyhow::Error::from))
            .collect()
    }

    pub async fn get_equity_curve(&self, backtest_id: i64) -> Result<EquityCurve, anyhow::Error> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT date, value FROM backtest_equity_curve WHERE backtest_id = ? ORDER BY date",
        )
        .bind(backtest_id)
        .fetch_all(&self.pool)
        .await?;

        let mut curve = EquityCurve::new();
        for (date_str, value) in rows {
            let date = chrono::NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")?;
            curve.record(date, Decimal::from_f64(value).unwrap_or_default());
        }
        Ok(curve)
    }

    pub async fn delete_backtest(&self, backtest_id: i64) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM backtest_equity_curve WHERE backtest_id = ?")
            .bind(backtest_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM backtest_trades WHERE backtest_id = ?")
            .bind(backtest_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM backtest_results WHERE id = ?")
            .bind(backtest_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Content hash of the config plus nothing else: two runs of the same
/// config always collide and the later one replaces the earlier row.
fn config_hash(config: &BacktestConfig) -> String {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(config)
        .unwrap_or_default()
        .hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Region;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn config() -> BacktestConfig {
        BacktestConfig::from_risk_profile(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            vec![Region::KR],
            vec![],
            dec!(100_000_000),
            crate::config::RiskProfile::Moderate,
        )
        .unwrap()
    }

    #[test]
    fn identical_configs_hash_identically() {
        assert_eq!(config_hash(&config()), config_hash(&config()));
    }

    #[test]
    fn different_capital_changes_the_hash() {
        let mut other = config();
        other.initial_capital = dec!(50_000_000);
        assert_ne!(config_hash(&config()), config_hash(&other));
    }
}

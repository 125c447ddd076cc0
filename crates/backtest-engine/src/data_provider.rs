//! Historical bar access (C1). A single point-in-time read path shared by
//! every downstream component; no component is allowed to look past `as_of`.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::config::Region;
use crate::error::{BacktestError, Result};
use crate::models::HistoricalBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Daily,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Point-in-time historical market data access.
///
/// `bars_as_of` must never return a bar dated after `as_of`; implementations
/// that violate this break the no-look-ahead guarantee the whole engine
/// depends on.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn bars_as_of(
        &self,
        ticker: &str,
        region: Region,
        start: NaiveDate,
        as_of: NaiveDate,
        timeframe: Timeframe,
    ) -> Result<Vec<HistoricalBar>>;

    /// Batch form of `bars_as_of`. Backends that can share one lock/lookup
    /// pass across the whole ticker set should override this; the default
    /// here is the naive per-ticker loop and exists only so implementors
    /// aren't forced to provide a batched path they have no use for.
    async fn bars_as_of_batch(
        &self,
        tickers: &[String],
        region: Region,
        start: NaiveDate,
        as_of: NaiveDate,
        timeframe: Timeframe,
    ) -> Result<HashMap<String, Vec<HistoricalBar>>> {
        let mut out = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            out.insert(ticker.clone(), self.bars_as_of(ticker, region, start, as_of, timeframe).await?);
        }
        Ok(out)
    }

    /// All tradable tickers in `region` as of `as_of`. Used by the strategy
    /// runner to build the daily candidate universe.
    async fn universe(&self, region: Region, as_of: NaiveDate) -> Result<Vec<String>>;

    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }

    /// Drops any cached query results. A courtesy; correctness never
    /// depends on the cache being warm or cold.
    fn clear_cache(&self) {}
}

fn validate_query(ticker: &str, start: NaiveDate, as_of: NaiveDate) -> Result<()> {
    if ticker.is_empty() {
        return Err(BacktestError::ConfigInvalid("ticker must not be empty".into()));
    }
    if start > as_of {
        return Err(BacktestError::ConfigInvalid(format!("start {start} is after end {as_of}")));
    }
    Ok(())
}

type CacheKey = (String, Region, NaiveDate, NaiveDate, Timeframe);

/// In-memory `DataProvider` over a fixed pre-loaded bar set. Primary backend
/// for tests and for validation's consistency cross-checks.
pub struct MemoryDataProvider {
    bars: HashMap<(String, Region), BTreeMap<NaiveDate, HistoricalBar>>,
    universes: HashMap<Region, Vec<String>>,
    stats: Mutex<CacheStats>,
    cache: Mutex<HashMap<CacheKey, Vec<HistoricalBar>>>,
}

impl MemoryDataProvider {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            universes: HashMap::new(),
            stats: Mutex::new(CacheStats::default()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_bars(mut self, ticker: &str, region: Region, bars: Vec<HistoricalBar>) -> Self {
        let series = self
            .bars
            .entry((ticker.to_string(), region))
            .or_default();
        for bar in bars {
            series.insert(bar.date, bar);
        }
        self.universes
            .entry(region)
            .or_default()
            .push(ticker.to_string());
        self
    }
}

impl Default for MemoryDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProvider for MemoryDataProvider {
    async fn bars_as_of(
        &self,
        ticker: &str,
        region: Region,
        start: NaiveDate,
        as_of: NaiveDate,
        timeframe: Timeframe,
    ) -> Result<Vec<HistoricalBar>> {
        validate_query(ticker, start, as_of)?;
        let key = (ticker.to_string(), region, start, as_of, timeframe);
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            self.stats.lock().unwrap().hits += 1;
            return Ok(cached.clone());
        }
        self.stats.lock().unwrap().misses += 1;

        let series = self
            .bars
            .get(&(ticker.to_string(), region))
            .ok_or_else(|| BacktestError::DataUnavailable(format!("no series for {ticker}")))?;

        let bars: Vec<HistoricalBar> = series
            .range(start..=as_of)
            .map(|(_, bar)| *bar)
            .collect();

        self.cache.lock().unwrap().insert(key, bars.clone());
        Ok(bars)
    }

    /// Batched so every ticker in the request is resolved under a single
    /// cache-lock/series-lookup pass instead of one `bars_as_of` call (and
    /// lock acquisition) per ticker.
    async fn bars_as_of_batch(
        &self,
        tickers: &[String],
        region: Region,
        start: NaiveDate,
        as_of: NaiveDate,
        timeframe: Timeframe,
    ) -> Result<HashMap<String, Vec<HistoricalBar>>> {
        let mut out = HashMap::with_capacity(tickers.len());
        let mut cache = self.cache.lock().unwrap();
        let mut stats = self.stats.lock().unwrap();
        for ticker in tickers {
            validate_query(ticker, start, as_of)?;
            let key = (ticker.clone(), region, start, as_of, timeframe);
            let bars = if let Some(cached) = cache.get(&key) {
                stats.hits += 1;
                cached.clone()
            } else {
                stats.misses += 1;
                let series = self
                    .bars
                    .get(&(ticker.clone(), region))
                    .ok_or_else(|| BacktestError::DataUnavailable(format!("no series for {ticker}")))?;
                let bars: Vec<HistoricalBar> = series.range(start..=as_of).map(|(_, bar)| *bar).collect();
                cache.insert(key, bars.clone());
                bars
            };
            out.insert(ticker.clone(), bars);
        }
        Ok(out)
    }

    async fn universe(&self, region: Region, _as_of: NaiveDate) -> Result<Vec<String>> {
        Ok(self.universes.get(&region).cloned().unwrap_or_default())
    }

    fn cache_stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }

    fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }
}

/// `DataProvider` backed by a SQLite pool of OHLCV bars. The durable default
/// for real runs; schema mirrors `MemoryDataProvider`'s shape with a
/// `(ticker, region, date)` primary key.
pub struct SqliteDataProvider {
    pool: sqlx::SqlitePool,
    stats: Arc<Mutex<CacheStats>>,
}

impl SqliteDataProvider {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            pool,
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS historical_bars (
                ticker TEXT NOT NULL,
                region TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (ticker, region, date)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BacktestError::DataUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl DataProvider for SqliteDataProvider {
    async fn bars_as_of(
        &self,
        ticker: &str,
        region: Region,
        start: NaiveDate,
        as_of: NaiveDate,
        _timeframe: Timeframe,
    ) -> Result<Vec<HistoricalBar>> {
        validate_query(ticker, start, as_of)?;
        self.stats.lock().unwrap().misses += 1;
        let region_code = format!("{region:?}");
        let rows: Vec<BarRow> = sqlx::query_as(
            "SELECT date, open, high, low, close, volume FROM historical_bars
             WHERE ticker = ? AND region = ? AND date >= ? AND date <= ?
             ORDER BY date ASC",
        )
        .bind(ticker)
        .bind(&region_code)
        .bind(start.format("%Y-%m-%d").to_string())
        .bind(as_of.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BacktestError::DataUnavailable(e.to_string()))?;

        rows.into_iter().map(BarRow::into_bar).collect()
    }

    async fn universe(&self, region: Region, _as_of: NaiveDate) -> Result<Vec<String>> {
        let region_code = format!("{region:?}");
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT ticker FROM historical_bars WHERE region = ?",
        )
        .bind(&region_code)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BacktestError::DataUnavailable(e.to_string()))?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    fn cache_stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }
}

#[derive(sqlx::FromRow)]
struct BarRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl BarRow {
    fn into_bar(self) -> Result<HistoricalBar> {
        use rust_decimal::prelude::FromPrimitive;
        use rust_decimal::Decimal;

        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| BacktestError::DataUnavailable(e.to_string()))?;
        Ok(HistoricalBar {
            date,
            open: Decimal::from_f64(self.open).unwrap_or_default(),
            high: Decimal::from_f64(self.high).unwrap_or_default(),
            low: Decimal::from_f64(self.low).unwrap_or_default(),
            close: Decimal::from_f64(self.close).unwrap_or_default(),
            volume: Decimal::from_f64(self.volume).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bar(d: &str, close: rust_decimal::Decimal) -> HistoricalBar {
        HistoricalBar {
            date: date(d),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
        }
    }

    #[tokio::test]
    async fn never_returns_bars_after_as_of() {
        let provider = MemoryDataProvider::new().with_bars(
            "005930",
            Region::KR,
            vec![
                bar("2023-01-01", dec!(100)),
                bar("2023-01-02", dec!(101)),
                bar("2023-01-03", dec!(102)),
            ],
        );
        let bars = provider
            .bars_as_of("005930", Region::KR, date("2023-01-01"), date("2023-01-02"), Timeframe::Daily)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars.iter().all(|b| b.date <= date("2023-01-02")));
    }

    #[tokio::test]
    async fn missing_ticker_is_an_error() {
        let provider = MemoryDataProvider::new();
        let result = provider
            .bars_as_of("XXXX", Region::KR, date("2023-01-01"), date("2023-01-02"), Timeframe::Daily)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn start_after_end_is_rejected() {
        let provider = MemoryDataProvider::new();
        let result = provider
            .bars_as_of("005930", Region::KR, date("2023-01-05"), date("2023-01-01"), Timeframe::Daily)
            .await;
        assert!(matches!(result, Err(BacktestError::ConfigInvalid(_))));
    }

    #[tokio::test]
    async fn empty_ticker_is_rejected() {
        let provider = MemoryDataProvider::new();
        let result = provider
            .bars_as_of("", Region::KR, date("2023-01-01"), date("2023-01-02"), Timeframe::Daily)
            .await;
        assert!(matches!(result, Err(BacktestError::ConfigInvalid(_))));
    }

    #[tokio::test]
    async fn batch_returns_the_same_data_as_sequential_calls() {
        let provider = MemoryDataProvider::new()
            .with_bars("005930", Region::KR, vec![bar("2023-01-01", dec!(100))])
            .with_bars("000660", Region::KR, vec![bar("2023-01-01", dec!(200))]);

        let tickers = vec!["005930".to_string(), "000660".to_string()];
        let batched = provider
            .bars_as_of_batch(&tickers, Region::KR, date("2023-01-01"), date("2023-01-01"), Timeframe::Daily)
            .await
            .unwrap();

        assert_eq!(batched["005930"][0].close, dec!(100));
        assert_eq!(batched["000660"][0].close, dec!(200));
    }

    #[tokio::test]
    async fn clear_cache_forces_a_miss_on_the_next_read() {
        let provider = MemoryDataProvider::new().with_bars(
            "005930",
            Region::KR,
            vec![bar("2023-01-01", dec!(100))],
        );
        provider
            .bars_as_of("005930", Region::KR, date("2023-01-01"), date("2023-01-01"), Timeframe::Daily)
            .await
            .unwrap();
        provider.clear_cache();
        provider
            .bars_as_of("005930", Region::KR, date("2023-01-01"), date("2023-01-01"), Timeframe::Daily)
            .await
            .unwrap();
        let stats = provider.cache_stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache() {
        let provider = MemoryDataProvider::new().with_bars(
            "005930",
            Region::KR,
            vec![bar("2023-01-01", dec!(100))],
        );
        for _ in 0..3 {
            provider
                .bars_as_of("005930", Region::KR, date("2023-01-01"), date("2023-01-01"), Timeframe::Daily)
                .await
                .unwrap();
        }
        let stats = provider.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }
}

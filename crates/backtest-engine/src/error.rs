use thiserror::Error;

/// Soft, per-order rejection reasons from `PortfolioSimulator::buy`. Never
/// fatal; the caller logs and moves to the next signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DuplicatePosition,
    ZeroShares,
    InsufficientCash,
    BelowCashReserve,
    SectorExposureExceeded,
    LotSizeTooSmall,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::DuplicatePosition => "duplicate position",
            RejectReason::ZeroShares => "zero shares after sizing",
            RejectReason::InsufficientCash => "insufficient cash",
            RejectReason::BelowCashReserve => "would breach cash reserve",
            RejectReason::SectorExposureExceeded => "sector exposure exceeded",
            RejectReason::LotSizeTooSmall => "position too small for one lot",
        };
        f.write_str(s)
    }
}

/// Error kinds per the specification's error handling design. `ConfigInvalid`
/// through `OrderRejected` are soft (localized to one ticker/order/config
/// construction); `PortfolioInvariantViolated` and `ProviderInvariantViolated`
/// are fatal and abort the backtest.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("no data for {ticker} on {date}")]
    DataMissing { ticker: String, date: chrono::NaiveDate },

    #[error("data provider unavailable: {0}")]
    DataUnavailable(String),

    #[error("strategy scoring failed for {ticker}: {reason}")]
    StrategyFailed { ticker: String, reason: String },

    #[error("sizing invalid for {ticker}: {reason}")]
    SizingInvalid { ticker: String, reason: String },

    #[error("order rejected for {ticker}: {reason}")]
    OrderRejected { ticker: String, reason: RejectReason },

    #[error("portfolio invariant violated: {0}")]
    PortfolioInvariantViolated(String),

    #[error("provider invariant violated: {0}")]
    ProviderInvariantViolated(String),
}

pub type Result<T> = std::result::Result<T, BacktestError>;

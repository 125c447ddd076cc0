use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{AnalysisError, ScoringResult, Stage2Assessment};

/// External scoring/pattern-recognition collaborator consumed by the
/// strategy runner. Must not look ahead past `as_of`.
#[async_trait]
pub trait ScoringProvider: Send + Sync {
    async fn analyze(
        &self,
        ticker: &str,
        as_of: NaiveDate,
    ) -> Result<Option<ScoringResult>, AnalysisError>;
}

/// Optional Stage-2 validator consumed by the Kelly sizer. Callers must
/// tolerate errors here and fall back to the technical position size.
#[async_trait]
pub trait Stage2Validator: Send + Sync {
    async fn analyze(&self, ticker: &str) -> Result<Stage2Assessment, AnalysisError>;
}

use serde::{Deserialize, Serialize};

/// Layered sub-scores produced by the external scoring/pattern-recognition
/// system. `structural`, `micro` and `macro` are on a 0-100 scale each;
/// `total_score` is the system's own blended figure and is not required to
/// equal any fixed combination of the three.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LayerScores {
    pub structural: f64,
    pub micro: f64,
    pub macro_: f64,
}

/// Output of the scoring collaborator for one ticker on one trading day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    pub ticker: String,
    pub total_score: f64,
    pub layer_scores: LayerScores,
}

/// Stage-2 (e.g. LLM-based) recommendation returned by the optional
/// external validator consumed by the Kelly sizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Avoid,
}

/// Output of the Stage-2 validator collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage2Assessment {
    pub confidence: f64,
    pub recommendation: Recommendation,
    /// Multiplier applied to the technical position size; callers must clamp
    /// this to `[0.5, 1.5]` themselves, the collaborator is not trusted to.
    pub position_adjustment: f64,
}

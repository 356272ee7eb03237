//! Piecewise-linear scoring curves and severity levels.
//!
//! Every scan domain maps one signal (days since a visit, days overdue, stock
//! depletion, ...) onto a continuous 0–100 score through the same curve shape:
//! contiguous bands, linear interpolation inside each band, saturation past the
//! last band, optional flat bonuses keyed on a secondary value. The level is
//! always derived from the final rounded score.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use opsradar_core::DomainError;

pub const MAX_SCORE: f64 = 100.0;

/// Discrete severity derived from a score.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// ≥80 critical, ≥60 high, ≥40 medium, else low.
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => RiskLevel::Critical,
            60..=79 => RiskLevel::High,
            40..=59 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// High and critical findings fan out to the action queue.
    pub fn is_severe(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }

    /// Urgency of the companion action-queue item, if one is warranted.
    pub fn action_urgency(&self) -> Option<u8> {
        match self {
            RiskLevel::Critical => Some(90),
            RiskLevel::High => Some(70),
            RiskLevel::Medium | RiskLevel::Low => None,
        }
    }
}

impl core::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(DomainError::unknown_variant("risk level", other)),
        }
    }
}

/// One segment of a curve: `[start, end)` on the signal maps linearly onto
/// `[score_start, score_end)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Band {
    pub start: f64,
    pub end: f64,
    pub score_start: f64,
    pub score_end: f64,
}

impl Band {
    pub const fn new(start: f64, end: f64, score_start: f64, score_end: f64) -> Self {
        Self {
            start,
            end,
            score_start,
            score_end,
        }
    }

    fn interpolate(&self, signal: f64) -> f64 {
        let width = self.end - self.start;
        if width <= 0.0 {
            return self.score_start;
        }
        let t = (signal - self.start) / width;
        self.score_start + (self.score_end - self.score_start) * t
    }
}

/// Flat addition applied when the bonus basis strictly exceeds `above`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bonus {
    pub above: f64,
    pub points: f64,
}

impl Bonus {
    pub const fn new(above: f64, points: f64) -> Self {
        Self { above, points }
    }
}

/// Score and the level derived from it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub value: u8,
    pub level: RiskLevel,
}

impl Score {
    pub fn new(value: u8) -> Self {
        let value = value.min(MAX_SCORE as u8);
        Self {
            value,
            level: RiskLevel::from_score(value),
        }
    }
}

/// Score `signal` against `bands` (contiguous, ascending).
///
/// Returns `None` below the first band's start: such entities are healthy and
/// produce no finding. Past the last band the curve saturates at the last
/// band's `score_end`. Bonuses are summed for every `Bonus` whose `above` is
/// strictly less than `bonus_basis`; the total is capped at 100.
pub fn curve_score(signal: f64, bands: &[Band], bonuses: &[Bonus], bonus_basis: f64) -> Option<Score> {
    let first = bands.first()?;
    if signal.is_nan() || signal < first.start {
        return None;
    }

    let base = bands
        .iter()
        .find(|band| signal < band.end)
        .map(|band| band.interpolate(signal))
        .unwrap_or_else(|| bands.last().map_or(MAX_SCORE, |band| band.score_end));

    let bonus: f64 = bonuses
        .iter()
        .filter(|b| bonus_basis > b.above)
        .map(|b| b.points)
        .sum();

    let total = (base + bonus).clamp(0.0, MAX_SCORE).round();
    Some(Score::new(total as u8))
}

/// A named curve: bands plus bonuses.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScoreCurve {
    pub bands: &'static [Band],
    pub bonuses: &'static [Bonus],
}

impl ScoreCurve {
    pub const fn new(bands: &'static [Band], bonuses: &'static [Bonus]) -> Self {
        Self { bands, bonuses }
    }

    /// Lowest signal that yields a finding.
    pub fn threshold(&self) -> f64 {
        self.bands.first().map_or(f64::INFINITY, |b| b.start)
    }

    pub fn score(&self, signal: f64) -> Option<Score> {
        curve_score(signal, self.bands, self.bonuses, 0.0)
    }

    pub fn score_with_basis(&self, signal: f64, bonus_basis: f64) -> Option<Score> {
        curve_score(signal, self.bands, self.bonuses, bonus_basis)
    }
}

/// Days since last store visit.
pub const STORE_CHURN_CURVE: ScoreCurve = ScoreCurve::new(
    &[
        Band::new(7.0, 14.0, 40.0, 60.0),
        Band::new(14.0, 30.0, 60.0, 85.0),
        Band::new(30.0, 60.0, 85.0, 100.0),
    ],
    &[],
);

/// Days overdue; bonus basis is the amount due in minor currency units.
pub const INVOICE_NON_PAYMENT_CURVE: ScoreCurve = ScoreCurve::new(
    &[
        Band::new(7.0, 14.0, 40.0, 60.0),
        Band::new(14.0, 30.0, 60.0, 80.0),
        Band::new(30.0, 60.0, 80.0, 100.0),
    ],
    &[Bonus::new(100_000.0, 10.0), Bonus::new(500_000.0, 10.0)],
);

/// Depletion below the reorder point: `1 - quantity / reorder_point`.
///
/// 0 is exactly at the reorder point, 0.5 is half of it, 0.75 a quarter, and
/// 1 or more means nothing is left.
pub const INVENTORY_SHORTAGE_CURVE: ScoreCurve = ScoreCurve::new(
    &[
        Band::new(0.0, 0.5, 40.0, 60.0),
        Band::new(0.5, 0.75, 60.0, 80.0),
        Band::new(0.75, 1.0, 80.0, 100.0),
    ],
    &[],
);

/// Days since the agent's last commission payout.
pub const AGENT_INACTIVITY_CURVE: ScoreCurve = ScoreCurve::new(
    &[
        Band::new(14.0, 30.0, 40.0, 70.0),
        Band::new(30.0, 60.0, 70.0, 100.0),
    ],
    &[],
);

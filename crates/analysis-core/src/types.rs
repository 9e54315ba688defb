use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One trading day of OHLCV data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceRow {
    /// All required fields present (finite). Volume is checked separately.
    pub fn is_complete(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Raw valuation snapshot as returned by a market-data provider for one day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    #[serde(rename = "PER")]
    pub per: f64,
    #[serde(rename = "PBR")]
    pub pbr: f64,
    #[serde(rename = "EPS")]
    pub eps: f64,
    #[serde(rename = "BPS")]
    pub bps: f64,
}

/// Fundamentals used by the pipeline. Serializes to `{}` when nothing was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    #[serde(rename = "PER", default, skip_serializing_if = "Option::is_none")]
    pub per: Option<f64>,
    #[serde(rename = "PBR", default, skip_serializing_if = "Option::is_none")]
    pub pbr: Option<f64>,
    #[serde(rename = "EPS", default, skip_serializing_if = "Option::is_none")]
    pub eps: Option<f64>,
    #[serde(rename = "BPS", default, skip_serializing_if = "Option::is_none")]
    pub bps: Option<f64>,
    /// Percent, derived as EPS / BPS * 100
    #[serde(rename = "ROE", default, skip_serializing_if = "Option::is_none")]
    pub roe: Option<f64>,
}

impl Fundamentals {
    pub fn is_empty(&self) -> bool {
        self.per.is_none()
            && self.pbr.is_none()
            && self.eps.is_none()
            && self.bps.is_none()
            && self.roe.is_none()
    }
}

impl From<FundamentalSnapshot> for Fundamentals {
    fn from(s: FundamentalSnapshot) -> Self {
        let roe = if s.bps != 0.0 {
            crate::stats::round_to(s.eps / s.bps * 100.0, 2)
        } else {
            0.0
        };
        Fundamentals {
            per: Some(s.per),
            pbr: Some(s.pbr),
            eps: Some(s.eps),
            bps: Some(s.bps),
            roe: Some(roe),
        }
    }
}

/// A text item from a news collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default, alias = "description")]
    pub summary: String,
}

/// Sentiment for one ticker in one run, broadcast across every feature row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    /// -1.0 to 1.0
    pub sentiment_score: f64,
    /// 0.0 to 1.0
    pub positive_ratio: f64,
    /// 0 or 1
    pub negative_surge: u8,
}

impl SentimentSnapshot {
    pub const fn neutral() -> Self {
        Self {
            sentiment_score: 0.0,
            positive_ratio: 0.5,
            negative_surge: 0,
        }
    }

    pub fn has_negative_surge(&self) -> bool {
        self.negative_surge != 0
    }
}

impl Default for SentimentSnapshot {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Engineered model inputs, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    #[serde(rename = "return_1d")]
    Return1d,
    #[serde(rename = "return_5d")]
    Return5d,
    #[serde(rename = "MA20_ratio")]
    Ma20Ratio,
    #[serde(rename = "MA60_ratio")]
    Ma60Ratio,
    #[serde(rename = "RSI14")]
    Rsi14,
    #[serde(rename = "volume_ratio")]
    VolumeRatio,
    #[serde(rename = "revenue_growth_z")]
    RevenueGrowthZ,
    #[serde(rename = "op_income_growth_z")]
    OpIncomeGrowthZ,
    #[serde(rename = "ROE_z")]
    RoeZ,
    #[serde(rename = "debt_ratio_z")]
    DebtRatioZ,
    #[serde(rename = "sentiment_score")]
    SentimentScore,
    #[serde(rename = "positive_ratio")]
    PositiveRatio,
    #[serde(rename = "negative_surge")]
    NegativeSurge,
    #[serde(rename = "MA20_sent_combo")]
    Ma20SentCombo,
}

impl Feature {
    /// Features trained on from the first generation
    pub const BASE: [Feature; 13] = [
        Feature::Return1d,
        Feature::Return5d,
        Feature::Ma20Ratio,
        Feature::Ma60Ratio,
        Feature::Rsi14,
        Feature::VolumeRatio,
        Feature::RevenueGrowthZ,
        Feature::OpIncomeGrowthZ,
        Feature::RoeZ,
        Feature::DebtRatioZ,
        Feature::SentimentScore,
        Feature::PositiveRatio,
        Feature::NegativeSurge,
    ];

    /// Combination features that self-evolution may promote
    pub const COMBO: [Feature; 1] = [Feature::Ma20SentCombo];

    pub const ALL: [Feature; 14] = [
        Feature::Return1d,
        Feature::Return5d,
        Feature::Ma20Ratio,
        Feature::Ma60Ratio,
        Feature::Rsi14,
        Feature::VolumeRatio,
        Feature::RevenueGrowthZ,
        Feature::OpIncomeGrowthZ,
        Feature::RoeZ,
        Feature::DebtRatioZ,
        Feature::SentimentScore,
        Feature::PositiveRatio,
        Feature::NegativeSurge,
        Feature::Ma20SentCombo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Return1d => "return_1d",
            Feature::Return5d => "return_5d",
            Feature::Ma20Ratio => "MA20_ratio",
            Feature::Ma60Ratio => "MA60_ratio",
            Feature::Rsi14 => "RSI14",
            Feature::VolumeRatio => "volume_ratio",
            Feature::RevenueGrowthZ => "revenue_growth_z",
            Feature::OpIncomeGrowthZ => "op_income_growth_z",
            Feature::RoeZ => "ROE_z",
            Feature::DebtRatioZ => "debt_ratio_z",
            Feature::SentimentScore => "sentiment_score",
            Feature::PositiveRatio => "positive_ratio",
            Feature::NegativeSurge => "negative_surge",
            Feature::Ma20SentCombo => "MA20_sent_combo",
        }
    }

    pub fn is_combo(&self) -> bool {
        Feature::COMBO.contains(self)
    }

    /// Position in [`Feature::ALL`], used to break ties deterministically.
    pub fn declaration_index(&self) -> usize {
        Feature::ALL.iter().position(|f| f == self).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = crate::SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| crate::SignalError::InvalidInput(format!("unknown feature '{s}'")))
    }
}

/// A price row enriched with technical, fundamental and sentiment features plus
/// the next-day label. `None` marks values that are undefined at that row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,

    pub return_1d: Option<f64>,
    pub return_5d: Option<f64>,
    pub ma20: Option<f64>,
    pub ma60: Option<f64>,
    pub ma20_ratio: Option<f64>,
    pub ma60_ratio: Option<f64>,
    pub rsi14: f64,
    pub volume_ratio: Option<f64>,

    pub roe_z: f64,
    pub op_income_growth_z: f64,
    pub revenue_growth_z: f64,
    pub debt_ratio_z: f64,

    pub sentiment_score: f64,
    pub positive_ratio: f64,
    pub negative_surge: f64,

    pub ma20_sent_combo: Option<f64>,

    pub next_return: Option<f64>,
    /// true if the next row closes higher; always `None` on the last row
    pub label: Option<bool>,
}

impl FeatureRow {
    /// Starts a row from raw prices with every derived field neutral or undefined.
    pub fn from_price(row: &PriceRow) -> Self {
        let neutral = SentimentSnapshot::neutral();
        Self {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            return_1d: None,
            return_5d: None,
            ma20: None,
            ma60: None,
            ma20_ratio: None,
            ma60_ratio: None,
            rsi14: 50.0,
            volume_ratio: None,
            roe_z: 0.0,
            op_income_growth_z: 0.5,
            revenue_growth_z: 0.5,
            debt_ratio_z: 0.5,
            sentiment_score: neutral.sentiment_score,
            positive_ratio: neutral.positive_ratio,
            negative_surge: f64::from(neutral.negative_surge),
            ma20_sent_combo: None,
            next_return: None,
            label: None,
        }
    }

    /// Value of one feature column, `None` when undefined at this row.
    pub fn feature(&self, feature: Feature) -> Option<f64> {
        let value = match feature {
            Feature::Return1d => self.return_1d,
            Feature::Return5d => self.return_5d,
            Feature::Ma20Ratio => self.ma20_ratio,
            Feature::Ma60Ratio => self.ma60_ratio,
            Feature::Rsi14 => Some(self.rsi14),
            Feature::VolumeRatio => self.volume_ratio,
            Feature::RevenueGrowthZ => Some(self.revenue_growth_z),
            Feature::OpIncomeGrowthZ => Some(self.op_income_growth_z),
            Feature::RoeZ => Some(self.roe_z),
            Feature::DebtRatioZ => Some(self.debt_ratio_z),
            Feature::SentimentScore => Some(self.sentiment_score),
            Feature::PositiveRatio => Some(self.positive_ratio),
            Feature::NegativeSurge => Some(self.negative_surge),
            Feature::Ma20SentCombo => self.ma20_sent_combo,
        };
        value.filter(|v| v.is_finite())
    }

    /// Feature vector in the given column order; `None` if any column is undefined.
    pub fn feature_vector(&self, columns: &[Feature]) -> Option<Vec<f64>> {
        columns.iter().map(|f| self.feature(*f)).collect()
    }
}

/// Final trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Hold,
    Sell,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Hold => "HOLD",
            Decision::Sell => "SELL",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

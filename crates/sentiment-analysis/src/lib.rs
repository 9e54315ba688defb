use analysis_core::stats::{mean, round_to};
use analysis_core::{NewsItem, SentimentSnapshot};
use std::collections::HashSet;

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

const NEGATION_WINDOW: usize = 3;

/// Articles scoring below this count toward a negative surge
const STRONG_NEGATIVE: f64 = -0.3;
/// Share of strongly negative articles that makes a surge
const SURGE_SHARE: f64 = 0.4;
/// Minimum number of strongly negative articles for a surge
const SURGE_MIN_COUNT: usize = 2;

/// Keyword-based scorer turning news text into a bounded [`SentimentSnapshot`].
pub struct SentimentScorer {
    positive_words: HashSet<&'static str>,
    negative_words: HashSet<&'static str>,
    negation_words: HashSet<&'static str>,
}

impl Default for SentimentScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer {
    pub fn new() -> Self {
        Self {
            positive_words: [
                "bullish", "rally", "surge", "gain", "profit", "growth", "beat",
                "upgrade", "outperform", "strong", "positive", "rise", "increase",
                "breakthrough", "innovation", "success", "exceed", "momentum",
                "optimistic", "record", "advance", "rebound", "recovery",
                // Financial-specific terms
                "dividend", "buyback", "repurchase", "accretive", "upside",
                "expansion", "robust", "accelerating", "overweight", "raised",
                "upgraded", "outpacing", "tailwind", "undervalued", "contract",
                "order", "turnaround", "profitable",
            ]
            .into_iter()
            .collect(),
            negative_words: [
                "bearish", "decline", "loss", "fall", "plunge", "crash", "miss",
                "downgrade", "underperform", "weak", "negative", "drop", "decrease",
                "concern", "risk", "fail", "disappoint", "slump", "warning",
                "pessimistic", "retreat", "fear", "trouble", "deficit",
                // Financial-specific terms
                "dilution", "dilutive", "headwind", "lawsuit", "litigation",
                "recall", "investigation", "probe", "default", "bankruptcy",
                "restructuring", "layoff", "downside", "overvalued", "bubble",
                "underweight", "lowered", "suspended", "sanction", "cancelled",
            ]
            .into_iter()
            .collect(),
            negation_words: NEGATION_WORDS.iter().copied().collect(),
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| {
                c.is_whitespace() || matches!(c, ',' | ';' | '.' | '!' | '?' | ':' | '"' | '(' | ')')
            })
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Scores one text in [-1, 1]: `(pos - neg) / (pos + neg)`, 0 with no hits.
    /// A lexicon hit preceded by a negation within three words flips polarity.
    pub fn score_text(&self, text: &str) -> f64 {
        let words = Self::tokenize(text);

        let negation_positions: Vec<usize> = words
            .iter()
            .enumerate()
            .filter(|(_, w)| self.negation_words.contains(w.as_str()))
            .map(|(i, _)| i)
            .collect();

        let mut positive = 0u32;
        let mut negative = 0u32;

        for (i, word) in words.iter().enumerate() {
            let is_positive = self.positive_words.contains(word.as_str());
            let is_negative = self.negative_words.contains(word.as_str());
            if !is_positive && !is_negative {
                continue;
            }

            let negated = negation_positions
                .iter()
                .any(|&neg_pos| neg_pos < i && (i - neg_pos) <= NEGATION_WINDOW);

            if is_positive != negated {
                positive += 1;
            } else {
                negative += 1;
            }
        }

        let total = positive + negative;
        if total == 0 {
            return 0.0;
        }
        round_to((positive as f64 - negative as f64) / total as f64, 3)
    }

    /// Reduces a set of articles to one snapshot; no articles is neutral.
    pub fn score_articles(&self, articles: &[NewsItem]) -> SentimentSnapshot {
        if articles.is_empty() {
            return SentimentSnapshot::neutral();
        }

        let scores: Vec<f64> = articles
            .iter()
            .map(|a| self.score_text(&format!("{} {}", a.title, a.summary)))
            .collect();

        let n = scores.len();
        let strongly_negative = scores.iter().filter(|s| **s < STRONG_NEGATIVE).count();
        let positive = scores.iter().filter(|s| **s > 0.0).count();
        let surge_floor = (SURGE_MIN_COUNT as f64).max(n as f64 * SURGE_SHARE);

        let snapshot = SentimentSnapshot {
            sentiment_score: round_to(mean(&scores), 3).clamp(-1.0, 1.0),
            positive_ratio: round_to(positive as f64 / n as f64, 3),
            negative_surge: u8::from(strongly_negative as f64 >= surge_floor),
        };

        tracing::debug!(
            "Scored {} articles: score={:.3} positive_ratio={:.3} surge={}",
            n,
            snapshot.sentiment_score,
            snapshot.positive_ratio,
            snapshot.negative_surge
        );
        snapshot
    }
}

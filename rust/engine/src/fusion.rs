//! Cross-source decision policy.
//!
//! Given whatever the two feeds delivered for one hand, decide the single
//! authoritative classification. Disagreement and missing data are ordinary
//! outcomes carried in the [`FusedResult`], never errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::HandResult;
use crate::errors::InferredError;
use crate::hand::HandRankCategory;
use crate::record::TableId;

pub const DEFAULT_SECONDARY_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandKey {
    pub table_id: TableId,
    pub hand_number: u32,
}

impl HandKey {
    pub fn new(table_id: impl Into<TableId>, hand_number: u32) -> Self {
        Self {
            table_id: table_id.into(),
            hand_number,
        }
    }
}

impl std::fmt::Display for HandKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.table_id, self.hand_number)
    }
}

/// Video-derived observation, consumed as delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredResult {
    pub table_id: TableId,
    pub hand_number: u32,
    /// `None` when the video model saw the hand but could not name a class
    pub category: Option<HandRankCategory>,
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
}

impl InferredResult {
    pub fn new(
        table_id: impl Into<TableId>,
        hand_number: u32,
        category: Option<HandRankCategory>,
        confidence: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, InferredError> {
        let result = Self {
            table_id: table_id.into(),
            hand_number,
            category,
            confidence,
            observed_at,
        };
        result.validate()?;
        Ok(result)
    }

    /// Deserialized records bypass [`InferredResult::new`]; check them here.
    pub fn validate(&self) -> Result<(), InferredError> {
        if (0.0..=1.0).contains(&self.confidence) {
            Ok(())
        } else {
            Err(InferredError::InvalidConfidence(self.confidence))
        }
    }

    pub fn key(&self) -> HandKey {
        HandKey::new(self.table_id.clone(), self.hand_number)
    }
}

impl HandResult {
    pub fn key(&self) -> HandKey {
        HandKey::new(self.table_id.clone(), self.hand_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Primary,
    Secondary,
    None,
}

/// How the hand left the waiting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Counterpart arrived inside the match window
    Matched,
    /// Window elapsed with one source only
    WindowExpired,
    /// Counterpart feed already known stale, no wait
    SourceStale,
    /// Resolved while shutting down or reaping the table
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionOutcome {
    CrossValidated,
    Ambiguous,
    PrimaryOnly,
    SecondaryFallback,
    ManualRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub table_id: TableId,
    pub hand_number: u32,
    /// `None` only when the hand needs manual classification
    pub category: Option<HandRankCategory>,
    pub source: SourceTag,
    pub cross_validated: bool,
    pub requires_review: bool,
    pub duration_seconds: Option<u32>,
    pub board_category: Option<HandRankCategory>,
    pub confidence: f64,
    pub outcome: FusionOutcome,
    pub resolution: Resolution,
}

impl FusedResult {
    pub fn key(&self) -> HandKey {
        HandKey::new(self.table_id.clone(), self.hand_number)
    }

    pub fn is_premium(&self) -> bool {
        self.category.is_some_and(HandRankCategory::is_premium)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionPolicy {
    pub secondary_confidence_threshold: f64,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            secondary_confidence_threshold: DEFAULT_SECONDARY_THRESHOLD,
        }
    }
}

impl FusionPolicy {
    pub fn new(secondary_confidence_threshold: f64) -> Self {
        Self {
            secondary_confidence_threshold,
        }
    }

    /// Applies the decision table to whatever is present for `key`.
    ///
    /// | primary | secondary | agree | result                                   |
    /// |---------|-----------|-------|------------------------------------------|
    /// | yes     | yes       | yes   | primary, cross-validated                 |
    /// | yes     | yes       | no    | primary, review                          |
    /// | yes     | no        | -     | primary                                  |
    /// | no      | yes       | -     | secondary + review if confident enough   |
    /// | no      | no        | -     | none, manual classification              |
    ///
    /// A secondary without a category estimate is treated as absent.
    pub fn decide(
        &self,
        key: &HandKey,
        primary: Option<&HandResult>,
        secondary: Option<&InferredResult>,
        resolution: Resolution,
    ) -> FusedResult {
        let estimate = secondary.and_then(|s| s.category.map(|c| (c, s.confidence)));

        if let Some(p) = primary {
            let outcome = match estimate {
                Some((c, _)) if c == p.category => FusionOutcome::CrossValidated,
                Some(_) => FusionOutcome::Ambiguous,
                None => FusionOutcome::PrimaryOnly,
            };
            return FusedResult {
                table_id: key.table_id.clone(),
                hand_number: key.hand_number,
                category: Some(p.category),
                source: SourceTag::Primary,
                cross_validated: outcome == FusionOutcome::CrossValidated,
                requires_review: outcome == FusionOutcome::Ambiguous,
                duration_seconds: p.duration_seconds,
                board_category: p.board_category,
                confidence: p.confidence,
                outcome,
                resolution,
            };
        }

        match estimate {
            Some((category, confidence)) if confidence >= self.secondary_confidence_threshold => {
                FusedResult {
                    table_id: key.table_id.clone(),
                    hand_number: key.hand_number,
                    category: Some(category),
                    source: SourceTag::Secondary,
                    cross_validated: false,
                    requires_review: true,
                    duration_seconds: None,
                    board_category: None,
                    confidence,
                    outcome: FusionOutcome::SecondaryFallback,
                    resolution,
                }
            }
            _ => Self::manual(key, resolution),
        }
    }

    /// Terminal record for a hand nobody could classify.
    pub fn manual(key: &HandKey, resolution: Resolution) -> FusedResult {
        FusedResult {
            table_id: key.table_id.clone(),
            hand_number: key.hand_number,
            category: None,
            source: SourceTag::None,
            cross_validated: false,
            requires_review: true,
            duration_seconds: None,
            board_category: None,
            confidence: 0.0,
            outcome: FusionOutcome::ManualRequired,
            resolution,
        }
    }
}

/// Running counters of fusion outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    pub total: u64,
    pub cross_validated: u64,
    pub primary_only: u64,
    pub review_flagged: u64,
    pub secondary_fallback: u64,
    pub undetected: u64,
}

impl FusionStats {
    pub fn record(&mut self, result: &FusedResult) {
        self.total += 1;
        match result.outcome {
            FusionOutcome::CrossValidated => self.cross_validated += 1,
            FusionOutcome::Ambiguous => self.review_flagged += 1,
            FusionOutcome::PrimaryOnly => self.primary_only += 1,
            FusionOutcome::SecondaryFallback => self.secondary_fallback += 1,
            FusionOutcome::ManualRequired => self.undetected += 1,
        }
    }

    pub fn merge(&mut self, other: &FusionStats) {
        self.total += other.total;
        self.cross_validated += other.cross_validated;
        self.primary_only += other.primary_only;
        self.review_flagged += other.review_flagged;
        self.secondary_fallback += other.secondary_fallback;
        self.undetected += other.undetected;
    }

    fn rate(&self, count: u64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64
        }
    }

    pub fn cross_validation_rate(&self) -> f64 {
        self.rate(self.cross_validated)
    }

    pub fn secondary_fallback_rate(&self) -> f64 {
        self.rate(self.secondary_fallback)
    }

    pub fn undetected_rate(&self) -> f64 {
        self.rate(self.undetected)
    }
}

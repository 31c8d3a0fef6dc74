use serde::{Deserialize, Serialize};

use crate::fusion::FusedResult;

pub const DEFAULT_MIN_DURATION_SECONDS: u32 = 120;
/// Three of a kind or better on the board alone.
pub const DEFAULT_BOARD_CATEGORY_MAX: u8 = 7;
/// Full house or better.
pub const DEFAULT_PREMIUM_CATEGORY_MAX: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingThresholds {
    pub min_duration_seconds: u32,
    pub board_category_max: u8,
    pub premium_category_max: u8,
}

impl Default for GradingThresholds {
    fn default() -> Self {
        Self {
            min_duration_seconds: DEFAULT_MIN_DURATION_SECONDS,
            board_category_max: DEFAULT_BOARD_CATEGORY_MAX,
            premium_category_max: DEFAULT_PREMIUM_CATEGORY_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    C,
    B,
    A,
}

impl Grade {
    pub fn from_criteria(met: u8) -> Self {
        match met {
            3..=u8::MAX => Grade::A,
            2 => Grade::B,
            _ => Grade::C,
        }
    }

    pub fn is_broadcast_eligible(self) -> bool {
        matches!(self, Grade::A | Grade::B)
    }

    pub fn description(self) -> &'static str {
        match self {
            Grade::A => "Highest priority - all conditions met",
            Grade::B => "Broadcast eligible - 2 conditions met",
            Grade::C => "Archive only - insufficient conditions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    pub grade: Grade,
    pub broadcast_eligible: bool,
    pub criteria_met: u8,
    pub premium_hand: bool,
    pub long_playtime: bool,
    pub connected_board: bool,
    /// Suggested clip start, seconds after the hand began
    pub edit_offset_seconds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInput {
    Category,
    Duration,
    BoardStrength,
}

/// Grader verdict. `Incomplete` keeps a partial result computed from the known
/// criteria only, so it never overstates the hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Grading {
    Complete(GradeResult),
    Incomplete {
        partial: GradeResult,
        missing: Vec<MissingInput>,
    },
}

impl Grading {
    pub fn result(&self) -> &GradeResult {
        match self {
            Grading::Complete(r) => r,
            Grading::Incomplete { partial, .. } => partial,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Grading::Complete(_))
    }
}

/// Grades a fused hand on three criteria: premium category, long playtime and
/// a connected board.
///
/// # Examples
///
/// ```
/// use handfuse_engine::fusion::{FusionPolicy, HandKey, Resolution};
/// use handfuse_engine::grade::{grade, Grade, GradingThresholds};
///
/// // Nothing arrived at all: manual review, still graded without panicking.
/// let fused = FusionPolicy::manual(&HandKey::new("t1", 4), Resolution::WindowExpired);
/// let grading = grade(&fused, &GradingThresholds::default());
/// assert!(!grading.is_complete());
/// assert_eq!(grading.result().grade, Grade::C);
/// ```
pub fn grade(fused: &FusedResult, thresholds: &GradingThresholds) -> Grading {
    let premium = fused
        .category
        .map(|c| c.value() <= thresholds.premium_category_max);
    let long_play = fused
        .duration_seconds
        .map(|d| d >= thresholds.min_duration_seconds);
    let board = fused
        .board_category
        .map(|c| c.value() <= thresholds.board_category_max);

    let premium_hand = premium.unwrap_or(false);
    let long_playtime = long_play.unwrap_or(false);
    let connected_board = board.unwrap_or(false);
    let criteria_met = [premium_hand, long_playtime, connected_board]
        .iter()
        .filter(|&&c| c)
        .count() as u8;
    let grade = Grade::from_criteria(criteria_met);

    let result = GradeResult {
        grade,
        broadcast_eligible: grade.is_broadcast_eligible(),
        criteria_met,
        premium_hand,
        long_playtime,
        connected_board,
        edit_offset_seconds: edit_offset(premium_hand, fused.duration_seconds.unwrap_or(0)),
    };

    let mut missing = Vec::new();
    if premium.is_none() {
        missing.push(MissingInput::Category);
    }
    if long_play.is_none() {
        missing.push(MissingInput::Duration);
    }
    if board.is_none() {
        missing.push(MissingInput::BoardStrength);
    }

    if missing.is_empty() {
        Grading::Complete(result)
    } else {
        Grading::Incomplete {
            partial: result,
            missing,
        }
    }
}

/// Premium hands start from the top to show the build-up; long hands skip
/// early action.
fn edit_offset(premium: bool, duration_seconds: u32) -> u32 {
    if premium {
        0
    } else if duration_seconds > 180 {
        (u64::from(duration_seconds) * 2 / 5) as u32
    } else if duration_seconds > 60 {
        (duration_seconds / 3).min(30)
    } else {
        0
    }
}

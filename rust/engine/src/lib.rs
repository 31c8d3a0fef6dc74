//! # handfuse-engine: Hand Reconciliation Core
//!
//! Pure, deterministic building blocks for reconciling two observations of the
//! same live hand: an authoritative card-reader feed and a lower-confidence
//! video feed. Nothing in this crate blocks, spawns or logs; it computes.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Suit, Rank, Card) and feed token parsing
//! - [`hand`] - Seven-card evaluation into a 1..=7462 strength and ten categories
//! - [`record`] - Structured-feed hand record (players, ordered board events)
//! - [`classifier`] - Primary classification, one result per rankable player
//! - [`fusion`] - Cross-source decision policy and outcome statistics
//! - [`grade`] - A/B/C grading and broadcast eligibility
//! - [`errors`] - Error types for evaluation and parsing
//!
//! ## Quick Start
//!
//! ```rust
//! use handfuse_engine::classifier::classify;
//! use handfuse_engine::fusion::{FusionPolicy, Resolution};
//! use handfuse_engine::grade::{grade, Grade, GradingThresholds};
//! use handfuse_engine::record::{FeedEvent, HandRecord, SeatRecord};
//!
//! let record = HandRecord {
//!     table_id: "feature".into(),
//!     hand_number: 12,
//!     started_at: None,
//!     duration_seconds: Some(150),
//!     players: vec![SeatRecord {
//!         seat: 1,
//!         name: "alice".into(),
//!         hole_cards: vec!["9h".into(), "9d".into()],
//!         start_stack: 10_000,
//!         end_stack: 14_000,
//!     }],
//!     events: vec![FeedEvent::BoardCard {
//!         cards: vec!["9c".into(), "9s".into(), "2h".into(), "5h".into(), "Kh".into()],
//!     }],
//! };
//!
//! let classification = classify(&record);
//! let best = classification.best().expect("ranked player");
//! let fused = FusionPolicy::default().decide(&best.key(), Some(best), None, Resolution::WindowExpired);
//! let verdict = grade(&fused, &GradingThresholds::default());
//! assert_eq!(verdict.result().grade, Grade::B);
//! ```

pub mod cards;
pub mod classifier;
pub mod errors;
pub mod fusion;
pub mod grade;
pub mod hand;
pub mod record;

pub use cards::{Card, Rank, Suit};
pub use classifier::{classify, Classification, HandResult, SkipReason, SkippedPlayer};
pub use errors::{CardError, EvalError, InferredError, InputProblem};
pub use fusion::{
    FusedResult, FusionOutcome, FusionPolicy, FusionStats, HandKey, InferredResult, Resolution,
    SourceTag,
};
pub use grade::{grade, Grade, GradeResult, Grading, GradingThresholds, MissingInput};
pub use hand::{evaluate, evaluate_partial, Evaluation, HandRankCategory, Strength};
pub use record::{FeedEvent, HandRecord, SeatRecord, TableId};

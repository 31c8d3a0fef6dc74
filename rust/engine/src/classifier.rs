//! Primary classification: one structured-feed hand in, one [`HandResult`]
//! per player whose cards can be ranked.

use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::errors::{CardError, EvalError};
use crate::hand::{evaluate, evaluate_partial, HandRankCategory, Strength};
use crate::record::{HandRecord, TableId};

/// Number of community cards used for ranking; later runouts are ignored.
pub const BOARD_CARDS_USED: usize = 5;
/// Minimum dealt community cards before a player can be ranked.
pub const MIN_BOARD_CARDS: usize = 3;

/// Authoritative per-player observation from the structured feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandResult {
    pub table_id: TableId,
    pub hand_number: u32,
    pub player: String,
    pub seat: u8,
    pub hole_cards: [Card; 2],
    /// Board used for ranking, 3 to 5 cards in reveal order
    pub community_cards: Vec<Card>,
    pub strength: Strength,
    pub category: HandRankCategory,
    /// Always 1.0 for card-reader data
    pub confidence: f64,
    pub duration_seconds: Option<u32>,
    /// Category of the board on its own, known once all five cards are out
    pub board_category: Option<HandRankCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Folded before showdown or cards never read
    NoHoleCards,
    /// More than two hole cards reported for one seat
    TooManyHoleCards { count: usize },
    IncompleteBoard { known: usize },
    MalformedCard { token: String },
    InvalidHand { detail: String },
}

/// A player (or board card, when `player` is `None`) left out of the results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPlayer {
    pub player: Option<String>,
    pub seat: Option<u8>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub results: Vec<HandResult>,
    pub skipped: Vec<SkippedPlayer>,
}

impl Classification {
    /// Strongest ranked player; ties go to the lower seat.
    pub fn best(&self) -> Option<&HandResult> {
        self.results
            .iter()
            .min_by_key(|r| (r.strength.value(), r.seat))
    }
}

/// Classifies every player in `record`.
///
/// Never fails as a whole: a malformed token or an unrankable card set only
/// drops the player it belongs to, and the reason is reported in
/// [`Classification::skipped`] for the caller to log.
pub fn classify(record: &HandRecord) -> Classification {
    let mut out = Classification::default();

    let mut board = Vec::with_capacity(BOARD_CARDS_USED);
    for token in record.board_tokens() {
        match token.parse::<Card>() {
            Ok(card) => board.push(card),
            Err(CardError::MalformedCard { token }) => out.skipped.push(SkippedPlayer {
                player: None,
                seat: None,
                reason: SkipReason::MalformedCard { token },
            }),
        }
    }
    board.truncate(BOARD_CARDS_USED);

    let board_category = if board.len() == BOARD_CARDS_USED {
        evaluate_partial(&board).ok().map(|e| e.category)
    } else {
        None
    };

    for seat in &record.players {
        let skip = |reason| SkippedPlayer {
            player: Some(seat.name.clone()),
            seat: Some(seat.seat),
            reason,
        };

        let tokens = seat.hole_tokens();
        if tokens.len() < 2 {
            out.skipped.push(skip(SkipReason::NoHoleCards));
            continue;
        }
        if tokens.len() > 2 {
            out.skipped.push(skip(SkipReason::TooManyHoleCards {
                count: tokens.len(),
            }));
            continue;
        }
        if board.len() < MIN_BOARD_CARDS {
            out.skipped.push(skip(SkipReason::IncompleteBoard { known: board.len() }));
            continue;
        }

        let hole = match parse_hole(&tokens) {
            Ok(hole) => hole,
            Err(CardError::MalformedCard { token }) => {
                out.skipped.push(skip(SkipReason::MalformedCard { token }));
                continue;
            }
        };

        match rank(&hole, &board) {
            Ok((strength, category)) => out.results.push(HandResult {
                table_id: record.table_id.clone(),
                hand_number: record.hand_number,
                player: seat.name.clone(),
                seat: seat.seat,
                hole_cards: hole,
                community_cards: board.clone(),
                strength,
                category,
                confidence: 1.0,
                duration_seconds: record.duration_seconds,
                board_category,
            }),
            Err(err) => out.skipped.push(skip(SkipReason::InvalidHand {
                detail: err.to_string(),
            })),
        }
    }

    out
}

// Callers pass exactly two tokens.
fn parse_hole(tokens: &[&str]) -> Result<[Card; 2], CardError> {
    Ok([tokens[0].parse()?, tokens[1].parse()?])
}

fn rank(hole: &[Card; 2], board: &[Card]) -> Result<(Strength, HandRankCategory), EvalError> {
    let mut cards = Vec::with_capacity(7);
    cards.extend_from_slice(hole);
    cards.extend_from_slice(board);
    let eval = if cards.len() == 7 {
        evaluate(&cards)?
    } else {
        evaluate_partial(&cards)?
    };
    Ok((eval.strength, eval.category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FeedEvent, SeatRecord};

    fn seat(n: u8, name: &str, cards: &[&str]) -> SeatRecord {
        SeatRecord {
            seat: n,
            name: name.into(),
            hole_cards: cards.iter().map(|c| c.to_string()).collect(),
            start_stack: 1000,
            end_stack: 1000,
        }
    }

    fn record(board: &[&str], players: Vec<SeatRecord>) -> HandRecord {
        HandRecord {
            table_id: "t1".into(),
            hand_number: 42,
            started_at: None,
            duration_seconds: Some(95),
            players,
            events: board
                .iter()
                .map(|c| FeedEvent::BoardCard {
                    cards: vec![c.to_string()],
                })
                .collect(),
        }
    }

    #[test]
    fn flop_only_hand_is_ranked_from_five_cards() {
        let rec = record(&["Ah", "Ad", "7c"], vec![seat(1, "a", &["As", "Kd"])]);
        let out = classify(&rec);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].category, HandRankCategory::ThreeOfAKind);
        assert_eq!(out.results[0].board_category, None);
        assert_eq!(out.results[0].confidence, 1.0);
    }

    #[test]
    fn extra_board_cards_beyond_five_are_ignored() {
        let rec = record(
            &["2c", "7d", "9h", "Js", "4c", "Ac"],
            vec![seat(1, "a", &["Ad", "Kd"])],
        );
        let out = classify(&rec);
        assert_eq!(out.results[0].community_cards.len(), 5);
        assert_eq!(out.results[0].category, HandRankCategory::HighCard);
    }

    #[test]
    fn bad_hole_card_skips_only_that_player() {
        let rec = record(
            &["2c", "7d", "9h", "Js", "4c"],
            vec![seat(1, "bad", &["Zz", "Kd"]), seat(2, "good", &["9c", "9d"])],
        );
        let out = classify(&rec);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].player, "good");
        assert_eq!(
            out.skipped[0].reason,
            SkipReason::MalformedCard { token: "Zz".into() }
        );
    }

    #[test]
    fn duplicate_cards_are_reported_as_invalid_hand() {
        let rec = record(&["2c", "7d", "9h"], vec![seat(1, "dup", &["2c", "Kd"])]);
        let out = classify(&rec);
        assert!(out.results.is_empty());
        assert!(matches!(out.skipped[0].reason, SkipReason::InvalidHand { .. }));
    }

    #[test]
    fn best_prefers_lower_strength_then_lower_seat() {
        let rec = record(
            &["2c", "7d", "9h", "Js", "4c"],
            vec![
                seat(3, "pair", &["9c", "Ad"]),
                seat(1, "trips", &["9d", "9s"]),
                seat(2, "trips_too", &["Jd", "Jc"]),
            ],
        );
        let out = classify(&rec);
        assert_eq!(out.best().map(|r| r.player.as_str()), Some("trips_too"));
    }
}

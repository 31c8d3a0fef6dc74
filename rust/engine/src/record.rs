use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TableId = String;

/// One hand as delivered by the structured (card-reader) feed.
///
/// Records arrive already parsed from the ingestion side; community cards are
/// not stored directly but derived from the ordered `BoardCard` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandRecord {
    /// Table or session identifier the hand was dealt on
    pub table_id: TableId,
    /// Hand number within the session
    pub hand_number: u32,
    /// When the hand started (UTC)
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Total play time of the hand, when the feed reports it
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    /// Seated players with whatever hole cards were read
    #[serde(default)]
    pub players: Vec<SeatRecord>,
    /// Chronological event list
    #[serde(default)]
    pub events: Vec<FeedEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRecord {
    pub seat: u8,
    pub name: String,
    /// Raw card tokens; the feed sometimes packs both into one `"10d 9d"` token
    #[serde(default)]
    pub hole_cards: Vec<String>,
    #[serde(default)]
    pub start_stack: i64,
    #[serde(default)]
    pub end_stack: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    BoardCard {
        cards: Vec<String>,
    },
    Action {
        player: String,
        action: String,
        #[serde(default)]
        amount: u64,
    },
    #[serde(other)]
    Other,
}

impl SeatRecord {
    pub fn hole_tokens(&self) -> Vec<&str> {
        self.hole_cards
            .iter()
            .flat_map(|t| t.split_whitespace())
            .collect()
    }

    pub fn net(&self) -> i64 {
        self.end_stack - self.start_stack
    }
}

impl HandRecord {
    /// Board tokens in the order they were revealed.
    pub fn board_tokens(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FeedEvent::BoardCard { cards } => Some(cards),
                _ => None,
            })
            .flatten()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Player with the largest positive stack change, if anyone won chips.
    pub fn winner(&self) -> Option<&str> {
        self.players
            .iter()
            .filter(|p| p.net() > 0)
            .max_by_key(|p| p.net())
            .map(|p| p.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(cards: &[&str]) -> FeedEvent {
        FeedEvent::BoardCard {
            cards: cards.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn board_tokens_follow_event_order() {
        let record = HandRecord {
            table_id: "t1".into(),
            hand_number: 1,
            started_at: None,
            duration_seconds: None,
            players: vec![],
            events: vec![
                board(&["9c"]),
                FeedEvent::Action {
                    player: "a".into(),
                    action: "bet".into(),
                    amount: 100,
                },
                board(&["2d", "", "Kh"]),
                FeedEvent::Other,
                board(&["As"]),
            ],
        };
        assert_eq!(record.board_tokens(), vec!["9c", "2d", "Kh", "As"]);
    }

    #[test]
    fn hole_tokens_split_packed_string() {
        let seat = SeatRecord {
            seat: 1,
            name: "p".into(),
            hole_cards: vec!["10d 9d".into()],
            start_stack: 0,
            end_stack: 0,
        };
        assert_eq!(seat.hole_tokens(), vec!["10d", "9d"]);
    }

    #[test]
    fn deserializes_unknown_event_kinds() {
        let json = r#"{
            "table_id": "feature",
            "hand_number": 7,
            "events": [
                {"kind": "board_card", "cards": ["Ah"]},
                {"kind": "pot_update", "pot": 1200}
            ]
        }"#;
        let record: HandRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(record.events.len(), 2);
        assert_eq!(record.events[1], FeedEvent::Other);
        assert!(record.players.is_empty());
    }

    #[test]
    fn winner_is_largest_gain() {
        let seat = |name: &str, start: i64, end: i64| SeatRecord {
            seat: 0,
            name: name.into(),
            hole_cards: vec![],
            start_stack: start,
            end_stack: end,
        };
        let mut record = HandRecord {
            table_id: "t".into(),
            hand_number: 1,
            started_at: None,
            duration_seconds: None,
            players: vec![seat("a", 100, 50), seat("b", 100, 180), seat("c", 100, 120)],
            events: vec![],
        };
        assert_eq!(record.winner(), Some("b"));
        record.players = vec![seat("a", 100, 100)];
        assert_eq!(record.winner(), None);
    }
}

use handfuse_engine::classifier::{classify, SkipReason};
use handfuse_engine::hand::HandRankCategory;
use handfuse_engine::record::{FeedEvent, HandRecord, SeatRecord};

fn seat(n: u8, name: &str, cards: &[&str]) -> SeatRecord {
    SeatRecord {
        seat: n,
        name: name.into(),
        hole_cards: cards.iter().map(|c| c.to_string()).collect(),
        start_stack: 5_000,
        end_stack: 5_000,
    }
}

fn board_event(cards: &[&str]) -> FeedEvent {
    FeedEvent::BoardCard {
        cards: cards.iter().map(|c| c.to_string()).collect(),
    }
}

#[test]
fn community_cards_follow_reveal_order() {
    let record = HandRecord {
        table_id: "feature".into(),
        hand_number: 3,
        started_at: None,
        duration_seconds: Some(130),
        players: vec![seat(1, "alice", &["Ah", "Ad"])],
        events: vec![
            board_event(&["Kd", "7s", "2c"]),
            FeedEvent::Action {
                player: "alice".into(),
                action: "bet".into(),
                amount: 500,
            },
            board_event(&["Jd"]),
            board_event(&["Ac"]),
        ],
    };
    let out = classify(&record);
    let result = &out.results[0];
    let board: Vec<String> = result.community_cards.iter().map(|c| c.to_string()).collect();
    assert_eq!(board, vec!["Kd", "7s", "2c", "Jd", "Ac"]);
    assert_eq!(result.category, HandRankCategory::ThreeOfAKind);
    assert_eq!(result.duration_seconds, Some(130));
    assert_eq!(result.board_category, Some(HandRankCategory::HighCard));
}

#[test]
fn folded_and_preflop_players_are_silently_skipped() {
    let record = HandRecord {
        table_id: "t2".into(),
        hand_number: 9,
        started_at: None,
        duration_seconds: None,
        players: vec![
            seat(1, "folded", &[]),
            seat(2, "half", &["Ah"]),
            seat(3, "packed", &["10d 9d"]),
        ],
        events: vec![board_event(&["Td", "9c"])],
    };
    let out = classify(&record);
    assert!(out.results.is_empty());
    assert_eq!(out.skipped.len(), 3);
    assert_eq!(out.skipped[0].reason, SkipReason::NoHoleCards);
    assert_eq!(out.skipped[1].reason, SkipReason::NoHoleCards);
    assert_eq!(out.skipped[2].reason, SkipReason::IncompleteBoard { known: 2 });
}

#[test]
fn malformed_board_card_is_dropped_and_reported() {
    let record = HandRecord {
        table_id: "t3".into(),
        hand_number: 1,
        started_at: None,
        duration_seconds: None,
        players: vec![seat(1, "p", &["Qs", "Qh"])],
        events: vec![board_event(&["Qd", "x9", "4c", "8h"])],
    };
    let out = classify(&record);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].community_cards.len(), 3);
    assert_eq!(out.skipped[0].player, None);
    assert_eq!(
        out.skipped[0].reason,
        SkipReason::MalformedCard { token: "x9".into() }
    );
}

#[test]
fn connected_board_is_recorded_for_every_player() {
    let record = HandRecord {
        table_id: "t4".into(),
        hand_number: 77,
        started_at: None,
        duration_seconds: Some(60),
        players: vec![seat(1, "a", &["2c", "3d"]), seat(2, "b", &["Kc", "Kd"])],
        events: vec![board_event(&["7h", "7d", "7c", "Jh", "Qs"])],
    };
    let out = classify(&record);
    assert_eq!(out.results.len(), 2);
    for r in &out.results {
        assert_eq!(r.board_category, Some(HandRankCategory::ThreeOfAKind));
    }
    let best = out.best().expect("best");
    assert_eq!(best.player, "b");
    assert_eq!(best.category, HandRankCategory::FullHouse);
}

#[test]
fn seat_with_extra_hole_cards_is_reported_not_ranked() {
    let record = HandRecord {
        table_id: "t3".into(),
        hand_number: 14,
        started_at: None,
        duration_seconds: Some(60),
        players: vec![
            seat(1, "extra", &["Ah", "Ad", "Kc"]),
            seat(2, "ok", &["Qs", "Qh"]),
        ],
        events: vec![board_event(&["Kd", "7s", "2c"])],
    };
    let out = classify(&record);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].player, "ok");
    assert_eq!(out.skipped.len(), 1);
    assert_eq!(out.skipped[0].player.as_deref(), Some("extra"));
    assert_eq!(out.skipped[0].reason, SkipReason::TooManyHoleCards { count: 3 });
}

use std::time::Duration;

use handfuse_engine::record::{FeedEvent, HandRecord, SeatRecord};
use handfuse_pipeline::logging::init_test_logging;
use handfuse_pipeline::{Pipeline, PipelineConfig};
use tracing::Level;

#[tokio::test(start_paused = true)]
async fn malformed_card_is_logged_and_other_players_continue() {
    let logs = init_test_logging();
    let pipeline =
        Pipeline::start(PipelineConfig::new(Duration::from_secs(3), Duration::from_secs(30)))
            .unwrap();

    let record = HandRecord {
        table_id: "t7".into(),
        hand_number: 3,
        started_at: None,
        duration_seconds: Some(130),
        players: vec![
            SeatRecord {
                seat: 1,
                name: "gina".into(),
                hole_cards: vec!["Zq".into(), "5d".into()],
                start_stack: 1_000,
                end_stack: 0,
            },
            SeatRecord {
                seat: 2,
                name: "hugo".into(),
                hole_cards: vec!["Jc".into(), "Jd".into()],
                start_stack: 1_000,
                end_stack: 2_000,
            },
        ],
        events: vec![FeedEvent::BoardCard {
            cards: vec!["Js".into(), "4h".into(), "8c".into()],
        }],
    };

    let classification = pipeline.ingest_record(&record).await.unwrap();
    assert_eq!(classification.results.len(), 1);
    assert_eq!(classification.results[0].player, "hugo");

    let warned = logs.entries().into_iter().any(|entry| {
        entry.level == Level::WARN
            && entry.message.contains("player skipped")
            && entry.field("table_id") == Some("t7")
            && entry.field("reason").is_some_and(|r| r.contains("Zq"))
    });
    assert!(warned, "expected a warning for the malformed hole card");

    pipeline.shutdown().await.unwrap();
}

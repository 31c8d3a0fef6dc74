use handfuse_engine::fusion::{FusedResult, FusionOutcome, FusionPolicy, HandKey, Resolution, SourceTag};
use handfuse_engine::grade::{grade, Grade, Grading, GradingThresholds, MissingInput};
use handfuse_engine::hand::HandRankCategory;

fn fused(category: u8, duration: u32, board: u8) -> FusedResult {
    FusedResult {
        table_id: "feature".into(),
        hand_number: 1,
        category: HandRankCategory::from_value(category),
        source: SourceTag::Primary,
        cross_validated: false,
        requires_review: false,
        duration_seconds: Some(duration),
        board_category: HandRankCategory::from_value(board),
        confidence: 1.0,
        outcome: FusionOutcome::PrimaryOnly,
        resolution: Resolution::WindowExpired,
    }
}

#[test]
fn four_of_a_kind_long_hand_flush_board_is_grade_a() {
    let verdict = grade(&fused(3, 150, 5), &GradingThresholds::default());
    let Grading::Complete(result) = verdict else {
        panic!("expected complete grading");
    };
    assert_eq!(result.grade, Grade::A);
    assert!(result.broadcast_eligible);
    assert_eq!(result.criteria_met, 3);
    assert!(result.premium_hand && result.long_playtime && result.connected_board);
}

#[test]
fn one_pair_short_hand_weak_board_is_grade_c() {
    let verdict = grade(&fused(9, 40, 9), &GradingThresholds::default());
    assert!(verdict.is_complete());
    let result = verdict.result();
    assert_eq!(result.grade, Grade::C);
    assert!(!result.broadcast_eligible);
    assert_eq!(result.criteria_met, 0);
}

#[test]
fn two_criteria_make_grade_b() {
    let result = *grade(&fused(4, 30, 7), &GradingThresholds::default()).result();
    assert_eq!(result.grade, Grade::B);
    assert!(result.broadcast_eligible);
    assert!(!result.long_playtime);
}

#[test]
fn thresholds_are_inclusive_and_configurable() {
    let strict = GradingThresholds {
        min_duration_seconds: 200,
        board_category_max: 5,
        premium_category_max: 4,
    };
    let result = *grade(&fused(5, 200, 6), &strict).result();
    assert!(result.long_playtime);
    assert!(!result.connected_board);
    assert!(!result.premium_hand);
    assert_eq!(result.grade, Grade::C);

    let result = *grade(&fused(9, 120, 7), &GradingThresholds::default()).result();
    assert!(result.long_playtime);
    assert!(result.connected_board);
}

#[test]
fn grading_is_idempotent() {
    let input = fused(2, 121, 8);
    let thresholds = GradingThresholds::default();
    let first = grade(&input, &thresholds);
    let second = grade(&input, &thresholds);
    assert_eq!(first, second);
}

#[test]
fn more_criteria_never_lower_the_grade() {
    let thresholds = GradingThresholds::default();
    let one = grade(&fused(9, 130, 9), &thresholds).result().grade;
    let two = grade(&fused(3, 130, 9), &thresholds).result().grade;
    let three = grade(&fused(3, 130, 6), &thresholds).result().grade;
    assert!(one <= two && two <= three);
    assert_eq!((one, two, three), (Grade::C, Grade::B, Grade::A));
}

#[test]
fn low_confidence_secondary_only_grades_as_incomplete() {
    let manual = FusionPolicy::manual(&HandKey::new("t2", 8), Resolution::WindowExpired);
    match grade(&manual, &GradingThresholds::default()) {
        Grading::Incomplete { partial, missing } => {
            assert_eq!(partial.grade, Grade::C);
            assert!(!partial.broadcast_eligible);
            assert_eq!(
                missing,
                vec![
                    MissingInput::Category,
                    MissingInput::Duration,
                    MissingInput::BoardStrength
                ]
            );
        }
        other => panic!("expected incomplete grading, got {:?}", other),
    }
}

#[test]
fn missing_board_only_is_reported() {
    let mut input = fused(3, 300, 5);
    input.board_category = None;
    match grade(&input, &GradingThresholds::default()) {
        Grading::Incomplete { partial, missing } => {
            assert_eq!(missing, vec![MissingInput::BoardStrength]);
            assert_eq!(partial.grade, Grade::B);
        }
        other => panic!("expected incomplete grading, got {:?}", other),
    }
}

#[test]
fn very_long_duration_grades_without_overflow() {
    let result = *grade(&fused(9, u32::MAX, 9), &GradingThresholds::default()).result();
    assert!(result.long_playtime);
    assert!(!result.premium_hand);
    assert_eq!(result.grade, Grade::C);
    assert_eq!(result.edit_offset_seconds, 1_717_986_918);
}

#[test]
fn premium_cutoff_is_configurable() {
    let wide = GradingThresholds {
        premium_category_max: 5,
        ..GradingThresholds::default()
    };
    assert!(grade(&fused(5, 30, 9), &wide).result().premium_hand);
    assert!(!grade(&fused(5, 30, 9), &GradingThresholds::default()).result().premium_hand);
    assert!(grade(&fused(4, 30, 9), &GradingThresholds::default()).result().premium_hand);
}

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::errors::{EvalError, InputProblem};

/// Ten ordered hand classes. Lower value = stronger hand.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandRankCategory {
    RoyalFlush = 1,
    StraightFlush = 2,
    FourOfAKind = 3,
    FullHouse = 4,
    Flush = 5,
    Straight = 6,
    ThreeOfAKind = 7,
    TwoPair = 8,
    OnePair = 9,
    HighCard = 10,
}

const CATEGORY_RANGES: [(u16, u16, HandRankCategory); 10] = [
    (1, 1, HandRankCategory::RoyalFlush),
    (2, 10, HandRankCategory::StraightFlush),
    (11, 166, HandRankCategory::FourOfAKind),
    (167, 322, HandRankCategory::FullHouse),
    (323, 1599, HandRankCategory::Flush),
    (1600, 1609, HandRankCategory::Straight),
    (1610, 2467, HandRankCategory::ThreeOfAKind),
    (2468, 3325, HandRankCategory::TwoPair),
    (3326, 6185, HandRankCategory::OnePair),
    (6186, 7462, HandRankCategory::HighCard),
];

impl HandRankCategory {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        CATEGORY_RANGES
            .iter()
            .map(|&(_, _, category)| category)
            .find(|c| c.value() == value)
    }

    /// Full house or better.
    pub fn is_premium(self) -> bool {
        self.value() <= 4
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HandRankCategory::RoyalFlush => "Royal Flush",
            HandRankCategory::StraightFlush => "Straight Flush",
            HandRankCategory::FourOfAKind => "Four Of A Kind",
            HandRankCategory::FullHouse => "Full House",
            HandRankCategory::Flush => "Flush",
            HandRankCategory::Straight => "Straight",
            HandRankCategory::ThreeOfAKind => "Three Of A Kind",
            HandRankCategory::TwoPair => "Two Pair",
            HandRankCategory::OnePair => "One Pair",
            HandRankCategory::HighCard => "High Card",
        }
    }

    /// Maps a strength onto its category through the fixed inclusive ranges.
    pub fn from_strength(strength: Strength) -> Self {
        CATEGORY_RANGES
            .iter()
            .find(|&&(lo, hi, _)| (lo..=hi).contains(&strength.0))
            .map(|&(_, _, category)| category)
            .unwrap_or(HandRankCategory::HighCard)
    }
}

impl Ord for HandRankCategory {
    // Stronger categories compare greater even though their value is lower.
    fn cmp(&self, other: &Self) -> Ordering {
        other.value().cmp(&self.value())
    }
}

impl PartialOrd for HandRankCategory {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Equivalence-class strength in the standard 5-card ordering:
/// 1 is a royal flush, 7462 is seven-high with no pair.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strength(pub u16);

impl Strength {
    pub const BEST: Strength = Strength(1);
    pub const WORST: Strength = Strength(7462);

    pub fn value(self) -> u16 {
        self.0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub strength: Strength,
    pub category: HandRankCategory,
}

impl Evaluation {
    fn from_strength(strength: Strength) -> Self {
        Self {
            strength,
            category: HandRankCategory::from_strength(strength),
        }
    }
}

/// Evaluates exactly seven distinct cards, returning the best five-card class.
///
/// # Errors
///
/// [`EvalError::InvalidHandInput`] when the slice does not hold exactly seven
/// cards or contains the same card twice.
///
/// # Examples
///
/// ```
/// use handfuse_engine::cards::Card;
/// use handfuse_engine::hand::{evaluate, HandRankCategory};
///
/// let cards: Vec<Card> = ["Ah", "Kh", "Qh", "Jh", "Th", "2c", "3d"]
///     .iter()
///     .map(|t| t.parse().unwrap())
///     .collect();
/// let eval = evaluate(&cards).unwrap();
/// assert_eq!(eval.strength.value(), 1);
/// assert_eq!(eval.category, HandRankCategory::RoyalFlush);
/// ```
pub fn evaluate(cards: &[Card]) -> Result<Evaluation, EvalError> {
    if cards.len() != 7 {
        return Err(EvalError::InvalidHandInput(InputProblem::CardCount {
            expected: "7",
            actual: cards.len(),
        }));
    }
    best_of(cards)
}

/// Same contract as [`evaluate`] for incomplete deals of five or six cards,
/// e.g. a flop-only hand or a board on its own.
pub fn evaluate_partial(cards: &[Card]) -> Result<Evaluation, EvalError> {
    if !(5..=6).contains(&cards.len()) {
        return Err(EvalError::InvalidHandInput(InputProblem::CardCount {
            expected: "5 or 6",
            actual: cards.len(),
        }));
    }
    best_of(cards)
}

/// Orders two evaluations; the stronger hand compares `Greater`.
pub fn compare(a: &Evaluation, b: &Evaluation) -> Ordering {
    b.strength.0.cmp(&a.strength.0)
}

fn best_of(cards: &[Card]) -> Result<Evaluation, EvalError> {
    let mut seen = HashSet::with_capacity(cards.len());
    for &card in cards {
        if !seen.insert(card) {
            return Err(EvalError::InvalidHandInput(InputProblem::DuplicateCard(
                card,
            )));
        }
    }

    let n = cards.len();
    let mut best = Strength::WORST.0;
    for a in 0..n {
        for b in a + 1..n {
            for c in b + 1..n {
                for d in c + 1..n {
                    for e in d + 1..n {
                        let five = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                        best = best.min(five_card_strength(&five));
                    }
                }
            }
        }
    }
    Ok(Evaluation::from_strength(Strength(best)))
}

// Category bases in the 1..=7462 ordering.
const STRAIGHT_FLUSH_BASE: u16 = 1;
const QUADS_BASE: u16 = 11;
const FULL_HOUSE_BASE: u16 = 167;
const FLUSH_BASE: u16 = 323;
const STRAIGHT_BASE: u16 = 1600;
const TRIPS_BASE: u16 = 1610;
const TWO_PAIR_BASE: u16 = 2468;
const PAIR_BASE: u16 = 3326;
const HIGH_CARD_BASE: u16 = 6186;

fn five_card_strength(cards: &[Card; 5]) -> u16 {
    let flush = cards.iter().all(|c| c.suit == cards[0].suit);

    let mut counts = [0u8; 15]; // 2..14 used
    for c in cards {
        counts[c.rank.value() as usize] += 1;
    }
    // (count, rank) pairs, most frequent first then highest rank
    let mut groups: Vec<(u8, u8)> = (2..=14u8)
        .filter(|&r| counts[r as usize] > 0)
        .map(|r| (counts[r as usize], r))
        .collect();
    groups.sort_unstable_by(|a, b| b.cmp(a));

    if groups.len() == 5 {
        let ranks: [u8; 5] = [groups[0].1, groups[1].1, groups[2].1, groups[3].1, groups[4].1];
        let straight = straight_high(&ranks);
        return match (flush, straight) {
            (true, Some(high)) => STRAIGHT_FLUSH_BASE + (14 - high) as u16,
            (false, Some(high)) => STRAIGHT_BASE + (14 - high) as u16,
            (true, None) => FLUSH_BASE + distinct_five_index(&ranks),
            (false, None) => HIGH_CARD_BASE + distinct_five_index(&ranks),
        };
    }

    match groups.as_slice() {
        [(4, quad), (1, kicker)] => {
            QUADS_BASE + (14 - quad) as u16 * 12 + combo_index(&[*kicker], &remaining(&[*quad]))
        }
        [(3, trip), (2, pair)] => {
            FULL_HOUSE_BASE + (14 - trip) as u16 * 12 + combo_index(&[*pair], &remaining(&[*trip]))
        }
        [(3, trip), (1, k1), (1, k2)] => {
            TRIPS_BASE + (14 - trip) as u16 * 66 + combo_index(&[*k1, *k2], &remaining(&[*trip]))
        }
        [(2, high), (2, low), (1, kicker)] => {
            TWO_PAIR_BASE
                + combo_index(&[*high, *low], &remaining(&[])) * 11
                + combo_index(&[*kicker], &remaining(&[*high, *low]))
        }
        [(2, pair), (1, k1), (1, k2), (1, k3)] => {
            PAIR_BASE + (14 - pair) as u16 * 220 + combo_index(&[*k1, *k2, *k3], &remaining(&[*pair]))
        }
        _ => unreachable!("five cards always form one of the grouped shapes"),
    }
}

/// Highest card of a straight over five distinct descending ranks.
fn straight_high(desc: &[u8; 5]) -> Option<u8> {
    if desc[0] - desc[4] == 4 {
        Some(desc[0])
    } else if *desc == [14, 5, 4, 3, 2] {
        Some(5)
    } else {
        None
    }
}

/// Index of a non-straight five-rank set among all 1277 such sets, best first.
fn distinct_five_index(desc: &[u8; 5]) -> u16 {
    let index = combo_index(desc, &remaining(&[]));
    let straights_above = straight_rank_sets()
        .iter()
        .filter(|s| s.as_slice() > desc.as_slice())
        .count() as u16;
    index - straights_above
}

fn straight_rank_sets() -> [[u8; 5]; 10] {
    let mut sets = [[0u8; 5]; 10];
    for (i, high) in (6..=14u8).rev().enumerate() {
        sets[i] = [high, high - 1, high - 2, high - 3, high - 4];
    }
    sets[9] = [14, 5, 4, 3, 2];
    sets
}

/// Ranks 14..=2 in descending order, minus the excluded ones.
fn remaining(excluded: &[u8]) -> Vec<u8> {
    (2..=14u8).rev().filter(|r| !excluded.contains(r)).collect()
}

/// Number of k-subsets of `available` that beat `chosen` lexicographically,
/// comparing both in descending order. `chosen` must be a descending subset.
fn combo_index(chosen: &[u8], available: &[u8]) -> u16 {
    let n = available.len();
    let k = chosen.len();
    let mut index = 0u16;
    let mut next = 0usize;
    for (i, rank) in chosen.iter().enumerate() {
        let pos = available
            .iter()
            .position(|r| r == rank)
            .unwrap_or(n - 1);
        for j in next..pos {
            index += binomial(n - j - 1, k - i - 1);
        }
        next = pos + 1;
    }
    index
}

fn binomial(n: usize, k: usize) -> u16 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u32 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u32 / (i + 1) as u32;
    }
    acc as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::full_deck;

    fn cards(tokens: &[&str]) -> Vec<Card> {
        tokens.iter().map(|t| t.parse().expect("card")).collect()
    }

    #[test]
    fn category_ranges_cover_every_strength() {
        let mut total = 0u32;
        for &(lo, hi, _) in CATEGORY_RANGES.iter() {
            total += (hi - lo + 1) as u32;
        }
        assert_eq!(total, 7462);
    }

    #[test]
    fn every_five_card_hand_maps_into_range_and_all_classes_are_hit() {
        let deck = full_deck();
        let mut hit = vec![false; 7463];
        for a in 0..52 {
            for b in a + 1..52 {
                for c in b + 1..52 {
                    for d in c + 1..52 {
                        for e in d + 1..52 {
                            let s = five_card_strength(&[deck[a], deck[b], deck[c], deck[d], deck[e]]);
                            assert!((1..=7462).contains(&s));
                            hit[s as usize] = true;
                        }
                    }
                }
            }
        }
        assert!(hit[1..].iter().all(|&h| h));
    }

    #[test]
    fn boundary_strengths() {
        assert_eq!(five_card_strength(&[
            "Ah".parse().unwrap(), "Kh".parse().unwrap(), "Qh".parse().unwrap(),
            "Jh".parse().unwrap(), "Th".parse().unwrap(),
        ]), 1);
        assert_eq!(evaluate_partial(&cards(&["5s", "4s", "3s", "2s", "As"])).unwrap().strength.0, 10);
        assert_eq!(evaluate_partial(&cards(&["As", "Ah", "Ad", "Ac", "Ks"])).unwrap().strength.0, 11);
        assert_eq!(evaluate_partial(&cards(&["2s", "2h", "2d", "2c", "3s"])).unwrap().strength.0, 166);
        assert_eq!(evaluate_partial(&cards(&["As", "Ah", "Ad", "Kc", "Ks"])).unwrap().strength.0, 167);
        assert_eq!(evaluate_partial(&cards(&["As", "Ks", "Qs", "Js", "9s"])).unwrap().strength.0, 323);
        assert_eq!(evaluate_partial(&cards(&["7s", "5s", "4s", "3s", "2s"])).unwrap().strength.0, 1599);
        assert_eq!(evaluate_partial(&cards(&["As", "Kh", "Qs", "Js", "Ts"])).unwrap().strength.0, 1600);
        assert_eq!(evaluate_partial(&cards(&["5s", "4h", "3s", "2s", "Ad"])).unwrap().strength.0, 1609);
        assert_eq!(evaluate_partial(&cards(&["7s", "5h", "4s", "3s", "2d"])).unwrap().strength.0, 7462);
        assert_eq!(evaluate_partial(&cards(&["As", "Kh", "Qs", "Js", "9d"])).unwrap().strength.0, 6186);
    }

    #[test]
    fn category_values_and_premium() {
        assert_eq!(HandRankCategory::RoyalFlush.value(), 1);
        assert_eq!(HandRankCategory::HighCard.value(), 10);
        assert!(HandRankCategory::FullHouse.is_premium());
        assert!(!HandRankCategory::Flush.is_premium());
        assert_eq!(HandRankCategory::from_value(7), Some(HandRankCategory::ThreeOfAKind));
        assert_eq!(HandRankCategory::from_value(0), None);
        assert_eq!(HandRankCategory::from_value(11), None);
        assert!(HandRankCategory::FourOfAKind > HandRankCategory::FullHouse);
    }

    #[test]
    fn from_strength_uses_inclusive_thresholds() {
        assert_eq!(HandRankCategory::from_strength(Strength(10)), HandRankCategory::StraightFlush);
        assert_eq!(HandRankCategory::from_strength(Strength(11)), HandRankCategory::FourOfAKind);
        assert_eq!(HandRankCategory::from_strength(Strength(1609)), HandRankCategory::Straight);
        assert_eq!(HandRankCategory::from_strength(Strength(1610)), HandRankCategory::ThreeOfAKind);
        assert_eq!(HandRankCategory::from_strength(Strength(7462)), HandRankCategory::HighCard);
    }
}

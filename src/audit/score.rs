//! Accessibility score: how soon and how cheaply a suggested renovation makes the space usable.
//!
//! Four independent factors are summed. Within each factor the first matching rule wins.
//!
//! | factor     | max | driven by                                        |
//! |------------|-----|--------------------------------------------------|
//! | cost       | 40  | `estimated_cost_usd` bucket                      |
//! | complexity | 30  | major-structural keywords, then `clear_mask`     |
//! | barrier    | 20  | keywords in `renovation_suggestion`              |
//! | time       | 10  | cost combined with the complexity flags          |

use crate::audit::record::AuditRecord;

pub const MAX_SCORE: u8 = 100;

/// Inclusive `(min, max, points)` buckets, checked in order.
const COST_BUCKETS: [(f64, f64, u8); 5] = [
    (0.0, 5_000.0, 40),
    (5_001.0, 15_000.0, 30),
    (15_001.0, 30_000.0, 20),
    (30_001.0, 50_000.0, 10),
    (50_001.0, f64::INFINITY, 0),
];

const MAJOR_STRUCTURAL_KEYWORDS: [&str; 5] =
    ["lift", "elevator", "platform", "major structural", "foundation"];
const SIMPLE_ADDITION_KEYWORDS: [&str; 5] = ["grab bar", "signage", "sign", "handle", "lever"];
const MODERATE_CHANGE_KEYWORDS: [&str; 4] = ["ramp", "wider", "doorway", "threshold"];

const COMPLEXITY_NON_STRUCTURAL: u8 = 30;
const COMPLEXITY_STRUCTURAL: u8 = 15;
const COMPLEXITY_MAJOR: u8 = 0;

const BARRIER_SIMPLE: u8 = 20;
const BARRIER_MODERATE: u8 = 15;
const BARRIER_COMPLEX: u8 = 5;

const TIME_QUICK_FIX: u8 = 10;
const TIME_STANDARD: u8 = 7;
const TIME_MAJOR: u8 = 3;
const TIME_EXTENSIVE: u8 = 0;

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| haystack.contains(keyword))
}

fn cost_points(cost: f64) -> u8 {
    COST_BUCKETS
        .iter()
        .find(|(min, max, _)| *min <= cost && cost <= *max)
        .map_or(0, |(_, _, points)| *points)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Complexity {
    structural: bool,
    major: bool,
}

impl Complexity {
    fn of(record: &AuditRecord, suggestion: &str) -> Self {
        Self {
            structural: !record.clear_mask.trim().is_empty(),
            major: contains_any(suggestion, &MAJOR_STRUCTURAL_KEYWORDS),
        }
    }

    fn points(self) -> u8 {
        if self.major {
            COMPLEXITY_MAJOR
        } else if self.structural {
            COMPLEXITY_STRUCTURAL
        } else {
            COMPLEXITY_NON_STRUCTURAL
        }
    }
}

fn barrier_points(suggestion: &str) -> u8 {
    if contains_any(suggestion, &SIMPLE_ADDITION_KEYWORDS) {
        BARRIER_SIMPLE
    } else if contains_any(suggestion, &MODERATE_CHANGE_KEYWORDS) {
        BARRIER_MODERATE
    } else {
        BARRIER_COMPLEX
    }
}

fn time_points(cost: f64, complexity: Complexity) -> u8 {
    if cost < 5_000.0 && !complexity.structural {
        TIME_QUICK_FIX
    } else if cost < 30_000.0 && !complexity.major {
        TIME_STANDARD
    } else if cost < 50_000.0 {
        TIME_MAJOR
    } else {
        TIME_EXTENSIVE
    }
}

/// Scores a validated record in `0..=100`. Pure and deterministic.
pub fn score(record: &AuditRecord) -> u8 {
    let cost = if record.estimated_cost_usd.is_finite() {
        record.estimated_cost_usd
    } else {
        0.0
    };
    let suggestion = record.renovation_suggestion.to_lowercase();
    let complexity = Complexity::of(record, &suggestion);

    let total = u16::from(cost_points(cost))
        + u16::from(complexity.points())
        + u16::from(barrier_points(&suggestion))
        + u16::from(time_points(cost, complexity));

    total.min(u16::from(MAX_SCORE)) as u8
}

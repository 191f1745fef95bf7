//! Rules turning raw scraped text into model friendly values.
//!
//! Every rule is a pure function of a single cell, [`crate::clean_dataset`] decides
//! which columns they apply to.

use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MEETING: Regex =
        Regex::new(r"([0-9]+)回?[^0-9]+?([0-9]+|[A-Z])(?:日目)?").unwrap();
    static ref LEADING_NUMBER: Regex = Regex::new(r"^([0-9]+(?:\.[0-9]*)?)").unwrap();
    static ref RACE_TIME: Regex = Regex::new(r"^([0-9]+)[.:]([0-9]{1,2})\.([0-9])$").unwrap();
}

const DATE_FORMATS: [&str; 3] = ["%Y.%m.%d", "%Y-%m-%d", "%Y/%m/%d"];

/// Marks of a finish position for horses that didn't finish.
pub const EXCLUDED_MARKS: [&str; 3] = ["消", "外", "止"];

/// `2024.02.18`, `2024-02-18` or `2024/02/18` as (year, month, day).
pub fn split_date(s: &str) -> Option<(i32, u32, u32)> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .map(|d| (d.year(), d.month(), d.day()))
}

/// `1札2`, `1東京8` or `1回東京8日目` as meeting count and day. Single letter days
/// follow 9, `A` is 10.
///
/// Meetings outside the central tracks don't follow this notation and give `None`.
pub fn split_race_meeting(s: &str) -> Option<(u32, u32)> {
    let caps = MEETING.captures(s)?;
    let count = caps[1].parse().ok()?;
    let day = match caps[2].chars().next()? {
        c @ 'A'..='Z' => c as u32 - 'A' as u32 + 10,
        _ => caps[2].parse().ok()?,
    };
    Some((count, day))
}

const CLASS_LEVELS: [(&str, i32); 18] = [
    ("Ｇ１", 7),
    ("G1", 7),
    ("Ｇ２", 6),
    ("G2", 6),
    ("Ｇ３", 5),
    ("G3", 5),
    ("重賞", 5),
    ("OP(L)", 4),
    ("ｵｰﾌﾟﾝ", 4),
    ("オープン", 4),
    ("1600万", 3),
    ("3勝", 3),
    ("1000万", 2),
    ("2勝", 2),
    ("500万", 1),
    ("1勝", 1),
    ("未勝利", 0),
    ("新馬", 0),
];

/// Level of a race class, from 0 for maiden races up to 7 for G1.
///
/// `(不明)`, used for races outside the central tracks, is -1. Class names decorated
/// with age or sex conditions (`3歳以上2勝クラス`) are matched on the class they contain.
pub fn race_class_level(s: &str) -> Option<i32> {
    let s = s.trim();
    if s == "(不明)" {
        return Some(-1);
    }
    CLASS_LEVELS
        .iter()
        .find(|(name, _)| *name == s)
        .or_else(|| CLASS_LEVELS.iter().find(|(name, _)| s.contains(name)))
        .map(|(_, level)| *level)
}

/// `良` 1, `稍` 2, `重` 3 and `不` 4, long forms such as `稍重` included.
pub fn track_condition_level(s: &str) -> Option<u8> {
    match s.trim().chars().next()? {
        '良' => Some(1),
        '稍' => Some(2),
        '重' => Some(3),
        '不' => Some(4),
        _ => None,
    }
}

/// `55▲` as carried weight 55.0 and apprentice allowance 3.0.
pub fn split_carried_weight(s: &str) -> (Option<f64>, f64) {
    let s = s.trim();
    let weight = LEADING_NUMBER
        .captures(s)
        .and_then(|caps| caps[1].parse().ok());
    let allowance = match s.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
        Some('★') => 4.0,
        Some('▲') => 3.0,
        Some('△') | Some('☆') => 2.0,
        Some('◇') => 1.0,
        _ => 0.0,
    };
    (weight, allowance)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishPosition {
    Placed(u32),
    /// Scratched, excluded or pulled up
    Excluded,
    Unknown,
}

/// Reads a finish position, circled (`③`) and full width (`１２`) digits included.
pub fn finish_position(s: &str) -> FinishPosition {
    let s = normalize_digits(s.trim());
    if EXCLUDED_MARKS.contains(&s.as_str()) {
        return FinishPosition::Excluded;
    }
    match s.parse() {
        Ok(pos) => FinishPosition::Placed(pos),
        Err(_) => FinishPosition::Unknown,
    }
}

fn normalize_digits(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            // ① to ⑳
            '\u{2460}'..='\u{2473}' => {
                out.push_str(&(c as u32 - 0x2460 + 1).to_string());
            }
            '０'..='９' => {
                out.push(char::from(b'0' + (c as u32 - '０' as u32) as u8));
            }
            _ => out.push(c),
        }
    }
    out
}

/// `1:12.3` or `1.12.3` (minutes, seconds, tenths) as 72.3 seconds.
pub fn time_to_seconds(s: &str) -> Option<f64> {
    let caps = RACE_TIME.captures(s.trim())?;
    let minutes: u64 = caps[1].parse().ok()?;
    let seconds: u64 = caps[2].parse().ok()?;
    let tenths: u64 = caps[3].parse().ok()?;
    Some((minutes * 600 + seconds * 10 + tenths) as f64 / 10.0)
}

/// Plain seconds such as `34.5`, `----` when the time wasn't taken.
pub fn clean_time(s: &str) -> Option<f64> {
    match s.trim() {
        "----" => None,
        s => s.parse().ok(),
    }
}

/// Win odds, 0.0 when cancelled (`(12.3)`) or unreadable.
pub fn win_odds(s: &str) -> f64 {
    let s = s.trim();
    if s.starts_with('(') && s.ends_with(')') {
        return 0.0;
    }
    s.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates() {
        assert_eq!(split_date("2025.08.02"), Some((2025, 8, 2)));
        assert_eq!(split_date("2024-02-18"), Some((2024, 2, 18)));
        assert_eq!(split_date("2024/01/27"), Some((2024, 1, 27)));
        assert_eq!(split_date("不明"), None);
    }

    #[test]
    fn race_meetings() {
        assert_eq!(split_race_meeting("1札2"), Some((1, 2)));
        assert_eq!(split_race_meeting("5東8"), Some((5, 8)));
        assert_eq!(split_race_meeting("2阪A"), Some((2, 10)));
        assert_eq!(split_race_meeting("3中B"), Some((3, 11)));
        assert_eq!(split_race_meeting("1東京8"), Some((1, 8)));
        assert_eq!(split_race_meeting("1回東京8日目"), Some((1, 8)));
        assert_eq!(split_race_meeting("3回中山10日目"), Some((3, 10)));
        assert_eq!(split_race_meeting("大井"), None);
    }

    #[test]
    fn race_classes() {
        assert_eq!(race_class_level("新馬"), Some(0));
        assert_eq!(race_class_level("未勝利"), Some(0));
        assert_eq!(race_class_level("500万"), Some(1));
        assert_eq!(race_class_level("2勝"), Some(2));
        assert_eq!(race_class_level("1600万"), Some(3));
        assert_eq!(race_class_level("ｵｰﾌﾟﾝ"), Some(4));
        assert_eq!(race_class_level("OP(L)"), Some(4));
        assert_eq!(race_class_level("重賞"), Some(5));
        assert_eq!(race_class_level("Ｇ３"), Some(5));
        assert_eq!(race_class_level("Ｇ２"), Some(6));
        assert_eq!(race_class_level("Ｇ１"), Some(7));
        assert_eq!(race_class_level("(不明)"), Some(-1));
        assert_eq!(race_class_level("3歳以上1勝クラス"), Some(1));
        assert_eq!(race_class_level("4歳以上"), None);
    }

    #[test]
    fn track_conditions() {
        assert_eq!(track_condition_level("良"), Some(1));
        assert_eq!(track_condition_level("稍"), Some(2));
        assert_eq!(track_condition_level("稍重"), Some(2));
        assert_eq!(track_condition_level("重"), Some(3));
        assert_eq!(track_condition_level("不良"), Some(4));
        assert_eq!(track_condition_level(""), None);
    }

    #[test]
    fn carried_weights() {
        assert_eq!(split_carried_weight("55▲"), (Some(55.0), 3.0));
        assert_eq!(split_carried_weight("57"), (Some(57.0), 0.0));
        assert_eq!(split_carried_weight("54.5☆"), (Some(54.5), 2.0));
        assert_eq!(split_carried_weight("52★"), (Some(52.0), 4.0));
        assert_eq!(split_carried_weight("56◇"), (Some(56.0), 1.0));
        assert_eq!(split_carried_weight(""), (None, 0.0));
    }

    #[test]
    fn finish_positions() {
        assert_eq!(finish_position("1"), FinishPosition::Placed(1));
        assert_eq!(finish_position("③"), FinishPosition::Placed(3));
        assert_eq!(finish_position("⑫"), FinishPosition::Placed(12));
        assert_eq!(finish_position("１５"), FinishPosition::Placed(15));
        assert_eq!(finish_position("中"), FinishPosition::Unknown);
        assert_eq!(finish_position("12(降)"), FinishPosition::Unknown);
        for mark in EXCLUDED_MARKS {
            assert_eq!(finish_position(mark), FinishPosition::Excluded);
        }
    }

    #[test]
    fn times() {
        assert_eq!(time_to_seconds("1.12.3"), Some(72.3));
        assert_eq!(time_to_seconds("2.01.0"), Some(121.0));
        assert_eq!(time_to_seconds("1:35.7"), Some(95.7));
        assert_eq!(time_to_seconds("59.8"), None);
        assert_eq!(time_to_seconds(""), None);
        assert_eq!(clean_time("34.5"), Some(34.5));
        assert_eq!(clean_time("----"), None);
    }

    #[test]
    fn odds() {
        assert_eq!(win_odds("3.4"), 3.4);
        assert_eq!(win_odds("(12.3)"), 0.0);
        assert_eq!(win_odds("---"), 0.0);
    }
}

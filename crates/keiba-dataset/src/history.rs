use chrono::NaiveDate;
use keiba_crawler::{LoadError, Loaded, Loader, Record};

use crate::row::RACE_DATE;

/// Number of latest races selected when a caller has no preference
pub const DEFAULT_TOP_N: usize = 3;

/// The `race_date` of a record, `None` when absent or not `YYYY-MM-DD`.
pub fn race_date(record: &Record) -> Option<NaiveDate> {
    record
        .get(RACE_DATE)?
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

/// Selects the `top_n` latest races run strictly before `cutoff`, latest first.
///
/// Races sharing a date keep their source order. Races without a readable date are
/// never selected since they can't be proven to precede the cutoff.
pub fn latest_races(races: &[Record], cutoff: NaiveDate, top_n: usize) -> Vec<&Record> {
    let mut dated = races
        .iter()
        .filter_map(|race| race_date(race).map(|date| (date, race)))
        .filter(|(date, _)| *date < cutoff)
        .collect::<Vec<_>>();
    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.into_iter().take(top_n).map(|(_, race)| race).collect()
}

/// Prefixes the fields of the i-th race with `race{i}_`.
pub fn flatten_races<'a>(races: impl IntoIterator<Item = &'a Record>) -> Record {
    let mut flat = Record::new();
    for (i, race) in races.into_iter().enumerate() {
        for (key, value) in race {
            flat.insert(format!("race{i}_{key}"), value.clone());
        }
    }
    flat
}

/// Profile of `horse_id` followed by its flattened latest races before `cutoff`.
pub fn horse_features<L>(
    loader: &mut L,
    horse_id: &str,
    cutoff: NaiveDate,
    top_n: usize,
) -> Result<Record, LoadError>
where
    L: Loader + ?Sized,
{
    let Loaded {
        primary: mut features,
        details: history,
    } = loader.load(horse_id)?;
    features.extend(flatten_races(latest_races(&history, cutoff, top_n)));
    Ok(features)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn race(date: &str, name: &str) -> Record {
        let mut r = Record::new();
        r.insert("race_date".into(), json!(date));
        r.insert("race_name".into(), json!(name));
        r
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dates(races: &[&Record]) -> Vec<String> {
        races
            .iter()
            .map(|r| r["race_date"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn excludes_races_after_cutoff() {
        let races = [
            race("2024-01-10", "a"),
            race("2024-02-05", "b"),
            race("2024-03-01", "c"),
        ];
        let latest = latest_races(&races, date("2024-02-20"), DEFAULT_TOP_N);
        assert_eq!(dates(&latest), ["2024-02-05", "2024-01-10"]);
    }

    #[test]
    fn race_on_cutoff_is_excluded() {
        let races = [race("2024-02-20", "same day"), race("2024-02-19", "eve")];
        let latest = latest_races(&races, date("2024-02-20"), DEFAULT_TOP_N);
        assert_eq!(dates(&latest), ["2024-02-19"]);
    }

    #[test]
    fn equal_dates_keep_source_order() {
        let races = [
            race("2024-01-01", "first"),
            race("2024-01-05", "x"),
            race("2024-01-01", "second"),
        ];
        let latest = latest_races(&races, date("2024-02-01"), DEFAULT_TOP_N);
        let names = latest
            .iter()
            .map(|r| r["race_name"].as_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, ["x", "first", "second"]);
    }

    #[test]
    fn undated_races_are_ignored() {
        let mut undated = race("", "no date");
        undated.remove("race_date");
        let races = [undated, race("2024/01/01", "bad format"), race("2023-12-01", "ok")];
        let latest = latest_races(&races, date("2024-02-01"), DEFAULT_TOP_N);
        assert_eq!(dates(&latest), ["2023-12-01"]);
    }

    #[test]
    fn selection_properties_hold() {
        let all = (0..40)
            .map(|i| {
                let d = date("2023-01-01") + chrono::Duration::days((i * 37) % 400);
                race(&d.format("%Y-%m-%d").to_string(), &i.to_string())
            })
            .collect::<Vec<_>>();

        for cutoff_offset in [0, 1, 90, 200, 399, 450] {
            let cutoff = date("2023-01-01") + chrono::Duration::days(cutoff_offset);
            for top_n in 0..6 {
                let latest = latest_races(&all, cutoff, top_n);
                assert!(latest.len() <= top_n);
                let ds = latest.iter().map(|r| race_date(r).unwrap()).collect::<Vec<_>>();
                assert!(ds.iter().all(|d| *d < cutoff));
                assert!(ds.windows(2).all(|w| w[0] >= w[1]));
                let eligible = all.iter().filter(|r| race_date(r).unwrap() < cutoff).count();
                assert_eq!(latest.len(), eligible.min(top_n));
            }
        }
    }

    #[test]
    fn flattened_by_position() {
        let races = [race("2024-02-05", "b"), race("2024-01-10", "a")];
        let flat = flatten_races(races.iter());
        assert_eq!(flat["race0_race_date"], json!("2024-02-05"));
        assert_eq!(flat["race1_race_name"], json!("a"));
        assert_eq!(flat.len(), 4);
    }
}

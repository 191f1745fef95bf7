use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use keiba_crawler::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clean::{self, FinishPosition};

/// Columns each cleanup rule applies to, history variants (`race0_time`) included.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleaningConfig {
    /// Split into `_year`, `_month` and `_day` columns
    pub dates: Vec<String>,
    /// Split into `_count` and `_day` columns
    pub race_meetings: Vec<String>,
    pub race_classes: Vec<String>,
    pub track_conditions: Vec<String>,
    /// Followed by an `_allowance` column
    pub carried_weights: Vec<String>,
    pub finish_positions: Vec<String>,
    /// `m:ss.t` or `m.ss.t` race times
    pub times: Vec<String>,
    /// Times already in seconds
    pub seconds: Vec<String>,
    pub odds: Vec<String>,
    /// Drop entrants that didn't finish rather than leaving their position empty
    pub drop_finish_excluded: bool,
    pub csv: CsvWriterConfig,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        fn cols(names: &[&str]) -> Vec<String> {
            names.iter().map(|s| s.to_string()).collect()
        }
        Self {
            dates: cols(&["race_date"]),
            race_meetings: cols(&["race_meeting"]),
            race_classes: cols(&["race_class"]),
            track_conditions: cols(&["track_condition"]),
            carried_weights: cols(&["carried_weight"]),
            finish_positions: cols(&["finish_position"]),
            times: cols(&["time"]),
            seconds: cols(&["last_3f"]),
            odds: cols(&["win_odds"]),
            drop_finish_excluded: true,
            csv: CsvWriterConfig::default(),
        }
    }
}

impl CleaningConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = fs_err::File::open(path.as_ref())?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Invalid cleaning config {}", path.as_ref().display()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsvWriterConfig {
    pub delimiter: char,
    pub terminator: CsvTerminator,
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            terminator: CsvTerminator::Any('\n'),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CsvTerminator {
    CRLF,
    Any(char),
}

impl From<CsvTerminator> for csv::Terminator {
    fn from(source: CsvTerminator) -> Self {
        match source {
            CsvTerminator::CRLF => Self::CRLF,
            CsvTerminator::Any(c) => Self::Any(c as u8),
        }
    }
}

impl From<&CsvWriterConfig> for csv::WriterBuilder {
    fn from(c: &CsvWriterConfig) -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(c.delimiter as u8);
        builder.terminator(c.terminator.into());
        builder
    }
}

/// Rows aligned on the union of their keys, in first seen order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut columns = vec![];
        let mut index = HashMap::new();
        let records = records.into_iter().collect::<Vec<_>>();
        for record in &records {
            for key in record.keys() {
                if !index.contains_key(key) {
                    index.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|record| {
                let mut row = vec![Value::Null; columns.len()];
                for (key, value) in record {
                    row[index[&key]] = value;
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    /// Reads a newline delimited JSON store, lines that aren't an object are skipped.
    pub fn read_jsonl<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = fs_err::File::open(path.as_ref())?;
        let mut records = vec![];
        let mut corrupt = 0;
        for line in BufReader::new(file).split(b'\n') {
            let line = line?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Record>(&line) {
                Ok(record) => records.push(record),
                Err(_) => corrupt += 1,
            }
        }
        if corrupt > 0 {
            log::warn!(
                "Skipped {corrupt} corrupt lines of {}",
                path.as_ref().display()
            );
        }
        Ok(Self::from_records(records))
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// `base` and its history variants `race{i}_{base}` present in the table.
    pub fn columns_like(&self, base: &str) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| *c == base || is_history_variant(c, base))
            .cloned()
            .collect()
    }

    pub fn map_column<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Value) -> Value,
    {
        if let Some(i) = self.column(name) {
            for row in self.rows.iter_mut() {
                row[i] = f(&row[i]);
            }
        }
    }

    /// Replaces column `name` by `names.len()` columns computed from it.
    pub fn split_column<F>(&mut self, name: &str, names: &[String], f: F)
    where
        F: Fn(&Value) -> Vec<Value>,
    {
        let i = match self.column(name) {
            Some(i) => i,
            None => return,
        };
        self.columns.splice(i..=i, names.iter().cloned());
        for row in self.rows.iter_mut() {
            let mut values = f(&row[i]);
            values.resize(names.len(), Value::Null);
            row.splice(i..=i, values);
        }
    }

    pub fn retain_rows<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Value) -> bool,
    {
        if let Some(i) = self.column(name) {
            self.rows.retain(|row| f(&row[i]));
        }
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P, config: &CsvWriterConfig) -> anyhow::Result<()> {
        let file = fs_err::File::create(path.as_ref())?;
        let mut wtr = csv::WriterBuilder::from(config).from_writer(file);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(cell_text))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn is_history_variant(column: &str, base: &str) -> bool {
    column
        .strip_prefix("race")
        .and_then(|rest| rest.split_once('_'))
        .map(|(i, rest)| !i.is_empty() && i.bytes().all(|b| b.is_ascii_digit()) && rest == base)
        .unwrap_or(false)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        v => v.to_string(),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        v => Some(cell_text(v)),
    }
}

fn number<N: Into<Value>>(n: Option<N>) -> Value {
    n.map(Into::into).unwrap_or(Value::Null)
}

/// Applies every rule of `config` to the table.
pub fn clean_table(table: &mut Table, config: &CleaningConfig) {
    if config.drop_finish_excluded {
        for col in &config.finish_positions {
            let before = table.rows.len();
            table.retain_rows(col, |v| {
                text(v).map(|s| clean::finish_position(&s)) != Some(FinishPosition::Excluded)
            });
            let dropped = before - table.rows.len();
            if dropped > 0 {
                log::info!(
                    "Dropped {dropped} rows out of {before} where {col} is {}",
                    clean::EXCLUDED_MARKS.join(", ")
                );
            }
        }
    }

    for base in &config.finish_positions {
        for col in table.columns_like(base) {
            table.map_column(&col, |v| {
                match text(v).map(|s| clean::finish_position(&s)) {
                    Some(FinishPosition::Placed(pos)) => pos.into(),
                    _ => Value::Null,
                }
            });
        }
    }

    for base in &config.dates {
        for col in table.columns_like(base) {
            let names = ["year", "month", "day"].map(|p| format!("{col}_{p}"));
            table.split_column(&col, &names, |v| {
                match text(v).and_then(|s| clean::split_date(&s)) {
                    Some((y, m, d)) => vec![y.into(), m.into(), d.into()],
                    None => vec![],
                }
            });
        }
    }

    for base in &config.race_meetings {
        for col in table.columns_like(base) {
            let names = ["count", "day"].map(|p| format!("{col}_{p}"));
            table.split_column(&col, &names, |v| {
                match text(v).and_then(|s| clean::split_race_meeting(&s)) {
                    Some((count, day)) => vec![count.into(), day.into()],
                    None => vec![],
                }
            });
        }
    }

    for base in &config.carried_weights {
        for col in table.columns_like(base) {
            let names = [col.clone(), format!("{col}_allowance")];
            table.split_column(&col, &names, |v| {
                let (weight, allowance) = clean::split_carried_weight(&text(v).unwrap_or_default());
                vec![number(weight), allowance.into()]
            });
        }
    }

    for base in &config.race_classes {
        for col in table.columns_like(base) {
            table.map_column(&col, |v| number(text(v).and_then(|s| clean::race_class_level(&s))));
        }
    }

    for base in &config.track_conditions {
        for col in table.columns_like(base) {
            table.map_column(&col, |v| {
                number(text(v).and_then(|s| clean::track_condition_level(&s)))
            });
        }
    }

    for base in &config.times {
        for col in table.columns_like(base) {
            table.map_column(&col, |v| number(text(v).and_then(|s| clean::time_to_seconds(&s))));
        }
    }

    for base in &config.seconds {
        for col in table.columns_like(base) {
            table.map_column(&col, |v| number(text(v).and_then(|s| clean::clean_time(&s))));
        }
    }

    for base in &config.odds {
        for col in table.columns_like(base) {
            table.map_column(&col, |v| clean::win_odds(&text(v).unwrap_or_default()).into());
        }
    }
}

/// Reads the JSONL store at `input`, cleans it and writes it as CSV to `output`.
///
/// Returns the number of rows written.
pub fn clean_dataset<P, Q>(input: P, output: Q, config: &CleaningConfig) -> anyhow::Result<usize>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut table = Table::read_jsonl(&input)
        .with_context(|| format!("Couldn't read {}", input.as_ref().display()))?;
    log::info!(
        "Cleaning {} rows of {} columns",
        table.rows.len(),
        table.columns.len()
    );
    clean_table(&mut table, config);
    table
        .write_csv(&output, &config.csv)
        .with_context(|| format!("Couldn't write {}", output.as_ref().display()))?;
    log::info!("Wrote {} rows to {}", table.rows.len(), output.as_ref().display());
    Ok(table.rows.len())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn columns_are_aligned_in_first_seen_order() {
        let table = Table::from_records(vec![
            record(json!({"id": "1", "horse_id": "a"})),
            record(json!({"id": "2", "race0_time": "1.12.3", "horse_id": "b"})),
        ]);
        assert_eq!(table.columns, vec!["id", "horse_id", "race0_time"]);
        assert_eq!(table.rows[0], vec![json!("1"), json!("a"), Value::Null]);
        assert_eq!(table.rows[1], vec![json!("2"), json!("b"), json!("1.12.3")]);
    }

    #[test]
    fn history_variants() {
        assert!(is_history_variant("race0_time", "time"));
        assert!(is_history_variant("race12_race_date", "race_date"));
        assert!(!is_history_variant("race_date", "date"));
        assert!(!is_history_variant("race0_time_diff", "time"));
        assert!(!is_history_variant("racex_time", "time"));
    }

    #[test]
    fn rules_apply_to_history_columns() {
        let mut table = Table::from_records(vec![
            record(json!({
                "id": "202405010811",
                "race_date": "2024-02-18",
                "finish_position": "1",
                "carried_weight": "58",
                "time": "1.35.6",
                "win_odds": "2.9",
                "race0_race_date": "2024-01-27",
                "race0_finish_position": "止",
                "race0_time": "",
            })),
            record(json!({
                "id": "202405010811",
                "race_date": "2024-02-18",
                "finish_position": "外",
            })),
            record(json!({
                "id": "202405010811",
                "race_date": "2024-02-18",
                "finish_position": "③",
                "carried_weight": "55▲",
                "win_odds": "(8.1)",
            })),
        ]);
        clean_table(&mut table, &CleaningConfig::default());

        assert_eq!(
            table.columns,
            vec![
                "id",
                "race_date_year",
                "race_date_month",
                "race_date_day",
                "finish_position",
                "carried_weight",
                "carried_weight_allowance",
                "time",
                "win_odds",
                "race0_race_date_year",
                "race0_race_date_month",
                "race0_race_date_day",
                "race0_finish_position",
                "race0_time",
            ]
        );
        assert_eq!(table.rows.len(), 2);

        let first = &table.rows[0];
        assert_eq!(first[1], json!(2024));
        assert_eq!(first[4], json!(1));
        assert_eq!(first[5], json!(58.0));
        assert_eq!(first[6], json!(0.0));
        assert_eq!(first[7], json!(95.6));
        assert_eq!(first[8], json!(2.9));
        assert_eq!(first[11], json!(27));
        assert_eq!(first[12], Value::Null);
        assert_eq!(first[13], Value::Null);

        let second = &table.rows[1];
        assert_eq!(second[4], json!(3));
        assert_eq!(second[5], json!(55.0));
        assert_eq!(second[6], json!(3.0));
        assert_eq!(second[7], Value::Null);
        assert_eq!(second[8], json!(0.0));
        assert_eq!(second[9], Value::Null);
    }

    #[test]
    fn excluded_rows_are_kept_on_demand() {
        let mut table = Table::from_records(vec![record(json!({"finish_position": "消"}))]);
        let config = CleaningConfig {
            drop_finish_excluded: false,
            ..Default::default()
        };
        clean_table(&mut table, &config);
        assert_eq!(table.rows, vec![vec![Value::Null]]);
    }
}

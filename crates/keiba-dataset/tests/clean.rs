use std::collections::HashMap;
use std::sync::Arc;

use keiba_crawler::{
    ensure_marker, EntityKind, EntityLoader, FetchError, PageFetcher, SchemaParser, SiteConfig,
};
use keiba_dataset::{clean_table, CleaningConfig, RowBuilder, Table};
use serde_json::{json, Value};

const RACE_RESULT: &str = include_str!("../../keiba-crawler/tests/fixtures/race_result.html");
const HORSE: &str = include_str!("../../keiba-crawler/tests/fixtures/horse.html");

#[derive(Default)]
struct StaticFetcher {
    pages: HashMap<String, &'static str>,
}

impl PageFetcher for StaticFetcher {
    fn fetch(&mut self, url: &str, ready_marker: &str) -> Result<String, FetchError> {
        let page = self.pages.get(url).copied().unwrap_or_default();
        ensure_marker(url, page, ready_marker)?;
        Ok(page.to_string())
    }
}

/// Rows of the fixture race, only the winner has a horse page.
fn scraped_table() -> Table {
    let site = SiteConfig::netkeiba().unwrap();
    let parser = Arc::new(SchemaParser::new(&site).unwrap());

    let mut races = StaticFetcher::default();
    races
        .pages
        .insert(site.result.url_for("202405010811"), RACE_RESULT);
    let mut horses = StaticFetcher::default();
    horses.pages.insert(site.horse.url_for("2018105165"), HORSE);

    let races = EntityLoader::new(EntityKind::Result, &site, races, parser.clone());
    let horses = EntityLoader::new(EntityKind::Horse, &site, horses, parser);
    let header_rows = races.header_rows();
    let mut builder = RowBuilder::new(races, horses, header_rows, 5);

    Table::from_records(builder.build_rows("202405010811").unwrap())
}

fn cell<'a>(table: &'a Table, column: &str) -> &'a Value {
    let i = table
        .column(column)
        .unwrap_or_else(|| panic!("no column {column} in {:?}", table.columns));
    &table.rows[0][i]
}

#[test]
fn scraped_formats_are_cleaned() {
    let mut table = scraped_table();
    assert_eq!(table.rows.len(), 1);
    assert_eq!(cell(&table, "time"), &json!("1:35.7"));
    assert_eq!(cell(&table, "race_meeting"), &json!("1回東京8日目"));
    assert_eq!(cell(&table, "race0_race_meeting"), &json!("1東京1"));

    clean_table(&mut table, &CleaningConfig::default());

    assert_eq!(cell(&table, "race_date_year"), &json!(2024));
    assert_eq!(cell(&table, "race_date_month"), &json!(2));
    assert_eq!(cell(&table, "race_date_day"), &json!(18));
    assert_eq!(cell(&table, "race_meeting_count"), &json!(1));
    assert_eq!(cell(&table, "race_meeting_day"), &json!(8));
    assert_eq!(cell(&table, "race_class"), &json!(4));
    assert_eq!(cell(&table, "track_condition"), &json!(1));
    assert_eq!(cell(&table, "finish_position"), &json!(1));
    assert_eq!(cell(&table, "carried_weight"), &json!(58.0));
    assert_eq!(cell(&table, "carried_weight_allowance"), &json!(0.0));
    assert_eq!(cell(&table, "time"), &json!(95.7));
    assert_eq!(cell(&table, "last_3f"), &json!(36.1));
    assert_eq!(cell(&table, "win_odds"), &json!(23.1));
}

#[test]
fn scraped_history_formats_are_cleaned() {
    let mut table = scraped_table();
    clean_table(&mut table, &CleaningConfig::default());

    // the race itself, run on the cutoff day, is not part of the history
    assert_eq!(cell(&table, "race0_race_date_day"), &json!(27));
    assert_eq!(cell(&table, "race0_race_meeting_count"), &json!(1));
    assert_eq!(cell(&table, "race0_race_meeting_day"), &json!(1));
    assert_eq!(cell(&table, "race0_time"), &json!(83.3));
    assert_eq!(cell(&table, "race0_track_condition"), &json!(2));
    assert_eq!(cell(&table, "race0_finish_position"), &json!(6));
    assert_eq!(cell(&table, "race0_carried_weight"), &json!(57.0));
    assert_eq!(cell(&table, "race0_win_odds"), &json!(8.5));
    assert!(table.column("race1_race_meeting_count").is_none());
}

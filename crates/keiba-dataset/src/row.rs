use keiba_crawler::{Loaded, Loader, Record};
use serde_json::Value;

use crate::error::RaceError;
use crate::history::{horse_features, race_date};

/// Race id field of an output row
pub const RACE_ID: &str = "id";
/// Horse id field of an entrant and of an output row
pub const HORSE_ID: &str = "horse_id";
/// `YYYY-MM-DD` date of a race or of a past race
pub const RACE_DATE: &str = "race_date";

pub const DEFAULT_HISTORY_DEPTH: usize = 5;

/// Joins each entrant of a race with the race itself and the entrant's recent history.
#[derive(Debug)]
pub struct RowBuilder<R, H> {
    races: R,
    horses: H,
    header_rows: usize,
    history_depth: usize,
}

impl<R, H> RowBuilder<R, H>
where
    R: Loader,
    H: Loader,
{
    /// `header_rows` leading entrants of every race are skipped.
    pub fn new(races: R, horses: H, header_rows: usize, history_depth: usize) -> Self {
        Self {
            races,
            horses,
            header_rows,
            history_depth,
        }
    }

    /// One row per entrant whose history could be loaded.
    ///
    /// A horse failing to load only drops its own row, the race still completes.
    pub fn build_rows(&mut self, race_id: &str) -> Result<Vec<Record>, RaceError> {
        let Loaded {
            primary: race,
            details: entrants,
        } = self.races.load(race_id)?;
        let cutoff = race_date(&race).ok_or_else(|| RaceError::MissingRaceDate {
            race_id: race_id.to_string(),
        })?;

        let mut rows = Vec::with_capacity(entrants.len());
        for entrant in entrants.into_iter().skip(self.header_rows) {
            let horse_id = match entrant.get(HORSE_ID).and_then(Value::as_str) {
                Some(horse_id) => horse_id.to_string(),
                None => {
                    log::warn!("Skipping entrant without {HORSE_ID} in race {race_id}");
                    continue;
                }
            };

            match horse_features(&mut self.horses, &horse_id, cutoff, self.history_depth) {
                Ok(history) => {
                    let mut row = Record::new();
                    row.insert(RACE_ID.into(), Value::String(race_id.to_string()));
                    row.extend(race.clone());
                    row.extend(entrant);
                    row.extend(history);
                    rows.push(row);
                }
                Err(e) => {
                    log::error!("Skipping horse {horse_id} of race {race_id} on {cutoff}: {e}");
                }
            }
        }

        Ok(rows)
    }
}

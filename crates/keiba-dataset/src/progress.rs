use std::collections::HashSet;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use keiba_crawler::Record;

use crate::row::{HORSE_ID, RACE_ID};

/// Identity of an output row, unique in the output store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub race_id: String,
    pub horse_id: String,
}

impl RowKey {
    pub fn of(row: &Record) -> Option<Self> {
        Some(Self {
            race_id: row.get(RACE_ID)?.as_str()?.to_string(),
            horse_id: row.get(HORSE_ID)?.as_str()?.to_string(),
        })
    }
}

/// What previous runs already wrote.
#[derive(Debug, Default)]
pub struct ProgressState {
    pub rows: HashSet<RowKey>,
    pub races: HashSet<String>,
}

impl ProgressState {
    /// Reads the output store and the processed races store, both may be missing.
    ///
    /// Lines that aren't a row with both ids, or aren't UTF-8, are skipped.
    pub fn load(output: &Path, processed: &Path) -> io::Result<Self> {
        let mut state = Self::default();

        let mut corrupt = 0;
        for line in lines(output)? {
            match serde_json::from_slice::<Record>(&line)
                .ok()
                .as_ref()
                .and_then(RowKey::of)
            {
                Some(key) => {
                    state.rows.insert(key);
                }
                None if line.iter().all(u8::is_ascii_whitespace) => (),
                None => corrupt += 1,
            }
        }
        if corrupt > 0 {
            log::debug!("Skipped {corrupt} corrupt lines of {}", output.display());
        }

        for line in lines(processed)? {
            match String::from_utf8(line) {
                Ok(race_id) if !race_id.trim().is_empty() => {
                    state.races.insert(race_id.trim().to_string());
                }
                Ok(_) => (),
                Err(_) => log::debug!("Skipped a corrupt line of {}", processed.display()),
            }
        }

        Ok(state)
    }

    pub fn is_processed(&self, race_id: &str) -> bool {
        self.races.contains(race_id)
    }

    /// Races of `race_ids` not processed yet, in input order.
    pub fn remaining<'a>(&self, race_ids: &'a [String]) -> Vec<&'a str> {
        race_ids
            .iter()
            .map(String::as_str)
            .filter(|race_id| !self.is_processed(race_id))
            .collect()
    }
}

fn lines(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    match fs_err::File::open(path) {
        Ok(file) => BufReader::new(file).split(b'\n').collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(vec![]),
        Err(e) => Err(e),
    }
}

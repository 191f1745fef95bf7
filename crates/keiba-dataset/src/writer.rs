use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Error};
use crossbeam_channel::Receiver;
use keiba_crawler::Record;

use crate::error::RaceError;
use crate::progress::{ProgressState, RowKey};
use crate::scrapable::RaceScraper;
use crate::store::AppendFile;

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    /// Newline delimited JSON rows
    pub output: PathBuf,
    /// Newline delimited ids of processed races
    pub processed: PathBuf,
    pub num_workers: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Races given as input
    pub total: usize,
    /// Input races processed by a previous run
    pub skipped: usize,
    /// Races processed by this run
    pub completed: usize,
    /// Races that failed and stay unprocessed
    pub failed: usize,
    pub rows_written: usize,
    /// Rows already present in the output store
    pub rows_duplicate: usize,
}

struct RaceOutcome {
    race_id: String,
    rows: Result<Vec<Record>, RaceError>,
}

/// Builds the rows of every race of `race_ids` not yet processed and appends them to
/// the output store.
///
/// Races are spread over `num_workers` threads, each owning its own scraper for its
/// whole lifetime. Rows are consumed here as races complete: a row is written unless
/// its (race, horse) pair already is, then the race is marked processed once its rows
/// are flushed. Failed races are logged and left for the next run.
pub fn build_dataset<T>(
    race_ids: &[String],
    opts: &DatasetOptions,
    scraper_conf: &T::Config,
) -> anyhow::Result<Summary>
where
    T: RaceScraper,
{
    let mut progress = ProgressState::load(&opts.output, &opts.processed)
        .context("Couldn't load previous progress")?;
    let remaining = progress.remaining(race_ids);
    let mut summary = Summary {
        total: race_ids.len(),
        skipped: race_ids.len() - remaining.len(),
        ..Default::default()
    };

    let num_workers = opts.num_workers.clamp(1, remaining.len().max(1));
    log::info!(
        "Starting to process {} races using {num_workers} workers",
        summary.total
    );
    log::info!("Skipping {} races already processed", summary.skipped);

    let mut rows_out = AppendFile::open(&opts.output)
        .with_context(|| format!("Couldn't open {}", opts.output.display()))?;
    let mut races_out = AppendFile::open(&opts.processed)
        .with_context(|| format!("Couldn't open {}", opts.processed.display()))?;

    if remaining.is_empty() {
        log::info!("Nothing left to process");
        return Ok(summary);
    }

    let (tx_race, rx_race) = crossbeam_channel::unbounded::<String>();
    let (tx_outcome, rx_outcome) = crossbeam_channel::unbounded::<RaceOutcome>();
    for race_id in remaining {
        tx_race.send(race_id.to_string()).ok();
    }
    drop(tx_race);

    // Workers

    let stop = Arc::new(AtomicBool::new(false));
    let mut workers = vec![];
    for id in 0..num_workers {
        let rx_race = rx_race.clone();
        let tx_outcome = tx_outcome.clone();
        let scraper_conf = scraper_conf.clone();
        let stop = stop.clone();
        let worker = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || {
                let mut scraper = T::new(&scraper_conf)?;
                log::debug!("Worker {id} started");
                for race_id in rx_race.iter() {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let rows = panic::catch_unwind(AssertUnwindSafe(|| {
                        scraper.scrape_race(&race_id)
                    }))
                    .unwrap_or_else(|payload| {
                        Err(RaceError::Panicked {
                            race_id: race_id.clone(),
                            message: panic_message(payload),
                        })
                    });
                    if tx_outcome.send(RaceOutcome { race_id, rows }).is_err() {
                        break;
                    }
                }
                log::debug!("Worker {id} stopped");
                Ok::<(), Error>(())
            })?;
        workers.push(worker);
    }
    drop(tx_outcome);
    drop(rx_race);

    // Consumer

    let consumed = consume(
        rx_outcome,
        &mut progress,
        &mut rows_out,
        &mut races_out,
        &mut summary,
    );
    if consumed.is_err() {
        stop.store(true, Ordering::SeqCst);
    }

    let mut started = 0;
    let mut start_error = None;
    for w in workers {
        match w.join() {
            Ok(Ok(())) => started += 1,
            Ok(Err(e)) => {
                log::error!("Worker couldn't start: {e:#}");
                start_error.get_or_insert(e);
            }
            Err(payload) => log::error!("Worker crashed: {}", panic_message(payload)),
        }
    }
    consumed?;
    if started == 0 {
        if let Some(e) = start_error {
            return Err(e.context("No worker could start"));
        }
    }

    log::info!(
        "Finished saving race data: {} races done, {} failed, {} rows written",
        summary.completed,
        summary.failed,
        summary.rows_written
    );
    Ok(summary)
}

fn consume(
    rx_outcome: Receiver<RaceOutcome>,
    progress: &mut ProgressState,
    rows_out: &mut AppendFile,
    races_out: &mut AppendFile,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    for RaceOutcome { race_id, rows } in rx_outcome {
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                log::error!("Failed race {race_id}: {e}");
                summary.failed += 1;
                continue;
            }
        };

        for row in rows {
            let key = match RowKey::of(&row) {
                Some(key) => key,
                None => {
                    log::warn!("Skipping a row of race {race_id} without race or horse id");
                    continue;
                }
            };
            if progress.rows.contains(&key) {
                summary.rows_duplicate += 1;
                continue;
            }
            rows_out.append_record(&row)?;
            progress.rows.insert(key);
            summary.rows_written += 1;
        }
        rows_out.flush()?;

        races_out.append_line(&race_id)?;
        races_out.flush()?;
        progress.races.insert(race_id);
        summary.completed += 1;

        log::info!(
            "{}/{} races done",
            summary.skipped + summary.completed,
            summary.total
        );
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}

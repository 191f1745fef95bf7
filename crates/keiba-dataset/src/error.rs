use keiba_crawler::LoadError;
use thiserror::Error;

/// Failure of a whole race, it yields no rows and stays unprocessed.
#[derive(Debug, Error)]
pub enum RaceError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("race {race_id} has no readable race date")]
    MissingRaceDate { race_id: String },
    #[error("building rows of race {race_id} panicked: {message}")]
    Panicked { race_id: String, message: String },
}

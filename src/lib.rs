use failure::Fail;

pub mod railway;
pub mod instance;
pub mod simulation;
pub mod planner;
pub mod input;
pub mod output;

use std::path::Path;

/// Error kinds shared by all components. Data-structure methods fail fast
/// and leave the structure unchanged on error.
#[derive(Debug, Fail)]
pub enum RailError {
    #[fail(display = "invalid input: {}", _0)]
    InvalidInput(String),
    #[fail(display = "not found: {}", _0)]
    NotFound(String),
    #[fail(display = "duplicate name: {}", _0)]
    Duplicate(String),
    #[fail(display = "consistency violation: {}", _0)]
    Consistency(String),
    #[fail(display = "out of range: {}", _0)]
    OutOfRange(String),
    #[fail(display = "io failure: {}", _0)]
    IoFailure(String),
}

pub type Result<T> = std::result::Result<T, RailError>;

/// Result type used by application-level code (the CLI wrapper).
pub type AppResult<T> = std::result::Result<T, failure::Error>;

impl From<std::io::Error> for RailError {
    fn from(e: std::io::Error) -> RailError {
        RailError::IoFailure(e.to_string())
    }
}

impl From<serde_json::Error> for RailError {
    fn from(e: serde_json::Error) -> RailError {
        RailError::IoFailure(e.to_string())
    }
}

pub fn read_file(f: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(f)
        .map_err(|e| RailError::IoFailure(format!("{}: {}", f.display(), e)))?;
    Ok(contents)
}

/// Load a full problem instance from a directory laid out as
/// `network/`, `timetable/` and (optionally) `routes/`.
pub fn get_instance(
    dir: &Path,
    every_train_must_have_route: bool,
) -> Result<instance::VssGenerationTimetable> {
    input::import_instance(dir, every_train_must_have_route)
}

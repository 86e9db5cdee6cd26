//! Dimension table loaders
//!
//! Airports come from OpenFlights `airports.dat`, carriers and dates are
//! derived from the flight files themselves. Every loader inserts-or-ignores,
//! so rerunning one never changes rows that already exist.

pub mod airports;
pub mod carriers;
pub mod dates;

pub use airports::{load_airports, parse_airports, Airport, AirportParse};
pub use carriers::{carrier_name, collect_carriers, insert_carriers, load_carriers, Carrier};
pub use dates::{ensure_dates_exist, DateRow};

use csv::{Reader, ReaderBuilder};
use fdw_common::{Error, Result};
use std::fs::File;
use std::path::PathBuf;

/// Run a CSV read on the blocking pool with a header row
pub(crate) async fn read_csv_blocking<T, F>(path: PathBuf, read: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Reader<File>) -> std::result::Result<T, csv::Error> + Send + 'static,
{
    read_blocking(path, true, read).await
}

async fn read_blocking<T, F>(path: PathBuf, has_headers: bool, read: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Reader<File>) -> std::result::Result<T, csv::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut reader = ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| csv_error(&path, e))?;
        read(&mut reader).map_err(|e| csv_error(&path, e))
    })
    .await
    .map_err(|e| Error::Internal(format!("CSV read task failed: {}", e)))?
}

fn csv_error(path: &std::path::Path, err: csv::Error) -> Error {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        other => Error::InvalidInput(format!("{}: {:?}", path.display(), other)),
    }
}

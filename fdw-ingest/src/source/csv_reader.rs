//! Streaming reader for BTS flight CSV files
//!
//! Parsing runs on a blocking thread and hands records to the async side over
//! a bounded channel, so at most `capacity` parsed rows wait in memory no
//! matter how large the file is.

use csv::{ByteRecord, ReaderBuilder, StringRecord, WriterBuilder};
use futures::Stream;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

use super::columns::{self as col, HeaderIndex};
use super::convert::{flag, normalize_date, optional_float, optional_int, optional_text};
use crate::error::{LoadError, LoadResult};
use crate::models::{FactRecord, FlightMeasures, MalformedField};

/// Parsed rows buffered between the reader thread and the loader
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4_096;

/// A flight CSV file on disk
#[derive(Debug, Clone)]
pub struct FlightCsvSource {
    path: PathBuf,
    capacity: usize,
}

impl FlightCsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the run is tracked under: the final path component
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Stream the file's records; opening or framing errors arrive as `Err` items
    pub fn records(self) -> impl Stream<Item = LoadResult<FactRecord>> + Send + 'static {
        let path = self.path;
        let capacity = self.capacity;
        spawn_reader(capacity, move || {
            File::open(&path).map_err(|e| {
                LoadError::Stream(format!("Cannot open {}: {}", path.display(), e))
            })
        })
    }
}

/// Stream records from any reader (tests, stdin, in-memory buffers)
pub fn records_from_reader<R>(
    reader: R,
    capacity: usize,
) -> impl Stream<Item = LoadResult<FactRecord>> + Send + 'static
where
    R: Read + Send + 'static,
{
    spawn_reader(capacity.max(1), move || Ok(reader))
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn spawn_reader<R, F>(
    capacity: usize,
    open: F,
) -> impl Stream<Item = LoadResult<FactRecord>> + Send + 'static
where
    R: Read,
    F: FnOnce() -> LoadResult<R> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<LoadResult<FactRecord>>(capacity);

    let handle = tokio::task::spawn_blocking(move || {
        let reader = match open() {
            Ok(reader) => reader,
            Err(err) => {
                let _ = tx.blocking_send(Err(err));
                return;
            }
        };
        read_rows(reader, &tx);
    });

    async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
        // Channel closed: the reader finished, or panicked before finishing
        if let Err(err) = handle.await {
            yield Err(LoadError::Stream(format!("CSV reader task failed: {}", err)));
        }
    }
}

fn read_rows<R: Read>(reader: R, tx: &mpsc::Sender<LoadResult<FactRecord>>) {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let index = match csv_reader.headers() {
        Ok(headers) => HeaderIndex::new(headers),
        Err(err) => {
            let _ = tx.blocking_send(Err(err.into()));
            return;
        }
    };

    let missing = index.missing(&col::REQUIRED);
    if !missing.is_empty() {
        let _ = tx.blocking_send(Err(LoadError::Stream(format!(
            "Missing required column(s): {}",
            missing.join(", ")
        ))));
        return;
    }

    // Rows are read as bytes so one badly encoded row is rejected on its own
    let mut rows = 0u64;
    let mut bytes = ByteRecord::new();
    loop {
        match csv_reader.read_byte_record(&mut bytes) {
            Ok(true) => {
                rows += 1;
                if tx.blocking_send(Ok(parse_byte_row(rows, &index, &bytes))).is_err() {
                    debug!(rows, "Record consumer went away, stopping reader");
                    return;
                }
            }
            Ok(false) => break,
            Err(err) => {
                let _ = tx.blocking_send(Err(err.into()));
                return;
            }
        }
    }

    debug!(rows, "CSV reader finished");
}

/// Decode and convert one raw CSV row.
///
/// A field that is not valid UTF-8 marks the record malformed; the row is
/// decoded lossily so the rejection still carries a readable payload.
pub fn parse_byte_row(row_number: u64, index: &HeaderIndex, bytes: &ByteRecord) -> FactRecord {
    let (row, bad_field) = decode_row(bytes);
    let mut record = parse_row(row_number, index, &row);
    if let Some(position) = bad_field {
        record.malformed = Some(MalformedField {
            field: index.name_at(position).unwrap_or("unnamed column").to_string(),
            value: row.get(position).unwrap_or("").to_string(),
        });
    }
    record
}

/// Decode a raw row as UTF-8, falling back to a lossy decode.
///
/// The second value is the position of the first field that was not valid UTF-8.
pub fn decode_row(bytes: &ByteRecord) -> (StringRecord, Option<usize>) {
    match StringRecord::from_byte_record(bytes.clone()) {
        Ok(row) => (row, None),
        Err(err) => {
            let lossy = bytes
                .iter()
                .map(|field| String::from_utf8_lossy(field))
                .collect();
            (lossy, Some(err.utf8_error().field()))
        }
    }
}

/// Convert one CSV row; conversion problems become a malformed-field marker
pub fn parse_row(row_number: u64, index: &HeaderIndex, row: &StringRecord) -> FactRecord {
    let mut malformed: Option<MalformedField> = None;
    let mut mark = |field: &str, value: &str| {
        if malformed.is_none() {
            malformed = Some(MalformedField {
                field: field.to_string(),
                value: value.to_string(),
            });
        }
    };

    let flight_number_text = index.get(row, col::FLIGHT_NUMBER);
    let flight_number = match optional_int(flight_number_text) {
        Ok(Some(number)) => Some(number),
        Ok(None) => {
            mark(col::FLIGHT_NUMBER, "");
            None
        }
        Err(_) => {
            mark(col::FLIGHT_NUMBER, flight_number_text);
            None
        }
    };

    let scheduled_dep = optional_text(index.get(row, col::SCHEDULED_DEP));
    if scheduled_dep.is_none() {
        mark(col::SCHEDULED_DEP, "");
    }

    let mut float = |column: &str| -> Option<f64> {
        let text = index.get(row, column);
        optional_float(text).unwrap_or_else(|_| {
            mark(column, text);
            None
        })
    };

    let measures = FlightMeasures {
        dep_delay: float(col::DEP_DELAY),
        dep_delay_minutes: float(col::DEP_DELAY_MINUTES),
        arr_delay: float(col::ARR_DELAY),
        arr_delay_minutes: float(col::ARR_DELAY_MINUTES),
        distance: float(col::DISTANCE),
        air_time: float(col::AIR_TIME),
        scheduled_elapsed: float(col::SCHEDULED_ELAPSED),
        actual_elapsed: float(col::ACTUAL_ELAPSED),
        carrier_delay: float(col::CARRIER_DELAY),
        weather_delay: float(col::WEATHER_DELAY),
        nas_delay: float(col::NAS_DELAY),
        security_delay: float(col::SECURITY_DELAY),
        late_aircraft_delay: float(col::LATE_AIRCRAFT_DELAY),
        tail_number: optional_text(index.get(row, col::TAIL_NUMBER)),
        origin_city: optional_text(index.get(row, col::ORIGIN_CITY)),
        origin_state: optional_text(index.get(row, col::ORIGIN_STATE)),
        dest_city: optional_text(index.get(row, col::DEST_CITY)),
        dest_state: optional_text(index.get(row, col::DEST_STATE)),
        actual_dep: optional_text(index.get(row, col::ACTUAL_DEP)),
        dep_delay_15: flag(index.get(row, col::DEP_DEL15)),
        scheduled_arr: optional_text(index.get(row, col::SCHEDULED_ARR)),
        actual_arr: optional_text(index.get(row, col::ACTUAL_ARR)),
        arr_delay_15: flag(index.get(row, col::ARR_DEL15)),
        cancelled: flag(index.get(row, col::CANCELLED)),
        cancellation_code: optional_text(index.get(row, col::CANCELLATION_CODE)),
        diverted: flag(index.get(row, col::DIVERTED)),
    };

    FactRecord {
        row_number,
        flight_date: normalize_date(index.get(row, col::FLIGHT_DATE)),
        carrier_code: index.get(row, col::CARRIER).to_string(),
        flight_number,
        origin_airport: index.get(row, col::ORIGIN).to_string(),
        dest_airport: index.get(row, col::DEST).to_string(),
        scheduled_dep,
        measures,
        malformed,
        raw: raw_payload(row),
    }
}

/// The row as a CSV line, quoted where needed so it splits back into the same fields
pub(crate) fn raw_payload(row: &StringRecord) -> String {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    if writer.write_record(row).is_ok() {
        if let Ok(line) = writer.into_inner() {
            return String::from_utf8_lossy(&line)
                .trim_end_matches(|c: char| c == '\r' || c == '\n')
                .to_string();
        }
    }
    row.iter().collect::<Vec<_>>().join(",")
}

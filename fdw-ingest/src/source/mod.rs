//! Record sources for the fact loader

pub mod columns;
pub mod convert;
pub mod csv_reader;

pub use csv_reader::{file_name_of, records_from_reader, FlightCsvSource, DEFAULT_CHANNEL_CAPACITY};

use std::path::{Path, PathBuf};

/// Expand file and directory arguments into flight CSV paths.
///
/// Directories contribute their `.csv` files, sorted by name; files whose name
/// mentions "airport" or "weather" are skipped since they are loaded separately.
pub fn flight_files(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_flight_csv(path))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

fn is_flight_csv(path: &Path) -> bool {
    let name = file_name_of(path).to_lowercase();
    name.ends_with(".csv") && !name.contains("airport") && !name.contains("weather")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_expansion() {
        let dir = TempDir::new().unwrap();
        for name in ["b.csv", "a.csv", "airports.csv", "weather_2025.csv", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let explicit = PathBuf::from("/data/explicit.csv");

        let files = flight_files(&[dir.path().to_path_buf(), explicit.clone()]).unwrap();
        let names: Vec<String> = files.iter().map(|p| file_name_of(p)).collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "explicit.csv"]);
    }
}

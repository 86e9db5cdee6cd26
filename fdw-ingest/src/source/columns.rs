//! BTS on-time performance column names

use csv::StringRecord;
use std::collections::HashMap;

pub const FLIGHT_DATE: &str = "FlightDate";
pub const CARRIER: &str = "Reporting_Airline";
pub const CARRIER_DOT_ID: &str = "DOT_ID_Reporting_Airline";
pub const FLIGHT_NUMBER: &str = "Flight_Number_Reporting_Airline";
pub const TAIL_NUMBER: &str = "Tail_Number";
pub const ORIGIN: &str = "Origin";
pub const ORIGIN_CITY: &str = "OriginCityName";
pub const ORIGIN_STATE: &str = "OriginState";
pub const DEST: &str = "Dest";
pub const DEST_CITY: &str = "DestCityName";
pub const DEST_STATE: &str = "DestState";
pub const SCHEDULED_DEP: &str = "CRSDepTime";
pub const ACTUAL_DEP: &str = "DepTime";
pub const DEP_DELAY: &str = "DepDelay";
pub const DEP_DELAY_MINUTES: &str = "DepDelayMinutes";
pub const DEP_DEL15: &str = "DepDel15";
pub const SCHEDULED_ARR: &str = "CRSArrTime";
pub const ACTUAL_ARR: &str = "ArrTime";
pub const ARR_DELAY: &str = "ArrDelay";
pub const ARR_DELAY_MINUTES: &str = "ArrDelayMinutes";
pub const ARR_DEL15: &str = "ArrDel15";
pub const CANCELLED: &str = "Cancelled";
pub const CANCELLATION_CODE: &str = "CancellationCode";
pub const DIVERTED: &str = "Diverted";
pub const DISTANCE: &str = "Distance";
pub const AIR_TIME: &str = "AirTime";
pub const SCHEDULED_ELAPSED: &str = "CRSElapsedTime";
pub const ACTUAL_ELAPSED: &str = "ActualElapsedTime";
pub const CARRIER_DELAY: &str = "CarrierDelay";
pub const WEATHER_DELAY: &str = "WeatherDelay";
pub const NAS_DELAY: &str = "NASDelay";
pub const SECURITY_DELAY: &str = "SecurityDelay";
pub const LATE_AIRCRAFT_DELAY: &str = "LateAircraftDelay";

/// Columns a flight file cannot be loaded without
pub const REQUIRED: [&str; 6] = [FLIGHT_DATE, CARRIER, FLIGHT_NUMBER, ORIGIN, DEST, SCHEDULED_DEP];

/// Header name to column position.
///
/// Missing optional columns read as empty.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
    names: Vec<String>,
}

impl HeaderIndex {
    pub fn new(headers: &StringRecord) -> Self {
        let names: Vec<String> = headers.iter().map(|name| name.trim().to_string()).collect();
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { positions, names }
    }

    /// Header name of the column at `position`
    pub fn name_at(&self, position: usize) -> Option<&str> {
        self.names.get(position).map(String::as_str)
    }

    /// Names from `required` absent from the header
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|name| !self.positions.contains_key(*name))
            .collect()
    }

    /// Trimmed field value, empty when the column or field is absent
    pub fn get<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        self.positions
            .get(column)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let headers = StringRecord::from(vec!["FlightDate", " Origin ", "Dest"]);
        let index = HeaderIndex::new(&headers);
        let row = StringRecord::from(vec!["2025-01-01", " JFK", "LAX"]);

        assert_eq!(index.get(&row, ORIGIN), "JFK");
        assert_eq!(index.get(&row, TAIL_NUMBER), "");
        assert_eq!(index.missing(&REQUIRED), vec![CARRIER, FLIGHT_NUMBER, SCHEDULED_DEP]);
    }
}

//! One parsed source row

use serde::Serialize;

/// Business key of a flight; the fact sink resolves conflicts on it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NaturalKey {
    pub flight_date: String,
    pub carrier_code: String,
    pub flight_number: Option<i64>,
    pub origin_airport: String,
    pub scheduled_dep: Option<String>,
}

/// A field that could not be converted to its column type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedField {
    pub field: String,
    pub value: String,
}

/// Non-key attributes of a flight
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlightMeasures {
    pub tail_number: Option<String>,
    pub origin_city: Option<String>,
    pub origin_state: Option<String>,
    pub dest_city: Option<String>,
    pub dest_state: Option<String>,
    pub actual_dep: Option<String>,
    pub dep_delay: Option<f64>,
    pub dep_delay_minutes: Option<f64>,
    pub dep_delay_15: bool,
    pub scheduled_arr: Option<String>,
    pub actual_arr: Option<String>,
    pub arr_delay: Option<f64>,
    pub arr_delay_minutes: Option<f64>,
    pub arr_delay_15: bool,
    pub cancelled: bool,
    pub cancellation_code: Option<String>,
    pub diverted: bool,
    pub distance: Option<f64>,
    pub air_time: Option<f64>,
    pub scheduled_elapsed: Option<f64>,
    pub actual_elapsed: Option<f64>,
    pub carrier_delay: Option<f64>,
    pub weather_delay: Option<f64>,
    pub nas_delay: Option<f64>,
    pub security_delay: Option<f64>,
    pub late_aircraft_delay: Option<f64>,
}

/// One flight row as read from a source file.
///
/// Lives only for the chunk it belongs to. Key fields are kept as trimmed
/// strings even when they are empty so validation can report them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRecord {
    /// 1-based data row within the source file
    pub row_number: u64,
    pub flight_date: String,
    pub carrier_code: String,
    pub flight_number: Option<i64>,
    pub origin_airport: String,
    pub dest_airport: String,
    pub scheduled_dep: Option<String>,
    pub measures: FlightMeasures,
    /// First field that failed conversion, if any
    pub malformed: Option<MalformedField>,
    /// Original row payload
    pub raw: String,
}

impl FactRecord {
    /// Build a record from key fields only; measures default to empty.
    pub fn flight(
        row_number: u64,
        flight_date: &str,
        carrier_code: &str,
        flight_number: i64,
        origin_airport: &str,
        dest_airport: &str,
        scheduled_dep: &str,
    ) -> Self {
        let raw = format!(
            "{},{},{},{},{},{}",
            flight_date, carrier_code, flight_number, origin_airport, dest_airport, scheduled_dep
        );
        Self {
            row_number,
            flight_date: flight_date.to_string(),
            carrier_code: carrier_code.to_string(),
            flight_number: Some(flight_number),
            origin_airport: origin_airport.to_string(),
            dest_airport: dest_airport.to_string(),
            scheduled_dep: Some(scheduled_dep.to_string()),
            measures: FlightMeasures::default(),
            malformed: None,
            raw,
        }
    }

    pub fn with_measures(mut self, measures: FlightMeasures) -> Self {
        self.measures = measures;
        self
    }

    pub fn with_malformed(mut self, field: &str, value: &str) -> Self {
        self.malformed = Some(MalformedField {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            flight_date: self.flight_date.clone(),
            carrier_code: self.carrier_code.clone(),
            flight_number: self.flight_number,
            origin_airport: self.origin_airport.clone(),
            scheduled_dep: self.scheduled_dep.clone(),
        }
    }
}

//! Per-record load outcome

use serde::Serialize;
use std::fmt;

/// Why a record was not loaded.
///
/// Variants are listed in precedence order: when several apply, the first
/// one wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    UnknownCarrier(String),
    UnknownOriginAirport(String),
    UnknownDestinationAirport(String),
    UnknownFlightDate(String),
    MalformedField { field: String, value: String },
    /// Natural key already seen earlier in the same run
    DuplicateWithinBatch { first_row: u64 },
}

impl RejectionReason {
    /// Stable label stored in `rejected_records.rejection_reason`
    pub fn label(&self) -> &'static str {
        match self {
            RejectionReason::UnknownCarrier(_) => "unknown carrier",
            RejectionReason::UnknownOriginAirport(_) => "unknown origin airport",
            RejectionReason::UnknownDestinationAirport(_) => "unknown destination airport",
            RejectionReason::UnknownFlightDate(_) => "unknown flight date",
            RejectionReason::MalformedField { .. } => "malformed field",
            RejectionReason::DuplicateWithinBatch { .. } => "duplicate-within-batch",
        }
    }

    /// Offending value, stored in `rejected_records.rejection_detail`
    pub fn detail(&self) -> Option<String> {
        match self {
            RejectionReason::UnknownCarrier(code)
            | RejectionReason::UnknownOriginAirport(code)
            | RejectionReason::UnknownDestinationAirport(code)
            | RejectionReason::UnknownFlightDate(code) => Some(code.clone()),
            RejectionReason::MalformedField { field, value } => {
                Some(format!("{}={:?}", field, value))
            }
            RejectionReason::DuplicateWithinBatch { first_row } => {
                Some(format!("first seen at row {}", first_row))
            }
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {}", self.label(), detail),
            None => f.write_str(self.label()),
        }
    }
}

/// Result of validating one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Accepted,
    Rejected(RejectionReason),
}

impl LoadOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, LoadOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(RejectionReason::UnknownCarrier("ZZ".into()).label(), "unknown carrier");
        assert_eq!(
            RejectionReason::DuplicateWithinBatch { first_row: 1 }.label(),
            "duplicate-within-batch"
        );
    }

    #[test]
    fn test_display_includes_detail() {
        let reason = RejectionReason::UnknownOriginAirport("XXX".into());
        assert_eq!(reason.to_string(), "unknown origin airport: XXX");

        let malformed = RejectionReason::MalformedField {
            field: "Flight_Number_Reporting_Airline".into(),
            value: "abc".into(),
        };
        assert_eq!(
            malformed.to_string(),
            "malformed field: Flight_Number_Reporting_Airline=\"abc\""
        );
    }
}

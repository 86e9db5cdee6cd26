//! Referential validation of fact records
//!
//! Checks run in a fixed order and the first failure decides the reason:
//! carrier, origin airport, destination airport, flight date, malformed
//! field, duplicate natural key.

use std::collections::HashMap;

use crate::models::{DimensionSnapshot, FactRecord, LoadOutcome, NaturalKey, RejectionReason};

/// Accepted and rejected records of one chunk, in input order
#[derive(Debug, Default)]
pub struct ChunkPartition {
    pub accepted: Vec<FactRecord>,
    pub rejected: Vec<(FactRecord, RejectionReason)>,
}

impl ChunkPartition {
    pub fn len(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validator for one run.
///
/// Remembers the natural keys it has accepted so duplicates are caught across
/// chunk boundaries too; that keeps results independent of the chunk size.
#[derive(Debug)]
pub struct RecordValidator {
    snapshot: DimensionSnapshot,
    accepted_keys: HashMap<NaturalKey, u64>,
}

impl RecordValidator {
    pub fn new(snapshot: DimensionSnapshot) -> Self {
        Self {
            snapshot,
            accepted_keys: HashMap::new(),
        }
    }

    /// Validate one record; accepted records are remembered for duplicate detection
    pub fn validate(&mut self, record: &FactRecord) -> LoadOutcome {
        if let Some(reason) = self.reference_failure(record) {
            return LoadOutcome::Rejected(reason);
        }

        if let Some(reason) = malformed_failure(record) {
            return LoadOutcome::Rejected(reason);
        }

        let key = record.natural_key();
        if let Some(&first_row) = self.accepted_keys.get(&key) {
            return LoadOutcome::Rejected(RejectionReason::DuplicateWithinBatch { first_row });
        }
        self.accepted_keys.insert(key, record.row_number);

        LoadOutcome::Accepted
    }

    /// Split a chunk into accepted and rejected records
    pub fn partition(&mut self, chunk: Vec<FactRecord>) -> ChunkPartition {
        let mut partition = ChunkPartition::default();
        for record in chunk {
            match self.validate(&record) {
                LoadOutcome::Accepted => partition.accepted.push(record),
                LoadOutcome::Rejected(reason) => partition.rejected.push((record, reason)),
            }
        }
        partition
    }

    fn reference_failure(&self, record: &FactRecord) -> Option<RejectionReason> {
        if !self.snapshot.carriers.contains(&record.carrier_code) {
            return Some(RejectionReason::UnknownCarrier(record.carrier_code.clone()));
        }
        if !self.snapshot.airports.contains(&record.origin_airport) {
            return Some(RejectionReason::UnknownOriginAirport(record.origin_airport.clone()));
        }
        if !self.snapshot.airports.contains(&record.dest_airport) {
            return Some(RejectionReason::UnknownDestinationAirport(record.dest_airport.clone()));
        }
        if !self.snapshot.dates.contains(&record.flight_date) {
            return Some(RejectionReason::UnknownFlightDate(record.flight_date.clone()));
        }
        None
    }
}

fn malformed_failure(record: &FactRecord) -> Option<RejectionReason> {
    if let Some(malformed) = &record.malformed {
        return Some(RejectionReason::MalformedField {
            field: malformed.field.clone(),
            value: malformed.value.clone(),
        });
    }
    if record.flight_number.is_none() {
        return Some(RejectionReason::MalformedField {
            field: "flight_number".to_string(),
            value: String::new(),
        });
    }
    if record.scheduled_dep.is_none() {
        return Some(RejectionReason::MalformedField {
            field: "scheduled_dep".to_string(),
            value: String::new(),
        });
    }
    None
}

//! MRU records, per-machine snapshots and the merge rule

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default number of records kept in a view or snapshot
pub const DEFAULT_TOP_N: usize = 20;

/// A visited agenda item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MruRecord {
    /// Stable identity of the visited item
    pub id_ref: String,

    /// Display title
    pub title: String,

    /// When the item (meeting, talk) starts
    pub start_time: DateTime<Utc>,

    /// When it was last opened on any device
    pub last_looked_at: DateTime<Utc>,
}

impl MruRecord {
    /// Create a record visited now
    pub fn visited(
        id_ref: impl Into<String>,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id_ref: id_ref.into(),
            title: title.into(),
            start_time,
            last_looked_at: Utc::now(),
        }
    }
}

/// One device's published top-N records
///
/// Always written whole; a snapshot replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSnapshot {
    /// Device that wrote the snapshot
    pub machine_name: String,

    /// Records in the device's MRU order
    pub records: Vec<MruRecord>,
}

impl MachineSnapshot {
    /// Create a snapshot
    pub fn new(machine_name: impl Into<String>, records: Vec<MruRecord>) -> Self {
        Self {
            machine_name: machine_name.into(),
            records,
        }
    }
}

/// Deduplicated, start-time ordered view across all devices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergedMruView {
    /// Records, latest `start_time` first
    pub records: Vec<MruRecord>,
}

impl MergedMruView {
    /// Identities in view order
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id_ref.as_str()).collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the view is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Same records in the same order, ignoring other fields
    pub fn same_order(&self, other: &MergedMruView) -> bool {
        self.records.len() == other.records.len()
            && self
                .records
                .iter()
                .zip(&other.records)
                .all(|(a, b)| a.id_ref == b.id_ref)
    }
}

/// Merge record sets into one view
///
/// Duplicates by `id_ref` resolve to the greatest `last_looked_at`, taking
/// all of that record's fields. Ties keep the record seen first. This is
/// wall-clock last-write-wins: a device with a fast clock wins conflicts.
pub fn merge<'a, I>(sources: I, top_n: usize) -> MergedMruView
where
    I: IntoIterator<Item = &'a [MruRecord]>,
{
    let mut latest: HashMap<&str, &MruRecord> = HashMap::new();
    for record in sources.into_iter().flatten() {
        latest
            .entry(record.id_ref.as_str())
            .and_modify(|kept| {
                if record.last_looked_at > kept.last_looked_at {
                    *kept = record;
                }
            })
            .or_insert(record);
    }

    let mut records: Vec<MruRecord> = latest.into_values().cloned().collect();
    records.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| a.id_ref.cmp(&b.id_ref))
    });
    records.truncate(top_n);

    MergedMruView { records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn record(id: &str, start: i64, looked: i64) -> MruRecord {
        MruRecord {
            id_ref: id.to_string(),
            title: format!("Meeting {}", id),
            start_time: at(start),
            last_looked_at: at(looked),
        }
    }

    #[test]
    fn latest_look_wins_with_all_fields() {
        let local = vec![record("m1", 1, 1)];
        let mut remote_m1 = record("m1", 5, 2);
        remote_m1.title = "Renamed".to_string();
        let remote = vec![remote_m1];

        let view = merge([local.as_slice(), remote.as_slice()], DEFAULT_TOP_N);

        assert_eq!(view.len(), 1);
        assert_eq!(view.records[0].last_looked_at, at(2));
        assert_eq!(view.records[0].title, "Renamed");
        assert_eq!(view.records[0].start_time, at(5));
    }

    #[test]
    fn truncates_and_orders_by_start_time() {
        let local: Vec<MruRecord> = (0..25).map(|i| record(&format!("m{}", i), i, 0)).collect();

        let view = merge([local.as_slice()], DEFAULT_TOP_N);

        assert_eq!(view.len(), 20);
        assert_eq!(view.records[0].id_ref, "m24");
        assert_eq!(view.records[19].id_ref, "m5");
        assert!(view
            .records
            .windows(2)
            .all(|w| w[0].start_time >= w[1].start_time));
    }

    #[test]
    fn same_order_ignores_other_fields() {
        let a = merge([[record("m1", 1, 1)].as_slice()], 5);
        let b = merge([[record("m1", 1, 9)].as_slice()], 5);
        let c = merge([[record("m2", 1, 1)].as_slice()], 5);

        assert!(a.same_order(&b));
        assert!(!a.same_order(&c));
        assert_eq!(a.ids(), vec!["m1"]);
    }

    #[test]
    fn snapshot_json_shape() {
        let snapshot = MachineSnapshot::new("desk", vec![record("m1", 1, 1)]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"machineName\":\"desk\""));
        assert!(json.contains("\"idRef\":\"m1\""));

        let parsed: MachineSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}

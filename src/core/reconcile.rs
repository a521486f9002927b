//! Purpose: Count matcher transactions the node has not indexed, per UTC week.
//! Exports: `reconcile`, `ReconcileReport`, `WeekBucket`, `SkipCounts`, `parse_transaction_key`.
//! Role: Joins the matcher's textual transaction keys against the node's binary index.
//! Invariants: A bucket exists only after at least one counted transaction (`total > 0`).
//! Invariants: `unprocessed <= total` for every bucket.
//! Invariants: Malformed matcher records are skipped and counted, never fatal.
//! Invariants: Any store read failure aborts the run; no partial report is returned.
use std::collections::BTreeMap;

use bstr::BStr;
use time::Date;

use crate::core::error::Error;
use crate::core::schema::{TRANSACTION_INFO, encode_prefix};
use crate::core::store::Store;
use crate::core::timestamp::{self, TRAILER_LEN};

/// Key range holding the matcher's transactions.
pub const MATCHER_TRANSACTIONS_PREFIX: &[u8] = b"matcher:transactions";

const KEY_SEGMENTS: usize = 3;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WeekBucket {
    pub week_start: Date,
    pub week_end: Date,
    pub total: u64,
    pub unprocessed: u64,
}

impl WeekBucket {
    fn new(week_start: Date, week_end: Date) -> Self {
        Self {
            week_start,
            week_end,
            total: 0,
            unprocessed: 0,
        }
    }

    /// Percentage of the week's transactions missing from the node.
    pub fn unprocessed_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.unprocessed as f64 / self.total as f64 * 100.0
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SkipCounts {
    pub malformed_key: u64,
    pub undecodable_id: u64,
    pub short_value: u64,
    pub bad_timestamp: u64,
}

impl SkipCounts {
    pub fn total(&self) -> u64 {
        self.malformed_key + self.undecodable_id + self.short_value + self.bad_timestamp
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    /// Sorted by ascending week start.
    pub weeks: Vec<WeekBucket>,
    pub skipped: SkipCounts,
}

#[derive(Debug, Eq, PartialEq)]
pub enum KeyError {
    NotUtf8,
    SegmentCount(usize),
}

/// Returns the base-58 identifier segment of `matcher:transactions:<id>`.
pub fn parse_transaction_key(key: &[u8]) -> Result<&str, KeyError> {
    let text = std::str::from_utf8(key).map_err(|_| KeyError::NotUtf8)?;
    let segments: Vec<&str> = text.split(':').collect();
    if segments.len() != KEY_SEGMENTS {
        return Err(KeyError::SegmentCount(segments.len()));
    }
    Ok(segments[2])
}

/// Node-store key of a transaction's index entry.
pub fn transaction_lookup_key(id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + id.len());
    key.extend_from_slice(&encode_prefix(TRANSACTION_INFO));
    key.extend_from_slice(id);
    key
}

pub fn reconcile<M, N>(matcher: &M, node: &N) -> Result<ReconcileReport, Error>
where
    M: Store + ?Sized,
    N: Store + ?Sized,
{
    let mut weeks: BTreeMap<Date, WeekBucket> = BTreeMap::new();
    let mut skipped = SkipCounts::default();

    for item in matcher.scan(MATCHER_TRANSACTIONS_PREFIX) {
        let record = item?;
        let key = BStr::new(&record.key);

        let encoded_id = match parse_transaction_key(&record.key) {
            Ok(id) => id,
            Err(reason) => {
                tracing::warn!(%key, ?reason, "skipping malformed transaction key");
                skipped.malformed_key += 1;
                continue;
            }
        };

        let id = match bs58::decode(encoded_id).into_vec() {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%key, error = %err, "skipping undecodable transaction id");
                skipped.undecodable_id += 1;
                continue;
            }
        };

        if record.value.len() < TRAILER_LEN {
            let len = record.value.len();
            tracing::warn!(%key, len, "skipping value without timestamp trailer");
            skipped.short_value += 1;
            continue;
        }
        let instant = match timestamp::extract_datetime(&record.value) {
            Ok(instant) => instant,
            Err(err) => {
                tracing::warn!(%key, error = %err, "skipping value with unusable timestamp");
                skipped.bad_timestamp += 1;
                continue;
            }
        };

        let week = timestamp::week_start(instant);
        let Some(week_end) = timestamp::week_end(week) else {
            tracing::warn!(%key, %week, "skipping value whose week runs past the calendar");
            skipped.bad_timestamp += 1;
            continue;
        };
        let bucket = weeks.entry(week).or_insert_with(|| WeekBucket::new(week, week_end));
        bucket.total += 1;

        let lookup_key = transaction_lookup_key(&id);
        if node.get(&lookup_key)?.is_none() {
            bucket.unprocessed += 1;
        }
    }

    if skipped.total() > 0 {
        tracing::warn!(
            malformed_key = skipped.malformed_key,
            undecodable_id = skipped.undecodable_id,
            short_value = skipped.short_value,
            bad_timestamp = skipped.bad_timestamp,
            "skipped matcher records"
        );
    }

    Ok(ReconcileReport {
        weeks: weeks.into_values().collect(),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        KeyError, MATCHER_TRANSACTIONS_PREFIX, WeekBucket, parse_transaction_key, reconcile,
        transaction_lookup_key,
    };
    use crate::core::error::{Error, ErrorKind};
    use crate::core::store::{MemoryStore, Scan, Store, StoreRecord};
    use time::macros::date;

    // 2023-01-04T12:00:00Z, a Wednesday.
    const JAN_4_2023_MS: u64 = 1_672_833_600_000;
    // 2023-01-10T00:00:00Z, the following Tuesday.
    const JAN_10_2023_MS: u64 = 1_673_308_800_000;
    // 9999-12-29T00:00:00Z; its week would end after 9999-12-31.
    const DEC_29_9999_MS: u64 = 253_402_041_600_000;

    fn signed_value(millis: u64) -> Vec<u8> {
        let mut value = b"order-payload".to_vec();
        value.extend_from_slice(&millis.to_be_bytes());
        value.extend_from_slice(&[0x11; 64]);
        value
    }

    fn matcher_key(id: &[u8]) -> Vec<u8> {
        format!("matcher:transactions:{}", bs58::encode(id).into_string()).into_bytes()
    }

    #[test]
    fn key_shape_is_validated() {
        assert_eq!(parse_transaction_key(b"matcher:transactions:abc"), Ok("abc"));
        assert_eq!(
            parse_transaction_key(b"matcher:transactions"),
            Err(KeyError::SegmentCount(2))
        );
        assert_eq!(parse_transaction_key(b"a:b:c:d"), Err(KeyError::SegmentCount(4)));
        assert_eq!(parse_transaction_key(&[0xff, b':', 0xfe]), Err(KeyError::NotUtf8));
    }

    #[test]
    fn lookup_key_is_prefixed_with_transaction_info() {
        assert_eq!(transaction_lookup_key(&[0xaa, 0xbb]), vec![0x00, 0x12, 0xaa, 0xbb]);
    }

    #[test]
    fn missing_node_entry_counts_as_unprocessed() {
        let id = [7u8; 32];
        let matcher: MemoryStore = [(matcher_key(&id), signed_value(JAN_4_2023_MS))]
            .into_iter()
            .collect();
        let node = MemoryStore::new();

        let report = reconcile(&matcher, &node).expect("reconcile");
        assert_eq!(
            report.weeks,
            vec![WeekBucket {
                week_start: date!(2023 - 01 - 02),
                week_end: date!(2023 - 01 - 08),
                total: 1,
                unprocessed: 1,
            }]
        );
        assert_eq!(report.weeks[0].unprocessed_rate(), 100.0);
        assert_eq!(report.skipped.total(), 0);
    }

    #[test]
    fn indexed_transaction_is_processed() {
        let id = [7u8; 32];
        let matcher: MemoryStore = [(matcher_key(&id), signed_value(JAN_4_2023_MS))]
            .into_iter()
            .collect();
        let node: MemoryStore = [(transaction_lookup_key(&id), b"info".to_vec())]
            .into_iter()
            .collect();

        let report = reconcile(&matcher, &node).expect("reconcile");
        assert_eq!(report.weeks.len(), 1);
        assert_eq!(report.weeks[0].total, 1);
        assert_eq!(report.weeks[0].unprocessed, 0);
        assert_eq!(report.weeks[0].unprocessed_rate(), 0.0);
    }

    #[test]
    fn weeks_are_sorted_and_bounded() {
        let ids: Vec<[u8; 4]> = (0u8..5).map(|i| [i, 1, 2, 3]).collect();
        let matcher: MemoryStore = [
            (matcher_key(&ids[0]), signed_value(JAN_10_2023_MS)),
            (matcher_key(&ids[1]), signed_value(JAN_4_2023_MS)),
            (matcher_key(&ids[2]), signed_value(JAN_10_2023_MS)),
            (matcher_key(&ids[3]), signed_value(JAN_4_2023_MS)),
            (matcher_key(&ids[4]), signed_value(JAN_4_2023_MS)),
        ]
        .into_iter()
        .collect();
        let node: MemoryStore = [
            (transaction_lookup_key(&ids[1]), b"x".to_vec()),
            (transaction_lookup_key(&ids[2]), b"x".to_vec()),
        ]
        .into_iter()
        .collect();

        let report = reconcile(&matcher, &node).expect("reconcile");
        let summary: Vec<_> = report
            .weeks
            .iter()
            .map(|week| (week.week_start, week.total, week.unprocessed))
            .collect();
        assert_eq!(
            summary,
            vec![(date!(2023 - 01 - 02), 3, 2), (date!(2023 - 01 - 09), 2, 1)]
        );
        for week in &report.weeks {
            assert!(week.total > 0);
            assert!(week.unprocessed <= week.total);
        }
    }

    #[test]
    fn malformed_records_are_skipped() {
        let good = [9u8; 8];
        let matcher: MemoryStore = [
            (matcher_key(&good), signed_value(JAN_4_2023_MS)),
            (b"matcher:transactions".to_vec(), signed_value(JAN_4_2023_MS)),
            (b"matcher:transactions:a:b".to_vec(), signed_value(JAN_4_2023_MS)),
            (b"matcher:transactions:0OIl".to_vec(), signed_value(JAN_4_2023_MS)),
            (matcher_key(&[1, 2, 3]), b"too-short".to_vec()),
            (matcher_key(&[4, 5, 6]), signed_value(u64::MAX)),
            (matcher_key(&[7, 8, 9]), signed_value(DEC_29_9999_MS)),
            (b"matcher:orders:abc".to_vec(), signed_value(JAN_4_2023_MS)),
        ]
        .into_iter()
        .collect();

        let report = reconcile(&matcher, &MemoryStore::new()).expect("reconcile");
        assert_eq!(report.weeks.len(), 1);
        assert_eq!(report.weeks[0].total, 1);
        assert_eq!(report.skipped.malformed_key, 2);
        assert_eq!(report.skipped.undecodable_id, 1);
        assert_eq!(report.skipped.short_value, 1);
        assert_eq!(report.skipped.bad_timestamp, 2);
    }

    #[test]
    fn week_past_calendar_end_is_skipped() {
        let matcher: MemoryStore = [(matcher_key(&[2u8; 32]), signed_value(DEC_29_9999_MS))]
            .into_iter()
            .collect();
        let report = reconcile(&matcher, &MemoryStore::new()).expect("reconcile");
        assert!(report.weeks.is_empty());
        assert_eq!(report.skipped.bad_timestamp, 1);
        assert_eq!(report.skipped.total(), 1);
    }

    #[test]
    fn empty_matcher_yields_no_weeks() {
        let report = reconcile(&MemoryStore::new(), &MemoryStore::new()).expect("reconcile");
        assert!(report.weeks.is_empty());
    }

    struct FailingNode;

    impl Store for FailingNode {
        fn scan(&self, _prefix: &[u8]) -> Scan<'_> {
            Box::new(std::iter::empty())
        }

        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
            Err(Error::new(ErrorKind::Io)
                .with_message("disk went away")
                .with_key(key))
        }
    }

    struct BrokenScan;

    impl Store for BrokenScan {
        fn scan(&self, _prefix: &[u8]) -> Scan<'_> {
            let first = StoreRecord {
                key: matcher_key(&[1, 1, 1]),
                value: signed_value(JAN_4_2023_MS),
            };
            Box::new(
                vec![
                    Ok(first),
                    Err(Error::new(ErrorKind::Corrupt).with_message("bad block")),
                ]
                .into_iter(),
            )
        }

        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
            Ok(None)
        }
    }

    #[test]
    fn lookup_failure_is_fatal() {
        let matcher: MemoryStore = [(matcher_key(&[3u8; 16]), signed_value(JAN_4_2023_MS))]
            .into_iter()
            .collect();
        let err = reconcile(&matcher, &FailingNode).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn latent_scan_error_is_fatal() {
        let err = reconcile(&BrokenScan, &MemoryStore::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn scan_range_covers_only_matcher_transactions() {
        assert!(b"matcher:transactions:abc".starts_with(MATCHER_TRANSACTIONS_PREFIX));
        assert!(!b"matcher:orders:abc".starts_with(MATCHER_TRANSACTIONS_PREFIX));
    }
}

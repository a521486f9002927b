//! Purpose: Tally record counts and key/value byte totals per node record type.
//! Exports: `collect`, `collect_parallel`, `collect_scan`.
//! Exports: `AggregateReport`, `TypeStat`, `Strategy`.
//! Role: Engine behind the `stats` report.
//! Invariants: Both strategies yield identical per-prefix totals over the same store.
//! Invariants: Workers never share accumulators; each sends one result per prefix.
//! Invariants: Unknown prefixes are kept with no name instead of failing the scan.
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::mpsc;
use std::thread;

use crate::core::error::{Error, ErrorKind};
use crate::core::schema::{RecordPrefix, decode_prefix};
use crate::core::store::Store;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
    /// One bounded range scan per prefix, fanned out over a worker pool.
    Parallel,
    /// One ordered pass over the store, bucketing by decoded prefix.
    Scan,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeStat {
    pub prefix: RecordPrefix,
    pub name: Option<&'static str>,
    pub count: u64,
    pub total_key_bytes: u64,
    pub total_value_bytes: u64,
}

impl TypeStat {
    pub fn empty(prefix: RecordPrefix) -> Self {
        Self {
            prefix,
            name: prefix.name(),
            count: 0,
            total_key_bytes: 0,
            total_value_bytes: 0,
        }
    }

    fn add(&mut self, key_len: usize, value_len: usize) {
        self.count += 1;
        self.total_key_bytes += key_len as u64;
        self.total_value_bytes += value_len as u64;
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AggregateReport {
    pub stats: BTreeMap<RecordPrefix, TypeStat>,
    /// Keys too short to carry a prefix; only a full scan can see them.
    pub short_keys: u64,
}

impl AggregateReport {
    pub fn total_count(&self) -> u64 {
        self.stats.values().map(|stat| stat.count).sum()
    }
}

/// Aggregates `filter` (or every known prefix) with the chosen strategy.
pub fn collect<S>(
    store: &S,
    filter: Option<RecordPrefix>,
    strategy: Strategy,
    workers: Option<NonZeroUsize>,
) -> Result<AggregateReport, Error>
where
    S: Store + Sync + ?Sized,
{
    let prefixes: Vec<RecordPrefix> = match filter {
        Some(prefix) => vec![prefix],
        None => RecordPrefix::known().collect(),
    };
    tracing::info!(prefixes = prefixes.len(), ?strategy, "collecting store stats");
    match strategy {
        Strategy::Parallel => {
            let workers = workers.unwrap_or_else(default_workers);
            collect_parallel(store, &prefixes, workers)
        }
        Strategy::Scan => collect_scan(store, &prefixes),
    }
}

pub fn default_workers() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

fn scan_prefix<S>(store: &S, prefix: RecordPrefix) -> Result<TypeStat, Error>
where
    S: Store + ?Sized,
{
    let mut stat = TypeStat::empty(prefix);
    for item in store.scan(&prefix.bytes()) {
        let record = item?;
        stat.add(record.key.len(), record.value.len());
    }
    tracing::debug!(%prefix, count = stat.count, "prefix scan finished");
    Ok(stat)
}

/// Fan-out/fan-in: prefixes are dealt round-robin to at most `workers` threads.
pub fn collect_parallel<S>(
    store: &S,
    prefixes: &[RecordPrefix],
    workers: NonZeroUsize,
) -> Result<AggregateReport, Error>
where
    S: Store + Sync + ?Sized,
{
    let workers = workers.get().min(prefixes.len()).max(1);
    let mut assignments: Vec<Vec<RecordPrefix>> = vec![Vec::new(); workers];
    for (idx, prefix) in prefixes.iter().enumerate() {
        assignments[idx % workers].push(*prefix);
    }

    let (tx, rx) = mpsc::channel::<Result<TypeStat, Error>>();
    thread::scope(|scope| {
        for assigned in assignments {
            let tx = tx.clone();
            scope.spawn(move || {
                for prefix in assigned {
                    if tx.send(scan_prefix(store, prefix)).is_err() {
                        return;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut report = AggregateReport::default();
    let mut first_error = None;
    let mut received = 0usize;
    for result in rx {
        received += 1;
        match result {
            Ok(stat) => {
                report.stats.insert(stat.prefix, stat);
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }
    if received != prefixes.len() {
        return Err(Error::new(ErrorKind::Internal).with_message(format!(
            "expected {} prefix results, received {received}",
            prefixes.len()
        )));
    }
    Ok(report)
}

/// Single ordered pass; with exactly one prefix only that prefix's range is read.
pub fn collect_scan<S>(store: &S, prefixes: &[RecordPrefix]) -> Result<AggregateReport, Error>
where
    S: Store + ?Sized,
{
    let mut report = AggregateReport::default();
    for prefix in prefixes {
        report.stats.insert(*prefix, TypeStat::empty(*prefix));
    }

    let range: Vec<u8> = match prefixes {
        [only] => only.bytes().to_vec(),
        _ => Vec::new(),
    };

    for item in store.scan(&range) {
        let record = item?;
        let Some(prefix) = decode_prefix(&record.key) else {
            report.short_keys += 1;
            continue;
        };
        report
            .stats
            .entry(prefix)
            .or_insert_with(|| TypeStat::empty(prefix))
            .add(record.key.len(), record.value.len());
    }

    if report.short_keys > 0 {
        tracing::warn!(short_keys = report.short_keys, "keys without a record-type prefix");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::{Strategy, collect, collect_parallel, collect_scan};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::schema::{RECORD_TYPES, RecordPrefix};
    use crate::core::store::{MemoryStore, Scan, Store};

    fn key(prefix: u16, suffix: &[u8]) -> Vec<u8> {
        let mut key = prefix.to_be_bytes().to_vec();
        key.extend_from_slice(suffix);
        key
    }

    fn sample_store() -> MemoryStore {
        [
            (key(0, b""), vec![0u8; 4]),
            (key(1, b""), vec![0u8; 8]),
            (key(18, b"tx-one"), vec![0u8; 100]),
            (key(18, b"tx-two"), vec![0u8; 150]),
            (key(18, b"tx-three"), vec![0u8; 90]),
            (key(34, b"data-key"), vec![0u8; 12]),
            (key(43, b"alias"), vec![1u8]),
        ]
        .into_iter()
        .collect()
    }

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero")
    }

    #[test]
    fn empty_store_reports_zero_for_every_type() {
        let store = MemoryStore::new();
        let report = collect(&store, None, Strategy::Parallel, Some(workers(4))).expect("collect");
        assert_eq!(report.stats.len(), RECORD_TYPES.len());
        for stat in report.stats.values() {
            assert_eq!(stat.count, 0);
            assert_eq!(stat.total_key_bytes, 0);
            assert_eq!(stat.total_value_bytes, 0);
            assert!(stat.name.is_some());
        }
    }

    #[test]
    fn transaction_info_totals() {
        let store = sample_store();
        let report = collect(&store, None, Strategy::Parallel, Some(workers(3))).expect("collect");
        let stat = &report.stats[&RecordPrefix(18)];
        assert_eq!(stat.name, Some("transaction-info"));
        assert_eq!(stat.count, 3);
        assert_eq!(stat.total_key_bytes, 8 + 8 + 10);
        assert_eq!(stat.total_value_bytes, 340);
        assert_eq!(report.total_count(), 7);
    }

    #[test]
    fn strategies_agree() {
        let store = sample_store();
        let prefixes: Vec<RecordPrefix> = RecordPrefix::known().collect();
        let parallel = collect_parallel(&store, &prefixes, workers(5)).expect("parallel");
        let scan = collect_scan(&store, &prefixes).expect("scan");
        assert_eq!(parallel, scan);

        let single = collect_parallel(&store, &prefixes, workers(1)).expect("single worker");
        assert_eq!(single, parallel);
    }

    #[test]
    fn filter_restricts_both_strategies() {
        let store = sample_store();
        for strategy in [Strategy::Parallel, Strategy::Scan] {
            let report = collect(&store, Some(RecordPrefix(34)), strategy, Some(workers(2)))
                .expect("collect");
            assert_eq!(report.stats.len(), 1);
            assert_eq!(report.stats[&RecordPrefix(34)].count, 1);
            assert_eq!(report.stats[&RecordPrefix(34)].total_value_bytes, 12);
        }
    }

    #[test]
    fn full_scan_keeps_unknown_prefixes_and_counts_short_keys() {
        let store: MemoryStore = [
            (key(18, b"a"), vec![0u8; 3]),
            (key(500, b"legacy"), vec![0u8; 7]),
            (vec![0x07], vec![0u8; 2]),
        ]
        .into_iter()
        .collect();

        let prefixes: Vec<RecordPrefix> = RecordPrefix::known().collect();
        let report = collect_scan(&store, &prefixes).expect("scan");
        let unknown = &report.stats[&RecordPrefix(500)];
        assert_eq!(unknown.name, None);
        assert_eq!(unknown.count, 1);
        assert_eq!(unknown.total_key_bytes, 8);
        assert_eq!(report.short_keys, 1);
        assert_eq!(report.stats.len(), RECORD_TYPES.len() + 1);
    }

    struct FailingStore;

    impl Store for FailingStore {
        fn scan(&self, prefix: &[u8]) -> Scan<'_> {
            let prefix = prefix.to_vec();
            Box::new(std::iter::once(Err(Error::new(ErrorKind::Io)
                .with_message("read failed")
                .with_key(prefix))))
        }

        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
            Ok(None)
        }
    }

    #[test]
    fn worker_error_fails_the_run() {
        let prefixes: Vec<RecordPrefix> = RecordPrefix::known().collect();
        let err = collect_parallel(&FailingStore, &prefixes, workers(4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = collect_scan(&FailingStore, &prefixes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}

//! Ordered merge of the completion stream.
//!
//! Records arrive in whatever order their fetches finish. The collator
//! buffers them by dispatch index and releases a record only once every
//! lower index has been released, so renderers always see target order.
//! While releasing it also decides what gets rendered: unreachable records
//! are withheld unless asked for, and the result ceiling stops rendering
//! (not receiving) once reached.

use crate::query::ErrorSummary;
use crate::record::ServerRecord;
use crate::render::Renderer;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::io::{self, Write};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollateOptions {
    pub show_unreachable: bool,
    /// Maximum number of records to render. Withheld records do not count.
    pub limit: Option<usize>,
}

/// Counts for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    pub received: usize,
    pub unreachable: usize,
    /// Unreachable records that were withheld.
    pub hidden: usize,
    pub shown: usize,
    /// Records that would have been shown past the ceiling.
    pub truncated: usize,
}

#[derive(Debug)]
pub struct Collator {
    options: CollateOptions,
    pending: BTreeMap<usize, ServerRecord>,
    next: usize,
    tally: Tally,
}

impl Collator {
    pub fn new(options: CollateOptions) -> Self {
        Self {
            options,
            pending: BTreeMap::new(),
            next: 0,
            tally: Tally::default(),
        }
    }

    /// Accepts one record and returns those now releasable for rendering,
    /// in dispatch order.
    pub fn push(&mut self, record: ServerRecord) -> Vec<ServerRecord> {
        if record.index < self.next || self.pending.contains_key(&record.index) {
            warn!(
                "Duplicate record for index {} ({}), dropping",
                record.index, record.address
            );
            return Vec::new();
        }
        self.tally.received += 1;
        self.pending.insert(record.index, record);

        let mut ready = Vec::new();
        while let Some(record) = self.pending.remove(&self.next) {
            self.next += 1;
            if let Some(record) = self.classify(record) {
                ready.push(record);
            }
        }
        ready
    }

    /// Releases anything still buffered. Only happens when the stream ended
    /// with gaps, i.e. some index never arrived.
    pub fn finish(&mut self) -> Vec<ServerRecord> {
        if !self.pending.is_empty() {
            warn!(
                "Result stream ended with {} records waiting on index {}",
                self.pending.len(),
                self.next
            );
        }

        let pending = std::mem::take(&mut self.pending);
        pending
            .into_values()
            .filter_map(|record| self.classify(record))
            .collect()
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    fn classify(&mut self, record: ServerRecord) -> Option<ServerRecord> {
        if record.is_unreachable() {
            self.tally.unreachable += 1;
            if !self.options.show_unreachable {
                debug!("Hiding unreachable server {}", record.address);
                self.tally.hidden += 1;
                return None;
            }
        }

        if self.options.limit.is_some_and(|limit| self.tally.shown >= limit) {
            self.tally.truncated += 1;
            return None;
        }

        self.tally.shown += 1;
        Some(record)
    }
}

/// Drains `rx` through the collator into `renderer` and returns the tally.
pub async fn run_collation<R: Renderer + ?Sized>(
    mut rx: mpsc::UnboundedReceiver<ServerRecord>,
    mut collator: Collator,
    renderer: &mut R,
) -> io::Result<Tally> {
    renderer.begin()?;
    while let Some(record) = rx.recv().await {
        for ready in collator.push(record) {
            renderer.render(&ready)?;
        }
    }
    for ready in collator.finish() {
        renderer.render(&ready)?;
    }
    renderer.finish()?;
    Ok(collator.tally())
}

/// Writes the end-of-run summary: the hidden count and, when asked, the
/// distinct fetch errors.
pub fn write_summary<W: Write>(
    out: &mut W,
    tally: &Tally,
    errors: &ErrorSummary,
    show_errors: bool,
) -> io::Result<()> {
    match tally.hidden {
        0 => {}
        1 => writeln!(out, "1 unreachable server was hidden")?,
        n => writeln!(out, "{} unreachable servers were hidden", n)?,
    }

    if tally.truncated > 0 {
        writeln!(
            out,
            "{} of {} servers shown (limit reached)",
            tally.shown,
            tally.shown + tally.truncated
        )?;
    }

    if show_errors {
        let distinct = errors.distinct();
        if !distinct.is_empty() {
            writeln!(out, "Errors ({} total):", errors.total())?;
            for (message, count) in distinct {
                writeln!(out, "  {:>4} x {}", count, message)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::record::{Attribute, Target};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use shared::ServerInfo;

    fn record(index: usize, reachable: bool) -> ServerRecord {
        let mut record = ServerRecord::new(&Target::explicit(index, format!("10.0.0.{}", index)));
        record.info = Some(if reachable {
            Ok(ServerInfo::default())
        } else {
            Err(FetchError::Timeout)
        });
        record
    }

    fn drain(collator: &mut Collator, records: Vec<ServerRecord>) -> Vec<usize> {
        let mut out = Vec::new();
        for r in records {
            out.extend(collator.push(r).into_iter().map(|r| r.index));
        }
        out.extend(collator.finish().into_iter().map(|r| r.index));
        out
    }

    #[test]
    fn test_releases_in_dispatch_order_for_any_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut records: Vec<_> = (0..20).map(|i| record(i, true)).collect();
            records.shuffle(&mut rng);

            let mut collator = Collator::new(CollateOptions::default());
            let order = drain(&mut collator, records);
            assert_eq!(order, (0..20).collect::<Vec<_>>());
            assert_eq!(collator.tally().received, 20);
        }
    }

    #[test]
    fn test_holds_until_predecessor_arrives() {
        let mut collator = Collator::new(CollateOptions::default());
        assert!(collator.push(record(2, true)).is_empty());
        assert!(collator.push(record(1, true)).is_empty());
        let ready: Vec<_> = collator
            .push(record(0, true))
            .into_iter()
            .map(|r| r.index)
            .collect();
        assert_eq!(ready, vec![0, 1, 2]);
    }

    #[test]
    fn test_unreachable_hidden_by_default() {
        let mut collator = Collator::new(CollateOptions::default());
        let records = (0..10).map(|i| record(i, ![2, 5, 9].contains(&i))).collect();
        let order = drain(&mut collator, records);

        assert_eq!(order, vec![0, 1, 3, 4, 6, 7, 8]);
        assert_eq!(
            collator.tally(),
            Tally {
                received: 10,
                unreachable: 3,
                hidden: 3,
                shown: 7,
                truncated: 0,
            }
        );
    }

    #[test]
    fn test_show_unreachable_keeps_everything() {
        let mut collator = Collator::new(CollateOptions {
            show_unreachable: true,
            limit: None,
        });
        let order = drain(&mut collator, vec![record(0, false), record(1, true)]);
        assert_eq!(order, vec![0, 1]);
        assert_eq!(collator.tally().unreachable, 1);
        assert_eq!(collator.tally().hidden, 0);
    }

    #[test]
    fn test_limit_counts_shown_records_only() {
        let mut collator = Collator::new(CollateOptions {
            show_unreachable: false,
            limit: Some(3),
        });
        let records = vec![
            record(0, false),
            record(1, true),
            record(2, false),
            record(3, true),
            record(4, true),
            record(5, true),
            record(6, true),
        ];
        let order = drain(&mut collator, records);

        assert_eq!(order, vec![1, 3, 4]);
        let tally = collator.tally();
        assert_eq!(tally.received, 7);
        assert_eq!(tally.hidden, 2);
        assert_eq!(tally.shown, 3);
        assert_eq!(tally.truncated, 2);
    }

    #[test]
    fn test_limit_zero_renders_nothing() {
        let mut collator = Collator::new(CollateOptions {
            show_unreachable: false,
            limit: Some(0),
        });
        let order = drain(&mut collator, vec![record(0, true), record(1, true)]);
        assert!(order.is_empty());
        assert_eq!(collator.tally().truncated, 2);
    }

    #[test]
    fn test_finish_flushes_gaps() {
        let mut collator = Collator::new(CollateOptions::default());
        assert!(collator.push(record(1, true)).is_empty());
        assert!(collator.push(record(3, true)).is_empty());
        let rest: Vec<_> = collator.finish().into_iter().map(|r| r.index).collect();
        assert_eq!(rest, vec![1, 3]);
    }

    #[test]
    fn test_duplicate_index_dropped() {
        let mut collator = Collator::new(CollateOptions::default());
        assert_eq!(collator.push(record(0, true)).len(), 1);
        assert!(collator.push(record(0, true)).is_empty());
        assert_eq!(collator.tally().received, 1);
    }

    #[test]
    fn test_summary_wording() {
        let errors = ErrorSummary::new();
        let mut out = Vec::new();
        let tally = Tally {
            hidden: 3,
            ..Tally::default()
        };
        write_summary(&mut out, &tally, &errors, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "3 unreachable servers were hidden\n"
        );

        let mut out = Vec::new();
        let tally = Tally {
            hidden: 1,
            ..Tally::default()
        };
        write_summary(&mut out, &tally, &errors, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1 unreachable server was hidden\n"
        );
    }

    #[test]
    fn test_summary_lists_distinct_errors() {
        let errors = ErrorSummary::new();
        errors.record(Attribute::Info, &FetchError::Timeout);
        errors.record(Attribute::Info, &FetchError::Timeout);
        errors.record(Attribute::Players, &FetchError::Unreachable("refused".into()));

        let mut out = Vec::new();
        write_summary(&mut out, &Tally::default(), &errors, true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Errors (3 total):\n     2 x info: timed out\n     1 x players: unreachable: refused\n"
        );
    }

    #[test]
    fn test_summary_silent_when_nothing_to_say() {
        let mut out = Vec::new();
        write_summary(&mut out, &Tally::default(), &ErrorSummary::new(), true).unwrap();
        assert!(out.is_empty());
    }
}

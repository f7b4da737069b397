//! Interval clustering for the coding-region overlap filter.
//!
//! Coding-region intervals and primer amplicon intervals are inserted into
//! one structure; intervals that overlap an existing cluster by at least
//! `min_overlap` bases are merged into it. A primer is considered to
//! overlap a coding region when it shares a cluster with at least one CDS
//! interval.
//!
//! Because clusters grow as intervals chain onto each other, a stack of
//! mutually overlapping primer intervals can extend a cluster past the end
//! of a coding region, pulling in primers that never touch the CDS
//! directly. This over-report is a known property of the approach and is
//! kept as-is; downstream consumers expect the generous behaviour.

use std::collections::BTreeSet;

/// What an inserted interval represents.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Entry {
    /// An annotated/predicted coding region.
    Cds,
    /// A primer amplicon, tagged with the caller's index for it.
    Primer(usize),
}

/// Merge-based interval clustering with a minimum-overlap threshold.
#[derive(Clone, Debug)]
pub struct ClusterTree {
    min_overlap: i64,
    entries: Vec<(i64, i64, Entry)>,
}

impl ClusterTree {
    pub fn new(min_overlap: u64) -> Self {
        ClusterTree {
            min_overlap: min_overlap as i64,
            entries: Vec::new(),
        }
    }

    /// Insert a half-open interval. Inverted intervals are stored as given
    /// and simply never overlap anything.
    pub fn insert(&mut self, start: i64, end: i64, entry: Entry) {
        self.entries.push((start, end, entry));
    }

    /// Indices of primer entries that share a cluster with at least one
    /// coding-region interval.
    pub fn primers_overlapping_cds(&self) -> BTreeSet<usize> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|&(start, end, _)| (start, end));

        fn flush(has_cds: bool, primers: &mut Vec<usize>, out: &mut BTreeSet<usize>) {
            if has_cds {
                out.extend(primers.iter().copied());
            }
            primers.clear();
        }

        let mut flagged = BTreeSet::new();
        let mut cluster_end: Option<i64> = None;
        let mut cluster_primers: Vec<usize> = Vec::new();
        let mut cluster_has_cds = false;

        for &(start, end, entry) in &sorted {
            let joins = match cluster_end {
                Some(ce) => ce.min(end) - start >= self.min_overlap,
                None => false,
            };
            if joins {
                cluster_end = cluster_end.map(|ce| ce.max(end));
            } else {
                flush(cluster_has_cds, &mut cluster_primers, &mut flagged);
                cluster_has_cds = false;
                cluster_end = Some(end);
            }
            match entry {
                Entry::Cds => cluster_has_cds = true,
                Entry::Primer(idx) => cluster_primers.push(idx),
            }
        }
        flush(cluster_has_cds, &mut cluster_primers, &mut flagged);
        flagged
    }
}

//! The primer quality filter chain.
//!
//! Each filter computes an independent validity flag per primer and
//! assigns it outright, so applying a filter twice leaves exactly the
//! flags of a single application. Filters never read other primers'
//! flags; only the CDS filter needs sample-level context (the coding
//! intervals).
//!
//! Primers that a filter cannot be applied to (no internal oligo, an
//! oligo too short to inspect, no negative-control count) are skipped for
//! that filter only and keep their passing state.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::cluster::{ClusterTree, Entry};
use crate::parse::CdsInterval;
use crate::sample::{PrimerRecord, Sample};

/// Identity fraction at or above which a BLAST hit fails a primer.
pub const BLAST_IDENTITY_MIN: f64 = 0.90;

/// Flag primers whose amplicon interval clusters with a coding region.
///
/// Every CDS interval and every primer amplicon interval is inserted into
/// a [`ClusterTree`] with the given minimum overlap; primers sharing a
/// cluster with at least one CDS get `cds_overlap = true`, all others
/// `false`. See the cluster module for the deliberate over-report when
/// primer intervals stack.
pub fn apply_cds_overlap(sample: &mut Sample, features: &[CdsInterval], min_overlap: u64) {
    let mut tree = ClusterTree::new(min_overlap);
    for iv in features {
        tree.insert(iv.start, iv.end, Entry::Cds);
    }
    let spans: Vec<(String, (i64, i64))> = sample
        .primers
        .iter()
        .map(|(name, p)| (name.clone(), p.amplicon_span()))
        .collect();
    for (idx, (_, (start, end))) in spans.iter().enumerate() {
        tree.insert(*start, *end, Entry::Primer(idx));
    }
    let flagged = tree.primers_overlapping_cds();
    let mut overlapping = 0usize;
    for (idx, (name, _)) in spans.iter().enumerate() {
        if let Some(p) = sample.primers.get_mut(name) {
            p.cds_overlap = flagged.contains(&idx);
            if p.cds_overlap {
                overlapping += 1;
            }
        }
    }
    info!(
        "[{}] {} of {} primers overlap CDS features ({} CDS intervals, min overlap {})",
        sample.name,
        overlapping,
        spans.len(),
        features.len(),
        min_overlap
    );
}

/// Flag primers with more than two G+C among the last five bases of
/// either the forward or the reverse sequence.
pub fn apply_gc3prime(sample: &mut Sample) {
    let mut failed = 0usize;
    for p in sample.primers.values_mut() {
        p.gc3prime_valid = gc_tail_ok(&p.forward.seq) && gc_tail_ok(&p.reverse.seq);
        if !p.gc3prime_valid {
            failed += 1;
        }
    }
    info!("[{}] {} primers failed the 3' GC filter", sample.name, failed);
}

fn gc_tail_ok(seq: &str) -> bool {
    let bytes = seq.as_bytes();
    let tail = &bytes[bytes.len().saturating_sub(5)..];
    tail.iter()
        .filter(|b| matches!(b.to_ascii_uppercase(), b'G' | b'C'))
        .count()
        <= 2
}

/// Flag primers whose internal hybridisation oligo breaks the shape
/// rules: a G at either end, a G in the second position, or more than
/// one `CC` within the interior (first and last base excluded).
pub fn apply_oligo(sample: &mut Sample) {
    let mut failed = 0usize;
    let mut skipped = 0usize;
    for p in sample.primers.values_mut() {
        let Some(oligo) = &p.internal else {
            skipped += 1;
            continue;
        };
        let seq = oligo.seq.as_bytes();
        if seq.len() < 3 {
            debug!(
                "[{}] oligo for {} too short to test, skipping",
                sample.name, p.name
            );
            skipped += 1;
            continue;
        }
        let interior = &oligo.seq[1..oligo.seq.len() - 1];
        let invalid = seq[0].to_ascii_uppercase() == b'G'
            || seq[seq.len() - 1].to_ascii_uppercase() == b'G'
            || seq[1].to_ascii_uppercase() == b'G'
            || count_cc(interior) > 1;
        p.oligo_valid = !invalid;
        if invalid {
            failed += 1;
        }
    }
    info!(
        "[{}] {} primers failed the oligo filter ({} skipped without a testable oligo)",
        sample.name, failed, skipped
    );
}

/// Non-overlapping occurrences of `CC`, case-insensitive.
fn count_cc(seq: &str) -> usize {
    let bytes = seq.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i].to_ascii_uppercase() == b'C' && bytes[i + 1].to_ascii_uppercase() == b'C' {
            count += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}

/// Apply the off-target screen. `hits` maps BLAST query ids (primer name
/// plus `_forward`/`_reverse`) to the best-hit identity fraction; a hit
/// at or above [`BLAST_IDENTITY_MIN`] on either strand fails the pair.
pub fn apply_blast(sample: &mut Sample, hits: &BTreeMap<String, f64>) {
    let failing: BTreeSet<&str> = hits
        .iter()
        .filter(|(_, frac)| **frac >= BLAST_IDENTITY_MIN)
        .map(|(query, _)| primer_name_of_query(query))
        .collect();
    let mut failed = 0usize;
    for p in sample.primers.values_mut() {
        p.blast_pass = !failing.contains(p.name.as_str());
        if !p.blast_pass {
            failed += 1;
        }
    }
    info!(
        "[{}] {} primers failed the BLAST screen",
        sample.name, failed
    );
}

/// Strip the strand suffix from a BLAST query id.
pub fn primer_name_of_query(query: &str) -> &str {
    query
        .strip_suffix("_forward")
        .or_else(|| query.strip_suffix("_reverse"))
        .unwrap_or(query)
}

/// Single-product rule: exactly one product against the negative
/// control. Primers with no recorded count pass (no data was computed
/// for them, and unscanned primers stay in candidacy).
pub fn single_product_ok(primer: &PrimerRecord) -> bool {
    match primer.negative_control_amplimers {
        Some(n) => n == 1,
        None => true,
    }
}

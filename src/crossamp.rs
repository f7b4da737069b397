//! Cross-amplification matrix building from PrimerSearch reports.
//!
//! Each pairwise report says how many products every primer of a query
//! sample produced against one target sequence. Folding a report into the
//! collection unions the target's name (and its families) into the
//! amplifying primers' sets, so re-processing the same report is a no-op.
//! Reports against the negative-control sentinel instead record the raw
//! product count used by the single-product filter.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::parse;
use crate::sample::SampleCollection;

/// Sentinel target name for the negative-control sequence set. Never a
/// collection member (enforced at config parse time).
pub const NEGATIVE_CONTROL: &str = "negative_control";

/// Amplification product counts for one (query, target) PrimerSearch run.
#[derive(Clone, Debug)]
pub struct AmplificationResult {
    pub query: String,
    pub target: String,
    pub counts: BTreeMap<String, usize>,
}

/// Fold one pairwise result into the query sample's primer records.
///
/// Targets outside the collection are ignored so that sequences we are
/// not considering cannot skew the specificity counts. A primer never
/// records its own source sample. Unknown primer names in a report are
/// logged and skipped.
pub fn apply_result(collection: &mut SampleCollection, result: &AmplificationResult) -> Result<()> {
    if result.target == NEGATIVE_CONTROL {
        let Some(query) = collection.get_mut(&result.query) else {
            bail!("amplification result for unknown sample {:?}", result.query);
        };
        for (name, count) in &result.counts {
            match query.primers.get_mut(name) {
                Some(primer) => primer.negative_control_amplimers = Some(*count),
                None => warn!(
                    "[{}] negative-control report names unknown primer {}",
                    result.query, name
                ),
            }
        }
        return Ok(());
    }

    if result.target == result.query {
        debug!("[{}] ignoring self-amplification report", result.query);
        return Ok(());
    }
    let families = match collection.get(&result.target) {
        Some(target) => target.families.clone(),
        None => {
            debug!(
                "[{}] target {:?} is not in the collection, ignoring its report",
                result.query, result.target
            );
            return Ok(());
        }
    };
    let Some(query) = collection.get_mut(&result.query) else {
        bail!("amplification result for unknown sample {:?}", result.query);
    };
    for (name, count) in &result.counts {
        if *count == 0 {
            continue;
        }
        let Some(primer) = query.primers.get_mut(name) else {
            warn!(
                "[{}] report vs {} names unknown primer {}",
                result.query, result.target, name
            );
            continue;
        };
        primer.amplifies_sample.insert(result.target.clone());
        for family in &families {
            primer.amplifies_family.insert(family.clone());
        }
    }
    Ok(())
}

/// Locate and apply every expected pairwise report under `dir`
/// (`<query>_vs_<target>.primersearch`, plus
/// `<query>_negative_control.primersearch` when the single-product filter
/// is in use). A missing or unreadable report marks the query sample
/// degraded and the run continues.
pub fn load_pairwise_results(
    collection: &mut SampleCollection,
    dir: &Path,
    single_product: bool,
) -> Result<()> {
    let names: Vec<String> = collection.iter().map(|s| s.name.clone()).collect();
    for query in &names {
        for target in &names {
            if query == target {
                continue;
            }
            let path = dir.join(format!("{query}_vs_{target}.primersearch"));
            match parse::read_primersearch(&path) {
                Ok(counts) => apply_result(
                    collection,
                    &AmplificationResult {
                        query: query.clone(),
                        target: target.clone(),
                        counts,
                    },
                )?,
                Err(err) => {
                    warn!("[{query}] no usable amplification data vs {target}: {err:#}");
                    if let Some(sample) = collection.get_mut(query) {
                        sample.mark_degraded(format!("no amplification data vs {target}"));
                    }
                }
            }
        }
        if single_product {
            let path = dir.join(format!("{query}_{NEGATIVE_CONTROL}.primersearch"));
            match parse::read_primersearch(&path) {
                Ok(counts) => apply_result(
                    collection,
                    &AmplificationResult {
                        query: query.clone(),
                        target: NEGATIVE_CONTROL.to_string(),
                        counts,
                    },
                )?,
                Err(err) => {
                    warn!("[{query}] no usable negative-control data: {err:#}");
                    if let Some(sample) = collection.get_mut(query) {
                        sample.mark_degraded("no negative-control amplification data");
                    }
                }
            }
        }
    }
    Ok(())
}

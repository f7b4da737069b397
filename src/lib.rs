#![forbid(unsafe_code)]
//! # diffprimer
//!
//! Identify PCR primer pairs that can distinguish one genome (or one
//! declared **family** of genomes) from every other genome in a
//! collection, and the pairs that are **universal** to the whole set.
//!
//! The crate is the classification stage of a differential-primer
//! workflow: the surrounding tooling runs the external collaborators
//! (gene finders, EMBOSS ePrimer3, EMBOSS PrimerSearch, BLASTN) and this
//! crate consumes their output files, applies a chain of optional primer
//! quality filters, builds the cross-amplification matrix, and computes
//! the per-sample / per-family / universal primer partitions with full
//! reports.
//!
//! ## Stages
//! 1. [`config`]: parse the collection config and filter toggles.
//! 2. [`parse`] + [`sample`]: load predictions, sequences and features.
//! 3. [`filters`]: populate per-primer validity flags.
//! 4. [`crossamp`]: fold pairwise amplification reports into the
//!    per-primer `amplifies_sample` / `amplifies_family` sets.
//! 5. [`classify`]: query unique / family-unique / universal sets.
//! 6. [`report`]: write primer exports, amplicons and summary tables.
//!
//! [`pipeline::run`] wires the stages together in that order.
//!
//! ## Example
//! ```no_run
//! use diffprimer::{config::FilterConfig, pipeline};
//! let summary = pipeline::run(pipeline::PipelineOpts {
//!     config: "samples.tab".into(),
//!     primersearch_dir: "primersearch_results".into(),
//!     blast_dir: None,
//!     outdir: "differential_primer_results".into(),
//!     force: false,
//!     filters: FilterConfig { gc3prime: true, ..FilterConfig::default() },
//!     threads: None,
//! }).unwrap();
//! println!("{} unique primers across {} samples", summary.unique_total, summary.samples);
//! ```

pub mod classify;
pub mod cluster;
pub mod config;
pub mod crossamp;
pub mod filters;
pub mod parse;
pub mod pipeline;
pub mod report;
pub mod sample;

pub use classify::Classifier;
pub use config::{FilterConfig, SampleSpec};
pub use sample::{Oligo, PrimerRecord, Sample, SampleCollection};

/// Crate version string (from `CARGO_PKG_VERSION`).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rows describing each configured sample (for CLI/UX): name, families,
/// and the three input file references with `-` for "not provided".
pub fn collection_rows(specs: &[SampleSpec]) -> Vec<(String, String, String, String, String)> {
    fn dash(path: &Option<std::path::PathBuf>) -> String {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    }
    specs
        .iter()
        .map(|s| {
            (
                s.name.clone(),
                s.families.join(","),
                dash(&s.seqfile),
                dash(&s.featurefile),
                dash(&s.primerfile),
            )
        })
        .collect()
}

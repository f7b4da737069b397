//! End-to-end run orchestration.
//!
//! Stages run in a fixed order: parse the config, load every sample's
//! inputs (in parallel, one worker per sample), fold in the
//! cross-amplification reports, then hand the fully-populated collection
//! to the classifier and the report writer. Classification itself is a
//! pure, single-threaded computation; all filesystem work happens before
//! it starts.
//!
//! Configuration errors abort immediately. Missing or unreadable upstream
//! files degrade the affected sample instead: it is classified with the
//! data it has and flagged in the summary table.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::classify::Classifier;
use crate::config::{self, FilterConfig, SampleSpec};
use crate::crossamp;
use crate::filters;
use crate::parse;
use crate::report::{self, RunSummary};
use crate::sample::{Sample, SampleCollection};

/// Options for one classification run.
#[derive(Clone, Debug)]
pub struct PipelineOpts {
    /// Collection config file (tab-separated).
    pub config: PathBuf,
    /// Directory holding the pairwise PrimerSearch reports.
    pub primersearch_dir: PathBuf,
    /// Directory holding per-sample BLAST screen tables, when the BLAST
    /// filter is active.
    pub blast_dir: Option<PathBuf>,
    pub outdir: PathBuf,
    pub force: bool,
    pub filters: FilterConfig,
    /// Worker threads for input loading (0/None = all logical cores).
    pub threads: Option<usize>,
}

/// Run the whole classification pipeline and write all reports.
pub fn run(opts: PipelineOpts) -> Result<RunSummary> {
    let specs = config::read_config(&opts.config)?;
    if specs.is_empty() {
        bail!("config {} describes no samples", opts.config.display());
    }
    info!("loaded {} sample definitions from {}", specs.len(), opts.config.display());
    report::prepare_outdir(&opts.outdir, opts.force)?;

    let threads = opts
        .threads
        .filter(|&t| t > 0)
        .unwrap_or_else(num_cpus::get)
        .max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();

    let samples: Vec<Sample> = specs
        .par_iter()
        .map(|spec| load_sample(spec, &opts.filters, opts.blast_dir.as_deref()))
        .collect::<Result<Vec<_>>>()?;
    let mut collection = SampleCollection::new(samples);

    crossamp::load_pairwise_results(
        &mut collection,
        &opts.primersearch_dir,
        opts.filters.single_product,
    )?;

    for sample in collection.iter() {
        if sample.is_degraded() {
            warn!(
                "[{}] classifying with degraded data: {}",
                sample.name,
                sample.degradation_notes().join("; ")
            );
        }
    }

    let classifier = Classifier::new(&collection, &opts.filters);
    report::write_all(&collection, &classifier, &opts.outdir)
}

/// Build one sample from its spec: parse its primer predictions, load its
/// sequence, and run the per-sample filters that are active.
fn load_sample(
    spec: &SampleSpec,
    filters: &FilterConfig,
    blast_dir: Option<&Path>,
) -> Result<Sample> {
    let mut sample = Sample::new(
        spec.name.clone(),
        spec.families.clone(),
        spec.seqfile.clone(),
        spec.featurefile.clone(),
        spec.primerfile.clone(),
    );

    match &spec.primerfile {
        Some(path) => match parse::read_eprimer3(path) {
            Ok(predictions) => {
                sample.add_predictions(predictions);
                info!("[{}] loaded {} primer pairs", sample.name, sample.primers.len());
            }
            Err(err) => {
                warn!("[{}] primer file unusable: {err:#}", sample.name);
                sample.mark_degraded(format!("primer file unusable: {err}"));
            }
        },
        None => sample.mark_degraded("no primer file configured"),
    }

    if let Err(err) = sample.load_sequence() {
        warn!("[{}] sequence not loaded: {err:#}", sample.name);
        sample.mark_degraded(format!("sequence not loaded: {err}"));
    }

    if filters.cds_overlap {
        match &spec.featurefile {
            Some(path) => {
                // An unsupported extension is a configuration error and
                // aborts; an unreadable file only degrades this sample.
                parse::feature_format(path)?;
                match parse::read_features(path) {
                    Ok(features) => {
                        filters::apply_cds_overlap(&mut sample, &features, filters.min_overlap)
                    }
                    Err(err) => {
                        warn!("[{}] feature file unusable: {err:#}", sample.name);
                        sample.mark_degraded(format!("feature file unusable: {err}"));
                    }
                }
            }
            None => sample.mark_degraded("CDS filter active but no feature file configured"),
        }
    }
    if filters.gc3prime {
        filters::apply_gc3prime(&mut sample);
    }
    if filters.oligo {
        filters::apply_oligo(&mut sample);
    }
    if filters.blast {
        if let Some(dir) = blast_dir {
            let path = dir.join(format!("{}_blast.tab", sample.name));
            match parse::read_blast_tab(&path) {
                Ok(hits) => filters::apply_blast(&mut sample, &hits),
                Err(err) => {
                    warn!("[{}] BLAST screen unusable: {err:#}", sample.name);
                    sample.mark_degraded(format!("BLAST screen unusable: {err}"));
                }
            }
        }
    }

    Ok(sample)
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use std::fs;

    const EPRIMER3_A: &str = "\
   1 PRODUCT SIZE: 100
     FORWARD PRIMER     10   20  59.97  55.00  CTGGGTAGGGTTAAGGTAAT
     REVERSE PRIMER     90   20  60.11  55.00  AGGATGTTGGGGATAAGATA
";
    const EPRIMER3_B: &str = "\
   1 PRODUCT SIZE: 100
     FORWARD PRIMER     10   20  59.50  50.00  ATTGGAATAGGTAAGGTAAA
     REVERSE PRIMER     90   20  59.80  45.00  TTGAAATGAAATAGGAAAAT
";

    fn primersearch(hits: usize) -> String {
        let mut text = String::from("Primer name A_primer_0001\n");
        for i in 0..hits {
            text.push_str(&format!("Amplimer {}\n\tAmplimer length: 100 bp\n", i + 1));
        }
        text
    }

    #[test]
    fn end_to_end_run_produces_reports() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("A.eprimer3"), EPRIMER3_A).unwrap();
        fs::write(root.join("B.eprimer3"), EPRIMER3_B).unwrap();
        fs::write(
            root.join("samples.tab"),
            format!(
                "# two-sample smoke run\nA\tF1\t-\t-\t{}\nB\tF1\t-\t-\t{}\n",
                root.join("A.eprimer3").display(),
                root.join("B.eprimer3").display()
            ),
        )
        .unwrap();
        let psdir = root.join("primersearch");
        fs::create_dir(&psdir).unwrap();
        fs::write(psdir.join("A_vs_B.primersearch"), primersearch(1)).unwrap();
        fs::write(
            psdir.join("B_vs_A.primersearch"),
            "Primer name B_primer_0001\n",
        )
        .unwrap();

        let outdir = root.join("results");
        let summary = run(PipelineOpts {
            config: root.join("samples.tab"),
            primersearch_dir: psdir,
            blast_dir: None,
            outdir: outdir.clone(),
            force: false,
            filters: FilterConfig::default(),
            threads: Some(2),
        })
        .unwrap();

        assert_eq!(summary.samples, 2);
        // A's only primer amplifies B (the whole rest of the collection):
        // universal, and family-unique for F1, but not sample-unique.
        assert_eq!(summary.unique_total, 1); // B's primer amplifies nothing
        assert_eq!(summary.universal_total, 1);
        assert!(outdir.join("differential_primer_results.tab").exists());
        assert!(outdir.join("universal_primers.eprimer3").exists());
    }

    #[test]
    fn missing_pairwise_reports_degrade_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("A.eprimer3"), EPRIMER3_A).unwrap();
        fs::write(
            root.join("samples.tab"),
            format!(
                "A\tF1\t-\t-\t{}\nB\tF1\t-\t-\t-\n",
                root.join("A.eprimer3").display()
            ),
        )
        .unwrap();
        let psdir = root.join("primersearch");
        fs::create_dir(&psdir).unwrap();

        let outdir = root.join("results");
        run(PipelineOpts {
            config: root.join("samples.tab"),
            primersearch_dir: psdir,
            blast_dir: None,
            outdir: outdir.clone(),
            force: false,
            filters: FilterConfig::default(),
            threads: Some(1),
        })
        .unwrap();

        let table =
            fs::read_to_string(outdir.join("differential_primer_results.tab")).unwrap();
        assert!(table.contains("DEGRADED"));
    }

    #[test]
    fn empty_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.tab");
        fs::write(&path, "# nothing here\n").unwrap();
        let err = run(PipelineOpts {
            config: path,
            primersearch_dir: dir.path().to_path_buf(),
            blast_dir: None,
            outdir: dir.path().join("results"),
            force: false,
            filters: FilterConfig::default(),
            threads: Some(1),
        })
        .unwrap_err();
        assert!(err.to_string().contains("no samples"));
    }
}

//! Data model for genome **samples** and their candidate **primer pairs**.
//!
//! A [`Sample`] owns everything known about one genome in the collection:
//! its family memberships, the locations of its input files, an optionally
//! loaded genome sequence, and its primers keyed by name. A
//! [`PrimerRecord`] carries the ePrimer3 payload (positions, Tm, %GC,
//! sequences) together with the derived classification state that the
//! filter chain and the cross-amplification matrix builder populate.
//!
//! All derived fields start in the passing/empty state and are only ever
//! assigned by those two stages. A primer that no upstream scan touched
//! therefore amplifies nothing and passes every filter, which keeps it in
//! candidacy rather than silently excluding it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use needletail::parse_fastx_file;
use tracing::info;

use crate::parse::PrimerPrediction;

/// Spacer joined between records when a sequence file describes multiple
/// contigs/scaffolds. Contains start and stop codons in all six frames so
/// genes cannot run across the joins; the same spacer is conventionally
/// used when the upstream primer prediction is run on concatenated input,
/// which keeps primer coordinates aligned with the sequence loaded here.
pub const CONCATENATION_SPACER: &str = "NNNNNCATTCCATTCATTAATTAATTAATGAATGAATGNNNNN";

/// A single primer oligo as reported by ePrimer3 (1-based start).
#[derive(Clone, Debug, PartialEq)]
pub struct Oligo {
    pub start: usize,
    pub length: usize,
    pub tm: f64,
    pub gc: f64,
    pub seq: String,
}

/// A candidate primer pair with its derived classification state.
#[derive(Clone, Debug)]
pub struct PrimerRecord {
    /// Unique within the source sample (`<sample>_primer_NNNN`).
    pub name: String,
    /// Expected amplification product size in bases.
    pub product_size: usize,
    pub forward: Oligo,
    pub reverse: Oligo,
    /// Internal hybridisation oligo, when one was predicted.
    pub internal: Option<Oligo>,
    /// Amplicon interval shares a cluster with a coding region.
    pub cds_overlap: bool,
    /// At most two G+C in the last five bases of both primers.
    pub gc3prime_valid: bool,
    /// Internal oligo shape rules hold (trivially true without an oligo).
    pub oligo_valid: bool,
    /// No strong off-target hit in the BLAST screen.
    pub blast_pass: bool,
    /// Product count against the negative control; `None` until computed.
    pub negative_control_amplimers: Option<usize>,
    /// Names of the *other* collection samples this pair amplifies.
    pub amplifies_sample: BTreeSet<String>,
    /// Families of the samples in `amplifies_sample`.
    pub amplifies_family: BTreeSet<String>,
}

impl PrimerRecord {
    pub fn new(
        name: String,
        product_size: usize,
        forward: Oligo,
        reverse: Oligo,
        internal: Option<Oligo>,
    ) -> Self {
        PrimerRecord {
            name,
            product_size,
            forward,
            reverse,
            internal,
            cds_overlap: true,
            gc3prime_valid: true,
            oligo_valid: true,
            blast_pass: true,
            negative_control_amplimers: None,
            amplifies_sample: BTreeSet::new(),
            amplifies_family: BTreeSet::new(),
        }
    }

    /// Interval spanned by the would-be amplicon: the forward primer start
    /// through the final base of the reverse primer. Returned 0-based,
    /// half-open, to match coding-region intervals from feature files.
    pub fn amplicon_span(&self) -> (i64, i64) {
        (
            self.forward.start as i64 - 1,
            (self.reverse.start - 1 + self.reverse.length) as i64,
        )
    }

    /// Slice the amplicon out of the source genome, or `None` when the
    /// primer coordinates fall outside the loaded sequence.
    pub fn amplicon<'a>(&self, sequence: &'a [u8]) -> Option<&'a [u8]> {
        let from = self.forward.start.checked_sub(1)?;
        let to = self.reverse.start.checked_sub(1)? + self.reverse.length;
        if from >= to {
            return None;
        }
        sequence.get(from..to)
    }
}

/// One genome in the run, with its primers and any degradation notes.
#[derive(Clone, Debug)]
pub struct Sample {
    pub name: String,
    pub families: Vec<String>,
    pub seqfile: Option<PathBuf>,
    pub featurefile: Option<PathBuf>,
    pub primerfile: Option<PathBuf>,
    /// Genome sequence, loaded on demand from `seqfile`.
    pub sequence: Option<Vec<u8>>,
    pub primers: BTreeMap<String, PrimerRecord>,
    /// Upstream-data problems surfaced in the summary report rather than
    /// aborting the run.
    degraded: Vec<String>,
}

impl Sample {
    pub fn new(
        name: String,
        families: Vec<String>,
        seqfile: Option<PathBuf>,
        featurefile: Option<PathBuf>,
        primerfile: Option<PathBuf>,
    ) -> Self {
        Sample {
            name,
            families,
            seqfile,
            featurefile,
            primerfile,
            sequence: None,
            primers: BTreeMap::new(),
            degraded: Vec::new(),
        }
    }

    /// Load the genome sequence from `seqfile`. Multi-record files are
    /// concatenated with [`CONCATENATION_SPACER`].
    pub fn load_sequence(&mut self) -> Result<()> {
        let Some(path) = &self.seqfile else {
            return Ok(());
        };
        let mut reader = parse_fastx_file(path)
            .with_context(|| format!("opening sequence file {}", path.display()))?;
        let mut records: Vec<Vec<u8>> = Vec::new();
        while let Some(record) = reader.next() {
            let rec =
                record.with_context(|| format!("reading sequence file {}", path.display()))?;
            records.push(rec.seq().to_vec());
        }
        let sequence = match records.len() {
            0 => anyhow::bail!("sequence file {} contains no records", path.display()),
            1 => records.remove(0),
            n => {
                info!(
                    "[{}] concatenating {} sequence records with spacers",
                    self.name, n
                );
                records.join(CONCATENATION_SPACER.as_bytes())
            }
        };
        self.sequence = Some(sequence);
        Ok(())
    }

    /// Install primer pairs parsed from an ePrimer3 report, naming them
    /// `<sample>_primer_NNNN` in report order.
    pub fn add_predictions(&mut self, predictions: Vec<PrimerPrediction>) {
        for (i, pred) in predictions.into_iter().enumerate() {
            let name = format!("{}_primer_{:04}", self.name, i + 1);
            self.primers.insert(
                name.clone(),
                PrimerRecord::new(
                    name,
                    pred.product_size,
                    pred.forward,
                    pred.reverse,
                    pred.internal,
                ),
            );
        }
    }

    pub fn mark_degraded(&mut self, note: impl Into<String>) {
        self.degraded.push(note.into());
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn degradation_notes(&self) -> &[String] {
        &self.degraded
    }
}

/// The full set of samples for a run, with family membership derived from
/// each sample's declarations.
#[derive(Clone, Debug, Default)]
pub struct SampleCollection {
    samples: Vec<Sample>,
}

impl SampleCollection {
    pub fn new(samples: Vec<Sample>) -> Self {
        SampleCollection { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Sample> {
        self.samples.iter_mut().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Family name -> member sample names, recomputed from the samples'
    /// declared memberships.
    pub fn family_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for sample in &self.samples {
            for family in &sample.families {
                map.entry(family.clone())
                    .or_default()
                    .insert(sample.name.clone());
            }
        }
        map
    }
}

//! Run configuration: the sample collection config file and the filter
//! toggles handed to the pipeline and classifier.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::crossamp::NEGATIVE_CONTROL;

/// Which quality filters a run applies, and their thresholds.
///
/// Passed explicitly into the filter chain and the classifier; there is no
/// global option state. Any subset of filters may be active.
#[derive(Clone, Debug)]
pub struct FilterConfig {
    /// Restrict primers to those whose amplicon clusters with a CDS.
    pub cds_overlap: bool,
    /// Minimum overlap, in bases, for the coding-region clustering.
    pub min_overlap: u64,
    /// Reject primers with more than two G+C in the last five bases.
    pub gc3prime: bool,
    /// Reject primers whose internal oligo breaks the shape rules.
    pub oligo: bool,
    /// Reject primers with a strong off-target BLAST hit.
    pub blast: bool,
    /// Require exactly one product against the negative control.
    pub single_product: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            cds_overlap: false,
            min_overlap: 50,
            gc3prime: false,
            oligo: false,
            blast: false,
            single_product: false,
        }
    }
}

/// One line of the collection config file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleSpec {
    pub name: String,
    pub families: Vec<String>,
    pub seqfile: Option<PathBuf>,
    pub featurefile: Option<PathBuf>,
    pub primerfile: Option<PathBuf>,
}

/// Read a collection config file.
///
/// The format is five tab-separated columns: sample name, comma-separated
/// family names, sequence FASTA path, feature file path, ePrimer3 primer
/// file path. `-` marks a value as not provided and `#` starts a comment
/// line. Duplicate sample names, and the reserved negative-control name,
/// are configuration errors.
pub fn read_config(path: &Path) -> Result<Vec<SampleSpec>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening config file {}", path.display()))?;

    let mut specs = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for record in rdr.records() {
        let record = record.with_context(|| format!("reading config file {}", path.display()))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() < 2 {
            bail!(
                "{}:{}: expected at least sample name and families, got {} column(s)",
                path.display(),
                line,
                record.len()
            );
        }
        let name = record[0].to_string();
        if name.is_empty() || name == "-" {
            bail!("{}:{}: sample name is required", path.display(), line);
        }
        if name == NEGATIVE_CONTROL {
            bail!(
                "{}:{}: sample name {:?} is reserved for the negative control",
                path.display(),
                line,
                name
            );
        }
        if !seen.insert(name.clone()) {
            bail!("{}:{}: duplicate sample name {:?}", path.display(), line, name);
        }
        let families = match &record[1] {
            "-" => Vec::new(),
            value => value
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
        };
        specs.push(SampleSpec {
            name,
            families,
            seqfile: optional_path(&record, 2),
            featurefile: optional_path(&record, 3),
            primerfile: optional_path(&record, 4),
        });
    }
    Ok(specs)
}

fn optional_path(record: &csv::StringRecord, index: usize) -> Option<PathBuf> {
    match record.get(index) {
        None | Some("") | Some("-") => None,
        Some(value) => Some(PathBuf::from(value)),
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_placeholders_comments_and_families() {
        let file = write_config(
            "# collection for the smoke run\n\
             Pba\tF1,F2\tPba.fasta\tPba.gbk\tPba.eprimer3\n\
             Pca\tF1\t-\t-\tPca.eprimer3\n",
        );
        let specs = read_config(file.path()).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].families, vec!["F1", "F2"]);
        assert_eq!(specs[0].featurefile, Some(PathBuf::from("Pba.gbk")));
        assert_eq!(specs[1].seqfile, None);
        assert_eq!(specs[1].primerfile, Some(PathBuf::from("Pca.eprimer3")));
    }

    #[test]
    fn duplicate_sample_names_are_rejected() {
        let file = write_config("A\tF1\t-\t-\t-\nA\tF2\t-\t-\t-\n");
        let err = read_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate sample name"));
    }

    #[test]
    fn negative_control_name_is_reserved() {
        let file = write_config("negative_control\tF1\t-\t-\t-\n");
        assert!(read_config(file.path()).is_err());
    }

    #[test]
    fn short_lines_are_rejected() {
        let file = write_config("justaname\n");
        assert!(read_config(file.path()).is_err());
    }

    #[test]
    fn default_filter_config_is_all_inactive() {
        let cfg = FilterConfig::default();
        assert!(!cfg.cds_overlap && !cfg.gc3prime && !cfg.oligo);
        assert!(!cfg.blast && !cfg.single_product);
        assert_eq!(cfg.min_overlap, 50);
    }
}

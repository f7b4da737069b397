//! Report writing: primer exports, amplicon FASTA files and the two
//! tab-separated summary tables.
//!
//! File naming follows the established workflow conventions:
//! `<sample>_specific_primers.eprimer3`,
//! `<family>_family_specific_primers.eprimer3`,
//! `universal_primers.eprimer3`, matching `*_amplicons.fasta` files, and
//! `differential_primer_results.tab` /
//! `differential_primer_results-families.tab` summaries.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bio::io::fasta;
use tracing::{info, warn};

use crate::classify::Classifier;
use crate::sample::{PrimerRecord, Sample, SampleCollection};

/// Totals reported back to the caller after all files are written.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    pub samples: usize,
    pub unique_total: usize,
    pub family_total: usize,
    pub universal_total: usize,
}

/// Create `outdir` if missing; refuse to reuse a non-empty directory
/// unless `force` is set.
pub fn prepare_outdir(outdir: &Path, force: bool) -> Result<()> {
    if outdir.exists() {
        let occupied = fs::read_dir(outdir)
            .with_context(|| format!("reading output directory {}", outdir.display()))?
            .next()
            .is_some();
        if occupied && !force {
            bail!(
                "output directory {} is not empty (pass --force to overwrite)",
                outdir.display()
            );
        }
    } else {
        fs::create_dir_all(outdir)
            .with_context(|| format!("creating output directory {}", outdir.display()))?;
    }
    Ok(())
}

/// Run every classification query and write the full report set.
pub fn write_all<'a>(
    collection: &'a SampleCollection,
    classifier: &Classifier<'a>,
    outdir: &Path,
) -> Result<RunSummary> {
    let mut summary = RunSummary {
        samples: collection.len(),
        ..RunSummary::default()
    };
    let mut family_specific: BTreeMap<String, Vec<(&Sample, &PrimerRecord)>> = BTreeMap::new();
    let mut universal_all: Vec<(&Sample, &PrimerRecord)> = Vec::new();
    let mut sample_rows: Vec<Vec<String>> = Vec::new();

    for sample in collection.iter() {
        let unique: Vec<(&Sample, &PrimerRecord)> = classifier
            .unique(sample)
            .into_iter()
            .map(|p| (sample, p))
            .collect();
        let universal: Vec<(&Sample, &PrimerRecord)> = classifier
            .universal(sample)
            .into_iter()
            .map(|p| (sample, p))
            .collect();
        for family in &sample.families {
            let members = classifier.family_unique(sample, family)?;
            family_specific
                .entry(family.clone())
                .or_default()
                .extend(members.into_iter().map(|p| (sample, p)));
        }

        write_primer_file(
            &outdir.join(format!("{}_specific_primers.eprimer3", sample.name)),
            &unique,
        )?;
        write_amplicon_fasta(
            &outdir.join(format!("{}_specific_amplicons.fasta", sample.name)),
            &unique,
        )?;

        summary.unique_total += unique.len();
        summary.universal_total += universal.len();
        sample_rows.push(vec![
            sample.name.clone(),
            sample.families.join(","),
            unique.len().to_string(),
            universal.len().to_string(),
            path_or_dash(&sample.seqfile),
            path_or_dash(&sample.featurefile),
            path_or_dash(&sample.primerfile),
            status_of(sample),
        ]);
        universal_all.extend(universal);
    }

    write_primer_file(&outdir.join("universal_primers.eprimer3"), &universal_all)?;
    write_amplicon_fasta(&outdir.join("universal_amplicons.fasta"), &universal_all)?;

    let mut family_rows: Vec<Vec<String>> = Vec::new();
    for (family, primers) in &family_specific {
        let primerfile = outdir.join(format!("{family}_family_specific_primers.eprimer3"));
        let ampliconfile = outdir.join(format!("{family}_family_specific_amplicons.fasta"));
        write_primer_file(&primerfile, primers)?;
        write_amplicon_fasta(&ampliconfile, primers)?;
        summary.family_total += primers.len();
        family_rows.push(vec![
            family.clone(),
            primers.len().to_string(),
            primerfile.display().to_string(),
            ampliconfile.display().to_string(),
        ]);
    }

    write_sample_summary(
        &outdir.join("differential_primer_results.tab"),
        &sample_rows,
    )?;
    write_family_summary(
        &outdir.join("differential_primer_results-families.tab"),
        &family_rows,
    )?;

    info!(
        "wrote reports for {} samples to {} ({} unique, {} family-specific, {} universal primers)",
        summary.samples,
        outdir.display(),
        summary.unique_total,
        summary.family_total,
        summary.universal_total
    );
    Ok(summary)
}

fn path_or_dash(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "-".to_string(),
    }
}

fn status_of(sample: &Sample) -> String {
    if sample.is_degraded() {
        format!("DEGRADED: {}", sample.degradation_notes().join("; "))
    } else {
        "ok".to_string()
    }
}

/// Write primers in the ePrimer3-style table format: per primer a comment
/// naming it and its source, the product size, the forward/reverse lines
/// (start, length, Tm, %GC, sequence) and the internal oligo when present.
pub fn write_primer_file(path: &Path, primers: &[(&Sample, &PrimerRecord)]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("creating primer file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "# EPRIMER3 PRIMERS {}", path.display())?;
    writeln!(out, "#                      Start  Len   Tm     GC%   Sequence")?;
    writeln!(out)?;
    for (index, (sample, primer)) in primers.iter().enumerate() {
        writeln!(out, "# {} {}", primer.name, sample.name)?;
        writeln!(out, "{:<4} PRODUCT SIZE: {}", index + 1, primer.product_size)?;
        writeln!(
            out,
            "     FORWARD PRIMER  {:<9}  {:<3}  {:.2}  {:.2}  {}",
            primer.forward.start,
            primer.forward.length,
            primer.forward.tm,
            primer.forward.gc,
            primer.forward.seq
        )?;
        writeln!(
            out,
            "     REVERSE PRIMER  {:<9}  {:<3}  {:.2}  {:.2}  {}",
            primer.reverse.start,
            primer.reverse.length,
            primer.reverse.tm,
            primer.reverse.gc,
            primer.reverse.seq
        )?;
        if let Some(oligo) = &primer.internal {
            writeln!(
                out,
                "     INTERNAL OLIGO  {:<9}  {:<3}  {:.2}  {:.2}  {}",
                oligo.start, oligo.length, oligo.tm, oligo.gc, oligo.seq
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write amplicon sequences for primers whose source sample has a loaded
/// genome. Returns how many records were written.
pub fn write_amplicon_fasta(path: &Path, primers: &[(&Sample, &PrimerRecord)]) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("creating amplicon file {}", path.display()))?;
    let mut writer = fasta::Writer::new(file);
    let mut written = 0usize;
    for (sample, primer) in primers {
        let Some(sequence) = &sample.sequence else {
            continue;
        };
        match primer.amplicon(sequence) {
            Some(amplicon) => {
                writer
                    .write(&primer.name, Some(&sample.name), amplicon)
                    .with_context(|| format!("writing amplicon file {}", path.display()))?;
                written += 1;
            }
            None => warn!(
                "[{}] amplicon for {} is outside the loaded sequence",
                sample.name, primer.name
            ),
        }
    }
    Ok(written)
}

fn write_sample_summary(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("creating summary table {}", path.display()))?;
    for line in [
        "# Summary information table",
        "# Generated by diffprimer",
        "# Columns in the table:",
        "# 1) Query sample ID",
        "# 2) Query sample families",
        "# 3) Count of sample-unique primers",
        "# 4) Count of universal primers",
        "# 5) Query sequence filename",
        "# 6) Query feature filename",
        "# 7) Query primer filename",
        "# 8) Classification status",
    ] {
        writeln!(file, "{line}")?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(file);
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_family_summary(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("creating summary table {}", path.display()))?;
    for line in [
        "# Summary information table",
        "# Generated by diffprimer",
        "# Columns in the table:",
        "# 1) Family",
        "# 2) Count of family-specific primers",
        "# 3) Family-specific primer file",
        "# 4) Family-specific amplicon file",
    ] {
        writeln!(file, "{line}")?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(file);
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod report_tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::sample::Oligo;

    fn oligo(start: usize, seq: &str) -> Oligo {
        Oligo {
            start,
            length: seq.len(),
            tm: 59.5,
            gc: 50.0,
            seq: seq.to_string(),
        }
    }

    fn primer(name: &str, amplifies: &[&str]) -> PrimerRecord {
        let mut p = PrimerRecord::new(
            name.into(),
            100,
            oligo(10, "ACGTACGTACGTACGTACGT"),
            oligo(90, "TGCATGCATGCATGCATGCA"),
            None,
        );
        for t in amplifies {
            p.amplifies_sample.insert(t.to_string());
        }
        p
    }

    fn collection() -> SampleCollection {
        let mut a = Sample::new("A".into(), vec!["F1".into()], None, None, None);
        a.sequence = Some(vec![b'A'; 200]);
        for p in [
            primer("A_primer_0001", &[]),
            primer("A_primer_0002", &["B"]),
        ] {
            a.primers.insert(p.name.clone(), p);
        }
        let b = Sample::new("B".into(), vec!["F1".into()], None, None, None);
        SampleCollection::new(vec![a, b])
    }

    #[test]
    fn prepare_outdir_refuses_occupied_directory_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let outdir = dir.path().join("results");
        prepare_outdir(&outdir, false).unwrap();
        std::fs::write(outdir.join("stale.txt"), "x").unwrap();
        assert!(prepare_outdir(&outdir, false).is_err());
        prepare_outdir(&outdir, true).unwrap();
    }

    #[test]
    fn write_all_emits_expected_files_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let coll = collection();
        let cfg = FilterConfig::default();
        let classifier = Classifier::new(&coll, &cfg);
        let summary = write_all(&coll, &classifier, dir.path()).unwrap();

        assert_eq!(summary.samples, 2);
        assert_eq!(summary.unique_total, 1);
        // A_primer_0002 amplifies the only other sample.
        assert_eq!(summary.universal_total, 1);
        // F1 has two members, so family-unique for A needs exactly {B}.
        assert_eq!(summary.family_total, 1);

        for name in [
            "A_specific_primers.eprimer3",
            "A_specific_amplicons.fasta",
            "universal_primers.eprimer3",
            "F1_family_specific_primers.eprimer3",
            "differential_primer_results.tab",
            "differential_primer_results-families.tab",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }

        let table =
            std::fs::read_to_string(dir.path().join("differential_primer_results.tab")).unwrap();
        let row = table
            .lines()
            .find(|l| l.starts_with("A\t"))
            .expect("row for sample A");
        assert!(row.contains("\tF1\t1\t1\t"));
        assert!(row.trim_end().ends_with("\tok"));
    }

    #[test]
    fn degraded_samples_are_flagged_in_the_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut coll = collection();
        coll.get_mut("B")
            .unwrap()
            .mark_degraded("no amplification data vs A");
        let cfg = FilterConfig::default();
        let classifier = Classifier::new(&coll, &cfg);
        write_all(&coll, &classifier, dir.path()).unwrap();
        let table =
            std::fs::read_to_string(dir.path().join("differential_primer_results.tab")).unwrap();
        let row = table.lines().find(|l| l.starts_with("B\t")).unwrap();
        assert!(row.contains("DEGRADED: no amplification data vs A"));
    }

    #[test]
    fn primer_export_contains_the_field_set() {
        let dir = tempfile::tempdir().unwrap();
        let coll = collection();
        let a = coll.get("A").unwrap();
        let path = dir.path().join("out.eprimer3");
        let pairs: Vec<(&Sample, &PrimerRecord)> =
            a.primers.values().map(|p| (a, p)).collect();
        write_primer_file(&path, &pairs).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("PRODUCT SIZE: 100"));
        assert!(text.contains("FORWARD PRIMER"));
        assert!(text.contains("ACGTACGTACGTACGTACGT"));
        assert!(text.contains("# A_primer_0001 A"));
    }

    #[test]
    fn amplicons_are_written_only_with_a_loaded_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let coll = collection();
        let a = coll.get("A").unwrap();
        let b = coll.get("B").unwrap();
        let p = &a.primers["A_primer_0001"];
        let with_seq = vec![(a, p)];
        let without_seq = vec![(b, p)];
        let n = write_amplicon_fasta(&dir.path().join("a.fasta"), &with_seq).unwrap();
        assert_eq!(n, 1);
        let n = write_amplicon_fasta(&dir.path().join("b.fasta"), &without_seq).unwrap();
        assert_eq!(n, 0);
    }
}

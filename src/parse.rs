//! Readers for the upstream tool outputs the classification consumes.
//!
//! Four external collaborators feed this crate, all as files on disk:
//! gene finders (GenBank or Prodigal feature files), EMBOSS ePrimer3
//! (primer predictions), EMBOSS PrimerSearch (pairwise amplification
//! reports) and BLASTN (tabular off-target screen). Each reader parses
//! only what the classification needs and returns plain data.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::sample::Oligo;

/// A coding-region interval, 0-based and half-open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CdsInterval {
    pub start: i64,
    pub end: i64,
}

/// Supported feature-file formats, decided by extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureFormat {
    GenBank,
    Prodigal,
}

/// Decide the format of a feature file from its extension. An
/// unrecognised extension is a configuration error.
pub fn feature_format(path: &Path) -> Result<FeatureFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "gbk" | "gb" | "genbank" => Ok(FeatureFormat::GenBank),
        "prodigalout" => Ok(FeatureFormat::Prodigal),
        other => bail!(
            "unsupported feature file extension {:?} for {} (expected .gbk/.gb/.genbank or .prodigalout)",
            other,
            path.display()
        ),
    }
}

/// Read CDS intervals from a feature file in either supported format.
pub fn read_features(path: &Path) -> Result<Vec<CdsInterval>> {
    match feature_format(path)? {
        FeatureFormat::GenBank => read_genbank_features(path),
        FeatureFormat::Prodigal => read_prodigal_features(path),
    }
}

fn read_genbank_features(path: &Path) -> Result<Vec<CdsInterval>> {
    let seqs = gb_io::reader::parse_file(path)
        .with_context(|| format!("parsing GenBank file {}", path.display()))?;
    let mut intervals = Vec::new();
    for seq in &seqs {
        for feature in &seq.features {
            if !feature.kind.to_string().eq_ignore_ascii_case("CDS") {
                continue;
            }
            if let Ok((start, end)) = feature.location.find_bounds() {
                intervals.push(CdsInterval { start, end });
            }
        }
    }
    Ok(intervals)
}

/// Prodigal's GenBank-flavoured output is not close enough to GenBank for
/// a real parser; feature lines are read directly, as in
/// `     CDS             complement(313..1848)`.
fn read_prodigal_features(path: &Path) -> Result<Vec<CdsInterval>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading Prodigal output {}", path.display()))?;
    let mut intervals = Vec::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        if let (Some("CDS"), Some(location)) = (fields.next(), fields.next()) {
            if let Some(iv) = parse_genbank_span(location) {
                intervals.push(iv);
            }
        }
    }
    Ok(intervals)
}

/// Parse a GenBank-style span such as `123..456`, `complement(313..1848)`
/// or `<1..>500` into a 0-based half-open interval.
fn parse_genbank_span(location: &str) -> Option<CdsInterval> {
    let inner = location
        .trim()
        .trim_start_matches("complement(")
        .trim_end_matches(')');
    let (a, b) = inner.split_once("..")?;
    let parse_pos = |s: &str| {
        s.trim_matches(|c| c == '<' || c == '>')
            .parse::<i64>()
            .ok()
    };
    let (a, b) = (parse_pos(a)?, parse_pos(b)?);
    Some(CdsInterval {
        start: a.min(b) - 1,
        end: a.max(b),
    })
}

/// One primer pair from an EMBOSS ePrimer3 report.
#[derive(Clone, Debug)]
pub struct PrimerPrediction {
    pub product_size: usize,
    pub forward: Oligo,
    pub reverse: Oligo,
    pub internal: Option<Oligo>,
}

pub fn read_eprimer3(path: &Path) -> Result<Vec<PrimerPrediction>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading ePrimer3 file {}", path.display()))?;
    parse_eprimer3(&text).with_context(|| format!("parsing ePrimer3 file {}", path.display()))
}

/// Parse the body of an ePrimer3 report. Records open with a
/// `PRODUCT SIZE:` line and list one `FORWARD PRIMER` and one
/// `REVERSE PRIMER` line (columns: start, length, Tm, %GC, sequence),
/// optionally followed by an `INTERNAL OLIGO` line.
pub fn parse_eprimer3(text: &str) -> Result<Vec<PrimerPrediction>> {
    struct Pending {
        product_size: usize,
        forward: Option<Oligo>,
        reverse: Option<Oligo>,
        internal: Option<Oligo>,
    }

    fn finish(pending: Pending, out: &mut Vec<PrimerPrediction>) -> Result<()> {
        match (pending.forward, pending.reverse) {
            (Some(forward), Some(reverse)) => {
                out.push(PrimerPrediction {
                    product_size: pending.product_size,
                    forward,
                    reverse,
                    internal: pending.internal,
                });
                Ok(())
            }
            _ => bail!("primer record {} lacks a forward or reverse line", out.len() + 1),
        }
    }

    let mut out = Vec::new();
    let mut pending: Option<Pending> = None;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((_, size)) = line.split_once("PRODUCT SIZE:") {
            if let Some(done) = pending.take() {
                finish(done, &mut out)?;
            }
            let product_size = size
                .trim()
                .parse()
                .with_context(|| format!("line {}: bad product size", lineno + 1))?;
            pending = Some(Pending {
                product_size,
                forward: None,
                reverse: None,
                internal: None,
            });
        } else if let Some(rest) = line.strip_prefix("FORWARD PRIMER") {
            if let Some(p) = pending.as_mut() {
                p.forward = Some(parse_oligo_line(rest, lineno + 1)?);
            }
        } else if let Some(rest) = line.strip_prefix("REVERSE PRIMER") {
            if let Some(p) = pending.as_mut() {
                p.reverse = Some(parse_oligo_line(rest, lineno + 1)?);
            }
        } else if let Some(rest) = line.strip_prefix("INTERNAL OLIGO") {
            if let Some(p) = pending.as_mut() {
                p.internal = Some(parse_oligo_line(rest, lineno + 1)?);
            }
        }
    }
    if let Some(done) = pending.take() {
        finish(done, &mut out)?;
    }
    Ok(out)
}

fn parse_oligo_line(rest: &str, lineno: usize) -> Result<Oligo> {
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 5 {
        bail!("line {}: expected start, length, Tm, GC%, sequence", lineno);
    }
    Ok(Oligo {
        start: fields[0]
            .parse()
            .with_context(|| format!("line {}: bad start", lineno))?,
        length: fields[1]
            .parse()
            .with_context(|| format!("line {}: bad length", lineno))?,
        tm: fields[2]
            .parse()
            .with_context(|| format!("line {}: bad Tm", lineno))?,
        gc: fields[3]
            .parse()
            .with_context(|| format!("line {}: bad GC%", lineno))?,
        seq: fields[4].to_string(),
    })
}

/// Amplification product counts per primer name from an EMBOSS
/// PrimerSearch report. Primers that produced no amplimer are reported
/// with a count of zero.
pub fn parse_primersearch(text: &str) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Primer name ") {
            let name = name.trim().to_string();
            counts.entry(name.clone()).or_insert(0);
            current = Some(name);
        } else if line.starts_with("Amplimer ") && !line.starts_with("Amplimer length") {
            if let Some(name) = &current {
                if let Some(count) = counts.get_mut(name) {
                    *count += 1;
                }
            }
        }
    }
    counts
}

pub fn read_primersearch(path: &Path) -> Result<BTreeMap<String, usize>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading PrimerSearch report {}", path.display()))?;
    Ok(parse_primersearch(&text))
}

/// Best-hit identity fraction per query from a
/// `blastn -outfmt '6 qseqid nident qlen'` table. BLAST reports hits
/// best-first per query, so only the first row for each query is kept.
pub fn read_blast_tab(path: &Path) -> Result<BTreeMap<String, f64>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening BLAST table {}", path.display()))?;
    let mut best: BTreeMap<String, f64> = BTreeMap::new();
    for record in rdr.records() {
        let record =
            record.with_context(|| format!("reading BLAST table {}", path.display()))?;
        if record.len() < 3 {
            bail!(
                "{}: expected three columns (qseqid, nident, qlen), got {}",
                path.display(),
                record.len()
            );
        }
        let query = record[0].to_string();
        if best.contains_key(&query) {
            continue;
        }
        let identities: f64 = record[1]
            .parse()
            .with_context(|| format!("{}: bad identity count for {}", path.display(), query))?;
        let qlen: f64 = record[2]
            .parse()
            .with_context(|| format!("{}: bad query length for {}", path.display(), query))?;
        if qlen <= 0.0 {
            continue;
        }
        best.insert(query, identities / qlen);
    }
    Ok(best)
}




#[cfg(test)]
mod blast_tests {
    use super::*;

    #[test]
    fn first_row_per_query_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Pba_blast.tab");
        std::fs::write(
            &path,
            "# blastn screen\nPba_primer_0001_forward\t19\t20\nPba_primer_0001_forward\t10\t20\nPba_primer_0002_reverse\t12\t20\n",
        )
        .unwrap();
        let best = read_blast_tab(&path).unwrap();
        assert!((best["Pba_primer_0001_forward"] - 0.95).abs() < 1e-9);
        assert!((best["Pba_primer_0002_reverse"] - 0.60).abs() < 1e-9);
    }
}

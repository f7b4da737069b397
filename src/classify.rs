//! Primer specificity classification.
//!
//! [`Classifier`] is a pure query layer over a fully-populated
//! collection: it borrows the samples immutably, so the filter flags and
//! amplification sets must be in place before the first query and cannot
//! change afterwards. The pipeline enforces the stage order; the borrow
//! makes it impossible to get wrong within one scope.
//!
//! Every query applies the active filters as an AND-mask on top of its
//! base predicate, in a fixed order (CDS overlap, 3' GC, internal oligo,
//! BLAST, single product), logging the count remaining after each stage
//! so attrition can be audited. Inactive filters are skipped, not treated
//! as failing.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use tracing::info;

use crate::config::FilterConfig;
use crate::filters;
use crate::sample::{PrimerRecord, Sample, SampleCollection};

pub struct Classifier<'a> {
    collection: &'a SampleCollection,
    filters: &'a FilterConfig,
    families: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> Classifier<'a> {
    pub fn new(collection: &'a SampleCollection, filters: &'a FilterConfig) -> Self {
        let families = collection.family_map();
        Classifier {
            collection,
            filters,
            families,
        }
    }

    /// Primers that amplify nothing else in the collection.
    ///
    /// A primer with no recorded amplification data at all has an empty
    /// `amplifies_sample` and lands here; unscanned primers stay in
    /// candidacy rather than being quietly dropped.
    pub fn unique(&self, sample: &'a Sample) -> Vec<&'a PrimerRecord> {
        let base = sample
            .primers
            .values()
            .filter(|p| p.amplifies_sample.is_empty())
            .collect();
        self.masked(sample, base, "unique")
    }

    /// Primers that amplify exactly the other members of `family` and
    /// nothing outside it. For a single-member family this degenerates to
    /// the same set as [`Classifier::unique`].
    ///
    /// A family with no members in the collection is a configuration
    /// error.
    pub fn family_unique(
        &self,
        sample: &'a Sample,
        family: &str,
    ) -> Result<Vec<&'a PrimerRecord>> {
        let Some(members) = self.families.get(family).filter(|m| !m.is_empty()) else {
            bail!("family {:?} has no members in the collection", family);
        };
        let mut expected = members.clone();
        expected.remove(&sample.name);
        let base = sample
            .primers
            .values()
            .filter(|p| p.amplifies_sample == expected)
            .collect();
        Ok(self.masked(sample, base, &format!("{family}-specific")))
    }

    /// Primers that amplify every other sample in the collection. Empty
    /// by definition when the collection holds fewer than two samples.
    pub fn universal(&self, sample: &'a Sample) -> Vec<&'a PrimerRecord> {
        if self.collection.len() < 2 {
            return Vec::new();
        }
        let wanted = self.collection.len() - 1;
        let base = sample
            .primers
            .values()
            .filter(|p| p.amplifies_sample.len() == wanted)
            .collect();
        self.masked(sample, base, "universal")
    }

    /// AND-mask of the active filters, logging attrition per stage.
    fn masked(
        &self,
        sample: &Sample,
        mut primers: Vec<&'a PrimerRecord>,
        label: &str,
    ) -> Vec<&'a PrimerRecord> {
        info!("[{}] {} {} candidates", sample.name, primers.len(), label);
        type Stage = (&'static str, bool, fn(&PrimerRecord) -> bool);
        let stages: [Stage; 5] = [
            ("CDS overlap", self.filters.cds_overlap, |p| p.cds_overlap),
            ("3' GC", self.filters.gc3prime, |p| p.gc3prime_valid),
            ("oligo", self.filters.oligo, |p| p.oligo_valid),
            ("BLAST", self.filters.blast, |p| p.blast_pass),
            (
                "single product",
                self.filters.single_product,
                filters::single_product_ok,
            ),
        ];
        for (stage, active, keep) in stages {
            if !active {
                continue;
            }
            primers.retain(|p| keep(p));
            info!(
                "[{}] {} primers after {} filter",
                sample.name,
                primers.len(),
                stage
            );
        }
        primers
    }
}

#[cfg(test)]
mod classifier_tests {
    use super::*;
    use crate::sample::Oligo;

    fn oligo(seq: &str) -> Oligo {
        Oligo {
            start: 10,
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
            oligo("AAAAAAAAAT"),
            oligo("AAAAAAAAAT"),
            None,
        );
        for target in amplifies {
            p.amplifies_sample.insert(target.to_string());
        }
        p
    }

    fn sample(name: &str, families: &[&str], primers: Vec<PrimerRecord>) -> Sample {
        let mut s = Sample::new(
            name.into(),
            families.iter().map(|f| f.to_string()).collect(),
            None,
            None,
            None,
        );
        for p in primers {
            s.primers.insert(p.name.clone(), p);
        }
        s
    }

    /// A(F1), B(F1), C(F2), with A holding one primer per amplification
    /// pattern of interest.
    fn three_sample_collection() -> SampleCollection {
        let a = sample(
            "A",
            &["F1"],
            vec![
                primer("A_primer_0001", &["B"]),
                primer("A_primer_0002", &["B", "C"]),
                primer("A_primer_0003", &[]),
            ],
        );
        let b = sample("B", &["F1"], vec![]);
        let c = sample("C", &["F2"], vec![primer("C_primer_0001", &[])]);
        SampleCollection::new(vec![a, b, c])
    }

    fn names(primers: &[&PrimerRecord]) -> Vec<String> {
        primers.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn family_amplifier_is_family_unique_not_unique_or_universal() {
        let coll = three_sample_collection();
        let cfg = FilterConfig::default();
        let classifier = Classifier::new(&coll, &cfg);
        let a = coll.get("A").unwrap();

        let family = classifier.family_unique(a, "F1").unwrap();
        assert_eq!(names(&family), vec!["A_primer_0001"]);
        assert!(!names(&classifier.unique(a)).contains(&"A_primer_0001".to_string()));
        assert!(!names(&classifier.universal(a)).contains(&"A_primer_0001".to_string()));
    }

    #[test]
    fn amplifying_every_other_sample_is_universal_only() {
        let coll = three_sample_collection();
        let cfg = FilterConfig::default();
        let classifier = Classifier::new(&coll, &cfg);
        let a = coll.get("A").unwrap();

        assert_eq!(names(&classifier.universal(a)), vec!["A_primer_0002"]);
        assert!(!names(&classifier.unique(a)).contains(&"A_primer_0002".to_string()));
    }

    #[test]
    fn unscanned_primer_classifies_as_unique() {
        let coll = three_sample_collection();
        let cfg = FilterConfig::default();
        let classifier = Classifier::new(&coll, &cfg);
        let a = coll.get("A").unwrap();
        assert_eq!(names(&classifier.unique(a)), vec!["A_primer_0003"]);
    }

    #[test]
    fn single_member_family_degenerates_to_unique() {
        let coll = three_sample_collection();
        let cfg = FilterConfig::default();
        let classifier = Classifier::new(&coll, &cfg);
        let c = coll.get("C").unwrap();
        assert_eq!(
            names(&classifier.family_unique(c, "F2").unwrap()),
            names(&classifier.unique(c))
        );
    }

    #[test]
    fn empty_family_is_a_configuration_error() {
        let coll = three_sample_collection();
        let cfg = FilterConfig::default();
        let classifier = Classifier::new(&coll, &cfg);
        let a = coll.get("A").unwrap();
        assert!(classifier.family_unique(a, "F9").is_err());
    }

    #[test]
    fn universal_is_empty_below_two_samples() {
        let coll = SampleCollection::new(vec![sample(
            "A",
            &["F1"],
            vec![primer("A_primer_0001", &[])],
        )]);
        let cfg = FilterConfig::default();
        let classifier = Classifier::new(&coll, &cfg);
        let a = coll.get("A").unwrap();
        assert!(classifier.universal(a).is_empty());
        // The same primer still classifies as unique.
        assert_eq!(classifier.unique(a).len(), 1);
    }

    #[test]
    fn inactive_filters_are_skipped_active_ones_mask() {
        let mut coll = three_sample_collection();
        if let Some(a) = coll.get_mut("A") {
            if let Some(p) = a.primers.get_mut("A_primer_0003") {
                p.gc3prime_valid = false;
            }
        }
        let inactive = FilterConfig::default();
        let active = FilterConfig {
            gc3prime: true,
            ..FilterConfig::default()
        };
        let a_name = "A";

        let classifier = Classifier::new(&coll, &inactive);
        assert_eq!(
            names(&classifier.unique(coll.get(a_name).unwrap())),
            vec!["A_primer_0003"]
        );

        let classifier = Classifier::new(&coll, &active);
        assert!(classifier.unique(coll.get(a_name).unwrap()).is_empty());
    }

    #[test]
    fn failing_single_product_excludes_from_every_set() {
        let mut coll = three_sample_collection();
        if let Some(a) = coll.get_mut("A") {
            for p in a.primers.values_mut() {
                p.negative_control_amplimers = Some(2);
            }
        }
        let cfg = FilterConfig {
            single_product: true,
            ..FilterConfig::default()
        };
        let classifier = Classifier::new(&coll, &cfg);
        let a = coll.get("A").unwrap();
        assert!(classifier.unique(a).is_empty());
        assert!(classifier.family_unique(a, "F1").unwrap().is_empty());
        assert!(classifier.universal(a).is_empty());
    }
}

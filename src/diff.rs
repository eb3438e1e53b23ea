//! Field-level structural comparison of two canonical records
//!
//! [`compare`] is pure: it never logs and never fails. Data-shape differences are the
//! output of the tool, so they come back as [`DiscrepancyReport`]s rather than errors.
//!
//! Attributes are compared type-first. A type missing from one side is reported once and
//! not examined further; for shared types the values are lined up position by position
//! in attribute order, which avoids matching every value against every other value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AccessionId, Attribute, Record};

/// Timestamps closer than this are considered equal
const TIMESTAMP_TOLERANCE_SECONDS: i64 = 24 * 60 * 60;

/// Which part of a record a discrepancy concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldCategory {
    Scalar,
    Attribute,
    Relationship,
    ExternalReference,
    Organization,
    Contact,
    Publication,
}

impl fmt::Display for FieldCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldCategory::Scalar => "scalar",
            FieldCategory::Attribute => "attribute",
            FieldCategory::Relationship => "relationship",
            FieldCategory::ExternalReference => "external-reference",
            FieldCategory::Organization => "organization",
            FieldCategory::Contact => "contact",
            FieldCategory::Publication => "publication",
        };
        f.write_str(label)
    }
}

/// How the two sides disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscrepancyKind {
    /// Scalar field differs
    Mismatch,
    /// Present in the old record only
    OldOnly,
    /// Present in the new record only
    NewOnly,
    /// Attribute type has a different number of values on each side
    ValueCount,
    Value,
    Unit,
    Iri,
}

impl DiscrepancyKind {
    /// The kind reported when old and new are exchanged
    pub fn mirrored(self) -> Self {
        match self {
            DiscrepancyKind::OldOnly => DiscrepancyKind::NewOnly,
            DiscrepancyKind::NewOnly => DiscrepancyKind::OldOnly,
            other => other,
        }
    }
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiscrepancyKind::Mismatch => "mismatch",
            DiscrepancyKind::OldOnly => "old only",
            DiscrepancyKind::NewOnly => "new only",
            DiscrepancyKind::ValueCount => "value count",
            DiscrepancyKind::Value => "value",
            DiscrepancyKind::Unit => "unit",
            DiscrepancyKind::Iri => "iri",
        };
        f.write_str(label)
    }
}

/// A single field-level difference between the old and new representation of an accession
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub accession: AccessionId,
    pub category: FieldCategory,
    /// Field name for scalars, attribute type for attributes, the element itself for sets
    pub key: String,
    pub kind: DiscrepancyKind,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl fmt::Display for DiscrepancyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}' {}: old={} new={}",
            self.accession,
            self.category,
            self.key,
            self.kind,
            self.old.as_deref().unwrap_or("<none>"),
            self.new.as_deref().unwrap_or("<none>")
        )
    }
}

/// Compare two records of the same accession field by field
pub fn compare(accession: &AccessionId, old: &Record, new: &Record) -> Vec<DiscrepancyReport> {
    let mut reports = Reports {
        accession,
        items: Vec::new(),
    };

    compare_scalars(&mut reports, old, new);
    compare_attributes(&mut reports, &old.attributes, &new.attributes);
    compare_sets(
        &mut reports,
        FieldCategory::Relationship,
        &old.relationships,
        &new.relationships,
    );
    compare_sets(
        &mut reports,
        FieldCategory::ExternalReference,
        &old.external_references,
        &new.external_references,
    );
    compare_sets(
        &mut reports,
        FieldCategory::Organization,
        &old.organizations,
        &new.organizations,
    );
    compare_sets(
        &mut reports,
        FieldCategory::Contact,
        &old.contacts,
        &new.contacts,
    );
    compare_sets(
        &mut reports,
        FieldCategory::Publication,
        &old.publications,
        &new.publications,
    );

    reports.items
}

struct Reports<'a> {
    accession: &'a AccessionId,
    items: Vec<DiscrepancyReport>,
}

impl Reports<'_> {
    fn push(
        &mut self,
        category: FieldCategory,
        key: impl Into<String>,
        kind: DiscrepancyKind,
        old: Option<String>,
        new: Option<String>,
    ) {
        self.items.push(DiscrepancyReport {
            accession: self.accession.clone(),
            category,
            key: key.into(),
            kind,
            old,
            new,
        });
    }
}

fn compare_scalars(reports: &mut Reports<'_>, old: &Record, new: &Record) {
    if old.accession != new.accession {
        reports.push(
            FieldCategory::Scalar,
            "accession",
            DiscrepancyKind::Mismatch,
            Some(old.accession.to_string()),
            Some(new.accession.to_string()),
        );
    }
    if old.name != new.name {
        reports.push(
            FieldCategory::Scalar,
            "name",
            DiscrepancyKind::Mismatch,
            old.name.clone(),
            new.name.clone(),
        );
    }
    if !timestamps_match(old.release, new.release) {
        reports.push(
            FieldCategory::Scalar,
            "release",
            DiscrepancyKind::Mismatch,
            old.release.map(|t| t.to_rfc3339()),
            new.release.map(|t| t.to_rfc3339()),
        );
    }
    if !timestamps_match(old.update, new.update) {
        reports.push(
            FieldCategory::Scalar,
            "update",
            DiscrepancyKind::Mismatch,
            old.update.map(|t| t.to_rfc3339()),
            new.update.map(|t| t.to_rfc3339()),
        );
    }
}

/// Migrations may shift timezone or precision, so a day of drift is tolerated
fn timestamps_match(old: Option<DateTime<Utc>>, new: Option<DateTime<Utc>>) -> bool {
    match (old, new) {
        (None, None) => true,
        (Some(old), Some(new)) => {
            (old - new).num_seconds().abs() <= TIMESTAMP_TOLERANCE_SECONDS
        }
        _ => false,
    }
}

/// Group attributes by type; set iteration order keeps each group sorted
fn group_by_type(attributes: &BTreeSet<Attribute>) -> BTreeMap<&str, Vec<&Attribute>> {
    let mut groups: BTreeMap<&str, Vec<&Attribute>> = BTreeMap::new();
    for attribute in attributes {
        groups
            .entry(attribute.attribute_type.as_str())
            .or_default()
            .push(attribute);
    }
    groups
}

fn joined_values(values: &[&Attribute]) -> String {
    values
        .iter()
        .map(|a| a.value.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn compare_attributes(
    reports: &mut Reports<'_>,
    old: &BTreeSet<Attribute>,
    new: &BTreeSet<Attribute>,
) {
    let old_groups = group_by_type(old);
    let new_groups = group_by_type(new);

    for (attribute_type, values) in &old_groups {
        if !new_groups.contains_key(attribute_type) {
            reports.push(
                FieldCategory::Attribute,
                *attribute_type,
                DiscrepancyKind::OldOnly,
                Some(joined_values(values)),
                None,
            );
        }
    }
    for (attribute_type, values) in &new_groups {
        if !old_groups.contains_key(attribute_type) {
            reports.push(
                FieldCategory::Attribute,
                *attribute_type,
                DiscrepancyKind::NewOnly,
                None,
                Some(joined_values(values)),
            );
        }
    }

    for (attribute_type, old_values) in &old_groups {
        let Some(new_values) = new_groups.get(attribute_type) else {
            continue;
        };

        if old_values.len() != new_values.len() {
            reports.push(
                FieldCategory::Attribute,
                *attribute_type,
                DiscrepancyKind::ValueCount,
                Some(old_values.len().to_string()),
                Some(new_values.len().to_string()),
            );
            continue;
        }

        for (old_attribute, new_attribute) in old_values.iter().zip(new_values.iter()) {
            compare_attribute_pair(reports, attribute_type, old_attribute, new_attribute);
        }
    }
}

fn compare_attribute_pair(
    reports: &mut Reports<'_>,
    attribute_type: &str,
    old: &Attribute,
    new: &Attribute,
) {
    if old.value != new.value {
        reports.push(
            FieldCategory::Attribute,
            attribute_type,
            DiscrepancyKind::Value,
            Some(old.value.clone()),
            Some(new.value.clone()),
        );
    }

    // A unit on only one side is not a discrepancy
    if let (Some(old_unit), Some(new_unit)) = (&old.unit, &new.unit)
        && old_unit != new_unit
    {
        reports.push(
            FieldCategory::Attribute,
            attribute_type,
            DiscrepancyKind::Unit,
            Some(old_unit.clone()),
            Some(new_unit.clone()),
        );
    }

    if iri_lists_differ(&old.iri, &new.iri) {
        reports.push(
            FieldCategory::Attribute,
            attribute_type,
            DiscrepancyKind::Iri,
            Some(format!("{:?}", old.iri)),
            Some(format!("{:?}", new.iri)),
        );
    }
}

/// A length difference decides immediately; otherwise the first unequal pair does
fn iri_lists_differ(old: &[String], new: &[String]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    old.iter().zip(new).any(|(old_iri, new_iri)| old_iri != new_iri)
}

fn compare_sets<T>(
    reports: &mut Reports<'_>,
    category: FieldCategory,
    old: &BTreeSet<T>,
    new: &BTreeSet<T>,
) where
    T: Ord + fmt::Display,
{
    for item in old.difference(new) {
        let key = item.to_string();
        reports.push(category, key.clone(), DiscrepancyKind::OldOnly, Some(key), None);
    }
    for item in new.difference(old) {
        let key = item.to_string();
        reports.push(category, key.clone(), DiscrepancyKind::NewOnly, None, Some(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Contact, ExternalReference, Organization, Publication, Relationship};
    use chrono::TimeZone;

    fn sample() -> Record {
        Record::builder("SAMEA1")
            .name("liver biopsy")
            .release(Some(Utc.with_ymd_and_hms(2017, 3, 29, 23, 0, 0).unwrap()))
            .update(Some(Utc.with_ymd_and_hms(2017, 3, 30, 20, 59, 36).unwrap()))
            .attribute(Attribute::new("age", "10").with_unit("year"))
            .attribute(
                Attribute::new("organism", "Mus musculus")
                    .with_iri(["http://purl.obolibrary.org/obo/NCBITaxon_10090"]),
            )
            .attribute(Attribute::new("synonym", "MUS MUSCULUS"))
            .attribute(Attribute::new("synonym", "7d9ac5c0"))
            .relationship(Relationship::new("SAMEA1", "derived from", "SAMEA9").unwrap())
            .external_reference(ExternalReference::new(
                "http://www.ebi.ac.uk/ena/data/view/ERS1463623",
            ))
            .organization(Organization {
                name: Some("EBI".to_string()),
                ..Default::default()
            })
            .contact(Contact {
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                ..Default::default()
            })
            .publication(Publication {
                doi: Some("10.1000/xyz".to_string()),
                pubmed_id: None,
            })
            .build()
    }

    fn keys(reports: &[DiscrepancyReport]) -> BTreeSet<(FieldCategory, String, DiscrepancyKind)> {
        reports
            .iter()
            .map(|r| (r.category, r.key.clone(), r.kind))
            .collect()
    }

    #[test]
    fn test_identical_records_have_no_discrepancies() {
        let record = sample();
        assert!(compare(&record.accession, &record, &record).is_empty());
    }

    #[test]
    fn test_attribute_value_difference() {
        let old = Record::builder("B")
            .attribute(Attribute::new("age", "10"))
            .build();
        let new = Record::builder("B")
            .attribute(Attribute::new("age", "12"))
            .build();

        let reports = compare(&AccessionId::new("B"), &old, &new);
        assert_eq!(
            reports,
            vec![DiscrepancyReport {
                accession: AccessionId::new("B"),
                category: FieldCategory::Attribute,
                key: "age".to_string(),
                kind: DiscrepancyKind::Value,
                old: Some("10".to_string()),
                new: Some("12".to_string()),
            }]
        );
    }

    #[test]
    fn test_missing_relationship_reported_old_only() {
        let old = Record::builder("B")
            .relationship(Relationship::new("B", "derived from", "X").unwrap())
            .build();
        let new = Record::builder("B").build();

        let reports = compare(&AccessionId::new("B"), &old, &new);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].category, FieldCategory::Relationship);
        assert_eq!(reports[0].kind, DiscrepancyKind::OldOnly);
        assert_eq!(reports[0].old.as_deref(), Some("B derived from X"));
        assert_eq!(reports[0].new, None);
    }

    #[test]
    fn test_iri_length_difference_reported_once() {
        let old = Record::builder("B")
            .attribute(Attribute::new("organism", "human").with_iri(["http://a"]))
            .build();
        let new = Record::builder("B")
            .attribute(Attribute::new("organism", "human").with_iri(["http://a", "http://b"]))
            .build();

        let reports = compare(&AccessionId::new("B"), &old, &new);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, DiscrepancyKind::Iri);
        assert_eq!(reports[0].key, "organism");
    }

    #[test]
    fn test_iri_same_length_compared_in_stored_order() {
        let old = Record::builder("B")
            .attribute(Attribute::new("organism", "human").with_iri(["http://a", "http://b"]))
            .build();
        let new = Record::builder("B")
            .attribute(Attribute::new("organism", "human").with_iri(["http://b", "http://a"]))
            .build();

        let reports = compare(&AccessionId::new("B"), &old, &new);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, DiscrepancyKind::Iri);
    }

    #[test]
    fn test_missing_attribute_type_reported_once_without_detail() {
        let old = Record::builder("B")
            .attribute(Attribute::new("age", "10").with_unit("year").with_iri(["http://x"]))
            .attribute(Attribute::new("age", "11"))
            .attribute(Attribute::new("sex", "female"))
            .build();
        let new = Record::builder("B")
            .attribute(Attribute::new("sex", "female"))
            .build();

        let reports = compare(&AccessionId::new("B"), &old, &new);
        let age: Vec<_> = reports.iter().filter(|r| r.key == "age").collect();
        assert_eq!(age.len(), 1);
        assert_eq!(age[0].kind, DiscrepancyKind::OldOnly);
        assert_eq!(age[0].old.as_deref(), Some("10, 11"));
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn test_value_count_mismatch_skips_positional_compare() {
        let old = Record::builder("B")
            .attribute(Attribute::new("synonym", "a"))
            .build();
        let new = Record::builder("B")
            .attribute(Attribute::new("synonym", "b"))
            .attribute(Attribute::new("synonym", "c"))
            .build();

        let reports = compare(&AccessionId::new("B"), &old, &new);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, DiscrepancyKind::ValueCount);
        assert_eq!(reports[0].old.as_deref(), Some("1"));
        assert_eq!(reports[0].new.as_deref(), Some("2"));
    }

    #[test]
    fn test_unit_only_compared_when_both_present() {
        let old = Record::builder("B")
            .attribute(Attribute::new("age", "10").with_unit("year"))
            .attribute(Attribute::new("height", "3"))
            .build();
        let new = Record::builder("B")
            .attribute(Attribute::new("age", "10").with_unit("month"))
            .attribute(Attribute::new("height", "3").with_unit("metre"))
            .build();

        let reports = compare(&AccessionId::new("B"), &old, &new);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].key, "age");
        assert_eq!(reports[0].kind, DiscrepancyKind::Unit);
    }

    #[test]
    fn test_timestamps_within_a_day_match() {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let old = Record::builder("B").release(Some(base)).build();
        let close = Record::builder("B")
            .release(Some(base + chrono::Duration::hours(23)))
            .build();
        let far = Record::builder("B")
            .release(Some(base + chrono::Duration::hours(49)))
            .build();
        let missing = Record::builder("B").build();

        let accession = AccessionId::new("B");
        assert!(compare(&accession, &old, &close).is_empty());
        assert_eq!(compare(&accession, &old, &far).len(), 1);

        let reports = compare(&accession, &old, &missing);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].key, "release");
        assert_eq!(reports[0].new, None);
    }

    #[test]
    fn test_scalar_name_difference() {
        let old = Record::builder("B").name("first").build();
        let new = Record::builder("B").name("second").build();

        let reports = compare(&AccessionId::new("B"), &old, &new);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].category, FieldCategory::Scalar);
        assert_eq!(reports[0].key, "name");
    }

    #[test]
    fn test_comparison_is_symmetric() {
        let old = sample();
        let mut new = sample();
        new.name = Some("renamed".to_string());
        new.attributes.insert(Attribute::new("sex", "male"));
        new.attributes.remove(&Attribute::new("age", "10").with_unit("year"));
        new.attributes.insert(Attribute::new("age", "10").with_unit("month"));
        new.relationships.clear();
        new.external_references
            .insert(ExternalReference::new("http://www.ncbi.nlm.nih.gov/biosample/1"));
        new.publications.clear();

        let forward = compare(&old.accession, &old, &new);
        let backward = compare(&old.accession, &new, &old);
        assert!(!forward.is_empty());

        let mirrored: BTreeSet<_> = backward
            .iter()
            .map(|r| (r.category, r.key.clone(), r.kind.mirrored()))
            .collect();
        assert_eq!(keys(&forward), mirrored);

        for report in &forward {
            let twin = backward
                .iter()
                .find(|b| b.category == report.category && b.key == report.key)
                .unwrap();
            assert_eq!(twin.old, report.new);
            assert_eq!(twin.new, report.old);
        }
    }

    #[test]
    fn test_report_display() {
        let report = DiscrepancyReport {
            accession: AccessionId::new("SAMEA1"),
            category: FieldCategory::Attribute,
            key: "age".to_string(),
            kind: DiscrepancyKind::Value,
            old: Some("10".to_string()),
            new: None,
        };
        assert_eq!(
            report.to_string(),
            "SAMEA1 attribute 'age' value: old=10 new=<none>"
        );
    }
}

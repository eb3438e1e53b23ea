//! Canonical in-memory sample record
//!
//! Both sides of a migration are converted into these types before diffing. Every
//! collection on [`Record`] is a `BTreeSet`, so duplicate elements collapse on insert
//! and iteration order is the natural field order of each type.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Accession prefix reserved for sample groups
pub const GROUP_PREFIX: &str = "SAMEG";

/// Stable identifier of a sample or sample group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessionId(String);

impl AccessionId {
    pub fn new(accession: impl Into<String>) -> Self {
        Self(accession.into())
    }

    /// Parse an accession from untrusted text, trimming surrounding whitespace
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptyAccession);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> RecordKind {
        if self.0.starts_with(GROUP_PREFIX) {
            RecordKind::Group
        } else {
            RecordKind::Sample
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind() == RecordKind::Group
    }
}

impl fmt::Display for AccessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AccessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which resource family a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Sample,
    Group,
}

impl RecordKind {
    /// Path segment of the collection resource for this kind
    pub fn path_segment(&self) -> &'static str {
        match self {
            RecordKind::Sample => "samples",
            RecordKind::Group => "groups",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Sample => f.write_str("sample"),
            RecordKind::Group => f.write_str("group"),
        }
    }
}

/// A typed characteristic of a record, optionally annotated with ontology terms and a unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub value: String,
    /// Ontology IRIs in the order the source document listed them
    pub iri: Vec<String>,
    pub unit: Option<String>,
}

impl Attribute {
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            value: value.into(),
            iri: Vec::new(),
            unit: None,
        }
    }

    pub fn with_iri<I, S>(mut self, iri: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.iri = iri.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// IRI lists order by length first, then element-wise in stored order
pub(crate) fn compare_iri_lists(left: &[String], right: &[String]) -> Ordering {
    left.len()
        .cmp(&right.len())
        .then_with(|| left.iter().cmp(right.iter()))
}

impl Ord for Attribute {
    fn cmp(&self, other: &Self) -> Ordering {
        self.attribute_type
            .cmp(&other.attribute_type)
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| compare_iri_lists(&self.iri, &other.iri))
            .then_with(|| self.unit.cmp(&other.unit))
    }
}

impl PartialOrd for Attribute {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute_type, self.value)?;
        if !self.iri.is_empty() {
            write!(f, " iri={:?}", self.iri)?;
        }
        if let Some(unit) = &self.unit {
            write!(f, " unit={}", unit)?;
        }
        Ok(())
    }
}

/// Directed, typed link between two accessions
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relationship {
    source: String,
    #[serde(rename = "type")]
    relationship_type: String,
    target: String,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        relationship_type: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let source = source.into();
        let relationship_type = relationship_type.into();
        let target = target.into();

        if source.trim().is_empty() {
            return Err(ModelError::EmptyRelationshipField { field: "source" });
        }
        if relationship_type.trim().is_empty() {
            return Err(ModelError::EmptyRelationshipField { field: "type" });
        }
        if target.trim().is_empty() {
            return Err(ModelError::EmptyRelationshipField { field: "target" });
        }

        Ok(Self {
            source,
            relationship_type,
            target,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn relationship_type(&self) -> &str {
        &self.relationship_type
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.source, self.relationship_type, self.target
        )
    }
}

/// Link to the same sample in an external archive
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalReference {
    pub url: String,
    /// Data use ontology codes
    pub duo: BTreeSet<String>,
}

impl ExternalReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            duo: BTreeSet::new(),
        }
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)?;
        if !self.duo.is_empty() {
            let codes: Vec<&str> = self.duo.iter().map(String::as_str).collect();
            write!(f, " duo=[{}]", codes.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Organization {
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub url: Option<String>,
    pub address: Option<String>,
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(
            f,
            &[
                ("name", &self.name),
                ("role", &self.role),
                ("email", &self.email),
                ("url", &self.url),
                ("address", &self.address),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Contact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mid_initials: Option<String>,
    /// Free-text full name, used by sources that do not split names
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub affiliation: Option<String>,
    pub url: Option<String>,
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(
            f,
            &[
                ("first_name", &self.first_name),
                ("last_name", &self.last_name),
                ("mid_initials", &self.mid_initials),
                ("name", &self.name),
                ("role", &self.role),
                ("email", &self.email),
                ("affiliation", &self.affiliation),
                ("url", &self.url),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Publication {
    pub doi: Option<String>,
    pub pubmed_id: Option<String>,
}

impl fmt::Display for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(f, &[("doi", &self.doi), ("pubmed_id", &self.pubmed_id)])
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[(&str, &Option<String>)]) -> fmt::Result {
    let mut first = true;
    f.write_str("{")?;
    for (label, value) in fields {
        if let Some(value) = value {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", label, value)?;
            first = false;
        }
    }
    f.write_str("}")
}

/// Canonical sample (or group) representation shared by every source format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub accession: AccessionId,
    pub name: Option<String>,
    pub release: Option<DateTime<Utc>>,
    pub update: Option<DateTime<Utc>>,
    pub attributes: BTreeSet<Attribute>,
    pub relationships: BTreeSet<Relationship>,
    pub external_references: BTreeSet<ExternalReference>,
    pub organizations: BTreeSet<Organization>,
    pub contacts: BTreeSet<Contact>,
    pub publications: BTreeSet<Publication>,
}

impl Record {
    pub fn builder(accession: impl Into<AccessionId>) -> RecordBuilder {
        RecordBuilder::new(accession.into())
    }
}

/// Incremental construction of a [`Record`]
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    fn new(accession: AccessionId) -> Self {
        Self {
            record: Record {
                accession,
                name: None,
                release: None,
                update: None,
                attributes: BTreeSet::new(),
                relationships: BTreeSet::new(),
                external_references: BTreeSet::new(),
                organizations: BTreeSet::new(),
                contacts: BTreeSet::new(),
                publications: BTreeSet::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.record.name = Some(name.into());
        self
    }

    pub fn maybe_name(mut self, name: Option<String>) -> Self {
        self.record.name = name;
        self
    }

    pub fn release(mut self, release: Option<DateTime<Utc>>) -> Self {
        self.record.release = release;
        self
    }

    pub fn update(mut self, update: Option<DateTime<Utc>>) -> Self {
        self.record.update = update;
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.record.attributes.insert(attribute);
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.record.relationships.insert(relationship);
        self
    }

    pub fn external_reference(mut self, reference: ExternalReference) -> Self {
        self.record.external_references.insert(reference);
        self
    }

    pub fn organization(mut self, organization: Organization) -> Self {
        self.record.organizations.insert(organization);
        self
    }

    pub fn contact(mut self, contact: Contact) -> Self {
        self.record.contacts.insert(contact);
        self
    }

    pub fn publication(mut self, publication: Publication) -> Self {
        self.record.publications.insert(publication);
        self
    }

    pub fn build(self) -> Record {
        self.record
    }
}

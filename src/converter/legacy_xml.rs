//! Legacy XML `BioSample` / `BioSampleGroup` documents

use crate::converter::parse_optional_timestamp;
use crate::converter::xml::XmlElement;
use crate::error::{ConversionError, ConversionResult};
use crate::model::{
    AccessionId, Attribute, Contact, ExternalReference, Organization, Publication, Record,
    RecordBuilder, Relationship,
};

/// Sample properties that carry a relationship instead of an attribute
const SAMPLE_RELATIONSHIP_CLASSES: &[(&str, &str)] = &[
    ("Child Of", "child of"),
    ("recurated from", "recurated from"),
    ("Same As", "same as"),
];

pub fn convert_sample(raw: &str) -> ConversionResult<Record> {
    let root = XmlElement::parse(raw)?;
    let accession = accession_of(&root)?;

    let mut builder = Record::builder(accession.clone())
        .release(parse_optional_timestamp(
            "submissionReleaseDate",
            root.attribute("submissionReleaseDate"),
        )?)
        .update(parse_optional_timestamp(
            "submissionUpdateDate",
            root.attribute("submissionUpdateDate"),
        )?);

    for property in root.children("Property") {
        let class = property.attribute("class").unwrap_or_default();

        if class == "Sample Name" {
            builder = builder.maybe_name(property.path_text(&["QualifiedValue", "Value"]));
        } else if class == "Sample Description" {
            for value in values_of(property) {
                builder = builder.attribute(Attribute::new("description", value));
            }
        } else if let Some((_, relationship_type)) = SAMPLE_RELATIONSHIP_CLASSES
            .iter()
            .find(|(property_class, _)| *property_class == class)
        {
            for target in values_of(property) {
                builder = builder.relationship(Relationship::new(
                    accession.as_str(),
                    *relationship_type,
                    target,
                )?);
            }
        } else {
            for qualified in property.children("QualifiedValue") {
                let value = qualified.path_text(&["Value"]).unwrap_or_default();
                let mut attribute = Attribute::new(class, value)
                    .with_iri(qualified.path_text(&["TermSourceREF", "TermSourceID"]));
                if let Some(unit) = qualified.path_text(&["Unit"]) {
                    attribute = attribute.with_unit(unit);
                }
                builder = builder.attribute(attribute);
            }
        }
    }

    for derived_from in root.children("derivedFrom") {
        builder = builder.relationship(Relationship::new(
            accession.as_str(),
            "derived from",
            derived_from.text(),
        )?);
    }

    Ok(with_shared_sections(builder, &root).build())
}

pub fn convert_group(raw: &str) -> ConversionResult<Record> {
    let root = XmlElement::parse(raw)?;
    let accession = accession_of(&root)?;

    let mut release = root.attribute("submissionReleaseDate").map(str::to_string);
    let mut update = root.attribute("submissionUpdateDate").map(str::to_string);
    let mut builder = Record::builder(accession);

    for property in root.children("Property") {
        let class = property.attribute("class").unwrap_or_default();
        match class {
            "Group Name" => {
                builder = builder.maybe_name(property.path_text(&["QualifiedValue", "Value"]));
            }
            "Group Description" => {
                for value in values_of(property) {
                    builder = builder.attribute(Attribute::new("description", value));
                }
            }
            "Submission Release Date" => {
                release = property.path_text(&["QualifiedValue", "Value"]);
            }
            "Submission Update Date" => {
                update = property.path_text(&["QualifiedValue", "Value"]);
            }
            _ => {
                for qualified in property.children("QualifiedValue") {
                    let value = qualified.path_text(&["Value"]).unwrap_or_default();
                    // Group documents nest the unit under TermSourceREF
                    let mut attribute = Attribute::new(class, value)
                        .with_iri(qualified.path_text(&["TermSourceREF", "TermSourceID"]));
                    if let Some(unit) = qualified.path_text(&["TermSourceREF", "Unit"]) {
                        attribute = attribute.with_unit(unit);
                    }
                    builder = builder.attribute(attribute);
                }
            }
        }
    }

    let builder = builder
        .release(parse_optional_timestamp(
            "Submission Release Date",
            release.as_deref(),
        )?)
        .update(parse_optional_timestamp(
            "Submission Update Date",
            update.as_deref(),
        )?);

    Ok(with_shared_sections(builder, &root).build())
}

fn accession_of(root: &XmlElement) -> ConversionResult<AccessionId> {
    let id = root
        .attribute("id")
        .ok_or_else(|| ConversionError::MissingField {
            field: "id".to_string(),
        })?;
    Ok(AccessionId::parse(id)?)
}

/// Every `QualifiedValue/Value` of a property, in document order
fn values_of(property: &XmlElement) -> Vec<String> {
    property
        .children("QualifiedValue")
        .filter_map(|qualified| qualified.path_text(&["Value"]))
        .collect()
}

fn optional_text(element: &XmlElement, name: &str) -> Option<String> {
    element
        .path_text(&[name])
        .filter(|text| !text.is_empty())
}

/// Database links, contacts, publications and organizations
fn with_shared_sections(mut builder: RecordBuilder, root: &XmlElement) -> RecordBuilder {
    for database in root.children("Database") {
        if let Some(uri) = optional_text(database, "URI") {
            builder = builder.external_reference(ExternalReference::new(uri));
        }
    }

    for person in root.children("Person") {
        builder = builder.contact(Contact {
            first_name: optional_text(person, "FirstName"),
            last_name: optional_text(person, "LastName"),
            mid_initials: optional_text(person, "MidInitials"),
            email: optional_text(person, "Email"),
            role: optional_text(person, "Role"),
            ..Default::default()
        });
    }

    for publication in root.children("Publication") {
        builder = builder.publication(Publication {
            doi: optional_text(publication, "DOI"),
            pubmed_id: optional_text(publication, "PubMedID"),
        });
    }

    for organization in root.children("Organization") {
        builder = builder.organization(Organization {
            name: optional_text(organization, "Name"),
            address: optional_text(organization, "Address"),
            url: optional_text(organization, "URI"),
            email: optional_text(organization, "Email"),
            role: optional_text(organization, "Role"),
        });
    }

    builder
}

//! JSON sample documents, both the legacy layout and the HAL layout
//!
//! The two layouts share most field names; where they differ (`releaseDate` vs `release`,
//! `URL` vs `url`) both spellings are accepted.

use serde_json::{Map, Value};

use crate::converter::parse_optional_timestamp;
use crate::error::{ConversionError, ConversionResult};
use crate::model::{
    AccessionId, Attribute, Contact, ExternalReference, Organization, Publication, Record,
    Relationship,
};

pub fn convert(raw: &str) -> ConversionResult<Record> {
    let document: Value = serde_json::from_str(raw)?;
    let accession = text(&document, &["accession"]).ok_or_else(|| {
        ConversionError::MissingField {
            field: "accession".to_string(),
        }
    })?;
    let accession = AccessionId::parse(&accession)?;

    let mut builder = Record::builder(accession.clone())
        .maybe_name(text(&document, &["name"]))
        .release(parse_optional_timestamp(
            "releaseDate",
            text(&document, &["releaseDate", "release"]).as_deref(),
        )?)
        .update(parse_optional_timestamp(
            "updateDate",
            text(&document, &["updateDate", "update"]).as_deref(),
        )?);

    if let Some(description) = text(&document, &["description"]) {
        builder = builder.attribute(Attribute::new("description", description));
    }
    for attribute in characteristics(&document) {
        builder = builder.attribute(attribute);
    }
    for field in ["submission_acc", "submission_title"] {
        if let Some(value) = text(&document, &[field]) {
            builder = builder.attribute(Attribute::new(field, value));
        }
    }

    for contact in objects(&document, "contact") {
        builder = builder.contact(Contact {
            first_name: text_in(contact, &["FirstName"]),
            last_name: text_in(contact, &["LastName"]),
            mid_initials: text_in(contact, &["MidInitials"]),
            name: text_in(contact, &["Name"]),
            role: text_in(contact, &["Role"]),
            email: text_in(contact, &["E-mail", "Email"]),
            affiliation: text_in(contact, &["Affiliation"]),
            url: text_in(contact, &["URL"]),
        });
    }
    for publication in objects(&document, "publications") {
        builder = builder.publication(Publication {
            doi: text_in(publication, &["doi"]),
            pubmed_id: text_in(publication, &["pubmed_id"]),
        });
    }
    for organization in objects(&document, "organization") {
        builder = builder.organization(Organization {
            name: text_in(organization, &["Name"]),
            role: text_in(organization, &["Role"]),
            email: text_in(organization, &["E-mail", "Email"]),
            url: text_in(organization, &["URI", "URL"]),
            address: text_in(organization, &["Address"]),
        });
    }

    for url in external_reference_urls(&document)? {
        builder = builder.external_reference(ExternalReference::new(url));
    }

    for relationship in objects(&document, "relationships") {
        if let (Some(source), Some(relationship_type), Some(target)) = (
            text_in(relationship, &["source"]),
            text_in(relationship, &["type"]),
            text_in(relationship, &["target"]),
        ) {
            builder = builder.relationship(Relationship::new(source, relationship_type, target)?);
        }
    }

    if accession.is_group()
        && let Some(members) = document.get("samples").and_then(Value::as_array)
    {
        for member in members.iter().filter_map(scalar) {
            builder =
                builder.relationship(Relationship::new(accession.as_str(), "has member", member)?);
        }
    }

    Ok(builder.build())
}

/// `characteristics` maps an attribute type to a list of `{text, ontologyTerms, unit}`
fn characteristics(document: &Value) -> Vec<Attribute> {
    let Some(types) = document.get("characteristics").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut attributes = Vec::new();
    for (attribute_type, values) in types {
        for value in values.as_array().into_iter().flatten() {
            let Some(value) = value.as_object() else {
                continue;
            };
            let iri: Vec<String> = value
                .get("ontologyTerms")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(scalar)
                .collect();
            let mut attribute = Attribute::new(
                attribute_type.as_str(),
                text_in(value, &["text"]).unwrap_or_default(),
            )
            .with_iri(iri);
            if let Some(unit) = text_in(value, &["unit"]) {
                attribute = attribute.with_unit(unit);
            }
            attributes.push(attribute);
        }
    }
    attributes
}

/// Legacy documents embed external references as a serialized JSON string
fn external_reference_urls(document: &Value) -> ConversionResult<Vec<String>> {
    let mut urls = Vec::new();
    match document.get("externalReferences") {
        Some(Value::String(serialized)) if !serialized.trim().is_empty() => {
            let embedded: Value = serde_json::from_str(serialized)?;
            collect_urls(&embedded, &mut urls);
        }
        Some(value) => collect_urls(value, &mut urls),
        None => {}
    }
    Ok(urls)
}

fn collect_urls(value: &Value, urls: &mut Vec<String>) {
    match value {
        Value::Object(fields) => {
            for (key, field) in fields {
                if key.eq_ignore_ascii_case("url") {
                    if let Some(url) = scalar(field) {
                        urls.push(url);
                    }
                } else {
                    collect_urls(field, urls);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_urls(item, urls)),
        _ => {}
    }
}

fn objects<'a>(document: &'a Value, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    document
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn text(document: &Value, keys: &[&str]) -> Option<String> {
    document.as_object().and_then(|fields| text_in(fields, keys))
}

/// First non-blank scalar among the given keys
fn text_in(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key).and_then(scalar))
        .find(|value| !value.trim().is_empty())
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

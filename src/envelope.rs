//! Paginated listing envelopes
//!
//! Inventory pages (`/samples`, `/groups`) and group membership pages
//! (`/groupsamples/{accession}`) come wrapped in format-specific paging metadata.

use serde_json::Value;

use crate::converter::SourceFormat;
use crate::converter::xml::XmlElement;
use crate::error::{ConversionError, ConversionResult};
use crate::model::{AccessionId, RecordKind};

/// XML element names that carry an accession in listing pages
const XML_ITEM_ELEMENTS: &[&str] = &["BioSample", "BioSampleGroup"];

/// One page of an inventory crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryPage {
    pub total_pages: usize,
    pub accessions: Vec<AccessionId>,
}

/// One page of group membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipPage {
    pub members: Vec<AccessionId>,
    /// Offset of the last member on this page
    pub to: usize,
    pub total: usize,
}

impl MembershipPage {
    pub fn is_last(&self) -> bool {
        self.to >= self.total
    }
}

pub fn parse_inventory_page(
    format: SourceFormat,
    kind: RecordKind,
    body: &str,
    page_size: usize,
) -> ConversionResult<InventoryPage> {
    match format {
        SourceFormat::Xml => {
            let root = XmlElement::parse(body)?;
            let total = summary_number(&root, "Total")?;
            Ok(InventoryPage {
                total_pages: total.div_ceil(page_size.max(1)).max(1),
                accessions: xml_accessions(&root),
            })
        }
        SourceFormat::Json => {
            let document: Value = serde_json::from_str(body)?;
            let total_pages = page_number(&document, "totalPages")?;
            Ok(InventoryPage {
                total_pages: total_pages.max(1),
                accessions: json_accessions(&document, kind.path_segment()),
            })
        }
    }
}

pub fn parse_membership_page(format: SourceFormat, body: &str) -> ConversionResult<MembershipPage> {
    match format {
        SourceFormat::Xml => {
            let root = XmlElement::parse(body)?;
            Ok(MembershipPage {
                members: xml_accessions(&root),
                to: summary_number(&root, "To")?,
                total: summary_number(&root, "Total")?,
            })
        }
        SourceFormat::Json => {
            let document: Value = serde_json::from_str(body)?;
            let members = json_accessions(&document, RecordKind::Sample.path_segment());
            if document.get("page").is_none() {
                // Unpaged listing: everything arrived at once
                let count = members.len();
                return Ok(MembershipPage {
                    members,
                    to: count,
                    total: count,
                });
            }
            let number = page_number(&document, "number")?;
            let size = page_number(&document, "size")?;
            let total = page_number(&document, "totalElements")?;
            Ok(MembershipPage {
                members,
                to: ((number + 1) * size).min(total),
                total,
            })
        }
    }
}

fn summary_number(root: &XmlElement, field: &str) -> ConversionResult<usize> {
    let text = root
        .path_text(&["SummaryInfo", field])
        .ok_or_else(|| ConversionError::MissingField {
            field: format!("SummaryInfo/{}", field),
        })?;
    text.parse().map_err(|_| ConversionError::MissingField {
        field: format!("SummaryInfo/{} (not a number: {})", field, text),
    })
}

fn page_number(document: &Value, field: &str) -> ConversionResult<usize> {
    document
        .get("page")
        .and_then(|page| page.get(field))
        .and_then(Value::as_u64)
        .map(|value| value as usize)
        .ok_or_else(|| ConversionError::MissingField {
            field: format!("page.{}", field),
        })
}

fn xml_accessions(root: &XmlElement) -> Vec<AccessionId> {
    XML_ITEM_ELEMENTS
        .iter()
        .flat_map(|name| root.children(*name))
        .filter_map(|item| item.attribute("id"))
        .filter_map(|id| AccessionId::parse(id).ok())
        .collect()
}

fn json_accessions(document: &Value, collection: &str) -> Vec<AccessionId> {
    document
        .get("_embedded")
        .and_then(|embedded| embedded.get(collection))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("accession").and_then(Value::as_str))
        .filter_map(|accession| AccessionId::parse(accession).ok())
        .collect()
}

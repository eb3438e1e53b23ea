//! Minimal element tree over quick-xml events
//!
//! Legacy documents are small and addressed by element paths
//! (`Property/QualifiedValue/Value`), so the whole document is materialized once and then
//! queried. Namespace prefixes are dropped; only local names are kept.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{ConversionError, ConversionResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    /// Parse a document and return its root element
    pub fn parse(xml: &str) -> ConversionResult<XmlElement> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    stack.push(Self::from_start(&start)?);
                }
                Ok(Event::Empty(start)) => {
                    let element = Self::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack.pop().ok_or_else(|| {
                        ConversionError::Xml("closing tag without opening tag".to_string())
                    })?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    if let Some(current) = stack.last_mut() {
                        let value = text
                            .unescape()
                            .map_err(|e| ConversionError::Xml(e.to_string()))?;
                        current.text.push_str(&value);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ConversionError::Xml(format!(
                        "error at position {}: {}",
                        reader.error_position(),
                        e
                    )));
                }
            }
        }

        if !stack.is_empty() {
            return Err(ConversionError::Xml(format!(
                "unclosed element <{}>",
                stack.last().map(|e| e.name.as_str()).unwrap_or_default()
            )));
        }
        root.ok_or_else(|| ConversionError::Xml("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart<'_>) -> ConversionResult<XmlElement> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| ConversionError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| ConversionError::Xml(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(XmlElement {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn attach(
        stack: &mut [XmlElement],
        root: &mut Option<XmlElement>,
        element: XmlElement,
    ) -> ConversionResult<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => {
                return Err(ConversionError::Xml(
                    "document has more than one root element".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text content of this element
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Direct children with the given local name
    pub fn children<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Follow a chain of first-matching children
    pub fn path(&self, segments: &[&str]) -> Option<&XmlElement> {
        segments
            .iter()
            .try_fold(self, |element, segment| element.child(segment))
    }

    /// Text at the end of a path, if the path exists
    pub fn path_text(&self, segments: &[&str]) -> Option<String> {
        self.path(segments).map(|element| element.text().to_string())
    }
}

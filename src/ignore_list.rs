use std::collections::HashSet;
use std::path::Path;

use tokio::fs;

use crate::error::Result;
use crate::model::AccessionId;

const BUNDLED_LIST: &str = include_str!("../resources/ignore-list.txt");

/// Accessions excluded from a run before they reach the merger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    entries: HashSet<AccessionId>,
}

impl IgnoreList {
    /// Parse newline-delimited text: `#` starts a comment line, blank lines are skipped
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| AccessionId::parse(line).ok())
            .collect();
        Self { entries }
    }

    /// The list shipped with the binary
    pub fn bundled() -> Self {
        Self::parse(BUNDLED_LIST)
    }

    /// Read a list from disk, falling back to the bundled list when no path is given
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path).await?;
                Ok(Self::parse(&text))
            }
            None => Ok(Self::bundled()),
        }
    }

    pub fn contains(&self, accession: &AccessionId) -> bool {
        self.entries.contains(accession)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<AccessionId> for IgnoreList {
    fn from_iter<I: IntoIterator<Item = AccessionId>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

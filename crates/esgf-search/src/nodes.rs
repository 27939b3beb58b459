//! Static federation node list.

use std::path::Path;

use tracing::debug;

use esgf_core::error::InvalidInputError;
use esgf_core::{NodeUrl, Result};

/// Ordered list of federation index nodes.
///
/// The text form is one node URL per line; blank lines and lines starting
/// with `#` are ignored. Order is preserved and duplicates are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeList {
    nodes: Vec<NodeUrl>,
}

impl NodeList {
    /// Build a list from already validated URLs.
    pub fn new(nodes: impl IntoIterator<Item = NodeUrl>) -> Result<Self> {
        let mut list = Vec::new();
        for node in nodes {
            if !list.contains(&node) {
                list.push(node);
            }
        }
        if list.is_empty() {
            return Err(InvalidInputError::NodeList {
                reason: "no nodes configured".into(),
            }
            .into());
        }
        Ok(Self { nodes: list })
    }

    /// Parse the text form.
    pub fn parse(text: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let node = NodeUrl::new(line).map_err(|err| InvalidInputError::NodeList {
                reason: format!("line {}: {}", index + 1, err),
            })?;
            nodes.push(node);
        }
        Self::new(nodes)
    }

    /// Read and parse a node list file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let list = Self::parse(&text)?;
        debug!(path = %path.display(), nodes = list.len(), "loaded node list");
        Ok(list)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeUrl> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> &NodeUrl {
        &self.nodes[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esgf_core::Error;

    #[test]
    fn parses_in_order_skipping_comments() {
        let list = NodeList::parse(
            "# primary\nhttps://esgf-node.llnl.gov/esg-search\n\n  https://esgf-data.dkrz.de/esg-search/  \n# mirror\nhttps://esgf-node.llnl.gov/esg-search\n",
        )
        .unwrap();
        let urls: Vec<_> = list.iter().map(|n| n.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://esgf-node.llnl.gov/esg-search",
                "https://esgf-data.dkrz.de/esg-search"
            ]
        );
    }

    #[test]
    fn bad_line_reports_line_number() {
        let err = NodeList::parse("https://ok.example\nnot a url\n").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(NodeList::parse("# nothing here\n\n").is_err());
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NodeList::load(dir.path().join("nodes.txt")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.txt");
        std::fs::write(&path, "https://a.example/esg-search\nhttps://b.example/esg-search\n")
            .unwrap();
        let list = NodeList::load(&path).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.first().host(), Some("a.example"));
    }
}

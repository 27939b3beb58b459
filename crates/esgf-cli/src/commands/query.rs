//! Query arguments shared by the search commands.

use anyhow::{Context as _, Result, bail};
use clap::{Args, ValueEnum};

use esgf_core::{Metadata, NodeUrl, RecordType, SearchQuery};

#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Facet constraint, repeatable (e.g. -c project=CMIP6 -c variable=tas)
    #[arg(short = 'c', long = "constraint", value_name = "FACET=VALUE")]
    pub constraints: Vec<String>,

    /// Free-text query
    #[arg(long)]
    pub text: Option<String>,

    /// Kind of record to search for
    #[arg(long = "type", value_enum, default_value_t = RecordKind::Dataset)]
    pub record_type: RecordKind,

    /// Only the latest version of each dataset
    #[arg(long)]
    pub latest: bool,

    /// Only master copies, no replicas
    #[arg(long)]
    pub no_replicas: bool,

    /// Query only the selected node instead of the whole federation
    #[arg(long)]
    pub local: bool,

    /// Skip this many records
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Return at most this many records
    #[arg(long)]
    pub limit: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordKind {
    #[default]
    Dataset,
    File,
    Aggregation,
}

impl From<RecordKind> for RecordType {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Dataset => RecordType::Dataset,
            RecordKind::File => RecordType::File,
            RecordKind::Aggregation => RecordType::Aggregation,
        }
    }
}

impl QueryArgs {
    pub fn to_query(&self, node: NodeUrl) -> Result<SearchQuery> {
        let mut builder = SearchQuery::builder(node)
            .record_type(self.record_type.into())
            .distrib(!self.local)
            .offset(self.offset);

        for constraint in &self.constraints {
            let (facet, value) = parse_constraint(constraint)?;
            builder = builder.constraint(facet, value);
        }
        if let Some(text) = &self.text {
            builder = builder.text(text);
        }
        if self.latest {
            builder = builder.latest(true);
        }
        if self.no_replicas {
            builder = builder.replica(false);
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        Ok(builder.build())
    }
}

fn parse_constraint(s: &str) -> Result<(Metadata, &str)> {
    let Some((facet, value)) = s.split_once('=') else {
        bail!("Constraint '{}' is not FACET=VALUE", s);
    };
    let facet: Metadata = facet
        .trim()
        .parse()
        .with_context(|| format!("Unknown facet '{}'", facet.trim()))?;
    Ok((facet, value.trim()))
}

/// Parse facet names given on the command line.
pub fn parse_facets(names: &[String]) -> Result<Vec<Metadata>> {
    names
        .iter()
        .map(|name| {
            name.parse::<Metadata>()
                .with_context(|| format!("Unknown facet '{}'", name))
        })
        .collect()
}

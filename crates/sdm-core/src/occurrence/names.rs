//! Scientific-name → taxon-key resolution against a backbone taxonomy.
//!
//! The pipeline needs exactly one taxon. Several exact candidates are an input
//! error for a human to resolve, never something to pick from silently.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// How the backbone matched a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Higherrank,
    None,
    #[serde(other)]
    Other,
}

/// One candidate taxon returned by the name service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonCandidate {
    pub usage_key: Option<u64>,
    pub scientific_name: Option<String>,
    pub canonical_name: Option<String>,
    pub rank: Option<String>,
    pub status: Option<String>,
    pub kingdom: Option<String>,
    pub confidence: Option<u32>,
    pub match_type: MatchType,
}

/// Name-match response: the primary match plus alternatives (verbose mode).
#[derive(Debug, Clone, Deserialize)]
pub struct NameMatch {
    #[serde(flatten)]
    pub primary: TaxonCandidate,
    #[serde(default)]
    pub alternatives: Vec<TaxonCandidate>,
}

/// A service that matches free-text names to taxon candidates.
pub trait NameResolver {
    fn match_name(&self, name: &str) -> Result<NameMatch>;
}

/// Pick the single taxon a name refers to.
///
/// - no candidate with a key, or only higher-rank matches → `TaxonNotFound`
/// - more than one distinct exact candidate → `AmbiguousName`
/// - one exact candidate → that candidate
/// - no exact candidate but a fuzzy primary → the primary, with a warning
pub fn disambiguate(name: &str, m: NameMatch) -> Result<TaxonCandidate> {
    let mut exact: Vec<TaxonCandidate> = Vec::new();
    for c in std::iter::once(&m.primary).chain(m.alternatives.iter()) {
        if c.match_type == MatchType::Exact
            && c.usage_key.is_some()
            && !exact.iter().any(|e| e.usage_key == c.usage_key)
        {
            exact.push(c.clone());
        }
    }

    match exact.len() {
        1 => Ok(exact.remove(0)),
        0 => match m.primary.match_type {
            MatchType::Fuzzy if m.primary.usage_key.is_some() => {
                warn!(
                    name,
                    matched = m.primary.scientific_name.as_deref().unwrap_or("?"),
                    "accepting fuzzy name match"
                );
                Ok(m.primary)
            }
            _ => Err(Error::TaxonNotFound(name.to_string())),
        },
        _ => Err(Error::AmbiguousName { name: name.to_string(), candidates: exact }),
    }
}

/// Resolve a name through `resolver` and return its taxon key.
pub fn resolve_taxon_key(resolver: &dyn NameResolver, name: &str) -> Result<u64> {
    let m = resolver.match_name(name)?;
    let chosen = disambiguate(name, m)?;
    chosen.usage_key.ok_or_else(|| Error::TaxonNotFound(name.to_string()))
}

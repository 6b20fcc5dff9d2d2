//! Blocking client for the GBIF v1 web API.
//!
//! Name matching: `GET /species/match?name=..&verbose=true`
//! Occurrence search: `GET /occurrence/search?taxonKey=..&hasCoordinate=true`,
//! paged by `offset`/`limit` (at most 300 rows per page).

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::names::{NameMatch, NameResolver};
use super::{OccurrenceQuery, OccurrenceSource, RawOccurrence};
use crate::error::{Error, Result};

/// GBIF caps a single search page at 300 rows.
pub const MAX_PAGE_SIZE: usize = 300;

/// Connection settings for the occurrence and name services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub page_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gbif.org/v1".into(),
            user_agent: concat!("sdm-prep/", env!("CARGO_PKG_VERSION")).into(),
            timeout_secs: 60,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

/// One page of `/occurrence/search`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub end_of_records: bool,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub results: Vec<RawOccurrence>,
}

/// Pull pages until `max_records` rows are collected, the service reports the
/// end of records, or a page comes back empty.
///
/// `fetch_page(offset, limit)` performs one request.
pub fn collect_pages<F>(
    max_records: usize,
    page_size: usize,
    mut fetch_page: F,
) -> Result<Vec<RawOccurrence>>
where
    F: FnMut(usize, usize) -> Result<SearchPage>,
{
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut out: Vec<RawOccurrence> = Vec::new();
    while out.len() < max_records {
        let offset = out.len();
        let limit = page_size.min(max_records - offset);
        let page = fetch_page(offset, limit)?;
        let n = page.results.len();
        debug!(offset, limit, returned = n, total = ?page.count, "occurrence page");
        out.extend(page.results.into_iter().take(limit));
        if page.end_of_records || n == 0 {
            break;
        }
    }
    Ok(out)
}

/// GBIF API client implementing both service traits.
pub struct GbifClient {
    http: reqwest::blocking::Client,
    config: ServiceConfig,
}

impl GbifClient {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let resp = self.http.get(&url).query(query).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Service { status: status.as_u16(), url: resp.url().to_string() });
        }
        Ok(resp.json::<T>()?)
    }
}

impl NameResolver for GbifClient {
    fn match_name(&self, name: &str) -> Result<NameMatch> {
        self.get_json("species/match", &[("name", name.to_string()), ("verbose", "true".into())])
    }
}

impl OccurrenceSource for GbifClient {
    fn search(&self, query: &OccurrenceQuery) -> Result<Vec<RawOccurrence>> {
        let mut params: Vec<(&str, String)> = vec![
            ("taxonKey", query.taxon_key.to_string()),
            ("hasCoordinate", "true".into()),
        ];
        for b in &query.basis_of_record {
            params.push(("basisOfRecord", b.as_str().to_string()));
        }
        if let Some(c) = &query.country {
            params.push(("country", c.to_ascii_uppercase()));
        }

        collect_pages(query.max_records, self.config.page_size, |offset, limit| {
            let mut p = params.clone();
            p.push(("offset", offset.to_string()));
            p.push(("limit", limit.to_string()));
            self.get_json("occurrence/search", &p)
        })
    }
}


use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;
use url::Url;

use crate::catalog::ToolDetail;
use crate::config::RegistryConfig;
use crate::{Result, ToolsyError};

const USER_AGENT: &str = "toolsybio/0.1.0 (bio.tools harvester)";

/// One page of the registry listing endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub list: Option<Vec<ToolSummary>>,
}

impl ListingPage {
    /// Whether the registry advertises another page
    #[inline]
    pub fn has_next(&self) -> bool {
        self.next.as_deref().is_some_and(|next| !next.is_empty())
    }

    #[inline]
    pub fn entries(&self) -> &[ToolSummary] {
        self.list.as_deref().unwrap_or_default()
    }
}

/// Summary entry of a listing page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolSummary {
    #[serde(rename = "biotoolsID", default)]
    pub biotools_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ToolSummary {
    /// Registry identifier, if the entry carries a usable one
    #[inline]
    pub fn identifier(&self) -> Option<&str> {
        self.biotools_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawToolDetail {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    function: Option<Vec<RawFunction>>,
    #[serde(default)]
    topic: Option<Vec<RawTerm>>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    documentation: Option<Vec<RawDocumentation>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFunction {
    #[serde(default)]
    operation: Option<Vec<RawTerm>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTerm {
    #[serde(default)]
    term: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDocumentation {
    #[serde(default)]
    url: Option<String>,
}

fn distinct_terms<'a>(terms: impl Iterator<Item = &'a RawTerm>) -> Vec<String> {
    terms
        .filter_map(|t| t.term.as_deref())
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl From<RawToolDetail> for ToolDetail {
    fn from(raw: RawToolDetail) -> Self {
        let operations = distinct_terms(
            raw.function
                .iter()
                .flatten()
                .flat_map(|f| f.operation.iter().flatten()),
        );
        let topics = distinct_terms(raw.topic.iter().flatten());
        let documentation = raw
            .documentation
            .as_ref()
            .and_then(|docs| docs.first())
            .and_then(|doc| doc.url.clone());

        Self {
            name: raw.name,
            description: raw.description,
            operations,
            topics,
            homepage: raw.homepage,
            documentation,
        }
    }
}

/// Blocking HTTP client for the registry listing and detail endpoints
#[derive(Debug, Clone)]
pub struct RegistryClient {
    agent: Agent,
    base_url: Url,
    query: String,
    sort: String,
    order: String,
}

impl RegistryClient {
    #[inline]
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| ToolsyError::Config(format!("Invalid registry URL {}: {}", base, e)))?;

        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(USER_AGENT)
            .build()
            .into();

        Ok(Self {
            agent,
            base_url,
            query: config.query.clone(),
            sort: config.sort.clone(),
            order: config.order.clone(),
        })
    }

    /// URL of one listing page
    #[inline]
    pub fn listing_url(&self, page: u32) -> Result<Url> {
        let mut url = self
            .base_url
            .join("api/t")
            .map_err(|e| ToolsyError::Config(format!("Invalid listing URL: {}", e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            pairs.append_pair("page", &page.to_string());
            if !self.query.is_empty() {
                pairs.append_pair("q", &self.query);
            }
            pairs.append_pair("sort", &self.sort);
            pairs.append_pair("ord", &self.order);
        }
        Ok(url)
    }

    /// URL of a tool's detail record, also used as the record's provenance
    #[inline]
    pub fn detail_url(&self, id: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join("api/t/")
            .map_err(|e| ToolsyError::Config(format!("Invalid detail URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|()| ToolsyError::Config("Registry URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(id);
        url.query_pairs_mut().append_pair("format", "json");
        Ok(url)
    }

    /// Fetch one listing page
    #[inline]
    pub fn fetch_page(&self, page: u32) -> Result<ListingPage> {
        let url = self.listing_url(page)?;
        let body = self.get(&url)?;
        serde_json::from_str(&body).map_err(|e| {
            ToolsyError::Decode(format!("Failed to decode listing page {}: {}", page, e))
        })
    }

    /// Fetch and decode the detail record of one tool
    #[inline]
    pub fn fetch_detail(&self, id: &str) -> Result<(ToolDetail, Url)> {
        let url = self.detail_url(id)?;
        let body = self.get(&url)?;
        let raw: RawToolDetail = serde_json::from_str(&body)
            .map_err(|e| ToolsyError::Decode(format!("Failed to decode details for {}: {}", id, e)))?;
        Ok((raw.into(), url))
    }

    /// Single-attempt GET returning the response body
    fn get(&self, url: &Url) -> Result<String> {
        debug!("Making HTTP GET request to: {}", url);

        match self.agent.get(url.as_str()).call() {
            Ok(mut response) => {
                let text = response.body_mut().read_to_string().map_err(|e| {
                    ToolsyError::Transport(format!(
                        "Failed to read response body from {}: {}",
                        url, e
                    ))
                })?;
                debug!("Read {} bytes from {}", text.len(), url);
                Ok(text)
            }
            Err(ureq::Error::StatusCode(status)) => Err(ToolsyError::Transport(format!(
                "HTTP error {} from {}",
                status, url
            ))),
            Err(e) => Err(ToolsyError::Transport(format!(
                "Failed to make HTTP request to {}: {}",
                url, e
            ))),
        }
    }
}

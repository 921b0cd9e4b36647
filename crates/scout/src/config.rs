// ABOUTME: Portal configuration: portal id to base search URL, query parameter names and render mode.
// ABOUTME: Builds search URLs from keywords/location and detects a portal from a URL's host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ScrapeError;
use crate::options::RenderMode;
use crate::strategy::Portal;

fn default_keyword_param() -> String {
    "q".to_string()
}

fn default_location_param() -> String {
    "l".to_string()
}

/// How to reach one portal's search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalConfig {
    pub base_url: String,
    #[serde(default = "default_keyword_param")]
    pub keyword_param: String,
    #[serde(default = "default_location_param")]
    pub location_param: String,
    /// Render result pages in a headless browser.
    #[serde(default)]
    pub dynamic: bool,
}

impl PortalConfig {
    pub fn new(
        base_url: impl Into<String>,
        keyword_param: impl Into<String>,
        location_param: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            keyword_param: keyword_param.into(),
            location_param: location_param.into(),
            dynamic: false,
        }
    }

    pub fn render_mode(&self) -> RenderMode {
        if self.dynamic {
            RenderMode::Dynamic
        } else {
            RenderMode::Static
        }
    }

    fn host(&self) -> Option<String> {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(strip_www))
    }
}

fn strip_www(host: &str) -> String {
    host.trim_start_matches("www.").to_ascii_lowercase()
}

fn encode_param(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.trim().as_bytes()).collect()
}

/// Portal id → search configuration. Serialized as a JSON object keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortalsConfig {
    portals: BTreeMap<String, PortalConfig>,
}

impl Default for PortalsConfig {
    fn default() -> Self {
        let mut portals = BTreeMap::new();
        portals.insert(
            "linkedin".to_string(),
            PortalConfig::new("https://www.linkedin.com/jobs/search", "keywords", "location"),
        );
        portals.insert(
            "indeed".to_string(),
            PortalConfig::new("https://www.indeed.com/jobs", "q", "l"),
        );
        Self { portals }
    }
}

impl PortalsConfig {
    /// An empty mapping.
    pub fn empty() -> Self {
        Self {
            portals: BTreeMap::new(),
        }
    }

    /// Parses a JSON object of portal entries and layers it over the built-in ones.
    pub fn from_json(json: &str) -> Result<Self, ScrapeError> {
        let user: BTreeMap<String, PortalConfig> = serde_json::from_str(json).map_err(|e| {
            ScrapeError::configuration("", "load portals", Some(anyhow::Error::new(e)))
        })?;
        let mut config = Self::default();
        for (id, portal) in user {
            config.insert(&id, portal);
        }
        Ok(config)
    }

    pub fn insert(&mut self, id: &str, portal: PortalConfig) {
        self.portals.insert(id.trim().to_ascii_lowercase(), portal);
    }

    pub fn get(&self, portal: &Portal) -> Option<&PortalConfig> {
        self.portals.get(portal.id())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.portals.keys().map(String::as_str)
    }

    /// Builds the search-results URL for a portal, e.g.
    /// `https://www.indeed.com/jobs?q=rust+developer&l=Berlin`.
    ///
    /// Spaces become `+`; an empty location is left out. Portals without a
    /// configured base URL (the generic one included) need an explicit URL.
    pub fn search_url(
        &self,
        portal: &Portal,
        keywords: &str,
        location: &str,
    ) -> Result<String, ScrapeError> {
        let config = self.get(portal).ok_or_else(|| {
            ScrapeError::configuration(
                "",
                "build search url",
                Some(anyhow::anyhow!("no search URL configured for portal '{}'", portal)),
            )
        })?;

        let mut params = Vec::new();
        if !keywords.trim().is_empty() {
            params.push(format!("{}={}", config.keyword_param, encode_param(keywords)));
        }
        if !location.trim().is_empty() {
            params.push(format!("{}={}", config.location_param, encode_param(location)));
        }
        if params.is_empty() {
            return Ok(config.base_url.clone());
        }
        let separator = if config.base_url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", config.base_url, separator, params.join("&")))
    }

    /// Infers the portal from a URL's host; unmatched hosts are generic.
    pub fn detect(&self, url: &Url) -> Portal {
        let Some(host) = url.host_str().map(strip_www) else {
            return Portal::Generic;
        };
        for (id, config) in &self.portals {
            if let Some(portal_host) = config.host() {
                if host == portal_host || host.ends_with(&format!(".{}", portal_host)) {
                    return Portal::from_id(id);
                }
            }
        }
        Portal::Generic
    }
}

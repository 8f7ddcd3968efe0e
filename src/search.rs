//! Card-image search against external providers.
//!
//! Providers implement [`ImageSearch`] and are tried in a fixed fallback
//! chain: detailed query first, then a simplified query, then the next
//! provider. Every stage is a bounded network call (client-level timeout)
//! with a single retry. "No results" is an empty list, never an error.

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Cap on image URLs returned per search.
const MAX_IMAGES: usize = 9;

/// Per-request bound for provider calls; applied to the shared client.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Card attributes a search query is built from. Reference fields arrive as
/// display names — the client resolves ids before calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardQuery {
    pub player_name: String,
    pub season: String,
    pub card_number: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default)]
    pub insert_name: Option<String>,
    #[serde(default)]
    pub parallel_name: Option<String>,
    #[serde(default)]
    pub is_autograph: bool,
    #[serde(default)]
    pub is_numbered: bool,
    #[serde(default)]
    pub numbered_of: Option<i32>,
}

/// Detailed query: every attribute that narrows the listing.
pub fn build_search_query(card: &CardQuery) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(card.season.clone());
    if let Some(brand) = &card.brand_name {
        parts.push(brand.clone());
    }
    if let Some(series) = &card.series_name {
        parts.push(series.clone());
    }
    parts.push(card.player_name.clone());
    if let Some(insert) = &card.insert_name {
        parts.push(insert.clone());
    }
    // "Base" is the unremarkable default parallel; it only adds noise
    if let Some(parallel) = &card.parallel_name {
        if parallel != "Base" {
            parts.push(parallel.clone());
        }
    }
    parts.push(format!("#{}", card.card_number));
    if card.is_numbered {
        if let Some(of) = card.numbered_of {
            parts.push(format!("/{}", of));
        }
    }
    if card.is_autograph {
        parts.push("Auto".to_string());
    }

    parts.join(" ")
}

/// Simplified query for the second stage: season, brand, series, player,
/// card number.
pub fn build_fallback_query(card: &CardQuery) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(card.season.clone());
    if let Some(brand) = &card.brand_name {
        parts.push(brand.clone());
    }
    if let Some(series) = &card.series_name {
        parts.push(series.clone());
    }
    parts.push(card.player_name.clone());
    parts.push(format!("#{}", card.card_number));

    parts.join(" ")
}

/// Async interface implemented by each search backend.
#[async_trait]
pub trait ImageSearch: Send + Sync {
    fn name(&self) -> &str;

    /// Returns zero or more image URLs. An empty list means "nothing found";
    /// errors are reserved for transport and API failures.
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

// ============================================================================
// eBay Browse API provider
// ============================================================================

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

pub struct EbayProvider {
    client: reqwest::Client,
    app_id: String,
    cert_id: String,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

impl EbayProvider {
    /// Try to load from env. Returns `None` if credentials are missing
    /// (graceful opt-in).
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        let app_id = std::env::var("EBAY_APP_ID").ok()?;
        let cert_id = std::env::var("EBAY_CERT_ID").ok()?;
        Some(Self {
            client,
            app_id,
            cert_id,
            token_cache: Arc::new(Mutex::new(None)),
        })
    }

    /// Sandbox credentials carry "SBX" in the app id.
    fn base_url(&self) -> &'static str {
        if self.app_id.contains("SBX") {
            "https://api.sandbox.ebay.com"
        } else {
            "https://api.ebay.com"
        }
    }

    /// Fetch (or reuse) a client-credentials OAuth token.
    async fn get_token(&self) -> Result<String> {
        let now = unix_now();
        if let Some(cached) = self.token_cache.lock().unwrap().clone() {
            if now < cached.expires_at {
                return Ok(cached.access_token);
            }
        }

        let credentials = BASE64.encode(format!("{}:{}", self.app_id, self.cert_id));
        let resp = self
            .client
            .post(format!("{}/identity/v1/oauth2/token", self.base_url()))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Authorization", format!("Basic {}", credentials))
            .body("grant_type=client_credentials&scope=https://api.ebay.com/oauth/api_scope")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("eBay token request failed: {} - {}", status, text);
        }

        let token: EbayTokenResponse = resp.json().await?;
        // Refresh 5 minutes before the token actually expires
        let expires_at = now + token.expires_in.saturating_sub(300);

        *self.token_cache.lock().unwrap() = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }
}

#[derive(Deserialize)]
struct EbayTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EbaySearchResponse {
    #[serde(default)]
    item_summaries: Vec<EbayItemSummary>,
    #[serde(default)]
    total: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EbayItemSummary {
    image: Option<EbayImage>,
    #[serde(default)]
    additional_images: Vec<EbayImage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EbayImage {
    image_url: Option<String>,
}

#[async_trait]
impl ImageSearch for EbayProvider {
    fn name(&self) -> &str {
        "ebay"
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let token = self.get_token().await?;

        // Narrow marketplace listings to the hobby
        let full_query = format!("{} sports card", query);
        debug!("EbayProvider: searching '{}'", full_query);

        let resp = self
            .client
            .get(format!(
                "{}/buy/browse/v1/item_summary/search",
                self.base_url()
            ))
            .query(&[
                ("q", full_query.as_str()),
                ("limit", "9"),
                ("fieldgroups", "MATCHING_ITEMS"),
            ])
            .bearer_auth(&token)
            .header("X-EBAY-C-MARKETPLACE-ID", "EBAY_US")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("eBay search failed: {} - {}", status, text);
        }

        let data: EbaySearchResponse = resp.json().await?;
        debug!("EbayProvider: {} items found", data.total);

        let mut urls = Vec::new();
        'items: for item in data.item_summaries {
            for image in item.image.into_iter().chain(item.additional_images) {
                if let Some(url) = image.image_url {
                    urls.push(url);
                    if urls.len() >= MAX_IMAGES {
                        break 'items;
                    }
                }
            }
        }

        Ok(urls)
    }
}

// ============================================================================
// Generic image-search proxy provider
// ============================================================================

pub struct OmniSearchProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl OmniSearchProvider {
    /// Try to load from env. Returns `None` if the proxy is not configured.
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        let api_url = std::env::var("IMAGE_SEARCH_API_URL").ok()?;
        let api_key = std::env::var("IMAGE_SEARCH_API_KEY").ok()?;
        Some(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct OmniSearchResponse {
    #[serde(default)]
    results: Vec<OmniSearchResult>,
}

#[derive(Deserialize)]
struct OmniSearchResult {
    url: Option<String>,
}

#[async_trait]
impl ImageSearch for OmniSearchProvider {
    fn name(&self) -> &str {
        "omni_search"
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        debug!("OmniSearchProvider: searching '{}'", query);

        let resp = self
            .client
            .post(format!("{}/omni_search", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "queries": [query],
                "search_type": "image",
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Image search proxy failed: {} - {}", status, text);
        }

        let data: OmniSearchResponse = resp.json().await?;
        Ok(data
            .results
            .into_iter()
            .filter_map(|r| r.url)
            .take(MAX_IMAGES)
            .collect())
    }
}

// ============================================================================
// Fallback chain
// ============================================================================

/// The configured providers, primary first.
pub struct SearchStack {
    providers: Vec<Arc<dyn ImageSearch>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub image_urls: Vec<String>,
    pub debug: SearchDebug,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDebug {
    pub queries_tried: Vec<String>,
    pub provider: Option<String>,
}

impl SearchStack {
    pub fn from_env(client: reqwest::Client) -> Self {
        let mut providers: Vec<Arc<dyn ImageSearch>> = Vec::new();

        if let Some(ebay) = EbayProvider::from_env(client.clone()) {
            info!("Image search: eBay Browse provider configured");
            providers.push(Arc::new(ebay));
        }
        if let Some(omni) = OmniSearchProvider::from_env(client) {
            info!("Image search: omni_search provider configured");
            providers.push(Arc::new(omni));
        }
        if providers.is_empty() {
            warn!("Image search: no providers configured, searches will return nothing");
        }

        Self { providers }
    }

    #[cfg(test)]
    fn from_providers(providers: Vec<Arc<dyn ImageSearch>>) -> Self {
        Self { providers }
    }

    /// Run the fallback chain: per provider, detailed query then simplified
    /// query; stop at the first non-empty result. Each stage gets one retry
    /// on transport failure. Exhausting the chain yields an empty outcome.
    pub async fn search_card_images(&self, card: &CardQuery) -> SearchOutcome {
        let detailed = build_search_query(card);
        let fallback = build_fallback_query(card);

        let mut queries = vec![detailed];
        if fallback != queries[0] {
            queries.push(fallback);
        }

        let mut tried = Vec::new();
        for provider in &self.providers {
            for query in &queries {
                tried.push(format!("{}: {}", provider.name(), query));
                let urls = attempt(provider.as_ref(), query).await;
                if !urls.is_empty() {
                    return SearchOutcome {
                        image_urls: urls,
                        debug: SearchDebug {
                            queries_tried: tried,
                            provider: Some(provider.name().to_string()),
                        },
                    };
                }
            }
        }

        SearchOutcome {
            image_urls: Vec::new(),
            debug: SearchDebug {
                queries_tried: tried,
                provider: None,
            },
        }
    }
}

/// One stage of the chain: a bounded call with a single retry. Errors are
/// logged and degrade to "no results" so the chain can move on.
async fn attempt(provider: &dyn ImageSearch, query: &str) -> Vec<String> {
    for try_num in 1..=2 {
        match provider.search(query).await {
            Ok(urls) => return urls,
            Err(e) => {
                warn!(
                    "Image search via {} failed (try {}/2): {:#}",
                    provider.name(),
                    try_num,
                    e
                );
            }
        }
    }
    Vec::new()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn full_card() -> CardQuery {
        CardQuery {
            player_name: "LeBron James".into(),
            season: "2012-13".into(),
            card_number: "1".into(),
            brand_name: Some("Panini".into()),
            series_name: Some("Prizm".into()),
            insert_name: Some("Silver".into()),
            parallel_name: Some("Gold".into()),
            is_autograph: true,
            is_numbered: true,
            numbered_of: Some(99),
        }
    }

    #[test]
    fn detailed_query_orders_every_attribute() {
        assert_eq!(
            build_search_query(&full_card()),
            "2012-13 Panini Prizm LeBron James Silver Gold #1 /99 Auto"
        );
    }

    #[test]
    fn base_parallel_is_skipped() {
        let mut card = full_card();
        card.parallel_name = Some("Base".into());
        card.is_autograph = false;
        card.is_numbered = false;
        assert_eq!(
            build_search_query(&card),
            "2012-13 Panini Prizm LeBron James Silver #1"
        );
    }

    #[test]
    fn numbered_without_print_run_adds_nothing() {
        let mut card = full_card();
        card.numbered_of = None;
        assert_eq!(
            build_search_query(&card),
            "2012-13 Panini Prizm LeBron James Silver Gold #1 Auto"
        );
    }

    #[test]
    fn fallback_query_is_simplified() {
        assert_eq!(
            build_fallback_query(&full_card()),
            "2012-13 Panini Prizm LeBron James #1"
        );
    }

    struct ScriptedProvider {
        name: &'static str,
        calls: AtomicUsize,
        results: Vec<Result<Vec<String>, String>>,
    }

    #[async_trait]
    impl ImageSearch for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str) -> Result<Vec<String>> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.results.get(i).cloned().unwrap_or(Ok(Vec::new())) {
                Ok(urls) => Ok(urls),
                Err(msg) => Err(anyhow::anyhow!(msg)),
            }
        }
    }

    #[tokio::test]
    async fn chain_falls_through_to_secondary_provider() {
        let primary = Arc::new(ScriptedProvider {
            name: "primary",
            calls: AtomicUsize::new(0),
            results: vec![Ok(vec![]), Ok(vec![])],
        });
        let secondary = Arc::new(ScriptedProvider {
            name: "secondary",
            calls: AtomicUsize::new(0),
            results: vec![Ok(vec!["http://img/1.jpg".into()])],
        });
        let stack = SearchStack::from_providers(vec![primary.clone(), secondary]);

        let outcome = stack.search_card_images(&full_card()).await;

        assert_eq!(outcome.image_urls, vec!["http://img/1.jpg"]);
        assert_eq!(outcome.debug.provider.as_deref(), Some("secondary"));
        // primary tried both the detailed and the simplified query
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stage_retries_once_on_transport_failure() {
        let flaky = Arc::new(ScriptedProvider {
            name: "flaky",
            calls: AtomicUsize::new(0),
            results: vec![
                Err("connection reset".into()),
                Ok(vec!["http://img/2.jpg".into()]),
            ],
        });
        let stack = SearchStack::from_providers(vec![flaky.clone()]);

        let outcome = stack.search_card_images(&full_card()).await;

        assert_eq!(outcome.image_urls, vec!["http://img/2.jpg"]);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_chain_is_empty_not_an_error() {
        let dead = Arc::new(ScriptedProvider {
            name: "dead",
            calls: AtomicUsize::new(0),
            results: vec![
                Err("down".into()),
                Err("down".into()),
                Err("down".into()),
                Err("down".into()),
            ],
        });
        let stack = SearchStack::from_providers(vec![dead]);

        let outcome = stack.search_card_images(&full_card()).await;

        assert!(outcome.image_urls.is_empty());
        assert_eq!(outcome.debug.provider, None);
        assert_eq!(outcome.debug.queries_tried.len(), 2);
    }
}

//! Engagement-data sources and the monetization link probe.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use alfa_core::{EngagementCounters, EngagementItem, LinkHealth, LinkStatus, MonetizationLink};
use alfa_storage::{Credential, FetchError, HttpFetcher};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "alfa-adapters";

pub const PINTEREST_SOURCE_ID: &str = "pinterest";
pub const FIXTURE_SOURCE_ID: &str = "fixture";
pub const ANALYTICS_METRIC_TYPES: &str = "IMPRESSION,SAVE,PIN_CLICK,OUTBOUND_CLICK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchContext {
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// The platform rejected the credential (or none was configured). The operator has to
    /// re-authenticate; retrying will not help.
    #[error("engagement source credential expired or missing")]
    CredentialExpired,
    #[error(transparent)]
    Fetch(FetchError),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<FetchError> for SourceError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Unauthorized { .. } => Self::CredentialExpired,
            other => Self::Fetch(other),
        }
    }
}

#[async_trait]
pub trait EngagementSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_engagement(
        &self,
        http: &HttpFetcher,
        ctx: &FetchContext,
    ) -> Result<Vec<EngagementItem>, SourceError>;
}

/// Start/end dates (inclusive, `YYYY-MM-DD`) of the analytics lookback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsWindow {
    pub start_date: String,
    pub end_date: String,
}

impl AnalyticsWindow {
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Self {
        let start = now - ChronoDuration::days(i64::from(days));
        Self {
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: now.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PinterestSettings {
    pub base_url: String,
    pub credential: Option<Credential>,
    pub lookback_days: u32,
    pub page_size: u32,
    /// Upper bound on pins processed per sweep.
    pub safety_limit: usize,
    /// Pause before each per-pin analytics request.
    pub pin_pacing: Duration,
}

impl Default for PinterestSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.pinterest.com/v5".to_string(),
            credential: None,
            lookback_days: 30,
            page_size: 25,
            safety_limit: 50,
            pin_pacing: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinPage {
    #[serde(default)]
    pub items: Vec<PinSummary>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub board_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryMetrics {
    #[serde(rename = "IMPRESSION", default)]
    pub impression: Option<f64>,
    #[serde(rename = "SAVE", default)]
    pub save: Option<f64>,
    #[serde(rename = "PIN_CLICK", default)]
    pub pin_click: Option<f64>,
    #[serde(rename = "OUTBOUND_CLICK", default)]
    pub outbound_click: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyticsBlock {
    #[serde(default)]
    pub summary_metrics: SummaryMetrics,
}

/// The API nests totals under `all.summary_metrics`; some proxies flatten them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnalyticsResponse {
    Nested { all: AnalyticsBlock },
    Flat(SummaryMetrics),
}

impl AnalyticsResponse {
    pub fn counters(&self) -> EngagementCounters {
        let metrics = match self {
            Self::Nested { all } => &all.summary_metrics,
            Self::Flat(metrics) => metrics,
        };
        EngagementCounters {
            impressions: metric_count(metrics.impression),
            saves: metric_count(metrics.save),
            clicks: metric_count(metrics.pin_click),
            outbound_clicks: metric_count(metrics.outbound_click),
        }
    }
}

fn metric_count(value: Option<f64>) -> u64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v.trunc() as u64,
        _ => 0,
    }
}

pub struct PinterestSource {
    settings: PinterestSettings,
}

impl PinterestSource {
    pub fn new(settings: PinterestSettings) -> Self {
        Self { settings }
    }

    /// Every page that continues the sweep adds at least one pin, so the safety limit also
    /// bounds the page count.
    pub fn max_pages(&self) -> usize {
        self.settings.safety_limit.max(1)
    }

    fn base(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    pub fn pins_url(&self, bookmark: Option<&str>) -> Result<Url, SourceError> {
        let page_size = self.settings.page_size.max(1).to_string();
        let mut params = vec![("page_size", page_size.as_str())];
        if let Some(bookmark) = bookmark {
            params.push(("bookmark", bookmark));
        }
        Url::parse_with_params(&format!("{}/pins", self.base()), &params)
            .map_err(|e| SourceError::Message(format!("building pins url: {e}")))
    }

    pub fn analytics_url(
        &self,
        pin_id: &str,
        window: &AnalyticsWindow,
    ) -> Result<Url, SourceError> {
        Url::parse_with_params(
            &format!("{}/pins/{}/analytics", self.base(), pin_id),
            &[
                ("start_date", window.start_date.as_str()),
                ("end_date", window.end_date.as_str()),
                ("metric_types", ANALYTICS_METRIC_TYPES),
            ],
        )
        .map_err(|e| SourceError::Message(format!("building analytics url: {e}")))
    }

    async fn pin_counters(
        &self,
        http: &HttpFetcher,
        ctx: &FetchContext,
        credential: &Credential,
        pin_id: &str,
        window: &AnalyticsWindow,
    ) -> Result<EngagementCounters, SourceError> {
        let url = self.analytics_url(pin_id, window)?;
        let fetched = http
            .fetch_json::<AnalyticsResponse>(
                ctx.run_id,
                PINTEREST_SOURCE_ID,
                url.as_str(),
                Some(credential),
            )
            .await;
        match fetched {
            Ok(analytics) => Ok(analytics.counters()),
            Err(FetchError::Unauthorized { .. }) => Err(SourceError::CredentialExpired),
            Err(err) => {
                // zero counters for this pin; the sweep continues
                warn!(pin_id, error = %err, "analytics unavailable, recording zero counters");
                Ok(EngagementCounters::default())
            }
        }
    }
}

#[async_trait]
impl EngagementSource for PinterestSource {
    fn source_id(&self) -> &'static str {
        PINTEREST_SOURCE_ID
    }

    async fn fetch_engagement(
        &self,
        http: &HttpFetcher,
        ctx: &FetchContext,
    ) -> Result<Vec<EngagementItem>, SourceError> {
        let credential = self
            .settings
            .credential
            .as_ref()
            .filter(|c| !c.is_empty())
            .ok_or(SourceError::CredentialExpired)?;
        let window = AnalyticsWindow::lookback(ctx.now, self.settings.lookback_days);

        let limit = self.settings.safety_limit;
        let max_pages = self.max_pages();
        let mut items: Vec<EngagementItem> = Vec::new();
        let mut seen_pins = HashSet::new();
        let mut seen_bookmarks = HashSet::new();
        let mut bookmark: Option<String> = None;

        'pages: for page_no in 1..=max_pages {
            if items.len() >= limit {
                break;
            }
            let url = self.pins_url(bookmark.as_deref())?;
            let page: PinPage = http
                .fetch_json(ctx.run_id, PINTEREST_SOURCE_ID, url.as_str(), Some(credential))
                .await?;

            let mut fresh = 0usize;
            for pin in page.items {
                if !seen_pins.insert(pin.id.clone()) {
                    continue;
                }
                if items.len() >= limit {
                    info!(limit, "safety limit reached, stopping sweep");
                    break 'pages;
                }
                fresh += 1;
                if !self.settings.pin_pacing.is_zero() {
                    tokio::time::sleep(self.settings.pin_pacing).await;
                }
                let counters = self.pin_counters(http, ctx, credential, &pin.id, &window).await?;
                items.push(EngagementItem {
                    id: pin.id,
                    title: pin.title.unwrap_or_else(|| "Untitled".to_string()),
                    board_id: pin.board_id.unwrap_or_default(),
                    counters,
                });
            }

            if fresh == 0 {
                debug!(page_no, "page carried no new pins, stopping sweep");
                break;
            }
            match page.bookmark.filter(|b| !b.is_empty()) {
                Some(next) if seen_bookmarks.insert(next.clone()) => bookmark = Some(next),
                Some(next) => {
                    warn!(bookmark = %next, page_no, "bookmark repeated, stopping sweep");
                    break;
                }
                None => break,
            }
            if page_no == max_pages {
                warn!(max_pages, "page cap reached, stopping sweep");
            }
        }

        info!(pins = items.len(), "pinterest sweep complete");
        Ok(items)
    }
}

/// Reads a JSON array of engagement items from disk. Used for offline cycles and tests.
pub struct FixtureSource {
    path: PathBuf,
}

impl FixtureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EngagementSource for FixtureSource {
    fn source_id(&self) -> &'static str {
        FIXTURE_SOURCE_ID
    }

    async fn fetch_engagement(
        &self,
        _http: &HttpFetcher,
        _ctx: &FetchContext,
    ) -> Result<Vec<EngagementItem>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let items = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(items)
    }
}

#[derive(Debug, Clone)]
pub enum SourceSettings {
    Pinterest(PinterestSettings),
    Fixture { path: PathBuf },
}

pub fn source_for(settings: &SourceSettings) -> Box<dyn EngagementSource> {
    match settings {
        SourceSettings::Pinterest(settings) => Box::new(PinterestSource::new(settings.clone())),
        SourceSettings::Fixture { path } => Box::new(FixtureSource::new(path.clone())),
    }
}

/// Public URL of a pin, used when an orphan is claimed into the catalog.
pub fn pinterest_pin_url(pin_id: &str) -> String {
    format!("https://www.pinterest.com/pin/{pin_id}/")
}

pub const LINK_PROBE_SOURCE_ID: &str = "link-probe";

/// Issues a GET against every ACTIVE link's URL and reports which ones answer.
pub async fn probe_links(
    http: &HttpFetcher,
    run_id: Uuid,
    links: &[MonetizationLink],
) -> BTreeMap<String, LinkHealth> {
    let mut probes = BTreeMap::new();
    for link in links.iter().filter(|l| l.status == LinkStatus::Active) {
        if probes.contains_key(&link.url) {
            continue;
        }
        let health = match http.fetch_bytes(run_id, LINK_PROBE_SOURCE_ID, &link.url, None).await {
            Ok(_) => LinkHealth::Healthy,
            Err(err) => {
                warn!(url = %link.url, error = %err, "monetization link probe failed");
                LinkHealth::Broken { status: err.status() }
            }
        };
        probes.insert(link.url.clone(), health);
    }
    probes
}

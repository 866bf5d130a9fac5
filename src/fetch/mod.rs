//! Page retrieval: the tiers a fetch can escalate through and the engine that
//! walks them.
//!
//! | Tier       | Engine                               | Timeout |
//! |------------|--------------------------------------|---------|
//! | `Direct`   | plain HTTP GET                       | 15s     |
//! | `Scripted` | headless WebDriver session, per page | 15s     |
//! | `Browser`  | visible WebDriver session, per page  | 60s     |
//! | `Session`  | one persistent WebDriver session     | 60s     |

pub mod cache;
pub mod detect;
pub mod direct;
pub mod escalate;
pub mod webdriver;

use std::{fmt, future::Future, time::Duration};

use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::Res;

pub use cache::{CachePolicy, PageCache};
pub use direct::DirectClient;
pub use escalate::{Attempt, EntryMode, Escalator, Transition, transition};
pub use webdriver::BrowserDriver;

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One strategy level, ordered cheapest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Direct,
    Scripted,
    Browser,
    Session,
}

impl Tier {
    pub fn timeout(self) -> Duration {
        match self {
            Tier::Direct | Tier::Scripted => Duration::from_secs(15),
            Tier::Browser | Tier::Session => Duration::from_secs(60),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Direct => "direct HTTP",
            Tier::Scripted => "script-rendered",
            Tier::Browser => "full browser",
            Tier::Session => "persistent browser session",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Typed reason a single tier failed to produce a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Timeout { tier: Tier, connect: bool },
    Http { tier: Tier, status: u16 },
    Unavailable { tier: Tier, reason: String },
    Malformed { tier: Tier, reason: String },
}

impl FetchFailure {
    pub fn tier(&self) -> Tier {
        match self {
            FetchFailure::Timeout { tier, .. }
            | FetchFailure::Http { tier, .. }
            | FetchFailure::Unavailable { tier, .. }
            | FetchFailure::Malformed { tier, .. } => *tier,
        }
    }

    /// Only timeouts justify trying a more expensive tier after a direct fetch.
    pub fn escalates(&self) -> bool {
        matches!(self, FetchFailure::Timeout { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchFailure::Timeout { .. })
    }

    pub(crate) fn from_reqwest(tier: Tier, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchFailure::Timeout {
                tier,
                connect: err.is_connect(),
            }
        } else if let Some(status) = err.status() {
            FetchFailure::Http {
                tier,
                status: status.as_u16(),
            }
        } else if err.is_decode() || err.is_body() {
            FetchFailure::Malformed {
                tier,
                reason: err.to_string(),
            }
        } else {
            FetchFailure::Unavailable {
                tier,
                reason: err.to_string(),
            }
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Timeout { tier, connect: true } => {
                write!(f, "{} fetch timed out while connecting", tier)
            }
            FetchFailure::Timeout { tier, connect: false } => {
                write!(f, "{} fetch timed out after {:?}", tier, tier.timeout())
            }
            FetchFailure::Http { tier, status } => {
                write!(f, "{} fetch got HTTP status {}", tier, status)
            }
            FetchFailure::Unavailable { tier, reason } => {
                write!(f, "{} fetch unavailable: {}", tier, reason)
            }
            FetchFailure::Malformed { tier, reason } => {
                write!(f, "{} fetch returned a malformed response: {}", tier, reason)
            }
        }
    }
}

impl std::error::Error for FetchFailure {}

/// A successfully retrieved page and the link sources its engine produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub tier: Tier,
    pub html: String,
    pub response_time: Duration,
    pub last_modified: Option<String>,
    /// URL-looking strings returned by rendered-DOM scripts.
    pub script_links: Vec<String>,
    /// Link list supplied by the engine itself (HTTP `Link` headers, `document.links`).
    pub native_links: Vec<String>,
    /// JSON-LD parsed from the live DOM, when a browser rendered the page.
    pub rendered_json_ld: Option<Vec<Value>>,
    pub cached: bool,
}

impl Fetched {
    pub fn new(tier: Tier, html: impl Into<String>, response_time: Duration) -> Self {
        Fetched {
            tier,
            html: html.into(),
            response_time,
            last_modified: None,
            script_links: Vec::new(),
            native_links: Vec::new(),
            rendered_json_ld: None,
            cached: false,
        }
    }
}

/// The per-tier engines the escalation state machine drives.
///
/// Each call enforces its tier's own timeout and releases any per-page browser
/// resource before it returns.
pub trait TierFetcher: Send + Sync {
    fn fetch(&self, tier: Tier, url: &Url) -> impl Future<Output = Result<Fetched, FetchFailure>> + Send;

    /// Cheap GET used to sniff single-page-app markers before the crawl.
    fn sniff(&self, _url: &Url) -> impl Future<Output = Option<String>> + Send {
        async { None }
    }

    /// Starts the run-level browser session used by [`Tier::Session`].
    fn open_session(&self) -> impl Future<Output = Result<(), FetchFailure>> + Send {
        async {
            Err(FetchFailure::Unavailable {
                tier: Tier::Session,
                reason: String::from("no browser session support"),
            })
        }
    }

    /// Releases the run-level session, if any. Safe to call more than once.
    fn release(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Production engines: reqwest for the direct tier, thirtyfour for the others.
pub struct StandardFetcher {
    direct: DirectClient,
    webdriver: Option<BrowserDriver>,
}

impl StandardFetcher {
    pub fn new(proxy: Option<&str>, webdriver_endpoint: Option<&str>) -> Res<Self> {
        let webdriver = match webdriver_endpoint {
            Some(endpoint) => Some(BrowserDriver::new(endpoint, proxy)?),
            None => None,
        };

        Ok(StandardFetcher {
            direct: DirectClient::new(proxy)?,
            webdriver,
        })
    }

    fn no_browser(tier: Tier) -> FetchFailure {
        FetchFailure::Unavailable {
            tier,
            reason: String::from("no WebDriver endpoint configured"),
        }
    }
}

impl TierFetcher for StandardFetcher {
    async fn fetch(&self, tier: Tier, url: &Url) -> Result<Fetched, FetchFailure> {
        match (tier, &self.webdriver) {
            (Tier::Direct, _) => self.direct.get(url).await,
            (Tier::Scripted, Some(driver)) => driver.render_once(url, Tier::Scripted).await,
            (Tier::Browser, Some(driver)) => driver.render_once(url, Tier::Browser).await,
            (Tier::Session, Some(driver)) => driver.render_in_session(url).await,
            (tier, None) => Err(Self::no_browser(tier)),
        }
    }

    async fn sniff(&self, url: &Url) -> Option<String> {
        self.direct.sniff(url).await.ok()
    }

    async fn open_session(&self) -> Result<(), FetchFailure> {
        match &self.webdriver {
            Some(driver) => driver.open_session().await,
            None => Err(Self::no_browser(Tier::Session)),
        }
    }

    async fn release(&self) {
        if let Some(driver) = &self.webdriver {
            driver.close_session().await;
        }
    }
}

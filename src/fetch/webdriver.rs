//! Browser-backed tiers driven through `thirtyfour`.
//!
//! Per-page tiers start a fresh session and always quit it before returning.
//! The persistent tier shares one session for the whole run; it is created by
//! [`BrowserDriver::open_session`] and torn down exactly once by
//! [`BrowserDriver::close_session`].
//!
//! Session start-up counts against the tier budget. A session that comes up
//! after the budget ran out is still quit in the background.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use thirtyfour::{
    ChromeCapabilities, error::WebDriverErrorInner, extensions::cdp::ChromeDevTools, prelude::*,
};
use tokio::{
    sync::Mutex,
    time::{Instant, sleep, timeout, timeout_at},
};
use url::Url;

use crate::{
    error::{Res, ResExt},
    fetch::{FetchFailure, Fetched, Tier, USER_AGENT},
    jsonld::parse_block,
};

const SCRIPTED_SETTLE: Duration = Duration::from_millis(500);
const BROWSER_SETTLE: Duration = Duration::from_secs(3);
const SESSION_SETTLE: Duration = Duration::from_secs(2);
const SCROLL_PAUSE: Duration = Duration::from_secs(1);
const READY_WAIT: Duration = Duration::from_secs(10);
const READY_POLL: Duration = Duration::from_millis(250);
const QUIT_TIMEOUT: Duration = Duration::from_secs(10);

const EXTRACT_SCRIPT: &str = r#"
const anchors = Array.from(document.querySelectorAll('a[href], [data-href]'))
  .map(el => el.href || el.getAttribute('data-href'))
  .filter(href => typeof href === 'string' && href.length > 0);
const native = Array.from(document.links).map(link => link.href);
const jsonld = Array.from(document.querySelectorAll('script[type*="ld+json" i]'))
  .map(script => script.textContent || '');
return { anchors, native, jsonld };
"#;

const READY_SCRIPT: &str = r#"
return !!document.body && document.querySelectorAll('script[type*="ld+json" i]').length > 0;
"#;

const CONSENT_SCRIPT: &str = r#"
const words = ['accept', 'agree', 'allow', 'accepter', 'akzeptieren', 'aceptar', 'ok'];
const candidates = document.querySelectorAll('button, a, [role="button"], input[type="button"], input[type="submit"]');
for (const el of candidates) {
  const text = (el.innerText || el.value || '').trim().toLowerCase();
  if (text.length > 0 && text.length < 40 && words.some(w => text.includes(w))) {
    el.click();
    return true;
  }
}
return false;
"#;

const SCROLL_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight); return true;";
const SCROLL_TOP_SCRIPT: &str = "window.scrollTo(0, 0); return true;";

/// What a rendered page hands back besides its markup.
struct Rendered {
    html: String,
    anchors: Vec<String>,
    native: Vec<String>,
    json_ld: Vec<Value>,
}

impl Rendered {
    fn into_fetched(self, tier: Tier, elapsed: Duration) -> Fetched {
        Fetched {
            script_links: self.anchors,
            native_links: self.native,
            rendered_json_ld: Some(self.json_ld),
            ..Fetched::new(tier, self.html, elapsed)
        }
    }
}

/// Proxy as the browser sees it: the server goes on the command line, the
/// credentials travel as a `Proxy-Authorization` header set over CDP.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BrowserProxy {
    server: String,
    authorization: Option<String>,
}

impl BrowserProxy {
    fn parse(raw: &str) -> Self {
        let Ok(mut url) = Url::parse(raw) else {
            return BrowserProxy {
                server: raw.to_owned(),
                authorization: None,
            };
        };

        let authorization = (!url.username().is_empty()).then(|| {
            let credentials = format!("{}:{}", url.username(), url.password().unwrap_or_default());
            format!("Basic {}", STANDARD.encode(credentials))
        });

        // Both setters only fail for URLs that cannot carry credentials.
        let _ = url.set_username("");
        let _ = url.set_password(None);

        BrowserProxy {
            server: url.as_str().trim_end_matches('/').to_owned(),
            authorization,
        }
    }
}

fn chrome_args(headless: bool, proxy: Option<&BrowserProxy>) -> Vec<String> {
    let mut args = vec![
        String::from("--no-sandbox"),
        String::from("--disable-dev-shm-usage"),
        String::from("--disable-gpu"),
        format!("--user-agent={}", USER_AGENT),
    ];
    if headless {
        args.insert(0, String::from("--headless=new"));
    }
    if let Some(proxy) = proxy {
        args.push(format!("--proxy-server={}", proxy.server));
    }

    args
}

fn driver_failure(tier: Tier, err: WebDriverError) -> FetchFailure {
    match &*err {
        WebDriverErrorInner::Timeout(_) => FetchFailure::Timeout {
            tier,
            connect: false,
        },
        _ => FetchFailure::Unavailable {
            tier,
            reason: err.to_string(),
        },
    }
}

async fn quit(driver: WebDriver) {
    // Best effort; the driver reaps abandoned sessions on its own.
    let _ = timeout(QUIT_TIMEOUT, driver.quit()).await;
}

async fn authorize_proxy(driver: &WebDriver, authorization: &str) -> WebDriverResult<()> {
    let dev_tools = ChromeDevTools::new(driver.handle.clone());
    dev_tools.execute_cdp("Network.enable").await?;
    dev_tools
        .execute_cdp_with_params(
            "Network.setExtraHTTPHeaders",
            json!({ "headers": { "Proxy-Authorization": authorization } }),
        )
        .await?;

    Ok(())
}

async fn launch(
    endpoint: String,
    caps: ChromeCapabilities,
    authorization: Option<String>,
    tier: Tier,
) -> Result<WebDriver, FetchFailure> {
    let driver = match WebDriver::new(&endpoint, caps).await {
        Ok(driver) => driver,
        Err(err) => return Err(driver_failure(tier, err)),
    };

    if let Some(authorization) = authorization
        && let Err(err) = authorize_proxy(&driver, &authorization).await
    {
        quit(driver).await;
        return Err(driver_failure(tier, err));
    }

    Ok(driver)
}

pub struct BrowserDriver {
    endpoint: String,
    proxy: Option<BrowserProxy>,
    session: Mutex<Option<WebDriver>>,
}

impl BrowserDriver {
    pub fn new(endpoint: &str, proxy: Option<&str>) -> Res<Self> {
        Url::parse(endpoint).with_context(format_args!("Invalid WebDriver endpoint: {}", endpoint))?;

        Ok(BrowserDriver {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            proxy: proxy.map(BrowserProxy::parse),
            session: Mutex::new(None),
        })
    }

    /// Renders a page in a throwaway session.
    ///
    /// `Tier::Scripted` runs headless; `Tier::Browser` runs a visible window
    /// and waits a fixed settle delay before reading the DOM. Start-up,
    /// navigation and extraction share the tier's single budget.
    pub async fn render_once(&self, url: &Url, tier: Tier) -> Result<Fetched, FetchFailure> {
        let start = Instant::now();
        let deadline = start + tier.timeout();
        let settle = if tier == Tier::Browser {
            BROWSER_SETTLE
        } else {
            SCRIPTED_SETTLE
        };

        let driver = self.start(tier, tier != Tier::Browser, tier.timeout()).await?;

        let outcome = timeout_at(deadline, async {
            driver
                .goto(url.as_str())
                .await
                .map_err(|err| driver_failure(tier, err))?;
            sleep(settle).await;
            extract(&driver, tier).await
        })
        .await
        .unwrap_or(Err(FetchFailure::Timeout {
            tier,
            connect: false,
        }));

        quit(driver).await;

        outcome.map(|page| page.into_fetched(tier, start.elapsed()))
    }

    pub async fn open_session(&self) -> Result<(), FetchFailure> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.start(Tier::Session, false, Tier::Session.timeout()).await?);
        }
        Ok(())
    }

    /// Thorough render inside the run-level session.
    pub async fn render_in_session(&self, url: &Url) -> Result<Fetched, FetchFailure> {
        let tier = Tier::Session;
        let start = Instant::now();
        let guard = self.session.lock().await;

        let Some(driver) = guard.as_ref() else {
            return Err(FetchFailure::Unavailable {
                tier,
                reason: String::from("browser session is not open"),
            });
        };

        let page = timeout(tier.timeout(), async {
            driver
                .goto(url.as_str())
                .await
                .map_err(|err| driver_failure(tier, err))?;
            wait_until_ready(driver).await;
            sleep(SESSION_SETTLE).await;
            dismiss_consent(driver).await;
            scroll(driver).await;
            extract(driver, tier).await
        })
        .await
        .unwrap_or(Err(FetchFailure::Timeout {
            tier,
            connect: false,
        }))?;

        Ok(page.into_fetched(tier, start.elapsed()))
    }

    /// Quits the run-level session; later calls are no-ops.
    pub async fn close_session(&self) {
        let session = self.session.lock().await.take();
        if let Some(driver) = session {
            quit(driver).await;
        }
    }

    fn capabilities(&self, headless: bool, tier: Tier) -> Result<ChromeCapabilities, FetchFailure> {
        let mut caps = DesiredCapabilities::chrome();
        caps.accept_insecure_certs(true)
            .map_err(|err| driver_failure(tier, err))?;

        for arg in chrome_args(headless, self.proxy.as_ref()) {
            caps.add_arg(&arg).map_err(|err| driver_failure(tier, err))?;
        }

        Ok(caps)
    }

    /// Starts a session within `budget`.
    ///
    /// The launch runs as its own task so that, when the budget runs out first,
    /// a session created late is still quit instead of leaking in the driver.
    async fn start(&self, tier: Tier, headless: bool, budget: Duration) -> Result<WebDriver, FetchFailure> {
        let caps = self.capabilities(headless, tier)?;
        let authorization = self.proxy.as_ref().and_then(|proxy| proxy.authorization.clone());

        let mut launching = tokio::spawn(launch(self.endpoint.clone(), caps, authorization, tier));

        match timeout(budget, &mut launching).await {
            Ok(Ok(launched)) => launched,
            Ok(Err(err)) => Err(FetchFailure::Unavailable {
                tier,
                reason: err.to_string(),
            }),
            Err(_) => {
                tokio::spawn(async move {
                    if let Ok(Ok(driver)) = launching.await {
                        quit(driver).await;
                    }
                });

                Err(FetchFailure::Timeout { tier, connect: true })
            }
        }
    }
}

async fn run_script(driver: &WebDriver, script: &str, tier: Tier) -> Result<Value, FetchFailure> {
    let ret = driver
        .execute(script, Vec::new())
        .await
        .map_err(|err| driver_failure(tier, err))?;

    Ok(ret.json().clone())
}

async fn extract(driver: &WebDriver, tier: Tier) -> Result<Rendered, FetchFailure> {
    let found = run_script(driver, EXTRACT_SCRIPT, tier).await?;
    let html = driver.source().await.map_err(|err| driver_failure(tier, err))?;

    Ok(Rendered {
        html,
        anchors: strings(&found["anchors"]),
        native: strings(&found["native"]),
        json_ld: strings(&found["jsonld"])
            .iter()
            .filter_map(|body| parse_block(body))
            .collect(),
    })
}

/// Polls for a body and a JSON-LD script; gives up quietly after the bound.
async fn wait_until_ready(driver: &WebDriver) {
    let deadline = Instant::now() + READY_WAIT;

    while Instant::now() < deadline {
        if let Ok(Value::Bool(true)) = run_script(driver, READY_SCRIPT, Tier::Session).await {
            return;
        }
        sleep(READY_POLL).await;
    }
}

async fn dismiss_consent(driver: &WebDriver) {
    if let Ok(Value::Bool(true)) = run_script(driver, CONSENT_SCRIPT, Tier::Session).await {
        sleep(SCROLL_PAUSE).await;
    }
}

async fn scroll(driver: &WebDriver) {
    if run_script(driver, SCROLL_BOTTOM_SCRIPT, Tier::Session).await.is_ok() {
        sleep(SCROLL_PAUSE).await;
        let _ = run_script(driver, SCROLL_TOP_SCRIPT, Tier::Session).await;
        sleep(SCROLL_PAUSE).await;
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

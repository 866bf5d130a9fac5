use std::time::{Duration, Instant};

use owo_colors::OwoColorize;
use reqwest::{
    Client, Proxy,
    header::{HeaderMap, LAST_MODIFIED, LINK},
};
use url::Url;

use crate::{
    error::{Res, ResExt},
    fetch::{FetchFailure, Fetched, Tier, USER_AGENT},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SNIFF_TIMEOUT: Duration = Duration::from_secs(5);

/// Tier 0: a plain HTTP GET.
pub struct DirectClient {
    client: Client,
}

impl DirectClient {
    pub fn new(proxy: Option<&str>) -> Res<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Tier::Direct.timeout())
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy).with_context(format_args!(
                "Failed to configure proxy: {}",
                proxy.bright_blue().italic()
            ))?);
        }

        Ok(DirectClient {
            client: builder.build().context("Failed to build HTTP client")?,
        })
    }

    pub async fn get(&self, url: &Url) -> Result<Fetched, FetchFailure> {
        let start = Instant::now();

        let res = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| FetchFailure::from_reqwest(Tier::Direct, &err))?;

        let stat = res.status();
        if !stat.is_success() {
            return Err(FetchFailure::Http {
                tier: Tier::Direct,
                status: stat.as_u16(),
            });
        }

        let last_modified = res
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let native_links = link_header_targets(res.headers());

        let html = res
            .text()
            .await
            .map_err(|err| FetchFailure::from_reqwest(Tier::Direct, &err))?;

        Ok(Fetched {
            last_modified,
            native_links,
            ..Fetched::new(Tier::Direct, html, start.elapsed())
        })
    }

    /// Short GET whose body is only inspected for single-page-app markers.
    pub async fn sniff(&self, url: &Url) -> Res<String> {
        let res = self
            .client
            .get(url.as_str())
            .timeout(SNIFF_TIMEOUT)
            .send()
            .await
            .with_context(format_args!(
                "Failed to sniff URL: {}",
                url.as_str().bright_blue().italic()
            ))?;

        res.text().await.with_context(format_args!(
            "Failed to read sniffed body from URL: {}",
            url.as_str().bright_blue().italic()
        ))
    }
}

/// Targets of `Link: <url>; rel=...` response headers.
fn link_header_targets(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|entry| {
            let entry = entry.trim();
            let start = entry.find('<')?;
            let end = entry[start..].find('>')? + start;
            Some(entry[start + 1..end].trim().to_owned())
        })
        .filter(|target| !target.is_empty())
        .collect()
}

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use ldcrawl::{
    BrowserMode, CrawlTarget, Crawler, FetchFailure, Fetched, Logger, Tier, TierFetcher,
    error::{Res, ResExt},
    normalize,
};
use url::Url;

/// In-process site: every path answers per tier from a table.
#[derive(Default)]
struct MockSite {
    routes: HashMap<String, HashMap<Tier, Result<String, FetchFailure>>>,
    calls: Mutex<Vec<(String, Tier)>>,
    panics_on: Option<String>,
}

impl MockSite {
    fn page(mut self, path: &str, html: impl Into<String>) -> Self {
        self.routes
            .entry(path.to_owned())
            .or_default()
            .insert(Tier::Direct, Ok(html.into()));
        self
    }

    fn tier(mut self, path: &str, tier: Tier, outcome: Result<&str, FetchFailure>) -> Self {
        self.routes
            .entry(path.to_owned())
            .or_default()
            .insert(tier, outcome.map(str::to_owned));
        self
    }

    fn panicking(mut self, path: &str) -> Self {
        self.panics_on = Some(path.to_owned());
        self
    }

    fn calls_for(&self, path: &str) -> Vec<Tier> {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(p, _)| p == path)
                    .map(|(_, tier)| *tier)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl TierFetcher for MockSite {
    async fn fetch(&self, tier: Tier, url: &Url) -> Result<Fetched, FetchFailure> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((url.path().to_owned(), tier));
        }
        if self.panics_on.as_deref() == Some(url.path()) {
            panic!("fetch blew up on {}", url);
        }

        match self.routes.get(url.path()).and_then(|tiers| tiers.get(&tier)) {
            Some(Ok(html)) => Ok(Fetched::new(tier, html.as_str(), Duration::from_millis(12))),
            Some(Err(failure)) => Err(failure.clone()),
            None => Err(FetchFailure::Http { tier, status: 404 }),
        }
    }
}

fn timeout(tier: Tier) -> FetchFailure {
    FetchFailure::Timeout {
        tier,
        connect: false,
    }
}

fn target(seed: &str, max_pages: usize, concurrency: usize) -> Res<CrawlTarget> {
    CrawlTarget::builder()
        .seed(seed)
        .max_pages(max_pages)
        .concurrency(concurrency)
        .browser_mode(BrowserMode::Escalate)
        .build()
}

#[tokio::test]
async fn identical_json_ld_blocks_collapse() -> Res<()> {
    let site = MockSite::default().page(
        "/",
        r#"<html><head>
<script type="application/ld+json">{"@type": "Organization", "name": "Acme"}</script>
<script type="application/ld+json">{"@type": "Organization", "name": "Acme"}</script>
</head><body><h1>Acme</h1></body></html>"#,
    );

    let (pages, _) = Crawler::with_fetcher(target("https://example.com/", 1, 1)?, site, Logger::silent())
        .run()
        .await?;

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].json_ld.len(), 1);
    assert!(pages[0].has_structured_data);
    assert!(!pages[0].used_fallback_extraction);

    Ok(())
}

#[tokio::test]
async fn not_found_is_terminal() -> Res<()> {
    let site = MockSite::default();
    let crawler = Crawler::with_fetcher(target("https://example.com/", 5, 1)?, site, Logger::silent());

    let (pages, summary) = crawler.run().await?;

    assert!(pages.is_empty());
    assert_eq!(summary.stats.errors, 1);
    assert_eq!(summary.stats.pages_skipped, 1);
    assert_eq!(summary.stats.scripted.attempts, 0);
    assert_eq!(summary.stats.browser.attempts, 0);

    Ok(())
}

#[tokio::test]
async fn timeouts_escalate_to_the_browser() -> Res<()> {
    let site = MockSite::default()
        .tier("/", Tier::Direct, Err(timeout(Tier::Direct)))
        .tier("/", Tier::Scripted, Err(timeout(Tier::Scripted)))
        .tier("/", Tier::Browser, Ok("<html><body><h1>Rendered at last</h1></body></html>"));

    let (pages, summary) = Crawler::with_fetcher(target("https://example.com/", 1, 1)?, site, Logger::silent())
        .run()
        .await?;

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].h1, "Rendered at last");
    assert_eq!(summary.stats.direct.timeouts, 1);
    assert_eq!(summary.stats.scripted.timeouts, 1);
    assert_eq!(summary.stats.browser.successes, 1);
    assert_eq!(summary.stats.errors, 0);

    Ok(())
}

#[tokio::test]
async fn direct_success_never_touches_browser_tiers() -> Res<()> {
    let site = MockSite::default()
        .page("/", r#"<a href="/one">1</a><a href="/two">2</a>"#)
        .page("/one", "<p>one</p>")
        .page("/two", "<p>two</p>");

    let (pages, summary) = Crawler::with_fetcher(target("https://example.com/", 10, 1)?, site, Logger::silent())
        .run()
        .await?;

    assert_eq!(pages.len(), 3);
    assert_eq!(summary.stats.direct.successes, 3);
    assert_eq!(summary.stats.scripted.attempts, 0);
    assert_eq!(summary.stats.browser.attempts, 0);

    Ok(())
}

#[tokio::test]
async fn mutual_links_terminate() -> Res<()> {
    let site = MockSite::default()
        .page("/a", r#"<a href="/b">B</a>"#)
        .page("/b", r#"<a href="/a">A</a>"#);

    let (pages, summary) = Crawler::with_fetcher(target("https://example.com/a", 5, 1)?, site, Logger::silent())
        .run()
        .await?;

    assert_eq!(pages.len(), 2);
    assert_eq!(summary.stats.links_duplicate, 1);

    Ok(())
}

#[tokio::test]
async fn concurrent_batches_never_revisit() -> Res<()> {
    let mut site = MockSite::default();
    for i in 0..30 {
        let next: String = (0..30)
            .filter(|j| *j != i)
            .map(|j| format!(r#"<a href="/p{}">{}</a>"#, j, j))
            .collect();
        site = site.page(&format!("/p{}", i), format!("<html><body>{}</body></html>", next));
    }

    let crawler = Crawler::with_fetcher(target("https://example.com/p0", 100, 6)?, site, Logger::silent());
    let (pages, summary) = crawler.run().await?;

    let unique: HashSet<String> = pages.iter().map(|page| normalize(&page.url)).collect();
    assert_eq!(unique.len(), pages.len());
    assert_eq!(pages.len(), 30);
    assert_eq!(summary.stats.pages_crawled, 30);
    assert!(pages.iter().all(|page| page.extended.is_some()));

    Ok(())
}

#[tokio::test]
async fn fallback_is_exclusive_with_real_structured_data() -> Res<()> {
    let site = MockSite::default()
        .page(
            "/",
            r#"<html><head><script type="application/ld+json">{"@type": "WebSite"}</script></head>
<body><a href="/plain">Plain</a></body></html>"#,
        )
        .page(
            "/plain",
            "<html><body><h1>Plain page</h1><h2>Part</h2><ul><li>x</li></ul></body></html>",
        );

    let (pages, _) = Crawler::with_fetcher(target("https://example.com/", 5, 1)?, site, Logger::silent())
        .run()
        .await?;

    assert_eq!(pages.len(), 2);
    for page in &pages {
        if page.has_structured_data {
            assert!(!page.used_fallback_extraction);
        } else {
            assert!(page.used_fallback_extraction);
            assert_eq!(page.json_ld.len(), 1);
            assert_eq!(page.json_ld[0]["@type"], "WebPage");
        }
    }
    assert!(!pages[1].has_structured_data);

    Ok(())
}

#[tokio::test]
async fn queue_cap_discards_overflow() -> Res<()> {
    let anchors: String = (0..6000)
        .map(|i| format!(r#"<a href="/item-{}">i</a>"#, i))
        .collect();
    let site = MockSite::default().page("/", format!("<html><body>{}</body></html>", anchors));

    let (_, summary) = Crawler::with_fetcher(target("https://example.com/", 1, 1)?, site, Logger::silent())
        .run()
        .await?;

    assert_eq!(summary.stats.links_discovered, 6000);
    assert_eq!(summary.stats.queue_full_blocks, 1000);

    Ok(())
}

#[tokio::test]
async fn skipped_pages_reach_the_log_callback() -> Res<()> {
    let site = MockSite::default().page("/", r#"<a href="/gone">gone</a>"#);
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let logger = Logger::silent().with_callback(Arc::new(move |line: &str| {
        if let Ok(mut lines) = sink.lock() {
            lines.push(line.to_owned());
        }
    }));

    let crawler = Crawler::with_fetcher(target("https://example.com/", 5, 1)?, site, logger);
    let (pages, summary) = crawler.run().await?;

    assert_eq!(pages.len(), 1);
    assert_eq!(summary.stats.errors, 1);

    let lines = lines
        .lock()
        .map(|lines| lines.clone())
        .map_err(|err| err.to_string())
        .context("Failed to read captured log lines")?;
    assert!(
        lines
            .iter()
            .any(|line| line.contains("https://example.com/gone") && line.contains("404"))
    );

    Ok(())
}

#[tokio::test]
async fn persistent_session_skips_escalation() -> Res<()> {
    struct SessionSite(MockSite);

    impl TierFetcher for SessionSite {
        async fn fetch(&self, tier: Tier, url: &Url) -> Result<Fetched, FetchFailure> {
            self.0.fetch(tier, url).await
        }

        async fn open_session(&self) -> Result<(), FetchFailure> {
            Ok(())
        }
    }

    let site = SessionSite(MockSite::default().tier(
        "/",
        Tier::Session,
        Ok(r#"<script type="application/ld+json">{"@type": "Product"}</script>"#),
    ));
    let target = CrawlTarget::builder()
        .seed("https://example.com/")
        .browser_mode(BrowserMode::Persistent)
        .build()?;

    let crawler = Crawler::with_fetcher(target, site, Logger::silent());
    let (pages, summary) = crawler.run().await?;

    assert_eq!(pages.len(), 1);
    assert!(pages[0].has_structured_data);
    assert_eq!(summary.stats.session.successes, 1);
    assert_eq!(summary.stats.direct.attempts, 0);

    Ok(())
}

#[tokio::test]
async fn exhausted_escalation_tries_each_tier_once() -> Res<()> {
    let site = Arc::new(
        MockSite::default()
            .tier("/", Tier::Direct, Err(timeout(Tier::Direct)))
            .tier(
                "/",
                Tier::Scripted,
                Err(FetchFailure::Unavailable {
                    tier: Tier::Scripted,
                    reason: String::from("no driver"),
                }),
            )
            .tier("/", Tier::Browser, Err(timeout(Tier::Browser))),
    );

    struct Shared(Arc<MockSite>);

    impl TierFetcher for Shared {
        async fn fetch(&self, tier: Tier, url: &Url) -> Result<Fetched, FetchFailure> {
            self.0.fetch(tier, url).await
        }
    }

    let crawler = Crawler::with_fetcher(
        target("https://example.com/", 1, 1)?,
        Shared(Arc::clone(&site)),
        Logger::silent(),
    );
    let (pages, summary) = crawler.run().await?;

    assert!(pages.is_empty());
    assert_eq!(summary.stats.errors, 1);
    assert_eq!(site.calls_for("/"), vec![Tier::Direct, Tier::Scripted, Tier::Browser]);

    Ok(())
}

#[tokio::test]
async fn batch_failures_stay_isolated() -> Res<()> {
    let site = MockSite::default()
        .page(
            "/",
            r#"<a href="/a">A</a><a href="/b">B</a><a href="/gone">Gone</a><a href="/boom">Boom</a>"#,
        )
        .page("/a", "<h1>Page A</h1>")
        .page("/b", "<h1>Page B</h1>")
        .panicking("/boom");
    let crawler = Crawler::with_fetcher(target("https://example.com/", 10, 4)?, site, Logger::silent());

    let (pages, summary) = crawler.run().await?;

    let urls: HashSet<&str> = pages.iter().map(|page| page.url.as_str()).collect();
    assert_eq!(
        urls,
        HashSet::from([
            "https://example.com/",
            "https://example.com/a",
            "https://example.com/b",
        ])
    );
    assert_eq!(summary.stats.pages_crawled, 3);
    assert_eq!(summary.stats.errors, 2);
    assert_eq!(summary.stats.pages_skipped, 2);
    assert_eq!(summary.total_urls, 3);

    Ok(())
}

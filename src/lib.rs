/*!
**A breadth-first site crawler that reconciles JSON-LD structured data**

## Usage

- Basic Crawling:
```sh
ldcrawl -o output.ndjson https://example.com
```

- With Logging:
```sh
ldcrawl -o output.ndjson -l crawler.log https://example.com
```

- Verbose Mode (Log Every Fetch):
```sh
ldcrawl -o output.ndjson -v https://example.com
```

- Parallel Batches, Sibling Domain and Page Limit:
```sh
ldcrawl -o output.ndjson -c 8 -m 200 --sibling shop.example.com https://example.com
```

- Browser Tiers Through a WebDriver:
```sh
ldcrawl -o output.ndjson --webdriver http://localhost:9515 --browser persistent https://example.com
```

---

## Library

```rust,no_run
use ldcrawl::{CrawlTarget, Crawler, Logger};

# async fn demo() -> ldcrawl::error::Res<()> {
let target = CrawlTarget::builder()
    .seed("https://example.com/")
    .max_pages(50)
    .build()?;

let (pages, summary) = Crawler::new(target, Logger::silent())?.run().await?;
println!("{} pages, {} groups", pages.len(), summary.pattern_count);
# Ok(())
# }
```

---

## How It Works

1. Frontier:
- Seeds are normalized (no query, no fragment, lowercase path, no trailing slash)
- Every normalized URL is queued at most once; the queue holds at most 5000 URLs
- Pages are crawled breadth-first until the queue is empty or `max_pages` is reached

2. Fetch Escalation:
- Direct HTTP first (15s)
- Only a timeout escalates: headless browser (15s), then a visible browser (60s)
- Any other HTTP error skips the page
- Known single-page apps can use one persistent browser session instead

3. Extraction:
- Links from anchors, `data-href`, page Markdown, rendered-DOM scripts and `Link` headers
- JSON-LD from the parsed DOM, the raw markup and the rendered DOM, deduplicated by canonical JSON
- A synthesized `WebPage` block when a page has no JSON-LD

4. Concurrency:
- `-c N` drains batches of `N` URLs and fetches them in parallel
- Discovered links are merged only after the whole batch is joined

---

## Logging

#### Log Levels:

- **INFO** (verbose mode only): Fetches, strategy changes
- **WARN** (always): Skipped pages, fallbacks
- **FATAL** (always): Invalid configuration, unwritable output

*/

pub mod crawler;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod frontier;
pub mod harvest;
pub mod jsonld;
pub mod markdown;
pub mod normalize;
pub mod output;
pub mod page;
pub mod patterns;

pub use crawler::{
    BrowserMode, CrawlStats, CrawlSummary, CrawlTarget, CrawlTargetBuilder, Crawler,
    ProgressCallback, TierStats,
};
pub use error::{LogCallback, Logger};
pub use fetch::{CachePolicy, FetchFailure, Fetched, StandardFetcher, Tier, TierFetcher};
pub use normalize::{NormalizedUrl, normalize};
pub use output::NdjsonWriter;
pub use page::PageRecord;

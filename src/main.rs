use clap::Parser;
use owo_colors::OwoColorize;

use ldcrawl::{
    CachePolicy, CrawlTarget, Crawler, Logger, NdjsonWriter,
    error::{Log, Res, ResExt, WARN},
};

mod cli;

async fn run() -> Res<()> {
    let args = cli::Args::parse();

    let mut builder = CrawlTarget::builder()
        .seeds(args.seeds.iter().cloned())
        .max_pages(args.max_pages)
        .concurrency(args.concurrency)
        .browser_mode(args.browser)
        .politeness_delay(200, 500);

    for sibling in &args.siblings {
        builder = builder.sibling(sibling.as_str());
    }
    if let Some(proxy) = &args.proxy {
        builder = builder.proxy(proxy.as_str());
    }
    if let Some(endpoint) = &args.webdriver {
        builder = builder.webdriver(endpoint.as_str());
    }
    if let Some(dir) = &args.cache_dir {
        builder = builder.cache(CachePolicy::ReadWrite(dir.clone()));
    }

    let target = builder.build()?;

    let logger = match &args.log_file {
        Some(path) => Logger::file(path).await,
        None => Logger::stdout(),
    }
    .verbose(args.verbose);

    let writer = NdjsonWriter::create(&args.output, args.include_content).await?;

    let crawler = Crawler::new(target, logger)?;
    let (pages, summary) = crawler.run().await?;

    for page in &pages {
        writer.write_record(page).await.log(crawler.logger(), WARN).await?;
    }
    writer.flush().await?;

    let line = serde_json::to_string(&summary).context("Failed to serialize crawl summary")?;
    eprintln!("{}", line);

    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run().await {
        Ok(_) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "FATAL:".red().bold(), e);
            std::process::ExitCode::FAILURE
        }
    }
}

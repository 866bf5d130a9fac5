use std::{path::Path, sync::Arc};

use owo_colors::{OwoColorize, colors::css::MediumPurple};
use resext::resext;
use strip_ansi_escapes::strip_str;
use time::macros::format_description;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, Stdout, stdout},
    sync::Mutex,
};

#[resext(
    delimiter = " -> ",
    source_prefix = "Cause: ",
    include_variant = true,
    alloc = true
)]
pub enum CrawlError {
    IoError(std::io::Error),
    NetworkError(reqwest::Error),
    UrlParseError(url::ParseError),
    ScrapeError(scraper::error::SelectorErrorKind<'static>),
    JsonError(serde_json::Error),
    ConcurrentTaskError(tokio::task::JoinError),
    Custom(String),
}

unsafe impl Send for CrawlError {}
unsafe impl Sync for CrawlError {}
unsafe impl Send for ResErr {}
unsafe impl Sync for ResErr {}

/// Line-oriented log callback supplied by an embedding host.
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub const INFO: &str = "[INFO]";
pub const WARN: &str = "[WARN]";
pub const FATAL: &str = "[FATAL]";

enum Sink {
    Stdout(Mutex<Stdout>),
    File(Mutex<File>),
    Silent,
}

/// Timestamped logger threaded through a crawl.
///
/// `[INFO]` records only reach the sink in verbose mode; every record is
/// forwarded (ANSI-stripped, without timestamp) to the callback when one is set.
pub struct Logger {
    sink: Sink,
    callback: Option<LogCallback>,
    verbose: bool,
}

impl Logger {
    pub fn stdout() -> Self {
        Logger {
            sink: Sink::Stdout(Mutex::new(stdout())),
            callback: None,
            verbose: false,
        }
    }

    pub fn silent() -> Self {
        Logger {
            sink: Sink::Silent,
            callback: None,
            verbose: false,
        }
    }

    /// Opens (and truncates) a log file, falling back to stdout if it cannot be opened.
    pub async fn file(path: &Path) -> Self {
        let res = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .await;

        match res {
            Ok(file) => Logger {
                sink: Sink::File(Mutex::new(file)),
                callback: None,
                verbose: false,
            },
            Err(err) => {
                println!(
                    "{} Failed to open log file: {}\nCause: {}",
                    WARN.fg::<MediumPurple>(),
                    path.to_string_lossy().red().bold(),
                    err
                );

                Logger::stdout()
            }
        }
    }

    pub fn with_callback(mut self, callback: LogCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub async fn info(&self, message: impl Into<String>) -> Res<()> {
        self.write(INFO, &message.into()).await
    }

    pub async fn warn(&self, message: impl Into<String>) -> Res<()> {
        self.write(WARN, &message.into()).await
    }

    pub async fn write(&self, level: &'static str, message: &str) -> Res<()> {
        if let Some(callback) = &self.callback {
            callback(&strip_str(message));
        }

        if level == INFO && !self.verbose {
            return Ok(());
        }

        match &self.sink {
            Sink::Silent => Ok(()),

            Sink::File(mutex_wtr) => {
                let timestamp = timestamp()?;
                let mut wtr = mutex_wtr.lock().await;

                let log = format!("{} {}:\n{}\n\n", timestamp, level, strip_str(message));

                wtr.write_all(log.as_bytes())
                    .await
                    .with_context(format_args!("Failed to write log at: {}", timestamp))
            }

            Sink::Stdout(mutex_stdout) => {
                let timestamp = timestamp()?;
                let mut stdout = mutex_stdout.lock().await;

                let log = format!(
                    "{} {}:\n{}\n\n",
                    timestamp.yellow(),
                    level.fg::<MediumPurple>(),
                    message
                );

                stdout
                    .write_all(log.as_bytes())
                    .await
                    .with_context(format_args!("Failed to write log at: {}", timestamp))
            }
        }
    }
}

pub const LOG_TIMESTAMP_FORMAT: &[time::format_description::BorrowedFormatItem] = format_description!(
    "[year]-[month padding:zero]-[day padding:zero] [hour]:[minute]:[second].[subsecond digits:3]"
);

fn timestamp() -> Res<String> {
    time::OffsetDateTime::now_utc()
        .to_offset(time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC))
        .format(&LOG_TIMESTAMP_FORMAT)
        .map_err(|_| String::from("Format Failure"))
        .context("Failed to format timestamp for log")
}

pub trait Log<T> {
    async fn log(self, logger: &Logger, level: &'static str) -> Res<Option<T>>;
}

impl<T> Log<T> for Res<T> {
    async fn log(self, logger: &Logger, level: &'static str) -> Res<Option<T>> {
        match self {
            Ok(ok) => Ok(Some(ok)),
            Err(err) => {
                let message = err.to_string();
                logger.write(level, &message).await?;

                Ok(None)
            }
        }
    }
}

impl Log<()> for String {
    async fn log(self, logger: &Logger, level: &'static str) -> Res<Option<()>> {
        logger.write(level, &self).await?;

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::error::{INFO, Log, Logger, Res, ResExt, WARN, timestamp};

    #[tokio::test]
    async fn test_callback_receives_every_level() -> Res<()> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);

        let logger = Logger::silent().with_callback(Arc::new(move |line: &str| {
            if let Ok(mut lines) = sink.lock() {
                lines.push(line.to_owned());
            }
        }));

        logger.write(INFO, "fetched page").await?;
        String::from("\u{1b}[31mbroken link\u{1b}[0m")
            .log(&logger, WARN)
            .await?;

        let lines = lines.lock().map_err(|_| String::from("poisoned")).context("Failed to lock lines")?;
        assert_eq!(lines.as_slice(), ["fetched page", "broken link"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_log_swallows_error() -> Res<()> {
        let logger = Logger::silent();

        let failed: Res<u8> = Err(String::from("boom")).context("Failed on purpose");
        assert_eq!(failed.log(&logger, WARN).await?, None);

        let ok: Res<u8> = Ok(7);
        assert_eq!(ok.log(&logger, WARN).await?, Some(7));

        Ok(())
    }

    #[test]
    fn test_timestamp_shape() -> Res<()> {
        let stamp = timestamp()?;
        let bytes = stamp.as_bytes();

        assert_eq!(stamp.len(), 23);
        assert_eq!(
            [bytes[4], bytes[7], bytes[10], bytes[13], bytes[16], bytes[19]],
            *b"-- ::."
        );
        assert!(stamp.chars().filter(char::is_ascii_digit).count() == 17);

        Ok(())
    }
}

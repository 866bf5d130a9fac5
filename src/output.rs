use std::path::Path;

use owo_colors::OwoColorize;
use serde_json::Value;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::Mutex,
};

use crate::{
    error::{Res, ResErr, ResExt},
    page::PageRecord,
};

/// One JSON object per line, one line per crawled page.
pub struct NdjsonWriter {
    wtr: Mutex<BufWriter<File>>,
    include_content: bool,
}

impl NdjsonWriter {
    /// Creates (truncating) `path`, which must end in `.ndjson`.
    pub async fn create(path: &Path, include_content: bool) -> Res<Self> {
        let ext = path.extension().unwrap_or_default();

        if ext != "ndjson" {
            return Err(ResErr::new(
                "Invalid output file",
                format!(
                    "Output file extension: {}{}{} is not: {}",
                    "[".purple(),
                    ext.to_string_lossy().purple(),
                    "]".purple(),
                    "[ndjson]".purple()
                ),
            ));
        }

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .await
            .with_context(format_args!(
                "Failed to open output file: {}",
                path.to_string_lossy().red().bold()
            ))?;

        Ok(NdjsonWriter {
            wtr: Mutex::new(BufWriter::with_capacity(8 * 1024, file)),
            include_content,
        })
    }

    pub async fn write_record(&self, record: &PageRecord) -> Res<()> {
        let mut value = serde_json::to_value(record).with_context(format_args!(
            "Failed to serialize record for URL: {}",
            record.url.bright_blue().italic()
        ))?;

        if !self.include_content
            && let Some(content) = value.get_mut("html_content")
        {
            *content = Value::String(String::new());
        }

        let mut line = serde_json::to_vec(&value).context("Failed to encode output line")?;
        line.push(b'\n');

        let mut wtr = self.wtr.lock().await;
        wtr.write_all(&line).await.with_context(format_args!(
            "Failed to write output entry for URL: {}",
            record.url.bright_blue().italic()
        ))
    }

    pub async fn flush(&self) -> Res<()> {
        self.wtr
            .lock()
            .await
            .flush()
            .await
            .context("Failed to flush writer into output file")
    }
}

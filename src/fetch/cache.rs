use std::{
    hash::Hasher,
    path::{Path, PathBuf},
};

use fnv::FnvHasher;
use owo_colors::OwoColorize;
use tokio::fs;

use crate::{
    error::{Res, ResExt},
    normalize::NormalizedUrl,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    Bypass,
    /// Read hits from and write successful fetches to this directory.
    ReadWrite(PathBuf),
}

/// On-disk store of page HTML keyed by normalized URL.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: Option<PathBuf>,
}

impl PageCache {
    pub async fn open(policy: &CachePolicy) -> Res<Self> {
        match policy {
            CachePolicy::Bypass => Ok(PageCache { dir: None }),
            CachePolicy::ReadWrite(dir) => {
                fs::create_dir_all(dir).await.with_context(format_args!(
                    "Failed to create cache directory: {}",
                    dir.display().bright_blue().italic()
                ))?;

                Ok(PageCache {
                    dir: Some(dir.clone()),
                })
            }
        }
    }

    pub fn disabled() -> Self {
        PageCache { dir: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    fn path_for(dir: &Path, url: &NormalizedUrl) -> PathBuf {
        dir.join(format!("{:016x}.html", cache_key(url)))
    }

    pub async fn load(&self, url: &NormalizedUrl) -> Option<String> {
        let dir = self.dir.as_ref()?;
        fs::read_to_string(Self::path_for(dir, url)).await.ok()
    }

    pub async fn store(&self, url: &NormalizedUrl, html: &str) -> Res<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let path = Self::path_for(dir, url);
        fs::write(&path, html).await.with_context(format_args!(
            "Failed to write cache entry: {}",
            path.display().bright_blue().italic()
        ))
    }
}

/// 64-bit FNV-1a of the URL bytes; stable across runs and platforms.
fn cache_key(url: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(url.as_bytes());
    hasher.finish()
}

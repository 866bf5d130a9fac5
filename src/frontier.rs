use std::collections::{HashSet, VecDeque};

use crate::normalize::NormalizedUrl;

/// Hard bound on pending URLs.
pub const QUEUE_CAP: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Already visited or already queued.
    Duplicate,
    /// Dropped at the cap; not remembered as visited.
    QueueFull,
}

pub trait UrlRepo {
    fn offer(&mut self, url: NormalizedUrl) -> Enqueue;

    fn pop(&mut self) -> Option<NormalizedUrl>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// FIFO queue of pending URLs plus the set of every URL ever queued.
///
/// Owned by the crawl loop alone; concurrent batches hand their links back
/// and they are offered here only after the batch is joined.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<NormalizedUrl>,
    visited: HashSet<NormalizedUrl>,
}

impl Frontier {
    pub fn new() -> Self {
        Frontier::default()
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    /// Pops up to `n` URLs, oldest first.
    pub fn drain_batch(&mut self, n: usize) -> Vec<NormalizedUrl> {
        let n = n.min(self.queue.len());
        self.queue.drain(..n).collect()
    }
}

impl UrlRepo for Frontier {
    fn offer(&mut self, url: NormalizedUrl) -> Enqueue {
        if url.is_empty() || self.visited.contains(&url) {
            return Enqueue::Duplicate;
        }
        if self.queue.len() >= QUEUE_CAP {
            return Enqueue::QueueFull;
        }

        self.visited.insert(url.clone());
        self.queue.push_back(url);
        Enqueue::Queued
    }

    fn pop(&mut self) -> Option<NormalizedUrl> {
        self.queue.pop_front()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

//! The per-page escalation state machine.
//!
//! ```text
//! Direct   --ok--> Success      --timeout--> Scripted   --other--> Exhausted
//! Scripted --ok--> Success      --any failure--> Browser
//! Browser  --ok--> Success      --any failure--> Exhausted
//! Session  --ok--> Success      --any failure--> Exhausted
//! ```

use std::{sync::Arc, time::Duration};

use url::Url;

use crate::{
    error::Res,
    fetch::{FetchFailure, Fetched, PageCache, Tier, TierFetcher},
    normalize::normalize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Attempt(Tier),
    Success(Tier),
    Exhausted,
}

/// Next state after `tier` ended with `failure` (`None` on success).
pub fn transition(tier: Tier, failure: Option<&FetchFailure>) -> Transition {
    let Some(failure) = failure else {
        return Transition::Success(tier);
    };

    match tier {
        Tier::Direct if failure.escalates() => Transition::Attempt(Tier::Scripted),
        Tier::Scripted => Transition::Attempt(Tier::Browser),
        Tier::Direct | Tier::Browser | Tier::Session => Transition::Exhausted,
    }
}

/// Which state a page fetch starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Escalate,
    Session,
}

impl EntryMode {
    fn first_tier(self) -> Tier {
        match self {
            EntryMode::Escalate => Tier::Direct,
            EntryMode::Session => Tier::Session,
        }
    }
}

/// Outcome of one page fetch plus every tier it went through.
#[derive(Debug)]
pub struct Attempt {
    pub result: Result<Fetched, FetchFailure>,
    /// `(tier, failure)` per state visited; the last entry's failure is `None` on success.
    pub trail: Vec<(Tier, Option<FetchFailure>)>,
}

impl Attempt {
    pub fn final_tier(&self) -> Option<Tier> {
        self.trail.last().map(|(tier, _)| *tier)
    }
}

pub struct Escalator<F> {
    fetcher: Arc<F>,
    cache: PageCache,
}

impl<F> Clone for Escalator<F> {
    fn clone(&self) -> Self {
        Escalator {
            fetcher: Arc::clone(&self.fetcher),
            cache: self.cache.clone(),
        }
    }
}

impl<F: TierFetcher> Escalator<F> {
    pub fn new(fetcher: Arc<F>, cache: PageCache) -> Self {
        Escalator { fetcher, cache }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Runs the state machine for `url`; a cache hit short-circuits it.
    pub async fn fetch(&self, url: &Url, mode: EntryMode) -> Attempt {
        if let Some(html) = self.cache.load(&normalize(url.as_str())).await {
            return Attempt {
                result: Ok(Fetched {
                    cached: true,
                    ..Fetched::new(Tier::Direct, html, Duration::ZERO)
                }),
                trail: Vec::new(),
            };
        }

        let mut tier = mode.first_tier();
        let mut trail = Vec::new();

        loop {
            let outcome = self.fetcher.fetch(tier, url).await;
            let failure = outcome.as_ref().err();

            match transition(tier, failure) {
                Transition::Attempt(next) => {
                    trail.push((tier, failure.cloned()));
                    tier = next;
                }
                Transition::Success(_) | Transition::Exhausted => {
                    trail.push((tier, failure.cloned()));
                    return Attempt {
                        result: outcome,
                        trail,
                    };
                }
            }
        }
    }

    /// Stores a freshly fetched page; cached pages are not rewritten.
    pub async fn remember(&self, url: &Url, fetched: &Fetched) -> Res<()> {
        if fetched.cached {
            return Ok(());
        }
        self.cache.store(&normalize(url.as_str()), &fetched.html).await
    }
}

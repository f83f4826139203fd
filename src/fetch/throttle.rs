//! Request budgets for the two upstreams: the stats API and the reference site.
//!
//! Both sites ban clients that burst, so each client carries a sliding-window budget of at most
//! `requests` starts in any `window`.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info};

use crate::util::env::env_parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    StatsApi,
    Reference,
}

impl Upstream {
    pub fn label(self) -> &'static str {
        match self {
            Upstream::StatsApi => "stats_api",
            Upstream::Reference => "reference",
        }
    }

    fn env_prefix(self) -> &'static str {
        match self {
            Upstream::StatsApi => "NBA_STATS",
            Upstream::Reference => "BBREF",
        }
    }

    /// The reference site asks scrapers for no more than 20 pages a minute.
    fn default_budget(self) -> RequestBudget {
        match self {
            Upstream::StatsApi => RequestBudget::new(60, Duration::from_secs(60)),
            Upstream::Reference => RequestBudget::new(20, Duration::from_secs(60)),
        }
    }
}

/// At most `requests` request starts in any `window`. Zero in either disables the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBudget {
    pub requests: u32,
    pub window: Duration,
}

impl RequestBudget {
    pub fn new(requests: u32, window: Duration) -> Self {
        Self { requests, window }
    }

    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// `<UPSTREAM>_MAX_OPS_PER_WINDOW` and `<UPSTREAM>_WINDOW_SECS`, falling back to the
    /// upstream's default for whichever is unset or unparsable.
    pub fn for_upstream(upstream: Upstream) -> Self {
        Self::from_prefix(upstream.env_prefix(), upstream.default_budget())
    }

    fn from_prefix(prefix: &str, default: RequestBudget) -> Self {
        let requests = env_parse(&format!("{prefix}_MAX_OPS_PER_WINDOW"), default.requests);
        let window_secs = env_parse(&format!("{prefix}_WINDOW_SECS"), default.window.as_secs());
        Self::new(requests, Duration::from_secs(window_secs))
    }

    pub fn is_unlimited(&self) -> bool {
        self.requests == 0 || self.window.is_zero()
    }
}

/// Shared sliding-window log of recent request starts. Clones draw on the same budget.
#[derive(Clone, Debug)]
pub struct RequestThrottle {
    upstream: Upstream,
    budget: RequestBudget,
    started: Arc<Mutex<VecDeque<Instant>>>,
}

impl RequestThrottle {
    pub fn new(upstream: Upstream, budget: RequestBudget) -> Self {
        Self {
            upstream,
            budget,
            started: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn unlimited(upstream: Upstream) -> Self {
        Self::new(upstream, RequestBudget::unlimited())
    }

    /// Budget from the environment, logged once at client construction.
    pub fn from_env(upstream: Upstream) -> Self {
        let budget = RequestBudget::for_upstream(upstream);
        if budget.is_unlimited() {
            info!(
                upstream = upstream.label(),
                "request throttle disabled; requests fire immediately"
            );
        } else {
            info!(
                upstream = upstream.label(),
                requests = budget.requests,
                window_secs = budget.window.as_secs(),
                "request throttle configured"
            );
        }
        Self::new(upstream, budget)
    }

    pub fn budget(&self) -> RequestBudget {
        self.budget
    }

    /// Wait until one more request fits in the window, then claim it.
    pub async fn acquire(&self) {
        if self.budget.is_unlimited() {
            return;
        }
        let capacity = self.budget.requests as usize;
        let mut started = self.started.lock().await;
        loop {
            let now = Instant::now();
            while started
                .front()
                .is_some_and(|first| now.duration_since(*first) >= self.budget.window)
            {
                started.pop_front();
            }
            if started.len() < capacity {
                started.push_back(now);
                return;
            }
            let Some(oldest) = started.front().copied() else {
                continue;
            };
            let resume = oldest + self.budget.window;
            debug!(
                upstream = self.upstream.label(),
                wait_ms = resume.saturating_duration_since(now).as_millis(),
                "request budget spent; waiting"
            );
            // Holding the lock keeps waiters in arrival order.
            sleep_until(resume).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bursts_up_to_the_budget_then_waits_for_the_window() {
        let throttle = RequestThrottle::new(
            Upstream::StatsApi,
            RequestBudget::new(2, Duration::from_millis(200)),
        );
        let start = Instant::now();
        throttle.acquire().await;
        throttle.clone().acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));

        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn unlimited_budget_never_waits() {
        let throttle = RequestThrottle::unlimited(Upstream::Reference);
        let start = Instant::now();
        for _ in 0..50 {
            throttle.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn budget_reads_prefixed_keys_and_keeps_defaults_for_bad_values() {
        std::env::set_var("NBAPEX_THROTTLE_TEST_MAX_OPS_PER_WINDOW", "5");
        std::env::set_var("NBAPEX_THROTTLE_TEST_WINDOW_SECS", "soon");
        let budget = RequestBudget::from_prefix(
            "NBAPEX_THROTTLE_TEST",
            RequestBudget::new(20, Duration::from_secs(60)),
        );
        assert_eq!(budget, RequestBudget::new(5, Duration::from_secs(60)));

        std::env::set_var("NBAPEX_THROTTLE_TEST_WINDOW_SECS", "0");
        let disabled = RequestBudget::from_prefix(
            "NBAPEX_THROTTLE_TEST",
            RequestBudget::new(20, Duration::from_secs(60)),
        );
        assert!(disabled.is_unlimited());
    }

    #[test]
    fn reference_site_defaults_are_stricter() {
        let stats = Upstream::StatsApi.default_budget();
        let reference = Upstream::Reference.default_budget();
        assert_eq!(stats.window, reference.window);
        assert!(reference.requests < stats.requests);
    }
}

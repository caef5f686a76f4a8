//! Engine tuning knobs.

use std::time::Duration;

use crate::search::rank::DEFAULT_MAX_RESULTS;

/// Timing and sizing for the pane controllers and the relevance saver.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Quiet period after an upstream selection change before a dependent
    /// pane rebuilds.
    pub debounce: Duration,
    /// Total time from debounce start until a dependent pane reports
    /// `SearchFinished`. Rebuilds that finish early wait out the remainder.
    pub search_budget: Duration,
    pub max_results: usize,
    pub save_interval: Duration,
    /// Context arena size that triggers compaction.
    pub compact_threshold: usize,
    /// Overrides the built-in cold-start popular list when set.
    pub popular: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            search_budget: Duration::from_millis(300),
            max_results: DEFAULT_MAX_RESULTS,
            save_interval: Duration::from_secs(300),
            compact_threshold: 512,
            popular: None,
        }
    }
}

impl EngineConfig {
    /// Load config from `QUICKLAUNCH_*` environment variables (and `.env`).
    /// Unparseable values keep their defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(val) = dotenvy::var("QUICKLAUNCH_DEBOUNCE_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            cfg.debounce = Duration::from_millis(ms);
        }

        if let Ok(val) = dotenvy::var("QUICKLAUNCH_BUDGET_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            cfg.search_budget = Duration::from_millis(ms);
        }

        if let Ok(val) = dotenvy::var("QUICKLAUNCH_MAX_RESULTS")
            && let Ok(n) = val.parse::<usize>()
            && n > 0
        {
            cfg.max_results = n;
        }

        if let Ok(val) = dotenvy::var("QUICKLAUNCH_SAVE_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            cfg.save_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = dotenvy::var("QUICKLAUNCH_COMPACT_THRESHOLD")
            && let Ok(n) = val.parse::<usize>()
        {
            cfg.compact_threshold = n.max(2);
        }

        if let Ok(val) = dotenvy::var("QUICKLAUNCH_POPULAR") {
            cfg.popular = Some(
                val.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "QUICKLAUNCH_DEBOUNCE_MS",
        "QUICKLAUNCH_BUDGET_MS",
        "QUICKLAUNCH_MAX_RESULTS",
        "QUICKLAUNCH_SAVE_INTERVAL_SECS",
        "QUICKLAUNCH_COMPACT_THRESHOLD",
        "QUICKLAUNCH_POPULAR",
    ];

    fn clear() {
        for var in VARS {
            // SAFETY: tests touching the environment are #[serial].
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn defaults_without_env() {
        clear();
        assert_eq!(EngineConfig::from_env(), EngineConfig::default());
    }

    #[test]
    #[serial]
    fn env_overrides_and_bad_values() {
        clear();
        unsafe {
            std::env::set_var("QUICKLAUNCH_DEBOUNCE_MS", "50");
            std::env::set_var("QUICKLAUNCH_BUDGET_MS", "not-a-number");
            std::env::set_var("QUICKLAUNCH_MAX_RESULTS", "0");
            std::env::set_var("QUICKLAUNCH_POPULAR", "a, b,,c");
        }
        let cfg = EngineConfig::from_env();
        clear();
        assert_eq!(cfg.debounce, Duration::from_millis(50));
        assert_eq!(cfg.search_budget, Duration::from_millis(300));
        assert_eq!(cfg.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(
            cfg.popular,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }
}

//! Harness-level configuration (spec.md §4.8's main-harness specialization).

use clap::Args;

/// Configuration for the process-entry-point [`crate::lifecycle::MainHarness`].
#[derive(Debug, Clone, Args)]
pub struct HarnessConfig {
    /// The name the harness logs under and reports in its lifecycle events.
    #[arg(long, env = "JRS_HARNESS_NAME", default_value = "jrs-connector")]
    pub name: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self { name: "jrs-connector".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_matches_the_binary() {
        assert_eq!(HarnessConfig::default().name, "jrs-connector");
    }
}

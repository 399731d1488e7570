//! Engine configuration.

/// Tunables for the fast/slow path decision.
///
/// Plain data; the driver fills it from CLI flags.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    /// Force every batch onto the slow path (debugging aid).
    pub disable_fast_path: bool,
    /// Batches editing more files than this always take the slow path; a
    /// huge batch would spend more time fingerprinting than a full
    /// reanalysis saves.
    pub max_files_on_fast_path: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            disable_fast_path: false,
            max_files_on_fast_path: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enables_fast_path() {
        let config = EngineConfig::default();
        assert!(!config.disable_fast_path);
        assert!(config.max_files_on_fast_path > 0);
    }
}

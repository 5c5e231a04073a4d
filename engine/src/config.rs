//! Engine tunables.

use serde::{Deserialize, Serialize};
use tidemark_anchor::AnchorConfig;

/// Every knob of the engine with its default, deserializable so hosts can
/// ship overrides as plain JSON. The session owns one of these; the core
/// keeps no process-wide state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Anchor creation/resolution tunables.
    pub anchor: AnchorConfig,
    /// Lowest opacity assigned within an overlap group.
    pub opacity_min: f32,
    /// Opacity of the top highlight in an overlap group.
    pub opacity_max: f32,
    /// Opacity decrease per stacking level.
    pub opacity_step: f32,
    /// How long a freshly rendered highlight keeps its flash class.
    pub flash_duration_ms: u64,
    /// Minimum spacing between two navigation requests.
    pub navigation_debounce_ms: u64,
    /// Coalescing window for queued storage writes.
    pub batch_window_ms: u64,
    /// Queued writes are flushed once this many are pending.
    pub max_batch_size: usize,
    /// Highlights restored per batch before yielding.
    pub restore_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor: AnchorConfig::default(),
            opacity_min: 0.30,
            opacity_max: 0.90,
            opacity_step: 0.15,
            flash_duration_ms: 600,
            navigation_debounce_ms: 100,
            batch_window_ms: 100,
            max_batch_size: 10,
            restore_batch_size: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.anchor.context_length, 50);
        assert_eq!(cfg.anchor.path_depth_cap, 10);
        assert_eq!(cfg.opacity_max, 0.90);
        assert_eq!(cfg.opacity_step, 0.15);
        assert_eq!(cfg.navigation_debounce_ms, 100);
        assert_eq!(cfg.max_batch_size, 10);
    }

    #[test]
    fn test_partial_json_overrides() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"opacityMax": 0.8, "restoreBatchSize": 25}"#).unwrap();
        assert_eq!(cfg.opacity_max, 0.8);
        assert_eq!(cfg.restore_batch_size, 25);
        assert_eq!(cfg.opacity_min, 0.30);
    }
}

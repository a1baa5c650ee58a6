use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::Display as EnumDisplay;

use crate::geom::direction::{CornerMode, Dir45};

#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, EnumDisplay, Serialize, Deserialize, Hash)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RouterMode {
    // Ignore collisions, highlight them instead.
    MarkObstacles,
    #[default]
    Shove,
    Walkaround,
}

#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, EnumDisplay, Serialize, Deserialize, Hash)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OptimizerEffort {
    Low,
    #[default]
    Medium,
    Full,
}

// Wall-clock budget used inside shove and walkaround loops.
#[derive(Debug, Copy, Clone)]
pub struct TimeLimit {
    budget: Duration,
    started: Instant,
}

impl TimeLimit {
    pub fn new(ms: u64) -> Self {
        Self { budget: Duration::from_millis(ms), started: Instant::now() }
    }

    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() > self.budget
    }
}

// Persistent router settings. Serialized as a named-field blob with these
// exact keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    pub mode: RouterMode,
    pub effort: OptimizerEffort,
    pub remove_loops: bool,
    pub smart_pads: bool,
    pub shove_vias: bool,
    pub suggest_finish: bool,
    pub follow_mouse: bool,
    pub start_diagonal: bool,
    pub shove_iteration_limit: u32,
    pub via_force_prop_iteration_limit: u32,
    #[serde(rename = "shove_time_limit_ms")]
    pub shove_time_limit: u64,
    pub walkaround_iteration_limit: u32,
    pub jump_over_obstacles: bool,
    pub smooth_dragged_segments: bool,
    #[serde(rename = "allow_drc_violations")]
    pub can_violate_drc: bool,
    pub free_angle_mode: bool,
    pub snap_to_tracks: bool,
    pub snap_to_pads: bool,
    #[serde(rename = "optimize_entire_dragged_track")]
    pub optimize_dragged_track: bool,
    pub auto_posture: bool,
    pub fix_all_segments: bool,
    pub corner_mode: CornerMode,
    pub walkaround_hug_length_threshold: f64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            mode: RouterMode::Shove,
            effort: OptimizerEffort::Medium,
            remove_loops: true,
            smart_pads: true,
            shove_vias: true,
            suggest_finish: false,
            follow_mouse: true,
            start_diagonal: false,
            shove_iteration_limit: 250,
            via_force_prop_iteration_limit: 40,
            shove_time_limit: 1000,
            walkaround_iteration_limit: 40,
            jump_over_obstacles: false,
            smooth_dragged_segments: true,
            can_violate_drc: false,
            free_angle_mode: false,
            snap_to_tracks: false,
            snap_to_pads: false,
            optimize_dragged_track: false,
            auto_posture: true,
            fix_all_segments: true,
            corner_mode: CornerMode::Mitered45,
            walkaround_hug_length_threshold: 1.5,
        }
    }
}

impl RoutingSettings {
    pub fn initial_direction(&self) -> Dir45 {
        if self.start_diagonal {
            Dir45::Ne
        } else {
            Dir45::N
        }
    }

    pub fn allow_drc_violations(&self) -> bool {
        self.mode == RouterMode::MarkObstacles && self.can_violate_drc
    }

    pub fn follow_mouse(&self) -> bool {
        self.follow_mouse && self.mode != RouterMode::MarkObstacles
    }

    pub fn shove_time_limit(&self) -> TimeLimit {
        TimeLimit::new(self.shove_time_limit)
    }

    pub fn walkaround_time_limit(&self) -> TimeLimit {
        TimeLimit::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = RoutingSettings::default();
        assert_eq!(s.shove_iteration_limit, 250);
        assert_eq!(s.walkaround_iteration_limit, 40);
        assert_eq!(s.via_force_prop_iteration_limit, 40);
        assert_eq!(s.shove_time_limit, 1000);
        assert_eq!(s.walkaround_hug_length_threshold, 1.5);
        assert!(s.shove_vias);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut s = RoutingSettings::default();
        s.mode = RouterMode::Walkaround;
        s.corner_mode = CornerMode::Rounded90;
        let blob = serde_json::to_string(&s).unwrap();
        assert!(blob.contains("\"mode\":\"walkaround\""));
        assert!(blob.contains("\"corner_mode\":\"rounded90\""));
        assert!(blob.contains("\"shove_time_limit_ms\":1000"));
        assert!(blob.contains("\"allow_drc_violations\":false"));
        assert!(blob.contains("\"optimize_entire_dragged_track\":false"));
        let back: RoutingSettings = serde_json::from_str(&blob).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_partial_blob_uses_defaults() {
        let back: RoutingSettings = serde_json::from_str("{\"shove_vias\":false}").unwrap();
        assert!(!back.shove_vias);
        assert_eq!(back.shove_iteration_limit, 250);
    }

    #[test]
    fn test_persistence_keys() {
        let blob = concat!(
            "{\"shove_time_limit_ms\":500,\"allow_drc_violations\":true,",
            "\"optimize_entire_dragged_track\":true}"
        );
        let back: RoutingSettings = serde_json::from_str(blob).unwrap();
        assert_eq!(back.shove_time_limit, 500);
        assert!(back.can_violate_drc);
        assert!(back.optimize_dragged_track);
    }
}

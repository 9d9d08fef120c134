use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub fn config_file() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".lattice.toml")
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default)]
    pub drag: DragSettings,
    #[serde(default)]
    pub monitors: MonitorSettings,
    #[serde(default)]
    pub frames: FrameSettings,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct LayoutSettings {
    /// Space between two tiled windows, split evenly between both sides.
    #[serde(default = "default_margin")]
    pub margin: i32,
    /// Width of the focus border drawn around windows. Stacked windows are
    /// inset by this much so the border stays on screen.
    #[serde(default = "default_border_width")]
    pub border_width: i32,
    /// Space between the tiled area and the monitor work area.
    #[serde(default)]
    pub outer_gap: i32,
    #[serde(default)]
    pub stacked_on_startup: bool,
    #[serde(default = "default_min_tile_width")]
    pub min_tile_width: i32,
    #[serde(default = "default_min_tile_height")]
    pub min_tile_height: i32,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct DragSettings {
    /// Pointer travel (px) before a gesture counts as a real drag.
    #[serde(default = "default_move_threshold")]
    pub move_threshold: i32,
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,
    #[serde(default = "default_resize_border")]
    pub resize_border: i32,
    #[serde(default = "default_title_bar_height")]
    pub title_bar_height: i32,
    /// How far outside a candidate's edges the pointer may be and still
    /// target it for a swap.
    #[serde(default = "default_swap_proximity")]
    pub swap_proximity: i32,
    #[serde(default = "default_max_swap_distance")]
    pub max_swap_distance: f64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_abandon_after_ms")]
    pub abandon_after_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct MonitorSettings {
    #[serde(default = "default_arrival_base_delay_ms")]
    pub arrival_base_delay_ms: u64,
    #[serde(default = "default_arrival_max_delay_ms")]
    pub arrival_max_delay_ms: u64,
    #[serde(default = "default_removal_delay_ms")]
    pub removal_delay_ms: u64,
    /// Pause between detaching windows and asking the OS for the new
    /// topology.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Period of the background topology check. Zero disables it.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct FrameSettings {
    #[serde(default = "default_correction_ttl_ms")]
    pub correction_ttl_ms: u64,
    /// Window classes that draw their own decorations.
    #[serde(default = "default_borderless_classes")]
    pub borderless_classes: Vec<String>,
    /// Executables of browser and Electron-style apps.
    #[serde(default = "default_chromium_processes")]
    pub chromium_processes: Vec<String>,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            margin: default_margin(),
            border_width: default_border_width(),
            outer_gap: 0,
            stacked_on_startup: false,
            min_tile_width: default_min_tile_width(),
            min_tile_height: default_min_tile_height(),
        }
    }
}

impl Default for DragSettings {
    fn default() -> Self {
        Self {
            move_threshold: default_move_threshold(),
            min_duration_ms: default_min_duration_ms(),
            resize_border: default_resize_border(),
            title_bar_height: default_title_bar_height(),
            swap_proximity: default_swap_proximity(),
            max_swap_distance: default_max_swap_distance(),
            cooldown_ms: default_cooldown_ms(),
            abandon_after_ms: default_abandon_after_ms(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            arrival_base_delay_ms: default_arrival_base_delay_ms(),
            arrival_max_delay_ms: default_arrival_max_delay_ms(),
            removal_delay_ms: default_removal_delay_ms(),
            settle_ms: default_settle_ms(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            correction_ttl_ms: default_correction_ttl_ms(),
            borderless_classes: default_borderless_classes(),
            chromium_processes: default_chromium_processes(),
        }
    }
}

impl LayoutSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.margin < 0 {
            issues.push(format!("layout.margin must be non-negative, got {}", self.margin));
        }
        if self.border_width < 0 {
            issues.push(format!(
                "layout.border_width must be non-negative, got {}",
                self.border_width
            ));
        }
        if self.outer_gap < 0 {
            issues.push(format!(
                "layout.outer_gap must be non-negative, got {}",
                self.outer_gap
            ));
        }
        if self.min_tile_width <= 0 || self.min_tile_height <= 0 {
            issues.push(format!(
                "layout minimum tile size must be positive, got {}x{}",
                self.min_tile_width, self.min_tile_height
            ));
        }

        issues
    }

    pub fn auto_fix_values(&mut self) -> usize {
        let mut fixes = 0;

        if self.margin < 0 {
            self.margin = default_margin();
            fixes += 1;
        }
        if self.border_width < 0 {
            self.border_width = default_border_width();
            fixes += 1;
        }
        if self.outer_gap < 0 {
            self.outer_gap = 0;
            fixes += 1;
        }
        if self.min_tile_width <= 0 {
            self.min_tile_width = default_min_tile_width();
            fixes += 1;
        }
        if self.min_tile_height <= 0 {
            self.min_tile_height = default_min_tile_height();
            fixes += 1;
        }

        fixes
    }
}

impl DragSettings {
    pub fn min_duration(&self) -> Duration { Duration::from_millis(self.min_duration_ms) }

    pub fn cooldown(&self) -> Duration { Duration::from_millis(self.cooldown_ms) }

    pub fn abandon_after(&self) -> Duration { Duration::from_millis(self.abandon_after_ms) }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.move_threshold < 0 {
            issues.push(format!(
                "drag.move_threshold must be non-negative, got {}",
                self.move_threshold
            ));
        }
        if self.resize_border < 0 {
            issues.push(format!(
                "drag.resize_border must be non-negative, got {}",
                self.resize_border
            ));
        }
        if self.swap_proximity < 0 {
            issues.push(format!(
                "drag.swap_proximity must be non-negative, got {}",
                self.swap_proximity
            ));
        }
        if !(self.max_swap_distance > 0.0) {
            issues.push(format!(
                "drag.max_swap_distance must be positive, got {}",
                self.max_swap_distance
            ));
        }

        issues
    }

    pub fn auto_fix_values(&mut self) -> usize {
        let mut fixes = 0;

        if self.move_threshold < 0 {
            self.move_threshold = default_move_threshold();
            fixes += 1;
        }
        if self.resize_border < 0 {
            self.resize_border = default_resize_border();
            fixes += 1;
        }
        if self.swap_proximity < 0 {
            self.swap_proximity = default_swap_proximity();
            fixes += 1;
        }
        if !(self.max_swap_distance > 0.0) {
            self.max_swap_distance = default_max_swap_distance();
            fixes += 1;
        }

        fixes
    }
}

impl MonitorSettings {
    pub fn arrival_base_delay(&self) -> Duration { Duration::from_millis(self.arrival_base_delay_ms) }

    pub fn arrival_max_delay(&self) -> Duration { Duration::from_millis(self.arrival_max_delay_ms) }

    pub fn removal_delay(&self) -> Duration { Duration::from_millis(self.removal_delay_ms) }

    pub fn settle(&self) -> Duration { Duration::from_millis(self.settle_ms) }

    pub fn check_interval(&self) -> Option<Duration> {
        (self.check_interval_ms > 0).then(|| Duration::from_millis(self.check_interval_ms))
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.arrival_max_delay_ms < self.arrival_base_delay_ms {
            issues.push(format!(
                "monitors.arrival_max_delay_ms ({}) is below arrival_base_delay_ms ({})",
                self.arrival_max_delay_ms, self.arrival_base_delay_ms
            ));
        }

        issues
    }

    pub fn auto_fix_values(&mut self) -> usize {
        let mut fixes = 0;

        if self.arrival_max_delay_ms < self.arrival_base_delay_ms {
            self.arrival_max_delay_ms = self.arrival_base_delay_ms;
            fixes += 1;
        }

        fixes
    }
}

impl FrameSettings {
    pub fn correction_ttl(&self) -> Duration { Duration::from_millis(self.correction_ttl_ms) }

    pub fn is_borderless_class(&self, class: &str) -> bool {
        self.borderless_classes.iter().any(|c| c.eq_ignore_ascii_case(class))
    }

    pub fn is_chromium_process(&self, process: &str) -> bool {
        self.chromium_processes.iter().any(|p| p.eq_ignore_ascii_case(process))
    }
}

fn default_margin() -> i32 { 8 }

fn default_border_width() -> i32 { 2 }

fn default_min_tile_width() -> i32 { 470 }

fn default_min_tile_height() -> i32 { 150 }

fn default_move_threshold() -> i32 { 10 }

fn default_min_duration_ms() -> u64 { 30 }

fn default_resize_border() -> i32 { 8 }

fn default_title_bar_height() -> i32 { 32 }

fn default_swap_proximity() -> i32 { 40 }

fn default_max_swap_distance() -> f64 { 600.0 }

fn default_cooldown_ms() -> u64 { 1000 }

fn default_abandon_after_ms() -> u64 { 30_000 }

fn default_arrival_base_delay_ms() -> u64 { 1000 }

fn default_arrival_max_delay_ms() -> u64 { 16_000 }

fn default_removal_delay_ms() -> u64 { 500 }

fn default_settle_ms() -> u64 { 250 }

fn default_check_interval_ms() -> u64 { 5000 }

fn default_correction_ttl_ms() -> u64 { 500 }

fn default_borderless_classes() -> Vec<String> {
    vec![
        "ApplicationFrameWindow".to_string(),
        "Windows.UI.Core.CoreWindow".to_string(),
    ]
}

fn default_chromium_processes() -> Vec<String> {
    vec![
        "chrome.exe".to_string(),
        "msedge.exe".to_string(),
        "brave.exe".to_string(),
        "Code.exe".to_string(),
        "Discord.exe".to_string(),
        "Slack.exe".to_string(),
    ]
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let buf = std::fs::read_to_string(path)?;
        Self::parse(&buf)
    }

    /// Reads `path` if it exists, otherwise falls back to the built-in
    /// defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Config> {
        if path.exists() { Self::read(path) } else { Self::builtin() }
    }

    pub fn builtin() -> anyhow::Result<Config> { Self::parse(include_str!("../../lattice.default.toml")) }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml_string.as_bytes())?;
        Ok(())
    }

    /// Validates the entire configuration and returns a list of issues found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        issues.extend(self.layout.validate());
        issues.extend(self.drag.validate());
        issues.extend(self.monitors.validate());
        issues
    }

    /// Attempts to fix configuration values automatically.
    /// Returns the number of fixes applied.
    pub fn auto_fix_values(&mut self) -> usize {
        self.layout.auto_fix_values() + self.drag.auto_fix_values() + self.monitors.auto_fix_values()
    }

    fn parse(buf: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(buf)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_config_parses() {
        let config = Config::builtin().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = Config::parse(
            r#"
            [layout]
            margin = 4
            stacked_on_startup = true

            [monitors]
            check_interval_ms = 0
        "#,
        )
        .unwrap();
        assert_eq!(config.layout.margin, 4);
        assert!(config.layout.stacked_on_startup);
        assert_eq!(config.layout.border_width, 2);
        assert_eq!(config.monitors.check_interval(), None);
        assert_eq!(config.drag, DragSettings::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::parse("[layout]\nmargn = 3\n").is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_empty());

        config.layout.margin = -1;
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("layout.margin must be non-negative"));

        assert_eq!(config.auto_fix_values(), 1);
        assert_eq!(config.layout.margin, 8);

        config.monitors.arrival_max_delay_ms = 10;
        assert_eq!(config.validate().len(), 1);
        assert_eq!(config.auto_fix_values(), 1);
        assert_eq!(config.monitors.arrival_max_delay_ms, config.monitors.arrival_base_delay_ms);
    }

    #[test]
    fn save_then_read_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lattice.toml");
        let mut config = Config::default();
        config.drag.cooldown_ms = 250;
        config.frames.borderless_classes.push("MyCustomFrame".to_string());
        config.save(&path).unwrap();
        assert_eq!(Config::read(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn frame_lists_match_case_insensitively() {
        let frames = FrameSettings::default();
        assert!(frames.is_chromium_process("CHROME.EXE"));
        assert!(frames.is_borderless_class("applicationframewindow"));
        assert!(!frames.is_chromium_process("notepad.exe"));
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::SwapMode;
use crate::window::{discovery, frame, identity, visibility};

pub const DEFAULT_CONFIG: &str = include_str!("../../swapr.default.toml");

pub fn config_file() -> Option<PathBuf> { dirs::home_dir().map(|home| home.join(".swapr.toml")) }

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub tuning: Tuning,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Mode new target registrations start in.
    #[serde(default)]
    pub swap_mode: SwapMode,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Windows owned by this process never count as covering the target.
    #[serde(default = "yes")]
    pub exclude_own_windows: bool,
}

/// The empirically tuned constants of the window components.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Tuning {
    #[serde(default = "default_identity_frame_tolerance")]
    pub identity_frame_tolerance: f64,
    #[serde(default = "default_discovery_frame_tolerance")]
    pub discovery_frame_tolerance: f64,
    #[serde(default = "default_mutation_tolerance")]
    pub mutation_tolerance: f64,
    #[serde(default = "default_size_skip_threshold")]
    pub size_skip_threshold: f64,
    #[serde(default = "default_coverage_area_ratio")]
    pub coverage_area_ratio: f64,
    #[serde(default = "default_min_window_dimension")]
    pub min_window_dimension: f64,
    #[serde(default = "default_visibility_min_alpha")]
    pub visibility_min_alpha: f64,
    #[serde(default = "default_discovery_min_alpha")]
    pub discovery_min_alpha: f64,
    #[serde(default = "default_system_layer_threshold")]
    pub system_layer_threshold: i32,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_max_mutation_attempts")]
    pub max_mutation_attempts: u32,
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            swap_mode: SwapMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            exclude_own_windows: yes(),
        }
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            identity_frame_tolerance: default_identity_frame_tolerance(),
            discovery_frame_tolerance: default_discovery_frame_tolerance(),
            mutation_tolerance: default_mutation_tolerance(),
            size_skip_threshold: default_size_skip_threshold(),
            coverage_area_ratio: default_coverage_area_ratio(),
            min_window_dimension: default_min_window_dimension(),
            visibility_min_alpha: default_visibility_min_alpha(),
            discovery_min_alpha: default_discovery_min_alpha(),
            system_layer_threshold: default_system_layer_threshold(),
            settle_delay_ms: default_settle_delay_ms(),
            max_mutation_attempts: default_max_mutation_attempts(),
            max_ancestor_depth: default_max_ancestor_depth(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.poll_interval_ms == 0 {
            issues.push("poll_interval_ms must be positive, got 0".to_string());
        }

        issues
    }

    pub fn auto_fix_values(&mut self) -> usize {
        let mut fixes = 0;

        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = default_poll_interval_ms();
            fixes += 1;
        }

        fixes
    }
}

impl Tuning {
    fn tolerances(&mut self) -> [(&'static str, &mut f64, fn() -> f64); 4] {
        [
            (
                "identity_frame_tolerance",
                &mut self.identity_frame_tolerance,
                default_identity_frame_tolerance,
            ),
            (
                "discovery_frame_tolerance",
                &mut self.discovery_frame_tolerance,
                default_discovery_frame_tolerance,
            ),
            ("mutation_tolerance", &mut self.mutation_tolerance, default_mutation_tolerance),
            ("size_skip_threshold", &mut self.size_skip_threshold, default_size_skip_threshold),
        ]
    }

    fn alphas(&mut self) -> [(&'static str, &mut f64, fn() -> f64); 2] {
        [
            ("visibility_min_alpha", &mut self.visibility_min_alpha, default_visibility_min_alpha),
            ("discovery_min_alpha", &mut self.discovery_min_alpha, default_discovery_min_alpha),
        ]
    }

    /// Checks every value, resetting invalid ones to their default when `fix`
    /// is set.
    fn check(&mut self, fix: bool) -> Vec<String> {
        let mut issues = Vec::new();

        for (name, value, default) in self.tolerances() {
            if !(*value > 0.0) {
                issues.push(format!("{name} must be positive, got {value}"));
                if fix {
                    *value = default();
                }
            }
        }

        if !(self.coverage_area_ratio > 0.0 && self.coverage_area_ratio < 1.0) {
            issues.push(format!(
                "coverage_area_ratio must be between 0 and 1, got {}",
                self.coverage_area_ratio
            ));
            if fix {
                self.coverage_area_ratio = default_coverage_area_ratio();
            }
        }

        if self.min_window_dimension < 0.0 {
            issues.push(format!(
                "min_window_dimension must be non-negative, got {}",
                self.min_window_dimension
            ));
            if fix {
                self.min_window_dimension = default_min_window_dimension();
            }
        }

        for (name, value, default) in self.alphas() {
            if !(0.0..=1.0).contains(&*value) {
                issues.push(format!("{name} must be between 0 and 1, got {value}"));
                if fix {
                    *value = default();
                }
            }
        }

        if self.max_mutation_attempts == 0 {
            issues.push("max_mutation_attempts must be at least 1, got 0".to_string());
            if fix {
                self.max_mutation_attempts = default_max_mutation_attempts();
            }
        }

        if self.max_ancestor_depth == 0 {
            issues.push("max_ancestor_depth must be at least 1, got 0".to_string());
            if fix {
                self.max_ancestor_depth = default_max_ancestor_depth();
            }
        }

        issues
    }

    pub fn validate(&self) -> Vec<String> { self.clone().check(false) }

    pub fn auto_fix_values(&mut self) -> usize { self.check(true).len() }
}

fn yes() -> bool { true }

fn default_poll_interval_ms() -> u64 { 50 }

fn default_identity_frame_tolerance() -> f64 { identity::FRAME_TOLERANCE }

fn default_discovery_frame_tolerance() -> f64 { discovery::FRAME_TOLERANCE }

fn default_mutation_tolerance() -> f64 { frame::MUTATION_TOLERANCE }

fn default_size_skip_threshold() -> f64 { frame::SIZE_SKIP_THRESHOLD }

fn default_coverage_area_ratio() -> f64 { visibility::COVERAGE_AREA_RATIO }

fn default_min_window_dimension() -> f64 { visibility::MIN_WINDOW_DIMENSION }

fn default_visibility_min_alpha() -> f64 { visibility::MIN_ALPHA }

fn default_discovery_min_alpha() -> f64 { discovery::MIN_ALPHA }

fn default_system_layer_threshold() -> i32 { visibility::SYSTEM_LAYER_THRESHOLD }

fn default_settle_delay_ms() -> u64 { frame::SETTLE_DELAY.as_millis() as u64 }

fn default_max_mutation_attempts() -> u32 { frame::MAX_ATTEMPTS }

fn default_max_ancestor_depth() -> usize { identity::MAX_ANCESTOR_DEPTH }

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let buf = std::fs::read_to_string(path)?;
        Self::parse(&buf)
    }

    /// Reads `path` if given, else the user's config file if it exists, else
    /// the built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        if let Some(path) = path {
            return Self::read(path);
        }
        match config_file() {
            Some(path) if path.exists() => Self::read(&path),
            _ => Self::parse(DEFAULT_CONFIG),
        }
    }

    /// Validates the entire configuration and returns a list of issues found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        issues.extend(self.settings.validate());
        issues.extend(self.tuning.validate());
        issues
    }

    /// Attempts to fix configuration values automatically.
    /// Returns the number of fixes applied.
    pub fn auto_fix_values(&mut self) -> usize {
        self.settings.auto_fix_values() + self.tuning.auto_fix_values()
    }

    pub fn parse(buf: &str) -> anyhow::Result<Config> { Ok(toml::from_str(buf)?) }
}

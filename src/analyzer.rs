// Movement pattern analysis
//
// Classifies an event history as human or bot from pointer/touch velocity:
// 1. Histories shorter than `min_events` are treated as bot (fail closed)
// 2. Consecutive pairs involving a key event, or sharing a timestamp, are skipped
// 3. Every other pair yields a velocity (px/sec) and a speed
// 4. Any change between consecutive velocities above `velocity_threshold`
//    marks the movement as organic
//
// Scripted pointers tend to move at constant velocity; people jitter.

use crate::events::{EventBase, UserEvent};
use serde::{Deserialize, Serialize};

/// Analyzer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Minimum number of events required for a human verdict
    pub min_events: usize,
    /// Velocity change (px/sec) above which movement counts as non-constant
    pub velocity_threshold: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_events: 10,
            velocity_threshold: 0.1,
        }
    }
}

/// Analysis verdict and summary statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_human: bool,
    /// Mean speed over valid samples (px/sec)
    pub average_speed: f64,
    /// Total number of events analyzed
    pub sample_count: usize,
    /// Number of pairs that produced a velocity
    pub valid_samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Velocity {
    x: f64,
    y: f64,
}

impl Velocity {
    fn between(prev: &EventBase, curr: &EventBase, dt_secs: f64) -> Self {
        Self {
            x: (curr.x - prev.x) / dt_secs,
            y: (curr.y - prev.y) / dt_secs,
        }
    }

    fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    fn change_from(&self, other: &Velocity) -> f64 {
        Velocity {
            x: self.x - other.x,
            y: self.y - other.y,
        }
        .magnitude()
    }
}

/// Pattern analyzer
#[derive(Debug, Clone, Default)]
pub struct PatternAnalyzer {
    config: AnalyzerConfig,
}

impl PatternAnalyzer {
    /// Create analyzer with default thresholds
    pub fn new() -> Self {
        Self {
            config: AnalyzerConfig::default(),
        }
    }

    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze a history snapshot, oldest event first
    pub fn analyze(&self, events: &[UserEvent]) -> AnalysisResult {
        if events.len() < self.config.min_events {
            return AnalysisResult {
                is_human: false,
                average_speed: 0.0,
                sample_count: events.len(),
                valid_samples: 0,
            };
        }

        let mut constant_velocity = true;
        let mut total_speed = 0.0;
        let mut valid_samples = 0usize;
        let mut prev_velocity: Option<Velocity> = None;

        for pair in events.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if prev.is_key() || curr.is_key() || prev.timestamp() == curr.timestamp() {
                continue;
            }

            // Signed so an out-of-order pair cannot underflow
            let dt = (curr.timestamp() as f64 - prev.timestamp() as f64) / 1000.0;
            let velocity = Velocity::between(prev.base(), curr.base(), dt);

            total_speed += velocity.magnitude();
            valid_samples += 1;

            if let Some(prev_velocity) = prev_velocity {
                if velocity.change_from(&prev_velocity) > self.config.velocity_threshold {
                    constant_velocity = false;
                }
            }
            prev_velocity = Some(velocity);
        }

        let average_speed = if valid_samples > 0 {
            total_speed / valid_samples as f64
        } else {
            0.0
        };

        AnalysisResult {
            is_human: !constant_velocity,
            average_speed,
            sample_count: events.len(),
            valid_samples,
        }
    }
}

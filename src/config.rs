use crate::match_engine::MatchCriteria;
use indexmap::IndexMap;
use serde::Deserialize;

/// A half-open interval `[lo, hi)` over `[0, 1)` used by the weighted load
/// balancer: a uniform sample in `[0, 1)` lands in exactly one upstream's
/// range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightRange {
    pub lo: f64,
    pub hi: f64,
}

impl WeightRange {
    pub fn contains(&self, sample: f64) -> bool {
        sample >= self.lo && sample < self.hi
    }
}

/// One upstream target for a reverse-proxy or load-balancer task.
#[derive(Debug, Clone, Deserialize)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    RoundRobin,
    Weighted,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskConfig {
    StaticAsset { root: String, strip_prefix: String },
    HealthCheck,
    ReverseProxy { upstream: Upstream },
    LoadBalancer {
        strategy: LoadBalanceStrategy,
        upstreams: Vec<Upstream>,
    },
}

/// One ordered rule: criteria plus the task it dispatches to. Config
/// iteration order is match precedence, so this is a `Vec`, not a map.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    #[serde(default)]
    pub criteria: IndexMap<String, Vec<String>>,
    pub task: TaskConfig,
}

impl TaskEntry {
    pub fn match_criteria(&self) -> MatchCriteria {
        MatchCriteria(self.criteria.clone())
    }
}

/// The whole configuration: listen port plus the ordered rule table.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub port: u16,
    pub tasks: Vec<TaskEntry>,
}

/// Builds `WeightRange`s from raw weights via a running-sum walk, so the
/// ranges are contiguous, disjoint, and cover `[0, sum(weights))`. Mirrors
/// `create_weight_ranges` in the retrieved Python original: no normalization
/// is performed here, callers are expected to supply weights that already
/// sum to (approximately) 1.0.
pub fn create_weight_ranges(weights: &[f64]) -> Vec<WeightRange> {
    let mut ranges = Vec::with_capacity(weights.len());
    let mut running = 0.0;
    for &w in weights {
        let lo = running;
        running += w;
        ranges.push(WeightRange { lo, hi: running });
    }
    ranges
}

/// Built-in settings presets, selected by the CLI's `--settings` flag. Stands
/// in for the on-disk configuration loader this system would have in
/// production, the same role `settings_map` plays in the retrieved Python
/// original's `settings.py`.
pub fn preset(key: u32) -> Option<Settings> {
    match key {
        0 => Some(Settings {
            port: 8080,
            tasks: vec![TaskEntry {
                criteria: IndexMap::new(),
                task: TaskConfig::HealthCheck,
            }],
        }),
        1 => {
            let mut static_criteria = IndexMap::new();
            static_criteria.insert("url".to_string(), vec!["/static/".to_string()]);
            Some(Settings {
                port: 8080,
                tasks: vec![
                    TaskEntry {
                        criteria: static_criteria,
                        task: TaskConfig::StaticAsset {
                            root: "./public".to_string(),
                            strip_prefix: "/static/".to_string(),
                        },
                    },
                    TaskEntry {
                        criteria: IndexMap::new(),
                        task: TaskConfig::HealthCheck,
                    },
                ],
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_ranges_are_contiguous_and_disjoint() {
        let ranges = create_weight_ranges(&[0.2, 0.3, 0.5]);
        assert_eq!(ranges[0], WeightRange { lo: 0.0, hi: 0.2 });
        assert_eq!(ranges[1], WeightRange { lo: 0.2, hi: 0.5 });
        assert_eq!(ranges[2], WeightRange { lo: 0.5, hi: 1.0 });
    }

    #[test]
    fn weight_ranges_cover_full_span() {
        let ranges = create_weight_ranges(&[0.5, 0.5]);
        assert!(ranges[0].contains(0.0));
        assert!(!ranges[0].contains(0.5));
        assert!(ranges[1].contains(0.5));
        assert!(ranges[1].contains(0.999));
    }

    #[test]
    fn preset_zero_is_a_bare_health_check() {
        let settings = preset(0).unwrap();
        assert_eq!(settings.tasks.len(), 1);
        assert!(matches!(settings.tasks[0].task, TaskConfig::HealthCheck));
    }

    #[test]
    fn unknown_preset_key_returns_none() {
        assert!(preset(9999).is_none());
    }

    #[test]
    fn task_entry_builds_match_criteria_from_config() {
        let mut criteria = IndexMap::new();
        criteria.insert("url".to_string(), vec!["/api/".to_string()]);
        let entry = TaskEntry {
            criteria,
            task: TaskConfig::HealthCheck,
        };
        let match_criteria = entry.match_criteria();
        assert_eq!(match_criteria.0.get("url").unwrap(), &vec!["/api/".to_string()]);
    }
}

//! Architecture health score (0-100)
//!
//! Starts from a fixed baseline, subtracts penalties for smell volume and the
//! presence of the heavier smell types, then nudges by history trends.

use crate::history::{Trend, Trends};
use crate::models::{ArchSmell, SmellType};
use serde::{Deserialize, Serialize};

const BASELINE: i32 = 80;
const PER_SMELL_PENALTY: i32 = 3;
const MAX_VOLUME_PENALTY: i32 = 20;

/// Presence penalties per smell type
const PRESENCE_PENALTIES: [(SmellType, i32); 3] = [
    (SmellType::GodModule, 8),
    (SmellType::Bottleneck, 6),
    (SmellType::CyclicDependency, 6),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthLevel::Low => write!(f, "low"),
            HealthLevel::Medium => write!(f, "medium"),
            HealthLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: i32,
    pub level: HealthLevel,
    pub factors: Vec<String>,
}

pub fn compute_health(smells: &[ArchSmell], trends: &Trends) -> HealthReport {
    let mut score = BASELINE;
    let mut factors = Vec::new();

    if !smells.is_empty() {
        let penalty = (PER_SMELL_PENALTY * smells.len() as i32).min(MAX_VOLUME_PENALTY);
        score -= penalty;
        factors.push(format!(
            "{} architectural smells (penalty {})",
            smells.len(),
            penalty
        ));
    }

    for (smell_type, penalty) in PRESENCE_PENALTIES {
        if smells.iter().any(|s| s.smell_type == smell_type) {
            score -= penalty;
            factors.push(format!("presence of {} (penalty {})", smell_type, penalty));
        }
    }

    if trends.complexity == Trend::Increasing {
        score -= 3;
        factors.push("complexity increasing (penalty 3)".to_string());
    }
    match trends.smells {
        Trend::Increasing => {
            score -= 10;
            factors.push("smell count increasing (penalty 10)".to_string());
        }
        Trend::Decreasing => {
            score += 5;
            factors.push("smell count decreasing (bonus 5)".to_string());
        }
        _ => {}
    }
    if trends.centralization == Trend::Increasing {
        score -= 5;
        factors.push("centralization increasing (penalty 5)".to_string());
    }

    let score = score.clamp(0, 100);
    let level = if score >= 70 {
        HealthLevel::High
    } else if score >= 40 {
        HealthLevel::Medium
    } else {
        HealthLevel::Low
    };
    HealthReport {
        score,
        level,
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smell(t: SmellType) -> ArchSmell {
        ArchSmell {
            smell_type: t,
            nodes: vec!["a.py".into()],
            severity: 1.0,
            description: String::new(),
        }
    }

    #[test]
    fn test_clean_project() {
        let report = compute_health(&[], &Trends::default());
        assert_eq!(report.score, 80);
        assert_eq!(report.level, HealthLevel::High);
        assert!(report.factors.is_empty());
    }

    #[test]
    fn test_penalties() {
        let smells = vec![smell(SmellType::GodModule), smell(SmellType::Hub)];
        let report = compute_health(&smells, &Trends::default());
        // 80 - 6 - 8
        assert_eq!(report.score, 66);
        assert_eq!(report.level, HealthLevel::Medium);
        assert_eq!(report.factors[0], "2 architectural smells (penalty 6)");
        assert_eq!(report.factors[1], "presence of god_module (penalty 8)");
    }

    #[test]
    fn test_clamped_and_low() {
        let smells: Vec<ArchSmell> = (0..10)
            .flat_map(|_| {
                [
                    smell(SmellType::GodModule),
                    smell(SmellType::Bottleneck),
                    smell(SmellType::CyclicDependency),
                ]
            })
            .collect();
        let trends = Trends {
            complexity: Trend::Increasing,
            smells: Trend::Increasing,
            centralization: Trend::Increasing,
        };
        let report = compute_health(&smells, &trends);
        // 80 - 20 - 20 - 18 = 22
        assert_eq!(report.score, 22);
        assert_eq!(report.level, HealthLevel::Low);
        assert!((0..=100).contains(&report.score));
    }

    #[test]
    fn test_decreasing_bonus() {
        let trends = Trends {
            smells: Trend::Decreasing,
            ..Default::default()
        };
        let report = compute_health(&[], &trends);
        assert_eq!(report.score, 85);
        assert_eq!(report.factors, vec!["smell count decreasing (bonus 5)"]);
    }
}

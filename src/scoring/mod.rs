//! Module prioritization
//!
//! Scores come from three sources:
//! - the severity of every smell touching a module
//! - a fixed bonus for modules named in the summary's risk lines
//! - a 10% boost across the board while the smell count is trending up
//!
//! `targets_from_graph` then adds structural weight (degree, and fan-out or
//! fan-in depending on the smell) and keeps the top N as plan targets.

pub mod health;

pub use health::{compute_health, HealthLevel, HealthReport};

use crate::graph::ProjectGraph;
use crate::history::{Trend, Trends};
use crate::models::{ArchSmell, SmellType};
use crate::planner::rules::{refactor_kind_for_smells, StepKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TOP_N: usize = 8;

const RISK_MENTION_BONUS: f64 = 1.0;
const TREND_MULTIPLIER: f64 = 1.1;
const DEGREE_WEIGHT: f64 = 0.1;
const DIRECTIONAL_WEIGHT: f64 = 0.2;

/// Accumulated score for one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredModule {
    pub name: String,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// A ranked refactoring target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTarget {
    pub name: String,
    pub kind: StepKind,
    pub score: f64,
    pub reasons: Vec<String>,
}

fn entry<'a>(scored: &'a mut Vec<ScoredModule>, name: &str) -> &'a mut ScoredModule {
    let pos = match scored.iter().position(|m| m.name == name) {
        Some(pos) => pos,
        None => {
            scored.push(ScoredModule {
                name: name.to_string(),
                score: 0.0,
                reasons: Vec::new(),
            });
            scored.len() - 1
        }
    };
    &mut scored[pos]
}

/// Module named by a risk line: the text after the first `"@ "` up to whitespace
fn risk_target(risk: &str) -> Option<&str> {
    let (_, rest) = risk.split_once("@ ")?;
    rest.split(' ').next().filter(|t| !t.is_empty())
}

/// Per-module scores in first-seen order
pub fn score_modules(
    smells: &[ArchSmell],
    summary_risks: &[String],
    trends: &Trends,
) -> Vec<ScoredModule> {
    let mut scored: Vec<ScoredModule> = Vec::new();
    for smell in smells {
        for node in &smell.nodes {
            let module = entry(&mut scored, node);
            module.score += smell.severity;
            module
                .reasons
                .push(format!("{} (severity={:.2})", smell.smell_type, smell.severity));
        }
    }
    for risk in summary_risks {
        if let Some(target) = risk_target(risk) {
            let module = entry(&mut scored, target);
            module.score += RISK_MENTION_BONUS;
            module.reasons.push("mentioned_in_summary_risks".to_string());
        }
    }
    if trends.smells == Trend::Increasing {
        for module in &mut scored {
            module.score *= TREND_MULTIPLIER;
            module.reasons.push("smell_trend_increasing".to_string());
        }
    }
    scored
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Stable ranking by score, rounded to three decimals
pub fn prioritize(scored: Vec<ScoredModule>) -> Vec<ScoredModule> {
    let mut ranked: Vec<ScoredModule> = scored
        .into_iter()
        .map(|mut m| {
            m.score = round3(m.score);
            m
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Smell types touching `node`, in smell order
pub fn smell_types_for(smells: &[ArchSmell], node: &str) -> Vec<SmellType> {
    let mut types = Vec::new();
    for smell in smells.iter().filter(|s| s.nodes.iter().any(|n| n == node)) {
        if !types.contains(&smell.smell_type) {
            types.push(smell.smell_type);
        }
    }
    types
}

/// Graph-aware ranking of refactoring targets
pub fn targets_from_graph(
    graph: &ProjectGraph,
    smells: &[ArchSmell],
    summary_risks: &[String],
    trends: &Trends,
    top_n: usize,
) -> Vec<PlanTarget> {
    let fan = graph.fan_in_out();
    let mut targets: Vec<PlanTarget> = score_modules(smells, summary_risks, trends)
        .into_iter()
        .map(|module| {
            let types = smell_types_for(smells, &module.name);
            let (fan_in, fan_out) = fan.get(&module.name).copied().unwrap_or((0, 0));
            let mut score = module.score + (fan_in + fan_out) as f64 * DEGREE_WEIGHT;
            if types.contains(&SmellType::GodModule) || types.contains(&SmellType::Hub) {
                score += fan_out as f64 * DIRECTIONAL_WEIGHT;
            } else if types.contains(&SmellType::Bottleneck) {
                score += fan_in as f64 * DIRECTIONAL_WEIGHT;
            }
            PlanTarget {
                kind: refactor_kind_for_smells(&types),
                name: module.name,
                score: round3(score),
                reasons: module.reasons,
            }
        })
        .collect();
    targets.sort_by(|a, b| b.score.total_cmp(&a.score));
    targets.truncate(top_n);
    debug!("Selected {} plan targets", targets.len());
    targets
}

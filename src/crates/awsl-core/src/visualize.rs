//! Mermaid rendering of a compiled plan's dependency graph.

use crate::plan::PregelPlan;

/// Render the plan's node-level dependency edges as a mermaid `graph TD`.
///
/// The synthetic start marker feeds nodes consuming workflow inputs; the
/// sink feeds a terminal `END` marker.
pub fn to_mermaid(plan: &PregelPlan) -> String {
    let mut lines = vec!["graph TD".to_string()];
    let mut edges: Vec<(String, String)> = Vec::new();
    for (node, deps) in &plan.dependencies {
        for dep in deps {
            edges.push((dep.clone(), node.clone()));
        }
    }
    edges.sort();
    for (from, to) in edges {
        lines.push(format!("    {from} --> {to}"));
    }
    lines.push(format!("    {} --> END", plan.sink));
    lines.join("\n")
}

use crate::evolution::EvolutionEngine;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

// Generates a DOT language string for the lineage recorded by the engine
pub fn generate_dot_string(engine: &EvolutionEngine) -> String {
    // node id -> generation it was born in
    let mut nodes = BTreeMap::new();
    let mut edges = Vec::new();

    for (child_id, parent1_id, parent2_id, generation) in &engine.phylogeny_data {
        nodes.insert(*child_id, *generation);
        for parent_id in [parent1_id, parent2_id].into_iter().flatten() {
            nodes.entry(*parent_id).or_insert(generation.saturating_sub(1));
            edges.push((*parent_id, *child_id));
        }
    }

    let best_id = engine.all_time_best_individual.as_ref().map(|ind| ind.id);

    let mut dot_graph = Vec::new();
    dot_graph.push("digraph Phylogeny {".to_string());
    dot_graph.push("  rankdir=LR;".to_string()); // Generations run left to right
    dot_graph.push("  node [shape=circle, style=filled, fillcolor=lightblue];".to_string());

    for (node_id, generation) in &nodes {
        let fill = if Some(*node_id) == best_id { ", fillcolor=gold" } else { "" };
        dot_graph.push(format!("  n{} [label=\"{}\\ngen {}\"{}];", node_id, node_id, generation, fill));
    }

    for (p_id, c_id) in edges {
        dot_graph.push(format!("  n{} -> n{};", p_id, c_id));
    }

    dot_graph.push("}".to_string());
    dot_graph.join("\n")
}

pub fn write_phylogeny_to_dot_file(engine: &EvolutionEngine, path: &Path) -> std::io::Result<()> {
    let dot_string = generate_dot_string(engine);
    let mut file = File::create(path)?;
    file.write_all(dot_string.as_bytes())?;
    info!("Phylogeny DOT file written to {}", path.display());
    Ok(())
}

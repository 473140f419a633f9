//! Force-directed layout run as a long task
//!
//! Each iteration pushes every pair of nodes apart, pulls the endpoints of
//! every edge towards a rest length, moves each node by the resulting force
//! (capped at `max_step`), flushes the changes and yields so that queued
//! readers can observe the intermediate state.

use std::collections::HashMap;

use graphsync::attributes::AttributeType;
use graphsync::{Graph, GraphData, GraphError, NodeRecord};
use rand::Rng;
use tracing::{debug, info};

/// Name the layout task is reported under
pub const TASK_NAME: &str = "layout";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub iterations: usize,
    /// Rest length of an edge
    pub spring_length: f32,
    pub spring: f32,
    pub repulsion: f32,
    /// Largest distance a node moves in one iteration
    pub max_step: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            spring_length: 20.0,
            spring: 0.05,
            repulsion: 400.0,
            max_step: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutReport {
    pub iterations: usize,
    pub cancelled: bool,
    /// Sum of node displacements in the last iteration
    pub last_displacement: f32,
}

fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn norm(v: [f32; 2]) -> f32 {
    v[0].hypot(v[1])
}

/// Fill `data` with `nodes` randomly placed nodes and `edges` random edges
///
/// Nodes get a `label` attribute, edges a `weight` attribute.
///
/// # Errors
///
/// Fails if the attribute tables already exist.
pub fn random_graph<R: Rng>(data: &mut GraphData, nodes: usize, edges: usize, rng: &mut R) -> Result<(), GraphError> {
    data.node_attributes_mut().create("label", AttributeType::Text)?;
    data.edge_attributes_mut().create("weight", AttributeType::Float)?;

    let mut slots = Vec::with_capacity(nodes);
    for i in 0..nodes {
        let pos = [rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)];
        let slot = data.add_node(NodeRecord::new(pos, 2.0, rng.gen()));
        data.node_attributes_mut().table_mut("label")?.set(slot, format!("n{i}"))?;
        slots.push(slot);
    }

    if slots.len() < 2 {
        return Ok(());
    }
    for _ in 0..edges {
        let from = slots[rng.gen_range(0..slots.len())];
        let to = slots[rng.gen_range(0..slots.len())];
        if from == to {
            continue;
        }
        let edge = data.add_edge(from, to, 0.5, [128, 128, 128])?;
        data.edge_attributes_mut()
            .table_mut("weight")?
            .set(edge, rng.gen_range(0.0f64..1.0))?;
    }
    debug!(nodes = data.node_count(), edges = data.edge_count(), "random graph built");
    Ok(())
}

/// One relaxation step; returns the total distance the nodes moved
///
/// # Errors
///
/// Propagates graph errors, which indicate a corrupted topology.
pub fn relax_once(data: &mut GraphData, params: &LayoutParams) -> Result<f32, GraphError> {
    let nodes: Vec<(usize, [f32; 2])> = data.nodes().iter_live().map(|(slot, r)| (slot, r.pos)).collect();
    let index: HashMap<usize, usize> = nodes.iter().enumerate().map(|(i, &(slot, _))| (slot, i)).collect();
    let mut force = vec![[0.0f32; 2]; nodes.len()];

    for i in 0..nodes.len() {
        for j in i + 1..nodes.len() {
            let d = sub(nodes[i].1, nodes[j].1);
            let dist = norm(d).max(0.1);
            let f = params.repulsion / (dist * dist * dist);
            for k in 0..2 {
                force[i][k] += d[k] * f;
                force[j][k] -= d[k] * f;
            }
        }
    }

    for (edge, _) in data.edges().iter_live() {
        let ends = *data.edges().side(edge);
        let (Some(&a), Some(&b)) = (index.get(&ends.from), index.get(&ends.to)) else {
            continue;
        };
        let d = sub(nodes[b].1, nodes[a].1);
        let dist = norm(d).max(0.1);
        let f = params.spring * (dist - params.spring_length) / dist;
        for k in 0..2 {
            force[a][k] += d[k] * f;
            force[b][k] -= d[k] * f;
        }
    }

    let mut total = 0.0;
    for (&(slot, pos), f) in nodes.iter().zip(&force) {
        let len = norm(*f);
        if len <= f32::EPSILON {
            continue;
        }
        let scale = len.min(params.max_step) / len;
        data.move_node(slot, [pos[0] + f[0] * scale, pos[1] + f[1] * scale])?;
        total += len * scale;
    }
    Ok(total)
}

/// Run the layout as the long task [`TASK_NAME`]
///
/// Stops early, with `cancelled` set in the report, when cancellation is
/// requested.
///
/// # Errors
///
/// Returns [`GraphError::Busy`] if another long task is running.
pub fn run_layout(graph: &Graph, params: &LayoutParams) -> Result<LayoutReport, GraphError> {
    let mut task = graph.lock_long(TASK_NAME)?;
    info!(iterations = params.iterations, nodes = task.node_count(), "layout started");

    let mut report = LayoutReport::default();
    for _ in 0..params.iterations {
        report.last_displacement = relax_once(&mut task, params)?;
        report.iterations += 1;
        task.flush_changes();
        if !task.yield_now() {
            report.cancelled = true;
            break;
        }
    }

    info!(
        iterations = report.iterations,
        cancelled = report.cancelled,
        displacement = report.last_displacement,
        "layout finished"
    );
    Ok(report)
}

use log::info;

use crate::defs::{Error, ErrorKind::*, Result};
use crate::mesh::Mesh;
use crate::settings::Settings;
use crate::texture::*;

/// A graph labeling problem decoupled from any mesh representation:
/// nodes carry sparse label costs, edges carry a scale applied to the
/// Potts penalty. Nodes without any cost entry are forced to stay
/// unlabeled.
pub struct LabelingProblem {
    pub costs: Vec<Vec<(usize, f64)>>, // Per node, sorted by label.
    pub adjacency: Vec<Vec<(usize, f64)>>, // (neighbor, penalty scale).
    pub potts_penalty: f64,
    pub sweep_limit: usize,
}

fn greedy_label(costs: &[(usize, f64)]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &(label, cost) in costs {
        if best.map_or(true, |(_, c)| cost < c) {
            best = Some((label, cost));
        }
    }
    best.map(|(label, _)| label)
}

fn smoothness(
    problem: &LabelingProblem,
    label: Option<usize>,
    other: Option<usize>,
    scale: f64,
) -> f64 {
    match (label, other) {
        (Some(l0), Some(l1)) if l0 != l1 => problem.potts_penalty * scale,
        _ => 0.0,
    }
}

fn node_energy(
    problem: &LabelingProblem,
    labels: &[Option<usize>],
    node: usize,
    label: usize,
    data_cost: f64,
) -> f64 {
    let mut energy = data_cost;
    for &(neighbor, scale) in &problem.adjacency[node] {
        energy +=
            smoothness(problem, Some(label), labels[neighbor], scale);
    }
    energy
}

/// Total objective of an assignment: data costs plus pairwise Potts
/// penalties over all edges.
pub fn labeling_energy(
    problem: &LabelingProblem,
    labels: &[Option<usize>],
) -> f64 {
    let mut energy = 0.0;
    for (node, label) in labels.iter().enumerate() {
        if let Some(label) = label {
            let cost = problem.costs[node]
                .iter()
                .find(|(l, _)| l == label)
                .map(|&(_, c)| c)
                .unwrap_or(f64::INFINITY);
            energy += cost;
        }
        for &(neighbor, scale) in &problem.adjacency[node] {
            if neighbor > node {
                energy +=
                    smoothness(problem, *label, labels[neighbor], scale);
            }
        }
    }
    energy
}

/// Deterministic iterated conditional modes. The assignment is seeded
/// with each node's cheapest label (ties go to the lowest label id) and
/// improved by index-order sweeps that only accept strictly better
/// labels, so the energy decreases monotonically and identical inputs
/// always produce identical output.
pub fn solve_labeling(
    problem: &LabelingProblem,
) -> Result<Vec<Option<usize>>> {
    let num_nodes = problem.costs.len();
    let mut labels: Vec<Option<usize>> = (0..num_nodes)
        .map(|node| greedy_label(&problem.costs[node]))
        .collect();

    let mut changed = true;
    let mut sweeps = 0;
    while changed {
        if sweeps == problem.sweep_limit {
            let desc = format!(
                "labeling did not converge within {} sweeps",
                sweeps
            );
            return Err(Error::new(Optimization, desc));
        }

        changed = false;
        for node in 0..num_nodes {
            let current = match labels[node] {
                Some(label) => label,
                None => continue,
            };

            // Entries are sorted by label id and the comparison is
            // strict, so ties resolve to the lowest label.
            let mut best = (current, f64::INFINITY);
            for &(label, data_cost) in &problem.costs[node] {
                let energy =
                    node_energy(problem, &labels, node, label, data_cost);
                if energy < best.1 {
                    best = (label, energy);
                }
            }

            let current_cost = problem.costs[node]
                .iter()
                .find(|&&(l, _)| l == current)
                .map(|&(_, c)| c)
                .unwrap_or(f64::INFINITY);
            let current_energy = node_energy(
                problem, &labels, node, current, current_cost,
            );
            if best.0 != current && best.1 < current_energy {
                labels[node] = Some(best.0);
                changed = true;
            }
        }
        sweeps += 1;
    }

    info!("labeling converged after {} sweeps", sweeps);
    Ok(labels)
}

/// Scale factor for the Potts penalty along a mesh edge: seams are
/// penalized harder where the two faces' preferred views disagree in
/// color along the shared edge.
fn edge_discrepancy(
    f0: usize,
    f1: usize,
    costs: &DataCosts,
    mesh: &Mesh,
    views: &[TextureView],
) -> f64 {
    let (v0, v1) = match (costs.cheapest(f0), costs.cheapest(f1)) {
        (Some((v0, _)), Some((v1, _))) => (v0, v1),
        _ => return 1.0,
    };
    if v0 == v1 {
        return 1.0;
    }

    let shared: Vec<usize> = mesh.faces[f0]
        .iter()
        .filter(|v| mesh.faces[f1].contains(v))
        .cloned()
        .collect();
    if shared.len() < 2 {
        return 1.0;
    }
    let mid = Point3::from(
        (mesh.vertices[shared[0]].coords + mesh.vertices[shared[1]].coords)
            / 2.0,
    );

    let mut samples = [Vector3::zeros(); 2];
    for (slot, &view_idx) in [v0, v1].iter().enumerate() {
        let view = &views[view_idx];
        let p = view.project(&mid);
        if p.depth <= 0.0 || !view.inside(p.pixel) {
            return 1.0;
        }
        samples[slot] = sample_pixel(p.pixel, &view.image);
    }

    1.0 + (samples[0] - samples[1]).norm() / 255.0
}

/// Assigns one view label (or unseen) per face by minimizing data cost
/// plus Potts smoothness over the adjacency graph.
pub fn select_views(
    graph: &FaceGraph,
    costs: &DataCosts,
    mesh: &Mesh,
    views: &[TextureView],
    settings: &Settings,
) -> Result<Vec<Option<usize>>> {
    let adjacency: Vec<Vec<(usize, f64)>> = (0..graph.num_nodes())
        .map(|f0| {
            graph
                .neighbors(f0)
                .iter()
                .map(|&f1| {
                    (f1, edge_discrepancy(f0, f1, costs, mesh, views))
                })
                .collect()
        })
        .collect();

    let problem = LabelingProblem {
        costs: (0..costs.num_faces())
            .map(|f| costs.face(f).to_vec())
            .collect(),
        adjacency,
        potts_penalty: settings.smoothness_weight,
        sweep_limit: settings.labeling_sweep_limit,
    };

    let labels = solve_labeling(&problem)?;
    info!(
        "view selection energy: {:.3}",
        labeling_energy(&problem, &labels)
    );
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_problem(
        costs: Vec<Vec<(usize, f64)>>,
        potts_penalty: f64,
    ) -> LabelingProblem {
        let n = costs.len();
        let adjacency = (0..n)
            .map(|i| {
                let mut ns = vec![];
                if i > 0 {
                    ns.push((i - 1, 1.0));
                }
                if i + 1 < n {
                    ns.push((i + 1, 1.0));
                }
                ns
            })
            .collect();
        LabelingProblem {
            costs,
            adjacency,
            potts_penalty,
            sweep_limit: 100,
        }
    }

    #[test]
    fn test_smoothness_merges_disagreeing_neighbors() {
        // Each node individually prefers a different label, but the
        // Potts penalty exceeds the data cost gap.
        let problem = chain_problem(
            vec![
                vec![(0, 1.0), (1, 2.0)],
                vec![(0, 2.0), (1, 1.0)],
            ],
            10.0,
        );
        let labels = solve_labeling(&problem).unwrap();
        assert!(labels[0].is_some());
        assert_eq!(labels[0], labels[1]);
    }

    #[test]
    fn test_weak_smoothness_keeps_individual_optima() {
        let problem = chain_problem(
            vec![
                vec![(0, 1.0), (1, 2.0)],
                vec![(0, 2.0), (1, 1.0)],
            ],
            0.1,
        );
        let labels = solve_labeling(&problem).unwrap();
        assert_eq!(labels, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_nodes_without_entries_stay_unlabeled() {
        let problem = chain_problem(
            vec![vec![(2, 1.0)], vec![], vec![(3, 1.0)]],
            5.0,
        );
        let labels = solve_labeling(&problem).unwrap();
        assert_eq!(labels, vec![Some(2), None, Some(3)]);
    }

    #[test]
    fn test_deterministic_tie_break_prefers_lowest_label() {
        let problem =
            chain_problem(vec![vec![(1, 1.0), (4, 1.0)]], 1.0);
        let labels = solve_labeling(&problem).unwrap();
        assert_eq!(labels, vec![Some(1)]);
    }

    #[test]
    fn test_energy_not_above_greedy_assignment() {
        let problem = chain_problem(
            vec![
                vec![(0, 1.0), (1, 1.5)],
                vec![(0, 3.0), (1, 1.0)],
                vec![(0, 1.0), (1, 2.5)],
            ],
            2.0,
        );
        let greedy: Vec<Option<usize>> = problem
            .costs
            .iter()
            .map(|c| greedy_label(c))
            .collect();
        let labels = solve_labeling(&problem).unwrap();
        assert!(
            labeling_energy(&problem, &labels)
                <= labeling_energy(&problem, &greedy)
        );
    }

    #[test]
    fn test_rerun_is_identical() {
        let problem = chain_problem(
            vec![
                vec![(0, 1.0), (1, 1.1), (2, 3.0)],
                vec![(1, 0.5), (2, 0.6)],
                vec![(0, 2.0), (2, 0.1)],
                vec![(0, 0.3), (1, 0.4)],
            ],
            0.7,
        );
        let first = solve_labeling(&problem).unwrap();
        let second = solve_labeling(&problem).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_exhausted_sweep_budget_is_an_optimization_error() {
        let mut problem = chain_problem(
            vec![
                vec![(0, 1.0), (1, 2.0)],
                vec![(0, 2.0), (1, 1.0)],
            ],
            10.0,
        );
        problem.sweep_limit = 0;
        let err = solve_labeling(&problem).unwrap_err();
        assert_eq!(err.kind, crate::defs::ErrorKind::Optimization);
    }
}

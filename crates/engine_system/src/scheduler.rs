//! System scheduler: dependency ordering and stage computation.
//!
//! Every pair of Systems whose descriptors conflict gets an ordering edge:
//!
//! - if exactly one of them writes a type the other touches, the writer runs
//!   first;
//! - if both write into each other (including write/write on one type), the
//!   one declared first runs first.
//!
//! The edges are sorted topologically, always picking the lowest declaration
//! index among the ready Systems, so unrelated Systems keep declaration
//! order. A cycle (possible across three or more Systems) is broken by
//! releasing the lowest remaining declaration index and logged.
//!
//! For parallel execution the order is cut into **stages**: a System lands
//! one stage after the latest earlier System it conflicts with. Systems
//! within a stage never conflict; stages run one after another.

use std::collections::BTreeSet;

use engine_component::DescriptorSet;
use tracing::{debug, warn};

/// A registered system with its name and descriptors.
#[derive(Debug, Clone)]
pub struct RegisteredSystem {
    /// The system name (e.g. `"physics"`).
    pub name: String,
    /// The system's data access declaration.
    pub descriptors: DescriptorSet,
}

/// A group of systems that can run in parallel (no conflicts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Indices into the scheduler's system list, ascending.
    pub system_indices: Vec<usize>,
}

/// Result of scheduling one set of systems.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Sequential execution order, as indices into the system list.
    pub order: Vec<usize>,
    /// Parallel execution stages, in execution order.
    pub stages: Vec<Stage>,
}

impl Schedule {
    /// Number of scheduled systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no system is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Build the ordering edges. `successors[i]` lists systems that must run
/// after `i`.
fn dependency_edges(systems: &[RegisteredSystem]) -> Vec<Vec<usize>> {
    let mut successors = vec![Vec::new(); systems.len()];
    for (i, a) in systems.iter().enumerate() {
        for (j, b) in systems.iter().enumerate().skip(i + 1) {
            let a_first = a.descriptors.writes_into(&b.descriptors);
            let b_first = b.descriptors.writes_into(&a.descriptors);
            match (a_first, b_first) {
                (false, false) => {}
                (true, _) => successors[i].push(j),
                (false, true) => successors[j].push(i),
            }
        }
    }
    successors
}

/// Topological order with lowest-index tiebreak.
fn topological_order(systems: &[RegisteredSystem], successors: &[Vec<usize>]) -> Vec<usize> {
    let n = successors.len();
    let mut in_degree = vec![0usize; n];
    for next in successors.iter().flatten() {
        in_degree[*next] += 1;
    }

    let mut remaining: BTreeSet<usize> = (0..n).collect();
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(&first) = remaining.first() {
        let current = match ready.pop_first() {
            Some(current) => current,
            None => {
                warn!(
                    system = %systems[first].name,
                    blocked = remaining.len(),
                    "dependency cycle between systems, releasing lowest declaration index"
                );
                first
            }
        };
        remaining.remove(&current);
        order.push(current);

        for &next in &successors[current] {
            if !remaining.contains(&next) {
                continue;
            }
            in_degree[next] = in_degree[next].saturating_sub(1);
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }
    order
}

/// Cut a sequential order into conflict-free stages.
fn stages_from_order(systems: &[RegisteredSystem], order: &[usize]) -> Vec<Stage> {
    let mut level = vec![0usize; systems.len()];
    let mut stages: Vec<Stage> = Vec::new();

    for (pos, &sys_idx) in order.iter().enumerate() {
        let stage_idx = order[..pos]
            .iter()
            .filter(|&&earlier| {
                systems[earlier]
                    .descriptors
                    .conflicts_with(&systems[sys_idx].descriptors)
            })
            .map(|&earlier| level[earlier] + 1)
            .max()
            .unwrap_or(0);
        level[sys_idx] = stage_idx;

        if stages.len() <= stage_idx {
            stages.resize_with(stage_idx + 1, || Stage {
                system_indices: Vec::new(),
            });
        }
        stages[stage_idx].system_indices.push(sys_idx);
    }

    for stage in &mut stages {
        stage.system_indices.sort_unstable();
    }
    stages
}

/// Computes the execution order and stages of a set of systems.
#[must_use]
pub fn compute_schedule(systems: &[RegisteredSystem]) -> Schedule {
    if systems.is_empty() {
        return Schedule::default();
    }

    let successors = dependency_edges(systems);
    let order = topological_order(systems, &successors);
    let stages = stages_from_order(systems, &order);

    debug!(
        system_count = systems.len(),
        stage_count = stages.len(),
        "computed system schedule"
    );

    Schedule { order, stages }
}

#[cfg(test)]
mod tests {
    use engine_component::{AccessMode, ComponentDescriptor, ComponentTypeId};

    use super::*;

    fn make_system(name: &str, reads: &[u64], writes: &[u64]) -> RegisteredSystem {
        let mut descriptors = DescriptorSet::new();
        for &r in reads {
            descriptors = descriptors.with(ComponentDescriptor {
                type_id: ComponentTypeId(r),
                name: "read",
                access: AccessMode::Read,
                required: true,
            });
        }
        for &w in writes {
            descriptors = descriptors.with(ComponentDescriptor {
                type_id: ComponentTypeId(w),
                name: "write",
                access: AccessMode::ReadWrite,
                required: true,
            });
        }
        RegisteredSystem {
            name: name.to_string(),
            descriptors,
        }
    }

    fn all_pairs_separated(systems: &[RegisteredSystem], schedule: &Schedule) -> bool {
        schedule.stages.iter().all(|stage| {
            stage.system_indices.iter().all(|&a| {
                stage.system_indices.iter().all(|&b| {
                    a == b || !systems[a].descriptors.conflicts_with(&systems[b].descriptors)
                })
            })
        })
    }

    #[test]
    fn test_no_systems_no_stages() {
        let schedule = compute_schedule(&[]);
        assert!(schedule.is_empty());
        assert!(schedule.stages.is_empty());
    }

    #[test]
    fn test_single_system_one_stage() {
        let systems = vec![make_system("physics", &[1], &[2])];
        let schedule = compute_schedule(&systems);
        assert_eq!(schedule.order, vec![0]);
        assert_eq!(schedule.stages.len(), 1);
        assert_eq!(schedule.stages[0].system_indices, vec![0]);
    }

    #[test]
    fn test_non_conflicting_systems_same_stage() {
        // physics: reads Transform(1), writes Velocity(2)
        // ai: reads Transform(1), writes AiState(3)
        let systems = vec![
            make_system("physics", &[1], &[2]),
            make_system("ai", &[1], &[3]),
        ];
        let schedule = compute_schedule(&systems);
        assert_eq!(schedule.order, vec![0, 1], "declaration order tiebreak");
        assert_eq!(
            schedule.stages.len(),
            1,
            "non-conflicting systems should share a stage"
        );
        assert_eq!(schedule.stages[0].system_indices, vec![0, 1]);
    }

    #[test]
    fn test_writer_runs_before_reader() {
        // render reads Transform(1); movement writes it but is declared later.
        let systems = vec![
            make_system("render", &[1], &[]),
            make_system("movement", &[], &[1]),
        ];
        let schedule = compute_schedule(&systems);
        assert_eq!(schedule.order, vec![1, 0]);
        assert_eq!(schedule.stages.len(), 2);
        assert_eq!(schedule.stages[0].system_indices, vec![1]);
    }

    #[test]
    fn test_write_write_uses_declaration_order() {
        let systems = vec![
            make_system("first", &[], &[4]),
            make_system("second", &[], &[4]),
        ];
        let schedule = compute_schedule(&systems);
        assert_eq!(schedule.order, vec![0, 1]);
        assert_eq!(schedule.stages.len(), 2);
    }

    #[test]
    fn test_architecture_example_stages() {
        //   physics  reads Transform(1), writes Velocity(2)
        //   ai       reads Transform(1), writes AiState(3)
        //   movement reads Velocity(2),  writes Transform(1)
        //
        // physics and movement write into each other: declaration order.
        // movement writes Transform, which ai reads: movement before ai.
        let systems = vec![
            make_system("physics", &[1], &[2]),
            make_system("ai", &[1], &[3]),
            make_system("movement", &[2], &[1]),
        ];
        let schedule = compute_schedule(&systems);
        assert_eq!(schedule.order, vec![0, 2, 1]);
        assert_eq!(schedule.stages.len(), 3);
        assert!(all_pairs_separated(&systems, &schedule));
    }

    #[test]
    fn test_independent_branches_share_stages() {
        let systems = vec![
            make_system("a_writer", &[], &[1]),
            make_system("b_writer", &[], &[2]),
            make_system("a_reader", &[1], &[]),
            make_system("b_reader", &[2], &[]),
        ];
        let schedule = compute_schedule(&systems);
        assert_eq!(schedule.order, vec![0, 1, 2, 3]);
        assert_eq!(
            schedule.stages,
            vec![
                Stage {
                    system_indices: vec![0, 1]
                },
                Stage {
                    system_indices: vec![2, 3]
                },
            ]
        );
    }

    #[test]
    fn test_cycle_is_broken_deterministically() {
        // a writes 1 read by b, b writes 2 read by c, c writes 3 read by a.
        let systems = vec![
            make_system("a", &[3], &[1]),
            make_system("b", &[1], &[2]),
            make_system("c", &[2], &[3]),
        ];
        let first = compute_schedule(&systems);
        let second = compute_schedule(&systems);
        assert_eq!(first, second);
        assert_eq!(first.order, vec![0, 1, 2]);
        assert!(all_pairs_separated(&systems, &first));
    }

    #[test]
    fn test_readers_never_conflict() {
        let systems: Vec<_> = (0..5)
            .map(|i| make_system(&format!("reader{i}"), &[1, 2], &[]))
            .collect();
        let schedule = compute_schedule(&systems);
        assert_eq!(schedule.stages.len(), 1);
        assert_eq!(schedule.stages[0].system_indices.len(), 5);
    }
}

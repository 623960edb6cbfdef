//! Synthetic scenario generator.
//!
//! Builds seeded multi-group networks: each group is a ring with random
//! chords, neighboring groups are joined by a few bridge links, and every
//! task is marked for initial assignment so the kernel distributes it.

use std::collections::HashSet;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use hgtm_kernel::{AgentId, AgentSpec, EdgeSpec, Scenario, Task};

/// Configuration for generating scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of groups.
    pub groups: usize,
    /// Agents in each group.
    pub agents_per_group: usize,
    /// Number of tasks in the scenario.
    pub tasks: usize,
    /// Agent capacity range (min, max).
    pub capacity_range: (f64, f64),
    /// Task size range (min, max).
    pub task_size_range: (f64, f64),
    /// Edge weight range (min, max).
    pub weight_range: (f64, f64),
    /// Probability of a chord between two non-adjacent ring members.
    pub chord_probability: f64,
    /// Links between each pair of neighboring groups.
    pub bridges: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            groups: 3,
            agents_per_group: 6,
            tasks: 60,
            capacity_range: (20.0, 60.0),
            task_size_range: (1.0, 8.0),
            weight_range: (1.0, 5.0),
            chord_probability: 0.2,
            bridges: 2,
        }
    }
}

/// Preset scenario sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioSize {
    Small,
    Medium,
    Large,
}

impl ScenarioSize {
    pub fn config(&self) -> GeneratorConfig {
        match self {
            Self::Small => GeneratorConfig::small(),
            Self::Medium => GeneratorConfig::default(),
            Self::Large => GeneratorConfig::large(),
        }
    }
}

impl GeneratorConfig {
    /// Two groups of four, light load.
    pub fn small() -> Self {
        Self {
            groups: 2,
            agents_per_group: 4,
            tasks: 20,
            ..Self::default()
        }
    }

    /// Six groups of ten, dense chords and heavier tasks.
    pub fn large() -> Self {
        Self {
            groups: 6,
            agents_per_group: 10,
            tasks: 300,
            task_size_range: (1.0, 12.0),
            chord_probability: 0.3,
            bridges: 3,
            ..Self::default()
        }
    }

    pub fn agent_count(&self) -> usize {
        self.groups * self.agents_per_group
    }
}

/// Generator for scenarios.
pub struct ScenarioGenerator {
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    edges: Vec<EdgeSpec>,
    linked: HashSet<(AgentId, AgentId)>,
}

impl ScenarioGenerator {
    /// Create a new generator with the given config and seed.
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            edges: Vec::new(),
            linked: HashSet::new(),
        }
    }

    /// Generate a scenario.
    pub fn generate(&mut self) -> Scenario {
        self.edges.clear();
        self.linked.clear();

        let agents = self.generate_agents();
        let members: Vec<Vec<AgentId>> = (0..self.config.groups)
            .map(|g| {
                agents
                    .iter()
                    .filter(|a| a.group as usize == g)
                    .map(|a| a.id)
                    .collect()
            })
            .collect();

        for group in &members {
            self.link_group(group);
        }
        self.link_groups(&members);

        let tasks = self.generate_tasks();
        Scenario {
            tasks,
            agents,
            edges: std::mem::take(&mut self.edges),
        }
    }

    fn generate_agents(&mut self) -> Vec<AgentSpec> {
        let (lo, hi) = self.config.capacity_range;
        let mut agents = Vec::with_capacity(self.config.agent_count());
        for group in 0..self.config.groups {
            for _ in 0..self.config.agents_per_group {
                let id = agents.len() as AgentId;
                let capacity = self.random_in(lo, hi).round();
                agents.push(AgentSpec::new(id, capacity, group as u32));
            }
        }
        agents
    }

    fn generate_tasks(&mut self) -> Vec<Task> {
        let (lo, hi) = self.config.task_size_range;
        (0..self.config.tasks)
            .map(|id| {
                // one decimal keeps the JSON readable
                let size = (self.random_in(lo, hi) * 10.0).round() / 10.0;
                Task::pre_assigned(id as u32, size.max(0.1))
            })
            .collect()
    }

    /// Ring over the members plus random chords.
    fn link_group(&mut self, members: &[AgentId]) {
        let n = members.len();
        if n < 2 {
            return;
        }
        for i in 0..n {
            self.link(members[i], members[(i + 1) % n]);
        }
        for i in 0..n {
            for j in i + 2..n {
                if (i == 0 && j == n - 1) || !self.rng.random_bool(self.config.chord_probability) {
                    continue;
                }
                self.link(members[i], members[j]);
            }
        }
    }

    /// Bridges between consecutive groups, closing the cycle for three or more.
    fn link_groups(&mut self, members: &[Vec<AgentId>]) {
        let count = members.len();
        if count < 2 {
            return;
        }
        let pairs = if count == 2 { 1 } else { count };
        for g in 0..pairs {
            let (left, right) = (&members[g], &members[(g + 1) % count]);
            if left.is_empty() || right.is_empty() {
                continue;
            }
            for _ in 0..self.config.bridges {
                let from = left[self.rng.random_range(0..left.len())];
                let to = right[self.rng.random_range(0..right.len())];
                self.link(from, to);
            }
        }
    }

    fn link(&mut self, a: AgentId, b: AgentId) {
        let key = (a.min(b), a.max(b));
        if a == b || !self.linked.insert(key) {
            return;
        }
        let (lo, hi) = self.config.weight_range;
        let weight = self.random_in(lo, hi).round().max(1.0);
        self.edges.push(EdgeSpec {
            from: a,
            to: b,
            weight,
        });
    }

    fn random_in(&mut self, lo: f64, hi: f64) -> f64 {
        if hi > lo {
            self.rng.random_range(lo..=hi)
        } else {
            lo
        }
    }
}

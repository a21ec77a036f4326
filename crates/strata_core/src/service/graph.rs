//! In-memory taxonomy graph snapshot.
//!
//! # Responsibility
//! - Mirror taxon inherits/references arcs as an arena with index edges.
//! - Answer cycle and lineage questions without touching the layer.
//!
//! # Invariants
//! - Each taxon name maps to exactly one arena slot.
//! - Arc targets that are not defined yet get placeholder slots.
//! - Outgoing edges keep composition strength order.

use crate::model::node::{ArcKind, NodePath};
use crate::model::taxon::TAXONOMY_NODE;
use crate::repo::layer_repo::{LayerRepoResult, LayerRepository};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Arc kinds forming taxonomy structure.
pub const STRUCTURAL_ARCS: [ArcKind; 2] = [ArcKind::Inherits, ArcKind::References];

/// One outgoing edge in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    pub kind: ArcKind,
    pub target: usize,
}

#[derive(Debug, Clone)]
struct GraphNode {
    name: String,
    defined: bool,
    outgoing: Vec<GraphEdge>,
    incoming: Vec<usize>,
}

/// Arena snapshot of one document's taxonomy.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
}

impl TaxonomyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from the taxa stored under `/Taxonomy`.
    pub fn load(repo: &impl LayerRepository) -> LayerRepoResult<Self> {
        let mut graph = Self::new();
        let Some(taxonomy) = NodePath::root_child(TAXONOMY_NODE) else {
            return Ok(graph);
        };
        let taxa = repo.list_children(Some(&taxonomy))?;
        for taxon in &taxa {
            graph.define(taxon.path.name());
        }
        for taxon in &taxa {
            let source = graph.define(taxon.path.name());
            for kind in STRUCTURAL_ARCS {
                for arc in repo.list_arcs(&taxon.path, kind)? {
                    if !arc.is_internal() || arc.target_path.parent().as_ref() != Some(&taxonomy) {
                        continue;
                    }
                    graph.add_edge(source, kind, arc.target_path.name());
                }
            }
        }
        Ok(graph)
    }

    /// Marks `name` as a defined taxon, returning its slot.
    pub fn define(&mut self, name: &str) -> usize {
        let slot = self.slot(name);
        self.nodes[slot].defined = true;
        slot
    }

    /// Adds one edge from `source` to `target`, creating a placeholder when needed.
    pub fn add_edge(&mut self, source: usize, kind: ArcKind, target: &str) -> usize {
        let target = self.slot(target);
        let edge = GraphEdge { kind, target };
        if !self.nodes[source].outgoing.contains(&edge) {
            self.nodes[source].outgoing.push(edge);
            self.nodes[target].incoming.push(source);
        }
        target
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Whether `name` is a defined taxon, not just an arc target.
    pub fn is_defined(&self, name: &str) -> bool {
        self.position(name)
            .is_some_and(|slot| self.nodes[slot].defined)
    }

    /// Defined taxon names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names = self
            .nodes
            .iter()
            .filter(|node| node.defined)
            .map(|node| node.name.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Names referenced by arcs but never defined.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = self
            .nodes
            .iter()
            .filter(|node| !node.defined)
            .map(|node| node.name.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Outgoing edges of `name` in strength order.
    pub fn edges(&self, name: &str) -> Vec<(ArcKind, &str)> {
        self.position(name)
            .map(|slot| {
                self.nodes[slot]
                    .outgoing
                    .iter()
                    .map(|edge| (edge.kind, self.nodes[edge.target].name.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the first target whose arc from `name` would close a cycle.
    pub fn would_cycle<'a>(&self, name: &str, targets: &[&'a str]) -> Option<&'a str> {
        targets.iter().copied().find(|target| {
            if *target == name {
                return true;
            }
            match (self.position(target), self.position(name)) {
                (Some(from), Some(to)) => self.reaches(from, to),
                _ => false,
            }
        })
    }

    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut visited = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            for edge in &self.nodes[current].outgoing {
                if visited.insert(edge.target) {
                    queue.push_back(edge.target);
                }
            }
        }
        false
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(slot) = self.index.get(name) {
            return *slot;
        }
        let slot = self.nodes.len();
        self.nodes.push(GraphNode {
            name: name.to_string(),
            defined: false,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        });
        self.index.insert(name.to_string(), slot);
        slot
    }

    fn neighbors(&self, slot: usize, direction: Direction) -> Vec<usize> {
        match direction {
            Direction::Ancestors => self.nodes[slot]
                .outgoing
                .iter()
                .map(|edge| edge.target)
                .collect(),
            Direction::Descendants => self.nodes[slot].incoming.clone(),
        }
    }
}

/// Traversal direction of a lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow arcs from a taxon to the taxa it inherits or references.
    Ancestors,
    /// Follow arcs backwards to the taxa built on a taxon.
    Descendants,
}

/// Lazy breadth-first walk over one graph snapshot.
///
/// Each taxon is yielded once. Clone before iterating, or call
/// [`Lineage::restarted`], to walk again.
#[derive(Debug, Clone)]
pub struct Lineage {
    graph: Arc<TaxonomyGraph>,
    direction: Direction,
    start: usize,
    queue: VecDeque<usize>,
    visited: HashSet<usize>,
}

impl Lineage {
    /// Starts a walk from `name`, or `None` when the graph does not know it.
    pub fn new(graph: Arc<TaxonomyGraph>, name: &str, direction: Direction) -> Option<Self> {
        let start = graph.position(name)?;
        Some(Self::from_slot(graph, start, direction))
    }

    /// Fresh walk from the same start.
    pub fn restarted(&self) -> Self {
        Self::from_slot(Arc::clone(&self.graph), self.start, self.direction)
    }

    fn from_slot(graph: Arc<TaxonomyGraph>, start: usize, direction: Direction) -> Self {
        Self {
            graph,
            direction,
            start,
            queue: VecDeque::from([start]),
            visited: HashSet::from([start]),
        }
    }
}

impl Iterator for Lineage {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current = self.queue.pop_front()?;
            for neighbor in self.graph.neighbors(current, self.direction) {
                if self.visited.insert(neighbor) {
                    self.queue.push_back(neighbor);
                }
            }
            if current != self.start {
                return Some(self.graph.nodes[current].name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, Lineage, TaxonomyGraph};
    use crate::model::node::ArcKind;
    use std::sync::Arc;

    fn diamond() -> TaxonomyGraph {
        let mut graph = TaxonomyGraph::new();
        for name in ["Asset", "Character", "Prop", "Hero"] {
            graph.define(name);
        }
        let character = graph.define("Character");
        graph.add_edge(character, ArcKind::Inherits, "Asset");
        let prop = graph.define("Prop");
        graph.add_edge(prop, ArcKind::Inherits, "Asset");
        let hero = graph.define("Hero");
        graph.add_edge(hero, ArcKind::Inherits, "Character");
        graph.add_edge(hero, ArcKind::References, "Prop");
        graph
    }

    #[test]
    fn ancestors_are_breadth_first_and_deduplicated() {
        let graph = Arc::new(diamond());
        let ancestors = Lineage::new(graph, "Hero", Direction::Ancestors)
            .unwrap()
            .collect::<Vec<_>>();
        assert_eq!(ancestors, vec!["Character", "Prop", "Asset"]);
    }

    #[test]
    fn descendants_follow_arcs_backwards() {
        let graph = Arc::new(diamond());
        let mut descendants = Lineage::new(graph, "Asset", Direction::Descendants)
            .unwrap()
            .collect::<Vec<_>>();
        descendants.sort();
        assert_eq!(descendants, vec!["Character", "Hero", "Prop"]);
    }

    #[test]
    fn lineage_can_be_restarted() {
        let graph = Arc::new(diamond());
        let mut lineage = Lineage::new(graph, "Hero", Direction::Ancestors).unwrap();
        let first = lineage.next();
        let again = lineage.restarted().next();
        assert_eq!(first, again);
        assert_eq!(lineage.count(), 2);
    }

    #[test]
    fn cycle_detection_sees_direct_and_transitive_arcs() {
        let graph = diamond();
        assert_eq!(graph.would_cycle("Asset", &["Hero"]), Some("Hero"));
        assert_eq!(graph.would_cycle("Asset", &["Asset"]), Some("Asset"));
        assert_eq!(graph.would_cycle("Hero", &["Asset"]), None);
        assert_eq!(graph.would_cycle("New", &["Hero"]), None);
    }

    #[test]
    fn undefined_targets_become_placeholders() {
        let mut graph = TaxonomyGraph::new();
        let vehicle = graph.define("Vehicle");
        graph.add_edge(vehicle, ArcKind::Inherits, "Machine");
        assert!(!graph.is_defined("Machine"));
        assert_eq!(graph.names(), vec!["Vehicle"]);
        assert_eq!(graph.placeholders(), vec!["Machine"]);

        graph.define("Machine");
        assert!(graph.is_defined("Machine"));
    }
}

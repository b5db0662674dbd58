//! Undirected conflict graph over transaction ids

use crate::error::{SchedulerError, SchedulerResult};
use apex_types::{AccessedBy, RWSet, TxId};
use std::collections::{BTreeMap, BTreeSet};

/// Conflict graph for one batch
///
/// Vertices are transaction ids; an edge joins two transactions that touch
/// a common key where at least one access is a write. Adjacency is kept in
/// ordered sets so traversal order, and with it every tie-break, is fixed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConflictGraph {
    adjacency: BTreeMap<TxId, BTreeSet<TxId>>,
}

impl ConflictGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph with the given vertices and no edges
    pub fn with_vertices(vertices: impl IntoIterator<Item = TxId>) -> Self {
        Self {
            adjacency: vertices.into_iter().map(|v| (v, BTreeSet::new())).collect(),
        }
    }

    /// Build from the reverse access index
    ///
    /// For every written key, writers are joined pairwise and every reader
    /// is joined to every writer other than itself. Cost is proportional
    /// to the conflicting accesses, not to the square of the batch size.
    pub fn from_accessed_by(
        index: &AccessedBy,
        vertices: impl IntoIterator<Item = TxId>,
    ) -> SchedulerResult<Self> {
        let mut graph = Self::with_vertices(vertices);

        for key in index.written_keys() {
            let writers: Vec<TxId> = index.writers(key).collect();
            for (i, &a) in writers.iter().enumerate() {
                for &b in &writers[i + 1..] {
                    graph.try_add_edge(a, b)?;
                }
            }
            for reader in index.readers(key) {
                for &writer in &writers {
                    if reader != writer {
                        graph.try_add_edge(reader, writer)?;
                    }
                }
            }
        }

        Ok(graph)
    }

    /// Build by comparing every pair of footprints
    ///
    /// Quadratic reference construction; yields the same edges as
    /// [`ConflictGraph::from_accessed_by`].
    pub fn from_rw_sets(entries: &[(TxId, RWSet)]) -> Self {
        let mut graph = Self::with_vertices(entries.iter().map(|(tid, _)| *tid));
        for (i, (a, rw_a)) in entries.iter().enumerate() {
            for (b, rw_b) in &entries[i + 1..] {
                if rw_a.has_conflict(rw_b) {
                    graph.add_edge(*a, *b);
                }
            }
        }
        graph
    }

    /// Add an isolated vertex
    pub fn add_vertex(&mut self, v: TxId) {
        self.adjacency.entry(v).or_default();
    }

    /// Whether the vertex is present
    pub fn contains(&self, v: TxId) -> bool {
        self.adjacency.contains_key(&v)
    }

    /// Add an undirected edge, creating missing endpoints
    ///
    /// Returns false for self-loops and edges already present.
    pub fn add_edge(&mut self, a: TxId, b: TxId) -> bool {
        if a == b {
            return false;
        }
        let inserted = self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
        inserted
    }

    fn try_add_edge(&mut self, a: TxId, b: TxId) -> SchedulerResult<bool> {
        for v in [a, b] {
            if !self.contains(v) {
                return Err(SchedulerError::TxNotFound(v));
            }
        }
        Ok(self.add_edge(a, b))
    }

    /// Whether `a` and `b` are adjacent
    pub fn has_edge(&self, a: TxId, b: TxId) -> bool {
        self.adjacency
            .get(&a)
            .map(|ns| ns.contains(&b))
            .unwrap_or(false)
    }

    /// Remove a vertex and its edges, returning its former neighbors
    pub fn remove_vertex(&mut self, v: TxId) -> BTreeSet<TxId> {
        let neighbors = self.adjacency.remove(&v).unwrap_or_default();
        for n in &neighbors {
            if let Some(ns) = self.adjacency.get_mut(n) {
                ns.remove(&v);
            }
        }
        neighbors
    }

    /// Remove every vertex in `vertices`
    pub fn remove_vertices<'a>(&mut self, vertices: impl IntoIterator<Item = &'a TxId>) {
        for v in vertices {
            self.remove_vertex(*v);
        }
    }

    /// Number of neighbors, `None` if the vertex is absent
    pub fn degree(&self, v: TxId) -> Option<usize> {
        self.adjacency.get(&v).map(|ns| ns.len())
    }

    /// Neighbors in ascending order
    pub fn neighbors(&self, v: TxId) -> Option<&BTreeSet<TxId>> {
        self.adjacency.get(&v)
    }

    /// Vertices in ascending order
    pub fn vertices(&self) -> impl Iterator<Item = TxId> + '_ {
        self.adjacency.keys().copied()
    }

    /// Number of vertices
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Check if graph has no vertices
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|ns| ns.len()).sum::<usize>() / 2
    }

    /// Every edge once, as `(low, high)`, in ascending order
    pub fn edges(&self) -> Vec<(TxId, TxId)> {
        self.adjacency
            .iter()
            .flat_map(|(&a, ns)| ns.range(a..).map(move |&b| (a, b)))
            .filter(|(a, b)| a != b)
            .collect()
    }

    /// Connected components
    ///
    /// Members of each component are ascending and components are ordered
    /// by their smallest member.
    pub fn connected_components(&self) -> Vec<Vec<TxId>> {
        let mut seen: BTreeSet<TxId> = BTreeSet::new();
        let mut components = Vec::new();

        for start in self.vertices() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = vec![start];
            let mut stack = vec![start];
            while let Some(v) = stack.pop() {
                for &n in self.adjacency.get(&v).into_iter().flatten() {
                    if seen.insert(n) {
                        component.push(n);
                        stack.push(n);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }

        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_primitives::Address;
    use apex_types::AccessKey;

    fn key(id: u64) -> AccessKey {
        AccessKey::balance(Address::from_low_u64(id))
    }

    fn tx(reads: &[u64], writes: &[u64]) -> RWSet {
        let mut rw = RWSet::new();
        for r in reads {
            rw.record_read(key(*r));
        }
        for w in writes {
            rw.record_write(key(*w));
        }
        rw
    }

    fn build(entries: &[(TxId, RWSet)]) -> ConflictGraph {
        let index = AccessedBy::build(entries.iter().map(|(t, rw)| (*t, rw)));
        ConflictGraph::from_accessed_by(&index, entries.iter().map(|(t, _)| *t)).unwrap()
    }

    // ==================== Construction ====================

    #[test]
    fn test_empty_graph() {
        let graph = ConflictGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.connected_components().is_empty());
    }

    #[test]
    fn test_write_write_edge() {
        let entries = vec![(TxId(0), tx(&[], &[1])), (TxId(1), tx(&[], &[1]))];
        let graph = build(&entries);
        assert!(graph.has_edge(TxId(0), TxId(1)));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_read_write_edge_excludes_self() {
        // tx0 reads and writes key 1, nobody else touches it
        let entries = vec![(TxId(0), tx(&[1], &[1])), (TxId(1), tx(&[2], &[]))];
        let graph = build(&entries);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.degree(TxId(0)), Some(0));
    }

    #[test]
    fn test_readers_only_do_not_conflict() {
        let entries = vec![(TxId(0), tx(&[1], &[])), (TxId(1), tx(&[1], &[]))];
        assert_eq!(build(&entries).edge_count(), 0);
    }

    #[test]
    fn test_index_and_pairwise_agree() {
        let entries = vec![
            (TxId(0), tx(&[1], &[2])),
            (TxId(1), tx(&[2], &[3])),
            (TxId(2), tx(&[4], &[4])),
            (TxId(3), tx(&[3, 4], &[])),
            (TxId(4), tx(&[], &[1])),
        ];
        let from_index = build(&entries);
        let pairwise = ConflictGraph::from_rw_sets(&entries);
        assert_eq!(from_index.edges(), pairwise.edges());
        assert_eq!(from_index, pairwise);
    }

    #[test]
    fn test_unknown_vertex_is_rejected() {
        let rw = tx(&[], &[1]);
        let other = tx(&[1], &[]);
        let index = AccessedBy::build([(TxId(0), &rw), (TxId(7), &other)]);
        let err = ConflictGraph::from_accessed_by(&index, [TxId(0)]).unwrap_err();
        assert!(matches!(err, SchedulerError::TxNotFound(TxId(7))));
    }

    // ==================== Mutation ====================

    #[test]
    fn test_add_and_remove() {
        let mut graph = ConflictGraph::with_vertices((0..4u32).map(TxId));
        assert!(graph.add_edge(TxId(0), TxId(1)));
        assert!(!graph.add_edge(TxId(1), TxId(0)));
        assert!(!graph.add_edge(TxId(2), TxId(2)));
        graph.add_edge(TxId(1), TxId(2));

        assert_eq!(graph.degree(TxId(1)), Some(2));
        let neighbors = graph.remove_vertex(TxId(1));
        assert_eq!(neighbors.into_iter().collect::<Vec<_>>(), vec![TxId(0), TxId(2)]);
        assert_eq!(graph.degree(TxId(0)), Some(0));
        assert_eq!(graph.degree(TxId(1)), None);
        assert_eq!(graph.len(), 3);
    }

    // ==================== Components ====================

    #[test]
    fn test_connected_components() {
        let mut graph = ConflictGraph::with_vertices((0..6u32).map(TxId));
        graph.add_edge(TxId(0), TxId(3));
        graph.add_edge(TxId(3), TxId(5));
        graph.add_edge(TxId(1), TxId(4));

        let components = graph.connected_components();
        assert_eq!(
            components,
            vec![
                vec![TxId(0), TxId(3), TxId(5)],
                vec![TxId(1), TxId(4)],
                vec![TxId(2)],
            ]
        );
    }
}

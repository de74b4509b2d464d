use std::collections::HashMap;

use tracing::debug;

use crate::machine::FiberMachine;

/// Disjoint-set forest over cell indices with path compression.
///
/// Union attaches the second root under the first; there is no rank or size
/// balancing.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    /// `n` singleton sets `{0}, {1}, ..., {n-1}`.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of `x`'s set. Every node visited on the way is re-pointed at the root.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// All sets, each sorted ascending, ordered by their smallest member.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..self.len() {
            let root = self.find(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(i);
        }
        groups
    }
}

/// Which cells' executions are chained together by writes over one sweep.
///
/// Works on a clone of the machine: the clone steps `size` times, and before
/// each step the executing cell is joined with the cell it is about to write.
/// Only groups of two or more cells are reported. The live machine is never
/// touched, so repeated calls without stepping it give the same answer.
pub fn analyze_single_sweep(machine: &FiberMachine) -> Vec<Vec<usize>> {
    let mut snapshot = machine.clone();
    let size = snapshot.size();
    let mut uf = UnionFind::new(size);

    for _ in 0..size {
        let src = snapshot.cursor();
        if let Some(affected) = snapshot.written_address() {
            uf.union(src, affected);
        }
        snapshot.step();
    }

    let groups: Vec<Vec<usize>> = uf.groups().into_iter().filter(|g| g.len() > 1).collect();
    debug!(size, groups = groups.len(), "connectivity sweep");
    groups
}

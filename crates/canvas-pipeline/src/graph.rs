use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

/// A node in a [`DependencyGraph`]. `Ord` makes topological orders deterministic.
pub trait GraphNode: Copy + Eq + Hash + Ord + fmt::Debug {}

impl<T: Copy + Eq + Hash + Ord + fmt::Debug> GraphNode for T {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<N> {
    pub path: Vec<N>,
}

impl<N: fmt::Debug> fmt::Display for CycleError<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency cycle: ")?;
        for (idx, node) in self.path.iter().enumerate() {
            if idx > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{node:?}")?;
        }
        Ok(())
    }
}

impl<N: fmt::Debug> std::error::Error for CycleError<N> {}

/// Precedent/dependent edges between pipeline nodes plus a dirty set.
///
/// Nodes without precedents are inputs. Marking an input dirty marks every transitive dependent;
/// [`calc_order_for_dirty`](Self::calc_order_for_dirty) then yields the dirty nodes in an order
/// where each node follows all of its precedents.
#[derive(Debug, Clone)]
pub struct DependencyGraph<N> {
    precedents: HashMap<N, Vec<N>>,
    dependents: HashMap<N, BTreeSet<N>>,
    dirty: HashSet<N>,
    calc_chain: Vec<N>,
    calc_chain_valid: bool,
}

impl<N: GraphNode> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self {
            precedents: HashMap::new(),
            dependents: HashMap::new(),
            dirty: HashSet::new(),
            calc_chain: Vec::new(),
            calc_chain_valid: false,
        }
    }
}

impl<N: GraphNode> DependencyGraph<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the precedents of `node`.
    pub fn update_dependencies(&mut self, node: N, precedents: impl IntoIterator<Item = N>) {
        if let Some(old) = self.precedents.remove(&node) {
            for p in old {
                if let Some(deps) = self.dependents.get_mut(&p) {
                    deps.remove(&node);
                }
            }
        }

        let mut list: Vec<N> = precedents.into_iter().collect();
        list.sort();
        list.dedup();
        for &p in &list {
            self.dependents.entry(p).or_default().insert(node);
        }
        self.precedents.insert(node, list);
        self.calc_chain_valid = false;
    }

    pub fn precedents_of(&self, node: N) -> Vec<N> {
        self.precedents.get(&node).cloned().unwrap_or_default()
    }

    pub fn dependents_of(&self, node: N) -> Vec<N> {
        self.dependents
            .get(&node)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    fn is_derived(&self, node: N) -> bool {
        self.precedents.contains_key(&node)
    }

    /// Every node that appears in the graph, as a precedent or as a derived node.
    fn nodes(&self) -> BTreeSet<N> {
        let mut nodes: BTreeSet<N> = self.precedents.keys().copied().collect();
        nodes.extend(self.dependents.keys().copied());
        nodes
    }

    /// Mark `node` and all of its transitive dependents dirty.
    ///
    /// Inputs (nodes without precedents) are not added to the dirty set themselves.
    pub fn mark_dirty(&mut self, node: N) {
        let mut queue = VecDeque::new();
        let mut seen = HashSet::new();
        queue.push_back(node);
        seen.insert(node);

        while let Some(cur) = queue.pop_front() {
            if self.is_derived(cur) && !self.dirty.insert(cur) {
                continue;
            }
            if let Some(deps) = self.dependents.get(&cur) {
                for &dep in deps {
                    if seen.insert(dep) {
                        queue.push_back(dep);
                    }
                }
            }
        }
    }

    pub fn mark_all_dirty(&mut self) {
        let derived: Vec<N> = self.precedents.keys().copied().collect();
        self.dirty.extend(derived);
    }

    pub fn dirty_nodes(&self) -> Vec<N> {
        let mut out: Vec<N> = self.dirty.iter().copied().collect();
        out.sort();
        out
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// The dirty nodes in topological order.
    pub fn calc_order_for_dirty(&mut self) -> Result<Vec<N>, CycleError<N>> {
        self.rebuild_calc_chain()?;
        Ok(self
            .calc_chain
            .iter()
            .copied()
            .filter(|n| self.dirty.contains(n))
            .collect())
    }

    fn rebuild_calc_chain(&mut self) -> Result<(), CycleError<N>> {
        if self.calc_chain_valid {
            return Ok(());
        }

        let nodes = self.nodes();
        let mut in_degree: HashMap<N, usize> = nodes
            .iter()
            .map(|&n| (n, self.precedents.get(&n).map_or(0, Vec::len)))
            .collect();

        let mut ready: BTreeSet<N> = in_degree
            .iter()
            .filter_map(|(&n, &d)| (d == 0).then_some(n))
            .collect();

        let mut chain = Vec::with_capacity(nodes.len());
        while let Some(node) = ready.pop_first() {
            chain.push(node);
            if let Some(deps) = self.dependents.get(&node) {
                for dep in deps {
                    if let Some(deg) = in_degree.get_mut(dep) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            ready.insert(*dep);
                        }
                    }
                }
            }
        }

        if chain.len() != nodes.len() {
            let remaining: HashSet<N> = in_degree
                .into_iter()
                .filter_map(|(n, d)| (d > 0).then_some(n))
                .collect();
            return Err(CycleError {
                path: self.find_cycle(&remaining).unwrap_or_default(),
            });
        }

        self.calc_chain = chain;
        self.calc_chain_valid = true;
        Ok(())
    }

    fn find_cycle(&self, remaining: &HashSet<N>) -> Option<Vec<N>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        struct Frame<N> {
            node: N,
            neighbors: Vec<N>,
            idx: usize,
        }

        let neighbors = |node: N| -> Vec<N> {
            self.dependents
                .get(&node)
                .map(|deps| deps.iter().copied().filter(|d| remaining.contains(d)).collect())
                .unwrap_or_default()
        };

        let mut color: HashMap<N, Color> = remaining.iter().map(|&n| (n, Color::White)).collect();
        let mut starts: Vec<N> = remaining.iter().copied().collect();
        starts.sort();

        for start in starts {
            if color.get(&start) != Some(&Color::White) {
                continue;
            }

            let mut stack = vec![start];
            let mut frames = vec![Frame {
                node: start,
                neighbors: neighbors(start),
                idx: 0,
            }];
            color.insert(start, Color::Gray);

            while let Some(frame) = frames.last_mut() {
                if frame.idx >= frame.neighbors.len() {
                    color.insert(frame.node, Color::Black);
                    stack.pop();
                    frames.pop();
                    continue;
                }

                let next = frame.neighbors[frame.idx];
                frame.idx += 1;

                match color.get(&next).copied().unwrap_or(Color::Black) {
                    Color::White => {
                        color.insert(next, Color::Gray);
                        stack.push(next);
                        frames.push(Frame {
                            node: next,
                            neighbors: neighbors(next),
                            idx: 0,
                        });
                    }
                    Color::Gray => {
                        let start_idx = stack.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle = stack[start_idx..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            }
        }
        None
    }
}

use indexmap::IndexMap;

use crate::dominators::{Dominators, Graph};

/// One natural loop: a header plus every block that can reach one of the
/// header's back-edge sources without going through the header. The header
/// itself is part of the body.
#[derive(Debug)]
pub struct NaturalLoop<G: Graph> {
    body: Vec<G::Node>,
    header: G::Node,
    outer_loop_index: usize,
    index: usize,
}

impl<G: Graph> NaturalLoop<G> {
    pub fn header(&self) -> G::Node {
        self.header
    }

    pub fn body(&self) -> &[G::Node] {
        &self.body
    }

    pub fn num_blocks(&self) -> usize {
        self.body.len()
    }

    pub fn contains(&self, block: G::Node) -> bool {
        self.body.contains(&block)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_outer_most_loop(&self) -> bool {
        self.outer_loop_index == usize::MAX
    }
}

/// The classic dominator-based natural loop forest: every edge A -> B where B
/// dominates A makes B a loop header, and a backwards search from the
/// back-edge sources collects each loop's body.
#[derive(Debug)]
pub struct NaturalLoops<G: Graph> {
    loops: Vec<NaturalLoop<G>>,
    inner_most_loop_index: IndexMap<G::Node, usize>,
}

impl<G: Graph> NaturalLoops<G> {
    pub fn new(graph: &G, dominators: &Dominators<G>) -> Self {
        let mut loops: Vec<NaturalLoop<G>> = Vec::new();

        // Find the back edges; group back-edge sources by header.
        for index in 0..graph.num_nodes() {
            let header = match graph.node(index) {
                Some(header) => header,
                None => continue,
            };

            for footer in graph.predecessors(header).iter().copied() {
                if !dominators.dominates(header, footer) {
                    continue;
                }

                if let Some(existing) = loops.iter_mut().find(|l| l.header == header) {
                    existing.body.push(footer);
                } else {
                    loops.push(NaturalLoop {
                        body: vec![footer],
                        header,
                        outer_loop_index: usize::MAX,
                        index: loops.len(),
                    });
                }
            }
        }

        // Grow each body backwards from the back-edge sources, stopping at
        // the header.
        for l in loops.iter_mut() {
            let mut worklist = l.body.clone();

            while let Some(block) = worklist.pop() {
                if block == l.header {
                    continue;
                }

                for predecessor in graph.predecessors(block).iter().copied() {
                    if l.body.contains(&predecessor) {
                        continue;
                    }

                    l.body.push(predecessor);
                    worklist.push(predecessor);
                }
            }

            if !l.body.contains(&l.header) {
                l.body.push(l.header);
            }
        }

        // For each block, remember the smallest loop containing it; nesting
        // means strict containment, so body size orders inner before outer.
        let mut inner_most_loop_index: IndexMap<G::Node, usize> = IndexMap::new();

        for (loop_index, l) in loops.iter().enumerate() {
            for &block in &l.body {
                match inner_most_loop_index.get(&block) {
                    Some(&current) if loops[current].body.len() <= l.body.len() => {}
                    _ => {
                        inner_most_loop_index.insert(block, loop_index);
                    }
                }
            }
        }

        // Parent of a loop: the smallest strictly larger loop containing its
        // header.
        let mut outer_indices = vec![usize::MAX; loops.len()];

        for (i, l) in loops.iter().enumerate() {
            for (j, candidate) in loops.iter().enumerate() {
                if i == j || candidate.body.len() <= l.body.len() {
                    continue;
                }

                if !candidate.contains(l.header) {
                    continue;
                }

                if outer_indices[i] == usize::MAX
                    || candidate.body.len() < loops[outer_indices[i]].body.len()
                {
                    outer_indices[i] = j;
                }
            }
        }

        for (l, outer) in loops.iter_mut().zip(outer_indices) {
            l.outer_loop_index = outer;
        }

        Self {
            loops,
            inner_most_loop_index,
        }
    }

    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    pub fn loop_at(&self, index: usize) -> &NaturalLoop<G> {
        &self.loops[index]
    }

    pub fn inner_most_loop_of(&self, block: G::Node) -> Option<&NaturalLoop<G>> {
        self.inner_most_loop_index
            .get(&block)
            .map(|&index| &self.loops[index])
    }

    pub fn inner_most_outer_loop_of(&self, l: &NaturalLoop<G>) -> Option<&NaturalLoop<G>> {
        if l.outer_loop_index == usize::MAX {
            None
        } else {
            Some(&self.loops[l.outer_loop_index])
        }
    }

    /// The loop headed by `block`, if any. Headers are unique: all back edges
    /// into the same block form one loop.
    pub fn header_of(&self, block: G::Node) -> Option<&NaturalLoop<G>> {
        match self.inner_most_loop_of(block) {
            Some(l) if l.header == block => Some(l),
            _ => None,
        }
    }

    /// True if `to` is a loop header whose loop contains `from`.
    pub fn is_back_edge(&self, from: G::Node, to: G::Node) -> bool {
        match self.header_of(to) {
            Some(l) => l.contains(from),
            None => false,
        }
    }

    pub fn loop_depth(&self, block: G::Node) -> usize {
        let mut depth = 0;
        let mut l = self.inner_most_loop_of(block);

        while let Some(current) = l {
            depth += 1;
            l = self.inner_most_outer_loop_of(current);
        }

        depth
    }

    /// Loop indices ordered so every loop appears before the loops that
    /// enclose it. Frequency propagation relies on solving inner loops first.
    pub fn inner_most_first(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.loops.len()).collect();
        order.sort_by_key(|&index| (self.loops[index].body.len(), index));
        order
    }
}

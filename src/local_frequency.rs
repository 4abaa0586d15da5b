use log::{debug, trace};

use crate::{
    block::BlockId,
    branch_probabilities::BranchProbabilities,
    function::Function,
    natural_loops::NaturalLoops,
    utils::{bitvector::BitVector, edge_map::EdgeMap},
    EPSILON,
};

/// Per-block and per-edge execution frequencies within one function,
/// normalized so the entry block runs once. Loops are solved inner-most
/// first: each solved loop turns its back-edge probabilities into edge
/// frequencies, which is what the enclosing loop's cyclic correction reads.
pub struct LocalFrequencies {
    pub(crate) block_freq: Vec<f64>,
    edge_freq: EdgeMap<f64>,
    degenerate_cycles: usize,
    unvisited: usize,
}

impl LocalFrequencies {
    /// The frequencies of a declaration: no blocks, nothing to propagate.
    pub fn empty() -> Self {
        Self {
            block_freq: Vec::new(),
            edge_freq: EdgeMap::new(0, |_| 0),
            degenerate_cycles: 0,
            unvisited: 0,
        }
    }

    pub fn compute(
        func: &Function,
        probs: &BranchProbabilities,
        loops: &NaturalLoops<Function>,
    ) -> Self {
        let mut this = Self {
            block_freq: vec![0.0; func.num_blocks()],
            edge_freq: EdgeMap::new(func.num_blocks(), |index| {
                func.block(BlockId(index)).num_successors()
            }),
            degenerate_cycles: 0,
            unvisited: 0,
        };

        // Back-edge probabilities start out as plain edge probabilities and
        // are overwritten with edge frequencies as each loop is solved.
        let mut back_edge_prob = probs.probs.clone();

        for index in loops.inner_most_first() {
            let header = loops.loop_at(index).header();
            trace!("{}: solving loop headed by BB{}", func.name(), header.0);
            this.calculate_frequencies(func, probs, loops, &mut back_edge_prob, header);
        }

        this.unvisited =
            this.calculate_frequencies(func, probs, loops, &mut back_edge_prob, func.entry_block());

        if this.unvisited > 0 {
            debug!(
                "{}: {} reachable blocks not propagated (irreducible control flow)",
                func.name(),
                this.unvisited
            );
        }

        this
    }

    /// One propagation pass rooted at `head`: collect the blocks reachable
    /// from `head` over forward edges, then propagate frequencies through
    /// them. Returns how many collected blocks could not be propagated,
    /// which is zero unless the flow graph is irreducible.
    fn calculate_frequencies(
        &mut self,
        func: &Function,
        probs: &BranchProbabilities,
        loops: &NaturalLoops<Function>,
        back_edge_prob: &mut EdgeMap<f64>,
        head: BlockId,
    ) -> usize {
        // A set bit means the block still awaits propagation; everything not
        // reachable from `head` counts as already done.
        let mut to_visit = BitVector::with_capacity(func.num_blocks());
        let mut stack = vec![head];
        to_visit.set(head.0, true);

        while let Some(block) = stack.pop() {
            for successor in func.block(block).successor_list() {
                if loops.is_back_edge(block, *successor) {
                    continue;
                }

                if !to_visit.get(successor.0) {
                    to_visit.set(successor.0, true);
                    stack.push(*successor);
                }
            }
        }

        self.propagate(func, probs, loops, back_edge_prob, &mut to_visit, head);

        to_visit.count_ones()
    }

    fn propagate(
        &mut self,
        func: &Function,
        probs: &BranchProbabilities,
        loops: &NaturalLoops<Function>,
        back_edge_prob: &mut EdgeMap<f64>,
        to_visit: &mut BitVector,
        head: BlockId,
    ) {
        let mut stack = vec![head];

        while let Some(block) = stack.pop() {
            if !to_visit.get(block.0) {
                continue;
            }

            if block == head {
                self.block_freq[block.0] = 1.0;
            } else {
                // Wait until every forward predecessor has settled; the last
                // one to settle re-pushes this block.
                let mut ready = true;
                for pred in func.block(block).predecessor_list() {
                    if to_visit.get(pred.0) && !loops.is_back_edge(*pred, block) {
                        ready = false;
                        break;
                    }
                }

                if !ready {
                    continue;
                }

                // Forward in-edges contribute frequency; back edges into a
                // header contribute cyclic probability.
                let header_loop = loops.header_of(block);
                let mut sum = 0.0;
                let mut cyclic = 0.0;

                for pred in func.block(block).predecessor_list() {
                    let position = func
                        .block(*pred)
                        .successor_position(block)
                        .expect("predecessor lists a block it does not branch to");

                    if header_loop.map_or(false, |l| l.contains(*pred)) {
                        cyclic += back_edge_prob.at(*pred, position);
                    } else {
                        sum += self.edge_freq.at(*pred, position);
                    }
                }

                if cyclic > 1.0 - EPSILON {
                    self.degenerate_cycles += 1;
                    cyclic = 1.0 - EPSILON;
                }

                self.block_freq[block.0] = sum / (1.0 - cyclic);
            }

            to_visit.set(block.0, false);
            trace!(
                "{}: BB{} frequency {}",
                func.name(),
                block.0,
                self.block_freq[block.0]
            );

            let num_successors = func.block(block).num_successors();

            for position in 0..num_successors {
                let successor = func.block(block).successor(position);
                let frequency = self.block_freq[block.0] * probs.at(block, position);
                self.edge_freq.set(block, position, frequency);

                // Once this loop is solved, the enclosing loop reads the
                // frequency of its back edges as their probability.
                if successor == head {
                    back_edge_prob.set(block, position, frequency);
                }
            }

            // Push in reverse so the first successor is processed first.
            for position in (0..num_successors).rev() {
                let successor = func.block(block).successor(position);

                if !loops.is_back_edge(block, successor) {
                    stack.push(successor);
                }
            }
        }
    }

    pub fn block_frequency(&self, block: BlockId) -> f64 {
        self.block_freq.get(block.0).copied().unwrap_or(0.0)
    }

    pub fn edge_frequency_at(&self, block: BlockId, successor_index: usize) -> f64 {
        self.edge_freq.at(block, successor_index)
    }

    /// The frequency of the edge `from -> to`, or `None` if there is no such
    /// edge.
    pub fn edge_frequency(&self, func: &Function, from: BlockId, to: BlockId) -> Option<f64> {
        let position = func.block(from).successor_position(to)?;
        Some(self.edge_freq.at(from, position))
    }

    pub fn num_blocks(&self) -> usize {
        self.block_freq.len()
    }

    /// How many times a cyclic probability had to be clamped below one.
    pub fn degenerate_cycles(&self) -> usize {
        self.degenerate_cycles
    }

    /// Reachable blocks the propagation could not order; they report
    /// frequency zero.
    pub fn unvisited(&self) -> usize {
        self.unvisited
    }
}

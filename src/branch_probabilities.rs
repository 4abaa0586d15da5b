use log::{debug, trace};

use crate::{
    block::BlockId,
    dominators::PostDominators,
    function::Function,
    natural_loops::NaturalLoops,
    opcode::Opcode,
    utils::edge_map::EdgeMap,
};

pub const LOOP_BRANCH_TAKEN_PROB: f64 = 0.88;
pub const POINTER_TAKEN_PROB: f64 = 0.60;
pub const OPCODE_TAKEN_PROB: f64 = 0.84;
pub const GUARD_TAKEN_PROB: f64 = 0.62;
pub const LOOP_HEADER_TAKEN_PROB: f64 = 0.75;
pub const CALL_NOT_TAKEN_PROB: f64 = 0.78;
pub const STORE_NOT_TAKEN_PROB: f64 = 0.55;
pub const RETURN_NOT_TAKEN_PROB: f64 = 0.72;

/// Fold one heuristic's opinion into the running estimate using the
/// Dempster-Shafer rule of combination: scale each side by how strongly the
/// heuristic backs it, then renormalize. The operation is commutative and
/// associative, so the order heuristics fire in does not matter.
pub fn predict_taken(p: &mut [f64; 2], side: usize, prob: f64) {
    let other = 1 - side;
    let divisor = p[side] * prob + p[other] * (1.0 - prob);

    p[side] = p[side] * prob / divisor;
    p[other] = p[other] * (1.0 - prob) / divisor;
}

pub fn predict_not_taken(p: &mut [f64; 2], side: usize, prob: f64) {
    predict_taken(p, 1 - side, prob);
}

/// Per-edge branch probabilities for one function, estimated from syntax
/// alone. Rows sum to 1 for every block with successors.
pub struct BranchProbabilities {
    pub(crate) probs: EdgeMap<f64>,
}

impl BranchProbabilities {
    /// The probabilities of a declaration: no blocks, no edges.
    pub fn empty() -> Self {
        Self {
            probs: EdgeMap::new(0, |_| 0),
        }
    }

    pub fn compute(
        func: &Function,
        loops: &NaturalLoops<Function>,
        post_doms: &PostDominators<Function>,
    ) -> Self {
        let mut probs = EdgeMap::new(func.num_blocks(), |index| {
            func.block(BlockId(index)).num_successors()
        });

        for index in 0..func.num_blocks() {
            let block = BlockId(index);

            match func.block(block).num_successors() {
                // A sink; no edges to predict.
                0 => {}
                1 => probs.set(block, 0, 1.0),
                2 => {
                    let p = Self::two_way(func, loops, post_doms, block);
                    probs.set(block, 0, p[0]);
                    probs.set(block, 1, p[1]);
                }
                n => probs.fill_row(block, 1.0 / n as f64),
            }
        }

        debug!(
            "branch probabilities for {}: {} blocks",
            func.name(),
            func.num_blocks()
        );

        Self { probs }
    }

    pub fn at(&self, block: BlockId, successor_index: usize) -> f64 {
        self.probs.at(block, successor_index)
    }

    pub fn row(&self, block: BlockId) -> &[f64] {
        self.probs.row(block)
    }

    /// The probability on the edge `from -> to`, or `None` if there is no
    /// such edge.
    pub fn prob(&self, func: &Function, from: BlockId, to: BlockId) -> Option<f64> {
        let position = func.block(from).successor_position(to)?;
        Some(self.probs.at(from, position))
    }

    fn two_way(
        func: &Function,
        loops: &NaturalLoops<Function>,
        post_doms: &PostDominators<Function>,
        block: BlockId,
    ) -> [f64; 2] {
        let successors = [func.block(block).successor(0), func.block(block).successor(1)];
        let post_dominates = [
            post_doms.post_dominates(successors[0], block),
            post_doms.post_dominates(successors[1], block),
        ];

        // The loop branch heuristic is right so often that when it applies,
        // nothing else gets a vote.
        if let Some(side) = Self::loop_branch_heuristic(loops, block, &successors) {
            trace!("BB{}: loop branch picks side {}", block.0, side);

            let mut p = [1.0 - LOOP_BRANCH_TAKEN_PROB; 2];
            p[side] = LOOP_BRANCH_TAKEN_PROB;
            return p;
        }

        let mut p = [0.5, 0.5];

        for side in 0..2 {
            let successor = successors[side];

            if Self::loop_header_heuristic(func, loops, block, successor, post_dominates[side]) {
                trace!("BB{}: loop header fires on side {}", block.0, side);
                predict_taken(&mut p, side, LOOP_HEADER_TAKEN_PROB);
            }

            if !post_dominates[side] && func.block_contains_opcode(successor, Opcode::Call) {
                trace!("BB{}: call fires on side {}", block.0, side);
                predict_not_taken(&mut p, side, CALL_NOT_TAKEN_PROB);
            }

            if !post_dominates[side] && func.block_contains_opcode(successor, Opcode::Return) {
                trace!("BB{}: return fires on side {}", block.0, side);
                predict_not_taken(&mut p, side, RETURN_NOT_TAKEN_PROB);
            }

            if !post_dominates[side] && func.block_contains_opcode(successor, Opcode::Store) {
                trace!("BB{}: store fires on side {}", block.0, side);
                predict_not_taken(&mut p, side, STORE_NOT_TAKEN_PROB);
            }
        }

        if let Some(side) = Self::pointer_heuristic(func, block) {
            trace!("BB{}: pointer picks side {}", block.0, side);
            predict_taken(&mut p, side, POINTER_TAKEN_PROB);
        }

        if let Some(side) = Self::float_heuristic(func, block) {
            trace!("BB{}: float opcode picks side {}", block.0, side);
            predict_taken(&mut p, side, OPCODE_TAKEN_PROB);
        }

        if let Some(side) = Self::integer_heuristic(func, block) {
            trace!("BB{}: integer opcode picks side {}", block.0, side);
            predict_taken(&mut p, side, OPCODE_TAKEN_PROB);
        }

        if let Some(side) = Self::guard_heuristic(func, block, &successors, &post_dominates) {
            trace!("BB{}: guard picks side {}", block.0, side);
            predict_taken(&mut p, side, GUARD_TAKEN_PROB);
        }

        p
    }

    /// Walk the block's loops inner to outer. The first loop in which
    /// exactly one side continues the loop (re-enters the header, or simply
    /// stays inside while the other side exits) decides the branch.
    fn loop_branch_heuristic(
        loops: &NaturalLoops<Function>,
        block: BlockId,
        successors: &[BlockId; 2],
    ) -> Option<usize> {
        let mut l = loops.inner_most_loop_of(block);

        while let Some(current) = l {
            let header = current.header();
            let is_header = [successors[0] == header, successors[1] == header];

            if is_header[0] {
                if !is_header[1] {
                    return Some(0);
                }
            } else if is_header[1] {
                return Some(1);
            } else {
                let exits = [
                    !current.contains(successors[0]),
                    !current.contains(successors[1]),
                ];

                if exits[0] != exits[1] {
                    return Some(if exits[0] { 1 } else { 0 });
                }
            }

            l = loops.inner_most_outer_loop_of(current);
        }

        None
    }

    /// A successor that is (or is a preheader jumping straight into) the
    /// header of some loop other than the block's own is probably taken.
    fn loop_header_heuristic(
        func: &Function,
        loops: &NaturalLoops<Function>,
        block: BlockId,
        successor: BlockId,
        post_dominated: bool,
    ) -> bool {
        if post_dominated {
            return false;
        }

        let entered = match loops.header_of(successor) {
            Some(l) => Some(l),
            None => {
                let successor_block = func.block(successor);

                if successor_block.num_successors() == 1 {
                    loops
                        .header_of(successor_block.successor(0))
                        .filter(|l| !l.contains(successor))
                } else {
                    None
                }
            }
        };

        match entered {
            Some(l) => match loops.inner_most_loop_of(block) {
                Some(current) => l.index() != current.index(),
                None => true,
            },
            None => false,
        }
    }

    /// Pointers are rarely equal: predict the not-equal side.
    fn pointer_heuristic(func: &Function, block: BlockId) -> Option<usize> {
        let cmp = func.branch_comparison(block)?;

        if !func.value(cmp.child(0)).typ().is_ptr() {
            return None;
        }

        match cmp.opcode() {
            Opcode::Equal => Some(1),
            Opcode::NotEqual => Some(0),
            _ => None,
        }
    }

    /// Floats are rarely exactly equal either.
    fn float_heuristic(func: &Function, block: BlockId) -> Option<usize> {
        let cmp = func.branch_comparison(block)?;

        if !func.value(cmp.child(0)).typ().is_float() {
            return None;
        }

        match cmp.opcode() {
            Opcode::Equal => Some(1),
            Opcode::NotEqual => Some(0),
            _ => None,
        }
    }

    /// Integer comparisons against a constant: equality is unlikely, and
    /// comparisons against 0, 1 and -1 follow the usual "negative values and
    /// error codes are rare" pattern.
    fn integer_heuristic(func: &Function, block: BlockId) -> Option<usize> {
        let cmp = func.branch_comparison(block)?;
        let lhs = func.value(cmp.child(0));
        let rhs = func.value(cmp.child(1));

        if !lhs.typ().is_int() {
            return None;
        }

        if !lhs.opcode().is_int_constant() && !rhs.opcode().is_int_constant() {
            return None;
        }

        match cmp.opcode() {
            Opcode::Equal => return Some(1),
            Opcode::NotEqual => return Some(0),
            _ => {}
        }

        // Put the constant on the right so one predicate table covers both
        // operand orders.
        let (pred, constant) = if rhs.opcode().is_int_constant() {
            (cmp.opcode(), rhs.as_int()?)
        } else {
            (cmp.opcode().swapped_comparison(), lhs.as_int()?)
        };

        match constant {
            0 => match pred {
                Opcode::Above | Opcode::GreaterThan | Opcode::GreaterEqual => Some(0),
                Opcode::BelowEqual | Opcode::LessThan | Opcode::LessEqual => Some(1),
                _ => None,
            },
            1 => match pred {
                Opcode::AboveEqual | Opcode::GreaterEqual => Some(0),
                Opcode::Below | Opcode::LessThan => Some(1),
                _ => None,
            },
            -1 => match pred {
                Opcode::GreaterThan => Some(0),
                Opcode::LessEqual => Some(1),
                _ => None,
            },
            _ => None,
        }
    }

    /// If exactly one successor consumes a compared operand, the comparison
    /// is probably guarding that use.
    fn guard_heuristic(
        func: &Function,
        block: BlockId,
        successors: &[BlockId; 2],
        post_dominates: &[bool; 2],
    ) -> Option<usize> {
        let cmp = func.branch_comparison(block)?;
        let operands = [cmp.child(0), cmp.child(1)];

        let mut uses = [false; 2];
        for (side, successor) in successors.iter().enumerate() {
            uses[side] = operands
                .iter()
                .any(|operand| func.block_uses(*successor, *operand));
        }

        if uses[0] == uses[1] {
            return None;
        }

        let side = if uses[0] { 0 } else { 1 };

        if post_dominates[side] {
            return None;
        }

        Some(side)
    }
}

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::{
    call_graph::CallGraph,
    module::{FuncId, Module},
    utils::index_set::IndexSet,
    EPSILON,
};

type CallEdge = (FuncId, FuncId);

/// Invocation frequencies across the call graph. This is the block-level
/// propagation lifted one level: functions play the blocks, call edges play
/// the CFG edges with the local call weight as their "probability", and
/// recursion cycles play the loops. Cycles are found by depth-first search
/// rather than a dominator analysis: a callee met twice is a cycle head and
/// the edge that met it is a back edge.
pub struct GlobalFrequencies {
    call_freq: Vec<f64>,
    edge_freq: HashMap<CallEdge, f64>,
    degenerate_cycles: usize,
    unvisited: usize,
}

impl GlobalFrequencies {
    pub fn compute(module: &Module, call_graph: &CallGraph, root: FuncId) -> Self {
        let num_functions = module.num_functions();

        let mut this = Self {
            call_freq: vec![0.0; num_functions],
            edge_freq: HashMap::new(),
            degenerate_cycles: 0,
            unvisited: 0,
        };

        // Depth-first pre-order from the root. Along the way, collect
        // predecessor lists, seed back-edge probabilities with the local
        // call weights, and note cycle heads.
        let mut depth_first_order: Vec<FuncId> = Vec::with_capacity(num_functions);
        let mut predecessors: Vec<Vec<FuncId>> = vec![Vec::new(); num_functions];
        let mut back_edge_prob: HashMap<CallEdge, f64> = HashMap::new();
        let mut back_edges: HashSet<CallEdge> = HashSet::new();
        let mut loop_heads = IndexSet::<FuncId>::with_capacity(num_functions);

        {
            let mut visited = IndexSet::<FuncId>::with_capacity(num_functions);
            let mut stack = vec![root];
            visited.insert(root);

            while let Some(caller) = stack.pop() {
                depth_first_order.push(caller);

                for (&callee, &weight) in call_graph.callees(caller) {
                    if !predecessors[callee.0].contains(&caller) {
                        predecessors[callee.0].push(caller);
                    }

                    back_edge_prob.insert((caller, callee), weight);

                    if visited.insert(callee) {
                        stack.push(callee);
                    } else {
                        loop_heads.insert(callee);
                        back_edges.insert((caller, callee));
                    }
                }
            }
        }

        debug!(
            "call graph: {} of {} functions reachable, {} cycle heads",
            depth_first_order.len(),
            num_functions,
            loop_heads.len()
        );

        let mut to_visit = IndexSet::<FuncId>::with_capacity(num_functions);

        // Cycle heads resolve in reverse pre-order, so inner cycles are
        // solved before the cycles that contain them; each resolution pass
        // rewrites the probabilities of the back edges into its head. The
        // root's pass then reads those to apply the cyclic correction
        // everywhere.
        for &head in depth_first_order.iter().rev() {
            if loop_heads.contains(&head) {
                trace!("resolving recursion cycle headed by {}", module.function(head).name());
                Self::unmark_reachable(call_graph, &mut to_visit, head);
                this.propagate(
                    call_graph,
                    &predecessors,
                    &back_edges,
                    &mut back_edge_prob,
                    &mut to_visit,
                    head,
                    false,
                );
            }
        }

        Self::unmark_reachable(call_graph, &mut to_visit, root);
        this.propagate(
            call_graph,
            &predecessors,
            &back_edges,
            &mut back_edge_prob,
            &mut to_visit,
            root,
            true,
        );

        this.unvisited = to_visit.len();

        if this.unvisited > 0 {
            debug!(
                "{} reachable functions not propagated (irreducible recursion)",
                this.unvisited
            );
        }

        this
    }

    /// Flood every function reachable from `from` into the to-visit set,
    /// back edges included.
    fn unmark_reachable(call_graph: &CallGraph, to_visit: &mut IndexSet<FuncId>, from: FuncId) {
        to_visit.clear();
        to_visit.insert(from);

        let mut stack = vec![from];

        while let Some(func) = stack.pop() {
            for &callee in call_graph.callees(func).keys() {
                if to_visit.insert(callee) {
                    stack.push(callee);
                }
            }
        }
    }

    fn propagate(
        &mut self,
        call_graph: &CallGraph,
        predecessors: &[Vec<FuncId>],
        back_edges: &HashSet<CallEdge>,
        back_edge_prob: &mut HashMap<CallEdge, f64>,
        to_visit: &mut IndexSet<FuncId>,
        head: FuncId,
        is_main: bool,
    ) {
        let mut stack = vec![head];

        while let Some(func) = stack.pop() {
            if !to_visit.contains(&func) {
                continue;
            }

            if func != head {
                // Every forward caller must settle first; the last one to
                // settle re-pushes this function.
                let mut ready = true;
                for pred in &predecessors[func.0] {
                    if to_visit.contains(pred) && !back_edges.contains(&(*pred, func)) {
                        ready = false;
                        break;
                    }
                }

                if !ready {
                    continue;
                }
            }

            let mut freq = if func == head { 1.0 } else { 0.0 };
            let mut cyclic = 0.0;

            // In the root's pass every back edge feeds the cyclic
            // correction of its target. In a cycle-resolution pass back
            // edges are ignored here; the pass exists to compute them.
            for &pred in &predecessors[func.0] {
                let edge = (pred, func);

                if back_edges.contains(&edge) {
                    if is_main {
                        cyclic += back_edge_prob.get(&edge).copied().unwrap_or(0.0);
                    }
                } else {
                    freq += self.edge_freq.get(&edge).copied().unwrap_or(0.0);
                }
            }

            if cyclic > 1.0 - EPSILON {
                self.degenerate_cycles += 1;
                cyclic = 1.0 - EPSILON;
            }

            self.call_freq[func.0] = freq / (1.0 - cyclic);

            to_visit.remove(&func);
            trace!("call frequency of #{}: {}", func.0, self.call_freq[func.0]);

            for (&callee, &weight) in call_graph.callees(func) {
                let edge = (func, callee);
                let edge_frequency = weight * self.call_freq[func.0];
                self.edge_freq.insert(edge, edge_frequency);

                if !is_main && callee == head {
                    back_edge_prob.insert(edge, edge_frequency);
                }
            }

            // Continue over forward edges only, first callee on top.
            let callees: Vec<FuncId> = call_graph.callees(func).keys().copied().collect();

            for &callee in callees.iter().rev() {
                if !back_edges.contains(&(func, callee)) {
                    stack.push(callee);
                }
            }
        }
    }

    pub fn function_frequency(&self, func: FuncId) -> f64 {
        self.call_freq.get(func.0).copied().unwrap_or(0.0)
    }

    /// The global frequency of the call edge `caller -> callee`, or `None`
    /// if no such direct-call edge was reached.
    pub fn call_edge_frequency(&self, caller: FuncId, callee: FuncId) -> Option<f64> {
        self.edge_freq.get(&(caller, callee)).copied()
    }

    pub fn degenerate_cycles(&self) -> usize {
        self.degenerate_cycles
    }

    pub fn unvisited(&self) -> usize {
        self.unvisited
    }
}

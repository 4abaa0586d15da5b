use indexmap::IndexMap;
use log::trace;

use crate::{
    block::BlockId,
    local_frequency::LocalFrequencies,
    module::{FuncId, Module},
    opcode::Opcode,
};

/// Local call-edge weights: for every function, how much frequency one entry
/// into it pushes toward each direct callee. Each call site contributes its
/// containing block's local frequency; indirect calls carry no callee and
/// are skipped, and declarations have no blocks so no outgoing edges.
pub struct CallGraph {
    callees: Vec<IndexMap<FuncId, f64>>,
}

impl CallGraph {
    pub fn build(module: &Module, locals: &[LocalFrequencies]) -> Self {
        let mut callees = Vec::with_capacity(module.num_functions());

        for (id, func) in module.functions() {
            let mut weights: IndexMap<FuncId, f64> = IndexMap::new();

            for (block_index, block) in func.blocks().enumerate() {
                let block_freq = locals[id.0].block_frequency(BlockId(block_index));

                for &value in block.values() {
                    let value = func.value(value);

                    if value.opcode() != Opcode::Call {
                        continue;
                    }

                    let target = match value.call_target() {
                        Some(target) => target,
                        None => continue,
                    };

                    *weights.entry(target).or_insert(0.0) += block_freq;
                }
            }

            for (target, weight) in &weights {
                trace!(
                    "call edge {} -> {}: local weight {}",
                    func.name(),
                    module.function(*target).name(),
                    weight
                );
            }

            callees.push(weights);
        }

        Self { callees }
    }

    /// The callee weight table of `func`, in first-call order.
    pub fn callees(&self, func: FuncId) -> &IndexMap<FuncId, f64> {
        &self.callees[func.0]
    }
}

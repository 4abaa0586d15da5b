use log::debug;
use thiserror::Error;

use crate::{
    block::BlockId,
    branch_probabilities::BranchProbabilities,
    call_graph::CallGraph,
    dominators::{Dominators, PostDominators},
    global_frequency::GlobalFrequencies,
    local_frequency::LocalFrequencies,
    module::{FuncId, Module},
    natural_loops::NaturalLoops,
    Options,
};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("entry function `{0}` is not defined in the module")]
    MissingEntry(String),
}

/// Counters for the conditions the analysis tolerates but a caller may want
/// to know about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Cyclic probabilities clamped below one because a loop or recursion
    /// cycle looked like it never exits.
    pub degenerate_cycles: usize,
    /// Reachable blocks left at frequency zero by irreducible control flow.
    pub unvisited_blocks: usize,
    /// Reachable functions left at frequency zero by irreducible recursion.
    pub unvisited_functions: usize,
}

/// The result of profiling a module: immutable once built, queried through
/// the accessors below. Frequencies are relative, not absolute: each
/// function's entry block has local frequency one, and the entry function
/// has call frequency one.
pub struct StaticProfile {
    probs: Vec<BranchProbabilities>,
    locals: Vec<LocalFrequencies>,
    globals: GlobalFrequencies,
    diagnostics: Diagnostics,
}

/// Run the whole pipeline: per-function branch probabilities and local
/// frequencies, then call-edge weights, then call-graph propagation rooted
/// at the entry function named by `options`.
pub fn analyze(module: &Module, options: &Options) -> Result<StaticProfile, ProfileError> {
    let root = module
        .function_by_name(&options.entry)
        .ok_or_else(|| ProfileError::MissingEntry(options.entry.clone()))?;

    let mut probs = Vec::with_capacity(module.num_functions());
    let mut locals = Vec::with_capacity(module.num_functions());

    for (_, func) in module.functions() {
        if func.is_declaration() {
            probs.push(BranchProbabilities::empty());
            locals.push(LocalFrequencies::empty());
            continue;
        }

        debug!("profiling {}", func.name());

        let dominators = Dominators::new(func);
        let loops = NaturalLoops::new(func, &dominators);
        let post_doms = PostDominators::new(func);

        let branch_probs = BranchProbabilities::compute(func, &loops, &post_doms);
        let frequencies = LocalFrequencies::compute(func, &branch_probs, &loops);

        debug_assert!(
            (0..func.num_blocks())
                .all(|index| frequencies.block_frequency(BlockId(index)).is_finite()
                    && frequencies.block_frequency(BlockId(index)) >= 0.0),
            "local frequencies of {} must be finite and non-negative",
            func.name()
        );

        probs.push(branch_probs);
        locals.push(frequencies);
    }

    let call_graph = CallGraph::build(module, &locals);
    let globals = GlobalFrequencies::compute(module, &call_graph, root);

    debug_assert!(
        (0..module.num_functions())
            .all(|index| globals.function_frequency(FuncId(index)).is_finite()
                && globals.function_frequency(FuncId(index)) >= 0.0),
        "call frequencies must be finite and non-negative"
    );

    let diagnostics = Diagnostics {
        degenerate_cycles: locals
            .iter()
            .map(|frequencies| frequencies.degenerate_cycles())
            .sum::<usize>()
            + globals.degenerate_cycles(),
        unvisited_blocks: locals
            .iter()
            .map(|frequencies| frequencies.unvisited())
            .sum(),
        unvisited_functions: globals.unvisited(),
    };

    Ok(StaticProfile {
        probs,
        locals,
        globals,
        diagnostics,
    })
}

impl StaticProfile {
    /// Local frequency of `block` within `func`: expected executions per one
    /// execution of the function's entry.
    pub fn block_frequency(&self, func: FuncId, block: BlockId) -> f64 {
        self.locals[func.0].block_frequency(block)
    }

    /// Expected invocations of `func` per one run of the entry function.
    pub fn function_frequency(&self, func: FuncId) -> f64 {
        self.globals.function_frequency(func)
    }

    /// The block's share of the whole program: its share of `func`'s local
    /// frequency mass, scaled by `func`'s share of the call-frequency mass.
    /// Both sums run over bodied functions only.
    pub fn global_block_frequency(&self, func: FuncId, block: BlockId) -> f64 {
        let local = &self.locals[func.0];
        let block_sum: f64 = local.block_freq.iter().sum();

        if block_sum == 0.0 {
            return 0.0;
        }

        let call_sum: f64 = self
            .locals
            .iter()
            .enumerate()
            .filter(|(_, frequencies)| frequencies.num_blocks() > 0)
            .map(|(index, _)| self.globals.function_frequency(FuncId(index)))
            .sum();

        if call_sum == 0.0 {
            return 0.0;
        }

        (local.block_frequency(block) / block_sum)
            * (self.globals.function_frequency(func) / call_sum)
    }

    /// The heuristic probability on the block edge `from -> to` of `func`.
    pub fn edge_probability(
        &self,
        module: &Module,
        func: FuncId,
        from: BlockId,
        to: BlockId,
    ) -> Option<f64> {
        self.probs[func.0].prob(module.function(func), from, to)
    }

    /// The local frequency of the block edge `from -> to` of `func`.
    pub fn edge_frequency(
        &self,
        module: &Module,
        func: FuncId,
        from: BlockId,
        to: BlockId,
    ) -> Option<f64> {
        self.locals[func.0].edge_frequency(module.function(func), from, to)
    }

    pub fn branch_probabilities(&self, func: FuncId) -> &BranchProbabilities {
        &self.probs[func.0]
    }

    pub fn local_frequencies(&self, func: FuncId) -> &LocalFrequencies {
        &self.locals[func.0]
    }

    pub fn global_frequencies(&self) -> &GlobalFrequencies {
        &self.globals
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn display<'a>(&'a self, module: &'a Module) -> ProfileDisplay<'a> {
        ProfileDisplay {
            profile: self,
            module,
        }
    }
}

/// Renders the two report sections, frequencies printed with six
/// significant digits.
pub struct ProfileDisplay<'a> {
    profile: &'a StaticProfile,
    module: &'a Module,
}

impl<'a> std::fmt::Display for ProfileDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Global function frequency:")?;

        for (id, func) in self.module.functions() {
            writeln!(
                f,
                "{} {}",
                func.name(),
                format_frequency(self.profile.function_frequency(id))
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Global block frequency:")?;

        for (id, func) in self.module.functions() {
            for index in 0..func.num_blocks() {
                let block = BlockId(index);
                writeln!(
                    f,
                    "{} BB{} {}",
                    func.name(),
                    index,
                    format_frequency(self.profile.global_block_frequency(id, block))
                )?;
            }
        }

        Ok(())
    }
}

/// Six significant digits, trailing zeros trimmed.
fn format_frequency(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let formatted = format!("{:.*}", decimals, value);

    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

use crate::{function::Function, utils::index_set::KeyIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub usize);

impl KeyIndex for FuncId {
    fn index(&self) -> usize {
        self.0
    }
}

impl Default for FuncId {
    fn default() -> Self {
        Self(usize::MAX)
    }
}

impl From<usize> for FuncId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl From<FuncId> for usize {
    fn from(id: FuncId) -> Self {
        id.0
    }
}

/// A compilation unit: the function set the profiler analyzes. Function ids
/// are positions in insertion order and stay stable for the module's life.
pub struct Module {
    functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
        }
    }

    pub fn add_function(&mut self, function: Function) -> FuncId {
        let id = FuncId(self.functions.len());
        self.functions.push(function);
        id
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(index, function)| (FuncId(index), function))
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|function| function.name() == name)
            .map(FuncId)
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for function in &self.functions {
            write!(f, "{}", function)?;
        }

        Ok(())
    }
}

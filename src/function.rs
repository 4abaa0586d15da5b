use std::borrow::Cow;

use crate::{
    block::{BasicBlock, BlockId},
    dominators::Graph,
    opcode::Opcode,
    sparse_collection::SparseCollection,
    typ::Type,
    value::{Value, ValueData, ValueId},
};

/// A function: a named control-flow graph whose entry is `BlockId(0)`. A
/// function with no blocks is a declaration; it can be called but contributes
/// no control flow of its own.
pub struct Function {
    pub(crate) name: String,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) values: SparseCollection<Value>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            values: SparseCollection::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(id.0));
        id
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub fn add_value(
        &mut self,
        opcode: Opcode,
        typ: Type,
        children: &[ValueId],
        data: ValueData,
    ) -> ValueId {
        self.values.add(Value::new(opcode, typ, children, data))
    }

    pub fn add_to_block(&mut self, block: BlockId, value: ValueId) {
        self.values
            .at_mut(value)
            .expect("value does not exist")
            .owner = Some(block);
        self.blocks[block.0].append(value);
    }

    pub fn value(&self, id: ValueId) -> &Value {
        self.values
            .at(id)
            .unwrap_or_else(|| panic!("{:?} not found", id))
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values.at_mut(id).unwrap()
    }

    /// The block's terminator, if its last value is one.
    pub fn terminator(&self, block: BlockId) -> Option<&Value> {
        let last = self.blocks[block.0].last()?;
        let value = self.value(last);

        if value.opcode().is_terminator() {
            Some(value)
        } else {
            None
        }
    }

    /// The comparison controlling a two-way `Branch`, if there is one. Blocks
    /// that end some other way, or branch on a non-comparison value, yield
    /// `None` and the comparison-driven heuristics decline.
    pub fn branch_comparison(&self, block: BlockId) -> Option<&Value> {
        let terminator = self.terminator(block)?;

        if terminator.opcode() != Opcode::Branch {
            return None;
        }

        let condition = self.value(terminator.child(0));

        if condition.opcode().is_comparison() {
            Some(condition)
        } else {
            None
        }
    }

    pub fn block_contains(&self, block: BlockId, mut predicate: impl FnMut(&Value) -> bool) -> bool {
        self.blocks[block.0]
            .values()
            .iter()
            .any(|value| predicate(self.value(*value)))
    }

    pub fn block_contains_opcode(&self, block: BlockId, opcode: Opcode) -> bool {
        self.block_contains(block, |value| value.opcode() == opcode)
    }

    /// True if any value in `block` takes `target` as an operand.
    pub fn block_uses(&self, block: BlockId, target: ValueId) -> bool {
        self.block_contains(block, |value| value.children().contains(&target))
    }
}

impl Graph for Function {
    type Node = BlockId;

    fn num_nodes(&self) -> usize {
        self.blocks.len()
    }

    fn node(&self, index: usize) -> Option<Self::Node> {
        if index < self.blocks.len() {
            Some(BlockId(index))
        } else {
            None
        }
    }

    fn node_index(&self, node: Self::Node) -> usize {
        node.0
    }

    fn root(&self) -> Self::Node {
        BlockId(0)
    }

    fn successors(&self, node: Self::Node) -> Cow<[Self::Node]> {
        Cow::Borrowed(self.blocks[node.0].successor_list())
    }

    fn predecessors(&self, node: Self::Node) -> Cow<[Self::Node]> {
        Cow::Borrowed(self.blocks[node.0].predecessor_list())
    }

    fn display(&self, node: Option<Self::Node>) -> String {
        match node {
            Some(node) => format!("BB{}", node.0),
            None => "null".to_string(),
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_declaration() {
            return writeln!(f, "declare {}", self.name);
        }

        writeln!(f, "fn {}:", self.name)?;

        let mut out = String::new();
        for block in &self.blocks {
            block.fmt(&mut out, self)?;
        }

        f.write_str(&out)
    }
}

use crate::{
    function::Function,
    module::FuncId,
    opcode::Opcode,
    typ::Type,
    utils::index_set::KeyIndex,
    value::{ValueData, ValueId},
};

/// A node in a function's control-flow graph. Successor and predecessor
/// lists are ordered and contain no duplicate edges; the last value in the
/// block is its terminator.
pub struct BasicBlock {
    pub(crate) index: usize,
    pub(crate) values: Vec<ValueId>,
    pub(crate) predecessor_list: Vec<BlockId>,
    pub(crate) successor_list: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            values: Vec::new(),
            predecessor_list: Vec::new(),
            successor_list: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn values(&self) -> &[ValueId] {
        &self.values
    }

    pub fn last(&self) -> Option<ValueId> {
        self.values.last().copied()
    }

    pub fn append(&mut self, value: ValueId) {
        self.values.push(value);
    }

    pub fn predecessor_list(&self) -> &[BlockId] {
        &self.predecessor_list
    }

    pub fn successor_list(&self) -> &[BlockId] {
        &self.successor_list
    }

    pub fn num_successors(&self) -> usize {
        self.successor_list.len()
    }

    pub fn successor(&self, index: usize) -> BlockId {
        self.successor_list[index]
    }

    /// The slot of `to` in this block's successor list, or `None` if there is
    /// no such edge.
    pub fn successor_position(&self, to: BlockId) -> Option<usize> {
        self.successor_list.iter().position(|succ| *succ == to)
    }

    pub fn add_predecessor(&mut self, predecessor: BlockId) -> bool {
        if self.predecessor_list.contains(&predecessor) {
            return false;
        }

        self.predecessor_list.push(predecessor);
        true
    }

    pub(crate) fn set_successors(&mut self, successors: &[BlockId]) {
        self.successor_list.clear();
        self.successor_list.extend_from_slice(successors);
    }

    pub(crate) fn fmt<W: std::fmt::Write>(&self, f: &mut W, func: &Function) -> std::fmt::Result {
        writeln!(f, "BB{}:", self.index)?;

        if !self.predecessor_list.is_empty() {
            write!(f, "  Predecessors: ")?;
            for (i, pred) in self.predecessor_list.iter().enumerate() {
                write!(f, "BB{}", pred.0)?;

                if i < self.predecessor_list.len() - 1 {
                    write!(f, ", ")?;
                }
            }

            writeln!(f)?;
        }

        for value in &self.values {
            write!(f, "    ")?;
            func.value(*value).fmt(f)?;
            writeln!(f)?;
        }

        if !self.successor_list.is_empty() {
            write!(f, "  Successors: ")?;
            for (i, succ) in self.successor_list.iter().enumerate() {
                write!(f, "BB{}", succ.0)?;

                if i < self.successor_list.len() - 1 {
                    write!(f, ", ")?;
                }
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl KeyIndex for BlockId {
    fn index(&self) -> usize {
        self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self(usize::MAX)
    }
}

impl From<usize> for BlockId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl From<BlockId> for usize {
    fn from(id: BlockId) -> Self {
        id.0
    }
}

/// Appends values to one block at a time. Reassign `block` to move the
/// cursor; terminator helpers wire up successor and predecessor lists.
pub struct BasicBlockBuilder<'a> {
    pub func: &'a mut Function,
    pub block: BlockId,
}

impl<'a> BasicBlockBuilder<'a> {
    pub fn new(func: &'a mut Function, block: BlockId) -> Self {
        Self { func, block }
    }

    fn append(&mut self, opcode: Opcode, typ: Type, children: &[ValueId], data: ValueData) -> ValueId {
        let value = self.func.add_value(opcode, typ, children, data);
        self.func.add_to_block(self.block, value);
        value
    }

    pub fn const32(&mut self, value: i32) -> ValueId {
        self.append(Opcode::Const32, Type::Int32, &[], ValueData::Const32(value))
    }

    pub fn const64(&mut self, value: i64) -> ValueId {
        self.append(Opcode::Const64, Type::Int64, &[], ValueData::Const64(value))
    }

    pub fn const_double(&mut self, value: f64) -> ValueId {
        self.append(
            Opcode::ConstDouble,
            Type::Double,
            &[],
            ValueData::Double(value.to_bits()),
        )
    }

    /// A pointer constant; `const_ptr(0)` is the null pointer.
    pub fn const_ptr(&mut self, value: i64) -> ValueId {
        self.append(Opcode::ConstPtr, Type::Ptr, &[], ValueData::Const64(value))
    }

    pub fn binary(&mut self, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> ValueId {
        let typ = if opcode.is_comparison() {
            Type::Int32
        } else {
            self.func.value(lhs).typ()
        };

        self.append(opcode, typ, &[lhs, rhs], ValueData::None)
    }

    pub fn load(&mut self, typ: Type, address: ValueId) -> ValueId {
        self.append(Opcode::Load, typ, &[address], ValueData::None)
    }

    pub fn store(&mut self, value: ValueId, address: ValueId) -> ValueId {
        self.append(Opcode::Store, Type::Void, &[value, address], ValueData::None)
    }

    pub fn call(&mut self, ret: Type, target: Option<FuncId>, args: &[ValueId]) -> ValueId {
        self.append(Opcode::Call, ret, args, ValueData::Call(target))
    }

    pub fn jump(&mut self, to: BlockId) {
        self.append(Opcode::Jump, Type::Void, &[], ValueData::None);
        let block = self.block;
        self.func.block_mut(block).set_successors(&[to]);
        self.func.block_mut(to).add_predecessor(block);
    }

    pub fn branch(&mut self, condition: ValueId, taken: BlockId, not_taken: BlockId) {
        self.append(Opcode::Branch, Type::Void, &[condition], ValueData::None);
        let block = self.block;
        self.func.block_mut(block).set_successors(&[taken, not_taken]);
        self.func.block_mut(taken).add_predecessor(block);
        self.func.block_mut(not_taken).add_predecessor(block);
    }

    pub fn switch(&mut self, value: ValueId, targets: &[BlockId]) {
        self.append(Opcode::Switch, Type::Void, &[value], ValueData::None);
        let block = self.block;
        self.func.block_mut(block).set_successors(targets);

        for target in targets {
            self.func.block_mut(*target).add_predecessor(block);
        }
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        match value {
            Some(value) => self.append(Opcode::Return, Type::Void, &[value], ValueData::None),
            None => self.append(Opcode::Return, Type::Void, &[], ValueData::None),
        };
    }

    pub fn oops(&mut self) {
        self.append(Opcode::Oops, Type::Void, &[], ValueData::None);
    }
}

use tinyvec::TinyVec;

use crate::{
    block::BlockId, module::FuncId, opcode::Opcode, sparse_collection::SparseElement, typ::Type,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ValueId(pub usize);

impl From<usize> for ValueId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl From<ValueId> for usize {
    fn from(id: ValueId) -> Self {
        id.0
    }
}

/// Instruction payloads that do not fit in the child list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueData {
    None,
    Const32(i32),
    Const64(i64),
    /// Doubles are stored as raw bits so values stay `Eq`-comparable.
    Double(u64),
    /// The callee of a `Call`. `None` means the call is indirect and the
    /// profiler cannot attribute it to any function.
    Call(Option<FuncId>),
}

impl Default for ValueData {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub(crate) index: usize,
    pub(crate) opcode: Opcode,
    pub(crate) typ: Type,
    pub(crate) data: ValueData,
    pub(crate) owner: Option<BlockId>,
    pub(crate) children: TinyVec<[ValueId; 3]>,
}

impl Value {
    pub fn new(opcode: Opcode, typ: Type, children: &[ValueId], data: ValueData) -> Self {
        Self {
            index: usize::MAX,
            opcode,
            typ,
            data,
            owner: None,
            children: children.iter().copied().collect(),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn typ(&self) -> Type {
        self.typ
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    pub fn owner(&self) -> Option<BlockId> {
        self.owner
    }

    pub fn children(&self) -> &[ValueId] {
        &self.children
    }

    pub fn child(&self, index: usize) -> ValueId {
        self.children[index]
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.data {
            ValueData::Const32(value) => Some(value as i64),
            ValueData::Const64(value) => Some(value),
            _ => None,
        }
    }

    /// The direct callee of a `Call`, if the call is direct.
    pub fn call_target(&self) -> Option<FuncId> {
        match self.data {
            ValueData::Call(target) => target,
            _ => None,
        }
    }

    pub(crate) fn fmt<W: std::fmt::Write>(&self, f: &mut W) -> std::fmt::Result {
        write!(f, "v{} = {}", self.index, self.opcode)?;

        match self.data {
            ValueData::Const32(value) => write!(f, " {}", value)?,
            ValueData::Const64(value) => write!(f, " {}", value)?,
            ValueData::Double(bits) => write!(f, " {}", f64::from_bits(bits))?,
            ValueData::Call(Some(target)) => write!(f, " @{}", target.0)?,
            ValueData::Call(None) => write!(f, " @<indirect>")?,
            ValueData::None => {}
        }

        for (i, child) in self.children.iter().enumerate() {
            if i == 0 {
                write!(f, " ")?;
            } else {
                write!(f, ", ")?;
            }

            write!(f, "v{}", child.0)?;
        }

        Ok(())
    }
}

impl SparseElement for Value {
    type Id = ValueId;

    fn id(&self) -> Self::Id {
        ValueId(self.index)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.index = id.0;
    }
}

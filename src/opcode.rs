#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// A no-op that returns Void, useful as a placeholder.
    Nop,

    /// Constants. Large constants are expensive to create, so they exist in
    /// the instruction stream like everything else.
    Const32,
    Const64,
    ConstDouble,
    ConstPtr,

    /// Polymorphic math, usable with any numeric value type.
    Add,
    Sub,
    Mul,

    /// Memory.
    Load,
    Store,

    /// Comparisons. These return Int32 (0 or 1). Signed and unsigned integer
    /// orderings are separate opcodes; whether a comparison is an integer,
    /// float, or pointer comparison follows from its operand types.
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    Above,
    Below,
    AboveEqual,
    BelowEqual,

    /// A direct or indirect function call. The callee lives in the value's
    /// payload, not in the child list.
    Call,

    /// Terminators.
    Jump,
    Branch,
    Switch,
    Return,
    /// Trap. A block that cannot fall through anywhere.
    Oops,
}

impl Opcode {
    pub const fn is_constant(self) -> bool {
        matches!(
            self,
            Opcode::Const32 | Opcode::Const64 | Opcode::ConstDouble | Opcode::ConstPtr
        )
    }

    pub const fn is_int_constant(self) -> bool {
        matches!(self, Opcode::Const32 | Opcode::Const64)
    }

    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::Equal
                | Opcode::NotEqual
                | Opcode::LessThan
                | Opcode::GreaterThan
                | Opcode::LessEqual
                | Opcode::GreaterEqual
                | Opcode::Above
                | Opcode::Below
                | Opcode::AboveEqual
                | Opcode::BelowEqual
        )
    }

    pub const fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::Branch | Opcode::Switch | Opcode::Return | Opcode::Oops
        )
    }

    /// The comparison that holds when both operands are swapped, e.g.
    /// `LessThan(a, b)` iff `GreaterThan(b, a)`. Only meaningful for
    /// comparison opcodes; everything else returns itself.
    pub const fn swapped_comparison(self) -> Opcode {
        match self {
            Opcode::LessThan => Opcode::GreaterThan,
            Opcode::GreaterThan => Opcode::LessThan,
            Opcode::LessEqual => Opcode::GreaterEqual,
            Opcode::GreaterEqual => Opcode::LessEqual,
            Opcode::Above => Opcode::Below,
            Opcode::Below => Opcode::Above,
            Opcode::AboveEqual => Opcode::BelowEqual,
            Opcode::BelowEqual => Opcode::AboveEqual,
            _ => self,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

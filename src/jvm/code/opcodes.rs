//! Opcodes as they appear in visitor events
//!
//! The reader normalizes the class file encoding before events are produced, so some opcodes
//! never show up here:
//!
//!   - short forms (`iload_0`, `astore_3`, ...) become the general form with an operand
//!   - `wide` is folded into the instruction it modifies
//!   - `goto_w` and `jsr_w` become `goto` and `jsr`
//!   - `ldc_w` and `ldc2_w` become `ldc`

/// Opcode of a JVM instruction
///
/// The discriminant is the byte used in the class file encoding.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    AConstNull = 1,
    IConstM1 = 2,
    IConst0 = 3,
    IConst1 = 4,
    IConst2 = 5,
    IConst3 = 6,
    IConst4 = 7,
    IConst5 = 8,
    LConst0 = 9,
    LConst1 = 10,
    FConst0 = 11,
    FConst1 = 12,
    FConst2 = 13,
    DConst0 = 14,
    DConst1 = 15,
    BiPush = 16,
    SiPush = 17,
    Ldc = 18,
    ILoad = 21,
    LLoad = 22,
    FLoad = 23,
    DLoad = 24,
    ALoad = 25,
    IALoad = 46,
    LALoad = 47,
    FALoad = 48,
    DALoad = 49,
    AALoad = 50,
    BALoad = 51,
    CALoad = 52,
    SALoad = 53,
    IStore = 54,
    LStore = 55,
    FStore = 56,
    DStore = 57,
    AStore = 58,
    IAStore = 79,
    LAStore = 80,
    FAStore = 81,
    DAStore = 82,
    AAStore = 83,
    BAStore = 84,
    CAStore = 85,
    SAStore = 86,
    Pop = 87,
    Pop2 = 88,
    Dup = 89,
    DupX1 = 90,
    DupX2 = 91,
    Dup2 = 92,
    Dup2X1 = 93,
    Dup2X2 = 94,
    Swap = 95,
    IAdd = 96,
    LAdd = 97,
    FAdd = 98,
    DAdd = 99,
    ISub = 100,
    LSub = 101,
    FSub = 102,
    DSub = 103,
    IMul = 104,
    LMul = 105,
    FMul = 106,
    DMul = 107,
    IDiv = 108,
    LDiv = 109,
    FDiv = 110,
    DDiv = 111,
    IRem = 112,
    LRem = 113,
    FRem = 114,
    DRem = 115,
    INeg = 116,
    LNeg = 117,
    FNeg = 118,
    DNeg = 119,
    IShl = 120,
    LShl = 121,
    IShr = 122,
    LShr = 123,
    IUShr = 124,
    LUShr = 125,
    IAnd = 126,
    LAnd = 127,
    IOr = 128,
    LOr = 129,
    IXor = 130,
    LXor = 131,
    IInc = 132,
    I2L = 133,
    I2F = 134,
    I2D = 135,
    L2I = 136,
    L2F = 137,
    L2D = 138,
    F2I = 139,
    F2L = 140,
    F2D = 141,
    D2I = 142,
    D2L = 143,
    D2F = 144,
    I2B = 145,
    I2C = 146,
    I2S = 147,
    LCmp = 148,
    FCmpL = 149,
    FCmpG = 150,
    DCmpL = 151,
    DCmpG = 152,
    IfEq = 153,
    IfNe = 154,
    IfLt = 155,
    IfGe = 156,
    IfGt = 157,
    IfLe = 158,
    IfICmpEq = 159,
    IfICmpNe = 160,
    IfICmpLt = 161,
    IfICmpGe = 162,
    IfICmpGt = 163,
    IfICmpLe = 164,
    IfACmpEq = 165,
    IfACmpNe = 166,
    Goto = 167,
    Jsr = 168,
    Ret = 169,
    TableSwitch = 170,
    LookupSwitch = 171,
    IReturn = 172,
    LReturn = 173,
    FReturn = 174,
    DReturn = 175,
    AReturn = 176,
    Return = 177,
    GetStatic = 178,
    PutStatic = 179,
    GetField = 180,
    PutField = 181,
    InvokeVirtual = 182,
    InvokeSpecial = 183,
    InvokeStatic = 184,
    InvokeInterface = 185,
    InvokeDynamic = 186,
    New = 187,
    NewArray = 188,
    ANewArray = 189,
    ArrayLength = 190,
    AThrow = 191,
    CheckCast = 192,
    InstanceOf = 193,
    MonitorEnter = 194,
    MonitorExit = 195,
    MultiANewArray = 197,
    IfNull = 198,
    IfNonNull = 199,
}

/// Visitor event that carries an instruction
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum InsnKind {
    /// No operand (`visit_insn`)
    Insn,
    /// Integer operand (`visit_int_insn`): `bipush`, `sipush`, `newarray`
    Int,
    /// Local variable operand (`visit_var_insn`)
    Var,
    /// Class operand (`visit_type_insn`)
    Type,
    Field,
    Method,
    InvokeDynamic,
    Jump,
    Ldc,
    IInc,
    TableSwitch,
    LookupSwitch,
    MultiANewArray,
}

impl Opcode {
    /// Byte used for this opcode in the class file
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Which visitor event carries this opcode
    pub fn kind(self) -> InsnKind {
        use Opcode::*;
        match self {
            BiPush | SiPush | NewArray => InsnKind::Int,
            ILoad | LLoad | FLoad | DLoad | ALoad | IStore | LStore | FStore | DStore | AStore
            | Ret => InsnKind::Var,
            New | ANewArray | CheckCast | InstanceOf => InsnKind::Type,
            GetStatic | PutStatic | GetField | PutField => InsnKind::Field,
            InvokeVirtual | InvokeSpecial | InvokeStatic | InvokeInterface => InsnKind::Method,
            InvokeDynamic => InsnKind::InvokeDynamic,
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfICmpEq | IfICmpNe | IfICmpLt
            | IfICmpGe | IfICmpGt | IfICmpLe | IfACmpEq | IfACmpNe | Goto | Jsr | IfNull
            | IfNonNull => InsnKind::Jump,
            Ldc => InsnKind::Ldc,
            IInc => InsnKind::IInc,
            TableSwitch => InsnKind::TableSwitch,
            LookupSwitch => InsnKind::LookupSwitch,
            MultiANewArray => InsnKind::MultiANewArray,
            _ => InsnKind::Insn,
        }
    }

    /// Net change in the operand stack height (counted in slots, so `long` and `double` count
    /// for two) caused by this instruction
    ///
    /// Returns `None` when the effect depends on the operand: field and method instructions,
    /// `invokedynamic`, `ldc`, and `multianewarray`.
    pub fn stack_delta(self) -> Option<i32> {
        use Opcode::*;
        let delta = match self {
            Nop => 0,
            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => 1,
            LConst0 | LConst1 => 2,
            FConst0 | FConst1 | FConst2 => 1,
            DConst0 | DConst1 => 2,
            BiPush | SiPush => 1,

            ILoad | FLoad | ALoad => 1,
            LLoad | DLoad => 2,
            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => -1,
            LALoad | DALoad => 0,
            IStore | FStore | AStore => -1,
            LStore | DStore => -2,
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => -3,
            LAStore | DAStore => -4,

            Pop => -1,
            Pop2 => -2,
            Dup | DupX1 | DupX2 => 1,
            Dup2 | Dup2X1 | Dup2X2 => 2,
            Swap => 0,

            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem => -1,
            LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem => -2,
            INeg | LNeg | FNeg | DNeg => 0,
            IShl | LShl | IShr | LShr | IUShr | LUShr => -1,
            IAnd | IOr | IXor => -1,
            LAnd | LOr | LXor => -2,
            IInc => 0,

            I2L | I2D | F2L | F2D => 1,
            I2F | L2D | F2I | D2L | I2B | I2C | I2S => 0,
            L2I | L2F | D2I | D2F => -1,

            LCmp => -3,
            FCmpL | FCmpG => -1,
            DCmpL | DCmpG => -3,

            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfNull | IfNonNull => -1,
            IfICmpEq | IfICmpNe | IfICmpLt | IfICmpGe | IfICmpGt | IfICmpLe | IfACmpEq
            | IfACmpNe => -2,
            Goto => 0,
            Jsr => 1,
            Ret => 0,
            TableSwitch | LookupSwitch => -1,

            IReturn | FReturn | AReturn => -1,
            LReturn | DReturn => -2,
            Return => 0,

            New => 1,
            NewArray | ANewArray | ArrayLength | CheckCast | InstanceOf => 0,
            AThrow => -1,
            MonitorEnter | MonitorExit => -1,

            Ldc | GetStatic | PutStatic | GetField | PutField | InvokeVirtual | InvokeSpecial
            | InvokeStatic | InvokeInterface | InvokeDynamic | MultiANewArray => return None,
        };
        Some(delta)
    }

    /// Is this one of the `*return` instructions?
    pub fn is_return(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            IReturn | LReturn | FReturn | DReturn | AReturn | Return
        )
    }

    /// Does control never fall through to the next instruction?
    pub fn is_unconditional_exit(self) -> bool {
        use Opcode::*;
        self.is_return() || matches!(self, AThrow | Goto | Ret | TableSwitch | LookupSwitch)
    }

    /// Is this a two-way branch?
    pub fn is_conditional_jump(self) -> bool {
        self.kind() == InsnKind::Jump && !matches!(self, Opcode::Goto | Opcode::Jsr)
    }
}

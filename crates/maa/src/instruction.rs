//! Instruction record and the three-word bit-packed encoding the CPU
//! writes into the `instruction-reg` MMIO window

/// `0xFF` in any 8-bit instruction field means "not applicable".
const NA: u8 = 0xFF;

fn field(v: u8) -> Option<u8> {
    if v == NA { None } else { Some(v) }
}

fn unfield(v: Option<u8>) -> u8 {
    v.unwrap_or(NA)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    StreamLoad,
    IndirectLoad,
    IndirectStore,
    IndirectRmw,
    RangeLoop,
    AluScalar,
    AluVector,
    Invalidate,
}

impl Opcode {
    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Opcode::StreamLoad,
            1 => Opcode::IndirectLoad,
            2 => Opcode::IndirectStore,
            3 => Opcode::IndirectRmw,
            4 => Opcode::RangeLoop,
            5 => Opcode::AluScalar,
            6 => Opcode::AluVector,
            7 => Opcode::Invalidate,
            other => panic!("unsupported opcode byte {other:#04x}"),
        }
    }

    #[must_use]
    pub fn functional_unit_class(self) -> UnitClass {
        match self {
            Opcode::StreamLoad => UnitClass::Stream,
            Opcode::IndirectLoad | Opcode::IndirectStore | Opcode::IndirectRmw => {
                UnitClass::Indirect
            }
            Opcode::RangeLoop => UnitClass::RangeFuser,
            Opcode::AluScalar | Opcode::AluVector => UnitClass::Alu,
            Opcode::Invalidate => UnitClass::Invalidator,
        }
    }

    /// True for opcodes that consume `src2` (it is both read and produced
    /// into, so the controller must un-ready it on dispatch).
    #[must_use]
    pub fn consumes_src2_as_output(self) -> bool {
        matches!(self, Opcode::IndirectStore | Opcode::IndirectRmw)
    }
}

/// Functional-unit class an instruction is dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitClass {
    Invalidator,
    Stream,
    Indirect,
    Alu,
    RangeFuser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U32,
    I32,
    F32,
    U64,
    I64,
    F64,
}

impl DataType {
    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => DataType::U32,
            1 => DataType::I32,
            2 => DataType::F32,
            3 => DataType::U64,
            4 => DataType::I64,
            5 => DataType::F64,
            other => panic!("unsupported data type byte {other:#04x}"),
        }
    }

    #[must_use]
    pub fn word_size(self) -> crate::tile::WordSize {
        match self {
            DataType::U32 | DataType::I32 | DataType::F32 => crate::tile::WordSize::W32,
            DataType::U64 | DataType::I64 | DataType::F64 => crate::tile::WordSize::W64,
        }
    }

    /// Word size in bytes (`W`).
    #[must_use]
    pub fn byte_width(self) -> u64 {
        self.word_size().bytes() as u64
    }
}

/// Per-operand dependency status, evaluated at dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    WaitForInvalidation,
    WaitForService,
    Service,
    Finished,
}

/// A fixed-shape in-flight instruction record
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub data_type: DataType,
    pub op_subtype: Option<u8>,
    pub dst1: Option<u8>,
    pub dst2: Option<u8>,
    pub src1: Option<u8>,
    pub src2: Option<u8>,
    pub cond: Option<u8>,
    pub dst1_reg: Option<u8>,
    pub dst2_reg: Option<u8>,
    pub src1_reg: Option<u8>,
    pub src2_reg: Option<u8>,
    pub src3_reg: Option<u8>,
    pub base_vaddr: u64,
    /// Set once at admission; fixed for the instruction's lifetime.
    pub unit_class: UnitClass,
}

impl Instruction {
    /// Decode word 0: `[opcode:8][datatype:8][optype:8][dst1:8][dst2:8][reserved:24]`.
    #[must_use]
    pub fn decode_word0(word0: u64) -> (Opcode, DataType, Option<u8>, Option<u8>, Option<u8>) {
        let opcode = Opcode::from_u8((word0 & 0xFF) as u8);
        let data_type = DataType::from_u8(((word0 >> 8) & 0xFF) as u8);
        let op_subtype = field(((word0 >> 16) & 0xFF) as u8);
        let dst1 = field(((word0 >> 24) & 0xFF) as u8);
        let dst2 = field(((word0 >> 32) & 0xFF) as u8);
        (opcode, data_type, op_subtype, dst1, dst2)
    }

    /// Decode word 1: `[src1:8][src2:8][dst1-reg:8][dst2-reg:8][src1-reg:8][src2-reg:8][src3-reg:8][cond:8]`.
    #[must_use]
    #[allow(clippy::type_complexity)]
    pub fn decode_word1(
        word1: u64,
    ) -> (
        Option<u8>,
        Option<u8>,
        Option<u8>,
        Option<u8>,
        Option<u8>,
        Option<u8>,
        Option<u8>,
        Option<u8>,
    ) {
        let src1 = field((word1 & 0xFF) as u8);
        let src2 = field(((word1 >> 8) & 0xFF) as u8);
        let dst1_reg = field(((word1 >> 16) & 0xFF) as u8);
        let dst2_reg = field(((word1 >> 24) & 0xFF) as u8);
        let src1_reg = field(((word1 >> 32) & 0xFF) as u8);
        let src2_reg = field(((word1 >> 40) & 0xFF) as u8);
        let src3_reg = field(((word1 >> 48) & 0xFF) as u8);
        let cond = field(((word1 >> 56) & 0xFF) as u8);
        (
            src1, src2, dst1_reg, dst2_reg, src1_reg, src2_reg, src3_reg, cond,
        )
    }

    /// Assemble a fully decoded instruction from the three raw words and
    /// validate the dst/src disjointness invariant
    ///
    /// # Panics
    /// Panics if `dst1`/`dst2` alias `src1`/`src2` — a host programming
    /// error, so this is a fatal assertion, not a recoverable condition.
    #[must_use]
    pub fn from_words(word0: u64, word1: u64, base_vaddr: u64) -> Self {
        let (opcode, data_type, op_subtype, dst1, dst2) = Self::decode_word0(word0);
        let (src1, src2, dst1_reg, dst2_reg, src1_reg, src2_reg, src3_reg, cond) =
            Self::decode_word1(word1);

        for d in [dst1, dst2] {
            for s in [src1, src2] {
                if let (Some(d), Some(s)) = (d, s) {
                    assert!(d != s, "destination tile must not alias a source tile");
                }
            }
        }

        Instruction {
            opcode,
            data_type,
            op_subtype,
            dst1,
            dst2,
            src1,
            src2,
            cond,
            dst1_reg,
            dst2_reg,
            src1_reg,
            src2_reg,
            src3_reg,
            base_vaddr,
            unit_class: opcode.functional_unit_class(),
        }
    }
}

/// Re-packs a decoded instruction back into its three words, `0xFF`
/// substituted for every absent field. Used by tests that round-trip the
/// MMIO instruction-reg protocol.
#[must_use]
pub fn encode_words(
    opcode: Opcode,
    data_type: DataType,
    op_subtype: Option<u8>,
    dst1: Option<u8>,
    dst2: Option<u8>,
    src1: Option<u8>,
    src2: Option<u8>,
    dst1_reg: Option<u8>,
    dst2_reg: Option<u8>,
    src1_reg: Option<u8>,
    src2_reg: Option<u8>,
    src3_reg: Option<u8>,
    cond: Option<u8>,
    base_vaddr: u64,
) -> (u64, u64, u64) {
    let opcode_byte = match opcode {
        Opcode::StreamLoad => 0,
        Opcode::IndirectLoad => 1,
        Opcode::IndirectStore => 2,
        Opcode::IndirectRmw => 3,
        Opcode::RangeLoop => 4,
        Opcode::AluScalar => 5,
        Opcode::AluVector => 6,
        Opcode::Invalidate => 7,
    };
    let dt_byte = match data_type {
        DataType::U32 => 0,
        DataType::I32 => 1,
        DataType::F32 => 2,
        DataType::U64 => 3,
        DataType::I64 => 4,
        DataType::F64 => 5,
    };
    let word0 = u64::from(opcode_byte)
        | (u64::from(dt_byte) << 8)
        | (u64::from(unfield(op_subtype)) << 16)
        | (u64::from(unfield(dst1)) << 24)
        | (u64::from(unfield(dst2)) << 32);

    let word1 = u64::from(unfield(src1))
        | (u64::from(unfield(src2)) << 8)
        | (u64::from(unfield(dst1_reg)) << 16)
        | (u64::from(unfield(dst2_reg)) << 24)
        | (u64::from(unfield(src1_reg)) << 32)
        | (u64::from(unfield(src2_reg)) << 40)
        | (u64::from(unfield(src3_reg)) << 48)
        | (u64::from(unfield(cond)) << 56);

    (word0, word1, base_vaddr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_stream_load_encoding() {
        let (w0, w1, w2) = encode_words(
            Opcode::StreamLoad,
            DataType::U32,
            None,
            Some(0),
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            Some(1),
            0x1000,
        );
        let inst = Instruction::from_words(w0, w1, w2);
        assert_eq!(inst.opcode, Opcode::StreamLoad);
        assert_eq!(inst.data_type, DataType::U32);
        assert_eq!(inst.dst1, Some(0));
        assert_eq!(inst.cond, Some(1));
        assert_eq!(inst.base_vaddr, 0x1000);
        assert_eq!(inst.unit_class, UnitClass::Stream);
    }

    #[test]
    #[should_panic(expected = "must not alias")]
    fn dst_aliasing_src_panics() {
        let (w0, w1, w2) = encode_words(
            Opcode::AluVector,
            DataType::U32,
            Some(0),
            Some(2),
            None,
            Some(2),
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            0,
        );
        let _ = Instruction::from_words(w0, w1, w2);
    }

    #[test]
    fn indirect_store_consumes_src2_as_output() {
        assert!(Opcode::IndirectStore.consumes_src2_as_output());
        assert!(Opcode::IndirectRmw.consumes_src2_as_output());
        assert!(!Opcode::StreamLoad.consumes_src2_as_output());
    }

    #[test]
    fn not_applicable_byte_decodes_to_none() {
        let (w0, w1, _) = encode_words(
            Opcode::Invalidate,
            DataType::U32,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            0,
        );
        let (_, _, optype, dst1, dst2) = Instruction::decode_word0(w0);
        assert_eq!(optype, None);
        assert_eq!(dst1, None);
        assert_eq!(dst2, None);
        let (src1, src2, ..) = Instruction::decode_word1(w1);
        assert_eq!(src1, None);
        assert_eq!(src2, None);
    }
}

use std::fmt::{self, Write};

use crate::address::RelAddr;
use crate::error::ParseError;

/// Bit 15: a cell executes only when this is set.
pub const EXEC_FLAG: u16 = 0x8000;

/// The eight operations of the machine.
///
/// Each instruction word is laid out as `exec(1) opcode(3) op1(6) op2(6)`.
/// `Ld` and `St` treat operand 2 as a pointer: the value stored at op2 is
/// itself reinterpreted as a relative address from the executing cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `mem[op1] = mem[op2]`
    Mov = 0,
    /// `mem[op1] = mem[op1] + mem[op2]`, wrapping at 16 bits.
    Add = 1,
    /// Rotate `mem[op1]` left by `mem[op2] % 16`.
    Cshl = 2,
    /// `mem[op1] |= mem[op2]`
    Or = 3,
    /// `mem[op1] &= mem[op2]`
    And = 4,
    /// `mem[op1] = max(0, mem[op1] - mem[op2])`
    Ssub = 5,
    /// `mem[op1] = mem[*op2]`
    Ld = 6,
    /// `mem[*op2] = mem[op1]`
    St = 7,
}

impl Opcode {
    pub const ALL: [Opcode; 8] = [
        Opcode::Mov,
        Opcode::Add,
        Opcode::Cshl,
        Opcode::Or,
        Opcode::And,
        Opcode::Ssub,
        Opcode::Ld,
        Opcode::St,
    ];

    /// Opcode from the low three bits of `bits`.
    pub const fn from_bits(bits: u8) -> Self {
        Self::ALL[(bits & 0x7) as usize]
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Mov => "mov",
            Opcode::Add => "add",
            Opcode::Cshl => "cshl",
            Opcode::Or => "or",
            Opcode::And => "and",
            Opcode::Ssub => "ssub",
            Opcode::Ld => "ld",
            Opcode::St => "st",
        }
    }

    /// Case-insensitive mnemonic lookup.
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(text))
    }

    /// Whether operand 2 is used as a pointer rather than a value.
    pub const fn is_indirect(self) -> bool {
        matches!(self, Opcode::Ld | Opcode::St)
    }
}

/// Decoded view of a cell word. Every 16-bit pattern decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub armed: bool,
    pub opcode: Opcode,
    pub op1: RelAddr,
    pub op2: RelAddr,
}

impl Instruction {
    pub const fn decode(word: u16) -> Self {
        Self {
            armed: word & EXEC_FLAG != 0,
            opcode: Opcode::from_bits((word >> 12) as u8),
            op1: RelAddr::from_bits((word >> 6) as u8),
            op2: RelAddr::from_bits(word as u8),
        }
    }

    pub const fn encode(self) -> u16 {
        let exec = if self.armed { EXEC_FLAG } else { 0 };
        exec | ((self.opcode.bits() as u16) << 12)
            | ((self.op1.bits() as u16) << 6)
            | self.op2.bits() as u16
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.opcode.mnemonic();
        if self.opcode.is_indirect() {
            write!(f, "{m} {} [{}]", self.op1, self.op2)
        } else {
            write!(f, "{m} {} {}", self.op1, self.op2)
        }
    }
}

/// Split a word into its raw fields: `(exec flag, opcode, op1 field, op2 field)`.
pub const fn decode_opcode(word: u16) -> (bool, u8, u8, u8) {
    (
        word & EXEC_FLAG != 0,
        ((word >> 12) & 0x7) as u8,
        ((word >> 6) & 0x3F) as u8,
        (word & 0x3F) as u8,
    )
}

pub const fn is_armed(word: u16) -> bool {
    word & EXEC_FLAG != 0
}

/// Render a word as assembler text. The exec flag is not shown.
pub fn disassemble(word: u16) -> String {
    Instruction::decode(word).to_string()
}

/// Parse one line of the form `<mnemonic> <op1> <op2>` into an armed cell word.
///
/// Operand 2 of `ld`/`st` may be written with or without brackets.
pub fn assemble(line: &str) -> Result<u16, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let &[mnemonic, op1, op2] = tokens.as_slice() else {
        return Err(ParseError::TokenCount {
            found: tokens.len(),
        });
    };

    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| ParseError::UnknownMnemonic(mnemonic.to_string()))?;
    let op1: RelAddr = op1.parse()?;

    let op2 = match op2.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(inner) if opcode.is_indirect() => inner,
        Some(_) => {
            return Err(ParseError::BracketedOperand {
                mnemonic: opcode.mnemonic().to_string(),
            });
        }
        None => op2,
    };
    let op2: RelAddr = op2.parse()?;

    Ok(Instruction {
        armed: true,
        opcode,
        op1,
        op2,
    }
    .encode())
}

/// Parse a raw cell literal: `0x` followed by hex digits, or exactly four hex digits.
fn parse_literal(token: &str) -> Option<u16> {
    let digits = match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(d) => d,
        None if token.len() == 4 => token,
        None => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// Assemble a listing: one cell per non-blank line, `;` starts a comment.
///
/// A line is either an instruction (always armed) or a hex literal for a raw
/// cell value, which is how inert data is written.
pub fn assemble_program(text: &str) -> Result<Vec<u16>, ParseError> {
    let mut words = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let word = if line.split_whitespace().count() == 1 {
            parse_literal(line).ok_or_else(|| ParseError::InvalidLiteral(line.to_string()))
        } else {
            assemble(line)
        };
        let word = word.map_err(|e| ParseError::AtLine {
            line: i + 1,
            source: Box::new(e),
        })?;
        words.push(word);
    }
    Ok(words)
}

/// Human-readable dump of a memory, one cell per line.
///
/// Columns: index, hex value, `*` when armed, disassembly, and `<` on the
/// cell under the cursor.
pub fn disassemble_listing(memory: &[u16], cursor: usize) -> String {
    let mut out = String::new();
    for (i, &word) in memory.iter().enumerate() {
        let armed = if is_armed(word) { '*' } else { ' ' };
        let _ = write!(out, "{i:04}: {word:04x} {armed} {:<16}", disassemble(word));
        if i == cursor {
            out.push_str(" <");
        }
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        out.push('\n');
    }
    out
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn offset() -> impl Strategy<Value = i32> {
        prop_oneof![-32i32..=-1, 1i32..=32]
    }

    proptest! {
        #[test]
        fn assemble_disassemble_idempotent(op in 0u8..8, a in offset(), b in offset()) {
            let opcode = Opcode::from_bits(op);
            let text = if opcode.is_indirect() {
                format!("{} {a:+} [{b:+}]", opcode.mnemonic())
            } else {
                format!("{} {a:+} {b:+}", opcode.mnemonic())
            };
            let word = assemble(&text).unwrap();
            prop_assert_eq!(disassemble(word), text);
            prop_assert_eq!(assemble(&disassemble(word)), Ok(word));
        }

        #[test]
        fn any_armed_word_reassembles(word in 0x8000u16..=0xFFFF) {
            prop_assert_eq!(assemble(&disassemble(word)), Ok(word));
        }

        #[test]
        fn any_word_decodes_and_encodes(word in any::<u16>()) {
            prop_assert_eq!(Instruction::decode(word).encode(), word);
        }

        #[test]
        fn garbage_never_panics(line in "\\PC{0,40}") {
            let _ = assemble(&line);
            let _ = assemble_program(&line);
        }
    }
}

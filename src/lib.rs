pub mod address;
pub mod connectivity;
pub mod ensemble;
pub mod error;
pub mod instruction;
pub mod machine;
pub mod metrics;

pub use address::{RelAddr, address_to_text, decode_address, encode_address};
pub use connectivity::{UnionFind, analyze_single_sweep};
pub use error::ParseError;
pub use instruction::{Instruction, Opcode, assemble, assemble_program, disassemble};
pub use machine::FiberMachine;

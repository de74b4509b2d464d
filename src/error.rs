use thiserror::Error;

/// Failure to turn assembler text into a cell word.
///
/// Parsing never touches a machine, so a failed parse leaves all state as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected 3 tokens (mnemonic op1 op2), found {found}")]
    TokenCount { found: usize },

    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),

    #[error("operand '{0}' is not an integer")]
    InvalidOperand(String),

    #[error("operand {0} outside -32..=-1 or 1..=32")]
    OperandOutOfRange(i64),

    #[error("'{mnemonic}' does not take a bracketed operand")]
    BracketedOperand { mnemonic: String },

    #[error("invalid cell literal '{0}'")]
    InvalidLiteral(String),

    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ParseError>,
    },
}

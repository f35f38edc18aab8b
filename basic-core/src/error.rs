use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("Illegal character: \"{ch}\"")]
    IllegalCharacter { ch: char, line: usize, col: usize },

    #[error("unterminated string")]
    UnterminatedString { line: usize },

    #[error("invalid number literal {lexeme}")]
    InvalidNumber { lexeme: String, line: usize },
}

impl Error {
    pub fn line(&self) -> usize {
        match self {
            Error::IllegalCharacter { line, .. } => *line,
            Error::UnterminatedString { line } => *line,
            Error::InvalidNumber { line, .. } => *line,
        }
    }
}

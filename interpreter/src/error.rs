use std::fmt;

use basic_core::Error as CoreError;
use basic_core::Token;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("[line {line}] {source}")]
    Lex { line: usize, source: CoreError },

    #[error("[line {line}] {msg}")]
    Syntax { line: usize, msg: String },

    #[error("undefined variable \"{name}\"")]
    UndefinedVariable { name: String },

    #[error("Index {index} is out of range (maximum {max})")]
    IndexOutOfRange { index: i64, max: usize },

    #[error("{name} expects {expected} arguments but got {got}")]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("maximum call depth of {limit} exceeded")]
    RecursionLimit { limit: usize },

    #[error("No such module: {name}")]
    ModuleNotFound { name: String },

    #[error("{msg}")]
    Runtime { msg: String },

    #[error("cannot restore program: {msg}")]
    Persist { msg: String },

    #[error("{msg}")]
    Io { msg: String },
}

impl Error {
    pub(crate) fn syntax(token: &Token, msg: &str) -> Self {
        Error::Syntax {
            line: token.line,
            msg: String::from(msg),
        }
    }

    pub(crate) fn runtime(msg: fmt::Arguments) -> Self {
        Error::Runtime {
            msg: format!("{}", msg),
        }
    }

    pub(crate) fn undefined(name: &str) -> Self {
        Error::UndefinedVariable {
            name: String::from(name),
        }
    }

    /// Source line the error refers to, when there is one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Lex { line, .. } | Error::Syntax { line, .. } => Some(*line),
            _ => None,
        }
    }
}

impl From<CoreError> for Error {
    fn from(value: CoreError) -> Self {
        Error::Lex {
            line: value.line(),
            source: value,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io {
            msg: value.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(value: bincode::Error) -> Self {
        Error::Persist {
            msg: value.to_string(),
        }
    }
}

pub type BasicResult<T> = Result<T, Error>;

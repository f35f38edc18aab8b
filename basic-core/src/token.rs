use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Minus,
    Plus,
    Slash,
    Backslash,
    Star,
    Caret,

    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    Identifier,
    Integer,
    Decimal,
    String,

    Let,
    Dim,
    If,
    Then,
    Else,
    ElseIf,
    End,
    While,
    Do,
    Wend,
    Loop,
    Until,
    For,
    To,
    Step,
    Next,
    Exit,
    Continue,
    Defun,
    Sub,
    Function,
    Return,
    And,
    Or,
    Not,
    Mod,
    As,
    Use,

    Newline,
    Eof,
}

impl Type {
    pub fn is_keyword(&self) -> bool {
        (*self as usize) >= (Type::Let as usize) && (*self as usize) <= (Type::Use as usize)
    }
}

/// Compile-time value carried by literal tokens and literal AST nodes. Integer and decimal
/// literals stay distinct all the way to runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nothing,
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(String::from(value))
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(val) => write!(f, "{}", val),
            Literal::Float(val) => write!(f, "{:?}", val),
            Literal::Str(val) => write!(f, "\"{}\"", val),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Nothing => write!(f, "Nothing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ty: Type,
    pub lexeme: String,
    pub line: usize,
    pub col: usize,
    pub value: Literal,
}

impl Token {
    pub fn new(ty: Type, lexeme: String, line: usize, col: usize, value: Literal) -> Self {
        Token {
            ty,
            lexeme,
            line,
            col,
            value,
        }
    }

    /// Text used when the token shows up in a diagnostic.
    pub fn describe(&self) -> String {
        match self.ty {
            Type::Newline => String::from("end of line"),
            Type::Eof => String::from("end of input"),
            _ => format!("'{}'", self.lexeme),
        }
    }
}

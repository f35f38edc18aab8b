use phf::{phf_map, Map};

use crate::error::Error;
use crate::token::{Literal, Token, Type};

pub struct Scanner;

impl Scanner {
    const KEYWORDS: Map<&'static str, Type> = phf_map! {
        "LET" => Type::Let,
        "DIM" => Type::Dim,
        "IF" => Type::If,
        "THEN" => Type::Then,
        "ELSE" => Type::Else,
        "ELSEIF" => Type::ElseIf,
        "END" => Type::End,
        "WHILE" => Type::While,
        "DO" => Type::Do,
        "WEND" => Type::Wend,
        "LOOP" => Type::Loop,
        "UNTIL" => Type::Until,
        "FOR" => Type::For,
        "TO" => Type::To,
        "STEP" => Type::Step,
        "NEXT" => Type::Next,
        "EXIT" => Type::Exit,
        "CONTINUE" => Type::Continue,
        "DEFUN" => Type::Defun,
        "SUB" => Type::Sub,
        "FUNCTION" => Type::Function,
        "RETURN" => Type::Return,
        "AND" => Type::And,
        "OR" => Type::Or,
        "NOT" => Type::Not,
        "MOD" => Type::Mod,
        "AS" => Type::As,
        "USE" => Type::Use,
    };

    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Scanner
    }

    pub fn scan_tokens(&mut self, src: &str) -> TokenStream {
        TokenStream::new(src, 1)
    }

    /// Same as `scan_tokens`, but numbers lines from `line`. Used when a program arrives one
    /// line at a time.
    pub fn scan_tokens_from(&mut self, src: &str, line: usize) -> TokenStream {
        TokenStream::new(src, line)
    }

    pub fn keyword(text: &str) -> Option<Type> {
        Scanner::KEYWORDS.get(text).copied()
    }
}

pub struct TokenStream {
    src: Vec<char>,
    line: usize,

    // column of the first character of the current line
    line_start: usize,

    // `start` and `current` points to the start and end of the token being scanned
    start: usize,
    current: usize,

    // Set once the eof token has been emitted, so the iterator can tell "reached the end" apart
    // from "reached the end and reported it".
    eof: bool,
    error: Option<Error>,
}

impl TokenStream {
    pub fn new(src: &str, line: usize) -> Self {
        TokenStream {
            src: src.chars().collect(),
            line,
            line_start: 0,
            start: 0,
            current: 0,
            eof: false,
            error: None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Line the stream has reached, i.e. one past the last newline consumed.
    pub fn line(&self) -> usize {
        self.line
    }

    fn scan_token(&mut self) -> Result<Option<Token>, Error> {
        let c = self.advance();

        let token = match c {
            '(' => Some(self.make_token(Type::LeftParen)),
            ')' => Some(self.make_token(Type::RightParen)),
            '{' => Some(self.make_token(Type::LeftBrace)),
            '}' => Some(self.make_token(Type::RightBrace)),
            ',' => Some(self.make_token(Type::Comma)),
            '-' => Some(self.make_token(Type::Minus)),
            '+' => Some(self.make_token(Type::Plus)),
            '*' => Some(self.make_token(Type::Star)),
            '/' => Some(self.make_token(Type::Slash)),
            '\\' => Some(self.make_token(Type::Backslash)),
            '^' => Some(self.make_token(Type::Caret)),
            '=' => Some(self.make_token(Type::Equal)),

            '<' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::LessEqual))
                } else if self.match_char('>') {
                    Some(self.make_token(Type::NotEqual))
                } else {
                    Some(self.make_token(Type::Less))
                }
            }

            '>' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::GreaterEqual))
                } else {
                    Some(self.make_token(Type::Greater))
                }
            }

            // comment runs to the end of the line, the newline itself is still a token
            '\'' => {
                while self.peek() != '\n' && !self.is_at_end() {
                    self.advance();
                }
                None
            }

            '"' => Some(self.string()?),

            ' ' | '\t' | '\r' => None,

            '\n' => {
                let token = self.make_token(Type::Newline);
                self.line += 1;
                self.line_start = self.current;
                Some(token)
            }

            _ => {
                if c.is_ascii_digit() {
                    Some(self.number()?)
                } else if c.is_ascii_alphabetic() || c == '_' || c == '$' {
                    Some(self.identifier())
                } else {
                    return Err(Error::IllegalCharacter {
                        ch: c,
                        line: self.line,
                        col: self.start - self.line_start,
                    });
                }
            }
        };

        Ok(token)
    }

    fn string(&mut self) -> Result<Token, Error> {
        while self.peek() != '"' && self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }

        if self.peek() != '"' {
            return Err(Error::UnterminatedString { line: self.line });
        }

        // consume the closing "
        self.advance();
        let text: String = self.src[self.start + 1..self.current - 1].iter().collect();
        Ok(self.make_token_with_val(Type::String, Literal::Str(text)))
    }

    fn number(&mut self) -> Result<Token, Error> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let ty = if self.peek() == '.' {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            Type::Decimal
        } else {
            Type::Integer
        };

        let text = self.text();
        let value = match ty {
            Type::Decimal => text.parse::<f64>().ok().map(Literal::Float),
            _ => text.parse::<i64>().ok().map(Literal::Int),
        };

        match value {
            Some(value) => Ok(self.make_token_with_val(ty, value)),
            None => Err(Error::InvalidNumber {
                lexeme: text,
                line: self.line,
            }),
        }
    }

    fn identifier(&mut self) -> Token {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' || self.peek() == '$' {
            self.advance();
        }

        // the language is case-insensitive, everything downstream sees the upper-cased form
        let text = self.text().to_ascii_uppercase();
        let ty = Scanner::keyword(&text).unwrap_or(Type::Identifier);
        Token::new(
            ty,
            text,
            self.line,
            self.start - self.line_start,
            Literal::Nothing,
        )
    }

    fn text(&self) -> String {
        self.src[self.start..self.current].iter().collect()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.src[self.current]
        }
    }

    fn advance(&mut self) -> char {
        let res = self.src[self.current];
        self.current += 1;
        res
    }

    fn match_char(&mut self, c: char) -> bool {
        if self.is_at_end() || self.src[self.current] != c {
            false
        } else {
            self.current += 1;
            true
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.src.len()
    }

    fn make_token(&mut self, ty: Type) -> Token {
        self.make_token_with_val(ty, Literal::Nothing)
    }

    fn make_token_with_val(&mut self, ty: Type, val: Literal) -> Token {
        let lexeme = match ty {
            Type::Eof => String::new(),
            _ => self.text(),
        };

        Token::new(ty, lexeme, self.line, self.start - self.line_start, val)
    }
}

impl Iterator for TokenStream {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof || self.error.is_some() {
            return None;
        }

        while !self.is_at_end() {
            self.start = self.current;

            let token = self.scan_token();
            match token {
                Ok(None) => continue,
                Ok(Some(token)) => return Some(token),
                Err(err) => {
                    self.error = Some(err);
                    return None;
                }
            }
        }

        self.eof = true;
        self.start = self.current;
        Some(self.make_token(Type::Eof))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::scanner::Scanner;
    use crate::token::{Literal, Token, Type};

    fn types(src: &str) -> Vec<Type> {
        let mut scanner = Scanner::new();
        scanner.scan_tokens(src).map(|token| token.ty).collect()
    }

    #[test]
    fn test_basic_scanning() {
        let source = "let Foo = 12 + 3.5 ' trailing comment";
        let mut scanner = Scanner::new();
        let stream = scanner.scan_tokens(source);

        assert_eq!(
            stream.collect::<Vec<Token>>(),
            vec![
                Token::new(Type::Let, String::from("LET"), 1, 0, Literal::Nothing),
                Token::new(
                    Type::Identifier,
                    String::from("FOO"),
                    1,
                    4,
                    Literal::Nothing
                ),
                Token::new(Type::Equal, String::from("="), 1, 8, Literal::Nothing),
                Token::new(Type::Integer, String::from("12"), 1, 10, Literal::Int(12)),
                Token::new(Type::Plus, String::from("+"), 1, 13, Literal::Nothing),
                Token::new(
                    Type::Decimal,
                    String::from("3.5"),
                    1,
                    15,
                    Literal::Float(3.5)
                ),
                Token::new(Type::Eof, String::new(), 1, 37, Literal::Nothing),
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            types("While wend End if"),
            vec![Type::While, Type::Wend, Type::End, Type::If, Type::Eof]
        );
    }

    #[test]
    fn test_identifiers_with_dollar_sign() {
        let mut scanner = Scanner::new();
        let tokens: Vec<Token> = scanner.scan_tokens("chr$(65)").collect();
        assert_eq!(tokens[0].ty, Type::Identifier);
        assert_eq!(tokens[0].lexeme, "CHR$");
    }

    #[test]
    fn test_relational_operators() {
        assert_eq!(
            types("< <= <> > >= ="),
            vec![
                Type::Less,
                Type::LessEqual,
                Type::NotEqual,
                Type::Greater,
                Type::GreaterEqual,
                Type::Equal,
                Type::Eof
            ]
        );
    }

    #[test]
    fn test_decimal_and_integer_literals() {
        let mut scanner = Scanner::new();
        let values: Vec<Literal> = scanner
            .scan_tokens("7 7.0 7.")
            .map(|token| token.value)
            .collect();
        assert_eq!(
            values,
            vec![
                Literal::Int(7),
                Literal::Float(7.0),
                Literal::Float(7.0),
                Literal::Nothing
            ]
        );
    }

    #[test]
    fn test_string_keeps_case_and_drops_quotes() {
        let mut scanner = Scanner::new();
        let token = scanner.scan_tokens("\"Hello, World\"").next().unwrap();
        assert_eq!(token.ty, Type::String);
        assert_eq!(token.value, Literal::from("Hello, World"));
    }

    #[test]
    fn test_newlines_are_tokens_and_counted() {
        let mut scanner = Scanner::new();
        let tokens: Vec<Token> = scanner.scan_tokens("a\n\nb").collect();
        assert_eq!(
            tokens.iter().map(|token| token.ty).collect::<Vec<Type>>(),
            vec![
                Type::Identifier,
                Type::Newline,
                Type::Newline,
                Type::Identifier,
                Type::Eof
            ]
        );
        assert_eq!(tokens[3].line, 3);
    }

    #[test]
    fn test_scan_from_line() {
        let mut scanner = Scanner::new();
        let token = scanner.scan_tokens_from("x", 42).next().unwrap();
        assert_eq!(token.line, 42);
    }

    #[test]
    fn test_unterminated_string() {
        let source = "\"hello\nworld\"";
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens(source);
        stream.by_ref().last();

        assert_eq!(
            stream.error().unwrap(),
            &Error::UnterminatedString { line: 1 }
        );
    }

    #[test]
    fn test_illegal_character() {
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens("x = 1\ny = #");
        stream.by_ref().last();

        assert_eq!(
            stream.error().unwrap(),
            &Error::IllegalCharacter {
                ch: '#',
                line: 2,
                col: 4
            }
        );
        assert_eq!(
            stream.error().unwrap().to_string(),
            "Illegal character: \"#\""
        );
    }
}

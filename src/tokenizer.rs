use std::{fmt::Display, iter::Peekable};

use crate::{
    span::Span,
    symbol::{Interner, Symbol},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Defun,
    End,
    Return,
    Let,
    If,
    Then,
    Else,
    Do,
}

impl Keyword {
    fn from_spelling(spelling: &str) -> Option<Keyword> {
        match spelling {
            "defun" => Some(Keyword::Defun),
            "end" => Some(Keyword::End),
            "return" => Some(Keyword::Return),
            "let" => Some(Keyword::Let),
            "if" => Some(Keyword::If),
            "then" => Some(Keyword::Then),
            "else" => Some(Keyword::Else),
            "do" => Some(Keyword::Do),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,
    Equals,
    Terminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Dot,
}

/// Binding strength of a token in infix position. `None` means the token
/// does not continue an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Term,   // + -
    Factor, // * /
    Call,   // . ()
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    Keyword(Keyword),
    Delimiter(Delimiter),
    Operator(Operator),
    Identifier(Symbol),
    String(String),
    Number(f64),
}

impl Eq for TokenType {}

impl TokenType {
    pub fn precedence(&self) -> Precedence {
        match self {
            TokenType::Operator(Operator::Plus | Operator::Minus) => Precedence::Term,
            TokenType::Operator(Operator::Star | Operator::Slash) => Precedence::Factor,
            TokenType::Operator(Operator::Dot) | TokenType::Delimiter(Delimiter::OpenParen) => {
                Precedence::Call
            }
            _ => Precedence::None,
        }
    }

    /// Whether a newline directly after this token ends the statement.
    fn permits_terminator(&self) -> bool {
        matches!(
            self,
            TokenType::Number(_)
                | TokenType::Identifier(_)
                | TokenType::Delimiter(Delimiter::CloseParen | Delimiter::CloseBracket)
                | TokenType::Keyword(Keyword::Return)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub span: Span,
}

impl Token {
    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("Unexpected character {character:?} at {span}")]
    UnexpectedCharacter { character: char, span: Span },
    #[error("Invalid number literal \"{text}\" at {span}")]
    InvalidNumber { text: String, span: Span },
    #[error("Unterminated string starting at {span}")]
    UnterminatedString { span: Span },
}

/// Lazily turns a character stream into tokens, with one token of lookahead.
///
/// End of input is `Ok(None)`, never an error.
pub struct Tokenizer<'i, I: Iterator<Item = char>> {
    chars: Peekable<I>,
    interner: &'i mut Interner,
    line: usize,
    column: usize,
    terminator_ok: bool,
    peeked: Option<Result<Option<Token>, LexError>>,
}

impl<'i, I: Iterator<Item = char>> Tokenizer<'i, I> {
    pub fn new(
        source: impl IntoIterator<Item = char, IntoIter = I>,
        interner: &'i mut Interner,
    ) -> Self {
        Self {
            chars: source.into_iter().peekable(),
            interner,
            line: 1,
            column: 1,
            terminator_ok: false,
            peeked: None,
        }
    }

    pub fn peek(&mut self) -> Result<Option<&Token>, LexError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.scan());
        }
        match &self.peeked {
            Some(Ok(token)) => Ok(token.as_ref()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(None),
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        match self.peeked.take() {
            Some(peeked) => peeked,
            None => self.scan(),
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span_from(&self, line: usize, column: usize) -> Span {
        Span {
            start_line: line,
            start_column: column,
            end_line: self.line,
            end_column: self.column,
        }
    }

    fn scan(&mut self) -> Result<Option<Token>, LexError> {
        while let Some(&c) = self.chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            let (line, column) = (self.line, self.column);
            self.advance();
            if c == '\n' && self.terminator_ok {
                self.terminator_ok = false;
                return Ok(Some(Token {
                    token_type: TokenType::Delimiter(Delimiter::Terminator),
                    span: Span::point(line, column),
                }));
            }
        }

        let (line, column) = (self.line, self.column);
        let Some(c) = self.advance() else {
            return Ok(None);
        };

        let result = match c {
            ';' => Ok(TokenType::Delimiter(Delimiter::Terminator)),
            '(' => Ok(TokenType::Delimiter(Delimiter::OpenParen)),
            ')' => Ok(TokenType::Delimiter(Delimiter::CloseParen)),
            '[' => Ok(TokenType::Delimiter(Delimiter::OpenBracket)),
            ']' => Ok(TokenType::Delimiter(Delimiter::CloseBracket)),
            ',' => Ok(TokenType::Delimiter(Delimiter::Comma)),
            '=' => Ok(TokenType::Delimiter(Delimiter::Equals)),
            '+' => Ok(TokenType::Operator(Operator::Plus)),
            '-' => Ok(TokenType::Operator(Operator::Minus)),
            '*' => Ok(TokenType::Operator(Operator::Star)),
            '/' => Ok(TokenType::Operator(Operator::Slash)),
            '.' => Ok(TokenType::Operator(Operator::Dot)),
            '"' => self.string(line, column),
            c if c.is_numeric() => self.number(c, line, column),
            c if is_identifier_char(c) => Ok(self.identifier_or_keyword(c)),
            character => Err(LexError::UnexpectedCharacter {
                character,
                span: self.span_from(line, column),
            }),
        };

        match result {
            Ok(token_type) => {
                self.terminator_ok = token_type.permits_terminator();
                Ok(Some(Token {
                    token_type,
                    span: self.span_from(line, column),
                }))
            }
            Err(e) => {
                self.terminator_ok = false;
                Err(e)
            }
        }
    }

    fn take_while(&mut self, first: char, predicate: impl Fn(char) -> bool) -> String {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !predicate(c) {
                break;
            }
            self.advance();
            text.push(c);
        }
        text
    }

    fn number(&mut self, first: char, line: usize, column: usize) -> Result<TokenType, LexError> {
        let text = self.take_while(first, |c| is_identifier_char(c) || c == '.');
        match text.parse::<f64>() {
            Ok(n) => Ok(TokenType::Number(n)),
            Err(_) => Err(LexError::InvalidNumber {
                text,
                span: self.span_from(line, column),
            }),
        }
    }

    fn identifier_or_keyword(&mut self, first: char) -> TokenType {
        let text = self.take_while(first, is_identifier_char);
        match Keyword::from_spelling(&text) {
            Some(keyword) => TokenType::Keyword(keyword),
            None => TokenType::Identifier(self.interner.intern(&text)),
        }
    }

    fn string(&mut self, line: usize, column: usize) -> Result<TokenType, LexError> {
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(TokenType::String(text)),
                Some(c) => text.push(c),
                None => {
                    return Err(LexError::UnterminatedString {
                        span: self.span_from(line, column),
                    })
                }
            }
        }
    }
}

impl<I: Iterator<Item = char>> Iterator for Tokenizer<'_, I> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let word = match self {
            Keyword::Defun => "defun",
            Keyword::End => "end",
            Keyword::Return => "return",
            Keyword::Let => "let",
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Else => "else",
            Keyword::Do => "do",
        };
        write!(f, "{word}")
    }
}

impl Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Delimiter::OpenParen => "(",
            Delimiter::CloseParen => ")",
            Delimiter::OpenBracket => "[",
            Delimiter::CloseBracket => "]",
            Delimiter::Comma => ",",
            Delimiter::Equals => "=",
            Delimiter::Terminator => ";",
        };
        write!(f, "{symbol}")
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Dot => ".",
        };
        write!(f, "{symbol}")
    }
}

impl Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Keyword(k) => write!(f, "{k}"),
            TokenType::Delimiter(d) => write!(f, "{d}"),
            TokenType::Operator(o) => write!(f, "{o}"),
            TokenType::Identifier(name) => write!(f, "{name}"),
            TokenType::String(s) => write!(f, "{s:?}"),
            TokenType::Number(n) => write!(f, "{n}"),
        }
    }
}

//! Indentation-sensitive lexer.
//!
//! Tokens are produced one at a time on demand; the most recently produced
//! token stays available through [`Lexer::current`]. Block structure is
//! surfaced as synthesized `Indent`/`Dedent` tokens derived from leading
//! spaces (two spaces per level), at most one level change per token
//! request. Deeper dedents push two spaces back into the character stream so
//! the following requests re-enter indentation parsing and emit the
//! remaining levels.

use std::str::Chars;

use thiserror::Error;

use crate::token::Token;

/// Punctuation accepted as single-character tokens.
const PUNCTUATION: &[char] = &['=', '.', ',', '(', ')', '+', '-', '*', '/', '<', '>', ':'];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexerError {
    #[error("Invalid number of spaces")]
    InvalidIndent,
    #[error("Invalid char")]
    InvalidChar(char),
    #[error("Unterminated string")]
    UnterminatedString,
    #[error("Invalid number literal '{literal}'")]
    InvalidNumber { literal: String },
    #[error("Expected {expected}, got {found}")]
    UnexpectedToken { expected: String, found: String },
}

pub type LexResult<T> = Result<T, LexerError>;

pub struct Lexer<'a> {
    input: Chars<'a>,
    pushback: Vec<char>,
    current: Token,
    current_indent: usize,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    /// Builds a lexer over `input` and primes the first token.
    pub fn new(input: &'a str) -> LexResult<Self> {
        let mut lexer = Self {
            input: input.chars(),
            pushback: Vec::new(),
            current: Token::Eof,
            current_indent: 0,
            at_line_start: true,
        };
        lexer.next_token()?;
        Ok(lexer)
    }

    /// The most recently produced token. Does not consume.
    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Advances to the next token and returns it.
    ///
    /// Once `Eof` has been produced, further calls keep returning `Eof`.
    pub fn next_token(&mut self) -> LexResult<&Token> {
        self.current = self.read_token()?;
        Ok(&self.current)
    }

    /// Fails unless the current token equals `expected`.
    pub fn expect(&self, expected: &Token) -> LexResult<&Token> {
        if &self.current == expected {
            Ok(&self.current)
        } else {
            Err(self.unexpected(expected.to_string()))
        }
    }

    /// Fails unless the current token is an identifier; returns its spelling.
    pub fn expect_id(&self) -> LexResult<&str> {
        match self.current.as_id() {
            Some(name) => Ok(name),
            None => Err(self.unexpected("Id".to_string())),
        }
    }

    /// Advances, then fails unless the new current token equals `expected`.
    pub fn expect_next(&mut self, expected: &Token) -> LexResult<&Token> {
        self.next_token()?;
        self.expect(expected)
    }

    /// Advances, then fails unless the new current token is an identifier.
    pub fn expect_next_id(&mut self) -> LexResult<&str> {
        self.next_token()?;
        self.expect_id()
    }

    fn unexpected(&self, expected: String) -> LexerError {
        LexerError::UnexpectedToken {
            expected,
            found: self.current.to_string(),
        }
    }

    fn get_char(&mut self) -> Option<char> {
        if let Some(c) = self.pushback.pop() {
            return Some(c);
        }
        self.input.next()
    }

    fn put_back(&mut self, c: char) {
        self.pushback.push(c);
    }

    fn peek_char(&mut self) -> Option<char> {
        let c = self.get_char()?;
        self.put_back(c);
        Some(c)
    }

    fn read_token(&mut self) -> LexResult<Token> {
        while let Some(c) = self.get_char() {
            match c {
                '\n' => {
                    // Newlines on empty lines produce nothing.
                    if self.at_line_start {
                        continue;
                    }
                    return Ok(self.newline());
                }
                ' ' => {
                    if self.at_line_start {
                        self.at_line_start = false;
                        self.put_back(' ');
                        if let Some(token) = self.lex_indentation()? {
                            return Ok(token);
                        }
                    }
                }
                other => {
                    // A line whose first significant character sits left of
                    // the open block closes one level per token request.
                    if self.at_line_start && self.current_indent > 0 {
                        self.put_back(other);
                        return Ok(self.dedent());
                    }
                    if other.is_ascii_alphabetic() || other == '_' {
                        self.at_line_start = false;
                        return Ok(self.lex_identifier(other));
                    }
                    if other.is_ascii_digit() {
                        self.at_line_start = false;
                        return self.lex_number(other);
                    }
                    if other == '"' || other == '\'' {
                        self.at_line_start = false;
                        return self.lex_string(other);
                    }
                    if other == '#' {
                        if let Some(token) = self.lex_comment() {
                            return Ok(token);
                        }
                        continue;
                    }
                    if other.is_ascii_punctuation() {
                        self.at_line_start = false;
                        return self.lex_operator(other);
                    }
                    // Bytes outside every lexical class (tabs, carriage
                    // returns, other control characters) produce nothing.
                }
            }
        }
        // End of input: finish the last logical line, then close the open
        // blocks one level at a time.
        if !self.at_line_start {
            return Ok(self.newline());
        }
        if self.current_indent > 0 {
            return Ok(self.dedent());
        }
        Ok(Token::Eof)
    }

    /// Counts leading spaces and turns the difference from the open depth
    /// into at most one `Indent`/`Dedent`. On a dedent of more than one
    /// level, two spaces are pushed back and line-start mode re-entered so
    /// the remaining levels come out of subsequent requests.
    fn lex_indentation(&mut self) -> LexResult<Option<Token>> {
        let mut spaces = 0usize;
        while let Some(c) = self.get_char() {
            match c {
                '\n' => return Ok(None), // the line holds no code
                ' ' => spaces += 1,
                _ => {
                    self.put_back(c);
                    if spaces % 2 != 0 {
                        return Err(LexerError::InvalidIndent);
                    }
                    let target = spaces / 2;
                    if target > self.current_indent {
                        self.current_indent += 1;
                        return Ok(Some(Token::Indent));
                    }
                    if target < self.current_indent {
                        if target < self.current_indent - 1 {
                            self.at_line_start = true;
                            self.put_back(' ');
                            self.put_back(' ');
                        }
                        return Ok(Some(self.dedent()));
                    }
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    fn dedent(&mut self) -> Token {
        self.current_indent -= 1;
        Token::Dedent
    }

    fn newline(&mut self) -> Token {
        self.at_line_start = true;
        Token::Newline
    }

    /// Consumes through the end of the line. Emits the pending `Newline`
    /// when the comment trails code; a whole-line comment emits nothing.
    fn lex_comment(&mut self) -> Option<Token> {
        while let Some(c) = self.get_char() {
            if c == '\n' {
                break;
            }
        }
        if self.at_line_start {
            None
        } else {
            Some(self.newline())
        }
    }

    fn lex_identifier(&mut self, first: char) -> Token {
        let mut spelling = String::from(first);
        while let Some(c) = self.get_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                spelling.push(c);
            } else {
                self.put_back(c);
                break;
            }
        }
        Token::keyword(&spelling).unwrap_or(Token::Id(spelling))
    }

    fn lex_number(&mut self, first: char) -> LexResult<Token> {
        let mut literal = String::from(first);
        while let Some(c) = self.get_char() {
            if c.is_ascii_digit() {
                literal.push(c);
            } else {
                self.put_back(c);
                break;
            }
        }
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexerError::InvalidNumber { literal })?;
        Ok(Token::Number(value))
    }

    fn lex_string(&mut self, open_quote: char) -> LexResult<Token> {
        let mut value = String::new();
        loop {
            let Some(c) = self.get_char() else {
                return Err(LexerError::UnterminatedString);
            };
            match c {
                '\\' => {
                    let Some(escaped) = self.get_char() else {
                        return Err(LexerError::UnterminatedString);
                    };
                    let decoded = match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '"' => '"',
                        '\'' => '\'',
                        '\\' => '\\',
                        other => other,
                    };
                    value.push(decoded);
                }
                '"' | '\'' => {
                    if c == open_quote {
                        break;
                    }
                    // The other kind of quote is taken verbatim.
                    value.push(c);
                }
                _ => value.push(c),
            }
        }
        Ok(Token::String(value))
    }

    fn lex_operator(&mut self, first: char) -> LexResult<Token> {
        if matches!(first, '<' | '>' | '!' | '=') && self.peek_char() == Some('=') {
            self.get_char();
            let spelling = format!("{first}=");
            return Token::keyword(&spelling).ok_or(LexerError::InvalidChar(first));
        }
        if PUNCTUATION.contains(&first) {
            return Ok(Token::Char(first));
        }
        Err(LexerError::InvalidChar(first))
    }
}

/// Drains a fresh lexer over `input` into the complete token stream,
/// terminated by `Eof`.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(input)?;
    let mut tokens = vec![lexer.current().clone()];
    while !lexer.current().is_eof() {
        tokens.push(lexer.next_token()?.clone());
    }
    Ok(tokens)
}

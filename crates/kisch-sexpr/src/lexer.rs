//! Tokenizer for the KiCad S-expression grammar.
//!
//! Every token carries the byte range of the trivia (whitespace and `;`
//! comments) that precedes it, so the tree built on top can reproduce the
//! input exactly.

use std::ops::Range;

use crate::{Expected, SyntaxError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    LParen,
    RParen,
    Symbol,
    Number,
    /// Quoted string; holds the unescaped value.
    String(String),
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) leading: Range<usize>,
    pub(crate) span: Range<usize>,
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Lexer {
            input,
            chars: input.char_indices().peekable(),
            current_pos: 0,
        }
    }

    pub(crate) fn input(&self) -> &'a str {
        self.input
    }

    pub(crate) fn next_token(&mut self) -> Result<Token, SyntaxError> {
        let trivia_start = self.current_pos;
        self.skip_trivia();
        let leading = trivia_start..self.current_pos;
        let start = self.current_pos;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some('(') => {
                self.advance();
                TokenKind::LParen
            }
            Some(')') => {
                self.advance();
                TokenKind::RParen
            }
            Some('"') => TokenKind::String(self.lex_string()?),
            Some(_) => self.lex_atom()?,
        };

        Ok(Token {
            kind,
            leading,
            span: start..self.current_pos,
        })
    }

    fn lex_atom(&mut self) -> Result<TokenKind, SyntaxError> {
        let start = self.current_pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || ch == '(' || ch == ')' {
                break;
            }
            self.advance();
        }

        let text = &self.input[start..self.current_pos];
        if !looks_numeric(text) {
            return Ok(TokenKind::Symbol);
        }
        if is_decimal(text) {
            Ok(TokenKind::Number)
        } else {
            Err(SyntaxError {
                offset: start,
                expected: Expected::Number,
            })
        }
    }

    fn lex_string(&mut self) -> Result<String, SyntaxError> {
        let start = self.current_pos;
        let unterminated = SyntaxError {
            offset: start,
            expected: Expected::ClosingQuote,
        };
        self.advance();
        let mut result = String::new();

        loop {
            match self.peek_char() {
                None => return Err(unterminated),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some('n') => result.push('\n'),
                        Some('r') => result.push('\r'),
                        Some('t') => result.push('\t'),
                        Some(ch) => result.push(ch),
                        None => return Err(unterminated),
                    }
                    self.advance();
                }
                Some(ch) => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Ok(result)
    }

    fn skip_trivia(&mut self) {
        let start_pos = self.current_pos;
        let mut skipped = 0usize;

        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == ';' {
                while let Some(ch) = self.peek_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }

            skipped += 1;
            if skipped % 10000 == 0 {
                log::trace!("Skipped {skipped} trivia chars starting at position {start_pos}");
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn advance(&mut self) {
        if let Some((pos, ch)) = self.chars.next() {
            self.current_pos = pos + ch.len_utf8();
        }
    }
}

/// A token "looks numeric" when it is an optional sign followed only by
/// digits and dots. Such tokens must be valid decimals; anything else (UUIDs,
/// identifiers, `-1V8` style net names) is a symbol.
fn looks_numeric(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    body.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// A lone sign, a lone dot or more than one dot is not a number.
fn is_decimal(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    body.matches('.').count() <= 1 && body.chars().any(|c| c.is_ascii_digit())
}

//! `Scanner`-based tokenizer for the `{{...}}` template syntax.
//!
//! Produces a flat stream of cursor-range tokens; [`super`] assembles them
//! into nested sections and performs substitution. Kept flat (rather than a
//! recursive-descent parser) because section nesting by name is resolved a
//! level at a time in the renderer, the same split the teacher's cloze
//! tokenizer makes between matching delimiters and interpreting them.

use std::ops::Range;
use unscanny::Scanner;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// Literal text, not inside `{{...}}`.
    Text(Range<usize>),
    /// `{{expr}}`, where `expr` may be `Field` or `filter:Field`.
    Reference { expr: Range<usize> },
    /// `{{#Field}}`.
    SectionOpen { name: Range<usize> },
    /// `{{^Field}}`.
    SectionOpenNegated { name: Range<usize> },
    /// `{{/Field}}`.
    SectionClose { name: Range<usize> },
}

pub struct Lexer<'a> {
    s: Scanner<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { s: Scanner::new(input) }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let text_start = self.s.cursor();
            self.s.eat_until("{{");
            if self.s.cursor() > text_start {
                tokens.push(Token::Text(text_start..self.s.cursor()));
            }
            if self.s.done() {
                break;
            }
            // consume "{{"
            self.s.eat_if("{{");
            let tag_start = self.s.cursor();
            self.s.eat_until("}}");
            let tag_body = tag_start..self.s.cursor();
            if self.s.eat_if("}}") {
                tokens.push(classify(&self.s.string()[tag_body.clone()], tag_body));
            } else {
                // Unterminated tag: treat everything from the opener onward
                // as literal text.
                tokens.push(Token::Text((tag_start - 2)..self.s.cursor()));
            }
        }
        tokens
    }
}

fn classify(body: &str, range: Range<usize>) -> Token {
    if let Some(rest) = body.strip_prefix('#') {
        Token::SectionOpen {
            name: (range.start + 1)..(range.start + 1 + rest.len()),
        }
    } else if let Some(rest) = body.strip_prefix('^') {
        Token::SectionOpenNegated {
            name: (range.start + 1)..(range.start + 1 + rest.len()),
        }
    } else if let Some(rest) = body.strip_prefix('/') {
        Token::SectionClose {
            name: (range.start + 1)..(range.start + 1 + rest.len()),
        }
    } else {
        Token::Reference { expr: range }
    }
}

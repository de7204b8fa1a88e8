//! Quote-aware argument tokenizer.
//!
//! Splits a line into arguments on a separator character while keeping quoted
//! spans together. Quotes nest: a span opened inside another span must be closed
//! before the outer one, and only the outermost pair is stripped from the token.
//!
//! Quote recognition is positional:
//!
//! - a start quote is only recognized when the character *before* it is a
//!   boundary (start of input, whitespace, the separator, or another quote);
//! - an end quote is only recognized when the character *after* it is a
//!   boundary (end of input, whitespace, the separator, or another quote);
//! - with escaping enabled, a quote directly preceded by `\` is never a quote.
//!
//! A start quote followed by whitespace still opens a span. The start check
//! never looks ahead.
//!
//! Escapes are not removed from the output: `\"` stays `\"`.

use crate::config::DispatchConfig;
use crate::error::TokenizeError;

/// Options controlling tokenization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerOptions {
    /// Argument separator.
    pub separator: char,
    /// Characters that open a quoted span.
    pub start_quotes: Vec<char>,
    /// Characters that close a quoted span.
    pub end_quotes: Vec<char>,
    /// Whether `\` disables the quote character after it.
    pub allow_escaping: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for TokenizerOptions {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            separator: config.separator,
            start_quotes: config.start_quotes.clone(),
            end_quotes: config.end_quotes.clone(),
            allow_escaping: config.allow_escaping,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteMark {
    Start,
    End,
}

/// Result of the first pass: every recognized quote plus aggregate counts.
#[derive(Debug, Default)]
struct QuoteScan {
    marks: Vec<(usize, QuoteMark)>,
    starts: usize,
    ends: usize,
    first_start: Option<usize>,
    last_end: Option<usize>,
}

impl QuoteScan {
    /// True when the first quote opens at index 0 and its partner is the last
    /// character of the input.
    fn encloses_whole_input(&self, len: usize) -> bool {
        if self.first_start != Some(0) || self.last_end != Some(len.saturating_sub(1)) {
            return false;
        }
        let mut depth = 0usize;
        for (i, (_, mark)) in self.marks.iter().enumerate() {
            match mark {
                QuoteMark::Start => depth += 1,
                QuoteMark::End => depth -= 1,
            }
            if depth == 0 {
                return i == self.marks.len() - 1;
            }
        }
        false
    }
}

struct Scanner<'a> {
    chars: &'a [char],
    options: &'a TokenizerOptions,
}

impl Scanner<'_> {
    fn is_quote(&self, c: char) -> bool {
        self.options.start_quotes.contains(&c) || self.options.end_quotes.contains(&c)
    }

    fn is_boundary(&self, c: char) -> bool {
        c.is_whitespace() || c == self.options.separator || self.is_quote(c)
    }

    fn is_escaped(&self, i: usize) -> bool {
        self.options.allow_escaping && i > 0 && self.chars[i - 1] == '\\'
    }

    fn is_valid_start(&self, i: usize) -> bool {
        self.options.start_quotes.contains(&self.chars[i])
            && !self.is_escaped(i)
            && (i == 0 || self.is_boundary(self.chars[i - 1]))
    }

    fn is_valid_end(&self, i: usize) -> bool {
        self.options.end_quotes.contains(&self.chars[i])
            && !self.is_escaped(i)
            && self
                .chars
                .get(i + 1)
                .is_none_or(|&next| self.is_boundary(next))
    }

    fn scan(&self) -> Result<QuoteScan, TokenizeError> {
        let mut scan = QuoteScan::default();
        let mut depth = 0usize;

        for i in 0..self.chars.len() {
            let mark = match (self.is_valid_start(i), self.is_valid_end(i)) {
                (true, true) if depth > 0 => QuoteMark::End,
                (true, _) => QuoteMark::Start,
                (false, true) => QuoteMark::End,
                (false, false) => continue,
            };

            match mark {
                QuoteMark::Start => {
                    depth += 1;
                    scan.starts += 1;
                    scan.first_start.get_or_insert(i);
                }
                QuoteMark::End => {
                    if depth == 0 {
                        return Err(TokenizeError::QuoteMismatch { position: i });
                    }
                    depth -= 1;
                    scan.ends += 1;
                    scan.last_end = Some(i);
                }
            }
            scan.marks.push((i, mark));
        }

        if depth != 0 {
            return Err(TokenizeError::QuoteMismatch {
                position: self.chars.len(),
            });
        }
        Ok(scan)
    }

    /// Split an unquoted region on separators, collapsing runs.
    fn split_unquoted(&self, start: usize, end: usize, tokens: &mut Vec<String>) {
        let mut piece_start = start;
        for i in start..end {
            let is_split = self.chars[i] == self.options.separator
                && !(i > start && self.chars[i - 1] == self.options.separator);
            if is_split {
                self.push_piece(piece_start, i, tokens);
                piece_start = i + 1;
            } else if self.chars[i] == self.options.separator {
                piece_start = i + 1;
            }
        }
        self.push_piece(piece_start, end, tokens);
    }

    fn push_piece(&self, start: usize, end: usize, tokens: &mut Vec<String>) {
        if start >= end {
            return;
        }
        let piece: String = self.chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            tokens.push(trimmed.to_string());
        }
    }

    fn quoted(&self, open: usize, close: usize) -> String {
        let inner: String = self.chars[open + 1..close].iter().collect();
        inner.trim().to_string()
    }

    fn split(&self, scan: &QuoteScan) -> Vec<String> {
        let len = self.chars.len();
        let mut tokens = Vec::new();

        let Some(first_start) = scan.first_start else {
            self.split_unquoted(0, len, &mut tokens);
            return tokens;
        };

        if scan.encloses_whole_input(len) {
            tokens.push(self.quoted(0, len - 1));
            return tokens;
        }

        self.split_unquoted(0, first_start, &mut tokens);

        let marks = &scan.marks;
        let mut k = 0;
        while k < marks.len() {
            let open = marks[k].0;

            // Skip past nested spans to this start's partner.
            let mut nested = 0usize;
            let mut j = k + 1;
            while j < marks.len() {
                match marks[j].1 {
                    QuoteMark::Start => nested += 1,
                    QuoteMark::End if nested == 0 => break,
                    QuoteMark::End => nested -= 1,
                }
                j += 1;
            }
            let Some(&(close, _)) = marks.get(j) else {
                break;
            };

            tokens.push(self.quoted(open, close));

            k = j + 1;
            let next_open = marks.get(k).map_or(len, |&(i, _)| i);
            self.split_unquoted(close + 1, next_open, &mut tokens);
        }

        tokens
    }
}

/// Split `input` into trimmed argument tokens.
///
/// Returns [`TokenizeError::QuoteMismatch`] when quotes do not balance.
pub fn tokenize(input: &str, options: &TokenizerOptions) -> Result<Vec<String>, TokenizeError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = input.trim().chars().collect();
    let scanner = Scanner {
        chars: &chars,
        options,
    };
    let scan = scanner.scan()?;
    debug_assert_eq!(scan.starts, scan.ends);
    Ok(scanner.split(&scan))
}

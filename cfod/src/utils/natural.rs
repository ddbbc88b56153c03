//! Natural ("human") ordering of file names, so that `chunk_2` sorts before
//! `chunk_10`.

use std::cmp::Ordering;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Number(&'a str),
}

fn tokens(text: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (i, c) in text.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                out.push(token(&text[start..i], prev));
                start = i;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }

    if let Some(digit) = in_digits {
        out.push(token(&text[start..], digit));
    }

    out
}

fn token(s: &str, digit: bool) -> Token<'_> {
    if digit { Token::Number(s) } else { Token::Text(s) }
}

fn cmp_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compares two strings treating runs of ASCII digits as numbers.
///
/// Numbers sort before text at the same position.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ta, tb) = (tokens(a), tokens(b));

    for (x, y) in ta.iter().zip(&tb) {
        let ord = match (x, y) {
            (Token::Number(x), Token::Number(y)) => cmp_numbers(x, y),
            (Token::Text(x), Token::Text(y)) => x.cmp(y),
            (Token::Number(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    ta.len().cmp(&tb.len()).then_with(|| a.cmp(b))
}

/// Sorts paths in natural order of their full string form.
pub fn sort_paths<P: AsRef<Path>>(paths: &mut [P]) {
    paths.sort_by(|a, b| {
        natural_cmp(
            &a.as_ref().to_string_lossy(),
            &b.as_ref().to_string_lossy(),
        )
    });
}

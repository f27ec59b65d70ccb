//! Tokenizer for the advanced search language.
//!
//! All offsets are character offsets into the query.

use super::tree::{AttributePath, BinaryOperator, Literal, QuantityLiteral, Span, UnaryOperator};
use crate::schema::PathSegment;
use crate::units::UnitRegistry;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Literal(Literal),
    Binary(BinaryOperator),
    Unary(UnaryOperator),
    OpenParen,
    CloseParen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// A fatal problem in the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: &'static str,
    pub start: usize,
    pub end: Option<usize>,
}

impl SyntaxError {
    pub fn new(message: &'static str, start: usize, end: Option<usize>) -> Self {
        Self {
            message,
            start,
            end,
        }
    }
}

const DELIMITERS: &[char] = &['(', ')', '"', '=', '!', '<', '>', '#', '&', '|'];

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || DELIMITERS.contains(&c)
}

/// Split a query into tokens.
pub fn tokenize(query: &str, units: &UnitRegistry) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = query.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let next = chars.get(pos + 1).copied();
        let start = pos;

        let (kind, end) = match (c, next) {
            (c, _) if c.is_whitespace() => {
                pos += 1;
                continue;
            }
            ('(', _) => (TokenKind::OpenParen, pos + 1),
            (')', _) => (TokenKind::CloseParen, pos + 1),
            ('=', Some('=')) => (TokenKind::Binary(BinaryOperator::Equal), pos + 2),
            ('!', Some('=')) => (TokenKind::Binary(BinaryOperator::NotEqual), pos + 2),
            ('<', Some('=')) => (TokenKind::Binary(BinaryOperator::LessEqual), pos + 2),
            ('>', Some('=')) => (TokenKind::Binary(BinaryOperator::GreaterEqual), pos + 2),
            ('&', Some('&')) => (TokenKind::Binary(BinaryOperator::And), pos + 2),
            ('|', Some('|')) => (TokenKind::Binary(BinaryOperator::Or), pos + 2),
            ('<', _) => (TokenKind::Binary(BinaryOperator::Less), pos + 1),
            ('>', _) => (TokenKind::Binary(BinaryOperator::Greater), pos + 1),
            ('!', _) => (TokenKind::Unary(UnaryOperator::Not), pos + 1),
            ('=', _) | ('&', _) | ('|', _) => {
                return Err(SyntaxError::new(
                    "Unable to parse literal",
                    start,
                    Some(start + 1),
                ));
            }
            ('"', _) => scan_text(&chars, start)?,
            ('#', _) => scan_tag(&chars, start)?,
            _ => {
                let end = scan_word(&chars, start);
                let word: String = chars[start..end].iter().collect();
                (classify_word(&word, start, end, chars.len(), units)?, end)
            }
        };

        tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
        pos = end;
    }

    let placeholders: usize = tokens
        .iter()
        .map(|t| match &t.kind {
            TokenKind::Literal(Literal::Attribute(path)) => path.placeholder_count(),
            _ => 0,
        })
        .sum();
    if placeholders > 1 {
        return Err(SyntaxError::new(
            "Multiple array placeholders",
            0,
            Some(chars.len()),
        ));
    }

    Ok(tokens)
}

fn scan_word(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && !is_delimiter(chars[end]) {
        end += 1;
    }
    end
}

fn scan_text(chars: &[char], start: usize) -> Result<(TokenKind, usize), SyntaxError> {
    let mut text = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            '"' => return Ok((TokenKind::Literal(Literal::Text(text)), pos + 1)),
            '\\' if matches!(chars.get(pos + 1), Some('"') | Some('\\')) => {
                text.push(chars[pos + 1]);
                pos += 2;
            }
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }
    Err(SyntaxError::new("Unfinished text", start, Some(chars.len())))
}

fn scan_tag(chars: &[char], start: usize) -> Result<(TokenKind, usize), SyntaxError> {
    let end = scan_word(chars, start + 1);
    let name: String = chars[start + 1..end].iter().collect();
    if !is_valid_tag(&name) {
        return Err(SyntaxError::new("Invalid tag", start + 1, Some(end)));
    }
    Ok((TokenKind::Literal(Literal::Tag(name)), end))
}

/// Tags consist of lowercase letters, digits, `_` and `-`.
pub fn is_valid_tag(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| (c.is_alphanumeric() && !c.is_uppercase()) || c == '_' || c == '-')
}

fn classify_word(
    word: &str,
    start: usize,
    end: usize,
    query_end: usize,
    units: &UnitRegistry,
) -> Result<TokenKind, SyntaxError> {
    let keyword = match word.to_lowercase().as_str() {
        "and" => Some(TokenKind::Binary(BinaryOperator::And)),
        "or" => Some(TokenKind::Binary(BinaryOperator::Or)),
        "not" => Some(TokenKind::Unary(UnaryOperator::Not)),
        "in" => Some(TokenKind::Binary(BinaryOperator::In)),
        "on" => Some(TokenKind::Binary(BinaryOperator::On)),
        "before" => Some(TokenKind::Binary(BinaryOperator::Before)),
        "after" => Some(TokenKind::Binary(BinaryOperator::After)),
        _ => None,
    };
    if let Some(kind) = keyword {
        return Ok(kind);
    }

    match word {
        "True" => return Ok(TokenKind::Literal(Literal::Boolean(true))),
        "False" => return Ok(TokenKind::Literal(Literal::Boolean(false))),
        _ => {}
    }

    if looks_like_date(word) {
        return NaiveDate::parse_from_str(word, "%Y-%m-%d")
            .map(|date| TokenKind::Literal(Literal::Date(date)))
            .map_err(|_| SyntaxError::new("Unable to parse literal", start, Some(end)));
    }

    if let Some(magnitude_len) = magnitude_prefix_len(word) {
        let (magnitude_text, unit_text) = word.split_at(magnitude_len);
        let magnitude: f64 = magnitude_text
            .parse()
            .map_err(|_| SyntaxError::new("Unable to parse literal", start, Some(end)))?;
        let units_start = start + magnitude_text.chars().count();
        // unit errors extend to the end of the query, not of the token
        let quantity = units
            .quantity(magnitude, unit_text)
            .map_err(|_| SyntaxError::new("Unable to parse units", units_start, Some(query_end)))?;
        return Ok(TokenKind::Literal(Literal::Quantity(QuantityLiteral {
            magnitude,
            units: unit_text.to_string(),
            quantity,
        })));
    }

    parse_attribute(word, start, end).map(|path| TokenKind::Literal(Literal::Attribute(path)))
}

fn looks_like_date(word: &str) -> bool {
    let bytes = word.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Length in bytes of the leading number of `word`, if it starts with one.
fn magnitude_prefix_len(word: &str) -> Option<usize> {
    let bytes = word.as_bytes();
    let mut pos = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        pos += 1;
    }
    let digits_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let mut has_digits = pos > digits_start;
    if pos < bytes.len() && bytes[pos] == b'.' {
        let fraction_start = pos + 1;
        let mut fraction_end = fraction_start;
        while fraction_end < bytes.len() && bytes[fraction_end].is_ascii_digit() {
            fraction_end += 1;
        }
        if has_digits || fraction_end > fraction_start {
            has_digits = true;
            pos = fraction_end;
        }
    }
    if !has_digits {
        return None;
    }
    // exponent only when digits follow, so `5em` keeps `em` as units
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exponent = pos + 1;
        if exponent < bytes.len() && (bytes[exponent] == b'+' || bytes[exponent] == b'-') {
            exponent += 1;
        }
        if exponent < bytes.len() && bytes[exponent].is_ascii_digit() {
            while exponent < bytes.len() && bytes[exponent].is_ascii_digit() {
                exponent += 1;
            }
            pos = exponent;
        }
    }
    Some(pos)
}

fn parse_attribute(word: &str, start: usize, end: usize) -> Result<AttributePath, SyntaxError> {
    let mut segments = Vec::new();
    for segment in word.split('.') {
        if segment == "?" {
            segments.push(PathSegment::Placeholder);
        } else if segment.contains('?') {
            return Err(SyntaxError::new(
                "Invalid array placeholder",
                start,
                Some(end),
            ));
        } else if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
            let index = segment
                .parse()
                .map_err(|_| SyntaxError::new("Unable to parse literal", start, Some(end)))?;
            segments.push(PathSegment::Index(index));
        } else if is_identifier(segment) {
            segments.push(PathSegment::Key(segment.to_string()));
        } else {
            return Err(SyntaxError::new(
                "Unable to parse literal",
                start,
                Some(end),
            ));
        }
    }
    Ok(AttributePath(segments))
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(query: &str) -> Vec<TokenKind> {
        tokenize(query, &UnitRegistry::new())
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn error(query: &str) -> SyntaxError {
        tokenize(query, &UnitRegistry::new()).unwrap_err()
    }

    fn attribute(path: &str) -> TokenKind {
        TokenKind::Literal(Literal::Attribute(
            parse_attribute(path, 0, path.len()).unwrap(),
        ))
    }

    #[test]
    fn operators_and_keywords() {
        assert_eq!(
            kinds("a == b and not c || d"),
            vec![
                attribute("a"),
                TokenKind::Binary(BinaryOperator::Equal),
                attribute("b"),
                TokenKind::Binary(BinaryOperator::And),
                TokenKind::Unary(UnaryOperator::Not),
                attribute("c"),
                TokenKind::Binary(BinaryOperator::Or),
                attribute("d"),
            ]
        );
        assert_eq!(
            kinds("a<=b>c!d AND e"),
            vec![
                attribute("a"),
                TokenKind::Binary(BinaryOperator::LessEqual),
                attribute("b"),
                TokenKind::Binary(BinaryOperator::Greater),
                attribute("c"),
                TokenKind::Unary(UnaryOperator::Not),
                attribute("d"),
                TokenKind::Binary(BinaryOperator::And),
                attribute("e"),
            ]
        );
    }

    #[test]
    fn literals() {
        let tokens = kinds(r#"True False "a \"b\"" #tag 2021-03-04"#);
        assert_eq!(tokens[0], TokenKind::Literal(Literal::Boolean(true)));
        assert_eq!(tokens[1], TokenKind::Literal(Literal::Boolean(false)));
        assert_eq!(tokens[2], TokenKind::Literal(Literal::Text("a \"b\"".into())));
        assert_eq!(tokens[3], TokenKind::Literal(Literal::Tag("tag".into())));
        assert_eq!(
            tokens[4],
            TokenKind::Literal(Literal::Date(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()))
        );
        // booleans are case-sensitive
        assert_eq!(kinds("true"), vec![attribute("true")]);
    }

    #[test]
    fn quantities() {
        let tokens = kinds("20mm -1.5e3 .5kg");
        let TokenKind::Literal(Literal::Quantity(q)) = &tokens[0] else {
            panic!("expected quantity");
        };
        assert_eq!(q.magnitude, 20.0);
        assert_eq!(q.units, "mm");
        assert!((q.quantity.magnitude_in_base_units - 0.02).abs() < 1e-12);

        let TokenKind::Literal(Literal::Quantity(q)) = &tokens[1] else {
            panic!("expected quantity");
        };
        assert_eq!(q.magnitude, -1500.0);
        assert!(q.quantity.dimensionality.is_dimensionless());

        let TokenKind::Literal(Literal::Quantity(q)) = &tokens[2] else {
            panic!("expected quantity");
        };
        assert!((q.quantity.magnitude_in_base_units - 0.5).abs() < 1e-12);
    }

    #[test]
    fn token_spans_are_character_offsets() {
        let tokens = tokenize("\"äöü\" in name", &UnitRegistry::new()).unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 5));
        assert_eq!(tokens[1].span, Span::new(6, 8));
        assert_eq!(tokens[2].span, Span::new(9, 13));
    }

    #[test]
    fn attribute_paths() {
        let tokens = kinds("array_attr.?.bool_attr list.0.name");
        assert_eq!(
            tokens[0],
            TokenKind::Literal(Literal::Attribute(AttributePath(vec![
                PathSegment::Key("array_attr".into()),
                PathSegment::Placeholder,
                PathSegment::Key("bool_attr".into()),
            ])))
        );
        assert_eq!(
            tokens[1],
            TokenKind::Literal(Literal::Attribute(AttributePath(vec![
                PathSegment::Key("list".into()),
                PathSegment::Index(0),
                PathSegment::Key("name".into()),
            ])))
        );
    }

    #[test]
    fn unfinished_text() {
        assert_eq!(
            error(r#"name == "abc"#),
            SyntaxError::new("Unfinished text", 8, Some(12))
        );
    }

    #[test]
    fn invalid_tag_spans_name_only() {
        assert_eq!(error("#Tag"), SyntaxError::new("Invalid tag", 1, Some(4)));
        assert_eq!(error("a and #"), SyntaxError::new("Invalid tag", 7, Some(7)));
        assert!(is_valid_tag("ab-c_1"));
        assert!(!is_valid_tag("a.b"));
    }

    #[test]
    fn invalid_units() {
        assert_eq!(
            error("length == 1furlong"),
            SyntaxError::new("Unable to parse units", 11, Some(18))
        );
        // an exponent needs digits, so `em` is taken as units
        assert_eq!(
            error("5em"),
            SyntaxError::new("Unable to parse units", 1, Some(3))
        );
        assert_eq!(
            error("length == 1furlong and name == \"x\""),
            SyntaxError::new("Unable to parse units", 11, Some(34))
        );
    }

    #[test]
    fn oversized_unit_exponents() {
        assert_eq!(
            error("length == 1Pa^100"),
            SyntaxError::new("Unable to parse units", 11, Some(17))
        );
        assert_eq!(
            error("1m^-128/m"),
            SyntaxError::new("Unable to parse units", 1, Some(9))
        );
    }

    #[test]
    fn invalid_dates_and_words() {
        assert_eq!(
            error("2021-13-45"),
            SyntaxError::new("Unable to parse literal", 0, Some(10))
        );
        assert_eq!(
            error("a == $x"),
            SyntaxError::new("Unable to parse literal", 5, Some(7))
        );
        assert_eq!(error("a = b"), SyntaxError::new("Unable to parse literal", 2, Some(3)));
    }

    #[test]
    fn placeholders() {
        assert_eq!(
            error("array_attr.??.bool_attr"),
            SyntaxError::new("Invalid array placeholder", 0, Some(23))
        );
        assert_eq!(
            error("array_attr.?.?.bool_attr"),
            SyntaxError::new("Multiple array placeholders", 0, Some(24))
        );
        // counted across the whole query, not per path
        assert_eq!(
            error("a.?.b and c.?.d"),
            SyntaxError::new("Multiple array placeholders", 0, Some(15))
        );
    }
}

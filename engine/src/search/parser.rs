//! Precedence parser for the advanced search language.
//!
//! Precedence from lowest to highest: `or`, `and`, `not`, comparison
//! operators, literals and parenthesized groups. Parsing stops at the first
//! syntax error.

use super::diagnostics::Diagnostics;
use super::token::{tokenize, SyntaxError, Token, TokenKind};
use super::tree::{BinaryOperator, Node, Span, UnaryOperator};
use crate::units::UnitRegistry;

/// Parse a query into an expression tree.
///
/// An empty (or whitespace-only) query has no tree and no diagnostics.
pub fn parse(query: &str, units: &UnitRegistry) -> (Option<Node>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let result = tokenize(query, units).and_then(|tokens| {
        if tokens.is_empty() {
            return Ok(None);
        }
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            query_len: query.chars().count(),
        };
        parser.parse_query().map(Some)
    });

    match result {
        Ok(tree) => (tree, diagnostics),
        Err(error) => {
            tracing::debug!(message = error.message, start = error.start, "search query rejected");
            diagnostics.error(error.message, error.start, error.end);
            (None, diagnostics)
        }
    }
}

/// What the operand currently being parsed belongs to.
#[derive(Debug, Clone, Copy)]
enum Context {
    /// The start of the query or of a parenthesized group
    Start,
    /// The right side of a binary operator
    RightOperand(Span),
    /// The operand of `not`
    UnaryOperand(Span),
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    query_len: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn parse_query(&mut self) -> Result<Node, SyntaxError> {
        let tree = self.parse_or(Context::Start)?;
        match self.peek() {
            None => Ok(tree),
            Some(token) if token.kind == TokenKind::CloseParen => Err(SyntaxError::new(
                "Unmatched closing parenthesis",
                token.span.start,
                Some(token.span.end),
            )),
            Some(token) => Err(missing_operator(token)),
        }
    }

    /// Consume the next token if it is one of `operators`.
    fn eat_binary(&mut self, operators: &[BinaryOperator]) -> Option<(BinaryOperator, Span)> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Binary(op),
                span,
            }) if operators.contains(op) => {
                self.pos += 1;
                Some((*op, *span))
            }
            _ => None,
        }
    }

    fn parse_or(&mut self, context: Context) -> Result<Node, SyntaxError> {
        let mut left = self.parse_and(context)?;
        while let Some((op, span)) = self.eat_binary(&[BinaryOperator::Or]) {
            let right = self.parse_and(Context::RightOperand(span))?;
            left = Node::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self, context: Context) -> Result<Node, SyntaxError> {
        let mut left = self.parse_not(context)?;
        while let Some((op, span)) = self.eat_binary(&[BinaryOperator::And]) {
            let right = self.parse_not(Context::RightOperand(span))?;
            left = Node::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self, context: Context) -> Result<Node, SyntaxError> {
        if let Some(Token {
            kind: TokenKind::Unary(UnaryOperator::Not),
            span,
        }) = self.peek()
        {
            self.pos += 1;
            let operand = self.parse_not(Context::UnaryOperand(*span))?;
            let node_span = span.join(operand.span);
            return Ok(Node::unary(UnaryOperator::Not, operand, node_span));
        }
        self.parse_comparison(context)
    }

    fn parse_comparison(&mut self, context: Context) -> Result<Node, SyntaxError> {
        const COMPARISONS: &[BinaryOperator] = &[
            BinaryOperator::Equal,
            BinaryOperator::NotEqual,
            BinaryOperator::Less,
            BinaryOperator::LessEqual,
            BinaryOperator::Greater,
            BinaryOperator::GreaterEqual,
            BinaryOperator::On,
            BinaryOperator::Before,
            BinaryOperator::After,
            BinaryOperator::In,
        ];

        let mut left = self.parse_atom(context)?;
        while let Some((op, span)) = self.eat_binary(COMPARISONS) {
            let right = self.parse_atom(Context::RightOperand(span))?;
            left = Node::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_atom(&mut self, context: Context) -> Result<Node, SyntaxError> {
        let Some(token) = self.peek() else {
            return Err(self.missing_operand(context, None));
        };

        match &token.kind {
            TokenKind::Literal(literal) => {
                self.pos += 1;
                Ok(Node::literal(literal.clone(), token.span))
            }
            TokenKind::Unary(_) => self.parse_not(context),
            TokenKind::OpenParen => self.parse_group(),
            TokenKind::CloseParen | TokenKind::Binary(_) => {
                Err(self.missing_operand(context, Some(token)))
            }
        }
    }

    fn parse_group(&mut self) -> Result<Node, SyntaxError> {
        let open = self.advance().map(|t| t.span).unwrap_or(Span::new(0, 0));

        if let Some(close) = self.peek().filter(|t| t.kind == TokenKind::CloseParen) {
            let span = open.join(close.span);
            if span.start == 0 && span.end == self.query_len {
                return Err(SyntaxError::new("Empty search", span.start, Some(span.end)));
            }
            return Err(SyntaxError::new(
                "Invalid search query (missing operator)",
                open.start,
                None,
            ));
        }

        let inner = self.parse_or(Context::Start)?;
        match self.peek() {
            Some(close) if close.kind == TokenKind::CloseParen => {
                self.pos += 1;
                Ok(Node::parenthesized(inner, open.join(close.span)))
            }
            None => Err(SyntaxError::new(
                "Unmatched opening parenthesis",
                open.start,
                Some(open.end),
            )),
            Some(token) => Err(missing_operator(token)),
        }
    }

    /// Error for an operand that should start at `found`.
    fn missing_operand(&self, context: Context, found: Option<&Token>) -> SyntaxError {
        match context {
            Context::RightOperand(op) => SyntaxError::new(
                "Binary operator without right operand",
                op.start,
                Some(self.query_len),
            ),
            Context::UnaryOperand(op) => SyntaxError::new(
                "Unary operator without operand",
                op.start,
                Some(self.query_len),
            ),
            Context::Start => match found {
                Some(token) if token.kind == TokenKind::CloseParen => SyntaxError::new(
                    "Unmatched closing parenthesis",
                    token.span.start,
                    Some(token.span.end),
                ),
                Some(token) => SyntaxError::new(
                    "Binary operator without left operand",
                    token.span.start,
                    Some(token.span.end),
                ),
                None => SyntaxError::new("Empty search", 0, Some(self.query_len)),
            },
        }
    }
}

fn missing_operator(token: &Token) -> SyntaxError {
    SyntaxError::new(
        "Invalid search query (missing operator)",
        token.span.start,
        None,
    )
}

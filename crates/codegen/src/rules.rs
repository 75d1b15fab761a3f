//! The Pratt parser table: one [`Rule`] per token kind, mapping it to the
//! functions that compile it in prefix or infix position.

use basalt_syn::TokenKind;

use crate::compiler::Parser;

/// Binding power of an operator, ordered from loosest to tightest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// The next tighter level. Used to parse left-associative operators:
    /// the right operand of `a - b` binds one level above `-` itself.
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

pub(crate) type ParseFn<'src, 'heap> = fn(&mut Parser<'src, 'heap>, bool);

pub(crate) struct Rule<'src, 'heap> {
    pub prefix: Option<ParseFn<'src, 'heap>>,
    pub infix: Option<ParseFn<'src, 'heap>>,
    pub precedence: Precedence,
}

impl<'src, 'heap> Rule<'src, 'heap> {
    fn none() -> Self {
        Rule {
            prefix: None,
            infix: None,
            precedence: Precedence::None,
        }
    }

    fn prefix(f: ParseFn<'src, 'heap>) -> Self {
        Rule {
            prefix: Some(f),
            infix: None,
            precedence: Precedence::None,
        }
    }

    fn infix(f: ParseFn<'src, 'heap>, precedence: Precedence) -> Self {
        Rule {
            prefix: None,
            infix: Some(f),
            precedence,
        }
    }

    fn both(prefix: ParseFn<'src, 'heap>, infix: ParseFn<'src, 'heap>, precedence: Precedence) -> Self {
        Rule {
            prefix: Some(prefix),
            infix: Some(infix),
            precedence,
        }
    }
}

/// Look up the parse rule for a token kind.
///
/// Token kinds missing from the table parse as neither prefix nor infix,
/// so hitting one in expression position reports `Expect expression.`.
pub(crate) fn rule<'src, 'heap>(kind: TokenKind) -> Rule<'src, 'heap> {
    match kind {
        TokenKind::LParen => Rule::both(Parser::grouping, Parser::call, Precedence::Call),
        TokenKind::Sub => Rule::both(Parser::unary, Parser::binary, Precedence::Term),
        TokenKind::Add => Rule::infix(Parser::binary, Precedence::Term),
        TokenKind::Mul | TokenKind::Div => Rule::infix(Parser::binary, Precedence::Factor),
        TokenKind::Not => Rule::prefix(Parser::unary),
        TokenKind::Eq | TokenKind::Neq => Rule::infix(Parser::binary, Precedence::Equality),
        TokenKind::Gt | TokenKind::Ge | TokenKind::Lt | TokenKind::Le => {
            Rule::infix(Parser::binary, Precedence::Comparison)
        }
        TokenKind::Ident => Rule::prefix(Parser::variable),
        TokenKind::Str => Rule::prefix(Parser::string),
        TokenKind::Num => Rule::prefix(Parser::number),
        TokenKind::AndKw => Rule::infix(Parser::and_op, Precedence::And),
        TokenKind::OrKw => Rule::infix(Parser::or_op, Precedence::Or),
        TokenKind::FalseKw | TokenKind::NilKw | TokenKind::TrueKw => Rule::prefix(Parser::literal),
        _ => Rule::none(),
    }
}

use pretty_assertions::assert_eq;

use crate::{Lexer, TokenKind};
use TokenKind::*;

fn kinds(src: &str) -> Vec<TokenKind> {
    Lexer::new(src).map(|t| t.kind).collect()
}

fn kinds_and_lines(src: &str) -> Vec<(TokenKind, u32)> {
    Lexer::new(src).map(|t| (t.kind, t.line)).collect()
}

#[test]
fn scans_operators_and_punctuation() {
    assert_eq!(
        kinds("( ) { } ; , . - + * / ! != = == < <= > >="),
        vec![
            LParen, RParen, LBrace, RBrace, Semicolon, Comma, Dot, Sub, Add, Mul, Div, Not, Neq,
            Assign, Eq, Lt, Le, Gt, Ge,
        ]
    );
}

#[test]
fn keywords_win_only_on_exact_match() {
    assert_eq!(
        kinds("fun funny and android var variable nil nils"),
        vec![FunKw, Ident, AndKw, Ident, VarKw, Ident, NilKw, Ident]
    );
}

#[test]
fn reserved_words_are_scanned() {
    assert_eq!(kinds("class this super"), vec![ClassKw, ThisKw, SuperKw]);
}

#[test]
fn numbers_do_not_eat_trailing_dots() {
    assert_eq!(kinds("123 1.5 1. .5"), vec![Num, Num, Num, Dot, Dot, Num]);
}

#[test]
fn comments_run_to_end_of_line() {
    assert_eq!(
        kinds_and_lines("1 // the rest is ignored\n2"),
        vec![(Num, 1), (Num, 2)]
    );
}

#[test]
fn line_numbers_advance_per_newline() {
    let src = "var a;\n\na =\n1;";
    assert_eq!(
        kinds_and_lines(src),
        vec![
            (VarKw, 1),
            (Ident, 1),
            (Semicolon, 1),
            (Ident, 3),
            (Assign, 3),
            (Num, 4),
            (Semicolon, 4),
        ]
    );
}

#[test]
fn strings_may_span_lines() {
    let toks: Vec<_> = Lexer::new("\"a\nb\" x").collect();
    assert_eq!(toks[0].kind, Str);
    assert_eq!(toks[0].text, "\"a\nb\"");
    assert_eq!(toks[0].line, 1);
    // the identifier after the literal sits on the literal's last line
    assert_eq!(toks[1].kind, Ident);
    assert_eq!(toks[1].line, 2);
}

#[test]
fn unterminated_strings_have_their_own_kind() {
    assert_eq!(kinds("\"runs off"), vec![UnterminatedStr]);
}

#[test]
fn unexpected_characters_become_error_tokens() {
    assert_eq!(kinds("1 @ 2"), vec![Num, Error, Num]);
}

#[test]
fn eof_token_is_sticky() {
    let mut lexer = Lexer::new("x");
    assert_eq!(lexer.next_token().kind, Ident);
    assert_eq!(lexer.next_token().kind, Eof);
    assert_eq!(lexer.next_token().kind, Eof);
    assert_eq!(lexer.next_token().span, 1..1);
}

#[test]
fn spans_index_the_source() {
    let src = "var answer = 42;";
    let lexer = Lexer::new(src);
    for tok in lexer {
        assert_eq!(&src[tok.span.clone()], tok.text);
    }
}

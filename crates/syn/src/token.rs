use logos::{Lexer, Logos, Skip};

/// Line accounting carried through the lexer. Lines are 1-based.
pub struct LexLines {
    pub line: u32,
}

impl Default for LexLines {
    fn default() -> Self {
        LexLines { line: 1 }
    }
}

fn lex_newline(lex: &mut Lexer<TokenKind>) -> Skip {
    lex.extras.line += 1;
    Skip
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(extras = LexLines)]
pub enum TokenKind {
    // === Aux tokens ===
    /// Newline. Counted into the line tally, never yielded.
    #[regex(r"\n", lex_newline)]
    Newline,

    /// Anything that doesn't match
    #[error]
    #[regex(r"[ \t\r]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    Error,

    /// Synthesized by [`Lexer`](crate::Lexer) once input runs out
    Eof,

    // === Keywords ===
    #[token("and")]
    AndKw,
    #[token("class")]
    ClassKw,
    #[token("else")]
    ElseKw,
    #[token("false")]
    FalseKw,
    #[token("for")]
    ForKw,
    #[token("fun")]
    FunKw,
    #[token("if")]
    IfKw,
    #[token("nil")]
    NilKw,
    #[token("or")]
    OrKw,
    #[token("print")]
    PrintKw,
    #[token("return")]
    ReturnKw,
    #[token("super")]
    SuperKw,
    #[token("this")]
    ThisKw,
    #[token("true")]
    TrueKw,
    #[token("var")]
    VarKw,
    #[token("while")]
    WhileKw,

    // === Identifiers ===
    #[regex(r"[a-zA-Z_][0-9a-zA-Z_]*")]
    Ident,

    // === Literal tokens ===
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Num,

    /// A string literal. May span lines; there are no escape sequences.
    #[regex(r#""[^"]*""#)]
    Str,
    /// A string literal missing its closing quote
    #[regex(r#""[^"]*"#)]
    UnterminatedStr,

    // === Operators ===
    #[token("+")]
    Add,
    #[token("-")]
    Sub,
    #[token("*")]
    Mul,
    #[token("/")]
    Div,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token("==")]
    Eq,
    #[token("!=")]
    Neq,
    #[token("=")]
    Assign,
    #[token("!")]
    Not,

    // === Punctuation ===
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
}

//! The single-pass compiler. A Pratt parser walks the token stream and
//! emits bytecode as it parses; there is no syntax tree in between.
//!
//! Parse errors do not abort compilation. The parser enters panic mode,
//! swallows further errors, and resynchronizes at the next statement
//! boundary, so one pass reports every error it can recover into.

use basalt_bytecode::inst::{Argc, ConstIdx, IParamType, Inst, Rel, Slot, UpSlot};
use basalt_bytecode::obj::Function;
use basalt_bytecode::{Heap, ObjRef, Val};
use basalt_syn::{Lexer, Token, TokenKind};
use smol_str::SmolStr;
use tracing::{debug, trace};
use vec1::Vec1;

use crate::error::{CompileError, ErrorAt};
use crate::rules::{self, Precedence};
use crate::scope::{self, FnCompiler, FnKind, LocalSlot, UpvalueDesc};

pub(crate) fn compile(source: &str, heap: &mut Heap) -> Result<ObjRef, Vec<CompileError>> {
    let mut parser = Parser::new(source, heap);
    parser.advance();
    while !parser.matches(TokenKind::Eof) {
        parser.declaration();
    }
    let result = parser.finish();
    match &result {
        Ok(_) => debug!("compiled {} bytes of source", source.len()),
        Err(errors) => debug!("compilation failed with {} error(s)", errors.len()),
    }
    result
}

/// Where a variable reference resolved to.
enum VarTarget {
    Local(u8),
    Upvalue(u8),
    Global(u8),
}

pub(crate) struct Parser<'src, 'heap> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    heap: &'heap mut Heap,
    /// One compiler per function currently being compiled, the script at
    /// the bottom and the innermost `fun` on top.
    compilers: Vec1<FnCompiler<'src>>,
    errors: Vec<CompileError>,
    panic_mode: bool,
}

impl<'src, 'heap> Parser<'src, 'heap> {
    pub fn new(source: &'src str, heap: &'heap mut Heap) -> Parser<'src, 'heap> {
        let placeholder = Token {
            kind: TokenKind::Eof,
            text: "",
            span: 0..0,
            line: 1,
        };
        Parser {
            lexer: Lexer::new(source),
            current: placeholder.clone(),
            previous: placeholder,
            heap,
            compilers: Vec1::new(FnCompiler::new(FnKind::Script, None)),
            errors: Vec::new(),
            panic_mode: false,
        }
    }

    /// Finish the script and hand back its function, or every collected
    /// error if there were any.
    pub fn finish(mut self) -> Result<ObjRef, Vec<CompileError>> {
        self.emit_return();
        let compiler = self
            .compilers
            .into_vec()
            .into_iter()
            .next()
            .expect("The compiler stack always holds the script compiler");
        let upvalues = compiler.upvalues.into_inner();
        let fun = Function {
            arity: compiler.arity,
            upvalue_count: upvalues.len(),
            chunk: compiler.chunk,
            name: compiler.fun_name,
        };
        let script = self.heap.alloc_fun(fun);
        if self.errors.is_empty() {
            Ok(script)
        } else {
            Err(self.errors)
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    /// Step to the next real token, reporting (and skipping) any invalid
    /// tokens the scanner produced on the way.
    pub fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            self.current = self.lexer.next_token();
            match self.current.kind {
                TokenKind::Error => self.error_at_current("Unexpected character."),
                TokenKind::UnterminatedStr => self.error_at_current("Unterminated string."),
                _ => break,
            }
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &'static str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ------------------------------------------------------------------
    // Error reporting
    // ------------------------------------------------------------------

    fn describe(token: &Token<'_>) -> (u32, ErrorAt) {
        let at = match token.kind {
            TokenKind::Eof => ErrorAt::Eof,
            // invalid tokens have no lexeme worth pointing at
            TokenKind::Error | TokenKind::UnterminatedStr => ErrorAt::Bare,
            _ => ErrorAt::Lexeme(SmolStr::new(token.text)),
        };
        (token.line, at)
    }

    /// Report an error at the token just consumed.
    fn error(&mut self, message: &'static str) {
        let (line, at) = Self::describe(&self.previous);
        self.error_at(line, at, message);
    }

    /// Report an error at the token about to be consumed.
    fn error_at_current(&mut self, message: &'static str) {
        let (line, at) = Self::describe(&self.current);
        self.error_at(line, at, message);
    }

    fn error_at(&mut self, line: u32, at: ErrorAt, message: &'static str) {
        // one report per panic; the rest is likely cascade noise
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.errors.push(CompileError::new(line, at, message));
    }

    /// Leave panic mode by skipping forward to a statement boundary.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::ClassKw
                | TokenKind::FunKw
                | TokenKind::VarKw
                | TokenKind::ForKw
                | TokenKind::IfKw
                | TokenKind::WhileKw
                | TokenKind::PrintKw
                | TokenKind::ReturnKw => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn fun(&self) -> &FnCompiler<'src> {
        self.compilers.last()
    }

    fn fun_mut(&mut self) -> &mut FnCompiler<'src> {
        self.compilers.last_mut()
    }

    fn emit(&mut self, inst: Inst) {
        let line = self.previous.line;
        self.compilers.last_mut().chunk.emit(inst, line);
    }

    fn emit_p(&mut self, inst: Inst, param: impl IParamType) {
        let line = self.previous.line;
        self.compilers.last_mut().chunk.emit_p(inst, param, line);
    }

    /// The implicit return at the end of every function body: the return
    /// value of a body that falls off the end is `nil`.
    fn emit_return(&mut self) {
        self.emit(Inst::PushNil);
        self.emit(Inst::Return);
    }

    fn make_constant(&mut self, v: Val) -> u8 {
        let idx = self.fun_mut().chunk.add_constant(v);
        if idx > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        idx as u8
    }

    fn emit_constant(&mut self, v: Val) {
        let idx = self.make_constant(v);
        self.emit_p(Inst::PushConst, ConstIdx(idx));
    }

    /// Add an interned object to the constant table, reusing the slot if
    /// this chunk already refers to it.
    fn obj_constant(&mut self, obj: ObjRef) -> u8 {
        if let Some(&idx) = self.fun().const_cache.get(&obj) {
            return idx;
        }
        let idx = self.make_constant(Val::Obj(obj));
        self.fun_mut().const_cache.insert(obj, idx);
        idx
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let obj = self.heap.intern(name);
        self.obj_constant(obj)
    }

    /// Emit a forward jump with a placeholder distance and return the
    /// offset of the operand, to be patched once the target is known.
    fn emit_jump(&mut self, inst: Inst) -> usize {
        self.emit_p(inst, Rel(u16::MAX));
        self.fun().chunk.len() - 2
    }

    fn patch_jump(&mut self, at: usize) {
        // the distance counts from just past the operand
        let jump = self.fun().chunk.len() - at - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }
        self.fun_mut().chunk.patch_u16(at, jump as u16);
    }

    /// Emit a backward jump to `start`, which must already be behind us.
    fn emit_loop(&mut self, start: usize) {
        // the distance counts from just past the operand, so cover the
        // three bytes of the Loop instruction itself
        let offset = self.fun().chunk.len() - start + 3;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
            return;
        }
        self.emit_p(Inst::Loop, Rel(offset as u16));
    }

    // ------------------------------------------------------------------
    // Declarations and statements
    // ------------------------------------------------------------------

    pub fn declaration(&mut self) {
        if self.matches(TokenKind::FunKw) {
            self.fun_declaration();
        } else if self.matches(TokenKind::VarKw) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // usable inside its own body, so it can recurse
        self.fun_mut().mark_initialized();
        self.function();
        self.define_variable(global);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.matches(TokenKind::Assign) {
            self.expression();
        } else {
            self.emit(Inst::PushNil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    /// Consume a variable name and declare it. Returns the constant index
    /// of the name for globals, or 0 for locals, which live in stack slots
    /// and need no constant.
    fn parse_variable(&mut self, message: &'static str) -> u8 {
        self.consume(TokenKind::Ident, message);
        self.declare_variable();
        if self.fun().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.text;
        self.identifier_constant(name)
    }

    fn declare_variable(&mut self) {
        if self.fun().scope_depth == 0 {
            return;
        }
        let name = self.previous.text;
        if self.fun().is_declared_in_scope(name) {
            self.error("Already a variable with this name in this scope.");
        }
        if let Err(message) = self.fun_mut().add_local(name) {
            self.error(message);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.fun().scope_depth > 0 {
            self.fun_mut().mark_initialized();
            return;
        }
        self.emit_p(Inst::DefineGlobal, ConstIdx(global));
    }

    fn statement(&mut self) {
        if self.matches(TokenKind::PrintKw) {
            self.print_statement();
        } else if self.matches(TokenKind::IfKw) {
            self.if_statement();
        } else if self.matches(TokenKind::ReturnKw) {
            self.return_statement();
        } else if self.matches(TokenKind::WhileKw) {
            self.while_statement();
        } else if self.matches(TokenKind::ForKw) {
            self.for_statement();
        } else if self.matches(TokenKind::LBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn begin_scope(&mut self) {
        self.fun_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let line = self.previous.line;
        self.fun_mut().end_scope(line);
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit(Inst::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit(Inst::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(Inst::JumpIfFalse);
        self.emit(Inst::Pop);
        self.statement();
        let else_jump = self.emit_jump(Inst::Jump);
        self.patch_jump(then_jump);
        self.emit(Inst::Pop);
        if self.matches(TokenKind::ElseKw) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.fun().chunk.len();
        self.consume(TokenKind::LParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(Inst::JumpIfFalse);
        self.emit(Inst::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(Inst::Pop);
    }

    /// Desugars to initializer + while in one pass. The increment clause
    /// runs after the body but sits before it in the bytecode, so the
    /// compiled loop jumps over it going in and back to it going out.
    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LParen, "Expect '(' after 'for'.");
        if self.matches(TokenKind::Semicolon) {
            // no initializer
        } else if self.matches(TokenKind::VarKw) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.fun().chunk.len();
        let mut exit_jump = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(Inst::JumpIfFalse));
            self.emit(Inst::Pop);
        }

        if !self.matches(TokenKind::RParen) {
            let body_jump = self.emit_jump(Inst::Jump);
            let increment_start = self.fun().chunk.len();
            self.expression();
            self.emit(Inst::Pop);
            self.consume(TokenKind::RParen, "Expect ')' after for clauses.");
            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);
        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(Inst::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.fun().kind == FnKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit(Inst::Return);
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Compile a `fun` body. Parses the parameter list and block in a
    /// fresh compiler, then emits the closure creation in the enclosing
    /// one, followed by one (is_local, index) byte pair per capture.
    fn function(&mut self) {
        let name = self.heap.intern(self.previous.text);
        self.compilers.push(FnCompiler::new(FnKind::Function, Some(name)));
        // the body scope; it ends with the call frame, not with end_scope
        self.fun_mut().scope_depth += 1;

        self.consume(TokenKind::LParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RParen) {
            loop {
                if self.fun().arity == u8::MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.fun_mut().arity += 1;
                }
                let param = self.parse_variable("Expect parameter name.");
                self.define_variable(param);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LBrace, "Expect '{' before function body.");
        self.block();

        let (fun, upvalues) = self.end_fn();
        let idx = self.make_constant(Val::Obj(fun));
        self.emit_p(Inst::ClosureNew, ConstIdx(idx));
        let line = self.previous.line;
        let chunk = &mut self.compilers.last_mut().chunk;
        for upvalue in &upvalues {
            chunk.write_u8(upvalue.is_local as u8, line);
            chunk.write_u8(upvalue.index, line);
        }
    }

    fn end_fn(&mut self) -> (ObjRef, Vec<UpvalueDesc>) {
        self.emit_return();
        let compiler = self
            .compilers
            .try_pop()
            .expect("Ending a nested function always leaves its enclosing compiler");
        let upvalues = compiler.upvalues.into_inner();
        let fun = Function {
            arity: compiler.arity,
            upvalue_count: upvalues.len(),
            chunk: compiler.chunk,
            name: compiler.fun_name,
        };
        trace!("compiled function ({} bytes of code)", fun.chunk.len());
        (self.heap.alloc_fun(fun), upvalues)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// The Pratt core: parse anything binding at least as tightly as
    /// `precedence`, starting from a prefix rule and folding infix rules
    /// while they bind tighter.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = match rules::rule(self.previous.kind).prefix {
            Some(f) => f,
            None => {
                self.error("Expect expression.");
                return;
            }
        };
        // only a whole expression may be an assignment target; anything
        // parsed above Assignment precedence cannot absorb the `=`
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rules::rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rules::rule(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.matches(TokenKind::Assign) {
            self.error("Invalid assignment target.");
        }
    }

    pub(crate) fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RParen, "Expect ')' after expression.");
    }

    pub(crate) fn unary(&mut self, _can_assign: bool) {
        let op = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match op {
            TokenKind::Sub => self.emit(Inst::Neg),
            TokenKind::Not => self.emit(Inst::Not),
            _ => unreachable!(),
        }
    }

    pub(crate) fn binary(&mut self, _can_assign: bool) {
        let op = self.previous.kind;
        self.parse_precedence(rules::rule(op).precedence.next());
        match op {
            TokenKind::Add => self.emit(Inst::Add),
            TokenKind::Sub => self.emit(Inst::Sub),
            TokenKind::Mul => self.emit(Inst::Mul),
            TokenKind::Div => self.emit(Inst::Div),
            TokenKind::Eq => self.emit(Inst::Eq),
            TokenKind::Gt => self.emit(Inst::Gt),
            TokenKind::Lt => self.emit(Inst::Lt),
            TokenKind::Neq => {
                self.emit(Inst::Eq);
                self.emit(Inst::Not);
            }
            TokenKind::Ge => {
                self.emit(Inst::Lt);
                self.emit(Inst::Not);
            }
            TokenKind::Le => {
                self.emit(Inst::Gt);
                self.emit(Inst::Not);
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn number(&mut self, _can_assign: bool) {
        match self.previous.text.parse::<f64>() {
            Ok(n) => self.emit_constant(Val::Num(n)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    pub(crate) fn string(&mut self, _can_assign: bool) {
        let text = self.previous.text;
        // trim the surrounding quotes
        let obj = self.heap.intern(&text[1..text.len() - 1]);
        let idx = self.obj_constant(obj);
        self.emit_p(Inst::PushConst, ConstIdx(idx));
    }

    pub(crate) fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::FalseKw => self.emit(Inst::PushFalse),
            TokenKind::TrueKw => self.emit(Inst::PushTrue),
            TokenKind::NilKw => self.emit(Inst::PushNil),
            _ => unreachable!(),
        }
    }

    pub(crate) fn variable(&mut self, can_assign: bool) {
        self.named_variable(can_assign);
    }

    /// Compile a read of, or assignment to, the variable just consumed.
    /// Resolution order: own locals, then enclosing functions (becoming
    /// an upvalue), then a global looked up by name at runtime.
    fn named_variable(&mut self, can_assign: bool) {
        let name = self.previous.text;
        let target = match self.fun().resolve_local(name) {
            LocalSlot::Found(slot) => VarTarget::Local(slot),
            LocalSlot::Uninitialized(slot) => {
                self.error("Can't read local variable in its own initializer.");
                VarTarget::Local(slot)
            }
            LocalSlot::Missing => {
                let upvalue = {
                    let stack: Vec<&FnCompiler<'src>> = self.compilers.iter().collect();
                    scope::resolve_upvalue(&stack, stack.len() - 1, name)
                };
                match upvalue {
                    Ok(Some(idx)) => VarTarget::Upvalue(idx),
                    Ok(None) => VarTarget::Global(self.identifier_constant(name)),
                    Err(message) => {
                        self.error(message);
                        return;
                    }
                }
            }
        };

        let assign = can_assign && self.matches(TokenKind::Assign);
        if assign {
            self.expression();
        }
        match (target, assign) {
            (VarTarget::Local(slot), true) => self.emit_p(Inst::StoreLocal, Slot(slot)),
            (VarTarget::Local(slot), false) => self.emit_p(Inst::LoadLocal, Slot(slot)),
            (VarTarget::Upvalue(idx), true) => self.emit_p(Inst::StoreUpvalue, UpSlot(idx)),
            (VarTarget::Upvalue(idx), false) => self.emit_p(Inst::LoadUpvalue, UpSlot(idx)),
            (VarTarget::Global(idx), true) => self.emit_p(Inst::StoreGlobal, ConstIdx(idx)),
            (VarTarget::Global(idx), false) => self.emit_p(Inst::LoadGlobal, ConstIdx(idx)),
        }
    }

    pub(crate) fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_p(Inst::Call, Argc(argc));
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: usize = 0;
        if !self.check(TokenKind::RParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    count += 1;
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after arguments.");
        count as u8
    }

    /// `and` short-circuits: if the left side is falsey it stays on the
    /// stack as the result and the right side is skipped.
    pub(crate) fn and_op(&mut self, _can_assign: bool) {
        let end = self.emit_jump(Inst::JumpIfFalse);
        self.emit(Inst::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end);
    }

    /// `or` short-circuits the other way around, built from the same
    /// conditional jump: falsey hops into the right side, truthy jumps
    /// over it.
    pub(crate) fn or_op(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(Inst::JumpIfFalse);
        let end = self.emit_jump(Inst::Jump);
        self.patch_jump(else_jump);
        self.emit(Inst::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end);
    }
}

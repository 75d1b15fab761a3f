use basalt_bytecode::debug::disassemble;
use basalt_bytecode::{Chunk, Heap, ObjRef};
use expect_test::expect;
use pretty_assertions::assert_eq;
use test_env_log::test;

use crate::compile;

fn compile_ok(source: &str) -> (Heap, ObjRef) {
    let mut heap = Heap::new();
    let script = compile(source, &mut heap).expect("source should compile");
    (heap, script)
}

fn compile_errors(source: &str) -> Vec<String> {
    let mut heap = Heap::new();
    let errors = compile(source, &mut heap).expect_err("source should not compile");
    errors.iter().map(|e| e.to_string()).collect()
}

fn script_chunk(heap: &Heap, script: ObjRef) -> &Chunk {
    &heap.as_fun(script).expect("script should be a function").chunk
}

/// The function object stored in a chunk's constant table at `idx`.
fn fun_constant<'h>(heap: &'h Heap, chunk: &Chunk, idx: usize) -> &'h Chunk {
    let r = chunk.constants[idx]
        .as_obj()
        .expect("constant should be an object");
    &heap.as_fun(r).expect("constant should be a function").chunk
}

fn assert_disasm(heap: &Heap, chunk: &Chunk, name: &str, expected: &str) {
    let rendered = format!("{}", disassemble(chunk, heap, name));
    let actual = rendered.trim();
    let expected = expected.trim();
    if actual != expected {
        let diff = colored_diff::PrettyDifference { actual, expected };
        panic!("disassembly mismatch (< expected / > actual):\n{}", diff);
    }
}

#[test]
fn compiles_arithmetic_to_a_flat_chunk() {
    let (heap, script) = compile_ok("1 + 2;");
    assert_disasm(
        &heap,
        script_chunk(&heap, script),
        "<script>",
        r#"
== <script> ==
0000    1 PushConst           0 '1'
0002    | PushConst           1 '2'
0004    | Add
0005    | Pop
0006    | PushNil
0007    | Return
"#,
    );
}

#[test]
fn defines_and_reads_globals_by_name() {
    let (heap, script) = compile_ok("var a = 1; print a;");
    assert_disasm(
        &heap,
        script_chunk(&heap, script),
        "<script>",
        r#"
== <script> ==
0000    1 PushConst           1 '1'
0002    | DefineGlobal        0 'a'
0004    | LoadGlobal          0 'a'
0006    | Print
0007    | PushNil
0008    | Return
"#,
    );
}

#[test]
fn locals_resolve_to_stack_slots() {
    let source = r"
{
  var a = 1;
  var b = a;
  print b;
}
"
    .trim();
    let (heap, script) = compile_ok(source);
    assert_disasm(
        &heap,
        script_chunk(&heap, script),
        "<script>",
        r#"
== <script> ==
0000    2 PushConst           0 '1'
0002    3 LoadLocal           1
0004    4 LoadLocal           2
0006    | Print
0007    5 Pop
0008    | Pop
0009    | PushNil
0010    | Return
"#,
    );
}

#[test]
fn if_else_patches_both_jumps() {
    let (heap, script) = compile_ok("if (true) print 1; else print 2;");
    assert_disasm(
        &heap,
        script_chunk(&heap, script),
        "<script>",
        r#"
== <script> ==
0000    1 PushTrue
0001    | JumpIfFalse         7 -> 11
0004    | Pop
0005    | PushConst           0 '1'
0007    | Print
0008    | Jump                4 -> 15
0011    | Pop
0012    | PushConst           1 '2'
0014    | Print
0015    | PushNil
0016    | Return
"#,
    );
}

#[test]
fn while_loops_back_to_the_condition() {
    let (heap, script) = compile_ok("while (false) print 1;");
    assert_disasm(
        &heap,
        script_chunk(&heap, script),
        "<script>",
        r#"
== <script> ==
0000    1 PushFalse
0001    | JumpIfFalse         7 -> 11
0004    | Pop
0005    | PushConst           0 '1'
0007    | Print
0008    | Loop               11 -> 0
0011    | Pop
0012    | PushNil
0013    | Return
"#,
    );
}

#[test]
fn for_jumps_over_the_increment_going_in_and_back_to_it_going_out() {
    let (heap, script) = compile_ok("for (var i = 0; i < 2; i = i + 1) print i;");
    assert_disasm(
        &heap,
        script_chunk(&heap, script),
        "<script>",
        r#"
== <script> ==
0000    1 PushConst           0 '0'
0002    | LoadLocal           1
0004    | PushConst           1 '2'
0006    | Lt
0007    | JumpIfFalse        21 -> 31
0010    | Pop
0011    | Jump               11 -> 25
0014    | LoadLocal           1
0016    | PushConst           2 '1'
0018    | Add
0019    | StoreLocal          1
0021    | Pop
0022    | Loop               23 -> 2
0025    | LoadLocal           1
0027    | Print
0028    | Loop               17 -> 14
0031    | Pop
0032    | Pop
0033    | PushNil
0034    | Return
"#,
    );
}

#[test]
fn and_short_circuits_over_the_right_operand() {
    let (heap, script) = compile_ok("print true and false;");
    assert_disasm(
        &heap,
        script_chunk(&heap, script),
        "<script>",
        r#"
== <script> ==
0000    1 PushTrue
0001    | JumpIfFalse         2 -> 6
0004    | Pop
0005    | PushFalse
0006    | Print
0007    | PushNil
0008    | Return
"#,
    );
}

#[test]
fn functions_compile_params_to_slots_and_calls_to_argc() {
    let (heap, script) = compile_ok("fun add(a, b) { return a + b; } print add(1, 2);");
    let script_chunk = script_chunk(&heap, script);
    assert_disasm(
        &heap,
        script_chunk,
        "<script>",
        r#"
== <script> ==
0000    1 ClosureNew          1 '<fn add>'
0002    | DefineGlobal        0 'add'
0004    | LoadGlobal          0 'add'
0006    | PushConst           2 '1'
0008    | PushConst           3 '2'
0010    | Call                2
0012    | Print
0013    | PushNil
0014    | Return
"#,
    );
    assert_disasm(
        &heap,
        fun_constant(&heap, script_chunk, 1),
        "add",
        r#"
== add ==
0000    1 LoadLocal           1
0002    | LoadLocal           2
0004    | Add
0005    | Return
0006    | PushNil
0007    | Return
"#,
    );
}

#[test]
fn closures_record_their_captures_after_the_instruction() {
    let source = r"
fun outer() {
  var x = 1;
  fun inner() { print x; }
}
"
    .trim();
    let (heap, script) = compile_ok(source);
    let script_chunk = script_chunk(&heap, script);
    assert_disasm(
        &heap,
        script_chunk,
        "<script>",
        r#"
== <script> ==
0000    4 ClosureNew          1 '<fn outer>'
0002    | DefineGlobal        0 'outer'
0004    | PushNil
0005    | Return
"#,
    );
    let outer = fun_constant(&heap, script_chunk, 1);
    assert_disasm(
        &heap,
        outer,
        "outer",
        r#"
== outer ==
0000    2 PushConst           0 '1'
0002    3 ClosureNew          1 '<fn inner>'
0004      |                     local 1
0006    4 PushNil
0007    | Return
"#,
    );
    assert_disasm(
        &heap,
        fun_constant(&heap, outer, 1),
        "inner",
        r#"
== inner ==
0000    3 LoadUpvalue         0
0002    | Print
0003    | PushNil
0004    | Return
"#,
    );
}

#[test]
fn reports_a_missing_variable_name_at_the_offending_token() {
    let errors = compile_errors("var 1 = 2;");
    expect![[r#"[line 1] Error at '1': Expect variable name."#]].assert_eq(&errors[0]);
    assert_eq!(errors.len(), 1);
}

#[test]
fn reports_errors_at_the_end_of_input() {
    let errors = compile_errors("print 1");
    expect![[r#"[line 1] Error at end: Expect ';' after value."#]].assert_eq(&errors[0]);
}

#[test]
fn recovers_at_statement_boundaries_and_keeps_collecting() {
    let source = r"
var 1;
print }
"
    .trim();
    let errors = compile_errors(source);
    assert_eq!(
        errors,
        [
            "[line 1] Error at '1': Expect variable name.",
            "[line 2] Error at '}': Expect expression.",
        ]
    );
}

#[test]
fn rejects_reading_a_local_in_its_own_initializer() {
    let source = r"
{
  var a = a;
}
"
    .trim();
    let errors = compile_errors(source);
    expect![[r#"[line 2] Error at 'a': Can't read local variable in its own initializer."#]]
        .assert_eq(&errors[0]);
}

#[test]
fn rejects_redeclaring_a_local_in_the_same_scope() {
    let source = r"
{
  var a = 1;
  var a = 2;
}
"
    .trim();
    let errors = compile_errors(source);
    expect![[r#"[line 3] Error at 'a': Already a variable with this name in this scope."#]]
        .assert_eq(&errors[0]);
}

#[test]
fn rejects_return_outside_a_function() {
    let errors = compile_errors("return;");
    expect![[r#"[line 1] Error at 'return': Can't return from top-level code."#]]
        .assert_eq(&errors[0]);
}

#[test]
fn rejects_invalid_assignment_targets() {
    let errors = compile_errors("1 + 2 = 3;");
    expect![[r#"[line 1] Error at '=': Invalid assignment target."#]].assert_eq(&errors[0]);
}

#[test]
fn reserved_words_do_not_parse_as_expressions() {
    let errors = compile_errors("class Foo {}");
    expect![[r#"[line 1] Error at 'class': Expect expression."#]].assert_eq(&errors[0]);
}

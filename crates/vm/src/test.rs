use colored_diff::PrettyDifference;
use expect_test::expect;
use pretty_assertions::assert_eq;
use test_env_log::test;

use basalt_bytecode::obj::NativeError;
use basalt_bytecode::Val;

use crate::{InterpretError, RuntimeError, Vm};

/// Run `source` in a fresh VM and capture everything it prints.
fn run(source: &str) -> Result<String, InterpretError> {
    let mut vm = Vm::new();
    let mut out = Vec::new();
    let result = vm.interpret(source, &mut out);
    let printed = String::from_utf8(out).expect("programs print valid UTF-8");
    result.map(|()| printed)
}

fn assert_prints(source: &str, expected: &str) {
    let printed = match run(source) {
        Ok(printed) => printed,
        Err(e) => panic!("program failed:\n{}", e),
    };
    let expected = expected.trim();
    let actual = printed.trim();
    if actual != expected {
        panic!(
            "output mismatch (< expected / > actual):\n{}",
            PrettyDifference { expected, actual }
        );
    }
}

fn runtime_error(source: &str) -> RuntimeError {
    match run(source) {
        Err(InterpretError::Runtime(e)) => e,
        Err(e) => panic!("expected a runtime error, got:\n{}", e),
        Ok(printed) => panic!("expected a runtime error, program printed:\n{}", printed),
    }
}

#[test]
fn arithmetic_follows_precedence() {
    assert_prints("print 1 + 2 * 3 - 8 / 4;", "5");
}

#[test]
fn grouping_and_negation_compose() {
    assert_prints("print -(1 + 2) * 3;", "-9");
}

#[test]
fn print_shows_every_value_kind() {
    assert_prints(
        r#"
print nil;
print true;
print false;
print 2.5;
print "text";
fun f() {}
print f;
"#,
        r#"
nil
true
false
2.5
text
<fn f>
"#,
    );
}

#[test]
fn equality_and_truthiness_follow_value_rules() {
    assert_prints(
        r#"
print 1 == 1;
print 1 == 2;
print "a" == "a";
print nil == false;
print !nil;
print !0;
print !"";
"#,
        r#"
true
false
true
false
true
false
false
"#,
    );
}

#[test]
fn comparisons_order_numbers() {
    assert_prints(
        r#"
print 1 < 2;
print 2 > 1;
print 1 <= 1;
print 2 >= 3;
print 1 != 2;
"#,
        r#"
true
true
true
false
true
"#,
    );
}

#[test]
fn comparing_non_numbers_is_an_error() {
    let e = runtime_error(r#"print 1 < "one";"#);
    expect![[r#"Operands must be numbers."#]].assert_eq(e.message());
}

#[test]
fn adding_mixed_types_is_an_error() {
    let e = runtime_error(r#"print "one" + 1;"#);
    expect![[r#"Operands must be two numbers or two strings."#]].assert_eq(e.message());
}

#[test]
fn negating_a_non_number_is_an_error() {
    let e = runtime_error(r#"print -"x";"#);
    expect![[r#"Operand must be a number."#]].assert_eq(e.message());
}

#[test]
fn concatenated_strings_intern_to_one_object() {
    assert_prints(
        r#"
print "foo" + "bar" == "foobar";
var a = "du" + "plex";
var b = "dup" + "lex";
print a == b;
"#,
        r#"
true
true
"#,
    );
}

#[test]
fn globals_define_read_and_reassign() {
    assert_prints(
        r#"
var a = 1;
var b = a + 1;
a = b * 2;
print a;
var a = "redefined";
print a;
"#,
        r#"
4
redefined
"#,
    );
}

#[test]
fn assignment_yields_the_assigned_value() {
    assert_prints("var a = 1; print a = 2;", "2");
}

#[test]
fn block_scope_shadows_and_restores() {
    assert_prints(
        r#"
var a = 1;
{
  var a = 2;
  print a;
}
print a;
"#,
        r#"
2
1
"#,
    );
}

#[test]
fn nested_blocks_stack_their_locals() {
    assert_prints(
        r#"
{
  var a = "outer";
  {
    var b = " inner";
    print a + b;
  }
  print a;
}
"#,
        r#"
outer inner
outer
"#,
    );
}

#[test]
fn reading_an_undefined_global_is_an_error() {
    let e = runtime_error("print missing;");
    expect![[r#"Undefined variable 'missing'."#]].assert_eq(e.message());
    assert_eq!(e.line(), Some(1));
    assert_eq!(
        e.to_string(),
        "Undefined variable 'missing'.\n[line 1] in script"
    );
}

#[test]
fn assigning_an_undefined_global_is_an_error() {
    let e = runtime_error("missing = 1;");
    expect![[r#"Undefined variable 'missing'."#]].assert_eq(e.message());
}

#[test]
fn if_takes_the_right_branch() {
    assert_prints(
        r#"
if (1 < 2) print "then"; else print "else";
if (nil) print "then"; else print "else";
"#,
        r#"
then
else
"#,
    );
}

#[test]
fn logical_operators_short_circuit() {
    assert_prints(
        r#"
print false and missing;
print true or missing;
print 1 and 2;
print nil or "fallback";
"#,
        r#"
false
true
2
fallback
"#,
    );
}

#[test]
fn while_runs_to_completion() {
    assert_prints(
        r#"
var i = 0;
while (i < 3) {
  print i;
  i = i + 1;
}
"#,
        r#"
0
1
2
"#,
    );
}

#[test]
fn for_accumulates_over_its_range() {
    assert_prints(
        r#"
var sum = 0;
for (var i = 0; i < 5; i = i + 1) {
  sum = sum + i;
}
print sum;
"#,
        "10",
    );
}

#[test]
fn functions_take_arguments_and_return_values() {
    assert_prints(
        r#"
fun add(a, b) {
  return a + b;
}
print add(1, 2);
print add("con", "cat");
"#,
        r#"
3
concat
"#,
    );
}

#[test]
fn functions_without_a_return_produce_nil() {
    assert_prints(
        r#"
fun explicit() { return; }
fun implicit() {}
print explicit();
print implicit();
"#,
        r#"
nil
nil
"#,
    );
}

#[test]
fn recursion_reenters_through_the_global_binding() {
    assert_prints(
        r#"
fun fib(n) {
  if (n < 2) return n;
  return fib(n - 2) + fib(n - 1);
}
print fib(10);
"#,
        "55",
    );
}

#[test]
fn nested_calls_return_through_each_frame() {
    assert_prints(
        r#"
fun outer() {
  fun middle() {
    fun inner() { return "deep"; }
    return inner();
  }
  return middle();
}
print outer();
"#,
        "deep",
    );
}

#[test]
fn closures_keep_private_state_alive() {
    assert_prints(
        r#"
fun makeCounter() {
  var count = 0;
  fun increment() {
    count = count + 1;
    return count;
  }
  return increment;
}
var counter = makeCounter();
print counter();
print counter();
"#,
        r#"
1
2
"#,
    );
}

#[test]
fn closures_capture_the_variable_not_a_snapshot() {
    assert_prints(
        r#"
var setter;
var getter;
fun build() {
  var state = "initial";
  fun set() { state = "updated"; }
  fun get() { print state; }
  setter = set;
  getter = get;
}
build();
setter();
getter();
"#,
        "updated",
    );
}

#[test]
fn leaving_a_block_closes_its_captured_locals() {
    assert_prints(
        r#"
var captured;
{
  var here = "gone but held";
  fun hold() { print here; }
  captured = hold;
}
captured();
"#,
        "gone but held",
    );
}

#[test]
fn each_iteration_captures_its_own_variable() {
    assert_prints(
        r#"
var first;
var second;
var i = 1;
while (i < 3) {
  var x = i;
  fun capture() { print x; }
  if (i == 1) first = capture; else second = capture;
  i = i + 1;
}
first();
second();
"#,
        r#"
1
2
"#,
    );
}

#[test]
fn arity_mismatches_fail_the_call() {
    let e = runtime_error(
        r#"
fun two(a, b) { return a + b; }
two(1);
"#,
    );
    expect![[r#"Expected 2 arguments but got 1."#]].assert_eq(e.message());
}

#[test]
fn only_functions_are_callable() {
    let e = runtime_error(r#"var x = "not a function"; x();"#);
    expect![[r#"Can only call functions and classes."#]].assert_eq(e.message());
}

#[test]
fn runtime_errors_carry_the_call_trace() {
    let e = runtime_error(
        "fun a() { b(); }\nfun b() { c(); }\nfun c() { c(\"too\", \"many\"); }\na();",
    );
    assert_eq!(
        e.to_string(),
        "Expected 0 arguments but got 2.\n\
         [line 3] in c()\n\
         [line 2] in b()\n\
         [line 1] in a()\n\
         [line 4] in script"
    );
}

#[test]
fn unbounded_recursion_overflows_the_frame_stack() {
    let e = runtime_error("fun spin() { spin(); }\nspin();");
    expect![[r#"Stack overflow."#]].assert_eq(e.message());
    assert_eq!(e.trace().len(), 64);
}

fn native_sum(args: &[Val]) -> Result<Val, NativeError> {
    let mut total = 0.0;
    for v in args {
        total += v
            .as_num()
            .ok_or_else(|| NativeError::from("sum() takes numbers"))?;
    }
    Ok(Val::Num(total))
}

#[test]
fn native_functions_integrate_with_calls() {
    let mut vm = Vm::new();
    vm.define_native("sum", native_sum);
    let mut out = Vec::new();
    vm.interpret("print sum(1, 2, 3) + sum();", &mut out)
        .expect("sum() is defined");
    assert_eq!(String::from_utf8(out).expect("utf-8 output"), "6\n");
}

#[test]
fn native_errors_become_runtime_errors() {
    let mut vm = Vm::new();
    vm.define_native("sum", native_sum);
    let mut out = Vec::new();
    let e = match vm.interpret(r#"sum("nope");"#, &mut out) {
        Err(InterpretError::Runtime(e)) => e,
        other => panic!("expected a runtime error, got {:?}", other),
    };
    expect![[r#"sum() takes numbers"#]].assert_eq(e.message());
}

#[test]
fn globals_persist_across_interpret_calls() {
    let mut vm = Vm::new();
    let mut out = Vec::new();
    vm.interpret("var a = 1;", &mut out).expect("defines a");
    vm.interpret("a = a + 1; print a;", &mut out)
        .expect("a is defined");
    assert_eq!(String::from_utf8(out).expect("utf-8 output"), "2\n");
}

#[test]
fn the_vm_recovers_after_a_runtime_error() {
    let mut vm = Vm::new();
    let mut out = Vec::new();
    let result = vm.interpret("print missing;", &mut out);
    assert!(matches!(result, Err(InterpretError::Runtime(_))));
    vm.interpret(r#"print "still alive";"#, &mut out)
        .expect("the VM resets after an error");
    assert_eq!(String::from_utf8(out).expect("utf-8 output"), "still alive\n");
}

#[test]
fn a_compile_error_stops_before_execution() {
    let mut vm = Vm::new();
    let mut out = Vec::new();
    let result = vm.interpret(r#"print "ran"; print ;"#, &mut out);
    let errors = match result {
        Err(InterpretError::Compile(errors)) => errors,
        other => panic!("expected a compile error, got {:?}", other),
    };
    assert!(!errors.is_empty());
    assert!(out.is_empty());
}

#[test]
fn reachability_covers_live_closures_and_their_captures() {
    let mut vm = Vm::new();
    let mut out = Vec::new();
    vm.interpret(
        r#"
fun makeCounter() {
  var count = 0;
  fun increment() {
    count = count + 1;
    return count;
  }
  return increment;
}
var counter = makeCounter();
counter();
{
  var scratch = "scratch" + "pad";
}
"#,
        &mut out,
    )
    .expect("script runs");
    let reachable = vm.reachable_objects();
    for (name, _) in vm.globals.iter() {
        assert!(reachable.contains_key(name));
    }
    // The counter closure and the cell holding its captured count survive.
    let counter = vm
        .globals
        .iter()
        .find(|(name, _)| {
            vm.heap()
                .as_str(*name)
                .map(|s| &*s.text == "counter")
                .unwrap_or(false)
        })
        .and_then(|(_, value)| value.as_obj())
        .expect("counter is a global object");
    assert!(reachable.contains_key(counter));
    let cell = vm
        .heap()
        .as_closure(counter)
        .expect("counter is a closure")
        .upvalues[0];
    assert!(reachable.contains_key(cell));
    // The script function and the concat scratch string are garbage.
    assert!(reachable.len() < vm.heap().object_count());
}

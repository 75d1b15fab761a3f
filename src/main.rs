use std::io::Write;
use std::process;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use basalt_bytecode::debug::disassemble;
use basalt_bytecode::obj::NativeError;
use basalt_bytecode::{Chunk, Heap, Val};
use basalt_vm::{InterpretError, Vm};

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Opt {
    /// Run this script, then exit. Starts a REPL when omitted.
    file: Option<String>,

    /// Evaluate the given string as a basalt program.
    #[clap(short, long, conflicts_with = "file")]
    eval: Option<String>,

    /// Print the compiled bytecode instead of running the program.
    #[clap(long)]
    dump_bytecode: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::parse();

    let mut vm = Vm::new();
    vm.define_native("clock", clock);

    let code = if let Some(source) = opt.eval.as_deref() {
        run_source(&mut vm, source, opt.dump_bytecode)
    } else if let Some(path) = opt.file.as_deref() {
        run_file(&mut vm, path, opt.dump_bytecode)
    } else {
        repl(&mut vm)
    };
    if code != 0 {
        process::exit(code);
    }
}

fn run_file(vm: &mut Vm, path: &str, dump: bool) -> i32 {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Could not read \"{}\": {}", path, e);
            return 74;
        }
    };
    run_source(vm, &source, dump)
}

fn run_source(vm: &mut Vm, source: &str, dump: bool) -> i32 {
    if dump {
        return dump_bytecode(source);
    }
    let mut out = std::io::stdout();
    match vm.interpret(source, &mut out) {
        Ok(()) => 0,
        Err(e @ InterpretError::Compile(_)) => {
            eprintln!("{}", e);
            65
        }
        Err(e @ InterpretError::Runtime(_)) => {
            eprintln!("{}", e);
            70
        }
    }
}

/// Read, execute, loop. The VM is shared across lines, so definitions build
/// on each other and errors leave the session alive.
fn repl(vm: &mut Vm) -> i32 {
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    loop {
        let _ = write!(out, "> ");
        let _ = out.flush();
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}", e);
                return 74;
            }
        }
        if let Err(e) = vm.interpret(&line, &mut out) {
            eprintln!("{}", e);
        }
    }
    let _ = writeln!(out);
    0
}

/// Compile without running and print every chunk, nested functions included.
fn dump_bytecode(source: &str) -> i32 {
    let mut heap = Heap::new();
    let script = match basalt_codegen::compile(source, &mut heap) {
        Ok(script) => script,
        Err(errors) => {
            for e in &errors {
                eprintln!("{}", e);
            }
            return 65;
        }
    };
    let fun = heap.as_fun(script).expect("Compilation produces a function");
    dump_chunk(&heap, &fun.chunk, "script");
    0
}

fn dump_chunk(heap: &Heap, chunk: &Chunk, name: &str) {
    print!("{}", disassemble(chunk, heap, name));
    for v in &chunk.constants {
        if let Some(fun) = v.as_obj().and_then(|r| heap.as_fun(r)) {
            let label = fun
                .name
                .and_then(|n| heap.as_str(n))
                .map(|s| s.text.to_string())
                .unwrap_or_else(|| "fn".to_string());
            dump_chunk(heap, &fun.chunk, &label);
        }
    }
}

/// Seconds since the Unix epoch, as a number. The benchmark clock scripts
/// see as the `clock` global.
fn clock(_args: &[Val]) -> Result<Val, NativeError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| NativeError::from(e.to_string()))?;
    Ok(Val::Num(now.as_secs_f64()))
}

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser};

use cmmc::{codegen, parser, stdlib, tokenizer, CompileResult, Program};

/// Compiles a small C-like language to an 8-instruction tape machine.
#[derive(Parser)]
#[command(name = "cmmc", version)]
struct Args {
  /// Show full error details instead of a one-line message
  #[arg(short, long)]
  debug: bool,

  /// Pretty-print the syntax tree before the generated code
  #[arg(short, long)]
  tree: bool,

  /// Run the peephole optimizer on the generated code
  #[arg(short, long)]
  optimize: bool,

  /// Rebuild the standard-library cache
  #[arg(short, long)]
  recompile: bool,

  /// Source file
  src: PathBuf,

  /// Output file; standard output when absent
  dest: Option<PathBuf>,
}

fn main() {
  let args = Args::parse();

  env_logger::Builder::from_default_env()
    .filter_level(if args.debug {
      log::LevelFilter::Debug
    } else {
      log::LevelFilter::Warn
    })
    .format_timestamp(None)
    .init();

  let source = match fs::read_to_string(&args.src) {
    Ok(source) => source,
    Err(err) => exit_usage(&format!("{}: {err}", args.src.display())),
  };
  let name = args
    .src
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_else(|| "program".to_string());

  let program = match build(&args, &source, &name) {
    Ok(program) => program,
    Err(err) => {
      if args.debug {
        eprintln!("{err:?}");
      } else {
        eprintln!("{err}");
      }
      process::exit(1);
    }
  };

  let output = program.render(codegen::LINE_WIDTH);
  match &args.dest {
    Some(path) => {
      if let Err(err) = fs::write(path, output) {
        exit_usage(&format!("{}: {err}", path.display()));
      }
    }
    None => print!("{output}"),
  }
}

fn build(args: &Args, source: &str, name: &str) -> CompileResult<Program> {
  let functions = stdlib::load(args.recompile)?;
  let tokens = tokenizer::tokenize(source)?;
  let ast = parser::parse(tokens, name)?;
  if args.tree {
    print!("{}", parser::write_tree(&ast));
  }
  let mut program = codegen::generate(ast, functions)?;
  if args.optimize {
    cmmc::optimize_program(&mut program);
  }
  Ok(program)
}

/// Report an I/O problem together with the usage summary and exit non-zero.
fn exit_usage(message: &str) -> ! {
  eprintln!("{message}");
  eprintln!("{}", Args::command().render_usage());
  process::exit(2);
}

//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `codegen` lowers the AST into tape-machine instructions.
//! - `optimize` cancels no-op instruction pairs on request.
//! - `stdlib` compiles and caches the standard library.
//! - `error` centralises the error taxonomy shared by the other modules.

pub mod codegen;
pub mod error;
pub mod optimize;
pub mod parser;
pub mod stdlib;
pub mod tokenizer;
pub mod ty;

use std::collections::HashMap;

pub use codegen::{Function, Program};
pub use error::{CompileError, CompileResult};

/// Compile a source string into a [`Program`]. `functions` seeds the
/// function table, typically with [`stdlib::load`]'s output.
pub fn compile(
  source: &str,
  name: &str,
  functions: HashMap<String, Function>,
  optimize_output: bool,
) -> CompileResult<Program> {
  let tokens = tokenizer::tokenize(source)?;
  let ast = parser::parse(tokens, name)?;
  let mut program = codegen::generate(ast, functions)?;
  if optimize_output {
    optimize_program(&mut program);
  }
  Ok(program)
}

/// Run the peephole pass over the program body and every compiled function
/// record.
pub fn optimize_program(program: &mut Program) {
  let before = program.code.len();
  program.code = optimize::optimize(&program.code);
  for func in program.functions.values_mut() {
    if let Some(code) = &func.code {
      func.code = Some(optimize::optimize(code));
    }
  }
  log::debug!(
    "optimizer removed {} instructions",
    before - program.code.len()
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pipeline_compiles_a_small_program() {
    let program = compile("int a = 3; a += 1;", "small", HashMap::new(), false).unwrap();
    assert_eq!(program.name, "small");
    assert!(!program.code.is_empty());
    assert!(program.render(80).starts_with("[small]\n"));
  }

  #[test]
  fn optimized_output_has_no_cancelling_pairs() {
    let source = "int a = 1; int b = a; b += a;";
    let program = compile(source, "t", HashMap::new(), true).unwrap();
    for pair in ["+-", "-+", "<>", "><"] {
      assert!(!program.code.contains(pair), "{pair:?} in {:?}", program.code);
    }
  }

  #[test]
  fn errors_carry_their_stage() {
    assert!(matches!(
      compile("$", "t", HashMap::new(), false),
      Err(CompileError::Lex { .. })
    ));
    assert!(matches!(
      compile("int a", "t", HashMap::new(), false),
      Err(CompileError::Parse { .. })
    ));
    assert!(matches!(
      compile("a = 1;", "t", HashMap::new(), false),
      Err(CompileError::CodeGen { .. })
    ));
  }
}

//! End-to-end tests: compile whole programs, execute the generated
//! instructions on a small tape machine, and check the observable
//! behaviour.

use cmmc::{compile, optimize_program, stdlib, CompileResult, Program};

/// Backstop against a miscompiled loop spinning forever.
const STEP_LIMIT: usize = 50_000_000;

enum Op {
  Plus,
  Minus,
  Left,
  Right,
  Put,
  Get,
  JumpIfZero(usize),
  JumpIfNotZero(usize),
}

/// Final machine state after executing a program.
struct Exec {
  output: Vec<u8>,
  ptr: usize,
  cells: Vec<u8>,
}

/// Execute tape-machine code on 30k wrapping byte cells, reading input from
/// a byte slice (exhausted input reads zero).
fn exec(code: &str, input: &[u8]) -> Exec {
  let mut ops = Vec::new();
  let mut open_brackets = Vec::new();
  for c in code.chars() {
    match c {
      '+' => ops.push(Op::Plus),
      '-' => ops.push(Op::Minus),
      '<' => ops.push(Op::Left),
      '>' => ops.push(Op::Right),
      '.' => ops.push(Op::Put),
      ',' => ops.push(Op::Get),
      '[' => {
        open_brackets.push(ops.len());
        ops.push(Op::JumpIfZero(usize::MAX));
      }
      ']' => {
        let open = open_brackets.pop().expect("unmatched ']'");
        ops.push(Op::JumpIfNotZero(open));
        ops[open] = Op::JumpIfZero(ops.len() - 1);
      }
      _ => {}
    }
  }
  assert!(open_brackets.is_empty(), "unmatched '['");

  let mut cells = vec![0u8; 30_000];
  let mut ptr = 0usize;
  let mut output = Vec::new();
  let mut input = input.iter().copied();
  let mut pc = 0;
  let mut steps = 0;
  while pc < ops.len() {
    steps += 1;
    assert!(steps < STEP_LIMIT, "step limit exceeded");
    match ops[pc] {
      Op::Plus => cells[ptr] = cells[ptr].wrapping_add(1),
      Op::Minus => cells[ptr] = cells[ptr].wrapping_sub(1),
      Op::Left => ptr -= 1,
      Op::Right => ptr += 1,
      Op::Put => output.push(cells[ptr]),
      Op::Get => cells[ptr] = input.next().unwrap_or(0),
      Op::JumpIfZero(target) => {
        if cells[ptr] == 0 {
          pc = target;
        }
      }
      Op::JumpIfNotZero(target) => {
        if cells[ptr] != 0 {
          pc = target;
        }
      }
    }
    pc += 1;
  }
  Exec {
    output,
    ptr,
    cells,
  }
}

fn compile_with_std(source: &str) -> CompileResult<Program> {
  let functions = stdlib::compile_bundled()?;
  compile(source, "test", functions, false)
}

fn output_of(source: &str, input: &[u8]) -> Vec<u8> {
  let program = compile_with_std(source).unwrap();
  exec(&program.code, input).output
}

#[test]
fn adds_two_variables() {
  let source = "int a = 3; int b = 4; putchar(a + b);";
  assert_eq!(output_of(source, &[]), [7]);
}

#[test]
fn factorial_loop() {
  let source = "int n = 5; int acc = 1; while (n) { acc *= n; n -= 1; } putchar(acc);";
  assert_eq!(output_of(source, &[]), [120]);
}

#[test]
fn repeat_executes_exactly_n_times() {
  let source = "int n = 10; int c = 0; repeat (n) { c += 1; } putchar(c);";
  assert_eq!(output_of(source, &[]), [10]);
}

#[test]
fn repeat_count_is_evaluated_once() {
  // the body grows `n`, but the count was fixed at entry
  let source = "int n = 3; int c = 0; repeat (n) { n += 1; c += 1; } putchar(c);";
  assert_eq!(output_of(source, &[]), [3]);
}

#[test]
fn if_else_takes_exactly_one_branch() {
  let odd = "int x = 7; if (x % 2 == 1) { putchar(1); } else { putchar(0); }";
  assert_eq!(output_of(odd, &[]), [1]);
  let even = "int x = 8; if (x % 2 == 1) { putchar(1); } else { putchar(0); }";
  assert_eq!(output_of(even, &[]), [0]);
}

#[test]
fn division_and_remainder() {
  let source = "int a = 20; int b = 6; putchar(a / b); putchar(a % b);";
  assert_eq!(output_of(source, &[]), [3, 2]);
}

#[test]
fn division_by_zero_yields_zero() {
  let source = "int a = 5; putchar(a / 0); putchar(a % 0);";
  assert_eq!(output_of(source, &[]), [0, 0]);
  let source = "int a = 5; int b = 0; a /= b; putchar(a); int c = 7; c %= b; putchar(c);";
  assert_eq!(output_of(source, &[]), [0, 0]);
}

#[test]
fn function_results_are_inlined() {
  let source = "int sq(int x) { return x * x; } putchar(sq(9));";
  assert_eq!(output_of(source, &[]), [81]);
}

#[test]
fn recursive_function_is_rejected() {
  let source = "int sq(int x) { return sq(x); } putchar(sq(9));";
  let err = compile_with_std(source).unwrap_err();
  assert!(err.to_string().contains("'sq' is recursive"));
}

#[test]
fn indirect_recursion_is_rejected() {
  let source = "
    int even(int n) { return odd(n - 1); }
    int odd(int n) { return even(n - 1); }
    putchar(even(4));
  ";
  let err = compile_with_std(source).unwrap_err();
  assert!(err.to_string().contains("is recursive"));
}

#[test]
fn arithmetic_wraps_modulo_256() {
  assert_eq!(output_of("int x = 250; x += 10; putchar(x);", &[]), [4]);
  assert_eq!(output_of("putchar(16 * 16);", &[]), [0]);
  assert_eq!(output_of("putchar(0 - 1);", &[]), [255]);
}

#[test]
fn unary_operators() {
  // -5 wraps to 251, so 10 - -5 comes out as 15
  assert_eq!(output_of("putchar(10 - -5);", &[]), [15]);
  assert_eq!(output_of("putchar(+7);", &[]), [7]);
  assert_eq!(output_of("putchar(not 7); putchar(not 0);", &[]), [0, 1]);
}

#[test]
fn comparisons_are_unsigned() {
  let source = "
    putchar(5 < 9);
    putchar(9 <= 9);
    putchar(3 > 7);
    putchar(200 >= 100);
    putchar(200 < 100);
    putchar(4 == 4);
    putchar(4 != 4);
  ";
  assert_eq!(output_of(source, &[]), [1, 1, 0, 1, 0, 1, 0]);
}

#[test]
fn logic_normalizes_to_zero_or_one() {
  let source = "putchar(2 and 3); putchar(2 and 0); putchar(0 or 5); putchar(0 or 0);";
  assert_eq!(output_of(source, &[]), [1, 0, 1, 0]);
}

#[test]
fn while_loop_with_condition() {
  let source = "int n = 5; while (n > 2) { n -= 1; } putchar(n);";
  assert_eq!(output_of(source, &[]), [2]);
  let source = "int n = 3; while (n) { putchar(n); n -= 1; }";
  assert_eq!(output_of(source, &[]), [3, 2, 1]);
}

#[test]
fn blocks_scope_lexically() {
  let source = "
    int a = 1;
    {
      int a = 5;
      putchar(a);
    }
    putchar(a);
  ";
  assert_eq!(output_of(source, &[]), [5, 1]);
}

#[test]
fn getchar_reads_input() {
  let source = "int c = getchar(); putchar(c + 1);";
  assert_eq!(output_of(source, &[65]), [66]);
  // exhausted input reads zero on this machine
  assert_eq!(output_of(source, &[]), [1]);
}

#[test]
fn putnum_prints_decimal() {
  assert_eq!(output_of("putnum(120);", &[]), b"120");
  assert_eq!(output_of("putnum(0);", &[]), b"0");
  assert_eq!(output_of("putnum(7);", &[]), b"7");
  assert_eq!(output_of("putnum(105);", &[]), b"105");
  assert_eq!(output_of("putnum(255);", &[]), b"255");
}

#[test]
fn stripped_inline_is_harmless() {
  let program = compile_with_std("inline xyz;").unwrap();
  assert_eq!(program.code, "");
  assert_eq!(exec(&program.code, &[]).output, [] as [u8; 0]);
}

#[test]
fn pointer_lands_on_the_tracked_cell() {
  // two live declarations leave the pointer at cell 2, and everything at
  // and above it is scratch that has been cleared again
  let source = "int a = 3; int b = 4; putchar(a + b);";
  let program = compile_with_std(source).unwrap();
  let exec = exec(&program.code, &[]);
  assert_eq!(exec.ptr, 2);
  assert!(exec.cells[2..].iter().all(|&cell| cell == 0));
  assert_eq!(&exec.cells[..2], [3, 4]);
}

#[test]
fn exited_scopes_retract_the_pointer() {
  let source = "int a = 1; { int b = 2; } putchar(a);";
  let program = compile_with_std(source).unwrap();
  let exec = exec(&program.code, &[]);
  assert_eq!(exec.ptr, 1);
  assert_eq!(exec.output, [1]);
}

#[test]
fn optimizer_preserves_behavior() {
  let sources = [
    "int n = 5; int acc = 1; while (n) { acc *= n; n -= 1; } putchar(acc);",
    "int a = 20; int b = 6; putchar(a / b); putchar(a % b);",
    "int c = getchar(); if (c == 2) { putchar(1); } else { putnum(c); }",
  ];
  for source in sources {
    let plain = compile_with_std(source).unwrap();
    let mut optimized = compile_with_std(source).unwrap();
    optimize_program(&mut optimized);
    assert!(optimized.code.len() <= plain.code.len());

    let plain = exec(&plain.code, &[9]);
    let optimized = exec(&optimized.code, &[9]);
    assert_eq!(plain.output, optimized.output, "source: {source}");
    assert_eq!(plain.ptr, optimized.ptr, "source: {source}");
    assert_eq!(plain.cells, optimized.cells, "source: {source}");
  }
}

#[test]
fn standard_library_names_cannot_be_redefined() {
  let err = compile_with_std("void putchar(int c) {}").unwrap_err();
  assert!(err.to_string().contains("defined more than once"));
}

#[test]
fn rejects_bad_programs() {
  assert!(compile_with_std("void x;").is_err());
  assert!(compile_with_std("putchar(1, 2);").is_err());
  assert!(compile_with_std("undefined();").is_err());
  assert!(compile_with_std("x = 1;").is_err());
}

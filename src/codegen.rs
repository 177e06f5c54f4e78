//! Code generation: lower the parsed AST into tape-machine instructions.
//!
//! The emitter tracks a simulated data pointer (`stack_ptr`): after the code
//! for any statement or expression runs, the real pointer sits exactly where
//! `stack_ptr` says it does. Cells below `stack_ptr` are the live stack,
//! cells at and above it are scratch. An expression leaves its result in the
//! cell at `stack_ptr` and zeroes every scratch cell it touched; a statement
//! leaves the whole scratch region zeroed.
//!
//! Functions are non-recursive and inlined. A body is compiled once, on the
//! first call, against a fresh scope; because variable access only ever uses
//! relative distances the compiled body is independent of where the caller's
//! stack happens to be, so the same string can be spliced at every call
//! site.

use std::collections::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::parser::{self, AssignOp, BinOp, Declaration, Expr, Item, Stmt, UnOp};
use crate::ty::Type;

/// Width of the instruction lines in rendered output.
pub const LINE_WIDTH: usize = 80;

/// A compiled program.
#[derive(Debug)]
pub struct Program {
  pub name: String,
  pub functions: HashMap<String, Function>,
  pub code: String,
}

impl Program {
  /// Render the bracketed header line followed by the instruction stream,
  /// sliced into lines of at most `width` characters.
  pub fn render(&self, width: usize) -> String {
    let mut out = format!("[{}]\n", self.name);
    let mut rest = self.code.as_str();
    while !rest.is_empty() {
      let (line, tail) = rest.split_at(width.min(rest.len()));
      out.push_str(line);
      out.push('\n');
      rest = tail;
    }
    out
  }
}

/// A registered function. `code` is filled in when the body is first
/// expanded; `node` is absent for functions that came precompiled (from the
/// standard-library cache).
#[derive(Debug, Clone)]
pub struct Function {
  pub return_type: Type,
  pub arity: usize,
  pub code: Option<String>,
  pub node: Option<parser::Function>,
}

/// Generate code for a user program. `functions` seeds the function table,
/// typically with the compiled standard library.
pub fn generate(
  program: parser::Program,
  functions: HashMap<String, Function>,
) -> CompileResult<Program> {
  let mut gen = CodeGen::new(functions);
  let statements = gen.register_items(program.items)?;
  for stmt in &statements {
    gen.emit_stmt(stmt)?;
  }
  log::debug!(
    "generated {} instructions for '{}'",
    gen.code.len(),
    program.name
  );
  Ok(Program {
    name: program.name,
    functions: gen.functions,
    code: gen.code,
  })
}

/// Generate the function table for a library. Every body is expanded up
/// front so the result can be serialized.
pub fn generate_library(program: parser::Program) -> CompileResult<HashMap<String, Function>> {
  let mut gen = CodeGen::new(HashMap::new());
  let statements = gen.register_items(program.items)?;
  for stmt in &statements {
    gen.emit_stmt(stmt)?;
  }
  let mut pending: Vec<(String, usize)> = gen
    .functions
    .iter()
    .filter(|(_, func)| func.code.is_none())
    .filter_map(|(name, func)| func.node.as_ref().map(|node| (name.clone(), node.line)))
    .collect();
  pending.sort();
  for (name, line) in pending {
    gen.function_code(&name, line)?;
  }
  Ok(gen.functions)
}

struct CodeGen {
  /// Scope stack; each scope maps a name to the absolute cell assigned at
  /// declaration time.
  scopes: Vec<HashMap<String, usize>>,
  /// Statically tracked data-pointer position.
  stack_ptr: usize,
  /// Functions currently being expanded, outermost first.
  inlining: Vec<String>,
  functions: HashMap<String, Function>,
  code: String,
}

impl CodeGen {
  fn new(functions: HashMap<String, Function>) -> Self {
    Self {
      scopes: vec![HashMap::new()],
      stack_ptr: 0,
      inlining: Vec::new(),
      functions,
      code: String::new(),
    }
  }

  /// Register every function definition and return the top-level statements
  /// in source order. Registration happens before any emission, so calls may
  /// precede the callee's definition in the source.
  fn register_items(&mut self, items: Vec<Item>) -> CompileResult<Vec<Stmt>> {
    let mut statements = Vec::new();
    for item in items {
      match item {
        Item::Function(func) => {
          if self.functions.contains_key(&func.name) {
            return Err(CompileError::codegen(
              func.line,
              format!("function '{}' is defined more than once", func.name),
            ));
          }
          self.functions.insert(
            func.name.clone(),
            Function {
              return_type: func.return_type,
              arity: func.params.len(),
              code: None,
              node: Some(func),
            },
          );
        }
        Item::Statement(stmt) => statements.push(stmt),
      }
    }
    Ok(statements)
  }

  // ----- Scopes -----

  fn scope(&self) -> &HashMap<String, usize> {
    self.scopes.last().expect("the scope stack is never empty")
  }

  fn scope_mut(&mut self) -> &mut HashMap<String, usize> {
    self
      .scopes
      .last_mut()
      .expect("the scope stack is never empty")
  }

  fn enter_scope(&mut self) {
    self.scopes.push(HashMap::new());
  }

  /// Drop the innermost scope, retracting the pointer over its variables.
  fn exit_scope(&mut self) {
    let dropped = self
      .scopes
      .pop()
      .expect("the scope stack is never empty")
      .len();
    self.stack_ptr -= dropped;
    for _ in 0..dropped {
      self.code.push('<');
    }
  }

  fn lookup(&self, name: &str) -> Option<usize> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.get(name))
      .copied()
  }

  // ----- Statements -----

  fn emit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Declaration(decl) => self.emit_declaration(decl)?,
      Stmt::Block { statements, .. } => {
        self.enter_scope();
        for stmt in statements {
          self.emit_stmt(stmt)?;
        }
        self.exit_scope();
      }
      Stmt::If {
        cond,
        then,
        otherwise,
        ..
      } => match otherwise {
        None => {
          // {cond} [ {then} [-] ]
          self.emit_expr(cond)?;
          self.code.push('[');
          self.emit_stmt(then)?;
          self.code.push_str("[-]]");
        }
        Some(otherwise) => {
          // [-]+> {cond} [ {then} <->[-] ] < [ {else} [-] ]
          // flag below the condition; exactly one branch clears it
          self.code.push_str("[-]+>");
          self.stack_ptr += 1;
          self.emit_expr(cond)?;
          self.code.push('[');
          self.emit_stmt(then)?;
          self.stack_ptr -= 1;
          self.code.push_str("<->[-]]<[");
          self.emit_stmt(otherwise)?;
          self.code.push_str("[-]]");
        }
      },
      Stmt::While { cond, body, .. } => {
        // {cond} [ {body} {cond} ]
        let saved = std::mem::take(&mut self.code);
        self.emit_expr(cond)?;
        let cond_code = std::mem::replace(&mut self.code, saved);
        self.code.push_str(&cond_code);
        self.code.push('[');
        self.emit_stmt(body)?;
        self.code.push_str(&cond_code);
        self.code.push(']');
      }
      Stmt::Repeat { count, body, .. } => {
        // {count} [ > {body} < - ]   the counter stays below the body's stack
        self.emit_expr(count)?;
        self.code.push_str("[>");
        self.stack_ptr += 1;
        self.emit_stmt(body)?;
        self.stack_ptr -= 1;
        self.code.push_str("<-]");
      }
      Stmt::Return { line, .. } => {
        let message = if self.inlining.is_empty() {
          "'return' outside of a function"
        } else {
          "'return' is only allowed at the top level of a function body"
        };
        return Err(CompileError::codegen(*line, message));
      }
      Stmt::Inline { code, .. } => self.code.push_str(code),
      Stmt::Assign {
        op,
        name,
        expr,
        line,
      } => self.emit_assign(*op, name, expr, *line)?,
      Stmt::Call { name, args, line } => self.emit_call(name, args, *line, false)?,
    }
    Ok(())
  }

  fn emit_declaration(&mut self, decl: &Declaration) -> CompileResult<()> {
    if decl.ty.is_void() {
      return Err(CompileError::codegen(
        decl.line,
        format!("variable '{}' has type 'void'", decl.name),
      ));
    }
    if self.scope().contains_key(&decl.name) {
      return Err(CompileError::codegen(
        decl.line,
        format!("variable '{}' is already declared in this scope", decl.name),
      ));
    }
    if let Some(init) = &decl.init {
      self.emit_expr(init)?;
    }
    // without an initializer the cell is left as is; the tape starts zeroed
    let addr = self.stack_ptr;
    self.scope_mut().insert(decl.name.clone(), addr);
    self.stack_ptr += 1;
    self.code.push('>');
    Ok(())
  }

  fn emit_assign(
    &mut self,
    op: AssignOp,
    name: &str,
    expr: &Expr,
    line: usize,
  ) -> CompileResult<()> {
    let addr = self.lookup(name).ok_or_else(|| {
      CompileError::codegen(line, format!("variable '{name}' is not declared"))
    })?;
    let rel = self.stack_ptr - addr;
    let l = "<".repeat(rel);
    let r = ">".repeat(rel);
    self.emit_expr(expr)?;
    let template = match op {
      AssignOp::Assign => format!("{l}[-]{r}[-{l}+{r}]"),
      AssignOp::Add => format!("[-{l}+{r}]"),
      AssignOp::Sub => format!("[-{l}-{r}]"),
      AssignOp::Mul => {
        format!(">[-]>[-]<<{l}[-{r}>+<{l}]{r}[->[->+<<{l}+{r}>]>[-<+>]<<]>[-]<")
      }
      AssignOp::Div => format!(
        ">[-]+>[-]>[-]>[-]<<<<{l}[-{r}-[>+>>]>[[-<+>]+>+>>]<<<<{l}]{r}>>[-<<{l}+{r}>>]<<[-]>[-]<"
      ),
      AssignOp::Rem => format!(
        ">[-]>[-]<<[->+>+<<]>>[-<<+>>]+<[>-<[-]]>[-<<{l}[-]{r}>>]<<\
         >[-]+>[-]>[-]>[-]<<<<{l}[-{r}-[>+>>]>[[-<+>]+>>>]<<<<{l}]{r}>-[-<{l}+{r}>]<[-]"
      ),
    };
    self.code.push_str(&template);
    Ok(())
  }

  // ----- Expressions -----

  /// Emit code that leaves the expression's value in the cell at
  /// `stack_ptr`, the pointer on that cell, and every higher cell zeroed.
  fn emit_expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Int { value, .. } => {
        self.code.push_str("[-]");
        for _ in 0..*value {
          self.code.push('+');
        }
      }
      Expr::Var { name, line } => {
        let addr = self.lookup(name).ok_or_else(|| {
          CompileError::codegen(*line, format!("variable '{name}' is not declared"))
        })?;
        // non-destructive copy through one scratch cell
        let rel = self.stack_ptr - addr;
        let l = "<".repeat(rel);
        let r = ">".repeat(rel);
        self
          .code
          .push_str(&format!("[-]>[-]<{l}[-{r}+>+<{l}]{r}>[-<{l}+{r}>]<"));
      }
      Expr::Binary {
        op, left, right, ..
      } => {
        self.emit_expr(left)?;
        self.code.push('>');
        self.stack_ptr += 1;
        self.emit_expr(right)?;
        self.stack_ptr -= 1;
        self.code.push_str(binary_template(*op));
        self.code.push('<');
      }
      Expr::Unary { op, right, .. } => match op {
        UnOp::Plus => self.emit_expr(right)?,
        UnOp::Neg => {
          // [-] > {right} [-<->] <
          self.code.push_str("[-]>");
          self.stack_ptr += 1;
          self.emit_expr(right)?;
          self.stack_ptr -= 1;
          self.code.push_str("[-<->]<");
        }
        UnOp::Not => {
          // [-]+ > {right} [<->[-]] <
          self.code.push_str("[-]+>");
          self.stack_ptr += 1;
          self.emit_expr(right)?;
          self.stack_ptr -= 1;
          self.code.push_str("[<->[-]]<");
        }
      },
      Expr::Call { name, args, line } => self.emit_call(name, args, *line, true)?,
    }
    Ok(())
  }

  // ----- Function calls and expansion -----

  fn emit_call(
    &mut self,
    name: &str,
    args: &[Expr],
    line: usize,
    expr_position: bool,
  ) -> CompileResult<()> {
    if self.inlining.iter().any(|current| current == name) {
      return Err(CompileError::codegen(
        line,
        format!("function '{name}' is recursive"),
      ));
    }
    let func = self
      .functions
      .get(name)
      .ok_or_else(|| CompileError::codegen(line, format!("function '{name}' is not defined")))?;
    if expr_position && func.return_type.is_void() {
      return Err(CompileError::codegen(
        line,
        format!("void function '{name}' used in an expression"),
      ));
    }
    if args.len() != func.arity {
      return Err(CompileError::codegen(
        line,
        format!(
          "function '{name}' expects {} argument(s), got {}",
          func.arity,
          args.len()
        ),
      ));
    }
    let code = self.function_code(name, line)?;
    // evaluate the arguments upwards; they stay on the tape as the callee's
    // parameter cells
    for arg in args {
      self.emit_expr(arg)?;
      self.code.push('>');
      self.stack_ptr += 1;
    }
    for _ in 0..args.len() {
      self.code.push('<');
    }
    self.stack_ptr -= args.len();
    self.code.push_str(&code);
    Ok(())
  }

  /// Return the compiled body of `name`, expanding and memoizing it on the
  /// first request.
  fn function_code(&mut self, name: &str, line: usize) -> CompileResult<String> {
    if self.inlining.iter().any(|current| current == name) {
      return Err(CompileError::codegen(
        line,
        format!("function '{name}' is recursive"),
      ));
    }
    let func = self
      .functions
      .get(name)
      .ok_or_else(|| CompileError::codegen(line, format!("function '{name}' is not defined")))?;
    if let Some(code) = &func.code {
      return Ok(code.clone());
    }
    let node = func
      .node
      .clone()
      .expect("a function without compiled code still has its syntax tree");

    log::debug!("expanding function '{name}'");
    self.inlining.push(name.to_string());
    let saved_scopes = std::mem::replace(&mut self.scopes, vec![HashMap::new()]);
    let saved_code = std::mem::take(&mut self.code);
    let body = self.expand_body(&node);
    let code = std::mem::replace(&mut self.code, saved_code);
    self.scopes = saved_scopes;
    self.inlining.pop();
    body?;

    let func = self
      .functions
      .get_mut(name)
      .expect("the function table does not shrink");
    func.code = Some(code.clone());
    Ok(code)
  }

  /// Emit a function body into `self.code` under a fresh scope. `stack_ptr`
  /// is deliberately left alone: the body only ever uses distances relative
  /// to it, which is what makes the compiled code position-independent.
  fn expand_body(&mut self, func: &parser::Function) -> CompileResult<()> {
    for param in &func.params {
      self.emit_declaration(param)?;
    }
    let void = func.return_type.is_void();
    let mut returned = false;
    for stmt in &func.body {
      if let Stmt::Return { expr, line } = stmt {
        if void {
          return Err(CompileError::codegen(
            *line,
            format!("'return' in void function '{}'", func.name),
          ));
        }
        self.emit_expr(expr)?;
        // slide the result down over the frame
        let frame = self.scope().len();
        if frame > 0 {
          let l = "<".repeat(frame);
          let r = ">".repeat(frame);
          self.code.push_str(&format!("{l}[-]{r}[-{l}+{r}]"));
        }
        returned = true;
        break;
      }
      self.emit_stmt(stmt)?;
    }
    if !returned && !void {
      return Err(CompileError::codegen(
        func.line,
        format!("function '{}' is missing a 'return' statement", func.name),
      ));
    }
    self.exit_scope();
    Ok(())
  }
}

/// Fixed instruction template combining the cells at `stack_ptr` (left
/// operand) and `stack_ptr + 1` (right operand, where the pointer starts)
/// into a result at `stack_ptr`, with all scratch cells zeroed again. The
/// pointer ends on the right-hand cell; the caller appends the final `<`.
fn binary_template(op: BinOp) -> &'static str {
  match op {
    BinOp::Add => "[-<+>]",
    BinOp::Sub => "[-<->]",
    BinOp::Mul => ">[-]>[-]<<<[->>+<<]>[->[->+<<<+>>]>[-<+>]<<]>[-]<",
    BinOp::Div => {
      ">[-]+>[-]>[-]>[-]<<<<<[->-[>+>>]>[[-<+>]+>+>>]<<<<<]>>>[-<<<+>>>]<<[-]>[-]<"
    }
    // a zero divisor first zeroes the dividend so the remainder comes out 0
    BinOp::Rem => {
      ">[-]>[-]<<[->+>+<<]>>[-<<+>>]+<[>-<[-]]>[-<<<[-]>>>]<<\
       >[-]+>[-]>[-]>[-]<<<<<[->-[>+>>]>[[-<+>]+>>>]<<<<<]>>-[-<<+>>]<[-]"
    }
    BinOp::Eq => "<[->-<]+>[<->[-]]",
    BinOp::Ne => "<[->-<]>[<+>[-]]",
    BinOp::Gt => ">[-]>[-]<<[-<[->>+>+<<<]>>[-<<+>>]>[<<<->>>[-]]<<]<[>+<[-]]>[-<+>]",
    BinOp::Ge => ">[-]>[-]<<<[->[->+>+<<]>[-<+>]>[<<->>[-]]<<<]+>[<->[-]]",
    BinOp::Lt => ">[-]>[-]<<<[->[->+>+<<]>[-<+>]>[<<->>[-]]<<<]>[<+>[-]]",
    BinOp::Le => ">[-]>[-]<<[-<[->>+>+<<<]>>[-<<+>>]>[<<<->>>[-]]<<]<[>+<[-]]+>[-<->]",
    BinOp::And => ">[-]<[<[>>+<<[-]]>[-]]<[-]>>[-<<+>>]<",
    BinOp::Or => ">[-]<[>+<[-]]<[>>[-]+<<[-]]>>[-<<+>>]<",
  }
}

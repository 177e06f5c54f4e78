//! Recursive-descent parser producing the program syntax tree.
//!
//! The parser keeps one token of lookahead over the flat token vector; the
//! trailing `Eof` sentinel means peeking never runs off the end. Each
//! precedence level of the expression grammar gets its own function and all
//! binary operators are left-associative. `else` binds to the nearest `if`.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind};
use crate::ty::Type;

/// A parsed program: the name that ends up in the output header plus the
/// top-level items in source order.
#[derive(Debug, Clone)]
pub struct Program {
  pub name: String,
  pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
  Function(Function),
  Statement(Stmt),
}

/// A function definition. The body statements share one scope with the
/// parameters, which is what lets `return` slide its result over the whole
/// frame.
#[derive(Debug, Clone)]
pub struct Function {
  pub return_type: Type,
  pub name: String,
  pub params: Vec<Declaration>,
  pub body: Vec<Stmt>,
  pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Declaration {
  pub ty: Type,
  pub name: String,
  pub init: Option<Expr>,
  pub line: usize,
}

#[derive(Debug, Clone)]
pub enum Stmt {
  Declaration(Declaration),
  Block {
    statements: Vec<Stmt>,
    line: usize,
  },
  If {
    cond: Expr,
    then: Box<Stmt>,
    otherwise: Option<Box<Stmt>>,
    line: usize,
  },
  While {
    cond: Expr,
    body: Box<Stmt>,
    line: usize,
  },
  Repeat {
    count: Expr,
    body: Box<Stmt>,
    line: usize,
  },
  Return {
    expr: Expr,
    line: usize,
  },
  Inline {
    code: String,
    line: usize,
  },
  Assign {
    op: AssignOp,
    name: String,
    expr: Expr,
    line: usize,
  },
  Call {
    name: String,
    args: Vec<Expr>,
    line: usize,
  },
}

#[derive(Debug, Clone)]
pub enum Expr {
  Binary {
    op: BinOp,
    left: Box<Expr>,
    right: Box<Expr>,
    line: usize,
  },
  Unary {
    op: UnOp,
    right: Box<Expr>,
    line: usize,
  },
  Call {
    name: String,
    args: Vec<Expr>,
    line: usize,
  },
  Var {
    name: String,
    line: usize,
  },
  Int {
    value: u8,
    line: usize,
  },
}

impl Expr {
  pub fn line(&self) -> usize {
    match self {
      Self::Binary { line, .. }
      | Self::Unary { line, .. }
      | Self::Call { line, .. }
      | Self::Var { line, .. }
      | Self::Int { line, .. } => *line,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
  And,
  Or,
}

impl BinOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
      Self::Rem => "%",
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Gt => ">",
      Self::Le => "<=",
      Self::Ge => ">=",
      Self::And => "and",
      Self::Or => "or",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
  Plus,
  Neg,
  Not,
}

impl UnOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Plus => "+",
      Self::Neg => "-",
      Self::Not => "not",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
  Assign,
  Add,
  Sub,
  Mul,
  Div,
  Rem,
}

impl AssignOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Assign => "=",
      Self::Add => "+=",
      Self::Sub => "-=",
      Self::Mul => "*=",
      Self::Div => "/=",
      Self::Rem => "%=",
    }
  }
}

/// Parse a whole token stream into a program named `name`.
pub fn parse(tokens: Vec<Token>, name: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens);
  let mut items = Vec::new();

  while *stream.peek_kind() != TokenKind::Eof {
    if matches!(stream.peek_kind(), TokenKind::Type(_)) {
      // function definition or declaration, disambiguated after the name
      let (ty, line) = stream.expect_type()?;
      let (ident, _) = stream.expect_ident()?;
      if stream.eat(&TokenKind::Eq) {
        let init = parse_expr(&mut stream)?;
        stream.expect(&TokenKind::Semicolon)?;
        items.push(Item::Statement(Stmt::Declaration(Declaration {
          ty,
          name: ident,
          init: Some(init),
          line,
        })));
      } else if stream.eat(&TokenKind::Semicolon) {
        items.push(Item::Statement(Stmt::Declaration(Declaration {
          ty,
          name: ident,
          init: None,
          line,
        })));
      } else if matches!(stream.peek_kind(), TokenKind::LeftParen) {
        items.push(Item::Function(parse_function_rest(
          &mut stream,
          ty,
          ident,
          line,
        )?));
      } else {
        return Err(stream.unexpected("a function definition or a declaration"));
      }
    } else {
      items.push(Item::Statement(parse_statement(&mut stream)?));
    }
  }

  Ok(Program {
    name: name.to_string(),
    items,
  })
}

fn parse_function_rest(
  stream: &mut TokenStream,
  return_type: Type,
  name: String,
  line: usize,
) -> CompileResult<Function> {
  stream.expect(&TokenKind::LeftParen)?;
  let mut params = Vec::new();
  if !stream.eat(&TokenKind::RightParen) {
    loop {
      let (ty, param_line) = stream.expect_type()?;
      let (param_name, _) = stream.expect_ident()?;
      params.push(Declaration {
        ty,
        name: param_name,
        init: None,
        line: param_line,
      });
      if !stream.eat(&TokenKind::Comma) {
        break;
      }
    }
    stream.expect(&TokenKind::RightParen)?;
  }
  let body = parse_block_statements(stream)?;

  Ok(Function {
    return_type,
    name,
    params,
    body,
    line,
  })
}

fn parse_block_statements(stream: &mut TokenStream) -> CompileResult<Vec<Stmt>> {
  stream.expect(&TokenKind::LeftBrace)?;
  let mut statements = Vec::new();
  loop {
    if stream.eat(&TokenKind::RightBrace) {
      break;
    }
    if *stream.peek_kind() == TokenKind::Eof {
      return Err(CompileError::parse_eof());
    }
    if matches!(stream.peek_kind(), TokenKind::Type(_)) {
      statements.push(Stmt::Declaration(parse_declaration(stream)?));
    } else {
      statements.push(parse_statement(stream)?);
    }
  }
  Ok(statements)
}

fn parse_declaration(stream: &mut TokenStream) -> CompileResult<Declaration> {
  let (ty, line) = stream.expect_type()?;
  let (name, _) = stream.expect_ident()?;
  let init = if stream.eat(&TokenKind::Eq) {
    Some(parse_expr(stream)?)
  } else {
    None
  };
  stream.expect(&TokenKind::Semicolon)?;
  Ok(Declaration {
    ty,
    name,
    init,
    line,
  })
}

fn parse_statement(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let line = stream.peek().line;

  if matches!(stream.peek_kind(), TokenKind::LeftBrace) {
    let statements = parse_block_statements(stream)?;
    return Ok(Stmt::Block { statements, line });
  }

  if stream.eat(&TokenKind::If) {
    stream.expect(&TokenKind::LeftParen)?;
    let cond = parse_expr(stream)?;
    stream.expect(&TokenKind::RightParen)?;
    let then = Box::new(parse_statement(stream)?);
    let otherwise = if stream.eat(&TokenKind::Else) {
      Some(Box::new(parse_statement(stream)?))
    } else {
      None
    };
    return Ok(Stmt::If {
      cond,
      then,
      otherwise,
      line,
    });
  }

  if stream.eat(&TokenKind::While) {
    stream.expect(&TokenKind::LeftParen)?;
    let cond = parse_expr(stream)?;
    stream.expect(&TokenKind::RightParen)?;
    let body = Box::new(parse_statement(stream)?);
    return Ok(Stmt::While { cond, body, line });
  }

  if stream.eat(&TokenKind::Repeat) {
    stream.expect(&TokenKind::LeftParen)?;
    let count = parse_expr(stream)?;
    stream.expect(&TokenKind::RightParen)?;
    let body = Box::new(parse_statement(stream)?);
    return Ok(Stmt::Repeat { count, body, line });
  }

  if stream.eat(&TokenKind::Return) {
    let expr = parse_expr(stream)?;
    stream.expect(&TokenKind::Semicolon)?;
    return Ok(Stmt::Return { expr, line });
  }

  // inline blocks arrive from the tokenizer already complete
  if let Some(code) = stream.take_inline() {
    return Ok(Stmt::Inline { code, line });
  }

  if let Some(name) = stream.take_ident() {
    if stream.eat(&TokenKind::LeftParen) {
      let args = parse_args(stream)?;
      stream.expect(&TokenKind::Semicolon)?;
      return Ok(Stmt::Call { name, args, line });
    }
    let op = match stream.peek_kind() {
      TokenKind::Eq => AssignOp::Assign,
      TokenKind::PlusEq => AssignOp::Add,
      TokenKind::MinusEq => AssignOp::Sub,
      TokenKind::StarEq => AssignOp::Mul,
      TokenKind::SlashEq => AssignOp::Div,
      TokenKind::PercentEq => AssignOp::Rem,
      _ => return Err(stream.unexpected("a function call or an assignment")),
    };
    stream.next();
    let expr = parse_expr(stream)?;
    stream.expect(&TokenKind::Semicolon)?;
    return Ok(Stmt::Assign {
      op,
      name,
      expr,
      line,
    });
  }

  Err(stream.unexpected("a statement"))
}

/// Parse a comma-separated argument list; the opening parenthesis has
/// already been consumed.
fn parse_args(stream: &mut TokenStream) -> CompileResult<Vec<Expr>> {
  let mut args = Vec::new();
  if stream.eat(&TokenKind::RightParen) {
    return Ok(args);
  }
  loop {
    args.push(parse_expr(stream)?);
    if !stream.eat(&TokenKind::Comma) {
      break;
    }
  }
  stream.expect(&TokenKind::RightParen)?;
  Ok(args)
}

// ----- Expression parsing, one function per precedence level -----

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut expr = parse_and(stream)?;
  loop {
    let line = stream.peek().line;
    if !stream.eat(&TokenKind::Or) {
      break;
    }
    let right = parse_and(stream)?;
    expr = Expr::Binary {
      op: BinOp::Or,
      left: Box::new(expr),
      right: Box::new(right),
      line,
    };
  }
  Ok(expr)
}

fn parse_and(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut expr = parse_not(stream)?;
  loop {
    let line = stream.peek().line;
    if !stream.eat(&TokenKind::And) {
      break;
    }
    let right = parse_not(stream)?;
    expr = Expr::Binary {
      op: BinOp::And,
      left: Box::new(expr),
      right: Box::new(right),
      line,
    };
  }
  Ok(expr)
}

fn parse_not(stream: &mut TokenStream) -> CompileResult<Expr> {
  let line = stream.peek().line;
  if stream.eat(&TokenKind::Not) {
    let right = parse_not(stream)?;
    return Ok(Expr::Unary {
      op: UnOp::Not,
      right: Box::new(right),
      line,
    });
  }
  parse_equality(stream)
}

fn parse_equality(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut expr = parse_relational(stream)?;
  loop {
    let op = match stream.peek_kind() {
      TokenKind::EqEq => BinOp::Eq,
      TokenKind::NotEq => BinOp::Ne,
      _ => break,
    };
    let line = stream.next().line;
    let right = parse_relational(stream)?;
    expr = Expr::Binary {
      op,
      left: Box::new(expr),
      right: Box::new(right),
      line,
    };
  }
  Ok(expr)
}

fn parse_relational(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut expr = parse_additive(stream)?;
  loop {
    let op = match stream.peek_kind() {
      TokenKind::Less => BinOp::Lt,
      TokenKind::Greater => BinOp::Gt,
      TokenKind::LessEq => BinOp::Le,
      TokenKind::GreaterEq => BinOp::Ge,
      _ => break,
    };
    let line = stream.next().line;
    let right = parse_additive(stream)?;
    expr = Expr::Binary {
      op,
      left: Box::new(expr),
      right: Box::new(right),
      line,
    };
  }
  Ok(expr)
}

fn parse_additive(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut expr = parse_term(stream)?;
  loop {
    let op = match stream.peek_kind() {
      TokenKind::Plus => BinOp::Add,
      TokenKind::Minus => BinOp::Sub,
      _ => break,
    };
    let line = stream.next().line;
    let right = parse_term(stream)?;
    expr = Expr::Binary {
      op,
      left: Box::new(expr),
      right: Box::new(right),
      line,
    };
  }
  Ok(expr)
}

fn parse_term(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut expr = parse_unary(stream)?;
  loop {
    let op = match stream.peek_kind() {
      TokenKind::Star => BinOp::Mul,
      TokenKind::Slash => BinOp::Div,
      TokenKind::Percent => BinOp::Rem,
      _ => break,
    };
    let line = stream.next().line;
    let right = parse_unary(stream)?;
    expr = Expr::Binary {
      op,
      left: Box::new(expr),
      right: Box::new(right),
      line,
    };
  }
  Ok(expr)
}

fn parse_unary(stream: &mut TokenStream) -> CompileResult<Expr> {
  let line = stream.peek().line;
  let op = match stream.peek_kind() {
    TokenKind::Plus => UnOp::Plus,
    TokenKind::Minus => UnOp::Neg,
    _ => return parse_primary(stream),
  };
  stream.next();
  let right = parse_unary(stream)?;
  Ok(Expr::Unary {
    op,
    right: Box::new(right),
    line,
  })
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  let line = stream.peek().line;

  if let Some(value) = stream.take_int() {
    return Ok(Expr::Int { value, line });
  }

  if stream.eat(&TokenKind::LeftParen) {
    let expr = parse_expr(stream)?;
    stream.expect(&TokenKind::RightParen)?;
    return Ok(expr);
  }

  if let Some(name) = stream.take_ident() {
    if stream.eat(&TokenKind::LeftParen) {
      let args = parse_args(stream)?;
      return Ok(Expr::Call { name, args, line });
    }
    return Ok(Expr::Var { name, line });
  }

  Err(stream.unexpected("an expression"))
}

/// Lightweight cursor over the token vector. The tokenizer guarantees a
/// trailing `Eof` token, so `peek` always has something to return.
struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  fn new(tokens: Vec<Token>) -> Self {
    Self { tokens, pos: 0 }
  }

  fn peek(&self) -> &Token {
    let last = self.tokens.len() - 1;
    &self.tokens[self.pos.min(last)]
  }

  fn peek_kind(&self) -> &TokenKind {
    &self.peek().kind
  }

  /// Consume and return the current token; stays on the `Eof` sentinel once
  /// it is reached.
  fn next(&mut self) -> Token {
    let token = self.peek().clone();
    if self.pos < self.tokens.len() - 1 {
      self.pos += 1;
    }
    token
  }

  /// Consume the current token if it matches `kind`.
  fn eat(&mut self, kind: &TokenKind) -> bool {
    if self.peek_kind() == kind {
      self.next();
      true
    } else {
      false
    }
  }

  fn expect(&mut self, kind: &TokenKind) -> CompileResult<Token> {
    if self.peek_kind() == kind {
      Ok(self.next())
    } else {
      Err(self.unexpected(&format!("'{kind}'")))
    }
  }

  fn expect_ident(&mut self) -> CompileResult<(String, usize)> {
    let line = self.peek().line;
    match self.take_ident() {
      Some(name) => Ok((name, line)),
      None => Err(self.unexpected("an identifier")),
    }
  }

  fn expect_type(&mut self) -> CompileResult<(Type, usize)> {
    let token = self.peek().clone();
    if let TokenKind::Type(name) = &token.kind {
      if let Some(ty) = Type::from_name(name) {
        self.next();
        return Ok((ty, token.line));
      }
    }
    Err(self.unexpected("a type"))
  }

  fn take_ident(&mut self) -> Option<String> {
    if let TokenKind::Ident(name) = self.peek_kind() {
      let name = name.clone();
      self.next();
      return Some(name);
    }
    None
  }

  fn take_int(&mut self) -> Option<u8> {
    if let TokenKind::Int(value) = self.peek_kind() {
      let value = *value;
      self.next();
      return Some(value);
    }
    None
  }

  fn take_inline(&mut self) -> Option<String> {
    if let TokenKind::InlineCode(code) = self.peek_kind() {
      let code = code.clone();
      self.next();
      return Some(code);
    }
    None
  }

  /// Build the "expected X, got Y" diagnostic for the current token.
  /// Premature end of input gets its own error.
  fn unexpected(&self, what: &str) -> CompileError {
    let token = self.peek();
    if token.kind == TokenKind::Eof {
      CompileError::parse_eof()
    } else {
      CompileError::parse(
        token.line,
        format!("expected {what}, got '{}'", token.kind),
      )
    }
  }
}

// ----- Tree printing (the `--tree` flag) -----

/// Render an indented dump of the syntax tree, two spaces per level.
pub fn write_tree(program: &Program) -> String {
  let mut out = String::new();
  out.push_str(&format!("Program '{}'\n", program.name));
  for item in &program.items {
    match item {
      Item::Function(func) => write_function(&mut out, func, 1),
      Item::Statement(stmt) => write_stmt(&mut out, stmt, 1),
    }
  }
  out
}

fn push_line(out: &mut String, depth: usize, text: &str) {
  for _ in 0..depth {
    out.push_str("  ");
  }
  out.push_str(text);
  out.push('\n');
}

fn write_function(out: &mut String, func: &Function, depth: usize) {
  push_line(
    out,
    depth,
    &format!("Function '{}' -> {}", func.name, func.return_type),
  );
  for param in &func.params {
    push_line(out, depth + 1, &format!("Param {} '{}'", param.ty, param.name));
  }
  for stmt in &func.body {
    write_stmt(out, stmt, depth + 1);
  }
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
  match stmt {
    Stmt::Declaration(decl) => {
      push_line(
        out,
        depth,
        &format!("Declaration {} '{}'", decl.ty, decl.name),
      );
      if let Some(init) = &decl.init {
        write_expr(out, init, depth + 1);
      }
    }
    Stmt::Block { statements, .. } => {
      push_line(out, depth, "Block");
      for stmt in statements {
        write_stmt(out, stmt, depth + 1);
      }
    }
    Stmt::If {
      cond,
      then,
      otherwise,
      ..
    } => {
      push_line(out, depth, "If");
      write_expr(out, cond, depth + 1);
      push_line(out, depth, "Then");
      write_stmt(out, then, depth + 1);
      if let Some(otherwise) = otherwise {
        push_line(out, depth, "Else");
        write_stmt(out, otherwise, depth + 1);
      }
    }
    Stmt::While { cond, body, .. } => {
      push_line(out, depth, "While");
      write_expr(out, cond, depth + 1);
      write_stmt(out, body, depth + 1);
    }
    Stmt::Repeat { count, body, .. } => {
      push_line(out, depth, "Repeat");
      write_expr(out, count, depth + 1);
      write_stmt(out, body, depth + 1);
    }
    Stmt::Return { expr, .. } => {
      push_line(out, depth, "Return");
      write_expr(out, expr, depth + 1);
    }
    Stmt::Inline { code, .. } => {
      push_line(out, depth, &format!("Inline \"{code}\""));
    }
    Stmt::Assign { op, name, expr, .. } => {
      push_line(out, depth, &format!("Assign '{name}' {}", op.symbol()));
      write_expr(out, expr, depth + 1);
    }
    Stmt::Call { name, args, .. } => {
      push_line(out, depth, &format!("Call '{name}'"));
      for arg in args {
        write_expr(out, arg, depth + 1);
      }
    }
  }
}

fn write_expr(out: &mut String, expr: &Expr, depth: usize) {
  match expr {
    Expr::Binary {
      op, left, right, ..
    } => {
      push_line(out, depth, &format!("Binary '{}'", op.symbol()));
      write_expr(out, left, depth + 1);
      write_expr(out, right, depth + 1);
    }
    Expr::Unary { op, right, .. } => {
      push_line(out, depth, &format!("Unary '{}'", op.symbol()));
      write_expr(out, right, depth + 1);
    }
    Expr::Call { name, args, .. } => {
      push_line(out, depth, &format!("Call '{name}'"));
      for arg in args {
        write_expr(out, arg, depth + 1);
      }
    }
    Expr::Var { name, .. } => push_line(out, depth, &format!("Var '{name}'")),
    Expr::Int { value, .. } => push_line(out, depth, &format!("Int {value}")),
  }
}

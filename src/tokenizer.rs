//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about the language beyond recognising the
//! token shapes, with multi-character operators matched before
//! single-character ones. The one stateful wrinkle is the `inline` keyword,
//! which switches to a raw mode that swallows everything up to the next `;`
//! and keeps only tape-machine instructions.

use crate::error::{CompileError, CompileResult};

/// The eight characters of the target language; everything else inside an
/// `inline` block is discarded.
const INSTRUCTIONS: &str = "+-<>[].,";

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
  Ident(String),
  Type(String),
  Int(u8),
  /// An `inline` block, already reduced to its surviving instructions.
  InlineCode(String),

  // control keywords
  If,
  Else,
  While,
  Repeat,
  Return,

  // word operators
  And,
  Or,
  Not,

  // separators
  Eq,
  LeftBrace,
  RightBrace,
  LeftParen,
  RightParen,
  Semicolon,
  Comma,

  // operators
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  PlusEq,
  MinusEq,
  StarEq,
  SlashEq,
  PercentEq,
  EqEq,
  NotEq,
  Less,
  Greater,
  LessEq,
  GreaterEq,

  /// End-of-input sentinel; compares equal only to itself.
  Eof,
}

impl std::fmt::Display for TokenKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      Self::Ident(name) => return write!(f, "{name}"),
      Self::Type(name) => return write!(f, "{name}"),
      Self::Int(value) => return write!(f, "{value}"),
      Self::InlineCode(_) => "inline",
      Self::If => "if",
      Self::Else => "else",
      Self::While => "while",
      Self::Repeat => "repeat",
      Self::Return => "return",
      Self::And => "and",
      Self::Or => "or",
      Self::Not => "not",
      Self::Eq => "=",
      Self::LeftBrace => "{",
      Self::RightBrace => "}",
      Self::LeftParen => "(",
      Self::RightParen => ")",
      Self::Semicolon => ";",
      Self::Comma => ",",
      Self::Plus => "+",
      Self::Minus => "-",
      Self::Star => "*",
      Self::Slash => "/",
      Self::Percent => "%",
      Self::PlusEq => "+=",
      Self::MinusEq => "-=",
      Self::StarEq => "*=",
      Self::SlashEq => "/=",
      Self::PercentEq => "%=",
      Self::EqEq => "==",
      Self::NotEq => "!=",
      Self::Less => "<",
      Self::Greater => ">",
      Self::LessEq => "<=",
      Self::GreaterEq => ">=",
      Self::Eof => "end of file",
    };
    f.write_str(text)
  }
}

/// Thin wrapper pairing a token kind with its source line.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub line: usize,
}

impl Token {
  pub fn new(kind: TokenKind, line: usize) -> Self {
    Self { kind, line }
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;
  let mut line = 1;

  while i < bytes.len() {
    let c = bytes[i];

    if c == b'\n' {
      line += 1;
      i += 1;
      continue;
    }
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    // comment to end of line
    if c == b'#' {
      while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
      }
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      // cells are bytes, so the literal is folded modulo 256 right away
      let value = input[start..i]
        .bytes()
        .fold(0u8, |acc, d| acc.wrapping_mul(10).wrapping_add(d - b'0'));
      tokens.push(Token::new(TokenKind::Int(value), line));
      continue;
    }

    if c == b'\'' {
      let (value, len) = char_literal(&input[i..], line)?;
      tokens.push(Token::new(TokenKind::Int(value), line));
      i += len;
      continue;
    }

    if let Some(kind) = two_char_operator(&input[i..]) {
      tokens.push(Token::new(kind, line));
      i += 2;
      continue;
    }

    if let Some(kind) = one_char_token(c) {
      tokens.push(Token::new(kind, line));
      i += 1;
      continue;
    }

    if c == b'_' || c.is_ascii_alphabetic() {
      let start = i;
      i += 1;
      while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
        i += 1;
      }
      let word = &input[start..i];
      let kind = match word {
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "repeat" => TokenKind::Repeat,
        "return" => TokenKind::Return,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "true" => TokenKind::Int(1),
        "false" => TokenKind::Int(0),
        "int" | "void" => TokenKind::Type(word.to_string()),
        "inline" => {
          let block_line = line;
          let rest = &input[i..];
          let end = match rest.find(';') {
            Some(end) => end,
            None => return Err(CompileError::lex(line, "unterminated inline block")),
          };
          let raw = &rest[..end];
          line += raw.bytes().filter(|&b| b == b'\n').count();
          i += end + 1;
          let code = raw.chars().filter(|c| INSTRUCTIONS.contains(*c)).collect();
          tokens.push(Token::new(TokenKind::InlineCode(code), block_line));
          continue;
        }
        _ => TokenKind::Ident(word.to_string()),
      };
      tokens.push(Token::new(kind, line));
      continue;
    }

    let invalid = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::lex(line, format!("invalid token: '{invalid}'")));
  }

  tokens.push(Token::new(TokenKind::Eof, line));
  Ok(tokens)
}

/// Scan a character literal starting at the opening quote. Returns the cell
/// value and the number of bytes consumed.
fn char_literal(rest: &str, line: usize) -> CompileResult<(u8, usize)> {
  let mut chars = rest.chars();
  chars.next(); // opening quote
  let (value, body_len) = match chars.next() {
    Some('\\') => {
      let escape = chars
        .next()
        .ok_or_else(|| CompileError::lex(line, "unterminated character literal"))?;
      let value = match escape {
        'n' => b'\n',
        'r' => b'\r',
        't' => b'\t',
        'b' => 0x08,
        _ => {
          return Err(CompileError::lex(
            line,
            format!("invalid escape sequence: '\\{escape}'"),
          ));
        }
      };
      (value, 2)
    }
    Some(c) if c != '\'' && c != '\n' => ((c as u32 % 256) as u8, c.len_utf8()),
    _ => return Err(CompileError::lex(line, "invalid character literal")),
  };
  match chars.next() {
    Some('\'') => Ok((value, body_len + 2)),
    _ => Err(CompileError::lex(line, "unterminated character literal")),
  }
}

fn two_char_operator(rest: &str) -> Option<TokenKind> {
  let kind = match rest.get(..2)? {
    "+=" => TokenKind::PlusEq,
    "-=" => TokenKind::MinusEq,
    "*=" => TokenKind::StarEq,
    "/=" => TokenKind::SlashEq,
    "%=" => TokenKind::PercentEq,
    "==" => TokenKind::EqEq,
    "!=" => TokenKind::NotEq,
    "<=" => TokenKind::LessEq,
    ">=" => TokenKind::GreaterEq,
    _ => return None,
  };
  Some(kind)
}

fn one_char_token(c: u8) -> Option<TokenKind> {
  let kind = match c {
    b'=' => TokenKind::Eq,
    b'{' => TokenKind::LeftBrace,
    b'}' => TokenKind::RightBrace,
    b'(' => TokenKind::LeftParen,
    b')' => TokenKind::RightParen,
    b';' => TokenKind::Semicolon,
    b',' => TokenKind::Comma,
    b'+' => TokenKind::Plus,
    b'-' => TokenKind::Minus,
    b'*' => TokenKind::Star,
    b'/' => TokenKind::Slash,
    b'%' => TokenKind::Percent,
    b'<' => TokenKind::Less,
    b'>' => TokenKind::Greater,
    _ => return None,
  };
  Some(kind)
}

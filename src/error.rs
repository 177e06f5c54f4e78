//! Shared error utilities used across the compilation pipeline.
//!
//! Every compiler-visible failure is one of three kinds matching the
//! pipeline stages. Messages are prefixed with `line <n>:` whenever the
//! offending line is known; the driver decides how much of the error to
//! show.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{}", at_line(message, *line)))]
  Lex { message: String, line: Option<usize> },

  #[snafu(display("{}", at_line(message, *line)))]
  Parse { message: String, line: Option<usize> },

  #[snafu(display("{}", at_line(message, *line)))]
  CodeGen { message: String, line: Option<usize> },
}

impl CompileError {
  /// Construct a lexical error anchored at a source line.
  pub fn lex(line: usize, message: impl Into<String>) -> Self {
    Self::Lex {
      message: message.into(),
      line: Some(line),
    }
  }

  /// Construct a syntax error anchored at a source line.
  pub fn parse(line: usize, message: impl Into<String>) -> Self {
    Self::Parse {
      message: message.into(),
      line: Some(line),
    }
  }

  /// Construct a syntax error for running out of tokens. Premature end of
  /// input has no meaningful line to point at.
  pub fn parse_eof() -> Self {
    Self::Parse {
      message: "unexpected end of file".to_string(),
      line: None,
    }
  }

  /// Construct a code generation error anchored at a source line.
  pub fn codegen(line: usize, message: impl Into<String>) -> Self {
    Self::CodeGen {
      message: message.into(),
      line: Some(line),
    }
  }
}

fn at_line(message: &str, line: Option<usize>) -> String {
  match line {
    Some(n) => format!("line {n}: {message}"),
    None => message.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::CompileError;

  #[test]
  fn message_carries_line_prefix() {
    let err = CompileError::codegen(3, "variable 'x' is not declared");
    assert_eq!(err.to_string(), "line 3: variable 'x' is not declared");
  }

  #[test]
  fn message_without_line() {
    let err = CompileError::parse_eof();
    assert_eq!(err.to_string(), "unexpected end of file");
  }
}

//! Peephole optimization of the generated instruction stream.
//!
//! The emitter's templates freely produce motion like `><` when a relative
//! hop lands back where it started. Each of the pairs `+-`, `-+`, `<>` and
//! `><` is a runtime no-op, so removing them never changes behaviour.

/// Remove every occurrence of `+-`, `-+`, `<>` and `><` until none remains.
///
/// A single pass with the output acting as a stack reaches the fixed point:
/// whenever the next instruction undoes the last surviving one, the pair is
/// dropped, which may expose an earlier pair to the following instruction.
pub fn optimize(code: &str) -> String {
  let mut out = String::with_capacity(code.len());
  for c in code.chars() {
    let cancels = matches!(
      (out.as_bytes().last(), c),
      (Some(b'+'), '-') | (Some(b'-'), '+') | (Some(b'<'), '>') | (Some(b'>'), '<')
    );
    if cancels {
      out.pop();
    } else {
      out.push(c);
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::optimize;

  #[test]
  fn removes_adjacent_pairs() {
    assert_eq!(optimize("+-"), "");
    assert_eq!(optimize("-+"), "");
    assert_eq!(optimize("<>"), "");
    assert_eq!(optimize("><"), "");
  }

  #[test]
  fn cancellation_cascades() {
    assert_eq!(optimize("+<>-"), "");
    assert_eq!(optimize("++--"), "");
    assert_eq!(optimize(">><+-><<"), "");
    assert_eq!(optimize(">+<>-<"), "");
    assert_eq!(optimize(">.+-<"), ">.<");
  }

  #[test]
  fn keeps_everything_else() {
    assert_eq!(optimize("[-]"), "[-]");
    assert_eq!(optimize("+[>.<-]"), "+[>.<-]");
    assert_eq!(optimize(",."), ",.");
    // brackets separate pairs: `[` is not transparent
    assert_eq!(optimize("+[-]"), "+[-]");
    assert_eq!(optimize(">[<"), ">[<");
  }

  #[test]
  fn is_idempotent() {
    for code in ["", "+-", ">><<", "++[>+<-]>.", "<<>>++--+"] {
      let once = optimize(code);
      assert_eq!(optimize(&once), once);
    }
  }

  #[test]
  fn reaches_a_fixed_point() {
    for code in ["+<>-", ">><+-><<", "+->+<<>-+"] {
      let optimized = optimize(code);
      for pair in ["+-", "-+", "<>", "><"] {
        assert!(
          !optimized.contains(pair),
          "{pair:?} survives in {optimized:?}"
        );
      }
    }
  }
}

//! Standard-library loading and its on-disk cache.
//!
//! The library is ordinary source code living in a `std.lib` file next to
//! the compiler; a copy is baked into the binary as a fallback so the
//! compiler also works when the file is missing. Compiling it is cheap but
//! not free, so the compiled function records are cached on disk in a file
//! keyed by a hash of the library source: editing `std.lib` changes the key
//! and naturally invalidates the cache.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codegen::{self, Function};
use crate::error::CompileResult;
use crate::parser;
use crate::tokenizer;
use crate::ty::Type;

/// Bundled copy of the library source.
const BUNDLED: &str = include_str!("../std.lib");

/// One cached function, the serialized form of [`Function`].
#[derive(Debug, Serialize, Deserialize)]
struct FunctionRecord {
  name: String,
  return_type: String,
  arity: usize,
  code: String,
}

/// Load the standard library, consulting the cache unless `recompile` is
/// set. Compilation happens with a completely fresh generator; nothing
/// carries over into the user program except the returned records.
pub fn load(recompile: bool) -> CompileResult<HashMap<String, Function>> {
  let dir = compiler_dir();
  let source = read_library_source(&dir);
  let cache = dir.join(cache_file_name(&source));

  if !recompile {
    if let Some(functions) = read_cache(&cache) {
      log::debug!("standard library loaded from {}", cache.display());
      return Ok(functions);
    }
  }

  let functions = compile_library(&source)?;
  write_cache(&cache, &functions);
  Ok(functions)
}

/// Compile the bundled library source directly, skipping the file lookup
/// and the cache. Useful when the caller wants a hermetic library.
pub fn compile_bundled() -> CompileResult<HashMap<String, Function>> {
  compile_library(BUNDLED)
}

/// Compile the library source through the regular pipeline, expanding every
/// function body so the records are complete.
fn compile_library(source: &str) -> CompileResult<HashMap<String, Function>> {
  let tokens = tokenizer::tokenize(source)?;
  let ast = parser::parse(tokens, "std")?;
  codegen::generate_library(ast)
}

/// Directory the compiler runs from; `std.lib` and the cache live here.
fn compiler_dir() -> PathBuf {
  env::current_exe()
    .ok()
    .and_then(|exe| exe.parent().map(Path::to_path_buf))
    .unwrap_or_else(|| PathBuf::from("."))
}

fn read_library_source(dir: &Path) -> String {
  let path = dir.join("std.lib");
  match fs::read_to_string(&path) {
    Ok(source) => source,
    Err(_) => {
      log::debug!("no {} found, using the bundled library", path.display());
      BUNDLED.to_string()
    }
  }
}

/// Cache file name, keyed by the first 8 hex digits of the MD5 of the
/// library source.
fn cache_file_name(source: &str) -> String {
  let digest = format!("{:x}", md5::compute(source));
  format!("std-{}.cache.json", &digest[..8])
}

fn read_cache(path: &Path) -> Option<HashMap<String, Function>> {
  let text = fs::read_to_string(path).ok()?;
  let records: Vec<FunctionRecord> = match serde_json::from_str(&text) {
    Ok(records) => records,
    Err(err) => {
      log::warn!("ignoring unreadable cache {}: {err}", path.display());
      return None;
    }
  };
  records_to_functions(records)
}

fn write_cache(path: &Path, functions: &HashMap<String, Function>) {
  let records = functions_to_records(functions);
  let text = match serde_json::to_string_pretty(&records) {
    Ok(text) => text,
    Err(err) => {
      log::warn!("not caching the standard library: {err}");
      return;
    }
  };
  match fs::write(path, text) {
    Ok(()) => log::debug!("standard library cached at {}", path.display()),
    Err(err) => log::warn!("could not write {}: {err}", path.display()),
  }
}

fn records_to_functions(records: Vec<FunctionRecord>) -> Option<HashMap<String, Function>> {
  let mut functions = HashMap::new();
  for record in records {
    let return_type = match Type::from_name(&record.return_type) {
      Some(ty) => ty,
      None => {
        log::warn!(
          "cache record '{}' has unknown type '{}'",
          record.name,
          record.return_type
        );
        return None;
      }
    };
    functions.insert(
      record.name,
      Function {
        return_type,
        arity: record.arity,
        code: Some(record.code),
        node: None,
      },
    );
  }
  Some(functions)
}

fn functions_to_records(functions: &HashMap<String, Function>) -> Vec<FunctionRecord> {
  let mut records: Vec<FunctionRecord> = functions
    .iter()
    .filter_map(|(name, func)| {
      func.code.as_ref().map(|code| FunctionRecord {
        name: name.clone(),
        return_type: func.return_type.name().to_string(),
        arity: func.arity,
        code: code.clone(),
      })
    })
    .collect();
  records.sort_by(|a, b| a.name.cmp(&b.name));
  records
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bundled_library_compiles() {
    let functions = compile_library(BUNDLED).unwrap();
    for name in ["putchar", "getchar", "putnum"] {
      let func = functions.get(name).unwrap_or_else(|| panic!("missing {name}"));
      assert!(func.code.is_some(), "{name} has no compiled code");
    }
    assert_eq!(functions["putchar"].return_type, Type::Void);
    assert_eq!(functions["putchar"].arity, 1);
    assert_eq!(functions["getchar"].return_type, Type::Int);
    assert_eq!(functions["getchar"].arity, 0);
  }

  #[test]
  fn records_round_trip_through_json() {
    let functions = compile_library(BUNDLED).unwrap();
    let json = serde_json::to_string(&functions_to_records(&functions)).unwrap();
    let records: Vec<FunctionRecord> = serde_json::from_str(&json).unwrap();
    let restored = records_to_functions(records).unwrap();
    assert_eq!(restored.len(), functions.len());
    for (name, func) in &functions {
      let cached = &restored[name];
      assert_eq!(cached.return_type, func.return_type);
      assert_eq!(cached.arity, func.arity);
      assert_eq!(cached.code, func.code);
    }
  }

  #[test]
  fn cache_name_embeds_a_hash_prefix() {
    let name = cache_file_name("void f() {}");
    assert!(name.starts_with("std-"));
    assert!(name.ends_with(".cache.json"));
    assert_eq!(name.len(), "std-".len() + 8 + ".cache.json".len());
    // a different source gets a different cache file
    assert_ne!(name, cache_file_name("void g() {}"));
    // the same source always maps to the same file
    assert_eq!(name, cache_file_name("void f() {}"));
  }

  #[test]
  fn unknown_types_invalidate_the_cache() {
    let records = vec![FunctionRecord {
      name: "f".to_string(),
      return_type: "string".to_string(),
      arity: 0,
      code: String::new(),
    }];
    assert!(records_to_functions(records).is_none());
  }
}

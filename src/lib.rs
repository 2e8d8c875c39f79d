//! Scope hoisting for flat-bundle concatenation.
//!
//! The transform takes one parsed module plus its metadata sidecar (identity,
//! declared dependencies, mutable symbol table) and rewrites the tree so the
//! packager can concatenate every module into a single scope: top-level
//! bindings get module-unique names, imports and exports become
//! `$parcel$require`/`$parcel$export` placeholder calls, CommonJS constructs
//! are rewritten to ES-shaped equivalents, and modules whose behavior cannot
//! be statically rewritten are wrapped in a closure that synthesizes their
//! `exports`/`module.exports` pair.

mod asset;
mod collect;
mod error;
mod hoist;
#[cfg(test)]
mod test_utils;
mod utils;

pub use asset::{
  Asset, AssetMeta, Dependency, DependencyMeta, Environment, EnvironmentContext, Symbol,
  SymbolTable,
};
pub use error::HoistError;
pub use hoist::HoistResult;
pub use utils::{CodeHighlight, Diagnostic, DiagnosticSeverity, SourceLocation};

use swc_core::common::sync::Lrc;
use swc_core::common::{Mark, SourceMap};
use swc_core::ecma::ast::Module;
use swc_core::ecma::visit::{FoldWith, VisitWith};

use collect::Collect;
use hoist::Hoist;
use utils::to_identifier;

pub const AST_KIND: &str = "swc";
pub const AST_VERSION: &str = "1";

/// A parsed module tagged with the model and version it was produced with.
///
/// The marks are the ones the swc resolver ran with; `hoist` must be called
/// within the same swc globals scope the resolver ran under.
pub struct Ast {
  pub kind: String,
  pub version: String,
  pub module: Module,
  pub source_map: Lrc<SourceMap>,
  pub unresolved_mark: Mark,
  pub global_mark: Mark,
}

impl Ast {
  pub fn new(
    module: Module,
    source_map: Lrc<SourceMap>,
    unresolved_mark: Mark,
    global_mark: Mark,
  ) -> Self {
    Ast {
      kind: AST_KIND.into(),
      version: AST_VERSION.into(),
      module,
      source_map,
      unresolved_mark,
      global_mark,
    }
  }
}

/// Rewrites one module for scope hoisting.
///
/// Mutates `asset.meta`, the asset and dependency symbol tables, and the
/// dependency list in place, and returns the rewritten tree together with a
/// result summary and any diagnostics.
pub fn hoist(
  asset: &mut Asset,
  ast: Ast,
) -> Result<(Module, HoistResult, Vec<Diagnostic>), HoistError> {
  if ast.kind != AST_KIND || ast.version != AST_VERSION {
    return Err(HoistError::UnsupportedAst {
      kind: ast.kind,
      version: ast.version,
    });
  }

  asset.symbols.ensure();
  let module_id = to_identifier(&asset.id);
  asset.meta.exports_identifier = Some(format!("${}$exports", module_id));

  let mut collect = Collect::new(
    ast.source_map.clone(),
    ast.unresolved_mark,
    ast.global_mark,
    true,
  );
  ast.module.visit_with(&mut collect);

  tracing::debug!(
    asset_id = %asset.id,
    is_esm = collect.is_esm,
    is_commonjs = collect.is_commonjs,
    should_wrap = collect.should_wrap,
    "classified module"
  );

  if !collect.static_cjs_exports && !collect.should_wrap {
    tracing::warn!(
      asset_id = %asset.id,
      "exports object escapes static analysis, falling back to the namespace symbol"
    );
    asset.meta.resolve_exports_bailed_out = true;
    let specifier = asset.self_specifier();
    if asset.dependency(&specifier).is_none() {
      let mut dependency = Dependency::new(asset.id.clone(), specifier);
      dependency.symbols.insert("*", Symbol::new("@exports", None));
      asset.add_dependency(dependency);
    }
  }

  let mut hoist = Hoist::new(&module_id, asset, &collect, ast.unresolved_mark);
  let module = ast.module.fold_with(&mut hoist);
  let (mut result, diagnostics, mut errors) = hoist.into_parts();
  if !errors.is_empty() {
    return Err(errors.remove(0));
  }

  finalize(asset, &collect, &module_id, &mut result);

  Ok((module, result, diagnostics))
}

/// Applies the classification defaults and invariants once the tree has been
/// rewritten.
fn finalize(asset: &mut Asset, collect: &Collect, module_id: &str, result: &mut HoistResult) {
  let exports_name = format!("${}$exports", module_id);

  if collect.should_wrap {
    asset.symbols.insert("*", Symbol::new(exports_name, None));
    asset.meta.should_wrap = true;
    asset.meta.is_common_js = true;
    asset.meta.is_es6_module = false;
  } else {
    asset.meta.is_es6_module = collect.is_esm;
    if collect.is_commonjs {
      asset.meta.is_common_js = true;
    }
    if !collect.is_esm && !asset.meta.is_common_js {
      // No module-system evidence at all: CommonJS by default.
      asset.meta.is_common_js = true;
    }

    if asset.meta.is_common_js {
      asset
        .symbols
        .insert_if_absent("*", Symbol::new(exports_name.clone(), None));
    }

    if asset.meta.is_common_js && asset.meta.resolve_exports_bailed_out {
      asset.symbols.retain(|exported, _| exported == "*");
      asset.symbols.insert("*", Symbol::new(exports_name, None));
    }
  }

  for source in &collect.wrapped_requires {
    if let Some(dependency) = asset.dependency_mut(source) {
      dependency.meta.should_wrap = true;
    }
  }

  result.is_commonjs = asset.meta.is_common_js;
  result.is_esm = asset.meta.is_es6_module;
  result.should_wrap = collect.should_wrap;
  result.static_cjs_exports = collect.static_cjs_exports;
}

#[cfg(test)]
mod tests {
  use swc_core::common::{Globals, Mark, GLOBALS};
  use swc_core::ecma::ast::Module;
  use swc_core::common::DUMMY_SP;

  use super::*;

  #[test]
  fn rejects_unknown_ast() {
    GLOBALS.set(&Globals::new(), || {
      let module = Module {
        span: DUMMY_SP,
        body: vec![],
        shebang: None,
      };
      let mut ast = Ast::new(
        module,
        Lrc::new(SourceMap::default()),
        Mark::new(),
        Mark::new(),
      );
      ast.version = "99".into();

      let mut asset = Asset::new("abc", "/module.js");
      match hoist(&mut asset, ast) {
        Err(HoistError::UnsupportedAst { kind, version }) => {
          assert_eq!(kind, "swc");
          assert_eq!(version, "99");
        }
        other => panic!("expected UnsupportedAst, got {:?}", other.map(|_| ())),
      }
    });
  }
}

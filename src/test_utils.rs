use swc_core::common::input::StringInput;
use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, Globals, Mark, SourceMap, GLOBALS};
use swc_core::ecma::ast::Module;
use swc_core::ecma::codegen::text_writer::JsWriter;
use swc_core::ecma::parser::lexer::Lexer;
use swc_core::ecma::parser::{EsSyntax, Parser, Syntax};
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::visit::{VisitMutWith, VisitWith};

use crate::asset::{Asset, Dependency};
use crate::collect::Collect;
use crate::error::HoistError;
use crate::utils::Diagnostic;
use crate::{hoist, Ast, HoistResult};

#[derive(Debug)]
pub(crate) struct HoistRun {
  pub asset: Asset,
  pub code: String,
  pub result: HoistResult,
  #[allow(unused)]
  pub diagnostics: Vec<Diagnostic>,
}

/// Parse `code`, run the resolver, and hand the module plus a context to
/// `run`, all inside one swc globals scope.
fn run_with_module<R>(
  code: &str,
  run: impl FnOnce(Lrc<SourceMap>, Mark, Mark, Module) -> R,
) -> R {
  let source_map = Lrc::new(SourceMap::default());
  let source_file = source_map.new_source_file(Lrc::new(FileName::Anon), code.into());

  let lexer = Lexer::new(
    Syntax::Es(EsSyntax {
      allow_return_outside_function: true,
      ..Default::default()
    }),
    Default::default(),
    StringInput::from(&*source_file),
    None,
  );

  let mut parser = Parser::new_from(lexer);
  let mut module = parser.parse_module().unwrap();

  GLOBALS.set(&Globals::new(), || {
    let global_mark = Mark::new();
    let unresolved_mark = Mark::new();
    module.visit_mut_with(&mut resolver(unresolved_mark, global_mark, false));

    run(source_map.clone(), unresolved_mark, global_mark, module)
  })
}

/// Run only the pre-scan.
pub(crate) fn run_collect(code: &str) -> Collect {
  run_with_module(code, |source_map, unresolved_mark, global_mark, module| {
    let mut collect = Collect::new(source_map, unresolved_mark, global_mark, false);
    module.visit_with(&mut collect);
    collect
  })
}

/// Build a test asset with id "abc" and one pre-registered dependency per
/// specifier. Dependency ids mirror the specifier so generated names stay
/// readable in assertions.
pub(crate) fn test_asset(specifiers: &[&str]) -> Asset {
  let mut asset = Asset::new("abc", "/module.js");
  for specifier in specifiers {
    asset.add_dependency(Dependency::new(*specifier, *specifier));
  }
  asset
}

pub(crate) fn try_run_hoist_asset(code: &str, mut asset: Asset) -> Result<HoistRun, HoistError> {
  run_with_module(code, |source_map, unresolved_mark, global_mark, module| {
    let ast = Ast::new(module, source_map.clone(), unresolved_mark, global_mark);
    let (module, result, diagnostics) = hoist(&mut asset, ast)?;

    let mut buf = vec![];
    {
      let writer = JsWriter::new(source_map.clone(), "\n", &mut buf, None);
      let mut emitter = swc_core::ecma::codegen::Emitter {
        cfg: Default::default(),
        comments: None,
        cm: source_map,
        wr: writer,
      };
      emitter.emit_module(&module).unwrap();
    }

    Ok(HoistRun {
      asset,
      code: String::from_utf8(buf).unwrap(),
      result,
      diagnostics,
    })
  })
}

pub(crate) fn run_hoist_asset(code: &str, asset: Asset) -> HoistRun {
  try_run_hoist_asset(code, asset).unwrap()
}

pub(crate) fn run_hoist(code: &str, specifiers: &[&str]) -> HoistRun {
  run_hoist_asset(code, test_asset(specifiers))
}

/// Like `run_hoist`, but the listed dependencies are dynamic imports.
pub(crate) fn run_hoist_async(code: &str, specifiers: &[&str]) -> HoistRun {
  let mut asset = Asset::new("abc", "/module.js");
  for specifier in specifiers {
    let mut dependency = Dependency::new(*specifier, *specifier);
    dependency.is_async = true;
    asset.add_dependency(dependency);
  }
  run_hoist_asset(code, asset)
}

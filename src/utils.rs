use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use swc_core::common::{Mark, Span};
use swc_core::ecma::ast;
use swc_core::ecma::atoms::Atom;

pub fn is_unresolved(ident: &ast::Ident, unresolved_mark: Mark) -> bool {
  ident.ctxt.outer() == unresolved_mark
}

pub fn match_member_expr(
  expr: &ast::MemberExpr,
  idents: Vec<&str>,
  unresolved_mark: Mark,
) -> bool {
  use ast::{Expr, Lit, MemberProp, Str};

  let mut member = expr;
  let mut idents = idents;
  while idents.len() > 1 {
    let expected = idents.pop().unwrap();
    let prop = match &member.prop {
      MemberProp::Ident(ident) => ident.sym.clone(),
      MemberProp::Computed(computed) => match &*computed.expr {
        Expr::Lit(Lit::Str(Str { value, .. })) => value.clone(),
        _ => return false,
      },
      _ => return false,
    };

    if &*prop != expected {
      return false;
    }

    match &*member.obj {
      Expr::Member(m) => member = m,
      Expr::Ident(ident) => {
        return idents.len() == 1
          && &*ident.sym == idents.pop().unwrap()
          && is_unresolved(ident, unresolved_mark);
      }
      _ => return false,
    }
  }

  false
}

pub fn match_str(node: &ast::Expr) -> Option<(Atom, Span)> {
  use ast::*;

  match node {
    // "string" or 'string'
    Expr::Lit(Lit::Str(s)) => Some((s.value.clone(), s.span)),
    // `string`
    Expr::Tpl(tpl) if tpl.quasis.len() == 1 && tpl.exprs.is_empty() => {
      let quasi = &tpl.quasis[0];
      Some((
        quasi.cooked.clone().unwrap_or_else(|| quasi.raw.clone()),
        tpl.span,
      ))
    }
    _ => None,
  }
}

pub fn match_property_name(node: &ast::MemberExpr) -> Option<(Atom, Span)> {
  match &node.prop {
    ast::MemberProp::Ident(ident) => Some((ident.sym.clone(), ident.span)),
    ast::MemberProp::Computed(computed) => match_str(&computed.expr),
    _ => None,
  }
}

pub fn match_export_name(name: &ast::ModuleExportName) -> (Atom, Span) {
  match name {
    ast::ModuleExportName::Ident(ident) => (ident.sym.clone(), ident.span),
    ast::ModuleExportName::Str(s) => (s.value.clone(), s.span),
  }
}

pub fn match_export_name_ident(name: &ast::ModuleExportName) -> Option<&ast::Ident> {
  match name {
    ast::ModuleExportName::Ident(ident) => Some(ident),
    ast::ModuleExportName::Str(_) => None,
  }
}

fn match_call_arg(call: &ast::CallExpr) -> Option<Atom> {
  if call.args.len() != 1 {
    return None;
  }

  let arg = call.args.first()?;
  if arg.spread.is_some() {
    return None;
  }

  match_str(&arg.expr).map(|(name, _)| name)
}

pub fn match_require(node: &ast::Expr, unresolved_mark: Mark) -> Option<Atom> {
  use ast::*;

  match node {
    Expr::Call(call) => match &call.callee {
      Callee::Expr(expr) => match &**expr {
        Expr::Ident(ident) => {
          if &*ident.sym == "require" && is_unresolved(ident, unresolved_mark) {
            return match_call_arg(call);
          }

          None
        }
        Expr::Member(member) => {
          if match_member_expr(member, vec!["module", "require"], unresolved_mark) {
            return match_call_arg(call);
          }

          None
        }
        _ => None,
      },
      _ => None,
    },
    _ => None,
  }
}

pub fn match_require_resolve(node: &ast::Expr, unresolved_mark: Mark) -> Option<Atom> {
  use ast::*;

  match node {
    Expr::Call(call) => match &call.callee {
      Callee::Expr(expr) => match &**expr {
        Expr::Member(member) => {
          if let Expr::Ident(ident) = &*member.obj {
            if &*ident.sym == "require"
              && is_unresolved(ident, unresolved_mark)
              && matches!(match_property_name(member), Some((name, _)) if &*name == "resolve")
            {
              return match_call_arg(call);
            }
          }

          None
        }
        _ => None,
      },
      _ => None,
    },
    _ => None,
  }
}

pub fn match_import(node: &ast::Expr) -> Option<Atom> {
  use ast::*;

  match node {
    Expr::Call(call) => match &call.callee {
      Callee::Import(_) => match_call_arg(call),
      _ => None,
    },
    _ => None,
  }
}

/// Normalizes an arbitrary string (asset ids, specifiers, export names) into
/// something that can appear inside a generated identifier.
pub fn to_identifier(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  for ch in name.chars() {
    if ch.is_ascii_alphanumeric() || ch == '_' {
      out.push(ch);
    } else {
      out.push('_');
    }
  }

  if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
    out.insert(0, '_');
  }

  out
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct SourceLocation {
  pub start_line: usize,
  pub start_col: usize,
  pub end_line: usize,
  pub end_col: usize,
}

impl SourceLocation {
  pub fn from(source_map: &swc_core::common::SourceMap, span: swc_core::common::Span) -> Self {
    let start = source_map.lookup_char_pos(span.lo);
    let end = source_map.lookup_char_pos(span.hi);
    // - SWC's columns are exclusive, ours are inclusive (column - 1)
    // - SWC has 0-based columns, ours are 1-based (column + 1)
    // = +-0
    SourceLocation {
      start_line: start.line,
      start_col: start.col_display + 1,
      end_line: end.line,
      end_col: end.col_display,
    }
  }
}

impl PartialOrd for SourceLocation {
  fn partial_cmp(&self, other: &SourceLocation) -> Option<Ordering> {
    match self.start_line.cmp(&other.start_line) {
      Ordering::Equal => self.start_col.partial_cmp(&other.start_col),
      o => Some(o),
    }
  }
}

impl fmt::Display for SourceLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.start_line, self.start_col)
  }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CodeHighlight {
  pub message: Option<String>,
  pub loc: SourceLocation,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Diagnostic {
  pub message: String,
  pub code_highlights: Option<Vec<CodeHighlight>>,
  pub hints: Option<Vec<String>>,
  pub show_environment: bool,
  pub severity: DiagnosticSeverity,
  pub documentation_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
pub enum DiagnosticSeverity {
  /// Fails the build with an error.
  Error,
  /// Logs a warning, but the build does not fail.
  Warning,
  /// An error if this is source code in the project, or a warning if in node_modules.
  SourceError,
}

pub struct Bailout {
  pub loc: SourceLocation,
  pub reason: BailoutReason,
}

impl Bailout {
  pub fn to_diagnostic(&self) -> Diagnostic {
    let (message, documentation_url) = self.reason.info();
    Diagnostic {
      message: message.into(),
      documentation_url: Some(documentation_url.into()),
      code_highlights: Some(vec![CodeHighlight {
        loc: self.loc.clone(),
        message: None,
      }]),
      show_environment: false,
      severity: DiagnosticSeverity::Warning,
      hints: None,
    }
  }
}

pub enum BailoutReason {
  NonTopLevelRequire,
  NonStaticDestructuring,
  TopLevelReturn,
  Eval,
  NonStaticExports,
  FreeModule,
  FreeExports,
  ExportsReassignment,
  ModuleReassignment,
  NonStaticDynamicImport,
  NonStaticAccess,
}

impl BailoutReason {
  fn info(&self) -> (&str, &str) {
    match self {
      BailoutReason::NonTopLevelRequire => (
        "Conditional or non-top-level `require()` call. This causes the resolved module and all dependendencies to be wrapped.",
        "https://parceljs.org/features/scope-hoisting/#avoid-conditional-require()"
      ),
      BailoutReason::NonStaticDestructuring => (
        "Non-static destructuring of `require` or dynamic `import()`. This causes all exports of the resolved module to be included.",
        "https://parceljs.org/features/scope-hoisting/#commonjs"
      ),
      BailoutReason::TopLevelReturn => (
        "Module contains a top-level `return` statement. This causes the module to be wrapped in a function and tree shaking to be disabled.",
        "https://parceljs.org/features/scope-hoisting/#avoid-top-level-return"
      ),
      BailoutReason::Eval => (
        "Module contains usage of `eval`. This causes the module to be wrapped in a function and minification to be disabled.",
        "https://parceljs.org/features/scope-hoisting/#avoid-eval"
      ),
      BailoutReason::NonStaticExports => (
        "Non-static access of CommonJS `exports` object. This causes tree shaking to be disabled for the module.",
        "https://parceljs.org/features/scope-hoisting/#commonjs"
      ),
      BailoutReason::FreeModule => (
        "Unknown usage of CommonJS `module` object. This causes the module to be wrapped, and tree shaking to be disabled.",
        "https://parceljs.org/features/scope-hoisting/#commonjs"
      ),
      BailoutReason::FreeExports => (
        "Unknown usage of CommonJS `exports` object. This causes tree shaking to be disabled.",
        "https://parceljs.org/features/scope-hoisting/#commonjs"
      ),
      BailoutReason::ExportsReassignment => (
        "Module contains a reassignment of the CommonJS `exports` object. This causes the `exports` binding to be split from the exports namespace.",
        "https://parceljs.org/features/scope-hoisting/#avoid-module-and-exports-re-assignment"
      ),
      BailoutReason::ModuleReassignment => (
        "Module contains a reassignment of the CommonJS `module` object. This causes the module to be wrapped and tree-shaking to be disabled.",
        "https://parceljs.org/features/scope-hoisting/#avoid-module-and-exports-re-assignment"
      ),
      BailoutReason::NonStaticDynamicImport => (
        "Unknown dynamic import usage. This causes tree shaking to be disabled for the resolved module.",
        "https://parceljs.org/features/scope-hoisting/#dynamic-imports"
      ),
      BailoutReason::NonStaticAccess => (
        "Non-static access of an `import` or `require`. This causes tree shaking to be disabled for the resolved module.",
        "https://parceljs.org/features/scope-hoisting/#dynamic-member-accesses"
      ),
    }
  }
}

#[macro_export]
macro_rules! id {
  ($ident: expr) => {
    ($ident.sym.clone(), $ident.ctxt)
  };
}

use std::collections::HashMap;
use std::collections::HashSet;

use swc_core::common::sync::Lrc;
use swc_core::common::Mark;
use swc_core::common::Span;
use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::visit::noop_visit_type;
use swc_core::ecma::visit::Visit;
use swc_core::ecma::visit::VisitWith;

use crate::id;
use crate::utils::is_unresolved;
use crate::utils::match_export_name;
use crate::utils::match_export_name_ident;
use crate::utils::match_import;
use crate::utils::match_member_expr;
use crate::utils::match_property_name;
use crate::utils::match_require;
use crate::utils::Bailout;
use crate::utils::BailoutReason;
use crate::utils::SourceLocation;

macro_rules! collect_visit_fn {
  ($name:ident, $type:ident) => {
    fn $name(&mut self, node: &$type) {
      let in_module_this = self.in_module_this;
      let in_function = self.in_function;
      self.in_module_this = false;
      self.in_function = true;
      node.visit_children_with(self);
      self.in_module_this = in_module_this;
      self.in_function = in_function;
    }
  };
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ImportKind {
  Require,
  Import,
  DynamicImport,
}

#[derive(Debug)]
pub struct Import {
  pub source: Atom,
  pub specifier: Atom,
  pub kind: ImportKind,
  pub loc: SourceLocation,
}

/// The pre-scan. Classifies the module (ES module, CommonJS, or neither),
/// decides whether it must be wrapped, and records the per-binding facts the
/// rewriter consumes. Runs over the original, untouched tree.
pub struct Collect {
  pub source_map: Lrc<swc_core::common::SourceMap>,
  pub unresolved_mark: Mark,
  pub global_mark: Mark,
  pub is_esm: bool,
  pub is_commonjs: bool,
  pub should_wrap: bool,
  /// False once the exports object escapes static analysis; only the
  /// namespace symbol is tracked from then on.
  pub static_cjs_exports: bool,
  /// `exports = …` was seen somewhere in the module.
  pub exports_reassigned: bool,
  /// local variable binding -> import descriptor
  pub imports: HashMap<Id, Import>,
  /// local variable binding -> primary exported name
  pub exports_locals: HashMap<Id, Atom>,
  /// import bindings that are re-exported via `export {x}`
  pub reexported_imports: HashSet<Id>,
  /// the keys in `imports` that are referenced outside of export specifiers
  pub used_imports: HashSet<Id>,
  pub non_static_access: HashMap<Id, Vec<Span>>,
  pub non_const_bindings: HashMap<Id, Vec<Span>>,
  /// dynamic import sources whose continuation could not be analyzed
  pub non_static_requires: HashSet<Atom>,
  /// sources required where call order is not statically determined
  pub wrapped_requires: HashSet<Atom>,
  pub bailouts: Option<Vec<Bailout>>,
  in_module_this: bool,
  in_top_level: bool,
  in_export_decl: bool,
  in_function: bool,
  in_assign: bool,
}

impl Collect {
  pub fn new(
    source_map: Lrc<swc_core::common::SourceMap>,
    unresolved_mark: Mark,
    global_mark: Mark,
    trace_bailouts: bool,
  ) -> Self {
    Collect {
      source_map,
      unresolved_mark,
      global_mark,
      is_esm: false,
      is_commonjs: false,
      should_wrap: false,
      static_cjs_exports: true,
      exports_reassigned: false,
      imports: HashMap::new(),
      exports_locals: HashMap::new(),
      reexported_imports: HashSet::new(),
      used_imports: HashSet::new(),
      non_static_access: HashMap::new(),
      non_const_bindings: HashMap::new(),
      non_static_requires: HashSet::new(),
      wrapped_requires: HashSet::new(),
      in_module_this: true,
      in_top_level: true,
      in_export_decl: false,
      in_function: false,
      in_assign: false,
      bailouts: if trace_bailouts { Some(vec![]) } else { None },
    }
  }
}

impl Visit for Collect {
  noop_visit_type!();

  fn visit_module(&mut self, node: &Module) {
    self.in_module_this = true;
    self.in_top_level = true;
    self.in_function = false;
    // Visit all imports first so that all imports are known when collecting
    // used_imports and re-exports, regardless of declaration order.
    for n in &node.body {
      if matches!(n, ModuleItem::ModuleDecl(ModuleDecl::Import(..))) {
        n.visit_with(self);
      }
    }
    for n in &node.body {
      if n.is_module_decl() && !matches!(n, ModuleItem::ModuleDecl(ModuleDecl::Import(..))) {
        n.visit_with(self);
      }
    }
    for n in &node.body {
      if !n.is_module_decl() {
        n.visit_with(self);
      }
    }
    self.in_module_this = false;

    if let Some(bailouts) = &mut self.bailouts {
      for (key, Import { specifier, .. }) in &self.imports {
        if specifier == "*" {
          if let Some(spans) = self.non_static_access.get(key) {
            for span in spans {
              bailouts.push(Bailout {
                loc: SourceLocation::from(&self.source_map, *span),
                reason: BailoutReason::NonStaticAccess,
              })
            }
          }
        }
      }

      bailouts.sort_by(|a, b| a.loc.partial_cmp(&b.loc).unwrap());
    }
  }

  collect_visit_fn!(visit_function, Function);
  collect_visit_fn!(visit_class, Class);
  collect_visit_fn!(visit_getter_prop, GetterProp);
  collect_visit_fn!(visit_setter_prop, SetterProp);

  fn visit_arrow_expr(&mut self, node: &ArrowExpr) {
    let in_function = self.in_function;
    self.in_function = true;
    node.visit_children_with(self);
    self.in_function = in_function;
  }

  fn visit_module_item(&mut self, node: &ModuleItem) {
    match node {
      ModuleItem::ModuleDecl(_decl) => {
        self.is_esm = true;
      }
      ModuleItem::Stmt(stmt) => {
        match stmt {
          Stmt::Decl(decl) => {
            if let Decl::Var(_var) = decl {
              decl.visit_children_with(self);
              return;
            }
          }
          Stmt::Expr(expr) => {
            // Top-level require(). Do not traverse further so it is not marked as wrapped.
            if self.match_require(&expr.expr).is_some() {
              return;
            }
          }
          _ => {}
        }
      }
    }

    self.in_top_level = false;
    node.visit_children_with(self);
    self.in_top_level = true;
  }

  fn visit_import_decl(&mut self, node: &ImportDecl) {
    for specifier in &node.specifiers {
      match specifier {
        ImportSpecifier::Named(named) => {
          let imported = match &named.imported {
            Some(imported) => match_export_name(imported).0,
            None => named.local.sym.clone(),
          };
          self.imports.insert(
            id!(named.local),
            Import {
              source: node.src.value.clone(),
              specifier: imported,
              kind: ImportKind::Import,
              loc: SourceLocation::from(&self.source_map, named.span),
            },
          );
        }
        ImportSpecifier::Default(default) => {
          self.imports.insert(
            id!(default.local),
            Import {
              source: node.src.value.clone(),
              specifier: "default".into(),
              kind: ImportKind::Import,
              loc: SourceLocation::from(&self.source_map, default.span),
            },
          );
        }
        ImportSpecifier::Namespace(namespace) => {
          self.imports.insert(
            id!(namespace.local),
            Import {
              source: node.src.value.clone(),
              specifier: "*".into(),
              kind: ImportKind::Import,
              loc: SourceLocation::from(&self.source_map, namespace.span),
            },
          );
        }
      }
    }
  }

  fn visit_named_export(&mut self, node: &NamedExport) {
    if node.src.is_some() {
      return;
    }

    for specifier in &node.specifiers {
      if let ExportSpecifier::Named(named) = specifier {
        let Some(orig) = match_export_name_ident(&named.orig) else {
          continue;
        };
        let exported = match &named.exported {
          Some(exported) => match_export_name(exported).0,
          None => orig.sym.clone(),
        };
        if self.imports.contains_key(&id!(orig)) {
          self.reexported_imports.insert(id!(orig));
        } else {
          self
            .exports_locals
            .entry(id!(orig))
            .or_insert_with(|| exported.clone());
        }
      }
    }
  }

  fn visit_export_decl(&mut self, node: &ExportDecl) {
    match &node.decl {
      Decl::Class(class) => {
        self
          .exports_locals
          .entry(id!(class.ident))
          .or_insert_with(|| class.ident.sym.clone());
      }
      Decl::Fn(func) => {
        self
          .exports_locals
          .entry(id!(func.ident))
          .or_insert_with(|| func.ident.sym.clone());
      }
      Decl::Var(var) => {
        for decl in &var.decls {
          self.in_export_decl = true;
          decl.name.visit_with(self);
          self.in_export_decl = false;

          decl.init.visit_with(self);
        }
      }
      _ => {}
    }

    node.visit_children_with(self);
  }

  fn visit_export_default_decl(&mut self, node: &ExportDefaultDecl) {
    match &node.decl {
      DefaultDecl::Class(class) => {
        if let Some(ident) = &class.ident {
          self
            .exports_locals
            .entry(id!(ident))
            .or_insert_with(|| "default".into());
        }
      }
      DefaultDecl::Fn(func) => {
        if let Some(ident) = &func.ident {
          self
            .exports_locals
            .entry(id!(ident))
            .or_insert_with(|| "default".into());
        }
      }
      _ => {}
    }

    node.visit_children_with(self);
  }

  fn visit_export_default_expr(&mut self, node: &ExportDefaultExpr) {
    // `export default foo;` renames the `foo` binding itself instead of
    // introducing a fresh variable.
    if let Expr::Ident(ident) = &*node.expr {
      if !is_unresolved(ident, self.unresolved_mark) && !self.imports.contains_key(&id!(ident)) {
        self
          .exports_locals
          .entry(id!(ident))
          .or_insert_with(|| "default".into());
        return;
      }
    }

    node.visit_children_with(self);
  }

  fn visit_return_stmt(&mut self, node: &ReturnStmt) {
    if !self.in_function {
      self.is_commonjs = true;
      self.should_wrap = true;
      self.add_bailout(node.span, BailoutReason::TopLevelReturn);
    }

    node.visit_children_with(self)
  }

  fn visit_binding_ident(&mut self, node: &BindingIdent) {
    if self.in_export_decl {
      self
        .exports_locals
        .entry(id!(node.id))
        .or_insert_with(|| node.id.sym.clone());
    }

    if self.in_assign && node.id.ctxt.has_mark(self.global_mark) {
      self
        .non_const_bindings
        .entry(id!(node.id))
        .or_default()
        .push(node.id.span);
    }
  }

  fn visit_assign_pat_prop(&mut self, node: &AssignPatProp) {
    if self.in_export_decl {
      self
        .exports_locals
        .entry(id!(node.key))
        .or_insert_with(|| node.key.sym.clone());
    }

    if self.in_assign && node.key.ctxt.has_mark(self.global_mark) {
      self
        .non_const_bindings
        .entry(id!(node.key))
        .or_default()
        .push(node.key.span);
    }

    node.value.visit_with(self);
  }

  fn visit_member_expr(&mut self, node: &MemberExpr) {
    // `module.exports` on its own is a safe shape; so is any statically
    // indexed access on `exports`/`module.exports`. Everything else gives up
    // export tracking, and a non-static use of `module` forces a wrap.
    if match_member_expr(node, vec!["module", "exports"], self.unresolved_mark) {
      self.is_commonjs = true;
      return;
    }

    let is_static = match_property_name(node).is_some();

    match &*node.obj {
      Expr::Member(member) => {
        if match_member_expr(member, vec!["module", "exports"], self.unresolved_mark) {
          self.is_commonjs = true;
          if !is_static {
            self.static_cjs_exports = false;
            self.add_bailout(node.span, BailoutReason::NonStaticExports);
          }
          self.visit_computed_prop(node);
          return;
        }

        member.visit_with(self);
        self.visit_computed_prop(node);
        return;
      }
      Expr::Ident(ident) => {
        if &*ident.sym == "exports" && is_unresolved(ident, self.unresolved_mark) {
          self.is_commonjs = true;
          if !is_static {
            self.static_cjs_exports = false;
            self.add_bailout(node.span, BailoutReason::NonStaticExports);
          }
          self.visit_computed_prop(node);
          return;
        }

        if &*ident.sym == "module" && is_unresolved(ident, self.unresolved_mark) {
          self.is_commonjs = true;
          if !is_static {
            self.should_wrap = true;
            self.add_bailout(node.span, BailoutReason::FreeModule);
          }
          self.visit_computed_prop(node);
          return;
        }

        if !is_static {
          self
            .non_static_access
            .entry(id!(ident))
            .or_default()
            .push(node.span);
        } else if self.imports.contains_key(&id!(ident)) {
          self.used_imports.insert(id!(ident));
        }

        self.visit_computed_prop(node);
        return;
      }
      Expr::This(_) => {
        self.visit_computed_prop(node);
        return;
      }
      _ => {}
    }

    node.visit_children_with(self);
  }

  fn visit_unary_expr(&mut self, node: &UnaryExpr) {
    if node.op == UnaryOp::TypeOf {
      match &*node.arg {
        Expr::Ident(ident)
          if &*ident.sym == "module" && is_unresolved(ident, self.unresolved_mark) =>
        {
          // Do nothing to avoid the ident visitor from marking the module as non-static.
        }
        _ => node.visit_children_with(self),
      }
    } else {
      node.visit_children_with(self);
    }
  }

  fn visit_expr(&mut self, node: &Expr) {
    // If we reached this visitor, this is a non-top-level require that isn't in a variable
    // declaration. The referenced module must be wrapped to preserve side effect ordering.
    if let Some(source) = self.match_require(node) {
      self.wrapped_requires.insert(source);
      let span = match node {
        Expr::Call(c) => c.span,
        _ => unreachable!(),
      };
      self.add_bailout(span, BailoutReason::NonTopLevelRequire);
    }

    if let Some(source) = match_import(node) {
      self.non_static_requires.insert(source);
      let span = match node {
        Expr::Call(c) => c.span,
        _ => unreachable!(),
      };
      self.add_bailout(span, BailoutReason::NonStaticDynamicImport);
    }

    match node {
      Expr::Ident(ident) => {
        // Bail if `module` or `exports` are used as bare values.
        let is_module = &*ident.sym == "module";
        let is_exports = &*ident.sym == "exports";
        if (is_module || is_exports) && is_unresolved(ident, self.unresolved_mark) {
          self.is_commonjs = true;
          if is_module {
            self.should_wrap = true;
            self.add_bailout(ident.span, BailoutReason::FreeModule);
          } else {
            self.static_cjs_exports = false;
            self.add_bailout(ident.span, BailoutReason::FreeExports);
          }
        }

        self
          .non_static_access
          .entry(id!(ident))
          .or_default()
          .push(ident.span);

        if self.imports.contains_key(&id!(ident)) {
          self.used_imports.insert(id!(ident));
        }
      }
      _ => {
        node.visit_children_with(self);
      }
    }
  }

  fn visit_ident(&mut self, node: &Ident) {
    // Catches shorthand object properties referencing an import:
    //
    //   import { foo } from "bar";
    //   const baz = { foo };
    if self.imports.contains_key(&id!(node)) {
      self.used_imports.insert(id!(node));
    }
  }

  fn visit_assign_expr(&mut self, node: &AssignExpr) {
    // `module.exports = …` is a safe shape on its own.
    if let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &node.left {
      if match_member_expr(member, vec!["module", "exports"], self.unresolved_mark) {
        self.is_commonjs = true;
        node.right.visit_with(self);
        return;
      }
    }

    self.in_assign = true;
    node.left.visit_with(self);
    self.in_assign = false;
    node.right.visit_with(self);

    if has_binding_identifier(&node.left, "exports", self.unresolved_mark) {
      // The local `exports` binding is being replaced. Later references no
      // longer alias the exports namespace, so the two get distinct
      // identifiers in the rewrite.
      self.is_commonjs = true;
      self.exports_reassigned = true;
      self.add_bailout(node.span, BailoutReason::ExportsReassignment);
    } else if has_binding_identifier(&node.left, "module", self.unresolved_mark) {
      // If `module` is reassigned we can't correctly statically analyze.
      self.is_commonjs = true;
      self.should_wrap = true;
      self.add_bailout(node.span, BailoutReason::ModuleReassignment);
    }
  }

  fn visit_var_declarator(&mut self, node: &VarDeclarator) {
    if let Some(init) = &node.init {
      if let Some(source) = self.match_require(init) {
        // Only a whole-namespace binding gets an import record; destructured
        // requires keep reading members off the namespace object at runtime.
        if let Pat::Ident(ident) = &node.name {
          self.imports.insert(
            id!(ident.id),
            Import {
              source: source.clone(),
              specifier: "*".into(),
              kind: ImportKind::Require,
              loc: SourceLocation::from(&self.source_map, ident.id.span),
            },
          );
        }

        if !self.in_top_level {
          self.wrapped_requires.insert(source);
          self.add_bailout(node.span, BailoutReason::NonTopLevelRequire);
        }
        return;
      }

      match &**init {
        Expr::Member(member) => {
          // var x = require('y').z; — the member read stays inline.
          if let Some(source) = self.match_require(&member.obj) {
            if !self.in_top_level {
              self.wrapped_requires.insert(source);
              self.add_bailout(node.span, BailoutReason::NonTopLevelRequire);
            }
            return;
          }
        }
        Expr::Await(await_exp) => {
          // let x = await import('foo');
          // let {x} = await import('foo');
          if let Some(source) = match_import(&await_exp.arg) {
            self.add_pat_imports(&node.name, &source, ImportKind::DynamicImport);
            return;
          }
        }
        _ => {}
      }
    }

    // This is visited via visit_module_item with is_top_level == true, it needs to be
    // set to false for called visitors (and restored again).
    let in_top_level = self.in_top_level;
    self.in_top_level = false;
    node.visit_children_with(self);
    self.in_top_level = in_top_level;
  }

  fn visit_call_expr(&mut self, node: &CallExpr) {
    if let Callee::Expr(expr) = &node.callee {
      match &**expr {
        Expr::Ident(ident) => {
          if &*ident.sym == "eval" && is_unresolved(ident, self.unresolved_mark) {
            self.is_commonjs = true;
            self.should_wrap = true;
            self.add_bailout(node.span, BailoutReason::Eval);
          }
        }
        Expr::Member(member) => {
          // import('foo').then(foo => ...);
          if let Some(source) = match_import(&member.obj) {
            if match_property_name(member).map_or(false, |f| &*f.0 == "then") {
              if let Some(ExprOrSpread { expr, .. }) = node.args.first() {
                let param = match &**expr {
                  Expr::Fn(func) => func.function.params.first().map(|param| &param.pat),
                  Expr::Arrow(arrow) => arrow.params.first(),
                  _ => None,
                };

                if let Some(param) = param {
                  self.add_pat_imports(param, &source, ImportKind::DynamicImport);
                } else {
                  self.non_static_requires.insert(source);
                  self.add_bailout(node.span, BailoutReason::NonStaticDynamicImport);
                }

                expr.visit_with(self);
                return;
              }
            }
          }
        }
        _ => {}
      }
    }

    node.visit_children_with(self);
  }
}

impl Collect {
  pub fn match_require(&self, node: &Expr) -> Option<Atom> {
    match_require(node, self.unresolved_mark)
  }

  fn visit_computed_prop(&mut self, node: &MemberExpr) {
    if let MemberProp::Computed(computed) = &node.prop {
      computed.visit_with(self);
    }
  }

  fn add_pat_imports(&mut self, node: &Pat, src: &Atom, kind: ImportKind) {
    match node {
      Pat::Ident(ident) => {
        // let x = await import('y');
        // Member accesses of `x` decide whether single symbols suffice.
        self.imports.insert(
          id!(ident.id),
          Import {
            source: src.clone(),
            specifier: "*".into(),
            kind,
            loc: SourceLocation::from(&self.source_map, ident.id.span),
          },
        );
      }
      Pat::Object(object) => {
        for prop in &object.props {
          match prop {
            ObjectPatProp::KeyValue(kv) => {
              let imported = match &kv.key {
                PropName::Ident(ident) => ident.sym.clone(),
                PropName::Str(str) => str.value.clone(),
                _ => {
                  // Non-static. E.g. computed property.
                  self.non_static_requires.insert(src.clone());
                  self.add_bailout(object.span, BailoutReason::NonStaticDestructuring);
                  continue;
                }
              };

              match &*kv.value {
                Pat::Ident(ident) => {
                  // let {x: y} = await import('y');
                  // `x` becomes a used symbol of the dependency.
                  self.imports.insert(
                    id!(ident.id),
                    Import {
                      source: src.clone(),
                      specifier: imported,
                      kind,
                      loc: SourceLocation::from(&self.source_map, ident.id.span),
                    },
                  );
                }
                _ => {
                  // Non-static.
                  self.non_static_requires.insert(src.clone());
                  self.add_bailout(object.span, BailoutReason::NonStaticDestructuring);
                }
              }
            }
            ObjectPatProp::Assign(assign) => {
              // let {x} = await import('y');
              // let {x = 2} = await import('y');
              self.imports.insert(
                id!(assign.key),
                Import {
                  source: src.clone(),
                  specifier: assign.key.sym.clone(),
                  kind,
                  loc: SourceLocation::from(&self.source_map, assign.key.span),
                },
              );
            }
            ObjectPatProp::Rest(_rest) => {
              // let {x, ...y} = await import('y');
              // Non-static. We don't know what keys are used.
              self.non_static_requires.insert(src.clone());
              self.add_bailout(object.span, BailoutReason::NonStaticDestructuring);
            }
          }
        }
      }
      _ => {
        // Non-static.
        self.non_static_requires.insert(src.clone());
        let span = match node {
          Pat::Ident(id) => id.id.span,
          Pat::Array(arr) => arr.span,
          Pat::Object(obj) => obj.span,
          Pat::Rest(rest) => rest.span,
          Pat::Assign(assign) => assign.span,
          Pat::Invalid(i) => i.span,
          Pat::Expr(_) => swc_core::common::DUMMY_SP,
        };
        self.add_bailout(span, BailoutReason::NonStaticDestructuring);
      }
    }
  }

  fn add_bailout(&mut self, span: Span, reason: BailoutReason) {
    if let Some(bailouts) = &mut self.bailouts {
      bailouts.push(Bailout {
        loc: SourceLocation::from(&self.source_map, span),
        reason,
      })
    }
  }
}

fn has_binding_identifier(node: &AssignTarget, sym: &str, unresolved_mark: Mark) -> bool {
  struct BindingIdentFinder<'a> {
    sym: &'a str,
    unresolved_mark: Mark,
    found: bool,
  }

  impl Visit for BindingIdentFinder<'_> {
    noop_visit_type!();

    fn visit_binding_ident(&mut self, ident: &BindingIdent) {
      if &*ident.id.sym == self.sym && is_unresolved(ident, self.unresolved_mark) {
        self.found = true;
      }
    }
  }

  let mut visitor = BindingIdentFinder {
    sym,
    unresolved_mark,
    found: false,
  };
  node.visit_with(&mut visitor);
  visitor.found
}

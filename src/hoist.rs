use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use swc_core::common::{Mark, Span, SyntaxContext, DUMMY_SP};
use swc_core::ecma::ast::*;
use swc_core::ecma::atoms::Atom;
use swc_core::ecma::visit::{noop_fold_type, Fold, FoldWith};

use crate::asset::{Asset, Symbol};
use crate::collect::{Collect, Import, ImportKind};
use crate::error::HoistError;
use crate::id;
use crate::utils::{
  is_unresolved, match_import, match_member_expr, match_property_name, match_require,
  match_require_resolve, to_identifier, CodeHighlight, Diagnostic, DiagnosticSeverity,
  SourceLocation,
};

/// Summary of one hoisting run. The interesting mutations happen on the
/// asset itself; this carries the classification bits and the outputs that
/// concern other modules.
#[derive(Debug, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct HoistResult {
  /// Exported names this module reads back through its own exports object.
  pub self_references: HashSet<Atom>,
  /// Sources required where call order is not statically determined. The
  /// *imported* modules must be wrapped, not this one.
  pub wrapped_requires: HashSet<Atom>,
  pub static_cjs_exports: bool,
  pub is_commonjs: bool,
  pub is_esm: bool,
  pub should_wrap: bool,
}

macro_rules! hoist_visit_fn {
  ($name:ident, $type:ident) => {
    fn $name(&mut self, node: $type) -> $type {
      let in_function_scope = self.in_function_scope;
      self.in_function_scope = true;
      let res = node.fold_children_with(self);
      self.in_function_scope = in_function_scope;
      res
    }
  };
}

pub struct Hoist<'a> {
  module_id: &'a str,
  asset: &'a mut Asset,
  collect: &'a Collect,
  unresolved_mark: Mark,
  module_items: Vec<ModuleItem>,
  hoisted_imports: Vec<ModuleItem>,
  export_decls: HashSet<Atom>,
  self_references: HashSet<Atom>,
  uses_exports: bool,
  cjs_exports_reassigned: bool,
  cjs_exports_declared: bool,
  in_function_scope: bool,
  errors: Vec<HoistError>,
  diagnostics: Vec<Diagnostic>,
}

impl<'a> Hoist<'a> {
  pub fn new(
    module_id: &'a str,
    asset: &'a mut Asset,
    collect: &'a Collect,
    unresolved_mark: Mark,
  ) -> Self {
    Hoist {
      module_id,
      asset,
      collect,
      unresolved_mark,
      module_items: vec![],
      hoisted_imports: vec![],
      export_decls: HashSet::new(),
      self_references: HashSet::new(),
      uses_exports: false,
      cjs_exports_reassigned: false,
      cjs_exports_declared: false,
      in_function_scope: false,
      errors: vec![],
      diagnostics: vec![],
    }
  }

  pub fn into_parts(self) -> (HoistResult, Vec<Diagnostic>, Vec<HoistError>) {
    (
      HoistResult {
        self_references: self.self_references,
        wrapped_requires: self.collect.wrapped_requires.clone(),
        static_cjs_exports: self.collect.static_cjs_exports,
        is_commonjs: self.collect.is_commonjs,
        is_esm: self.collect.is_esm,
        should_wrap: self.collect.should_wrap,
      },
      self.diagnostics,
      self.errors,
    )
  }
}

impl Fold for Hoist<'_> {
  noop_fold_type!();

  fn fold_module(&mut self, node: Module) -> Module {
    let mut node = node;
    for item in node.body {
      match item {
        ModuleItem::ModuleDecl(decl) => match decl {
          ModuleDecl::Import(import) => self.handle_import_decl(import),
          ModuleDecl::ExportNamed(export) => self.handle_named_export(export),
          ModuleDecl::ExportAll(export) => self.handle_export_all(export),
          ModuleDecl::ExportDefaultExpr(export) => self.handle_export_default_expr(export),
          ModuleDecl::ExportDefaultDecl(export) => self.handle_export_default_decl(export),
          ModuleDecl::ExportDecl(export) => self.handle_export_decl(export),
          item => {
            let d = item.fold_with(self);
            self.module_items.push(ModuleItem::ModuleDecl(d))
          }
        },
        ModuleItem::Stmt(stmt) => {
          if let Stmt::Expr(expr_stmt) = &stmt {
            // Modules get concatenated; a strict directive must not leak
            // across module boundaries.
            if let Expr::Lit(Lit::Str(str_)) = &*expr_stmt.expr {
              if &*str_.value == "use strict" {
                continue;
              }
            }
          }

          match stmt {
            Stmt::Expr(ExprStmt { expr, span }) => {
              if let Some(source) = match_require(&expr, self.unresolved_mark) {
                // Require in statement position (`require('other');`) behaves
                // like `import 'other';` in that it adds no symbols, not even '*'.
                if self.asset.dependency(&source).is_some() {
                  if !self.dependency_is_async(&source) {
                    self.asset.meta.is_common_js = true;
                  }
                  let call = self.placeholder_require_call("$parcel$require", &source, span);
                  let item = ModuleItem::Stmt(Stmt::Expr(ExprStmt {
                    span,
                    expr: Box::new(call),
                  }));
                  if self.collect.should_wrap {
                    // Side-effect requires run above the wrapper, like
                    // hoisted imports.
                    self.hoisted_imports.push(item);
                  } else {
                    self.module_items.push(item);
                  }
                } else {
                  // Unknown dependency: leave the call alone.
                  self
                    .module_items
                    .push(ModuleItem::Stmt(Stmt::Expr(ExprStmt { span, expr })));
                }
                continue;
              }

              let expr = match *expr {
                Expr::Assign(assign) => match self.try_fold_static_export_stmt(assign) {
                  Ok(()) => continue,
                  Err(assign) => Expr::Assign(assign),
                },
                other => other,
              };

              let d = expr.fold_with(self);
              self.module_items.push(ModuleItem::Stmt(Stmt::Expr(ExprStmt {
                span,
                expr: Box::new(d),
              })))
            }
            item => {
              let d = item.fold_with(self);
              self.module_items.push(ModuleItem::Stmt(d))
            }
          }
        }
      }
    }

    if self.collect.should_wrap {
      let wrapper = self.wrap_module_body();
      let mut body = std::mem::take(&mut self.hoisted_imports);
      body.push(wrapper);
      node.body = body;
    } else {
      let mut body = Vec::with_capacity(self.module_items.len() + self.hoisted_imports.len() + 2);
      if self.uses_exports {
        let name = self.exports_name();
        body.push(var_decl_item(
          Ident::new_no_ctxt(name, DUMMY_SP),
          Some(Box::new(Expr::Object(ObjectLit {
            span: DUMMY_SP,
            props: vec![],
          }))),
        ));
      }
      if self.cjs_exports_declared {
        let name = self.cjs_exports_name();
        body.push(var_decl_item(Ident::new_no_ctxt(name, DUMMY_SP), None));
      }
      body.append(&mut self.hoisted_imports);
      body.append(&mut self.module_items);
      node.body = body;
    }

    node
  }

  hoist_visit_fn!(fold_function, Function);
  hoist_visit_fn!(fold_class, Class);
  hoist_visit_fn!(fold_getter_prop, GetterProp);
  hoist_visit_fn!(fold_setter_prop, SetterProp);

  fn fold_expr(&mut self, node: Expr) -> Expr {
    match node {
      Expr::OptChain(opt) => {
        return Expr::OptChain(OptChainExpr {
          span: opt.span,
          optional: opt.optional,
          base: Box::new(match *opt.base {
            OptChainBase::Call(call) => OptChainBase::Call(call.fold_with(self)),
            OptChainBase::Member(member) => {
              if match_property_name(&member).is_some() {
                OptChainBase::Member(MemberExpr {
                  span: member.span,
                  obj: member.obj.fold_with(self),
                  // Don't visit member.prop so we avoid the ident visitor.
                  prop: member.prop,
                })
              } else {
                OptChainBase::Member(member.fold_children_with(self))
              }
            }
          }),
        });
      }
      Expr::Member(member) => {
        if !self.collect.should_wrap {
          if match_member_expr(&member, vec!["module", "exports"], self.unresolved_mark) {
            self.self_references.insert("*".into());
            let ident = self.get_export_ident(member.span, &"*".into());
            self.record_export_symbol(&"*".into(), &ident.sym.clone(), member.span);
            return Expr::Ident(ident);
          }

          if match_member_expr(&member, vec!["module", "id"], self.unresolved_mark) {
            return Expr::Lit(Lit::Str(Str {
              span: member.span,
              value: self.asset.id.clone().into(),
              raw: None,
            }));
          }

          if match_member_expr(&member, vec!["module", "hot"], self.unresolved_mark) {
            return Expr::Lit(Lit::Null(Null { span: member.span }));
          }

          if match_member_expr(
            &member,
            vec!["module", "bundle", "root"],
            self.unresolved_mark,
          ) || match_member_expr(&member, vec!["module", "bundle"], self.unresolved_mark)
          {
            return Expr::Ident(Ident::new_no_ctxt("parcelRequire".into(), member.span));
          }

          if match_member_expr(&member, vec!["module", "require"], self.unresolved_mark)
            && !self.asset.env.is_node()
          {
            return Expr::Lit(Lit::Null(Null { span: member.span }));
          }
        }

        let key = match match_property_name(&member) {
          Some(v) => v.0,
          _ => return Expr::Member(member.fold_children_with(self)),
        };

        let collect = self.collect;
        match &*member.obj {
          Expr::Ident(ident) => {
            // import * as y from 'x'; OR let y = await import('x');
            // y.foo -> $id$import$x$foo
            if let Some(Import {
              source,
              specifier,
              kind,
              ..
            }) = collect.imports.get(&id!(ident))
            {
              if specifier == "*"
                && !collect.non_static_access.contains_key(&id!(ident))
                && !collect.non_static_requires.contains(source)
              {
                match kind {
                  ImportKind::Import => {
                    if let Some(dep_id) = self.dependency_id(source) {
                      let name = self.import_name(&dep_id, &key);
                      self.record_dependency_symbol(
                        source,
                        &key,
                        &name,
                        Some(self.loc(member.span)),
                        false,
                      );
                      return Expr::Ident(Ident::new_no_ctxt(name, member.span));
                    }
                  }
                  ImportKind::DynamicImport => {
                    if let Some(dep_id) = self.dependency_id(source) {
                      let name = self.import_async_name(&dep_id, &key);
                      self.record_dependency_symbol(
                        source,
                        &key,
                        &name,
                        Some(self.loc(member.span)),
                        false,
                      );
                      return Expr::Ident(Ident::new_no_ctxt(name, member.span));
                    }
                  }
                  // Member reads stay on the renamed namespace binding.
                  ImportKind::Require => {}
                }
              }
            }

            // exports.foo -> $id$export$foo
            if &*ident.sym == "exports"
              && is_unresolved(ident, self.unresolved_mark)
              && collect.static_cjs_exports
              && !collect.should_wrap
            {
              self.self_references.insert(key.clone());
              return Expr::Ident(self.get_export_ident(member.span, &key));
            }
          }
          Expr::Member(mem) => {
            // module.exports.foo -> $id$export$foo
            if collect.static_cjs_exports
              && !collect.should_wrap
              && match_member_expr(mem, vec!["module", "exports"], self.unresolved_mark)
            {
              self.self_references.insert(key.clone());
              return Expr::Ident(self.get_export_ident(member.span, &key));
            }
          }
          _ => {}
        }

        // Don't visit member.prop so we avoid the ident visitor.
        return Expr::Member(MemberExpr {
          span: member.span,
          obj: member.obj.fold_with(self),
          prop: member.prop,
        });
      }
      Expr::Call(ref call) => {
        // require('foo') -> $parcel$require("<asset id>", "foo")
        if let Some(source) = match_require(&node, self.unresolved_mark) {
          if self.asset.dependency(&source).is_some() {
            let span = call.span;
            return self.fold_require_call(source, span);
          }
          // Unknown dependency: leave the call alone.
          return node;
        }

        if let Some(source) = match_require_resolve(&node, self.unresolved_mark) {
          if self.asset.dependency(&source).is_some() {
            let span = call.span;
            return self.placeholder_require_call("$parcel$require$resolve", &source, span);
          }
          return node;
        }

        // import('foo') -> $parcel$require("<asset id>", "foo")
        if let Some(source) = match_import(&node) {
          if self.asset.dependency(&source).is_some() {
            let span = call.span;
            if self.collect.non_static_requires.contains(&source) || self.collect.should_wrap {
              // The continuation could not be analyzed (or the body is about
              // to be wrapped); the whole namespace is the symbol.
              let name = self.require_name(&source);
              let loc = self.loc(span);
              if let Some(dependency) = self.asset.dependency_mut(&source) {
                dependency.meta.is_common_js = true;
                dependency.symbols.insert_if_absent("*", Symbol::new(name, Some(loc)));
              }
            }
            return self.placeholder_require_call("$parcel$require", &source, span);
          }
          return node;
        }
      }
      Expr::This(this) => {
        // Inside the wrapper, `this` already is the synthesized exports object.
        if !self.in_function_scope && !self.collect.should_wrap {
          // If ESM, replace `this` with `undefined`, otherwise with the CJS exports object.
          if self.collect.is_esm {
            return Expr::Ident(self.undefined_ident(this.span));
          }
          self.self_references.insert("*".into());
          return Expr::Ident(self.get_export_ident(this.span, &"*".into()));
        }
      }
      Expr::Unary(ref unary) => {
        // typeof require -> "function"
        // typeof module -> "object"
        if unary.op == UnaryOp::TypeOf {
          if let Expr::Ident(ident) = &*unary.arg {
            if &*ident.sym == "require" && is_unresolved(ident, self.unresolved_mark) {
              return Expr::Lit(Lit::Str(Str {
                span: unary.span,
                value: "function".into(),
                raw: None,
              }));
            }

            if &*ident.sym == "module" && is_unresolved(ident, self.unresolved_mark) {
              return Expr::Lit(Lit::Str(Str {
                span: unary.span,
                value: "object".into(),
                raw: None,
              }));
            }
          }
        }
      }
      _ => {}
    }

    node.fold_children_with(self)
  }

  fn fold_ident(&mut self, node: Ident) -> Ident {
    let collect = self.collect;

    // import {x} from 'y'; x -> $id$import$y$x
    // import * as x from 'y'; x -> $id$import$y
    // const x = require('y'); x -> $id$require$y
    if let Some(Import {
      source,
      specifier,
      kind,
      loc,
    }) = collect.imports.get(&id!(node))
    {
      match kind {
        ImportKind::Import => {
          if let Some(dep_id) = self.dependency_id(source) {
            let name = self.import_name(&dep_id, specifier);
            if specifier == "*" {
              self.record_dependency_symbol(source, &"*".into(), &name, Some(loc.clone()), false);
            }
            return Ident::new_no_ctxt(name, node.span);
          }
        }
        ImportKind::Require => {
          if self.asset.dependency(source).is_some() {
            let name = self.require_name(source);
            self.record_dependency_symbol(source, &"*".into(), &name, Some(loc.clone()), false);
            return Ident::new_no_ctxt(name, node.span);
          }
        }
        ImportKind::DynamicImport => {
          // The binding keeps a plain local name; the awaited namespace
          // object is live at runtime. The placeholder only feeds the
          // dependency's symbol table.
          if self.asset.dependency(source).is_some()
            && !collect.non_static_requires.contains(source)
            && specifier != "*"
          {
            if let Some(dep_id) = self.dependency_id(source) {
              let name = self.import_async_name(&dep_id, specifier);
              self.record_dependency_symbol(source, specifier, &name, Some(loc.clone()), false);
            }
          }
        }
      }
    }

    if let Some(exported) = collect.exports_locals.get(&id!(node)) {
      // If wrapped, mark the original symbol as exported.
      // Otherwise replace with an export identifier.
      if collect.should_wrap {
        self.record_export_symbol(exported, &node.sym.clone(), node.span);
        return node;
      }

      let ident = self.get_export_ident(node.span, exported);
      self.record_export_symbol(exported, &ident.sym.clone(), node.span);
      return ident;
    }

    if collect.should_wrap {
      return node;
    }

    if &*node.sym == "exports" && is_unresolved(&node, self.unresolved_mark) {
      self.self_references.insert("*".into());
      return self.get_cjs_exports_ident(node.span);
    }

    if &*node.sym == "global" && is_unresolved(&node, self.unresolved_mark) {
      return Ident::new("$parcel$global".into(), node.span, node.ctxt);
    }

    if node.ctxt.has_mark(collect.global_mark) && !is_unresolved(&node, self.unresolved_mark) {
      let new_name: Atom = self.var_name(&node.sym);
      return Ident::new(new_name, node.span, node.ctxt);
    }

    node
  }

  fn fold_assign_expr(&mut self, node: AssignExpr) -> AssignExpr {
    if self.collect.should_wrap {
      return node.fold_children_with(self);
    }

    if let AssignTarget::Simple(SimpleAssignTarget::Ident(ident)) = &node.left {
      // exports = rhs
      // The local `exports` binding splits off from the exports namespace
      // from this point on.
      if &*ident.sym == "exports" && is_unresolved(ident, self.unresolved_mark) {
        self.cjs_exports_reassigned = true;
        self.cjs_exports_declared = true;
        let left = BindingIdent::from(Ident::new_no_ctxt(self.cjs_exports_name(), ident.span));
        return AssignExpr {
          span: node.span,
          op: node.op,
          left: AssignTarget::Simple(SimpleAssignTarget::Ident(left)),
          right: node.right.fold_with(self),
        };
      }
    }

    if let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &node.left {
      // module.exports = rhs
      if match_member_expr(member, vec!["module", "exports"], self.unresolved_mark) {
        let ident = self.get_export_ident(member.span, &"*".into());
        self.record_export_symbol(&"*".into(), &ident.sym.clone(), member.span);
        return AssignExpr {
          span: node.span,
          op: node.op,
          left: AssignTarget::Simple(SimpleAssignTarget::Ident(BindingIdent::from(ident))),
          right: node.right.fold_with(self),
        };
      }

      let is_cjs_exports = match &*member.obj {
        Expr::Member(mem) => {
          match_member_expr(mem, vec!["module", "exports"], self.unresolved_mark)
        }
        Expr::Ident(ident) => {
          &*ident.sym == "exports" && is_unresolved(ident, self.unresolved_mark)
        }
        _ => false,
      };

      if is_cjs_exports {
        if self.collect.static_cjs_exports {
          if let Some((key, _)) = match_property_name(member) {
            let span = member.span;
            let ident = self.get_export_ident(span, &key);
            if self.export_decls.insert(ident.sym.clone()) {
              // First sighting outside statement position: hoist an
              // uninitialized slot plus the getter registration.
              let slot = var_decl_item(Ident::new_no_ctxt(ident.sym.clone(), DUMMY_SP), None);
              self.hoisted_imports.push(slot);
              let thunk = export_thunk(Ident::new_no_ctxt(ident.sym.clone(), DUMMY_SP));
              let registration = self.export_registration(&key, thunk);
              self.hoisted_imports.push(registration);
            }
            if &*key != "default" && &*key != "*" {
              self.record_export_symbol(&key, &ident.sym.clone(), span);
            }
            return AssignExpr {
              span: node.span,
              op: node.op,
              left: AssignTarget::Simple(SimpleAssignTarget::Ident(BindingIdent::from(ident))),
              right: node.right.fold_with(self),
            };
          }
        }

        // Non-static exports: keep the member write on the exports object.
        let obj = self.get_cjs_exports_ident(member.span);
        return AssignExpr {
          span: node.span,
          op: node.op,
          left: AssignTarget::Simple(SimpleAssignTarget::Member(MemberExpr {
            span: member.span,
            obj: Box::new(Expr::Ident(obj)),
            prop: member.prop.clone().fold_with(self),
          })),
          right: node.right.fold_with(self),
        };
      }
    }

    node.fold_children_with(self)
  }

  fn fold_return_stmt(&mut self, node: ReturnStmt) -> ReturnStmt {
    // A top-level return ends module execution; inside the wrapper it has to
    // yield the synthesized exports.
    if self.collect.should_wrap && !self.in_function_scope {
      let module_exports = Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(Expr::Ident(Ident::new_no_ctxt("module".into(), DUMMY_SP))),
        prop: MemberProp::Ident(IdentName::new("exports".into(), DUMMY_SP)),
      });

      let arg = match node.arg {
        Some(arg) => Expr::Seq(SeqExpr {
          span: DUMMY_SP,
          exprs: vec![arg.fold_with(self), Box::new(module_exports)],
        }),
        None => module_exports,
      };

      return ReturnStmt {
        span: node.span,
        arg: Some(Box::new(arg)),
      };
    }

    node.fold_children_with(self)
  }

  fn fold_prop(&mut self, node: Prop) -> Prop {
    if self.collect.should_wrap {
      return node.fold_children_with(self);
    }

    match node {
      Prop::Shorthand(ident) => Prop::KeyValue(KeyValueProp {
        key: PropName::Ident(IdentName::new(ident.sym.clone(), DUMMY_SP)),
        value: Box::new(Expr::Ident(ident.fold_with(self))),
      }),
      _ => node.fold_children_with(self),
    }
  }

  fn fold_prop_name(&mut self, node: PropName) -> PropName {
    match node {
      PropName::Computed(k) => PropName::Computed(k.fold_with(self)),
      k => k,
    }
  }

  fn fold_object_pat_prop(&mut self, node: ObjectPatProp) -> ObjectPatProp {
    if self.collect.should_wrap {
      return node.fold_children_with(self);
    }

    // var {a, b} = foo; -> var {a: $id$var$a, b: $id$var$b} = foo;
    match node {
      ObjectPatProp::Assign(assign) => ObjectPatProp::KeyValue(KeyValuePatProp {
        key: PropName::Ident(IdentName::new(assign.key.sym.clone(), DUMMY_SP)),
        value: Box::new(match assign.value {
          Some(value) => Pat::Assign(AssignPat {
            span: DUMMY_SP,
            left: Box::new(Pat::Ident(assign.key.fold_with(self))),
            right: value.fold_with(self),
          }),
          None => Pat::Ident(assign.key.fold_with(self)),
        }),
      }),
      _ => node.fold_children_with(self),
    }
  }
}

impl Hoist<'_> {
  fn loc(&self, span: Span) -> SourceLocation {
    SourceLocation::from(&self.collect.source_map, span)
  }

  fn exports_name(&self) -> Atom {
    format!("${}$exports", self.module_id).into()
  }

  fn cjs_exports_name(&self) -> Atom {
    format!("${}$cjs_exports", self.module_id).into()
  }

  fn export_name(&self, exported: &str) -> Atom {
    if exported == "*" {
      self.exports_name()
    } else {
      format!("${}$export${}", self.module_id, to_identifier(exported)).into()
    }
  }

  fn var_name(&self, sym: &str) -> Atom {
    format!("${}$var${}", self.module_id, sym).into()
  }

  fn import_name(&self, dep_id: &str, imported: &str) -> Atom {
    if imported == "*" {
      format!("${}$import${}", self.module_id, dep_id).into()
    } else {
      format!(
        "${}$import${}${}",
        self.module_id,
        dep_id,
        to_identifier(imported)
      )
      .into()
    }
  }

  fn import_async_name(&self, dep_id: &str, member: &str) -> Atom {
    format!(
      "${}$importAsync${}${}",
      self.module_id,
      dep_id,
      to_identifier(member)
    )
    .into()
  }

  fn require_name(&self, source: &str) -> Atom {
    format!("${}$require${}", self.module_id, to_identifier(source)).into()
  }

  fn dependency_id(&self, source: &str) -> Option<String> {
    self
      .asset
      .dependency(source)
      .map(|dependency| to_identifier(&dependency.id))
  }

  fn dependency_is_async(&self, source: &str) -> bool {
    self
      .asset
      .dependency(source)
      .map_or(false, |dependency| dependency.is_async)
  }

  fn get_export_ident(&mut self, span: Span, exported: &Atom) -> Ident {
    if exported == "*" {
      self.uses_exports = true;
    }
    Ident::new_no_ctxt(self.export_name(exported), span)
  }

  fn get_cjs_exports_ident(&mut self, span: Span) -> Ident {
    if self.cjs_exports_reassigned {
      self.cjs_exports_declared = true;
      Ident::new_no_ctxt(self.cjs_exports_name(), span)
    } else {
      self.get_export_ident(span, &"*".into())
    }
  }

  fn undefined_ident(&self, span: Span) -> Ident {
    Ident::new(
      "undefined".into(),
      span,
      SyntaxContext::empty().apply_mark(self.unresolved_mark),
    )
  }

  fn export_key(exported: &str) -> Atom {
    if exported == "*" || exported == "default" {
      exported.into()
    } else {
      to_identifier(exported).into()
    }
  }

  fn record_export_symbol(&mut self, exported: &Atom, local: &Atom, span: Span) {
    let loc = self.loc(span);
    self.asset.symbols.insert_if_absent(
      Self::export_key(exported),
      Symbol::new(local.clone(), Some(loc)),
    );
  }

  fn record_dependency_symbol(
    &mut self,
    source: &Atom,
    imported: &Atom,
    local: &Atom,
    loc: Option<SourceLocation>,
    is_weak: bool,
  ) {
    if let Some(dependency) = self.asset.dependency_mut(source) {
      dependency.symbols.ensure();
      dependency.symbols.insert_if_absent(
        Self::export_key(imported),
        Symbol {
          local: local.clone(),
          loc,
          is_weak,
        },
      );
    }
  }

  fn placeholder_require_call(&self, callee: &str, source: &Atom, span: Span) -> Expr {
    Expr::Call(CallExpr {
      span,
      ctxt: SyntaxContext::empty(),
      callee: Callee::Expr(Box::new(Expr::Ident(Ident::new_no_ctxt(
        callee.into(),
        DUMMY_SP,
      )))),
      args: vec![
        str_arg(self.asset.id.clone().into()),
        str_arg(source.clone()),
      ],
      type_args: None,
    })
  }

  fn placeholder_require_item(&self, source: &Atom) -> ModuleItem {
    ModuleItem::Stmt(Stmt::Expr(ExprStmt {
      span: DUMMY_SP,
      expr: Box::new(self.placeholder_require_call("$parcel$require", source, DUMMY_SP)),
    }))
  }

  /// $parcel$export($id$exports, "<exported>", <value>);
  fn export_registration(&mut self, exported: &Atom, value: Expr) -> ModuleItem {
    let exports_ident = self.get_export_ident(DUMMY_SP, &"*".into());
    ModuleItem::Stmt(Stmt::Expr(ExprStmt {
      span: DUMMY_SP,
      expr: Box::new(Expr::Call(CallExpr {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        callee: Callee::Expr(Box::new(Expr::Ident(Ident::new_no_ctxt(
          "$parcel$export".into(),
          DUMMY_SP,
        )))),
        args: vec![
          expr_arg(Expr::Ident(exports_ident)),
          str_arg(exported.clone()),
          expr_arg(value),
        ],
        type_args: None,
      })),
    }))
  }

  fn fold_require_call(&mut self, source: Atom, span: Span) -> Expr {
    if !self.dependency_is_async(&source) {
      self.asset.meta.is_common_js = true;
    }

    let name = self.require_name(&source);
    let loc = self.loc(span);
    self.record_dependency_symbol(&source, &"*".into(), &name, Some(loc), false);

    self.placeholder_require_call("$parcel$require", &source, span)
  }

  /// Rewrites a top-level `exports.foo = …` statement into a variable
  /// declaration plus a getter registration.
  fn try_fold_static_export_stmt(&mut self, assign: AssignExpr) -> Result<(), AssignExpr> {
    if self.collect.should_wrap
      || !self.collect.static_cjs_exports
      || assign.op != AssignOp::Assign
    {
      return Err(assign);
    }

    let (key, name, span) = {
      let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &assign.left else {
        return Err(assign);
      };

      if match_member_expr(member, vec!["module", "exports"], self.unresolved_mark) {
        return Err(assign);
      }

      let is_cjs_target = match &*member.obj {
        Expr::Member(mem) => {
          match_member_expr(mem, vec!["module", "exports"], self.unresolved_mark)
        }
        Expr::Ident(ident) => {
          &*ident.sym == "exports" && is_unresolved(ident, self.unresolved_mark)
        }
        _ => false,
      };
      if !is_cjs_target {
        return Err(assign);
      }

      let Some((key, _)) = match_property_name(member) else {
        return Err(assign);
      };

      let name = self.export_name(&key);
      if self.export_decls.contains(&name) {
        return Err(assign);
      }

      (key, name, member.span)
    };

    self.export_decls.insert(name.clone());
    let init = assign.right.fold_with(self);
    self
      .module_items
      .push(var_decl_item(Ident::new_no_ctxt(name.clone(), span), Some(init)));
    let thunk = export_thunk(Ident::new_no_ctxt(name.clone(), DUMMY_SP));
    let registration = self.export_registration(&key, thunk);
    self.module_items.push(registration);
    if &*key != "default" && &*key != "*" {
      self.record_export_symbol(&key, &name, span);
    }

    Ok(())
  }

  fn handle_import_decl(&mut self, import: ImportDecl) {
    let collect = self.collect;
    let source = import.src.value.clone();

    let Some(dep_id) = self.dependency_id(&source) else {
      self.errors.push(HoistError::MissingDependency {
        specifier: source.to_string(),
      });
      return;
    };

    if import.phase != ImportPhase::Evaluation {
      self.errors.push(HoistError::UnknownImportConstruct {
        loc: self.loc(import.span),
      });
      return;
    }

    // Ensure that all import specifiers are constant.
    for specifier in &import.specifiers {
      let local = match specifier {
        ImportSpecifier::Named(named) => &named.local,
        ImportSpecifier::Default(default) => &default.local,
        ImportSpecifier::Namespace(ns) => &ns.local,
      };

      if let Some(spans) = collect.non_const_bindings.get(&id!(local)) {
        let mut highlights: Vec<CodeHighlight> = spans
          .iter()
          .map(|span| CodeHighlight {
            loc: SourceLocation::from(&collect.source_map, *span),
            message: None,
          })
          .collect();

        highlights.push(CodeHighlight {
          loc: SourceLocation::from(&collect.source_map, local.span),
          message: Some("Originally imported here".into()),
        });

        self.diagnostics.push(Diagnostic {
          message: "Assignment to an import specifier is not allowed".into(),
          code_highlights: Some(highlights),
          hints: None,
          show_environment: false,
          severity: DiagnosticSeverity::Error,
          documentation_url: None,
        })
      }
    }

    for specifier in &import.specifiers {
      match specifier {
        ImportSpecifier::Named(named) => {
          let local_id = id!(named.local);
          let referenced = collect.used_imports.contains(&local_id);
          let reexported = collect.reexported_imports.contains(&local_id);
          if !referenced && !reexported && !self.asset.is_source {
            // Unreferenced specifier in third-party code.
            continue;
          }

          let imported = match &named.imported {
            Some(imported) => crate::utils::match_export_name(imported).0,
            None => named.local.sym.clone(),
          };
          let name = self.import_name(&dep_id, &imported);
          let loc = SourceLocation::from(&collect.source_map, named.span);
          if &*imported == "default" {
            if let Some(dependency) = self.asset.dependency_mut(&source) {
              dependency.meta.has_default_import = true;
            }
          }
          self.record_dependency_symbol(
            &source,
            &imported,
            &name,
            Some(loc),
            reexported && !referenced,
          );
        }
        ImportSpecifier::Default(default) => {
          let local_id = id!(default.local);
          let referenced = collect.used_imports.contains(&local_id);
          let reexported = collect.reexported_imports.contains(&local_id);
          if !referenced && !reexported && !self.asset.is_source {
            continue;
          }

          let name = self.import_name(&dep_id, "default");
          let loc = SourceLocation::from(&collect.source_map, default.span);
          if let Some(dependency) = self.asset.dependency_mut(&source) {
            dependency.meta.has_default_import = true;
          }
          self.record_dependency_symbol(
            &source,
            &"default".into(),
            &name,
            Some(loc),
            reexported && !referenced,
          );
        }
        ImportSpecifier::Namespace(_) => {
          // Namespace symbols are recorded where the references are folded:
          // per accessed member when every access is static, or a single
          // "*" symbol otherwise.
        }
      }
    }

    self
      .hoisted_imports
      .push(self.placeholder_require_item(&source));
  }

  fn handle_named_export(&mut self, export: NamedExport) {
    let collect = self.collect;

    if let Some(src) = &export.src {
      let source = src.value.clone();
      let Some(dep_id) = self.dependency_id(&source) else {
        self.errors.push(HoistError::MissingDependency {
          specifier: source.to_string(),
        });
        return;
      };

      let mut registrations = vec![];
      for specifier in &export.specifiers {
        let (imported, exported, span) = match specifier {
          ExportSpecifier::Named(named) => {
            let (imported, _) = crate::utils::match_export_name(&named.orig);
            let exported = match &named.exported {
              Some(exported) => crate::utils::match_export_name(exported).0,
              None => imported.clone(),
            };
            (imported, exported, named.span)
          }
          ExportSpecifier::Default(default) => {
            ("default".into(), default.exported.sym.clone(), export.span)
          }
          ExportSpecifier::Namespace(namespace) => (
            "*".into(),
            crate::utils::match_export_name(&namespace.name).0,
            namespace.span,
          ),
        };

        let name = self.import_name(&dep_id, &imported);
        let loc = SourceLocation::from(&collect.source_map, span);
        self.record_dependency_symbol(&source, &imported, &name, Some(loc), true);
        self.record_export_symbol(&exported, &name, span);
        if !collect.should_wrap {
          registrations
            .push(self.export_registration(&exported, Expr::Ident(Ident::new_no_ctxt(name, span))));
        }
      }

      self
        .hoisted_imports
        .push(self.placeholder_require_item(&source));
      self.hoisted_imports.append(&mut registrations);
      return;
    }

    for specifier in &export.specifiers {
      let ExportSpecifier::Named(named) = specifier else {
        self.errors.push(HoistError::UnknownExportConstruct {
          loc: self.loc(export.span),
        });
        continue;
      };

      let Some(orig) = crate::utils::match_export_name_ident(&named.orig) else {
        self.errors.push(HoistError::UnknownExportConstruct {
          loc: self.loc(named.span),
        });
        continue;
      };

      let exported = match &named.exported {
        Some(exported) => crate::utils::match_export_name(exported).0,
        None => orig.sym.clone(),
      };

      if let Some(Import {
        source,
        specifier: imported,
        ..
      }) = collect.imports.get(&id!(orig))
      {
        // export {x}; where x was imported: a re-export, weak unless the
        // binding is also used directly.
        let Some(dep_id) = self.dependency_id(source) else {
          self.errors.push(HoistError::MissingDependency {
            specifier: source.to_string(),
          });
          continue;
        };

        let name = self.import_name(&dep_id, imported);
        let is_weak = !collect.used_imports.contains(&id!(orig));
        let loc = SourceLocation::from(&collect.source_map, named.span);
        let source = source.clone();
        let imported = imported.clone();
        self.record_dependency_symbol(&source, &imported, &name, Some(loc), is_weak);
        self.record_export_symbol(&exported, &name, named.span);
        if !collect.should_wrap {
          let registration = self
            .export_registration(&exported, Expr::Ident(Ident::new_no_ctxt(name, named.span)));
          self.module_items.push(registration);
        }
        continue;
      }

      // A variable will appear only once in the `exports_locals` mapping but
      // could be exported multiple times with different names.
      // Find the original exported name, and remap.
      let primary = match collect.exports_locals.get(&id!(orig)) {
        Some(primary) => primary.clone(),
        None => orig.sym.clone(),
      };
      let local = if collect.should_wrap {
        orig.sym.clone()
      } else {
        self.export_name(&primary)
      };
      self.record_export_symbol(&exported, &local, named.span);
      if !collect.should_wrap {
        let thunk = export_thunk(Ident::new_no_ctxt(local, DUMMY_SP));
        let registration = self.export_registration(&exported, thunk);
        self.module_items.push(registration);
      }
    }
  }

  fn handle_export_all(&mut self, export: ExportAll) {
    let source = export.src.value.clone();
    if self.dependency_id(&source).is_none() {
      self.errors.push(HoistError::MissingDependency {
        specifier: source.to_string(),
      });
      return;
    }

    let loc = self.loc(export.span);
    self.record_dependency_symbol(&source, &"*".into(), &"*".into(), Some(loc), true);

    if self.collect.should_wrap {
      self
        .hoisted_imports
        .push(self.placeholder_require_item(&source));
      return;
    }

    // $parcel$exportWildcard($id$exports, $parcel$require("<id>", "<source>"));
    let exports_ident = self.get_export_ident(DUMMY_SP, &"*".into());
    let require = self.placeholder_require_call("$parcel$require", &source, DUMMY_SP);
    self
      .hoisted_imports
      .push(ModuleItem::Stmt(Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(Expr::Call(CallExpr {
          span: DUMMY_SP,
          ctxt: SyntaxContext::empty(),
          callee: Callee::Expr(Box::new(Expr::Ident(Ident::new_no_ctxt(
            "$parcel$exportWildcard".into(),
            DUMMY_SP,
          )))),
          args: vec![expr_arg(Expr::Ident(exports_ident)), expr_arg(require)],
          type_args: None,
        })),
      })));
  }

  fn handle_export_default_expr(&mut self, export: ExportDefaultExpr) {
    if !self.collect.should_wrap {
      if let Expr::Ident(ident) = &*export.expr {
        if let Some(exported) = self.collect.exports_locals.get(&id!(ident)) {
          // The binding itself is renamed to the export identifier; the
          // declaration disappears. An already-exported name is reused.
          let name = self.export_name(exported);
          self.record_export_symbol(&"default".into(), &name, export.span);
          let thunk = export_thunk(Ident::new_no_ctxt(name, DUMMY_SP));
          let registration = self.export_registration(&"default".into(), thunk);
          self.module_items.push(registration);
          return;
        }
      }
    }

    let ident = self.get_export_ident(export.span, &"default".into());
    let init = export.expr.fold_with(self);
    self
      .module_items
      .push(var_decl_item(Ident::new_no_ctxt(ident.sym.clone(), DUMMY_SP), Some(init)));
    self.record_export_symbol(&"default".into(), &ident.sym.clone(), export.span);
    if !self.collect.should_wrap {
      let thunk = export_thunk(Ident::new_no_ctxt(ident.sym.clone(), DUMMY_SP));
      let registration = self.export_registration(&"default".into(), thunk);
      self.module_items.push(registration);
    }
  }

  fn handle_export_default_decl(&mut self, export: ExportDefaultDecl) {
    let (decl, local) = match export.decl {
      DefaultDecl::Class(class) => {
        if let Some(ident) = &class.ident {
          let local = if self.collect.should_wrap {
            ident.clone()
          } else {
            let exported = self
              .collect
              .exports_locals
              .get(&id!(ident))
              .cloned()
              .unwrap_or_else(|| "default".into());
            self.get_export_ident(ident.span, &exported)
          };
          (
            Decl::Class(ClassDecl {
              ident: local.clone(),
              declare: false,
              class: class.class.fold_with(self),
            }),
            local,
          )
        } else {
          // export default class {} -> var $id$export$default = class {};
          let ident = self.get_export_ident(export.span, &"default".into());
          let init = Expr::Class(ClassExpr {
            ident: None,
            class: class.class.fold_with(self),
          });
          self.module_items.push(var_decl_item(
            Ident::new_no_ctxt(ident.sym.clone(), DUMMY_SP),
            Some(Box::new(init)),
          ));
          self.finish_default_export(&ident.sym.clone(), export.span);
          return;
        }
      }
      DefaultDecl::Fn(func) => {
        if let Some(ident) = &func.ident {
          let local = if self.collect.should_wrap {
            ident.clone()
          } else {
            let exported = self
              .collect
              .exports_locals
              .get(&id!(ident))
              .cloned()
              .unwrap_or_else(|| "default".into());
            self.get_export_ident(ident.span, &exported)
          };
          (
            Decl::Fn(FnDecl {
              ident: local.clone(),
              declare: false,
              function: func.function.fold_with(self),
            }),
            local,
          )
        } else {
          let ident = self.get_export_ident(export.span, &"default".into());
          let init = Expr::Fn(FnExpr {
            ident: None,
            function: func.function.fold_with(self),
          });
          self.module_items.push(var_decl_item(
            Ident::new_no_ctxt(ident.sym.clone(), DUMMY_SP),
            Some(Box::new(init)),
          ));
          self.finish_default_export(&ident.sym.clone(), export.span);
          return;
        }
      }
      _ => {
        self.errors.push(HoistError::UnknownExportConstruct {
          loc: self.loc(export.span),
        });
        return;
      }
    };

    self.module_items.push(ModuleItem::Stmt(Stmt::Decl(decl)));
    self.finish_default_export(&local.sym.clone(), export.span);
  }

  fn finish_default_export(&mut self, local: &Atom, span: Span) {
    self.record_export_symbol(&"default".into(), local, span);
    if !self.collect.should_wrap {
      let thunk = export_thunk(Ident::new_no_ctxt(local.clone(), DUMMY_SP));
      let registration = self.export_registration(&"default".into(), thunk);
      self.module_items.push(registration);
    }
  }

  fn handle_export_decl(&mut self, export: ExportDecl) {
    let mut declared = vec![];
    match &export.decl {
      Decl::Class(class) => declared.push(class.ident.clone()),
      Decl::Fn(func) => declared.push(func.ident.clone()),
      Decl::Var(var) => {
        for decl in &var.decls {
          collect_pat_idents(&decl.name, &mut declared);
        }
      }
      _ => {
        self.errors.push(HoistError::UnknownExportConstruct {
          loc: self.loc(export.span),
        });
        return;
      }
    }

    let d = export.decl.fold_with(self);
    self.module_items.push(ModuleItem::Stmt(Stmt::Decl(d)));

    for ident in declared {
      let exported = self
        .collect
        .exports_locals
        .get(&id!(ident))
        .cloned()
        .unwrap_or_else(|| ident.sym.clone());
      let local = if self.collect.should_wrap {
        ident.sym.clone()
      } else {
        self.export_name(&exported)
      };
      self.record_export_symbol(&exported, &local, ident.span);
      if !self.collect.should_wrap {
        let thunk = export_thunk(Ident::new_no_ctxt(local, DUMMY_SP));
        let registration = self.export_registration(&exported, thunk);
        self.module_items.push(registration);
      }
    }
  }

  /// var $id$exports = (function() {
  ///   var exports = this;
  ///   var module = { exports: this };
  ///   <body>
  ///   return module.exports;
  /// }).call({});
  fn wrap_module_body(&mut self) -> ModuleItem {
    let exports_name = self.exports_name();

    let mut stmts: Vec<Stmt> = vec![
      var_decl(
        Ident::new_no_ctxt("exports".into(), DUMMY_SP),
        Some(Box::new(Expr::This(ThisExpr { span: DUMMY_SP }))),
      ),
      var_decl(
        Ident::new_no_ctxt("module".into(), DUMMY_SP),
        Some(Box::new(Expr::Object(ObjectLit {
          span: DUMMY_SP,
          props: vec![PropOrSpread::Prop(Box::new(Prop::KeyValue(KeyValueProp {
            key: PropName::Ident(IdentName::new("exports".into(), DUMMY_SP)),
            value: Box::new(Expr::This(ThisExpr { span: DUMMY_SP })),
          })))],
        }))),
      ),
    ];

    if self.collect.is_esm {
      // exports.__esModule = true;
      stmts.push(Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(Expr::Assign(AssignExpr {
          span: DUMMY_SP,
          op: AssignOp::Assign,
          left: AssignTarget::Simple(SimpleAssignTarget::Member(MemberExpr {
            span: DUMMY_SP,
            obj: Box::new(Expr::Ident(Ident::new_no_ctxt("exports".into(), DUMMY_SP))),
            prop: MemberProp::Ident(IdentName::new("__esModule".into(), DUMMY_SP)),
          })),
          right: Box::new(Expr::Lit(Lit::Bool(Bool {
            span: DUMMY_SP,
            value: true,
          }))),
        })),
      }));
    }

    for item in std::mem::take(&mut self.module_items) {
      if let ModuleItem::Stmt(stmt) = item {
        stmts.push(stmt);
      }
    }

    stmts.push(Stmt::Return(ReturnStmt {
      span: DUMMY_SP,
      arg: Some(Box::new(Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(Expr::Ident(Ident::new_no_ctxt("module".into(), DUMMY_SP))),
        prop: MemberProp::Ident(IdentName::new("exports".into(), DUMMY_SP)),
      }))),
    }));

    let wrapper = Expr::Fn(FnExpr {
      ident: None,
      function: Box::new(Function {
        params: vec![],
        decorators: vec![],
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        body: Some(BlockStmt {
          span: DUMMY_SP,
          ctxt: SyntaxContext::empty(),
          stmts,
        }),
        is_generator: false,
        is_async: false,
        type_params: None,
        return_type: None,
      }),
    });

    // (wrapper).call({})
    let call = Expr::Call(CallExpr {
      span: DUMMY_SP,
      ctxt: SyntaxContext::empty(),
      callee: Callee::Expr(Box::new(Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(Expr::Paren(ParenExpr {
          span: DUMMY_SP,
          expr: Box::new(wrapper),
        })),
        prop: MemberProp::Ident(IdentName::new("call".into(), DUMMY_SP)),
      }))),
      args: vec![expr_arg(Expr::Object(ObjectLit {
        span: DUMMY_SP,
        props: vec![],
      }))],
      type_args: None,
    });

    var_decl_item(
      Ident::new_no_ctxt(exports_name, DUMMY_SP),
      Some(Box::new(call)),
    )
  }
}

fn expr_arg(expr: Expr) -> ExprOrSpread {
  ExprOrSpread {
    spread: None,
    expr: Box::new(expr),
  }
}

fn str_arg(value: Atom) -> ExprOrSpread {
  expr_arg(Expr::Lit(Lit::Str(Str {
    span: DUMMY_SP,
    value,
    raw: None,
  })))
}

fn export_thunk(local: Ident) -> Expr {
  Expr::Fn(FnExpr {
    ident: None,
    function: Box::new(Function {
      params: vec![],
      decorators: vec![],
      span: DUMMY_SP,
      ctxt: SyntaxContext::empty(),
      body: Some(BlockStmt {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        stmts: vec![Stmt::Return(ReturnStmt {
          span: DUMMY_SP,
          arg: Some(Box::new(Expr::Ident(local))),
        })],
      }),
      is_generator: false,
      is_async: false,
      type_params: None,
      return_type: None,
    }),
  })
}

fn var_decl(ident: Ident, init: Option<Box<Expr>>) -> Stmt {
  Stmt::Decl(Decl::Var(Box::new(VarDecl {
    span: DUMMY_SP,
    ctxt: SyntaxContext::empty(),
    kind: VarDeclKind::Var,
    declare: false,
    decls: vec![VarDeclarator {
      span: DUMMY_SP,
      name: Pat::Ident(BindingIdent::from(ident)),
      init,
      definite: false,
    }],
  })))
}

fn var_decl_item(ident: Ident, init: Option<Box<Expr>>) -> ModuleItem {
  ModuleItem::Stmt(var_decl(ident, init))
}

fn collect_pat_idents(pat: &Pat, idents: &mut Vec<Ident>) {
  match pat {
    Pat::Ident(ident) => idents.push(ident.id.clone()),
    Pat::Object(object) => {
      for prop in &object.props {
        match prop {
          ObjectPatProp::KeyValue(kv) => collect_pat_idents(&kv.value, idents),
          ObjectPatProp::Assign(assign) => idents.push(assign.key.id.clone()),
          ObjectPatProp::Rest(rest) => collect_pat_idents(&rest.arg, idents),
        }
      }
    }
    Pat::Array(array) => {
      for el in array.elems.iter().flatten() {
        collect_pat_idents(el, idents);
      }
    }
    Pat::Assign(assign) => collect_pat_idents(&assign.left, idents),
    Pat::Rest(rest) => collect_pat_idents(&rest.arg, idents),
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::test_utils::{
    run_hoist, run_hoist_asset, run_hoist_async, test_asset, try_run_hoist_asset, HoistRun,
  };

  fn local(asset: &Asset, exported: &str) -> Atom {
    asset
      .symbols
      .get(exported)
      .unwrap_or_else(|| panic!("missing asset symbol {}", exported))
      .local
      .clone()
  }

  fn dep_local(asset: &Asset, specifier: &str, exported: &str) -> Atom {
    asset
      .dependency(specifier)
      .unwrap()
      .symbols
      .get(exported)
      .unwrap_or_else(|| panic!("missing dependency symbol {}", exported))
      .local
      .clone()
  }

  #[test]
  fn esm_import_and_export() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    import {x} from "./a";
    export const y = x + 1;
    "#,
      &["./a"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    $parcel$require("abc", "./a");
    const $abc$export$y = $abc$import$__a$x + 1;
    $parcel$export($abc$exports, "y", function() {
        return $abc$export$y;
    });
    "#}
    );

    assert!(asset.meta.is_es6_module);
    assert!(!asset.meta.is_common_js);
    assert_eq!(local(&asset, "y"), "$abc$export$y");
    assert!(asset.symbols.get("*").is_none());
    assert_eq!(dep_local(&asset, "./a", "x"), "$abc$import$__a$x");
    assert_eq!(code.matches("$parcel$require(").count(), 1);
    assert_eq!(code.matches("$parcel$export(").count(), 1);
    assert!(!code.contains("import "));
  }

  #[test]
  fn esm_import_hoist_order() {
    let HoistRun { code, .. } = run_hoist(
      r#"
    import foo from "other";
    console.log(foo);
    import bar from "bar";
    console.log(bar);
    "#,
      &["other", "bar"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    $parcel$require("abc", "other");
    $parcel$require("abc", "bar");
    console.log($abc$import$other$default);
    console.log($abc$import$bar$default);
    "#}
    );
  }

  #[test]
  fn esm_namespace_static_members() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    import * as ns from "./m";
    console.log(ns.x, ns.y);
    "#,
      &["./m"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    $parcel$require("abc", "./m");
    console.log($abc$import$__m$x, $abc$import$__m$y);
    "#}
    );

    let dep = asset.dependency("./m").unwrap();
    assert_eq!(dep_local(&asset, "./m", "x"), "$abc$import$__m$x");
    assert_eq!(dep_local(&asset, "./m", "y"), "$abc$import$__m$y");
    assert!(dep.symbols.get("*").is_none());
  }

  #[test]
  fn esm_namespace_non_static() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    import * as ns from "./m";
    console.log(ns[foo]);
    "#,
      &["./m"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    $parcel$require("abc", "./m");
    console.log($abc$import$__m[foo]);
    "#}
    );

    assert_eq!(dep_local(&asset, "./m", "*"), "$abc$import$__m");
  }

  #[test]
  fn require_namespace_binding() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    const x = require("other");
    x.foo();
    const y = require("other").bar;
    require("unknown");
    "#,
      &["other"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    const $abc$require$other = $parcel$require("abc", "other");
    $abc$require$other.foo();
    const $abc$var$y = $parcel$require("abc", "other").bar;
    require("unknown");
    "#}
    );

    assert!(asset.meta.is_common_js);
    assert_eq!(dep_local(&asset, "other", "*"), "$abc$require$other");
  }

  #[test]
  fn require_resolve() {
    let HoistRun { code, .. } = run_hoist(
      r#"
    const p = require.resolve("other");
    "#,
      &["other"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    const $abc$var$p = $parcel$require$resolve("abc", "other");
    "#}
    );
  }

  #[test]
  fn conditional_require_wraps_dependency() {
    let HoistRun { asset, result, code, .. } = run_hoist(
      r#"
    function load() {
      return require("other");
    }
    "#,
      &["other"],
    );

    assert!(code.contains(r#"return $parcel$require("abc", "other");"#));
    assert!(asset.dependency("other").unwrap().meta.should_wrap);
    assert!(result.wrapped_requires.contains(&Atom::from("other")));
    assert!(!result.should_wrap);
  }

  #[test]
  fn cjs_static_exports() {
    let HoistRun { asset, code, result, .. } = run_hoist("exports.foo = 1;", &[]);

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    var $abc$export$foo = 1;
    $parcel$export($abc$exports, "foo", function() {
        return $abc$export$foo;
    });
    "#}
    );

    assert!(asset.meta.is_common_js);
    assert!(!asset.meta.should_wrap);
    assert_eq!(local(&asset, "foo"), "$abc$export$foo");
    assert_eq!(local(&asset, "*"), "$abc$exports");
    assert!(result.static_cjs_exports);
  }

  #[test]
  fn cjs_static_exports_reassign_and_read() {
    let HoistRun { asset, code, result, .. } = run_hoist(
      r#"
    exports.foo = 1;
    exports.foo = 2;
    console.log(exports.foo);
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    var $abc$export$foo = 1;
    $parcel$export($abc$exports, "foo", function() {
        return $abc$export$foo;
    });
    $abc$export$foo = 2;
    console.log($abc$export$foo);
    "#}
    );

    assert!(result.self_references.contains(&Atom::from("foo")));
    assert_eq!(local(&asset, "foo"), "$abc$export$foo");
  }

  #[test]
  fn cjs_module_exports_member() {
    let HoistRun { code, .. } = run_hoist(
      r#"
    module.exports.foo = 2;
    console.log(module.exports.foo);
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    var $abc$export$foo = 2;
    $parcel$export($abc$exports, "foo", function() {
        return $abc$export$foo;
    });
    console.log($abc$export$foo);
    "#}
    );
  }

  #[test]
  fn cjs_module_exports_assignment() {
    let HoistRun { asset, code, .. } = run_hoist("module.exports = {};", &[]);

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    $abc$exports = {};
    "#}
    );

    assert!(asset.meta.is_common_js);
    assert_eq!(local(&asset, "*"), "$abc$exports");
  }

  #[test]
  fn cjs_exports_reassignment_splits_binding() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    exports.foo = 1;
    exports = {};
    console.log(exports);
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    var $abc$cjs_exports;
    $abc$exports.foo = 1;
    $abc$cjs_exports = {};
    console.log($abc$cjs_exports);
    "#}
    );

    // The bare `exports` reference bailed out symbol tracking.
    assert!(asset.meta.resolve_exports_bailed_out);
    assert_eq!(asset.symbols.len(), 1);
    assert_eq!(local(&asset, "*"), "$abc$exports");
    let self_dep = asset.dependency("./module.js").unwrap();
    assert_eq!(self_dep.symbols.get("*").unwrap().local, "@exports");
  }

  #[test]
  fn cjs_top_level_this() {
    let HoistRun { code, .. } = run_hoist(
      r#"
    this.foo = 2;
    var x = this;
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    $abc$exports.foo = 2;
    var $abc$var$x = $abc$exports;
    "#}
    );
  }

  #[test]
  fn esm_top_level_this() {
    let HoistRun { code, .. } = run_hoist(
      r#"
    export var x = 1;
    console.log(this);
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    var $abc$export$x = 1;
    $parcel$export($abc$exports, "x", function() {
        return $abc$export$x;
    });
    console.log(undefined);
    "#}
    );
  }

  #[test]
  fn module_member_substitutions() {
    let HoistRun { code, .. } = run_hoist(
      r#"
    console.log(module.id, module.hot, module.bundle.root, typeof module, typeof require);
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    console.log("abc", null, parcelRequire, "object", "function");
    "#}
    );
  }

  #[test]
  fn global_replacement() {
    let HoistRun { code, .. } = run_hoist("global.x = 1;", &[]);

    assert_eq!(
      code,
      indoc! {r#"
    $parcel$global.x = 1;
    "#}
    );
  }

  #[test]
  fn strict_directive_stripped() {
    let HoistRun { code, .. } = run_hoist(
      r#"
    'use strict';
    exports.foo = 1;
    "#,
      &[],
    );

    assert!(!code.contains("use strict"));
  }

  #[test]
  fn wrap_top_level_return() {
    let HoistRun { asset, code, result, .. } = run_hoist("return 42;", &[]);

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = (function() {
        var exports = this;
        var module = {
            exports: this
        };
        return 42, module.exports;
        return module.exports;
    }).call({});
    "#}
    );

    assert!(result.should_wrap);
    assert!(asset.meta.is_common_js);
    assert!(!asset.meta.is_es6_module);
    assert!(asset.meta.should_wrap);
    assert_eq!(local(&asset, "*"), "$abc$exports");
  }

  #[test]
  fn wrap_eval() {
    let HoistRun { code, result, .. } = run_hoist(r#"eval("x");"#, &[]);

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = (function() {
        var exports = this;
        var module = {
            exports: this
        };
        eval("x");
        return module.exports;
    }).call({});
    "#}
    );

    assert!(result.should_wrap);
  }

  #[test]
  fn wrap_keeps_imports_hoisted() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    import {x} from "other";
    doSomething(module);
    console.log(x);
    "#,
      &["other"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    $parcel$require("abc", "other");
    var $abc$exports = (function() {
        var exports = this;
        var module = {
            exports: this
        };
        exports.__esModule = true;
        doSomething(module);
        console.log($abc$import$other$x);
        return module.exports;
    }).call({});
    "#}
    );

    // Wrapping wins over the ES module classification.
    assert!(asset.meta.is_common_js);
    assert!(!asset.meta.is_es6_module);
    assert_eq!(dep_local(&asset, "other", "x"), "$abc$import$other$x");
  }

  #[test]
  fn wrap_rewrites_requires() {
    let HoistRun {
      asset,
      code,
      result,
      ..
    } = run_hoist(
      r#"
    var x = require("other");
    doSomething(module);
    require("side");
    x.foo();
    "#,
      &["other", "side"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    $parcel$require("abc", "side");
    var $abc$exports = (function() {
        var exports = this;
        var module = {
            exports: this
        };
        var $abc$require$other = $parcel$require("abc", "other");
        doSomething(module);
        $abc$require$other.foo();
        return module.exports;
    }).call({});
    "#}
    );

    assert!(result.should_wrap);
    assert!(asset.meta.is_common_js);
    assert_eq!(dep_local(&asset, "other", "*"), "$abc$require$other");
    assert!(asset.dependency("side").unwrap().symbols.is_empty());
  }

  #[test]
  fn wrap_rewrites_conditional_require() {
    let HoistRun {
      asset,
      code,
      result,
      ..
    } = run_hoist(
      r#"
    if (typeof module !== "undefined") {
      module.exports = require("other");
    }
    doSomething(module);
    "#,
      &["other"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = (function() {
        var exports = this;
        var module = {
            exports: this
        };
        if ("object" !== "undefined") {
            module.exports = $parcel$require("abc", "other");
        }
        doSomething(module);
        return module.exports;
    }).call({});
    "#}
    );

    assert!(result.should_wrap);
    // The conditional require propagates a wrap requirement to the imported
    // module as well.
    assert!(asset.dependency("other").unwrap().meta.should_wrap);
    assert!(result.wrapped_requires.contains(&Atom::from("other")));
    assert_eq!(dep_local(&asset, "other", "*"), "$abc$require$other");
  }

  #[test]
  fn dynamic_import_destructured_await() {
    let HoistRun { asset, code, .. } = run_hoist_async(
      r#"
    let {a, b} = await import("./m");
    "#,
      &["./m"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    let { a: $abc$var$a, b: $abc$var$b } = await $parcel$require("abc", "./m");
    "#}
    );

    let dep = asset.dependency("./m").unwrap();
    assert_eq!(dep_local(&asset, "./m", "a"), "$abc$importAsync$__m$a");
    assert_eq!(dep_local(&asset, "./m", "b"), "$abc$importAsync$__m$b");
    assert!(dep.symbols.get("*").is_none());
    assert!(!dep.meta.is_common_js);
  }

  #[test]
  fn dynamic_import_then_pattern() {
    let HoistRun { asset, code, .. } = run_hoist_async(
      r#"
    import("./m").then(({a}) => a);
    "#,
      &["./m"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    $parcel$require("abc", "./m").then(({ a: a })=>a);
    "#}
    );

    assert_eq!(dep_local(&asset, "./m", "a"), "$abc$importAsync$__m$a");
  }

  #[test]
  fn dynamic_import_namespace_members() {
    let HoistRun { asset, code, .. } = run_hoist_async(
      r#"
    async function go() {
      const ns = await import("./m");
      ns.x();
    }
    "#,
      &["./m"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    async function $abc$var$go() {
        const ns = await $parcel$require("abc", "./m");
        $abc$importAsync$__m$x();
    }
    "#}
    );

    assert_eq!(dep_local(&asset, "./m", "x"), "$abc$importAsync$__m$x");
  }

  #[test]
  fn dynamic_import_non_static() {
    let HoistRun { asset, code, .. } = run_hoist_async(
      r#"
    import("./m");
    "#,
      &["./m"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    $parcel$require("abc", "./m");
    "#}
    );

    let dep = asset.dependency("./m").unwrap();
    assert!(dep.meta.is_common_js);
    assert_eq!(dep_local(&asset, "./m", "*"), "$abc$require$__m");
  }

  #[test]
  fn reexports() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    export {x as y} from "./a";
    export * from "./b";
    import {z} from "./c";
    export {z};
    "#,
      &["./a", "./b", "./c"],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    $parcel$require("abc", "./a");
    $parcel$export($abc$exports, "y", $abc$import$__a$x);
    $parcel$exportWildcard($abc$exports, $parcel$require("abc", "./b"));
    $parcel$require("abc", "./c");
    $parcel$export($abc$exports, "z", $abc$import$__c$z);
    "#}
    );

    let a = asset.dependency("./a").unwrap();
    assert!(a.symbols.get("x").unwrap().is_weak);
    assert_eq!(local(&asset, "y"), "$abc$import$__a$x");

    let b = asset.dependency("./b").unwrap();
    let star = b.symbols.get("*").unwrap();
    assert!(star.is_weak);
    assert_eq!(star.local, "*");

    let c = asset.dependency("./c").unwrap();
    assert!(c.symbols.get("z").unwrap().is_weak);
    assert_eq!(local(&asset, "z"), "$abc$import$__c$z");
  }

  #[test]
  fn reexport_used_locally_is_strong() {
    let HoistRun { asset, .. } = run_hoist(
      r#"
    import {z} from "./c";
    console.log(z);
    export {z};
    "#,
      &["./c"],
    );

    assert!(!asset.dependency("./c").unwrap().symbols.get("z").unwrap().is_weak);
  }

  #[test]
  fn export_default_expression() {
    let HoistRun { asset, code, .. } = run_hoist("export default 2 + 2;", &[]);

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    var $abc$export$default = 2 + 2;
    $parcel$export($abc$exports, "default", function() {
        return $abc$export$default;
    });
    "#}
    );

    assert_eq!(local(&asset, "default"), "$abc$export$default");
  }

  #[test]
  fn export_default_identifier_renames_binding() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    let x = 1;
    export default x;
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    let $abc$export$default = 1;
    $parcel$export($abc$exports, "default", function() {
        return $abc$export$default;
    });
    "#}
    );

    assert_eq!(local(&asset, "default"), "$abc$export$default");
  }

  #[test]
  fn export_default_function_declaration() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    export default function foo() {
      return 1;
    }
    foo();
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    function $abc$export$default() {
        return 1;
    }
    $parcel$export($abc$exports, "default", function() {
        return $abc$export$default;
    });
    $abc$export$default();
    "#}
    );

    assert_eq!(local(&asset, "default"), "$abc$export$default");
  }

  #[test]
  fn export_default_reuses_exported_name() {
    let HoistRun { asset, code, .. } = run_hoist(
      r#"
    export function foo() {}
    export default foo;
    "#,
      &[],
    );

    assert_eq!(
      code,
      indoc! {r#"
    var $abc$exports = {};
    function $abc$export$foo() {}
    $parcel$export($abc$exports, "foo", function() {
        return $abc$export$foo;
    });
    $parcel$export($abc$exports, "default", function() {
        return $abc$export$foo;
    });
    "#}
    );

    assert_eq!(local(&asset, "foo"), "$abc$export$foo");
    assert_eq!(local(&asset, "default"), "$abc$export$foo");
  }

  #[test]
  fn import_reassignment_diagnostic() {
    let HoistRun { diagnostics, .. } = run_hoist(
      r#"
    import {x} from "other";
    x = 2;
    "#,
      &["other"],
    );

    assert!(diagnostics
      .iter()
      .any(|d| d.message == "Assignment to an import specifier is not allowed"));
  }

  #[test]
  fn missing_dependency_errors() {
    let err = try_run_hoist_asset(r#"import {x} from "nope";"#, test_asset(&[])).unwrap_err();
    assert!(matches!(err, HoistError::MissingDependency { .. }));
  }

  #[test]
  fn unreferenced_import_skipped_in_third_party() {
    let mut asset = test_asset(&["other"]);
    asset.is_source = false;
    let HoistRun { asset, .. } = run_hoist_asset(r#"import {x} from "other";"#, asset);
    assert!(asset.dependency("other").unwrap().symbols.get("x").is_none());

    let HoistRun { asset, .. } = run_hoist(r#"import {x} from "other";"#, &["other"]);
    assert!(asset.dependency("other").unwrap().symbols.get("x").is_some());
  }
}

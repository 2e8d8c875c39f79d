use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use swc_core::ecma::atoms::Atom;

use crate::utils::SourceLocation;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentContext {
  #[default]
  Browser,
  WebWorker,
  ServiceWorker,
  Node,
  ElectronMain,
  ElectronRenderer,
}

impl EnvironmentContext {
  pub fn is_node(&self) -> bool {
    use EnvironmentContext::*;
    matches!(self, Node | ElectronMain | ElectronRenderer)
  }
}

/// The environment an asset is built for. Only the pieces the hoisting pass
/// consults are modeled here.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
  pub context: EnvironmentContext,
}

impl Environment {
  pub fn is_node(&self) -> bool {
    self.context.is_node()
  }
}

/// A map entry from an export name to the local variable it corresponds to
/// in the emitted code.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
  pub local: Atom,
  pub loc: Option<SourceLocation>,
  pub is_weak: bool,
}

impl Symbol {
  pub fn new(local: impl Into<Atom>, loc: Option<SourceLocation>) -> Self {
    Symbol {
      local: local.into(),
      loc,
      is_weak: false,
    }
  }

  pub fn weak(local: impl Into<Atom>, loc: Option<SourceLocation>) -> Self {
    Symbol {
      local: local.into(),
      loc,
      is_weak: true,
    }
  }
}

/// Exported name -> symbol record, for an asset or a dependency.
///
/// The table starts out unmaterialized, meaning "symbols unknown"; `ensure`
/// switches it to an (initially empty) known set. The distinction matters to
/// downstream tree-shaking, which must assume everything is used while the
/// table is unmaterialized.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SymbolTable {
  symbols: Option<IndexMap<Atom, Symbol>>,
}

impl SymbolTable {
  pub fn ensure(&mut self) {
    if self.symbols.is_none() {
      self.symbols = Some(IndexMap::new());
    }
  }

  pub fn is_materialized(&self) -> bool {
    self.symbols.is_some()
  }

  pub fn get(&self, exported: &str) -> Option<&Symbol> {
    self
      .symbols
      .as_ref()
      .and_then(|symbols| symbols.get(&Atom::from(exported)))
  }

  pub fn insert(&mut self, exported: impl Into<Atom>, symbol: Symbol) {
    self.ensure();
    self
      .symbols
      .as_mut()
      .unwrap()
      .insert(exported.into(), symbol);
  }

  pub fn insert_if_absent(&mut self, exported: impl Into<Atom>, symbol: Symbol) {
    self.ensure();
    self
      .symbols
      .as_mut()
      .unwrap()
      .entry(exported.into())
      .or_insert(symbol);
  }

  pub fn has_export_symbol(&self, exported: &str) -> bool {
    self.get(exported).is_some()
  }

  pub fn has_local_symbol(&self, local: &str) -> bool {
    self
      .symbols
      .as_ref()
      .map_or(false, |symbols| symbols.values().any(|s| s.local == local))
  }

  pub fn export_symbols(&self) -> impl Iterator<Item = &Atom> {
    self.symbols.iter().flat_map(|symbols| symbols.keys())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Atom, &Symbol)> {
    self.symbols.iter().flat_map(|symbols| symbols.iter())
  }

  pub fn len(&self) -> usize {
    self.symbols.as_ref().map_or(0, |symbols| symbols.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn retain(&mut self, mut keep: impl FnMut(&Atom, &Symbol) -> bool) {
    if let Some(symbols) = &mut self.symbols {
      symbols.retain(|exported, symbol| keep(exported, symbol));
    }
  }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyMeta {
  /// The resolved module must be wrapped in a function because the call
  /// order of its requires is not statically known.
  pub should_wrap: bool,
  pub has_default_import: bool,
  #[serde(rename = "isCommonJS")]
  pub is_common_js: bool,
}

/// A declared reference from one asset to another, identified by the module
/// specifier written in the source.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
  pub id: String,
  pub specifier: Atom,
  pub is_async: bool,
  pub meta: DependencyMeta,
  pub symbols: SymbolTable,
  pub loc: Option<SourceLocation>,
}

impl Dependency {
  pub fn new(id: impl Into<String>, specifier: impl Into<Atom>) -> Self {
    Dependency {
      id: id.into(),
      specifier: specifier.into(),
      ..Default::default()
    }
  }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
  #[serde(rename = "isES6Module")]
  pub is_es6_module: bool,
  #[serde(rename = "isCommonJS")]
  pub is_common_js: bool,
  pub should_wrap: bool,
  pub exports_identifier: Option<String>,
  /// Static analysis of the exports object gave up; only the namespace
  /// symbol survives and tree-shaking is disabled for this asset.
  pub resolve_exports_bailed_out: bool,
}

/// One module as seen by the bundler. The transform mutates `meta`, the
/// symbol table and the dependency list in place.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
  pub id: String,
  pub file_path: PathBuf,
  /// Project source as opposed to third-party code from node_modules.
  pub is_source: bool,
  pub env: Environment,
  pub meta: AssetMeta,
  pub symbols: SymbolTable,
  pub dependencies: Vec<Dependency>,
}

impl Asset {
  pub fn new(id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
    Asset {
      id: id.into(),
      file_path: file_path.into(),
      is_source: true,
      ..Default::default()
    }
  }

  pub fn dependency(&self, specifier: &str) -> Option<&Dependency> {
    self
      .dependencies
      .iter()
      .find(|dep| dep.specifier == specifier)
  }

  pub fn dependency_mut(&mut self, specifier: &str) -> Option<&mut Dependency> {
    self
      .dependencies
      .iter_mut()
      .find(|dep| dep.specifier == specifier)
  }

  pub fn add_dependency(&mut self, dependency: Dependency) {
    self.dependencies.push(dependency);
  }

  /// Specifier under which this asset depends on itself when its own exports
  /// object escapes analysis.
  pub fn self_specifier(&self) -> Atom {
    format!(
      "./{}",
      self
        .file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| self.id.clone())
    )
    .into()
  }
}

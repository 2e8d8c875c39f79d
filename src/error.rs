use thiserror::Error;

use crate::utils::SourceLocation;

#[derive(Debug, Error)]
pub enum HoistError {
  #[error("Unsupported AST: {kind} v{version}")]
  UnsupportedAst { kind: String, version: String },
  #[error("Unknown import specifier shape at {loc}")]
  UnknownImportConstruct { loc: SourceLocation },
  #[error("Unknown export specifier shape at {loc}")]
  UnknownExportConstruct { loc: SourceLocation },
  #[error("No dependency was registered for specifier {specifier}")]
  MissingDependency { specifier: String },
}

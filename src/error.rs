//! Error taxonomy for a dump run
//!
//! Every variant except `Io` aborts the run. Soft absence (null references,
//! empty collections, locales without text) is never an error and never
//! reaches this type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DumpError {
  // Configuration errors
  #[error("MISSING_ATTRIBUTE: <{node}> requires attribute '{attribute}'")]
  MissingAttribute { node: String, attribute: String },

  #[error("INVALID_ATTRIBUTE_VALUE: <{node} {attribute}=\"{value}\">: {reason}")]
  InvalidAttributeValue {
    node: String,
    attribute: String,
    value: String,
    reason: String,
  },

  #[error("UNKNOWN_NODE_KIND: template node <{0}> is not understood")]
  UnknownNodeKind(String),

  #[error("UNKNOWN_FIELD: class '{class}' has no field '{field}'")]
  UnknownField { class: String, field: String },

  #[error("UNKNOWN_METHOD: class '{class}' has no method '{method}'")]
  UnknownMethod { class: String, method: String },

  #[error("NO_CLASS_TEMPLATE: no template found for class '{class}'{}", tag_suffix(.tag))]
  NoClassTemplate { class: String, tag: Option<String> },

  #[error("MALFORMED_PATH: field path '{0}' has an empty segment")]
  MalformedPath(String),

  #[error("MALFORMED_LOCALE: '{0}' is not a valid BCP 47 locale tag")]
  MalformedLocale(String),

  // Domain access errors
  #[error("DOMAIN_ACCESS: reading '{field}' on class '{class}' failed: {reason} (the template may not match this version of the domain model)")]
  DomainAccess {
    class: String,
    field: String,
    reason: String,
  },

  // Document errors
  #[error("TEMPLATE_PARSE: {path}: {reason}")]
  TemplateParse { path: PathBuf, reason: String },

  #[error("MODEL_PARSE: {0}")]
  ModelParse(String),

  #[error("IO_ERROR: {0}")]
  Io(#[from] std::io::Error),
}

impl DumpError {
  pub(crate) fn missing(node: &str, attribute: &str) -> Self {
    Self::MissingAttribute {
      node: node.to_string(),
      attribute: attribute.to_string(),
    }
  }

  pub(crate) fn invalid(node: &str, attribute: &str, value: &str, reason: impl Into<String>) -> Self {
    Self::InvalidAttributeValue {
      node: node.to_string(),
      attribute: attribute.to_string(),
      value: value.to_string(),
      reason: reason.into(),
    }
  }

  /// True for errors caused by a template that does not fit the domain model
  /// or is itself incomplete.
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      Self::MissingAttribute { .. }
        | Self::InvalidAttributeValue { .. }
        | Self::UnknownNodeKind(_)
        | Self::UnknownField { .. }
        | Self::UnknownMethod { .. }
        | Self::NoClassTemplate { .. }
        | Self::MalformedPath(_)
        | Self::MalformedLocale(_)
    )
  }
}

/// What an [`crate::ObjectAccessor`] reports when it cannot answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
  /// The name is not part of the class's declared surface.
  #[error("unknown member '{0}'")]
  Unknown(String),

  /// The member exists but reading it failed.
  #[error("{0}")]
  Failed(String),
}

fn tag_suffix(tag: &Option<String>) -> String {
  tag.as_deref().map(|t| format!(" with tag '{t}'")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, DumpError>;

//! Domain object contract
//!
//! The dumper never sees concrete domain types. Everything it knows about an
//! object comes through [`ObjectAccessor`], which is read-only and must keep
//! object identity stable for the duration of a run.

use core::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AccessError;

/// Numeric handle of a domain object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub u64);

impl fmt::Display for ObjRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A span of text with its own locale and optional named style.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Run {
  pub text: String,
  pub ws: Option<String>,
  pub style: Option<String>,
}

impl Run {
  pub fn new(text: impl Into<String>) -> Self {
    Self { text: text.into(), ws: None, style: None }
  }

  pub fn in_ws(mut self, ws: impl Into<String>) -> Self {
    self.ws = Some(ws.into());
    self
  }

  pub fn styled(mut self, style: impl Into<String>) -> Self {
    self.style = Some(style.into());
    self
  }
}

/// Formatted string: a sequence of runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TsString {
  pub runs: Vec<Run>,
}

impl TsString {
  pub fn plain(text: impl Into<String>) -> Self {
    Self { runs: vec![Run::new(text)] }
  }

  pub fn from_runs(runs: Vec<Run>) -> Self {
    Self { runs }
  }

  /// Concatenated text of all runs.
  pub fn text(&self) -> String {
    self.runs.iter().map(|r| r.text.as_str()).collect()
  }

  pub fn is_empty(&self) -> bool {
    self.runs.iter().all(|r| r.text.is_empty())
  }

  /// True when no run carries a style or a locale other than `ws`, so the
  /// string can be written as bare text.
  pub fn is_plain_in(&self, ws: &str) -> bool {
    self
      .runs
      .iter()
      .all(|r| r.style.is_none() && r.ws.as_deref().map_or(true, |w| w == ws))
  }
}

impl From<&str> for TsString {
  fn from(s: &str) -> Self {
    Self::plain(s)
  }
}

/// Zero or more `(locale, text)` alternatives, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocaleStrings {
  alternatives: Vec<(String, TsString)>,
}

impl LocaleStrings {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, ws: impl Into<String>, text: impl Into<TsString>) -> Self {
    self.set(ws, text);
    self
  }

  /// Sets or replaces the alternative for `ws`.
  pub fn set(&mut self, ws: impl Into<String>, text: impl Into<TsString>) {
    let ws = ws.into();
    let text = text.into();
    match self.alternatives.iter_mut().find(|(w, _)| *w == ws) {
      Some(slot) => slot.1 = text,
      None => self.alternatives.push((ws, text)),
    }
  }

  /// The alternative for `ws`, only if it actually has text.
  pub fn get(&self, ws: &str) -> Option<&TsString> {
    self
      .alternatives
      .iter()
      .find(|(w, t)| w == ws && !t.is_empty())
      .map(|(_, t)| t)
  }

  /// Alternatives that have text.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &TsString)> {
    self
      .alternatives
      .iter()
      .filter(|(_, t)| !t.is_empty())
      .map(|(w, t)| (w.as_str(), t))
  }

  /// First of `candidates` that has text.
  pub fn best<'a, 'c>(&'a self, candidates: &'c [String]) -> Option<(&'c str, &'a TsString)> {
    candidates
      .iter()
      .find_map(|ws| self.get(ws).map(|t| (ws.as_str(), t)))
  }

  pub fn is_empty(&self) -> bool {
    self.iter().next().is_none()
  }
}

/// A resolved field or method value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  /// No value. Not an error.
  Null,
  Bool(bool),
  Int(i64),
  Text(String),
  Formatted(TsString),
  Strings(LocaleStrings),
  Time(DateTime<Utc>),
  Guid(Uuid),
  Object(Option<ObjRef>),
  Sequence(Vec<ObjRef>),
}

impl Value {
  /// Absent references, empty collections and empty text all count as null.
  pub fn is_null(&self) -> bool {
    match self {
      Self::Null | Self::Object(None) => true,
      Self::Text(s) => s.is_empty(),
      Self::Formatted(t) => t.is_empty(),
      Self::Strings(s) => s.is_empty(),
      Self::Sequence(v) => v.is_empty(),
      _ => false,
    }
  }

  /// Object references held by the value, in order.
  pub fn objects(&self) -> Vec<ObjRef> {
    match self {
      Self::Object(Some(o)) => vec![*o],
      Self::Sequence(v) => v.clone(),
      _ => Vec::new(),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
  Integer,
  Boolean,
  Time,
  Guid,
  /// Plain unicode string.
  String,
  /// Single formatted string.
  FormattedString,
  /// One formatted string per locale.
  MultiString,
  ReferenceAtomic,
  ReferenceSequence,
  OwningAtomic,
  OwningSequence,
}

impl FieldKind {
  pub fn is_multi_locale(self) -> bool {
    matches!(self, Self::MultiString)
  }

  pub fn is_simple_string(self) -> bool {
    matches!(self, Self::String | Self::FormattedString)
  }
}

impl core::str::FromStr for FieldKind {
  type Err = AccessError;
  fn from_str(s: &str) -> Result<Self, AccessError> {
    Ok(match s {
      "integer" => Self::Integer,
      "boolean" => Self::Boolean,
      "time" => Self::Time,
      "guid" => Self::Guid,
      "string" => Self::String,
      "formatted" => Self::FormattedString,
      "multistring" => Self::MultiString,
      "refatomic" => Self::ReferenceAtomic,
      "refsequence" => Self::ReferenceSequence,
      "ownatomic" => Self::OwningAtomic,
      "ownsequence" => Self::OwningSequence,
      other => return Err(AccessError::Unknown(other.to_string())),
    })
  }
}

/// An entry in a class's declared field catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
  pub id: u32,
  pub name: String,
  pub kind: FieldKind,
}

/// A field attached to a class outside its built-in schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomField {
  pub id: u32,
  pub class: String,
  pub name: String,
  pub label: String,
  pub kind: FieldKind,
}

/// The two generic locale intents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WsKind {
  Analysis,
  Vernacular,
}

/// Read-only access to the domain graph.
pub trait ObjectAccessor {
  fn class_name(&self, obj: ObjRef) -> String;

  /// Immediate base class, `None` at the root of the hierarchy.
  fn base_class(&self, class: &str) -> Option<String>;

  fn guid(&self, obj: ObjRef) -> Uuid;

  fn owner(&self, obj: ObjRef) -> Option<ObjRef>;

  /// Position of `obj` within the owning field of its owner.
  fn index_in_owner(&self, obj: ObjRef) -> Option<usize>;

  /// Looks `name` up in the declared field catalog of `class` (inherited
  /// fields included).
  fn declared_field(&self, class: &str, name: &str) -> Option<FieldDescriptor>;

  fn read_field(&self, obj: ObjRef, field: &FieldDescriptor) -> Result<Value, AccessError>;

  /// Every custom field in the model. Scanned once per run.
  fn custom_fields(&self) -> Vec<CustomField>;

  fn read_custom(&self, obj: ObjRef, field: &CustomField) -> Result<Value, AccessError>;

  /// Invokes a named method with an optional single string argument.
  fn invoke(&self, obj: ObjRef, method: &str, arg: Option<&str>) -> Result<Value, AccessError>;

  /// Loads a derived relation that has no stored field. `open` lists the
  /// reference targets currently being rendered, innermost last.
  fn virtual_references(
    &self,
    obj: ObjRef,
    field: &str,
    open: &[ObjRef],
  ) -> Result<Vec<ObjRef>, AccessError>;

  /// Locales in preference order for a generic intent.
  fn writing_systems(&self, kind: WsKind) -> Vec<String>;

  /// Path of the file an object stands for, if it is an external file.
  fn external_file(&self, _obj: ObjRef) -> Option<PathBuf> {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_alternatives_are_not_data() {
    let s = LocaleStrings::new().with("en", "foo").with("fr", "");
    assert_eq!(s.iter().map(|(w, _)| w).collect::<Vec<_>>(), vec!["en"]);
    assert!(s.get("fr").is_none());
    assert!(!s.is_empty());
  }

  #[test]
  fn best_takes_first_candidate_with_text() {
    let s = LocaleStrings::new().with("en", "").with("fr", "chat");
    let cands = vec!["en".to_string(), "fr".to_string()];
    assert_eq!(s.best(&cands).map(|(w, t)| (w, t.text())), Some(("fr", "chat".to_string())));
  }

  #[test]
  fn plain_detection() {
    let t = TsString::from_runs(vec![Run::new("a").in_ws("en"), Run::new("b")]);
    assert!(t.is_plain_in("en"));
    assert!(!t.is_plain_in("fr"));
    let t = TsString::from_runs(vec![Run::new("a").styled("Emphasis")]);
    assert!(!t.is_plain_in("en"));
  }

  #[test]
  fn null_values() {
    assert!(Value::Object(None).is_null());
    assert!(Value::Sequence(vec![]).is_null());
    assert!(!Value::Int(0).is_null());
    assert_eq!(Value::Sequence(vec![ObjRef(1), ObjRef(2)]).objects().len(), 2);
  }
}

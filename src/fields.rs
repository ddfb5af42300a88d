//! Field and method resolution
//!
//! A name on a template node is resolved in three tiers: pseudo-properties
//! every object has, custom fields of the object's class, then the declared
//! field catalog. Lookups against the catalogs are cached for the lifetime of
//! the resolver, which is one run.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Local, Utc};
use itertools::Itertools;
use log::{debug, trace};
use xmltree::Element;

use crate::{
  error::{AccessError, DumpError, Result},
  model::{CustomField, FieldDescriptor, ObjRef, ObjectAccessor, Value},
  template::NodeAttrs,
  DateFormat, IdStyle, OutputFormat,
};

pub const PATH_SEPARATOR: char = '/';

/// Dates before this year are written as stored.
const LOCAL_TIME_CUTOFF_YEAR: i32 = 1900;

pub struct FieldResolver {
  id_style: IdStyle,
  custom: Option<HashMap<String, Vec<CustomField>>>,
  custom_by_name: HashMap<(String, String), Option<CustomField>>,
  declared: HashMap<(String, String), Option<FieldDescriptor>>,
}

impl FieldResolver {
  pub fn new(id_style: IdStyle) -> Self {
    Self {
      id_style,
      custom: None,
      custom_by_name: HashMap::new(),
      declared: HashMap::new(),
    }
  }

  fn pseudo(&self, accessor: &dyn ObjectAccessor, obj: ObjRef, name: &str) -> Option<Value> {
    Some(match name {
      "Id" => self.identity(accessor, obj),
      "Hvo" => Value::Int(obj.0 as i64),
      "Guid" => Value::Guid(accessor.guid(obj)),
      "Owner" => Value::Object(accessor.owner(obj)),
      "IndexInOwner" => accessor
        .index_in_owner(obj)
        .map_or(Value::Null, |i| Value::Int(i as i64)),
      "ClassName" => Value::Text(accessor.class_name(obj)),
      _ => return None,
    })
  }

  fn identity(&self, accessor: &dyn ObjectAccessor, obj: ObjRef) -> Value {
    match self.id_style {
      IdStyle::Numeric => Value::Int(obj.0 as i64),
      IdStyle::Guid => Value::Guid(accessor.guid(obj)),
    }
  }

  fn custom_index(&mut self, accessor: &dyn ObjectAccessor) -> &HashMap<String, Vec<CustomField>> {
    self.custom.get_or_insert_with(|| {
      let fields = accessor.custom_fields();
      debug!("Found {} custom fields", fields.len());
      fields.into_iter().into_group_map_by(|f| f.class.clone())
    })
  }

  /// Custom fields declared on `class` or any of its base classes.
  pub fn custom_fields_of(&mut self, accessor: &dyn ObjectAccessor, class: &str) -> Vec<CustomField> {
    let chain = class_chain(accessor, class);
    let index = self.custom_index(accessor);
    chain
      .iter()
      .filter_map(|c| index.get(c))
      .flatten()
      .cloned()
      .collect()
  }

  fn custom_field(&mut self, accessor: &dyn ObjectAccessor, class: &str, name: &str) -> Option<CustomField> {
    let key = (class.to_string(), name.to_string());
    if let Some(hit) = self.custom_by_name.get(&key) {
      return hit.clone();
    }
    let found = self
      .custom_fields_of(accessor, class)
      .into_iter()
      .find(|f| f.name == name);
    self.custom_by_name.insert(key, found.clone());
    found
  }

  fn declared_field(&mut self, accessor: &dyn ObjectAccessor, class: &str, name: &str) -> Option<FieldDescriptor> {
    self
      .declared
      .entry((class.to_string(), name.to_string()))
      .or_insert_with(|| accessor.declared_field(class, name))
      .clone()
  }

  /// Resolves a single field name on `obj`.
  pub fn field(&mut self, accessor: &dyn ObjectAccessor, obj: ObjRef, name: &str) -> Result<Value> {
    if let Some(v) = self.pseudo(accessor, obj, name) {
      return Ok(v);
    }
    let class = accessor.class_name(obj);
    if let Some(cf) = self.custom_field(accessor, &class, name) {
      trace!("'{}' on {} is custom field {}", name, class, cf.id);
      return accessor
        .read_custom(obj, &cf)
        .map_err(|e| field_error(&class, name, e));
    }
    match self.declared_field(accessor, &class, name) {
      Some(fd) => accessor
        .read_field(obj, &fd)
        .map_err(|e| field_error(&class, name, e)),
      None => Err(DumpError::UnknownField {
        class,
        field: name.to_string(),
      }),
    }
  }

  /// Resolves a `a/b/c` path. Every segment but the last must be an atomic
  /// reference; an absent one ends the walk with [`Value::Null`].
  pub fn path(&mut self, accessor: &dyn ObjectAccessor, obj: ObjRef, path: &str) -> Result<Value> {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
      return Err(DumpError::MalformedPath(path.to_string()));
    }
    let (last, init) = match segments.split_last() {
      Some(split) => split,
      None => return Err(DumpError::MalformedPath(path.to_string())),
    };
    let mut current = obj;
    for segment in init {
      match self.field(accessor, current, segment)? {
        Value::Object(Some(next)) => current = next,
        Value::Null | Value::Object(None) => return Ok(Value::Null),
        _ => {
          return Err(DumpError::DomainAccess {
            class: accessor.class_name(current),
            field: segment.to_string(),
            reason: format!("path '{path}' goes through a field that is not an atomic reference"),
          })
        }
      }
    }
    self.field(accessor, current, last)
  }

  pub fn method(&mut self, accessor: &dyn ObjectAccessor, obj: ObjRef, name: &str, arg: Option<&str>) -> Result<Value> {
    accessor.invoke(obj, name, arg).map_err(|e| match e {
      AccessError::Unknown(_) => DumpError::UnknownMethod {
        class: accessor.class_name(obj),
        method: name.to_string(),
      },
      AccessError::Failed(reason) => DumpError::DomainAccess {
        class: accessor.class_name(obj),
        field: name.to_string(),
        reason,
      },
    })
  }

  /// Value named by a node's `simpleProperty` or `method` attribute.
  pub fn source(&mut self, accessor: &dyn ObjectAccessor, obj: ObjRef, node: &Element) -> Result<Value> {
    match node.one_of(&["simpleProperty", "method"])? {
      ("method", name) => self.method(accessor, obj, name, node.attr("arg")),
      (_, path) => self.path(accessor, obj, path),
    }
  }

  /// Text form of a scalar value, `None` when there is nothing to write.
  pub fn display(&self, accessor: &dyn ObjectAccessor, value: &Value, format: OutputFormat) -> Option<String> {
    if value.is_null() {
      return None;
    }
    Some(match value {
      Value::Bool(b) => format_bool(*b, format),
      Value::Int(i) => i.to_string(),
      Value::Text(s) => s.clone(),
      Value::Formatted(t) => t.text(),
      Value::Time(t) => format_date(t, DateFormat::default()),
      Value::Guid(g) => g.hyphenated().to_string(),
      Value::Object(Some(o)) => self.reference(accessor, *o),
      Value::Sequence(v) => v.iter().map(|o| self.reference(accessor, *o)).join(" "),
      Value::Strings(_) | Value::Null | Value::Object(None) => return None,
    })
  }

  /// Identity of a referenced object as written in cross-reference markers.
  pub fn reference(&self, accessor: &dyn ObjectAccessor, obj: ObjRef) -> String {
    match self.id_style {
      IdStyle::Numeric => obj.to_string(),
      IdStyle::Guid => accessor.guid(obj).hyphenated().to_string(),
    }
  }
}

fn field_error(class: &str, field: &str, e: AccessError) -> DumpError {
  match e {
    AccessError::Unknown(_) => DumpError::UnknownField {
      class: class.to_string(),
      field: field.to_string(),
    },
    AccessError::Failed(reason) => DumpError::DomainAccess {
      class: class.to_string(),
      field: field.to_string(),
      reason,
    },
  }
}

/// `class` followed by its base classes, nearest first.
pub fn class_chain(accessor: &dyn ObjectAccessor, class: &str) -> Vec<String> {
  let mut chain = vec![class.to_string()];
  while let Some(base) = chain.last().and_then(|c| accessor.base_class(c)) {
    if chain.contains(&base) {
      break;
    }
    chain.push(base);
  }
  chain
}

pub fn format_bool(b: bool, format: OutputFormat) -> String {
  match (format, b) {
    (OutputFormat::Xml, true) => "true".into(),
    (OutputFormat::Xml, false) => "false".into(),
    (OutputFormat::Sf, true) => "1".into(),
    (OutputFormat::Sf, false) => "0".into(),
  }
}

/// Formats an instant in local time, unless it is too early for a reliable
/// conversion.
pub fn format_date(t: &DateTime<Utc>, format: DateFormat) -> String {
  if t.year() < LOCAL_TIME_CUTOFF_YEAR {
    t.format(format.pattern()).to_string()
  } else {
    t.with_timezone(&Local).format(format.pattern()).to_string()
  }
}

/// Integer view of a value for numeric tests. Absent values count as zero.
pub fn as_int(value: &Value) -> Option<i64> {
  match value {
    Value::Int(i) => Some(*i),
    Value::Bool(b) => Some(*b as i64),
    Value::Null | Value::Object(None) => Some(0),
    Value::Text(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Size of a value for length tests.
pub fn length(value: &Value) -> usize {
  match value {
    Value::Null | Value::Object(None) => 0,
    Value::Object(Some(_)) => 1,
    Value::Sequence(v) => v.len(),
    Value::Strings(s) => s.iter().count(),
    Value::Text(s) => s.chars().count(),
    Value::Formatted(t) => t.text().chars().count(),
    _ => 1,
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::Cell, path::PathBuf};

  use chrono::TimeZone;
  use uuid::Uuid;

  use super::*;
  use crate::{
    memory::MemoryModel,
    model::{FieldKind, WsKind},
    LocaleStrings,
  };

  /// Counts how often the class hierarchy is walked.
  struct Counting<'m> {
    inner: &'m MemoryModel,
    base_lookups: Cell<usize>,
  }

  impl<'m> ObjectAccessor for Counting<'m> {
    fn class_name(&self, obj: ObjRef) -> String {
      self.inner.class_name(obj)
    }
    fn base_class(&self, class: &str) -> Option<String> {
      self.base_lookups.set(self.base_lookups.get() + 1);
      self.inner.base_class(class)
    }
    fn guid(&self, obj: ObjRef) -> Uuid {
      self.inner.guid(obj)
    }
    fn owner(&self, obj: ObjRef) -> Option<ObjRef> {
      self.inner.owner(obj)
    }
    fn index_in_owner(&self, obj: ObjRef) -> Option<usize> {
      self.inner.index_in_owner(obj)
    }
    fn declared_field(&self, class: &str, name: &str) -> Option<FieldDescriptor> {
      self.inner.declared_field(class, name)
    }
    fn read_field(&self, obj: ObjRef, field: &FieldDescriptor) -> std::result::Result<Value, AccessError> {
      self.inner.read_field(obj, field)
    }
    fn custom_fields(&self) -> Vec<CustomField> {
      self.inner.custom_fields()
    }
    fn read_custom(&self, obj: ObjRef, field: &CustomField) -> std::result::Result<Value, AccessError> {
      self.inner.read_custom(obj, field)
    }
    fn invoke(&self, obj: ObjRef, method: &str, arg: Option<&str>) -> std::result::Result<Value, AccessError> {
      self.inner.invoke(obj, method, arg)
    }
    fn virtual_references(&self, obj: ObjRef, field: &str, open: &[ObjRef]) -> std::result::Result<Vec<ObjRef>, AccessError> {
      self.inner.virtual_references(obj, field, open)
    }
    fn writing_systems(&self, kind: WsKind) -> Vec<String> {
      self.inner.writing_systems(kind)
    }
    fn external_file(&self, obj: ObjRef) -> Option<PathBuf> {
      self.inner.external_file(obj)
    }
  }

  fn model() -> (MemoryModel, ObjRef, ObjRef) {
    let mut m = MemoryModel::new();
    m.add_class("LexEntry", None);
    m.add_field("LexEntry", "Form", FieldKind::String);
    m.add_field("LexEntry", "Sense", FieldKind::OwningAtomic);
    m.add_class("LexSense", None);
    m.add_field("LexSense", "Gloss", FieldKind::MultiString);
    m.add_custom_field("LexEntry", "Note", "My note", FieldKind::String);
    let entry = m.add_object(1, "LexEntry", None);
    let sense = m.add_object(2, "LexSense", Some(entry));
    m.set(entry, "Form", Value::Text("run".into()));
    m.set(entry, "Sense", Value::Object(Some(sense)));
    m.set(entry, "Note", Value::Text("noted".into()));
    m.set(sense, "Gloss", Value::Strings(LocaleStrings::new().with("en", "to run")));
    (m, entry, sense)
  }

  #[test]
  fn three_tiers() {
    let (m, entry, sense) = model();
    let mut r = FieldResolver::new(IdStyle::Numeric);
    assert_eq!(r.field(&m, entry, "Id").unwrap(), Value::Int(1));
    assert_eq!(r.field(&m, sense, "Owner").unwrap(), Value::Object(Some(entry)));
    assert_eq!(r.field(&m, entry, "Note").unwrap(), Value::Text("noted".into()));
    assert_eq!(r.field(&m, entry, "Form").unwrap(), Value::Text("run".into()));
    assert!(matches!(
      r.field(&m, entry, "Bogus"),
      Err(DumpError::UnknownField { class, field }) if class == "LexEntry" && field == "Bogus"
    ));
  }

  #[test]
  fn custom_field_lookups_are_cached_per_class_and_name() {
    let (m, entry, _) = model();
    let counting = Counting { inner: &m, base_lookups: Cell::new(0) };
    let mut r = FieldResolver::new(IdStyle::Numeric);
    for _ in 0..3 {
      assert_eq!(r.field(&counting, entry, "Form").unwrap(), Value::Text("run".into()));
      assert_eq!(r.field(&counting, entry, "Note").unwrap(), Value::Text("noted".into()));
    }
    assert_eq!(counting.base_lookups.get(), 2);
  }

  #[test]
  fn paths_follow_atomic_references() {
    let (m, entry, _) = model();
    let mut r = FieldResolver::new(IdStyle::Numeric);
    let gloss = r.path(&m, entry, "Sense/Gloss").unwrap();
    assert!(matches!(gloss, Value::Strings(_)));
    assert!(matches!(r.path(&m, entry, "Sense//Gloss"), Err(DumpError::MalformedPath(_))));
    assert!(matches!(r.path(&m, entry, "Form/Gloss"), Err(DumpError::DomainAccess { .. })));
  }

  #[test]
  fn absent_intermediate_is_null() {
    let (mut m, entry, _) = model();
    m.set(entry, "Sense", Value::Object(None));
    let mut r = FieldResolver::new(IdStyle::Numeric);
    assert_eq!(r.path(&m, entry, "Sense/Gloss").unwrap(), Value::Null);
  }

  #[test]
  fn unknown_method() {
    let (m, entry, _) = model();
    let mut r = FieldResolver::new(IdStyle::Numeric);
    assert!(matches!(r.method(&m, entry, "Nope", None), Err(DumpError::UnknownMethod { .. })));
  }

  #[test]
  fn guid_identity() {
    let (m, entry, _) = model();
    let r = FieldResolver::new(IdStyle::Guid);
    let id = r.reference(&m, entry);
    assert!(Uuid::parse_str(&id).is_ok());
    assert_eq!(id, m.guid(entry).hyphenated().to_string());
  }

  #[test]
  fn scalar_display() {
    let (m, _, _) = model();
    let r = FieldResolver::new(IdStyle::Numeric);
    assert_eq!(r.display(&m, &Value::Bool(true), OutputFormat::Sf).as_deref(), Some("1"));
    assert_eq!(r.display(&m, &Value::Bool(false), OutputFormat::Xml).as_deref(), Some("false"));
    assert_eq!(
      r.display(&m, &Value::Sequence(vec![ObjRef(3), ObjRef(4)]), OutputFormat::Xml).as_deref(),
      Some("3 4")
    );
    assert_eq!(r.display(&m, &Value::Text(String::new()), OutputFormat::Xml), None);
  }

  #[test]
  fn early_dates_are_not_converted() {
    let t = Utc.with_ymd_and_hms(1850, 3, 7, 12, 0, 0).unwrap();
    assert_eq!(format_date(&t, DateFormat::Iso), "1850-03-07");
    assert_eq!(format_date(&t, DateFormat::DayMonthYear), "07/Mar/1850");
  }

  #[test]
  fn lengths_and_ints() {
    assert_eq!(length(&Value::Sequence(vec![ObjRef(1), ObjRef(2)])), 2);
    assert_eq!(length(&Value::Object(None)), 0);
    assert_eq!(as_int(&Value::Null), Some(0));
    assert_eq!(as_int(&Value::Text("x".into())), None);
  }
}

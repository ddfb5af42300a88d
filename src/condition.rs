//! Conditional node tests
//!
//! Tests run in a fixed order and stop at the first failure: test variables,
//! integer equality, length equality, string equality, then the null test of
//! `ifnull`/`ifnotnull`. A node is satisfied only when every test it carries
//! passes.

use std::collections::HashMap;

use log::trace;
use xmltree::Element;

use crate::{
  error::{DumpError, Result},
  fields::{as_int, length, FieldResolver},
  langtags::WsSelector,
  model::{ObjRef, ObjectAccessor, Value},
  template::{NodeAttrs, NodeKind},
  OutputFormat,
};

pub struct Conditions<'r> {
  pub accessor: &'r dyn ObjectAccessor,
  pub resolver: &'r mut FieldResolver,
  pub variables: &'r HashMap<String, bool>,
}

impl<'r> Conditions<'r> {
  /// Whether the children of a conditional node of `kind` are rendered.
  pub fn passes(&mut self, kind: NodeKind, node: &Element, obj: ObjRef) -> Result<bool> {
    validate(kind, node)?;
    let satisfied = self.satisfied(kind, node, obj)?;
    trace!("<{}> on {} satisfied: {}", kind, obj, satisfied);
    Ok(match kind {
      NodeKind::IfNot | NodeKind::IfNotNull => !satisfied,
      _ => satisfied,
    })
  }

  fn variable(&self, name: &str) -> bool {
    self.variables.get(name.trim()).copied().unwrap_or(false)
  }

  fn satisfied(&mut self, kind: NodeKind, node: &Element, obj: ObjRef) -> Result<bool> {
    if let Some(name) = node.attr("variableistrue") {
      if !self.variable(name) {
        return Ok(false);
      }
    }
    if let Some(name) = node.attr("variableisfalse") {
      if self.variable(name) {
        return Ok(false);
      }
    }

    let null_test = matches!(kind, NodeKind::IfNull | NodeKind::IfNotNull);
    let field_tests = ["intequals", "lengthequals", "stringequals"]
      .iter()
      .any(|a| node.attr(a).is_some());
    if !field_tests && !null_test {
      return Ok(true);
    }
    let value = self.resolver.path(self.accessor, obj, node.required("field")?)?;

    if let Some(expected) = node.parsed::<i64>("intequals")? {
      if as_int(&value) != Some(expected) {
        return Ok(false);
      }
    }
    if let Some(expected) = node.parsed::<usize>("lengthequals")? {
      if length(&value) != expected {
        return Ok(false);
      }
    }
    if let Some(expected) = node.attr("stringequals") {
      if self.string_of(&value, node.attr("ws"))? != expected {
        return Ok(false);
      }
    }
    if null_test && !value.is_null() {
      return Ok(false);
    }
    Ok(true)
  }

  fn string_of(&self, value: &Value, ws: Option<&str>) -> Result<String> {
    Ok(match value {
      Value::Strings(strings) => {
        let picked = match ws {
          Some(ws) => WsSelector::parse(ws)?
            .select(strings, self.accessor)
            .into_iter()
            .next()
            .map(|(_, t)| t.text()),
          None => strings.iter().next().map(|(_, t)| t.text()),
        };
        picked.unwrap_or_default()
      }
      other => self
        .resolver
        .display(self.accessor, other, OutputFormat::Xml)
        .unwrap_or_default(),
    })
  }
}

/// Checks that a conditional node carries a field when its tests need one.
pub fn validate(kind: NodeKind, node: &Element) -> Result<()> {
  let needs_field = matches!(kind, NodeKind::IfNull | NodeKind::IfNotNull)
    || ["intequals", "lengthequals", "stringequals"]
      .iter()
      .any(|a| node.attr(a).is_some());
  if needs_field && node.attr("field").is_none() {
    return Err(DumpError::missing(&node.name, "field"));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{memory::MemoryModel, model::FieldKind, IdStyle, LocaleStrings};

  fn setup() -> (MemoryModel, ObjRef) {
    let mut m = MemoryModel::new();
    m.add_class("LexEntry", None);
    m.add_field("LexEntry", "Homograph", FieldKind::Integer);
    m.add_field("LexEntry", "Citation", FieldKind::MultiString);
    m.add_field("LexEntry", "Senses", FieldKind::OwningSequence);
    m.add_field("LexEntry", "Etymology", FieldKind::OwningAtomic);
    let e = m.add_object(1, "LexEntry", None);
    m.set(e, "Homograph", Value::Int(2));
    m.set(e, "Citation", Value::Strings(LocaleStrings::new().with("fr", "chat")));
    m.set(e, "Senses", Value::Sequence(vec![ObjRef(7), ObjRef(8)]));
    (m, e)
  }

  fn node(xml: &str) -> Element {
    Element::parse(xml.as_bytes()).unwrap()
  }

  fn check(m: &MemoryModel, e: ObjRef, vars: &HashMap<String, bool>, xml: &str) -> Result<bool> {
    let el = node(xml);
    let kind = NodeKind::of(&el)?;
    let mut resolver = FieldResolver::new(IdStyle::Numeric);
    let mut c = Conditions { accessor: m, resolver: &mut resolver, variables: vars };
    c.passes(kind, &el, e)
  }

  #[test]
  fn conjunction_of_int_and_string_tests() {
    let (m, e) = setup();
    let vars = HashMap::new();
    assert!(check(&m, e, &vars, r#"<if field="Homograph" intequals="2"/>"#).unwrap());
    assert!(check(&m, e, &vars, r#"<if field="Citation" stringequals="chat" ws="fr"/>"#).unwrap());
    assert!(!check(&m, e, &vars, r#"<if field="Homograph" intequals="3"/>"#).unwrap());
    assert!(!check(&m, e, &vars, r#"<if field="Citation" stringequals="dog"/>"#).unwrap());
  }

  #[test]
  fn negated_forms() {
    let (m, e) = setup();
    let vars = HashMap::new();
    assert!(check(&m, e, &vars, r#"<ifnot field="Senses" lengthequals="3"/>"#).unwrap());
    assert!(check(&m, e, &vars, r#"<ifnull field="Etymology"/>"#).unwrap());
    assert!(!check(&m, e, &vars, r#"<ifnotnull field="Etymology"/>"#).unwrap());
    assert!(check(&m, e, &vars, r#"<ifnotnull field="Senses"/>"#).unwrap());
  }

  #[test]
  fn variables_default_to_false() {
    let (m, e) = setup();
    let mut vars = HashMap::new();
    assert!(!check(&m, e, &vars, r#"<if variableistrue="Full"/>"#).unwrap());
    assert!(check(&m, e, &vars, r#"<if variableisfalse="Full"/>"#).unwrap());
    vars.insert("Full".to_string(), true);
    assert!(check(&m, e, &vars, r#"<if variableistrue="Full"/>"#).unwrap());
  }

  #[test]
  fn null_test_needs_a_field() {
    let (m, e) = setup();
    let vars = HashMap::new();
    assert!(matches!(
      check(&m, e, &vars, r#"<ifnull/>"#),
      Err(DumpError::MissingAttribute { attribute, .. }) if attribute == "field"
    ));
    assert!(validate(NodeKind::IfNull, &node("<ifnull/>")).is_err());
    assert!(validate(NodeKind::If, &node(r#"<if variableistrue="x"/>"#)).is_ok());
  }
}

//! `Template` documents
//!
//! A template is an XML document whose root is `<template>`. Header
//! attributes on the root carry run-wide defaults; `<class>` children
//! declare per-class templates; an optional `<auxiliary>` child names a
//! second template rendered into a second output.
//!
//! Node attributes are not checked when the document is loaded. Each node is
//! checked the first time it is evaluated and a missing mandatory attribute
//! aborts the run.

use core::{fmt, str::FromStr};
use std::{
  collections::HashMap,
  fs,
  path::{Path, PathBuf},
  rc::Rc,
};

use log::debug;
use xmltree::{Element, XMLNode};

use crate::{
  element_builder::NodeBuilder,
  error::{DumpError, Result},
  parse_flag,
  utils::substitute_placeholders,
  IdStyle, Normalization, OutputFormat, RunStyle, WsLabel,
};

pub const ROOT_TAG: &str = "template";
pub const CLASS_TAG: &str = "class";
pub const AUXILIARY_TAG: &str = "auxiliary";

/// Kinds of template node that may appear inside a class template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
  Element,
  Attribute,
  AttributeIndirect,
  DateAttribute,
  Call,
  If,
  IfNot,
  IfNull,
  IfNotNull,
  MultilingualString,
  String,
  Number,
  Boolean,
  RefAtomic,
  RefVector,
  RefObjVector,
  ObjAtomic,
  ObjVector,
  Group,
  GenerateCustom,
  Lit,
  Comment,
  Progress,
}

impl NodeKind {
  pub fn tag(self) -> &'static str {
    match self {
      Self::Element => "element",
      Self::Attribute => "attribute",
      Self::AttributeIndirect => "attributeIndirect",
      Self::DateAttribute => "dateAttribute",
      Self::Call => "call",
      Self::If => "if",
      Self::IfNot => "ifnot",
      Self::IfNull => "ifnull",
      Self::IfNotNull => "ifnotnull",
      Self::MultilingualString => "multilingualStringElement",
      Self::String => "stringElement",
      Self::Number => "numberElement",
      Self::Boolean => "booleanElement",
      Self::RefAtomic => "refAtomic",
      Self::RefVector => "refVector",
      Self::RefObjVector => "refObjVector",
      Self::ObjAtomic => "objAtomic",
      Self::ObjVector => "objVector",
      Self::Group => "group",
      Self::GenerateCustom => "generateCustom",
      Self::Lit => "lit",
      Self::Comment => "comment",
      Self::Progress => "progress",
    }
  }

  /// Attribute-like nodes are collected by their parent element instead of
  /// being streamed.
  pub fn is_attribute(self) -> bool {
    matches!(self, Self::Attribute | Self::AttributeIndirect | Self::DateAttribute)
  }

  pub fn of(el: &Element) -> Result<Self> {
    el.name.parse()
  }
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

impl FromStr for NodeKind {
  type Err = DumpError;
  fn from_str(s: &str) -> Result<Self> {
    Ok(match s {
      "element" => Self::Element,
      "attribute" => Self::Attribute,
      "attributeIndirect" => Self::AttributeIndirect,
      "dateAttribute" => Self::DateAttribute,
      "call" => Self::Call,
      "if" => Self::If,
      "ifnot" => Self::IfNot,
      "ifnull" => Self::IfNull,
      "ifnotnull" => Self::IfNotNull,
      "multilingualStringElement" => Self::MultilingualString,
      "stringElement" => Self::String,
      "numberElement" => Self::Number,
      "booleanElement" => Self::Boolean,
      "refAtomic" => Self::RefAtomic,
      "refVector" => Self::RefVector,
      "refObjVector" => Self::RefObjVector,
      "objAtomic" => Self::ObjAtomic,
      "objVector" => Self::ObjVector,
      "group" => Self::Group,
      "generateCustom" => Self::GenerateCustom,
      "lit" => Self::Lit,
      "comment" => Self::Comment,
      "progress" => Self::Progress,
      other => return Err(DumpError::UnknownNodeKind(other.to_string())),
    })
  }
}

/// Attribute access on template nodes with configuration errors for
/// missing or malformed values.
pub trait NodeAttrs {
  fn attr(&self, name: &str) -> Option<&str>;

  fn required(&self, name: &str) -> Result<&str>;

  /// The first of `names` that is present, with its name.
  fn one_of<'a>(&'a self, names: &[&'a str]) -> Result<(&'a str, &'a str)>;

  /// Boolean attribute, false when absent.
  fn flag(&self, name: &str) -> Result<bool>;

  fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>>;

  fn element_children(&self) -> Box<dyn Iterator<Item = &Element> + '_>;

  /// Concatenated text children.
  fn text_content(&self) -> String;
}

impl NodeAttrs for Element {
  fn attr(&self, name: &str) -> Option<&str> {
    self.attributes.get(name).map(String::as_str)
  }

  fn required(&self, name: &str) -> Result<&str> {
    self.attr(name).ok_or_else(|| DumpError::missing(&self.name, name))
  }

  fn one_of<'a>(&'a self, names: &[&'a str]) -> Result<(&'a str, &'a str)> {
    names
      .iter()
      .find_map(|n| self.attr(n).map(|v| (*n, v)))
      .ok_or_else(|| DumpError::missing(&self.name, &names.join("|")))
  }

  fn flag(&self, name: &str) -> Result<bool> {
    match self.attr(name) {
      None => Ok(false),
      Some(v) => parse_flag(v).ok_or_else(|| DumpError::invalid(&self.name, name, v, "expected true or false")),
    }
  }

  fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
    match self.attr(name) {
      None => Ok(None),
      Some(v) => v
        .trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| DumpError::invalid(&self.name, name, v, "cannot be parsed")),
    }
  }

  fn element_children(&self) -> Box<dyn Iterator<Item = &Element> + '_> {
    Box::new(self.children.iter().filter_map(|c| match c {
      XMLNode::Element(e) => Some(e),
      _ => None,
    }))
  }

  fn text_content(&self) -> String {
    self
      .children
      .iter()
      .filter_map(|c| match c {
        XMLNode::Text(t) | XMLNode::CData(t) => Some(t.as_str()),
        _ => None,
      })
      .collect()
  }
}

/// Run-wide defaults declared on the `<template>` root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
  pub root_class: Option<String>,
  pub format: Option<OutputFormat>,
  pub normalization: Option<Normalization>,
  pub strict: Option<bool>,
  pub base_class_fallback: Option<bool>,
  pub id_style: Option<IdStyle>,
  pub run_style: Option<RunStyle>,
  pub ws_label: Option<WsLabel>,
}

impl Header {
  fn from_root(root: &Element) -> Result<Self> {
    Ok(Self {
      root_class: root.attr("rootClass").map(str::to_string),
      format: header_option(root, "format")?,
      normalization: header_option(root, "normalization")?,
      strict: header_flag(root, "requireClassTemplatesForEverything")?,
      base_class_fallback: header_flag(root, "doUseBaseClassTemplatesIfNeeded")?,
      id_style: header_option(root, "idStyle")?,
      run_style: header_option(root, "runStyle")?,
      ws_label: header_option(root, "wsLabel")?,
    })
  }
}

fn header_option<T: FromStr<Err = anyhow::Error>>(root: &Element, name: &str) -> Result<Option<T>> {
  root
    .attr(name)
    .map(|v| v.parse::<T>().map_err(|e| DumpError::invalid(ROOT_TAG, name, v, e.to_string())))
    .transpose()
}

fn header_flag(root: &Element, name: &str) -> Result<Option<bool>> {
  root
    .attr(name)
    .map(|v| parse_flag(v).ok_or_else(|| DumpError::invalid(ROOT_TAG, name, v, "expected true or false")))
    .transpose()
}

/// Declaration of a secondary template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Auxiliary {
  pub path: PathBuf,
  pub extension: String,
}

#[derive(Clone, Debug)]
pub struct Template {
  root: Rc<Element>,
  header: Header,
  auxiliary: Option<Auxiliary>,
  source: Option<PathBuf>,
}

impl Template {
  /// Parses a template from a string. Relative auxiliary paths resolve
  /// against the current directory.
  pub fn parse(text: &str) -> Result<Self> {
    Self::from_bytes(text.as_bytes(), None)
  }

  pub fn load(path: &Path) -> Result<Self> {
    debug!("Loading template '{}'", path.display());
    let bytes = fs::read(path)?;
    Self::from_bytes(&bytes, Some(path.to_path_buf()))
  }

  fn from_bytes(bytes: &[u8], source: Option<PathBuf>) -> Result<Self> {
    let parse_error = |reason: String| DumpError::TemplateParse {
      path: source.clone().unwrap_or_else(|| PathBuf::from("<string>")),
      reason,
    };
    let root = Element::parse(bytes).map_err(|e| parse_error(e.to_string()))?;
    if root.name != ROOT_TAG {
      return Err(parse_error(format!("root element is <{}>, expected <{ROOT_TAG}>", root.name)));
    }
    let header = Header::from_root(&root)?;
    let auxiliary = match root.get_child(AUXILIARY_TAG) {
      Some(aux) => Some(Auxiliary {
        path: PathBuf::from(aux.required("path")?),
        extension: aux.required("extension")?.to_string(),
      }),
      None => None,
    };
    Ok(Self {
      root: Rc::new(root),
      header,
      auxiliary,
      source,
    })
  }

  pub fn header(&self) -> &Header {
    &self.header
  }

  pub fn auxiliary(&self) -> Option<&Auxiliary> {
    self.auxiliary.as_ref()
  }

  /// Resolves a path relative to this template's own location.
  pub fn resolve(&self, path: &Path) -> PathBuf {
    match self.source.as_deref().and_then(Path::parent) {
      Some(dir) if path.is_relative() => dir.join(path),
      _ => path.to_path_buf(),
    }
  }

  /// The `<class>` declarations, in document order.
  pub fn classes(&self) -> impl Iterator<Item = &Element> {
    self.root.element_children().filter(|e| e.name == CLASS_TAG)
  }
}

/// Lookup key of a class template: `class` or `class-tag`.
pub fn class_key(class: &str, tag: Option<&str>) -> String {
  match tag {
    Some(t) if !t.is_empty() => format!("{class}-{t}"),
    _ => class.to_string(),
  }
}

/// Returns a new fragment equal to `node` with `${name}` placeholders in
/// attribute values and text replaced from `map`. `node` is not modified.
pub fn substitute(node: &Element, map: &HashMap<&str, String>) -> Element {
  let builder = NodeBuilder::like(node).attrs(
    node
      .attributes
      .iter()
      .map(|(k, v)| (k.clone(), substitute_placeholders(v, map))),
  );
  node
    .children
    .iter()
    .fold(builder, |b, child| match child {
      XMLNode::Element(e) => b.append(XMLNode::Element(substitute(e, map))),
      XMLNode::Text(t) => b.text(substitute_placeholders(t, map)),
      other => b.append(other.clone()),
    })
    .build()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_is_read_from_root() {
    let t = Template::parse(
      r#"<template rootClass="LexDb" format="sf" normalization="nfd"
           requireClassTemplatesForEverything="true" idStyle="guid">
           <class name="LexDb"/>
         </template>"#,
    )
    .unwrap();
    let h = t.header();
    assert_eq!(h.root_class.as_deref(), Some("LexDb"));
    assert_eq!(h.format, Some(OutputFormat::Sf));
    assert_eq!(h.normalization, Some(Normalization::Nfd));
    assert_eq!(h.strict, Some(true));
    assert_eq!(h.base_class_fallback, None);
    assert_eq!(h.id_style, Some(IdStyle::Guid));
    assert_eq!(t.classes().count(), 1);
  }

  #[test]
  fn bad_header_value_is_configuration_error() {
    let err = Template::parse(r#"<template format="pdf"/>"#).unwrap_err();
    assert!(matches!(err, DumpError::InvalidAttributeValue { ref attribute, .. } if attribute == "format"));
  }

  #[test]
  fn wrong_root_is_rejected() {
    assert!(matches!(Template::parse("<fxt/>"), Err(DumpError::TemplateParse { .. })));
    assert!(matches!(Template::parse("<template>"), Err(DumpError::TemplateParse { .. })));
  }

  #[test]
  fn auxiliary_declaration() {
    let t = Template::parse(r#"<template><auxiliary path="ranges.xml" extension="lift-ranges"/></template>"#).unwrap();
    assert_eq!(
      t.auxiliary(),
      Some(&Auxiliary { path: PathBuf::from("ranges.xml"), extension: "lift-ranges".into() })
    );
  }

  #[test]
  fn node_attributes_are_checked_on_demand() {
    let el = Element::parse(r#"<stringElement name="Gloss" writeAsTrait="maybe" count="x"/>"#.as_bytes()).unwrap();
    assert_eq!(el.required("name").unwrap(), "Gloss");
    assert!(matches!(
      el.one_of(&["simpleProperty", "method"]),
      Err(DumpError::MissingAttribute { ref attribute, .. }) if attribute == "simpleProperty|method"
    ));
    assert!(el.flag("writeAsTrait").is_err());
    assert!(el.parsed::<usize>("count").is_err());
    assert_eq!(el.parsed::<usize>("missing").unwrap(), None);
  }

  #[test]
  fn node_kinds() {
    assert_eq!("multilingualStringElement".parse::<NodeKind>().unwrap(), NodeKind::MultilingualString);
    assert!(matches!("table".parse::<NodeKind>(), Err(DumpError::UnknownNodeKind(k)) if k == "table"));
    assert!(NodeKind::DateAttribute.is_attribute());
  }

  #[test]
  fn substitution_leaves_original_untouched() {
    let el = Element::parse(
      r#"<generateCustom><stringElement name="${tag}" simpleProperty="${fieldName}"><lit>${label}</lit></stringElement></generateCustom>"#
        .as_bytes(),
    )
    .unwrap();
    let mut map = HashMap::new();
    map.insert("tag", "cf1".to_string());
    map.insert("fieldName", "Note".to_string());
    map.insert("label", "My note".to_string());
    let out = substitute(&el, &map);
    let s = out.get_child("stringElement").unwrap();
    assert_eq!(s.attr("name"), Some("cf1"));
    assert_eq!(s.attr("simpleProperty"), Some("Note"));
    assert_eq!(s.get_child("lit").unwrap().text_content(), "My note");
    assert_eq!(el.get_child("stringElement").unwrap().attr("name"), Some("${tag}"));
  }

  #[test]
  fn class_keys() {
    assert_eq!(class_key("LexEntry", None), "LexEntry");
    assert_eq!(class_key("LexEntry", Some("")), "LexEntry");
    assert_eq!(class_key("LexEntry", Some("short")), "LexEntry-short");
  }
}

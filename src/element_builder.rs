//! Builder for template fragments
//!
//! Used to produce fresh, independent template subtrees (placeholder
//! substitution for generated custom fields) and to assemble templates in
//! code.

use xmltree::{Element, XMLNode};

pub trait Builder {
  fn builder(name: &str) -> NodeBuilder;
}

impl Builder for Element {
  fn builder(name: &str) -> NodeBuilder {
    NodeBuilder(Element::new(name))
  }
}

pub struct NodeBuilder(Element);

impl NodeBuilder {
  /// Starts a node with the same name as `other` but nothing else.
  pub fn like(other: &Element) -> Self {
    Element::builder(&other.name)
  }

  pub fn text(mut self, text: impl Into<String>) -> Self {
    self.0.children.push(XMLNode::Text(text.into()));
    self
  }

  /// Sets an attribute. Declaration order is kept.
  pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> NodeBuilder {
    self.0.attributes.insert(name.into(), value.into());
    self
  }

  pub fn attrs(mut self, iter: impl IntoIterator<Item = (String, String)>) -> NodeBuilder {
    for (name, value) in iter {
      self.0.attributes.insert(name, value);
    }
    self
  }

  /// Appends anything implementing `Into<XMLNode>` as the last child.
  pub fn append(mut self, node: impl Into<XMLNode>) -> NodeBuilder {
    self.0.children.push(node.into());
    self
  }

  pub fn build(self) -> Element {
    self.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_nested_nodes() {
    let lit = Element::builder("lit").text("x").build();
    let el = Element::builder("element")
      .attr("name", "Entry")
      .append(XMLNode::Element(lit))
      .build();
    assert_eq!(el.name, "element");
    assert_eq!(el.attributes.get("name").map(String::as_str), Some("Entry"));
    match &el.children[0] {
      XMLNode::Element(lit) => assert_eq!(lit.name, "lit"),
      other => panic!("unexpected child {:?}", other),
    }
  }

  #[test]
  fn like_copies_only_the_name() {
    let original = Element::builder("stringElement").attr("name", "Gloss").text("t").build();
    let copy = NodeBuilder::like(&original).build();
    assert_eq!(copy.name, "stringElement");
    assert!(copy.attributes.is_empty());
    assert!(copy.children.is_empty());
  }
}

//! Class template index

use std::{collections::HashMap, rc::Rc};

use log::{debug, trace};
use xmltree::Element;

use crate::{
  error::{DumpError, Result},
  model::ObjectAccessor,
  template::{class_key, NodeAttrs, Template},
};

/// Maps `class[-tag]` keys to class templates.
///
/// Lookups are resolved on first use and remembered, misses included, unless
/// caching is turned off.
pub struct ClassCatalog {
  declarations: Vec<(String, Rc<Element>)>,
  resolved: HashMap<String, Option<Rc<Element>>>,
  strict: bool,
  base_class_fallback: bool,
  caching: bool,
}

impl ClassCatalog {
  pub fn new(template: &Template, strict: bool, base_class_fallback: bool) -> Self {
    let declarations = template
      .classes()
      .filter_map(|c| {
        let name = c.attr("name")?;
        Some((class_key(name, c.attr("tag")), Rc::new(c.clone())))
      })
      .collect();
    Self {
      declarations,
      resolved: HashMap::new(),
      strict,
      base_class_fallback,
      caching: true,
    }
  }

  pub fn with_caching(mut self, caching: bool) -> Self {
    self.caching = caching;
    self
  }

  fn declared(&self, key: &str) -> Option<Rc<Element>> {
    self
      .declarations
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, el)| Rc::clone(el))
  }

  /// Template for objects of `class`, walking up the class hierarchy when
  /// base class fallback is on.
  ///
  /// In strict mode a miss is an error; otherwise `None` means the object is
  /// not written.
  pub fn find<A: ObjectAccessor + ?Sized>(
    &mut self,
    class: &str,
    tag: Option<&str>,
    accessor: &A,
  ) -> Result<Option<Rc<Element>>> {
    let key = class_key(class, tag);
    let found = match self.resolved.get(&key).filter(|_| self.caching) {
      Some(hit) => {
        trace!("Class template '{}' served from cache", key);
        hit.clone()
      }
      None => {
        let found = self.search(class, tag, accessor);
        if self.caching {
          self.resolved.insert(key.clone(), found.clone());
        }
        found
      }
    };
    if found.is_none() && self.strict {
      return Err(DumpError::NoClassTemplate {
        class: class.to_string(),
        tag: tag.map(str::to_string),
      });
    }
    Ok(found)
  }

  fn search<A: ObjectAccessor + ?Sized>(&self, class: &str, tag: Option<&str>, accessor: &A) -> Option<Rc<Element>> {
    let mut current = Some(class.to_string());
    while let Some(c) = current {
      let key = class_key(&c, tag);
      if let Some(el) = self.declared(&key) {
        if c != class {
          debug!("Using template '{}' for class '{}'", key, class);
        }
        return Some(el);
      }
      if !self.base_class_fallback {
        break;
      }
      current = accessor.base_class(&c);
    }
    debug!("No template for '{}'", class_key(class, tag));
    None
  }

  /// Template named directly by a `call` node. A missing target is always an
  /// error.
  pub fn named(&self, name: &str) -> Result<Rc<Element>> {
    self.declared(name).ok_or_else(|| DumpError::NoClassTemplate {
      class: name.to_string(),
      tag: None,
    })
  }
}

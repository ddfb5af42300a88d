//! Template interpreter
//!
//! Walks a class template and the object graph together, one node at a time,
//! and drives an [`Output`]. Attribute-like nodes are gathered by the
//! enclosing `element` so they can be written sorted by name; every other
//! node is streamed in document order.
//!
//! Cancellation is polled at the top of every sibling loop. Once it is seen
//! no further siblings are rendered at any depth, but elements already
//! opened are still closed.

use std::{collections::HashMap, path::Path};

use log::{debug, trace};
use xmltree::{Element, XMLNode};

use crate::{
  catalog::ClassCatalog,
  condition::Conditions,
  dumper::{CancelHandle, ProgressEvent, RunConfig},
  error::{AccessError, DumpError, Result},
  fields::{as_int, format_bool, format_date, FieldResolver},
  langtags::WsSelector,
  model::{ObjRef, ObjectAccessor, TsString, Value},
  output::{Attributes, Output},
  template::{substitute, NodeAttrs, NodeKind, Template},
  utils::{copy_best_effort, split_list},
  DateFormat, OutputFormat,
};

const DEFAULT_ALTERNATIVE_NAME: &str = "AStr";
const DEFAULT_TAG_PREFIX: &str = "cf";

pub type ProgressCallback = Box<dyn FnMut(&ProgressEvent)>;

pub struct Interpreter<'a> {
  accessor: &'a dyn ObjectAccessor,
  out: Box<dyn Output + 'a>,
  catalog: ClassCatalog,
  resolver: FieldResolver,
  format: OutputFormat,
  export_dir: Option<&'a Path>,
  variables: &'a HashMap<String, bool>,
  cancel: &'a CancelHandle,
  progress: &'a mut Option<ProgressCallback>,
  /// Reference targets currently being rendered, innermost last.
  open_targets: Vec<ObjRef>,
  custom_tags: HashMap<(String, String), String>,
  cancelled: bool,
}

impl<'a> Interpreter<'a> {
  pub fn new(
    accessor: &'a dyn ObjectAccessor,
    template: &Template,
    config: &'a RunConfig,
    out: Box<dyn Output + 'a>,
    variables: &'a HashMap<String, bool>,
    cancel: &'a CancelHandle,
    progress: &'a mut Option<ProgressCallback>,
  ) -> Self {
    Self {
      accessor,
      out,
      catalog: ClassCatalog::new(template, config.strict, config.base_class_fallback)
        .with_caching(config.cache_class_templates),
      resolver: FieldResolver::new(config.id_style),
      format: config.format,
      export_dir: config.export_dir.as_deref(),
      variables,
      cancel,
      progress,
      open_targets: Vec::new(),
      custom_tags: HashMap::new(),
      cancelled: false,
    }
  }

  /// Whether a cancellation request stopped the walk.
  pub fn was_cancelled(&self) -> bool {
    self.cancelled
  }

  pub fn flush(&mut self) -> Result<()> {
    self.out.flush()
  }

  fn poll_cancel(&mut self) -> bool {
    if !self.cancelled && self.cancel.is_cancelled() {
      debug!("Cancellation requested, stopping");
      self.cancelled = true;
    }
    self.cancelled
  }

  fn notify(&mut self, event: ProgressEvent) {
    if let Some(cb) = self.progress.as_mut() {
      cb(&event);
    }
  }

  /// Renders `obj` with the template registered for its class.
  pub fn render_object(&mut self, obj: ObjRef, tag: Option<&str>) -> Result<()> {
    let class = self.accessor.class_name(obj);
    match self.catalog.find(&class, tag, self.accessor)? {
      Some(template) => self.render_children(&template, obj, &[]),
      None => {
        debug!("No template for {} of class '{}', skipping it", obj, class);
        Ok(())
      }
    }
  }

  fn render_children(&mut self, parent: &Element, obj: ObjRef, hide: &[String]) -> Result<()> {
    for child in parent.children.iter() {
      if self.poll_cancel() {
        return Ok(());
      }
      if let XMLNode::Element(node) = child {
        self.render(node, obj, hide)?;
      }
    }
    Ok(())
  }

  fn render(&mut self, node: &Element, obj: ObjRef, hide: &[String]) -> Result<()> {
    if is_hidden(node, hide) {
      return Ok(());
    }
    let kind = NodeKind::of(node)?;
    trace!("<{}> on {}", kind, obj);
    match kind {
      NodeKind::Element => self.element(node, obj, hide),
      // gathered by the enclosing element
      NodeKind::Attribute | NodeKind::AttributeIndirect | NodeKind::DateAttribute => Ok(()),
      NodeKind::Call => {
        let target = self.catalog.named(node.required("name")?)?;
        let hide = node.attr("hide").map(split_list).unwrap_or_default();
        self.render_children(&target, obj, &hide)
      }
      NodeKind::If | NodeKind::IfNot | NodeKind::IfNull | NodeKind::IfNotNull => {
        if self.test(kind, node, obj)? {
          self.render_children(node, obj, hide)?;
        }
        Ok(())
      }
      NodeKind::MultilingualString => self.multilingual(node, obj),
      NodeKind::String => self.string(node, obj),
      NodeKind::Number => self.number(node, obj),
      NodeKind::Boolean => self.boolean(node, obj),
      NodeKind::RefAtomic => self.ref_atomic(node, obj),
      NodeKind::RefVector => self.ref_vector(node, obj),
      NodeKind::RefObjVector => self.ref_obj_vector(node, obj),
      NodeKind::ObjAtomic => self.obj_atomic(node, obj),
      NodeKind::ObjVector => self.obj_vector(node, obj),
      NodeKind::Group => self.group(node, obj, hide),
      NodeKind::GenerateCustom => self.generate_custom(node, obj, hide),
      NodeKind::Lit => self.out.raw(&node.text_content()),
      NodeKind::Comment => self.out.comment(&node.text_content()),
      NodeKind::Progress => {
        let event = ProgressEvent::Start {
          message_id: node.attr("messageId").map(str::to_string),
          max: node.parsed::<usize>("max")?.unwrap_or_default(),
        };
        self.notify(event);
        Ok(())
      }
    }
  }

  fn test(&mut self, kind: NodeKind, node: &Element, obj: ObjRef) -> Result<bool> {
    Conditions {
      accessor: self.accessor,
      resolver: &mut self.resolver,
      variables: self.variables,
    }
    .passes(kind, node, obj)
  }

  fn element(&mut self, node: &Element, obj: ObjRef, hide: &[String]) -> Result<()> {
    let name = node.required("name")?;
    let mut attributes = Attributes::new();
    self.collect_attributes(node, obj, hide, &mut attributes)?;
    self.out.start_element(name, &attributes)?;
    self.render_children(node, obj, hide)?;
    self.out.end_element(name)?;
    if node.flag("progressIncrement")? {
      self.notify(ProgressEvent::Step);
    }
    Ok(())
  }

  /// Gathers attribute nodes directly under `node`, or under conditionals
  /// that pass.
  fn collect_attributes(&mut self, node: &Element, obj: ObjRef, hide: &[String], attributes: &mut Attributes) -> Result<()> {
    for child in node.element_children() {
      if is_hidden(child, hide) {
        continue;
      }
      let kind = NodeKind::of(child)?;
      match kind {
        kind if kind.is_attribute() => {
          if let Some((name, value)) = self.attribute(kind, child, obj)? {
            attributes.insert(name, value);
          }
        }
        NodeKind::If | NodeKind::IfNot | NodeKind::IfNull | NodeKind::IfNotNull => {
          if self.test(kind, child, obj)? {
            self.collect_attributes(child, obj, hide, attributes)?;
          }
        }
        _ => {}
      }
    }
    Ok(())
  }

  fn attribute(&mut self, kind: NodeKind, node: &Element, obj: ObjRef) -> Result<Option<(String, String)>> {
    let name = node.required("name")?.to_string();
    let value = match kind {
      NodeKind::AttributeIndirect => {
        let target = match self.resolver.path(self.accessor, obj, node.required("target")?)? {
          Value::Object(Some(t)) => t,
          _ => return Ok(None),
        };
        let value = self.resolver.source(self.accessor, target, node)?;
        self.copy_external_file(node, obj, target);
        self.attribute_text(&value, None)?
      }
      NodeKind::DateAttribute => {
        let format = node.parsed::<DateFormat>("format")?.unwrap_or_default();
        match self.resolver.path(self.accessor, obj, node.required("simpleProperty")?)? {
          Value::Time(t) => Some(format_date(&t, format)),
          other => self.attribute_text(&other, None)?,
        }
      }
      _ => {
        let value = self.resolver.source(self.accessor, obj, node)?;
        self.attribute_text(&value, node.attr("ws"))?
      }
    };
    Ok(value.map(|v| (name, v)))
  }

  fn attribute_text(&self, value: &Value, ws: Option<&str>) -> Result<Option<String>> {
    Ok(match value {
      Value::Strings(_) => self.pick_alternative(value, ws)?.map(|(_, t)| t.text()),
      other => self.resolver.display(self.accessor, other, self.format),
    })
  }

  /// One alternative of a multi-locale value: the first selected by `ws`, or
  /// the first with text.
  fn pick_alternative(&self, value: &Value, ws: Option<&str>) -> Result<Option<(String, TsString)>> {
    let strings = match value {
      Value::Strings(s) => s,
      _ => return Ok(None),
    };
    Ok(match ws {
      Some(ws) => WsSelector::parse(ws)?
        .select(strings, self.accessor)
        .into_iter()
        .next()
        .map(|(w, t)| (w, t.clone())),
      None => strings.iter().next().map(|(w, t)| (w.to_string(), t.clone())),
    })
  }

  fn copy_external_file(&self, node: &Element, obj: ObjRef, target: ObjRef) {
    let (dir, src) = match (self.export_dir, self.accessor.external_file(target)) {
      (Some(dir), Some(src)) => (dir, src),
      _ => return,
    };
    let subdirectory = node
      .attr("fileSubdirectory")
      .map(str::to_string)
      .unwrap_or_else(|| self.accessor.class_name(obj).to_lowercase());
    if let Some(file_name) = src.file_name() {
      copy_best_effort(&src, &dir.join(subdirectory).join(file_name));
    }
  }

  fn multilingual(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    let name = node.required("name")?;
    let selector = WsSelector::parse(node.required("ws")?)?;
    let owned: Vec<(String, TsString)> = match node.one_of(&["simpleProperty", "method"])? {
      ("method", method) => {
        let mut found = Vec::new();
        for ws in selector.candidates(self.accessor) {
          let text = match self.resolver.method(self.accessor, obj, method, Some(ws.as_str()))? {
            Value::Text(s) => TsString::plain(s),
            Value::Formatted(t) => t,
            Value::Strings(s) => s.get(&ws).cloned().unwrap_or_default(),
            _ => TsString::default(),
          };
          if !text.is_empty() {
            found.push((ws, text));
            if selector.is_single() {
              break;
            }
          }
        }
        found
      }
      (_, path) => match self.resolver.path(self.accessor, obj, path)? {
        Value::Strings(strings) => selector
          .select(&strings, self.accessor)
          .into_iter()
          .map(|(w, t)| (w, t.clone()))
          .collect(),
        // a single-locale string is taken to be in the first requested locale
        Value::Text(s) => self.first_candidate(&selector, TsString::plain(s)),
        Value::Formatted(t) => self.first_candidate(&selector, t),
        _ => Vec::new(),
      },
    };
    if owned.is_empty() {
      return Ok(());
    }
    let wrap = if node.flag("wrap")? {
      Some(node.attr("alternativeName").unwrap_or(DEFAULT_ALTERNATIVE_NAME))
    } else {
      None
    };
    let alternatives: Vec<(String, &TsString)> = owned.iter().map(|(w, t)| (w.clone(), t)).collect();
    self.out.alternatives(name, wrap, &alternatives)
  }

  fn first_candidate(&self, selector: &WsSelector, text: TsString) -> Vec<(String, TsString)> {
    if text.is_empty() {
      return Vec::new();
    }
    selector
      .candidates(self.accessor)
      .into_iter()
      .next()
      .map(|ws| vec![(ws, text)])
      .unwrap_or_default()
  }

  fn string(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    let name = node.required("name")?;
    let value = self.resolver.source(self.accessor, obj, node)?;
    let (text, ws) = match value {
      Value::Strings(_) => match self.pick_alternative(&value, node.attr("ws"))? {
        Some((ws, t)) => (t, Some(ws)),
        None => return Ok(()),
      },
      Value::Text(s) => (TsString::plain(s), None),
      Value::Formatted(t) => (t, None),
      other => match self.resolver.display(self.accessor, &other, self.format) {
        Some(s) => (TsString::plain(s), None),
        None => return Ok(()),
      },
    };
    if text.is_empty() {
      return Ok(());
    }
    self.scalar(node, name, text, ws.as_deref())
  }

  fn number(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    let name = node.required("name")?;
    let property = node.required("simpleProperty")?;
    let value = self.resolver.path(self.accessor, obj, property)?;
    if value.is_null() {
      return Ok(());
    }
    let n = as_int(&value).ok_or_else(|| DumpError::DomainAccess {
      class: self.accessor.class_name(obj),
      field: property.to_string(),
      reason: "value is not a number".into(),
    })?;
    if node.parsed::<i64>("ifnotequal")?.map_or(false, |x| n == x)
      || node.parsed::<i64>("iflessthan")?.map_or(false, |x| n >= x)
      || node.parsed::<i64>("ifgreaterthan")?.map_or(false, |x| n <= x)
    {
      return Ok(());
    }
    self.scalar(node, name, TsString::plain(n.to_string()), None)
  }

  fn boolean(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    let name = node.required("name")?;
    let property = node.required("simpleProperty")?;
    let b = match self.resolver.path(self.accessor, obj, property)? {
      Value::Bool(b) => b,
      Value::Null => return Ok(()),
      other => as_int(&other).map(|i| i != 0).ok_or_else(|| DumpError::DomainAccess {
        class: self.accessor.class_name(obj),
        field: property.to_string(),
        reason: "value is not a boolean".into(),
      })?,
    };
    self.scalar(node, name, TsString::plain(format_bool(b, self.format)), None)
  }

  /// Writes a single value with `before`/`after` decoration, as a trait when
  /// asked to.
  fn scalar(&mut self, node: &Element, name: &str, text: TsString, ws: Option<&str>) -> Result<()> {
    let decorated = match (node.attr("before"), node.attr("after")) {
      (None, None) => text,
      (before, after) => TsString::plain(format!(
        "{}{}{}",
        before.unwrap_or_default(),
        text.text(),
        after.unwrap_or_default()
      )),
    };
    if node.flag("writeAsTrait")? {
      self.out.trait_field(name, &decorated.text())
    } else {
      self.out.simple_field(name, &decorated, ws)
    }
  }

  fn ref_atomic(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    let name = node.required("name")?;
    if let Value::Object(Some(target)) = self.resolver.path(self.accessor, obj, node.required("field")?)? {
      let id = self.resolver.reference(self.accessor, target);
      self.out.reference(name, &id, None)?;
    }
    Ok(())
  }

  /// Targets of a `field` or `virtualField` reference collection.
  fn targets(&mut self, node: &Element, obj: ObjRef) -> Result<Vec<ObjRef>> {
    match node.one_of(&["field", "virtualField"])? {
      ("virtualField", field) => self
        .accessor
        .virtual_references(obj, field, &self.open_targets)
        .map_err(|e| match e {
          AccessError::Unknown(_) => DumpError::UnknownField {
            class: self.accessor.class_name(obj),
            field: field.to_string(),
          },
          AccessError::Failed(reason) => DumpError::DomainAccess {
            class: self.accessor.class_name(obj),
            field: field.to_string(),
            reason,
          },
        }),
      (_, path) => Ok(self.resolver.path(self.accessor, obj, path)?.objects()),
    }
  }

  fn ref_vector(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    let name = node.required("name")?;
    let ordered = node.flag("ordered")?;
    for (i, target) in self.targets(node, obj)?.into_iter().enumerate() {
      if self.poll_cancel() {
        break;
      }
      let id = self.resolver.reference(self.accessor, target);
      self.out.reference(name, &id, ordered.then(|| i + 1))?;
    }
    Ok(())
  }

  fn ref_obj_vector(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    let tag = node.attr("classTag");
    let step = node.flag("progressIncrement")?;
    for target in self.targets(node, obj)? {
      if self.poll_cancel() {
        break;
      }
      self.open_targets.push(target);
      let rendered = self.render_object(target, tag);
      self.open_targets.pop();
      rendered?;
      if step {
        self.notify(ProgressEvent::Step);
      }
    }
    Ok(())
  }

  fn obj_atomic(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    if let Value::Object(Some(owned)) = self.resolver.path(self.accessor, obj, node.required("field")?)? {
      self.render_object(owned, node.attr("classTag"))?;
    }
    Ok(())
  }

  fn obj_vector(&mut self, node: &Element, obj: ObjRef) -> Result<()> {
    let field = node.required("field")?;
    let tag = node.attr("classTag");
    let limit = node.parsed::<usize>("count")?;
    let separator = node.attr("separator");
    let step = node.flag("progressIncrement")?;
    let items = self.resolver.path(self.accessor, obj, field)?.objects();
    for (i, owned) in items.into_iter().take(limit.unwrap_or(usize::MAX)).enumerate() {
      if self.poll_cancel() {
        break;
      }
      if let (Some(sep), true) = (separator, i > 0) {
        self.out.raw(sep)?;
      }
      self.render_object(owned, tag)?;
      if step {
        self.notify(ProgressEvent::Step);
      }
    }
    Ok(())
  }

  fn group(&mut self, node: &Element, obj: ObjRef, hide: &[String]) -> Result<()> {
    match node.attr("field") {
      None => self.render_children(node, obj, hide),
      Some(field) => {
        for target in self.resolver.path(self.accessor, obj, field)?.objects() {
          if self.poll_cancel() {
            break;
          }
          self.render_children(node, target, hide)?;
        }
        Ok(())
      }
    }
  }

  /// Output tag of a custom field, stable for the run and unique across
  /// fields.
  fn custom_tag(&mut self, prefix: &str, class: &str, field: &str) -> String {
    let next = self.custom_tags.len() + 1;
    self
      .custom_tags
      .entry((class.to_string(), field.to_string()))
      .or_insert_with(|| format!("{prefix}{next}"))
      .clone()
  }

  fn generate_custom(&mut self, node: &Element, obj: ObjRef, hide: &[String]) -> Result<()> {
    let class = match node.attr("class") {
      Some(c) => c.to_string(),
      None => self.accessor.class_name(obj),
    };
    let kind_filter = match node.attr("fieldType") {
      None => None,
      Some(t @ ("simplestring" | "mlstring")) => Some(t == "mlstring"),
      Some(other) => {
        return Err(DumpError::invalid(
          &node.name,
          "fieldType",
          other,
          "expected simplestring or mlstring",
        ))
      }
    };
    let prefix = node.attr("tagPrefix").unwrap_or(DEFAULT_TAG_PREFIX);
    let fields = self.resolver.custom_fields_of(self.accessor, &class);
    for field in fields {
      let wanted = match kind_filter {
        None => field.kind.is_simple_string() || field.kind.is_multi_locale(),
        Some(multi) => field.kind.is_multi_locale() == multi && (multi || field.kind.is_simple_string()),
      };
      if !wanted {
        continue;
      }
      if self.poll_cancel() {
        break;
      }
      let tag = self.custom_tag(prefix, &field.class, &field.name);
      let map = HashMap::from([
        ("fieldName", field.name.clone()),
        ("label", field.label.clone()),
        ("tag", tag),
      ]);
      for child in node.element_children() {
        if self.poll_cancel() {
          break;
        }
        let fragment = substitute(child, &map);
        self.render(&fragment, obj, hide)?;
      }
    }
    Ok(())
  }
}

fn is_hidden(node: &Element, hide: &[String]) -> bool {
  node
    .attr("flag")
    .map_or(false, |f| hide.iter().any(|h| h == f))
}

//! In-memory object graph
//!
//! [`MemoryModel`] is a complete [`ObjectAccessor`] over objects held in
//! memory. It can be built in code or loaded from a small XML format:
//!
//! ```xml
//! <model>
//!   <writingSystems analysis="en fr" vernacular="seh"/>
//!   <class name="LexEntry" base="CmObject">
//!     <field name="Form" kind="string"/>
//!     <field name="Senses" kind="ownsequence"/>
//!   </class>
//!   <customField class="LexEntry" name="Note" kind="string" label="Note"/>
//!   <backReference class="LexEntry" name="Referrers" source="Target"/>
//!   <object id="1" class="LexEntry" guid="…" owner="…">
//!     <string name="Form">run</string>
//!     <multi name="Gloss"><alt ws="en">run</alt></multi>
//!     <seq name="Senses">2 3</seq>
//!   </object>
//! </model>
//! ```

use std::{
  collections::{BTreeMap, HashMap},
  fs,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::debug;
use roxmltree::{Document, Node};
use uuid::Uuid;

use crate::{
  error::{AccessError, DumpError, Result},
  fields::class_chain,
  model::{CustomField, FieldDescriptor, FieldKind, LocaleStrings, ObjRef, ObjectAccessor, Run, TsString, Value, WsKind},
  parse_flag,
};

pub type Method = Box<dyn Fn(&MemoryModel, ObjRef, Option<&str>) -> std::result::Result<Value, AccessError>>;

pub type VirtualField =
  Box<dyn Fn(&MemoryModel, ObjRef, &[ObjRef]) -> std::result::Result<Vec<ObjRef>, AccessError>>;

#[derive(Default)]
struct ClassDef {
  base: Option<String>,
  fields: Vec<FieldDescriptor>,
}

struct Object {
  class: String,
  guid: Uuid,
  owner: Option<ObjRef>,
  values: HashMap<String, Value>,
  file: Option<PathBuf>,
}

#[derive(Default)]
pub struct MemoryModel {
  classes: HashMap<String, ClassDef>,
  custom: Vec<CustomField>,
  objects: BTreeMap<ObjRef, Object>,
  analysis: Vec<String>,
  vernacular: Vec<String>,
  methods: HashMap<(String, String), Method>,
  virtuals: HashMap<(String, String), VirtualField>,
  next_field_id: u32,
}

impl MemoryModel {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_writing_systems(&mut self, kind: WsKind, wss: &[&str]) {
    let list = wss.iter().map(|w| w.to_string()).collect();
    match kind {
      WsKind::Analysis => self.analysis = list,
      WsKind::Vernacular => self.vernacular = list,
    }
  }

  pub fn add_class(&mut self, name: &str, base: Option<&str>) {
    self.classes.entry(name.to_string()).or_default().base = base.map(str::to_string);
  }

  fn field_id(&mut self) -> u32 {
    self.next_field_id += 1;
    self.next_field_id
  }

  pub fn add_field(&mut self, class: &str, name: &str, kind: FieldKind) -> FieldDescriptor {
    let fd = FieldDescriptor {
      id: self.field_id(),
      name: name.to_string(),
      kind,
    };
    self.classes.entry(class.to_string()).or_default().fields.push(fd.clone());
    fd
  }

  pub fn add_custom_field(&mut self, class: &str, name: &str, label: &str, kind: FieldKind) -> CustomField {
    let cf = CustomField {
      id: self.field_id(),
      class: class.to_string(),
      name: name.to_string(),
      label: label.to_string(),
      kind,
    };
    self.custom.push(cf.clone());
    cf
  }

  /// Adds an object with a random GUID.
  pub fn add_object(&mut self, id: u64, class: &str, owner: Option<ObjRef>) -> ObjRef {
    let obj = ObjRef(id);
    self.objects.insert(
      obj,
      Object {
        class: class.to_string(),
        guid: Uuid::new_v4(),
        owner,
        values: HashMap::new(),
        file: None,
      },
    );
    obj
  }

  pub fn set_guid(&mut self, obj: ObjRef, guid: Uuid) {
    if let Some(o) = self.objects.get_mut(&obj) {
      o.guid = guid;
    }
  }

  /// Stores a value for a declared or custom field.
  pub fn set(&mut self, obj: ObjRef, field: &str, value: Value) {
    if let Some(o) = self.objects.get_mut(&obj) {
      o.values.insert(field.to_string(), value);
    }
  }

  pub fn get(&self, obj: ObjRef, field: &str) -> Option<&Value> {
    self.objects.get(&obj).and_then(|o| o.values.get(field))
  }

  /// Marks `obj` as standing for a file on disk.
  pub fn set_external_file(&mut self, obj: ObjRef, path: impl Into<PathBuf>) {
    if let Some(o) = self.objects.get_mut(&obj) {
      o.file = Some(path.into());
    }
  }

  pub fn add_method(
    &mut self,
    class: &str,
    name: &str,
    method: impl Fn(&MemoryModel, ObjRef, Option<&str>) -> std::result::Result<Value, AccessError> + 'static,
  ) {
    self.methods.insert((class.to_string(), name.to_string()), Box::new(method));
  }

  pub fn add_virtual_field(
    &mut self,
    class: &str,
    name: &str,
    field: impl Fn(&MemoryModel, ObjRef, &[ObjRef]) -> std::result::Result<Vec<ObjRef>, AccessError> + 'static,
  ) {
    self.virtuals.insert((class.to_string(), name.to_string()), Box::new(field));
  }

  /// Virtual field listing the objects whose `source` field refers to the
  /// object. Reference targets still being rendered are left out, so a
  /// relation is not written back into the chain it was reached through.
  pub fn add_back_reference(&mut self, class: &str, name: &str, source: &str) {
    let source = source.to_string();
    self.add_virtual_field(class, name, move |model, obj, open| {
      Ok(model.referrers(obj, &source).filter(|r| !open.contains(r)).collect())
    });
  }

  fn referrers<'m>(&'m self, target: ObjRef, field: &'m str) -> impl Iterator<Item = ObjRef> + 'm {
    self
      .objects
      .iter()
      .filter(move |(_, o)| o.values.get(field).map_or(false, |v| v.objects().contains(&target)))
      .map(|(r, _)| *r)
  }

  fn object(&self, obj: ObjRef) -> std::result::Result<&Object, AccessError> {
    self
      .objects
      .get(&obj)
      .ok_or_else(|| AccessError::Failed(format!("object {obj} does not exist")))
  }

  fn member<'m, T>(&self, table: &'m HashMap<(String, String), T>, obj: ObjRef, name: &str) -> Option<&'m T> {
    class_chain(self, &self.class_name(obj))
      .into_iter()
      .find_map(|c| table.get(&(c, name.to_string())))
  }

  /// Loads a model from an XML file. Relative external file paths resolve
  /// against the file's directory.
  pub fn load(path: &Path) -> Result<Self> {
    debug!("Loading model '{}'", path.display());
    let text = fs::read_to_string(path)?;
    Self::from_xml(&text, path.parent())
  }

  pub fn from_xml(text: &str, base_dir: Option<&Path>) -> Result<Self> {
    let doc = Document::parse(text).map_err(|e| DumpError::ModelParse(e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "model" {
      return Err(DumpError::ModelParse(format!(
        "root element is <{}>, expected <model>",
        root.tag_name().name()
      )));
    }
    let mut model = Self::new();
    // declarations first so object values can be typed by custom field kind
    for node in elements(root) {
      match node.tag_name().name() {
        "writingSystems" => {
          model.analysis = words(node.attribute("analysis"));
          model.vernacular = words(node.attribute("vernacular"));
        }
        "class" => {
          let name = required(node, "name")?;
          model.add_class(name, node.attribute("base"));
          for field in elements(node).filter(|f| f.has_tag_name("field")) {
            model.add_field(name, required(field, "name")?, kind(field)?);
          }
        }
        "customField" => {
          let name = required(node, "name")?;
          let label = node.attribute("label").unwrap_or(name);
          model.add_custom_field(required(node, "class")?, name, label, kind(node)?);
        }
        "backReference" => {
          model.add_back_reference(required(node, "class")?, required(node, "name")?, required(node, "source")?);
        }
        _ => {}
      }
    }
    for node in elements(root).filter(|n| n.has_tag_name("object")) {
      model.load_object(node, base_dir)?;
    }
    debug!("Loaded {} objects", model.objects.len());
    Ok(model)
  }

  fn load_object(&mut self, node: Node, base_dir: Option<&Path>) -> Result<()> {
    let obj = ObjRef(id(node, "id")?);
    let class = required(node, "class")?;
    let owner = node.attribute("owner").map(|_| id(node, "owner")).transpose()?.map(ObjRef);
    self.add_object(obj.0, class, owner);
    if let Some(g) = node.attribute("guid") {
      let guid = Uuid::parse_str(g).map_err(|e| DumpError::ModelParse(format!("object {obj}: guid '{g}': {e}")))?;
      self.set_guid(obj, guid);
    }
    for value in elements(node) {
      let tag = value.tag_name().name();
      if tag == "file" {
        let path = PathBuf::from(required(value, "path")?);
        let path = match base_dir {
          Some(dir) if path.is_relative() => dir.join(path),
          _ => path,
        };
        self.set_external_file(obj, path);
        continue;
      }
      let name = required(value, "name")?;
      let parsed = match tag {
        "custom" => {
          let kind = self
            .custom
            .iter()
            .find(|c| c.name == name && class_chain(self, class).contains(&c.class))
            .map(|c| c.kind)
            .ok_or_else(|| DumpError::ModelParse(format!("object {obj}: no custom field '{name}'")))?;
          match kind {
            FieldKind::MultiString => multi(value)?,
            FieldKind::FormattedString => Value::Formatted(formatted(value)),
            _ => Value::Text(text(value)),
          }
        }
        other => typed_value(other, value)?,
      };
      self.set(obj, name, parsed);
    }
    Ok(())
  }
}

fn elements<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
  node.children().filter(|n| n.is_element())
}

fn required<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
  node.attribute(name).ok_or_else(|| {
    DumpError::ModelParse(format!("<{}> requires attribute '{}'", node.tag_name().name(), name))
  })
}

fn id(node: Node, name: &str) -> Result<u64> {
  let v = required(node, name)?;
  v.trim()
    .parse()
    .map_err(|_| DumpError::ModelParse(format!("'{v}' is not an object id")))
}

fn kind(node: Node) -> Result<FieldKind> {
  let k = required(node, "kind")?;
  k.parse()
    .map_err(|_| DumpError::ModelParse(format!("unknown field kind '{k}'")))
}

fn words(s: Option<&str>) -> Vec<String> {
  s.map(|s| s.split_whitespace().map(str::to_string).collect())
    .unwrap_or_default()
}

fn text(node: Node) -> String {
  node.text().unwrap_or_default().to_string()
}

/// Runs of a string element: either bare text or `<run ws style>` children.
fn formatted(node: Node) -> TsString {
  let runs: Vec<Run> = elements(node)
    .filter(|r| r.has_tag_name("run"))
    .map(|r| Run {
      text: text(r),
      ws: r.attribute("ws").map(str::to_string),
      style: r.attribute("style").map(str::to_string),
    })
    .collect();
  if runs.is_empty() {
    TsString::plain(text(node))
  } else {
    TsString::from_runs(runs)
  }
}

fn multi(node: Node) -> Result<Value> {
  let mut strings = LocaleStrings::new();
  for alt in elements(node).filter(|a| a.has_tag_name("alt")) {
    strings.set(required(alt, "ws")?, formatted(alt));
  }
  Ok(Value::Strings(strings))
}

fn typed_value(tag: &str, node: Node) -> Result<Value> {
  let bad = |what: &str| DumpError::ModelParse(format!("'{}' is not {what}", text(node)));
  Ok(match tag {
    "int" => Value::Int(text(node).trim().parse().map_err(|_| bad("an integer"))?),
    "bool" => Value::Bool(parse_flag(&text(node)).ok_or_else(|| bad("a boolean"))?),
    "string" => Value::Text(text(node)),
    "formatted" => Value::Formatted(formatted(node)),
    "multi" => multi(node)?,
    "time" => Value::Time(
      DateTime::parse_from_rfc3339(text(node).trim())
        .map_err(|_| bad("an RFC 3339 time"))?
        .with_timezone(&Utc),
    ),
    "guid" => Value::Guid(Uuid::parse_str(text(node).trim()).map_err(|_| bad("a GUID"))?),
    "ref" => Value::Object(node.attribute("target").map(|_| id(node, "target")).transpose()?.map(ObjRef)),
    "seq" => Value::Sequence(
      text(node)
        .split_whitespace()
        .map(|s| s.parse().map(ObjRef).map_err(|_| bad("a list of object ids")))
        .collect::<Result<_>>()?,
    ),
    other => return Err(DumpError::ModelParse(format!("unknown value element <{other}>"))),
  })
}

impl ObjectAccessor for MemoryModel {
  fn class_name(&self, obj: ObjRef) -> String {
    self.objects.get(&obj).map(|o| o.class.clone()).unwrap_or_default()
  }

  fn base_class(&self, class: &str) -> Option<String> {
    self.classes.get(class).and_then(|c| c.base.clone())
  }

  fn guid(&self, obj: ObjRef) -> Uuid {
    self.objects.get(&obj).map_or(Uuid::nil(), |o| o.guid)
  }

  fn owner(&self, obj: ObjRef) -> Option<ObjRef> {
    self.objects.get(&obj).and_then(|o| o.owner)
  }

  /// Position of `obj` in the first owning field of its owner that holds
  /// it, searching declared fields nearest class first.
  fn index_in_owner(&self, obj: ObjRef) -> Option<usize> {
    let owner = self.objects.get(&self.owner(obj)?)?;
    class_chain(self, &owner.class)
      .iter()
      .filter_map(|c| self.classes.get(c))
      .flat_map(|c| c.fields.iter())
      .filter(|f| matches!(f.kind, FieldKind::OwningAtomic | FieldKind::OwningSequence))
      .find_map(|f| match owner.values.get(&f.name)? {
        Value::Sequence(items) => items.iter().position(|i| *i == obj),
        Value::Object(Some(o)) if *o == obj => Some(0),
        _ => None,
      })
  }

  fn declared_field(&self, class: &str, name: &str) -> Option<FieldDescriptor> {
    class_chain(self, class)
      .iter()
      .filter_map(|c| self.classes.get(c))
      .find_map(|c| c.fields.iter().find(|f| f.name == name))
      .cloned()
  }

  fn read_field(&self, obj: ObjRef, field: &FieldDescriptor) -> std::result::Result<Value, AccessError> {
    self.object(obj)?;
    Ok(match self.get(obj, &field.name) {
      Some(v) => v.clone(),
      None => match field.kind {
        FieldKind::ReferenceAtomic | FieldKind::OwningAtomic => Value::Object(None),
        FieldKind::ReferenceSequence | FieldKind::OwningSequence => Value::Sequence(Vec::new()),
        FieldKind::MultiString => Value::Strings(LocaleStrings::new()),
        _ => Value::Null,
      },
    })
  }

  fn custom_fields(&self) -> Vec<CustomField> {
    self.custom.clone()
  }

  fn read_custom(&self, obj: ObjRef, field: &CustomField) -> std::result::Result<Value, AccessError> {
    self.object(obj)?;
    Ok(self.get(obj, &field.name).cloned().unwrap_or(match field.kind {
      FieldKind::MultiString => Value::Strings(LocaleStrings::new()),
      _ => Value::Null,
    }))
  }

  fn invoke(&self, obj: ObjRef, method: &str, arg: Option<&str>) -> std::result::Result<Value, AccessError> {
    match self.member(&self.methods, obj, method) {
      Some(m) => m(self, obj, arg),
      None => Err(AccessError::Unknown(method.to_string())),
    }
  }

  fn virtual_references(
    &self,
    obj: ObjRef,
    field: &str,
    open: &[ObjRef],
  ) -> std::result::Result<Vec<ObjRef>, AccessError> {
    match self.member(&self.virtuals, obj, field) {
      Some(v) => v(self, obj, open),
      None => Err(AccessError::Unknown(field.to_string())),
    }
  }

  fn writing_systems(&self, kind: WsKind) -> Vec<String> {
    match kind {
      WsKind::Analysis => self.analysis.clone(),
      WsKind::Vernacular => self.vernacular.clone(),
    }
  }

  fn external_file(&self, obj: ObjRef) -> Option<PathBuf> {
    self.objects.get(&obj).and_then(|o| o.file.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MODEL: &str = r#"
    <model>
      <writingSystems analysis="en fr" vernacular="seh"/>
      <class name="CmObject"/>
      <class name="LexEntry" base="CmObject">
        <field name="Form" kind="multistring"/>
        <field name="Senses" kind="ownsequence"/>
        <field name="Homograph" kind="integer"/>
      </class>
      <class name="LexSense" base="CmObject">
        <field name="Target" kind="refatomic"/>
      </class>
      <customField class="LexEntry" name="Note" kind="formatted" label="Entry note"/>
      <backReference class="LexEntry" name="Referrers" source="Target"/>
      <object id="1" class="LexEntry" guid="0b2e3c8c-6a8e-4f4e-9c57-5b3b5d0f8d11">
        <multi name="Form"><alt ws="seh">kuthamanga</alt><alt ws="en"><run ws="en">to </run><run ws="en" style="Emph">run</run></alt></multi>
        <seq name="Senses">2 3</seq>
        <int name="Homograph">1</int>
        <custom name="Note">see also</custom>
        <file path="audio/run.wav"/>
      </object>
      <object id="2" class="LexSense" owner="1"><ref name="Target" target="1"/></object>
      <object id="3" class="LexSense" owner="1"/>
    </model>"#;

  #[test]
  fn loads_declarations_and_objects() {
    let m = MemoryModel::from_xml(MODEL, Some(Path::new("/data"))).unwrap();
    assert_eq!(m.writing_systems(WsKind::Analysis), vec!["en", "fr"]);
    assert_eq!(m.base_class("LexEntry").as_deref(), Some("CmObject"));
    assert_eq!(m.guid(ObjRef(1)).to_string(), "0b2e3c8c-6a8e-4f4e-9c57-5b3b5d0f8d11");
    assert_eq!(m.owner(ObjRef(3)), Some(ObjRef(1)));
    assert_eq!(m.index_in_owner(ObjRef(3)), Some(1));
    assert_eq!(m.external_file(ObjRef(1)), Some(PathBuf::from("/data/audio/run.wav")));
    match m.get(ObjRef(1), "Form") {
      Some(Value::Strings(s)) => {
        assert_eq!(s.get("seh").map(TsString::text).as_deref(), Some("kuthamanga"));
        assert_eq!(s.get("en").map(|t| t.runs.len()), Some(2));
      }
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(m.get(ObjRef(1), "Note"), Some(&Value::Formatted(TsString::plain("see also"))));
  }

  #[test]
  fn declared_fields_are_inherited_and_defaulted() {
    let m = MemoryModel::from_xml(MODEL, None).unwrap();
    let fd = m.declared_field("LexSense", "Target").unwrap();
    assert_eq!(fd.kind, FieldKind::ReferenceAtomic);
    assert_eq!(m.read_field(ObjRef(3), &fd).unwrap(), Value::Object(None));
    assert!(m.declared_field("LexSense", "Senses").is_none());
  }

  #[test]
  fn index_in_owner_ignores_reference_fields() {
    for _ in 0..50 {
      let mut m = MemoryModel::new();
      m.add_class("LexEntry", None);
      m.add_field("LexEntry", "Main", FieldKind::ReferenceAtomic);
      m.add_field("LexEntry", "Related", FieldKind::ReferenceSequence);
      m.add_field("LexEntry", "Senses", FieldKind::OwningSequence);
      let e = m.add_object(1, "LexEntry", None);
      m.add_object(5, "LexSense", Some(e));
      let s = m.add_object(6, "LexSense", Some(e));
      m.set(e, "Main", Value::Object(Some(s)));
      m.set(e, "Related", Value::Sequence(vec![s]));
      m.set(e, "Senses", Value::Sequence(vec![ObjRef(5), s]));
      assert_eq!(m.index_in_owner(s), Some(1));
    }
  }

  #[test]
  fn back_references_skip_the_open_target() {
    let m = MemoryModel::from_xml(MODEL, None).unwrap();
    assert_eq!(m.virtual_references(ObjRef(1), "Referrers", &[]).unwrap(), vec![ObjRef(2)]);
    assert!(m.virtual_references(ObjRef(1), "Referrers", &[ObjRef(2)]).unwrap().is_empty());
    assert_eq!(
      m.virtual_references(ObjRef(2), "Referrers", &[]),
      Err(AccessError::Unknown("Referrers".into()))
    );
  }

  #[test]
  fn methods_are_found_through_base_classes() {
    let mut m = MemoryModel::from_xml(MODEL, None).unwrap();
    m.add_method("CmObject", "Shout", |_, _, arg| Ok(Value::Text(arg.unwrap_or("").to_uppercase())));
    assert_eq!(m.invoke(ObjRef(1), "Shout", Some("hi")).unwrap(), Value::Text("HI".into()));
    assert!(matches!(m.invoke(ObjRef(1), "Whisper", None), Err(AccessError::Unknown(_))));
  }

  #[test]
  fn malformed_models() {
    assert!(matches!(MemoryModel::from_xml("<objects/>", None), Err(DumpError::ModelParse(_))));
    let bad = r#"<model><object id="x" class="A"/></model>"#;
    assert!(matches!(MemoryModel::from_xml(bad, None), Err(DumpError::ModelParse(_))));
    let bad = r#"<model><class name="A"><field name="f" kind="blob"/></class></model>"#;
    assert!(matches!(MemoryModel::from_xml(bad, None), Err(DumpError::ModelParse(_))));
  }
}

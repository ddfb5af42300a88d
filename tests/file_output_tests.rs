//! Exports written to disk: auxiliary outputs and copied external files

use std::{fs, path::Path};

use fxtdump::{DumpOptions, Dumper, MemoryModel, ObjRef, Outcome, Template};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const MODEL: &str = r#"<model>
  <class name="CmObject"/>
  <class name="LexEntry" base="CmObject">
    <field name="Gloss" kind="string"/>
    <field name="Audio" kind="refatomic"/>
  </class>
  <class name="CmFile" base="CmObject">
    <field name="Name" kind="string"/>
  </class>
  <object id="1" class="LexEntry">
    <string name="Gloss">run</string>
    <ref name="Audio" target="2"/>
  </object>
  <object id="2" class="CmFile" owner="1">
    <string name="Name">run.wav</string>
    <file path="media/run.wav"/>
  </object>
</model>"#;

const MAIN: &str = r#"<template>
  <auxiliary path="aux.fxt" extension="ranges"/>
  <class name="LexEntry">
    <element name="Entry">
      <stringElement name="Gloss" simpleProperty="Gloss"/>
    </element>
  </class>
</template>"#;

const AUX: &str = r#"<template>
  <class name="LexEntry">
    <element name="Range">
      <attribute name="id" simpleProperty="Id"/>
    </element>
  </class>
</template>"#;

/// Writes the model with its media file and loads it back.
fn setup(dir: &Path) -> MemoryModel {
    fs::create_dir_all(dir.join("data/media")).unwrap();
    fs::write(dir.join("data/media/run.wav"), b"RIFF").unwrap();
    fs::write(dir.join("data/model.xml"), MODEL).unwrap();
    MemoryModel::load(&dir.join("data/model.xml")).unwrap()
}

fn write_template(dir: &Path, name: &str, text: &str) -> Template {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    Template::load(&path).unwrap()
}

#[test]
fn primary_and_auxiliary_outputs() {
    let tmp = TempDir::new().unwrap();
    let model = setup(tmp.path());
    fs::create_dir_all(tmp.path().join("templates")).unwrap();
    fs::write(tmp.path().join("templates/aux.fxt"), AUX).unwrap();
    let template = write_template(&tmp.path().join("templates"), "main.fxt", MAIN);

    let output = tmp.path().join("out.xml");
    let outcome = Dumper::new(&model, DumpOptions::default())
        .dump_to_file(&template, ObjRef(1), &output)
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(fs::read_to_string(&output).unwrap(), "<Entry><Gloss>run</Gloss></Entry>");
    assert_eq!(
        fs::read_to_string(tmp.path().join("out.ranges")).unwrap(),
        r#"<Range id="1"></Range>"#
    );
}

#[test]
fn auxiliary_output_can_be_skipped() {
    let tmp = TempDir::new().unwrap();
    let model = setup(tmp.path());
    fs::write(tmp.path().join("aux.fxt"), AUX).unwrap();
    let template = write_template(tmp.path(), "main.fxt", MAIN);

    let output = tmp.path().join("out.xml");
    let options = DumpOptions { skip_auxiliary: true, ..DumpOptions::default() };
    Dumper::new(&model, options).dump_to_file(&template, ObjRef(1), &output).unwrap();
    assert!(output.is_file());
    assert!(!tmp.path().join("out.ranges").exists());
}

#[test]
fn missing_auxiliary_template_fails() {
    let tmp = TempDir::new().unwrap();
    let model = setup(tmp.path());
    let template = write_template(tmp.path(), "main.fxt", MAIN);
    let output = tmp.path().join("out.xml");
    assert!(Dumper::new(&model, DumpOptions::default())
        .dump_to_file(&template, ObjRef(1), &output)
        .is_err());
    // the primary output is complete before the auxiliary pass starts
    assert_eq!(fs::read_to_string(&output).unwrap(), "<Entry><Gloss>run</Gloss></Entry>");
}

#[test]
fn external_files_go_to_the_class_directory() {
    let tmp = TempDir::new().unwrap();
    let model = setup(tmp.path());
    let template = write_template(
        tmp.path(),
        "main.fxt",
        r#"<template>
  <class name="LexEntry">
    <element name="Entry">
      <attributeIndirect name="audio" target="Audio" simpleProperty="Name"/>
    </element>
  </class>
</template>"#,
    );

    fs::create_dir_all(tmp.path().join("export")).unwrap();
    let output = tmp.path().join("export/out.xml");
    Dumper::new(&model, DumpOptions::default())
        .dump_to_file(&template, ObjRef(1), &output)
        .unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), r#"<Entry audio="run.wav"></Entry>"#);
    assert_eq!(fs::read(tmp.path().join("export/lexentry/run.wav")).unwrap(), b"RIFF");
}

#[test]
fn external_files_honour_subdirectory_and_export_directory() {
    let tmp = TempDir::new().unwrap();
    let model = setup(tmp.path());
    let template = write_template(
        tmp.path(),
        "main.fxt",
        r#"<template>
  <class name="LexEntry">
    <element name="Entry">
      <attributeIndirect name="audio" target="Audio" simpleProperty="Name" fileSubdirectory="audio"/>
    </element>
  </class>
</template>"#,
    );

    let media = tmp.path().join("media-out");
    let options = DumpOptions { export_dir: Some(media.clone()), ..DumpOptions::default() };
    Dumper::new(&model, options)
        .dump_to_file(&template, ObjRef(1), &tmp.path().join("out.xml"))
        .unwrap();
    assert!(media.join("audio/run.wav").is_file());
    assert!(!tmp.path().join("audio").exists());
}

#[test]
fn existing_exported_files_are_left_alone() {
    let tmp = TempDir::new().unwrap();
    let model = setup(tmp.path());
    let template = write_template(
        tmp.path(),
        "main.fxt",
        r#"<template>
  <class name="LexEntry">
    <element name="Entry">
      <attributeIndirect name="audio" target="Audio" simpleProperty="Name" fileSubdirectory="audio"/>
    </element>
  </class>
</template>"#,
    );
    fs::create_dir_all(tmp.path().join("audio")).unwrap();
    fs::write(tmp.path().join("audio/run.wav"), b"old").unwrap();

    Dumper::new(&model, DumpOptions::default())
        .dump_to_file(&template, ObjRef(1), &tmp.path().join("out.xml"))
        .unwrap();
    assert_eq!(fs::read(tmp.path().join("audio/run.wav")).unwrap(), b"old");
}

//! Run controller
//!
//! A [`Dumper`] owns what lives for one export: the resolved options, the
//! test variables, the cancellation flag and the progress callback. Caches
//! built while walking the graph belong to the pass that built them, so a
//! dumper may be reused but never sees stale class or field lookups.
//!
//! A cancel request applies to the export in progress. Every call to
//! [`Dumper::dump`] or [`Dumper::dump_to_file`] starts with the flag cleared.

use std::{
  collections::HashMap,
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use log::{debug, info};

use crate::{
  error::Result,
  interpreter::{Interpreter, ProgressCallback},
  model::{ObjRef, ObjectAccessor},
  output::{self, Settings},
  template::{Header, Template},
  utils::auxiliary_path,
  IdStyle, Normalization, OutputFormat, RunStyle, WsLabel,
};

/// Caller overrides. Anything left unset falls back to the template header,
/// then to built-in defaults.
#[derive(Clone, Debug)]
pub struct DumpOptions {
  pub format: Option<OutputFormat>,
  pub normalization: Option<Normalization>,
  pub strict: Option<bool>,
  pub base_class_fallback: Option<bool>,
  pub id_style: Option<IdStyle>,
  pub run_style: Option<RunStyle>,
  pub ws_label: Option<WsLabel>,
  pub cache_class_templates: bool,
  /// Do not render the auxiliary template even if one is declared.
  pub skip_auxiliary: bool,
  /// Root directory for copied external files. Defaults to the directory of
  /// the primary output file when dumping to a file.
  pub export_dir: Option<PathBuf>,
}

impl Default for DumpOptions {
  fn default() -> Self {
    Self {
      format: None,
      normalization: None,
      strict: None,
      base_class_fallback: None,
      id_style: None,
      run_style: None,
      ws_label: None,
      cache_class_templates: true,
      skip_auxiliary: false,
      export_dir: None,
    }
  }
}

/// Settings of one pass after layering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
  pub format: OutputFormat,
  pub normalization: Normalization,
  pub strict: bool,
  pub base_class_fallback: bool,
  pub id_style: IdStyle,
  pub run_style: RunStyle,
  pub ws_label: WsLabel,
  pub cache_class_templates: bool,
  pub export_dir: Option<PathBuf>,
}

impl RunConfig {
  pub fn resolve(header: &Header, options: &DumpOptions) -> Self {
    Self {
      format: options.format.or(header.format).unwrap_or_default(),
      normalization: options.normalization.or(header.normalization).unwrap_or_default(),
      strict: options.strict.or(header.strict).unwrap_or(false),
      base_class_fallback: options.base_class_fallback.or(header.base_class_fallback).unwrap_or(false),
      id_style: options.id_style.or(header.id_style).unwrap_or_default(),
      run_style: options.run_style.or(header.run_style).unwrap_or_default(),
      ws_label: options.ws_label.or(header.ws_label).unwrap_or_default(),
      cache_class_templates: options.cache_class_templates,
      export_dir: options.export_dir.clone(),
    }
  }

  fn settings(&self) -> Settings {
    Settings {
      normalization: self.normalization,
      run_style: self.run_style,
      ws_label: self.ws_label,
    }
  }
}

/// Cooperative cancellation flag. Clones share the flag and may be moved to
/// other threads.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  pub fn reset(&self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
  /// A `progress` node was reached.
  Start { message_id: Option<String>, max: usize },
  /// A node marked with `progressIncrement` finished one item.
  Step,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
  Completed,
  /// Stopped on request. Output written so far is flushed.
  Cancelled,
}

pub struct Dumper<'a> {
  accessor: &'a dyn ObjectAccessor,
  options: DumpOptions,
  variables: HashMap<String, bool>,
  cancel: CancelHandle,
  progress: Option<ProgressCallback>,
}

impl<'a> Dumper<'a> {
  pub fn new(accessor: &'a dyn ObjectAccessor, options: DumpOptions) -> Self {
    Self {
      accessor,
      options,
      variables: HashMap::new(),
      cancel: CancelHandle::default(),
      progress: None,
    }
  }

  /// Sets a variable for `variableistrue`/`variableisfalse` tests. Unset
  /// variables are false.
  pub fn set_test_variable(&mut self, name: impl Into<String>, value: bool) {
    self.variables.insert(name.into(), value);
  }

  pub fn cancel_handle(&self) -> CancelHandle {
    self.cancel.clone()
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn on_progress(&mut self, callback: impl FnMut(&ProgressEvent) + 'static) {
    self.progress = Some(Box::new(callback));
  }

  /// Renders `root` with `template` into `out`. The auxiliary template, if
  /// any, is not rendered; see [`Dumper::dump_to_file`].
  pub fn dump(&mut self, template: &Template, root: ObjRef, out: &mut dyn Write) -> Result<Outcome> {
    self.cancel.reset();
    let config = RunConfig::resolve(template.header(), &self.options);
    self.pass(template, &config, root, out)
  }

  fn pass(&mut self, template: &Template, config: &RunConfig, root: ObjRef, out: &mut dyn Write) -> Result<Outcome> {
    if let Some(class) = &template.header().root_class {
      debug!("Template is for root class '{}'", class);
    }
    info!("Dumping {} as {}", root, config.format);
    let writer = output::writer(config.format, config.settings(), out);
    let mut interpreter = Interpreter::new(
      self.accessor,
      template,
      config,
      writer,
      &self.variables,
      &self.cancel,
      &mut self.progress,
    );
    let rendered = interpreter.render_object(root, None);
    let flushed = interpreter.flush();
    rendered?;
    flushed?;
    if interpreter.was_cancelled() {
      info!("Dump of {} cancelled", root);
      Ok(Outcome::Cancelled)
    } else {
      Ok(Outcome::Completed)
    }
  }

  /// Renders `root` into `output`, then renders the auxiliary template into
  /// a sibling file when the template declares one.
  pub fn dump_to_file(&mut self, template: &Template, root: ObjRef, output: &Path) -> Result<Outcome> {
    self.cancel.reset();
    let mut config = RunConfig::resolve(template.header(), &self.options);
    if config.export_dir.is_none() {
      config.export_dir = output.parent().map(Path::to_path_buf);
    }
    let outcome = self.pass_to_file(template, &config, root, output)?;
    if outcome == Outcome::Cancelled {
      return Ok(outcome);
    }

    let aux = match template.auxiliary() {
      Some(aux) if !self.options.skip_auxiliary => aux,
      Some(_) => {
        debug!("Auxiliary template skipped on request");
        return Ok(outcome);
      }
      None => return Ok(outcome),
    };
    let aux_template = Template::load(&template.resolve(&aux.path))?;
    let mut aux_config = RunConfig::resolve(aux_template.header(), &self.options);
    aux_config.export_dir = config.export_dir.clone();
    self.pass_to_file(&aux_template, &aux_config, root, &auxiliary_path(output, &aux.extension))
  }

  fn pass_to_file(&mut self, template: &Template, config: &RunConfig, root: ObjRef, path: &Path) -> Result<Outcome> {
    let mut out = BufWriter::new(File::create(path)?);
    let outcome = self.pass(template, config, root, &mut out)?;
    info!("Output to {}", path.display());
    Ok(outcome)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn options_override_header_override_defaults() {
    let t = Template::parse(r#"<template format="sf" normalization="nfd" runStyle="full"/>"#).unwrap();
    let options = DumpOptions {
      normalization: Some(Normalization::None),
      strict: Some(true),
      ..DumpOptions::default()
    };
    let config = RunConfig::resolve(t.header(), &options);
    assert_eq!(config.format, OutputFormat::Sf);
    assert_eq!(config.normalization, Normalization::None);
    assert_eq!(config.run_style, RunStyle::Full);
    assert!(config.strict);
    assert!(!config.base_class_fallback);
    assert_eq!(config.id_style, IdStyle::Numeric);
    assert!(config.cache_class_templates);
  }

  #[test]
  fn cancel_handles_share_the_flag() {
    let h = CancelHandle::default();
    let other = h.clone();
    std::thread::spawn(move || other.cancel()).join().unwrap();
    assert!(h.is_cancelled());
    h.reset();
    assert!(!h.is_cancelled());
  }
}

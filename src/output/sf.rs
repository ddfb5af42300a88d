//! Flat tag-record writer
//!
//! Every field becomes a line `\tag value`, each line introduced by a
//! newline. Nesting is lost; element boundaries only start a new record
//! line.

use std::io::Write;

use super::{Attributes, Output, Settings};
use crate::{error::Result, model::TsString};

pub const MARKER: char = '\\';

pub struct SfOutput<'w> {
  out: &'w mut dyn Write,
  settings: Settings,
}

impl<'w> SfOutput<'w> {
  pub fn new(out: &'w mut dyn Write, settings: Settings) -> Self {
    Self { out, settings }
  }

  fn line(&mut self, tag: &str, value: Option<&str>) -> Result<()> {
    let mut s = format!("\n{MARKER}{tag}");
    if let Some(v) = value {
      s.push(' ');
      s.push_str(&self.settings.normalise(v));
    }
    self.out.write_all(s.as_bytes())?;
    Ok(())
  }
}

impl<'w> Output for SfOutput<'w> {
  fn start_element(&mut self, name: &str, attributes: &Attributes) -> Result<()> {
    let values: Vec<&str> = attributes.values().map(String::as_str).collect();
    if values.is_empty() {
      self.line(name, None)
    } else {
      self.line(name, Some(&values.join(" ")))
    }
  }

  fn end_element(&mut self, _name: &str) -> Result<()> {
    Ok(())
  }

  fn simple_field(&mut self, name: &str, value: &TsString, _ws: Option<&str>) -> Result<()> {
    self.line(name, Some(&value.text()))
  }

  fn trait_field(&mut self, name: &str, value: &str) -> Result<()> {
    self.line(name, Some(value))
  }

  fn alternatives(&mut self, name: &str, _wrap: Option<&str>, alternatives: &[(String, &TsString)]) -> Result<()> {
    for (ws, text) in alternatives {
      self.line(&format!("{name}_{ws}"), Some(&text.text()))?;
    }
    Ok(())
  }

  fn reference(&mut self, name: &str, target: &str, _ord: Option<usize>) -> Result<()> {
    self.line(name, Some(target))
  }

  fn raw(&mut self, text: &str) -> Result<()> {
    self.out.write_all(self.settings.normalise(text).as_bytes())?;
    Ok(())
  }

  fn comment(&mut self, _text: &str) -> Result<()> {
    Ok(())
  }

  fn flush(&mut self) -> Result<()> {
    self.out.flush()?;
    Ok(())
  }
}

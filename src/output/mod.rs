//! Output writers
//!
//! One traversal drives either writer. Every value handed to a writer is
//! normalised before it reaches the stream; names are written as given.

use std::{collections::BTreeMap, io::Write};

use crate::{error::Result, model::TsString, utils::normalise, Normalization, OutputFormat, RunStyle, WsLabel};

pub mod sf;
pub mod xml;

/// Attributes of an element, kept in name order.
pub type Attributes = BTreeMap<String, String>;

/// Run-wide writer settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Settings {
  pub normalization: Normalization,
  pub run_style: RunStyle,
  pub ws_label: WsLabel,
}

impl Settings {
  pub fn normalise(&self, s: &str) -> String {
    normalise(s, self.normalization)
  }
}

pub trait Output {
  fn start_element(&mut self, name: &str, attributes: &Attributes) -> Result<()>;

  fn end_element(&mut self, name: &str) -> Result<()>;

  /// A single-valued field. `ws` is the locale the value is written in, if
  /// it has one.
  fn simple_field(&mut self, name: &str, value: &TsString, ws: Option<&str>) -> Result<()>;

  /// A field written in its `name`/`value` shorthand form.
  fn trait_field(&mut self, name: &str, value: &str) -> Result<()>;

  /// One value per locale. With `wrap`, the values are enclosed in a single
  /// `name` element and each one is named `wrap`.
  fn alternatives(&mut self, name: &str, wrap: Option<&str>, alternatives: &[(String, &TsString)]) -> Result<()>;

  /// A cross-reference marker. `ord` is 1-based.
  fn reference(&mut self, name: &str, target: &str, ord: Option<usize>) -> Result<()>;

  /// Literal text, written unescaped.
  fn raw(&mut self, text: &str) -> Result<()>;

  fn comment(&mut self, text: &str) -> Result<()>;

  fn flush(&mut self) -> Result<()>;
}

pub fn writer<'w>(format: OutputFormat, settings: Settings, out: &'w mut dyn Write) -> Box<dyn Output + 'w> {
  match format {
    OutputFormat::Xml => Box::new(xml::XmlOutput::new(out, settings)),
    OutputFormat::Sf => Box::new(sf::SfOutput::new(out, settings)),
  }
}

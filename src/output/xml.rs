//! Nested markup writer

use std::io::Write;

use super::{Attributes, Output, Settings};
use crate::{error::Result, model::TsString, RunStyle};

pub const RUN_TAG: &str = "Run";
pub const STYLE_ATTRIBUTE: &str = "namedStyle";
pub const TRAIT_TAG: &str = "trait";

pub struct XmlOutput<'w> {
  out: &'w mut dyn Write,
  settings: Settings,
}

impl<'w> XmlOutput<'w> {
  pub fn new(out: &'w mut dyn Write, settings: Settings) -> Self {
    Self { out, settings }
  }

  fn text(&self, s: &str) -> String {
    escape_text(&self.settings.normalise(s))
  }

  fn attribute(&self, s: &str) -> String {
    escape_attribute_value(&self.settings.normalise(s))
  }

  /// Content of a formatted string. Plain strings become bare text;
  /// anything else is written run by run.
  fn runs(&self, value: &TsString, ambient: Option<&str>) -> String {
    if value.is_plain_in(ambient.unwrap_or_default()) {
      return self.text(&value.text());
    }
    let label = self.settings.ws_label.attribute();
    let mut s = String::new();
    for run in &value.runs {
      s.push('<');
      s.push_str(RUN_TAG);
      let ws = match self.settings.run_style {
        RunStyle::Full => run.ws.as_deref().or(ambient),
        RunStyle::Ambient => run.ws.as_deref().filter(|w| Some(*w) != ambient),
      };
      if let Some(ws) = ws {
        s.push_str(&format!(" {}=\"{}\"", label, self.attribute(ws)));
      }
      if let Some(style) = &run.style {
        s.push_str(&format!(" {}=\"{}\"", STYLE_ATTRIBUTE, self.attribute(style)));
      }
      s.push('>');
      s.push_str(&self.text(&run.text));
      s.push_str(&format!("</{RUN_TAG}>"));
    }
    s
  }

  fn tagged(&self, name: &str, ws: Option<&str>, value: &TsString) -> String {
    let ws_attr = ws
      .map(|w| format!(" {}=\"{}\"", self.settings.ws_label.attribute(), self.attribute(w)))
      .unwrap_or_default();
    format!("<{name}{ws_attr}>{}</{name}>", self.runs(value, ws))
  }
}

impl<'w> Output for XmlOutput<'w> {
  fn start_element(&mut self, name: &str, attributes: &Attributes) -> Result<()> {
    let mut s = format!("<{name}");
    for (k, v) in attributes {
      s.push_str(&format!(" {}=\"{}\"", k, self.attribute(v)));
    }
    s.push('>');
    self.out.write_all(s.as_bytes())?;
    Ok(())
  }

  fn end_element(&mut self, name: &str) -> Result<()> {
    write!(self.out, "</{name}>")?;
    Ok(())
  }

  fn simple_field(&mut self, name: &str, value: &TsString, ws: Option<&str>) -> Result<()> {
    let s = format!("<{name}>{}</{name}>", self.runs(value, ws));
    self.out.write_all(s.as_bytes())?;
    Ok(())
  }

  fn trait_field(&mut self, name: &str, value: &str) -> Result<()> {
    let s = format!(
      "<{TRAIT_TAG} name=\"{}\" value=\"{}\"/>",
      escape_attribute_value(name),
      self.attribute(value)
    );
    self.out.write_all(s.as_bytes())?;
    Ok(())
  }

  fn alternatives(&mut self, name: &str, wrap: Option<&str>, alternatives: &[(String, &TsString)]) -> Result<()> {
    let s = match wrap {
      Some(inner) => {
        let body: String = alternatives
          .iter()
          .map(|(ws, t)| self.tagged(inner, Some(ws), t))
          .collect();
        format!("<{name}>{body}</{name}>")
      }
      None => alternatives
        .iter()
        .map(|(ws, t)| self.tagged(name, Some(ws), t))
        .collect(),
    };
    self.out.write_all(s.as_bytes())?;
    Ok(())
  }

  fn reference(&mut self, name: &str, target: &str, ord: Option<usize>) -> Result<()> {
    let ord = ord.map(|n| format!(" ord=\"{n}\"")).unwrap_or_default();
    write!(self.out, "<{name} target=\"{}\"{ord}/>", self.attribute(target))?;
    Ok(())
  }

  fn raw(&mut self, text: &str) -> Result<()> {
    self.out.write_all(self.settings.normalise(text).as_bytes())?;
    Ok(())
  }

  fn comment(&mut self, text: &str) -> Result<()> {
    write!(self.out, "<!--{}-->", self.settings.normalise(text))?;
    Ok(())
  }

  fn flush(&mut self) -> Result<()> {
    self.out.flush()?;
    Ok(())
  }
}

/// Escape special characters in XML text content.
pub fn escape_text(s: &str) -> String {
  let mut result = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '<' => result.push_str("&lt;"),
      '>' => result.push_str("&gt;"),
      '&' => result.push_str("&amp;"),
      _ => result.push(c),
    }
  }
  result
}

/// Escape special characters in XML attribute values.
pub fn escape_attribute_value(s: &str) -> String {
  let mut result = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '<' => result.push_str("&lt;"),
      '>' => result.push_str("&gt;"),
      '&' => result.push_str("&amp;"),
      '"' => result.push_str("&quot;"),
      _ => result.push(c),
    }
  }
  result
}

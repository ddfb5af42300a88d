//! Template-driven object graph export.
//!
//! A template document declares, per domain class, how objects of that class
//! are written out. The [`Dumper`] walks the template and the live object
//! graph (reached through an [`ObjectAccessor`]) together and streams either
//! nested markup or flat tag-records.

use core::fmt;

pub mod catalog;
pub mod condition;
pub mod dumper;
pub mod element_builder;
pub mod error;
pub mod fields;
pub mod interpreter;
pub mod langtags;
pub mod memory;
pub mod model;
pub mod output;
pub mod template;
pub mod utils;

pub use dumper::{CancelHandle, DumpOptions, Dumper, Outcome, ProgressEvent};
pub use error::{AccessError, DumpError, Result};
pub use memory::MemoryModel;
pub use model::{LocaleStrings, ObjRef, ObjectAccessor, Run, TsString, Value};
pub use template::Template;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Xml,
    Sf,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Xml
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml => f.write_str("xml"),
            Self::Sf => f.write_str("sf"),
        }
    }
}

impl core::str::FromStr for OutputFormat {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "xml" => Ok(Self::Xml),
            "sf" => Ok(Self::Sf),
            _ => Err(anyhow::anyhow!("Incorrect output format type")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Normalization {
    None,
    Nfc,
    Nfd,
    Nfkc,
    Nfkd,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::Nfc
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Nfc => f.write_str("nfc"),
            Self::Nfd => f.write_str("nfd"),
            Self::Nfkc => f.write_str("nfkc"),
            Self::Nfkd => f.write_str("nfkd"),
        }
    }
}

impl core::str::FromStr for Normalization {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "nfc" => Ok(Self::Nfc),
            "nfd" => Ok(Self::Nfd),
            "nfkc" => Ok(Self::Nfkc),
            "nfkd" => Ok(Self::Nfkd),
            _ => Err(anyhow::anyhow!("Incorrect normalization form")),
        }
    }
}

/// How object identity is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdStyle {
    Numeric,
    Guid,
}

impl Default for IdStyle {
    fn default() -> Self {
        Self::Numeric
    }
}

impl fmt::Display for IdStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => f.write_str("numeric"),
            Self::Guid => f.write_str("guid"),
        }
    }
}

impl core::str::FromStr for IdStyle {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "numeric" => Ok(Self::Numeric),
            "guid" => Ok(Self::Guid),
            _ => Err(anyhow::anyhow!("Incorrect identity style")),
        }
    }
}

/// Which locale is taken as ambient when writing formatted runs.
///
/// `Full` restates the locale on every run. `Ambient` treats the locale of the
/// enclosing alternative as implied and only writes it on runs that differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStyle {
    Full,
    Ambient,
}

impl Default for RunStyle {
    fn default() -> Self {
        Self::Ambient
    }
}

impl fmt::Display for RunStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Ambient => f.write_str("ambient"),
        }
    }
}

impl core::str::FromStr for RunStyle {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "ambient" => Ok(Self::Ambient),
            _ => Err(anyhow::anyhow!("Incorrect run style")),
        }
    }
}

/// Name of the attribute carrying a locale tag in nested markup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WsLabel {
    Ws,
    Lang,
}

impl WsLabel {
    pub fn attribute(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Lang => "lang",
        }
    }
}

impl Default for WsLabel {
    fn default() -> Self {
        Self::Ws
    }
}

impl fmt::Display for WsLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute())
    }
}

impl core::str::FromStr for WsLabel {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "ws" => Ok(Self::Ws),
            "lang" => Ok(Self::Lang),
            _ => Err(anyhow::anyhow!("Incorrect locale attribute style")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateFormat {
    /// `yyyy-MM-dd`
    Iso,
    /// `dd/MMM/yyyy`
    DayMonthYear,
}

impl DateFormat {
    pub(crate) fn pattern(self) -> &'static str {
        match self {
            Self::Iso => "%Y-%m-%d",
            Self::DayMonthYear => "%d/%b/%Y",
        }
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        Self::Iso
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iso => f.write_str("yyyy-MM-dd"),
            Self::DayMonthYear => f.write_str("dd/MMM/yyyy"),
        }
    }
}

impl core::str::FromStr for DateFormat {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "yyyy-MM-dd" => Ok(Self::Iso),
            "dd/MMM/yyyy" => Ok(Self::DayMonthYear),
            _ => Err(anyhow::anyhow!("Incorrect date format")),
        }
    }
}

/// Parses the loose boolean spellings found in template attributes.
pub(crate) fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_round_trip_through_display() {
        for f in [OutputFormat::Xml, OutputFormat::Sf] {
            assert_eq!(f.to_string().parse::<OutputFormat>().unwrap(), f);
        }
        assert_eq!("NFD".parse::<Normalization>().unwrap(), Normalization::Nfd);
        assert!("bogus".parse::<RunStyle>().is_err());
        assert_eq!("dd/MMM/yyyy".parse::<DateFormat>().unwrap(), DateFormat::DayMonthYear);
    }

    #[test]
    fn flag_spellings() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag(" no "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}

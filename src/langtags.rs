//! Locale selectors
//!
//! A multilingual template node names the locales it wants either
//! generically (`every`, `all analysis`, `best vernacular`, ...) or as an
//! explicit list of BCP 47 tags.

use itertools::Itertools;
use language_tags::LanguageTag;

use crate::{
  error::{DumpError, Result},
  model::{LocaleStrings, ObjectAccessor, TsString, WsKind},
  utils::split_list,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsSelector {
  /// Every locale that has data.
  Every,
  /// All locales of an intent, in preference order, that have data.
  All(WsKind),
  /// The first locale of an intent that has data.
  Best(WsKind),
  /// The listed locales that have data, in list order.
  Explicit(Vec<String>),
}

impl WsSelector {
  pub fn parse(s: &str) -> Result<Self> {
    let norm = s.split_whitespace().join(" ").to_ascii_lowercase();
    Ok(match norm.as_str() {
      "every" | "all" => Self::Every,
      "all analysis" => Self::All(WsKind::Analysis),
      "all vernacular" => Self::All(WsKind::Vernacular),
      "analysis" | "best analysis" => Self::Best(WsKind::Analysis),
      "vernacular" | "best vernacular" => Self::Best(WsKind::Vernacular),
      _ => {
        let tags = split_list(s);
        for tag in &tags {
          validate(tag)?;
        }
        Self::Explicit(tags)
      }
    })
  }

  /// Alternatives of `strings` selected by this selector. Locales without
  /// text are never selected.
  pub fn select<'s, A: ObjectAccessor + ?Sized>(
    &self,
    strings: &'s LocaleStrings,
    accessor: &A,
  ) -> Vec<(String, &'s TsString)> {
    match self {
      Self::Every => strings.iter().map(|(w, t)| (w.to_string(), t)).collect(),
      Self::All(kind) => accessor
        .writing_systems(*kind)
        .into_iter()
        .filter_map(|ws| strings.get(&ws).map(|t| (ws, t)))
        .collect(),
      Self::Best(kind) => {
        let wss = accessor.writing_systems(*kind);
        strings
          .best(&wss)
          .map(|(w, t)| vec![(w.to_string(), t)])
          .unwrap_or_default()
      }
      Self::Explicit(list) => list
        .iter()
        .filter_map(|ws| strings.get(ws).map(|t| (ws.clone(), t)))
        .collect(),
    }
  }

  /// Locales to try when values are produced one locale at a time by a
  /// method rather than read as a whole.
  pub fn candidates<A: ObjectAccessor + ?Sized>(&self, accessor: &A) -> Vec<String> {
    match self {
      Self::Every => accessor
        .writing_systems(WsKind::Analysis)
        .into_iter()
        .chain(accessor.writing_systems(WsKind::Vernacular))
        .unique()
        .collect(),
      Self::All(kind) | Self::Best(kind) => accessor.writing_systems(*kind),
      Self::Explicit(list) => list.clone(),
    }
  }

  /// Whether only the first locale with data is wanted.
  pub fn is_single(&self) -> bool {
    matches!(self, Self::Best(_))
  }
}

/// Checks that `tag` is a well-formed BCP 47 tag.
pub fn validate(tag: &str) -> Result<()> {
  LanguageTag::parse(tag)
    .map(|_| ())
    .map_err(|_| DumpError::MalformedLocale(tag.to_string()))
}

//! Various utility functions used by the dumper

use std::{
  collections::HashMap,
  fs, io,
  path::{Path, PathBuf},
};

use lazy_regex::{regex, regex_replace_all};
use log::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::Normalization;

pub fn nfc(s: &str) -> String {
  s.nfc().collect()
}

pub fn nfd(s: &str) -> String {
  s.nfd().collect()
}

pub fn nfkc(s: &str) -> String {
  s.nfkc().collect()
}

pub fn nfkd(s: &str) -> String {
  s.nfkd().collect()
}

/// Applies the run's normalization form to a value about to be written.
pub fn normalise(s: &str, form: Normalization) -> String {
  match form {
    Normalization::None => s.to_string(),
    Normalization::Nfc => nfc(s),
    Normalization::Nfd => nfd(s),
    Normalization::Nfkc => nfkc(s),
    Normalization::Nfkd => nfkd(s),
  }
}

/// Splits a template list attribute on commas and/or whitespace.
pub fn split_list(s: &str) -> Vec<String> {
  regex!(r"[\s,]+")
    .split(s.trim())
    .filter(|p| !p.is_empty())
    .map(str::to_string)
    .collect()
}

/// Replaces `${name}` placeholders from `map`. Unknown placeholders are left
/// as they are.
pub fn substitute_placeholders(s: &str, map: &HashMap<&str, String>) -> String {
  if !s.contains("${") {
    return s.to_string();
  }
  regex_replace_all!(r"\$\{([A-Za-z]+)\}", s, |whole: &str, key: &str| {
    map.get(key).cloned().unwrap_or_else(|| whole.to_string())
  })
  .into_owned()
}

/// Path of the auxiliary output: the primary path with its extension
/// replaced.
pub fn auxiliary_path(primary: &Path, extension: &str) -> PathBuf {
  primary.with_extension(extension.trim_start_matches('.'))
}

/// Copies `src` to `dest` unless there is nothing to do.
///
/// A missing source or an existing destination is not a failure. Returns
/// whether a copy happened.
pub fn copy_if_absent(src: &Path, dest: &Path) -> io::Result<bool> {
  if !src.is_file() {
    debug!("External file '{}' does not exist, not copying", src.display());
    return Ok(false);
  }
  if dest.exists() {
    debug!("'{}' already exists, not copying", dest.display());
    return Ok(false);
  }
  if let Some(dir) = dest.parent() {
    fs::create_dir_all(dir)?;
  }
  fs::copy(src, dest)?;
  Ok(true)
}

/// Best-effort wrapper around [`copy_if_absent`]; failures are logged only.
pub fn copy_best_effort(src: &Path, dest: &Path) -> bool {
  match copy_if_absent(src, dest) {
    Ok(copied) => copied,
    Err(e) => {
      warn!("Could not copy '{}' to '{}': {}", src.display(), dest.display(), e);
      false
    }
  }
}

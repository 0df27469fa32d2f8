//! The AWS shared credentials file.
//!
//! An INI-style file of named sections (profiles), each a set of
//! `key = value` options, read and rendered with `configparser`. Sections
//! are merged rather than replaced, and the file is always rendered with
//! sections in name order so repeated runs produce identical output.
//!
//! Section names are case-sensitive. Option names are case-insensitive and
//! stored lowercase. `#` and `;` start a comment only at the beginning of a
//! line, so values may contain either character.

use configparser::ini::{Ini, WriteOptions};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::storage::StorageError;

/// Options of a single profile, in key order
pub type Section = BTreeMap<String, String>;

/// File name of the shared credentials file under the configuration root
pub const CREDENTIALS_FILE_NAME: &str = "credentials";

/// configparser's implicit section for options above the first header.
/// An explicit `[]` header lands here too; both are rejected.
const NO_SECTION: &str = "";

#[derive(Debug, Error)]
pub enum CredentialsFileError {
    #[error("Unable to parse credentials file: {0}")]
    Parse(String),

    /// `name` identifies the offending entry; values themselves are never
    /// included since they are usually secrets
    #[error("Invalid {field} {name:?}: {reason}")]
    InvalidEntry {
        field: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("Configuration directory has invalid permissions")]
    UnsafeRoot,

    #[error("Caching is disabled")]
    CachingDisabled,

    #[error("Unable to write credentials file: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialsFile {
    sections: BTreeMap<String, Section>,
}

fn ini() -> Ini {
    let mut defaults = Ini::new_cs().defaults();
    defaults.default_section = NO_SECTION.to_string();
    defaults.enable_inline_comments = false;
    defaults.multiline = false;
    Ini::new_from_defaults(defaults)
}

impl CredentialsFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(contents: &str) -> Result<Self, CredentialsFileError> {
        let mut parser = ini();
        parser
            .read(contents.to_string())
            .map_err(CredentialsFileError::Parse)?;

        let mut file = Self::new();
        for (name, options) in parser.get_map_ref() {
            if name.as_str() == NO_SECTION {
                return Err(CredentialsFileError::Parse(
                    "option outside of a section or empty section name".to_string(),
                ));
            }

            file.sections.entry(name.clone()).or_default();
            for (key, value) in options {
                let value = value.as_deref().ok_or_else(|| {
                    CredentialsFileError::Parse(format!("option {key:?} in [{name}] has no value"))
                })?;
                file.set(name, key, value);
            }
        }

        Ok(file)
    }

    /// Set a single option, creating the section if needed
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_lowercase(), value.into());
    }

    /// Merge `new_sections` into this file.
    ///
    /// Missing sections are created, even when they carry no options. Within
    /// a section, options from `new_sections` overwrite options of the same
    /// name and every other option is left untouched.
    pub fn merge(&mut self, new_sections: &CredentialsFile) {
        for (name, options) in &new_sections.sections {
            let section = self.sections.entry(name.clone()).or_default();
            for (key, value) in options {
                section.insert(key.clone(), value.clone());
            }
        }
    }

    /// Check that every name and value renders as exactly one header or
    /// option line and parses back unchanged.
    pub fn validate(&self) -> Result<(), CredentialsFileError> {
        for (name, options) in &self.sections {
            check_section_name(name)?;
            for (key, value) in options {
                check_key(key)?;
                check_value(name, key, value)?;
            }
        }
        Ok(())
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)?
            .get(&key.to_lowercase())
            .map(String::as_str)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn to_ini(&self) -> Ini {
        let mut ini = ini();
        for (name, options) in &self.sections {
            ini.get_mut_map().entry(name.clone()).or_default();
            for (key, value) in options {
                ini.set(name, key, Some(value.clone()));
            }
        }
        ini
    }
}

fn invalid(field: &'static str, name: &str, reason: &'static str) -> CredentialsFileError {
    CredentialsFileError::InvalidEntry {
        field,
        name: name.to_string(),
        reason,
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\n', '\r'])
}

fn has_outer_whitespace(s: &str) -> bool {
    s.trim() != s
}

fn check_section_name(name: &str) -> Result<(), CredentialsFileError> {
    if name.is_empty() {
        return Err(invalid("section name", name, "must not be empty"));
    }
    if has_line_break(name) || name.contains(['[', ']']) {
        return Err(invalid("section name", name, "must not contain brackets or line breaks"));
    }
    if has_outer_whitespace(name) {
        return Err(invalid("section name", name, "must not start or end with whitespace"));
    }
    Ok(())
}

fn check_key(key: &str) -> Result<(), CredentialsFileError> {
    if key.is_empty() {
        return Err(invalid("option name", key, "must not be empty"));
    }
    if has_line_break(key) || key.contains(['=', ':']) {
        return Err(invalid("option name", key, "must not contain delimiters or line breaks"));
    }
    if key.starts_with(['#', ';', '[']) {
        return Err(invalid("option name", key, "must not start with a comment or header character"));
    }
    if has_outer_whitespace(key) {
        return Err(invalid("option name", key, "must not start or end with whitespace"));
    }
    Ok(())
}

fn check_value(section: &str, key: &str, value: &str) -> Result<(), CredentialsFileError> {
    let name = format!("[{section}] {key}");
    if has_line_break(value) {
        return Err(invalid("value of", &name, "must not contain line breaks"));
    }
    if has_outer_whitespace(value) {
        return Err(invalid("value of", &name, "must not start or end with whitespace"));
    }
    Ok(())
}

impl FromIterator<(String, Section)> for CredentialsFile {
    fn from_iter<I: IntoIterator<Item = (String, Section)>>(iter: I) -> Self {
        let mut file = Self::new();
        for (name, options) in iter {
            file.sections.entry(name.clone()).or_default();
            for (key, value) in options {
                file.set(&name, &key, value);
            }
        }
        file
    }
}

impl fmt::Display for CredentialsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options = WriteOptions::new_with_params(true, 4, 1);
        f.write_str(&self.to_ini().pretty_writes(&options))
    }
}

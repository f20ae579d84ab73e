//! Resource identities
//!
//! `{{var}}` template substitution for identities and lock keys, and matching
//! of import ids against a resource's accepted formats.

use crate::error::{ProviderError, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// Named values substituted into templates or captured from import ids
pub type Vars = BTreeMap<String, String>;

/// Substitute every `{{name}}` in `template`. A variable that is missing or
/// empty is an error.
pub fn replace_vars(template: &str, vars: &Vars) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated placeholder, keep it literally
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        match vars.get(name) {
            Some(value) if !value.is_empty() => out.push_str(value),
            _ => return Err(ProviderError::MissingValue(name.to_string())),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Match `id` against `formats` in order and return the named captures of the
/// first format that matches
pub fn parse_import_id(id: &str, formats: &[String]) -> Result<Vars> {
    for format in formats {
        let re = Regex::new(format).map_err(|e| ProviderError::Manifest(e.to_string()))?;
        let Some(caps) = re.captures(id) else {
            continue;
        };

        tracing::debug!("Import id {:?} matched {:?}", id, format);
        let vars = re
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        return Ok(vars);
    }

    Err(ProviderError::ImportMismatch {
        id: id.to_string(),
        formats: formats.to_vec(),
    })
}

/// Build a [`Vars`] map from literal pairs
pub fn vars<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vars {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

//! Shared helpers for naming and validation.

use std::borrow::Cow;

use thiserror::Error;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

/// Maximum length of a stored file name.
pub const MAX_FILE_NAME_LENGTH: usize = 128;

/// Fallback used when a sanitized file name ends up empty.
const DEFAULT_FILE_NAME: &str = "document";

/// Error returned when an enum value cannot be parsed from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Make a user-supplied file name safe for an object key.
///
/// - Whitespace runs become a single underscore
/// - Path separators and control characters are dropped
/// - Leading dots are removed (no hidden files or `..`)
/// - Length is capped, keeping the extension where possible
pub fn sanitize_file_name(name: &str) -> String {
    // Only keep the last path component (browsers on Windows may send full paths)
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let mut out = String::with_capacity(base.len());
    let mut last_was_underscore = false;
    for c in base.trim().chars() {
        if c.is_whitespace() {
            if !last_was_underscore {
                out.push('_');
                last_was_underscore = true;
            }
            continue;
        }
        if c.is_control() || matches!(c, '"' | '\'' | '<' | '>' | ':' | '|' | '?' | '*') {
            continue;
        }
        out.push(c);
        last_was_underscore = c == '_';
    }

    let out = out.trim_start_matches('.').to_string();
    if out.is_empty() {
        return DEFAULT_FILE_NAME.to_string();
    }

    if out.chars().count() <= MAX_FILE_NAME_LENGTH {
        return out;
    }

    match out.rsplit_once('.') {
        Some((stem, ext)) if ext.len() < 16 => {
            let keep = MAX_FILE_NAME_LENGTH - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{}.{}", stem, ext)
        }
        _ => out.chars().take(MAX_FILE_NAME_LENGTH).collect(),
    }
}

/// Reject strings that are empty once trimmed.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message(Cow::Borrowed("must not be blank")));
    }
    Ok(())
}

/// Flatten validator errors into a single human-readable message.
///
/// Field paths are dotted for nested structs, e.g. `company.contactEmail`.
pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();
    collect_errors("", errors, &mut messages);
    messages.sort();
    messages.join("; ")
}

fn collect_errors(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for e in errs {
                    let msg = e.message.as_deref().unwrap_or(e.code.as_ref());
                    out.push(format!("{}: {}", path, msg));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (i, inner) in items {
                    collect_errors(&format!("{}[{}]", path, i), inner, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_becomes_underscore() {
        assert_eq!(sanitize_file_name("My  CV final.pdf"), "My_CV_final.pdf");
    }

    #[test]
    fn test_strips_paths_and_traversal() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\resume.pdf"), "resume.pdf");
        assert_eq!(sanitize_file_name("..hidden.pdf"), "hidden.pdf");
    }

    #[test]
    fn test_empty_name_falls_back() {
        assert_eq!(sanitize_file_name("   "), "document");
        assert_eq!(sanitize_file_name("..."), "document");
    }

    #[test]
    fn test_long_name_keeps_extension() {
        let long = format!("{}.pdf", "a".repeat(300));
        let out = sanitize_file_name(&long);
        assert_eq!(out.chars().count(), MAX_FILE_NAME_LENGTH);
        assert!(out.ends_with(".pdf"));
    }
}

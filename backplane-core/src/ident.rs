//! Identifier helpers shared by the type and backend models.

use crate::error::IdentError;

/// Check that `name` is a valid backend name.
///
/// Valid names use the plugin entry-point charset: alphanumerics plus
/// `_`, `.` and `-`.
pub fn valid_backend_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Split a `"namespace:dotted.path"` identifier into its two halves.
///
/// Exactly one `:` is required and both halves must be non-empty.
pub fn split_symbol(ident: &str) -> Result<(&str, &str), IdentError> {
    match ident.split_once(':') {
        Some((ns, path)) if !ns.is_empty() && !path.is_empty() && !path.contains(':') => {
            Ok((ns, path))
        }
        _ => Err(IdentError::Malformed(ident.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{split_symbol, valid_backend_name};

    #[test]
    fn backend_names() {
        assert!(valid_backend_name("fast_int"));
        assert!(valid_backend_name("org.example-backend"));
        assert!(!valid_backend_name(""));
        assert!(!valid_backend_name("has space"));
        assert!(!valid_backend_name("colon:name"));
    }

    #[test]
    fn symbols() {
        assert_eq!(split_symbol("pkg:mod.func").unwrap(), ("pkg", "mod.func"));
        assert!(split_symbol("noseparator").is_err());
        assert!(split_symbol(":path").is_err());
        assert!(split_symbol("ns:").is_err());
        assert!(split_symbol("a:b:c").is_err());
    }
}

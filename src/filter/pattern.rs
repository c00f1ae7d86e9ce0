//! Filter pattern compilation.
//!
//! Two pattern forms are accepted:
//!
//! - `/body/flags` compiles `body` as a regular expression. Flags: `i` for
//!   case-insensitive, `m` for multi-line.
//! - anything else is a word pattern: whitespace separates alternatives, `*`
//!   matches any run of non-space characters, and matching ignores case.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use super::FilterError;

static REGEX_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(.+)/([a-z]*)$").expect("Invalid regex form pattern"));

/// Compile a user-supplied filter pattern.
///
/// # Errors
///
/// Returns an error if the pattern is empty, carries an unknown flag, or the
/// regex body does not compile.
pub fn compile(pattern: &str) -> Result<Regex, FilterError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(FilterError::EmptyPattern);
    }

    if let Some(caps) = REGEX_FORM.captures(trimmed) {
        let body = &caps[1];
        let mut builder = RegexBuilder::new(body);
        for flag in caps[2].chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                other => {
                    return Err(FilterError::UnknownFlag {
                        pattern: pattern.to_string(),
                        flag: other,
                    })
                }
            };
        }
        return builder.build().map_err(|source| FilterError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        });
    }

    let alternatives: Vec<String> = trimmed
        .split_whitespace()
        .map(|word| regex::escape(word).replace(r"\*", r"\S*"))
        .collect();

    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map_err(|source| FilterError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_form() {
        let re = compile("/^rust\\b/i").unwrap();
        assert!(re.is_match("Rust general"));
        assert!(!re.is_match("trust me"));

        let case_sensitive = compile("/Rust/").unwrap();
        assert!(case_sensitive.is_match("Rust"));
        assert!(!case_sensitive.is_match("rust"));
    }

    #[test]
    fn test_word_form() {
        let re = compile("rust golang").unwrap();
        assert!(re.is_match("I like GOLANG"));
        assert!(re.is_match("rustaceans"));
        assert!(!re.is_match("python"));
    }

    #[test]
    fn test_wildcard() {
        let re = compile("/g/*thread").unwrap();
        // Not a regex form because the trailing part is not flags.
        assert!(re.is_match("/g/desktop-thread"));
        assert!(!re.is_match("/g/ thread"));

        let re = compile("rust*general").unwrap();
        assert!(re.is_match("rust-general"));
        assert!(re.is_match("rustgeneral"));
        assert!(!re.is_match("rust general"));
    }

    #[test]
    fn test_special_chars_are_literal() {
        let re = compile("c++").unwrap();
        assert!(re.is_match("learning C++ today"));
        assert!(!re.is_match("c"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(compile("   "), Err(FilterError::EmptyPattern)));
        assert!(matches!(
            compile("/rust/x"),
            Err(FilterError::UnknownFlag { flag: 'x', .. })
        ));
        assert!(matches!(
            compile("/(unclosed/"),
            Err(FilterError::InvalidRegex { .. })
        ));
    }
}

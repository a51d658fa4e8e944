//! Slug derivation and category path splitting

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Path delimiters, checked in priority order; the first one present wins
const PATH_DELIMITERS: [&str; 4] = [" | ", "|", " > ", ">"];

/// URL-safe slug: diacritics stripped via canonical decomposition,
/// lowercased, every run of non-alphanumerics collapsed to one hyphen,
/// no leading or trailing hyphen.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.nfd().filter(|c| !is_combining_mark(*c)) {
        for lower in c.to_lowercase() {
            if lower.is_ascii_alphanumeric() {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(lower);
            } else {
                pending_hyphen = true;
            }
        }
    }

    slug
}

/// Split a category path into trimmed, non-empty segments, root first
pub fn split_category_path(path: &str) -> Vec<String> {
    let path = path.trim();
    if path.is_empty() {
        return Vec::new();
    }

    let segments: Vec<&str> = match PATH_DELIMITERS.iter().find(|d| path.contains(**d)) {
        Some(delimiter) => path.split(*delimiter).collect(),
        None => vec![path],
    };

    segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// First `max` characters of `s`, never splitting a character
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Mobilné telefóny"), "mobilne-telefony");
        assert_eq!(slugify("  TV & Audio  "), "tv-audio");
        assert_eq!(slugify("Žltý kôň -- úpel"), "zlty-kon-upel");
        assert_eq!(slugify("Smartphones"), "smartphones");
        assert_eq!(slugify("4K/UHD"), "4k-uhd");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_slugify_canonical_forms_agree() {
        // Precomposed and combining-mark spellings slug the same
        assert_eq!(slugify("Caf\u{e9}"), "cafe");
        assert_eq!(slugify("Cafe\u{301}"), "cafe");
        assert_eq!(slugify("\u{17d}ltý"), slugify("Z\u{30c}lty\u{301}"));
        // Canonical only: a ligature is not ASCII after NFD
        assert_eq!(slugify("o\u{fb01}ce"), "o-ce");
    }

    #[test]
    fn test_split_pipe_path() {
        assert_eq!(
            split_category_path("Electronics | Phones | Smartphones"),
            vec!["Electronics", "Phones", "Smartphones"]
        );
        assert_eq!(split_category_path("A|B"), vec!["A", "B"]);
    }

    #[test]
    fn test_split_arrow_path() {
        assert_eq!(split_category_path("Home > Garden > Tools"), vec!["Home", "Garden", "Tools"]);
        assert_eq!(split_category_path("Home>Garden"), vec!["Home", "Garden"]);
    }

    #[test]
    fn test_first_delimiter_wins() {
        // Pipe takes priority; the arrow stays inside the segment
        assert_eq!(split_category_path("A | B > C"), vec!["A", "B > C"]);
    }

    #[test]
    fn test_split_degenerate_paths() {
        assert!(split_category_path("   ").is_empty());
        assert_eq!(split_category_path("Toys"), vec!["Toys"]);
        assert_eq!(split_category_path(" | A || B | "), vec!["A", "B"]);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}

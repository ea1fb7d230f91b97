//! Filename sanitization (§4.4 step 1, §9 "Defense-in-depth sanitization").
//!
//! Applied once at ingest for storage, and again at every egress that
//! embeds the stored name in a header or filename — this module exposes a
//! single [sanitize_filename] so both call sites share one definition of
//! "safe".

/// A sanitized, storage-safe decomposition of a declared filename.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizedName {
    /// Basename with no path separators, traversal segments, control
    /// characters, or CR/LF. May be empty if sanitization removed
    /// everything.
    pub origin_name: String,
    /// Lowercased extension without the leading dot. May be empty.
    pub extension: String,
}

/// Strips path separators, null bytes, control characters, and CR/LF from a
/// caller-declared filename; rejects path-traversal segments by discarding
/// them outright rather than erroring (an emptied name is not an error,
/// per §4.4: "reduces to nothing after sanitization" is itself a case to
/// tolerate, not a failure).
pub fn sanitize_filename(declared: &str) -> SanitizedName {
    // Take only the final path component, on either separator style, so a
    // caller-declared path never escapes into `origin_name`.
    let basename = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(declared);

    if basename == "." || basename == ".." {
        return SanitizedName::default();
    }

    let cleaned: String = basename
        .chars()
        .filter(|c| !c.is_control() && *c != '\0')
        .collect();

    let (stem, ext) = match cleaned.rsplit_once('.') {
        // A leading dot with no other dot (dotfile, e.g. ".gitignore") has
        // no extension; keep the whole thing as the stem.
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), ext.to_lowercase()),
        _ => (cleaned.clone(), String::new()),
    };

    let extension = sanitize_extension(&ext);

    SanitizedName {
        origin_name: if extension.is_empty() {
            cleaned
        } else {
            stem
        },
        extension,
    }
}

fn sanitize_extension(ext: &str) -> String {
    ext.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_separators() {
        let s = sanitize_filename("../../etc/passwd");
        assert_eq!(s.origin_name, "passwd");
        assert_eq!(s.extension, "");
    }

    #[test]
    fn strips_windows_path_separators() {
        let s = sanitize_filename(r"C:\Users\a\model.obj");
        assert_eq!(s.origin_name, "model");
        assert_eq!(s.extension, "obj");
    }

    #[test]
    fn lowercases_extension() {
        let s = sanitize_filename("Model.OBJ");
        assert_eq!(s.origin_name, "Model");
        assert_eq!(s.extension, "obj");
    }

    #[test]
    fn dotfile_has_no_extension() {
        let s = sanitize_filename(".gitignore");
        assert_eq!(s.origin_name, ".gitignore");
        assert_eq!(s.extension, "");
    }

    #[test]
    fn pure_traversal_segment_empties_out() {
        let s = sanitize_filename("..");
        assert_eq!(s, SanitizedName::default());
        let s = sanitize_filename(".");
        assert_eq!(s, SanitizedName::default());
    }

    #[test]
    fn strips_control_chars_and_crlf() {
        let s = sanitize_filename("evil\r\n\0name.bin");
        assert_eq!(s.origin_name, "evilname");
        assert_eq!(s.extension, "bin");
    }

    #[test]
    fn empty_input_is_empty_not_an_error() {
        let s = sanitize_filename("");
        assert_eq!(s.origin_name, "");
        assert_eq!(s.extension, "");
    }
}

//! Package archive handling.
//!
//! A `.umb` package is a zip file. Entries are extracted flat into a
//! directory named after the package GUID; nested paths inside the archive
//! are dropped and only file names are kept.

mod zip;

pub use zip::UmbExtractor;
pub(crate) use zip::flat_name;

/// File extension of package archives, without the dot.
pub const PACKAGE_EXTENSION: &str = "umb";

/// Whether `path` has the package extension, ignoring case.
pub fn is_package_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PACKAGE_EXTENSION))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_is_package_file() {
        assert!(is_package_file(Path::new("blog.umb")));
        assert!(is_package_file(Path::new("/tmp/BLOG.UMB")));
        assert!(!is_package_file(Path::new("blog.zip")));
        assert!(!is_package_file(Path::new("umb")));
    }
}

use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

static SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)src="(https://[^"]+\.jpe?g)""#).expect("src pattern compiles")
});

static SRCSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"srcset="([^"]*)""#).expect("srcset pattern compiles"));

static SRCSET_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(https://[^\s,]+\.jpe?g)").expect("srcset entry pattern compiles")
});

/// Collect the unique large-variant JPEG URLs referenced by `src` and
/// `srcset` attributes in `markup`.
pub fn extract_urls<S: AsRef<str>>(markup: &str, markers: &[S]) -> BTreeSet<String> {
    let mut urls = BTreeSet::new();

    for cap in SRC_RE.captures_iter(markup) {
        urls.insert(cap[1].to_string());
    }

    for srcset in SRCSET_RE.captures_iter(markup) {
        for cap in SRCSET_URL_RE.captures_iter(&srcset[1]) {
            urls.insert(cap[1].to_string());
        }
    }

    urls.retain(|url| is_large_variant(url, markers));
    urls
}

pub fn is_large_variant<S: AsRef<str>>(url: &str, markers: &[S]) -> bool {
    markers.iter().any(|m| url.contains(m.as_ref()))
}

/// Read the markup file and extract from it. A missing or unreadable file is
/// logged and treated as containing no URLs.
pub fn load_urls<S: AsRef<str>>(path: &Path, markers: &[S]) -> BTreeSet<String> {
    match fs::read_to_string(path) {
        Ok(markup) => extract_urls(&markup, markers),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::error!("Input file not found: {}", path.display());
            BTreeSet::new()
        }
        Err(e) => {
            log::error!("Failed to read {}: {}", path.display(), e);
            BTreeSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SIZE_MARKERS;
    use tempfile::TempDir;

    const MARKUP: &str = r#"
        <img src="https://cdn.example.com/p/one-cc_ft_1536.jpg">
        <img SRC="https://cdn.example.com/p/two-cc_ft_1344.JPEG" alt="">
        <img src="https://cdn.example.com/p/one-cc_ft_1536.jpg">
        <picture>
          <source srcset="https://cdn.example.com/p/three-cc_ft_768.jpg 768w, https://cdn.example.com/p/three-cc_ft_1152.jpg 1152w">
        </picture>
        <img src="https://cdn.example.com/p/thumb-cc_ft_384.jpg">
        <img src="https://cdn.example.com/p/logo-1536.png">
        <img src="http://cdn.example.com/p/plain-cc_ft_1536.jpg">
    "#;

    #[test]
    fn test_extracts_only_qualifying_urls() {
        let urls = extract_urls(MARKUP, &DEFAULT_SIZE_MARKERS);

        let expected: BTreeSet<String> = [
            "https://cdn.example.com/p/one-cc_ft_1536.jpg",
            "https://cdn.example.com/p/two-cc_ft_1344.JPEG",
            "https://cdn.example.com/p/three-cc_ft_1152.jpg",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(urls, expected);
    }

    #[test]
    fn test_srcset_entries_are_split() {
        let markup = r#"<img srcset="https://a.com/x-1152.jpg 1x,https://a.com/y-1344.jpg 2x">"#;
        let urls = extract_urls(markup, &DEFAULT_SIZE_MARKERS);
        assert_eq!(urls.len(), 2);
        assert!(urls.contains("https://a.com/x-1152.jpg"));
        assert!(urls.contains("https://a.com/y-1344.jpg"));
    }

    #[test]
    fn test_custom_markers() {
        let markup = r#"<img src="https://a.com/huge-4096.jpg"><img src="https://a.com/x-1536.jpg">"#;
        let urls = extract_urls(markup, &["4096"]);
        assert_eq!(urls.len(), 1);
        assert!(urls.contains("https://a.com/huge-4096.jpg"));
    }

    #[test]
    fn test_missing_input_yields_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let urls = load_urls(&temp_dir.path().join("DOM.txt"), &DEFAULT_SIZE_MARKERS);
        assert!(urls.is_empty());
    }

    #[test]
    fn test_undecodable_input_yields_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("DOM.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        assert!(load_urls(&path, &DEFAULT_SIZE_MARKERS).is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("DOM.txt");
        fs::write(&path, MARKUP).unwrap();
        assert_eq!(load_urls(&path, &DEFAULT_SIZE_MARKERS).len(), 3);
    }
}

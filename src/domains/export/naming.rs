use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Substituted when a name sanitizes down to nothing
pub const PLACEHOLDER_NAME: &str = "untitled";

fn disallowed_chars_regex() -> &'static Regex {
    static DISALLOWED_CHARS: OnceLock<Regex> = OnceLock::new();
    DISALLOWED_CHARS.get_or_init(|| Regex::new(r"[^A-Za-z0-9_\- ]").unwrap())
}

fn url_extension_regex() -> &'static Regex {
    static URL_EXTENSION: OnceLock<Regex> = OnceLock::new();
    URL_EXTENSION.get_or_init(|| Regex::new(r"^[A-Za-z0-9]{1,5}$").unwrap())
}

/// Strip everything outside `[A-Za-z0-9_- ]`, trim, and fall back to
/// [`PLACEHOLDER_NAME`] when nothing is left.
///
/// Disallowed characters are removed, not replaced. Callers truncate before
/// sanitizing (see [`file_title`]).
pub fn sanitize(name: &str) -> String {
    let cleaned = disallowed_chars_regex().replace_all(name, "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// First `max_chars` characters of `title` (char boundary safe).
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    title.chars().take(max_chars).collect()
}

/// Truncate then sanitize an optional record title.
pub fn file_title(title: Option<&str>, max_chars: usize) -> String {
    sanitize(&truncate_title(title.unwrap_or(""), max_chars))
}

pub fn date_prefix(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `photo_0001.jpg` style name for the n-th binary asset of the export.
pub fn numbered_asset_name(stem: &str, number: u32, extension: &str) -> String {
    format!("{}_{:04}.{}", stem, number, extension)
}

/// Lower-cased extension of the URL's last path segment, if it looks like one.
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || !url_extension_regex().is_match(ext) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Hands out archive paths, suffixing `-2`, `-3`, ... onto a base name that
/// is already taken.
#[derive(Debug, Default)]
pub struct PathAllocator {
    taken: HashSet<String>,
}

impl PathAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fixed path (readme and the json documents).
    pub fn reserve(&mut self, path: &str) -> bool {
        self.taken.insert(path.to_string())
    }

    /// Reserve `dir/base.ext` for every extension in `extensions`, all under
    /// the same (possibly suffixed) base name. Returns that base name.
    pub fn allocate(&mut self, dir: &str, base: &str, extensions: &[&str]) -> String {
        let mut candidate = base.to_string();
        let mut suffix = 2;
        while extensions
            .iter()
            .any(|ext| self.taken.contains(&Self::join(dir, &candidate, ext)))
        {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        for ext in extensions {
            self.taken.insert(Self::join(dir, &candidate, ext));
        }
        candidate
    }

    pub fn join(dir: &str, base: &str, ext: &str) -> String {
        format!("{}/{}.{}", dir, base, ext)
    }
}

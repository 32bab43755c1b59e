//! Reference dataset layout: `<root>/<person>/<image>.{jpg,jpeg,png}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extensions accepted as reference images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn is_reference_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
}

/// All reference images under `root`, recursively, in sorted order.
///
/// A missing or unreadable root yields an empty list; unreadable
/// subdirectories are skipped.
pub fn reference_images(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_reference_image(entry.path()))
        .map(DirEntry::into_path)
        .collect()
}

/// True when `root` exists and holds at least one reference image.
pub fn is_ready(root: &Path) -> bool {
    root.is_dir() && !reference_images(root).is_empty()
}

/// Display name for an identity path: its parent directory, trimmed and
/// title-cased. `None` when the directory name is empty.
pub fn identity_name(identity: &Path) -> Option<String> {
    let label = identity.parent()?.file_name()?.to_string_lossy();
    let label = label.trim();
    if label.is_empty() {
        None
    } else {
        Some(title_case(label))
    }
}

/// Uppercase the first letter of every run of letters, lowercase the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

/// Reference image count per identity, keyed by display name.
pub fn identities(root: &Path) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for image in reference_images(root) {
        if let Some(name) = identity_name(&image) {
            *counts.entry(name).or_insert(0) += 1;
        }
    }
    counts
}

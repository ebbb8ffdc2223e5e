//! Detect a sidecar cover-art file beside an audio file (§6): `cover.*`,
//! `folder.*`, or `<audio-basename>.{jpg,jpeg,png}` in the same directory.
//!
//! Grounded on the teacher's `cover/sidecar.rs` (same "scan the parent
//! directory's entries, compare lowercased stem/extension" shape), narrowed
//! to the spec's exact filename set instead of the teacher's broader
//! album/front/artwork/albumart list.

use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Find a sidecar cover image for `audio_path`. Returns the first match in
/// directory iteration order among `cover.*`, `folder.*`, and
/// `<basename>.*` candidates.
pub fn find(audio_path: &Path) -> Option<PathBuf> {
    let parent = audio_path.parent()?;
    let basename = audio_path.file_stem()?.to_str()?.to_lowercase();

    let entries = std::fs::read_dir(parent).ok()?;
    let mut best: Option<PathBuf> = None;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_lowercase) else {
            continue;
        };
        let Some(ext) = path.extension().and_then(|s| s.to_str()).map(str::to_lowercase) else {
            continue;
        };
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if stem == "cover" || stem == "folder" || stem == basename {
            best = Some(path);
            break;
        }
    }

    best
}

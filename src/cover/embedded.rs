//! Extract the first embedded picture from an audio file's tags.
//!
//! Grounded on the teacher's `cover/embedded.rs` (same `lofty::probe::Probe`
//! + primary-tag-or-first-tag + front-cover-or-first-picture shape), with
//! the album/artist consistency-check fields dropped — the catalog's
//! cover-art precedence rule (§3) does not need them.

use lofty::file::TaggedFileExt;
use lofty::picture::PictureType;
use lofty::probe::Probe;
use std::path::Path;

/// Read the first embedded picture, if any. Returns raw bytes and a sniffed
/// content type. A fast, synchronous, read-only operation.
pub fn extract(path: &Path) -> Option<(Vec<u8>, String)> {
    let tagged_file = Probe::open(path).ok()?.read().ok()?;
    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag())?;

    let pictures = tag.pictures();
    let picture = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())?;

    let data = picture.data().to_vec();
    let content_type = super::sniff_content_type(&data).to_string();
    Some((data, content_type))
}

/// Whether the file has at least one embedded picture, without copying its
/// bytes — used by the tag reader to set `Song`'s embedded-cover flag
/// during scan without paying for an extra full-image allocation per file.
pub fn has_embedded_picture(path: &Path) -> bool {
    let Ok(Some(tagged_file)) = Probe::open(path).map(|p| p.read().ok()) else {
        return false;
    };
    tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .is_some_and(|t| !t.pictures().is_empty())
}

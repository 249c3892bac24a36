//! Object-store key layout for diary images.
//!
//! Every image lives under `{prefix}/{owner}/`, named after the last segment
//! of its local source plus the attach time, e.g.
//! `images/u42/IMG_0012-1700000000000.jpg`.

use crate::constants::FALLBACK_IMAGE_EXTENSION;
use crate::types::OwnerId;

/// Folder holding all images of `owner`, with a trailing slash.
pub fn owner_prefix(prefix: &str, owner: &OwnerId) -> String {
    format!("{}/{}/", prefix.trim_end_matches('/'), owner)
}

/// Remote key for an image attached from `source_uri` at `millis`.
pub fn image_path(
    prefix: &str,
    owner: &OwnerId,
    source_uri: &str,
    extension: &str,
    millis: i64,
) -> String {
    let ext = extension.trim().trim_start_matches('.');
    let ext = if ext.is_empty() {
        FALLBACK_IMAGE_EXTENSION
    } else {
        ext
    };
    format!(
        "{}{}-{}.{}",
        owner_prefix(prefix, owner),
        last_segment(source_uri),
        millis,
        ext
    )
}

/// Last path segment of a URI, without query or fragment.
fn last_segment(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    let path = uri[..end].trim_end_matches('/');
    match path.rsplit('/').next() {
        Some(seg) if !seg.is_empty() && !seg.ends_with(':') => seg,
        _ => "image",
    }
}

//! Uploaded prescription files.
//!
//! Files land in the configured upload directory under a randomized name so
//! concurrent uploads of identically-named files never collide. Only the
//! MIME allow-list is enforced; file content is not inspected.

use std::io;
use std::path::Path;

use uuid::Uuid;

pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "application/pdf"];

/// Whether a declared content type is acceptable. Falls back to guessing
/// from the filename when the client sent no content type.
pub fn mime_allowed(content_type: Option<&str>, filename: &str) -> bool {
    match content_type {
        Some(ct) => ALLOWED_MIME_TYPES.contains(&ct),
        None => mime_guess::from_path(filename)
            .first()
            .map(|m| ALLOWED_MIME_TYPES.contains(&m.essence_str()))
            .unwrap_or(false),
    }
}

/// Persist upload bytes and return the stored filename
/// (`{uuid}_{sanitized original basename}`).
pub fn save_upload(dir: &Path, original_name: &str, bytes: &[u8]) -> io::Result<String> {
    std::fs::create_dir_all(dir)?;

    let base = sanitize_filename(original_name);
    let stored = format!("{}_{base}", Uuid::new_v4());
    std::fs::write(dir.join(&stored), bytes)?;
    Ok(stored)
}

/// Keep only the basename and strip characters that could escape the
/// upload directory.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

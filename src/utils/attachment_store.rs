use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "jpg", "jpeg", "png"];

/// Lower-cased extension of `filename` if it is on the allow-list.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Drops any directory part and keeps only `[A-Za-z0-9._-]`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "attachment".to_string()
    } else if trimmed.len() < cleaned.len() && !trimmed.contains('.') {
        // `.pdf` is all extension, keep it behind a placeholder stem
        format!("attachment.{trimmed}")
    } else {
        trimmed.to_string()
    }
}

pub fn content_type_for(filename: &str) -> &'static str {
    match allowed_extension(filename).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Stored name: `<YYYYmmddHHMMSS>_<uuid>_<sanitised original>`.
pub fn stored_name(original: &str) -> String {
    format!(
        "{}_{}_{}",
        Local::now().format("%Y%m%d%H%M%S"),
        Uuid::new_v4().to_simple(),
        sanitize_filename(original)
    )
}

/// Resolves a stored name inside `dir`, refusing anything that is not a plain file name.
fn resolve(dir: &Path, name: &str) -> io::Result<PathBuf> {
    if name.is_empty() || name != sanitize_filename(name) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid attachment name",
        ));
    }
    Ok(dir.join(name))
}

/// Writes `bytes` under `dir` and returns the stored name. Blocking.
pub fn save(dir: &Path, original: &str, bytes: &[u8]) -> io::Result<String> {
    std::fs::create_dir_all(dir)?;
    let name = stored_name(original);
    std::fs::write(resolve(dir, &name)?, bytes)?;
    Ok(name)
}

/// Blocking.
pub fn read(dir: &Path, name: &str) -> io::Result<Vec<u8>> {
    std::fs::read(resolve(dir, name)?)
}

/// Blocking. A missing file is not an error.
pub fn remove(dir: &Path, name: &str) -> io::Result<()> {
    match std::fs::remove_file(resolve(dir, name)?) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Strips the storage prefix so downloads get the name the student uploaded.
pub fn display_name(stored: &str) -> &str {
    stored.splitn(3, '_').nth(2).unwrap_or(stored)
}

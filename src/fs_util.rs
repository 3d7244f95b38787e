use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::error::ScfError;

fn fs_error(context: impl std::fmt::Display) -> impl FnOnce(io::Error) -> ScfError {
    move |err| ScfError::Filesystem(format!("{context}: {err}"))
}

fn zip_error(path: &Path) -> impl FnOnce(zip::result::ZipError) -> ScfError + '_ {
    move |err| ScfError::Filesystem(format!("read zip {}: {err}", path.display()))
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, ScfError> {
    let file = fs::File::open(zip_path)
        .map_err(fs_error(format!("open zip {}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(zip_error(zip_path))?;

    let mut extracted = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut member = archive.by_index(index).map_err(zip_error(zip_path))?;
        let Some(relative) = member.enclosed_name() else {
            return Err(ScfError::Filesystem(format!(
                "{}: member {:?} escapes the target directory",
                zip_path.display(),
                member.name()
            )));
        };
        let destination = target_dir.join(relative);
        if member.is_dir() {
            ensure_dir(&destination)?;
        } else {
            let bytes = write_member(&mut member, &destination)?;
            debug!(path = %destination.display(), bytes, "extracted");
            extracted.push(destination);
        }
    }

    if extracted.is_empty() {
        return Err(ScfError::EmptyArchive(zip_path.to_path_buf()));
    }
    Ok(extracted)
}

fn write_member(member: &mut impl io::Read, destination: &Path) -> Result<u64, ScfError> {
    if let Some(parent) = destination.parent() {
        ensure_dir(parent)?;
    }
    let mut out = fs::File::create(destination)
        .map_err(fs_error(format!("create {}", destination.display())))?;
    io::copy(member, &mut out).map_err(fs_error(format!("write {}", destination.display())))
}

pub fn ensure_dir(path: &Path) -> Result<(), ScfError> {
    fs::create_dir_all(path).map_err(fs_error(format!("create {}", path.display())))
}

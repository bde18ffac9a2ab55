//! Zip packing and unpacking of project trees

use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::DeployError;

/// Names skipped by the deploy client unless told otherwise
pub const DEFAULT_EXCLUDES: &str = ".git,.idea,target";

/// Parse a comma separated exclusion list, ignoring blank entries
pub fn parse_excludes(list: &str) -> HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pack every file under `root` whose path contains no excluded name
pub fn pack(root: &Path, excludes: &HashSet<String>) -> Result<Vec<u8>, DeployError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    pack_dir(root, "", excludes, &mut writer, options)?;

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

fn pack_dir(
    dir: &Path,
    prefix: &str,
    excludes: &HashSet<String>,
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
) -> Result<(), DeployError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if excludes.contains(&name) {
            continue;
        }

        let entry_name = format!("{}{}", prefix, name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            pack_dir(&entry.path(), &format!("{}/", entry_name), excludes, writer, options)?;
            continue;
        }

        let mut file = fs::File::open(entry.path())?;
        writer.start_file(entry_name, options)?;
        io::copy(&mut file, writer)?;
    }

    Ok(())
}

/// Recreate the archived tree under `destination`
pub fn unpack(data: &[u8], destination: &Path) -> Result<usize, DeployError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    fs::create_dir_all(destination)?;

    let mut files = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            DeployError::Workspace(format!("archive entry escapes the workspace: {}", entry.name()))
        })?;
        let target = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        files += 1;
    }

    Ok(files)
}

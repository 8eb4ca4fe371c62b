use crate::{IndexManifest, IngestError};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const INDEX_FILE_NAME: &str = "index.dat";
pub const MANIFEST_FILE_NAME: &str = "index.json";

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Where the index of a PDF lives: a directory named after the file without
/// its extension, next to the PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    pub directory: PathBuf,
    pub data_file: PathBuf,
    pub manifest_file: PathBuf,
}

impl IndexLayout {
    pub fn for_pdf(pdf_path: &Path) -> Self {
        let directory = pdf_path.with_extension("");
        Self {
            data_file: directory.join(INDEX_FILE_NAME),
            manifest_file: directory.join(MANIFEST_FILE_NAME),
            directory,
        }
    }

    pub fn ensure_directory(&self) -> Result<(), IngestError> {
        fs::create_dir_all(&self.directory)?;
        Ok(())
    }
}

pub fn read_manifest(path: &Path) -> Result<Option<IndexManifest>, IngestError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

pub fn write_manifest(path: &Path, manifest: &IndexManifest) -> Result<(), IngestError> {
    let json = serde_json::to_vec_pretty(manifest)?;
    fs::write(path, json)?;
    Ok(())
}

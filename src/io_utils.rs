use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{KrarityError, Result};

const GENOME_EXTENSIONS: [&str; 3] = [".fna", ".fa", ".fasta"];
const READ_EXTENSIONS: [&str; 2] = [".fq", ".fastq"];

/// Extracts genome identifier from a given sequence file path by removing common file extensions.
pub fn genome_id_from_filename(seq_file: &Path) -> String {
    let mut genome_id = seq_file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    if let Some(stripped) = genome_id.strip_suffix(".gz") {
        genome_id = stripped.to_string();
    }

    for ext in GENOME_EXTENSIONS.iter().chain(READ_EXTENSIONS.iter()) {
        if let Some(stripped) = genome_id.strip_suffix(ext) {
            return stripped.to_string();
        }
    }

    genome_id
}

/// True if the path looks like a genomic FASTA file, optionally gzipped.
pub fn is_genome_file(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_lowercase(),
        None => return false,
    };
    let name = name.strip_suffix(".gz").unwrap_or(&name);

    GENOME_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Recursively collect genomic FASTA files below a directory, sorted by path.
pub fn find_genome_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(KrarityError::InputNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_genome_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Parse a file listing one genome path per line. Blank lines and lines starting with # are ignored.
pub fn parse_genome_list(list_file: &Path) -> Result<Vec<PathBuf>> {
    if !list_file.exists() {
        return Err(KrarityError::InputNotFound(list_file.to_path_buf()));
    }

    let contents = std::fs::read_to_string(list_file)?;
    let paths = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect();

    Ok(paths)
}

/// Read exactly `N` bytes, reporting a premature end of input as a malformed sketch.
pub fn read_array<R: Read, const N: usize>(reader: &mut R, field: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    read_field(reader, &mut buf, field)?;
    Ok(buf)
}

/// Fill `buf` from the reader, reporting a premature end of input as a malformed sketch.
pub fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], field: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            KrarityError::MalformedSketchFile(format!("file ends before {field}"))
        } else {
            KrarityError::Io(err)
        }
    })
}

/// Fail if the reader holds any bytes past the expected end of a sketch.
pub fn expect_end<R: Read>(reader: &mut R) -> Result<()> {
    let mut probe = [0u8; 1];
    match reader.read(&mut probe)? {
        0 => Ok(()),
        _ => Err(KrarityError::MalformedSketchFile(
            "unexpected trailing bytes".to_string(),
        )),
    }
}

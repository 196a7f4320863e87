//! Lossless packing of a multi-file program into the single file a reducer works on.
//!
//! Local headers are inlined at their `#include "..."` sites, then the sources are joined
//! with a boundary comment. The comment is never produced by a generator, and the oracle
//! rejects any candidate that lost a boundary, so the reducer cannot merge files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::types::{AppError, AppResult, ProgramFiles};

pub const DELIMITER: &str = "// DREDD_RUNNER_FILE_BOUNDARY_6d7e0f3c9a1b4d52";
pub const PACKED_FILE: &str = "packed.c";

static LOCAL_INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*#[ \t]*include[ \t]*"([^"]+)"[ \t]*$"#).unwrap()
});

/// Replace each `#include "<name>"` line whose name is in `headers` with that header's text.
pub fn inline_includes(source: &str, headers: &HashMap<String, String>) -> String {
    LOCAL_INCLUDE
        .replace_all(source, |caps: &Captures| match headers.get(&caps[1]) {
            Some(text) => text.trim_end_matches('\n').to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn pack(sources: &[String]) -> String {
    sources.join(&format!("\n{DELIMITER}\n"))
}

/// Inverse of [`pack`]. Returns `None` unless exactly `expected` pieces are found.
pub fn unpack(packed: &str, expected: usize) -> Option<Vec<String>> {
    let pieces: Vec<&str> = packed.split(DELIMITER).collect();
    if pieces.len() != expected {
        return None;
    }
    let last = pieces.len() - 1;
    Some(
        pieces
            .iter()
            .enumerate()
            .map(|(i, piece)| {
                let mut piece = *piece;
                if i > 0 {
                    piece = piece.strip_prefix('\n').unwrap_or(piece);
                }
                if i < last {
                    piece = piece.strip_suffix('\n').unwrap_or(piece);
                }
                piece.to_string()
            })
            .collect(),
    )
}

/// Read the program in `dir`, inline its headers and pack its sources.
pub fn pack_program(dir: &Path, files: &ProgramFiles) -> AppResult<String> {
    let mut headers = HashMap::new();
    for header in &files.headers {
        headers.insert(header.clone(), fs::read_to_string(dir.join(header))?);
    }
    let mut sources = Vec::with_capacity(files.sources.len());
    for source in &files.sources {
        let text = fs::read_to_string(dir.join(source))?;
        sources.push(inline_includes(&text, &headers));
    }
    Ok(pack(&sources))
}

/// Split the packed file at `packed_path` into `files.sources` under `out_dir`.
pub fn unpack_program(packed_path: &Path, files: &ProgramFiles, out_dir: &Path) -> AppResult<()> {
    let packed = fs::read_to_string(packed_path)?;
    let pieces = unpack(&packed, files.sources.len())
        .ok_or_else(|| AppError::MissingDelimiter(packed_path.to_path_buf()))?;
    for (name, text) in files.sources.iter().zip(pieces) {
        fs::write(out_dir.join(name), text)?;
    }
    Ok(())
}

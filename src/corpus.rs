//! Facilities for discovering input files and loading line-oriented text corpora.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::{BpeError, Result};

/// Discovers files rooted at the provided input paths according to the ingest configuration.
///
/// Directories are traversed recursively by default; set [`IngestConfig::recursive`] to `false`
/// to limit discovery to the first level. Symlink traversal is controlled through
/// [`IngestConfig::follow_symlinks`]. Files inside a directory are returned in file name order.
pub fn collect_paths<P: AsRef<Path>>(inputs: &[P], cfg: &IngestConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = input.as_ref();
        if !path.exists() {
            return Err(BpeError::InvalidConfig(format!(
                "input path {path:?} does not exist"
            )));
        }
        let metadata = path
            .symlink_metadata()
            .map_err(|err| BpeError::io(err, Some(path.to_path_buf())))?;
        if metadata.is_dir() {
            if cfg.recursive {
                let walker = WalkDir::new(path)
                    .follow_links(cfg.follow_symlinks)
                    .sort_by_file_name();
                for entry in walker {
                    let entry = entry.map_err(|err| BpeError::Internal(err.to_string()))?;
                    if entry.file_type().is_file() {
                        files.push(entry.path().to_path_buf());
                    }
                }
            } else {
                let mut level = Vec::new();
                for entry in std::fs::read_dir(path)
                    .map_err(|err| BpeError::io(err, Some(path.to_path_buf())))?
                {
                    let entry = entry.map_err(|err| BpeError::io(err, Some(path.to_path_buf())))?;
                    let entry_path = entry.path();
                    if entry_path.is_file() {
                        level.push(entry_path);
                    }
                }
                level.sort();
                files.extend(level);
            }
        } else if metadata.is_file() || (cfg.follow_symlinks && path.is_file()) {
            files.push(path.to_path_buf());
        }
    }
    if files.is_empty() {
        return Err(BpeError::InvalidConfig(
            "no files discovered in provided inputs".into(),
        ));
    }
    Ok(files)
}

/// Reads one training example per line from `reader`.
///
/// Lines are trimmed and blank lines skipped. Invalid UTF-8 is replaced with U+FFFD rather than
/// rejecting the whole corpus.
pub fn read_texts<R: BufRead>(reader: R) -> Result<Vec<String>> {
    read_lines(reader, None)
}

fn read_lines<R: BufRead>(mut reader: R, path: Option<&Path>) -> Result<Vec<String>> {
    let mut texts = Vec::new();
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .map_err(|err| BpeError::io(err, path.map(Path::to_path_buf)))?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buffer);
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            texts.push(trimmed.to_owned());
        }
    }
    Ok(texts)
}

/// Loads every non-blank line of the discovered files, in discovery order.
pub fn load_text_corpus<P: AsRef<Path>>(inputs: &[P], cfg: &IngestConfig) -> Result<Vec<String>> {
    let file_paths = collect_paths(inputs, cfg)?;
    let mut texts = Vec::new();
    for file_path in &file_paths {
        let file =
            File::open(file_path).map_err(|err| BpeError::io(err, Some(file_path.clone())))?;
        let lines = read_lines(BufReader::new(file), Some(file_path))?;
        debug!("loaded {} lines from {}", lines.len(), file_path.display());
        texts.extend(lines);
    }
    debug!(
        "loaded {} texts from {} file(s)",
        texts.len(),
        file_paths.len()
    );
    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn collect_paths_discovers_files_recursively() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).expect("create nested directory");
        let file_a = dir.path().join("a.txt");
        let file_b = nested.join("b.txt");
        fs::write(&file_a, "ଓଡ଼ିଆ\n").expect("write a");
        fs::write(&file_b, "ଭାଷା\n").expect("write b");

        let paths = collect_paths(&[dir.path()], &IngestConfig::default()).expect("collect paths");
        assert_eq!(paths, vec![file_a, file_b]);
    }

    #[test]
    fn collect_paths_respects_non_recursive() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).expect("create nested directory");
        let top = dir.path().join("top.txt");
        fs::write(&top, "a\n").expect("write top");
        fs::write(nested.join("deep.txt"), "b\n").expect("write deep");

        let cfg = IngestConfig::builder().recursive(false).build();
        let paths = collect_paths(&[dir.path()], &cfg).expect("collect paths");
        assert_eq!(paths, vec![top]);
    }

    #[test]
    fn missing_input_is_invalid_config() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("absent.txt");
        let err = load_text_corpus(&[missing], &IngestConfig::default()).expect_err("missing");
        assert!(matches!(err, BpeError::InvalidConfig(_)));
    }

    #[test]
    fn read_texts_trims_and_skips_blank_lines() {
        let input = "  ଓଡ଼ିଆ ଭାଷା \r\n\n   \nhello\n";
        let texts = read_texts(Cursor::new(input)).expect("read");
        assert_eq!(texts, vec!["ଓଡ଼ିଆ ଭାଷା".to_string(), "hello".to_string()]);
    }

    #[test]
    fn read_texts_replaces_invalid_utf8() {
        let texts = read_texts(Cursor::new(b"ok\n\xffbad\n".to_vec())).expect("read");
        assert_eq!(texts, vec!["ok".to_string(), "\u{FFFD}bad".to_string()]);
    }

    #[test]
    fn load_text_corpus_concatenates_files_in_order() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("1.txt"), "first\nsecond\n").expect("write first");
        fs::write(dir.path().join("2.txt"), "\nthird").expect("write second");

        let texts = load_text_corpus(&[dir.path()], &IngestConfig::default()).expect("load");
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}

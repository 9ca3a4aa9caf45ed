/// Loads an already-decompressed combat log into memory, one entry per line.
///
/// Line indices must match the indices used by the fight-boundary detector,
/// so blank lines are kept and nothing is reordered. Unreadable bytes are
/// replaced rather than failing the whole load; the decoder then treats such
/// lines as malformed.
use crate::error::Result;
use crate::identity::UnitTable;
use crate::segment::EncounterSegments;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub fn load_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);

    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        lines.push(line.trim_end_matches(['\r', '\n']).to_owned());
    }

    tracing::info!("Loaded {} lines from {:?}", lines.len(), path);
    Ok(lines)
}

pub fn load_units(path: &Path) -> Result<UnitTable> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

pub fn load_encounters(path: &Path) -> Result<EncounterSegments> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn keeps_blank_lines_and_strips_endings() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "line one\r\n\nline three\nno newline").unwrap();
        f.flush().unwrap();

        let lines = load_lines(f.path()).unwrap();
        assert_eq!(lines, vec!["line one", "", "line three", "no newline"]);
    }

    #[test]
    fn replaces_invalid_utf8() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"ok\nbad \xff byte\n").unwrap();
        f.flush().unwrap();

        let lines = load_lines(f.path()).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("bad "));
    }

    #[test]
    fn loads_side_tables() {
        let mut units = NamedTempFile::new().unwrap();
        write!(units, r#"{{"0x0600000000000001": {{"name": "A"}}}}"#).unwrap();
        let mut enc = NamedTempFile::new().unwrap();
        write!(enc, r#"{{"Boss": [[0, 4]]}}"#).unwrap();

        assert_eq!(load_units(units.path()).unwrap()["0x0600000000000001"].name, "A");
        assert_eq!(load_encounters(enc.path()).unwrap()["Boss"], vec![Segment::new(0, 4)]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_lines(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, crate::error::LedgerError::Io(_)));
    }
}

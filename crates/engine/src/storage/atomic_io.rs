use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, text.as_bytes())?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("blob");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn temp_path_sits_next_to_target() {
        let tmp = temp_path_for(Path::new("a/b/state.json"));
        assert_eq!(tmp, PathBuf::from("a/b/state.json.tmp"));
    }

    #[test]
    fn overwrites_existing_file() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("state.json");
        fs::write(&path, "old").expect("seed");
        write_text_atomic(&path, "new").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "new");
    }
}

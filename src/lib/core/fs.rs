use anyhow::Result;
use std::fs;
use std::path::Path;

/// Create a path's missing parent directories, like `mkdir -p`.
pub fn make_parent_dirs<P: AsRef<Path>>(path: P) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// True when a path's extension marks it as gzip/BGZF compressed.
pub fn is_bgzipped<P: AsRef<Path>>(path: P) -> bool {
    match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some(ext) => ext == "gz" || ext == "gzip" || ext == "bgzf",
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_compressed_extensions() {
        assert!(is_bgzipped("metrics.tsv.gz"));
        assert!(is_bgzipped("out.bgzf"));
        assert!(!is_bgzipped("metrics.tsv"));
        assert!(!is_bgzipped("plain"));
    }
}

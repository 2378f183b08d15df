use std::path::PathBuf;

pub fn labelqa_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("labelqa"),
        None => std::env::temp_dir().join("labelqa"),
    }
}

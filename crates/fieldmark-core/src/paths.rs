use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const FIELDMARK_DIR: &str = ".fieldmark";
pub const CONFIG_FILE: &str = ".fieldmark/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn fieldmark_dir(root: &Path) -> PathBuf {
    root.join(FIELDMARK_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lives_under_fieldmark_dir() {
        let root = Path::new("/srv/site");
        assert!(config_path(root).starts_with(fieldmark_dir(root)));
        assert_eq!(
            config_path(root),
            PathBuf::from("/srv/site/.fieldmark/config.yaml")
        );
    }
}

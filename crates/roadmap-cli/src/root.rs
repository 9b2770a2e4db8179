use roadmap_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root directory.
///
/// Priority:
/// 1. `--root` flag / `ROADMAP_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.roadmap/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root_from(&cwd)
}

fn find_root_from(start: &Path) -> PathBuf {
    find_upward(start, paths::ROADMAP_DIR)
        .or_else(|| find_upward(start, ".git"))
        .unwrap_or_else(|| start.to_path_buf())
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_roadmap_dir_above_start() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".roadmap")).unwrap();
        let subdir = dir.path().join("src/deep");
        std::fs::create_dir_all(&subdir).unwrap();

        assert_eq!(find_root_from(&subdir), dir.path());
    }

    #[test]
    fn roadmap_dir_beats_outer_git_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let project = dir.path().join("services/planner");
        std::fs::create_dir_all(project.join(".roadmap")).unwrap();
        std::fs::create_dir_all(project.join("src")).unwrap();

        assert_eq!(find_root_from(&project.join("src")), project);
    }

    #[test]
    fn falls_back_to_git_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let subdir = dir.path().join("crates/x");
        std::fs::create_dir_all(&subdir).unwrap();

        assert_eq!(find_root_from(&subdir), dir.path());
    }
}

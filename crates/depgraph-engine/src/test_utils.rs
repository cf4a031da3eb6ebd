//! Test utilities for depgraph-engine

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Create a temporary project containing `files` (relative path, contents).
pub fn create_repo_with_structure(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (path, contents) in files {
        write_file(temp_dir.path(), path, contents);
    }
    temp_dir
}

/// Write (or overwrite) one file below `root`, creating directories.
pub fn write_file(root: &Path, path: &str, contents: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(full, contents).unwrap();
}

/// The two-file project used throughout: `services` builds `models.User`.
pub fn models_and_services() -> TempDir {
    create_repo_with_structure(&[
        (
            "models.py",
            "class User:\n    def __init__(self, name):\n        self.name = name\n",
        ),
        (
            "services.py",
            "from models import User\n\nclass UserService:\n    def create(self, n):\n        return User(n)\n",
        ),
        (
            "tests/test_services.py",
            "from services import UserService\n\ndef test_create():\n    UserService().create(\"a\")\n",
        ),
    ])
}

use std::path::{Path, PathBuf};

pub const DATA_DIR_NAME: &str = ".notebook-bridge";
pub const AUTH_FILE_NAME: &str = "auth.json";
pub const CONVERSATIONS_FILE_NAME: &str = "conversations.json";

#[must_use]
pub fn data_root(home: &Path) -> PathBuf {
    home.join(DATA_DIR_NAME)
}

#[must_use]
pub fn auth_file(root: &Path) -> PathBuf {
    root.join(AUTH_FILE_NAME)
}

#[must_use]
pub fn conversations_file(root: &Path) -> PathBuf {
    root.join(CONVERSATIONS_FILE_NAME)
}

/// Sibling path used for write-then-rename replacement of `path`.
#[must_use]
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

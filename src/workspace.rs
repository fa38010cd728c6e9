//! Per-evaluation scratch directories.
//!
//! Simulators usually read their configuration from, and write their
//! recordings to, a working directory. Sharing one directory between
//! concurrent evaluations corrupts both, so each evaluation can be given
//! its own copy of a template directory that is removed as soon as the
//! evaluation ends, whether it succeeded, failed, or panicked.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where scratch directories are created and what they start with.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkspaceConfig {
    /// Parent directory for all scratch directories. Created if missing.
    pub root: PathBuf,
    /// Directory whose regular files are copied into every scratch
    /// directory (not recursive).
    pub template: Option<PathBuf>,
}

impl WorkspaceConfig {
    /// Scratch directories under `root`, starting empty.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            template: None,
        }
    }

    /// Copy the files of `template` into every scratch directory.
    #[must_use]
    pub fn template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// A scratch directory that is deleted on drop.
#[derive(Debug)]
pub(crate) struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Create `<root>/<name>` and populate it from the template.
    pub(crate) fn create(config: &WorkspaceConfig, name: &str) -> io::Result<Self> {
        fs::create_dir_all(&config.root)?;
        let path = config.root.join(name);
        fs::create_dir(&path)?;
        // From here on, `Drop` cleans up even if the copy fails.
        let workspace = Self { path };
        if let Some(template) = &config.template {
            copy_files(template, &workspace.path)?;
        }
        Ok(workspace)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(_e) = fs::remove_dir_all(&self.path) {
            trace_warn!(path = %self.path.display(), error = %_e, "failed to remove workspace");
        }
    }
}

fn copy_files(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::copy(entry.path(), to.join(entry.file_name()))?;
        }
    }
    Ok(())
}

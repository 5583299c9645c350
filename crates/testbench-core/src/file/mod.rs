mod locate;
mod replace;

pub use locate::locate_file;
pub use replace::Replacements;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::models::{CoreError, CoreErrorKind, CoreResult};

/// File sessions of one task, keyed by file type.
pub type TaskFiles = IndexMap<String, FileSession>;

/// Everything a file plugin is constructed from.
#[derive(Clone, Debug, PartialEq)]
pub struct FileSpec {
    pub path: PathBuf,
    pub configs: Value,
    pub output_dir: PathBuf,
    pub name: Option<String>,
}

/// Contract every file plugin implements.
pub trait FileFormat: Send {
    /// Extension used to locate the file when the configured path is a directory.
    fn extension(&self) -> &str;

    /// Inspects the original lines and returns the substitutions to apply.
    fn parse(&mut self, lines: &[&str]) -> CoreResult<Replacements>;
}

pub(crate) type FileFactory =
    Arc<dyn Fn(&FileSpec) -> CoreResult<Box<dyn FileFormat>> + Send + Sync>;

/// A patched file with its original content held for restoration.
///
/// The live file is restored by [`FileSession::restore`]; dropping a session
/// that was never restored restores it as well.
pub struct FileSession {
    file_type: String,
    name: Option<String>,
    file: PathBuf,
    backup: PathBuf,
    original: Vec<u8>,
    replacements: Replacements,
    audit_dir: PathBuf,
    restored: AtomicBool,
}

impl FileSession {
    pub fn open(file_type: &str, spec: &FileSpec, mut format: Box<dyn FileFormat>) -> CoreResult<Self> {
        let file = locate_file(&spec.path, format.extension(), spec.name.as_deref())?;
        let original =
            std::fs::read(&file).map_err(|error| CoreError::io("failed to read", &file, error))?;

        let backup = backup_path(&file);
        std::fs::copy(&file, &backup)
            .map_err(|error| CoreError::io("failed to back up", &file, error))?;

        let mut session = Self {
            file_type: file_type.to_string(),
            name: spec.name.clone(),
            file,
            backup,
            original,
            replacements: Replacements::new(),
            audit_dir: spec.output_dir.join("files"),
            restored: AtomicBool::new(false),
        };

        if let Err(error) = session.patch(format.as_mut()).and_then(|()| session.archive()) {
            if let Err(restore_error) = session.restore() {
                tracing::error!(
                    file = %session.file.display(),
                    error = %restore_error,
                    "failed to restore file after patch failure"
                );
            }
            return Err(error);
        }

        tracing::debug!(
            file_type,
            file = %session.file.display(),
            replacements = session.replacements.len(),
            "patched file"
        );
        Ok(session)
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The live, patched file.
    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn audit_dir(&self) -> &Path {
        &self.audit_dir
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn replacements(&self) -> &Replacements {
        &self.replacements
    }

    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }

    /// Puts the original bytes back on the live path. Idempotent.
    pub fn restore(&self) -> CoreResult<()> {
        if self.is_restored() {
            return Ok(());
        }

        if std::fs::rename(&self.backup, &self.file).is_err() {
            std::fs::write(&self.file, &self.original)
                .map_err(|error| CoreError::io("failed to restore", &self.file, error))?;
            match std::fs::remove_file(&self.backup) {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => tracing::warn!(
                    backup = %self.backup.display(),
                    %error,
                    "failed to remove backup file"
                ),
            }
        }

        // The backup may have been touched while the session was live.
        if std::fs::read(&self.file).ok().as_deref() != Some(self.original.as_slice()) {
            std::fs::write(&self.file, &self.original)
                .map_err(|error| CoreError::io("failed to restore", &self.file, error))?;
        }

        self.restored.store(true, Ordering::Release);
        tracing::debug!(file = %self.file.display(), "restored file");
        Ok(())
    }

    fn patch(&mut self, format: &mut dyn FileFormat) -> CoreResult<()> {
        let text = std::str::from_utf8(&self.original).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("'{}' is not valid UTF-8: {error}", self.file.display()),
            )
        })?;
        let lines: Vec<&str> = text.lines().collect();

        let replacements = format.parse(&lines).map_err(|error| {
            let mut error = error;
            error.message = format!(
                "failed to parse {} file '{}': {}",
                self.file_type,
                self.file.display(),
                error.message
            );
            error
        })?;

        let patched = replacements.apply(text);
        std::fs::write(&self.file, patched)
            .map_err(|error| CoreError::io("failed to write patched", &self.file, error))?;
        self.replacements = replacements;
        Ok(())
    }

    fn archive(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.audit_dir).map_err(|error| {
            CoreError::io("failed to create audit directory", &self.audit_dir, error)
        })?;

        for source in [&self.file, &self.backup] {
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let target = self.audit_dir.join(file_name);
            std::fs::copy(source, &target)
                .map_err(|error| CoreError::io("failed to archive", source, error))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSession")
            .field("file_type", &self.file_type)
            .field("file", &self.file)
            .field("replacements", &self.replacements.len())
            .field("restored", &self.is_restored())
            .finish_non_exhaustive()
    }
}

impl Drop for FileSession {
    fn drop(&mut self) {
        if let Err(error) = self.restore() {
            tracing::error!(
                file = %self.file.display(),
                %error,
                "failed to restore file on drop"
            );
        }
    }
}

/// Sibling backup path: `<file name>.bak`.
pub fn backup_path(file: &Path) -> PathBuf {
    let mut name = file
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".bak");
    file.with_file_name(name)
}

/// Restores every session of a task, logging failures instead of stopping.
pub fn restore_all(files: &TaskFiles) -> usize {
    let mut failures = 0;
    for (file_type, session) in files {
        if let Err(error) = session.restore() {
            failures += 1;
            tracing::error!(
                file_type = %file_type,
                file = %session.path().display(),
                %error,
                "failed to restore file"
            );
        }
    }
    failures
}

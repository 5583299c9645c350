use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde_yaml::Value;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::config::EnvSnapshot;
use crate::models::{CoreError, CoreErrorKind, CoreResult, TaskReport};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// The local UTC offset, read once. The platform lookup is refused once the
/// process is multi-threaded, so the first call must happen before any
/// runtime threads exist; a refused lookup pins the offset to UTC.
pub(crate) fn local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| {
        UtcOffset::current_local_offset().unwrap_or_else(|error| {
            tracing::debug!(%error, "local offset unavailable, timestamps use UTC");
            UtcOffset::UTC
        })
    })
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(local_offset())
}

/// `YYYY-MM-DD HH:MM:SS`, used in capture file headers.
pub(crate) fn header_timestamp() -> String {
    now()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

fn run_stamp() -> String {
    now()
        .format(format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .unwrap_or_default()
}

/// The per-invocation output directory `<base>/<YYYYmmdd-HHMMSS>`.
#[derive(Clone, Debug, PartialEq)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    pub fn create(base: &Path) -> CoreResult<Self> {
        std::fs::create_dir_all(base)
            .map_err(|error| CoreError::io("failed to create output directory", base, error))?;

        let stamp = run_stamp();
        let mut root = base.join(&stamp);
        let mut attempt = 1;
        loop {
            match std::fs::create_dir(&root) {
                Ok(()) => break,
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                    root = base.join(format!("{stamp}-{attempt}"));
                    attempt += 1;
                }
                Err(error) => {
                    return Err(CoreError::io("failed to create run directory", &root, error));
                }
            }
        }

        tracing::info!(output = %root.display(), "output directory");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn task_dir(&self, task: &str) -> PathBuf {
        self.root.join(task)
    }

    /// Copies the configuration file into `config/` and its includes into
    /// `config/includes/`.
    pub fn archive_config(&self, config: &Path, includes: &[PathBuf]) -> CoreResult<()> {
        let config_dir = self.root.join("config");
        let includes_dir = config_dir.join("includes");
        std::fs::create_dir_all(&includes_dir).map_err(|error| {
            CoreError::io("failed to create config archive", &includes_dir, error)
        })?;

        copy_into(config, &config_dir)?;
        for include in includes {
            copy_into(include, &includes_dir)?;
        }
        Ok(())
    }

    pub fn write_resolved_config(&self, document: &Value) -> CoreResult<()> {
        let target = self.root.join("config.yml");
        let rendered = serde_yaml::to_string(document).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to render resolved configuration: {error}"),
            )
        })?;
        write(&target, rendered.as_bytes())
    }

    pub fn write_env(&self, env: &EnvSnapshot) -> CoreResult<()> {
        write(&self.root.join(".env"), env.render().as_bytes())
    }

    pub fn write_report(&self, reports: &[TaskReport]) -> CoreResult<PathBuf> {
        let target = self.root.join("report.json");
        let rendered = serde_json::to_vec_pretty(reports).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to encode task report: {error}"),
            )
        })?;
        write(&target, &rendered)?;
        Ok(target)
    }
}

fn copy_into(source: &Path, dir: &Path) -> CoreResult<()> {
    let Some(name) = source.file_name() else {
        return Ok(());
    };
    let target = dir.join(name);
    std::fs::copy(source, &target)
        .map_err(|error| CoreError::io("failed to copy", source, error))?;
    tracing::debug!(from = %source.display(), to = %target.display(), "archived");
    Ok(())
}

fn write(target: &Path, contents: &[u8]) -> CoreResult<()> {
    std::fs::write(target, contents).map_err(|error| CoreError::io("failed to write", target, error))
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{RunDirectory, header_timestamp, local_offset, now};

    #[test]
    fn header_timestamp_has_date_and_time() {
        let stamp = header_timestamp();
        assert_eq!(stamp.len(), 19);
        assert_eq!(&stamp[4..5], "-");
        assert_eq!(&stamp[10..11], " ");
    }

    #[test]
    fn runs_in_the_same_second_get_distinct_directories() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let base = std::env::temp_dir().join(format!("testbench-rundir-{nanos}"));

        let first = RunDirectory::create(&base).unwrap();
        let second = RunDirectory::create(&base).unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().is_dir());
        assert!(second.path().is_dir());
    }

    #[test]
    fn local_offset_is_fixed_for_every_thread() {
        let offset = local_offset();
        let seen = std::thread::spawn(|| (local_offset(), now().offset()))
            .join()
            .unwrap();

        assert_eq!(seen, (offset, offset));
        assert_eq!(now().offset(), offset);
    }
}

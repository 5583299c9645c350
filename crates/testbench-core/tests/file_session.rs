use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_yaml::Value;
use testbench_core::file::{FileFormat, FileSession, FileSpec, Replacements, restore_all};
use testbench_core::models::{CoreError, CoreErrorKind, CoreResult};

/// Marks fixed `(token, line, value)` triples regardless of content.
struct Fixed {
    extension: &'static str,
    entries: Vec<(&'static str, usize, &'static str)>,
}

impl FileFormat for Fixed {
    fn extension(&self) -> &str {
        self.extension
    }

    fn parse(&mut self, _lines: &[&str]) -> CoreResult<Replacements> {
        let mut replacements = Replacements::new();
        for (token, line, value) in &self.entries {
            replacements.insert(*token, *line, *value);
        }
        Ok(replacements)
    }
}

struct Rejecting;

impl FileFormat for Rejecting {
    fn extension(&self) -> &str {
        "h"
    }

    fn parse(&mut self, _lines: &[&str]) -> CoreResult<Replacements> {
        Err(CoreError::new(CoreErrorKind::InvalidInput, "unsupported layout"))
    }
}

fn temp_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("testbench-file-{label}-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn spec(path: PathBuf, output_dir: PathBuf, name: Option<&str>) -> FileSpec {
    FileSpec {
        path,
        configs: Value::Null,
        output_dir,
        name: name.map(str::to_string),
    }
}

const ORIGINAL: &str = "#define X 1\n#define Y 1\n#define X 1\n";

#[test]
fn replacement_touches_only_the_designated_line_and_restore_is_exact() {
    let dir = temp_dir("precision");
    let file = dir.join("config.h");
    std::fs::write(&file, ORIGINAL).unwrap();

    let format = Fixed {
        extension: "h",
        entries: vec![("X 1", 0, "X 2")],
    };
    let session = FileSession::open("define", &spec(dir.clone(), dir.join("out"), None), Box::new(format))
        .unwrap();

    assert_eq!(session.path(), file.as_path());
    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "#define X 2\n#define Y 1\n#define X 1\n"
    );
    assert_eq!(std::fs::read_to_string(dir.join("config.h.bak")).unwrap(), ORIGINAL);
    assert_eq!(session.original(), ORIGINAL.as_bytes());
    assert_eq!(session.replacements().len(), 1);

    let audit = dir.join("out/files");
    assert_eq!(
        std::fs::read_to_string(audit.join("config.h")).unwrap(),
        "#define X 2\n#define Y 1\n#define X 1\n"
    );
    assert_eq!(std::fs::read_to_string(audit.join("config.h.bak")).unwrap(), ORIGINAL);

    session.restore().unwrap();
    assert!(session.is_restored());
    assert_eq!(std::fs::read(&file).unwrap(), ORIGINAL.as_bytes());
    assert!(!dir.join("config.h.bak").exists());

    session.restore().unwrap();
    assert_eq!(std::fs::read(&file).unwrap(), ORIGINAL.as_bytes());
}

#[test]
fn out_of_range_lines_are_ignored() {
    let dir = temp_dir("range");
    let file = dir.join("config.h");
    std::fs::write(&file, ORIGINAL).unwrap();

    let format = Fixed {
        extension: "h",
        entries: vec![("Y 1", 1, "Y 5"), ("X 1", 42, "X 9")],
    };
    let session = FileSession::open("define", &spec(file.clone(), dir.join("out"), None), Box::new(format))
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "#define X 1\n#define Y 5\n#define X 1\n"
    );
    drop(session);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), ORIGINAL);
}

#[test]
fn dropping_an_unrestored_session_restores_the_file() {
    let dir = temp_dir("drop");
    let file = dir.join("board.h");
    std::fs::write(&file, ORIGINAL).unwrap();

    {
        let format = Fixed {
            extension: "h",
            entries: vec![("Y 1", 1, "Y 0")],
        };
        let _session =
            FileSession::open("define", &spec(dir.clone(), dir.join("out"), None), Box::new(format))
                .unwrap();
        assert_ne!(std::fs::read_to_string(&file).unwrap(), ORIGINAL);
    }

    assert_eq!(std::fs::read_to_string(&file).unwrap(), ORIGINAL);
    assert!(!dir.join("board.h.bak").exists());
}

#[test]
fn parse_failure_restores_before_returning_the_error() {
    let dir = temp_dir("reject");
    let file = dir.join("config.h");
    std::fs::write(&file, ORIGINAL).unwrap();

    let error = FileSession::open("define", &spec(dir.clone(), dir.join("out"), None), Box::new(Rejecting))
        .err()
        .unwrap();

    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    assert!(error.message.contains("unsupported layout"));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), ORIGINAL);
    assert!(!dir.join("config.h.bak").exists());
}

#[test]
fn directory_lookup_uses_name_to_disambiguate() {
    let dir = temp_dir("lookup");
    std::fs::write(dir.join("a.h"), ORIGINAL).unwrap();
    std::fs::write(dir.join("b.h"), ORIGINAL).unwrap();

    let ambiguous = FileSession::open(
        "define",
        &spec(dir.clone(), dir.join("out"), None),
        Box::new(Fixed { extension: "h", entries: Vec::new() }),
    )
    .err()
    .unwrap();
    assert_eq!(ambiguous.kind, CoreErrorKind::InvalidInput);

    let missing = FileSession::open(
        "define",
        &spec(dir.clone(), dir.join("out"), Some("c")),
        Box::new(Fixed { extension: "h", entries: Vec::new() }),
    )
    .err()
    .unwrap();
    assert_eq!(missing.kind, CoreErrorKind::PathNotFound);

    let session = FileSession::open(
        "define",
        &spec(dir.clone(), dir.join("out"), Some("b")),
        Box::new(Fixed { extension: "h", entries: Vec::new() }),
    )
    .unwrap();
    assert_eq!(session.path(), dir.join("b.h").as_path());
    assert_eq!(session.name(), Some("b"));
}

#[test]
fn restore_all_restores_every_session() {
    let dir = temp_dir("all");
    std::fs::write(dir.join("one.h"), ORIGINAL).unwrap();
    std::fs::write(dir.join("two.txt"), "speed = 1\n").unwrap();

    let mut files = testbench_core::file::TaskFiles::new();
    files.insert(
        "define".to_string(),
        FileSession::open(
            "define",
            &spec(dir.clone(), dir.join("out"), None),
            Box::new(Fixed { extension: "h", entries: vec![("X 1", 2, "X 3")] }),
        )
        .unwrap(),
    );
    files.insert(
        "plain".to_string(),
        FileSession::open(
            "plain",
            &spec(dir.clone(), dir.join("out"), None),
            Box::new(Fixed { extension: "txt", entries: vec![("1", 0, "2")] }),
        )
        .unwrap(),
    );

    assert_eq!(restore_all(&files), 0);
    assert!(files.values().all(FileSession::is_restored));
    assert_eq!(std::fs::read_to_string(dir.join("one.h")).unwrap(), ORIGINAL);
    assert_eq!(std::fs::read_to_string(dir.join("two.txt")).unwrap(), "speed = 1\n");
}

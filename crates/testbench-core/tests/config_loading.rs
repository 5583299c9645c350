use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use testbench_core::config::{EnvSnapshot, TestbenchConfig, load_config};
use testbench_core::models::CoreErrorKind;

fn temp_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("testbench-config-{label}-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn includes_expand_relative_to_the_including_file() {
    let dir = temp_dir("includes");
    std::fs::create_dir_all(dir.join("conf/tasks")).unwrap();
    std::fs::write(
        dir.join("conf/main.yml"),
        "registry: !inc registry.yml\ntasks: !inc tasks/all.yml\nschedule: {}\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("conf/registry.yml"),
        "tools: <registry_root>/tools\nfiles: <registry_root>/files\n",
    )
    .unwrap();
    std::fs::write(dir.join("conf/tasks/all.yml"), "fw: !inc fw.yml\n").unwrap();
    std::fs::write(dir.join("conf/tasks/fw.yml"), "path: firmware\n").unwrap();

    let loaded = load_config(&dir.join("conf/main.yml")).unwrap();

    assert!(loaded.path.is_absolute());
    assert_eq!(
        loaded.includes,
        vec![
            dir.join("conf/registry.yml"),
            dir.join("conf/tasks/all.yml"),
            dir.join("conf/tasks/fw.yml"),
        ]
    );
    assert_eq!(loaded.document["tasks"]["fw"]["path"].as_str(), Some("firmware"));

    let mut document = loaded.document;
    EnvSnapshot::parse("REGISTRY_ROOT=/opt/registry\n").substitute(&mut document);
    let config = TestbenchConfig::from_value(&document).unwrap();

    assert_eq!(config.registry.tools, PathBuf::from("/opt/registry/tools"));
    assert_eq!(config.registry.files, PathBuf::from("/opt/registry/files"));
    assert_eq!(config.tasks["fw"].path, Some(PathBuf::from("firmware")));
}

#[test]
fn missing_empty_and_malformed_files_are_rejected() {
    let dir = temp_dir("errors");

    let error = load_config(&dir.join("absent.yml")).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::PathNotFound);

    std::fs::write(dir.join("empty.yml"), "").unwrap();
    let error = load_config(&dir.join("empty.yml")).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ParseFailure);

    std::fs::write(dir.join("broken.yml"), "tasks: [unclosed\n").unwrap();
    let error = load_config(&dir.join("broken.yml")).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ParseFailure);

    std::fs::write(dir.join("dangling.yml"), "tasks: !inc nowhere.yml\n").unwrap();
    let error = load_config(&dir.join("dangling.yml")).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::PathNotFound);
}

#[test]
fn self_including_file_hits_the_depth_limit() {
    let dir = temp_dir("cycle");
    std::fs::write(dir.join("loop.yml"), "again: !inc loop.yml\n").unwrap();

    let error = load_config(&dir.join("loop.yml")).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
}

#[test]
fn env_file_loading_tolerates_absence() {
    let dir = temp_dir("env");
    assert!(EnvSnapshot::load(&dir.join(".env")).unwrap().is_empty());

    std::fs::write(dir.join(".env"), "A=1\n# note\nexport B='two'\n").unwrap();
    let env = EnvSnapshot::load(&dir.join(".env")).unwrap();
    assert_eq!(env.get("A"), Some("1"));
    assert_eq!(env.get("B"), Some("two"));
}

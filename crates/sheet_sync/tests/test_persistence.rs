use sheet_sync::{DocumentStore, SyncError};
use sheet_test_helpers::prelude::*;
use std::fs;

#[test]
fn test_awkward_contents_survive_save_and_load() {
    let dir = data_dir();
    let path = dir.path().join("awkward.ss");

    let mut store = DocumentStore::new(&path);
    store.create("pw").unwrap();
    let awkward = [
        ("A1", "two\nlines"),
        ("A2", "  leading spaces"),
        ("A3", "back\\slash and \\n literal"),
        ("A4", "tab\there"),
        ("with space", "named oddly"),
        ("A5", "trailing space "),
    ];
    for (name, contents) in awkward {
        store.update_cell(name, contents);
        store.increment_version().unwrap();
    }
    store.save().unwrap();

    let mut reloaded = DocumentStore::new(&path);
    reloaded.load().unwrap();
    assert_eq!(reloaded.version(), Some(awkward.len() as u64));
    for (name, contents) in awkward {
        assert_eq!(reloaded.get_cell(name), contents, "cell {:?}", name);
    }
    assert_eq!(reloaded.cells(), store.cells());

    let raw = fs::read_to_string(&path).unwrap();
    assert!(cell_line_count(awkward.len()).eval(&raw));
    assert!(has_cell_line("A1", "two\\nlines").eval(&raw));
}

#[test]
fn test_authenticate_against_existing_file() {
    let dir = data_dir_with_sheets(&[("budget", "secret 1\nA1 42\n")]);
    let mut store = DocumentStore::new(dir.path().join("budget.ss"));
    store.load().unwrap();

    assert!(store.authenticate("secret"));
    assert!(!store.authenticate("Secret"));
    assert!(!store.authenticate(""));
    assert_eq!(store.version(), Some(1));
    assert_eq!(store.get_cell("A1"), "42");
    assert_eq!(store.get_cell("B7"), "");
}

#[test]
fn test_authentication_ignores_unsaved_changes() {
    let dir = data_dir_with_sheets(&[("budget", "secret 1\nA1 42\n")]);
    let mut store = DocumentStore::new(dir.path().join("budget.ss"));
    store.load().unwrap();

    store.update_cell("A1", "43");
    store.increment_version().unwrap();
    assert!(store.authenticate("secret"));

    // Removing the file behind the store's back makes the check fail.
    fs::remove_file(store.path()).unwrap();
    assert!(!store.authenticate("secret"));
}

#[test]
fn test_malformed_files_are_rejected() {
    let dir = data_dir_with_sheets(&[
        ("no_version", "secret\nA1 1\n"),
        ("bad_version", "secret -1\n"),
        ("empty", ""),
    ]);

    for name in ["no_version", "bad_version", "empty"] {
        let mut store = DocumentStore::new(dir.path().join(format!("{}.ss", name)));
        let result = store.load();
        assert!(
            matches!(result, Err(SyncError::Malformed { .. })),
            "{} gave {:?}",
            name,
            result
        );
        assert!(!store.is_loaded());
        assert_eq!(store.version(), None);
    }
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = data_dir();
    let mut store = DocumentStore::new(dir.path().join("ghost.ss"));
    assert!(matches!(store.load(), Err(SyncError::NotFound { .. })));
    assert!(matches!(store.save(), Err(SyncError::NotLoaded)));
    assert!(!store.authenticate("anything"));
}

#[test]
fn test_lenient_body_parsing() {
    let dir = data_dir_with_sheets(&[("loose", "pw 4\n\nA1 1\nB2\n\nC3 three words\n")]);
    let mut store = DocumentStore::new(dir.path().join("loose.ss"));
    store.load().unwrap();

    assert_eq!(store.cell_count(), 2);
    assert_eq!(store.get_cell("A1"), "1");
    assert_eq!(store.get_cell("B2"), "");
    assert_eq!(store.get_cell("C3"), "three words");
}

#[test]
fn test_save_leaves_no_temp_file() {
    let dir = data_dir();
    let path = dir.path().join("clean.ss");
    let mut store = DocumentStore::new(&path);
    store.create("pw").unwrap();
    store.update_cell("A1", "1");
    store.increment_version().unwrap();
    store.save().unwrap();

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["clean.ss".to_string()]);

    let raw = fs::read_to_string(&path).unwrap();
    assert!(sheet_header("pw", 1).eval(&raw));
}

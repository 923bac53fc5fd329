mod common;

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use arxiv_latex_core::contract::{ContentFilter, MockFlatten, TextEncoding};
use arxiv_latex_core::error::{FlattenError, LoadError};
use arxiv_latex_core::loader::{
    any_source_matches, decode_text, find_root_file, open_container, Container, ProjectLoader,
};
use common::{
    dir_is_empty, project_entry, single_entry, tar_of, write_entry, CatFlatten, PLAIN_PAPER,
    TIKZ_PAPER,
};
use tempfile::tempdir;

fn tikz_filter() -> ContentFilter {
    ContentFilter::from_regex(regex::bytes::Regex::new("tikzpicture").unwrap())
}

#[test]
fn test_load_flattens_the_root_file_once() {
    let dir = tempdir().unwrap();
    let entry = write_entry(
        dir.path(),
        "0704.0001.gz",
        &project_entry(&[
            ("a.tex", b"\\section{Appendix}\n"),
            ("b.tex", TIKZ_PAPER),
            ("c.tex", b"\\input{a}\n"),
        ]),
    );

    let mut flattener = MockFlatten::new();
    flattener
        .expect_flatten()
        .withf(|root: &Path| root.file_name() == Some(OsStr::new("b.tex")))
        .times(1)
        .returning(|_| Ok(b"flattened body".to_vec()));

    let loader = ProjectLoader::new(Arc::new(flattener)).with_filter(tikz_filter());
    let project = loader.load(&entry).unwrap();

    assert_eq!(project.text, "flattened body");
    assert!(project.timestamp.is_some());
}

#[test]
fn test_load_filter_miss_never_invokes_flattener() {
    let dir = tempdir().unwrap();
    let entry = write_entry(
        dir.path(),
        "0704.0002.gz",
        &project_entry(&[("main.tex", PLAIN_PAPER), ("intro.tex", b"Intro\n")]),
    );

    let mut flattener = MockFlatten::new();
    flattener.expect_flatten().never();
    flattener.expect_flatten_buffer().never();

    let loader = ProjectLoader::new(Arc::new(flattener)).with_filter(tikz_filter());
    let err = loader.load(&entry).unwrap_err();

    assert!(matches!(err, LoadError::FilterMiss));
    assert!(!err.is_fatal());
}

#[test]
fn test_load_surfaces_tool_failure() {
    let dir = tempdir().unwrap();
    let entry = write_entry(
        dir.path(),
        "0704.0003.gz",
        &project_entry(&[("main.tex", PLAIN_PAPER)]),
    );

    let mut flattener = MockFlatten::new();
    flattener.expect_flatten().times(1).returning(|_| {
        Err(FlattenError::Exit {
            program: "latexpand".to_string(),
            status: "exit status: 1".to_string(),
        })
    });

    let loader = ProjectLoader::new(Arc::new(flattener));
    let err = loader.load(&entry).unwrap_err();

    assert!(matches!(err, LoadError::Tool(FlattenError::Exit { .. })));
    assert_eq!(err.category(), "tool_error");
}

#[test]
fn test_load_single_stream_document() {
    let dir = tempdir().unwrap();
    let entry = write_entry(dir.path(), "hep-th9901001.gz", &single_entry(TIKZ_PAPER));

    let flattener = CatFlatten::default();
    let loader = ProjectLoader::new(Arc::new(flattener.clone())).with_filter(tikz_filter());
    let project = loader.load(&entry).unwrap();

    assert_eq!(project.text.as_bytes(), TIKZ_PAPER.trim_ascii_end());
    assert_eq!(flattener.calls(), 1);
}

#[test]
fn test_load_single_stream_is_filtered_too() {
    let dir = tempdir().unwrap();
    let entry = write_entry(dir.path(), "hep-th9901002.gz", &single_entry(PLAIN_PAPER));

    let flattener = CatFlatten::default();
    let loader = ProjectLoader::new(Arc::new(flattener.clone())).with_filter(tikz_filter());

    assert!(matches!(loader.load(&entry), Err(LoadError::FilterMiss)));
    assert_eq!(flattener.calls(), 0);
}

#[test]
fn test_load_rejects_unrecognized_container() {
    let dir = tempdir().unwrap();
    let entry = write_entry(dir.path(), "0704.0004.gz", b"this is neither gzip nor tar");

    let loader = ProjectLoader::new(Arc::new(CatFlatten::default()));
    let err = loader.load(&entry).unwrap_err();

    assert!(matches!(err, LoadError::UnrecognizedContainer));
    assert_eq!(err.category(), "unrecognized_container");
}

#[test]
fn test_load_removes_entry_scratch_directory() {
    let dir = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let ok_entry = write_entry(
        dir.path(),
        "0704.0005.gz",
        &project_entry(&[("main.tex", TIKZ_PAPER), ("fig.tex", b"\\begin{figure}\n")]),
    );
    let miss_entry = write_entry(
        dir.path(),
        "0704.0006.gz",
        &project_entry(&[("main.tex", PLAIN_PAPER)]),
    );

    let loader = ProjectLoader::new(Arc::new(CatFlatten::default()))
        .with_filter(tikz_filter())
        .with_scratch_root(Some(scratch.path().to_path_buf()));

    loader.load(&ok_entry).unwrap();
    assert!(dir_is_empty(scratch.path()));

    assert!(loader.load(&miss_entry).is_err());
    assert!(dir_is_empty(scratch.path()));
}

#[test]
fn test_load_missing_scratch_root_is_fatal() {
    let dir = tempdir().unwrap();
    let entry = write_entry(
        dir.path(),
        "0704.0007.gz",
        &project_entry(&[("main.tex", PLAIN_PAPER)]),
    );

    let loader = ProjectLoader::new(Arc::new(CatFlatten::default()))
        .with_scratch_root(Some(dir.path().join("does-not-exist")));
    let err = loader.load(&entry).unwrap_err();

    assert!(matches!(err, LoadError::Workspace { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_open_container_accepts_plain_tar() {
    let dir = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let entry = write_entry(dir.path(), "plain.gz", &tar_of(&[("main.tex", PLAIN_PAPER)]));

    let container = open_container(&entry, scratch.path()).unwrap();

    assert_eq!(container, Container::Archive);
    assert!(scratch.path().join("main.tex").is_file());
}

#[test]
fn test_open_container_gzip_stream() {
    let dir = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    let entry = write_entry(dir.path(), "single.gz", &single_entry(PLAIN_PAPER));

    let container = open_container(&entry, scratch.path()).unwrap();

    assert_eq!(container, Container::Stream(PLAIN_PAPER.to_vec()));
    assert!(dir_is_empty(scratch.path()));
}

#[test]
fn test_find_root_file_prefers_document_class() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.tex"), "\\section{A}\n").unwrap();
    fs::write(dir.path().join("b.tex"), "\\documentclass{article}\n").unwrap();
    fs::write(dir.path().join("c.tex"), "\\documentstyle{article}\n").unwrap();

    let root = find_root_file(dir.path()).unwrap().unwrap();
    assert_eq!(root.file_name(), Some(OsStr::new("b.tex")));
}

#[test]
fn test_find_root_file_accepts_document_style() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.tex"), "\\section{A}\n").unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/old.tex"), "\\documentstyle{article}\n").unwrap();

    let root = find_root_file(dir.path()).unwrap().unwrap();
    assert_eq!(root, dir.path().join("src/old.tex"));
}

#[test]
fn test_find_root_file_falls_back_to_first_tex() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/a.tex"), "nested\n").unwrap();
    fs::write(dir.path().join("z.tex"), "top level\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "\\documentclass{article}\n").unwrap();

    let root = find_root_file(dir.path()).unwrap().unwrap();
    assert_eq!(root, dir.path().join("z.tex"));
}

#[test]
fn test_find_root_file_none_without_tex() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("readme.md"), "nothing").unwrap();

    assert!(find_root_file(dir.path()).unwrap().is_none());
}

#[test]
fn test_any_source_matches_only_looks_at_tex_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("figure.tikz"), "tikzpicture").unwrap();
    fs::write(dir.path().join("main.tex"), PLAIN_PAPER).unwrap();

    assert!(!any_source_matches(dir.path(), &tikz_filter()).unwrap());

    fs::write(dir.path().join("fig.tex"), TIKZ_PAPER).unwrap();
    assert!(any_source_matches(dir.path(), &tikz_filter()).unwrap());
}

#[test]
fn test_decode_text_falls_back_to_latin1() {
    let encodings = [TextEncoding::Utf8, TextEncoding::Latin1];
    assert_eq!(decode_text(b"caf\xe9", &encodings).unwrap(), "caf\u{e9}");
    assert_eq!(decode_text("caf\u{e9}".as_bytes(), &encodings).unwrap(), "caf\u{e9}");
}

#[test]
fn test_decode_text_reports_every_encoding_tried() {
    let err = decode_text(b"\xff\xfe", &[TextEncoding::Utf8]).unwrap_err();
    match err {
        LoadError::Decode { tried } => assert_eq!(tried, vec!["utf-8".to_string()]),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_load_truncated_nested_archive_is_unrecognized() {
    let dir = tempdir().unwrap();
    let body = vec![b'%'; 4000];
    let mut archive = tar_of(&[("main.tex", body.as_slice())]);
    archive.truncate(1500);
    let entry = write_entry(dir.path(), "0704.0008.gz", &single_entry(&archive));

    let flattener = CatFlatten::default();
    let loader = ProjectLoader::new(Arc::new(flattener.clone()));
    let err = loader.load(&entry).unwrap_err();

    assert!(matches!(err, LoadError::UnrecognizedContainer), "got {err:?}");
    assert_eq!(err.category(), "unrecognized_container");
    assert_eq!(flattener.calls(), 0);
}

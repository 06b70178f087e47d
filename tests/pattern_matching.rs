mod common;
use crate::common::init_tracing;

use globwatch::watch::patterns::{Match, PatternSet, TypePolicy};
use globwatch::{EntryKind, WatchOptions};

fn compile(patterns: &[&str], options: &WatchOptions) -> PatternSet {
    let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
    PatternSet::compile(&patterns, options).unwrap()
}

#[test]
fn star_stays_within_one_segment_and_doublestar_crosses() {
    init_tracing();

    let set = compile(&["src/*.ts"], &WatchOptions::default());
    assert_eq!(set.matches("src/a.ts", Some(EntryKind::File)), Match::Included);
    assert_eq!(
        set.matches("src/sub/a.ts", Some(EntryKind::File)),
        Match::Excluded
    );

    let set = compile(&["**/*.ts"], &WatchOptions::default());
    assert_eq!(set.matches("a.ts", Some(EntryKind::File)), Match::Included);
    assert_eq!(
        set.matches("src/sub/a.ts", Some(EntryKind::File)),
        Match::Included
    );
    assert_eq!(set.matches("a.rs", Some(EntryKind::File)), Match::Excluded);
}

#[test]
fn question_mark_and_bracket_classes() {
    init_tracing();

    let set = compile(&["src/mod?.rs"], &WatchOptions::default());
    assert_eq!(
        set.matches("src/mod1.rs", Some(EntryKind::File)),
        Match::Included
    );

    // `?` never matches a separator.
    let set = compile(&["a?b"], &WatchOptions::default());
    assert_eq!(set.matches("axb", Some(EntryKind::File)), Match::Included);
    assert_eq!(set.matches("a/b", Some(EntryKind::File)), Match::Excluded);

    let set = compile(&["[ab].txt"], &WatchOptions::default());
    assert_eq!(set.matches("a.txt", Some(EntryKind::File)), Match::Included);
    assert_eq!(set.matches("b.txt", Some(EntryKind::File)), Match::Included);
    assert_eq!(set.matches("c.txt", Some(EntryKind::File)), Match::Excluded);
}

#[test]
fn dot_policy_excludes_any_hidden_segment() {
    init_tracing();

    let set = compile(&["**/*.ts"], &WatchOptions::default());
    assert_eq!(
        set.matches("src/.hidden.ts", Some(EntryKind::File)),
        Match::Excluded
    );
    assert_eq!(
        set.matches(".cache/a.ts", Some(EntryKind::File)),
        Match::Excluded
    );

    let opts = WatchOptions {
        dot: true,
        ..Default::default()
    };
    let set = compile(&["**/*.ts"], &opts);
    assert_eq!(
        set.matches("src/.hidden.ts", Some(EntryKind::File)),
        Match::Included
    );
    assert_eq!(
        set.matches(".cache/a.ts", Some(EntryKind::File)),
        Match::Included
    );
}

#[test]
fn ignore_patterns_veto_inclusion() {
    init_tracing();

    let opts = WatchOptions {
        ignore: vec!["**/generated/**".into(), "**/*.tmp.ts".into()],
        ..Default::default()
    };
    let set = compile(&["**/*.ts"], &opts);

    assert_eq!(set.matches("src/a.ts", Some(EntryKind::File)), Match::Included);
    assert_eq!(
        set.matches("src/generated/a.ts", Some(EntryKind::File)),
        Match::Excluded
    );
    assert_eq!(
        set.matches("src/b.tmp.ts", Some(EntryKind::File)),
        Match::Excluded
    );
}

#[test]
fn type_policy_resolution() {
    init_tracing();

    // Defaults: files only.
    assert_eq!(
        TypePolicy::resolve(&WatchOptions::default()),
        TypePolicy::FilesOnly
    );

    // only_directories flips the default off.
    let opts = WatchOptions {
        only_directories: true,
        ..Default::default()
    };
    assert_eq!(TypePolicy::resolve(&opts), TypePolicy::DirectoriesOnly);

    // Both set explicitly: only_files wins.
    let opts = WatchOptions {
        only_directories: true,
        only_files: Some(true),
        ..Default::default()
    };
    assert_eq!(TypePolicy::resolve(&opts), TypePolicy::FilesOnly);

    // Everything off: any kind goes.
    let opts = WatchOptions {
        only_files: Some(false),
        ..Default::default()
    };
    assert_eq!(TypePolicy::resolve(&opts), TypePolicy::Any);
}

#[test]
fn type_policy_filters_matched_paths() {
    init_tracing();

    let set = compile(&["**/*"], &WatchOptions::default());
    assert_eq!(set.matches("src", Some(EntryKind::Dir)), Match::Excluded);
    assert_eq!(set.matches("a.txt", Some(EntryKind::File)), Match::Included);
    // Symlinks count as non-directories.
    assert_eq!(set.matches("link", Some(EntryKind::Symlink)), Match::Included);

    let opts = WatchOptions {
        only_directories: true,
        ..Default::default()
    };
    let set = compile(&["**/*"], &opts);
    assert_eq!(set.matches("src", Some(EntryKind::Dir)), Match::Included);
    assert_eq!(set.matches("a.txt", Some(EntryKind::File)), Match::Excluded);
    assert_eq!(set.matches("link", Some(EntryKind::Symlink)), Match::Excluded);
}

#[test]
fn unknown_kind_defers_to_the_caller() {
    init_tracing();

    let set = compile(&["**/*"], &WatchOptions::default());
    assert_eq!(set.matches("maybe", None), Match::NeedsKind);

    // With no type policy there is nothing to defer on.
    let opts = WatchOptions {
        only_files: Some(false),
        ..Default::default()
    };
    let set = compile(&["**/*"], &opts);
    assert_eq!(set.matches("maybe", None), Match::Included);
}

#[test]
fn empty_path_and_empty_patterns_are_rejected() {
    init_tracing();

    let set = compile(&["**/*"], &WatchOptions::default());
    assert_eq!(set.matches("", Some(EntryKind::File)), Match::Excluded);

    assert!(PatternSet::compile(&[], &WatchOptions::default()).is_err());
    assert!(PatternSet::compile(&["a[".to_string()], &WatchOptions::default()).is_err());
}

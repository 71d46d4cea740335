use std::fs::{create_dir_all, write};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use pagesync_core::contract::{
    File, MockConverter, MockDestination, MockSource, NewPage, Page, SourceArgs,
};
use pagesync_core::element::{Element, PageElement};
use pagesync_core::error::{NodeError, SyncError};
use pagesync_core::markdown::MarkdownConverter;
use pagesync_core::source::LocalSource;
use pagesync_core::synchronise::{SyncContext, Synchroniser};
use pagesync_core::SyncOptions;
use tempfile::tempdir;

/// One recorded `create_page` call.
#[derive(Debug, Clone)]
struct Created {
    parent: String,
    file_path: String,
    kinds: Vec<&'static str>,
    lock_page: bool,
}

type Log = Arc<Mutex<Vec<String>>>;

fn file(path: &str) -> File {
    File {
        name: path.rsplit('/').next().unwrap().to_owned(),
        icon: None,
        content: format!("content of {path}"),
        path: path.to_owned(),
        last_updated: SystemTime::UNIX_EPOCH,
        extension: "md".to_owned(),
    }
}

fn accessible_source(paths: &[&str], log: Log) -> MockSource {
    let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
    let mut source = MockSource::new();
    source.expect_source_is_accessible().returning(|_| Ok(true));
    source
        .expect_get_file_path_list()
        .return_once(move |_| Ok(paths));
    source
        .expect_get_file()
        .returning(move |_args: &SourceArgs, path: &str| {
            log.lock().unwrap().push(format!("fetch:{path}"));
            Ok(file(path))
        });
    source
}

fn page_converter() -> MockConverter {
    let mut converter = MockConverter::new();
    converter.expect_set_current_file_path().return_const(());
    converter.expect_convert_to_element().returning(|file: &File| {
        Ok(Element::Page(
            PageElement::new(file.path.clone()).with_children(vec![Element::paragraph(&file.content)]),
        ))
    });
    converter
}

fn recording_destination(log: Log, created: Arc<Mutex<Vec<Created>>>) -> MockDestination {
    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Ok("parent".to_owned()));
    destination
        .expect_destination_is_accessible()
        .returning(|_| Ok(true));
    destination
        .expect_create_page()
        .returning(move |req: NewPage<'_>| {
            log.lock().unwrap().push(format!("create:{}", req.file_path));
            created.lock().unwrap().push(Created {
                parent: req.parent_page_id.to_owned(),
                file_path: req.file_path.to_owned(),
                kinds: req.page_element.children.iter().map(Element::kind).collect(),
                lock_page: req.lock_page,
            });
            Ok(Page {
                page_id: Some(format!("page:{}", req.file_path)),
                ..Page::default()
            })
        });
    destination
}

#[tokio::test]
async fn clean_sync_failure_does_not_stop_ordered_page_creation() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let created = Arc::new(Mutex::new(Vec::new()));

    let source = accessible_source(
        &["guide/install.md", "README.md", "guide/index.md", "guide/usage.md"],
        log.clone(),
    );
    let mut destination = recording_destination(log.clone(), created.clone());
    let delete_log = log.clone();
    destination
        .expect_delete_child_blocks()
        .times(1)
        .returning(move |parent_id: &str| {
            delete_log.lock().unwrap().push(format!("delete:{parent_id}"));
            Err("rate limited".into())
        });
    destination.expect_append_to_page().never();

    let synchroniser = Synchroniser::new(SyncContext {
        source,
        destination,
        converter: page_converter(),
    });
    let report = synchroniser
        .execute(
            &SourceArgs::new("/docs"),
            "https://www.notion.so/Parent-parent",
            SyncOptions {
                clean_sync: true,
                lock_page: false,
            },
        )
        .await
        .expect("clean sync failure must not abort the run");

    assert!(report.clean_sync_failed);
    assert_eq!(report.parent_id, "parent");
    assert_eq!(report.root_appended, None);

    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            "delete:parent",
            "fetch:README.md",
            "create:README.md",
            "fetch:guide/index.md",
            "create:guide/index.md",
            "fetch:guide/install.md",
            "create:guide/install.md",
            "fetch:guide/usage.md",
            "create:guide/usage.md",
        ]
    );

    let created = created.lock().unwrap().clone();
    assert_eq!(created[0].parent, "parent");
    assert_eq!(created[0].kinds, vec!["divider", "table-of-contents", "text"]);
    assert_eq!(created[1].parent, "parent");
    assert_eq!(created[1].file_path, "guide/index.md");
    assert_eq!(
        created[1].kinds,
        vec!["divider", "table-of-contents", "text", "divider"]
    );
    assert_eq!(created[2].parent, "page:guide/index.md");
    assert_eq!(created[3].parent, "page:guide/index.md");
    assert!(created.iter().all(|c| !c.lock_page));

    let paths: Vec<_> = report.pages.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["README.md", "guide/index.md", "guide/install.md", "guide/usage.md"]
    );
}

#[tokio::test]
async fn root_index_is_appended_to_parent_page() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let created = Arc::new(Mutex::new(Vec::new()));
    let appended = Arc::new(Mutex::new(Vec::new()));

    let mut destination = recording_destination(log.clone(), created.clone());
    destination.expect_delete_child_blocks().never();
    let appended_in = appended.clone();
    destination
        .expect_append_to_page()
        .times(1)
        .returning(move |page_id: &str, page: &PageElement| {
            appended_in
                .lock()
                .unwrap()
                .push((page_id.to_owned(), page.clone()));
            Ok(())
        });

    let synchroniser = Synchroniser::new(SyncContext {
        source: accessible_source(&["index.md", "a.md"], log.clone()),
        destination,
        converter: page_converter(),
    });
    let report = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.root_appended.as_deref(), Some("index.md"));
    let appended = appended.lock().unwrap();
    assert_eq!(appended[0].0, "parent");
    assert_eq!(appended[0].1.title, "index.md");
    // the merged root body is not decorated
    assert_eq!(appended[0].1.children.len(), 1);

    let created = created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].file_path, "a.md");
}

#[tokio::test]
async fn failing_fetch_aborts_with_node_path_and_skips_siblings() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let created = Arc::new(Mutex::new(Vec::new()));

    let mut source = MockSource::new();
    source.expect_source_is_accessible().returning(|_| Ok(true));
    source
        .expect_get_file_path_list()
        .returning(|_| Ok(vec!["c.md".into(), "a.md".into(), "b.md".into()]));
    let fetch_log = log.clone();
    source
        .expect_get_file()
        .returning(move |_args: &SourceArgs, path: &str| {
            fetch_log.lock().unwrap().push(format!("fetch:{path}"));
            if path == "b.md" {
                Err("disk on fire".into())
            } else {
                Ok(file(path))
            }
        });

    let synchroniser = Synchroniser::new(SyncContext {
        source,
        destination: recording_destination(log.clone(), created),
        converter: page_converter(),
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.path(), Some("b.md"));
    assert!(err.to_string().contains("b.md"));
    assert!(matches!(
        err,
        SyncError::Node {
            source: NodeError::Fetch(_),
            ..
        }
    ));
    let log = log.lock().unwrap().clone();
    assert_eq!(log, vec!["fetch:a.md", "create:a.md", "fetch:b.md"]);
}

#[tokio::test]
async fn failing_conversion_aborts_with_node_path_and_skips_siblings() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let created = Arc::new(Mutex::new(Vec::new()));

    let mut converter = MockConverter::new();
    converter.expect_set_current_file_path().return_const(());
    converter.expect_convert_to_element().returning(|file: &File| {
        if file.path == "b.md" {
            Err("unbalanced fence".into())
        } else {
            Ok(Element::Page(PageElement::new(file.path.clone())))
        }
    });

    let synchroniser = Synchroniser::new(SyncContext {
        source: accessible_source(&["a.md", "b.md", "c.md"], log.clone()),
        destination: recording_destination(log.clone(), created),
        converter,
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.path(), Some("b.md"));
    assert!(matches!(
        err,
        SyncError::Node {
            source: NodeError::Convert(_),
            ..
        }
    ));
    let log = log.lock().unwrap().clone();
    assert_eq!(log, vec!["fetch:a.md", "create:a.md", "fetch:b.md"]);
}

#[tokio::test]
async fn failing_page_creation_aborts_with_node_path_and_skips_siblings() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Ok("parent".to_owned()));
    destination
        .expect_destination_is_accessible()
        .returning(|_| Ok(true));
    let create_log = log.clone();
    destination
        .expect_create_page()
        .returning(move |req: NewPage<'_>| {
            create_log
                .lock()
                .unwrap()
                .push(format!("create:{}", req.file_path));
            if req.file_path == "b.md" {
                Err("validation_error".into())
            } else {
                Ok(Page {
                    page_id: Some(format!("page:{}", req.file_path)),
                    ..Page::default()
                })
            }
        });

    let synchroniser = Synchroniser::new(SyncContext {
        source: accessible_source(&["a.md", "b.md", "c.md"], log.clone()),
        destination,
        converter: page_converter(),
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.path(), Some("b.md"));
    assert!(matches!(
        err,
        SyncError::Node {
            source: NodeError::Create(_),
            ..
        }
    ));
    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec!["fetch:a.md", "create:a.md", "fetch:b.md", "create:b.md"]
    );
}

#[tokio::test]
async fn failing_root_merge_aborts_before_any_page_is_created() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let created = Arc::new(Mutex::new(Vec::new()));

    let mut destination = recording_destination(log.clone(), created.clone());
    destination
        .expect_append_to_page()
        .times(1)
        .returning(|_: &str, _: &PageElement| Err("conflict".into()));

    let synchroniser = Synchroniser::new(SyncContext {
        source: accessible_source(&["index.md", "a.md"], log.clone()),
        destination,
        converter: page_converter(),
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.path(), Some("index.md"));
    assert!(matches!(
        err,
        SyncError::Node {
            source: NodeError::Append { ref page_id, .. },
            ..
        } if page_id == "parent"
    ));
    assert!(created.lock().unwrap().is_empty());
    assert_eq!(*log.lock().unwrap(), vec!["fetch:index.md"]);
}

#[tokio::test]
async fn destination_check_error_keeps_its_cause() {
    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Ok("parent".to_owned()));
    destination
        .expect_destination_is_accessible()
        .returning(|_| Err("connection refused".into()));
    destination.expect_create_page().never();

    let mut source = MockSource::new();
    source.expect_source_is_accessible().never();
    source.expect_get_file_path_list().never();

    let synchroniser = Synchroniser::new(SyncContext {
        source,
        destination,
        converter: MockConverter::new(),
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::DestinationCheck { ref parent_id, .. } if parent_id == "parent"));
    assert_eq!(err.path(), None);
    let cause = std::error::Error::source(&err).expect("cause is preserved");
    assert_eq!(cause.to_string(), "connection refused");
}

#[tokio::test]
async fn non_page_conversion_is_fatal() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut converter = MockConverter::new();
    converter.expect_set_current_file_path().return_const(());
    converter
        .expect_convert_to_element()
        .returning(|_| Ok(Element::Divider));
    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Ok("parent".to_owned()));
    destination
        .expect_destination_is_accessible()
        .returning(|_| Ok(true));
    destination.expect_create_page().never();

    let synchroniser = Synchroniser::new(SyncContext {
        source: accessible_source(&["a.md", "b.md"], log),
        destination,
        converter,
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Node {
            ref path,
            source: NodeError::NotAPage { kind: "divider" },
        } if path == "a.md"
    ));
}

#[tokio::test]
async fn missing_page_id_is_fatal_only_when_children_follow() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Ok("parent".to_owned()));
    destination
        .expect_destination_is_accessible()
        .returning(|_| Ok(true));
    destination
        .expect_create_page()
        .times(2)
        .returning(|_| Ok(Page::default()));

    let synchroniser = Synchroniser::new(SyncContext {
        source: accessible_source(&["a.md", "dir/x.md", "dir/y.md"], log),
        destination,
        converter: page_converter(),
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.path(), Some("dir/x.md"));
    assert!(matches!(
        err,
        SyncError::Node {
            source: NodeError::MissingPageId,
            ..
        }
    ));
}

#[tokio::test]
async fn inaccessible_destination_aborts_before_reading_source() {
    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Ok("parent".to_owned()));
    destination
        .expect_destination_is_accessible()
        .returning(|_| Ok(false));
    destination.expect_create_page().never();

    let mut source = MockSource::new();
    source.expect_source_is_accessible().never();
    source.expect_get_file_path_list().never();

    let synchroniser = Synchroniser::new(SyncContext {
        source,
        destination,
        converter: MockConverter::new(),
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::DestinationInaccessible { ref parent_id } if parent_id == "parent"));
}

#[tokio::test]
async fn source_check_error_keeps_its_cause() {
    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Ok("parent".to_owned()));
    destination
        .expect_destination_is_accessible()
        .returning(|_| Ok(true));

    let mut source = MockSource::new();
    source
        .expect_source_is_accessible()
        .returning(|_| Err("permission denied".into()));
    source.expect_get_file_path_list().never();

    let synchroniser = Synchroniser::new(SyncContext {
        source,
        destination,
        converter: MockConverter::new(),
    });
    let err = synchroniser
        .execute(&SourceArgs::new("/docs"), "parent", SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::SourceCheck { .. }));
    let cause = std::error::Error::source(&err).expect("cause is preserved");
    assert_eq!(cause.to_string(), "permission denied");
}

#[tokio::test]
async fn unresolvable_destination_reference_is_fatal() {
    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Err("no page id in url".into()));
    destination.expect_delete_child_blocks().never();

    let synchroniser = Synchroniser::new(SyncContext {
        source: MockSource::new(),
        destination,
        converter: MockConverter::new(),
    });
    let err = synchroniser
        .execute(
            &SourceArgs::new("/docs"),
            "https://example.com/",
            SyncOptions {
                clean_sync: true,
                lock_page: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ResolveParent { ref reference, .. } if reference == "https://example.com/"));
}

#[tokio::test]
async fn lock_page_is_forwarded_to_every_created_page() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let created = Arc::new(Mutex::new(Vec::new()));
    let mut destination = recording_destination(log.clone(), created.clone());
    destination
        .expect_delete_child_blocks()
        .times(1)
        .returning(|_| Ok(()));

    let synchroniser = Synchroniser::new(SyncContext {
        source: accessible_source(&["a.md", "b/c.md", "b/d.md"], log),
        destination,
        converter: page_converter(),
    });
    let report = synchroniser
        .execute(
            &SourceArgs::new("/docs"),
            "parent",
            SyncOptions {
                clean_sync: true,
                lock_page: true,
            },
        )
        .await
        .unwrap();

    assert!(!report.clean_sync_failed);
    let created = created.lock().unwrap();
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|c| c.lock_page));
}

#[tokio::test]
async fn local_markdown_tree_end_to_end() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("site");
    create_dir_all(root.join("guide")).unwrap();
    write(root.join("index.md"), "# Home\n\nWelcome.").unwrap();
    write(root.join("guide/index.md"), "# Guide\n\nStart here.").unwrap();
    write(root.join("guide/install.md"), "# Install\n\n```sh\nmake\n```").unwrap();

    let titles = Arc::new(Mutex::new(Vec::new()));
    let mut destination = MockDestination::new();
    destination
        .expect_get_page_id_from_url()
        .returning(|_| Ok("parent".to_owned()));
    destination
        .expect_destination_is_accessible()
        .returning(|_| Ok(true));
    destination
        .expect_append_to_page()
        .times(1)
        .returning(|_: &str, page: &PageElement| {
            assert_eq!(page.title, "Home");
            Ok(())
        });
    let titles_in = titles.clone();
    destination
        .expect_create_page()
        .returning(move |req: NewPage<'_>| {
            titles_in
                .lock()
                .unwrap()
                .push((req.parent_page_id.to_owned(), req.page_element.title.clone()));
            Ok(Page {
                page_id: Some(format!("id-{}", req.page_element.title)),
                ..Page::default()
            })
        });

    let synchroniser = Synchroniser::new(SyncContext {
        source: LocalSource::new(),
        destination,
        converter: MarkdownConverter::new(),
    });
    let report = synchroniser
        .execute(&SourceArgs::new(&root), "parent", SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.root_appended.as_deref(), Some("index.md"));
    assert_eq!(
        *titles.lock().unwrap(),
        vec![
            ("parent".to_owned(), "Guide".to_owned()),
            ("id-Guide".to_owned(), "Install".to_owned()),
        ]
    );
}

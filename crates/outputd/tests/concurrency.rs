//! Integration tests for concurrent use of the output service.
//!
//! Build clients and filesystem clients share one service instance. These
//! tests run many of them at once and verify that the registry stays
//! consistent and that no call deadlocks.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::Harness;
use outputd::{CleanRequest, Code, FinalizeBuildRequest, RemoteOutputService};
use vfs::{
    Attributes, AttributesMask, Directory, DirectoryChild, DirectoryEntryReporter,
    EMPTY_DIRECTORY_LINK_COUNT, FileStatus,
};
use vpath::Component;

#[derive(Default)]
struct Names(Vec<(u64, String)>);

impl DirectoryEntryReporter for Names {
    fn report_entry(
        &mut self,
        next_cookie: u64,
        name: &Component,
        _child: DirectoryChild,
        _attributes: &Attributes,
    ) -> bool {
        self.0.push((next_cookie, name.as_str().to_owned()));
        true
    }
}

fn list(harness: &Harness) -> Vec<(u64, String)> {
    let mut names = Names::default();
    harness
        .service
        .virtual_read_dir(0, AttributesMask::NONE, &mut names)
        .expect("read_dir should succeed");
    names.0
}

#[test]
fn concurrent_builds_on_distinct_output_bases() {
    let harness = Arc::new(Harness::new());
    let barrier = Arc::new(Barrier::new(16));
    let mut handles = vec![];

    for thread_id in 0..16 {
        let harness = Arc::clone(&harness);
        let barrier = Arc::clone(&barrier);

        handles.push(thread::spawn(move || {
            let output_base = format!("ob{thread_id}");
            let build_id = format!("b{thread_id}");
            barrier.wait();

            harness
                .start_build(&output_base, &build_id)
                .expect("start should succeed");
            let files = (0..20)
                .map(|index| {
                    harness.file(
                        &format!("out/{index}"),
                        format!("{thread_id}/{index}").as_bytes(),
                    )
                })
                .collect();
            harness
                .create_files(&build_id, files)
                .expect("create should succeed");
            for index in 0..20 {
                let status = harness
                    .stat(&build_id, &format!("out/{index}"))
                    .expect("stat should succeed");
                assert!(matches!(status, Some(FileStatus::File { .. })));
            }
            harness
                .service
                .finalize_build(&FinalizeBuildRequest { build_id })
                .expect("finalize should succeed");
        }));
    }

    for handle in handles {
        handle.join().expect("thread should not panic");
    }

    assert_eq!(harness.service.output_path_count(), 16);
    assert_eq!(harness.service.change_id(), 16);
    let entries = list(&harness);
    assert_eq!(entries.len(), 16);
    let mut cookies: Vec<u64> = entries.iter().map(|(cookie, _)| *cookie).collect();
    cookies.sort_unstable();
    assert_eq!(cookies, (1..=16).collect::<Vec<_>>());
}

#[test]
fn concurrent_clean_and_start_on_one_output_base() {
    let harness = Arc::new(Harness::new());
    let barrier = Arc::new(Barrier::new(8));
    let mut handles = vec![];

    for thread_id in 0..8 {
        let harness = Arc::clone(&harness);
        let barrier = Arc::clone(&barrier);

        handles.push(thread::spawn(move || {
            barrier.wait();
            for round in 0..50 {
                let build_id = format!("b{thread_id}-{round}");
                if thread_id % 2 == 0 {
                    harness
                        .start_build("shared", &build_id)
                        .expect("start should succeed");
                    // A concurrent start may have closed the build, or a
                    // concurrent clean may be emptying its output path.
                    if let Err(error) =
                        harness.create_files(&build_id, vec![harness.file("out/f", b"f")])
                    {
                        assert!(
                            matches!(error.code(), Code::FailedPrecondition | Code::NotFound),
                            "{error}"
                        );
                    }
                } else {
                    harness
                        .service
                        .clean(&CleanRequest {
                            output_base_id: "shared".to_owned(),
                        })
                        .expect("clean should succeed");
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("thread should not panic");
    }

    assert!(harness.service.output_path_count() <= 1);
    harness
        .service
        .clean(&CleanRequest {
            output_base_id: "shared".to_owned(),
        })
        .expect("clean should succeed");
    assert_eq!(harness.service.output_path_count(), 0);
    assert!(list(&harness).is_empty());
}

#[test]
fn directory_reads_during_mutation() {
    let harness = Arc::new(Harness::new());
    let barrier = Arc::new(Barrier::new(4));
    let mut handles = vec![];

    for thread_id in 0..2 {
        let harness = Arc::clone(&harness);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for round in 0..100 {
                let output_base = format!("ob{thread_id}-{}", round % 5);
                harness
                    .start_build(&output_base, &format!("b{thread_id}-{round}"))
                    .expect("start should succeed");
                if round % 3 == 0 {
                    harness
                        .service
                        .clean(&CleanRequest {
                            output_base_id: output_base,
                        })
                        .expect("clean should succeed");
                }
            }
        }));
    }
    for _ in 0..2 {
        let harness = Arc::clone(&harness);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut previous_change_id = 0;
            for _ in 0..200 {
                let mut attributes = Attributes::default();
                harness
                    .service
                    .virtual_get_attributes(AttributesMask::ALL, &mut attributes);
                let change_id = attributes.change_id().expect("change id is reported");
                assert!(change_id >= previous_change_id);
                previous_change_id = change_id;
                assert!(
                    attributes.link_count().expect("link count is reported")
                        >= EMPTY_DIRECTORY_LINK_COUNT
                );

                let entries = list(&harness);
                assert!(entries.windows(2).all(|pair| pair[0].0 < pair[1].0));
            }
        }));
    }

    for handle in handles {
        handle.join().expect("thread should not panic");
    }

    let entries = list(&harness);
    assert_eq!(entries.len(), harness.service.output_path_count());
}

//! End-to-end runs of the recipe pipeline against real temp storage.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;

use common::*;
use fileflow::plugins::annotate::Annotate;
use fileflow::plugins::passthrough::Passthrough;
use fileflow::plugins::ClamAv;
use fileflow::{ErrorKind, PipelineError, StorageType};

#[test]
fn test_unknown_recipe_fails_with_single_terminal_status() {
    let harness = TestHarness::new();

    let outcome = harness.run(text_file("in.txt", "hello"), "missing");

    assert!(matches!(outcome.result, Err(PipelineError::RecipeNotFound(ref n)) if n == "missing"));
    assert_eq!(outcome.snapshots.len(), 1);
    let updates = outcome.process.processing_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].processor_name, "RecipeCheck");
    assert_eq!(updates[0].status_description, "Recipe not found: missing");
    assert!(updates[0].done);
}

#[test]
fn test_mime_mismatch_never_runs_plugins() {
    let harness = TestHarness::new();
    let counting = CountingPlugin::new();
    harness.manager.add_processing_plugin("count", counting.clone());
    harness.manager.add_recipe(
        RecipeBuilder::new("images")
            .accept(&["image/"])
            .step("count")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "images");

    assert!(matches!(outcome.result, Err(PipelineError::InvalidMimeType(_))));
    assert_eq!(counting.calls(), 0);
    let updates = outcome.process.processing_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].processor_name, "MimeTypeCheck");
    let error = updates[0].error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::InvalidMimeType);
}

#[test]
fn test_file_below_minimum_size_is_rejected() {
    let harness = TestHarness::new();
    let counting = CountingPlugin::new();
    harness.manager.add_processing_plugin("count", counting.clone());
    harness.manager.add_recipe(
        RecipeBuilder::new("sized")
            .size_bounds(1024, 1_000_000)
            .step("count")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", &"x".repeat(500)), "sized");

    assert!(matches!(outcome.result, Err(PipelineError::InvalidFileSize(500))));
    assert_eq!(counting.calls(), 0);
    let last = outcome.process.latest_status().unwrap();
    assert_eq!(last.processor_name, "FileSizeCheck");
    assert_eq!(last.status_description, "Invalid file size: 500 bytes");
}

#[test]
fn test_file_above_maximum_size_is_rejected() {
    let harness = TestHarness::new();
    let counting = CountingPlugin::new();
    harness.manager.add_processing_plugin("count", counting.clone());
    harness.manager.add_recipe(
        RecipeBuilder::new("small")
            .size_bounds(0, 100)
            .step("count")
            .output("txt", &["out"], "private")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", &"x".repeat(101)), "small");

    assert!(matches!(outcome.result, Err(PipelineError::InvalidFileSize(101))));
    assert_eq!(counting.calls(), 0);
    let updates = outcome.process.processing_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].processor_name, "FileSizeCheck");
    assert_eq!(updates[0].error.as_ref().unwrap().kind, ErrorKind::InvalidFileSize);
    assert!(harness.files_in(harness.root()).is_empty());
}

#[test]
fn test_successful_run_ends_with_exactly_one_terminal_status() {
    let harness = TestHarness::new();
    harness.manager.add_processing_plugin("count", CountingPlugin::new());
    harness.manager.add_processing_plugin("passthrough", Passthrough);
    harness.manager.add_recipe(
        RecipeBuilder::new("docs")
            .step("count")
            .step("")
            .step("passthrough")
            .output("txt", &["out"], "private")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "docs");

    assert!(outcome.result.is_ok());
    let updates = outcome.process.processing_updates();
    let terminal: Vec<_> = updates.iter().filter(|s| s.done).collect();
    assert_eq!(terminal.len(), 1);
    assert!(updates.last().unwrap().done);
    assert_eq!(updates.last().unwrap().percentage, 100);

    // The empty step is skipped and does not count towards the percentage.
    let step_percentages: Vec<u8> = updates
        .iter()
        .filter(|s| s.status_description.starts_with("Processing step completed"))
        .map(|s| s.percentage)
        .collect();
    assert_eq!(step_percentages, vec![50, 100]);

    // Every snapshot the consumer saw is a prefix of the final log.
    assert!(!outcome.snapshots.is_empty());
    for snapshot in &outcome.snapshots {
        let seen = snapshot.processing_updates();
        assert_eq!(seen, &updates[..seen.len()]);
    }
    assert_eq!(outcome.snapshots.last().unwrap(), &outcome.process);
}

#[test]
fn test_identity_step_preserves_file() {
    let harness = TestHarness::new();
    harness.manager.add_processing_plugin("count", CountingPlugin::new());
    harness.manager.add_recipe(
        RecipeBuilder::new("copy")
            .step("count")
            .output("txt", &["out"], "private")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello world"), "copy");

    let files = outcome.result.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].mime_type, "text/plain");
    assert_eq!(files[0].size, 11);
    let path = files[0].local_path.clone().unwrap();
    assert_eq!(path, harness.private_dir.join("out.txt"));
    assert_eq!(std::fs::read_to_string(path).unwrap(), "hello world");
}

#[test]
fn test_failing_second_step_reports_prior_progress_and_writes_nothing() {
    let harness = TestHarness::new();
    let counting = CountingPlugin::new();
    harness.manager.add_processing_plugin("A", counting.clone());
    harness.manager.add_processing_plugin("B", FailingPlugin);
    harness.manager.add_recipe(
        RecipeBuilder::new("broken")
            .step("A")
            .step("B")
            .output("txt", &["out"], "public")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "broken");

    assert!(matches!(
        outcome.result,
        Err(PipelineError::PluginExecutionFailed { ref plugin, .. }) if plugin == "B"
    ));
    assert_eq!(counting.calls(), 1);

    let updates = outcome.process.processing_updates();
    assert_eq!(updates.len(), 3);
    assert_eq!(updates[0].processor_name, "Counting");
    assert!(!updates[0].done);
    assert_eq!(updates[1].processor_name, "A");
    assert_eq!(updates[1].percentage, 50);
    assert!(!updates[1].done);
    assert_eq!(updates[2].processor_name, "B");
    assert!(updates[2].done);
    assert_eq!(
        updates[2].error.as_ref().unwrap().kind,
        ErrorKind::PluginExecutionFailed
    );

    assert!(harness.files_in(harness.root()).is_empty());
}

#[test]
fn test_missing_plugin_fails_the_run() {
    let harness = TestHarness::new();
    harness
        .manager
        .add_recipe(RecipeBuilder::new("ghost").step("nope").build());

    let outcome = harness.run(text_file("in.txt", "hello"), "ghost");

    assert!(matches!(outcome.result, Err(PipelineError::PluginNotFound(_))));
    let last = outcome.process.latest_status().unwrap();
    assert_eq!(last.processor_name, "nope");
    assert_eq!(last.status_description, "processing plugin(nope) not found");
}

#[test]
fn test_metadata_template_renders_target_name() {
    let harness = TestHarness::new();
    harness.manager.add_processing_plugin("annotate", Annotate);
    harness.manager.add_recipe(
        RecipeBuilder::new("reports")
            .step_with("annotate", json!({"set": {"lang": "en"}}))
            .output("txt", &["report_{metadata.lang}"], "private")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "reports");

    let files = outcome.result.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "report_en.txt");
    assert!(harness.private_dir.join("report_en.txt").exists());
}

#[test]
fn test_public_output_gets_url() {
    let harness = TestHarness::new();
    harness.manager.add_recipe(
        RecipeBuilder::new("publish")
            .output("txt", &["out"], "public")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "publish");

    let files = outcome.result.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].url.as_deref(), Some("https://cdn.x/out.txt"));
    assert_eq!(
        harness.files_in(&harness.public_dir),
        vec![PathBuf::from("out.txt")]
    );
    assert_eq!(outcome.process.result_files(), files.as_slice());
}

#[test]
fn test_each_format_and_template_yields_an_output() {
    let harness = TestHarness::new();
    harness.manager.add_recipe(
        RecipeBuilder::new("fanout")
            .output("txt", &["a", "nested/b"], "private")
            .output("txt", &["c"], "temp")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "fanout");

    let files = outcome.result.unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|f| f.url.is_none()));
    assert_eq!(
        harness.files_in(&harness.private_dir),
        vec![PathBuf::from("a.txt"), PathBuf::from("nested/b.txt")]
    );
    assert_eq!(harness.files_in(&harness.temp_path), vec![PathBuf::from("c.txt")]);
}

#[test]
fn test_split_step_fans_out_over_formats_and_templates() {
    let harness = TestHarness::new();
    let counting = CountingPlugin::new();
    harness.manager.add_processing_plugin("split", SplittingPlugin { parts: 3 });
    harness.manager.add_processing_plugin("count", counting.clone());
    harness.manager.add_recipe(
        RecipeBuilder::new("pieces")
            .step("split")
            .step("count")
            .output("txt", &["a_{metadata.part}", "b_{metadata.part}"], "private")
            .output("txt", &["c_{metadata.part}"], "temp")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "pieces");

    // 3 files x (2 + 1) targets.
    let files = outcome.result.unwrap();
    assert_eq!(files.len(), 9);
    assert_eq!(counting.calls(), 1);
    assert_eq!(
        harness.files_in(&harness.private_dir),
        ["a_1", "a_2", "a_3", "b_1", "b_2", "b_3"]
            .iter()
            .map(|n| PathBuf::from(format!("{}.txt", n)))
            .collect::<Vec<_>>()
    );
    assert_eq!(
        harness.files_in(&harness.temp_path),
        vec![
            PathBuf::from("c_1.txt"),
            PathBuf::from("c_2.txt"),
            PathBuf::from("c_3.txt")
        ]
    );
    assert_eq!(
        std::fs::read_to_string(harness.temp_path.join("c_2.txt")).unwrap(),
        "part 2"
    );

    let updates = outcome.process.processing_updates();
    let step_percentages: Vec<u8> = updates
        .iter()
        .filter(|s| s.status_description.starts_with("Processing step completed"))
        .map(|s| s.percentage)
        .collect();
    assert_eq!(step_percentages, vec![50, 100]);
    assert!(updates.windows(2).all(|w| w[0].percentage <= w[1].percentage));
    assert_eq!(updates.last().unwrap().resulting_files.len(), 9);
}

#[test]
fn test_joining_step_collapses_files() {
    let harness = TestHarness::new();
    harness.manager.add_processing_plugin("split", SplittingPlugin { parts: 2 });
    harness.manager.add_processing_plugin("join", JoiningPlugin);
    harness.manager.add_recipe(
        RecipeBuilder::new("roundtrip")
            .step("split")
            .step("join")
            .output("txt", &["all"], "private")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "roundtrip");

    let files = outcome.result.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(
        std::fs::read_to_string(harness.private_dir.join("all.txt")).unwrap(),
        "part 1part 2"
    );
}

#[test]
fn test_step_returning_no_files_fails_the_run() {
    let harness = TestHarness::new();
    let counting = CountingPlugin::new();
    harness.manager.add_processing_plugin("swallow", SwallowingPlugin);
    harness.manager.add_processing_plugin("count", counting.clone());
    harness.manager.add_recipe(
        RecipeBuilder::new("vanish")
            .step("swallow")
            .step("count")
            .output("txt", &["out"], "private")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "vanish");

    assert!(matches!(outcome.result, Err(PipelineError::EmptyPluginOutput(ref p)) if p == "swallow"));
    assert_eq!(counting.calls(), 0);
    let last = outcome.process.latest_status().unwrap();
    assert!(last.done);
    assert_eq!(last.processor_name, "swallow");
    assert_eq!(last.status_description, "Processing plugin(swallow) returned no files");
    assert!(harness.files_in(harness.root()).is_empty());
}

#[test]
fn test_virus_finding_reaches_result_files() {
    let harness = TestHarness::new();
    let (address, clamd) = fake_clamd(b"stream: Eicar-Test-Signature FOUND\0");
    harness
        .manager
        .add_processing_plugin("virus_scan", ClamAv::new(address, Duration::from_secs(5)));
    harness.manager.add_recipe(
        RecipeBuilder::new("scanned")
            .step("virus_scan")
            .output("txt", &["scanned"], "private")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "X5O!P%@AP"), "scanned");

    assert_eq!(clamd.join().unwrap(), b"X5O!P%@AP");
    let files = outcome.result.unwrap();
    let expected = vec!["virus detected: Eicar-Test-Signature".to_string()];
    assert_eq!(files[0].processing_errors, expected);
    assert!(!outcome.process.has_failed());
    assert_eq!(outcome.process.result_files()[0].processing_errors, expected);
}

#[test]
fn test_public_url_keeps_scheme_like_names_under_base() {
    let harness = TestHarness::new();
    harness.manager.add_processing_plugin("annotate", Annotate);
    harness.manager.add_recipe(
        RecipeBuilder::new("tagged")
            .step_with("annotate", json!({"set": {"lang": "x"}}))
            .output("txt", &["en:{metadata.lang}", "my report"], "public")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "tagged");

    let files = outcome.result.unwrap();
    let urls: Vec<&str> = files.iter().filter_map(|f| f.url.as_deref()).collect();
    assert_eq!(
        urls,
        vec!["https://cdn.x/en:x.txt", "https://cdn.x/my%20report.txt"]
    );
    for url in urls {
        let local = harness.manager.layout().local_path_of_url(url).unwrap();
        assert!(local.starts_with(&harness.public_dir));
    }
}

#[test]
fn test_unknown_storage_type_fails_before_writing() {
    let harness = TestHarness::new();
    harness.manager.add_recipe(
        RecipeBuilder::new("bad-storage")
            .output("txt", &["ok"], "private")
            .output("txt", &["out"], "cloud")
            .build(),
    );

    let outcome = harness.run(text_file("in.txt", "hello"), "bad-storage");

    assert!(matches!(outcome.result, Err(PipelineError::OutputStorageInvalid(ref s)) if s == "cloud"));
    let last = outcome.process.latest_status().unwrap();
    assert_eq!(last.processor_name, "OutputFormatCheck");
    assert!(harness.files_in(harness.root()).is_empty());
}

#[test]
fn test_escaping_templates_are_rejected() {
    for template in ["../escape", "/etc/passwd"] {
        let harness = TestHarness::new();
        harness.manager.add_recipe(
            RecipeBuilder::new("escape")
                .output("txt", &[template], "private")
                .build(),
        );

        let outcome = harness.run(text_file("in.txt", "hello"), "escape");

        assert!(
            matches!(outcome.result, Err(PipelineError::InvalidOutputPath(_))),
            "template {} should be rejected",
            template
        );
        assert!(outcome.process.has_failed());
    }
}

#[test]
fn test_dropped_receiver_does_not_stop_the_run() {
    let harness = TestHarness::new();
    harness.manager.add_recipe(
        RecipeBuilder::new("quiet")
            .output("txt", &["out"], "private")
            .build(),
    );
    let (status_tx, status_rx) = crossbeam_channel::unbounded();
    drop(status_rx);

    let mut process = fileflow::FileProcess::new("in.txt", "quiet");
    let result = harness
        .manager
        .process_file(text_file("in.txt", "hello"), "quiet", &mut process, status_tx);

    assert!(result.is_ok());
    assert!(process.is_done());
    assert!(harness.private_dir.join("out.txt").exists());
}

#[test]
fn test_recipes_loaded_from_directory_drive_builtin_plugins() {
    let harness = TestHarness::new();
    fileflow::plugins::register_builtin_plugins(&harness.manager, &fileflow::Settings::default());

    let recipes_dir = harness.root().join("recipes");
    std::fs::create_dir_all(&recipes_dir).unwrap();
    std::fs::write(
        recipes_dir.join("notes.yaml"),
        r#"
name: notes
accepted_mime_types: ["text/"]
processing_steps:
  - plugin_name: annotate
    params:
      set:
        lang: de
  - plugin_name: passthrough
output_formats:
  - format: txt
    target_file_names: ["notes/{metadata.lang}"]
    storage_type: public
"#,
    )
    .unwrap();

    assert_eq!(harness.manager.load_recipes(&recipes_dir).unwrap(), 1);
    let outcome = harness.run(text_file("in.txt", "hallo"), "notes");

    let files = outcome.result.unwrap();
    assert_eq!(files[0].url.as_deref(), Some("https://cdn.x/notes/de.txt"));
    assert_eq!(
        std::fs::read_to_string(harness.public_dir.join("notes/de.txt")).unwrap(),
        "hallo"
    );
}

#[test]
fn test_run_processing_step_places_result_in_storage() {
    let harness = TestHarness::new();
    harness.manager.add_processing_plugin("count", CountingPlugin::new());

    let file = harness
        .manager
        .create_managed_file_from_reader("report.txt", "data".as_bytes(), StorageType::Temp)
        .unwrap();
    let source = file.local_path.clone().unwrap();

    let result = harness
        .manager
        .run_processing_step(file, "count", &serde_json::Value::Null, Some(StorageType::Public))
        .unwrap();

    assert_eq!(result.local_path, Some(harness.public_dir.join("report.txt")));
    assert_eq!(result.url.as_deref(), Some("https://cdn.x/report.txt"));
    assert!(!source.exists());
    assert_eq!(
        std::fs::read_to_string(harness.public_dir.join("report.txt")).unwrap(),
        "data"
    );
}

#[test]
fn test_run_processing_step_errors() {
    let harness = TestHarness::new();
    harness.manager.add_processing_plugin("swallow", SwallowingPlugin);
    harness.manager.add_processing_plugin("fail", FailingPlugin);
    let params = serde_json::Value::Null;

    let missing = harness
        .manager
        .run_processing_step(text_file("a.txt", "x"), "nope", &params, None);
    assert!(matches!(missing, Err(PipelineError::PluginNotFound(_))));

    let empty = harness
        .manager
        .run_processing_step(text_file("a.txt", "x"), "swallow", &params, None);
    assert!(matches!(empty, Err(PipelineError::EmptyPluginOutput(ref p)) if p == "swallow"));

    let failed = harness
        .manager
        .run_processing_step(text_file("a.txt", "x"), "fail", &params, None);
    assert_eq!(failed.unwrap_err().kind(), ErrorKind::PluginExecutionFailed);
}

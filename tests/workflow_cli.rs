//! End-to-end workflow runs through the docflow binary.

mod common;

use common::TestFixture;
use std::fs;

fn strict_links_manifest(fixture: &TestFixture) -> String {
    let path = fixture.state.path().join("strict.json");
    let manifest = serde_json::json!({
        "schema_version": 1,
        "max_retries": 0,
        "modules": [
            { "name": "scope", "required": true },
            { "name": "whitespace", "init_order": 10 },
            {
                "name": "links",
                "init_order": 20,
                "config": { "fail_on_empty_targets": true }
            }
        ]
    });
    fs::write(&path, manifest.to_string()).expect("write manifest");
    path.display().to_string()
}

#[test]
fn workflow_pauses_before_interactive_scope_then_completes() {
    let fixture = TestFixture::new();

    let created = fixture.start("proj");
    created.assert_code(0);
    assert!(
        created.stdout.contains("created workflow proj"),
        "stdout: {}",
        created.stdout
    );
    assert!(created.stdout.contains("3 files, 3 modules"));
    assert!(fixture.workflow_file("proj").is_file());

    let paused = fixture.run(["resume", "proj"]);
    paused.assert_code(0);
    assert!(paused.stdout.contains("paused before scope"));
    let status = fixture.status_json("proj");
    assert_eq!(status["workflow"]["status"], "paused");
    assert_eq!(status["next"]["module"], "scope");

    let finished = fixture.run(["resume", "proj", "--interactive", "--all"]);
    finished.assert_code(0);
    assert!(finished.stdout.contains("workflow proj completed"));
    assert_eq!(fixture.read_doc("guide.md"), "# Guide\n\nSee [intro](intro.md).\n");
    assert_eq!(fixture.read_doc("intro.md"), "Intro\n");

    let status = fixture.status_json("proj");
    assert_eq!(status["workflow"]["status"], "completed");
    assert_eq!(status["progress"]["percent_complete"], 100.0);
    assert_eq!(status["progress"]["files_modified"], 1);
    assert_eq!(status["next"]["kind"], "done");
    let states = &status["workflow"]["module_states"];
    assert_eq!(states["whitespace"]["files_modified"], 1);
    assert_eq!(states["links"]["outputs"]["links"], 1);
    assert_eq!(states["links"]["outputs"]["empty_targets"], 0);

    let again = fixture.run(["resume", "proj"]);
    again.assert_code(0);
    assert!(again.stdout.contains("nothing to do"));
}

#[test]
fn start_runs_the_first_module_unless_told_not_to() {
    let fixture = TestFixture::new();
    let docs = fixture.docs_path().display().to_string();

    let run = fixture.run(["start", "proj", docs.as_str(), "--interactive"]);
    run.assert_code(0);
    assert!(run.stdout.contains("scope completed"), "stdout: {}", run.stdout);

    let status = fixture.status_json("proj");
    assert_eq!(status["workflow"]["module_states"]["scope"]["status"], "completed");
    assert_eq!(status["next"]["module"], "whitespace");
    assert_eq!(status["workflow"]["discovered_files"].as_array().map(Vec::len), Some(3));
}

#[test]
fn continue_is_an_alias_for_resume() {
    let fixture = TestFixture::new();
    fixture.start("proj").assert_code(0);

    let run = fixture.run(["continue", "proj", "--interactive"]);
    run.assert_code(0);
    assert!(run.stdout.contains("scope completed"));
}

#[test]
fn invalid_start_requests_exit_with_invalid_input() {
    let fixture = TestFixture::new();
    fixture.start("proj").assert_code(0);

    let duplicate = fixture.start("proj");
    duplicate.assert_code(2);
    assert!(duplicate.stderr.contains("already exists"));

    let empty = tempfile::TempDir::new().expect("empty dir");
    let empty_path = empty.path().display().to_string();
    let run = fixture.run(["start", "other", empty_path.as_str(), "--no-run"]);
    run.assert_code(2);
    assert!(!fixture.workflow_file("other").exists());

    let missing = fixture.docs_path().join("nope").display().to_string();
    fixture
        .run(["start", "other", missing.as_str(), "--no-run"])
        .assert_code(2);

    let docs = fixture.docs_path().display().to_string();
    fixture
        .run(["start", "../escape", docs.as_str(), "--no-run"])
        .assert_code(2);

    let unknown = fixture.run(["resume", "ghost"]);
    unknown.assert_code(2);
    assert!(unknown.stderr.contains("workflow not found: ghost"));
}

#[test]
fn failing_module_blocks_until_skipped() {
    let fixture = TestFixture::new();
    fixture.write_doc("broken.md", "see [nothing]() here\n");
    let manifest = strict_links_manifest(&fixture);
    let docs = fixture.docs_path().display().to_string();
    fixture
        .run([
            "--manifest",
            manifest.as_str(),
            "start",
            "proj",
            docs.as_str(),
            "--no-run",
        ])
        .assert_code(0);

    let failed = fixture.run([
        "--manifest",
        manifest.as_str(),
        "resume",
        "proj",
        "--interactive",
        "--all",
    ]);
    failed.assert_code(1);
    assert!(failed.stderr.contains("links failed"), "stderr: {}", failed.stderr);
    assert!(failed.stderr.contains("out of retries"));

    let status = fixture.status_json("proj");
    assert_eq!(status["workflow"]["status"], "failed");
    assert_eq!(status["next"]["kind"], "blocked");
    assert_eq!(status["next"]["failed_module"], "links");
    let links = &status["workflow"]["module_states"]["links"];
    assert_eq!(links["retry_count"], 1);
    assert!(links["error_message"]
        .as_str()
        .is_some_and(|message| message.contains("broken.md")));

    let blocked = fixture.run(["--manifest", manifest.as_str(), "resume", "proj"]);
    blocked.assert_code(1);
    assert!(blocked.stderr.contains("blocked on failed module links"));

    let skipped = fixture.run(["skip", "proj", "links"]);
    skipped.assert_code(0);
    assert!(skipped.stdout.contains("workflow is completed"));
    assert_eq!(fixture.status_json("proj")["progress"]["percent_complete"], 100.0);
}

#[test]
fn retry_requeues_a_failed_module_with_a_fresh_budget() {
    let fixture = TestFixture::new();
    fixture.write_doc("broken.md", "see [nothing]() here\n");
    let manifest = strict_links_manifest(&fixture);
    let docs = fixture.docs_path().display().to_string();
    fixture
        .run([
            "--manifest",
            manifest.as_str(),
            "start",
            "proj",
            docs.as_str(),
            "--no-run",
        ])
        .assert_code(0);
    fixture
        .run([
            "--manifest",
            manifest.as_str(),
            "resume",
            "proj",
            "--interactive",
            "--all",
        ])
        .assert_code(1);

    fixture.run(["retry", "proj", "whitespace"]).assert_code(1);

    let retried = fixture.run(["retry", "proj", "links"]);
    retried.assert_code(0);
    let status = fixture.status_json("proj");
    assert_eq!(status["workflow"]["status"], "active");
    assert_eq!(status["workflow"]["module_states"]["links"]["retry_count"], 0);

    fixture.write_doc("broken.md", "see [something](guide.md) here\n");
    let resumed = fixture.run(["--manifest", manifest.as_str(), "resume", "proj"]);
    resumed.assert_code(0);
    assert!(resumed.stdout.contains("workflow proj completed"));
}

#[test]
fn list_and_cleanup_by_status() {
    let fixture = TestFixture::new();
    fixture.start("done").assert_code(0);
    fixture
        .run(["resume", "done", "--interactive", "--all"])
        .assert_code(0);
    fixture.start("open").assert_code(0);

    let listed = fixture.run(["list", "--json"]);
    listed.assert_code(0);
    let rows = listed.json();
    let names: Vec<&str> = rows
        .as_array()
        .expect("rows")
        .iter()
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert_eq!(names, vec!["done", "open"]);
    assert_eq!(rows[0]["status"], "completed");
    assert_eq!(rows[1]["status"], "active");

    let text = fixture.run(["list"]);
    assert!(text.stdout.contains("done"));
    assert!(text.stdout.contains("100%"));

    let cleaned = fixture.run(["cleanup", "--completed"]);
    cleaned.assert_code(0);
    assert!(cleaned.stdout.contains("removed done"));
    assert!(!fixture.workflow_file("done").exists());
    assert!(fixture.workflow_file("open").exists());

    fixture.run(["cleanup", "open"]).assert_code(0);
    assert!(fixture.run(["list"]).stdout.contains("no workflows"));
}

#[test]
fn corrupt_workflow_file_is_recovered_from_backup() {
    let fixture = TestFixture::new();
    fixture.start("proj").assert_code(0);
    fixture.run(["resume", "proj"]).assert_code(0);

    fs::write(fixture.workflow_file("proj"), "{\"schema_version\": 2, \"na").expect("corrupt");

    let status = fixture.status_json("proj");
    assert_eq!(status["workflow"]["name"], "proj");
    let restored = fs::read_to_string(fixture.workflow_file("proj")).expect("read restored");
    assert!(serde_json::from_str::<serde_json::Value>(&restored).is_ok());
}

#[test]
fn status_text_summarizes_progress() {
    let fixture = TestFixture::new();
    fixture.start("proj").assert_code(0);

    let status = fixture.run(["status", "proj"]);
    status.assert_code(0);
    assert!(status.stdout.contains("workflow proj (active)"));
    assert!(status.stdout.contains("0/3 modules done"));
    assert!(status.stdout.contains("next: scope"));
}

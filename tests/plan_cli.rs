//! Resolution, preferences, and manifest commands through the docflow binary.

mod common;

use common::TestFixture;

#[test]
fn plan_json_lists_default_modules_in_order() {
    let fixture = TestFixture::new();

    let run = fixture.run(["plan", "--json"]);
    run.assert_code(0);
    let report = run.json();
    let names: Vec<&str> = report["plan"]
        .as_array()
        .expect("plan array")
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    assert_eq!(names, vec!["scope", "whitespace", "links"]);
    assert_eq!(report["plan"][0]["required"], true);
    assert_eq!(report["plan"][0]["interactive"], true);
    assert_eq!(report["plan"][1]["state"], "enabled");
    assert_eq!(report["plan"][2]["resolved_dependencies"][0], "whitespace");
    assert_eq!(report["errors"].as_array().map(Vec::len), Some(0));
}

#[test]
fn disabling_required_module_only_warns() {
    let fixture = TestFixture::new();

    let run = fixture.run(["plan", "--disable", "scope"]);
    run.assert_code(0);
    assert!(
        run.stderr.contains("module scope is required; ignoring --disable scope"),
        "stderr: {}",
        run.stderr
    );
    assert!(run.stdout.contains("scope"));
}

#[test]
fn disabling_a_needed_dependency_is_an_error() {
    let fixture = TestFixture::new();

    let plan = fixture.run(["plan", "--disable", "whitespace"]);
    plan.assert_code(2);
    assert!(plan
        .stderr
        .contains("module links requires whitespace, which was disabled on the command line"));

    let docs = fixture.docs_path().display().to_string();
    let start = fixture.run([
        "start",
        "proj",
        docs.as_str(),
        "--no-run",
        "--disable",
        "whitespace",
    ]);
    start.assert_code(2);
    assert!(!fixture.workflow_file("proj").exists());
}

#[test]
fn disabling_the_leaf_module_drops_it_from_new_workflows() {
    let fixture = TestFixture::new();
    let docs = fixture.docs_path().display().to_string();

    let run = fixture.run([
        "start",
        "proj",
        docs.as_str(),
        "--no-run",
        "--disable",
        "links",
    ]);
    run.assert_code(0);
    assert!(run.stdout.contains("2 modules"));
    let status = fixture.status_json("proj");
    let plan: Vec<&str> = status["workflow"]["ordered_module_plan"]
        .as_array()
        .expect("plan")
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    assert_eq!(plan, vec!["scope", "whitespace"]);
}

#[test]
fn unknown_override_is_reported() {
    let fixture = TestFixture::new();

    let run = fixture.run(["plan", "--enable", "spellcheck"]);
    run.assert_code(2);
    assert!(run.stderr.contains("module not found: spellcheck"));

    fixture
        .run(["plan", "--enable", "links", "--disable", "links"])
        .assert_code(2);
}

#[test]
fn preferences_persist_and_trigger_auto_enable() {
    let fixture = TestFixture::new();

    fixture.run(["prefs", "disable", "whitespace"]).assert_code(0);
    let shown = fixture.run(["prefs", "show"]);
    shown.assert_code(0);
    assert_eq!(shown.json()["disabled_modules"][0], "whitespace");

    let plan = fixture.run(["plan", "--json"]);
    plan.assert_code(0);
    let report = plan.json();
    assert_eq!(report["plan"][1]["state"], "enabled");
    assert!(report["warnings"]
        .as_array()
        .expect("warnings")
        .iter()
        .filter_map(|warning| warning.as_str())
        .any(|warning| warning.contains("auto-enabled whitespace")));

    fixture.run(["prefs", "reset", "whitespace"]).assert_code(0);
    let shown = fixture.run(["prefs", "show"]).json();
    assert_eq!(shown["disabled_modules"].as_array().map(Vec::len), Some(0));

    fixture.run(["prefs", "enable", "nope"]).assert_code(2);
}

#[test]
fn preference_config_reaches_the_plan() {
    let fixture = TestFixture::new();

    fixture
        .run(["prefs", "set", "whitespace", "collapse_blank_lines", "true"])
        .assert_code(0);

    let report = fixture.run(["plan", "--json"]).json();
    assert_eq!(
        report["plan"][1]["effective_config"]["collapse_blank_lines"],
        true
    );
}

#[test]
fn init_installs_manifest_once() {
    let fixture = TestFixture::new();

    let stub = fixture.run(["init", "--stdout"]);
    stub.assert_code(0);
    assert_eq!(stub.json()["schema_version"], 1);
    assert!(!fixture.manifest_file().exists());

    fixture.run(["init"]).assert_code(0);
    assert!(fixture.manifest_file().is_file());

    let again = fixture.run(["init"]);
    again.assert_code(2);
    assert!(again.stderr.contains("--force"));

    fixture.run(["init", "--force"]).assert_code(0);
    fixture.run(["plan"]).assert_code(0);
}

#[test]
fn invalid_manifest_is_a_configuration_error() {
    let fixture = TestFixture::new();
    std::fs::write(fixture.manifest_file(), "{\"schema_version\": 1, \"modulez\": []}")
        .expect("write manifest");

    let run = fixture.run(["plan"]);
    run.assert_code(2);
    assert!(run.stderr.contains("configuration error"));
}

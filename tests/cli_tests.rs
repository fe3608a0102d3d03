#![cfg(feature = "cli_api")]

use assert_cmd::Command;
use predicates::str::contains as str_contains;
use serde_json::{Value, json};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::{TempDir, tempdir};

#[allow(deprecated)]
fn run_cli(data_dir: &Path, script: &str) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("cli").expect("cli binary");
    cmd.env("WEEKPLAN_DATA_DIR", data_dir)
        .env("WEEKPLAN_OFFLINE", "1")
        .env("WEEKPLAN_BACKEND", "file")
        .env_remove("WEEKPLAN_CONFIG")
        .write_stdin(script.to_string())
        .assert()
}

fn seeded_dir() -> TempDir {
    let dir = tempdir().expect("create temp dir");
    let doc = json!({
        "teachers": [{"id": "t1", "name": "Frau Krause", "short": "KR"}],
        "subjects": [{"id": "s1", "name": "Mathe", "defaultTeacherId": "t1"}],
        "specials": [{"id": "sp1", "title": "Wandertag"}]
    });
    std::fs::write(dir.path().join("weekplan.document.v2.json"), doc.to_string()).unwrap();
    let legal = json!({
        "BE-2025": {
            "fetchedAt": "2025-01-01T00:00:00Z",
            "items": [{"date": "2025-10-03", "name": "Tag der Deutschen Einheit"}]
        }
    });
    std::fs::write(
        dir.path().join("weekplan.legal_holiday_cache.v1.json"),
        legal.to_string(),
    )
    .unwrap();
    dir
}

fn saved_document(dir: &Path) -> Value {
    let text = std::fs::read_to_string(dir.join("weekplan.document.v2.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn cli_prints_help_and_rejects_unknown_commands() {
    let dir = tempdir().unwrap();
    run_cli(dir.path(), "help\nfrobnicate\nquit\n")
        .success()
        .stdout(str_contains("export <json|csv> <path>"))
        .stdout(str_contains("Unknown command 'frobnicate'"));
}

#[test]
fn cli_refuses_edits_on_public_holidays() {
    let dir = seeded_dir();
    run_cli(
        dir.path(),
        "week 2025-W40\nset fr 0 subject s1\nset do 0,1 subject s1 t1\nshow\nquit\n",
    )
    .success()
    .stdout(str_contains(
        "Rejected: 2025-10-03 is a public holiday (Tag der Deutschen Einheit); editing is locked",
    ))
    .stdout(str_contains("Updated 2 cell(s)."))
    .stdout(str_contains("Mathe (KR)"))
    .stdout(str_contains("(locked)"));
}

#[test]
fn cli_saves_edits_on_exit() {
    let dir = seeded_dir();
    run_cli(
        dir.path(),
        "goto 2025 12\nset 2 3 special sp1\nnote Projekttag\nquit\n",
    )
    .success()
    .stdout(str_contains("Saved note."));

    let doc = saved_document(dir.path());
    let active = doc["settings"]["activePlanId"].as_str().unwrap();
    let week = &doc["plans"][active]["weeks"]["2025-W12"];
    assert_eq!(week["note"], "Projekttag");
    assert_eq!(week["cells"]["2-3"]["specialId"], "sp1");
}

#[test]
fn cli_placement_applies_the_default_teacher() {
    let dir = seeded_dir();
    run_cli(
        dir.path(),
        "goto 2025 11\nput 1 0\nplace subject s1\nput 1 0\nplace subject s1\nquit\n",
    )
    .success()
    .stdout(str_contains("Nothing armed; use 'place' first."))
    .stdout(str_contains("Placement mode on."))
    .stdout(str_contains("Placed into 1-0."))
    .stdout(str_contains("Placement mode off."));

    let doc = saved_document(dir.path());
    let active = doc["settings"]["activePlanId"].as_str().unwrap();
    assert_eq!(
        doc["plans"][active]["weeks"]["2025-W11"]["cells"]["1-0"]["teacherId"],
        "t1"
    );
}

#[test]
fn cli_teacher_delete_clears_references() {
    let dir = seeded_dir();
    run_cli(
        dir.path(),
        "goto 2025 11\nset 1 0 subject s1 t1\nteacher del t1\nteacher del t1\nquit\n",
    )
    .success()
    .stdout(str_contains("Deleted teacher t1."))
    .stdout(str_contains("Error: unknown teacher 't1'"));

    let doc = saved_document(dir.path());
    assert_eq!(doc["teachers"], json!([]));
    assert_eq!(doc["subjects"][0]["defaultTeacherId"], "");
}

#[test]
fn cli_exports_week_csv_and_imports_json() {
    let dir = seeded_dir();
    let csv_path = dir.path().join("week.csv");
    let import_path = dir.path().join("import.json");
    std::fs::write(
        &import_path,
        json!({"teachers": [{"id": "t2", "name": "Herr Berg"}]}).to_string(),
    )
    .unwrap();

    let script = format!(
        "goto 2025 10\nset mo 0 subject s1 t1\nexport csv {}\nimport merge {}\nlist\nquit\n",
        csv_path.display(),
        import_path.display()
    );
    run_cli(dir.path(), &script)
        .success()
        .stdout(str_contains("Exported 2025-W10"))
        .stdout(str_contains("(merge)"))
        .stdout(str_contains("Herr Berg"));

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv.starts_with("2025-W10,Mo 03.03.,"));
    assert!(csv.contains("Block 1,Mathe (KR),,,,"));
}

#[test]
fn cli_reports_malformed_week_keys() {
    let dir = tempdir().unwrap();
    run_cli(dir.path(), "week 2025-W99\nweek soon\nquit\n")
        .success()
        .stdout(str_contains("week 99 does not exist in ISO year 2025"))
        .stdout(str_contains("is not of the form YYYY-Www"));
}

#[test]
fn cli_set_fills_in_the_default_teacher() {
    let dir = seeded_dir();
    run_cli(
        dir.path(),
        "goto 2025 11\nset mo 0 subject s1\nquit\n",
    )
    .success()
    .stdout(str_contains("Updated 1 cell(s)."));

    let doc = saved_document(dir.path());
    let active = doc["settings"]["activePlanId"].as_str().unwrap();
    let cells = &doc["plans"][active]["weeks"]["2025-W11"]["cells"];
    assert_eq!(cells["1-0"]["teacherId"], "t1");
}

#[test]
fn cli_rejects_cells_with_unknown_ids() {
    let dir = seeded_dir();
    run_cli(
        dir.path(),
        "goto 2025 11\nset mo 0 subject ghost\nset mo 1 special nope\nset mo 2 subject s1 t9\nquit\n",
    )
    .success()
    .stdout(str_contains("Rejected: cell refers to unknown subject 'ghost'"))
    .stdout(str_contains("Rejected: cell refers to unknown special 'nope'"))
    .stdout(str_contains("Rejected: cell refers to unknown teacher 't9'"));

    let text = std::fs::read_to_string(dir.path().join("weekplan.document.v2.json")).unwrap();
    for id in ["ghost", "nope", "t9"] {
        assert!(!text.contains(id), "{id} was stored");
    }
}

#[test]
#[allow(deprecated)]
fn cli_autosaves_while_idle() {
    let dir = seeded_dir();
    let doc_path = dir.path().join("weekplan.document.v2.json");
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("cli"))
        .env("WEEKPLAN_DATA_DIR", dir.path())
        .env("WEEKPLAN_OFFLINE", "1")
        .env("WEEKPLAN_BACKEND", "file")
        .env("WEEKPLAN_SAVE_DEBOUNCE_MS", "50")
        .env_remove("WEEKPLAN_CONFIG")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn cli");
    let mut stdin = child.stdin.take().expect("cli stdin");
    stdin.write_all(b"goto 2025 12\nnote Autosaved\n").unwrap();
    stdin.flush().unwrap();

    let started = Instant::now();
    let mut saved = false;
    while started.elapsed() < Duration::from_secs(10) {
        let text = std::fs::read_to_string(&doc_path).unwrap_or_default();
        if text.contains("Autosaved") {
            saved = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    stdin.write_all(b"quit\n").unwrap();
    drop(stdin);
    let status = child.wait().expect("wait for cli");
    assert!(saved, "document was not saved while the session sat idle");
    assert!(status.success());
}

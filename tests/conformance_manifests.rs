//! Purpose: Run every bundled conformance manifest through the library runner.
//! Exports: Integration tests only.
//! Role: Keeps `conformance/*.json` executable and passing as the engine evolves.
//! Invariants: Manifests are discovered from the crate's `conformance/` directory.

use std::path::{Path, PathBuf};

use resolvent::conformance::{RunOptions, load_manifest, run_manifest};
use serde_json::json;

fn manifest_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("conformance")
}

fn manifest_paths() -> Vec<PathBuf> {
    let mut paths = std::fs::read_dir(manifest_dir())
        .expect("conformance dir")
        .map(|entry| entry.expect("entry").path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect::<Vec<_>>();
    paths.sort();
    paths
}

#[test]
fn bundled_manifests_pass() {
    let paths = manifest_paths();
    assert!(paths.len() >= 4, "expected bundled manifests, found {paths:?}");
    for path in paths {
        let manifest = load_manifest(&path).expect("load manifest");
        let report = run_manifest(&manifest, &RunOptions::new().keep_going())
            .unwrap_or_else(|err| panic!("{}: {err}", path.display()));
        assert!(
            report.passed(),
            "{}: failures {:?}",
            path.display(),
            report.failures
        );
    }
}

#[test]
fn chaining_report_exposes_final_states() {
    let manifest = load_manifest(&manifest_dir().join("chaining.json")).expect("load");
    let report = run_manifest(&manifest, &RunOptions::default()).expect("run");
    assert_eq!(report.name.as_deref(), Some("chaining"));
    assert_eq!(report.states["e3"], json!({ "state": "fulfilled", "value": 12 }));
    assert_eq!(
        report.states["f2"],
        json!({ "state": "fulfilled", "value": "handled:boom" })
    );
    assert_eq!(report.states["r3"], json!({ "state": "rejected", "value": "deep" }));
}

#[test]
fn assimilation_report_keeps_cycles_pending() {
    let manifest = load_manifest(&manifest_dir().join("assimilation.json")).expect("load");
    let report = run_manifest(&manifest, &RunOptions::default()).expect("run");
    assert_eq!(report.states["x"], json!({ "state": "pending" }));
    assert_eq!(report.states["y"], json!({ "state": "pending" }));
    assert_eq!(
        report.states["s"]["value"]["error"]["kind"],
        json!("self_resolution")
    );
}

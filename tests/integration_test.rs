use assert_cmd::Command;
use assert_cmd::cargo;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

const MANIFEST: &str = r#"{
  "dependencies": {
    "com.acme.emb": "0.1.0",
    "com.acme.foo": "1.0.0",
    "com.unity.modules.audio": "1.0.0"
  },
  "scopedRegistries": [
    {
      "name": "acme",
      "url": "https://packages.acme.dev",
      "scopes": ["com.acme"]
    }
  ]
}
"#;

const EMB_PACKAGE_JSON: &str = "{\n  \"name\": \"com.acme.emb\",\n  \"displayName\": \"Emb\",\n  \"version\": \"0.1.0\",\n  \"unity\": \"2022.3\"\n}\n";

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A project with a cached registry package and an embedded package.
fn create_project() -> TempDir {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(&root.join("Packages/manifest.json"), MANIFEST);
    write(&root.join("Packages/com.acme.emb/package.json"), EMB_PACKAGE_JSON);
    write(
        &root.join("Library/PackageCache/com.acme.foo@1.0.0/package.json"),
        r#"{"name": "com.acme.foo", "displayName": "Foo", "version": "1.0.0"}"#,
    );
    dir
}

fn pkgctl(project: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("pkgctl"));
    cmd.arg("--project").arg(project);
    cmd
}

fn manifest(project: &Path) -> String {
    fs::read_to_string(project.join("Packages/manifest.json")).unwrap()
}

#[test]
fn test_list_shows_states() {
    let project = create_project();

    pkgctl(project.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("com.acme.emb 0.1.0 (Embedded)"))
        .stdout(predicate::str::contains("com.acme.foo 1.0.0"))
        .stdout(predicate::str::contains("com.unity.modules.audio").not());

    // The first listing records where packages came from.
    let settings =
        fs::read_to_string(project.path().join("UserSettings/PackageOverrides.json")).unwrap();
    assert!(settings.contains("\"originalSource\": \"1.0.0\""));
}

#[test]
fn test_list_embedded_with_filter() {
    let project = create_project();

    pkgctl(project.path())
        .args(["list", "--embedded", "--filter", "EMB"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "com.acme.emb 0.1.0 (patch: 0.1.1, minor: 0.2.0, major: 1.0.0)",
        ));
}

#[test]
fn test_increment_with_yes() {
    let project = create_project();

    pkgctl(project.path())
        .args(["increment", "com.acme.emb", "major", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bumped com.acme.emb to 1.0.0"));

    let package_json =
        fs::read_to_string(project.path().join("Packages/com.acme.emb/package.json")).unwrap();
    assert_eq!(package_json, EMB_PACKAGE_JSON.replace("0.1.0", "1.0.0"));
}

#[test]
fn test_increment_declined_changes_nothing() {
    let project = create_project();

    pkgctl(project.path())
        .args(["increment", "com.acme.emb", "patch"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Increment cancelled."))
        .stderr(predicate::str::contains("[y/N]"));

    let package_json =
        fs::read_to_string(project.path().join("Packages/com.acme.emb/package.json")).unwrap();
    assert_eq!(package_json, EMB_PACKAGE_JSON);
}

#[test]
fn test_increment_invalid_version_fails() {
    let project = create_project();
    write(
        &project.path().join("Packages/com.acme.emb/package.json"),
        r#"{"name": "com.acme.emb", "version": "next"}"#,
    );

    pkgctl(project.path())
        .args(["increment", "com.acme.emb", "patch", "-y"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid version 'next'"));
}

#[test]
fn test_override_apply_and_unoverride() {
    let project = create_project();
    let local = project.path().join("checkouts/foo");
    write(&local.join("package.json"), r#"{"name": "com.acme.foo", "version": "1.1.0-dev"}"#);
    let local_source = format!("file:{}", local.display().to_string().replace('\\', "/"));

    pkgctl(project.path())
        .args(["override", "com.acme.foo"])
        .arg(&local)
        .args(["--apply", "--yes"])
        .assert()
        .success();

    let patched = manifest(project.path());
    assert_eq!(
        patched,
        MANIFEST.replace(
            r#""com.acme.foo": "1.0.0""#,
            &format!(r#""com.acme.foo": "{}""#, local_source)
        )
    );

    pkgctl(project.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(Override)"));

    pkgctl(project.path())
        .args(["unoverride", "com.acme.foo", "--apply", "-y"])
        .assert()
        .success();
    assert_eq!(manifest(project.path()), MANIFEST);
}

#[test]
fn test_override_then_separate_apply() {
    let project = create_project();

    pkgctl(project.path())
        .args(["override", "com.acme.foo", "/opt/foo", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pkgctl apply"));
    assert_eq!(manifest(project.path()), MANIFEST);

    pkgctl(project.path())
        .args(["apply", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated 1 package source(s)."));
    assert!(manifest(project.path()).contains("\"com.acme.foo\": \"file:"));

    pkgctl(project.path())
        .args(["apply", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already matches"));
}

#[test]
fn test_disable_and_enable_embedded() {
    let project = create_project();
    let package_dir = project.path().join("Packages/com.acme.emb");

    pkgctl(project.path())
        .args(["disable-embedded", "com.acme.emb", "--force"])
        .assert()
        .success();
    assert!(!package_dir.join("package.json").exists());
    assert!(package_dir.join("package.json.disabled").exists());

    pkgctl(project.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(Embedded - Disabled)"));

    pkgctl(project.path())
        .args(["enable-embedded", "com.acme.emb", "-y"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(package_dir.join("package.json")).unwrap(),
        EMB_PACKAGE_JSON
    );
}

#[test]
fn test_embed_and_remove_embedded() {
    let project = create_project();
    let embedded = project.path().join("Packages/com.acme.foo");

    pkgctl(project.path())
        .args(["embed", "com.acme.foo", "-y"])
        .assert()
        .success();
    assert!(embedded.join("package.json").exists());

    pkgctl(project.path())
        .args(["remove-embedded", "com.acme.foo"])
        .write_stdin("yes\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removal Plan"));
    assert!(!embedded.exists());
}

#[test]
fn test_set_source_version() {
    let project = create_project();

    pkgctl(project.path())
        .args(["set-source-version", "com.acme.foo", "1.2.0", "-y"])
        .assert()
        .success();
    assert_eq!(
        manifest(project.path()),
        MANIFEST.replace(r#""com.acme.foo": "1.0.0""#, r#""com.acme.foo": "1.2.0""#)
    );

    pkgctl(project.path())
        .args(["set-source-version", "com.acme.foo", " ", "-y"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no version given"));
}

#[test]
fn test_unknown_package_fails() {
    let project = create_project();

    pkgctl(project.path())
        .args(["embed", "com.acme.nope", "-y"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not in the current package list"));
}

#[test]
fn test_missing_manifest_fails() {
    let dir = tempdir().unwrap();

    pkgctl(dir.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("manifest"));
}

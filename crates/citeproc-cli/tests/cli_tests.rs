use std::fs;
use std::path::PathBuf;
use std::process::Command;

const STYLE: &str = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="in-text" version="1.0">
  <info><title>Test Author-Date</title></info>
  <citation>
    <layout prefix="(" suffix=")" delimiter="; ">
      <group delimiter=" ">
        <names variable="author"><name form="short"/></names>
        <date variable="issued"><date-part name="year"/></date>
      </group>
    </layout>
  </citation>
  <bibliography>
    <sort><key variable="author"/></sort>
    <layout suffix=".">
      <group delimiter=" ">
        <names variable="author"><name name-as-sort-order="all" initialize-with=". "/></names>
        <text variable="title" font-style="italic"/>
      </group>
    </layout>
  </bibliography>
</style>"#;

const REFERENCES: &str = r#"[
  {"id":"doe","type":"book","title":"A Book","author":[{"family":"Doe","given":"John"}],"issued":{"date-parts":[[2020]]}},
  {"id":"adams","type":"book","title":"Zebra","author":[{"family":"Adams","given":"Beth"}],"issued":{"date-parts":[[1999]]}}
]"#;

/// Writes the fixtures into a per-test directory.
fn fixtures(test: &str, style: &str) -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("citeproc-cli-{}-{}", test, std::process::id()));
    fs::create_dir_all(&dir).expect("Failed to create fixture dir");
    let style_path = dir.join("style.csl");
    let refs_path = dir.join("refs.json");
    fs::write(&style_path, style).expect("Failed to write style");
    fs::write(&refs_path, REFERENCES).expect("Failed to write references");
    (style_path, refs_path)
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_citeproc"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cite_each_reference() {
    let (style, refs) = fixtures("cite-each", STYLE);
    let output = run(&[
        "cite",
        "--style",
        style.to_str().unwrap(),
        "--references",
        refs.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "(Doe 2020)\n(Adams 1999)\n");
}

#[test]
fn test_cite_cluster_of_ids() {
    let (style, refs) = fixtures("cite-ids", STYLE);
    let output = run(&[
        "cite",
        "--style",
        style.to_str().unwrap(),
        "--references",
        refs.to_str().unwrap(),
        "--id",
        "adams",
        "--id",
        "doe",
    ]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "(Adams 1999; Doe 2020)\n");
}

#[test]
fn test_bibliography_html() {
    let (style, refs) = fixtures("bib", STYLE);
    let output = run(&[
        "bibliography",
        "--style",
        style.to_str().unwrap(),
        "--references",
        refs.to_str().unwrap(),
        "--format",
        "html",
    ]);
    assert!(output.status.success());
    insta::assert_snapshot!(String::from_utf8_lossy(&output.stdout), @r"
    Adams, B. <i>Zebra</i>.
    Doe, J. <i>A Book</i>.
    ");
}

#[test]
fn test_unknown_id_fails() {
    let (style, refs) = fixtures("unknown", STYLE);
    let output = run(&[
        "cite",
        "--style",
        style.to_str().unwrap(),
        "--references",
        refs.to_str().unwrap(),
        "--id",
        "nobody",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Reference 'nobody' not found"), "stderr: {}", stderr);
}

#[test]
fn test_check_valid_style() {
    let (style, _) = fixtures("check-ok", STYLE);
    let output = run(&["check", "--style", style.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ok (Test Author-Date, bibliography: yes)"), "stdout: {}", stdout);
}

#[test]
fn test_check_reports_undefined_macro() {
    let broken = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><text macro="missing"/></layout></citation>
</style>"#;
    let (style, _) = fixtures("check-bad", broken);
    let output = run(&["check", "--style", style.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("S-6"), "stderr: {}", stderr);
    assert!(stderr.contains("Invalid style"), "stderr: {}", stderr);
}

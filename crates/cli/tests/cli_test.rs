//! Basic CLI integration tests.

#![allow(deprecated)] // Command::cargo_bin deprecated for custom build-dir; still works for default

use std::io::{Cursor, Write};

use assert_cmd::Command;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Command with config and data dirs pointed into `home`.
fn readbox(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("readbox").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env_remove("READBOX_STORAGE_ROOT");
    cmd
}

fn stdout_json(out: &assert_cmd::assert::Assert) -> serde_json::Value {
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    serde_json::from_str(stdout).expect("--json should output valid JSON")
}

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

const CHAPTER_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>One</title></head>
<body><p>Salt on the road.</p></body></html>"#;

fn zip_files(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn small_epub() -> Vec<u8> {
    zip_files(&[
        ("mimetype", "application/epub+zip"),
        ("META-INF/container.xml", CONTAINER_XML),
        (
            "OEBPS/content.opf",
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="3.0" xmlns="http://www.idpf.org/2007/opf">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>Salt Roads</dc:title>
        <dc:creator>Ines Moor</dc:creator>
    </metadata>
    <manifest>
        <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
    </manifest>
    <spine><itemref idref="c1"/></spine>
</package>"#,
        ),
        ("OEBPS/c1.xhtml", CHAPTER_XHTML),
    ])
}

/// EPUB2 book whose NCX nests `depth` navPoints inside each other.
fn deeply_nested_epub(depth: usize) -> Vec<u8> {
    let mut ncx = String::from(r#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/"><navMap>"#);
    for i in 0..depth {
        ncx.push_str(&format!(
            r#"<navPoint><navLabel><text>L{i}</text></navLabel><content src="c1.xhtml#{i}"/>"#
        ));
    }
    ncx.push_str(&"</navPoint>".repeat(depth));
    ncx.push_str("</navMap></ncx>");

    zip_files(&[
        ("mimetype", "application/epub+zip"),
        ("META-INF/container.xml", CONTAINER_XML),
        (
            "OEBPS/content.opf",
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="2.0" xmlns="http://www.idpf.org/2007/opf">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Deep</dc:title></metadata>
    <manifest>
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
        <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
    </manifest>
    <spine toc="ncx"><itemref idref="c1"/></spine>
</package>"#,
        ),
        ("OEBPS/toc.ncx", ncx.as_str()),
        ("OEBPS/c1.xhtml", CHAPTER_XHTML),
    ])
}

#[test]
fn help_prints_and_exits_success() {
    let home = TempDir::new().unwrap();
    readbox(&home).arg("--help").assert().success();
}

#[test]
fn config_show_runs() {
    let home = TempDir::new().unwrap();
    readbox(&home).args(["config", "show"]).assert().success();
}

#[test]
fn config_show_json_valid() {
    let home = TempDir::new().unwrap();
    let out = readbox(&home).args(["config", "show", "--json"]).assert().success();
    let cfg = stdout_json(&out);
    assert_eq!(cfg["assets"]["route"], "/api/sources/{source_id}/assets");
}

#[test]
fn config_set_then_show() {
    let home = TempDir::new().unwrap();
    readbox(&home)
        .args(["config", "set", "security.max_file_count", "42"])
        .assert()
        .success();
    let out = readbox(&home).args(["config", "show", "--json"]).assert().success();
    assert_eq!(stdout_json(&out)["security"]["max_file_count"], 42);

    readbox(&home)
        .args(["config", "set", "nonsense.key", "1"])
        .assert()
        .failure();
}

#[test]
fn inspect_nonexistent_file_fails() {
    let home = TempDir::new().unwrap();
    readbox(&home)
        .args(["inspect", "/nonexistent/file.epub"])
        .assert()
        .failure();
}

#[test]
fn inspect_unsupported_extension_fails() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("paper.pdf");
    std::fs::write(&path, b"%PDF-1.7").unwrap();
    let out = readbox(&home)
        .args(["inspect", path.to_str().unwrap()])
        .assert()
        .failure();
    let stderr = std::str::from_utf8(&out.get_output().stderr).unwrap();
    assert!(stderr.contains("Error:"));
}

#[test]
fn inspect_markdown_json() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("log.md");
    std::fs::write(&path, "---\ntitle: Harbour Log\n---\n# Day One\n## Tide\n# Day Two\n").unwrap();

    let out = readbox(&home)
        .args(["inspect", "--json", path.to_str().unwrap()])
        .assert()
        .success();
    let info = stdout_json(&out);
    assert_eq!(info["kind"], "markdown");
    assert_eq!(info["metadata"]["title"], "Harbour Log");
    assert_eq!(info["mime_type"], "text/markdown");

    let toc = info["toc"].as_array().unwrap();
    assert_eq!(toc.len(), 3);
    assert_eq!(toc[0]["title"], "Day One");
    assert_eq!(toc[0]["depth"], 0);
    assert_eq!(toc[1]["href"], "#tide");
    assert_eq!(toc[1]["depth"], 1);
    assert_eq!(toc[1]["parent"], 0);
    assert_eq!(toc[2]["title"], "Day Two");
    assert_eq!(toc[2]["order"], 1);
    assert!(toc[2]["parent"].is_null());
}

#[test]
fn inspect_json_handles_deeply_nested_contents() {
    let depth = 100_000;
    let home = TempDir::new().unwrap();
    let path = home.path().join("deep.epub");
    std::fs::write(&path, deeply_nested_epub(depth)).unwrap();

    let out = readbox(&home)
        .args(["inspect", "--json", path.to_str().unwrap()])
        .assert()
        .success();
    let info = stdout_json(&out);
    let toc = info["toc"].as_array().unwrap();
    assert_eq!(toc.len(), depth);
    assert_eq!(toc[depth - 1]["depth"], depth - 1);
    assert_eq!(toc[depth - 1]["parent"], depth - 2);
    assert_eq!(toc[depth - 1]["href"], format!("c1.xhtml#{}", depth - 1));
}

#[test]
fn inspect_epub_text() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("salt.epub");
    std::fs::write(&path, small_epub()).unwrap();

    let out = readbox(&home)
        .args(["inspect", path.to_str().unwrap()])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    assert!(stdout.contains("Format: EPUB (application/epub+zip)"));
    assert!(stdout.contains("Title: Salt Roads"));
    assert!(stdout.contains("Author: Ines Moor"));
    assert!(stdout.contains("[c1.xhtml]"));
}

#[test]
fn chapter_of_epub_and_markdown() {
    let home = TempDir::new().unwrap();
    let epub = home.path().join("salt.epub");
    std::fs::write(&epub, small_epub()).unwrap();
    let out = readbox(&home)
        .args(["chapter", epub.to_str().unwrap(), "c1.xhtml"])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    assert!(stdout.contains("Salt on the road."));
    assert!(!stdout.contains("<head>"));

    let md = home.path().join("notes.md");
    std::fs::write(&md, "# Tides\nlow\n## Neap\nweak\n# Winds\nstrong\n").unwrap();
    let out = readbox(&home)
        .args(["chapter", md.to_str().unwrap(), "#neap"])
        .assert()
        .success();
    assert_eq!(
        std::str::from_utf8(&out.get_output().stdout).unwrap(),
        "## Neap\nweak\n\n"
    );

    readbox(&home)
        .args(["chapter", md.to_str().unwrap(), "#missing"])
        .assert()
        .failure();
}

#[test]
fn asset_traversal_is_rejected() {
    let home = TempDir::new().unwrap();
    let epub = home.path().join("salt.epub");
    std::fs::write(&epub, small_epub()).unwrap();
    readbox(&home)
        .args(["asset", epub.to_str().unwrap(), "../../etc/passwd"])
        .assert()
        .failure();

    let out_path = home.path().join("c1.xhtml");
    readbox(&home)
        .args(["asset", epub.to_str().unwrap(), "OEBPS/c1.xhtml", "-o", out_path.to_str().unwrap()])
        .assert()
        .success();
    assert!(std::fs::read_to_string(&out_path).unwrap().contains("Salt on the road."));
}

#[test]
fn hash_prints_sha256() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("abc.md");
    std::fs::write(&path, "abc").unwrap();
    let out = readbox(&home)
        .args(["hash", "--json", path.to_str().unwrap()])
        .assert()
        .success();
    assert_eq!(
        stdout_json(&out)["digest"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn dedup_finds_copy_in_library() {
    let home = TempDir::new().unwrap();
    let library = home.path().join("library");
    std::fs::create_dir_all(&library).unwrap();
    std::fs::write(library.join("kept.md"), "# Same\n").unwrap();
    std::fs::write(library.join("other.md"), "# Different\n").unwrap();

    let input = home.path().join("incoming.md");
    std::fs::write(&input, "# Same\n").unwrap();
    let out = readbox(&home)
        .args(["dedup", "--json", input.to_str().unwrap(), "--library", library.to_str().unwrap()])
        .assert()
        .success();
    let result = stdout_json(&out);
    assert_eq!(result["duplicate"], true);
    assert_eq!(result["existing"], "kept.md");

    std::fs::write(&input, "# Fresh\n").unwrap();
    let out = readbox(&home)
        .args(["dedup", input.to_str().unwrap(), "--library", library.to_str().unwrap()])
        .assert()
        .success();
    assert_eq!(std::str::from_utf8(&out.get_output().stdout).unwrap(), "Unique\n");
}

#[test]
fn dedup_defaults_to_uploads_under_storage_root() {
    let home = TempDir::new().unwrap();
    let root = home.path().join("store");
    let uploads = root.join("uploads").join("ana");
    std::fs::create_dir_all(&uploads).unwrap();
    std::fs::write(uploads.join("kept.md"), "# Same\n").unwrap();

    let input = home.path().join("incoming.md");
    std::fs::write(&input, "# Same\n").unwrap();

    let out = readbox(&home)
        .env("READBOX_STORAGE_ROOT", &root)
        .args(["dedup", "--json", input.to_str().unwrap(), "--owner", "ana"])
        .assert()
        .success();
    assert_eq!(stdout_json(&out)["existing"], "kept.md");

    // Another owner has no uploads yet.
    let out = readbox(&home)
        .env("READBOX_STORAGE_ROOT", &root)
        .args(["dedup", "--json", input.to_str().unwrap(), "--owner", "ben"])
        .assert()
        .success();
    assert_eq!(stdout_json(&out)["duplicate"], false);

    // The configured root is used the same way.
    readbox(&home)
        .args(["config", "set", "storage.root", root.to_str().unwrap()])
        .assert()
        .success();
    let out = readbox(&home)
        .args(["dedup", "--json", input.to_str().unwrap(), "--owner", "ana"])
        .assert()
        .success();
    assert_eq!(stdout_json(&out)["duplicate"], true);
}

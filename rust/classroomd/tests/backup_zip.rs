#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn write_sqlite(path: &Path, marker: &str) {
    let conn = rusqlite::Connection::open(path).expect("create sqlite file");
    conn.execute_batch("CREATE TABLE marker(value TEXT NOT NULL);")
        .expect("create marker table");
    conn.execute("INSERT INTO marker(value) VALUES (?1)", [marker])
        .expect("insert marker");
}

fn read_marker(path: &Path) -> String {
    let conn = rusqlite::Connection::open(path).expect("open sqlite file");
    conn.query_row("SELECT value FROM marker", [], |r| r.get(0))
        .expect("read marker")
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("classroomd-backup-src");
    let workspace2 = temp_dir("classroomd-backup-dst");
    let out_dir = temp_dir("classroomd-backup-out");

    write_sqlite(&workspace.join(backup::WORKSPACE_DB), "source");
    let bytes = std::fs::read(workspace.join(backup::WORKSPACE_DB)).expect("read source db");

    let bundle_path = out_dir.join("workspace.classroom.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256, backup::sha256_hex(&bytes));

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(manifest["format"], backup::BUNDLE_FORMAT);
    assert_eq!(manifest["dbSha256"], export.db_sha256.as_str());
    archive
        .by_name("db/classroom.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT);
    assert_eq!(import.db_sha256, export.db_sha256);

    let restored = std::fs::read(workspace2.join(backup::WORKSPACE_DB)).expect("read restored db");
    assert_eq!(restored, bytes);
    assert_eq!(read_marker(&workspace2.join(backup::WORKSPACE_DB)), "source");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn checksum_mismatch_leaves_workspace_untouched() {
    let out_dir = temp_dir("classroomd-backup-tampered");
    let workspace = temp_dir("classroomd-backup-tampered-dst");
    std::fs::write(workspace.join(backup::WORKSPACE_DB), b"current").expect("write current db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest");
        let manifest = serde_json::json!({
            "format": backup::BUNDLE_FORMAT,
            "dbSha256": backup::sha256_hex(b"original"),
        });
        zip.write_all(manifest.to_string().as_bytes()).expect("write manifest");
        zip.start_file("db/classroom.sqlite3", opts).expect("db entry");
        zip.write_all(b"modified").expect("write db");
        zip.finish().expect("finish");
    }

    let e = backup::import_workspace_bundle(&bundle_path, &workspace).expect_err("mismatch");
    assert!(format!("{:#}", e).contains("checksum mismatch"));
    let current = std::fs::read(workspace.join(backup::WORKSPACE_DB)).expect("read current db");
    assert_eq!(current, b"current");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn raw_sqlite_copy_replaces_the_workspace_database() {
    let out_dir = temp_dir("classroomd-backup-raw");
    let workspace = temp_dir("classroomd-backup-raw-dst");
    write_sqlite(&workspace.join(backup::WORKSPACE_DB), "current");

    let raw_file = out_dir.join("copy.sqlite3");
    write_sqlite(&raw_file, "copied");

    let import = backup::import_workspace_bundle(&raw_file, &workspace).expect("import raw sqlite");
    assert_eq!(import.bundle_format_detected, backup::RAW_SQLITE_FORMAT);
    assert_eq!(read_marker(&workspace.join(backup::WORKSPACE_DB)), "copied");
    assert!(!workspace.join("classroom.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn non_database_input_is_rejected_and_workspace_kept() {
    let out_dir = temp_dir("classroomd-backup-text");
    let workspace = temp_dir("classroomd-backup-text-dst");
    write_sqlite(&workspace.join(backup::WORKSPACE_DB), "current");

    let text_file = out_dir.join("notes.txt");
    std::fs::write(&text_file, b"this is not a database").expect("write text file");
    let e = backup::import_workspace_bundle(&text_file, &workspace).expect_err("text import");
    assert!(format!("{:#}", e).contains("not a SQLite database"));

    // A header-only file passes the signature check but not the integrity check.
    let truncated = out_dir.join("truncated.sqlite3");
    let mut header = b"SQLite format 3\0".to_vec();
    header.extend_from_slice(&[0xFF; 84]);
    std::fs::write(&truncated, &header).expect("write truncated file");
    backup::import_workspace_bundle(&truncated, &workspace).expect_err("truncated import");

    assert_eq!(read_marker(&workspace.join(backup::WORKSPACE_DB)), "current");
    assert!(!workspace.join("classroom.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

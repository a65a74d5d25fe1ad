//! Tests for hex import/export

use std::io::Cursor;

use mapkv::{transfer, Engine, Options};
use tempfile::TempDir;

fn setup_temp_engine(name: &str, dir: &TempDir) -> Engine {
    let options = Options::builder().tables(4).buckets(4).build();
    Engine::open(&dir.path().join(name), None, &options).unwrap()
}

#[test]
fn test_export_format() {
    let temp_dir = TempDir::new().unwrap();
    let mut engine = setup_temp_engine("s.db", &temp_dir);
    engine.put(b"key", &[0x00, 0xff, 0x10]).unwrap();

    let mut out = Vec::new();
    assert_eq!(transfer::export(&engine, &mut out).unwrap(), 1);
    assert_eq!(String::from_utf8(out).unwrap(), "6b6579\n00ff10\n");
}

#[test]
fn test_export_skips_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let mut engine = setup_temp_engine("s.db", &temp_dir);
    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.del(b"a").unwrap();

    let mut out = Vec::new();
    assert_eq!(transfer::export(&engine, &mut out).unwrap(), 1);
    assert_eq!(String::from_utf8(out).unwrap(), "62\n32\n");
}

#[test]
fn test_export_import_between_stores() {
    let temp_dir = TempDir::new().unwrap();
    let mut source = setup_temp_engine("source.db", &temp_dir);
    for i in 0..100u32 {
        source
            .put(format!("k{}", i).as_bytes(), &i.to_le_bytes())
            .unwrap();
    }

    let mut dump = Vec::new();
    assert_eq!(transfer::export(&source, &mut dump).unwrap(), 100);

    let mut target = setup_temp_engine("target.db", &temp_dir);
    assert_eq!(transfer::import(&mut target, Cursor::new(dump)).unwrap(), 100);

    for i in 0..100u32 {
        assert_eq!(
            target.get(format!("k{}", i).as_bytes()).unwrap(),
            Some(i.to_le_bytes().to_vec())
        );
    }
}

#[test]
fn test_import_edge_cases() {
    let temp_dir = TempDir::new().unwrap();
    let mut engine = setup_temp_engine("s.db", &temp_dir);
    engine.put(b"gone", b"x").unwrap();

    // Odd trailing nibble dropped; empty key skipped; a lone key line
    // stores an empty value and so deletes the key
    let input = "6b31\n7631f\n\n7a7a\n676f6e65\n";
    let count = transfer::import(&mut engine, Cursor::new(input)).unwrap();

    assert_eq!(count, 2);
    assert_eq!(engine.get(b"k1").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(engine.get(b"gone").unwrap(), None);
}

#[test]
fn test_import_rejects_invalid_hex() {
    let temp_dir = TempDir::new().unwrap();
    let mut engine = setup_temp_engine("s.db", &temp_dir);

    assert!(transfer::import(&mut engine, Cursor::new("zz\n00\n")).is_err());
}

#[test]
fn test_import_non_ascii_line_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let mut engine = setup_temp_engine("s.db", &temp_dir);

    let result = transfer::import(&mut engine, Cursor::new("a\u{e9}\n6162\n"));
    assert!(result.is_err());
    assert_eq!(engine.entries().count(), 0);
}

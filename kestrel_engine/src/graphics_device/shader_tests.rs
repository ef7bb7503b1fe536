use super::*;
use std::io::Write;

const SPIRV_MAGIC: u32 = 0x0723_0203;

#[test]
fn test_read_shader_file_words() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&SPIRV_MAGIC.to_le_bytes()).unwrap();
    file.write_all(&0x0001_0000u32.to_le_bytes()).unwrap();

    let words = read_shader_file(file.path()).unwrap();
    assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
}

#[test]
fn test_read_missing_shader_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.frag.spv");

    match read_shader_file(&path) {
        Err(Error::Io(msg)) => assert!(msg.contains("missing.frag.spv")),
        other => panic!("expected Io error, got {:?}", other),
    }
}

#[test]
fn test_read_shader_file_rejects_partial_word() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0x03, 0x02, 0x23, 0x07, 0xFF]).unwrap();

    assert!(matches!(read_shader_file(file.path()), Err(Error::InvalidResource(_))));
}

#[test]
fn test_read_shader_file_rejects_empty_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    assert!(read_shader_file(file.path()).is_err());
}

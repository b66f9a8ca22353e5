use std::fs;

use model_gate::digest::ExpectedDigest;
use model_gate::hashing::{sha256_file, sha256_hex, DEFAULT_CHUNK_SIZE};
use model_gate::verify::verify;

#[test]
fn in_memory_and_file_digests_agree() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let path = temp_dir.path().join("model.onnx");
    fs::write(&path, b"hello").expect("write model");

    let from_file = sha256_file(&path, DEFAULT_CHUNK_SIZE).expect("hash model");
    assert_eq!(from_file, sha256_hex(b"hello"));
    assert!(verify(&path, &ExpectedDigest::new(from_file), DEFAULT_CHUNK_SIZE));
}

#[test]
fn verify_fails_closed_for_missing_file() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let expected = ExpectedDigest::new(sha256_hex(b""));
    assert!(!verify(
        &temp_dir.path().join("absent.onnx"),
        &expected,
        DEFAULT_CHUNK_SIZE
    ));
}

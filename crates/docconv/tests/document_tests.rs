//! Upload admission, downloads and deletion.

mod common;

use std::time::Duration;

use common::TestHarness;
use docconv::{AdmissionError, ConvertError, ConvertStatus, UploadRequest};

fn request(filename: &str, mime_type: &str, bytes: &[u8]) -> UploadRequest {
    UploadRequest {
        project_id: common::harness::PROJECT_ID,
        filename: filename.to_string(),
        mime_type: mime_type.to_string(),
        uploaded_by: 1,
        bytes: bytes.to_vec(),
    }
}

#[test]
fn test_upload_guesses_missing_mime() {
    let harness = TestHarness::new();
    let receipt = harness
        .service
        .upload(request("scan.png", "", &[0x89, b'P', b'N', b'G']))
        .unwrap();
    assert_eq!(receipt.mime_type, "image/png");

    let doc = harness.document(receipt.document_id);
    assert_eq!(doc.convert_status, ConvertStatus::None);
    assert_eq!(doc.file_size, 4);
    assert!(harness.storage_dir.join(&doc.original_ref).is_file());
    harness.finish();
}

#[test]
fn test_upload_rejects_disallowed_type() {
    let harness = TestHarness::new();
    let err = harness
        .service
        .upload(request("run.sh", "application/x-sh", b"#!/bin/sh"))
        .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Rejected(AdmissionError::MimeNotAllowed(_))
    ));
    assert!(harness
        .service
        .list_documents(common::harness::PROJECT_ID)
        .unwrap()
        .is_empty());
    harness.finish();
}

#[test]
fn test_upload_sanitizes_stored_name() {
    let harness = TestHarness::new();
    let id = harness.upload("a:b|c.txt", "text/plain", b"x");
    let doc = harness.document(id);
    assert_eq!(doc.original_filename, "a:b|c.txt");
    assert!(doc.original_ref.ends_with("_a_b_c.txt"));

    let (name, mime, bytes) = harness.service.download_original(id).unwrap();
    assert_eq!(name, "a:b|c.txt");
    assert_eq!(mime, "text/plain");
    assert_eq!(bytes, b"x");
    harness.finish();
}

#[test]
fn test_delete_converted_resets_record() {
    let harness = TestHarness::new();
    let id = harness.upload("a.txt", "text/plain", b"hello");
    harness.service.start_convert(id).unwrap();
    harness.wait_for_terminal(id, Duration::from_secs(10));
    let converted_ref = harness.document(id).converted_ref.unwrap();

    harness.service.delete_converted(id).unwrap();

    let doc = harness.document(id);
    assert_eq!(doc.convert_status, ConvertStatus::None);
    assert_eq!(doc.convert_progress, 0);
    assert!(doc.convert_task_id.is_none());
    assert!(doc.converted_filename.is_none());
    assert!(!harness.storage_dir.join(converted_ref).exists());
    assert!(matches!(
        harness.service.download_converted(id),
        Err(ConvertError::NotConverted(_))
    ));
    // a second delete has nothing to remove
    harness.service.delete_converted(id).unwrap();
    harness.finish();
}

#[test]
fn test_deletes_refused_while_processing() {
    let harness = TestHarness::builder()
        .read_delay(Duration::from_millis(800))
        .build();
    let id = harness.upload("a.txt", "text/plain", b"hello");
    harness.service.start_convert(id).unwrap();

    assert!(matches!(
        harness.service.delete_converted(id),
        Err(ConvertError::AlreadyInProgress(_))
    ));
    assert!(matches!(
        harness.service.delete_document(id),
        Err(ConvertError::AlreadyInProgress(_))
    ));

    harness.wait_for_terminal(id, Duration::from_secs(10));
    harness.service.delete_document(id).unwrap();
    assert!(harness
        .service
        .list_documents(common::harness::PROJECT_ID)
        .unwrap()
        .is_empty());
    harness.finish();
}

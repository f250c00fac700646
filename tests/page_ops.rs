//! Page-set editing and in-process conversions through the orchestrator.
//!
//! The registry is empty unless a test says otherwise, so every job runs on
//! the lopdf strategies and needs no external tools.

mod common;

use common::*;
use pdfsmith::{
    ConversionJob, EngineConfig, ErrorKind, OperationKind, Orchestrator, ToolName, ToolRegistry,
};
use std::sync::Arc;

fn offline() -> Orchestrator {
    Orchestrator::with_registry(Arc::new(ToolRegistry::empty()), EngineConfig::default())
}

#[tokio::test]
async fn extract_keeps_selected_pages() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 10, 100);
    let output = dir.path().join("out/excerpt.pdf");
    let job = ConversionJob::new(OperationKind::ExtractPages, &input, &output)
        .with_option("pages", "7, 1, 3-5, 40");

    let result = offline().process(&job).await;
    assert!(result.success, "{result}");
    assert_eq!(result.strategy_used.as_deref(), Some("native-page-copy"));
    assert_eq!(result.skipped[0].strategy, "page-tool");
    assert!(result.attempts.is_empty());
    assert_eq!(page_widths(&output), vec![101, 103, 104, 105, 107]);
}

#[tokio::test]
async fn extract_with_no_matching_page_is_a_page_range_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 3, 100);
    let output = dir.path().join("out.pdf");
    let job = ConversionJob::new(OperationKind::ExtractPages, &input, &output)
        .with_option("pages", "9-12");

    let result = offline().process(&job).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::PageRange));
    assert!(result.attempts.is_empty());
    assert!(!output.exists());
}

#[tokio::test]
async fn remove_drops_pages() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 5, 100);
    let output = dir.path().join("trimmed.pdf");
    let job = ConversionJob::new(OperationKind::RemovePages, &input, &output)
        .with_option("pages", "2,4");

    let result = offline().process(&job).await;
    assert!(result.success, "{result}");
    assert_eq!(page_widths(&output), vec![101, 103, 105]);
}

#[tokio::test]
async fn removing_every_page_fails_before_any_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 3, 100);
    let output = dir.path().join("empty.pdf");
    let job = ConversionJob::new(OperationKind::RemovePages, &input, &output)
        .with_option("pages", "all");

    let result = offline().process(&job).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::PageRange));
    assert!(result.attempts.is_empty());
    assert!(result.skipped.is_empty());
    assert!(!output.exists());
}

#[tokio::test]
async fn removing_pages_that_do_not_exist_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 3, 100);
    let output = dir.path().join("same.pdf");

    for pages in ["99", "abc"] {
        let job = ConversionJob::new(OperationKind::RemovePages, &input, &output)
            .with_option("pages", pages);
        let result = offline().process(&job).await;
        assert!(!result.success, "{pages}: {result}");
        assert_eq!(result.error_kind, Some(ErrorKind::PageRange));
        assert!(result.attempts.is_empty());
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn missing_page_selection_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 3, 100);
    let job = ConversionJob::new(OperationKind::ExtractPages, &input, dir.path().join("o.pdf"));
    let result = offline().process(&job).await;
    assert_eq!(result.error_kind, Some(ErrorKind::PageRange));
}

#[tokio::test]
async fn merge_concatenates_in_input_order_with_title() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1, 100);
    let b = write_pdf(dir.path(), "b.pdf", 1, 200);
    let c = write_pdf(dir.path(), "c.pdf", 2, 300);
    let output = dir.path().join("all.pdf");
    let job = ConversionJob::new(OperationKind::MergePdfs, &b, &output)
        .with_input(&a)
        .with_input(&c)
        .with_option("title", "Combined");

    let result = offline().process(&job).await;
    assert!(result.success, "{result}");
    assert_eq!(page_widths(&output), vec![201, 101, 301, 302]);
    assert_eq!(info_title(&output).as_deref(), Some("Combined"));
}

#[tokio::test]
async fn merge_of_one_file_is_an_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1, 100);
    let job = ConversionJob::new(OperationKind::MergePdfs, &a, dir.path().join("o.pdf"));
    let result = offline().process(&job).await;
    assert_eq!(result.error_kind, Some(ErrorKind::Input));
}

#[tokio::test]
async fn organize_reorders_duplicates_and_rotates() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 3, 100);
    let output = dir.path().join("organized.pdf");
    let job = ConversionJob::new(OperationKind::OrganizePages, &input, &output)
        .with_option("layout", "3, 1:90, 1:-90, 2");

    let result = offline().process(&job).await;
    assert!(result.success, "{result}");
    assert_eq!(page_widths(&output), vec![103, 101, 101, 102]);
    assert_eq!(page_rotations(&output), vec![0, 90, 270, 0]);
}

#[tokio::test]
async fn organize_rejects_odd_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 3, 100);
    let job = ConversionJob::new(OperationKind::OrganizePages, &input, dir.path().join("o.pdf"))
        .with_option("layout", "1:45");
    let result = offline().process(&job).await;
    assert_eq!(result.error_kind, Some(ErrorKind::PageRange));
}

#[tokio::test]
async fn non_pdf_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fake.pdf");
    std::fs::write(&input, "just some text").unwrap();
    let job = ConversionJob::new(OperationKind::ExtractPages, &input, dir.path().join("o.pdf"))
        .with_option("pages", "1");
    let result = offline().process(&job).await;
    assert_eq!(result.error_kind, Some(ErrorKind::Input));
    assert!(result.message.contains("not a valid PDF"), "{}", result.message);
}

#[tokio::test]
async fn images_become_one_page_each() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.png");
    let second = dir.path().join("second.jpg");
    image::RgbImage::from_pixel(40, 20, image::Rgb([200, 10, 10]))
        .save(&first)
        .unwrap();
    image::RgbImage::from_pixel(30, 60, image::Rgb([10, 10, 200]))
        .save(&second)
        .unwrap();
    let output = dir.path().join("images.pdf");
    let job = ConversionJob::new(OperationKind::ImageToPdf, &first, &output).with_input(&second);

    let result = offline().process(&job).await;
    assert!(result.success, "{result}");
    assert_eq!(result.strategy_used.as_deref(), Some("native-image-embed"));
    let doc = lopdf::Document::load(&output).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn text_is_rendered_without_tools() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, "first line\n\tindented\nthird line\n").unwrap();
    let output = dir.path().join("notes.pdf");
    let job = ConversionJob::new(OperationKind::TextToPdf, &input, &output);

    let result = offline().process(&job).await;
    assert!(result.success, "{result}");
    assert_eq!(result.strategy_used.as_deref(), Some("native-text-render"));
    assert!(std::fs::read(&output).unwrap().starts_with(b"%PDF"));
}

#[cfg(not(windows))]
#[tokio::test]
async fn office_input_without_any_suite_is_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.docx");
    std::fs::write(&input, b"PK\x03\x04 not really a docx").unwrap();
    let job = ConversionJob::new(OperationKind::OfficeToPdf, &input, dir.path().join("r.pdf"));

    let result = offline().process(&job).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Exhausted));
    assert!(result.attempts.is_empty());
    let skipped: Vec<&str> = result.skipped.iter().map(|s| s.strategy.as_str()).collect();
    assert_eq!(skipped, ["os-native-automation", "unoconv", "headless-suite"]);
}

#[tokio::test]
async fn extract_uses_qpdf_when_installed() {
    let registry = Arc::new(ToolRegistry::detect(&EngineConfig::default()).await);
    if !registry.is_available(ToolName::Qpdf) {
        println!("SKIP: qpdf is not installed");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "book.pdf", 6, 100);
    let output = dir.path().join("excerpt.pdf");
    let job = ConversionJob::new(OperationKind::ExtractPages, &input, &output)
        .with_option("pages", "2-3,6");

    let engine = Orchestrator::with_registry(registry, EngineConfig::default());
    let result = engine.process(&job).await;
    assert!(result.success, "{result}");
    assert_eq!(result.strategy_used.as_deref(), Some("page-tool"));
    assert_eq!(page_widths(&output), vec![102, 103, 106]);
}

//! Batch runs against a scripted engine and a fake rasterizer.
//!
//! No model, network or pdfium is needed: the engine echoes image sizes and
//! the rasterizer fabricates blank pages.

mod common;

use common::{json_lines, write_png, FakeRasterizer, ScriptedEngine};
use ocrbrain::{
    BatchProgressCallback, BatchRunner, BatchSummary, DocumentType, EngineHandle, OcrConfig,
    OcrError,
};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

fn runner(
    engine: ScriptedEngine,
    rasterizer: FakeRasterizer,
    config: OcrConfig,
) -> BatchRunner<ScriptedEngine, FakeRasterizer> {
    BatchRunner::new(EngineHandle::new(engine), rasterizer, config)
}

fn config(out: &Path) -> OcrConfig {
    OcrConfig::builder().output_dir(out).build().unwrap()
}

#[tokio::test]
async fn directory_with_image_and_pdf_yields_two_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    write_png(&input.join("scan.png"), 40, 30);
    std::fs::write(input.join("report.pdf"), b"%PDF-1.7").unwrap();
    std::fs::write(input.join("notes.txt"), b"ignored").unwrap();

    let engine = ScriptedEngine::default();
    let calls = engine.calls.clone();
    let summary = runner(engine, FakeRasterizer::default().with("report.pdf", 2), config(&out))
        .run(input.to_str().unwrap())
        .await
        .unwrap();

    assert_eq!(
        summary,
        BatchSummary {
            discovered: 2,
            written: 2,
            failed: 0,
            skipped: 0
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let mut names: Vec<_> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["report.pdf.json", "scan.png.json"]);

    let image = &json_lines(&out.join("scan.png.json"))[0];
    assert_eq!(image["type"], "image");
    assert_eq!(image["ocr_result"], "40x30");
    assert_eq!(image["input_path"], input.join("scan.png").to_str().unwrap());

    let pdf = &json_lines(&out.join("report.pdf.json"))[0];
    assert_eq!(pdf["type"], "pdf");
    let pages = pdf["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0]["page"], 1);
    assert_eq!(pages[0]["ocr_result"], "100x80");
    assert_eq!(pages[1]["page"], 2);
    assert_eq!(pages[1]["ocr_result"], "101x80");
}

#[tokio::test]
async fn rerunning_a_pdf_leaves_one_line() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("doc.pdf");
    let out = dir.path().join("out");
    std::fs::write(&pdf, b"%PDF").unwrap();

    for _ in 0..3 {
        runner(
            ScriptedEngine::default(),
            FakeRasterizer::default().with("doc.pdf", 1),
            config(&out),
        )
        .run(pdf.to_str().unwrap())
        .await
        .unwrap();
    }

    assert_eq!(json_lines(&out.join("doc.pdf.json")).len(), 1);
}

#[tokio::test]
async fn rerunning_an_image_appends() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("a.jpg");
    let out = dir.path().join("out");
    image::RgbImage::new(8, 8).save(&img).unwrap();

    for _ in 0..2 {
        runner(ScriptedEngine::default(), FakeRasterizer::default(), config(&out))
            .run(img.to_str().unwrap())
            .await
            .unwrap();
    }

    assert_eq!(json_lines(&out.join("a.jpg.json")).len(), 2);
}

#[tokio::test]
async fn one_bad_file_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    write_png(&input.join("good.png"), 10, 10);
    std::fs::write(input.join("broken.png"), b"not an image").unwrap();
    std::fs::write(input.join("corrupt.pdf"), b"garbage").unwrap();

    let summary = runner(ScriptedEngine::default(), FakeRasterizer::default(), config(&out))
        .run(input.to_str().unwrap())
        .await
        .unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert!(out.join("good.png.json").exists());
    assert!(!out.join("broken.png.json").exists());
    assert!(!out.join("corrupt.pdf.json").exists());
}

#[tokio::test]
async fn same_basename_pdfs_do_not_erase_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    std::fs::create_dir_all(input.join("a")).unwrap();
    std::fs::create_dir_all(input.join("b")).unwrap();
    std::fs::write(input.join("a/doc.pdf"), b"%PDF").unwrap();
    std::fs::write(input.join("b/doc.pdf"), b"%PDF").unwrap();

    runner(
        ScriptedEngine::default(),
        FakeRasterizer::default().with("doc.pdf", 1),
        config(&out),
    )
    .run(input.to_str().unwrap())
    .await
    .unwrap();

    let lines = json_lines(&out.join("doc.pdf.json"));
    assert_eq!(lines.len(), 2);
    assert_ne!(lines[0]["input_path"], lines[1]["input_path"]);
}

#[tokio::test]
async fn unsupported_single_file_is_rejected_before_output() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("readme.txt");
    let out = dir.path().join("out");
    std::fs::write(&txt, b"hi").unwrap();

    let engine = ScriptedEngine::default();
    let calls = engine.calls.clone();
    let err = runner(engine, FakeRasterizer::default(), config(&out))
        .run(txt.to_str().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, OcrError::UnsupportedInput { .. }));
    assert!(!out.exists());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn input_rejections_are_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("readme.txt");
    std::fs::write(&txt, b"hi").unwrap();
    let out = dir.path().join("out");

    for input in [txt.clone(), dir.path().join("missing.png")] {
        let err = runner(ScriptedEngine::default(), FakeRasterizer::default(), config(&out))
            .run(input.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(!err.is_fatal(), "{err} should exit cleanly");
    }
}

#[tokio::test]
async fn empty_directory_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let summary = runner(ScriptedEngine::default(), FakeRasterizer::default(), config(&out))
        .run(dir.path().to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(summary, BatchSummary::default());
    assert!(!out.exists());
}

#[tokio::test]
async fn hints_reach_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("form.png");
    let out = dir.path().join("out");
    write_png(&img, 200, 100);

    let engine = ScriptedEngine::default();
    let prompts = engine.prompts.clone();
    let config = OcrConfig::builder()
        .output_dir(&out)
        .document_type(DocumentType::Formatted)
        .region(vec![20.0, 10.0, 100.0, 50.0])
        .color("red")
        .build()
        .unwrap();

    runner(engine, FakeRasterizer::default(), config)
        .run(img.to_str().unwrap())
        .await
        .unwrap();

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(
        prompts[0].contains("</img>\n[red] [100, 100, 500, 500] OCR with format: "),
        "prompt: {}",
        prompts[0]
    );
    assert!(prompts[0].starts_with("<|im_start|>system\n"));
}

#[tokio::test]
async fn non_ascii_text_round_trips_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let img = dir.path().join("menu.png");
    let out = dir.path().join("out");
    write_png(&img, 33, 10);

    let text = "Crème brûlée 価格 ¥1,200";
    let engine = ScriptedEngine::default().with_reply(33, text);
    runner(engine, FakeRasterizer::default(), config(&out))
        .run(img.to_str().unwrap())
        .await
        .unwrap();

    let raw = std::fs::read_to_string(out.join("menu.png.json")).unwrap();
    assert!(raw.contains(text));
    assert_eq!(json_lines(&out.join("menu.png.json"))[0]["ocr_result"], text);
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl BatchProgressCallback for Events {
    fn on_batch_start(&self, total_files: usize) {
        self.0.lock().unwrap().push(format!("batch {total_files}"));
    }
    fn on_page_complete(&self, _path: &str, page_num: usize, total_pages: usize, _len: usize) {
        self.0.lock().unwrap().push(format!("page {page_num}/{total_pages}"));
    }
    fn on_token(&self, piece: &str) {
        self.0.lock().unwrap().push(format!("token {piece}"));
    }
    fn on_batch_complete(&self, summary: &BatchSummary) {
        self.0.lock().unwrap().push(format!("done {}", summary.written));
    }
}

#[test]
fn progress_and_streaming_events_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("two.pdf");
    let out = dir.path().join("out");
    std::fs::write(&pdf, b"%PDF").unwrap();

    let events = Arc::new(Events::default());
    let config = OcrConfig::builder()
        .output_dir(&out)
        .stream_tokens(true)
        .progress_callback(events.clone())
        .build()
        .unwrap();

    let runner = runner(
        ScriptedEngine::default(),
        FakeRasterizer::default().with("two.pdf", 2),
        config,
    );
    tokio_test::block_on(runner.run(pdf.to_str().unwrap())).unwrap();

    assert_eq!(
        *events.0.lock().unwrap(),
        vec![
            "batch 1",
            "token 100x80",
            "page 1/2",
            "token 101x80",
            "page 2/2",
            "done 1",
        ]
    );
}

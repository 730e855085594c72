// 该文件是 Kabuto （甲虫） 项目的一部分。
// tests/inference_tests.rs - 推理任务集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use image::RgbImage;
use kabuto::{
  model::{DetectItem, DetectResult, Detector, Labels},
  output::DiscardOutput,
  report::{BatchStats, InferenceRecord, load_report_json, save_report_json},
  task::{InferenceError, SingleImageTask, Task, run_inference},
};

/// 宽度大于 16 的图像返回一个检测框
struct FakeDetector {
  labels: Labels,
  calls: usize,
}

impl FakeDetector {
  fn new() -> Self {
    Self {
      labels: Labels::new(["Beetle"]),
      calls: 0,
    }
  }
}

impl Detector for FakeDetector {
  type Error = Infallible;

  fn detect(&mut self, image: &RgbImage, confidence: f32) -> Result<DetectResult, Infallible> {
    self.calls += 1;
    if image.width() <= 16 {
      return Ok(DetectResult::default());
    }
    let score = 0.9;
    let items = if score > confidence {
      vec![DetectItem {
        class_id: 0,
        score,
        bbox: [2.0, 2.0, 12.0, 12.0],
      }]
    } else {
      Vec::new()
    };
    Ok(items.into())
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }
}

fn write_image(dir: &Path, name: &str, width: u32) -> PathBuf {
  let path = dir.join(name);
  RgbImage::new(width, 24).save(&path).unwrap();
  path
}

#[test]
fn batch_skips_missing_image_and_keeps_going() {
  let dir = tempfile::tempdir().unwrap();
  let paths = vec![
    write_image(dir.path(), "a.png", 32),
    dir.path().join("missing.png"),
    write_image(dir.path(), "c.png", 32),
  ];
  let mut detector = FakeDetector::new();

  let outcome = run_inference(&mut detector, &paths, 0.25, false, &dir.path().join("out")).unwrap();

  assert_eq!(outcome.attempted, 3);
  assert_eq!(outcome.records.len(), 2);
  assert_eq!(outcome.failures.len(), 1);
  assert_eq!(outcome.failures[0].image_path, paths[1]);
  assert!(matches!(outcome.failures[0].error, InferenceError::MissingResource(_)));
  assert_eq!(detector.calls, 2);

  let stats = outcome.stats();
  assert_eq!(stats.images_attempted, 3);
  assert_eq!(stats.images_processed, 2);
  assert_eq!(stats.total_detections, 2);
}

#[test]
fn single_image_missing_path_fails_immediately() {
  let dir = tempfile::tempdir().unwrap();
  let mut detector = FakeDetector::new();

  let err = SingleImageTask::new(0.25)
    .run_task(&[dir.path().join("missing.jpg")], &mut detector, &DiscardOutput)
    .unwrap_err();

  assert!(matches!(err, InferenceError::MissingResource(p) if p.ends_with("missing.jpg")));
  assert_eq!(detector.calls, 0);
}

#[cfg(feature = "save_image_file")]
#[test]
fn annotated_images_only_for_detections() {
  let dir = tempfile::tempdir().unwrap();
  let output_dir = dir.path().join("out");
  let paths = vec![
    write_image(dir.path(), "busy.png", 32),
    write_image(dir.path(), "quiet.png", 16),
  ];
  let mut detector = FakeDetector::new();

  let outcome = run_inference(&mut detector, &paths, 0.25, true, &output_dir).unwrap();

  assert_eq!(outcome.records.len(), 2);
  let busy = &outcome.records[0];
  let quiet = &outcome.records[1];
  assert_eq!(busy.num_detections, 1);
  assert_eq!(
    busy.output_path.as_deref().map(PathBuf::from),
    Some(output_dir.join("busy_result.jpg"))
  );
  assert!(output_dir.join("busy_result.jpg").is_file());
  assert_eq!(quiet.num_detections, 0);
  assert!(quiet.output_path.is_none());
  assert!(!output_dir.join("quiet_result.jpg").exists());
}

#[test]
fn confidence_threshold_reaches_detector() {
  let dir = tempfile::tempdir().unwrap();
  let paths = vec![write_image(dir.path(), "a.png", 32)];
  let mut detector = FakeDetector::new();

  let outcome = run_inference(&mut detector, &paths, 0.95, false, dir.path()).unwrap();

  assert_eq!(outcome.records[0].num_detections, 0);
}

fn timed_record(name: &str, ms: f64) -> InferenceRecord {
  InferenceRecord {
    image_path: name.to_string(),
    inference_time_ms: ms,
    num_detections: 0,
    detections: Vec::new(),
    output_path: None,
  }
}

#[test]
fn average_time_and_fps() {
  let records = vec![
    timed_record("a.jpg", 10.0),
    timed_record("b.jpg", 20.0),
    timed_record("c.jpg", 30.0),
  ];
  let stats = BatchStats::from_records(3, &records);
  assert_eq!(stats.avg_inference_time_ms, 20.0);
  assert_eq!(stats.fps, 50.0);

  let empty = BatchStats::from_records(0, &[]);
  assert_eq!(empty.avg_inference_time_ms, 0.0);
  assert_eq!(empty.fps, 0.0);
}

#[test]
fn json_report_round_trip() {
  let dir = tempfile::tempdir().unwrap();
  let paths = vec![
    write_image(dir.path(), "a.png", 32),
    write_image(dir.path(), "b.png", 16),
  ];
  let mut detector = FakeDetector::new();
  let outcome = run_inference(&mut detector, &paths, 0.25, false, dir.path()).unwrap();

  let report_path = dir.path().join("nested").join("inference_results.json");
  let saved = save_report_json(&report_path, &outcome.records).unwrap();
  let loaded = load_report_json(&report_path).unwrap();

  assert_eq!(loaded, saved);
  assert_eq!(loaded.summary.total_images, 2);
  assert_eq!(loaded.summary.total_detections, 1);
  assert_eq!(loaded.results, outcome.records);
  assert_eq!(loaded.results[0].detections[0].class_name, "Beetle");

  let raw: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
  for key in ["total_images", "total_detections", "avg_inference_time_ms", "processing_timestamp"] {
    assert!(raw["summary"].get(key).is_some(), "缺少字段 {key}");
  }
  assert!(raw["results"][1]["output_path"].is_null());
  assert_eq!(raw["results"][0]["detections"][0]["bbox"].as_array().unwrap().len(), 4);
}

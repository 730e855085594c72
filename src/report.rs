// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/report.rs - 推理记录、统计与 JSON 报告
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

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::model::{DetectItem, DetectResult, Labels};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub class_id: u32,
  pub class_name: String,
  pub confidence: f32,
  pub bbox: [f32; 4],
}

impl DetectionRecord {
  pub fn from_item(item: &DetectItem, labels: &Labels) -> Self {
    Self {
      class_id: item.class_id,
      class_name: labels.name(item.class_id),
      confidence: item.score,
      bbox: item.bbox,
    }
  }
}

/// 单张图像的推理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRecord {
  pub image_path: String,
  pub inference_time_ms: f64,
  pub num_detections: usize,
  pub detections: Vec<DetectionRecord>,
  pub output_path: Option<String>,
}

impl InferenceRecord {
  pub fn new(
    image_path: &Path,
    elapsed: Duration,
    result: &DetectResult,
    labels: &Labels,
    output_path: Option<PathBuf>,
  ) -> Self {
    let detections: Vec<DetectionRecord> = result
      .iter()
      .map(|item| DetectionRecord::from_item(item, labels))
      .collect();
    Self {
      image_path: image_path.display().to_string(),
      inference_time_ms: elapsed.as_nanos() as f64 / 1_000_000.0,
      num_detections: detections.len(),
      detections,
      output_path: output_path.map(|path| path.display().to_string()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
  pub total_images: usize,
  pub total_detections: usize,
  pub avg_inference_time_ms: f64,
  pub processing_timestamp: String,
}

impl BatchReport {
  pub fn from_records(records: &[InferenceRecord]) -> Self {
    Self {
      total_images: records.len(),
      total_detections: records.iter().map(|r| r.num_detections).sum(),
      avg_inference_time_ms: mean_inference_time(records),
      processing_timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
  pub summary: BatchReport,
  pub results: Vec<InferenceRecord>,
}

impl ReportDocument {
  pub fn new(records: Vec<InferenceRecord>) -> Self {
    Self {
      summary: BatchReport::from_records(&records),
      results: records,
    }
  }
}

/// 批量推理统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchStats {
  pub images_attempted: usize,
  pub images_processed: usize,
  pub total_detections: usize,
  pub avg_inference_time_ms: f64,
  pub fps: f64,
}

impl BatchStats {
  pub fn from_records(attempted: usize, records: &[InferenceRecord]) -> Self {
    let avg_inference_time_ms = mean_inference_time(records);
    let fps = if avg_inference_time_ms > 0.0 {
      1000.0 / avg_inference_time_ms
    } else {
      0.0
    };
    Self {
      images_attempted: attempted,
      images_processed: records.len(),
      total_detections: records.iter().map(|r| r.num_detections).sum(),
      avg_inference_time_ms,
      fps,
    }
  }

  pub fn log_summary(&self) {
    info!("尝试处理图像: {}", self.images_attempted);
    info!("成功处理图像: {}", self.images_processed);
    info!("检测目标总数: {}", self.total_detections);
    info!("平均推理时间: {:.2}ms", self.avg_inference_time_ms);
    info!("推理速度: {:.1} FPS", self.fps);
  }
}

fn mean_inference_time(records: &[InferenceRecord]) -> f64 {
  if records.is_empty() {
    return 0.0;
  }
  records.iter().map(|r| r.inference_time_ms).sum::<f64>() / records.len() as f64
}

pub fn save_report_json(path: &Path, records: &[InferenceRecord]) -> Result<ReportDocument, ReportError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)?;
  }

  let document = ReportDocument::new(records.to_vec());
  fs::write(path, serde_json::to_string_pretty(&document)?)?;
  info!("结果已保存到: {}", path.display());
  Ok(document)
}

pub fn load_report_json(path: &Path) -> Result<ReportDocument, ReportError> {
  let content = fs::read_to_string(path)?;
  Ok(serde_json::from_str(&content)?)
}

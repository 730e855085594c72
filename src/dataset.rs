// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/dataset.rs - 数据集样本与存储
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

use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("数据集路径不存在: {}", .0.display())]
  NotFound(PathBuf),
  #[error("样本缺少图像尺寸信息: {0}")]
  MissingMetadata(String),
  #[error("样本不存在: {0}")]
  UnknownSample(String),
  #[error("标注文件格式错误 {}:{line}: {reason}", .path.display())]
  InvalidLabel {
    path: PathBuf,
    line: usize,
    reason: String,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 图像像素尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
  pub width: u32,
  pub height: u32,
}

/// 标注框
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
  pub class_id: u32,
  pub bounding_box: [f64; 4], // [x, y, width, height]，左上角归一化坐标
}

impl GroundTruth {
  pub fn new(class_id: u32, bounding_box: [f64; 4]) -> Self {
    Self {
      class_id,
      bounding_box,
    }
  }

  /// 换算为像素宽高
  pub fn pixel_size(&self, metadata: &ImageMetadata) -> (f64, f64) {
    (
      self.bounding_box[2] * metadata.width as f64,
      self.bounding_box[3] * metadata.height as f64,
    )
  }
}

/// 数据集中的一张图像及其标注
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
  pub id: String,
  pub filepath: PathBuf,
  pub metadata: Option<ImageMetadata>,
  pub detections: Vec<GroundTruth>,
}

impl Sample {
  pub fn new(id: impl Into<String>, filepath: impl Into<PathBuf>) -> Self {
    Self {
      id: id.into(),
      filepath: filepath.into(),
      metadata: None,
      detections: Vec::new(),
    }
  }

  pub fn with_metadata(mut self, width: u32, height: u32) -> Self {
    self.metadata = Some(ImageMetadata { width, height });
    self
  }

  pub fn with_detections(mut self, detections: Vec<GroundTruth>) -> Self {
    self.detections = detections;
    self
  }
}

pub trait SampleStore {
  /// 当前全部样本的快照
  fn samples(&self) -> Result<Vec<Sample>, DatasetError>;
  /// 按 id 原地保存修改后的样本
  fn save(&mut self, sample: &Sample) -> Result<(), DatasetError>;
  /// 批量删除
  fn delete_samples(&mut self, ids: &[String]) -> Result<(), DatasetError>;
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  samples: Vec<Sample>,
}

impl MemoryStore {
  pub fn new(samples: Vec<Sample>) -> Self {
    Self { samples }
  }

  pub fn get(&self, id: &str) -> Option<&Sample> {
    self.samples.iter().find(|sample| sample.id == id)
  }
}

impl From<Vec<Sample>> for MemoryStore {
  fn from(samples: Vec<Sample>) -> Self {
    Self::new(samples)
  }
}

impl SampleStore for MemoryStore {
  fn samples(&self) -> Result<Vec<Sample>, DatasetError> {
    Ok(self.samples.clone())
  }

  fn save(&mut self, sample: &Sample) -> Result<(), DatasetError> {
    let slot = self
      .samples
      .iter_mut()
      .find(|s| s.id == sample.id)
      .ok_or_else(|| DatasetError::UnknownSample(sample.id.clone()))?;
    *slot = sample.clone();
    Ok(())
  }

  fn delete_samples(&mut self, ids: &[String]) -> Result<(), DatasetError> {
    let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
    self.samples.retain(|sample| !ids.contains(sample.id.as_str()));
    Ok(())
  }

  fn len(&self) -> usize {
    self.samples.len()
  }
}

mod attribution;
mod yolo;

pub use self::attribution::{AttributionRow, write_attribution_csv};
pub use self::yolo::{YoloDataset, export_yolo, format_label_line, parse_label_line, write_data_yaml};

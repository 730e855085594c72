// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/clean.rs - 小目标框清洗
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

use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::{DatasetError, Sample, SampleStore};

pub const DEFAULT_MIN_SIDE: f64 = 8.0;
pub const DEFAULT_MIN_AREA: f64 = 64.0;

/// 像素尺寸阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxThresholds {
  pub min_side: f64,
  pub min_area: f64,
}

impl Default for BoxThresholds {
  fn default() -> Self {
    Self {
      min_side: DEFAULT_MIN_SIDE,
      min_area: DEFAULT_MIN_AREA,
    }
  }
}

impl BoxThresholds {
  pub fn new(min_side: f64, min_area: f64) -> Self {
    Self { min_side, min_area }
  }

  /// 宽、高、面积三项必须同时满足
  pub fn keeps(&self, pixel_w: f64, pixel_h: f64) -> bool {
    let area = pixel_w * pixel_h;
    pixel_w >= self.min_side && pixel_h >= self.min_side && area >= self.min_area
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleaningResult {
  pub deleted_samples: usize,
  pub boxes_before: usize,
  pub boxes_after: usize,
}

impl CleaningResult {
  pub fn removed_boxes(&self) -> usize {
    self.boxes_before - self.boxes_after
  }

  /// 去除比例（百分比）
  pub fn removal_rate(&self) -> f64 {
    if self.boxes_before == 0 {
      0.0
    } else {
      self.removed_boxes() as f64 / self.boxes_before as f64 * 100.0
    }
  }
}

/// 去除过小的标注框，并删除没有剩余标注的样本
///
/// 所有样本先完成规划再写回存储；尺寸信息缺失时整个调用失败且存储保持不变。
pub fn filter_small_boxes<S: SampleStore + ?Sized>(
  store: &mut S,
  thresholds: &BoxThresholds,
) -> Result<CleaningResult, DatasetError> {
  info!(
    "开始去除小目标框: 最小边长 {}px, 最小面积 {}px²",
    thresholds.min_side, thresholds.min_area
  );

  let mut result = CleaningResult::default();
  let mut to_delete: Vec<String> = Vec::new();
  let mut to_save: Vec<Sample> = Vec::new();

  for mut sample in store.samples()? {
    if sample.detections.is_empty() {
      to_delete.push(sample.id);
      continue;
    }

    let metadata = sample
      .metadata
      .ok_or_else(|| DatasetError::MissingMetadata(sample.id.clone()))?;

    let before = sample.detections.len();
    result.boxes_before += before;
    sample.detections.retain(|gt| {
      let (pixel_w, pixel_h) = gt.pixel_size(&metadata);
      thresholds.keeps(pixel_w, pixel_h)
    });

    if sample.detections.is_empty() {
      debug!("样本 {} 的 {} 个标注框全部过小", sample.id, before);
      to_delete.push(sample.id);
    } else {
      result.boxes_after += sample.detections.len();
      to_save.push(sample);
    }
  }

  for sample in &to_save {
    store.save(sample)?;
  }
  if !to_delete.is_empty() {
    store.delete_samples(&to_delete)?;
  }
  result.deleted_samples = to_delete.len();

  info!("删除样本数: {}", result.deleted_samples);
  info!(
    "标注框: {} → {}",
    result.boxes_before, result.boxes_after
  );
  info!("去除率: {:.1}%", result.removal_rate());

  Ok(result)
}

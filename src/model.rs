// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/model.rs - 检测模型
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

use image::RgbImage;

/// 检测器：图像 → 检测结果
pub trait Detector {
  type Error;

  fn detect(&mut self, image: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error>;
  fn labels(&self) -> &Labels;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
}

impl DetectItem {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn iou(&self, other: &DetectItem) -> f32 {
    let x1 = self.bbox[0].max(other.bbox[0]);
    let y1 = self.bbox[1].max(other.bbox[1]);
    let x2 = self.bbox[2].min(other.bbox[2]);
    let y2 = self.bbox[3].min(other.bbox[3]);
    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;
    if union > 0.0 { intersection / union } else { 0.0 }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod labels;
pub use self::labels::Labels;

#[cfg(feature = "model_yolov8")]
mod yolov8;
#[cfg(feature = "model_yolov8")]
pub use self::yolov8::{DeviceSelection, Yolov8, Yolov8Builder, Yolov8Error};

#[cfg(test)]
mod tests {
  use super::*;

  fn item(bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id: 0,
      score: 0.9,
      bbox,
    }
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = item([0.0, 0.0, 10.0, 10.0]);
    assert_eq!(a.iou(&a), 1.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    let a = item([0.0, 0.0, 10.0, 10.0]);
    let b = item([5.0, 0.0, 15.0, 10.0]);
    assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    assert_eq!(a.iou(&item([20.0, 20.0, 30.0, 30.0])), 0.0);
  }

  #[test]
  fn degenerate_box_has_zero_area() {
    let a = item([10.0, 10.0, 5.0, 5.0]);
    assert_eq!(a.area(), 0.0);
    assert_eq!(a.iou(&a), 0.0);
  }
}

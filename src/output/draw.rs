// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{DetectItem, DetectResult, Labels};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

// 常见系统字体位置
const SYSTEM_FONT_CANDIDATES: [&str; 6] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum FontLoadError {
  #[error("无法读取字体文件 {}: {source}", .path.display())]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无效的字体文件: {}", .0.display())]
  InvalidFont(PathBuf),
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
}

impl Default for Draw {
  fn default() -> Self {
    let font = SYSTEM_FONT_CANDIDATES
      .iter()
      .map(Path::new)
      .filter(|path| path.is_file())
      .find_map(|path| match load_font(path) {
        Ok(font) => {
          debug!("使用系统字体: {}", path.display());
          Some(font)
        }
        Err(e) => {
          debug!("{}", e);
          None
        }
      });

    if font.is_none() {
      warn!("未找到可用字体, 仅绘制检测框");
    }

    Self {
      font,
      font_size: LABEL_FONT_SIZE,
    }
  }
}

fn load_font(path: &Path) -> Result<FontVec, FontLoadError> {
  let data = std::fs::read(path).map_err(|source| FontLoadError::IoError {
    path: path.to_path_buf(),
    source,
  })?;
  FontVec::try_from_vec(data).map_err(|_| FontLoadError::InvalidFont(path.to_path_buf()))
}

impl Draw {
  pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self, FontLoadError> {
    Ok(Self {
      font: Some(load_font(path.as_ref())?),
      font_size: LABEL_FONT_SIZE,
    })
  }

  /// 不绘制文字
  pub fn without_font() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult, labels: &Labels) {
    for item in result.iter() {
      let label = format!("{} {:.2}", labels.name(item.class_id), item.score);
      self.draw_bbox_with_label(image, item, &label, class_color(item.class_id));
    }
  }

  // bbox 为像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem, label: &str, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (item.bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (item.bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (item.bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (item.bbox[3].ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框向内加粗
    for t in 0..BOX_THICKNESS {
      let (box_w, box_h) = (x_max - x_min - 2 * t + 1, y_max - y_min - 2 * t + 1);
      if box_w <= 0 || box_h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(box_w as u32, box_h as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, label);
    let label_w = (text_w as i32 + 2 * LABEL_TEXT_PADDING).min(w - x_min);
    let label_h = text_h as i32 + 2 * LABEL_TEXT_PADDING;

    // 标签放在框上方，空间不足时放在框内
    let label_y = if y_min >= label_h { y_min - label_h } else { y_min };
    if label_w > 0 && label_h > 0 {
      let rect = Rect::at(x_min, label_y).of_size(label_w as u32, label_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        TEXT_COLOR,
        x_min + LABEL_TEXT_PADDING,
        label_y + LABEL_TEXT_PADDING,
        scale,
        font,
        label,
      );
    }
  }
}

/// 按类别编号在色相环上取色
pub fn class_color(class_id: u32) -> Rgb<u8> {
  let hue = (class_id as f32 * 0.618_034).fract() * 360.0;
  Rgb(hsv_to_rgb(hue, 0.85, 0.95))
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
  let c = value * saturation;
  let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
  let m = value - c;
  let (r, g, b) = match hue as u32 {
    0..60 => (c, x, 0.0),
    60..120 => (x, c, 0.0),
    120..180 => (0.0, c, x),
    180..240 => (0.0, x, c),
    240..300 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };
  [
    ((r + m) * 255.0).round() as u8,
    ((g + m) * 255.0).round() as u8,
    ((b + m) * 255.0).round() as u8,
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn draws_box_outline_without_font() {
    let mut image = RgbImage::new(50, 50);
    let result = DetectResult::from(vec![DetectItem {
      class_id: 0,
      score: 0.9,
      bbox: [10.0, 10.0, 30.0, 30.0],
    }]);

    Draw::without_font().draw_detections(&mut image, &result, &Labels::new(["Beetle"]));

    let color = class_color(0);
    assert_eq!(*image.get_pixel(10, 10), color);
    assert_eq!(*image.get_pixel(11, 20), color);
    assert_eq!(*image.get_pixel(30, 30), color);
    // 框内部与外部不受影响
    assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(40, 40), Rgb([0, 0, 0]));
  }

  #[test]
  fn clamps_boxes_outside_image() {
    let mut image = RgbImage::new(20, 20);
    let result = DetectResult::from(vec![
      DetectItem {
        class_id: 1,
        score: 0.5,
        bbox: [-5.0, -5.0, 100.0, 100.0],
      },
      DetectItem {
        class_id: 1,
        score: 0.5,
        bbox: [15.0, 15.0, 15.0, 15.0],
      },
    ]);

    Draw::without_font().draw_detections(&mut image, &result, &Labels::default());

    assert_eq!(*image.get_pixel(0, 0), class_color(1));
    assert_eq!(*image.get_pixel(19, 19), class_color(1));
  }

  #[test]
  fn class_colors_differ() {
    assert_ne!(class_color(0), class_color(1));
    assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [255, 0, 0]);
    assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), [0, 255, 0]);
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(matches!(
      Draw::from_font_file("/no/such/font.ttf"),
      Err(FontLoadError::IoError { .. })
    ));
  }
}

// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/output/annotated_image.rs - 保存带标注的结果图像
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;

use crate::{
  model::{DetectResult, Labels},
  output::{
    Render,
    draw::{Draw, FontLoadError},
  },
};

pub const RESULT_SUFFIX: &str = "_result.jpg";

#[derive(Error, Debug)]
pub enum AnnotatedImageOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体错误: {0}")]
  FontError(#[from] FontLoadError),
}

pub struct AnnotatedImageOutput {
  output_dir: PathBuf,
  draw: Draw,
}

impl AnnotatedImageOutput {
  /// 未指定字体时使用系统字体
  pub fn new(
    output_dir: impl AsRef<Path>,
    font: Option<&Path>,
  ) -> Result<Self, AnnotatedImageOutputError> {
    let draw = match font {
      Some(path) => Draw::from_font_file(path)?,
      None => Draw::default(),
    };
    Ok(Self::with_draw(output_dir, draw))
  }

  pub fn with_draw(output_dir: impl AsRef<Path>, draw: Draw) -> Self {
    Self {
      output_dir: output_dir.as_ref().to_path_buf(),
      draw,
    }
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  /// `<output_dir>/<stem>_result.jpg`
  pub fn result_path(&self, image_path: &Path) -> PathBuf {
    let stem = image_path
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_else(|| "image".to_string());
    self.output_dir.join(format!("{stem}{RESULT_SUFFIX}"))
  }
}

impl Render for AnnotatedImageOutput {
  type Error = AnnotatedImageOutputError;

  fn render_result(
    &self,
    image_path: &Path,
    frame: &RgbImage,
    result: &DetectResult,
    labels: &Labels,
  ) -> Result<Option<PathBuf>, Self::Error> {
    if result.is_empty() {
      return Ok(None);
    }

    std::fs::create_dir_all(&self.output_dir)?;
    let mut image = frame.clone();
    self.draw.draw_detections(&mut image, result, labels);

    let path = self.result_path(image_path);
    image.save(&path)?;
    info!("结果图像已保存: {}", path.display());

    Ok(Some(path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  #[test]
  fn result_path_uses_stem_and_suffix() {
    let output = AnnotatedImageOutput::with_draw("out", Draw::without_font());
    assert_eq!(
      output.result_path(Path::new("/data/beetle.01.png")),
      PathBuf::from("out/beetle.01_result.jpg")
    );
  }

  #[test]
  fn skips_empty_results_and_saves_detections() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("results");
    let output = AnnotatedImageOutput::with_draw(&output_dir, Draw::without_font());
    let frame = RgbImage::new(32, 32);
    let labels = Labels::new(["Beetle"]);

    let saved = output
      .render_result(Path::new("a.jpg"), &frame, &DetectResult::default(), &labels)
      .unwrap();
    assert!(saved.is_none());
    assert!(!output_dir.exists());

    let result = DetectResult::from(vec![DetectItem {
      class_id: 0,
      score: 0.8,
      bbox: [4.0, 4.0, 20.0, 20.0],
    }]);
    let saved = output
      .render_result(Path::new("a.jpg"), &frame, &result, &labels)
      .unwrap()
      .unwrap();
    assert_eq!(saved, output_dir.join("a_result.jpg"));
    assert_eq!(image::image_dimensions(&saved).unwrap(), (32, 32));
  }
}

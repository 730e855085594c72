// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/output.rs - 输出定义
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
use thiserror::Error;

use crate::model::{DetectResult, Labels};

/// 渲染检测结果，返回写出的文件路径（如有）
pub trait Render {
  type Error;
  fn render_result(
    &self,
    image_path: &Path,
    frame: &RgbImage,
    result: &DetectResult,
    labels: &Labels,
  ) -> Result<Option<PathBuf>, Self::Error>;
}

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod annotated_image;
#[cfg(feature = "save_image_file")]
pub use self::annotated_image::{AnnotatedImageOutput, AnnotatedImageOutputError, RESULT_SUFFIX};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存结果图像错误: {0}")]
  AnnotatedImageOutputError(#[from] AnnotatedImageOutputError),
  #[error("未启用 save_image_file 功能, 无法保存结果图像")]
  Unsupported,
}

impl From<Infallible> for OutputError {
  fn from(e: Infallible) -> Self {
    match e {}
  }
}

/// 不保存任何内容
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardOutput;

impl Render for DiscardOutput {
  type Error = Infallible;

  fn render_result(
    &self,
    _image_path: &Path,
    _frame: &RgbImage,
    _result: &DetectResult,
    _labels: &Labels,
  ) -> Result<Option<PathBuf>, Self::Error> {
    Ok(None)
  }
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  AnnotatedImage(AnnotatedImageOutput),
  Discard(DiscardOutput),
}

impl OutputWrapper {
  pub fn new(save: bool, output_dir: &Path, font: Option<&Path>) -> Result<Self, OutputError> {
    if !save {
      return Ok(OutputWrapper::Discard(DiscardOutput));
    }

    Self::annotated(output_dir, font)
  }

  #[cfg(feature = "save_image_file")]
  fn annotated(output_dir: &Path, font: Option<&Path>) -> Result<Self, OutputError> {
    let output = AnnotatedImageOutput::new(output_dir, font)?;
    Ok(OutputWrapper::AnnotatedImage(output))
  }

  #[cfg(not(feature = "save_image_file"))]
  fn annotated(_output_dir: &Path, _font: Option<&Path>) -> Result<Self, OutputError> {
    Err(OutputError::Unsupported)
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    image_path: &Path,
    frame: &RgbImage,
    result: &DetectResult,
    labels: &Labels,
  ) -> Result<Option<PathBuf>, Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::AnnotatedImage(output) => output
        .render_result(image_path, frame, result, labels)
        .map_err(OutputError::from),
      OutputWrapper::Discard(output) => output
        .render_result(image_path, frame, result, labels)
        .map_err(OutputError::from),
    }
  }
}

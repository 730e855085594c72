// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/task.rs - 推理任务
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
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  input::{ImageFileInput, ImageFileInputError},
  model::Detector,
  output::{OutputWrapper, Render},
  report::{BatchStats, InferenceRecord, ReportError},
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("文件不存在: {}", .0.display())]
  MissingResource(PathBuf),
  #[error("没有可处理的输入: {0}")]
  EmptyInput(String),
  #[error("图像读取错误: {0}")]
  Image(ImageFileInputError),
  #[error("推理错误: {0}")]
  Detector(BoxError),
  #[error("渲染错误: {0}")]
  Render(BoxError),
  #[error("报告错误: {0}")]
  Report(#[from] ReportError),
}

impl From<ImageFileInputError> for InferenceError {
  fn from(e: ImageFileInputError) -> Self {
    match e {
      ImageFileInputError::NotFound(path) => InferenceError::MissingResource(path),
      other => InferenceError::Image(other),
    }
  }
}

/// 处理单张图像：读取、计时推理、可选保存结果图
///
/// 耗时只包含检测器调用本身。
pub fn process_image<D, O>(
  detector: &mut D,
  output: &O,
  image_path: &Path,
  confidence: f32,
) -> Result<InferenceRecord, InferenceError>
where
  D: Detector,
  D::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  let input = ImageFileInput::open(image_path)?;
  debug!("图像尺寸: {:?}", input.dimensions());

  let now = Instant::now();
  let result = detector
    .detect(input.image(), confidence)
    .map_err(|e| InferenceError::Detector(Box::new(e)))?;
  let elapsed = now.elapsed();
  info!("推理完成, 耗时: {:.2?}, 检测到 {} 个目标", elapsed, result.len());

  let output_path = output
    .render_result(image_path, input.image(), &result, detector.labels())
    .map_err(|e| InferenceError::Render(Box::new(e)))?;

  Ok(InferenceRecord::new(
    image_path,
    elapsed,
    &result,
    detector.labels(),
    output_path,
  ))
}

pub trait Task<D, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: &[PathBuf], detector: &mut D, output: &O)
  -> Result<Self::Output, Self::Error>;
}

/// 单张图像模式，任何失败都会中止
pub struct SingleImageTask {
  confidence: f32,
}

impl SingleImageTask {
  pub fn new(confidence: f32) -> Self {
    Self { confidence }
  }
}

impl<D, O> Task<D, O> for SingleImageTask
where
  D: Detector,
  D::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = InferenceRecord;
  type Error = InferenceError;

  fn run_task(
    self,
    input: &[PathBuf],
    detector: &mut D,
    output: &O,
  ) -> Result<Self::Output, Self::Error> {
    let (image_path, rest) = input
      .split_first()
      .ok_or_else(|| InferenceError::EmptyInput("没有输入图像".to_string()))?;
    if !rest.is_empty() {
      warn!("单张图像模式忽略其余 {} 张图像", rest.len());
    }

    info!("处理图像: {}", image_path.display());
    process_image(detector, output, image_path, self.confidence)
  }
}

#[derive(Debug)]
pub struct ItemFailure {
  pub image_path: PathBuf,
  pub error: InferenceError,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
  pub attempted: usize,
  pub records: Vec<InferenceRecord>,
  pub failures: Vec<ItemFailure>,
}

impl BatchOutcome {
  pub fn stats(&self) -> BatchStats {
    BatchStats::from_records(self.attempted, &self.records)
  }
}

/// 批量模式，单张失败只记录并继续
pub struct BatchTask {
  confidence: f32,
}

impl BatchTask {
  pub fn new(confidence: f32) -> Self {
    Self { confidence }
  }
}

impl<D, O> Task<D, O> for BatchTask
where
  D: Detector,
  D::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = BatchOutcome;
  type Error = Infallible;

  fn run_task(
    self,
    input: &[PathBuf],
    detector: &mut D,
    output: &O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始批量推理, 共 {} 张图像", input.len());
    let mut outcome = BatchOutcome {
      attempted: input.len(),
      ..Default::default()
    };

    for (index, image_path) in input.iter().enumerate() {
      info!("[{}/{}] 处理: {}", index + 1, input.len(), image_path.display());
      match process_image(detector, output, image_path, self.confidence) {
        Ok(record) => outcome.records.push(record),
        Err(e) => {
          error!("处理失败 {}: {}", image_path.display(), e);
          outcome.failures.push(ItemFailure {
            image_path: image_path.clone(),
            error: e,
          });
        }
      }
    }

    info!(
      "批量推理完成: 成功 {} 张, 失败 {} 张",
      outcome.records.len(),
      outcome.failures.len()
    );
    Ok(outcome)
  }
}

/// 批量推理入口
pub fn run_inference<D>(
  detector: &mut D,
  image_paths: &[PathBuf],
  confidence: f32,
  save_annotated: bool,
  output_dir: &Path,
) -> Result<BatchOutcome, InferenceError>
where
  D: Detector,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  let output = OutputWrapper::new(save_annotated, output_dir, None)
    .map_err(|e| InferenceError::Render(Box::new(e)))?;
  let Ok(outcome) = BatchTask::new(confidence).run_task(image_paths, detector, &output);
  Ok(outcome)
}

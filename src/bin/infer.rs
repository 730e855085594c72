// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/bin/infer.rs - 甲虫检测推理入口
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use kabuto::{
  config::{InferArgs, InferenceConfig, init_logging},
  input::resolve_image_sources,
  model::{Detector, Yolov8Builder},
  output::OutputWrapper,
  report::{BatchStats, save_report_json},
  task::{BatchTask, InferenceError, SingleImageTask, Task},
};

fn main() -> Result<()> {
  let args = InferArgs::parse();
  init_logging(args.verbose);
  let config = InferenceConfig::from(args);

  info!("模型文件路径: {}", config.model.display());
  info!("输入来源: {}", config.source);
  info!("输出目录: {}", config.output_dir.display());

  if !config.model.is_file() {
    return Err(InferenceError::MissingResource(config.model.clone()).into());
  }

  let images = resolve_image_sources(&config.source)?;
  if images.is_empty() {
    return Err(InferenceError::EmptyInput(format!("未找到图像: {}", config.source)).into());
  }
  info!("找到 {} 张图像", images.len());

  let mut model = Yolov8Builder::new(&config.model)
    .device(&config.device)
    .iou_threshold(config.iou_threshold)
    .build()?;
  let output = OutputWrapper::new(
    config.save_annotated,
    &config.output_dir,
    config.font.as_deref(),
  )?;

  let records = if images.len() == 1 {
    let record = SingleImageTask::new(config.confidence).run_task(&images, &mut model, &output)?;
    for detection in &record.detections {
      info!(
        "  {}: {:.3} [{:.1}, {:.1}, {:.1}, {:.1}]",
        detection.class_name,
        detection.confidence,
        detection.bbox[0],
        detection.bbox[1],
        detection.bbox[2],
        detection.bbox[3]
      );
    }
    if let Some(path) = &record.output_path {
      info!("结果图像: {}", path);
    }
    let records = vec![record];
    BatchStats::from_records(1, &records).log_summary();
    records
  } else {
    let Ok(outcome) = BatchTask::new(config.confidence).run_task(&images, &mut model, &output);
    for failure in &outcome.failures {
      warn!("跳过 {}: {}", failure.image_path.display(), failure.error);
    }
    outcome.stats().log_summary();
    outcome.records
  };

  info!("类别数: {}", model.labels().len());

  if config.save_json {
    save_report_json(&config.report_path(), &records)?;
  }

  Ok(())
}

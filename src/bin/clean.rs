// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/bin/clean.rs - 数据集清洗与导出入口
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

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;

use kabuto::{
  clean::filter_small_boxes,
  config::{CleanArgs, CleaningConfig, init_logging},
  dataset::{
    AttributionRow, SampleStore, YoloDataset, export_yolo, write_attribution_csv, write_data_yaml,
  },
};

fn main() -> Result<()> {
  let args = CleanArgs::parse();
  init_logging(args.verbose);
  let config = CleaningConfig::from(args);

  info!("数据集: {}", config.dataset.display());
  info!("导出目录: {}", config.export_dir.display());

  let mut rows = Vec::new();
  for split in &config.splits {
    let mut dataset = YoloDataset::open(&config.dataset, split)?;
    if dataset.is_empty() {
      bail!("数据集 [{}] 中没有样本", split);
    }

    if config.skip_cleaning {
      info!("跳过 [{}] 的小目标清洗", split);
    } else {
      let result = filter_small_boxes(&mut dataset, &config.thresholds)?;
      info!(
        "[{}] 删除 {} 个样本, 去除 {} 个标注框",
        split,
        result.deleted_samples,
        result.removed_boxes()
      );
    }

    export_yolo(&dataset, &config.export_dir, split, &config.classes)?;
    rows.extend(
      dataset
        .samples()?
        .iter()
        .map(|sample| AttributionRow::from_sample(split, sample)),
    );
  }

  write_data_yaml(&config.export_dir, &config.splits, &config.classes)?;
  write_attribution_csv(&config.attribution, &rows)?;

  info!("完成: 共导出 {} 个样本", rows.len());
  Ok(())
}

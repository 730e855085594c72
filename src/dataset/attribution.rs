// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/dataset/attribution.rs - 图像授权信息记录
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
use std::path::Path;

use chrono::Local;
use tracing::info;

use crate::dataset::{DatasetError, Sample};

const ATTRIBUTION_HEADER: [&str; 8] = [
  "split",
  "image_id",
  "filename",
  "source",
  "license",
  "attribution",
  "url",
  "usage_date",
];
const ATTRIBUTION_SOURCE: &str = "Open Images Dataset V7";
const ATTRIBUTION_LICENSE: &str = "CC BY 2.0 (individual verification required)";
const ATTRIBUTION_TEXT: &str = "Image from Open Images Dataset V7, licensed under CC BY 2.0";
const VISUALIZER_URL: &str = "https://storage.googleapis.com/openimages/web/visualizer/index.html?set=train&type=detection&c=%2Fm%2F0cyf8&id=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionRow {
  pub split: String,
  pub image_id: String,
  pub filename: String,
}

impl AttributionRow {
  /// Open Images 的文件名即图像 id
  pub fn from_sample(split: &str, sample: &Sample) -> Self {
    let filename = sample
      .filepath
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    Self {
      split: split.to_string(),
      image_id: sample.id.clone(),
      filename,
    }
  }

  fn fields(&self, usage_date: &str) -> [String; 8] {
    [
      self.split.clone(),
      self.image_id.clone(),
      self.filename.clone(),
      ATTRIBUTION_SOURCE.to_string(),
      ATTRIBUTION_LICENSE.to_string(),
      ATTRIBUTION_TEXT.to_string(),
      format!("{VISUALIZER_URL}{}", self.image_id),
      usage_date.to_string(),
    ]
  }
}

fn escape_field(field: &str) -> String {
  if field.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field.to_string()
  }
}

pub fn write_attribution_csv(output: &Path, rows: &[AttributionRow]) -> Result<usize, DatasetError> {
  if let Some(parent) = output.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)?;
  }

  let usage_date = Local::now().format("%Y-%m-%d").to_string();
  let mut content = ATTRIBUTION_HEADER.join(",");
  content.push('\n');
  for row in rows {
    let line: Vec<String> = row
      .fields(&usage_date)
      .iter()
      .map(|field| escape_field(field))
      .collect();
    content.push_str(&line.join(","));
    content.push('\n');
  }
  fs::write(output, content)?;

  info!("授权信息 CSV 已创建: {} ({} 条记录)", output.display(), rows.len());
  Ok(rows.len())
}

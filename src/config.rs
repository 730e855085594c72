// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/config.rs - 命令行参数与运行配置
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

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use tracing::Level;

use crate::clean::{BoxThresholds, DEFAULT_MIN_AREA, DEFAULT_MIN_SIDE};

pub const DEFAULT_CONFIDENCE: f32 = 0.25;
pub const DEFAULT_IOU: f32 = 0.45;
pub const DEFAULT_OUTPUT_DIR: &str = "inference_results";
pub const REPORT_FILE_NAME: &str = "inference_results.json";
pub const DEFAULT_EXPORT_DIR: &str = "datasets/beetle-oid-yolo";
pub const DEFAULT_ATTRIBUTION: &str = "docs/ATTRIBUTION.csv";
pub const DEFAULT_CLASS: &str = "Beetle";

/// 解析 [0, 1] 区间内的概率值
pub fn parse_probability(value: &str) -> Result<f32, String> {
  let value: f32 = value
    .trim()
    .parse()
    .map_err(|_| format!("'{value}' 不是有效的数值"))?;
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(format!("{value} 不在 0.0 - 1.0 范围内"))
  }
}

fn parse_non_negative(value: &str) -> Result<f64, String> {
  let value: f64 = value
    .trim()
    .parse()
    .map_err(|_| format!("'{value}' 不是有效的数值"))?;
  if value.is_finite() && value >= 0.0 {
    Ok(value)
  } else {
    Err(format!("{value} 必须为非负数"))
  }
}

/// 安装日志输出，`verbose` 时输出调试信息
pub fn init_logging(verbose: bool) {
  let level = if verbose { Level::DEBUG } else { Level::INFO };
  tracing_subscriber::fmt().with_max_level(level).init();
}

/// 甲虫检测推理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct InferArgs {
  /// ONNX 模型文件路径
  #[arg(short, long, value_name = "MODEL")]
  pub model: PathBuf,

  /// 输入来源（图片文件、目录或通配符）
  #[arg(short, long, value_name = "SOURCE")]
  pub source: String,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_parser = parse_probability, value_name = "THRESHOLD")]
  pub conf: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU, value_parser = parse_probability, value_name = "THRESHOLD")]
  pub iou: f32,

  /// 输出目录
  #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 不保存结果图像
  #[arg(long)]
  pub no_save: bool,

  /// 保存 JSON 结果
  #[arg(long)]
  pub save_json: bool,

  /// 推理设备（cpu、cuda、cuda:0，留空自动选择）
  #[arg(long, default_value = "", value_name = "DEVICE")]
  pub device: String,

  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 输出调试日志
  #[arg(short, long)]
  pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceConfig {
  pub model: PathBuf,
  pub source: String,
  pub confidence: f32,
  pub iou_threshold: f32,
  pub output_dir: PathBuf,
  pub save_annotated: bool,
  pub save_json: bool,
  pub device: String,
  pub font: Option<PathBuf>,
}

impl InferenceConfig {
  pub fn report_path(&self) -> PathBuf {
    self.output_dir.join(REPORT_FILE_NAME)
  }
}

impl From<InferArgs> for InferenceConfig {
  fn from(args: InferArgs) -> Self {
    Self {
      model: args.model,
      source: args.source,
      confidence: args.conf,
      iou_threshold: args.iou,
      output_dir: args.output_dir,
      save_annotated: !args.no_save,
      save_json: args.save_json,
      device: args.device,
      font: args.font,
    }
  }
}

pub const CLEAN_IN_PLACE_NOTE: &str =
  "注意: 清洗会直接修改数据集目录, 被删除样本的图像和标注文件将从磁盘移除。如需保留原始下载内容, 请先复制数据集或使用 --skip-cleaning。";

/// 甲虫数据集清洗与导出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = CLEAN_IN_PLACE_NOTE)]
pub struct CleanArgs {
  /// YOLO 格式数据集根目录（清洗时原地修改，删除样本的图像文件）
  #[arg(long, value_name = "DIR")]
  pub dataset: PathBuf,

  #[arg(long, default_value = "train", value_name = "SPLIT")]
  pub train_split: String,

  #[arg(long, default_value = "val", value_name = "SPLIT")]
  pub val_split: String,

  /// 导出目录
  #[arg(long, default_value = DEFAULT_EXPORT_DIR, value_name = "DIR")]
  pub export_dir: PathBuf,

  /// 最小边长（像素）
  #[arg(long, default_value_t = DEFAULT_MIN_SIDE, value_parser = parse_non_negative, value_name = "PX")]
  pub min_side: f64,

  /// 最小面积（平方像素）
  #[arg(long, default_value_t = DEFAULT_MIN_AREA, value_parser = parse_non_negative, value_name = "PX2")]
  pub min_area: f64,

  /// 跳过小目标清洗
  #[arg(long)]
  pub skip_cleaning: bool,

  /// 类别名称，可重复指定
  #[arg(long = "class", default_values_t = [DEFAULT_CLASS.to_string()], value_name = "NAME")]
  pub classes: Vec<String>,

  /// 授权信息 CSV 路径
  #[arg(long, default_value = DEFAULT_ATTRIBUTION, value_name = "FILE")]
  pub attribution: PathBuf,

  /// 输出调试日志
  #[arg(short, long)]
  pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningConfig {
  pub dataset: PathBuf,
  pub splits: Vec<String>,
  pub export_dir: PathBuf,
  pub thresholds: BoxThresholds,
  pub skip_cleaning: bool,
  pub classes: Vec<String>,
  pub attribution: PathBuf,
}

impl From<CleanArgs> for CleaningConfig {
  fn from(args: CleanArgs) -> Self {
    let mut splits = vec![args.train_split];
    if !splits.contains(&args.val_split) {
      splits.push(args.val_split);
    }
    Self {
      dataset: args.dataset,
      splits,
      export_dir: args.export_dir,
      thresholds: BoxThresholds::new(args.min_side, args.min_area),
      skip_cleaning: args.skip_cleaning,
      classes: args.classes,
      attribution: args.attribution,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn probability_bounds() {
    assert_eq!(parse_probability("0.25"), Ok(0.25));
    assert_eq!(parse_probability("1"), Ok(1.0));
    assert!(parse_probability("1.5").is_err());
    assert!(parse_probability("-0.1").is_err());
    assert!(parse_probability("high").is_err());
  }

  #[test]
  fn infer_defaults() {
    let args = InferArgs::try_parse_from(["kabuto-infer", "-m", "best.onnx", "-s", "images/"]).unwrap();
    let config = InferenceConfig::from(args);
    assert_eq!(config.confidence, DEFAULT_CONFIDENCE);
    assert_eq!(config.iou_threshold, DEFAULT_IOU);
    assert!(config.save_annotated);
    assert!(!config.save_json);
    assert_eq!(config.device, "");
    assert_eq!(config.report_path(), PathBuf::from("inference_results/inference_results.json"));
  }

  #[test]
  fn infer_flags() {
    let args = InferArgs::try_parse_from([
      "kabuto-infer",
      "--model",
      "best.onnx",
      "--source",
      "*.jpg",
      "--conf",
      "0.5",
      "--no-save",
      "--save-json",
      "-o",
      "out",
      "--device",
      "cpu",
    ])
    .unwrap();
    let config = InferenceConfig::from(args);
    assert_eq!(config.confidence, 0.5);
    assert!(!config.save_annotated);
    assert!(config.save_json);
    assert_eq!(config.report_path(), PathBuf::from("out/inference_results.json"));
  }

  #[test]
  fn infer_rejects_bad_confidence() {
    assert!(
      InferArgs::try_parse_from(["kabuto-infer", "-m", "m.onnx", "-s", "a.jpg", "--conf", "2"]).is_err()
    );
  }

  #[test]
  fn clean_help_warns_about_in_place_deletion() {
    use clap::CommandFactory;
    let help = CleanArgs::command().render_help().to_string();
    assert!(help.contains(CLEAN_IN_PLACE_NOTE));
    assert!(help.contains("--skip-cleaning"));
  }

  #[test]
  fn clean_defaults_and_repeated_classes() {
    let args = CleanArgs::try_parse_from(["kabuto-clean", "--dataset", "data"]).unwrap();
    let config = CleaningConfig::from(args);
    assert_eq!(config.splits, vec!["train", "val"]);
    assert_eq!(config.thresholds, BoxThresholds::default());
    assert_eq!(config.classes, vec![DEFAULT_CLASS]);
    assert_eq!(config.export_dir, PathBuf::from(DEFAULT_EXPORT_DIR));

    let args = CleanArgs::try_parse_from([
      "kabuto-clean",
      "--dataset",
      "data",
      "--class",
      "Beetle",
      "--class",
      "Ladybug",
      "--min-side",
      "4",
      "--skip-cleaning",
    ])
    .unwrap();
    let config = CleaningConfig::from(args);
    assert_eq!(config.classes, vec!["Beetle", "Ladybug"]);
    assert_eq!(config.thresholds.min_side, 4.0);
    assert!(config.skip_cleaning);
    assert!(CleanArgs::try_parse_from(["kabuto-clean", "--dataset", "d", "--min-area", "-1"]).is_err());
  }
}

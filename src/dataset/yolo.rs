// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/dataset/yolo.rs - YOLO 目录格式数据集
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

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::dataset::{DatasetError, GroundTruth, ImageMetadata, Sample, SampleStore};
use crate::input::is_supported_image_file;

const IMAGES_DIR: &str = "images";
const LABELS_DIR: &str = "labels";
const LABEL_EXTENSION: &str = "txt";
const DATA_YAML: &str = "data.yaml";

/// `<root>/images/<split>/` 与 `<root>/labels/<split>/` 组成的数据集切分
#[derive(Debug)]
pub struct YoloDataset {
  root: PathBuf,
  split: String,
  samples: Vec<Sample>,
}

impl YoloDataset {
  pub fn open(root: impl AsRef<Path>, split: &str) -> Result<Self, DatasetError> {
    let root = root.as_ref().to_path_buf();
    let image_dir = root.join(IMAGES_DIR).join(split);
    if !image_dir.is_dir() {
      return Err(DatasetError::NotFound(image_dir));
    }

    let mut image_paths = Vec::new();
    for entry in fs::read_dir(&image_dir)? {
      let path = entry?.path();
      if path.is_file() && is_supported_image_file(&path) {
        image_paths.push(path);
      }
    }
    image_paths.sort();

    let label_dir = root.join(LABELS_DIR).join(split);
    let mut samples = Vec::with_capacity(image_paths.len());
    for filepath in image_paths {
      let id = sample_id(&filepath);
      let label_path = label_dir.join(format!("{id}.{LABEL_EXTENSION}"));
      let detections = if label_path.is_file() {
        read_label_file(&label_path)?
      } else {
        debug!("样本 {} 没有标注文件", id);
        Vec::new()
      };

      // 尺寸缺失留给清洗阶段报错
      let metadata = match image::image_dimensions(&filepath) {
        Ok((width, height)) => Some(ImageMetadata { width, height }),
        Err(e) => {
          warn!("无法读取图像尺寸 {}: {}", filepath.display(), e);
          None
        }
      };

      samples.push(Sample {
        id,
        filepath,
        metadata,
        detections,
      });
    }

    info!(
      "已加载数据集 {} [{}]: {} 个样本",
      root.display(),
      split,
      samples.len()
    );

    Ok(Self {
      root,
      split: split.to_string(),
      samples,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn split(&self) -> &str {
    &self.split
  }

  fn label_path(&self, id: &str) -> PathBuf {
    self
      .root
      .join(LABELS_DIR)
      .join(&self.split)
      .join(format!("{id}.{LABEL_EXTENSION}"))
  }
}

impl SampleStore for YoloDataset {
  fn samples(&self) -> Result<Vec<Sample>, DatasetError> {
    Ok(self.samples.clone())
  }

  fn save(&mut self, sample: &Sample) -> Result<(), DatasetError> {
    let index = self
      .samples
      .iter()
      .position(|s| s.id == sample.id)
      .ok_or_else(|| DatasetError::UnknownSample(sample.id.clone()))?;
    write_label_file(&self.label_path(&sample.id), &sample.detections)?;
    self.samples[index] = sample.clone();
    Ok(())
  }

  fn delete_samples(&mut self, ids: &[String]) -> Result<(), DatasetError> {
    let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
    for sample in self.samples.iter().filter(|s| ids.contains(s.id.as_str())) {
      if sample.filepath.exists() {
        fs::remove_file(&sample.filepath)?;
      }
      let label_path = self.label_path(&sample.id);
      if label_path.exists() {
        fs::remove_file(&label_path)?;
      }
    }
    self.samples.retain(|s| !ids.contains(s.id.as_str()));
    Ok(())
  }

  fn len(&self) -> usize {
    self.samples.len()
  }
}

fn sample_id(path: &Path) -> String {
  path
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_default()
}

/// 解析一行 `class cx cy w h`，转为左上角形式
pub fn parse_label_line(line: &str) -> Result<GroundTruth, String> {
  let fields: Vec<&str> = line.split_whitespace().collect();
  if fields.len() != 5 {
    return Err(format!("期望 5 个字段, 实际 {} 个", fields.len()));
  }

  let class_id = fields[0]
    .parse::<u32>()
    .map_err(|_| format!("无效的类别编号: '{}'", fields[0]))?;
  let mut values = [0f64; 4];
  for (value, field) in values.iter_mut().zip(&fields[1..]) {
    *value = field
      .parse::<f64>()
      .map_err(|_| format!("无效的坐标: '{field}'"))?;
  }

  let [cx, cy, w, h] = values;
  Ok(GroundTruth::new(class_id, [cx - w / 2.0, cy - h / 2.0, w, h]))
}

/// 坐标按最短可还原形式写出，重新读取后宽高不变
pub fn format_label_line(gt: &GroundTruth) -> String {
  let [x, y, w, h] = gt.bounding_box;
  format!(
    "{} {} {} {} {}",
    gt.class_id,
    x + w / 2.0,
    y + h / 2.0,
    w,
    h
  )
}

fn read_label_file(path: &Path) -> Result<Vec<GroundTruth>, DatasetError> {
  let content = fs::read_to_string(path)?;
  content
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(index, line)| {
      parse_label_line(line).map_err(|reason| DatasetError::InvalidLabel {
        path: path.to_path_buf(),
        line: index + 1,
        reason,
      })
    })
    .collect()
}

fn write_label_file(path: &Path, detections: &[GroundTruth]) -> Result<(), DatasetError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)?;
  }

  let mut content = String::new();
  for gt in detections {
    content.push_str(&format_label_line(gt));
    content.push('\n');
  }
  fs::write(path, content)?;
  Ok(())
}

/// 导出为 YOLOv5 目录结构，`classes` 非空时丢弃超出类别表的标注
pub fn export_yolo<S: SampleStore + ?Sized>(
  store: &S,
  export_dir: &Path,
  split: &str,
  classes: &[String],
) -> Result<usize, DatasetError> {
  info!("导出 [{}] 到 {}", split, export_dir.display());

  let image_dir = export_dir.join(IMAGES_DIR).join(split);
  let label_dir = export_dir.join(LABELS_DIR).join(split);
  fs::create_dir_all(&image_dir)?;
  fs::create_dir_all(&label_dir)?;

  let mut exported = 0;
  for sample in store.samples()? {
    let Some(file_name) = sample.filepath.file_name() else {
      warn!("样本 {} 没有有效的文件名, 跳过", sample.id);
      continue;
    };
    fs::copy(&sample.filepath, image_dir.join(file_name))?;

    let detections: Vec<GroundTruth> = if classes.is_empty() {
      sample.detections
    } else {
      let (known, unknown): (Vec<_>, Vec<_>) = sample
        .detections
        .into_iter()
        .partition(|gt| (gt.class_id as usize) < classes.len());
      if !unknown.is_empty() {
        warn!(
          "样本 {} 有 {} 个标注不在类别表中, 已丢弃",
          sample.id,
          unknown.len()
        );
      }
      known
    };

    let label_path = label_dir.join(format!("{}.{LABEL_EXTENSION}", sample.id));
    write_label_file(&label_path, &detections)?;
    exported += 1;
  }

  info!("导出完成 [{}]: {} 个样本", split, exported);
  Ok(exported)
}

/// 写出 YOLOv5 `data.yaml`
pub fn write_data_yaml(
  export_dir: &Path,
  splits: &[String],
  classes: &[String],
) -> Result<PathBuf, DatasetError> {
  fs::create_dir_all(export_dir)?;
  let root = fs::canonicalize(export_dir)?;

  // JSON 字符串同时是合法的 YAML 双引号标量
  let quote = |value: &str| serde_json::Value::String(value.to_string()).to_string();

  let mut content = String::from("names:\n");
  for class in classes {
    content.push_str(&format!("- {}\n", quote(class)));
  }
  content.push_str(&format!("nc: {}\n", classes.len()));
  content.push_str(&format!("path: {}\n", quote(&root.to_string_lossy())));
  for split in splits {
    content.push_str(&format!("{}: ./{IMAGES_DIR}/{}/\n", split, split));
  }

  let path = export_dir.join(DATA_YAML);
  fs::write(&path, content)?;
  info!("data.yaml 已创建: {}", path.display());
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_label_line_converts_center_to_corner() {
    let gt = parse_label_line("0 0.5 0.5 0.2 0.4").unwrap();
    assert_eq!(gt.class_id, 0);
    let [x, y, w, h] = gt.bounding_box;
    assert!((x - 0.4).abs() < 1e-9);
    assert!((y - 0.3).abs() < 1e-9);
    assert!((w - 0.2).abs() < 1e-9);
    assert!((h - 0.4).abs() < 1e-9);
  }

  #[test]
  fn parse_label_line_rejects_bad_input() {
    assert!(parse_label_line("0 0.5 0.5 0.2").is_err());
    assert!(parse_label_line("x 0.5 0.5 0.2 0.2").is_err());
    assert!(parse_label_line("0 0.5 nope 0.2 0.2").is_err());
  }

  #[test]
  fn format_label_line_writes_center_form() {
    let gt = GroundTruth::new(2, [0.25, 0.25, 0.5, 0.25]);
    assert_eq!(format_label_line(&gt), "2 0.5 0.375 0.5 0.25");
  }

  #[test]
  fn format_label_line_keeps_full_precision() {
    let gt = parse_label_line("0 0.5 0.5 0.0013334 1.0").unwrap();
    let reread = parse_label_line(&format_label_line(&gt)).unwrap();
    assert_eq!(reread.bounding_box[2], 0.0013334);
    assert_eq!(reread.bounding_box[3], 1.0);
  }
}

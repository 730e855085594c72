// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 检测模型
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

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage, imageops};
use ndarray::{Array, IxDyn};
use ort::{
  execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
  },
  session::Session,
  value::{Tensor, ValueType},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{DetectItem, DetectResult, Detector, Labels};

const YOLOV8_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLOV8_DEFAULT_IOU_THRESH: f32 = 0.45;
const YOLOV8_PAD_VALUE: u8 = 114;
const YOLOV8_BOX_CHANNELS: usize = 4;
const YOLOV8_NAMES_KEY: &str = "names";

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型文件不存在: {}", .0.display())]
  ModelNotFound(PathBuf),
  #[error("无效的设备: {0}")]
  InvalidDevice(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("模型输出形状无效: {0:?}")]
  InvalidOutputShape(Vec<usize>),
  #[error("张量形状错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
}

impl Yolov8Error {
  fn ort(context: &str, e: impl std::fmt::Display) -> Self {
    Yolov8Error::OrtError(format!("{context}: {e}"))
  }
}

/// 推理设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelection {
  Auto,
  Cpu,
  Cuda(i32),
}

impl std::str::FromStr for DeviceSelection {
  type Err = Yolov8Error;

  fn from_str(device: &str) -> Result<Self, Self::Err> {
    let device = device.trim().to_lowercase();
    match device.as_str() {
      "" | "auto" => Ok(DeviceSelection::Auto),
      "cpu" => Ok(DeviceSelection::Cpu),
      "cuda" | "gpu" => Ok(DeviceSelection::Cuda(0)),
      other => {
        let index = other.strip_prefix("cuda:").unwrap_or(other);
        index
          .parse::<i32>()
          .ok()
          .filter(|id| *id >= 0)
          .map(DeviceSelection::Cuda)
          .ok_or_else(|| Yolov8Error::InvalidDevice(device.clone()))
      }
    }
  }
}

impl DeviceSelection {
  fn execution_providers(self) -> Vec<ExecutionProviderDispatch> {
    let cpu = CPUExecutionProvider::default().build();
    match self {
      DeviceSelection::Cpu => {
        info!("使用 CPU 推理");
        vec![cpu]
      }
      DeviceSelection::Auto => match CUDAExecutionProvider::default().is_available() {
        Ok(true) => {
          info!("自动选择 CUDA 推理");
          vec![CUDAExecutionProvider::default().build(), cpu]
        }
        _ => {
          info!("CUDA 不可用, 使用 CPU 推理");
          vec![cpu]
        }
      },
      DeviceSelection::Cuda(device_id) => {
        if !matches!(CUDAExecutionProvider::default().is_available(), Ok(true)) {
          warn!("CUDA 不可用, 将回退到 CPU");
        }
        info!("使用 CUDA 设备 {}", device_id);
        vec![
          CUDAExecutionProvider::default()
            .with_device_id(device_id)
            .build(),
          cpu,
        ]
      }
    }
  }
}

pub struct Yolov8Builder {
  model_path: PathBuf,
  device: String,
  iou_threshold: f32,
  labels: Option<Labels>,
}

impl Yolov8Builder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      device: String::new(),
      iou_threshold: YOLOV8_DEFAULT_IOU_THRESH,
      labels: None,
    }
  }

  pub fn device(mut self, device: &str) -> Self {
    self.device = device.to_string();
    self
  }

  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  /// 覆盖模型元数据中的类别名称
  pub fn labels(mut self, labels: Labels) -> Self {
    self.labels = Some(labels);
    self
  }

  pub fn build(self) -> Result<Yolov8, Yolov8Error> {
    if !self.model_path.is_file() {
      return Err(Yolov8Error::ModelNotFound(self.model_path));
    }
    let device: DeviceSelection = self.device.parse()?;

    info!("加载模型文件: {}", self.model_path.display());
    let session = Session::builder()
      .map_err(|e| Yolov8Error::ort("创建会话失败", e))?
      .with_execution_providers(device.execution_providers())
      .map_err(|e| Yolov8Error::ort("设置执行后端失败", e))?
      .commit_from_file(&self.model_path)
      .map_err(|e| Yolov8Error::ort("加载模型失败", e))?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .unwrap_or_else(|| "images".to_string());
    let output_name = session
      .outputs
      .first()
      .map(|output| output.name.clone())
      .unwrap_or_else(|| "output0".to_string());

    let input_size = session
      .inputs
      .first()
      .and_then(|input| match &input.input_type {
        ValueType::Tensor { shape, .. } => shape.get(3).copied(),
        _ => None,
      })
      .filter(|size| *size > 0)
      .map(|size| size as u32)
      .unwrap_or(YOLOV8_DEFAULT_INPUT_SIZE);

    let labels = match self.labels {
      Some(labels) => labels,
      None => session
        .metadata()
        .ok()
        .and_then(|metadata| metadata.custom(YOLOV8_NAMES_KEY).ok().flatten())
        .and_then(|names| Labels::parse_ultralytics_names(&names))
        .unwrap_or_else(|| {
          warn!("模型元数据中没有类别名称");
          Labels::default()
        }),
    };

    debug!(
      "模型输入: {} ({}x{}), 输出: {}",
      input_name, input_size, input_size, output_name
    );
    info!("模型加载完成, 类别数: {}", labels.len());

    Ok(Yolov8 {
      session,
      input_name,
      output_name,
      input_size,
      iou_threshold: self.iou_threshold,
      labels,
    })
  }
}

pub struct Yolov8 {
  session: Session,
  input_name: String,
  output_name: String,
  input_size: u32,
  iou_threshold: f32,
  labels: Labels,
}

impl Yolov8 {
  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  fn run(&mut self, input: Array<f32, IxDyn>) -> Result<(Vec<usize>, Vec<f32>), Yolov8Error> {
    let tensor = Tensor::from_array(input).map_err(|e| Yolov8Error::ort("创建输入张量失败", e))?;
    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => tensor])
      .map_err(|e| Yolov8Error::ort("推理失败", e))?;

    let output = outputs
      .get(self.output_name.as_str())
      .ok_or_else(|| Yolov8Error::OrtError(format!("缺少输出 {}", self.output_name)))?;
    let (shape, data) = output
      .try_extract_tensor::<f32>()
      .map_err(|e| Yolov8Error::ort("读取输出失败", e))?;

    let shape = shape.iter().map(|&d| d as usize).collect();
    Ok((shape, data.to_vec()))
  }
}

impl Detector for Yolov8 {
  type Error = Yolov8Error;

  fn detect(&mut self, image: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    let letterbox = Letterbox::fit(image.dimensions(), self.input_size);
    let input = letterbox.apply(image)?;
    let (shape, data) = self.run(input)?;
    let candidates = decode_output(&shape, &data, confidence, &letterbox)?;
    let mut items = nms(candidates, self.iou_threshold);
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(items.into())
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }
}

/// 保持宽高比缩放并居中填充
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
  size: u32,
  scale: f32,
  new_width: u32,
  new_height: u32,
  pad_x: u32,
  pad_y: u32,
  width: u32,
  height: u32,
}

impl Letterbox {
  fn fit((width, height): (u32, u32), size: u32) -> Self {
    let scale = size as f32 / width.max(height).max(1) as f32;
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);
    Self {
      size,
      scale,
      new_width,
      new_height,
      pad_x: (size - new_width) / 2,
      pad_y: (size - new_height) / 2,
      width,
      height,
    }
  }

  // 奇数余量留在右侧和底部
  fn resized_dimensions(&self) -> (u32, u32) {
    (self.new_width, self.new_height)
  }

  /// 生成 NCHW、归一化到 [0, 1] 的输入
  fn apply(&self, image: &RgbImage) -> Result<Array<f32, IxDyn>, Yolov8Error> {
    let (new_width, new_height) = self.resized_dimensions();
    let resized = imageops::resize(image, new_width, new_height, imageops::FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([YOLOV8_PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);

    let size = self.size as usize;
    let mut data = vec![0f32; 3 * size * size];
    for (x, y, pixel) in canvas.enumerate_pixels() {
      let offset = y as usize * size + x as usize;
      for c in 0..3 {
        data[c * size * size + offset] = pixel[c] as f32 / 255.0;
      }
    }

    Ok(Array::from_shape_vec(IxDyn(&[1, 3, size, size]), data)?)
  }

  /// 输入坐标映射回原图并裁剪到图像范围
  fn restore(&self, x: f32, y: f32) -> (f32, f32) {
    let x = (x - self.pad_x as f32) / self.scale;
    let y = (y - self.pad_y as f32) / self.scale;
    (
      x.clamp(0.0, self.width as f32),
      y.clamp(0.0, self.height as f32),
    )
  }
}

/// 解码 `[1, 4 + nc, N]` 输出（兼容转置的 `[1, N, 4 + nc]`）
fn decode_output(
  shape: &[usize],
  data: &[f32],
  confidence: f32,
  letterbox: &Letterbox,
) -> Result<Vec<DetectItem>, Yolov8Error> {
  if shape.len() != 3 || shape[0] != 1 {
    return Err(Yolov8Error::InvalidOutputShape(shape.to_vec()));
  }
  let (channels, anchors, transposed) = if shape[1] <= shape[2] {
    (shape[1], shape[2], false)
  } else {
    (shape[2], shape[1], true)
  };
  if channels <= YOLOV8_BOX_CHANNELS || data.len() != channels * anchors {
    return Err(Yolov8Error::InvalidOutputShape(shape.to_vec()));
  }

  let at = |c: usize, i: usize| {
    if transposed {
      data[i * channels + c]
    } else {
      data[c * anchors + i]
    }
  };

  let mut items = Vec::new();
  for i in 0..anchors {
    let (class_id, score) = (YOLOV8_BOX_CHANNELS..channels)
      .map(|c| ((c - YOLOV8_BOX_CHANNELS) as u32, at(c, i)))
      .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
    if score <= confidence {
      continue;
    }

    let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
    let (x1, y1) = letterbox.restore(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = letterbox.restore(cx + w / 2.0, cy + h / 2.0);
    if x2 <= x1 || y2 <= y1 {
      continue;
    }

    items.push(DetectItem {
      class_id,
      score,
      bbox: [x1, y1, x2, y2],
    });
  }
  Ok(items)
}

/// 按类别分别做非极大值抑制
fn nms(items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  let mut by_class: HashMap<u32, Vec<DetectItem>> = HashMap::new();
  for item in items {
    by_class.entry(item.class_id).or_default().push(item);
  }

  let mut kept = Vec::new();
  for (_, mut group) in by_class {
    group.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut suppressed = vec![false; group.len()];
    for i in 0..group.len() {
      if suppressed[i] {
        continue;
      }
      for j in (i + 1)..group.len() {
        if !suppressed[j] && group[i].iou(&group[j]) > iou_threshold {
          suppressed[j] = true;
        }
      }
      kept.push(group[i].clone());
    }
  }
  kept
}

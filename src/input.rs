// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/input.rs - 图像输入与来源解析
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
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 支持的图像扩展名（小写）
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("No image files found in: {0}")]
  NoImagesFound(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 扩展名不区分大小写
pub fn is_supported_image_file(path: &Path) -> bool {
  path
    .extension()
    .map(|ext| ext.to_string_lossy().to_lowercase())
    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

// 目录扫描只接受全小写或全大写的扩展名
fn has_listed_extension(path: &Path) -> bool {
  path.extension().is_some_and(|ext| {
    let ext = ext.to_string_lossy();
    IMAGE_EXTENSIONS
      .iter()
      .any(|listed| ext == *listed || ext == listed.to_uppercase())
  })
}

fn find_images_in_directory(dir: &Path) -> Result<Vec<PathBuf>, InputError> {
  let mut image_files = Vec::new();
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_file() && has_listed_extension(&path) {
      image_files.push(path);
    }
  }
  Ok(image_files)
}

fn expand_glob(pattern: &str) -> Vec<PathBuf> {
  let paths = match glob::glob(pattern) {
    Ok(paths) => paths,
    Err(e) => {
      warn!("Invalid glob pattern '{}': {}", pattern, e);
      return Vec::new();
    }
  };

  paths
    .filter_map(|entry| match entry {
      Ok(path) => Some(path),
      Err(e) => {
        warn!("Error reading path in glob '{}': {}", pattern, e);
        None
      }
    })
    .filter(|path| path.is_file() && is_supported_image_file(path))
    .collect()
}

/// 将文件、目录或通配符解析为排序去重后的图像路径列表
///
/// 没有匹配时返回空列表，由调用方决定如何报告。
pub fn resolve_image_sources(source: &str) -> Result<Vec<PathBuf>, InputError> {
  let source_path = Path::new(source);

  let mut image_files = if source_path.is_file() {
    if is_supported_image_file(source_path) {
      vec![source_path.to_path_buf()]
    } else {
      debug!("Unsupported image file: {}", source);
      Vec::new()
    }
  } else if source_path.is_dir() {
    find_images_in_directory(source_path)?
  } else {
    expand_glob(source)
  };

  image_files.sort();
  image_files.dedup();
  Ok(image_files)
}

/// 同 [`resolve_image_sources`]，但空结果视为错误
pub fn collect_images(source: &str) -> Result<Vec<PathBuf>, InputError> {
  let image_files = resolve_image_sources(source)?;
  if image_files.is_empty() {
    return Err(InputError::NoImagesFound(source.to_string()));
  }
  Ok(image_files)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn supported_extensions_ignore_case() {
    assert!(is_supported_image_file(Path::new("a.jpg")));
    assert!(is_supported_image_file(Path::new("a.JPEG")));
    assert!(is_supported_image_file(Path::new("a.Png")));
    assert!(is_supported_image_file(Path::new("a.webp")));
    assert!(is_supported_image_file(Path::new("a.tiff")));
    assert!(!is_supported_image_file(Path::new("a.tif")));
    assert!(!is_supported_image_file(Path::new("a.txt")));
    assert!(!is_supported_image_file(Path::new("jpg")));
  }

  #[test]
  fn directory_scan_accepts_lower_and_upper_case_only() {
    assert!(has_listed_extension(Path::new("a.jpg")));
    assert!(has_listed_extension(Path::new("a.JPG")));
    assert!(!has_listed_extension(Path::new("a.Jpg")));
  }

  #[test]
  fn invalid_glob_resolves_to_empty() {
    assert!(resolve_image_sources("[unclosed").unwrap().is_empty());
  }

  #[test]
  fn collect_images_reports_empty_source() {
    let err = collect_images("/definitely/not/here/*.jpg").unwrap_err();
    assert!(matches!(err, InputError::NoImagesFound(source) if source == "/definitely/not/here/*.jpg"));
  }
}

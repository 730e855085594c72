// 该文件是 Kabuto （甲虫） 项目的一部分。
// tests/input_source_tests.rs - 图像来源解析测试
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

use kabuto::input::{InputError, collect_images, resolve_image_sources};

#[test]
fn directory_yields_sorted_images_only() {
  let dir = tempfile::tempdir().unwrap();
  for name in ["b.PNG", "c.txt", "a.jpg"] {
    fs::write(dir.path().join(name), b"x").unwrap();
  }
  fs::create_dir(dir.path().join("nested.jpg")).unwrap();

  let images = resolve_image_sources(dir.path().to_str().unwrap()).unwrap();

  assert_eq!(images, vec![dir.path().join("a.jpg"), dir.path().join("b.PNG")]);
}

#[test]
fn single_file_is_filtered_by_extension() {
  let dir = tempfile::tempdir().unwrap();
  let image = dir.path().join("beetle.JPEG");
  let text = dir.path().join("notes.txt");
  fs::write(&image, b"x").unwrap();
  fs::write(&text, b"x").unwrap();

  assert_eq!(resolve_image_sources(image.to_str().unwrap()).unwrap(), vec![image]);
  assert!(resolve_image_sources(text.to_str().unwrap()).unwrap().is_empty());
}

#[test]
fn glob_pattern_is_expanded_and_filtered() {
  let dir = tempfile::tempdir().unwrap();
  for name in ["x1.jpg", "x2.png", "x3.txt", "y1.jpg"] {
    fs::write(dir.path().join(name), b"x").unwrap();
  }

  let pattern = format!("{}/x*", dir.path().display());
  let images = resolve_image_sources(&pattern).unwrap();

  assert_eq!(images, vec![dir.path().join("x1.jpg"), dir.path().join("x2.png")]);
}

#[test]
fn nonexistent_source_resolves_to_nothing() {
  let dir = tempfile::tempdir().unwrap();
  let missing = dir.path().join("missing").join("*.jpg");
  let source = missing.to_str().unwrap();

  assert!(resolve_image_sources(source).unwrap().is_empty());
  assert!(matches!(collect_images(source), Err(InputError::NoImagesFound(s)) if s == source));
}

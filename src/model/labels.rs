// 该文件是 Kabuto （甲虫） 项目的一部分。
// src/model/labels.rs - 类别名称表
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

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
  names: BTreeMap<u32, String>,
}

impl Labels {
  /// 按顺序编号
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      names: (0u32..).zip(names.into_iter().map(Into::into)).collect(),
    }
  }

  pub fn name(&self, class_id: u32) -> String {
    self
      .names
      .get(&class_id)
      .cloned()
      .unwrap_or_else(|| format!("class_{class_id}"))
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 解析 Ultralytics 导出模型元数据中的 `names` 字段，如 `{0: 'Beetle', 1: "ladybird's"}`
  pub fn parse_ultralytics_names(value: &str) -> Option<Self> {
    let body = value.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut names = BTreeMap::new();
    let mut rest = body.trim();

    while !rest.is_empty() {
      let (key, after) = rest.split_once(':')?;
      let class_id = key.trim().parse::<u32>().ok()?;

      let after = after.trim_start();
      let quote = after.chars().next()?;
      if quote != '\'' && quote != '"' {
        return None;
      }
      let after = &after[quote.len_utf8()..];
      let end = after.find(quote)?;
      names.insert(class_id, after[..end].to_string());

      rest = after[end + quote.len_utf8()..].trim_start();
      rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    Some(Self { names })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_class_falls_back_to_id() {
    let labels = Labels::new(["Beetle"]);
    assert_eq!(labels.name(0), "Beetle");
    assert_eq!(labels.name(7), "class_7");
  }

  #[test]
  fn parses_ultralytics_names() {
    let labels = Labels::parse_ultralytics_names("{0: 'Beetle', 1: \"ladybird's\", 2: 'stag beetle'}")
      .unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.name(0), "Beetle");
    assert_eq!(labels.name(1), "ladybird's");
    assert_eq!(labels.name(2), "stag beetle");
  }

  #[test]
  fn parses_empty_and_rejects_malformed() {
    assert!(Labels::parse_ultralytics_names("{}").unwrap().is_empty());
    assert!(Labels::parse_ultralytics_names("['Beetle']").is_none());
    assert!(Labels::parse_ultralytics_names("{zero: 'Beetle'}").is_none());
    assert!(Labels::parse_ultralytics_names("{0: Beetle}").is_none());
  }
}

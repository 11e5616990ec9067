// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/model/catalog.rs - 类别表（名称与显示颜色）
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

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const UNKNOWN_CLASS_NAME: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub [u8; 3]);

impl Color {
  pub const BLUE: Color = Color([0, 0, 255]);
  pub const RED: Color = Color([255, 0, 0]);
  pub const YELLOW: Color = Color([255, 255, 0]);
  pub const GREEN: Color = Color([0, 255, 0]);

  /// 类别不在表中时使用的颜色
  pub const FALLBACK: Color = Color::GREEN;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEntry {
  pub id: usize,
  pub name: String,
  pub color: Color,
}

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("类别表解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别 ID 重复: {0}")]
  DuplicateId(usize),
}

/// 启动时构建、之后只读的类别表
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCatalog {
  entries: BTreeMap<usize, ClassEntry>,
}

impl Default for ClassCatalog {
  /// 生菜模型的三个类别
  fn default() -> Self {
    let entries = [
      (0, "normal_lettuce", Color::BLUE),
      (1, "disease_lettuce", Color::RED),
      (2, "weed", Color::YELLOW),
    ]
    .into_iter()
    .map(|(id, name, color)| {
      (
        id,
        ClassEntry {
          id,
          name: name.to_string(),
          color,
        },
      )
    })
    .collect();
    Self { entries }
  }
}

impl ClassCatalog {
  pub fn from_entries(
    entries: impl IntoIterator<Item = ClassEntry>,
  ) -> Result<Self, CatalogError> {
    let mut map = BTreeMap::new();
    for entry in entries {
      let id = entry.id;
      if map.insert(id, entry).is_some() {
        return Err(CatalogError::DuplicateId(id));
      }
    }
    Ok(Self { entries: map })
  }

  /// JSON 格式: `[{"id": 0, "name": "normal_lettuce", "color": [0, 0, 255]}, ...]`
  pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
    let entries: Vec<ClassEntry> = serde_json::from_str(json)?;
    Self::from_entries(entries)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
    let path = path.as_ref();
    info!("加载类别表: {}", path.display());
    let json = std::fs::read_to_string(path)?;
    Self::from_json_str(&json)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// 模型类别数，取最大类别编号 + 1
  pub fn num_classes(&self) -> usize {
    self.entries.keys().next_back().map_or(0, |id| id + 1)
  }

  pub fn get(&self, class_id: usize) -> Option<&ClassEntry> {
    self.entries.get(&class_id)
  }

  /// 查找类别名称与颜色；不存在时退回 ("unknown", 默认颜色)
  pub fn lookup(&self, class_id: usize) -> (&str, Color) {
    match self.entries.get(&class_id) {
      Some(entry) => (entry.name.as_str(), entry.color),
      None => {
        warn!("类别 {} 不在类别表中, 使用 {}", class_id, UNKNOWN_CLASS_NAME);
        (UNKNOWN_CLASS_NAME, Color::FALLBACK)
      }
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &ClassEntry> {
    self.entries.values()
  }
}

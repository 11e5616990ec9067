// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

use crate::tensor::{InputTensor, OutputTensor};

/// 推理引擎：固定尺寸输入张量 -> 固定形状输出张量，内部实现不透明
pub trait Model<const S: u32> {
  type Error;

  fn infer(&self, input: &InputTensor<S>) -> Result<OutputTensor, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: [f32; 4], // [left, top, right, bottom]，原图像素坐标
  pub confidence: f32,
  pub class_id: usize,
  pub class_name: String,
  pub color: Color,
}

impl Detection {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod catalog;
pub use self::catalog::{CatalogError, ClassCatalog, ClassEntry, Color};

mod decode;
pub use self::decode::{
  DecodeError, Decoder, arbitrate_class, candidate_box, decode, passes_threshold,
};

#[cfg(feature = "onnx_engine")]
mod onnx;
#[cfg(feature = "onnx_engine")]
pub use self::onnx::{OnnxModel, OnnxModelBuilder, OnnxModelError, TensorLayout};

// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/model/decode.rs - 检测结果解码
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

use ndarray::{ArrayView1, ArrayView3, s};
use thiserror::Error;
use tracing::{debug, error};

use crate::{
  INPUT_SIZE,
  model::{ClassCatalog, DetectResult, Detection},
  tensor::{BOX_CHANNELS, OBJECTNESS_CHANNEL, OutputTensor, TensorError},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出张量形状错误: 期望 [1, {expected_channels}, N], 实际 {actual:?}")]
  MalformedTensor {
    expected_channels: usize,
    actual: Vec<usize>,
  },
  #[error("输出张量数据错误: {0}")]
  InvalidTensor(#[from] TensorError),
}

/// 置信度必须严格大于阈值
#[inline]
pub fn passes_threshold(confidence: f32, threshold: f32) -> bool {
  confidence > threshold
}

/// 中心点/宽高 (模型输入像素) -> [left, top, right, bottom] (原图像素)
#[inline]
pub fn candidate_box(cx: f32, cy: f32, w: f32, h: f32, x_scale: f32, y_scale: f32) -> [f32; 4] {
  let (x, y) = (cx * x_scale, cy * y_scale);
  let (w, h) = (w * x_scale, h * y_scale);
  [x - w / 2.0, y - h / 2.0, x + w / 2.0, y + h / 2.0]
}

/// 选出得分最高的类别，平局取较小的类别编号；没有得分大于 0 的类别时返回 None
pub fn arbitrate_class(scores: impl IntoIterator<Item = f32>) -> Option<(usize, f32)> {
  let mut max_score = 0f32;
  let mut max_class = None;
  for (class_id, score) in scores.into_iter().enumerate() {
    if score > max_score {
      max_score = score;
      max_class = Some(class_id);
    }
  }
  max_class.map(|class_id| (class_id, max_score))
}

/// 单阶段检测模型输出解码器
///
/// 不做非极大值抑制：每个通过阈值的候选都会成为独立的检测结果，
/// 输出顺序即候选编号顺序。
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'c> {
  catalog: &'c ClassCatalog,
  num_classes: usize,
  input_size: f32,
}

impl<'c> Decoder<'c> {
  pub fn new(catalog: &'c ClassCatalog, num_classes: usize) -> Self {
    Self {
      catalog,
      num_classes,
      input_size: INPUT_SIZE as f32,
    }
  }

  pub fn with_input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size as f32;
    self
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn expected_channels(&self) -> usize {
    BOX_CHANNELS + self.num_classes
  }

  pub fn decode(
    &self,
    output: &OutputTensor,
    original_width: f32,
    original_height: f32,
    confidence_threshold: f32,
  ) -> Result<DetectResult, DecodeError> {
    let view = match output.view() {
      Ok(view) => view,
      Err(TensorError::NotThreeDimensional(_)) => return Err(self.malformed(output)),
      Err(e) => {
        error!("输出张量无效: {}", e);
        return Err(e.into());
      }
    };
    let (batch, channels, num_candidates) = view.dim();
    if batch != 1 || channels != self.expected_channels() {
      return Err(self.malformed(output));
    }

    let x_scale = original_width / self.input_size;
    let y_scale = original_height / self.input_size;

    let items: Vec<Detection> = (0..num_candidates)
      .filter_map(|index| {
        self.decode_candidate(&view, index, x_scale, y_scale, confidence_threshold)
      })
      .collect();

    debug!(
      "检测到 {} 个物体 (候选 {} 个)",
      items.len(),
      num_candidates
    );
    Ok(DetectResult::from(items))
  }

  fn malformed(&self, output: &OutputTensor) -> DecodeError {
    error!(
      "输出张量形状不匹配: 期望 [1, {}, N], 实际 {:?}",
      self.expected_channels(),
      output.shape()
    );
    DecodeError::MalformedTensor {
      expected_channels: self.expected_channels(),
      actual: output.shape().to_vec(),
    }
  }

  fn decode_candidate(
    &self,
    view: &ArrayView3<'_, f32>,
    index: usize,
    x_scale: f32,
    y_scale: f32,
    confidence_threshold: f32,
  ) -> Option<Detection> {
    let column: ArrayView1<'_, f32> = view.slice(s![0, .., index]);

    let confidence = column[OBJECTNESS_CHANNEL];
    if !passes_threshold(confidence, confidence_threshold) {
      return None;
    }

    let bbox = candidate_box(
      column[0], column[1], column[2], column[3], x_scale, y_scale,
    );

    let scores = (0..self.num_classes).map(|c| column[BOX_CHANNELS + c]);
    let (class_id, _) = arbitrate_class(scores)?;
    let (class_name, color) = self.catalog.lookup(class_id);

    Some(Detection {
      bbox,
      confidence,
      class_id,
      class_name: class_name.to_string(),
      color,
    })
  }
}

/// 以默认输入尺寸解码模型输出
pub fn decode(
  output: &OutputTensor,
  catalog: &ClassCatalog,
  num_classes: usize,
  original_width: f32,
  original_height: f32,
  confidence_threshold: f32,
) -> Result<DetectResult, DecodeError> {
  Decoder::new(catalog, num_classes).decode(
    output,
    original_width,
    original_height,
    confidence_threshold,
  )
}

// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/preprocess.rs - 图像预处理
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

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::tensor::InputTensor;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("无效图像: 尺寸为 {width}x{height}")]
  InvalidImage { width: u32, height: u32 },
}

/// 将通道值 [0, 255] 映射到 [-1, 1]
#[inline]
pub fn normalize_channel(value: u8) -> f32 {
  (value as f32 / 255.0) * 2.0 - 1.0
}

/// 拉伸缩放到 `S x S`（不保持宽高比），并编码为 NHWC 归一化张量
pub fn prepare<const S: u32>(image: &RgbImage) -> Result<InputTensor<S>, PreprocessError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(PreprocessError::InvalidImage { width, height });
  }

  // 模型以拉伸后的正方形训练，这里不做 letterbox
  let resized = image::imageops::resize(image, S, S, FilterType::Triangle);
  debug!("预处理: {}x{} -> {}x{}", width, height, S, S);

  let data: Vec<f32> = resized
    .into_raw()
    .into_iter()
    .map(normalize_channel)
    .collect();

  Ok(InputTensor::from_resized(data))
}

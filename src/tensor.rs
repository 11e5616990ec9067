// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/tensor.rs - 模型输入/输出张量定义
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

use ndarray::{Array3, ArrayView3};
use thiserror::Error;

use crate::INPUT_SIZE;

const RGB_CHANNELS: usize = 3;

/// 输出张量中边框与置信度占用的通道数: cx, cy, w, h, objectness
pub const BOX_CHANNELS: usize = 5;
/// 置信度（objectness）所在通道
pub const OBJECTNESS_CHANNEL: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("输出张量必须为三维, 实际形状 {0:?}")]
  NotThreeDimensional(Vec<usize>),
  #[error("输出张量形状溢出: {0:?}")]
  ShapeOverflow(Vec<usize>),
}

/// 归一化到 [-1, 1] 的 NHWC 浮点输入张量，边长为 `S`
#[derive(Debug, Clone)]
pub struct InputTensor<const S: u32> {
  data: Box<[f32]>,
}

pub type LettuceInput = InputTensor<INPUT_SIZE>;

impl<const S: u32> InputTensor<S> {
  pub const LEN: usize = RGB_CHANNELS * (S as usize) * (S as usize);

  /// 长度由 `S x S` 的缩放结果保证
  pub(crate) fn from_resized(data: Vec<f32>) -> Self {
    debug_assert_eq!(data.len(), Self::LEN);
    Self {
      data: data.into_boxed_slice(),
    }
  }

  pub fn side(&self) -> usize {
    S as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_nhwc(&self) -> &[f32] {
    &self.data
  }

  /// 转换为平面排列 (NCHW)，供要求通道优先的推理后端使用
  pub fn to_nchw(&self) -> Vec<f32> {
    let plane = (S as usize) * (S as usize);
    let mut out = vec![0f32; Self::LEN];
    for (idx, pixel) in self.data.chunks_exact(RGB_CHANNELS).enumerate() {
      for (c, value) in pixel.iter().enumerate() {
        out[c * plane + idx] = *value;
      }
    }
    out
  }
}

impl<const S: u32> TryFrom<Vec<f32>> for InputTensor<S> {
  type Error = TensorError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(TensorError::LengthMismatch {
        expected: Self::LEN,
        actual: data.len(),
      });
    }
    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const S: u32> AsRef<[f32]> for InputTensor<S> {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

/// 模型原始输出，期望形状为 `[1, C, N]`
///
/// 引擎给出的形状与数据原样保存，形状是否合法由 `view` 检查。
#[derive(Debug, Clone)]
pub struct OutputTensor {
  shape: Vec<usize>,
  data: Vec<f32>,
}

impl OutputTensor {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self { shape, data }
  }

  pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Self, TensorError> {
    let output = Self::new(shape.to_vec(), data);
    output.view()?;
    Ok(output)
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  /// 以 `[batch, channels, candidates]` 视图访问数据
  pub fn view(&self) -> Result<ArrayView3<'_, f32>, TensorError> {
    let &[batch, channels, candidates] = self.shape.as_slice() else {
      return Err(TensorError::NotThreeDimensional(self.shape.clone()));
    };
    let expected = batch
      .checked_mul(channels)
      .and_then(|n| n.checked_mul(candidates))
      .ok_or_else(|| TensorError::ShapeOverflow(self.shape.clone()))?;
    let actual = self.data.len();
    if expected != actual {
      return Err(TensorError::LengthMismatch { expected, actual });
    }
    ArrayView3::from_shape((batch, channels, candidates), self.data.as_slice())
      .map_err(|_| TensorError::LengthMismatch { expected, actual })
  }
}

impl From<Array3<f32>> for OutputTensor {
  fn from(array: Array3<f32>) -> Self {
    Self {
      shape: array.shape().to_vec(),
      data: array.iter().copied().collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn input_length_is_checked() {
    let err = InputTensor::<2>::try_from(vec![0.0; 5]).unwrap_err();
    assert_eq!(
      err,
      TensorError::LengthMismatch {
        expected: 12,
        actual: 5
      }
    );
  }

  #[test]
  fn nchw_is_planar() {
    // 两个像素: (1,2,3) (4,5,6)
    let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let tensor = InputTensor::<2>::try_from(data).unwrap();
    let planar = tensor.to_nchw();
    assert_eq!(&planar[0..2], &[1.0, 4.0]);
    assert_eq!(&planar[4..6], &[2.0, 5.0]);
    assert_eq!(&planar[8..10], &[3.0, 6.0]);
  }

  #[test]
  fn output_requires_three_dims() {
    let err = OutputTensor::from_shape_vec(&[8, 2], vec![0.0; 16]).unwrap_err();
    assert_eq!(err, TensorError::NotThreeDimensional(vec![8, 2]));

    // 引擎给出的任意形状都能保存，访问时才报错
    let output = OutputTensor::new(vec![1, 2, 2, 2], vec![0.0; 8]);
    assert_eq!(output.shape(), &[1, 2, 2, 2]);
    assert!(matches!(
      output.view(),
      Err(TensorError::NotThreeDimensional(_))
    ));
  }

  #[test]
  fn huge_shape_is_rejected_without_panic() {
    let err = OutputTensor::from_shape_vec(&[usize::MAX, 2, 1], vec![]).unwrap_err();
    assert_eq!(err, TensorError::ShapeOverflow(vec![usize::MAX, 2, 1]));
  }

  #[test]
  fn short_data_is_rejected() {
    let err = OutputTensor::from_shape_vec(&[1, 2, 3], vec![0.0; 5]).unwrap_err();
    assert_eq!(
      err,
      TensorError::LengthMismatch {
        expected: 6,
        actual: 5
      }
    );
  }

  #[test]
  fn view_reads_channel_column() {
    // [1, 2, 3]: 通道 0 = 0,1,2; 通道 1 = 10,11,12
    let output =
      OutputTensor::from_shape_vec(&[1, 2, 3], vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]).unwrap();
    let view = output.view().unwrap();
    let column = view.slice(ndarray::s![0, .., 1]);
    assert_eq!(column.to_vec(), vec![1.0, 11.0]);
    assert_eq!(view.dim(), (1, 2, 3));
  }

  #[test]
  fn converts_from_array() {
    let array = Array3::from_shape_fn((1, 2, 2), |(_, c, n)| (c * 10 + n) as f32);
    let output = OutputTensor::from(array);
    assert_eq!(output.shape(), &[1, 2, 2]);
    assert_eq!(output.view().unwrap()[[0, 1, 1]], 11.0);
  }
}

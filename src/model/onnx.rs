// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

use std::{path::PathBuf, sync::Mutex};

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::Model,
  tensor::{InputTensor, OutputTensor},
  url_path,
};

const ONNX_NUM_INPUTS: usize = 1;
const ONNX_DEFAULT_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
}

/// 输入张量的内存排列
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TensorLayout {
  /// [1, S, S, 3]，与 TFLite 导出一致
  #[default]
  Nhwc,
  /// [1, 3, S, S]
  Nchw,
}

impl std::str::FromStr for TensorLayout {
  type Err = OnnxModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nhwc" => Ok(TensorLayout::Nhwc),
      "nchw" => Ok(TensorLayout::Nchw),
      other => Err(OnnxModelError::ModelPathError(format!(
        "未知的张量布局: {}",
        other
      ))),
    }
  }
}

pub struct OnnxModelBuilder {
  model_path: PathBuf,
  layout: TensorLayout,
  intra_threads: usize,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = OnnxModelError;

  /// `onnx:///path/model.onnx?layout=nchw&threads=2`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = OnnxModelBuilder {
      model_path: url_path(url),
      layout: TensorLayout::default(),
      intra_threads: ONNX_DEFAULT_THREADS,
    };

    for (key, value) in url.query_pairs() {
      match &*key {
        "layout" => builder.layout = value.parse()?,
        "threads" => {
          builder.intra_threads = value.parse().map_err(|_| {
            OnnxModelError::ModelPathError(format!("线程数无效: {}", value))
          })?
        }
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }

    Ok(builder)
  }
}

impl OnnxModelBuilder {
  pub fn layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = threads;
    self
  }

  pub fn build<const S: u32>(self) -> Result<OnnxModel<S>, OnnxModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let metadata = std::fs::metadata(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .with_intra_threads(self.intra_threads)?
      .commit_from_file(&self.model_path)?;

    let num_inputs = session.inputs.len();
    if num_inputs != ONNX_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS, num_inputs
      );
      return Err(OnnxModelError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        ONNX_NUM_INPUTS, num_inputs
      )));
    }
    if session.outputs.is_empty() {
      return Err(OnnxModelError::ModelInvalid("模型没有输出".to_string()));
    }

    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", session.outputs.len());
    info!("模型加载完成, 输入布局 {:?}", self.layout);

    Ok(OnnxModel {
      session: Mutex::new(session),
      layout: self.layout,
    })
  }
}

pub struct OnnxModel<const S: u32> {
  session: Mutex<Session>,
  layout: TensorLayout,
}

impl<const S: u32> OnnxModel<S> {
  pub fn layout(&self) -> TensorLayout {
    self.layout
  }
}

impl<const S: u32> Model<S> for OnnxModel<S> {
  type Error = OnnxModelError;

  fn infer(&self, input: &InputTensor<S>) -> Result<OutputTensor, Self::Error> {
    let side = S as usize;
    let (shape, data) = match self.layout {
      TensorLayout::Nhwc => ([1, side, side, 3], input.as_nhwc().to_vec()),
      TensorLayout::Nchw => ([1, 3, side, side], input.to_nchw()),
    };

    debug!("设置模型输入: {:?}", shape);
    let input_tensor = Tensor::from_array((shape, data))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxModelError::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![input_tensor])?;

    debug!("获取模型输出");
    let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
    let dims = output_shape
      .iter()
      .map(|&d| usize::try_from(d))
      .collect::<Result<Vec<usize>, _>>()
      .map_err(|_| {
        OnnxModelError::ModelInvalid(format!("输出张量维度无效: {:?}", output_shape))
      })?;
    debug!("模型输出形状: {:?}", dims);

    // 形状由解码阶段校验
    Ok(OutputTensor::new(dims, output_data.to_vec()))
  }
}

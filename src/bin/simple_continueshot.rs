// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续图像检测
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use url::Url;

use lettuce_see::{
  DEFAULT_CONFIDENCE_THRESHOLD, FromUrl, INPUT_SIZE,
  detector::Detector,
  input::InputWrapper,
  model::{ClassCatalog, OnnxModelBuilder},
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// 生菜慧眼连续检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 onnx:///models/best_float32.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，通常为 folder:///path
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值
  #[arg(long, value_name = "CONFIDENCE", default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
  pub confidence: f32,
  /// 类别表（JSON），缺省为内置的三类
  #[arg(long, value_name = "CLASSES")]
  pub classes: Option<PathBuf>,
  /// 模型类别数，缺省为类别表最大编号 + 1
  #[arg(long, value_name = "NUM_CLASSES")]
  pub num_classes: Option<usize>,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let catalog = match &args.classes {
    Some(path) => ClassCatalog::from_json_file(path)?,
    None => ClassCatalog::default(),
  };

  let input_image = InputWrapper::from_url(&args.input)?;
  let model = OnnxModelBuilder::from_url(&args.model)?.build::<INPUT_SIZE>()?;
  let mut detector = Detector::new(model, Arc::new(catalog));
  if let Some(num_classes) = args.num_classes {
    detector = detector.with_num_classes(num_classes);
  }
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_confidence_threshold(args.confidence)
    .with_frame_number(args.frame_number)
    .run_task(input_image, &detector, output)?;

  Ok(())
}

// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// tests/pipeline.rs - 检测流程集成测试
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

use std::{
  convert::Infallible,
  sync::{Arc, Mutex},
};

use image::{Rgb, RgbImage};
use lettuce_see::{
  DEFAULT_CONFIDENCE_THRESHOLD, FromUrl, INPUT_SIZE,
  detector::{DetectError, Detector},
  model::{ClassCatalog, Color, Model},
  output::LogOutput,
  preprocess::prepare,
  task::{OneShotTask, Task},
  tensor::{InputTensor, LettuceInput, OutputTensor},
};

/// 返回预设输出并记录收到的输入张量
struct ScriptedModel {
  shape: Vec<usize>,
  data: Vec<f32>,
  seen: Arc<Mutex<Vec<(usize, f32, f32)>>>,
}

impl ScriptedModel {
  /// `candidates` 每项为一个候选的全部通道，按 [1, C, N] 转置存放
  fn new(candidates: &[Vec<f32>]) -> Self {
    let channels = candidates[0].len();
    let n = candidates.len();
    let mut data = vec![0f32; channels * n];
    for (i, candidate) in candidates.iter().enumerate() {
      for (c, value) in candidate.iter().enumerate() {
        data[c * n + i] = *value;
      }
    }
    Self {
      shape: vec![1, channels, n],
      data,
      seen: Arc::default(),
    }
  }
}

impl Model<INPUT_SIZE> for ScriptedModel {
  type Error = Infallible;

  fn infer(&self, input: &InputTensor<INPUT_SIZE>) -> Result<OutputTensor, Self::Error> {
    let values = input.as_nhwc();
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    self.seen.lock().unwrap().push((values.len(), min, max));
    Ok(OutputTensor::new(self.shape.clone(), self.data.clone()))
  }
}

fn detector(model: ScriptedModel) -> Detector<ScriptedModel, INPUT_SIZE> {
  Detector::new(model, Arc::new(ClassCatalog::default()))
}

fn field(width: u32, height: u32) -> RgbImage {
  RgbImage::from_fn(width, height, |x, y| {
    Rgb([(x % 256) as u8, (y % 256) as u8, 128])
  })
}

fn approx(a: [f32; 4], b: [f32; 4]) -> bool {
  a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-2)
}

#[test]
fn diseased_lettuce_on_landscape_photo() {
  let model = ScriptedModel::new(&[vec![320.0, 320.0, 100.0, 50.0, 0.9, 0.1, 0.8, 0.05]]);
  let detector = detector(model);

  let result = detector
    .detect_objects(&field(1280, 960), DEFAULT_CONFIDENCE_THRESHOLD)
    .unwrap();

  assert_eq!(result.len(), 1);
  let det = &result.items[0];
  assert_eq!(det.class_id, 1);
  assert_eq!(det.class_name, "disease_lettuce");
  assert_eq!(det.color, Color::RED);
  assert_eq!(det.confidence, 0.9);
  assert!(approx(det.bbox, [540.0, 442.5, 740.0, 517.5]));
}

#[test]
fn model_receives_normalized_square_tensor() {
  let model = ScriptedModel::new(&[vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]]);
  let seen = Arc::clone(&model.seen);
  let detector = Arc::new(detector(model));
  for (w, h) in [(300, 200), (640, 640), (1920, 1080)] {
    detector.detect_objects(&field(w, h), 0.25).unwrap();
  }
  let job = detector.spawn(field(2000, 1500), 0.25);
  assert!(job.wait().unwrap().is_empty());

  let seen = seen.lock().unwrap();
  assert_eq!(seen.len(), 4);
  for &(len, min, max) in seen.iter() {
    assert_eq!(len, 640 * 640 * 3);
    assert!(min >= -1.0 && max <= 1.0);
  }

  let tensor: LettuceInput = prepare(&field(300, 200)).unwrap();
  assert_eq!(tensor.len(), LettuceInput::LEN);
}

#[test]
fn nothing_above_threshold_yields_empty_result() {
  let model = ScriptedModel::new(&[
    vec![100.0, 100.0, 20.0, 20.0, 0.1, 0.9, 0.0, 0.0],
    vec![200.0, 200.0, 20.0, 20.0, 0.25, 0.0, 0.9, 0.0],
  ]);
  let result = detector(model)
    .detect_objects(&field(640, 640), DEFAULT_CONFIDENCE_THRESHOLD)
    .unwrap();
  assert!(result.is_empty());
}

#[test]
fn truncated_channels_are_rejected() {
  let model = ScriptedModel::new(&[vec![1.0, 1.0, 1.0, 1.0]]);
  let err = detector(model)
    .detect_objects(&field(64, 64), 0.25)
    .unwrap_err();
  assert!(matches!(err, DetectError::MalformedTensor(_)));
}

#[test]
fn squeezed_engine_output_is_malformed() {
  let mut model = ScriptedModel::new(&[vec![320.0, 320.0, 100.0, 50.0, 0.9, 0.1, 0.8, 0.05]]);
  model.shape = vec![8, 1];
  let err = detector(model)
    .detect_objects(&field(64, 64), 0.25)
    .unwrap_err();
  assert!(matches!(err, DetectError::MalformedTensor(_)));
}

#[test]
fn boxes_scale_linearly_with_image_size() {
  let candidates = [
    vec![200.0, 150.0, 60.0, 40.0, 0.5, 0.0, 0.0, 0.3],
    vec![33.0, 600.0, 12.0, 90.0, 0.7, 0.2, 0.1, 0.0],
  ];
  let base = detector(ScriptedModel::new(&candidates))
    .detect_objects(&field(320, 240), 0.25)
    .unwrap();
  let doubled = detector(ScriptedModel::new(&candidates))
    .detect_objects(&field(640, 480), 0.25)
    .unwrap();

  assert_eq!(base.len(), 2);
  for (a, b) in base.iter().zip(doubled.iter()) {
    assert!(approx(b.bbox, a.bbox.map(|v| v * 2.0)));
  }
}

#[test]
fn one_shot_task_logs_detections() {
  let model = ScriptedModel::new(&[vec![320.0, 320.0, 100.0, 50.0, 0.9, 0.0, 0.0, 0.7]]);
  let output = LogOutput::from_url(&url::Url::parse("log://").unwrap()).unwrap();
  OneShotTask::default()
    .run_task(std::iter::once(field(640, 640)), &detector(model), output)
    .unwrap();
}

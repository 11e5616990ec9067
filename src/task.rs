// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{thread, time::Duration};

use image::RgbImage;
use tracing::{info, warn};

use crate::{DEFAULT_CONFIDENCE_THRESHOLD, detector::Detector, model::Model, output::Render};

pub trait Task<I, M, O, const S: u32>: Sized {
  type Error;
  fn run_task(self, input: I, detector: &Detector<M, S>, output: O) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy)]
pub struct OneShotTask {
  confidence_threshold: f32,
}

impl Default for OneShotTask {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
    }
  }
}

impl OneShotTask {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }
}

impl<I, M, O, const S: u32> Task<I, M, O, S> for OneShotTask
where
  I: Iterator<Item = RgbImage>,
  M: Model<S>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, detector: &Detector<M, S>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = detector.detect_objects(&image, self.confidence_threshold)?;
    let elapsed = now.elapsed();
    info!("检测完成，耗时: {:.2?}，共 {} 个目标", elapsed, result.len());
    output.render_result(&image, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[derive(Debug, Clone, Copy)]
pub struct RepeatShotTask {
  confidence_threshold: f32,
  times: usize,
}

/// 计入平均值前跳过的预热次数
const WARMUP_TIMES: usize = 2;

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      times: 1000,
    }
  }
}

impl RepeatShotTask {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times;
    self
  }
}

/// 去掉预热后的平均耗时
pub fn average_after_warmup(times: &[Duration]) -> Option<Duration> {
  if times.len() <= WARMUP_TIMES {
    return None;
  }
  let measured = &times[WARMUP_TIMES..];
  mean_duration(measured.iter().sum(), measured.len())
}

/// `total / count`，次数超过 `u32` 范围时按浮点秒计算
pub fn mean_duration(total: Duration, count: usize) -> Option<Duration> {
  if count == 0 {
    return None;
  }
  match u32::try_from(count) {
    Ok(count) => Some(total / count),
    Err(_) => Some(Duration::from_secs_f64(total.as_secs_f64() / count as f64)),
  }
}

impl<I, M, O, const S: u32> Task<I, M, O, S> for RepeatShotTask
where
  I: Iterator<Item = RgbImage>,
  M: Model<S>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, detector: &Detector<M, S>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = std::time::Instant::now();
      let result = detector.detect_objects(&image, self.confidence_threshold)?;
      let elapsed = now.elapsed();
      info!("({})检测完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&image, &result)?;
      times.push(elapsed);
    }

    match average_after_warmup(&times) {
      Some(average) => warn!("平均检测时间: {:.2?}", average),
      None => warn!("重复次数不足 {}，不计算平均时间", WARMUP_TIMES + 1),
    }

    Ok(())
  }
}

#[derive(Debug)]
pub struct ContinuousTask {
  confidence_threshold: f32,
  frame_number: Option<usize>,
  interruptible: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      frame_number: None,
      interruptible: true,
    }
  }
}

impl ContinuousTask {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 不安装 Ctrl-C 处理器（进程内只能安装一次）
  pub fn without_interrupt(mut self) -> Self {
    self.interruptible = false;
    self
  }
}

impl<I, M, O, const S: u32> Task<I, M, O, S> for ContinuousTask
where
  I: Iterator<Item = RgbImage>,
  M: Model<S>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: &Detector<M, S>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    if self.interruptible {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    }

    let mut frame_index = 0usize;
    let mut total_detections = 0usize;
    let mut now = std::time::Instant::now();
    for image in input {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 张图像", frame_index);
      let result = detector.detect_objects(&image, self.confidence_threshold)?;
      total_detections += result.len();
      let elapsed_a = now.elapsed();
      output.render_result(&image, &result)?;
      let elapsed_b = now.elapsed();
      now = std::time::Instant::now();
      info!("检测完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成，共处理 {} 张图像，检测到 {} 个目标",
      frame_index, total_detections
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;
  use crate::{
    model::{ClassCatalog, DetectResult},
    tensor::{InputTensor, OutputTensor},
  };

  struct OneDisease;

  impl<const S: u32> Model<S> for OneDisease {
    type Error = std::convert::Infallible;

    fn infer(&self, _input: &InputTensor<S>) -> Result<OutputTensor, Self::Error> {
      let data = vec![4.0, 4.0, 2.0, 2.0, 0.9, 0.1, 0.8, 0.0];
      Ok(OutputTensor::from_shape_vec(&[1, 8, 1], data).unwrap())
    }
  }

  #[derive(Clone, Default)]
  struct Collector(Arc<Mutex<Vec<usize>>>);

  impl Render for Collector {
    type Error = std::convert::Infallible;

    fn render_result(&self, _image: &RgbImage, result: &DetectResult) -> Result<(), Self::Error> {
      self.0.lock().unwrap().push(result.len());
      Ok(())
    }
  }

  fn detector() -> Detector<OneDisease, 8> {
    Detector::new(OneDisease, Arc::new(ClassCatalog::default()))
  }

  fn images(n: usize) -> impl Iterator<Item = RgbImage> {
    (0..n).map(|_| RgbImage::new(8, 8))
  }

  #[test]
  fn one_shot_renders_first_image_only() {
    let collector = Collector::default();
    OneShotTask::default()
      .run_task(images(3), &detector(), collector.clone())
      .unwrap();
    assert_eq!(*collector.0.lock().unwrap(), vec![1]);
  }

  #[test]
  fn one_shot_without_input_fails() {
    let result = OneShotTask::default().run_task(images(0), &detector(), Collector::default());
    assert!(result.is_err());
  }

  #[test]
  fn threshold_is_forwarded() {
    let collector = Collector::default();
    OneShotTask::default()
      .with_confidence_threshold(0.95)
      .run_task(images(1), &detector(), collector.clone())
      .unwrap();
    assert_eq!(*collector.0.lock().unwrap(), vec![0]);
  }

  #[test]
  fn repeat_shot_runs_requested_times() {
    let collector = Collector::default();
    RepeatShotTask::default()
      .with_times(5)
      .run_task(images(1), &detector(), collector.clone())
      .unwrap();
    assert_eq!(collector.0.lock().unwrap().len(), 5);
  }

  #[test]
  fn continuous_stops_at_frame_number() {
    let collector = Collector::default();
    ContinuousTask::default()
      .without_interrupt()
      .with_frame_number(Some(2))
      .run_task(images(5), &detector(), collector.clone())
      .unwrap();
    assert_eq!(collector.0.lock().unwrap().len(), 2);
  }

  #[test]
  fn average_skips_warmup() {
    let times = [100, 100, 10, 20, 30].map(Duration::from_millis);
    assert_eq!(average_after_warmup(&times), Some(Duration::from_millis(20)));
    assert_eq!(average_after_warmup(&times[..2]), None);
  }

  #[test]
  fn mean_handles_counts_beyond_u32() {
    let count = 1usize << 33;
    assert_eq!(
      mean_duration(Duration::from_secs(1 << 33), count),
      Some(Duration::from_secs(1))
    );
    assert_eq!(mean_duration(Duration::from_secs(3), 0), None);
    assert_eq!(
      mean_duration(Duration::from_millis(90), 3),
      Some(Duration::from_millis(30))
    );
  }
}

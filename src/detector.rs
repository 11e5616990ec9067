// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/detector.rs - 生菜目标检测器
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError},
  },
  thread,
  time::Duration,
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  model::{ClassCatalog, DecodeError, DetectResult, Decoder, Model},
  preprocess::{PreprocessError, prepare},
};

#[derive(Error, Debug)]
pub enum DetectError<E> {
  #[error("无效图像: {0}")]
  InvalidImage(#[from] PreprocessError),
  #[error("推理引擎错误: {0}")]
  Inference(E),
  #[error("模型输出不符合约定: {0}")]
  MalformedTensor(#[from] DecodeError),
  #[error("检测任务已取消")]
  Cancelled,
  #[error("检测线程异常退出")]
  WorkerLost,
}

/// 预处理 -> 推理 -> 解码 的完整检测流程
pub struct Detector<M, const S: u32> {
  model: M,
  catalog: Arc<ClassCatalog>,
  num_classes: usize,
}

impl<M: Model<S>, const S: u32> Detector<M, S> {
  pub fn new(model: M, catalog: Arc<ClassCatalog>) -> Self {
    let num_classes = catalog.num_classes();
    info!(
      "类别表共 {} 项, 按最大编号推断类别数为 {}",
      catalog.len(),
      num_classes
    );
    Self {
      model,
      catalog,
      num_classes,
    }
  }

  /// 模型类别数与类别表不一致时显式指定
  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    info!("类别数指定为 {}", num_classes);
    self.num_classes = num_classes;
    self
  }

  pub fn catalog(&self) -> &ClassCatalog {
    &self.catalog
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn detect_objects(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
  ) -> Result<DetectResult, DetectError<M::Error>> {
    self.run_stages(image, confidence_threshold, None)
  }

  fn run_stages(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
    cancelled: Option<&AtomicBool>,
  ) -> Result<DetectResult, DetectError<M::Error>> {
    let check = || -> Result<(), DetectError<M::Error>> {
      match cancelled {
        Some(flag) if flag.load(Ordering::Acquire) => Err(DetectError::Cancelled),
        _ => Ok(()),
      }
    };

    let (width, height) = image.dimensions();
    let input = prepare::<S>(image)?;
    check()?;

    let now = std::time::Instant::now();
    let output = self.model.infer(&input).map_err(DetectError::Inference)?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());
    check()?;

    let result = Decoder::new(&self.catalog, self.num_classes)
      .with_input_size(S)
      .decode(&output, width as f32, height as f32, confidence_threshold)?;
    Ok(result)
  }
}

impl<M, const S: u32> Detector<M, S>
where
  M: Model<S> + Send + Sync + 'static,
  M::Error: Send + 'static,
{
  /// 在后台线程中执行检测，调用方不会被推理阻塞
  pub fn spawn(
    self: &Arc<Self>,
    image: RgbImage,
    confidence_threshold: f32,
  ) -> DetectionJob<M::Error> {
    let detector = Arc::clone(self);
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
      let result = detector.run_stages(&image, confidence_threshold, Some(&flag));
      if flag.load(Ordering::Acquire) {
        info!("检测任务已取消，丢弃结果");
        let _ = tx.send(Err(DetectError::Cancelled));
        return;
      }
      let _ = tx.send(result);
    });

    DetectionJob { rx, cancelled }
  }
}

/// 后台检测任务句柄
pub struct DetectionJob<E> {
  rx: Receiver<Result<DetectResult, DetectError<E>>>,
  cancelled: Arc<AtomicBool>,
}

impl<E> DetectionJob<E> {
  /// 阻塞直到结果返回
  pub fn wait(self) -> Result<DetectResult, DetectError<E>> {
    self.rx.recv().unwrap_or_else(|_| {
      warn!("检测线程未返回结果");
      Err(DetectError::WorkerLost)
    })
  }

  /// 在 `timeout` 内等待结果；仍在运行时返回 None
  pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<DetectResult, DetectError<E>>> {
    match self.rx.recv_timeout(timeout) {
      Ok(result) => Some(result),
      Err(RecvTimeoutError::Timeout) => None,
      Err(RecvTimeoutError::Disconnected) => Some(Err(DetectError::WorkerLost)),
    }
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::Release);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }
}

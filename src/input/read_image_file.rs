// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/input/read_image_file.rs - 图像文件/目录输入
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

use std::{collections::VecDeque, path::PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_path};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

fn load_rgb_image(path: &std::path::Path) -> Result<RgbImage, ImageFileInputError> {
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  Ok(image.into_rgb8())
}

/// 单张图像输入: `image:///path/to/photo.jpg`
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url_path(url);
    let image = load_rgb_image(&path)?;
    info!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(ImageFileInput { image: Some(image) })
  }
}

impl From<RgbImage> for ImageFileInput {
  fn from(image: RgbImage) -> Self {
    ImageFileInput { image: Some(image) }
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

/// 目录输入: `folder:///path/to/photos`，按文件名顺序逐张读取
pub struct ImageDirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let directory = url_path(url);
    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    files.sort();
    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());

    Ok(ImageDirectoryInput {
      pending: files.into(),
    })
  }
}

impl ImageDirectoryInput {
  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      match load_rgb_image(&path) {
        Ok(image) => {
          info!("读取图像: {}", path.display());
          return Some(image);
        }
        Err(e) => warn!("跳过无法读取的图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lettuce-see-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn single_image_is_yielded_once() {
    let mut input = ImageFileInput::from(RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])));
    assert!(input.next().is_some());
    assert!(input.next().is_none());
  }

  #[test]
  fn reads_image_file_url() {
    let dir = scratch_dir("file");
    let path = dir.join("leaf.png");
    RgbImage::from_pixel(7, 5, Rgb([0, 200, 0])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let image = input.next().unwrap();
    assert_eq!(image.dimensions(), (7, 5));
  }

  #[test]
  fn directory_skips_non_images_and_sorts() {
    let dir = scratch_dir("dir");
    RgbImage::new(2, 2).save(dir.join("b.png")).unwrap();
    RgbImage::new(3, 3).save(dir.join("a.png")).unwrap();
    std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    std::fs::write(dir.join("broken.png"), "garbage").unwrap();

    let url = Url::parse(&format!("folder://{}", dir.display())).unwrap();
    let input = ImageDirectoryInput::from_url(&url).unwrap();
    assert_eq!(input.remaining(), 3);
    let sizes: Vec<(u32, u32)> = input.map(|image| image.dimensions()).collect();
    assert_eq!(sizes, vec![(3, 3), (2, 2)]);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}

// 该文件是 LettuceSee （生菜慧眼） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::{
  model::{DetectResult, Detection},
  output::label_text,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  box_thickness: i32,
  font: Option<FontVec>,
}

impl Default for Draw {
  /// 无字体时只绘制边框
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      box_thickness: BOX_THICKNESS,
      font: None,
    }
  }
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    info!("加载标签字体: {}", path.display());
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)?;
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn draw_detection(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut image = image.clone();
    self.draw_detections_on_image(&mut image, result);
    image
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for detection in result.iter() {
      self.draw_bbox_with_label(image, detection);
    }
  }

  // bbox 为原图像素坐标 [left, top, right, bottom]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    let (w, h) = (image.width() as i32, image.height() as i32);
    let color = Rgb(detection.color.0);

    let x_min = (detection.bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (detection.bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (detection.bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (detection.bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..self.box_thickness {
      let (left, top, right, bottom) = (x_min + t, y_min + t, x_max - t, y_max - t);
      if left >= right || top >= bottom {
        break;
      }
      let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = self.font.as_ref() else {
      return;
    };

    let label = label_text(detection);
    let text_width = (label.len() as f32 * self.label_char_width) as i32;

    // 标签放在边框上方，超出图像时贴边
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w - label_x).max(0) as u32;
    let label_height = self.label_text_height as u32;

    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }
}

/// 检测结果记录格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  /// 每行 `name, score, left, top, right, bottom`
  Name,
  /// 每行 `id, score, left, top, right, bottom`
  Id,
  /// 完整 JSON
  Json,
}

pub struct Record {
  pub format: RecordFormat,
}

impl Record {
  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    match self.format {
      RecordFormat::Json => {
        let json = serde_json::to_string_pretty(result)?;
        std::fs::write(path.with_extension("json"), json)
      }
      RecordFormat::Name | RecordFormat::Id => {
        let records: Vec<String> = result
          .iter()
          .map(|item| {
            let name = match self.format {
              RecordFormat::Name => item.class_name.clone(),
              _ => item.class_id.to_string(),
            };
            format!(
              "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
              name, item.confidence, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
            )
          })
          .collect();
        std::fs::write(path.with_extension("txt"), records.join("\n"))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Color;

  fn weed(bbox: [f32; 4]) -> Detection {
    Detection {
      bbox,
      confidence: 0.5,
      class_id: 2,
      class_name: "weed".to_string(),
      color: Color::YELLOW,
    }
  }

  #[test]
  fn draws_box_edges_in_class_color() {
    let image = RgbImage::new(40, 30);
    let result = DetectResult::from(vec![weed([5.0, 5.0, 20.0, 15.0])]);
    let drawn = Draw::default().draw_detection(&image, &result);

    assert_eq!(drawn.get_pixel(5, 10), &Rgb([255, 255, 0]));
    assert_eq!(drawn.get_pixel(6, 10), &Rgb([255, 255, 0]));
    assert_eq!(drawn.get_pixel(12, 10), &Rgb([0, 0, 0]));
    assert_eq!(drawn.get_pixel(20, 15), &Rgb([255, 255, 0]));
  }

  #[test]
  fn out_of_bounds_boxes_are_clamped() {
    let mut image = RgbImage::new(10, 10);
    let result = DetectResult::from(vec![
      weed([-50.0, -50.0, 500.0, 500.0]),
      weed([30.0, 30.0, 40.0, 40.0]),
    ]);
    Draw::default().draw_detections_on_image(&mut image, &result);
    assert_eq!(image.get_pixel(0, 0), &Rgb([255, 255, 0]));
    assert_eq!(image.get_pixel(9, 9), &Rgb([255, 255, 0]));
  }

  #[test]
  fn writes_text_and_json_records() {
    let dir = std::env::temp_dir().join(format!("lettuce-see-record-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let base = dir.join("frame.png");
    let result = DetectResult::from(vec![weed([1.0, 2.0, 3.0, 4.0])]);

    Record {
      format: RecordFormat::Id,
    }
    .record(&result, &base)
    .unwrap();
    let text = std::fs::read_to_string(dir.join("frame.txt")).unwrap();
    assert_eq!(text, "2, 0.5000, 1.0, 2.0, 3.0, 4.0");

    Record {
      format: RecordFormat::Json,
    }
    .record(&result, &base)
    .unwrap();
    let json: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(dir.join("frame.json")).unwrap()).unwrap();
    assert_eq!(json["items"][0]["class_name"], "weed");
    assert_eq!(json["items"][0]["color"], serde_json::json!([255, 255, 0]));
  }
}

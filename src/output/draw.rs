// 该文件是 Fenlei （分类） 项目的一部分。
// src/output/draw.rs - 分类结果可视化
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
  drawing::{draw_filled_rect_mut, draw_text_mut},
  rect::Rect,
};

use crate::{frame::Frame, model::Classification};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: u32 = 24;
const LABEL_TEXT_PADDING: i32 = 2;
const LABEL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const BANNER_COLOR: [u8; 3] = [32, 32, 32];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl ToRgbImage for Frame {
  fn to_rgb_image(&self) -> RgbImage {
    self.image().to_rgb8()
  }
}

/// 在图像顶部绘制置信度条与标签文字
///
/// 未提供字体时只绘制置信度条。
pub struct Draw {
  font_size: f32,
  label_text_height: u32,
  label_text_padding: i32,
  label_color: [u8; 3],
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_text_padding: LABEL_TEXT_PADDING,
      label_color: LABEL_COLOR,
      font: None,
    }
  }
}

impl Draw {
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, String> {
    let path = path.as_ref();
    let data =
      std::fs::read(path).map_err(|e| format!("无法读取字体文件 {}: {}", path.display(), e))?;
    let font = FontVec::try_from_vec(data)
      .map_err(|e| format!("无法加载字体文件 {}: {}", path.display(), e))?;
    self.font = Some(font);
    Ok(self)
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn draw_classification(&self, image: &mut RgbImage, result: &Classification) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return;
    }

    let banner_height = self.label_text_height.min(height);
    draw_filled_rect_mut(
      image,
      Rect::at(0, 0).of_size(width, banner_height),
      Rgb(BANNER_COLOR),
    );

    let bar_width = (result.score.clamp(0.0, 1.0) * width as f32).round() as u32;
    if bar_width > 0 {
      draw_filled_rect_mut(
        image,
        Rect::at(0, 0).of_size(bar_width, banner_height),
        Rgb(self.label_color),
      );
    }

    if let Some(font) = &self.font {
      let label = if result.is_empty() {
        "未能分类".to_string()
      } else {
        format!("{} {:.2}%", result.label, result.score * 100.0)
      };
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        self.label_text_padding,
        self.label_text_padding,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }

  pub fn draw_on_frame(&self, frame: &Frame, result: &Classification) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_classification(&mut image, result);
    image
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::DynamicImage;

  fn result(score: f32) -> Classification {
    Classification {
      label: "cat".to_string(),
      score,
    }
  }

  #[test]
  fn confidence_bar_scales_with_score() {
    let frame = Frame::from(DynamicImage::ImageRgb8(RgbImage::from_pixel(
      100,
      50,
      Rgb([0, 255, 0]),
    )));
    let image = Draw::default().draw_on_frame(&frame, &result(0.5));

    assert_eq!(image.get_pixel(10, 5), &Rgb(LABEL_COLOR));
    assert_eq!(image.get_pixel(60, 5), &Rgb(BANNER_COLOR));
    assert_eq!(image.get_pixel(60, 40), &Rgb([0, 255, 0]));
  }

  #[test]
  fn small_images_are_not_overrun() {
    let mut image = RgbImage::new(3, 2);
    Draw::default().draw_classification(&mut image, &result(1.0));
    assert!(image.pixels().all(|p| *p == Rgb(LABEL_COLOR)));
  }

  #[test]
  fn missing_font_file_is_reported() {
    assert!(!Draw::default().has_font());
    assert!(Draw::default().with_font_file("/nonexistent/font.ttf").is_err());
  }

  #[test]
  fn empty_result_draws_no_bar() {
    let mut image = RgbImage::from_pixel(20, 30, Rgb([0, 255, 0]));
    let empty = Classification {
      label: String::new(),
      score: -1.0,
    };
    Draw::default().draw_classification(&mut image, &empty);
    assert_eq!(image.get_pixel(0, 0), &Rgb(BANNER_COLOR));
    assert_eq!(image.get_pixel(0, 29), &Rgb([0, 255, 0]));
  }
}

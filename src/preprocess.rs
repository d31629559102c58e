// 该文件是 Fenlei （分类） 项目的一部分。
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

//! 将任意格式、任意尺寸的图像转换为模型输入张量。
//!
//! 处理顺序: RGBA8 → (可选) 居中正方形裁剪 → 最近邻缩放 → (可选) 逆时针旋转 → 归一化写入张量。

use image::{
  DynamicImage, Pixel, RgbaImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::debug;

use crate::tensor::{ImageTensor, TensorData};

const PIXEL_MAX: f32 = 255.0;
const QUARTER_TURN: i32 = 90;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("方向必须是 90 的倍数, 实际为 {0}")]
  InvalidOrientation(i32),
  #[error("图像尺寸为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("图像尺寸与张量不匹配: 图像 {0:?}, 张量 {1:?}")]
  SizeMismatch((u32, u32), (usize, usize)),
}

/// 预处理开关
///
/// `crop` 控制是否先裁剪为正方形，`rotate` 控制是否按方向旋转。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessConfig {
  pub crop: bool,
  pub rotate: bool,
}

impl PreprocessConfig {
  /// 裁剪并旋转
  pub const MODEL: Self = Self {
    crop: true,
    rotate: true,
  };

  /// 直接缩放
  pub const SUPPORT: Self = Self {
    crop: false,
    rotate: false,
  };
}

impl Default for PreprocessConfig {
  fn default() -> Self {
    Self::MODEL
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
  config: PreprocessConfig,
}

impl From<PreprocessConfig> for Preprocessor {
  fn from(config: PreprocessConfig) -> Self {
    Self { config }
  }
}

impl Preprocessor {
  pub fn config(&self) -> &PreprocessConfig {
    &self.config
  }

  /// 处理图像并写入复用的张量
  pub fn run(
    &self,
    image: &DynamicImage,
    orientation: i32,
    tensor: &mut ImageTensor,
  ) -> Result<(), PreprocessError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(PreprocessError::EmptyImage(image.width(), image.height()));
    }

    let turns = if self.config.rotate {
      quarter_turns(orientation)?
    } else {
      if orientation != 0 {
        debug!("未启用旋转, 忽略方向 {}", orientation);
      }
      0
    };

    let mut rgba = to_rgba(image);

    if self.config.crop {
      rgba = center_crop_square(&rgba);
    }

    let shape = *tensor.shape();
    let (target_w, target_h) = if turns % 2 == 1 {
      (shape.height as u32, shape.width as u32)
    } else {
      (shape.width as u32, shape.height as u32)
    };
    let resized = resize_nearest(rgba, target_w, target_h);
    let rotated = rotate_ccw(resized, turns);

    debug!(
      "预处理: {}x{} -> {}x{}, 旋转 {} 次",
      image.width(),
      image.height(),
      rotated.width(),
      rotated.height(),
      turns
    );

    fill_tensor(&rotated, tensor)
  }
}

/// 方向转换为逆时针四分之一圈数
pub fn quarter_turns(orientation: i32) -> Result<u32, PreprocessError> {
  if orientation % QUARTER_TURN != 0 {
    return Err(PreprocessError::InvalidOrientation(orientation));
  }
  Ok((orientation / QUARTER_TURN).rem_euclid(4) as u32)
}

pub fn to_rgba(image: &DynamicImage) -> RgbaImage {
  match image {
    DynamicImage::ImageRgba8(rgba) => rgba.clone(),
    other => other.to_rgba8(),
  }
}

/// 以短边为边长居中裁剪
pub fn center_crop_square(image: &RgbaImage) -> RgbaImage {
  let (width, height) = image.dimensions();
  let size = width.min(height);
  if width == height {
    return image.clone();
  }
  let x = (width - size) / 2;
  let y = (height - size) / 2;
  imageops::crop_imm(image, x, y, size, size).to_image()
}

pub fn resize_nearest(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
  if image.dimensions() == (width, height) {
    return image;
  }
  imageops::resize(&image, width, height, FilterType::Nearest)
}

/// 逆时针旋转 `turns` 个 90 度
pub fn rotate_ccw(image: RgbaImage, turns: u32) -> RgbaImage {
  match turns % 4 {
    1 => imageops::rotate270(&image),
    2 => imageops::rotate180(&image),
    3 => imageops::rotate90(&image),
    _ => image,
  }
}

/// 按张量布局与类型写入像素，浮点输入线性缩放到 [0, 1]
pub fn fill_tensor(image: &RgbaImage, tensor: &mut ImageTensor) -> Result<(), PreprocessError> {
  let shape = *tensor.shape();
  if image.dimensions() != (shape.width as u32, shape.height as u32) {
    return Err(PreprocessError::SizeMismatch(
      image.dimensions(),
      (shape.width, shape.height),
    ));
  }

  let mut write = |index: usize, value: u8| match tensor.data_mut() {
    TensorData::F32(data) => data[index] = value as f32 / PIXEL_MAX,
    TensorData::U8(data) => data[index] = value,
  };

  for (x, y, pixel) in image.enumerate_pixels() {
    let (x, y) = (x as usize, y as usize);
    if shape.channels == 1 {
      write(shape.index(x, y, 0), pixel.to_luma()[0]);
    } else {
      for c in 0..shape.channels {
        write(shape.index(x, y, c), pixel[c]);
      }
    }
  }

  Ok(())
}

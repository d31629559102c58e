// 该文件是 Fenlei （分类） 项目的一部分。
// src/frame.rs - 输入帧定义
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

use std::path::{Path, PathBuf};

use image::DynamicImage;

/// 已解码的图像及其方向信息
///
/// 像素格式与尺寸任意，预处理阶段负责转换为模型需要的布局。
#[derive(Debug, Clone)]
pub struct Frame {
  image: DynamicImage,
  orientation: i32,
  source: Option<PathBuf>,
}

impl From<DynamicImage> for Frame {
  fn from(image: DynamicImage) -> Self {
    Self {
      image,
      orientation: 0,
      source: None,
    }
  }
}

impl Frame {
  /// 方向，单位为度，应为 90 的倍数
  pub fn with_orientation(mut self, orientation: i32) -> Self {
    self.orientation = orientation;
    self
  }

  pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
    self.source = Some(source.into());
    self
  }

  pub fn image(&self) -> &DynamicImage {
    &self.image
  }

  pub fn orientation(&self) -> i32 {
    self.orientation
  }

  pub fn source(&self) -> Option<&Path> {
    self.source.as_deref()
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

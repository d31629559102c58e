// 该文件是 Fenlei （分类） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{DynamicImage, ImageReader};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, query_value};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}, {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("Image loading error: {0}, {1}")]
  ImageLoadError(PathBuf, image::ImageError),
  #[error("Invalid orientation: {0}")]
  InvalidOrientation(String),
}

/// 打开并解码图像文件，格式按内容推断
pub(crate) fn decode_image(path: &Path) -> Result<DynamicImage, ImageFileInputError> {
  let reader = ImageReader::open(path)
    .and_then(ImageReader::with_guessed_format)
    .map_err(|e| ImageFileInputError::IoError(path.to_path_buf(), e))?;
  let image = reader
    .decode()
    .map_err(|e| ImageFileInputError::ImageLoadError(path.to_path_buf(), e))?;
  debug!(
    "解码图像 {}: {}x{} {:?}",
    path.display(),
    image.width(),
    image.height(),
    image.color()
  );
  Ok(image)
}

/// 读取 `orientation` 查询参数，缺省为 0
pub(crate) fn orientation_from_url(url: &Url) -> Result<i32, ImageFileInputError> {
  match query_value(url, "orientation") {
    Some(value) => value
      .parse()
      .map_err(|_| ImageFileInputError::InvalidOrientation(value)),
    None => Ok(0),
  }
}

/// 单张图像输入，构造时即完成解码
pub struct ImageFileInput {
  frame: Option<Frame>,
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

    let orientation = orientation_from_url(url)?;
    let path = Path::new(url.path());
    let image = decode_image(path)?;

    Ok(ImageFileInput {
      frame: Some(
        Frame::from(image)
          .with_orientation(orientation)
          .with_source(path),
      ),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take().map(Ok)
  }
}

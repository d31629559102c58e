// 该文件是 Fenlei （分类） 项目的一部分。
// src/input/image_directory.rs - 图像目录输入
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

use image::ImageFormat;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::read_image_file::{ImageFileInputError, decode_image, orientation_from_url},
};

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Directory read error: {0}, {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("{0}")]
  ImageFileInputError(#[from] ImageFileInputError),
}

/// 按文件名顺序逐张读取目录下的图像
///
/// 单张图像解码失败时产出 `Err`，不影响后续文件。
pub struct ImageDirectoryInput {
  files: std::vec::IntoIter<PathBuf>,
  orientation: i32,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageDirectoryInputError::SchemeMismatch);
    }

    let orientation = orientation_from_url(url)?;
    let files = list_images(Path::new(url.path()))?;
    info!("目录 {} 中共有 {} 张图像", url.path(), files.len());

    Ok(ImageDirectoryInput {
      files: files.into_iter(),
      orientation,
    })
  }
}

fn list_images(directory: &Path) -> Result<Vec<PathBuf>, ImageDirectoryInputError> {
  let io_error = |e| ImageDirectoryInputError::IoError(directory.to_path_buf(), e);

  let mut files = Vec::new();
  for entry in std::fs::read_dir(directory).map_err(io_error)? {
    let path = entry.map_err(io_error)?.path();
    if path.is_file() && ImageFormat::from_path(&path).is_ok() {
      files.push(path);
    }
  }
  files.sort();
  Ok(files)
}

impl Iterator for ImageDirectoryInput {
  type Item = Result<Frame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    Some(decode_image(&path).map(|image| {
      Frame::from(image)
        .with_orientation(self.orientation)
        .with_source(path)
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn lists_images_in_name_order_and_reports_broken_ones() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]))
      .save(dir.path().join("b.png"))
      .unwrap();
    RgbImage::from_pixel(3, 3, Rgb([0, 0, 0]))
      .save(dir.path().join("a.png"))
      .unwrap();
    std::fs::write(dir.path().join("c.png"), b"broken").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

    let url = Url::parse(&format!("folder://{}?orientation=180", dir.path().display())).unwrap();
    let results: Vec<_> = ImageDirectoryInput::from_url(&url).unwrap().collect();

    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.width(), 3);
    assert_eq!(first.orientation(), 180);
    assert_eq!(results[1].as_ref().unwrap().width(), 2);
    assert!(matches!(
      results[2],
      Err(ImageFileInputError::ImageLoadError(_, _))
    ));
  }

  #[test]
  fn missing_directory_is_io_error() {
    let url = Url::parse("folder:///nonexistent/fenlei/photos").unwrap();
    assert!(matches!(
      ImageDirectoryInput::from_url(&url),
      Err(ImageDirectoryInputError::IoError(_, _))
    ));
  }
}

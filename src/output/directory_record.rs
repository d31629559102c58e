// 该文件是 Fenlei （分类） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme, frame::Frame, model::Classification, output::Render, query_flag,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 按日期分目录保存分类记录
///
/// 每条记录为一个 JSON 文件，`image` 参数打开时同时保存输入图像。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU16,
  save_image: bool,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counter: AtomicU16::new(0),
      save_image: query_flag(uri, "image").unwrap_or(false),
      always: query_flag(uri, "always").unwrap_or(false),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn record_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

pub fn record_json(frame: &Frame, result: &Classification, now: &DateTime<Utc>) -> serde_json::Value {
  json!({
    "timestamp": now.to_rfc3339(),
    "source": frame.source().map(|p| p.display().to_string()),
    "width": frame.width(),
    "height": frame.height(),
    "orientation": frame.orientation(),
    "label": result.label,
    "score": result.score,
  })
}

impl Render<Frame, Classification> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &Classification) -> Result<(), Self::Error> {
    if result.is_empty() && !self.always {
      debug!("没有有效分类, 跳过记录");
      return Ok(());
    }

    let now = Utc::now();
    let path = self.record_path(&now)?;
    let record = record_json(frame, result, &now);
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;

    if self.save_image {
      frame.image().to_rgb8().save(path.with_extension("png"))?;
    }

    info!("记录分类结果: {}", path.display());
    Ok(())
  }
}

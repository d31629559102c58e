// 该文件是 Fenlei （分类） 项目的一部分。
// src/label.rs - 类别标签
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

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取错误: {0}, 错误: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("标签文件为空: {0}")]
  Empty(PathBuf),
}

/// 按模型输出下标排列的类别名称，加载后只读
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
  names: Box<[String]>,
}

impl Labels {
  /// 读取标签文件，每行一个类别，行序即下标
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text =
      std::fs::read_to_string(path).map_err(|e| LabelError::IoError(path.to_path_buf(), e))?;

    let labels = Self::parse(&text);
    if labels.is_empty() {
      return Err(LabelError::Empty(path.to_path_buf()));
    }

    debug!("标签数量: {}", labels.len());
    Ok(labels)
  }

  /// 空行被跳过
  pub fn parse(text: &str) -> Self {
    text
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(str::to_string)
      .collect()
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for Labels {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}

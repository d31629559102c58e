// 该文件是 Fenlei （分类） 项目的一部分。
// src/output/console.rs - 终端输出
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

use std::io::Write;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::Frame, model::Classification, output::Render,
};

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 将分类结果打印到标准输出
pub struct ConsoleOutput;

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConsoleOutputError::SchemeMismatch);
    }
    Ok(ConsoleOutput)
  }
}

/// 结果文本，与界面显示一致
pub fn format_result(frame: &Frame, result: &Classification) -> String {
  let text = if result.is_empty() {
    "未能分类".to_string()
  } else {
    format!(
      "分类: {}\n置信度: {:.2}%",
      result.label,
      result.score * 100.0
    )
  };
  match frame.source() {
    Some(source) => format!("[{}]\n{}", source.display(), text),
    None => text,
  }
}

impl Render<Frame, Classification> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(&self, frame: &Frame, result: &Classification) -> Result<(), Self::Error> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", format_result(frame, result))?;
    Ok(())
  }
}

// 该文件是 Fenlei （分类） 项目的一部分。
// src/model/runtime.rs - 推理运行时接口
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

use thiserror::Error;

use crate::tensor::{ImageTensor, OutputBuffer, TensorSpec};

#[derive(Error, Debug)]
pub enum RuntimeError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("输出大小不匹配: 期望 {expected}, 实际 {actual}")]
  OutputSizeMismatch { expected: usize, actual: usize },
  #[cfg(feature = "model_tflite")]
  #[error("TFLite 运行时错误: {0}")]
  Tract(anyhow::Error),
}

impl From<std::io::Error> for RuntimeError {
  fn from(err: std::io::Error) -> Self {
    RuntimeError::ModelLoadError(err)
  }
}

#[cfg(feature = "model_tflite")]
impl From<anyhow::Error> for RuntimeError {
  fn from(err: anyhow::Error) -> Self {
    RuntimeError::Tract(err)
  }
}

/// 已加载的模型与执行引擎
///
/// 单输入单输出，同步执行；资源随值的析构释放。
pub trait Runtime {
  fn input_spec(&self) -> &TensorSpec;
  fn output_spec(&self) -> &TensorSpec;

  /// 执行一次前向推理，结果写入 `output`
  fn run(&mut self, input: &ImageTensor, output: &mut OutputBuffer) -> Result<(), RuntimeError>;
}

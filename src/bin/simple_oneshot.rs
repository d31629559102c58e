// 该文件是 Fenlei （分类） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像分类
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

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use fenlei::{
  FromUrl,
  input::InputWrapper,
  model::ClassifierBuilder,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Fenlei 单张图像分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，如 tflite:///assets/mobilenet_imagenet_model.tflite?labels=/assets/labels.txt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，如 image:///photos/cat.jpg?orientation=90
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出方式，如 console: 或 image:///out/cat.png
  #[arg(long, value_name = "OUTPUT", default_value = "console:")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input).context("无法打开输入")?;
  let model = ClassifierBuilder::from_url(&args.model)?
    .build()
    .context("无法初始化分类器")?;
  let output = OutputWrapper::from_url(&args.output).context("无法创建输出")?;

  OneShotTask.run_task(input, model, output)?;

  Ok(())
}

// 该文件是 Fenlei （分类） 项目的一部分。
// src/task.rs - 推理任务
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

use std::{thread, time::Duration};
use tracing::{error, info, warn};

use crate::{model::Model, output::Render};

const REPEAT_TIMES: usize = 1000;
const WARMUP_TIMES: usize = 2;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 只处理第一张图像
pub struct OneShotTask;

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))??;
    info!("输入图像获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一张图像重复推理，统计平均耗时
pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat_times: REPEAT_TIMES,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times.max(1);
    self
  }
}

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))??;
    info!("输入图像获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat_times);
    for i in 0..self.repeat_times {
      let now = std::time::Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      if i + 1 == self.repeat_times {
        output.render_result(&frame, &result)?;
      }
      times.push(elapsed);
    }

    // 跳过预热的前几次
    let measured = if times.len() > WARMUP_TIMES {
      &times[WARMUP_TIMES..]
    } else {
      &times[..]
    };
    warn!(
      "平均推理时间: {:.2?}",
      measured.iter().sum::<Duration>() / measured.len() as u32
    );

    Ok(())
  }
}

/// 逐张处理输入，直到输入耗尽、达到指定数量或收到中断信号
///
/// 无法解码的图像记录错误后跳过。
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      handle_interrupt: true,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 是否安装 Ctrl-C 处理器，每个进程只能安装一次
  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    if self.handle_interrupt {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    }

    let mut frame_index = 0usize;
    let mut skipped = 0usize;
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          error!("第 {} 张图像读取失败, 跳过: {}", frame_index, e);
          skipped += 1;
          continue;
        }
      };

      info!("处理第 {} 张图像", frame_index);
      let now = std::time::Instant::now();
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定数量 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共 {} 张, 跳过 {} 张", frame_index, skipped);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("{0}")]
  struct TestError(String);

  struct EchoModel;

  impl Model for EchoModel {
    type Input = u32;
    type Output = u32;
    type Error = TestError;

    fn infer(&mut self, input: &u32) -> Result<u32, TestError> {
      if *input == 0 {
        return Err(TestError("zero".to_string()));
      }
      Ok(input * 10)
    }
  }

  #[derive(Default)]
  struct Collect {
    seen: RefCell<Vec<(u32, u32)>>,
  }

  impl Render<u32, u32> for &Collect {
    type Error = TestError;

    fn render_result(&self, frame: &u32, result: &u32) -> Result<(), TestError> {
      self.seen.borrow_mut().push((*frame, *result));
      Ok(())
    }
  }

  fn frames(items: Vec<Result<u32, TestError>>) -> std::vec::IntoIter<Result<u32, TestError>> {
    items.into_iter()
  }

  #[test]
  fn one_shot_renders_first_frame() {
    let output = Collect::default();
    OneShotTask
      .run_task(frames(vec![Ok(3), Ok(4)]), EchoModel, &output)
      .unwrap();
    assert_eq!(*output.seen.borrow(), vec![(3, 30)]);
  }

  #[test]
  fn one_shot_propagates_read_and_infer_errors() {
    let output = Collect::default();
    let err = OneShotTask.run_task(
      frames(vec![Err(TestError("decode".to_string()))]),
      EchoModel,
      &output,
    );
    assert!(err.is_err());

    let err = OneShotTask.run_task(frames(vec![Ok(0)]), EchoModel, &output);
    assert!(err.is_err());

    let err = OneShotTask.run_task(frames(vec![]), EchoModel, &output);
    assert!(err.is_err());
    assert!(output.seen.borrow().is_empty());
  }

  #[test]
  fn repeat_shot_renders_last_result_once() {
    let output = Collect::default();
    RepeatShotTask::default()
      .with_repeat_times(5)
      .run_task(frames(vec![Ok(2)]), EchoModel, &output)
      .unwrap();
    assert_eq!(*output.seen.borrow(), vec![(2, 20)]);
  }

  #[test]
  fn continuous_skips_unreadable_frames() {
    let output = Collect::default();
    ContinuousTask::default()
      .with_interrupt(false)
      .run_task(
        frames(vec![Ok(1), Err(TestError("decode".to_string())), Ok(2)]),
        EchoModel,
        &output,
      )
      .unwrap();
    assert_eq!(*output.seen.borrow(), vec![(1, 10), (2, 20)]);
  }

  #[test]
  fn continuous_stops_at_frame_number() {
    let output = Collect::default();
    ContinuousTask::default()
      .with_interrupt(false)
      .with_frame_number(Some(2))
      .run_task(
        frames(vec![Ok(1), Ok(2), Ok(3)]),
        EchoModel,
        &output,
      )
      .unwrap();
    assert_eq!(output.seen.borrow().len(), 2);
  }
}

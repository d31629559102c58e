// 该文件是 Fenlei （分类） 项目的一部分。
// src/model.rs - 模型
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

use std::fmt;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 分类结果: 最高分的类别及其置信度
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  pub label: String,
  pub score: f32,
}

impl Classification {
  /// 没有任何分数超过哨兵值时为 true
  pub fn is_empty(&self) -> bool {
    self.label.is_empty()
  }
}

impl fmt::Display for Classification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {:.2}%", self.label, self.score * 100.0)
  }
}

const ARGMAX_SENTINEL: f32 = -1.0;

/// 取分数严格最大的类别，并列时保留最先出现的
///
/// 初始值为 `("", -1.0)`，全部为负分时原样返回该值。
pub fn argmax<'a, I>(scores: I) -> Classification
where
  I: IntoIterator<Item = (&'a str, f32)>,
{
  let mut best_label = "";
  let mut best_score = ARGMAX_SENTINEL;

  for (label, score) in scores {
    if score > best_score {
      best_label = label;
      best_score = score;
    }
  }

  Classification {
    label: best_label.to_string(),
    score: best_score,
  }
}

mod runtime;
pub use self::runtime::{Runtime, RuntimeError};

#[cfg(feature = "model_tflite")]
mod tflite;
#[cfg(feature = "model_tflite")]
pub use self::tflite::TfliteRuntime;

mod classifier;
pub use self::classifier::{
  Classifier, ClassifierBuilder, ClassifierError, DEFAULT_LABEL_FILE, DEFAULT_MODEL_FILE,
  LoadError,
};

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  fn run(labels: &[&'static str], scores: &[f32]) -> Classification {
    argmax(labels.iter().copied().zip(scores.iter().copied()))
  }

  #[test]
  fn distinct_scores_pick_maximum() {
    let result = run(&["a", "b", "c", "d"], &[0.3, 0.05, 0.6, 0.05]);
    assert_eq!(result.label, "c");
    assert_relative_eq!(result.score, 0.6);
  }

  #[test]
  fn ties_keep_first_maximum() {
    let result = run(&["a", "b", "c"], &[0.2, 0.4, 0.4]);
    assert_eq!(result.label, "b");
  }

  #[test]
  fn all_zero_scores_pick_first_label() {
    let result = run(&["first", "second"], &[0.0, 0.0]);
    assert_eq!(result.label, "first");
    assert_eq!(result.score, 0.0);
  }

  #[test]
  fn negative_scores_return_sentinel() {
    let result = run(&["a", "b"], &[-3.0, -2.0]);
    assert!(result.is_empty());
    assert_eq!(result.score, -1.0);
  }

  #[test]
  fn display_formats_percentage() {
    let result = Classification {
      label: "dog".to_string(),
      score: 0.7,
    };
    assert_eq!(result.to_string(), "dog: 70.00%");
  }
}

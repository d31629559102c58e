// 该文件是 Fenlei （分类） 项目的一部分。
// src/model/tflite.rs - TFLite 推理运行时
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

use std::path::Path;

use tracing::{debug, error, info};
use tract_core::prelude::*;

use crate::{
  model::{Runtime, RuntimeError},
  tensor::{ElementType, ImageTensor, OutputBuffer, TensorData, TensorSpec},
};

const TFLITE_NUM_INPUTS: usize = 1;
const TFLITE_NUM_OUTPUTS: usize = 1;

pub struct TfliteRuntime {
  plan: TypedRunnableModel<TypedModel>,
  input_dt: DatumType,
  input_spec: TensorSpec,
  output_spec: TensorSpec,
}

impl std::fmt::Debug for TfliteRuntime {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TfliteRuntime")
      .field("input_dt", &self.input_dt)
      .field("input_spec", &self.input_spec)
      .field("output_spec", &self.output_spec)
      .finish()
  }
}

fn concrete_shape(fact: &TypedFact, what: &str) -> Result<Box<[usize]>, RuntimeError> {
  fact
    .shape
    .as_concrete()
    .map(|dims| dims.to_vec().into_boxed_slice())
    .ok_or_else(|| RuntimeError::ModelInvalid(format!("{}形状不是常量: {:?}", what, fact.shape)))
}

/// 将预处理结果转换为模型输入，字节输入按需标记为量化类型
fn input_tensor(input_dt: DatumType, input: &ImageTensor) -> Result<Tensor, RuntimeError> {
  let dims = input.shape().dims();
  let tensor = match input.data() {
    TensorData::F32(data) => Tensor::from_shape(&dims, &data[..])?,
    TensorData::U8(data) => {
      let tensor = Tensor::from_shape(&dims, &data[..])?;
      if input_dt.is_quantized() {
        tensor.cast_to_dt(input_dt)?.into_owned()
      } else {
        tensor
      }
    }
  };
  Ok(tensor)
}

/// 反量化模型输出并写入分数缓冲区
fn copy_scores(result: &Tensor, output: &mut OutputBuffer) -> Result<(), RuntimeError> {
  let scores = result.cast_to::<f32>()?;
  let scores = scores.as_slice::<f32>()?;

  if scores.len() != output.len() {
    return Err(RuntimeError::OutputSizeMismatch {
      expected: output.len(),
      actual: scores.len(),
    });
  }
  output.as_mut().copy_from_slice(scores);

  Ok(())
}

fn input_element_type(dt: DatumType) -> Result<ElementType, RuntimeError> {
  match dt.unquantized() {
    DatumType::F32 => Ok(ElementType::F32),
    DatumType::U8 => Ok(ElementType::U8),
    other => Err(RuntimeError::ModelInvalid(format!(
      "不支持的输入类型: {:?}",
      other
    ))),
  }
}

impl TfliteRuntime {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
    let path = path.as_ref();
    if !path.is_file() {
      error!("模型文件不存在: {}", path.display());
      return Err(RuntimeError::ModelNotFound(path.display().to_string()));
    }

    info!("加载模型文件: {}", path.display());
    let model_data = std::fs::read(path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let model = tract_tflite::tflite().model_for_read(&mut model_data.as_slice())?;

    let num_inputs = model.inputs.len();
    let num_outputs = model.outputs.len();
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    if num_inputs != TFLITE_NUM_INPUTS || num_outputs != TFLITE_NUM_OUTPUTS {
      error!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        TFLITE_NUM_INPUTS, TFLITE_NUM_OUTPUTS, num_inputs, num_outputs
      );
      return Err(RuntimeError::ModelInvalid(format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        TFLITE_NUM_INPUTS, TFLITE_NUM_OUTPUTS, num_inputs, num_outputs
      )));
    }

    let input_fact = model.input_fact(0)?;
    let input_dt = input_fact.datum_type;
    let input_spec = TensorSpec::new(
      concrete_shape(input_fact, "输入")?,
      input_element_type(input_dt)?,
    );

    // 量化输出在推理后反量化为 f32
    let output_fact = model.output_fact(0)?;
    let output_spec = TensorSpec::new(concrete_shape(output_fact, "输出")?, ElementType::F32);

    info!(
      "模型输入: {:?} {:?}, 输出: {:?} {:?}",
      input_spec.shape, input_dt, output_spec.shape, output_fact.datum_type
    );

    let plan = model.into_optimized()?.into_runnable()?;
    info!("模型加载完成");

    Ok(TfliteRuntime {
      plan,
      input_dt,
      input_spec,
      output_spec,
    })
  }
}

impl Runtime for TfliteRuntime {
  fn input_spec(&self) -> &TensorSpec {
    &self.input_spec
  }

  fn output_spec(&self) -> &TensorSpec {
    &self.output_spec
  }

  fn run(&mut self, input: &ImageTensor, output: &mut OutputBuffer) -> Result<(), RuntimeError> {
    debug!("设置模型输入");
    let tensor = input_tensor(self.input_dt, input)?;

    debug!("执行模型推理");
    let result = self.plan.run(tvec!(tensor.into()))?;

    debug!("获取模型输出");
    copy_scores(&result[0], output)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::{InputShape, TensorLayout};
  use approx::assert_relative_eq;

  fn image_tensor(dtype: ElementType) -> ImageTensor {
    let mut tensor = ImageTensor::new(InputShape {
      width: 2,
      height: 1,
      channels: 3,
      layout: TensorLayout::Nhwc,
      dtype,
    });
    match tensor.data_mut() {
      TensorData::F32(data) => data.copy_from_slice(&[0.0, 0.2, 0.4, 0.6, 0.8, 1.0]),
      TensorData::U8(data) => data.copy_from_slice(&[0, 51, 102, 153, 204, 255]),
    }
    tensor
  }

  fn qu8() -> DatumType {
    DatumType::QU8(QParams::ZpScale {
      zero_point: 0,
      scale: 1.0 / 255.0,
    })
  }

  #[test]
  fn float_input_keeps_values_and_shape() {
    let tensor = input_tensor(DatumType::F32, &image_tensor(ElementType::F32)).unwrap();
    assert_eq!(tensor.shape(), &[1, 1, 2, 3]);
    assert_eq!(tensor.datum_type(), DatumType::F32);
    assert_relative_eq!(tensor.as_slice::<f32>().unwrap()[1], 0.2);
  }

  #[test]
  fn byte_input_is_tagged_with_model_quantization() {
    let tensor = input_tensor(qu8(), &image_tensor(ElementType::U8)).unwrap();
    assert_eq!(tensor.datum_type(), qu8());
    assert_eq!(tensor.as_slice::<u8>().unwrap(), &[0, 51, 102, 153, 204, 255]);

    let tensor = input_tensor(DatumType::U8, &image_tensor(ElementType::U8)).unwrap();
    assert_eq!(tensor.datum_type(), DatumType::U8);
  }

  #[test]
  fn quantized_scores_are_dequantized() {
    let result = tensor1(&[255u8, 51]).cast_to_dt(qu8()).unwrap().into_owned();
    let mut output = OutputBuffer::new(2);
    copy_scores(&result, &mut output).unwrap();
    let scores: &[f32] = output.as_ref();
    assert_relative_eq!(scores[0], 1.0);
    assert_relative_eq!(scores[1], 0.2);
  }

  #[test]
  fn score_count_must_match_output() {
    let mut output = OutputBuffer::new(3);
    let err = copy_scores(&tensor1(&[0.5f32, 0.5]), &mut output).unwrap_err();
    assert!(matches!(
      err,
      RuntimeError::OutputSizeMismatch {
        expected: 3,
        actual: 2
      }
    ));

    let mut output = OutputBuffer::new(2);
    copy_scores(&tensor1(&[0.25f32, 0.75]), &mut output).unwrap();
    let scores: &[f32] = output.as_ref();
    assert_eq!(scores, &[0.25, 0.75]);
  }

  #[test]
  fn missing_model_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = TfliteRuntime::load(dir.path().join("missing.tflite")).unwrap_err();
    assert!(matches!(err, RuntimeError::ModelNotFound(_)));
  }

  #[test]
  fn only_float_and_byte_inputs_are_supported() {
    assert_eq!(input_element_type(DatumType::F32).unwrap(), ElementType::F32);
    assert_eq!(input_element_type(DatumType::U8).unwrap(), ElementType::U8);
    assert!(input_element_type(DatumType::I64).is_err());
  }
}

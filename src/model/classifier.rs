// 该文件是 Fenlei （分类） 项目的一部分。
// src/model/classifier.rs - 图像分类器
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

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  label::{LabelError, Labels},
  model::{Classification, Model, Runtime, RuntimeError, argmax},
  preprocess::{PreprocessConfig, PreprocessError, Preprocessor},
  query_flag, query_value,
  tensor::{ImageTensor, InputShape, OutputBuffer, TensorShapeError, TensorSpec},
};

#[cfg(feature = "model_tflite")]
use crate::model::TfliteRuntime;

pub const DEFAULT_MODEL_FILE: &str = "mobilenet_imagenet_model.tflite";
pub const DEFAULT_LABEL_FILE: &str = "labels.txt";

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型加载错误: {0}")]
  Runtime(RuntimeError),
  #[error("标签加载错误: {0}")]
  Labels(LabelError),
  #[error("模型输入形状无效: {0}")]
  InputShape(TensorShapeError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[error("初始化失败: {0}")]
  Load(#[from] LoadError),
  #[error("预处理失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(#[from] RuntimeError),
  #[error("分类器已关闭")]
  Closed,
}

/// 尚未初始化的分类器配置
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierBuilder {
  model_path: PathBuf,
  label_path: PathBuf,
  preprocess: PreprocessConfig,
}

impl FromUrlWithScheme for ClassifierBuilder {
  const SCHEME: &'static str = "tflite";
}

impl FromUrl for ClassifierBuilder {
  type Error = LoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LoadError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = Path::new(url.path());
    let mut builder = if url.path().ends_with('/') || path.is_dir() {
      ClassifierBuilder::from_asset_dir(path)
    } else {
      ClassifierBuilder::new(path)
    };

    if let Some(labels) = query_value(url, "labels") {
      builder = builder.labels(labels);
    }

    if let Some(variant) = query_value(url, "variant") {
      builder = builder.preprocess(match variant.as_str() {
        "model" => PreprocessConfig::MODEL,
        "support" => PreprocessConfig::SUPPORT,
        other => {
          return Err(LoadError::ModelPathError(format!(
            "未知的预处理方式: {}",
            other
          )));
        }
      });
    }

    if let Some(crop) = query_flag(url, "crop") {
      builder = builder.crop(crop);
    }
    if let Some(rotate) = query_flag(url, "rotate") {
      builder = builder.rotate(rotate);
    }

    Ok(builder)
  }
}

impl ClassifierBuilder {
  /// 标签文件默认与模型文件同目录
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    let model_path = model_path.into();
    let label_path = model_path.with_file_name(DEFAULT_LABEL_FILE);
    Self {
      model_path,
      label_path,
      preprocess: PreprocessConfig::default(),
    }
  }

  /// 从资源目录按默认文件名加载
  pub fn from_asset_dir(dir: impl AsRef<Path>) -> Self {
    let dir = dir.as_ref();
    Self {
      model_path: dir.join(DEFAULT_MODEL_FILE),
      label_path: dir.join(DEFAULT_LABEL_FILE),
      preprocess: PreprocessConfig::default(),
    }
  }

  pub fn labels(mut self, label_path: impl Into<PathBuf>) -> Self {
    self.label_path = label_path.into();
    self
  }

  pub fn preprocess(mut self, config: PreprocessConfig) -> Self {
    self.preprocess = config;
    self
  }

  pub fn crop(mut self, crop: bool) -> Self {
    self.preprocess.crop = crop;
    self
  }

  pub fn rotate(mut self, rotate: bool) -> Self {
    self.preprocess.rotate = rotate;
    self
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn label_path(&self) -> &Path {
    &self.label_path
  }

  /// 先加载模型，再加载标签
  #[cfg(feature = "model_tflite")]
  pub fn build(self) -> Result<Classifier<TfliteRuntime>, ClassifierError> {
    let runtime = TfliteRuntime::load(&self.model_path).map_err(LoadError::Runtime)?;
    let labels = Labels::load(&self.label_path).map_err(LoadError::Labels)?;
    Classifier::init(runtime, labels, self.preprocess)
  }
}

/// 持有推理资源与复用缓冲区的分类器
///
/// `finish` 之后运行时被释放，再次分类返回 [`ClassifierError::Closed`]。
pub struct Classifier<R: Runtime> {
  runtime: Option<R>,
  labels: Labels,
  preprocessor: Preprocessor,
  input_shape: InputShape,
  output_spec: TensorSpec,
  image_tensor: ImageTensor,
  output_buffer: OutputBuffer,
}

impl<R: Runtime> Classifier<R> {
  pub fn init(runtime: R, labels: Labels, config: PreprocessConfig) -> Result<Self, ClassifierError> {
    let input_shape = InputShape::try_from(runtime.input_spec()).map_err(LoadError::InputShape)?;
    let output_spec = runtime.output_spec().clone();

    if labels.len() != output_spec.len() {
      warn!(
        "标签数量 {} 与模型输出大小 {} 不一致",
        labels.len(),
        output_spec.len()
      );
    }

    debug!(
      "模型输入: {}x{}x{} {:?} {:?}",
      input_shape.width, input_shape.height, input_shape.channels, input_shape.layout, input_shape.dtype
    );
    let preprocessor = Preprocessor::from(config);
    info!("分类器初始化完成, 预处理配置: {:?}", preprocessor.config());

    Ok(Classifier {
      runtime: Some(runtime),
      labels,
      preprocessor,
      input_shape,
      image_tensor: ImageTensor::new(input_shape),
      output_buffer: OutputBuffer::new(output_spec.len()),
      output_spec,
    })
  }

  pub fn is_initialized(&self) -> bool {
    self.runtime.is_some()
  }

  /// 模型输入的 (宽, 高)，关闭后为 (0, 0)
  pub fn model_input_size(&self) -> (usize, usize) {
    if self.is_initialized() {
      (self.input_shape.width, self.input_shape.height)
    } else {
      (0, 0)
    }
  }

  pub fn input_shape(&self) -> &InputShape {
    &self.input_shape
  }

  pub fn output_spec(&self) -> &TensorSpec {
    &self.output_spec
  }

  pub fn labels(&self) -> &Labels {
    &self.labels
  }

  pub fn runtime(&self) -> Option<&R> {
    self.runtime.as_ref()
  }

  /// 最近一次推理的原始分数
  pub fn scores(&self) -> &[f32] {
    self.output_buffer.as_ref()
  }

  /// 预处理、推理并取最高分类别
  pub fn classify(
    &mut self,
    image: &DynamicImage,
    orientation: i32,
  ) -> Result<Classification, ClassifierError> {
    let runtime = self.runtime.as_mut().ok_or(ClassifierError::Closed)?;

    let now = std::time::Instant::now();
    self
      .preprocessor
      .run(image, orientation, &mut self.image_tensor)?;
    let preprocessed = now.elapsed();

    runtime.run(&self.image_tensor, &mut self.output_buffer)?;
    let inferred = now.elapsed();

    let result = argmax(
      self
        .labels
        .iter()
        .zip(self.output_buffer.as_ref().iter().copied()),
    );
    debug!(
      "分类完成: {}, 预处理 {:.2?}, 推理 {:.2?}",
      result,
      preprocessed,
      inferred - preprocessed
    );

    Ok(result)
  }

  /// 释放推理资源，可重复调用
  pub fn finish(&mut self) {
    if let Some(runtime) = self.runtime.take() {
      drop(runtime);
      info!("推理资源已释放");
    }
  }
}

impl<R: Runtime> Model for Classifier<R> {
  type Input = Frame;
  type Output = Classification;
  type Error = ClassifierError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.classify(input.image(), input.orientation())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::ElementType;
  use approx::assert_relative_eq;
  use image::{Rgb, RgbImage};

  struct FixedRuntime {
    input: TensorSpec,
    output: TensorSpec,
    scores: Vec<f32>,
    last_input: Vec<f32>,
  }

  impl FixedRuntime {
    fn new(size: usize, scores: Vec<f32>) -> Self {
      Self {
        input: TensorSpec::new(vec![1, size, size, 3], ElementType::F32),
        output: TensorSpec::new(vec![1, scores.len()], ElementType::F32),
        scores,
        last_input: Vec::new(),
      }
    }
  }

  impl Runtime for FixedRuntime {
    fn input_spec(&self) -> &TensorSpec {
      &self.input
    }

    fn output_spec(&self) -> &TensorSpec {
      &self.output
    }

    fn run(&mut self, input: &ImageTensor, output: &mut OutputBuffer) -> Result<(), RuntimeError> {
      self.last_input = input.as_f32().map(<[f32]>::to_vec).unwrap_or_default();
      output.as_mut().copy_from_slice(&self.scores);
      Ok(())
    }
  }

  fn photo() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([255, 0, 51])))
  }

  fn animals() -> Labels {
    ["cat", "dog", "fish"].into_iter().collect()
  }

  #[test]
  fn classify_returns_top_label() {
    let runtime = FixedRuntime::new(8, vec![0.1, 0.7, 0.2]);
    let mut classifier = Classifier::init(runtime, animals(), PreprocessConfig::MODEL).unwrap();

    let result = classifier.classify(&photo(), 0).unwrap();
    assert_eq!(result.label, "dog");
    assert_relative_eq!(result.score, 0.7);
    assert_eq!(classifier.scores(), &[0.1, 0.7, 0.2]);
  }

  #[test]
  fn runtime_receives_normalized_tensor() {
    let runtime = FixedRuntime::new(4, vec![0.5, 0.25, 0.25]);
    let mut classifier = Classifier::init(runtime, animals(), PreprocessConfig::SUPPORT).unwrap();
    classifier.classify(&photo(), 0).unwrap();

    let input = &classifier.runtime().unwrap().last_input;
    assert_eq!(input.len(), 4 * 4 * 3);
    for pixel in input.chunks(3) {
      assert_relative_eq!(pixel[0], 1.0);
      assert_relative_eq!(pixel[1], 0.0);
      assert_relative_eq!(pixel[2], 0.2);
    }
  }

  #[test]
  fn infer_uses_frame_orientation() {
    let runtime = FixedRuntime::new(4, vec![0.1, 0.7, 0.2]);
    let mut classifier = Classifier::init(runtime, animals(), PreprocessConfig::MODEL).unwrap();

    let frame = Frame::from(photo()).with_orientation(270);
    assert_eq!(classifier.infer(&frame).unwrap().label, "dog");

    let frame = Frame::from(photo()).with_orientation(30);
    assert!(matches!(
      classifier.infer(&frame),
      Err(ClassifierError::Preprocess(
        PreprocessError::InvalidOrientation(30)
      ))
    ));
  }

  #[test]
  fn finish_is_idempotent_and_closes() {
    let runtime = FixedRuntime::new(4, vec![0.1, 0.7, 0.2]);
    let mut classifier = Classifier::init(runtime, animals(), PreprocessConfig::MODEL).unwrap();
    assert!(classifier.is_initialized());
    assert_eq!(classifier.model_input_size(), (4, 4));
    assert_eq!(classifier.input_shape().channels, 3);
    assert_eq!(classifier.output_spec().len(), 3);

    classifier.finish();
    classifier.finish();

    assert!(!classifier.is_initialized());
    assert_eq!(classifier.model_input_size(), (0, 0));
    assert!(matches!(
      classifier.classify(&photo(), 0),
      Err(ClassifierError::Closed)
    ));
  }

  #[test]
  fn label_mismatch_zips_to_shorter() {
    let runtime = FixedRuntime::new(4, vec![0.1, 0.2, 0.3, 0.4]);
    let mut classifier = Classifier::init(runtime, animals(), PreprocessConfig::MODEL).unwrap();
    let result = classifier.classify(&photo(), 0).unwrap();
    assert_eq!(result.label, "fish");
  }

  #[test]
  fn unsupported_input_shape_fails_init() {
    let mut runtime = FixedRuntime::new(4, vec![0.1, 0.7, 0.2]);
    runtime.input = TensorSpec::new(vec![1, 1001], ElementType::F32);
    assert!(matches!(
      Classifier::init(runtime, animals(), PreprocessConfig::MODEL),
      Err(ClassifierError::Load(LoadError::InputShape(_)))
    ));
  }

  #[test]
  fn builder_from_url_reads_query() {
    let url = Url::parse("tflite:///models/mobilenet.tflite?labels=/data/names.txt&crop=false").unwrap();
    let builder = ClassifierBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path(), Path::new("/models/mobilenet.tflite"));
    assert_eq!(builder.label_path(), Path::new("/data/names.txt"));
    assert_eq!(
      builder.preprocess,
      PreprocessConfig {
        crop: false,
        rotate: true
      }
    );
  }

  #[test]
  fn builder_defaults_labels_next_to_model() {
    let builder = ClassifierBuilder::new("/models/mobilenet.tflite");
    assert_eq!(builder.label_path(), Path::new("/models/labels.txt"));
    assert_eq!(builder.preprocess, PreprocessConfig::MODEL);
  }

  #[test]
  fn builder_accepts_asset_dir_and_variant() {
    let url = Url::parse("tflite:///opt/assets/?variant=support").unwrap();
    let builder = ClassifierBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.model_path(),
      Path::new("/opt/assets").join(DEFAULT_MODEL_FILE)
    );
    assert_eq!(
      builder.label_path(),
      Path::new("/opt/assets").join(DEFAULT_LABEL_FILE)
    );
    assert_eq!(builder.preprocess, PreprocessConfig::SUPPORT);
  }

  #[test]
  fn builder_rejects_other_schemes() {
    let url = Url::parse("image:///models/mobilenet.tflite").unwrap();
    assert!(matches!(
      ClassifierBuilder::from_url(&url),
      Err(LoadError::ModelPathError(_))
    ));

    let url = Url::parse("tflite:///m.tflite?variant=fancy").unwrap();
    assert!(ClassifierBuilder::from_url(&url).is_err());
  }

  #[cfg(feature = "model_tflite")]
  #[test]
  fn build_fails_on_missing_model() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(DEFAULT_LABEL_FILE), "cat\ndog\nfish\n").unwrap();

    let err = ClassifierBuilder::from_asset_dir(dir.path())
      .build()
      .err()
      .unwrap();
    assert!(matches!(
      err,
      ClassifierError::Load(LoadError::Runtime(RuntimeError::ModelNotFound(_)))
    ));
  }
}

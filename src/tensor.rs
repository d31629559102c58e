// 该文件是 Fenlei （分类） 项目的一部分。
// src/tensor.rs - 张量元数据与复用缓冲区
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

const BATCH_SIZE: usize = 1;
const SUPPORTED_CHANNELS: [usize; 3] = [1, 3, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
  F32,
  U8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  Nhwc,
  Nchw,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorShapeError {
  #[error("不支持的输入张量形状: {0:?}")]
  UnsupportedShape(Vec<usize>),
  #[error("不支持的批大小: {0}, 仅支持 1")]
  UnsupportedBatch(usize),
}

/// 模型声明的张量形状与元素类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
  pub shape: Box<[usize]>,
  pub dtype: ElementType,
}

impl TensorSpec {
  pub fn new(shape: impl Into<Box<[usize]>>, dtype: ElementType) -> Self {
    Self {
      shape: shape.into(),
      dtype,
    }
  }

  /// 元素总数
  pub fn len(&self) -> usize {
    self.shape.iter().product()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// 从输入张量推导出的图像尺寸信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
  pub width: usize,
  pub height: usize,
  pub channels: usize,
  pub layout: TensorLayout,
  pub dtype: ElementType,
}

impl TryFrom<&TensorSpec> for InputShape {
  type Error = TensorShapeError;

  fn try_from(spec: &TensorSpec) -> Result<Self, Self::Error> {
    let &[batch, d1, d2, d3] = spec.shape.as_ref() else {
      return Err(TensorShapeError::UnsupportedShape(spec.shape.to_vec()));
    };

    if batch != BATCH_SIZE {
      return Err(TensorShapeError::UnsupportedBatch(batch));
    }

    // [1, H, W, C] 优先，其次 [1, C, H, W]
    let (height, width, channels, layout) = if SUPPORTED_CHANNELS.contains(&d3) {
      (d1, d2, d3, TensorLayout::Nhwc)
    } else if SUPPORTED_CHANNELS.contains(&d1) {
      (d2, d3, d1, TensorLayout::Nchw)
    } else {
      return Err(TensorShapeError::UnsupportedShape(spec.shape.to_vec()));
    };

    if width == 0 || height == 0 {
      return Err(TensorShapeError::UnsupportedShape(spec.shape.to_vec()));
    }

    Ok(InputShape {
      width,
      height,
      channels,
      layout,
      dtype: spec.dtype,
    })
  }
}

impl InputShape {
  pub fn len(&self) -> usize {
    self.width * self.height * self.channels
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 按布局给出的四维形状
  pub fn dims(&self) -> [usize; 4] {
    match self.layout {
      TensorLayout::Nhwc => [BATCH_SIZE, self.height, self.width, self.channels],
      TensorLayout::Nchw => [BATCH_SIZE, self.channels, self.height, self.width],
    }
  }

  /// 像素 (x, y) 第 c 个通道在缓冲区中的下标
  pub fn index(&self, x: usize, y: usize, c: usize) -> usize {
    match self.layout {
      TensorLayout::Nhwc => (y * self.width + x) * self.channels + c,
      TensorLayout::Nchw => c * self.height * self.width + y * self.width + x,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
  F32(Box<[f32]>),
  U8(Box<[u8]>),
}

/// 预处理后的图像张量，每次分类时复用
#[derive(Debug, Clone)]
pub struct ImageTensor {
  shape: InputShape,
  data: TensorData,
}

impl ImageTensor {
  pub fn new(shape: InputShape) -> Self {
    let size = shape.len();
    let data = match shape.dtype {
      ElementType::F32 => TensorData::F32(vec![0.0; size].into_boxed_slice()),
      ElementType::U8 => TensorData::U8(vec![0; size].into_boxed_slice()),
    };
    Self { shape, data }
  }

  pub fn shape(&self) -> &InputShape {
    &self.shape
  }

  pub fn data(&self) -> &TensorData {
    &self.data
  }

  pub fn data_mut(&mut self) -> &mut TensorData {
    &mut self.data
  }

  pub fn as_f32(&self) -> Option<&[f32]> {
    match &self.data {
      TensorData::F32(data) => Some(data),
      TensorData::U8(_) => None,
    }
  }

  pub fn as_u8(&self) -> Option<&[u8]> {
    match &self.data {
      TensorData::U8(data) => Some(data),
      TensorData::F32(_) => None,
    }
  }
}

/// 推理输出缓冲区，每个下标一个分数
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBuffer {
  data: Box<[f32]>,
}

impl OutputBuffer {
  pub fn new(len: usize) -> Self {
    Self {
      data: vec![0.0; len].into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl From<Vec<f32>> for OutputBuffer {
  fn from(data: Vec<f32>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl AsRef<[f32]> for OutputBuffer {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl AsMut<[f32]> for OutputBuffer {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

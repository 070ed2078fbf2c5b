//! Neural Network inference.

pub mod tensor;

use std::{
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use anyhow::Context;
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::image::{AsImageView, Color, ImageView, Resolution};
use tensor::Tensor;

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A convolutional neural network (CNN) that operates on image data.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle to the underlying
/// data.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    image_map: Arc<dyn Fn(ImageView<'_>) -> Tensor + Send + Sync>,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input with a shape that matches the given
    /// [`CnnInputShape`].
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_mapper: ColorMapper,
    ) -> anyhow::Result<Self> {
        let input_res = input_resolution(nn.input_shapes(), shape)?;
        let (h, w) = (input_res.height() as usize, input_res.width() as usize);

        fn sample(view: &ImageView<'_>, x: usize, y: usize, w: usize, h: usize) -> Color {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            let sx = (u * view.width() as f32) as u32;
            let sy = (v * view.height() as f32) as u32;
            view.get(sx, sy)
        }

        let image_map: Arc<dyn Fn(ImageView<'_>) -> _ + Send + Sync> = match shape {
            CnnInputShape::NCHW => Arc::new(move |view| {
                Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| {
                    color_mapper.map(sample(&view, x, y, w, h))[c]
                })
            }),
            CnnInputShape::NHWC => Arc::new(move |view| {
                Tensor::from_array_shape_fn([1, h, w, 3], |[_, y, x, c]| {
                    color_mapper.map(sample(&view, x, y, w, h))[c]
                })
            }),
        };

        Ok(Self {
            nn,
            input_res,
            image_map,
        })
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The input image will be sampled to create the network's input tensor. If the image's aspect
    /// ratio does not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate<V: AsImageView>(&self, image: &V) -> anyhow::Result<Outputs> {
        let tensor = (self.image_map)(image.as_view());
        self.nn.estimate(tensor)
    }
}

fn input_resolution(shapes: &[Vec<usize>], shape: CnnInputShape) -> anyhow::Result<Resolution> {
    let tensor_shape = match shapes {
        [single] => single.as_slice(),
        _ => anyhow::bail!(
            "CNN network has to take exactly 1 input, this one takes {}",
            shapes.len(),
        ),
    };

    let (w, h) = match (shape, tensor_shape) {
        (CnnInputShape::NCHW, [1, 3, h, w]) | (CnnInputShape::NHWC, [1, h, w, 3]) => (*w, *h),
        _ => anyhow::bail!(
            "invalid model input shape for {:?} CNN: {:?}",
            shape,
            tensor_shape,
        ),
    };

    Ok(Resolution::new(w.try_into()?, h.try_into()?))
}

/// Maps 8-bit sRGB pixel values to the value range a network expects.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a color mapper that uniformly maps sRGB values to `target_range`.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());
        Self { target_range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        [color.r(), color.g(), color.b()].map(|col| col as f32 * adjust_range + start)
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CnnInputShape {
    /// Shape is `[N, C, H, W]`.
    NCHW,
    /// Shape is `[N, H, W, C]`.
    NHWC,
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    model: Model,
    input_shapes: Vec<Vec<usize>>,
}

/// Neural network loader, returned by [`NeuralNetwork::from_path`].
pub struct Loader<'a> {
    path: &'a Path,
    outputs: Option<Vec<usize>>,
}

impl Loader<'_> {
    /// Only compute the specified outputs during inference.
    ///
    /// This takes a list of network output indices. The [`Outputs`] returned from
    /// [`NeuralNetwork::estimate`] will only contain the chosen tensors, in the given order.
    pub fn with_output_selection<O: Into<Vec<usize>>>(mut self, outputs: O) -> Self {
        self.outputs = Some(outputs.into());
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the file cannot be read, if the network data is malformed, or if the
    /// network uses unimplemented operations.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let path = self.path;
        let load = || -> anyhow::Result<NeuralNetwork> {
            let graph = tract_onnx::onnx().model_for_path(path)?.into_optimized()?;

            let mut input_shapes = Vec::new();
            for id in 0..graph.inputs.len() {
                let fact = graph.input_fact(id)?;
                let shape = fact
                    .shape
                    .as_concrete()
                    .ok_or_else(|| anyhow::anyhow!("network input {id} has a symbolic shape"))?;
                input_shapes.push(shape.to_vec());
            }

            let outputs = graph.output_outlets()?;
            let selected_outputs = match &self.outputs {
                Some(indices) => indices
                    .iter()
                    .map(|&i| {
                        outputs.get(i).copied().ok_or_else(|| {
                            anyhow::anyhow!("network has no output {i} ({} total)", outputs.len())
                        })
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?,
                None => outputs.to_vec(),
            };
            let model = SimplePlan::new_for_outputs(graph, &selected_outputs)?;

            Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
                model,
                input_shapes,
            })))
        };

        let nn = load().with_context(|| format!("failed to load network '{}'", path.display()))?;
        log::debug!("loaded network '{}'", path.display());
        Ok(nn)
    }
}

impl NeuralNetwork {
    /// Prepares loading a pre-trained model from an ONNX file.
    ///
    /// The path must have an `.onnx` extension.
    pub fn from_path<P: AsRef<Path> + ?Sized>(path: &P) -> anyhow::Result<Loader<'_>> {
        let path = path.as_ref();
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        Ok(Loader {
            path,
            outputs: None,
        })
    }

    /// Returns the tensor shapes of the network's inputs.
    pub fn input_shapes(&self) -> &[Vec<usize>] {
        &self.0.input_shapes
    }

    /// Runs the network on a single input tensor, returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, input: Tensor) -> anyhow::Result<Outputs> {
        let outputs = self
            .0
            .model
            .run(tvec![TValue::from_const(Arc::new(input.to_tract()?))])?;
        let inner = outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect::<anyhow::Result<TVec<_>>>()?;
        Ok(Outputs { inner })
    }
}

#[cfg(test)]
impl NeuralNetwork {
    /// Creates a network with a single `[1, 3, H, W]` input that outputs its input unchanged.
    pub(crate) fn passthrough(res: Resolution) -> anyhow::Result<Self> {
        use tract_onnx::prelude::{DatumExt, TypedModel};

        let shape = [1, 3, res.height() as usize, res.width() as usize];
        let mut graph = TypedModel::default();
        let input = graph.add_source("input", f32::fact(shape))?;
        graph.set_output_outlets(&[input])?;
        let model = SimplePlan::new(graph)?;

        Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
            model,
            input_shapes: vec![shape.to_vec()],
        })))
    }
}

#[cfg(test)]
impl Cnn {
    /// A [`Cnn`] of the given input size whose network does no computation, for driving
    /// detectors and estimators with scripted outputs.
    pub(crate) fn passthrough(res: Resolution) -> anyhow::Result<Self> {
        Cnn::new(
            NeuralNetwork::passthrough(res)?,
            CnnInputShape::NCHW,
            ColorMapper::linear(0.0..=1.0),
        )
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.inner.iter()
    }

    #[cfg(test)]
    pub(crate) fn from_tensors<I: IntoIterator<Item = Tensor>>(tensors: I) -> Self {
        Self {
            inner: tensors.into_iter().collect(),
        }
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

#[cfg(test)]
mod tests {
    use crate::image::Image;

    use super::*;

    #[test]
    fn color_mapper() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [-1.0, -1.0, -1.0]);
        assert_eq!(mapper.map(Color::WHITE), [1.0, 1.0, 1.0]);

        let mapper = ColorMapper::linear(0.0..=1.0);
        assert_eq!(mapper.map(Color::RED), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn input_shape_checks() {
        let res = input_resolution(&[vec![1, 3, 128, 256]], CnnInputShape::NCHW).unwrap();
        assert_eq!((res.width(), res.height()), (256, 128));

        let res = input_resolution(&[vec![1, 224, 224, 3]], CnnInputShape::NHWC).unwrap();
        assert_eq!((res.width(), res.height()), (224, 224));

        assert!(input_resolution(&[vec![1, 224, 224, 3]], CnnInputShape::NCHW).is_err());
        assert!(input_resolution(&[], CnnInputShape::NCHW).is_err());
        assert!(input_resolution(&[vec![1, 3, 4, 4], vec![1]], CnnInputShape::NCHW).is_err());
    }

    #[test]
    fn passthrough_network() {
        let cnn = Cnn::passthrough(Resolution::new(4, 2)).unwrap();
        assert_eq!(cnn.input_resolution(), Resolution::new(4, 2));

        let outputs = cnn.estimate(&Image::filled(8, 4, Color::WHITE)).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].shape(), [1, 3, 2, 4]);
        let value = outputs[0].index([0, 2, 1, 3]).as_singular();
        assert!((value - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rejects_non_onnx_paths() {
        let err = NeuralNetwork::from_path("models/face.tflite").err().unwrap();
        assert!(err.to_string().contains(".onnx"));

        let err = NeuralNetwork::from_path("does/not/exist.onnx")
            .unwrap()
            .load()
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("does/not/exist.onnx"));
    }
}

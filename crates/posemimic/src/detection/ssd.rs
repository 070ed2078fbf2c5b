//! Anchor generation and box decoding for Single Shot MultiBox Detectors (SSDs).
//!
//! All detection networks used here (BlazeFace, palm detection and BlazePose detection) share the
//! same output layout: a `[1, anchors, 4 + 2 * keypoints]` tensor of box parameters relative to
//! their anchor, and a `[1, anchors, 1]` tensor of raw confidence logits.

use std::ops::Index;

use crate::image::{Rect, Resolution};
use crate::nn::Outputs;
use crate::num::sigmoid;

use super::{Detection, Detections, Keypoint};

/// An anchor of an SSD network, with coordinates ranging from 0 to 1.
#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    x_center: f32,
    y_center: f32,
}

impl Anchor {
    pub fn x_center(&self) -> f32 {
        self.x_center
    }

    pub fn y_center(&self) -> f32 {
        self.y_center
    }
}

/// Describes an output layer of an SSD network.
#[derive(Debug, Clone, Copy)]
pub struct LayerInfo {
    boxes_per_cell: u32,
    resolution: Resolution,
}

impl LayerInfo {
    /// Creates a new SSD layer description.
    ///
    /// - `boxes_per_cell`: the number of anchors associated with each cell in this feature map.
    /// - `width`/`height`: size of this layer's feature map, in output cells.
    pub const fn new(boxes_per_cell: u32, width: u32, height: u32) -> Self {
        assert!(boxes_per_cell != 0);
        Self {
            boxes_per_cell,
            resolution: Resolution::new(width, height),
        }
    }
}

/// The full list of anchors of an SSD network.
#[derive(Debug, Clone)]
pub struct Anchors {
    anchors: Vec<Anchor>,
}

impl Anchors {
    pub fn calculate(layers: &[LayerInfo]) -> Self {
        let mut anchors = Vec::new();

        for layer in layers {
            let height = layer.resolution.height();
            let width = layer.resolution.width();

            for y in 0..height {
                for x in 0..width {
                    // All anchors of a cell share its center; the networks use a fixed anchor size.
                    for _ in 0..layer.boxes_per_cell {
                        let x_center = (x as f32 + 0.5) / width as f32;
                        let y_center = (y as f32 + 0.5) / height as f32;

                        anchors.push(Anchor { x_center, y_center });
                    }
                }
            }
        }

        Self { anchors }
    }

    /// Returns the total number of SSD anchors/priors.
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

impl Index<usize> for Anchors {
    type Output = Anchor;

    fn index(&self, index: usize) -> &Anchor {
        &self.anchors[index]
    }
}

/// Decodes all boxes with a confidence of at least `thresh` into `detections`.
///
/// Box and keypoint coordinates are in the pixel space of the network input.
pub fn extract_detections(
    input_res: Resolution,
    anchors: &Anchors,
    num_keypoints: usize,
    outputs: &Outputs,
    thresh: f32,
    detections: &mut Detections,
) -> anyhow::Result<()> {
    if outputs.len() < 2 {
        anyhow::bail!(
            "detection network produced {} outputs, expected 2",
            outputs.len()
        );
    }

    let num_anchors = anchors.anchor_count();
    let num_params = 4 + num_keypoints * 2;
    let boxes = &outputs[0];
    let confidences = &outputs[1];

    if boxes.shape() != [1, num_anchors, num_params] || confidences.shape() != [1, num_anchors, 1] {
        anyhow::bail!(
            "unexpected detection output shapes {:?} and {:?} for {} anchors",
            boxes.shape(),
            confidences.shape(),
            num_anchors,
        );
    }

    let input_w = input_res.width() as f32;
    let input_h = input_res.height() as f32;

    for (index, view) in confidences.index([0]).iter().enumerate() {
        let conf = sigmoid(view.as_slice()[0]);
        if conf < thresh {
            continue;
        }

        let anchor = &anchors[index];
        let params = boxes.index([0, index]).as_slice();
        let ax = anchor.x_center() * input_w;
        let ay = anchor.y_center() * input_h;

        let rect = Rect::from_center(params[0] + ax, params[1] + ay, params[2], params[3]);
        let keypoints = params[4..]
            .chunks_exact(2)
            .map(|xy| Keypoint::new(xy[0] + ax, xy[1] + ay))
            .collect();
        detections.push(Detection::with_keypoints(conf, rect, keypoints));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::nn::tensor::Tensor;

    #[test]
    fn anchor_grid() {
        let anchors = Anchors::calculate(&[LayerInfo::new(2, 2, 2), LayerInfo::new(1, 1, 1)]);
        assert_eq!(anchors.anchor_count(), 9);
        assert_eq!(anchors[0].x_center(), 0.25);
        assert_eq!(anchors[1].x_center(), 0.25);
        assert_eq!(anchors[2].x_center(), 0.75);
        assert_eq!(anchors[7].y_center(), 0.75);
        assert_eq!(anchors[8].x_center(), 0.5);
    }

    #[test]
    fn face_anchor_count() {
        let anchors = Anchors::calculate(&[LayerInfo::new(2, 16, 16), LayerInfo::new(6, 8, 8)]);
        assert_eq!(anchors.anchor_count(), 896);
    }

    #[test]
    fn decodes_boxes_above_threshold() {
        let anchors = Anchors::calculate(&[LayerInfo::new(1, 2, 1)]);
        let boxes = Tensor::from_iter(
            &[1, 2, 6],
            [1.0, 2.0, 10.0, 20.0, -1.0, 0.0, 0.0, 0.0, 5.0, 5.0, 0.0, 0.0],
        );
        let confidences = Tensor::from_iter(&[1, 2, 1], [5.0, -5.0]);
        let outputs = Outputs::from_tensors([boxes, confidences]);

        let mut detections = Detections::new();
        extract_detections(
            Resolution::new(100, 100),
            &anchors,
            1,
            &outputs,
            0.5,
            &mut detections,
        )
        .unwrap();

        assert_eq!(detections.len(), 1);
        let det = detections.iter().next().unwrap();
        assert!(det.confidence() > 0.99);
        let rect = det.bounding_rect();
        assert_abs_diff_eq!(rect.center().x, 26.0);
        assert_abs_diff_eq!(rect.center().y, 52.0);
        assert_abs_diff_eq!(rect.width(), 10.0);
        assert_abs_diff_eq!(det.keypoints()[0].x(), 24.0);
        assert_abs_diff_eq!(det.keypoints()[0].y(), 50.0);
    }

    #[test]
    fn rejects_wrong_shapes() {
        let anchors = Anchors::calculate(&[LayerInfo::new(1, 2, 1)]);
        let outputs = Outputs::from_tensors([
            Tensor::from_iter(&[1, 2, 4], [0.0; 8]),
            Tensor::from_iter(&[1, 2, 1], [0.0; 2]),
        ]);
        let mut detections = Detections::new();
        let res = Resolution::new(10, 10);
        assert!(extract_detections(res, &anchors, 1, &outputs, 0.5, &mut detections).is_err());
    }
}

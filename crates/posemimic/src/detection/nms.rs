//! Non-Maximum Suppression and Averaging.
//!
//! SSD networks produce many overlapping detections for a single object. Non-Maximum Suppression
//! (NMS) reduces them to one detection per object, either by discarding the less confident
//! duplicates ([`SuppressionMode::Remove`]) or by computing a confidence-weighted average of them
//! ([`SuppressionMode::Average`]). Averaging reduces frame-to-frame jitter and is the default.

use crate::{image::Rect, iter::zip_exact, num::TotalF32};

use super::{Detection, Keypoint};

/// A non-maximum suppression algorithm.
pub struct NonMaxSuppression {
    iou_thresh: f32,
    avg_buf: Vec<Detection>,
    out_buf: Vec<Detection>,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            avg_buf: Vec::new(),
            out_buf: Vec::new(),
            mode: SuppressionMode::Average,
        }
    }

    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Performs non-maximum suppression on `detections`.
    ///
    /// `detections` is drained in the process. The surviving detections are returned in order of
    /// descending confidence.
    pub fn process(
        &mut self,
        detections: &mut Vec<Detection>,
    ) -> impl Iterator<Item = Detection> + '_ {
        self.out_buf.clear();

        // Ascending order, so the most confident seed is popped first.
        detections.sort_unstable_by_key(|det| TotalF32(det.confidence));

        while let Some(seed) = detections.pop() {
            let iou_thresh = self.iou_thresh;
            match self.mode {
                SuppressionMode::Remove => {
                    detections.retain(|other| seed.rect.iou(&other.rect) < iou_thresh);
                    self.out_buf.push(seed);
                }
                SuppressionMode::Average => {
                    self.avg_buf.clear();
                    let mut i = 0;
                    while i < detections.len() {
                        if seed.rect.iou(&detections[i].rect) >= iou_thresh {
                            self.avg_buf.push(detections.remove(i));
                        } else {
                            i += 1;
                        }
                    }

                    let averaged = average(&seed, &self.avg_buf);
                    self.out_buf.push(averaged);
                }
            }
        }

        self.avg_buf.clear();
        self.out_buf.drain(..)
    }
}

/// Computes the confidence-weighted average of `seed` and its overlapping `others`.
///
/// The result keeps the seed's confidence.
fn average(seed: &Detection, others: &[Detection]) -> Detection {
    let mut keypoints = vec![Keypoint::new(0.0, 0.0); seed.keypoints.len()];
    let [mut x, mut y, mut w, mut h, mut angle, mut divisor] = [0.0; 6];

    for det in std::iter::once(seed).chain(others) {
        let factor = det.confidence;
        divisor += factor;
        for (acc, kp) in zip_exact(&mut keypoints, &det.keypoints) {
            acc.x += kp.x * factor;
            acc.y += kp.y * factor;
        }
        let center = det.rect.center();
        x += center.x * factor;
        y += center.y * factor;
        w += det.rect.width() * factor;
        h += det.rect.height() * factor;
        angle += det.angle * factor;
    }

    if divisor <= 0.0 {
        return seed.clone();
    }

    for kp in &mut keypoints {
        kp.x /= divisor;
        kp.y /= divisor;
    }

    let mut det = Detection::with_keypoints(
        seed.confidence,
        Rect::from_center(x / divisor, y / divisor, w / divisor, h / divisor),
        keypoints,
    );
    det.set_angle(angle / divisor);
    det
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Describes how [`NonMaxSuppression`] should deal with overlapping detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionMode {
    /// Remove overlapping detections, only retain the detection with highest confidence score.
    Remove,

    /// Compute a confidence-weighted average of overlapping detections.
    Average,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_suppresses_non_maximum() {
        let mut nms = NonMaxSuppression::new();
        nms.set_mode(SuppressionMode::Remove);

        let rect = Rect::from_center(0.0, 0.0, 1.0, 1.0);
        let a = Detection::new(0.6, rect);
        let b = Detection::new(0.55, rect.grow_rel(0.25));
        let detections = nms.process(&mut vec![b, a]).collect::<Vec<_>>();
        assert_eq!(detections.len(), 1);

        let d = &detections[0];
        assert_eq!(d.confidence(), 0.6);
        assert_eq!(d.bounding_rect().width(), 1.0);
        assert_eq!(d.bounding_rect().height(), 1.0);
    }

    #[test]
    fn nms_ignores_nonoverlapping() {
        let mut nms = NonMaxSuppression::new();
        nms.set_mode(SuppressionMode::Remove);

        let a = Detection::new(1.0, Rect::from_center(0.0, 0.0, 1.0, 1.0));
        let b = Detection::new(0.9, Rect::from_center(5.0, 0.0, 1.0, 1.0));

        let detections = nms.process(&mut vec![a, b]).collect::<Vec<_>>();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].confidence(), 1.0);
    }

    #[test]
    fn nma_averages_detections() {
        let mut nms = NonMaxSuppression::new();
        nms.set_iou_thresh(0.0);

        let a = Detection::with_keypoints(
            1.0,
            Rect::from_center(-1.0, 3.0, 1.0, 1.0),
            vec![Keypoint::new(0.0, 0.0)],
        );
        let b = Detection::with_keypoints(
            1.0,
            Rect::from_center(-1.0, 3.0, 3.0, 3.0),
            vec![Keypoint::new(2.0, 4.0)],
        );
        let detections = nms.process(&mut vec![a, b]).collect::<Vec<_>>();
        assert_eq!(detections.len(), 1);

        let d = &detections[0];
        let rect = d.bounding_rect();
        assert_eq!(d.confidence(), 1.0);
        assert_eq!(rect.center().x, -1.0);
        assert_eq!(rect.center().y, 3.0);
        assert_eq!(rect.width(), 2.0);
        assert_eq!(rect.height(), 2.0);
        assert_eq!(d.keypoints()[0].x(), 1.0);
        assert_eq!(d.keypoints()[0].y(), 2.0);
    }
}

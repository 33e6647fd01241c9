use thiserror::Error;

use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::detection::domain::detection_snapshot::DetectionSnapshot;
use crate::matching::match_engine::Resolution;
use crate::shared::bounding_box::PixelRect;
use crate::shared::frame::Frame;

use super::outline::{draw_outline, OutlineStyle};
use super::stats::Stats;

#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("resolution for snapshot {resolution} paired with snapshot {snapshot}")]
    SnapshotMismatch { snapshot: u64, resolution: u64 },
    #[error("{decisions} decisions for {observations} observations")]
    DecisionCount { observations: usize, decisions: usize },
    #[error("blur failed: {0}")]
    Blur(String),
}

/// A composed output frame and the stats of the pass that produced it.
#[derive(Debug)]
pub struct Composition {
    pub frame: Frame,
    pub stats: Stats,
}

/// Turns a source frame plus one snapshot's decisions into a redacted frame.
///
/// The source frame is never modified. On error nothing is returned, so a
/// failed pass can never leak an unblurred face downstream.
pub struct Compositor {
    blurrer: Box<dyn FrameBlurrer>,
    matched_style: OutlineStyle,
    unmatched_style: OutlineStyle,
    outlines: bool,
}

impl Compositor {
    pub fn new(blurrer: Box<dyn FrameBlurrer>) -> Self {
        Self {
            blurrer,
            matched_style: OutlineStyle::matched(),
            unmatched_style: OutlineStyle::unmatched(),
            outlines: true,
        }
    }

    /// Disables the diagnostic overlay.
    pub fn without_outlines(mut self) -> Self {
        self.outlines = false;
        self
    }

    pub fn compose(
        &self,
        frame: &Frame,
        snapshot: &DetectionSnapshot,
        resolution: &Resolution,
    ) -> Result<Composition, CompositorError> {
        if snapshot.id != resolution.snapshot_id {
            return Err(CompositorError::SnapshotMismatch {
                snapshot: snapshot.id,
                resolution: resolution.snapshot_id,
            });
        }
        if snapshot.len() != resolution.decisions.len() {
            return Err(CompositorError::DecisionCount {
                observations: snapshot.len(),
                decisions: resolution.decisions.len(),
            });
        }

        let mut working = frame.clone();
        let (fw, fh) = (frame.width(), frame.height());

        let placed: Vec<(Option<PixelRect>, bool)> = snapshot
            .observations
            .iter()
            .zip(&resolution.decisions)
            .map(|(obs, decision)| (obs.bounding_box.to_pixel_rect(fw, fh), decision.should_blur()))
            .collect();

        let to_blur: Vec<PixelRect> = placed
            .iter()
            .filter_map(|&(rect, blur)| rect.filter(|_| blur))
            .collect();
        self.blurrer
            .blur(&mut working, &to_blur)
            .map_err(|e| CompositorError::Blur(e.to_string()))?;

        if self.outlines {
            for &(rect, blurred) in &placed {
                let Some(rect) = rect else { continue };
                let style = if blurred {
                    self.matched_style
                } else {
                    self.unmatched_style
                };
                draw_outline(&mut working, rect, style);
            }
        }

        Ok(Composition {
            frame: working,
            stats: Stats::from_resolution(snapshot, resolution),
        })
    }

    /// Output for a session without a working detector: the frame as is.
    pub fn compose_passthrough(frame: &Frame) -> Composition {
        Composition {
            frame: frame.clone(),
            stats: Stats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::observation::{Descriptor, Observation};
    use crate::matching::match_engine::MatchDecision;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::constants::{DESCRIPTOR_DIM, MATCHED_OUTLINE_RGB, UNMATCHED_OUTLINE_RGB};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    /// Records requested regions and paints them white.
    struct RecordingBlurrer {
        calls: Arc<Mutex<Vec<Vec<PixelRect>>>>,
        fail: bool,
    }

    impl FrameBlurrer for RecordingBlurrer {
        fn blur(&self, frame: &mut Frame, regions: &[PixelRect]) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail {
                return Err("gpu lost".into());
            }
            self.calls.lock().unwrap().push(regions.to_vec());
            let mut pixels = frame.as_ndarray_mut();
            for r in regions {
                pixels
                    .slice_mut(ndarray::s![r.y..r.bottom(), r.x..r.right(), ..])
                    .fill(255);
            }
            Ok(())
        }
    }

    fn compositor(fail: bool) -> (Compositor, Arc<Mutex<Vec<Vec<PixelRect>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let blurrer = RecordingBlurrer { calls: calls.clone(), fail };
        (Compositor::new(Box::new(blurrer)), calls)
    }

    fn observation(x: f64, y: f64) -> Observation {
        Observation::new(
            BoundingBox::new(x, y, 10.0, 10.0),
            Descriptor::new(vec![0.0; DESCRIPTOR_DIM]).unwrap(),
        )
    }

    fn snapshot(id: u64, observations: Vec<Observation>) -> DetectionSnapshot {
        DetectionSnapshot::new(id, observations, Instant::now())
    }

    fn resolution(id: u64, decisions: Vec<MatchDecision>) -> Resolution {
        Resolution { snapshot_id: id, decisions }
    }

    fn matched() -> MatchDecision {
        MatchDecision::Matched { registry_id: "a".into() }
    }

    fn rgb_at(frame: &Frame, x: usize, y: usize) -> [u8; 3] {
        let a = frame.as_ndarray();
        [a[[y, x, 0]], a[[y, x, 1]], a[[y, x, 2]]]
    }

    fn source() -> Frame {
        Frame::new(vec![0; 64 * 48 * 3], 64, 48, 3, 5)
    }

    #[test]
    fn test_blurs_only_matched_and_outlines_all() {
        let (compositor, calls) = compositor(false);
        let snap = snapshot(2, vec![observation(4.0, 4.0), observation(30.0, 20.0)]);
        let res = resolution(2, vec![matched(), MatchDecision::Unmatched]);

        let out = compositor.compose(&source(), &snap, &res).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![vec![PixelRect { x: 4, y: 4, w: 10, h: 10 }]]);
        assert_eq!(rgb_at(&out.frame, 4, 4), MATCHED_OUTLINE_RGB);
        assert_eq!(rgb_at(&out.frame, 8, 8), [255, 255, 255]);
        assert_eq!(rgb_at(&out.frame, 30, 20), UNMATCHED_OUTLINE_RGB);
        assert_eq!(rgb_at(&out.frame, 35, 25), [0, 0, 0]);
        assert_eq!(out.stats, Stats { faces_detected: 2, faces_blurred: 1 });
        assert_eq!(out.frame.index(), 5);
    }

    #[test]
    fn test_source_frame_untouched() {
        let (compositor, _) = compositor(false);
        let src = source();
        let snap = snapshot(1, vec![observation(0.0, 0.0)]);
        compositor.compose(&src, &snap, &resolution(1, vec![matched()])).unwrap();
        assert!(src.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_pending_not_blurred_but_outlined_unmatched() {
        let (compositor, calls) = compositor(false);
        let snap = snapshot(1, vec![observation(0.0, 0.0)]);
        let out = compositor
            .compose(&source(), &snap, &resolution(1, vec![MatchDecision::Pending]))
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![Vec::<PixelRect>::new()]);
        assert_eq!(rgb_at(&out.frame, 0, 0), UNMATCHED_OUTLINE_RGB);
        assert_eq!(out.stats.faces_blurred, 0);
    }

    #[test]
    fn test_off_frame_box_counted_not_drawn() {
        let (compositor, calls) = compositor(false);
        let snap = snapshot(1, vec![observation(500.0, 500.0)]);
        let out = compositor.compose(&source(), &snap, &resolution(1, vec![matched()])).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![Vec::<PixelRect>::new()]);
        assert_eq!(out.stats, Stats { faces_detected: 1, faces_blurred: 1 });
    }

    #[test]
    fn test_mismatched_snapshot_rejected() {
        let (compositor, calls) = compositor(false);
        let snap = snapshot(3, vec![observation(0.0, 0.0)]);
        let err = compositor.compose(&source(), &snap, &resolution(2, vec![matched()])).unwrap_err();
        assert!(matches!(err, CompositorError::SnapshotMismatch { snapshot: 3, resolution: 2 }));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_decision_count_mismatch_rejected() {
        let (compositor, _) = compositor(false);
        let snap = snapshot(1, vec![observation(0.0, 0.0)]);
        assert!(matches!(
            compositor.compose(&source(), &snap, &resolution(1, vec![])),
            Err(CompositorError::DecisionCount { observations: 1, decisions: 0 })
        ));
    }

    #[test]
    fn test_blur_failure_yields_no_frame() {
        let (compositor, _) = compositor(true);
        let snap = snapshot(1, vec![observation(0.0, 0.0)]);
        let result = compositor.compose(&source(), &snap, &resolution(1, vec![matched()]));
        assert!(matches!(result, Err(CompositorError::Blur(_))));
    }

    #[test]
    fn test_without_outlines() {
        let (compositor, _) = compositor(false);
        let compositor = compositor.without_outlines();
        let snap = snapshot(1, vec![observation(30.0, 20.0)]);
        let out = compositor
            .compose(&source(), &snap, &resolution(1, vec![MatchDecision::Unmatched]))
            .unwrap();
        assert!(out.frame.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_passthrough_copies_frame() {
        let out = Compositor::compose_passthrough(&source());
        assert_eq!(out.stats, Stats::default());
        assert_eq!(out.frame.index(), 5);
    }
}

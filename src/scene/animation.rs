//! Pose sampling for animated hierarchies.

use log::debug;

use super::{NodeId, Scene};
use crate::config::PoseSelector;
use crate::math::Transform;

/// Frame rate assumed for clips that declare none.
pub const DEFAULT_FRAME_RATE: f32 = 60.0;

/// Timing information of one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub name: String,
    pub frame_rate: f32,
    /// Length in seconds.
    pub length: f32,
}

/// Samples animation clips into the scene's local transforms.
pub trait PoseProvider {
    fn clip_count(&self) -> usize;

    fn clip_info(&self, index: usize) -> Option<ClipInfo>;

    /// Writes the pose of `clip` at `time` seconds into the scene.
    fn sample(&self, scene: &mut Scene, clip: usize, time: f32);
}

/// Clamps a requested clip index into `[0, count - 1]`.
pub fn clamp_clip_index(index: i32, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    Some((index.max(0) as usize).min(count - 1))
}

/// Converts a frame index to a time within the clip.
pub fn sample_time(info: &ClipInfo, frame_index: i32) -> f32 {
    let fps = if info.frame_rate > 0.0 {
        info.frame_rate
    } else {
        DEFAULT_FRAME_RATE
    };
    (frame_index as f32 / fps).clamp(0.0, info.length.max(0.0))
}

/// Applies the selected pose. Returns the clip and time that were sampled,
/// or `None` when the provider has no clips.
pub fn apply_pose(provider: &dyn PoseProvider, scene: &mut Scene, selector: PoseSelector) -> Option<(usize, f32)> {
    let clip = clamp_clip_index(selector.clip_index, provider.clip_count())?;
    let info = provider.clip_info(clip)?;
    let time = sample_time(&info, selector.frame_index);
    debug!("sampling clip `{}` at {time:.3}s", info.name);
    provider.sample(scene, clip, time);
    Some((clip, time))
}

// ============================================================================
// Keyframe animator
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub transform: Transform,
}

impl Keyframe {
    pub fn new(time: f32, transform: Transform) -> Self {
        Self { time, transform }
    }
}

/// Keyframes driving one node's local transform. Keys are sorted by time.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub node: NodeId,
    pub keys: Vec<Keyframe>,
}

impl Track {
    pub fn new(node: NodeId, mut keys: Vec<Keyframe>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { node, keys }
    }

    /// Interpolated transform at `time`, holding the end keys outside the range.
    pub fn evaluate(&self, time: f32) -> Option<Transform> {
        let first = self.keys.first()?;
        let next = self.keys.partition_point(|k| k.time <= time);
        if next == 0 {
            return Some(first.transform.clone());
        }
        let a = &self.keys[next - 1];
        let Some(b) = self.keys.get(next) else {
            return Some(a.transform.clone());
        };
        let span = b.time - a.time;
        let t = if span > 0.0 { (time - a.time) / span } else { 0.0 };
        Some(a.transform.lerp(&b.transform, t))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub frame_rate: f32,
    pub length: f32,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, frame_rate: f32, length: f32, tracks: Vec<Track>) -> Self {
        Self {
            name: name.into(),
            frame_rate,
            length,
            tracks,
        }
    }
}

/// A set of keyframe clips.
#[derive(Debug, Clone, Default)]
pub struct Animator {
    pub clips: Vec<AnimationClip>,
}

impl Animator {
    pub fn new(clips: Vec<AnimationClip>) -> Self {
        Self { clips }
    }
}

impl PoseProvider for Animator {
    fn clip_count(&self) -> usize {
        self.clips.len()
    }

    fn clip_info(&self, index: usize) -> Option<ClipInfo> {
        self.clips.get(index).map(|c| ClipInfo {
            name: c.name.clone(),
            frame_rate: c.frame_rate,
            length: c.length,
        })
    }

    fn sample(&self, scene: &mut Scene, clip: usize, time: f32) {
        let Some(clip) = self.clips.get(clip) else {
            return;
        };
        for track in &clip.tracks {
            if let Some(local) = track.evaluate(time) {
                scene.set_local(track.node, local);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use approx::assert_relative_eq;

    fn info(frame_rate: f32, length: f32) -> ClipInfo {
        ClipInfo {
            name: "walk".into(),
            frame_rate,
            length,
        }
    }

    #[test]
    fn frame_converts_to_time() {
        assert_relative_eq!(sample_time(&info(30.0, 2.0), 15), 0.5);
    }

    #[test]
    fn frame_rate_defaults_to_sixty() {
        assert_relative_eq!(sample_time(&info(0.0, 2.0), 30), 0.5);
        assert_relative_eq!(sample_time(&info(-5.0, 2.0), 60), 1.0);
    }

    #[test]
    fn time_clamps_to_clip_length() {
        assert_relative_eq!(sample_time(&info(30.0, 1.0), 300), 1.0);
        assert_relative_eq!(sample_time(&info(30.0, 1.0), -4), 0.0);
    }

    #[test]
    fn clip_index_clamps() {
        assert_eq!(clamp_clip_index(-1, 3), Some(0));
        assert_eq!(clamp_clip_index(7, 3), Some(2));
        assert_eq!(clamp_clip_index(0, 0), None);
    }

    #[test]
    fn track_interpolates_and_holds_ends() {
        let track = Track::new(
            NodeId(0),
            vec![
                Keyframe::new(1.0, Transform::from_position(Vec3::new(2.0, 0.0, 0.0))),
                Keyframe::new(0.0, Transform::identity()),
            ],
        );
        assert_relative_eq!(track.evaluate(0.5).unwrap().position.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(track.evaluate(-1.0).unwrap().position.x, 0.0);
        assert_relative_eq!(track.evaluate(5.0).unwrap().position.x, 2.0);
    }

    #[test]
    fn apply_pose_writes_local_transforms() {
        let mut scene = Scene::new();
        let root = scene.add_root("root", Transform::identity());
        let arm = scene.add_child(root, "arm", Transform::identity());
        let animator = Animator::new(vec![AnimationClip::new(
            "raise",
            10.0,
            1.0,
            vec![Track::new(
                arm,
                vec![
                    Keyframe::new(0.0, Transform::identity()),
                    Keyframe::new(1.0, Transform::from_position(Vec3::new(0.0, 4.0, 0.0))),
                ],
            )],
        )]);

        let applied = apply_pose(&animator, &mut scene, PoseSelector::new(3, 5));
        assert_eq!(applied, Some((0, 0.5)));
        assert_relative_eq!(scene.node(arm).unwrap().local.position.y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn empty_animator_applies_nothing() {
        let mut scene = Scene::new();
        assert!(apply_pose(&Animator::default(), &mut scene, PoseSelector::new(0, 0)).is_none());
    }
}

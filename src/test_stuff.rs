use crate::detection::Detection;
use crate::worker::DetectionSource;
use anyhow::Result;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct Object {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
}

/// Synthetic detector output: objects moving with constant velocity, observed with
/// uniform noise.
///
#[derive(Debug, Clone)]
pub struct DetectionGen {
    class_id: i32,
    dt: f32,
    objects: Vec<Object>,
    gen: StdRng,
    dist: Uniform<f32>,
}

impl DetectionGen {
    pub fn new(class_id: i32, dt: f32, noise: f32) -> Self {
        Self::with_rng(class_id, dt, noise, StdRng::from_entropy())
    }

    /// Reproducible generator
    ///
    pub fn seeded(class_id: i32, dt: f32, noise: f32, seed: u64) -> Self {
        Self::with_rng(class_id, dt, noise, StdRng::seed_from_u64(seed))
    }

    fn with_rng(class_id: i32, dt: f32, noise: f32, gen: StdRng) -> Self {
        Self {
            class_id,
            dt,
            objects: Vec::default(),
            gen,
            dist: Uniform::new_inclusive(-noise, noise),
        }
    }

    pub fn object(mut self, x: f32, y: f32, vx: f32, vy: f32) -> Self {
        self.objects.push(Object { x, y, vx, vy });
        self
    }

    /// True positions of the objects in the last generated frame
    ///
    pub fn positions(&self) -> Vec<(f32, f32)> {
        self.objects.iter().map(|o| (o.x, o.y)).collect()
    }
}

impl Iterator for DetectionGen {
    type Item = Vec<Detection>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut frame = Vec::with_capacity(self.objects.len());
        for o in self.objects.iter_mut() {
            o.x += o.vx * self.dt;
            o.y += o.vy * self.dt;
            frame.push(Detection::point(
                self.class_id,
                o.x + self.gen.sample(self.dist),
                o.y + self.gen.sample(self.dist),
            ));
        }
        Some(frame)
    }
}

impl DetectionSource for DetectionGen {
    fn poll(&mut self) -> Result<Vec<Detection>> {
        Ok(self.next().unwrap_or_default())
    }
}

/// Source replaying prepared frames
///
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    frames: VecDeque<Vec<Detection>>,
    repeat: Option<Vec<Detection>>,
}

impl ScriptedSource {
    /// Returns the frames in order, then empty frames
    ///
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self {
            frames: frames.into(),
            repeat: None,
        }
    }

    /// Returns the same frame forever
    ///
    pub fn repeat(frame: Vec<Detection>) -> Self {
        Self {
            frames: VecDeque::default(),
            repeat: Some(frame),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for ScriptedSource {
    fn poll(&mut self) -> Result<Vec<Detection>> {
        Ok(self
            .frames
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use crate::detection::Detection;
    use crate::test_stuff::{DetectionGen, ScriptedSource};
    use crate::worker::DetectionSource;

    #[test]
    fn generator_moves_objects() {
        let mut gen = DetectionGen::seeded(1, 0.1, 0.05, 7)
            .object(0.0, 0.0, 1.0, 0.0)
            .object(5.0, 5.0, 0.0, -1.0);
        let frames = gen.by_ref().take(10).collect::<Vec<_>>();
        assert!(frames.iter().all(|f| f.len() == 2));

        let positions = gen.positions();
        assert!((positions[0].0 - 1.0).abs() < 1e-4);
        assert!((positions[1].1 - 4.0).abs() < 1e-4);

        let last = &frames[9];
        assert!((last[0].center_x() - 1.0).abs() <= 0.05 + 1e-4);
        assert!(last.iter().all(|d| d.class_id() == 1));
    }

    #[test]
    fn scripted_source() {
        let d = Detection::point(1, 1.0, 2.0);
        let mut s = ScriptedSource::new(vec![vec![d.clone()], vec![]]);
        assert_eq!(s.poll().unwrap(), vec![d.clone()]);
        assert_eq!(s.remaining(), 1);
        assert!(s.poll().unwrap().is_empty());
        assert!(s.poll().unwrap().is_empty());

        let mut s = ScriptedSource::repeat(vec![d.clone()]);
        for _ in 0..3 {
            assert_eq!(s.poll().unwrap(), vec![d.clone()]);
        }
    }
}

//! Stateful playback of a trajectory.
//!
//! The player keeps a cursor on the segment containing the last queried time.
//! Moving forward in time is cheap (the cursor only advances); moving backward
//! rescans from the first segment.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use showtraj::{math::Vec4, TrajectoryBuilder, TrajectoryPlayer};
//!
//! let mut builder = TrajectoryBuilder::new(1, false).unwrap();
//! builder.append_line(Vec4::new(10000., 0., 0., 0.), 10000).unwrap();
//! let trajectory = Arc::new(builder.finalize().unwrap());
//!
//! let mut player = TrajectoryPlayer::new(trajectory).unwrap();
//! assert_eq!(player.get_position_at(5.).unwrap(), Vec4::new(5000., 0., 0., 0.));
//! assert_eq!(player.get_velocity_at(2.).unwrap(), Vec4::new(1000., 0., 0., 0.));
//! ```

use std::sync::Arc;

use super::{segment::Segment, Trajectory};
use crate::{
    error::{Result, TrajectoryError},
    math::Vec4,
};

/// The cursor of a player: the segment it currently points at.
///
/// Copying it is a cheap snapshot, which is what
/// [`TrajectoryPlayer::save_state`] and [`TrajectoryPlayer::restore_state`] rely on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerState {
    segment: Segment,
}

impl PlayerState {
    /// A cursor positioned at the first segment of `trajectory`.
    pub(crate) fn new(trajectory: &Trajectory) -> Result<Self> {
        let mut state = Self::default();
        state.rewind(trajectory)?;
        Ok(state)
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub(crate) fn segment_mut(&mut self) -> &mut Segment {
        &mut self.segment
    }

    pub(crate) fn build_current_segment(
        &mut self,
        trajectory: &Trajectory,
        offset: usize,
        start_time_msec: u32,
        start: Vec4,
    ) -> Result<()> {
        self.segment = Segment::decode(
            trajectory.as_bytes(),
            offset,
            start_time_msec,
            start,
            trajectory.get_scale(),
        )?;
        Ok(())
    }

    /// Moves to the segment that follows the current one. The final infinite
    /// hold has no successor; the cursor stays on it.
    pub(crate) fn build_next_segment(&mut self, trajectory: &Trajectory) -> Result<()> {
        if self.segment.is_terminal() {
            return Ok(());
        }
        let offset = self.segment.offset() + self.segment.len();
        let start_time_msec = self.segment.end_time_msec();
        let start = self.segment.end();
        self.build_current_segment(trajectory, offset, start_time_msec, start)
    }

    pub(crate) fn rewind(&mut self, trajectory: &Trajectory) -> Result<()> {
        self.build_current_segment(
            trajectory,
            trajectory.get_header_length(),
            0,
            trajectory.get_start_position(),
        )
    }

    /// Moves to the segment containing `t` (in seconds) and returns the
    /// relative position of `t` within that segment.
    pub(crate) fn seek_to_time(&mut self, trajectory: &Trajectory, t: f32) -> Result<f32> {
        if t.is_nan() {
            return Err(TrajectoryError::InvalidArgument("time must not be NaN"));
        }

        if t < self.segment.start_time_sec() {
            self.rewind(trajectory)?;
        }
        while !self.segment.is_terminal() && t > self.segment.end_time_sec() {
            self.build_next_segment(trajectory)?;
        }

        let rel_t = if t == f32::INFINITY {
            1.
        } else if self.segment.duration_msec() == 0 {
            0.5
        } else {
            ((t - self.segment.start_time_sec()) / self.segment.duration_sec()).clamp(0., 1.)
        };
        Ok(rel_t)
    }

    /// Walks to the end of the trajectory and returns its total duration.
    pub(crate) fn total_duration_msec(&mut self, trajectory: &Trajectory) -> Result<u32> {
        while !self.segment.is_terminal() {
            self.build_next_segment(trajectory)?;
        }
        Ok(self.segment.start_time_msec())
    }
}

/// Evaluates positions, velocities and accelerations of a shared trajectory.
///
/// Players never modify the trajectory they read, so any number of them may
/// play the same `Arc<Trajectory>` at once.
pub struct TrajectoryPlayer<'a> {
    trajectory: Arc<Trajectory<'a>>,
    state: PlayerState,
}

impl<'a> TrajectoryPlayer<'a> {
    pub fn new(trajectory: Arc<Trajectory<'a>>) -> Result<Self> {
        let state = PlayerState::new(&trajectory)?;
        Ok(Self { trajectory, state })
    }

    pub fn trajectory(&self) -> &Arc<Trajectory<'a>> {
        &self.trajectory
    }

    pub fn get_current_segment(&self) -> &Segment {
        self.state.segment()
    }

    pub fn is_at_end(&self) -> bool {
        self.state.segment().is_terminal()
    }

    pub fn build_current_segment(
        &mut self,
        offset: usize,
        start_time_msec: u32,
        start: Vec4,
    ) -> Result<()> {
        self.state
            .build_current_segment(&self.trajectory, offset, start_time_msec, start)
    }

    pub fn build_next_segment(&mut self) -> Result<()> {
        self.state.build_next_segment(&self.trajectory)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.state.rewind(&self.trajectory)
    }

    pub fn seek_to_time(&mut self, t: f32) -> Result<f32> {
        self.state.seek_to_time(&self.trajectory, t)
    }

    pub fn save_state(&self) -> PlayerState {
        self.state
    }

    pub fn restore_state(&mut self, state: &PlayerState) {
        self.state = *state;
    }

    /// Total duration of the trajectory; the cursor is left where it was.
    pub fn get_total_duration_msec(&mut self) -> Result<u32> {
        let saved = self.save_state();
        let result = self.state.total_duration_msec(&self.trajectory);
        self.restore_state(&saved);
        result
    }

    pub fn get_total_duration_sec(&mut self) -> Result<f32> {
        self.get_total_duration_msec().map(|ms| ms as f32 / 1000.)
    }

    pub fn get_position_at(&mut self, t: f32) -> Result<Vec4> {
        let rel_t = self.seek_to_time(t)?;
        Ok(self.state.segment_mut().get_poly()?.eval(rel_t))
    }

    pub fn get_velocity_at(&mut self, t: f32) -> Result<Vec4> {
        let rel_t = self.seek_to_time(t)?;
        Ok(self.state.segment_mut().get_dpoly()?.eval(rel_t))
    }

    pub fn get_acceleration_at(&mut self, t: f32) -> Result<Vec4> {
        let rel_t = self.seek_to_time(t)?;
        Ok(self.state.segment_mut().get_ddpoly()?.eval(rel_t))
    }
}

use std::{sync::Arc, time::Duration};

use showtraj::{StatsCalculator, Trajectory, TrajectoryError, TrajectoryPlayer, TrajectoryStats};
use tokio::{select, time::Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub const CONTROL_PERIOD: Duration = Duration::from_millis(50);

const USAGE: &str = "usage: showtraj <trajectory file> [speed factor]";

/// Statistics for the startup log. Segments the solver cannot handle still
/// play fine, so a failed pass is only worth a warning.
fn startup_stats(trajectory: &Trajectory) -> Option<TrajectoryStats> {
    match StatsCalculator::default().run(trajectory) {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("no statistics for this trajectory: {}", e);
            None
        }
    }
}

/// Plays the trajectory in real time, logging the setpoint at every tick.
async fn play(mut player: TrajectoryPlayer<'_>, speed: f32) -> showtraj::Result<()> {
    let total_sec = player.get_total_duration_sec()?;
    let start = Instant::now();
    let mut interval = tokio::time::interval(CONTROL_PERIOD);
    loop {
        interval.tick().await; // first tick ticks immediately

        let t = start.elapsed().as_secs_f32() * speed;
        let position = player.get_position_at(t)?;
        let velocity = player.get_velocity_at(t)?;
        info!(
            "t = {:7.2} s | pos: ({:8.1}, {:8.1}, {:8.1}) yaw {:5.1} | vel: ({:7.1}, {:7.1}, {:7.1})",
            t, position.x, position.y, position.z, position.yaw, velocity.x, velocity.y, velocity.z
        );

        if t > total_sec {
            info!("reached the end of the trajectory");
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> showtraj::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or(TrajectoryError::InvalidArgument(USAGE))?;
    let speed = match args.next() {
        Some(arg) => arg
            .parse::<f32>()
            .ok()
            .filter(|s| s.is_finite() && *s > 0.)
            .ok_or(TrajectoryError::InvalidArgument(
                "speed factor must be a positive number",
            ))?,
        None => 1.,
    };

    let trajectory = Arc::new(Trajectory::from_vec(std::fs::read(&path)?)?);
    if trajectory.is_empty() {
        warn!("{} holds an empty trajectory", path);
    }

    match startup_stats(&trajectory) {
        Some(stats) => info!(
            "loaded {}: {} ms, takeoff at {:.2} s, landing at {:.2} s",
            path, stats.duration_msec, stats.takeoff_time_sec, stats.landing_time_sec
        ),
        None => info!(
            "loaded {}: {} ms",
            path,
            trajectory.get_total_duration_msec()?
        ),
    }

    let player = TrajectoryPlayer::new(Arc::clone(&trajectory))?;
    select! {
        result = play(player, speed) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("playback interrupted")
        }
    };
    Ok(())
}

use showtraj::{StatsCalculator, StatsComponents, StatsConfig, Trajectory, TrajectoryError};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: traj_cut <input> <output> <time in s> [landing velocity]";

fn parse_positive(arg: Option<String>, what: &'static str) -> showtraj::Result<Option<f32>> {
    arg.map(|arg| {
        arg.parse::<f32>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.)
            .ok_or(TrajectoryError::InvalidArgument(what))
    })
    .transpose()
}

/// Cuts a trajectory file at a given time. With a landing velocity, the part
/// after the proposed landing time of the cut trajectory is replaced by a
/// vertical descent instead.
fn main() -> showtraj::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        return Err(TrajectoryError::InvalidArgument(USAGE));
    };
    let t = parse_positive(args.next(), "cut time must be a non-negative number")?
        .ok_or(TrajectoryError::InvalidArgument(USAGE))?;
    let landing_velocity = parse_positive(args.next(), "landing velocity must be positive")?;

    let mut trajectory = Trajectory::from_vec(std::fs::read(&input)?)?;
    let before_msec = trajectory.get_total_duration_msec()?;
    trajectory.cut_at(t)?;

    if let Some(velocity) = landing_velocity {
        let stats = StatsCalculator::new(StatsComponents::LANDING_TIME, StatsConfig::default())
            .run(&trajectory)?;
        info!("landing at {:.2} s, descending at {}", stats.landing_time_sec, velocity);
        trajectory.replace_end_to_land(&stats, velocity)?;
    }

    info!(
        "{} ms -> {} ms, end position {:?}",
        before_msec,
        trajectory.get_total_duration_msec()?,
        trajectory.get_end_position()?
    );
    std::fs::write(&output, trajectory.as_bytes())?;
    Ok(())
}

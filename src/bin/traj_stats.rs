use showtraj::{StatsCalculator, StatsComponents, StatsConfig, Trajectory, TrajectoryError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: traj_stats <trajectory file> [stats config json]";

fn load_config(path: Option<String>) -> showtraj::Result<StatsConfig> {
    let Some(path) = path else {
        return Ok(StatsConfig::default());
    };
    let config: StatsConfig = serde_json::from_slice(&std::fs::read(&path)?)
        .map_err(|_| TrajectoryError::Parse("invalid stats config"))?;
    config.validate()?;
    debug!("using stats config from {}: {:?}", path, config);
    Ok(config)
}

fn main() -> showtraj::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or(TrajectoryError::InvalidArgument(USAGE))?;
    let config = load_config(args.next())?;

    let trajectory = Trajectory::from_vec(std::fs::read(&path)?)?;
    info!(
        "{}: {} bytes, scale {}, yaw {}",
        path,
        trajectory.as_bytes().len(),
        trajectory.get_scale(),
        if trajectory.is_yaw_enabled() { "enabled" } else { "disabled" }
    );

    let stats = StatsCalculator::new(StatsComponents::ALL, config).run(&trajectory)?;
    let json = serde_json::to_string_pretty(&stats)
        .map_err(|_| TrajectoryError::InvalidArgument("statistics are not serializable"))?;
    println!("{json}");
    Ok(())
}

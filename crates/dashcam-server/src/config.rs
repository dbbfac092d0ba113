use clap::Args;
use dashcam_capture::{valid_track_speed, CaptureConfig, ConfigError as CaptureConfigError, MAX_TRACK_SPEED};
use dashcam_core::{FilenameError, Fix};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}' (expected e.g. 2s, 1500ms, 1m)")]
    Duration(String),

    #[error(transparent)]
    Capture(#[from] CaptureConfigError),

    #[error("invalid fix '{0}' (expected <latitude>,<longitude>)")]
    Fix(String),

    #[error(transparent)]
    Coordinate(#[from] FilenameError),

    #[error("track speed {0} outside (0, {max}]", max = MAX_TRACK_SPEED)]
    TrackSpeed(f64),

    #[error("exactly one of --fix or --track is required")]
    LocationSource,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Directory an external frame grabber drops JPEG stills into
    #[arg(long)]
    pub spool: PathBuf,
    /// Capture interval (e.g., "2s", "1500ms", "1m"); floored at 500ms
    #[arg(long, default_value = "2s")]
    pub interval: String,
    /// JPEG quality in (0, 1]
    #[arg(long, default_value = "0.2")]
    pub quality: f32,
    /// Fixed location as "<latitude>,<longitude>"
    #[arg(long, allow_hyphen_values = true)]
    pub fix: Option<String>,
    /// NDJSON track to replay as the location source
    #[arg(long)]
    pub track: Option<PathBuf>,
    /// Track replay speed multiplier
    #[arg(long, default_value = "1.0")]
    pub track_speed: f64,
    /// HTTP server address
    #[arg(long, env = "DASHCAM_HTTP", default_value = "127.0.0.1:8080")]
    pub http: String,
    /// Media library directory (defaults to <root>/library)
    #[arg(long)]
    pub library: Option<PathBuf>,
    /// Directory for export bundles (defaults to <root>/exports)
    #[arg(long)]
    pub exports: Option<PathBuf>,
    /// Start capturing immediately
    #[arg(long)]
    pub start: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationSource {
    Fixed(Fix),
    Track { path: PathBuf, speed: f64 },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub spool_dir: PathBuf,
    /// Re-encoded frames wait here before being renamed into a session.
    pub staging_dir: PathBuf,
    pub library_dir: PathBuf,
    pub export_dir: PathBuf,
    pub http: String,
    pub capture: CaptureConfig,
    pub location: LocationSource,
    pub autostart: bool,
}

impl Config {
    pub fn from_args(root: &Path, args: &RunArgs) -> Result<Self, ConfigError> {
        let interval = parse_duration(&args.interval)?;
        let capture = CaptureConfig::new(interval, args.quality)?;

        let location = match (&args.fix, &args.track) {
            (Some(fix), None) => LocationSource::Fixed(parse_fix(fix)?),
            (None, Some(path)) => {
                if !valid_track_speed(args.track_speed) {
                    return Err(ConfigError::TrackSpeed(args.track_speed));
                }
                LocationSource::Track {
                    path: path.clone(),
                    speed: args.track_speed,
                }
            }
            _ => return Err(ConfigError::LocationSource),
        };

        Ok(Self {
            root: root.to_path_buf(),
            spool_dir: args.spool.clone(),
            staging_dir: root.join(".staging"),
            library_dir: args.library.clone().unwrap_or_else(|| root.join("library")),
            export_dir: args.exports.clone().unwrap_or_else(|| root.join("exports")),
            http: args.http.clone(),
            capture,
            location,
            autostart: args.start,
        })
    }
}

pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let bad = || ConfigError::Duration(s.to_string());

    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse().map(Duration::from_millis).map_err(|_| bad())
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: f64 = secs.parse().map_err(|_| bad())?;
        Duration::try_from_secs_f64(secs).map_err(|_| bad())
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().map_err(|_| bad())?;
        mins.checked_mul(60).map(Duration::from_secs).ok_or_else(bad)
    } else {
        s.parse().map(Duration::from_secs).map_err(|_| bad())
    }
}

pub fn parse_fix(s: &str) -> Result<Fix, ConfigError> {
    let bad = || ConfigError::Fix(s.to_string());
    let (lat, lng) = s.split_once(',').ok_or_else(bad)?;
    let fix = Fix::new(
        lat.trim().parse().map_err(|_| bad())?,
        lng.trim().parse().map_err(|_| bad())?,
    );
    fix.validate()?;
    Ok(fix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["dashcam", "--spool", "/tmp/spool"];
        argv.extend_from_slice(extra);
        TestCli::try_parse_from(argv).unwrap().run
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_huge_minute_count_is_rejected() {
        assert!(matches!(
            parse_duration("18446744073709551615m"),
            Err(ConfigError::Duration(_))
        ));
        assert_eq!(
            parse_duration("307445734561825860m").unwrap(),
            Duration::from_secs(307_445_734_561_825_860 * 60)
        );
    }

    #[test]
    fn test_parse_fix() {
        assert_eq!(parse_fix("37.4245,-122.166").unwrap(), Fix::new(37.4245, -122.166));
        assert_eq!(parse_fix("-33.8688, 151.2093").unwrap(), Fix::new(-33.8688, 151.2093));
        assert!(matches!(parse_fix("37.4245"), Err(ConfigError::Fix(_))));
        assert!(matches!(parse_fix("91,0"), Err(ConfigError::Coordinate(_))));
    }

    #[test]
    fn test_defaults_with_fixed_location() {
        let config = Config::from_args(Path::new("/data"), &args(&["--fix", "-33.8688,151.2093"])).unwrap();

        assert_eq!(config.capture, CaptureConfig::default());
        assert_eq!(config.location, LocationSource::Fixed(Fix::new(-33.8688, 151.2093)));
        assert_eq!(config.staging_dir, PathBuf::from("/data/.staging"));
        assert_eq!(config.library_dir, PathBuf::from("/data/library"));
        assert_eq!(config.export_dir, PathBuf::from("/data/exports"));
        assert!(!config.autostart);
    }

    #[test]
    fn test_short_interval_is_floored() {
        let config = Config::from_args(
            Path::new("/data"),
            &args(&["--fix", "1,1", "--interval", "100ms"]),
        )
        .unwrap();
        assert_eq!(config.capture.interval, Duration::from_millis(500));
    }

    #[test]
    fn test_quality_out_of_range_is_rejected() {
        let err = Config::from_args(Path::new("/data"), &args(&["--fix", "1,1", "--quality", "0"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Capture(_)));

        let err = Config::from_args(Path::new("/data"), &args(&["--fix", "1,1", "--quality", "1.5"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Capture(_)));
    }

    #[test]
    fn test_unusable_track_speed_is_rejected() {
        for speed in ["inf", "NaN", "0", "1e300"] {
            let err = Config::from_args(
                Path::new("/data"),
                &args(&["--track", "/tmp/track.ndjson", "--track-speed", speed]),
            )
            .unwrap_err();
            assert!(matches!(err, ConfigError::TrackSpeed(_)), "speed {} accepted", speed);
        }
    }

    #[test]
    fn test_exactly_one_location_source() {
        let err = Config::from_args(Path::new("/data"), &args(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::LocationSource));

        let err = Config::from_args(
            Path::new("/data"),
            &args(&["--fix", "1,1", "--track", "/tmp/track.ndjson"]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::LocationSource));

        let config = Config::from_args(
            Path::new("/data"),
            &args(&["--track", "/tmp/track.ndjson", "--track-speed", "4"]),
        )
        .unwrap();
        assert_eq!(
            config.location,
            LocationSource::Track {
                path: PathBuf::from("/tmp/track.ndjson"),
                speed: 4.0
            }
        );
    }
}

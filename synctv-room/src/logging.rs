use std::sync::Arc;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// Crates whose events the configured level applies to. Everything else
/// (tokio, reqwest, tonic internals) stays at `warn`.
const OWN_TARGETS: [&str; 2] = ["synctv_room", "synctv_vendors"];

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. Output goes to stdout, or is
/// appended to `config.file_path`.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let directives = filter_directives(&config.level)?;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directives)?,
    };

    let writer = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.format == "json" {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_file(false)
            .with_ansi(config.file_path.is_none())
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry().with(layer).with(filter).try_init()?;
    Ok(())
}

/// `warn` globally, `level` for this workspace's crates
fn filter_directives(level: &str) -> anyhow::Result<String> {
    let level = match level.to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        l if LEVELS.contains(&l) => l.to_string(),
        _ => anyhow::bail!("Invalid log level: {level}"),
    };
    let scoped: Vec<String> = OWN_TARGETS.iter().map(|t| format!("{t}={level}")).collect();
    Ok(format!("warn,{}", scoped.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives("DEBUG").unwrap(),
            "warn,synctv_room=debug,synctv_vendors=debug"
        );
        assert_eq!(
            filter_directives("warning").unwrap(),
            "warn,synctv_room=warn,synctv_vendors=warn"
        );
        assert!(filter_directives("verbose").is_err());
    }

    #[test]
    fn test_init_rejects_bad_level() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config).is_err());
    }

    // Only test in this binary that installs the global subscriber
    #[test]
    fn test_init_writes_json_to_file() {
        let path = std::env::temp_dir().join(format!("synctv-room-log-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
            file_path: Some(path.to_string_lossy().into_owned()),
        };

        init_logging(&config).unwrap();
        tracing::info!(room_id = "r1", "logging ready");
        tracing::debug!("below the configured level");

        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let line = written
            .lines()
            .find(|l| l.contains("logging ready"))
            .unwrap_or_else(|| panic!("event missing from {written:?}"));
        let event: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(event["fields"]["room_id"], "r1");
        assert_eq!(event["level"], "INFO");
        assert!(!written.contains("below the configured level"));

        // A second install is refused
        assert!(init_logging(&config).is_err());
    }
}

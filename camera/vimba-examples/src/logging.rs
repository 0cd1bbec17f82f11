use time::{UtcOffset, format_description::well_known::Iso8601};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
};

/// Filter from `RUST_LOG` if set, otherwise from `default_directives`.
fn env_filter(rust_log: Option<&str>, default_directives: &str) -> anyhow::Result<EnvFilter> {
    let directives = rust_log.unwrap_or(default_directives);
    Ok(EnvFilter::try_new(directives)?)
}

/// Start logging to the console and, optionally, to a file.
pub fn init(default_directives: &str, log_file: Option<&std::path::Path>) -> anyhow::Result<()> {
    // Fixed offset taken from the local timezone at startup.
    let timer = OffsetTime::new(
        UtcOffset::from_whole_seconds(chrono::Local::now().offset().local_minus_utc())?,
        Iso8601::DEFAULT,
    );

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            Some(
                fmt::layer()
                    .with_timer(timer.clone())
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    let console_layer = fmt::layer()
        .with_timer(timer)
        .with_writer(std::io::stderr)
        .with_ansi(!cfg!(windows));

    let rust_log = std::env::var("RUST_LOG").ok();
    let collector = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter(rust_log.as_deref(), default_directives)?);
    tracing::subscriber::set_global_default(collector)?;

    match (&rust_log, log_file) {
        (Some(var), _) => tracing::debug!("Logging initiated with RUST_LOG=\"{var}\"."),
        (None, Some(path)) => {
            tracing::debug!("Logging initiated, also to file \"{}\".", path.display())
        }
        (None, None) => tracing::debug!("Logging initiated with \"{default_directives}\"."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_wins_over_default() {
        let filter = env_filter(Some("vimba=trace"), "info").unwrap();
        assert_eq!(filter.to_string(), "vimba=trace");
        let filter = env_filter(None, "warn").unwrap();
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn bad_directives_are_errors() {
        assert!(env_filter(None, "vimba=notalevel").is_err());
    }
}

use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::{
    fs::File,
    io::{self, Write},
};

/// Environment variable naming a log file for runs without `--log-file`.
pub const LOG_FILE_ENV: &str = "S5LINK_LOG_FILE";

/// Where log records go. stdout is never used; it carries forwarded values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Log only into the file.
    File(String),
    /// Log into the file and mirror every record on stderr.
    Tee(String),
}

impl LogTarget {
    /// `--log-file` tees into a file, the environment variable redirects
    /// into one, otherwise records go to stderr.
    pub fn resolve(cli_path: Option<&str>, env_path: Option<String>) -> Self {
        match (cli_path, env_path) {
            (Some(path), _) if !path.is_empty() => Self::Tee(path.to_string()),
            (_, Some(path)) if !path.is_empty() => Self::File(path),
            _ => Self::Stderr,
        }
    }
}

/// Copies every record into a file and onto stderr.
struct TeeWriter {
    file: File,
    stderr: io::Stderr,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        self.stderr.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.stderr.flush()
    }
}

/// Logger setup shared by every entrypoint.
pub fn init_common(log_file: Option<&str>) {
    let target = LogTarget::resolve(log_file, std::env::var(LOG_FILE_ENV).ok());
    if let Err(err) = init_logger(&target) {
        eprintln!("Failed to open log file for {target:?}: {err}");
        init_logger_with(Target::Stderr);
    }
    log::debug!("Logging to {target:?}");
}

fn init_logger(target: &LogTarget) -> io::Result<()> {
    let open = |path: &str| std::fs::OpenOptions::new().create(true).append(true).open(path);
    let target = match target {
        LogTarget::Stderr => Target::Stderr,
        LogTarget::File(path) => Target::Pipe(Box::new(open(path)?)),
        LogTarget::Tee(path) => Target::Pipe(Box::new(TeeWriter {
            file: open(path)?,
            stderr: io::stderr(),
        })),
    };
    init_logger_with(target);
    Ok(())
}

fn init_logger_with(target: Target) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(target)
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

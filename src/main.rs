use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use redirect_logger::config::{Bytes, Seconds};
use redirect_logger::{current_seconds, template, Logger, SizeRotate, TimeRotate};

/// Copies standard input into a rotating set of log files.
///
/// Standard output is redirected into the rotation, so anything the process
/// prints lands in `{path}/{name}.{tag}.{ext}`, with `{path}/{name}.{ext}`
/// linking to the active file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Directory the log files live in.
    #[arg(short = 'p', long = "path", env = "REDIRECT_LOGGER_PATH", default_value = ".")]
    path: PathBuf,

    /// File name stem.
    #[arg(short, long, env = "REDIRECT_LOGGER_NAME", default_value = "stdout")]
    name: String,

    /// File extension.
    #[arg(long, env = "REDIRECT_LOGGER_EXT", default_value = "log")]
    ext: String,

    /// Number of files to retain.
    #[arg(long, env = "REDIRECT_LOGGER_FILES", default_value_t = 3)]
    files: usize,

    /// In-memory buffer per file, e.g. `4k`.
    #[arg(long, env = "REDIRECT_LOGGER_BUFFER", default_value = "1k")]
    buffer: Bytes,

    /// Rotate when a file reaches this size, e.g. `100m`.
    #[arg(long, env = "REDIRECT_LOGGER_SIZE", default_value = "10m", conflicts_with = "span")]
    size: Bytes,

    /// Rotate by time instead, e.g. `1h` or `1d`. Snapped to 1h..7d.
    #[arg(long, env = "REDIRECT_LOGGER_SPAN")]
    span: Option<Seconds>,

    /// Line written once at startup; `{}` slots receive the start time and pid.
    #[arg(long, value_parser = parse_template)]
    header: Option<String>,
}

fn parse_template(s: &str) -> Result<String, String> {
    if !template::validate(s) {
        return Err("unbalanced braces".to_string());
    }
    let mut line = s.to_string();
    if !line.ends_with('\n') {
        line.push('\n');
    }
    Ok(line)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_timer(UtcTime::rfc_3339())
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "redirect_logger failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> redirect_logger::Result<()> {
    let fd = io::stdout().as_raw_fd();
    match args.span {
        Some(span) => {
            let rotate = TimeRotate::builder()
                .base(&args.path)
                .name(&args.name)
                .ext(&args.ext)
                .max_files(args.files)
                .buf_size_bytes(args.buffer)
                .span_seconds(span)
                .build();
            debug!(span = rotate.span(), "time rotation");
            redirect_logger::redirect(fd, Logger::new(rotate)?)?;
        }
        None => {
            let rotate = SizeRotate::builder()
                .base(&args.path)
                .name(&args.name)
                .ext(&args.ext)
                .max_files(args.files)
                .buf_size_bytes(args.buffer)
                .size_bytes(args.size)
                .build();
            debug!(size = rotate.size(), "size rotation");
            redirect_logger::redirect(fd, Logger::new(rotate)?)?;
        }
    }

    let mut stdout = io::stdout().lock();
    if let Some(header) = &args.header {
        let line = template::format(header, &[&current_seconds(), &std::process::id()]);
        stdout.write_all(line.as_bytes())?;
    }
    io::copy(&mut io::stdin().lock(), &mut stdout)?;
    stdout.flush()?;
    drop(stdout);

    redirect_logger::shutdown()
}

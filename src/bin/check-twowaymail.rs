#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Monitoring plugin checking mail delivery between two mail servers

use clap::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use twowaymail::{
    Endpoint, ImapScanner, Leg, ProbeOptions, Report, RoundTripProber, SeverityPolicy,
    SmtpSubmitter,
};

#[derive(Parser)]
#[command(name = "check-twowaymail", version)]
#[command(
    about = "Check mail delivery in both directions between two mail servers",
    long_about = "Logs in to both hosts via SMTP and sends a probe to the other host. \
                  On the next run, logs in to both hosts via IMAP, checks whether the \
                  probes arrived and deletes them, while sending out the next pair."
)]
#[allow(clippy::struct_excessive_bools)]
struct Args {
    /// SMTP host[:port] of the first host (default port 587)
    #[arg(long, value_name = "HOST")]
    smtp1: String,

    /// IMAP host[:port] of the first host (default port 143)
    #[arg(long, value_name = "HOST")]
    imap1: String,

    /// Probe mail address on the first host
    #[arg(long, value_name = "MAIL")]
    addr1: String,

    /// Username on the first host
    #[arg(long, value_name = "USER")]
    user1: String,

    /// Password on the first host
    #[arg(long, value_name = "PASS", env = "TWOWAYMAIL_PASS1", hide_env_values = true)]
    pass1: String,

    /// Do not use STARTTLS for the first host
    #[arg(long)]
    nossl1: bool,

    /// SMTP host[:port] of the second host (default port 587)
    #[arg(long, value_name = "HOST")]
    smtp2: String,

    /// IMAP host[:port] of the second host (default port 143)
    #[arg(long, value_name = "HOST")]
    imap2: String,

    /// Probe mail address on the second host
    #[arg(long, value_name = "MAIL")]
    addr2: String,

    /// Username on the second host
    #[arg(long, value_name = "USER")]
    user2: String,

    /// Password on the second host
    #[arg(long, value_name = "PASS", env = "TWOWAYMAIL_PASS2", hide_env_values = true)]
    pass2: String,

    /// Do not use STARTTLS for the second host
    #[arg(long)]
    nossl2: bool,

    /// Seconds allowed for each phase: both checks, then both sends.
    /// A whole run may take up to twice this.
    #[arg(
        long,
        value_name = "SECS",
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    /// Name reported as the probing host (default: this machine's hostname)
    #[arg(long, value_name = "NAME")]
    monitoring_host: Option<String>,

    /// Report a failure of this leg as WARNING instead of CRITICAL
    /// (recv1, recv2, send1, send2; repeatable)
    #[arg(long = "warn", value_name = "LEG")]
    warn_legs: Vec<Leg>,

    /// Print one line per leg after the status line
    #[arg(short, long)]
    verbose: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                return ExitCode::SUCCESS;
            }
            let reason = e.kind().as_str().unwrap_or("invalid arguments");
            let report = Report::unknown(format!("usage error: {reason}"));
            println!("{}", report.headline());
            return ExitCode::from(report.status.exit_code());
        }
    };

    // Diagnostics go to stderr; stdout carries only the plugin output.
    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let report = match run(&args).await {
        Ok(report) => report,
        Err(e) => Report::unknown(format!("{e:#}")),
    };

    print_report(&args, &report);
    ExitCode::from(report.status.exit_code())
}

async fn run(args: &Args) -> anyhow::Result<Report> {
    // Both ring and aws-lc-rs may be compiled in; pick one process-wide.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let first = Endpoint::new(
        &args.smtp1,
        &args.imap1,
        &args.addr1,
        &args.user1,
        &args.pass1,
        !args.nossl1,
    )?;
    let second = Endpoint::new(
        &args.smtp2,
        &args.imap2,
        &args.addr2,
        &args.user2,
        &args.pass2,
        !args.nossl2,
    )?;

    let defaults = ProbeOptions::default();
    let options = ProbeOptions {
        timeout: Duration::from_secs(args.timeout),
        accept_invalid_certs: args.insecure,
        monitoring_host: args
            .monitoring_host
            .clone()
            .unwrap_or(defaults.monitoring_host),
        staleness: defaults.staleness,
    };

    let policy = args
        .warn_legs
        .iter()
        .fold(SeverityPolicy::default(), |policy, leg| policy.warn_on(*leg));

    let prober = RoundTripProber::new(
        first,
        second,
        ImapScanner::new(options.clone()),
        SmtpSubmitter::new(options.clone()),
        options,
    );
    let outcome = prober.probe().await;

    Ok(Report::evaluate(&outcome, &policy))
}

fn print_report(args: &Args, report: &Report) {
    if args.json {
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("TWOWAYMAIL UNKNOWN - {e}"),
        }
        return;
    }

    println!("{}", report.headline());
    if args.verbose {
        for line in report.details() {
            println!("{line}");
        }
    }
}

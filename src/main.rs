//! ptsp-build - PTSP thin-client root filesystem builder.
//!
//! Installs a Pardus system into an existing directory with pisi, configures
//! it inside a chroot and prunes it down to a network-bootable client image.

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use ptsp_build::build::{build_image, BuildContext, BuildOptions};
use ptsp_build::config::Config;
use ptsp_build::interrupt::{Interrupt, Interrupted};
use ptsp_build::preflight;
use ptsp_build::process::SystemRunner;
use ptsp_build::profile::{Profile, Repository, PROFILE_NAMES};

#[derive(Parser)]
#[command(name = "ptsp-build")]
#[command(about = "Build the PTSP thin-client root filesystem")]
#[command(
    after_help = "EXAMPLES:\n  ptsp-build -o /srv/ptsp/client            Build with the default profile\n  ptsp-build -o /srv/ptsp/client -a vim     Also install vim\n  ptsp-build -o /srv/ptsp/client --check    Only run preflight checks"
)]
struct Cli {
    /// Root filesystem directory to build into (must already exist)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Package repository index URL (default: the profile's repository)
    #[arg(short, long, value_name = "URL")]
    repository: Option<String>,

    /// Additional package to install last (repeatable)
    #[arg(short, long, value_name = "PACKAGE")]
    additional: Vec<String>,

    /// Built-in profile (pardus-2007, pardus-2008)
    #[arg(short, long)]
    profile: Option<String>,

    /// Load the profile from a JSON file instead
    #[arg(long, value_name = "FILE")]
    profile_file: Option<PathBuf>,

    /// Seconds to wait for the message bus socket
    #[arg(long, value_name = "SECS", default_value_t = 5.0)]
    bus_timeout: f64,

    /// Run preflight checks only
    #[arg(long)]
    check: bool,

    /// Print the selected profile as JSON and exit
    #[arg(long)]
    show_profile: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load();

    match run(cli, config) {
        Ok(code) => code,
        Err(e) => {
            if e.downcast_ref::<Interrupted>().is_some() {
                eprintln!("Interrupted. /proc and /sys have been unmounted.");
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    let profile_name = cli.profile.as_deref().unwrap_or(&config.profile);
    let profile_file = cli.profile_file.as_deref().or(config.profile_file.as_deref());

    if cli.show_profile {
        let profile = Profile::resolve(profile_name, profile_file)?;
        println!("{}", profile.to_json()?);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(target) = cli.output else {
        Cli::command().print_help()?;
        return Ok(ExitCode::from(1));
    };

    if cli.check {
        let report = preflight::run_preflight(&target);
        report.print();
        return Ok(if report.all_passed() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let profile = Profile::resolve(profile_name, profile_file)?;
    let Ok(bus_timeout) = Duration::try_from_secs_f64(cli.bus_timeout) else {
        bail!("Invalid --bus-timeout {}", cli.bus_timeout);
    };

    config.print();
    let url = cli
        .repository
        .or(config.repository)
        .unwrap_or_else(|| profile.repository.url.clone());
    let repository = Repository::new(&profile.repository.name, &url);

    println!("Profile: {} (available: {})", profile.name, PROFILE_NAMES.join(", "));
    println!("Repository: {} {}", repository.name, repository.url);
    println!();

    preflight::run_preflight_or_fail(&target)?;

    let interrupt = Interrupt::new();
    interrupt.install_handler()?;

    let ctx = BuildContext::new(
        &target,
        repository,
        cli.additional,
        profile,
        &SystemRunner,
        interrupt,
    )?
    .with_options(BuildOptions {
        bus_timeout,
        ..BuildOptions::default()
    });

    build_image(&ctx)?;
    Ok(ExitCode::SUCCESS)
}

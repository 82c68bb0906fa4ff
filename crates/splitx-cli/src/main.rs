mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{DeviceOverrides, EXIT_FAILURE, EXIT_IO_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "splitx",
    version,
    about = "Inspect and classify split APK sources (.apks, .xapk, .apkm, .zip)"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args)]
struct DeviceArgs {
    /// Device profile TOML file (defaults to ~/.config/splitx/device.toml).
    #[arg(long)]
    device: Option<PathBuf>,
    /// Supported ABI, most preferred first. Repeatable.
    #[arg(long = "abi")]
    abis: Vec<String>,
    /// Preferred locale, e.g. en-US. Repeatable.
    #[arg(long = "locale")]
    locales: Vec<String>,
    /// Screen density in dpi, or a bucket name such as xxhdpi.
    #[arg(long)]
    density: Option<String>,
}

impl DeviceArgs {
    fn overrides(&self) -> DeviceOverrides<'_> {
        DeviceOverrides {
            file: self.device.as_deref(),
            abis: &self.abis,
            locales: &self.locales,
            density: self.density.as_deref(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve a split APK archive or directory into categorized parts.
    Resolve {
        /// Archive (.apks, .xapk, .apkm, .zip) or unpacked directory.
        source: PathBuf,
        #[command(flatten)]
        device: DeviceArgs,
        /// Skip device-based recommendations.
        #[arg(long, default_value_t = false)]
        no_recommend: bool,
    },
    /// Dump the root manifest attributes of a single APK.
    Manifest {
        /// Path to an .apk file.
        apk: PathBuf,
    },
    /// Show the effective device profile.
    Device {
        #[command(flatten)]
        device: DeviceArgs,
        /// Write the effective profile to this TOML file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SPLITX_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;

    let result = match &cli.command {
        Commands::Resolve {
            source,
            device,
            no_recommend,
        } => commands::resolve::run(source, &device.overrides(), *no_recommend, json_output),
        Commands::Manifest { apk } => commands::manifest::run(apk, json_output),
        Commands::Device { device, save } => {
            commands::device::run(&device.overrides(), save.as_deref(), json_output)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(*shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("I/O error:") || msg.starts_with("archive error:") {
                EXIT_IO_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

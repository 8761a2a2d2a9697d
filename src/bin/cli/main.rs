//! CLI tool for archkit archive and image operations.

mod commands;
mod exit_codes;
mod file_selector;
mod output;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use archkit::read::OpenOptions;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};

use exit_codes::ExitCode;

/// Read archives and filesystem images
#[derive(Parser)]
#[command(name = "archkit")]
#[command(author, version, about = "Read archives and filesystem images", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(
        long = "output-format",
        short = 'f',
        value_enum,
        default_value = "human",
        env = "ARCHKIT_OUTPUT",
        global = true
    )]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Number of threads for hashing (0 = auto)
    #[arg(long, short = 't', default_value = "0", global = true)]
    threads: usize,

    /// Show deleted files and directories of filesystem images
    #[arg(long, global = true)]
    show_deleted: bool,

    /// Hide filesystem metadata files
    #[arg(long, global = true)]
    hide_system: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List archive contents (alias: l)
    #[command(alias = "l")]
    List {
        /// Archive or image to list
        archive: PathBuf,

        /// Show method, packed size and checksum columns
        #[arg(long)]
        technical: bool,

        /// Item patterns to list (glob patterns supported)
        #[arg(short = 'i', long)]
        include: Vec<String>,

        /// Item patterns to leave out
        #[arg(short = 'e', long)]
        exclude: Vec<String>,
    },

    /// Extract items (alias: x)
    #[command(alias = "x")]
    Extract {
        /// Archive or image to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short = 'o', long, default_value = ".")]
        output: PathBuf,

        /// Item patterns to extract (glob patterns supported)
        #[arg(short = 'i', long)]
        include: Vec<String>,

        /// Item patterns to exclude
        #[arg(short = 'e', long)]
        exclude: Vec<String>,

        /// What to do with files that already exist
        #[arg(long, value_enum, default_value = "prompt")]
        overwrite: OverwriteMode,

        /// Write every file into the output directory, without folders
        #[arg(long, conflicts_with = "strip_prefix")]
        flat: bool,

        /// Extract only below this folder, relative to it
        #[arg(long)]
        strip_prefix: Option<String>,

        /// How to handle symbolic links and junctions
        #[arg(long, value_enum, default_value = "safe")]
        links: LinkMode,

        /// Do not restore times and attributes
        #[arg(long)]
        no_metadata: bool,

        /// Only check paths lexically, without resolving existing folders
        #[arg(long)]
        relaxed_paths: bool,

        /// Print every item as it completes
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Test archive integrity (alias: t)
    #[command(alias = "t")]
    Test {
        /// Archive or image to test
        archive: PathBuf,

        /// Item patterns to test
        #[arg(short = 'i', long)]
        include: Vec<String>,

        /// Item patterns to skip
        #[arg(short = 'e', long)]
        exclude: Vec<String>,

        /// Print every item as it completes
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Compute or check digests (alias: h)
    #[command(alias = "h")]
    Hash {
        /// Files or directories; with --archive, one archive whose items are hashed
        paths: Vec<PathBuf>,

        /// Hash methods (crc32, crc64, md5, sha1, sha256, sha512, cksum)
        #[arg(short = 'm', long = "method", value_delimiter = ',')]
        methods: Vec<String>,

        /// Hash the items inside the archive instead of the file itself
        #[arg(short = 'a', long)]
        archive: bool,

        /// Report only the data aggregate, not the name-folded ones
        #[arg(long)]
        no_names: bool,

        /// Write a checksum listing for the first method
        #[arg(short = 'w', long, value_name = "FILE")]
        write: Option<PathBuf>,

        /// Use BSD-style lines in the written listing
        #[arg(long, requires = "write")]
        bsd: bool,

        /// Verify the files named in a checksum listing
        #[arg(short = 'c', long, value_name = "LISTING", conflicts_with_all = ["archive", "write"])]
        check: Option<PathBuf>,
    },

    /// Show archive information (alias: i)
    #[command(alias = "i")]
    Info {
        /// Archive or image to inspect
        archive: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OverwriteMode {
    Always,
    Never,
    Prompt,
    Rename,
    RenameExisting,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LinkMode {
    /// Do not create links
    Skip,
    /// Create links that stay inside the output directory
    Safe,
    /// Create links exactly as stored
    Keep,
}

fn main() {
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        // First Ctrl+C asks the running operation to stop; a second one exits.
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                eprintln!("\nInterrupted");
                std::process::exit(exit_codes::USER_INTERRUPT);
            }
        })
        .ok();
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::BAD_ARGS
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let ctx = commands::Context {
        format: cli.format,
        quiet: cli.quiet,
        threads: cli.threads,
        interrupted,
        open: OpenOptions::new()
            .show_deleted(cli.show_deleted)
            .show_system_files(!cli.hide_system),
    };

    let exit_code = match cli.command {
        Commands::List {
            archive,
            technical,
            include,
            exclude,
        } => commands::list(&ctx, &archive, technical, &include, &exclude),

        Commands::Extract {
            archive,
            output,
            include,
            exclude,
            overwrite,
            flat,
            strip_prefix,
            links,
            no_metadata,
            relaxed_paths,
            verbose,
        } => commands::extract(
            &ctx,
            &commands::ExtractConfig {
                archive_path: &archive,
                output_dir: &output,
                include: &include,
                exclude: &exclude,
                overwrite,
                flat,
                strip_prefix: strip_prefix.as_deref(),
                links,
                no_metadata,
                relaxed_paths,
                verbose,
            },
        ),

        Commands::Test {
            archive,
            include,
            exclude,
            verbose,
        } => commands::test(&ctx, &archive, &include, &exclude, verbose),

        Commands::Hash {
            paths,
            methods,
            archive,
            no_names,
            write,
            bsd,
            check,
        } => commands::hash(
            &ctx,
            &commands::HashConfig {
                paths: &paths,
                methods: &methods,
                in_archive: archive,
                no_names,
                bsd,
                write: write.as_deref(),
                check: check.as_deref(),
            },
        ),

        Commands::Info { archive } => commands::info(&ctx, &archive),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}

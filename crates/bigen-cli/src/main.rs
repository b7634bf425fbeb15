//! bigen - builtin metadata compiler
//!
//! Reads the builtin strings and objects documents plus any user override
//! documents, and generates the builtins C source, header and metadata
//! JSON used by the runtime build.

use anyhow::Context;
use bigen_core::{compile, ActiveConfig, BuildInfo, CompileOptions, MetadataDocument, UsedDefines};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod files;

#[derive(Parser)]
#[command(name = "bigen")]
#[command(about = "Generate builtin initializer data from YAML metadata", long_about = None)]
#[command(version)]
struct Cli {
    /// Built-in strings metadata file, YAML
    #[arg(long, value_name = "FILE")]
    strings_metadata: PathBuf,

    /// Built-in objects metadata file, YAML
    #[arg(long, value_name = "FILE")]
    objects_metadata: PathBuf,

    /// Override metadata applied over the base metadata, in order
    #[arg(long = "builtin-file", value_name = "FILE")]
    builtin_files: Vec<PathBuf>,

    /// Defines used by runtime sources, JSON
    #[arg(long, value_name = "FILE")]
    used_stridx_metadata: PathBuf,

    /// Active configuration options, JSON
    #[arg(long, value_name = "FILE")]
    active_options: Option<PathBuf>,

    /// Target version as major * 10000 + minor * 100 + patch
    #[arg(long)]
    duk_version: u32,

    #[arg(long)]
    git_commit: Option<String>,

    #[arg(long)]
    git_describe: Option<String>,

    #[arg(long)]
    git_branch: Option<String>,

    /// Prefix of the generated defines
    #[arg(long, default_value = "DUK")]
    define_prefix: String,

    /// Support RAM built-in objects
    #[arg(long)]
    ram_support: bool,

    /// Support ROM built-in objects
    #[arg(long)]
    rom_support: bool,

    /// Convert ROM built-in function properties into lightfuncs
    #[arg(long)]
    rom_auto_lightfunc: bool,

    #[arg(long, value_name = "FILE")]
    out_header: PathBuf,

    #[arg(long, value_name = "FILE")]
    out_source: PathBuf,

    #[arg(long, value_name = "FILE")]
    out_metadata_json: PathBuf,

    /// Dump final RAM metadata, for development
    #[arg(long, value_name = "FILE")]
    dev_dump_final_ram_metadata: Option<PathBuf>,

    /// Dump final ROM metadata, for development
    #[arg(long, value_name = "FILE")]
    dev_dump_final_rom_metadata: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log every pipeline decision
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> CompileOptions {
        CompileOptions {
            ram_support: self.ram_support,
            rom_support: self.rom_support,
            rom_auto_lightfunc: self.rom_auto_lightfunc,
            define_prefix: self.define_prefix.clone(),
            build_info: BuildInfo {
                version: self.duk_version,
                git_commit: self.git_commit.clone(),
                git_branch: self.git_branch.clone(),
                git_describe: self.git_describe.clone(),
            },
        }
    }
}

fn install_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_document(path: &Path) -> anyhow::Result<MetadataDocument> {
    MetadataDocument::from_path(path).with_context(|| format!("failed to load metadata {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    install_tracing(&cli);

    let strings = load_document(&cli.strings_metadata)?;
    let objects = load_document(&cli.objects_metadata)?;
    let base = MetadataDocument::combine(objects, strings);
    let overrides = cli
        .builtin_files
        .iter()
        .map(|path| load_document(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let used_defines = UsedDefines::from_path(&cli.used_stridx_metadata).with_context(|| {
        format!("failed to load used defines {}", cli.used_stridx_metadata.display())
    })?;
    let active = match &cli.active_options {
        Some(path) => ActiveConfig::from_path(path)
            .with_context(|| format!("failed to load active options {}", path.display()))?,
        None => ActiveConfig::default(),
    };

    let outputs = compile(&base, &overrides, &active, &used_defines, &cli.options())
        .context("builtin metadata compilation failed")?;

    // Everything is rendered before the first write so a failure never
    // leaves partial outputs behind
    let mut writes = vec![
        (cli.out_source.as_path(), outputs.source.as_str()),
        (cli.out_header.as_path(), outputs.header.as_str()),
        (cli.out_metadata_json.as_path(), outputs.metadata_json.as_str()),
    ];
    if let Some(path) = &cli.dev_dump_final_ram_metadata {
        writes.push((path.as_path(), outputs.ram_dump.as_str()));
    }
    if let Some(path) = &cli.dev_dump_final_rom_metadata {
        writes.push((path.as_path(), outputs.rom_dump.as_str()));
    }
    for (path, text) in writes {
        files::write_atomic(path, text)?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

pub mod cli;
pub mod commands;
pub mod components;
pub mod data;
pub mod engine;
pub mod formula;
pub mod history;
pub mod ingest;
pub mod io_utils;
pub mod mapper;
pub mod normalize;
pub mod schema;
pub mod store;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};

use crate::{
    cli::{Cli, Commands},
    commands::Workspace,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("cost_reconcile", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    debug!("Using state directory {:?}", cli.state_dir);
    let mut workspace = Workspace::open(&cli.state_dir);
    match cli.command {
        Commands::Load(args) => workspace.load(&args),
        Commands::Import(args) => workspace.import(&args),
        Commands::Map => workspace.map(),
        Commands::Compute(args) => workspace.compute(&args),
        Commands::Show(args) => workspace.show(&args),
        Commands::Export(args) => workspace.export(&args),
        Commands::Manual(args) => workspace.manual(&args),
        Commands::Edit(args) => workspace.edit(&args),
        Commands::Reset(args) => workspace.reset(&args),
        Commands::Undo => workspace.undo(),
    }
}

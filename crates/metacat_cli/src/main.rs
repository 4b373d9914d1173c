//! Catalog inspection entry point.
//!
//! # Responsibility
//! - Open a catalog database with an optional TOML configuration.
//! - Print top-level groups with their subtree size and child flag.
//!
//! Usage: `metacat_cli DB_PATH [--config CONFIG_TOML]`

use log::warn;
use metacat_core::{
    init_logging, open_db_with, CatalogConfig, NodeListQuery, NodeRepository, SqliteNodeRepository,
    TreeService,
};
use std::path::PathBuf;
use std::process::ExitCode;

struct Args {
    db_path: PathBuf,
    config_path: Option<PathBuf>,
}

const USAGE: &str = "usage: metacat_cli DB_PATH [--config CONFIG_TOML]";

fn parse_args<I>(raw: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut db_path = None;
    let mut config_path = None;
    let mut raw = raw.into_iter();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--config" => {
                let value = raw
                    .next()
                    .ok_or_else(|| "--config requires a file path".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            other if other.starts_with("--") => return Err(format!("unknown flag `{other}`")),
            other => {
                if db_path.is_some() {
                    return Err(format!("unexpected argument `{other}`"));
                }
                db_path = Some(PathBuf::from(other));
            }
        }
    }
    let db_path = db_path.ok_or_else(|| USAGE.to_string())?;
    Ok(Args {
        db_path,
        config_path,
    })
}

fn run(args: Args) -> Result<(), String> {
    let config = match &args.config_path {
        Some(path) => CatalogConfig::load(path).map_err(|err| err.to_string())?,
        None => CatalogConfig::default(),
    };
    if config.logging.dir.is_some() {
        init_logging(&config.logging)?;
    }

    let conn = open_db_with(&args.db_path, &config.db).map_err(|err| err.to_string())?;
    let repo = SqliteNodeRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let service = TreeService::new(repo);

    let query = NodeListQuery {
        limit: Some(config.list.max_limit),
        ..NodeListQuery::default()
    };
    let page = service
        .list_nodes(&query, &config.list)
        .map_err(|err| err.to_string())?;

    println!("groups={}", page.total);
    for item in page.items {
        let nodes = match service.repo().get_subtree(&item.node.path_id) {
            Ok(subtree) => subtree.len(),
            Err(err) => {
                warn!(
                    "event=cli_group module=cli status=degraded node_id={} error={err}",
                    item.node.id
                );
                0
            }
        };
        println!(
            "{}\t{}\tnodes={}\thas_child={}",
            item.node.id, item.node.name, nodes, item.has_child
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let result = parse_args(std::env::args().skip(1)).and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("metacat_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

//!
//! chunkvault CLI binary
//! ---------------------
//! Inspect and edit a persistent vault from the command line: list directories,
//! read/write/append files, read CSV ranges, export bounded pieces and manage the
//! folder registry.

use std::env;
use std::io::{self, Read};

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use chunkvault::tabular::DirectorySink;
use chunkvault::vfs::EntryKind;
use chunkvault::{Vault, VaultConfig};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--config <vault.json>] [--root <dir>] [--store <name>] <command> [args...]\n\nCommands:\n  ls <dir>                          list files and folders in a directory\n  cat <path>                        print a file as text\n  write <path> <text|->             replace a file with text (- reads stdin)\n  append <path> <text|->            append text to a file (- reads stdin)\n  rm <path>                         delete a file and all its chunks\n  mkdir <dir>                       create a folder and its ancestors\n  rmdir <dir>                       delete a folder and everything beneath it\n  size <path>                       print a file's size in bytes\n  head <path>                       print the CSV header of a file\n  rows <path> [start] [end]         print parsed CSV rows in [start, end) as JSON\n  export <path> <max_bytes> <dir>   split a CSV file into header-carrying pieces under <dir>\n  folders                           list folders in the registry\n  register <folder>                 add or refresh a folder in the registry\n\nFlags:\n  --config <path>   JSON config file (default: vault.json if present)\n  --root <dir>      store root directory (overrides config and CHUNKVAULT_ROOT)\n  --store <name>    store name (default: myDB)\n  -h, --help        show this help"
    );
}

fn text_arg(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut s = String::new();
        io::stdin().read_to_string(&mut s).context("reading stdin")?;
        Ok(s)
    } else {
        Ok(arg.to_string())
    }
}

fn need<'a>(rest: &'a [String], i: usize, what: &str) -> Result<&'a str> {
    rest.get(i).map(String::as_str).ok_or_else(|| anyhow!("missing argument: {what}"))
}

async fn run(vault: &Vault, cmd: &str, rest: &[String]) -> Result<()> {
    match cmd {
        "ls" => {
            for entry in vault.list_directory(need(rest, 0, "dir")?).await? {
                let tag = match entry.kind { EntryKind::Folder => "d", EntryKind::File => "-" };
                println!("{tag} {}", entry.path);
            }
        }
        "cat" => {
            let path = need(rest, 0, "path")?;
            match vault.read_file_as_text(path).await? {
                Some(text) => print!("{text}"),
                None => bail!("no such file: {path}"),
            }
        }
        "write" => {
            let text = text_arg(need(rest, 1, "text")?)?;
            vault.write_file(need(rest, 0, "path")?, text).await?;
        }
        "append" => {
            let text = text_arg(need(rest, 1, "text")?)?;
            vault.append_file(need(rest, 0, "path")?, text).await?;
        }
        "rm" => {
            let path = need(rest, 0, "path")?;
            if !vault.delete_file(path).await? { bail!("no such file: {path}"); }
        }
        "mkdir" => { vault.create_folder(need(rest, 0, "dir")?).await?; }
        "rmdir" => {
            let dir = need(rest, 0, "dir")?;
            if !vault.delete_folder(dir).await? { bail!("no such folder: {dir}"); }
        }
        "size" => println!("{}", vault.get_file_size(need(rest, 0, "path")?).await?),
        "head" => println!("{}", vault.get_header(need(rest, 0, "path")?).await?),
        "rows" => {
            let path = need(rest, 0, "path")?;
            let start: u64 = rest.get(1).map(|s| s.parse::<u64>()).transpose().context("start offset")?.unwrap_or(0);
            let end: Option<u64> = rest.get(2).map(|s| s.parse::<u64>()).transpose().context("end offset")?;
            let range = vault.read_range(path, start, end, true).await?
                .ok_or_else(|| anyhow!("no such CSV file: {path}"))?;
            println!("{}", serde_json::to_string_pretty(&range.rows)?);
            info!(target: "chunkvault", "rows {}..{} of {} bytes", range.start, range.end, range.total_size);
        }
        "export" => {
            let path = need(rest, 0, "path")?;
            let max: u64 = need(rest, 1, "max_bytes")?.parse().context("max_bytes")?;
            let mut sink = DirectorySink::new(need(rest, 2, "dir")?)?;
            let n = vault.export_bounded(path, max, &mut sink).await?;
            println!("{n} pieces");
        }
        "folders" => {
            for f in vault.list_known_folders(None).await? { println!("{f}"); }
        }
        "register" => {
            for f in vault.upsert_folder_registry(need(rest, 0, "folder")?, None).await? { println!("{f}"); }
        }
        other => bail!("unknown command: {other}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("building log filter")?;
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = if args.is_empty() { String::from("chunkvault") } else { args.remove(0) };

    let mut config_path = String::from("vault.json");
    let mut root: Option<String> = None;
    let mut store: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "--root" | "--store" => {
                let flag = args[i].clone();
                if i + 1 >= args.len() { eprintln!("{flag} requires a value"); print_usage(&program); std::process::exit(2); }
                let val = args[i + 1].clone();
                match flag.as_str() {
                    "--config" => config_path = val,
                    "--root" => root = Some(val),
                    _ => store = Some(val),
                }
                i += 2;
            }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            _ => break,
        }
    }
    let Some(cmd) = args.get(i).cloned() else {
        print_usage(&program);
        std::process::exit(2);
    };
    let rest = &args[i + 1..];

    let mut config = VaultConfig::load(&config_path)?;
    if let Some(r) = root { config.root = r.into(); }
    if let Some(s) = store { config.store_name = s; }
    info!(target: "chunkvault", "chunkvault: root='{}', store='{}', chunk_size={:?}", config.root.display(), config.store_name, config.chunk_size);

    let vault = Vault::open(config)?;
    let result = run(&vault, &cmd, rest).await;
    vault.close()?;
    result
}

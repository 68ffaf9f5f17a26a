use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use ariadne::{Label, Report, ReportKind, Source};
use clap::Parser;
use yansi::Paint;

use oberc::{compile, Options};

/// Oberon-07 compiler for RISC-5. Produces an object file (.rsc) and a
/// symbol file (.smb) next to each source module.
#[derive(Parser)]
#[command(name = "oberc", version, about)]
struct Args {
    /// Source modules, in dependency order
    #[arg(required = true)]
    modules: Vec<PathBuf>,

    /// Overwrite an existing symbol file even when the module key changes
    #[arg(short = 's', long)]
    new_symbol_file: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();
    let mut failed = false;
    for path in &args.modules {
        let src = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let dir = match path.parent() {
            Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
            Some(p) => p.to_path_buf(),
            None => PathBuf::from("."),
        };
        let opts = Options {
            new_sym_file: args.new_symbol_file,
            dir,
        };
        let outcome = compile(&src, &opts)
            .with_context(|| format!("compiling {}", path.display()))?;
        let name = path.display().to_string();
        for note in &outcome.notes {
            let start = note.pos.min(src.len());
            let end = (note.pos + 1).min(src.len()).max(start);
            Report::build(ReportKind::Error, name.clone(), start)
                .with_message(&note.msg)
                .with_label(Label::new((name.clone(), start..end)).with_message(&note.msg))
                .finish()
                .eprint((name.clone(), Source::from(src.clone())))?;
        }
        if outcome.err_cnt > 0 {
            eprintln!(
                "{}: compilation {} with {} error(s)",
                name,
                "FAILED".red().bold(),
                outcome.err_cnt
            );
            failed = true;
        } else {
            println!(
                "{}  {} {} {:08X}",
                name, outcome.pc, outcome.dc, outcome.key as u32
            );
        }
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

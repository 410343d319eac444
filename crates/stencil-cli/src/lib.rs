use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use stencil_core::{CompileOptions, Compiler, Document, NodeKind, Target, read_document};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, PartialEq)]
enum CliCommand {
    Compile {
        file: PathBuf,
        target: Target,
        options: Option<PathBuf>,
    },
    Fold {
        file: PathBuf,
    },
}

/// Install the stderr subscriber. `RUST_LOG` overrides the `warn` default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run_from_env() -> Result<(), String> {
    run_from_args(env::args().skip(1).collect())
}

pub fn run_from_args(args: Vec<String>) -> Result<(), String> {
    let command = parse_command(args)?;
    let output = execute(command)?;
    println!("{output}");
    Ok(())
}

fn execute(command: CliCommand) -> Result<String, String> {
    match command {
        CliCommand::Compile {
            file,
            target,
            options,
        } => {
            let doc = load_document(&file)?;
            let mut compiler = Compiler::for_document(&doc);
            if let Some(path) = options {
                compiler.set_options(load_options(&path)?);
            }
            debug!(file = %file.display(), %target, "compiling");
            let artifact = compiler
                .compile(&doc.tree, doc.function(), target)
                .map_err(|e| format!("{} ({})", e.message, e.code))?;
            artifact.render().map_err(|e| e.to_string())
        }
        CliCommand::Fold { file } => {
            let doc = load_document(&file)?;
            let compiler = Compiler::for_document(&doc);
            let ret = doc
                .tree
                .find_return(doc.function())
                .ok_or_else(|| format!("{} has no return statement", file.display()))?;
            let NodeKind::Return { expr: Some(expr) } = doc.tree.kind(ret) else {
                return Ok("undefined".to_string());
            };
            match compiler.fold(&doc.tree, *expr) {
                None => Ok("not constant".to_string()),
                Some(constant) if constant.value().contains_opaque() => {
                    Ok(constant.value().to_display_string())
                }
                Some(constant) => serde_json::to_string_pretty(&constant.value().to_json())
                    .map_err(|e| e.to_string()),
            }
        }
    }
}

fn load_document(file: &Path) -> Result<Document, String> {
    let source =
        fs::read_to_string(file).map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let root: serde_json::Value = serde_json::from_str(&source)
        .map_err(|e| format!("failed to parse {}: {e}", file.display()))?;
    read_document(&root).map_err(|e| format!("invalid document {}: {e}", file.display()))
}

fn load_options(file: &Path) -> Result<CompileOptions, String> {
    let source =
        fs::read_to_string(file).map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    serde_json::from_str(&source).map_err(|e| format!("invalid options {}: {e}", file.display()))
}

fn parse_command(args: Vec<String>) -> Result<CliCommand, String> {
    if args.is_empty() {
        return Err(help_text());
    }

    let cmd = args[0].as_str();
    match cmd {
        "compile" => parse_compile(args),
        "fold" => parse_fold(args),
        "help" | "--help" | "-h" => Err(help_text()),
        _ => Err(format!("unknown command: {cmd}\n\n{}", help_text())),
    }
}

fn parse_compile(args: Vec<String>) -> Result<CliCommand, String> {
    let mut file: Option<PathBuf> = None;
    let mut target: Option<Target> = None;
    let mut options: Option<PathBuf> = None;

    let mut i = 1usize;
    while i < args.len() {
        let token = &args[i];
        match token.as_str() {
            "--target" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "--target requires a value".to_string())?;
                target = Some(value.parse::<Target>()?);
            }
            "--options" => {
                i += 1;
                options = Some(PathBuf::from(
                    args.get(i)
                        .ok_or_else(|| "--options requires a value".to_string())?,
                ));
            }
            x if x.starts_with("--") => return Err(format!("unknown flag: {x}")),
            _ => {
                if file.is_some() {
                    return Err("only one FILE positional argument is allowed".to_string());
                }
                file = Some(PathBuf::from(token));
            }
        }
        i += 1;
    }

    let file = file.ok_or_else(|| "compile requires FILE".to_string())?;
    let target = target.ok_or_else(|| "compile requires --target vtl|asl|events".to_string())?;
    Ok(CliCommand::Compile {
        file,
        target,
        options,
    })
}

fn parse_fold(args: Vec<String>) -> Result<CliCommand, String> {
    match args.as_slice() {
        [_, file] if !file.starts_with("--") => Ok(CliCommand::Fold {
            file: PathBuf::from(file),
        }),
        [_] => Err("fold requires FILE".to_string()),
        _ => Err("fold takes exactly one FILE argument".to_string()),
    }
}

fn help_text() -> String {
    [
        "stencil CLI",
        "",
        "Commands:",
        "  stencil compile FILE --target vtl|asl|events [--options FILE]",
        "  stencil fold FILE",
    ]
    .join("\n")
}
